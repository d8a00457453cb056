//! Content-based file type detection for buffered transfers

use mime::Mime;
use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Bytes read from the head of a file when sniffing
const SNIFF_LEN: usize = 64;

/// (offset, magic, mime)
const SIGNATURES: &[(usize, &[u8], &str)] = &[
    (0, b"\x89PNG\r\n\x1a\n", "image/png"),
    (0, b"\xff\xd8\xff", "image/jpeg"),
    (0, b"GIF87a", "image/gif"),
    (0, b"GIF89a", "image/gif"),
    (0, b"BM", "image/bmp"),
    (0, b"%PDF-", "application/pdf"),
    (0, b"PK\x03\x04", "application/zip"),
    (0, b"\x1f\x8b", "application/gzip"),
    (0, b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    (0, b"Rar!\x1a\x07", "application/vnd.rar"),
    (0, b"\x1a\x45\xdf\xa3", "video/x-matroska"),
    (0, b"ID3", "audio/mpeg"),
    (0, b"OggS", "audio/ogg"),
    (0, b"fLaC", "audio/flac"),
    (4, b"ftyp", "video/mp4"),
];

/// Detect a MIME type from leading bytes
pub fn sniff_mime(head: &[u8]) -> Option<Mime> {
    if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        return "image/webp".parse().ok();
    }

    SIGNATURES
        .iter()
        .find(|(offset, magic, _)| head.get(*offset..offset + magic.len()) == Some(*magic))
        .and_then(|(_, _, mime)| mime.parse().ok())
}

/// Preferred extension for a sniffed type
pub fn extension_for(mime: &Mime) -> Option<&'static str> {
    let ext = match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("image", "png") => "png",
        ("image", "jpeg") => "jpg",
        ("image", "gif") => "gif",
        ("image", "bmp") => "bmp",
        ("image", "webp") => "webp",
        ("application", "pdf") => "pdf",
        ("application", "zip") => "zip",
        ("application", "gzip") => "gz",
        ("application", "x-7z-compressed") => "7z",
        ("application", "vnd.rar") => "rar",
        ("video", "x-matroska") => "mkv",
        ("video", "mp4") => "mp4",
        ("audio", "mpeg") => "mp3",
        ("audio", "ogg") => "ogg",
        ("audio", "flac") => "flac",
        _ => return None,
    };
    Some(ext)
}

/// Sniff the extension of a file on disk
pub async fn sniff_file(path: &Path) -> io::Result<Option<&'static str>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    tokio::fs::File::open(path)
        .await?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await?;

    Ok(sniff_mime(&head).as_ref().and_then(extension_for))
}
