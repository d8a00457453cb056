//! File name discovery for remote sources

use reqwest::Url;
use std::borrow::Cow;
use std::path::Path;

/// Extract a file name from a `Content-Disposition` header value
///
/// The RFC 5987 `filename*=charset'lang'value` form wins over plain
/// `filename=`; either may be quoted and percent-encoded.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    extended_filename(value)
        .or_else(|| plain_filename(value))
        .map(|name| sanitize(&name))
        .filter(|name| !name.is_empty())
}

/// Last non-empty path segment of `raw`, percent-decoded
pub fn filename_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let segment = url.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    Some(sanitize(&decode(segment)))
}

/// Whether `name` already carries an extension
pub fn has_extension(name: &str) -> bool {
    Path::new(name).extension().is_some_and(|ext| !ext.is_empty())
}

fn param<'a>(value: &'a str, key: &str) -> Option<&'a str> {
    value.split(';').find_map(|part| {
        let (k, v) = part.split_once('=')?;
        k.trim().eq_ignore_ascii_case(key).then(|| v.trim())
    })
}

fn extended_filename(value: &str) -> Option<String> {
    let raw = unquote(param(value, "filename*")?);
    let encoded = match raw.splitn(3, '\'').collect::<Vec<_>>().as_slice() {
        [_charset, _lang, encoded] => *encoded,
        _ => raw,
    };
    urlencoding::decode(encoded).ok().map(Cow::into_owned)
}

fn plain_filename(value: &str) -> Option<String> {
    let raw = unquote(param(value, "filename")?);
    Some(decode(raw))
}

fn unquote(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}

/// Path separators in a remote name must not create directories
fn sanitize(name: &str) -> String {
    name.trim().replace(['/', '\\'], "_")
}
