use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(about = "Move files between URLs, local folders and storages", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to $FERRY_CONFIG or config/ferry.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print a JSON summary to stdout when the run ends
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download direct links into a storage
    Fetch(FetchArgs),
    /// Upload a local directory tree into a storage
    Import(ImportArgs),
    /// Copy a directory tree from one storage to another
    Transfer(TransferArgs),
    /// Print the effective configuration
    Config,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// URLs to download
    #[arg(required = true, num_args = 1..)]
    pub urls: Vec<String>,

    /// Target storage name
    #[arg(long)]
    pub storage: String,

    /// Directory inside the target storage
    #[arg(long, default_value = "")]
    pub dir: String,

    /// Skip failed links instead of aborting the whole batch
    #[arg(long)]
    pub ignore_errors: bool,
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Local directory to upload
    pub local_dir: PathBuf,

    /// Target storage name
    #[arg(long)]
    pub storage: String,

    /// Directory inside the target storage
    #[arg(long, default_value = "")]
    pub dir: String,

    #[arg(long)]
    pub ignore_errors: bool,
}

#[derive(clap::Args, Debug)]
pub struct TransferArgs {
    /// Source storage name
    #[arg(long)]
    pub from: String,

    /// Directory inside the source storage
    #[arg(long, default_value = "")]
    pub src: String,

    /// Target storage name
    #[arg(long)]
    pub to: String,

    /// Directory inside the target storage
    #[arg(long, default_value = "")]
    pub dir: String,

    #[arg(long)]
    pub ignore_errors: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from([
            "ferry",
            "fetch",
            "https://example.com/a.zip",
            "https://example.com/b.zip",
            "--storage",
            "disk",
            "--dir",
            "downloads",
            "--ignore-errors",
        ])
        .unwrap();

        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.urls.len(), 2);
                assert_eq!(args.storage, "disk");
                assert_eq!(args.dir, "downloads");
                assert!(args.ignore_errors);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_fetch_requires_url() {
        assert!(Cli::try_parse_from(["ferry", "fetch", "--storage", "disk"]).is_err());
    }

    #[test]
    fn test_parse_transfer_with_config() {
        let cli = Cli::try_parse_from([
            "ferry", "transfer", "--from", "s3", "--src", "photos", "--to", "disk", "--config",
            "ferry.toml",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("ferry.toml")));
        assert!(cli.json);
        match cli.command {
            Commands::Transfer(args) => {
                assert_eq!(args.from, "s3");
                assert_eq!(args.src, "photos");
                assert_eq!(args.to, "disk");
                assert_eq!(args.dir, "");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
