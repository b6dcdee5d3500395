use clap::{ArgAction, Parser};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "emblem",
    version,
    about = "Name and catalog the icons embedded in a slide deck"
)]
pub struct Cli {
    /// Presentation id, or a path to a local `.json` manifest of icon URLs.
    #[arg(value_name = "SOURCE")]
    pub source: String,
    /// Output directory; also the object prefix when a bucket is configured.
    #[arg(value_name = "OUTPUT")]
    pub output: String,
    /// Classifier model override.
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,
    /// Upload assets and the final catalog to this Cloud Storage bucket.
    #[arg(long, value_name = "BUCKET")]
    pub bucket: Option<String>,
    /// Print the checkpoint state of OUTPUT and exit without processing.
    #[arg(long)]
    pub dry_status: bool,
    /// Increase logging verbosity (-v, -vv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
