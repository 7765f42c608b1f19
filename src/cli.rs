use clap::Parser;
use tracing::Level;

use crate::vdrv::ExtractOptions;

#[derive(Parser, Debug)]
#[command(name = "vdrv-unpack")]
#[command(version)]
#[command(about = "Unpacker for VDRV drive archives, local or over HTTP", long_about = None)]
#[command(after_help = "Examples:\n  \
  vdrv-unpack DATA.VDRV out              unpack every root folder into out/\n  \
  vdrv-unpack -l DATA.VDRV               list the archive tree\n  \
  vdrv-unpack -j 8 https://example.com/DATA.VDRV out   unpack a remote drive with 8 workers")]
pub struct Cli {
    /// VDRV file path or HTTP URL
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Destination folder
    #[arg(value_name = "DEST", default_value = ".")]
    pub dest: String,

    /// List entries instead of extracting
    #[arg(short = 'l')]
    pub list: bool,

    /// Verbose logging; with -l show a detailed table
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Quiet mode, only warnings and errors
    #[arg(short = 'q')]
    pub quiet: bool,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Number of files to extract concurrently
    #[arg(short = 'j', value_name = "N", default_value_t = 1)]
    pub jobs: usize,

    /// Abort if the directory tree is inconsistent
    #[arg(long)]
    pub strict: bool,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }

    pub fn log_level(&self) -> Level {
        if self.quiet {
            Level::WARN
        } else if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            overwrite: !self.never_overwrite,
            jobs: self.jobs.max(1),
        }
    }
}
