//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use unimi_dl::platform::Platform;

/// Environment variable holding the account password.
pub const PASSWORD_ENV: &str = "UNIMI_DL_PASSWORD";

/// Download videos and documents from Ariel courses.
///
/// Already downloaded material is remembered in a ledger, so running the
/// same command again only fetches what is new. The password is read from
/// the UNIMI_DL_PASSWORD environment variable.
#[derive(Parser, Debug)]
#[command(name = "unimi-dl")]
#[command(author, version, about)]
pub struct Args {
    /// Platform to download from (only ariel supports course browsing)
    #[arg(short, long, value_enum, default_value_t = Platform::Ariel)]
    pub platform: Platform,

    /// Login email (overrides the config file)
    #[arg(short, long)]
    pub email: Option<String>,

    /// Download directory (overrides the config file)
    #[arg(short, long = "output", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only courses whose name contains this text (case-insensitive)
    #[arg(long, value_name = "FILTER")]
    pub course: Option<String>,

    /// Only sections whose name contains this text (case-insensitive)
    #[arg(long, value_name = "FILTER")]
    pub section: Option<String>,

    /// Print the selected courses and their attachments, then exit
    #[arg(long)]
    pub list: bool,

    /// Resolve everything and report what would be downloaded, without
    /// downloading or touching the ledger
    #[arg(long, conflicts_with = "add_to_downloaded_only")]
    pub simulate: bool,

    /// Mark the selected attachments as downloaded without fetching them
    #[arg(long)]
    pub add_to_downloaded_only: bool,

    /// Download even if the ledger says an attachment was already fetched
    #[arg(long)]
    pub force: bool,

    /// Remove a url from the ledger and exit
    #[arg(long, value_name = "URL", conflicts_with_all = ["list", "simulate", "add_to_downloaded_only", "show_downloaded"])]
    pub forget: Option<String>,

    /// Print the urls recorded in the ledger for the platform and exit
    #[arg(long, conflicts_with_all = ["list", "simulate", "add_to_downloaded_only"])]
    pub show_downloaded: bool,

    /// Config file (default: $XDG_CONFIG_HOME/unimi-dl/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Log filter used when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn,unimi_dl=info",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Whether this invocation needs to log in.
    #[must_use]
    pub fn needs_session(&self) -> bool {
        self.forget.is_none() && !self.show_downloaded
    }
}
