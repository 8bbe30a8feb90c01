//! Command-line interface definition for zipreach.
//!
//! This module defines the CLI structure using `clap` derive macros,
//! providing a familiar interface similar to the standard `unzip` utility,
//! extended with a `serve` subcommand that starts the gateway's HTTP
//! router in-process for local testing of the MediaGateway without
//! standing up a separate `zipreach-gateway` process.

use clap::{Parser, Subcommand};

/// Command-line arguments for the zipreach utility.
#[derive(Parser, Debug)]
#[command(name = "zipreach")]
#[command(version)]
#[command(about = "A remote ZIP explorer with HTTP Range request support", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipreach data1.zip -x joe        extract all files except joe from data1.zip\n  \
  zipreach -p foo.zip | more       send contents of foo.zip via pipe into more\n  \
  zipreach -l https://example.com/archive.zip   list files from remote ZIP\n  \
  zipreach serve --bind 0.0.0.0:8080   run the proxy/gateway relay")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// ZIP file path or HTTP URL.
    ///
    /// Required unless a subcommand is given. Can be either a local
    /// filesystem path or an HTTP/HTTPS URL; an HTTP(S) URL is opened
    /// with Range requests via [`crate::handle::ArchiveHandle::from_url`].
    #[arg(value_name = "FILE")]
    pub file: Option<String>,

    /// Files to extract (default: all).
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format).
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely/show version info.
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages.
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir.
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow.
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files.
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting.
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories).
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter).
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Proxy relay base URL to fall back on when the origin refuses
    /// direct Range requests.
    #[arg(long = "proxy", env = "ZIPREACH_PROXY_BASE")]
    pub proxy_base: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the proxy/gateway relay (`ProxyClient` relay + MediaGateway).
    Serve(ServeArgs),
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "ZIPREACH_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Maximum payload size the relay will forward before rejecting with
    /// 413, in bytes.
    #[arg(long, env = "ZIPREACH_MAX_RESPONSE_BYTES")]
    pub max_response_bytes: Option<u64>,
}

impl Cli {
    /// Check if the input file is an HTTP/HTTPS URL.
    pub fn is_http_url(&self) -> bool {
        self.file
            .as_deref()
            .is_some_and(|f| f.starts_with("http://") || f.starts_with("https://"))
    }

    /// Check if quiet mode is enabled.
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    /// Check if very quiet mode is enabled.
    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }
}
