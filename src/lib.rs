//! # zipreach
//!
//! A remote ZIP explorer: list and extract archive entries over HTTP
//! Range requests without downloading the whole file.
//!
//! For remote archives, the Central Directory is located and parsed using
//! only a handful of ranged reads near the tail of the file, and
//! individual entries are fetched on demand by byte range — a multi-
//! gigabyte archive can be browsed and partially extracted while
//! transferring only kilobytes. When an origin doesn't cooperate with
//! direct Range requests (CORS, no `Accept-Ranges`), a [`proxy::ProxyClient`]
//! falls back to a relay.
//!
//! ## Example
//!
//! ```no_run
//! use zipreach::ArchiveHandle;
//! use zipreach::config::PolicyConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let handle = ArchiveHandle::from_url(
//!         "https://example.com/archive.zip",
//!         None,
//!         PolicyConfig::default(),
//!     )
//!     .await?;
//!
//!     for entry in &handle.entries {
//!         println!("{}", entry.path);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod handle;
pub mod media;
pub mod proxy;
pub mod source;
pub mod zip;

pub use cli::Cli;
pub use handle::ArchiveHandle;
pub use zip::{CompressionMethod, Entry};
