//! SeqPort Client Library
//!
//! Client for the SeqPort sequencing platform: authenticated resource
//! queries, result downloads, and a concurrent presigned-URL upload pipeline
//! for raw input files.
//!
//! # Example
//!
//! ```no_run
//! use seqport::config::ClientConfig;
//! use seqport::upload::{upload_files, UploadOptions};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::from_env()?;
//!     let credentials = seqport::auth::load()?;
//!     let files = vec![PathBuf::from("reads.fastq")];
//!     let report = upload_files(&config, &credentials, &files, UploadOptions::default()).await?;
//!     assert!(report.all_succeeded());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod upload;

// Re-export commonly used types
pub use auth::Credentials;
pub use config::ClientConfig;
pub use upload::{UploadError, UploadReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
