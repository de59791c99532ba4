//! SFTP gateway and admin HTTP API over an S3-compatible bucket.
//!
//! Two frontends share one [`ossbridge_core::FsHandler`]:
//!
//! - [`sftp`] - SSH server exposing the bucket as a filesystem subsystem
//! - [`http`] - administrative REST API (list, share, delete, copy)

pub mod config;
pub mod http;
pub mod session;
pub mod sftp;

pub use config::Settings;
pub use sftp::{SftpServer, SftpServerConfig};
