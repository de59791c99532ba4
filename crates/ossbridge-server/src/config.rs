//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ossbridge_core::S3Config;

/// Gateway settings, from flags or the environment.
#[derive(Debug, Parser)]
#[command(name = "ossbridge", version, about = "SFTP gateway for an S3-compatible bucket")]
pub struct Settings {
    /// Address the SFTP listener binds to.
    #[arg(long, env = "OSSBRIDGE_SFTP_HOST", default_value = "0.0.0.0")]
    pub sftp_host: String,

    /// Port the SFTP listener binds to.
    #[arg(long, env = "OSSBRIDGE_SFTP_PORT", default_value_t = 2022)]
    pub sftp_port: u16,

    /// Path to an OpenSSH-format host key. An ephemeral key is generated
    /// when unset, so clients see a new host identity on every start.
    #[arg(long, env = "OSSBRIDGE_HOST_KEY")]
    pub host_key: Option<PathBuf>,

    /// Username accepted by password authentication.
    #[arg(long, env = "OSSBRIDGE_USER", default_value = "testuser")]
    pub user: String,

    /// Password accepted for that user.
    #[arg(long, env = "OSSBRIDGE_PASSWORD", default_value = "tiger")]
    pub password: String,

    /// Address the admin HTTP API binds to.
    #[arg(long, env = "OSSBRIDGE_HTTP_HOST", default_value = "0.0.0.0")]
    pub http_host: String,

    /// Port the admin HTTP API binds to.
    #[arg(long, env = "OSSBRIDGE_HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// Object store region.
    #[arg(long, env = "OSSBRIDGE_S3_REGION", default_value = "cn-hangzhou")]
    pub s3_region: String,

    /// Object store endpoint URL.
    #[arg(long, env = "OSSBRIDGE_S3_ENDPOINT")]
    pub s3_endpoint: String,

    /// Bucket served by the gateway.
    #[arg(long, env = "OSSBRIDGE_S3_BUCKET")]
    pub s3_bucket: String,

    /// Object store access key id.
    #[arg(long, env = "AK_ID", hide_env_values = true)]
    pub access_key_id: String,

    /// Object store access key secret.
    #[arg(long, env = "AK_SECRET", hide_env_values = true)]
    pub access_key_secret: String,

    /// Directory for rotated log files.
    #[arg(long, env = "OSSBRIDGE_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Default log filter, overridden by RUST_LOG when set.
    #[arg(long, env = "OSSBRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Settings {
    pub fn sftp_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip = self
            .sftp_host
            .parse()
            .with_context(|| format!("invalid sftp host {:?}", self.sftp_host))?;
        Ok(SocketAddr::new(ip, self.sftp_port))
    }

    pub fn http_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip = self
            .http_host
            .parse()
            .with_context(|| format!("invalid http host {:?}", self.http_host))?;
        Ok(SocketAddr::new(ip, self.http_port))
    }

    pub fn s3_config(&self) -> S3Config {
        S3Config {
            region: self.s3_region.clone(),
            endpoint: self.s3_endpoint.clone(),
            bucket: self.s3_bucket.clone(),
            access_key_id: self.access_key_id.clone(),
            access_key_secret: self.access_key_secret.clone(),
        }
    }
}
