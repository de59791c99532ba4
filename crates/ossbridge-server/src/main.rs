//! ossbridge binary
//!
//! Serves one S3-compatible bucket over two frontends: an SFTP subsystem
//! for file transfer clients and an HTTP API for administration.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ossbridge_core::{FsHandler, S3Store};
use ossbridge_server::{Settings, SftpServer, SftpServerConfig};
use russh::keys::PrivateKey;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let file_appender = tracing_appender::rolling::daily(&settings.log_dir, "ossbridge.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    let host_key = match &settings.host_key {
        Some(path) => russh::keys::load_secret_key(path, None)
            .with_context(|| format!("failed to load host key {}", path.display()))?,
        None => {
            warn!("no host key configured, clients will see a fresh host identity");
            PrivateKey::random(&mut rand::thread_rng(), russh::keys::Algorithm::Ed25519)
                .context("failed to generate host key")?
        }
    };

    let store = Arc::new(S3Store::connect(settings.s3_config()).await);
    let fs = Arc::new(FsHandler::new(store));

    let sftp_config = SftpServerConfig {
        bind_addr: settings.sftp_addr()?,
        host_key,
        user: settings.user.clone(),
        password: settings.password.clone(),
    };
    let sftp = SftpServer::new(sftp_config, Arc::clone(&fs));
    let http_addr = settings.http_addr()?;

    tokio::select! {
        result = sftp.run() => result.context("sftp server exited")?,
        result = ossbridge_server::http::serve(http_addr, fs) => result.context("admin api exited")?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    Ok(())
}
