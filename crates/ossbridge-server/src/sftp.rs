//! SSH server exposing the bucket through the sftp subsystem.
//!
//! Accepts password-authenticated connections and runs one protocol
//! session per subsystem request, all sharing the same operation handler.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use ossbridge_core::FsHandler;
use russh::keys::PrivateKey;
use russh::server::{self, Auth, Msg, Server as _, Session};
use russh::{Channel, ChannelId};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::session::SftpSession;

/// SFTP server configuration
#[derive(Clone)]
pub struct SftpServerConfig {
    pub bind_addr: SocketAddr,
    pub host_key: PrivateKey,
    pub user: String,
    pub password: String,
}

impl SftpServerConfig {
    /// Create config with an ephemeral key (for testing)
    pub fn ephemeral(port: u16, user: impl Into<String>, password: impl Into<String>) -> Self {
        let host_key = PrivateKey::random(&mut rand::thread_rng(), russh::keys::Algorithm::Ed25519)
            .expect("Failed to generate host key");
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], port)),
            host_key,
            user: user.into(),
            password: password.into(),
        }
    }
}

/// SFTP server
pub struct SftpServer {
    config: SftpServerConfig,
    fs: Arc<FsHandler>,
}

impl SftpServer {
    pub fn new(config: SftpServerConfig, fs: Arc<FsHandler>) -> Self {
        Self { config, fs }
    }

    /// Run the SFTP server
    pub async fn run(&self) -> Result<(), std::io::Error> {
        let config = russh::server::Config {
            auth_rejection_time: std::time::Duration::from_secs(1),
            auth_rejection_time_initial: Some(std::time::Duration::from_secs(0)),
            keys: vec![self.config.host_key.clone()],
            ..Default::default()
        };

        info!("starting sftp server on {}", self.config.bind_addr);

        let mut server = Server {
            fs: Arc::clone(&self.fs),
            user: self.config.user.clone(),
            password: self.config.password.clone(),
        };
        let socket = TcpListener::bind(self.config.bind_addr).await?;

        server
            .run_on_socket(Arc::new(config), &socket)
            .await
            .map_err(std::io::Error::other)
    }
}

/// Server factory - creates handlers for each connection
struct Server {
    fs: Arc<FsHandler>,
    user: String,
    password: String,
}

impl server::Server for Server {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        debug!(?peer_addr, "new connection");
        ConnectionHandler {
            fs: Arc::clone(&self.fs),
            user: self.user.clone(),
            password: self.password.clone(),
            channels: HashMap::new(),
        }
    }

    fn handle_session_error(&mut self, error: <Self::Handler as server::Handler>::Error) {
        error!("session error: {:?}", error);
    }
}

/// Handler for a single SSH connection
struct ConnectionHandler {
    fs: Arc<FsHandler>,
    user: String,
    password: String,
    /// Opened channels, parked until a subsystem request claims them.
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl server::Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == self.user && password == self.password {
            info!(%user, "password auth accepted");
            Ok(Auth::Accept)
        } else {
            warn!(%user, "password auth rejected");
            Ok(Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!("channel {} opened", channel.id());
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name == "sftp" {
            if let Some(channel) = self.channels.remove(&channel_id) {
                info!("sftp subsystem started on channel {channel_id}");
                session.channel_success(channel_id)?;
                let handler = SftpSession::new(Arc::clone(&self.fs));
                tokio::spawn(russh_sftp::server::run(channel.into_stream(), handler));
                return Ok(());
            }
        }
        warn!(%name, "unsupported subsystem request");
        session.channel_failure(channel_id)?;
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!("channel {} closed", channel);
        self.channels.remove(&channel);
        Ok(())
    }
}
