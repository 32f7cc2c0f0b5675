mod russh_handler;
mod session_channel;

use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gitgate_common::SshConfig;
use gitgate_core::Services;
use russh::keys::PrivateKey;
use russh::{MethodKind, MethodSet};
pub use russh_handler::ServerHandler;
pub use session_channel::SessionChannel;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::*;
use uuid::Uuid;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub fn make_russh_config(config: &SshConfig, host_key: PrivateKey) -> russh::server::Config {
    let mut methods = MethodSet::empty();
    methods.push(MethodKind::PublicKey);

    russh::server::Config {
        auth_rejection_time: config.auth_rejection_time,
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        inactivity_timeout: Some(config.inactivity_timeout),
        methods,
        keys: vec![host_key],
        ..Default::default()
    }
}

pub async fn run_server(
    services: Services,
    config: russh::server::Config,
    address: SocketAddr,
) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!(?address, "Listening");
    serve(services, config, listener).await
}

/// Accepts connections forever. Accept errors are logged and retried.
pub async fn serve(
    services: Services,
    config: russh::server::Config,
    listener: TcpListener,
) -> Result<()> {
    let config = Arc::new(config);
    loop {
        let (socket, remote_address) = match listener.accept().await {
            Ok(x) => x,
            Err(error) => {
                error!(%error, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let id = Uuid::new_v4();
        let handler = ServerHandler::new(id, remote_address, services.clone());
        let span = handler.make_logging_span();
        let config = config.clone();

        tokio::spawn(
            async move {
                info!("Connected");
                if let Err(error) = _run_stream(config, socket, handler).await {
                    warn!(%error, "Session ended with error");
                }
                info!("Disconnected");
            }
            .instrument(span),
        );
    }
}

async fn _run_stream<R>(
    config: Arc<russh::server::Config>,
    socket: R,
    handler: ServerHandler,
) -> Result<()>
where
    R: AsyncRead + AsyncWrite + Unpin + Debug + Send + 'static,
{
    let session = russh::server::run_stream(config, socket, handler).await?;
    session.await?;
    Ok(())
}
