use anyhow::Result;
use gitgate_common::GatewayConfig;
use gitgate_core::Services;
use gitgate_protocol_ssh::SSHProtocolServer;
use tracing::*;

pub(crate) async fn command(config: GatewayConfig) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    info!(%version, "gitgate");

    let listen = config.ssh.listen;
    let services = Services::new(config)?;
    let server = SSHProtocolServer::new(&services)?;

    if console::user_attended() {
        let config = &services.config;
        info!("--------------------------------------------");
        info!("gitgate is now running.");
        info!("Accepting SSH connections on {}", listen);
        info!("Host key: {}", server.host_public_key());
        info!("Repositories under {}", config.git.repository_root());
        info!("Exit status policy: {}", config.git.exit_status_policy);
        info!("--------------------------------------------");
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Exiting");
        }
        result = server.run(listen) => {
            if let Err(error) = result {
                error!(?error, "SSH server error");
                return Err(error);
            }
        }
    }

    Ok(())
}
