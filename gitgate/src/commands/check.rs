use anyhow::Result;
use gitgate_common::GatewayConfig;
use gitgate_core::Services;
use gitgate_protocol_ssh::SSHProtocolServer;
use tracing::*;

pub(crate) async fn command(config: GatewayConfig) -> Result<()> {
    let services = Services::new(config)?;
    let server = SSHProtocolServer::new(&services)?;

    let config = &services.config;
    println!("listen:             {}", config.ssh.listen);
    println!("host key:           {}", server.host_public_key());
    println!("auth service:       {}", config.auth.base_url()?);
    println!("repository root:    {}", config.git.repository_root());
    println!("git shell:          {}", config.git.shell);
    println!("exit status policy: {}", config.git.exit_status_policy);
    println!("log file:           {}", config.log.file.display());

    info!("No problems found");
    Ok(())
}
