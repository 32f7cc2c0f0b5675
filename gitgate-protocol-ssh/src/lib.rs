mod channel;
mod command;
#[cfg(test)]
mod fixtures;
pub mod helpers;
mod keys;
mod server;
use std::fmt::Debug;
use std::net::SocketAddr;

use anyhow::Result;
pub use channel::*;
pub use command::*;
use gitgate_core::Services;
pub use keys::*;
use russh::keys::PrivateKey;
pub use server::{make_russh_config, run_server, serve, ServerHandler, SessionChannel};

use crate::helpers::PublicKeyAsOpenSSH;

/// The SSH side of the gateway: host key plus the shared services.
#[derive(Clone)]
pub struct SSHProtocolServer {
    services: Services,
    host_key: PrivateKey,
}

impl SSHProtocolServer {
    pub fn new(services: &Services) -> Result<Self> {
        let host_key = load_host_key(&services.config.ssh)?;
        Ok(SSHProtocolServer {
            services: services.clone(),
            host_key,
        })
    }

    pub fn host_public_key(&self) -> String {
        self.host_key.as_openssh()
    }

    pub async fn run(self, address: SocketAddr) -> Result<()> {
        let config = make_russh_config(&self.services.config.ssh, self.host_key);
        run_server(self.services, config, address).await
    }
}

impl Debug for SSHProtocolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSHProtocolServer")
    }
}
