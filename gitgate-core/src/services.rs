use std::sync::Arc;

use anyhow::Result;
use gitgate_common::GatewayConfig;
use tracing::info;

use crate::{AuthService, HttpAuthClient};

/// Process-wide collaborators shared read-only by every connection.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<GatewayConfig>,
    pub auth: Arc<dyn AuthService>,
}

impl Services {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let auth = HttpAuthClient::new(&config.auth)?;
        info!(base_url = %auth.base_url(), "Using authorization service");
        Ok(Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
        })
    }
}
