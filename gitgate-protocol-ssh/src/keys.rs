use anyhow::{Context, Result};
use gitgate_common::SshConfig;
use russh::keys::{load_secret_key, PrivateKey};
use tracing::*;

use crate::helpers::PublicKeyAsOpenSSH;

pub fn load_host_key(config: &SshConfig) -> Result<PrivateKey> {
    let path = config.host_key_path()?;
    let key = load_secret_key(&path, None)
        .with_context(|| format!("Failed to load host key from {}", path.display()))?;
    info!(path = %path.display(), key = %key.as_openssh(), "Loaded host key");
    Ok(key)
}
