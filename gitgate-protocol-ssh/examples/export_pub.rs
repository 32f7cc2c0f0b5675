use anyhow::{Context, Result};
use gitgate_protocol_ssh::helpers::PublicKeyAsOpenSSH;

/// Prints the OpenSSH public key line for a gateway host key.
fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: export_pub <host key path>")?;
    let key = russh::keys::load_secret_key(&path, None)
        .with_context(|| format!("Failed to load {path}"))?;
    println!("{}", key.as_openssh());
    Ok(())
}
