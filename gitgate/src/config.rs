use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use gitgate_common::{ExitStatusPolicy, GatewayConfig};
use tracing::*;

/// Gateway settings. Each flag falls back to its environment variable and
/// then to the built-in default.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct GatewayArgs {
    /// SSH listen port
    #[clap(long, env = "GIT_PORT")]
    pub port: Option<u16>,

    /// Host private key [default: $HOME/.ssh/id_rsa]
    #[clap(long, env = "GIT_HOST_KEY")]
    pub host_key: Option<PathBuf>,

    /// Drop connections idle for this long
    #[clap(long, env = "GIT_INACTIVITY_TIMEOUT", value_parser = humantime::parse_duration)]
    pub inactivity_timeout: Option<Duration>,

    /// Authorization service host
    #[clap(long, env = "AUTH_SERVER")]
    pub auth_server: Option<String>,

    /// Authorization service port
    #[clap(long, env = "AUTH_PORT")]
    pub auth_port: Option<u16>,

    /// Timeout for one authorization service request
    #[clap(long, env = "AUTH_TIMEOUT", value_parser = humantime::parse_duration)]
    pub auth_timeout: Option<Duration>,

    /// Directory holding the repositories
    #[clap(long, env = "GIT_SERVER_DIRECTORY")]
    pub repository_root: Option<String>,

    /// Restricted shell used to run git commands
    #[clap(long, env = "GIT_SHELL")]
    pub git_shell: Option<String>,

    /// Kill git commands running longer than this
    #[clap(long, env = "GIT_EXEC_TIMEOUT", value_parser = humantime::parse_duration)]
    pub exec_timeout: Option<Duration>,

    /// When to report the exit code of git commands to the client
    #[clap(long, env = "GIT_EXIT_STATUS_POLICY", value_enum)]
    pub exit_status_policy: Option<ExitStatusPolicy>,

    /// Log file
    #[clap(long, env = "GIT_SERVER_LOGFILE")]
    pub log_file: Option<PathBuf>,
}

pub fn load_config(args: &GatewayArgs) -> Result<GatewayConfig> {
    let mut config = GatewayConfig::default();
    let args = args.clone();

    if let Some(port) = args.port {
        config.ssh.listen = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    }
    if args.host_key.is_some() {
        config.ssh.host_key = args.host_key;
    }
    if let Some(timeout) = args.inactivity_timeout {
        config.ssh.inactivity_timeout = timeout;
    }
    if let Some(host) = args.auth_server {
        config.auth.host = host;
    }
    if let Some(port) = args.auth_port {
        config.auth.port = port;
    }
    if let Some(timeout) = args.auth_timeout {
        config.auth.timeout = timeout;
    }
    if let Some(root) = args.repository_root {
        config.git.repository_root = root;
    }
    if let Some(shell) = args.git_shell {
        config.git.shell = shell;
    }
    if let Some(timeout) = args.exec_timeout {
        config.git.exec_timeout = timeout;
    }
    if let Some(policy) = args.exit_status_policy {
        config.git.exit_status_policy = policy;
    }
    if let Some(file) = args.log_file {
        config.log.file = file;
    }

    config.auth.base_url()?;
    config.ssh.host_key_path()?;

    debug!(?config, "Loaded config");
    Ok(config)
}
