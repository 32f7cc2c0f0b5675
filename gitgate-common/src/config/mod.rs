mod defaults;

use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use defaults::*;
use url::Url;

use crate::GitgateError;

/// When the server reports the process exit code back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExitStatusPolicy {
    /// Send `exit-status` for every process that exited with a code.
    #[default]
    Always,
    /// Send `exit-status` only when the process exited with code 0.
    SuccessOnly,
}

impl ExitStatusPolicy {
    pub fn should_report(&self, code: u32) -> bool {
        match self {
            Self::Always => true,
            Self::SuccessOnly => code == 0,
        }
    }
}

impl Display for ExitStatusPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::SuccessOnly => write!(f, "success-only"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub listen: SocketAddr,

    /// `None` resolves to `$HOME/.ssh/id_rsa`.
    pub host_key: Option<PathBuf>,

    pub auth_rejection_time: Duration,

    pub inactivity_timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            listen: _default_ssh_listen(),
            host_key: None,
            auth_rejection_time: _default_auth_rejection_time(),
            inactivity_timeout: _default_inactivity_timeout(),
        }
    }
}

impl SshConfig {
    pub fn host_key_path(&self) -> Result<PathBuf, GitgateError> {
        if let Some(ref path) = self.host_key {
            return Ok(path.clone());
        }
        let home = std::env::var_os("HOME").ok_or(GitgateError::HomeUnknown)?;
        Ok(PathBuf::from(home).join(".ssh").join("id_rsa"))
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub host: String,

    pub port: u16,

    pub timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            host: _default_auth_host(),
            port: _default_auth_port(),
            timeout: _default_auth_timeout(),
        }
    }
}

impl AuthConfig {
    pub fn base_url(&self) -> Result<Url, GitgateError> {
        let url = Url::parse(&format!("http://{}:{}/", self.host, self.port))?;
        if url.host().is_none() {
            return Err(GitgateError::NoHostInUrl);
        }
        Ok(url)
    }
}

#[derive(Debug, Clone)]
pub struct GitConfig {
    pub repository_root: String,

    pub shell: String,

    pub exec_timeout: Duration,

    pub exit_status_policy: ExitStatusPolicy,
}

impl Default for GitConfig {
    fn default() -> Self {
        GitConfig {
            repository_root: _default_repository_root(),
            shell: _default_git_shell(),
            exec_timeout: _default_exec_timeout(),
            exit_status_policy: _default_exit_status_policy(),
        }
    }
}

impl GitConfig {
    /// Repository paths are built by plain concatenation, so the root
    /// always carries a trailing slash.
    pub fn repository_root(&self) -> String {
        if self.repository_root.ends_with('/') {
            self.repository_root.clone()
        } else {
            format!("{}/", self.repository_root)
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub file: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            file: _default_log_file().into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub ssh: SshConfig,
    pub auth: AuthConfig,
    pub git: GitConfig,
    pub log: LogConfig,
}
