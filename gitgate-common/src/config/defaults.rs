use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::ExitStatusPolicy;

pub(crate) const fn _default_ssh_port() -> u16 {
    22
}

pub(crate) const fn _default_auth_port() -> u16 {
    3000
}

#[inline]
pub(crate) fn _default_ssh_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, _default_ssh_port()))
}

#[inline]
pub(crate) fn _default_auth_host() -> String {
    "127.0.0.1".to_owned()
}

#[inline]
pub(crate) fn _default_repository_root() -> String {
    "/tmp/".to_owned()
}

#[inline]
pub(crate) fn _default_git_shell() -> String {
    "git-shell".to_owned()
}

#[inline]
pub(crate) fn _default_log_file() -> String {
    "/tmp/git_server.log".to_owned()
}

#[inline]
pub(crate) fn _default_auth_rejection_time() -> Duration {
    Duration::from_secs(1)
}

#[inline]
pub(crate) fn _default_inactivity_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

#[inline]
pub(crate) fn _default_auth_timeout() -> Duration {
    Duration::from_secs(10)
}

#[inline]
pub(crate) fn _default_exec_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

#[inline]
pub(crate) fn _default_exit_status_policy() -> ExitStatusPolicy {
    ExitStatusPolicy::Always
}
