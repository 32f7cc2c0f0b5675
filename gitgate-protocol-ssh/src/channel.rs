//! Per-channel request handling.
//!
//! A session channel may set environment variables (acknowledged, never
//! applied) and then issue exactly one `exec`. Everything else ends the
//! channel. The channel is always closed when [ChannelHandler::run] returns.

use std::sync::Arc;

use async_trait::async_trait;
use gitgate_common::{ClientIdentity, ExitStatusPolicy, GitConfig};
use gitgate_core::{AuthDecision, AuthService, PipeEngine, ProcessExit};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::*;

use crate::command::GitCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequest {
    Env {
        name: String,
        value: String,
        want_reply: bool,
    },
    Shell {
        want_reply: bool,
    },
    Exec {
        command: String,
        want_reply: bool,
    },
    Other {
        name: String,
        want_reply: bool,
    },
}

/// Data streams of a channel, handed to the process while it runs.
pub struct ChannelStreams<'a> {
    pub stdin: Box<dyn AsyncRead + Send + Unpin + 'a>,
    pub stdout: Box<dyn AsyncWrite + Send + Unpin + 'a>,
    pub stderr: Box<dyn AsyncWrite + Send + Unpin + 'a>,
}

#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("SSH: {0}")]
    Russh(#[from] russh::Error),
    #[error("session is gone")]
    SessionClosed,
}

/// The SSH channel operations the handler depends on.
#[async_trait]
pub trait RequestChannel: Send {
    /// Next channel request, or `None` once the client has closed the channel.
    async fn next_request(&mut self) -> Option<ChannelRequest>;

    async fn reply(&mut self, success: bool) -> Result<(), ChannelError>;

    async fn write_stderr(&mut self, data: &[u8]) -> Result<(), ChannelError>;

    fn streams(&mut self) -> ChannelStreams<'_>;

    async fn eof(&mut self) -> Result<(), ChannelError>;

    async fn exit_status(&mut self, code: u32) -> Result<(), ChannelError>;

    async fn close(&mut self) -> Result<(), ChannelError>;
}

pub struct ChannelHandler {
    identity: Arc<ClientIdentity>,
    auth: Arc<dyn AuthService>,
    shell: String,
    repository_root: String,
    exit_status_policy: ExitStatusPolicy,
    engine: PipeEngine,
}

impl ChannelHandler {
    pub fn new(
        identity: Arc<ClientIdentity>,
        auth: Arc<dyn AuthService>,
        git: &GitConfig,
    ) -> Self {
        Self {
            identity,
            auth,
            shell: git.shell.clone(),
            repository_root: git.repository_root(),
            exit_status_policy: git.exit_status_policy,
            engine: PipeEngine::new(git.exec_timeout),
        }
    }

    pub async fn run<C: RequestChannel>(&self, mut channel: C) {
        if let Err(error) = self.serve(&mut channel).await {
            warn!(%error, "Channel failed");
        }
        if let Err(error) = channel.close().await {
            debug!(%error, "Failed to close channel");
        }
        debug!("Closed");
    }

    async fn serve<C: RequestChannel>(&self, channel: &mut C) -> Result<(), ChannelError> {
        while let Some(request) = channel.next_request().await {
            match request {
                ChannelRequest::Env {
                    name,
                    value,
                    want_reply,
                } => {
                    debug!(%name, %value, "Ignoring environment variable");
                    if want_reply {
                        channel.reply(true).await?;
                    }
                }
                ChannelRequest::Exec {
                    command,
                    want_reply,
                } => {
                    return self.exec(channel, &command, want_reply).await;
                }
                ChannelRequest::Shell { want_reply } => {
                    info!("Refusing shell request");
                    return refuse(channel, want_reply, "interactive shells are not supported")
                        .await;
                }
                ChannelRequest::Other { name, want_reply } => {
                    info!(%name, "Refusing channel request");
                    return refuse(
                        channel,
                        want_reply,
                        &format!("{name} requests are not supported"),
                    )
                    .await;
                }
            }
        }
        debug!("Client closed the channel before exec");
        Ok(())
    }

    async fn exec<C: RequestChannel>(
        &self,
        channel: &mut C,
        command: &str,
        want_reply: bool,
    ) -> Result<(), ChannelError> {
        info!(%command, "Exec requested");

        let command = match GitCommand::parse(command) {
            Ok(command) => command,
            Err(error) => {
                warn!(%error, "Refusing command");
                return refuse(channel, want_reply, &error.to_string()).await;
            }
        };

        let project = command.project_name();
        match self
            .auth
            .authorize(&self.identity.public_key, &project)
            .await
        {
            Ok(AuthDecision::Accepted) => {
                info!(%project, verb = %command.verb, "Access granted");
            }
            Ok(AuthDecision::Rejected) => {
                warn!(%project, verb = %command.verb, "Access denied");
                return refuse(
                    channel,
                    want_reply,
                    &format!("access to {project} denied"),
                )
                .await;
            }
            Err(error) => {
                error!(%project, %error, "Authorization failed");
                return refuse(
                    channel,
                    want_reply,
                    &format!("could not authorize access to {project}"),
                )
                .await;
            }
        }

        if want_reply {
            channel.reply(true).await?;
        }

        let process = command.to_process(&self.shell, &self.repository_root);
        let result = {
            let streams = channel.streams();
            self.engine
                .run(process, streams.stdin, streams.stdout, streams.stderr)
                .await
        };

        let exit = match result {
            Ok(exit) => exit,
            Err(error) => {
                error!(%error, "Process failed");
                channel
                    .write_stderr(format!("gitgate: {} failed\n", command.verb).as_bytes())
                    .await?;
                return Ok(());
            }
        };

        if let Err(error) = channel.eof().await {
            warn!(%error, "Failed to send EOF");
        }

        match exit {
            ProcessExit::Exited(code) if self.exit_status_policy.should_report(code) => {
                info!(code, "Process exited");
                if let Err(error) = channel.exit_status(code).await {
                    warn!(%error, "Failed to send exit status");
                }
            }
            ProcessExit::Exited(code) => {
                info!(
                    code,
                    policy = %self.exit_status_policy,
                    "Process exited, not reporting status"
                );
            }
            ProcessExit::Terminated { .. } => {
                warn!(%exit, "Process ended without exit code");
            }
        }
        Ok(())
    }
}

async fn refuse<C: RequestChannel>(
    channel: &mut C,
    want_reply: bool,
    message: &str,
) -> Result<(), ChannelError> {
    channel
        .write_stderr(format!("gitgate: {message}\n").as_bytes())
        .await?;
    if want_reply {
        channel.reply(false).await?;
    }
    Ok(())
}
