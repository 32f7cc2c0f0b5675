use async_trait::async_trait;
use russh::server::{Handle, Msg};
use russh::{Channel, ChannelMsg};
use tracing::*;

use crate::channel::{ChannelError, ChannelRequest, ChannelStreams, RequestChannel};

const STDERR: u32 = 1;

/// A russh session channel seen as a [RequestChannel].
pub struct SessionChannel {
    channel: Channel<Msg>,
    handle: Handle,
}

impl SessionChannel {
    pub fn new(channel: Channel<Msg>, handle: Handle) -> Self {
        Self { channel, handle }
    }
}

#[async_trait]
impl RequestChannel for SessionChannel {
    async fn next_request(&mut self) -> Option<ChannelRequest> {
        loop {
            let request = match self.channel.wait().await? {
                ChannelMsg::Exec {
                    want_reply,
                    command,
                } => ChannelRequest::Exec {
                    command: String::from_utf8_lossy(&command).into_owned(),
                    want_reply,
                },
                ChannelMsg::SetEnv {
                    want_reply,
                    variable_name,
                    variable_value,
                } => ChannelRequest::Env {
                    name: variable_name,
                    value: variable_value,
                    want_reply,
                },
                ChannelMsg::RequestShell { want_reply } => ChannelRequest::Shell { want_reply },
                ChannelMsg::RequestPty { want_reply, .. } => ChannelRequest::Other {
                    name: "pty-req".into(),
                    want_reply,
                },
                ChannelMsg::RequestSubsystem { want_reply, name } => ChannelRequest::Other {
                    name: format!("subsystem {name}"),
                    want_reply,
                },
                ChannelMsg::RequestX11 { want_reply, .. } => ChannelRequest::Other {
                    name: "x11-req".into(),
                    want_reply,
                },
                ChannelMsg::AgentForward { want_reply } => ChannelRequest::Other {
                    name: "auth-agent-req".into(),
                    want_reply,
                },
                ChannelMsg::WindowChange { .. } => ChannelRequest::Other {
                    name: "window-change".into(),
                    want_reply: false,
                },
                ChannelMsg::Signal { .. } => ChannelRequest::Other {
                    name: "signal".into(),
                    want_reply: false,
                },
                ChannelMsg::Close => return None,
                // Data, EOF and window adjustments are not requests.
                msg => {
                    trace!(?msg, "Ignoring message before exec");
                    continue;
                }
            };
            return Some(request);
        }
    }

    async fn reply(&mut self, success: bool) -> Result<(), ChannelError> {
        let id = self.channel.id();
        let result = if success {
            self.handle.channel_success(id).await
        } else {
            self.handle.channel_failure(id).await
        };
        result.map_err(|_| ChannelError::SessionClosed)
    }

    async fn write_stderr(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.channel.extended_data(STDERR, data).await?;
        Ok(())
    }

    fn streams(&mut self) -> ChannelStreams<'_> {
        let stdout = self.channel.make_writer();
        let stderr = self.channel.make_writer_ext(Some(STDERR));
        ChannelStreams {
            stdin: Box::new(self.channel.make_reader()),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        }
    }

    async fn eof(&mut self) -> Result<(), ChannelError> {
        self.channel.eof().await?;
        Ok(())
    }

    async fn exit_status(&mut self, code: u32) -> Result<(), ChannelError> {
        self.channel.exit_status(code).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.channel.close().await?;
        Ok(())
    }
}
