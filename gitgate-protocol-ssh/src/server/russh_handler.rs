use std::net::SocketAddr;
use std::sync::Arc;

use gitgate_common::{ClientIdentity, SessionId};
use gitgate_core::{AuthDecision, Services};
use russh::keys::PublicKey;
use russh::server::{Auth, Msg, Session};
use russh::Channel;
use tracing::*;

use super::session_channel::SessionChannel;
use crate::channel::ChannelHandler;
use crate::helpers::client_identity;

/// russh callbacks for one client connection.
pub struct ServerHandler {
    pub id: SessionId,
    services: Services,
    span: Span,
    identity: Option<Arc<ClientIdentity>>,
}

impl ServerHandler {
    pub fn new(id: SessionId, remote_address: SocketAddr, services: Services) -> Self {
        let client_ip = remote_address.ip().to_string();
        Self {
            id,
            services,
            span: info_span!("SSH", session=%id, session_username=field::Empty, %client_ip),
            identity: None,
        }
    }

    /// The connection span. `session_username` is filled in once the client
    /// has authenticated.
    pub fn make_logging_span(&self) -> Span {
        self.span.clone()
    }

    async fn _auth_publickey(&mut self, user: &str, key: &PublicKey) -> Auth {
        let identity = client_identity(user, key);
        info!(username = %user, fingerprint = %identity.fingerprint, "Client offers public key");

        match self.services.auth.authenticate(&identity.public_key).await {
            Ok(AuthDecision::Accepted) => {
                info!(%identity, "Authenticated");
                self.span.record("session_username", identity.username.as_str());
                self.identity = Some(Arc::new(identity));
                Auth::Accept
            }
            Ok(AuthDecision::Rejected) => {
                warn!(%identity, "Public key rejected");
                Auth::reject()
            }
            Err(error) => {
                error!(%error, "Failed to verify public key");
                Auth::reject()
            }
        }
    }

    fn _channel_open_session(&mut self, channel: Channel<Msg>, session: &mut Session) -> bool {
        let Some(identity) = self.identity.clone() else {
            warn!("Session channel requested before authentication");
            return false;
        };

        let span = info_span!(parent: &self.span, "channel", channel=%channel.id());
        let handler = ChannelHandler::new(
            identity,
            self.services.auth.clone(),
            &self.services.config.git,
        );
        let channel = SessionChannel::new(channel, session.handle());
        tokio::spawn(async move { handler.run(channel).await }.instrument(span));
        true
    }
}

impl russh::server::Handler for ServerHandler {
    type Error = anyhow::Error;

    async fn auth_publickey(&mut self, user: &str, key: &PublicKey) -> Result<Auth, Self::Error> {
        let span = self.make_logging_span();
        Ok(self._auth_publickey(user, key).instrument(span).await)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let _enter = self.make_logging_span().entered();
        Ok(self._channel_open_session(channel, session))
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let _enter = self.make_logging_span().entered();
        warn!(channel=%channel.id(), %host_to_connect, port_to_connect, "Refusing direct-tcpip channel");
        Ok(false)
    }

    async fn channel_open_x11(
        &mut self,
        channel: Channel<Msg>,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let _enter = self.make_logging_span().entered();
        warn!(channel=%channel.id(), "Refusing x11 channel");
        Ok(false)
    }

    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let _enter = self.make_logging_span().entered();
        warn!(%address, port = *port, "Refusing remote port forwarding");
        Ok(false)
    }

    async fn cancel_tcpip_forward(
        &mut self,
        _address: &str,
        _port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use gitgate_common::{ExitStatusPolicy, GatewayConfig, GitConfig};
    use gitgate_core::AuthClientError;
    use russh::client;
    use russh::keys::{PrivateKey, PrivateKeyWithHashAlg};
    use russh::{ChannelMsg, Disconnect};
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    use super::*;
    use crate::fixtures::{CLIENT_KEY, CLIENT_PUBLIC_KEY, HOST_KEY};
    use crate::server::{make_russh_config, serve};

    struct FakeAuth {
        authenticate: AuthDecision,
        authorize: AuthDecision,
        keys: Mutex<Vec<String>>,
    }

    impl FakeAuth {
        fn new(authenticate: AuthDecision, authorize: AuthDecision) -> Arc<Self> {
            Arc::new(Self {
                authenticate,
                authorize,
                keys: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl gitgate_core::AuthService for FakeAuth {
        async fn authenticate(&self, public_key: &str) -> Result<AuthDecision, AuthClientError> {
            self.keys.lock().unwrap().push(public_key.to_owned());
            Ok(self.authenticate)
        }

        async fn authorize(
            &self,
            _public_key: &str,
            _repository: &str,
        ) -> Result<AuthDecision, AuthClientError> {
            Ok(self.authorize)
        }
    }

    struct TestClient;

    impl client::Handler for TestClient {
        type Error = russh::Error;

        async fn check_server_key(&mut self, _key: &PublicKey) -> Result<bool, Self::Error> {
            Ok(true)
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Received {
        Success,
        Failure,
        Stdout(Vec<u8>),
        Stderr(Vec<u8>),
        Eof,
        ExitStatus(u32),
        Close,
    }

    /// Prints its `-c` argument to stdout and a line to stderr.
    fn fake_shell() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake-git-shell");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"#!/bin/sh\nprintf '%s\\n' \"$2\"\necho err >&2\n")
            .unwrap();
        file.sync_all().unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, path)
    }

    async fn start_gateway(auth: Arc<FakeAuth>, shell: &Path) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let mut config = GatewayConfig::default();
        config.ssh.auth_rejection_time = Duration::from_millis(10);
        config.git = GitConfig {
            repository_root: "/srv/git".into(),
            shell: shell.display().to_string(),
            exec_timeout: Duration::from_secs(10),
            exit_status_policy: ExitStatusPolicy::Always,
        };
        let russh_config =
            make_russh_config(&config.ssh, PrivateKey::from_openssh(HOST_KEY).unwrap());
        let services = Services {
            config: Arc::new(config),
            auth,
        };
        tokio::spawn(serve(services, russh_config, listener));
        address
    }

    async fn connect(address: SocketAddr) -> (client::Handle<TestClient>, bool) {
        let mut session = client::connect(Arc::new(client::Config::default()), address, TestClient)
            .await
            .unwrap();
        let key = PrivateKey::from_openssh(CLIENT_KEY).unwrap();
        let result = session
            .authenticate_publickey("git", PrivateKeyWithHashAlg::new(Arc::new(key), None))
            .await
            .unwrap();
        (session, result.success())
    }

    /// Everything the server sends on `channel` until it is gone.
    async fn receive_all(channel: &mut russh::Channel<client::Msg>) -> Vec<Received> {
        let receive = async {
            let mut received = Vec::new();
            while let Some(msg) = channel.wait().await {
                let event = match msg {
                    ChannelMsg::Success => Received::Success,
                    ChannelMsg::Failure => Received::Failure,
                    ChannelMsg::Data { data } => Received::Stdout(data.to_vec()),
                    ChannelMsg::ExtendedData { data, ext: 1 } => Received::Stderr(data.to_vec()),
                    ChannelMsg::Eof => Received::Eof,
                    ChannelMsg::ExitStatus { exit_status } => Received::ExitStatus(exit_status),
                    ChannelMsg::Close => Received::Close,
                    _ => continue,
                };
                received.push(event);
            }
            received
        };
        tokio::time::timeout(Duration::from_secs(10), receive)
            .await
            .unwrap()
    }

    fn joined(received: &[Received], pick: fn(&Received) -> Option<&Vec<u8>>) -> String {
        let bytes: Vec<u8> = received.iter().filter_map(pick).flatten().copied().collect();
        String::from_utf8(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rejected_key_fails_authentication() {
        let (_dir, shell) = fake_shell();
        let auth = FakeAuth::new(AuthDecision::Rejected, AuthDecision::Accepted);
        let address = start_gateway(auth.clone(), &shell).await;

        let (_session, authenticated) = connect(address).await;

        assert!(!authenticated);
        assert_eq!(auth.keys.lock().unwrap().clone(), vec![CLIENT_PUBLIC_KEY]);
    }

    #[tokio::test]
    async fn test_upload_pack_end_to_end() {
        let (_dir, shell) = fake_shell();
        let auth = FakeAuth::new(AuthDecision::Accepted, AuthDecision::Accepted);
        let address = start_gateway(auth, &shell).await;

        let (session, authenticated) = connect(address).await;
        assert!(authenticated);
        let mut channel = session.channel_open_session().await.unwrap();
        channel
            .exec(true, "git-upload-pack '/repo.git'")
            .await
            .unwrap();
        let received = receive_all(&mut channel).await;

        assert_eq!(
            joined(&received, |r| match r {
                Received::Stdout(data) => Some(data),
                _ => None,
            }),
            "git-upload-pack '/srv/git/repo.git'\n"
        );
        assert_eq!(
            joined(&received, |r| match r {
                Received::Stderr(data) => Some(data),
                _ => None,
            }),
            "err\n"
        );

        let control: Vec<_> = received
            .iter()
            .filter(|r| !matches!(r, Received::Stdout(_) | Received::Stderr(_)))
            .cloned()
            .collect();
        assert_eq!(
            control,
            vec![
                Received::Success,
                Received::Eof,
                Received::ExitStatus(0),
                Received::Close
            ]
        );
        let last_output = received
            .iter()
            .rposition(|r| matches!(r, Received::Stdout(_) | Received::Stderr(_)))
            .unwrap();
        let eof = received.iter().position(|r| *r == Received::Eof).unwrap();
        assert!(last_output < eof, "{received:?}");
    }

    #[tokio::test]
    async fn test_denied_repository_is_reported_on_stderr() {
        let (_dir, shell) = fake_shell();
        let auth = FakeAuth::new(AuthDecision::Accepted, AuthDecision::Rejected);
        let address = start_gateway(auth, &shell).await;

        let (session, _) = connect(address).await;
        let mut channel = session.channel_open_session().await.unwrap();
        channel
            .exec(true, "git-receive-pack '/repo.git'")
            .await
            .unwrap();

        assert_eq!(
            receive_all(&mut channel).await,
            vec![
                Received::Stderr(b"gitgate: access to repo denied\n".to_vec()),
                Received::Failure,
                Received::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_window_change_before_exec_ends_channel() {
        let (_dir, shell) = fake_shell();
        let auth = FakeAuth::new(AuthDecision::Accepted, AuthDecision::Accepted);
        let address = start_gateway(auth, &shell).await;

        let (session, _) = connect(address).await;
        let mut channel = session.channel_open_session().await.unwrap();
        channel.window_change(80, 24, 0, 0).await.unwrap();

        assert_eq!(
            receive_all(&mut channel).await,
            vec![
                Received::Stderr(b"gitgate: window-change requests are not supported\n".to_vec()),
                Received::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_direct_tcpip_is_refused() {
        let (_dir, shell) = fake_shell();
        let auth = FakeAuth::new(AuthDecision::Accepted, AuthDecision::Accepted);
        let address = start_gateway(auth, &shell).await;

        let (session, authenticated) = connect(address).await;
        assert!(authenticated);
        let result = session
            .channel_open_direct_tcpip("localhost", 22, "127.0.0.1", 40000)
            .await;

        assert!(
            matches!(result, Err(russh::Error::ChannelOpenFailure(_))),
            "{:?}",
            result.map(|channel| channel.id())
        );
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn line_containing(&self, needle: &str) -> Option<String> {
            let content = String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned();
            content
                .lines()
                .find(|line| line.contains(needle))
                .map(str::to_owned)
        }
    }

    #[tokio::test]
    async fn test_connection_log_carries_username() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (_dir, shell) = fake_shell();
        let auth = FakeAuth::new(AuthDecision::Accepted, AuthDecision::Accepted);
        let address = start_gateway(auth, &shell).await;

        let (session, authenticated) = connect(address).await;
        assert!(authenticated);
        session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .unwrap();
        drop(session);

        let mut line = None;
        for _ in 0..100 {
            line = logs.line_containing("Disconnected");
            if line.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let line = line.unwrap();
        assert!(line.contains("session_username=git"), "{line}");
    }
}
