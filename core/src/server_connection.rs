//! Server-to-server linkage
//!
//! Outbound connection attempts with retry timers, the connect-vs-timeout
//! race, per-name connection tracking, cancellation, and reconnection on
//! loss. For each target name at most one retry timer, one in-flight
//! attempt, and one unregistered connection exist at a time; all three
//! tables are keyed by lowercased server name.

use crate::{Config, Database, Error, Message, MessageType, Result, Server};
use dashmap::DashMap;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long a connect attempt may take before the timeout future wins
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Link protocol spoken toward a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkProtocol {
    Jelp,
    Ts6,
}

impl LinkProtocol {
    /// Resolve a configured protocol tag; unknown tags fall back to jelp
    pub fn from_config(tag: Option<&str>) -> Self {
        match tag {
            Some("ts6") => LinkProtocol::Ts6,
            Some("jelp") | None => LinkProtocol::Jelp,
            Some(other) => {
                tracing::warn!("Unknown link protocol {:?}, defaulting to jelp", other);
                LinkProtocol::Jelp
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LinkProtocol::Jelp => "jelp",
            LinkProtocol::Ts6 => "ts6",
        }
    }
}

/// Cross-component linkage signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// An outbound attempt failed; retried by the timer if one is armed
    ConnectFail { name: String, reason: String },
    /// A socket is up and the protocol layer should take over
    Established { name: String, protocol: LinkProtocol },
}

/// Server connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerConnectionState {
    /// Socket up, registration not complete
    Connected,
    /// Server registered
    Registered,
    /// Connection lost
    Disconnected,
}

/// A server connection
#[derive(Debug)]
pub struct ServerConnection {
    /// Connection ID
    pub id: Uuid,
    /// Registered server name, once known
    pub name: Option<String>,
    /// The name we dialed out to
    pub want: Option<String>,
    /// Whether we initiated this connection
    pub i_initiated: bool,
    /// Suppress reconnection when this connection closes
    pub dont_reconnect: bool,
    /// Connection state
    pub state: ServerConnectionState,
    /// Message sender toward the peer
    pub sender: mpsc::UnboundedSender<Message>,
}

impl ServerConnection {
    /// Create an outbound connection record
    pub fn outbound(want: &str, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            want: Some(want.to_string()),
            i_initiated: true,
            dont_reconnect: false,
            state: ServerConnectionState::Connected,
            sender,
        }
    }

    /// Send a message to the peer
    pub fn send(&self, message: Message) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| Error::Connection("Server send queue closed".to_string()))?;
        Ok(())
    }
}

/// Manager of outbound linkage: retry timers, in-flight attempts, pending
/// and registered connections.
#[derive(Debug)]
pub struct ServerConnectionManager {
    config: Arc<Config>,
    pool: Arc<Database>,
    /// Autoconnect timers by lowercased target name
    timers: DashMap<String, JoinHandle<()>>,
    /// In-flight connect attempts by lowercased target name
    futures: DashMap<String, JoinHandle<()>>,
    /// Established but unregistered connections by lowercased target name
    conns: DashMap<String, ServerConnection>,
    /// Registered peer connections by lowercased server name
    links: DashMap<String, ServerConnection>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl ServerConnectionManager {
    /// Create a manager. The returned receiver carries linkage events.
    pub fn new(
        config: Arc<Config>,
        pool: Arc<Database>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                config,
                pool,
                timers: DashMap::new(),
                futures: DashMap::new(),
                conns: DashMap::new(),
                links: DashMap::new(),
                events,
            }),
            receiver,
        )
    }

    /// Start connecting to a configured server. With `auto_only`, only
    /// links with autoconnect enabled are attempted. Fails fast with a
    /// human-readable reason when nothing was started.
    pub fn connect_server(self: &Arc<Self>, name: &str, auto_only: bool) -> Result<()> {
        let key = name.to_lowercase();

        if self.pool.lookup_server(name).is_some() {
            return Err(Error::Server(format!("Server {} is already connected", name)));
        }
        if self.timers.contains_key(&key) || self.futures.contains_key(&key) {
            return Err(Error::Server(format!("Already trying to connect to {}", name)));
        }
        if self.conns.contains_key(&key) {
            return Err(Error::Server(format!(
                "Connection to {} is already registering",
                name
            )));
        }
        let Some(block) = self.config.get_link(name) else {
            return Err(Error::Server(format!("No connect block for {}", name)));
        };
        let interval = block.auto_timeout.unwrap_or(0);
        if auto_only && interval == 0 {
            return Err(Error::Server(format!(
                "Autoconnect is not enabled for {}",
                name
            )));
        }

        if interval == 0 {
            self.establish_connection(name.to_string());
            return Ok(());
        }

        // periodic retry timer; the first tick fires immediately
        let mgr = Arc::clone(self);
        let target = name.to_string();
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = ready_rx.await;
            let mut ticker = tokio::time::interval(Duration::from_secs(interval));
            let mut attempt = 0u32;
            loop {
                ticker.tick().await;
                attempt += 1;
                tracing::info!("Connection attempt {} to {}", attempt, target);
                mgr.establish_connection(target.clone());
            }
        });
        self.timers.insert(key, handle);
        let _ = ready_tx.send(());
        Ok(())
    }

    /// Launch one connect attempt racing a timeout. The race is stored in
    /// the futures table; aborting it produces no failure notice.
    pub fn establish_connection(self: &Arc<Self>, name: String) {
        let key = name.to_lowercase();
        if self.futures.contains_key(&key) || self.conns.contains_key(&key) {
            tracing::debug!("Connection attempt to {} already underway", name);
            return;
        }
        let Some(block) = self.config.get_link(&name).cloned() else {
            tracing::warn!("No connect block for {}", name);
            return;
        };
        let protocol = LinkProtocol::from_config(block.ircd.as_deref());

        let mgr = Arc::clone(self);
        let task_key = key.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = ready_rx.await;
            let outcome =
                tokio::time::timeout(CONNECT_TIMEOUT, mgr.open_link(&task_key, &block, protocol))
                    .await;
            mgr.futures.remove(&task_key);
            match outcome {
                Err(_) => mgr.connect_fail(&block.name, "Connection timed out"),
                Ok(Err(e)) => mgr.connect_fail(&block.name, &e.to_string()),
                Ok(Ok(())) => {}
            }
        });
        self.futures.insert(key, handle);
        let _ = ready_tx.send(());
    }

    async fn open_link(
        self: &Arc<Self>,
        key: &str,
        block: &crate::config::LinkBlock,
        protocol: LinkProtocol,
    ) -> Result<()> {
        // IPv6 addresses carry a colon and need brackets
        let target = if block.address.contains(':') {
            format!("[{}]:{}", block.address, block.port)
        } else {
            format!("{}:{}", block.address, block.port)
        };

        let tcp = TcpStream::connect(&target)
            .await
            .map_err(|e| Error::Connection(format!("Failed to connect to {}: {}", target, e)))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let conn = ServerConnection::outbound(&block.name, sender);

        if block.tls {
            let connector = tls_connector()?;
            let server_name = ServerName::try_from(block.address.clone())
                .map_err(|e| Error::Connection(format!("Invalid TLS server name: {}", e)))?;
            let stream = connector.connect(server_name, tcp).await.map_err(|e| {
                Error::Connection(format!("TLS handshake with {} failed: {}", block.name, e))
            })?;
            self.conns.insert(key.to_string(), conn);
            self.adopt_stream(block.name.clone(), stream, receiver);
        } else {
            self.conns.insert(key.to_string(), conn);
            self.adopt_stream(block.name.clone(), tcp, receiver);
        }
        tracing::info!(
            "Connection to {} established, initiating {} link",
            block.name,
            protocol.name()
        );
        let _ = self.events.send(LinkEvent::Established {
            name: block.name.clone(),
            protocol,
        });
        Ok(())
    }

    /// Register the reader and writer tasks for an adopted socket
    fn adopt_stream<S>(
        self: &Arc<Self>,
        name: String,
        stream: S,
        mut receiver: mpsc::UnboundedReceiver<Message>,
    ) where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);

        let writer_name = name.clone();
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                // ERROR terminates the link after it is written
                let last = matches!(message.command, MessageType::Error);
                if let Err(e) = write_half.write_all(message.to_line().as_bytes()).await {
                    tracing::error!("Failed to send to server {}: {}", writer_name, e);
                    break;
                }
                if last {
                    break;
                }
            }
        });

        let mgr = Arc::clone(self);
        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => match Message::parse(line.trim_end()) {
                        // dispatch belongs to the protocol layer
                        Ok(message) => tracing::trace!("Received from {}: {}", name, message),
                        Err(e) => tracing::debug!("Unparsable line from {}: {}", name, e),
                    },
                    Err(e) => {
                        tracing::info!("Read error from {}: {}", name, e);
                        break;
                    }
                }
            }
            mgr.on_connection_done(&name, "Connection closed");
        });
    }

    /// Stop a pending attempt toward a server. Removes the retry timer and
    /// aborts the in-flight future; unless `keep_conn`, any unregistered
    /// connection is flagged against reconnection and closed. Returns true
    /// iff a pending attempt was active.
    pub fn cancel_connection(&self, name: &str, keep_conn: bool) -> bool {
        let key = name.to_lowercase();
        let mut was_pending = false;

        if let Some((_, timer)) = self.timers.remove(&key) {
            timer.abort();
            was_pending = true;
        }
        if let Some((_, future)) = self.futures.remove(&key) {
            future.abort();
            was_pending = true;
        }
        if !keep_conn {
            if let Some(mut conn) = self.conns.get_mut(&key) {
                conn.dont_reconnect = true;
                let _ = conn.send(Message::new(
                    MessageType::Error,
                    vec!["Connection canceled".to_string()],
                ));
            }
        }

        was_pending
    }

    /// A server became known to the pool: drop its retry timer without
    /// touching the live connection.
    pub fn on_new_server(&self, name: &str) {
        self.cancel_connection(name, true);
    }

    /// A connection closed. If registration was still pending under an
    /// active timer the failure is logged and the timer keeps retrying;
    /// otherwise autoconnect resumes unless the connection opted out.
    pub fn on_connection_done(self: &Arc<Self>, name: &str, reason: &str) {
        let key = name.to_lowercase();
        let conn = self
            .conns
            .remove(&key)
            .map(|(_, c)| c)
            .or_else(|| self.links.remove(&key).map(|(_, c)| c));
        let target = conn
            .as_ref()
            .and_then(|c| c.name.clone().or_else(|| c.want.clone()))
            .unwrap_or_else(|| name.to_string());

        if self.timers.contains_key(&key) {
            tracing::warn!(
                "Connection to {} failed during registration: {}",
                target,
                reason
            );
            return;
        }

        if conn.map(|c| c.dont_reconnect).unwrap_or(false) {
            tracing::info!("Not reconnecting to {}: {}", target, reason);
            return;
        }

        if let Err(e) = self.connect_server(&target, true) {
            tracing::debug!("Not reconnecting to {}: {}", target, e);
        }
    }

    /// Track a connection that arrived outside the outbound path (an
    /// accepted socket being registered by the protocol layer)
    pub fn adopt_connection(&self, name: &str, conn: ServerConnection) {
        self.conns.insert(name.to_lowercase(), conn);
    }

    /// Promote a pending connection to a registered peer
    pub fn register_server(&self, server: Server) -> Result<()> {
        let key = server.name.to_lowercase();
        let name = server.name.clone();
        self.pool.add_server(server)?;
        if let Some((_, mut conn)) = self.conns.remove(&key) {
            conn.name = Some(name.clone());
            conn.state = ServerConnectionState::Registered;
            self.links.insert(key, conn);
        }
        self.on_new_server(&name);
        Ok(())
    }

    /// Send a message to a registered peer
    pub fn send_to_server(&self, name: &str, message: Message) -> Result<()> {
        let key = name.to_lowercase();
        if let Some(conn) = self.links.get(&key).or_else(|| self.conns.get(&key)) {
            conn.send(message)
        } else {
            Err(Error::Connection(format!("Server {} not connected", name)))
        }
    }

    /// Send a message to every registered peer
    pub fn broadcast_to_servers(&self, message: Message) {
        for conn in self.links.iter() {
            if let Err(e) = conn.send(message.clone()) {
                let name = conn.name.as_deref().unwrap_or("?");
                tracing::warn!("Failed to send to server {}: {}", name, e);
            }
        }
    }

    /// Whether any attempt state exists for a target name
    pub fn attempt_pending(&self, name: &str) -> bool {
        let key = name.to_lowercase();
        self.timers.contains_key(&key) || self.futures.contains_key(&key)
    }

    /// Whether an unregistered connection exists for a target name
    pub fn conn_pending(&self, name: &str) -> bool {
        self.conns.contains_key(&name.to_lowercase())
    }

    fn connect_fail(&self, name: &str, reason: &str) {
        tracing::warn!("Connection to {} failed: {}", name, reason);
        let _ = self.events.send(LinkEvent::ConnectFail {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// TLS connector for outbound links. Certificate verification is disabled
/// by default; links are authenticated by the protocol handshake.
fn tls_connector() -> Result<tokio_rustls::TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { provider }))
        .with_no_client_auth();
    Ok(tokio_rustls::TlsConnector::from(Arc::new(config)))
}

#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
