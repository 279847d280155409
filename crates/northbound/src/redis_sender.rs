//! Redis Streams transport for the two northbound channels.
//!
//! Each channel maps to one stream; every send is a single `XADD` carrying
//! the serialized bytes in a `payload` field.

use crate::config::ExportConfig;
use crate::contract::{Sender, TransportCleanup};
use crate::error::{ExportError, ExportResult};
use crate::model::Channel;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ClientTlsConfig, RedisError, TlsCertificates};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Field name carrying the serialized record in each stream entry.
pub const PAYLOAD_FIELD: &str = "payload";

/// Holds the live connection until the transport is closed.
///
/// Closing drops the slot's copy; the socket goes away once in-flight
/// sends finish with theirs. A closed slot stays closed.
pub struct ConnectionSlot<C> {
    conn: RwLock<Option<C>>,
}

impl<C: Clone> ConnectionSlot<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn: RwLock::new(Some(conn)),
        }
    }

    /// A handle to the connection, or `None` once closed.
    pub async fn current(&self) -> Option<C> {
        self.conn.read().await.clone()
    }

    /// Swap in a fresh connection. Ignored after close.
    pub async fn replace(&self, conn: C) -> bool {
        let mut slot = self.conn.write().await;
        if slot.is_none() {
            return false;
        }
        *slot = Some(conn);
        true
    }

    /// Drop the connection. Returns `false` if it was already closed.
    pub async fn close(&self) -> bool {
        self.conn.write().await.take().is_some()
    }
}

/// Sender that publishes to Redis Streams.
pub struct RedisStreamSender {
    client: Client,
    conn: ConnectionSlot<MultiplexedConnection>,
    client_id: String,
    event_stream: String,
    new_device_stream: String,
}

impl RedisStreamSender {
    /// Connect to the transport described by `config`.
    pub async fn connect(config: &ExportConfig) -> ExportResult<Self> {
        let url = connection_url(&config.server, &config.user_name, &config.password)?;
        let tls = client_certificates(&config.cert_file, &config.key_file)?;
        let client_auth = tls.is_some();
        let client = build_client(&url, tls)?;
        let conn = open_connection(&client, &config.client_id).await?;

        info!(
            server = %redact(&url),
            client_auth,
            event_stream = %config.event_topic,
            new_device_stream = %config.new_device_topic,
            "Connected to transport"
        );

        Ok(Self {
            client,
            conn: ConnectionSlot::new(conn),
            client_id: config.client_id.clone(),
            event_stream: config.event_topic.clone(),
            new_device_stream: config.new_device_topic.clone(),
        })
    }

    fn stream_for(&self, channel: Channel) -> &str {
        match channel {
            Channel::Event => &self.event_stream,
            Channel::NewDevice => &self.new_device_stream,
        }
    }

    async fn reconnect(&self) {
        match open_connection(&self.client, &self.client_id).await {
            Ok(conn) => {
                if self.conn.replace(conn).await {
                    info!("Reconnected to transport");
                }
            }
            Err(e) => warn!(error = %e, "Transport reconnect failed"),
        }
    }
}

#[async_trait]
impl Sender for RedisStreamSender {
    async fn send(&self, channel: Channel, payload: &[u8]) -> bool {
        let stream = self.stream_for(channel);
        let Some(mut conn) = self.conn.current().await else {
            warn!(stream = %stream, "send to {} refused, transport closed", stream);
            return false;
        };

        // XADD stream * payload <bytes>
        let result: Result<String, RedisError> =
            conn.xadd(stream, "*", &[(PAYLOAD_FIELD, payload)]).await;

        match result {
            Ok(entry_id) => {
                debug!(stream = %stream, entry_id = %entry_id, bytes = payload.len(), "Published");
                true
            }
            Err(e) => {
                warn!(stream = %stream, "send to {} failed ({})", stream, e);
                // Only a broken connection is worth replacing; the caller retries
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                    self.reconnect().await;
                }
                false
            }
        }
    }
}

#[async_trait]
impl TransportCleanup for RedisStreamSender {
    async fn clean_up(&self) {
        if self.conn.close().await {
            info!("Transport closed");
        }
    }
}

async fn open_connection(client: &Client, client_id: &str) -> ExportResult<MultiplexedConnection> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    if !client_id.is_empty() {
        let named: redis::RedisResult<()> = redis::cmd("CLIENT")
            .arg("SETNAME")
            .arg(client_id)
            .query_async(&mut conn)
            .await;
        named?;
    }
    Ok(conn)
}

/// Load the PEM client key pair. Client auth is used only when both files
/// are configured.
fn client_certificates(cert_file: &str, key_file: &str) -> ExportResult<Option<TlsCertificates>> {
    if cert_file.is_empty() || key_file.is_empty() {
        if !cert_file.is_empty() || !key_file.is_empty() {
            warn!("Only one of certFile and keyFile is set; connecting without a client certificate");
        }
        return Ok(None);
    }

    let client_cert = std::fs::read(cert_file)?;
    let client_key = std::fs::read(key_file)?;

    Ok(Some(TlsCertificates {
        client_tls: Some(ClientTlsConfig {
            client_cert,
            client_key,
        }),
        root_cert: None,
    }))
}

fn build_client(url: &Url, tls: Option<TlsCertificates>) -> ExportResult<Client> {
    match tls {
        // Client certificates only apply to TLS connections
        Some(_) if url.scheme() != "rediss" => Err(ExportError::Config(format!(
            "client certificate configured but {} is not a rediss:// URL",
            redact(url)
        ))),
        Some(certs) => Ok(Client::build_with_tls(url.as_str(), certs)?),
        None => Ok(Client::open(url.as_str())?),
    }
}

/// Build the connection URL, injecting credentials when configured.
fn connection_url(server: &str, user_name: &str, password: &str) -> ExportResult<Url> {
    let mut url = Url::parse(server)?;

    if !user_name.is_empty() {
        url.set_username(user_name)
            .map_err(|_| ExportError::Config(format!("cannot set user on {}", server)))?;
    }
    if !password.is_empty() {
        url.set_password(Some(password))
            .map_err(|_| ExportError::Config(format!("cannot set password on {}", server)))?;
    }

    Ok(url)
}

fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    if url.password().is_some() {
        let _ = shown.set_password(Some("***"));
    }
    shown.to_string()
}
