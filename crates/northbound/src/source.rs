//! Redis Streams event source feeding the export pipeline.
//!
//! Local producers `XADD` events (JSON in an `event` field) to a stream;
//! northbound reads them through a consumer group and `XACK`s each one once it
//! has been forwarded. Anything not acknowledged stays in the consumer's
//! pending list. On every (re)connect the source first replays that list, so
//! entries left unacknowledged by a previous run under the same consumer name
//! are forwarded again before new ones.

use crate::contract::AckHandle;
use crate::error::{ExportError, ExportResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisResult, Value};
use tracing::{debug, info, warn};

/// Field holding the JSON-encoded event in each source entry.
pub const EVENT_FIELD: &str = "event";

/// Consumer name used when none is configured.
pub const DEFAULT_CONSUMER_NAME: &str = "northbound";

/// Where the next `XREADGROUP` starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPosition {
    /// Replaying this consumer's pending entries with IDs after the given one.
    Pending(String),
    /// Reading entries never delivered to the group.
    New,
}

impl ReadPosition {
    /// Start of the pending list.
    pub fn replay() -> Self {
        ReadPosition::Pending("0".to_string())
    }

    /// ID argument for `XREADGROUP ... STREAMS key <id>`.
    pub fn stream_id(&self) -> &str {
        match self {
            ReadPosition::Pending(after) => after,
            ReadPosition::New => ">",
        }
    }

    /// Position following a read that returned `read`.
    pub fn advance(self, read: Option<&SourceMessage>) -> Self {
        match (self, read) {
            (ReadPosition::Pending(_), Some(message)) => {
                ReadPosition::Pending(message.message_id.clone())
            }
            // An empty pending read means the list is exhausted.
            (ReadPosition::Pending(_), None) => ReadPosition::New,
            (ReadPosition::New, _) => ReadPosition::New,
        }
    }
}

/// Source stream settings.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Stream the local producers write to
    pub stream_key: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Consumer name. Must be stable across restarts and unique per
    /// running instance, or pending entries are not replayed.
    pub consumer_name: String,

    /// XREADGROUP block timeout in milliseconds
    pub block_timeout_ms: u64,
}

impl SourceConfig {
    pub fn new(redis_url: impl Into<String>, stream_key: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            stream_key: stream_key.into(),
            consumer_group: "northbound".to_string(),
            consumer_name: DEFAULT_CONSUMER_NAME.to_string(),
            block_timeout_ms: 5000,
        }
    }
}

/// An entry read from the source stream.
#[derive(Debug, Clone)]
pub struct SourceMessage {
    /// The Redis entry ID (e.g., "1234567890-0").
    pub message_id: String,
    /// Raw JSON of the event.
    pub event_json: Vec<u8>,
}

/// Acknowledges one source entry.
pub struct StreamAck {
    conn: MultiplexedConnection,
    stream_key: String,
    consumer_group: String,
    message_id: String,
}

#[async_trait]
impl AckHandle for StreamAck {
    async fn acknowledge(&self) -> ExportResult<()> {
        // XACK key group id; returns how many entries left the pending list
        let acked: i64 = self
            .conn
            .clone()
            .xack(&self.stream_key, &self.consumer_group, &[&self.message_id])
            .await
            .map_err(|e| ExportError::Acknowledge(e.to_string()))?;

        // 0 means the entry was already acknowledged or never pending
        if acked == 1 {
            debug!(message_id = %self.message_id, "Acknowledged source entry");
            Ok(())
        } else {
            Err(ExportError::Acknowledge(format!(
                "XACK returned {} for {}",
                acked, self.message_id
            )))
        }
    }
}

/// Consumer-group reader of the source stream.
pub struct RedisEventSource {
    client: Client,
    conn: MultiplexedConnection,
    config: SourceConfig,
    position: ReadPosition,
}

impl RedisEventSource {
    /// Connect and make sure the consumer group exists.
    pub async fn connect(config: SourceConfig) -> ExportResult<Self> {
        let client = Client::open(config.redis_url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;

        let source = Self {
            client,
            conn,
            config,
            position: ReadPosition::replay(),
        };
        source.ensure_consumer_group().await?;

        Ok(source)
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn position(&self) -> &ReadPosition {
        &self.position
    }

    async fn ensure_consumer_group(&self) -> ExportResult<()> {
        // XGROUP CREATE key groupname id MKSTREAM
        // "0" so entries written before the group existed are still exported
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_key)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut self.conn.clone())
            .await;

        match result {
            Ok(()) => info!(
                stream = %self.config.stream_key,
                group = %self.config.consumer_group,
                "Created consumer group"
            ),
            // BUSYGROUP means the group already exists
            Err(e) if e.to_string().contains("BUSYGROUP") => debug!(
                stream = %self.config.stream_key,
                group = %self.config.consumer_group,
                "Consumer group already exists"
            ),
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    /// Read the next entry.
    ///
    /// Pending entries are returned first, without blocking. After that the
    /// read blocks up to the configured timeout and returns `None` if it
    /// expires with no entries.
    pub async fn read_next(&mut self) -> ExportResult<Option<SourceMessage>> {
        // XREADGROUP GROUP groupname consumername COUNT 1 [BLOCK ms] STREAMS key id
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(1);

        // BLOCK only applies to ">"; pending reads answer immediately
        if self.position == ReadPosition::New {
            cmd.arg("BLOCK").arg(self.config.block_timeout_ms);
        }

        cmd.arg("STREAMS")
            .arg(&self.config.stream_key)
            .arg(self.position.stream_id());

        let result: RedisResult<Value> = cmd.query_async(&mut self.conn).await;
        let message = parse_xreadgroup_response(result?)?;

        let replaying = matches!(self.position, ReadPosition::Pending(_));
        self.position = std::mem::replace(&mut self.position, ReadPosition::New)
            .advance(message.as_ref());
        if replaying && self.position == ReadPosition::New {
            info!(
                consumer = %self.config.consumer_name,
                "Pending entries replayed, reading new entries"
            );
        }

        Ok(message)
    }

    /// Ack handle for `message`.
    pub fn ack_handle(&self, message: &SourceMessage) -> StreamAck {
        StreamAck {
            conn: self.conn.clone(),
            stream_key: self.config.stream_key.clone(),
            consumer_group: self.config.consumer_group.clone(),
            message_id: message.message_id.clone(),
        }
    }

    /// Reconnect to Redis and replay the pending list again.
    pub async fn reconnect(&mut self) -> ExportResult<()> {
        info!("Reconnecting to source...");
        self.conn = self.client.get_multiplexed_async_connection().await?;
        self.ensure_consumer_group().await?;

        // An entry read before the failure may still be unacknowledged
        self.position = ReadPosition::replay();
        Ok(())
    }
}

/// Extract the single entry of a `COUNT 1` XREADGROUP reply.
///
/// Reply shape: `[[stream_key, [[entry_id, [field, value, ...]]]]]`.
fn parse_xreadgroup_response(value: Value) -> ExportResult<Option<SourceMessage>> {
    let streams = match value {
        Value::Nil => return Ok(None),
        Value::Array(streams) => streams,
        other => {
            return Err(ExportError::Protocol(format!(
                "Unexpected XREADGROUP response type: {:?}",
                other
            )))
        }
    };

    // Get the first (only) stream
    let Some(stream) = streams.into_iter().next() else {
        return Ok(None);
    };
    let stream = into_array(stream, "stream entry")?;

    // Get entries array; empty once a pending replay is exhausted
    let Some(entries) = stream.into_iter().nth(1) else {
        return Err(ExportError::Protocol("Stream entry too short".to_string()));
    };
    let Some(entry) = into_array(entries, "entries")?.into_iter().next() else {
        return Ok(None);
    };

    let mut entry = into_array(entry, "entry")?.into_iter();
    let (Some(id), Some(fields)) = (entry.next(), entry.next()) else {
        return Err(ExportError::Protocol("Entry too short".to_string()));
    };

    // Extract entry ID
    let message_id = String::from_utf8(into_bytes(id).ok_or_else(|| {
        ExportError::Protocol("Expected string for entry ID".to_string())
    })?)
    .map_err(|e| ExportError::Protocol(e.to_string()))?;

    // A pending entry that was trimmed from the stream comes back with nil
    // fields; it is surfaced with an empty event so the pipeline acks it.
    let fields = match fields {
        Value::Nil => Vec::new(),
        other => into_array(other, "fields")?,
    };

    // Find the event field
    let mut event_json = None;
    let mut fields = fields.into_iter();
    while let (Some(name), Some(value)) = (fields.next(), fields.next()) {
        if into_bytes(name).as_deref() == Some(EVENT_FIELD.as_bytes()) {
            event_json = into_bytes(value);
            break;
        }
    }

    let Some(event_json) = event_json else {
        warn!(message_id = %message_id, "Source entry has no event field");
        return Ok(Some(SourceMessage {
            message_id,
            event_json: Vec::new(),
        }));
    };

    debug!(
        message_id = %message_id,
        payload_len = event_json.len(),
        "Read entry from source"
    );

    Ok(Some(SourceMessage {
        message_id,
        event_json,
    }))
}

fn into_array(value: Value, what: &str) -> ExportResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(ExportError::Protocol(format!(
            "Expected array for {}, got {:?}",
            what, other
        ))),
    }
}

fn into_bytes(value: Value) -> Option<Vec<u8>> {
    // RESP2 replies use bulk strings, RESP3 may use simple strings
    match value {
        Value::BulkString(bytes) => Some(bytes),
        Value::SimpleString(s) => Some(s.into_bytes()),
        _ => None,
    }
}
