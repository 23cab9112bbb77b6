use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use gsectl_frame::StreamDecoder;
use gsectl_transport::Endpoint;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{ConsoleError, Result};
use crate::role::{Device, Direction, Role};

/// Write side of a registered connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Registry-assigned connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live device link.
///
/// Owns the write half, the reader task and, for registered telemetry
/// links, the stream decoder. Dropping a connection aborts its
/// reader task.
pub struct Connection {
    id: ConnectionId,
    endpoint: Endpoint,
    writer: Option<BoxedWriter>,
    reader: Option<JoinHandle<()>>,
    decoder: Option<StreamDecoder>,
}

impl Connection {
    pub fn new(id: ConnectionId, endpoint: Endpoint) -> Self {
        Self {
            id,
            endpoint,
            writer: None,
            reader: None,
            decoder: None,
        }
    }

    /// Attach the write half.
    pub fn with_writer(mut self, writer: BoxedWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Attach the task forwarding reads to the multiplexer.
    pub fn with_reader(mut self, reader: JoinHandle<()>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Stop the reader and flush/shut down the writer, bounded by `timeout`.
    pub async fn close(&mut self, timeout: Duration) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            if tokio::time::timeout(timeout, writer.shutdown()).await.is_err() {
                debug!(id = %self.id, "writer shutdown timed out");
            }
        }
    }

    fn info(&self, role: Role) -> ConnectionInfo {
        let (buffered, frames, rejected) = match &self.decoder {
            Some(decoder) => (decoder.buffered(), decoder.decoded(), decoder.rejected()),
            None => (0, 0, 0),
        };
        ConnectionInfo {
            id: self.id,
            role,
            endpoint: self.endpoint.to_string(),
            buffered,
            frames,
            rejected,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("writable", &self.writer.is_some())
            .field("reading", &self.reader.is_some())
            .finish()
    }
}

/// Point-in-time description of a registered connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub role: Role,
    pub endpoint: String,
    /// Bytes held for an incomplete frame.
    pub buffered: usize,
    /// Frames decoded on this link.
    pub frames: u64,
    /// Corrupt frames discarded on this link.
    pub rejected: u64,
}

struct Entry {
    role: Role,
    conn: Connection,
}

/// Owns every live connection, bucketed by role.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: BTreeMap<ConnectionId, Entry>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id for a connection about to be added.
    pub fn next_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId(self.next_id)
    }

    /// Register `conn` under `role`.
    ///
    /// Telemetry connections get a fresh stream decoder for their device.
    pub fn add(&mut self, mut conn: Connection, role: Role) -> Result<ConnectionId> {
        let id = conn.id;
        if let Some(existing) = self.entries.get(&id) {
            return Err(ConsoleError::AlreadyRegistered {
                id,
                role: existing.role,
            });
        }
        if role.is_readable() {
            conn.decoder = Some(StreamDecoder::new(role.schema()));
        }
        debug!(%id, %role, endpoint = %conn.endpoint, "connection registered");
        self.entries.insert(id, Entry { role, conn });
        Ok(id)
    }

    /// Unregister a connection; its decoder and buffered bytes go with it.
    ///
    /// Returns `None` if the id is not registered, so repeated removal is
    /// harmless.
    pub fn remove(&mut self, id: ConnectionId) -> Option<(Role, Connection, ConnectionInfo)> {
        let entry = self.entries.remove(&id)?;
        let info = entry.conn.info(entry.role);
        let mut conn = entry.conn;
        conn.decoder = None;
        Some((entry.role, conn, info))
    }

    /// Unregister everything (shutdown).
    pub fn remove_all(&mut self) -> Vec<(Role, Connection, ConnectionInfo)> {
        let ids: Vec<_> = self.entries.keys().copied().collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Connections open for reading telemetry.
    pub fn readables(&self) -> Vec<ConnectionId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.role.is_readable())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Command connections for `device`; errors when there are none.
    pub fn writables(&self, device: Device) -> Result<Vec<ConnectionId>> {
        let ids: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.role == Role::command(device))
            .map(|(id, _)| *id)
            .collect();
        if ids.is_empty() {
            return Err(ConsoleError::NoMatchingConnection { device });
        }
        Ok(ids)
    }

    pub fn role(&self, id: ConnectionId) -> Option<Role> {
        self.entries.get(&id).map(|entry| entry.role)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// First connection in `direction` attached to `endpoint`.
    pub fn find(&self, endpoint: &Endpoint, direction: Direction) -> Option<ConnectionId> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.role.direction == direction && &entry.conn.endpoint == endpoint)
            .map(|(id, _)| *id)
    }

    pub fn decoder_mut(&mut self, id: ConnectionId) -> Option<&mut StreamDecoder> {
        self.entries
            .get_mut(&id)
            .and_then(|entry| entry.conn.decoder.as_mut())
    }

    pub fn writer_mut(&mut self, id: ConnectionId) -> Option<&mut BoxedWriter> {
        self.entries
            .get_mut(&id)
            .and_then(|entry| entry.conn.writer.as_mut())
    }

    pub fn info(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.entries.get(&id).map(|entry| entry.conn.info(entry.role))
    }

    /// Descriptions of every connection, ordered by id.
    pub fn infos(&self) -> Vec<ConnectionInfo> {
        self.entries
            .values()
            .map(|entry| entry.conn.info(entry.role))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.infos())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new("127.0.0.1", port)
    }

    fn sink() -> BoxedWriter {
        Box::new(tokio::io::sink())
    }

    #[test]
    fn add_and_bucket_by_role() {
        let mut registry = ConnectionRegistry::new();
        let a = registry.next_id();
        let b = registry.next_id();
        let c = registry.next_id();

        registry
            .add(Connection::new(a, endpoint(5001)), Role::telemetry(Device::Gse))
            .unwrap();
        registry
            .add(
                Connection::new(b, endpoint(5002)).with_writer(sink()),
                Role::command(Device::Gse),
            )
            .unwrap();
        registry
            .add(
                Connection::new(c, endpoint(5003)).with_writer(sink()),
                Role::command(Device::Ecu),
            )
            .unwrap();

        assert_eq!(registry.readables(), vec![a]);
        assert_eq!(registry.writables(Device::Gse).unwrap(), vec![b]);
        assert_eq!(registry.writables(Device::Ecu).unwrap(), vec![c]);
        assert!(registry.decoder_mut(a).is_some());
        assert!(registry.decoder_mut(b).is_none());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn writables_without_match_is_error() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.next_id();
        registry
            .add(Connection::new(id, endpoint(5001)), Role::telemetry(Device::Gse))
            .unwrap();

        let err = registry.writables(Device::Gse).unwrap_err();
        assert!(matches!(
            err,
            ConsoleError::NoMatchingConnection { device: Device::Gse }
        ));
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.next_id();
        registry
            .add(Connection::new(id, endpoint(5001)), Role::telemetry(Device::Gse))
            .unwrap();
        let err = registry
            .add(Connection::new(id, endpoint(5002)), Role::command(Device::Gse))
            .unwrap_err();
        assert!(matches!(err, ConsoleError::AlreadyRegistered { .. }));
        assert_eq!(registry.role(id), Some(Role::telemetry(Device::Gse)));
    }

    #[test]
    fn remove_is_idempotent_and_drops_decoder_state() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.next_id();
        registry
            .add(Connection::new(id, endpoint(5001)), Role::telemetry(Device::Gse))
            .unwrap();
        registry.decoder_mut(id).unwrap().feed(&[0u8; 10]);
        assert_eq!(registry.info(id).unwrap().buffered, 10);

        let (role, _conn, info) = registry.remove(id).unwrap();
        assert_eq!(role, Role::telemetry(Device::Gse));
        assert_eq!(info.buffered, 10);
        assert!(registry.remove(id).is_none());
        assert!(registry.readables().is_empty());
        assert!(registry.decoder_mut(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn find_matches_endpoint_and_direction() {
        let mut registry = ConnectionRegistry::new();
        let input = registry.next_id();
        let output = registry.next_id();
        registry
            .add(Connection::new(input, endpoint(5001)), Role::telemetry(Device::Gse))
            .unwrap();
        registry
            .add(Connection::new(output, endpoint(5001)), Role::command(Device::Gse))
            .unwrap();

        assert_eq!(registry.find(&endpoint(5001), Direction::Telemetry), Some(input));
        assert_eq!(registry.find(&endpoint(5001), Direction::Command), Some(output));
        assert_eq!(registry.find(&endpoint(5999), Direction::Command), None);
    }

    #[tokio::test]
    async fn dropping_connection_aborts_reader() {
        let reader = tokio::spawn(std::future::pending::<()>());
        let abort = reader.abort_handle();
        let mut registry = ConnectionRegistry::new();
        let id = registry.next_id();
        registry
            .add(
                Connection::new(id, endpoint(5001)).with_reader(reader),
                Role::telemetry(Device::Ecu),
            )
            .unwrap();

        let removed = registry.remove(id);
        drop(removed);
        for _ in 0..10 {
            if abort.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(abort.is_finished());
    }

    #[tokio::test]
    async fn close_shuts_down_writer() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn =
            Connection::new(ConnectionId::new(1), endpoint(5001)).with_writer(Box::new(client));
        conn.close(Duration::from_millis(100)).await;

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut server, &mut buf)
            .await
            .unwrap();
        assert!(buf.is_empty());
    }
}
