//! The single loop that owns every connection and all shared console state.
//!
//! One task runs [`Multiplexer::run`]. Operator requests arrive on a bounded
//! queue, socket reads arrive from per-connection reader tasks on an event
//! channel, and nothing else touches the registry, the decoders, the command
//! state or the snapshot writer. Commands, telemetry ingestion and
//! connection lifecycle are therefore applied in one total order.

use std::io;

use bytes::{Bytes, BytesMut};
use gsectl_frame::Fed;
use gsectl_transport::{Endpoint, TransportError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command_state::CommandStates;
use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, Result};
use crate::handle::{ConsoleHandle, Envelope, Reply};
use crate::registry::{Connection, ConnectionId, ConnectionInfo, ConnectionRegistry};
use crate::request::{CommandAction, Outcome, Request, Target};
use crate::role::{Device, Direction, Role};
use crate::snapshot::TelemetrySnapshot;

/// Connection events handled per wakeup before the queue is looked at again.
const EVENT_BATCH: usize = 64;

/// Lifecycle of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxState {
    Running,
    /// Shutdown requested; the next iteration closes everything.
    Draining,
    Stopped,
}

/// Everything the multiplexer owns.
#[derive(Debug)]
pub struct Context {
    registry: ConnectionRegistry,
    commands: CommandStates,
    snapshot: TelemetrySnapshot,
    queue: mpsc::Receiver<Envelope>,
    shutdown: CancellationToken,
}

impl Context {
    /// Fresh state plus the handle producers use to reach it.
    pub fn new(config: &ConsoleConfig) -> (Self, ConsoleHandle) {
        let (tx, queue) = mpsc::channel(config.queue_capacity.max(1));
        let snapshot = TelemetrySnapshot::new();
        let shutdown = CancellationToken::new();
        let handle = ConsoleHandle::new(tx, snapshot.reader(), shutdown.clone());
        let ctx = Self {
            registry: ConnectionRegistry::new(),
            commands: CommandStates::new(),
            snapshot,
            queue,
            shutdown,
        };
        (ctx, handle)
    }
}

enum Event {
    /// Bytes from a connection; empty means the peer closed.
    Read { id: ConnectionId, bytes: Bytes },
    ReadFailed { id: ConnectionId, error: io::Error },
    Connected {
        role: Role,
        endpoint: Endpoint,
        stream: TcpStream,
        reply: Option<Reply>,
    },
    ConnectFailed {
        role: Role,
        error: TransportError,
        reply: Option<Reply>,
    },
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Read { id, bytes } => write!(f, "Read({id}, {} bytes)", bytes.len()),
            Event::ReadFailed { id, error } => write!(f, "ReadFailed({id}, {error})"),
            Event::Connected { role, endpoint, .. } => write!(f, "Connected({role}, {endpoint})"),
            Event::ConnectFailed { role, error, .. } => write!(f, "ConnectFailed({role}, {error})"),
        }
    }
}

/// Single-owner event loop over device connections and operator requests.
#[derive(Debug)]
pub struct Multiplexer {
    ctx: Context,
    config: ConsoleConfig,
    state: MuxState,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
}

impl Multiplexer {
    pub fn new(ctx: Context, config: ConsoleConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity.max(1));
        Self {
            ctx,
            config,
            state: MuxState::Running,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> MuxState {
        self.state
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.ctx.registry
    }

    pub fn commands(&self) -> &CommandStates {
        &self.ctx.commands
    }

    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.ctx.snapshot
    }

    /// Run until stopped.
    pub async fn run(mut self) {
        info!(
            poll_timeout_ms = self.config.poll_timeout.as_millis() as u64,
            "console multiplexer started"
        );
        while self.run_once().await != MuxState::Stopped {}
    }

    /// One loop iteration; returns the state afterwards.
    pub async fn run_once(&mut self) -> MuxState {
        match self.state {
            MuxState::Running => self.iterate().await,
            MuxState::Draining => self.drain().await,
            MuxState::Stopped => {}
        }
        self.state
    }

    async fn iterate(&mut self) {
        if self.ctx.shutdown.is_cancelled() {
            self.begin_drain("shutdown requested");
            return;
        }

        loop {
            match self.ctx.queue.try_recv() {
                Ok(envelope) => {
                    self.handle(envelope).await;
                    if self.state != MuxState::Running {
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.begin_drain("all console handles dropped");
                    return;
                }
            }
        }

        let poll_timeout = self.config.poll_timeout;
        tokio::select! {
            biased;

            _ = self.ctx.shutdown.cancelled() => self.begin_drain("shutdown requested"),
            Some(event) = self.events_rx.recv() => {
                self.handle_event(event).await;
                for _ in 1..EVENT_BATCH {
                    match self.events_rx.try_recv() {
                        Ok(event) => self.handle_event(event).await,
                        Err(_) => break,
                    }
                }
            }
            envelope = self.ctx.queue.recv() => match envelope {
                Some(envelope) => self.handle(envelope).await,
                None => self.begin_drain("all console handles dropped"),
            },
            _ = tokio::time::sleep(poll_timeout) => {}
        }
    }

    fn begin_drain(&mut self, reason: &str) {
        if self.state == MuxState::Running {
            info!(reason, "console draining");
            self.state = MuxState::Draining;
        }
    }

    /// Register a connection that is already open.
    ///
    /// Every role gets a reader task so a peer close is noticed; only
    /// telemetry links decode what they read.
    pub fn attach<R, W>(
        &mut self,
        role: Role,
        endpoint: Endpoint,
        reader: R,
        writer: W,
    ) -> Result<ConnectionInfo>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = self.ctx.registry.next_id();
        let task = tokio::spawn(read_loop(
            id,
            reader,
            self.events_tx.clone(),
            self.config.read_chunk_size.max(1),
        ));
        let conn = Connection::new(id, endpoint)
            .with_writer(Box::new(writer))
            .with_reader(task);
        self.ctx.registry.add(conn, role)?;
        let info = self
            .ctx
            .registry
            .info(id)
            .ok_or(ConsoleError::ConnectionClosed { id })?;
        info!(%id, %role, endpoint = %info.endpoint, "connection added");
        Ok(info)
    }

    async fn handle(&mut self, envelope: Envelope) {
        let Envelope { request, reply } = envelope;
        let result = match request {
            Request::Connect {
                direction,
                endpoint,
                device,
            } => {
                // Answered when the connect task reports back.
                self.start_connect(Role { device, direction }, endpoint, reply);
                return;
            }
            Request::Command { device, action } => self.dispatch_command(device, action).await,
            Request::Disconnect { direction, target } => self.disconnect(direction, target).await,
            Request::Status => Ok(Outcome::Status(self.ctx.registry.infos())),
            Request::Shutdown => {
                self.begin_drain("operator shutdown");
                Ok(Outcome::ShuttingDown)
            }
        };
        respond(reply, result);
    }

    fn start_connect(&self, role: Role, endpoint: Endpoint, reply: Option<Reply>) {
        let events = self.events_tx.clone();
        let timeout = self.config.connect_timeout;
        debug!(%role, %endpoint, "connecting");
        tokio::spawn(async move {
            let event = match gsectl_transport::connect(&endpoint, timeout).await {
                Ok(stream) => Event::Connected {
                    role,
                    endpoint,
                    stream,
                    reply,
                },
                Err(error) => Event::ConnectFailed { role, error, reply },
            };
            // A stopped multiplexer drops the reply; the submitter sees QueueClosed.
            let _ = events.send(event).await;
        });
    }

    async fn dispatch_command(&mut self, device: Device, action: CommandAction) -> Result<Outcome> {
        let state = self.ctx.commands.state_mut(device);
        let staged = match &action {
            CommandAction::SetAll(values) => state.stage_all(values)?,
            CommandAction::Set { field, value } => state.stage_field(field, *value)?,
        };
        let targets = self.ctx.registry.writables(device)?;

        let mut delivered = Vec::with_capacity(targets.len());
        let mut failed = Vec::new();
        let mut last_error = None;
        for id in targets {
            match self.write_frame(id, staged.frame()).await {
                Ok(()) => delivered.push(id),
                Err(err) => {
                    warn!(%id, %device, error = %err, "command write failed");
                    failed.push(id);
                    last_error = Some(err);
                }
            }
        }
        for id in &failed {
            self.remove_connection(*id, "write failed").await;
        }

        if delivered.is_empty() {
            return Err(last_error.unwrap_or(ConsoleError::NoMatchingConnection { device }));
        }

        let frame = self.ctx.commands.state_mut(device).commit(staged);
        info!(
            %device,
            delivered = delivered.len(),
            failed = failed.len(),
            "command sent"
        );
        Ok(Outcome::Sent {
            device,
            frame,
            delivered,
            failed,
        })
    }

    async fn write_frame(&mut self, id: ConnectionId, frame: &Bytes) -> Result<()> {
        let timeout = self.config.write_timeout;
        let writer = self
            .ctx
            .registry
            .writer_mut(id)
            .ok_or(ConsoleError::ConnectionClosed { id })?;
        let write = async {
            writer.write_all(frame).await?;
            writer.flush().await
        };
        match tokio::time::timeout(timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ConsoleError::WriteFailure { id, source }),
            Err(_) => Err(ConsoleError::WriteFailure {
                id,
                source: io::Error::new(io::ErrorKind::TimedOut, "write timed out"),
            }),
        }
    }

    async fn disconnect(&mut self, direction: Direction, target: Target) -> Result<Outcome> {
        let id = match &target {
            Target::Id(id) => Some(*id).filter(|id| {
                self.ctx
                    .registry
                    .role(*id)
                    .is_some_and(|role| role.direction == direction)
            }),
            Target::Endpoint(endpoint) => self.ctx.registry.find(endpoint, direction),
        };
        let id = id.ok_or_else(|| ConsoleError::UnknownConnection {
            direction,
            target: target.to_string(),
        })?;
        let info = self
            .remove_connection(id, "operator removal")
            .await
            .ok_or(ConsoleError::ConnectionClosed { id })?;
        Ok(Outcome::Disconnected(info))
    }

    /// Unregister and close one connection. Unknown ids are ignored.
    async fn remove_connection(&mut self, id: ConnectionId, reason: &str) -> Option<ConnectionInfo> {
        let (role, mut conn, info) = self.ctx.registry.remove(id)?;
        conn.close(self.config.write_timeout).await;
        warn!(%id, %role, endpoint = %info.endpoint, reason, "connection removed");
        Some(info)
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Read { id, bytes } => self.ingest(id, &bytes).await,
            Event::ReadFailed { id, error } => {
                debug!(%id, error = %error, "read failed");
                self.remove_connection(id, "read error").await;
            }
            Event::Connected {
                role,
                endpoint,
                stream,
                reply,
            } => {
                let (reader, writer) = stream.into_split();
                let result = self
                    .attach(role, endpoint, reader, writer)
                    .map(Outcome::Connected);
                respond(reply, result);
            }
            Event::ConnectFailed { role, error, reply } => {
                warn!(%role, error = %error, "connect failed");
                respond(reply, Err(error.into()));
            }
        }
    }

    async fn ingest(&mut self, id: ConnectionId, bytes: &[u8]) {
        // Events can trail a removal; those bytes belong to nobody now.
        let Some(role) = self.ctx.registry.role(id) else {
            return;
        };
        let Some(decoder) = self.ctx.registry.decoder_mut(id) else {
            // Command links carry nothing inbound; only their close matters.
            if bytes.is_empty() {
                self.remove_connection(id, "peer closed").await;
            } else {
                debug!(%id, %role, len = bytes.len(), "discarding bytes from command link");
            }
            return;
        };

        if decoder.feed(bytes) == Fed::Eof {
            self.remove_connection(id, "peer closed").await;
            return;
        }

        let snapshot = &self.ctx.snapshot;
        for frame in decoder.drain() {
            // Corrupt frames were already logged by the decoder.
            if let Ok(values) = frame {
                let reading = snapshot.publish(role.device, values);
                debug!(%id, device = %role.device, sequence = reading.sequence, "telemetry");
            }
        }
    }

    async fn drain(&mut self) {
        self.ctx.queue.close();
        while let Ok(envelope) = self.ctx.queue.try_recv() {
            respond(envelope.reply, Err(ConsoleError::ShuttingDown));
        }
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                Event::Connected { reply, .. } | Event::ConnectFailed { reply, .. } => {
                    respond(reply, Err(ConsoleError::ShuttingDown));
                }
                Event::Read { .. } | Event::ReadFailed { .. } => {}
            }
        }

        let removed = self.ctx.registry.remove_all();
        let count = removed.len();
        for (role, mut conn, info) in removed {
            conn.close(self.config.write_timeout).await;
            debug!(id = %info.id, %role, "connection closed");
        }

        self.state = MuxState::Stopped;
        info!(connections = count, "console stopped");
    }
}

fn respond(reply: Option<Reply>, result: Result<Outcome>) {
    if let Err(err) = &result {
        debug!(error = %err, "request failed");
    }
    if let Some(reply) = reply {
        // The submitter may have stopped waiting.
        let _ = reply.send(result);
    }
}

async fn read_loop<R>(id: ConnectionId, mut reader: R, events: mpsc::Sender<Event>, chunk: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(chunk);
    loop {
        buf.reserve(chunk);
        let event = match reader.read_buf(&mut buf).await {
            Ok(0) => {
                let _ = events.send(Event::Read { id, bytes: Bytes::new() }).await;
                return;
            }
            Ok(_) => Event::Read {
                id,
                bytes: buf.split().freeze(),
            },
            Err(error) => {
                let _ = events.send(Event::ReadFailed { id, error }).await;
                return;
            }
        };
        if events.send(event).await.is_err() {
            return;
        }
    }
}
