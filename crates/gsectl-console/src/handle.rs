use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{ConsoleError, Result};
use crate::request::{parse_line, Outcome, Request};
use crate::snapshot::SnapshotReader;

/// Reply slot for a queued request.
pub type Reply = oneshot::Sender<Result<Outcome>>;

/// A request on its way to the multiplexer.
#[derive(Debug)]
pub struct Envelope {
    pub request: Request,
    pub reply: Option<Reply>,
}

impl Envelope {
    /// A request whose outcome nobody waits for.
    pub fn detached(request: Request) -> Self {
        Self {
            request,
            reply: None,
        }
    }
}

/// Producer side of the console: queue requests, read telemetry, stop the loop.
///
/// Clones share the same queue. When every handle is dropped the multiplexer
/// drains and stops.
#[derive(Debug, Clone)]
pub struct ConsoleHandle {
    queue: mpsc::Sender<Envelope>,
    snapshot: SnapshotReader,
    shutdown: CancellationToken,
}

impl ConsoleHandle {
    pub(crate) fn new(
        queue: mpsc::Sender<Envelope>,
        snapshot: SnapshotReader,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            snapshot,
            shutdown,
        }
    }

    /// Queue `request` and return the receiver for its outcome.
    pub async fn enqueue(&self, request: Request) -> Result<oneshot::Receiver<Result<Outcome>>> {
        let (tx, rx) = oneshot::channel();
        self.queue
            .send(Envelope {
                request,
                reply: Some(tx),
            })
            .await
            .map_err(|_| ConsoleError::QueueClosed)?;
        Ok(rx)
    }

    /// Queue `request` and wait for the multiplexer to apply it.
    pub async fn submit(&self, request: Request) -> Result<Outcome> {
        let rx = self.enqueue(request).await?;
        rx.await.map_err(|_| ConsoleError::QueueClosed)?
    }

    /// Parse one line of operator text and submit it.
    pub async fn submit_line(&self, line: &str) -> Result<Outcome> {
        let request = parse_line(line)?;
        self.submit(request).await
    }

    /// [`submit`](Self::submit) for threads outside the runtime.
    ///
    /// Panics if called from within an async context.
    pub fn blocking_submit(&self, request: Request) -> Result<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.queue
            .blocking_send(Envelope {
                request,
                reply: Some(tx),
            })
            .map_err(|_| ConsoleError::QueueClosed)?;
        rx.blocking_recv().map_err(|_| ConsoleError::QueueClosed)?
    }

    /// Queue `request` without waiting for its outcome.
    pub async fn send(&self, request: Request) -> Result<()> {
        self.queue
            .send(Envelope::detached(request))
            .await
            .map_err(|_| ConsoleError::QueueClosed)
    }

    /// Latest-telemetry view.
    pub fn snapshot(&self) -> SnapshotReader {
        self.snapshot.clone()
    }

    /// Ask the multiplexer to stop at its next iteration boundary.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token cancelled on shutdown; usable from signal handlers.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// True once the multiplexer has stopped taking requests.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}
