//! Per-connection session state
//!
//! A session exists from accept to socket close. Its outbound side is an
//! mpsc channel: every producer (the session's own loop, other sessions'
//! broadcasts) enqueues frames, and a single writer task per connection
//! owns the socket sink, so frames never interleave mid-write.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use parley_protocol::ServerFrame;

/// Process-unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next session id
    pub fn next() -> Self {
        static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Cloneable handle to one connection's outbound path
///
/// Sends are non-blocking: delivery is best-effort and a slow peer must
/// never stall the registry or another connection's loop.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    outbound: mpsc::Sender<ServerFrame>,
}

impl SessionHandle {
    /// Create a handle around a connection's outbound channel
    pub fn new(outbound: mpsc::Sender<ServerFrame>) -> Self {
        Self {
            id: SessionId::next(),
            outbound,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Enqueue one frame for this session's writer task
    ///
    /// Returns false when the connection is gone (channel closed). A full
    /// queue drops the frame: the peer is too slow and delivery is
    /// best-effort.
    pub fn send(&self, frame: ServerFrame) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("{}: outbound queue full, frame dropped", self.id);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("{}: outbound channel closed", self.id);
                false
            }
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("outbound_closed", &self.outbound.is_closed())
            .finish()
    }
}
