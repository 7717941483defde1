//! Message fan-out
//!
//! Delivery of one logical frame to one or many sessions. All sends are
//! non-blocking enqueues onto per-session channels; the socket writes
//! happen on each connection's writer task. A failed recipient never
//! aborts delivery to the rest — its own connection loop is responsible
//! for teardown.

use tracing::debug;

use parley_protocol::ServerFrame;

use crate::session::SessionHandle;

/// Deliver one frame to a single session
///
/// Returns false when the session's connection is already gone.
pub fn unicast(session: &SessionHandle, frame: ServerFrame) -> bool {
    let delivered = session.send(frame);
    if !delivered {
        debug!("{}: unicast to dead session", session.id());
    }
    delivered
}

/// Deliver the same frame to each session in turn
///
/// Returns the number of sessions the frame was enqueued for.
pub fn multicast<'a, I>(sessions: I, frame: &ServerFrame) -> usize
where
    I: IntoIterator<Item = &'a SessionHandle>,
{
    let mut delivered = 0;
    for session in sessions {
        if unicast(session, frame.clone()) {
            delivered += 1;
        }
    }
    delivered
}
