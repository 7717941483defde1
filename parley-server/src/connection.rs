//! Per-connection protocol loop
//!
//! One task per accepted connection reads frames and dispatches them
//! against the shared registry; a second task owns the write half and
//! drains the session's outbound channel, so concurrent producers never
//! interleave bytes mid-frame. Teardown runs on every exit path: one
//! logout, which broadcasts the updated lists when the session had
//! logged in.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use parley_protocol::{ClientFrame, ServerCodec, ServerFrame};

use crate::registry::{Delivery, GroupDelivery, Registry};
use crate::session::SessionHandle;

/// Outbound queue depth per connection
const OUTBOUND_BUFFER: usize = 64;

/// Drive one client connection from accept to teardown
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, registry: Arc<Registry>) {
    let (reader, writer) = stream.into_split();
    let mut frames = FramedRead::new(reader, ServerCodec::new());

    let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
    let session = SessionHandle::new(tx);
    let id = session.id();
    let writer_task = tokio::spawn(write_outbound(
        FramedWrite::new(writer, ServerCodec::new()),
        rx,
    ));

    debug!("{} connected from {}", id, addr);

    // Display name, assigned exactly once by a successful login
    let mut name: Option<String> = None;

    while let Some(result) = frames.next().await {
        let frame = match result {
            Ok(frame) => frame,
            Err(e) if e.is_fatal() => {
                warn!("{}: read failed: {}", id, e);
                break;
            }
            Err(e) => {
                // Malformed frame: drop it, keep the connection
                warn!("{}: dropping bad frame: {}", id, e);
                continue;
            }
        };

        match frame {
            ClientFrame::Login(requested) if name.is_none() => {
                if registry.try_login(&requested, session.clone()) {
                    name = Some(requested);
                } else {
                    // One login attempt per connection
                    session.send(ServerFrame::error("Username taken or invalid."));
                    break;
                }
            }
            frame => match name.as_deref() {
                Some(sender) => dispatch(&registry, sender, &session, frame),
                None => debug!("{}: ignoring {} before login", id, frame.command()),
            },
        }
    }

    if let Some(name) = name.as_deref() {
        registry.logout(id, name);
    } else {
        debug!("{} closed before login", id);
    }

    // Drop our sender so the writer flushes queued frames and exits
    drop(session);
    let _ = writer_task.await;
    debug!("{} torn down", id);
}

/// Handle one frame from an authenticated client
fn dispatch(registry: &Registry, sender: &str, session: &SessionHandle, frame: ClientFrame) {
    match frame {
        ClientFrame::Login(_) => {
            debug!("{} sent LOGIN while already logged in, ignoring", sender);
        }
        ClientFrame::PrivateMsg { recipient, message } => {
            if registry.send_private(sender, &recipient, &message) == Delivery::RecipientOffline {
                session.send(ServerFrame::error(format!(
                    "User '{}' is not online.",
                    recipient
                )));
            }
        }
        ClientFrame::CreateGroup(group) => registry.create_group(&group, sender),
        ClientFrame::JoinGroup(group) => registry.join_group(&group, sender),
        ClientFrame::GroupMsg { group, message } => {
            match registry.send_group(sender, &group, &message) {
                GroupDelivery::Delivered => {}
                GroupDelivery::NoSuchGroup => {
                    session.send(ServerFrame::error(format!("No such group '{}'.", group)));
                }
                GroupDelivery::NotAMember => {
                    session.send(ServerFrame::error(format!(
                        "Not a member of group '{}'.",
                        group
                    )));
                }
            }
        }
    }
}

/// Own the write half: drain the outbound channel into the socket
///
/// Exits when every sender is gone (queued frames are flushed first) or
/// on the first write error.
async fn write_outbound(
    mut sink: FramedWrite<OwnedWriteHalf, ServerCodec>,
    mut outbound: mpsc::Receiver<ServerFrame>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(frame).await {
            debug!("write failed: {}", e);
            break;
        }
    }
}
