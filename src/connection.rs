use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

use crate::models::envelope::{ClientFrame, Envelope};
use crate::state::HubState;

/// Full lifecycle of one accepted hub connection: handshake, registration,
/// read loop, deregistration. Runs inside its own task; nothing here may
/// escape to the accept loop or to other connections.
pub(crate) async fn handle_connection(
    state: Arc<HubState>,
    id: u64,
    stream: TcpStream,
    addr: SocketAddr,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // Handshake: the first line is the requested display name. A client that
    // fails here is dropped before registration and never announced.
    let requested = match lines.next_line().await {
        Ok(Some(line)) => line,
        Ok(None) | Err(_) => {
            log::debug!("client {id}: closed during handshake");
            return;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let approved = state.register(id, &requested, addr, tx).await;

    if write_half
        .write_all(format!("{approved}\n").as_bytes())
        .await
        .is_err()
    {
        // Could not confirm the name, so the client was never really in.
        state.remove_quiet(id).await;
        log::debug!("client {id}: lost during handshake reply");
        return;
    }

    log::info!("client {id} ({approved}) joined from {addr}");

    // Writer task drains the peer's outbound queue. Registration completed
    // before this point, so queued envelopes follow the approved-name line.
    let writer_task = tokio::spawn(write_loop(rx, write_half));

    state.announce_join(id).await;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ClientFrame>(line) {
                    Ok(frame) => {
                        if route(&state, id, frame).await.is_break() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("client {id}: ignoring malformed frame: {e}"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::debug!("client {id}: transport error: {e}");
                break;
            }
        }
    }

    if let Some(peer) = state.deregister(id).await {
        let seconds = (Utc::now() - peer.connected_at).num_seconds();
        log::info!("client {id} ({approved}) left after {seconds}s");
    }
    writer_task.abort();
}

/// Route one inbound frame. The sender identity always comes from the
/// connection, never from the frame itself.
async fn route(
    state: &HubState,
    sender_id: u64,
    frame: ClientFrame,
) -> std::ops::ControlFlow<()> {
    match frame {
        ClientFrame::Chat { body } => {
            state
                .broadcast(Envelope::Broadcast { sender_id, body })
                .await;
        }
        ClientFrame::Private {
            recipient_id, body, ..
        } => {
            let envelope = Envelope::Private {
                sender_id,
                recipient_id,
                body,
            };
            if !state.send_to(recipient_id, envelope).await {
                // Recipient already gone: dropped without telling the sender.
                log::debug!(
                    "client {sender_id}: dropped private message for unknown client {recipient_id}"
                );
            }
        }
        ClientFrame::Leave => return std::ops::ControlFlow::Break(()),
    }
    std::ops::ControlFlow::Continue(())
}

async fn write_loop(mut rx: mpsc::UnboundedReceiver<Envelope>, mut writer: OwnedWriteHalf) {
    while let Some(envelope) = rx.recv().await {
        let mut line = match serde_json::to_string(&envelope) {
            Ok(line) => line,
            Err(e) => {
                log::error!("could not encode envelope: {e}");
                continue;
            }
        };
        line.push('\n');
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
}
