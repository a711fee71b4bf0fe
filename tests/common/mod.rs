#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use wirehub::models::envelope::Envelope;
use wirehub::state::HubState;
use wirehub::{FileServer, Hub, HubClient};

/// Start a hub on an ephemeral port and run it in the background.
pub async fn start_hub() -> (SocketAddr, Arc<HubState>) {
    let hub = Hub::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = hub.local_addr().unwrap();
    let state = hub.state();
    tokio::spawn(hub.run());
    (addr, state)
}

/// Start a file server over `directory` with the given pool geometry.
pub async fn start_file_server(
    directory: &Path,
    workers: usize,
    queue_capacity: usize,
) -> SocketAddr {
    let server = FileServer::bind(("127.0.0.1", 0), directory)
        .await
        .unwrap()
        .with_pool(workers, queue_capacity);
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

/// A freshly connected client's own id, taken from the PresenceJoined
/// envelope the hub pushes right after the handshake.
pub async fn own_id(client: &mut HubClient) -> u64 {
    match next_within(client, Duration::from_secs(2)).await {
        Envelope::PresenceJoined { new_id, .. } => new_id,
        other => panic!("expected PresenceJoined first, got {:?}", other),
    }
}

/// Drain envelopes until the join announcement for `id` has been seen.
pub async fn wait_for_join_of(client: &mut HubClient, id: u64) {
    loop {
        if let Envelope::PresenceJoined { new_id, .. } =
            next_within(client, Duration::from_secs(2)).await
        {
            if new_id == id {
                return;
            }
        }
    }
}

/// Next envelope, failing the test if none arrives in time.
pub async fn next_within(client: &mut HubClient, timeout: Duration) -> Envelope {
    tokio::time::timeout(timeout, client.next_envelope())
        .await
        .expect("timed out waiting for an envelope")
        .expect("connection closed while waiting for an envelope")
}

/// Assert that no envelope arrives within `timeout`.
pub async fn expect_silence(client: &mut HubClient, timeout: Duration) {
    if let Ok(envelope) = tokio::time::timeout(timeout, client.next_envelope()).await {
        panic!("expected no envelope, got {:?}", envelope);
    }
}

/// Send one file-server command and collect the whole response.
pub async fn request(addr: SocketAddr, command: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("{command}\n").as_bytes())
        .await
        .unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}
