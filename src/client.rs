use std::io;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;

use crate::error::Error;
use crate::models::envelope::{ClientFrame, Envelope};

/// One chat participant's side of a hub connection.
///
/// `connect` performs the name handshake; after that a background reader task
/// feeds inbound envelopes into a queue consumed via [`HubClient::next_envelope`],
/// and frames given to [`HubClient::send`] go through a background writer
/// task, so sending is safe while a receive is in flight.
pub struct HubClient {
    name: String,
    outbound: Option<mpsc::UnboundedSender<ClientFrame>>,
    inbound: mpsc::UnboundedReceiver<Envelope>,
}

impl HubClient {
    pub async fn connect(addr: impl ToSocketAddrs, requested_name: &str) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await.map_err(Error::Connection)?;
        let (read_half, mut write_half) = stream.into_split();

        write_half
            .write_all(format!("{requested_name}\n").as_bytes())
            .await
            .map_err(Error::Connection)?;

        let mut lines = BufReader::new(read_half).lines();
        let approved = lines
            .next_line()
            .await
            .map_err(Error::Connection)?
            .ok_or_else(|| Error::Handshake("hub closed before approving a name".into()))?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(out_rx, write_half));
        tokio::spawn(async move {
            // Reader runs until the hub closes the stream or the client is dropped.
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<Envelope>(&line) {
                            Ok(envelope) => {
                                if in_tx.send(envelope).is_err() {
                                    break;
                                }
                            }
                            Err(e) => log::warn!("ignoring malformed envelope: {e}"),
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        });

        Ok(Self {
            name: approved,
            outbound: Some(out_tx),
            inbound: in_rx,
        })
    }

    /// The display name the hub approved, possibly suffixed ("Alice#2").
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send(&self, frame: ClientFrame) -> Result<(), Error> {
        let Some(outbound) = &self.outbound else {
            return Err(not_connected());
        };
        outbound.send(frame).map_err(|_| not_connected())
    }

    /// Next inbound envelope, or None once the connection has closed.
    pub async fn next_envelope(&mut self) -> Option<Envelope> {
        self.inbound.recv().await
    }

    /// Send an explicit departure notice and close the transport. Idempotent.
    ///
    /// Giving up the outbound sender ends the writer task once the notice has
    /// flushed, which shuts the write half down without waiting for the hub
    /// to react or for the handle to be dropped.
    pub fn disconnect(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(ClientFrame::Leave);
        }
    }
}

fn not_connected() -> Error {
    Error::Connection(io::Error::new(
        io::ErrorKind::NotConnected,
        "connection to hub is gone",
    ))
}

async fn write_loop(mut rx: mpsc::UnboundedReceiver<ClientFrame>, mut writer: OwnedWriteHalf) {
    while let Some(frame) = rx.recv().await {
        let mut line = match serde_json::to_string(&frame) {
            Ok(line) => line,
            Err(e) => {
                log::error!("could not encode frame: {e}");
                continue;
            }
        };
        line.push('\n');
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}
