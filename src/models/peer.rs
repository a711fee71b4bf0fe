use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::models::envelope::Envelope;

/// One registered chat participant as tracked by the hub.
///
/// The hub never writes to a peer's socket directly; it enqueues envelopes
/// here and the peer's writer task drains them, so a slow client cannot stall
/// a delivery walk.
pub struct Peer {
    pub id: u64,
    pub name: String,
    pub addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub tx: mpsc::UnboundedSender<Envelope>,
}

impl Peer {
    pub fn deliver(&self, envelope: Envelope) -> Result<(), Error> {
        self.tx.send(envelope).map_err(|_| Error::Routing(self.id))
    }
}
