use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of the registry at the moment a presence event fired:
/// connection id mapped to approved display name, in id order.
pub type RegistrySnapshot = BTreeMap<u64, String>;

/// A routed unit of information pushed from the hub to clients.
///
/// Encoded on the wire as one JSON object per line. `sender_id` is always
/// stamped by the hub from the authenticated connection, never taken from
/// client input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Broadcast {
        sender_id: u64,
        body: String,
    },
    Private {
        sender_id: u64,
        recipient_id: u64,
        body: String,
    },
    PresenceJoined {
        new_id: u64,
        registry: RegistrySnapshot,
    },
    PresenceLeft {
        departed_id: u64,
        departed_name: String,
        registry: RegistrySnapshot,
    },
}

/// A frame sent from a client to the hub after the handshake.
///
/// `Private` accepts a `sender_id` field so that a forged value can be parsed
/// at all; the hub discards it and stamps the real sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Chat {
        body: String,
    },
    Private {
        #[serde(default)]
        sender_id: u64,
        recipient_id: u64,
        body: String,
    },
    Leave,
}
