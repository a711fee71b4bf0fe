use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, ToSocketAddrs};

use crate::connection;
use crate::error::Error;
use crate::state::HubState;

/// The broker: owns the client registry, accepts connections, and hands each
/// one to its own task so a slow client never blocks the accept loop.
pub struct Hub {
    state: Arc<HubState>,
    listener: TcpListener,
}

impl Hub {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await.map_err(Error::Bind)?;
        Ok(Self {
            state: Arc::new(HubState::new()),
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle on the shared state, mainly for inspection in tests.
    pub fn state(&self) -> Arc<HubState> {
        self.state.clone()
    }

    /// Accept loop. Runs until the listener itself fails; per-connection
    /// errors never propagate here.
    pub async fn run(self) -> Result<(), Error> {
        if let Ok(addr) = self.listener.local_addr() {
            log::info!("hub listening on {addr}");
        }
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let id = self.state.allocate_id();
            let state = self.state.clone();
            tokio::spawn(async move {
                connection::handle_connection(state, id, stream, addr).await;
            });
        }
    }
}
