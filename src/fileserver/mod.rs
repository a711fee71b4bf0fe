pub mod protocol;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, mpsc};

use crate::error::Error;

/// Number of connection-handling workers in the pool.
const WORKER_POOL_SIZE: usize = 10;

/// Capacity of the handoff queue between the accept loop and the workers.
/// Kept small: queued connections are waiting for service and should not
/// sit there long.
const CONNECTION_QUEUE_SIZE: usize = 5;

/// A file server that decouples its accept loop from request handling with a
/// fixed worker pool draining a bounded connection queue. When the queue is
/// full the accept loop blocks on the enqueue, pushing backpressure onto new
/// accept attempts instead of dropping accepted connections.
pub struct FileServer {
    listener: TcpListener,
    directory: PathBuf,
    workers: usize,
    queue_capacity: usize,
}

impl FileServer {
    pub async fn bind(addr: impl ToSocketAddrs, directory: impl Into<PathBuf>) -> Result<Self, Error> {
        let directory = directory.into();
        let metadata = tokio::fs::metadata(&directory)
            .await
            .map_err(|source| Error::FileAccess {
                path: directory.clone(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(Error::FileAccess {
                path: directory,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotADirectory,
                    "not a directory",
                ),
            });
        }

        let listener = TcpListener::bind(addr).await.map_err(Error::Bind)?;
        Ok(Self {
            listener,
            directory,
            workers: WORKER_POOL_SIZE,
            queue_capacity: CONNECTION_QUEUE_SIZE,
        })
    }

    /// Override the pool geometry. Mainly for tests that need to observe
    /// queue backpressure with a small pool.
    pub fn with_pool(mut self, workers: usize, queue_capacity: usize) -> Self {
        self.workers = workers;
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the worker pool, then accept connections forever, handing each
    /// one to the queue. There is no shutdown path; the process runs until
    /// terminated.
    pub async fn run(self) -> Result<(), Error> {
        let (queue_tx, queue_rx) = mpsc::channel::<(TcpStream, SocketAddr)>(self.queue_capacity);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let directory = Arc::new(self.directory);

        for worker_id in 0..self.workers {
            tokio::spawn(worker_loop(worker_id, queue_rx.clone(), directory.clone()));
        }

        if let Ok(addr) = self.listener.local_addr() {
            log::info!("file server listening on {addr}, serving {}", directory.display());
        }

        loop {
            let connection = self.listener.accept().await?;
            // Blocks while the queue is full.
            if queue_tx.send(connection).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// One pool worker: dequeue a connection, handle it fully, repeat. A failure
/// handling one connection is logged and the loop continues.
async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<(TcpStream, SocketAddr)>>>,
    directory: Arc<PathBuf>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some((stream, addr)) = next else {
            break;
        };
        if let Err(e) = protocol::handle_connection(stream, addr, &directory).await {
            log::warn!("worker {worker_id}: error handling {addr}: {e}");
        }
    }
}
