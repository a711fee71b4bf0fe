pub mod client;
pub mod error;
pub mod fileserver;
pub mod models;
pub mod server;
pub mod state;
pub mod utils;

mod connection;

pub use client::HubClient;
pub use error::Error;
pub use fileserver::FileServer;
pub use server::Hub;
