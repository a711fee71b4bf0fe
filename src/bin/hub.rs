use std::env;
use std::process;

use wirehub::Hub;

/// Port the chat hub listens on unless WIREHUB_PORT overrides it.
const DEFAULT_PORT: u16 = 37830;

#[tokio::main]
async fn main() {
    env_logger::init();

    let port: u16 = env::var("WIREHUB_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let hub = match Hub::bind(("0.0.0.0", port)).await {
        Ok(hub) => hub,
        Err(e) => {
            eprintln!("can't create listening socket on port {port}: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = hub.run().await {
        eprintln!("hub shut down unexpectedly: {e}");
        process::exit(1);
    }
}
