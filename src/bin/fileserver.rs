use std::env;
use std::process;

use wirehub::FileServer;

/// Well-known file server port unless WIREHUB_FILES_PORT overrides it.
const DEFAULT_PORT: u16 = 3210;

#[tokio::main]
async fn main() {
    env_logger::init();

    let Some(directory) = env::args().nth(1) else {
        eprintln!("Usage: wirehub-files <directory>");
        process::exit(2);
    };

    let port: u16 = env::var("WIREHUB_FILES_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let server = match FileServer::bind(("0.0.0.0", port), &directory).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        eprintln!("file server shut down unexpectedly: {e}");
        process::exit(1);
    }
}
