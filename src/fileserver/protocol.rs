use std::net::SocketAddr;
use std::path::{Component, Path};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;

use crate::error::Error;

/// The two-command line protocol: one command per connection, one response,
/// then the connection closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Index,
    Get(String),
    Unsupported(String),
}

/// Parse the single command line. Keywords are case-insensitive.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.eq_ignore_ascii_case("index") {
        return Command::Index;
    }
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };
    if keyword.eq_ignore_ascii_case("get") {
        Command::Get(rest.to_string())
    } else {
        Command::Unsupported(line.to_string())
    }
}

/// Handle one connection end to end: read the command line, respond, close.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    directory: &Path,
) -> Result<(), Error> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        // Client went away before sending anything.
        return Ok(());
    }

    let mut writer = BufWriter::new(write_half);
    match parse_command(&line) {
        Command::Index => send_index(directory, &mut writer).await?,
        Command::Get(name) => send_file(directory, &name, &mut writer).await?,
        Command::Unsupported(command) => {
            log::debug!("{addr}: {}", Error::Protocol(command.clone()));
            writer
                .write_all(format!("UNSUPPORTED {command}\n").as_bytes())
                .await?;
        }
    }
    writer.flush().await?;
    writer.into_inner().shutdown().await?;

    log::info!("{addr}: handled {:?}", line.trim());
    Ok(())
}

/// Respond to INDEX: one entry name per line from the served directory,
/// non-recursive, then close.
async fn send_index(directory: &Path, writer: &mut BufWriter<OwnedWriteHalf>) -> Result<(), Error> {
    let mut entries = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        // Raw bytes, so non-UTF-8 entry names survive the listing.
        let name = entry.file_name();
        writer.write_all(name.as_encoded_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    Ok(())
}

/// Respond to GET: "OK" then the raw file bytes, or "ERROR" with no body if
/// the name is not a plain readable file in the served directory.
async fn send_file(
    directory: &Path,
    name: &str,
    writer: &mut BufWriter<OwnedWriteHalf>,
) -> Result<(), Error> {
    if !is_plain_file_name(name) {
        writer.write_all(b"ERROR\n").await?;
        return Ok(());
    }
    let path = directory.join(name);
    let mut file = match File::open(&path).await {
        Ok(file) => file,
        Err(source) => {
            log::debug!(
                "{}",
                Error::FileAccess {
                    path: path.clone(),
                    source,
                }
            );
            writer.write_all(b"ERROR\n").await?;
            return Ok(());
        }
    };
    if file.metadata().await?.is_dir() {
        writer.write_all(b"ERROR\n").await?;
        return Ok(());
    }
    writer.write_all(b"OK\n").await?;
    tokio::io::copy(&mut file, writer).await?;
    Ok(())
}

/// A requested name must be a single normal path component: no separators,
/// no parent-directory escapes, not empty.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
