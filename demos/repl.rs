//! Line-oriented shell over an in-memory broker.
//!
//! Reads commands from stdin, one per line, and prints what each one did.
//! Event payloads are loaded from `<key>.json` files in `$TRIBUTARY_EVENTS_DIR`
//! (default `demos/events`). Set `RUST_LOG` to see broker traces on stderr.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tributary::command::{Command, CommandError};
use tributary::{BrokerBuilder, DirectoryPayloads};

const DEFAULT_EVENTS_DIR: &str = "demos/events";

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let dir = std::env::var("TRIBUTARY_EVENTS_DIR").unwrap_or_else(|_| DEFAULT_EVENTS_DIR.into());
    info!(%dir, "loading event payloads");
    let broker = BrokerBuilder::new(DirectoryPayloads::new(dir)).build();

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let output = match Command::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => command
                .execute(&broker)
                .await
                .map_err(CommandError::from),
            Err(e) => Err(e.into()),
        };

        match output {
            Ok(text) => stdout.write_all(text.as_bytes()).await?,
            Err(e) => stdout.write_all(format!("Error: {e}\n").as_bytes()).await?,
        }
        stdout.flush().await?;
    }

    Ok(())
}
