//! Echo Client - connect, send a few commands, print what comes back.
//!
//! This example demonstrates:
//! - Building a connection with stats and an offline cache
//! - Queuing frames while disconnected and replaying them after connect
//! - Receiving payloads on the dedicated dispatch thread
//!
//! # Running against a local echo server
//!
//! ```sh
//! ncat -l -k 5042 --exec /bin/cat &
//! RUST_LOG=framewire=debug cargo run --example echo_client -- 127.0.0.1 5042
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use framewire::protocol::command_id;
use framewire::{CommandStats, Connection, MemoryCache};

fn command(id: u32, body: &str) -> Vec<u8> {
    let mut payload = id.to_be_bytes().to_vec();
    payload.extend_from_slice(body.as_bytes());
    payload
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = args.next().as_deref().unwrap_or("5042").parse()?;

    let cache = Arc::new(MemoryCache::new());
    let stats = Arc::new(CommandStats::new(16));
    let conn = Connection::builder()
        .offline_cache(cache.clone())
        .stats(stats.clone())
        .build()?;

    // Not connected yet: this lands in the cache
    conn.send(&command(1, "hello"))?;

    conn.connect(&host, port, |payload: Bytes| {
        let id = command_id(&payload).unwrap_or_default();
        println!(
            "command {id}: {}",
            String::from_utf8_lossy(payload.get(4..).unwrap_or_default())
        );
        true
    })?;

    conn.send_all(cache.take())?;
    for (id, body) in [(2, "from"), (3, "framewire")] {
        conn.send(&command(id, body))?;
    }

    thread::sleep(Duration::from_secs(1));
    conn.close();

    println!("{}", serde_json::to_string_pretty(&stats.snapshot())?);
    Ok(())
}
