//! Sender daemon: watches a folder and pushes every change across
//! the diode on a fixed interval.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use diode_core::{DEFAULT_CHUNK_SIZE, DiodeError, FolderSender, SenderConfig};

#[derive(Parser)]
#[command(
    name = "diode-sender",
    about = "One-way folder sender for data-diode links"
)]
struct Args {
    /// The folder to sync
    #[arg(short, long, default_value = ".")]
    folder: PathBuf,

    /// Destination host:port
    #[arg(short, long, default_value = "127.0.0.1:8963")]
    dest: String,

    /// Maximum size of each datagram, header included
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Transmit rate cap in bytes per second (0 = unlimited)
    #[arg(short, long, default_value_t = 200_000)]
    limit: u64,

    /// Number of times to emit each fragment
    #[arg(short, long, default_value_t = 2)]
    repeats: u32,

    /// Seconds to wait between sync cycles
    #[arg(short, long, default_value_t = 5)]
    interval: u64,
}

fn main() -> Result<(), DiodeError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = SenderConfig {
        chunk_size: args.chunk_size,
        max_bytes_per_second: args.limit,
        transmit_repeats: args.repeats,
    };
    let sender = FolderSender::new(&args.folder, args.dest.as_str(), config)?;

    info!(interval = args.interval, "entering sync loop");
    loop {
        sender.perform_sync()?;
        thread::sleep(Duration::from_secs(args.interval));
    }
}
