//! Receiver daemon: listens for fragment datagrams and mirrors
//! completed archives into a folder.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::UdpSocket;
use tracing::info;

use diode_core::{DiodeError, FolderReceiver};

#[derive(Parser)]
#[command(
    name = "diode-receiver",
    about = "One-way folder receiver for data-diode links"
)]
struct Args {
    /// The folder to sync into
    #[arg(short, long, default_value = ".")]
    folder: PathBuf,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = 8963)]
    port: u16,

    /// Keep completed archives instead of deleting them
    #[arg(short, long)]
    keep_archives: bool,
}

#[tokio::main]
async fn main() -> Result<(), DiodeError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let receiver = FolderReceiver::new(&args.folder, !args.keep_archives)?;

    let socket = UdpSocket::bind(("0.0.0.0", args.port)).await?;
    info!(folder = %args.folder.display(), port = args.port, "listening for fragments");
    receiver.run(&socket).await
}
