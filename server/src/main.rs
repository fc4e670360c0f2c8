use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "server", about = "Serve boolean and ranked queries over a built index")]
struct Args {
    /// Directory written by `indexer build` (dictionary.txt, postings.txt, lengths.txt)
    #[arg(long, default_value = "index")]
    index: PathBuf,
    /// Socket address to listen on
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let app = server::build_app(&args.index)?;

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    tracing::info!(addr = %args.bind, index = %args.index.display(), "accepting queries");
    axum::serve(listener, app).await?;
    Ok(())
}
