//! # Stand-in Service Binary
//!
//! Serves the cloaking and verification endpoints locally so the client can
//! be exercised without the real engines.
//!
//! ```bash
//! cargo run --bin stub_server -- --address 127.0.0.1:8000
//! ```

use clap::Parser;

use invisiface::common::logging::init_logger;
use invisiface::stub;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    address: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let listener = tokio::net::TcpListener::bind(&args.address).await?;
    stub::serve(listener).await
}
