use clap::Parser;

use tandem_server::relay::{self, RelayConfig};

/// Relay server for tandem collaborative editing sessions.
#[derive(Parser, Debug)]
#[command(name = "tandem-server", version, about)]
struct Args {
    /// Network address to listen on.
    #[arg(short, long, default_value = ":8080")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();
    let args = Args::parse();

    relay::serve(RelayConfig {
        addr: args.addr,
        ..RelayConfig::default()
    })
    .await
}
