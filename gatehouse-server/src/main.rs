//! Gatehouse: an authenticating, multiplexing MCP gateway

use gatehouse_server::startup;

#[tokio::main]
async fn main() {
    if let Err(err) = startup::run().await {
        eprintln!("gatehouse: {}", err);
        std::process::exit(err.exit_code());
    }
}
