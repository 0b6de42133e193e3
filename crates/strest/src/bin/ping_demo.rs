//! Starts a bare server (no sharding) on the default ports, then dials it
//! over the binary transport and fires one `/ping`. Exercises the
//! end-to-end request/response path across the binary codec, the router,
//! and the connection pool in one process.

use std::time::Duration;

use strest::client::{ClientConfig, Pool};
use strest::protocol::{Method, Request};
use strest::server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    strest::init_tracing();

    let config = ServerConfig::default()
        .json_bind_addr("127.0.0.1:8009")
        .binary_bind_addr("127.0.0.1:8010")
        .http_bind_addr("127.0.0.1:8011");
    let binary_addr = config.binary_bind_addr.clone();
    let server = Server::new(config);

    tokio::spawn(async move {
        if let Err(err) = server.run().await {
            tracing::error!(%err, "server exited");
        }
    });

    // Give the listeners a moment to bind before dialing in.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let pool = Pool::connect(ClientConfig::new(binary_addr).pool_size(1)).await?;
    let resp = pool.call(Request::new("/ping", Method::Get)).await?;
    println!("ping -> status {} txn {}", resp.status_code, resp.txn_id);

    Ok(())
}
