use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use ksah::config;
use ksah::handler::StaticHandler;
use ksah::server::HttpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(pairs) = config::parse_pairs(&args) else {
        println!("{}", config::usage());
        return Ok(());
    };
    let Some(address) = config::bind_address(&pairs) else {
        println!("{}", config::usage());
        std::process::exit(2);
    };

    let address = tokio::net::lookup_host(&address)
        .await
        .with_context(|| format!("cannot resolve bind address {address}"))?
        .next()
        .with_context(|| format!("cannot resolve bind address {address}"))?;

    let server_options = config::server_options(&pairs);
    let static_options = config::static_options(&pairs);

    let handler = Arc::new(StaticHandler::new(&static_options).context("web root is not a directory")?);
    let server = HttpServer::bind(address, server_options, handler)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    info!("ksah running on {}", server.local_addr());

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    server.close();
    if !server.await_close(Duration::from_secs(2)).await {
        error!("unable to shutdown cleanly");
    }

    Ok(())
}
