//! Serve command - run the map tile endpoint until Ctrl+C.

use std::net::SocketAddr;
use std::sync::Arc;

use cityaq::config::ConfigFile;
use tokio::net::TcpListener;
use tracing::info;

use super::common::ServiceRunner;
use crate::error::CliError;

pub struct ServeArgs {
    pub listen: Option<SocketAddr>,
}

pub fn run(config: &ConfigFile, args: ServeArgs) -> Result<(), CliError> {
    let listen = args.listen.unwrap_or(config.server.listen);
    let runner = ServiceRunner::new(config)?;
    let tiles = Arc::new(runner.service().tile_server());

    println!("CityAQ {}", cityaq::VERSION);
    println!("  Cities:   {}", config.cities.directory.display());
    println!("  Results:  {}", config.cache.directory.display());
    println!(
        "  Executor: {}",
        config.executor.url.as_deref().unwrap_or("local (screening model)")
    );
    println!("  Tiles:    http://{}/maptile", listen);
    println!();
    println!("Press Ctrl+C to stop");

    let listener = runner
        .runtime()
        .block_on(TcpListener::bind(listen))
        .map_err(|e| CliError::Config(format!("cannot listen on {}: {}", listen, e)))?;

    runner
        .runtime()
        .block_on(Arc::clone(&tiles).serve(listener, runner.cancellation()))?;

    let layers = tiles.stats();
    let simulations = runner.service().simulation_stats();
    info!(%layers, %simulations, "Server stopped");
    println!();
    println!("Session Summary");
    println!("───────────────");
    println!("  Map layers:  {}", layers);
    println!("  Simulations: {}", simulations);
    Ok(())
}
