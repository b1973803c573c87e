#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use sentinel_rs::auth::Gate;
use sentinel_rs::identity::IdentityService;
use sentinel_rs::pricing::PerUnitRate;
use sentinel_rs::storage::sqlite::SqliteStore;
use sentinel_rs::usage::{Aggregator, Recorder};
use sentinel_rs::utils::logger;
use sentinel_rs::{init_env, AppContext, SESSION_SECRET, SQLITE_PATH, UNIT_RATE};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = logger::init("./logs".to_string())?;
    init_env();

    info!("Starting Sentinel service...");

    info!("Initializing Storage...");
    let store = Arc::new(SqliteStore::new(&SQLITE_PATH).await?);

    info!("Initializing Services...");
    let gate = Gate::new(store.clone(), store.clone());
    let recorder = Recorder::new(store.clone(), Arc::new(PerUnitRate::new(*UNIT_RATE)));
    let aggregator = Aggregator::new(store.clone());
    let identity = IdentityService::new(store.clone(), SESSION_SECRET.clone());

    let ctx = Arc::new(AppContext {
        gate: Arc::new(gate),
        recorder: Arc::new(recorder),
        aggregator: Arc::new(aggregator),
        identity: Arc::new(identity),
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], 7300));
    info!("Starting HTTP server at http://{}", addr);

    match sentinel_rs::web::start_server(ctx, addr).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            return Err(e);
        }
    }

    info!("Shutting down...");

    Ok(())
}
