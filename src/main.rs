//! Codex - game companion database with community corrections

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use codex::{
    config::Args,
    corrections::CorrectionDoc,
    db::{self, DocumentStore, MongoClient, MongoStore, CORRECTION_COLLECTION, USER_COLLECTION},
    seed, server,
    users::UserDoc,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| args.default_log_filter().into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!(
        "  Codex {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("CODEX_COMMIT").unwrap_or("unknown")
    );
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} / {}", args.mongodb_uri, args.mongodb_db);
    info!("======================================");

    // Connect to MongoDB (in-memory fallback in dev mode)
    let store: Arc<dyn DocumentStore> = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            let store = MongoStore::new(&client);
            store.ensure_indexes::<UserDoc>(USER_COLLECTION).await?;
            store.ensure_indexes::<CorrectionDoc>(CORRECTION_COLLECTION).await?;
            Arc::new(store)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                Arc::new(db::memory_store())
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let state = Arc::new(AppState::new(args, store)?);

    if let Some(ref path) = state.args.seed_file {
        seed::load_seed_file(path, &state.registry, &state.entities, &state.users).await?;
    }

    server::run(state).await?;
    Ok(())
}
