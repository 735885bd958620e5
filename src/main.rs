//! Serves a graphite database over HTTP.
//!
//! Settings come from `graphite.toml` (or the file named by `GRAPHITE_CONFIG`)
//! and `GRAPHITE__SECTION__KEY` environment variables. `RUST_LOG` overrides
//! the configured log filter.
use graphite::config::Settings;
use graphite::construct::Database;
use graphite::interface::SharedDatabase;
use graphite::server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log.filter)),
        )
        .with_target(true)
        .init();

    info!(
        backend = ?settings.database.backend,
        path = ?settings.database.path,
        namespace = %settings.database.namespace,
        "opening database"
    );
    let database = Database::from_settings(&settings.database)?;
    info!(
        atoms = database.atom_count()?,
        max_transaction_id = ?database.max_transaction_id()?,
        "database ready"
    );

    let shared = SharedDatabase::new(database);
    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;
    info!(bind = %settings.server.bind, "listening");
    axum::serve(listener, server::router(shared)).await?;
    Ok(())
}
