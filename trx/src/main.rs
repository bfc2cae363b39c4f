//! The TRX runtime binary: wires a `Module` to a database driver and the
//! Procedure Invoker, then serves it over the HTTP Dispatcher (§6.1).
//!
//! Parsing TRX source into a `Module` is out of scope (§1) — this binary
//! builds its demo module directly as Rust values, the same way the
//! reference framework's example app builds its routes and state in
//! `main.rs` instead of loading them from a descriptor file.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use trx_core::{DbConfig, TrxConfig};
use trx_exec::Interpreter;
use trx_sql::DbDriver;

mod demo;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".parse().unwrap()))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining in-flight requests");
}

async fn build_driver(config: &DbConfig) -> Result<Arc<dyn DbDriver>, trx_core::TrxError> {
    match config.kind {
        trx_core::DbKind::Sqlite => {
            let url = config
                .connection_string
                .clone()
                .or_else(|| config.database_path.clone().map(|p| format!("sqlite://{p}?mode=rwc")))
                .unwrap_or_else(|| "sqlite::memory:".to_string());
            let driver = trx_sql::SqliteDriver::connect(&url).await?;
            Ok(Arc::new(driver))
        }
        trx_core::DbKind::Postgres | trx_core::DbKind::Odbc => Err(trx_core::TrxError::internal(
            "this binary only wires up the sqlite and in-memory reference drivers; \
             Postgres/ODBC require an embedding application to supply its own DbDriver",
        )),
    }
}

async fn run() -> Result<(), trx_core::TrxError> {
    init_tracing();

    let config = TrxConfig::new(DbConfig::in_memory_sqlite()).apply_env_overlay();
    let module = demo::module();

    if module.exported_procedures().next().is_none() {
        return Err(trx_core::TrxError::internal("module exports no HTTP procedures"));
    }

    let driver: Arc<dyn DbDriver> = if std::env::var("TRX_DB_TYPE").map(|v| v.eq_ignore_ascii_case("memory")).unwrap_or(true)
        && config.db.connection_string.is_none()
    {
        Arc::new(trx_sql::MemoryDriver::new())
    } else {
        build_driver(&config.db).await?
    };
    driver.initialize().await?;
    for table in &module.tables {
        driver.create_or_migrate_table(&table.name, &table.columns).await?;
    }

    let interpreter = Arc::new(Interpreter::new(module, driver));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let shutdown = CancellationToken::new();

    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            trx_http::serve(
                addr,
                interpreter,
                "TRX Runtime",
                env!("CARGO_PKG_VERSION"),
                config.default_procedure.as_deref(),
                trx_http::PoolConfig { worker_count: config.thread_count, queue_capacity: 1024 },
                shutdown,
            )
            .await
        })
    };

    shutdown_signal().await;
    shutdown.cancel();

    server
        .await
        .map_err(|e| trx_core::TrxError::internal(format!("server task panicked: {e}")))??;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "trx failed to start");
            eprintln!("trx: {e}");
            ExitCode::FAILURE
        }
    }
}
