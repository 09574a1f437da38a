use codepulse_lib::{
    cli::parse_args,
    config::Config,
    db::{build_db_pool, run_postgres_migrations},
    logging::{format_error_report, init_logging},
    server::setup_server_with_addr,
    state::AppState,
};
use diesel::{pg::PgConnection, Connection};
use std::process::ExitCode;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels the shared shutdown token on SIGTERM or SIGINT.
async fn handle_shutdown_signals(state: Arc<AppState>) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!(event = "shutdown_signal", signal = "SIGTERM", "SIGTERM received, shutting down");
        }
        _ = sigint.recv() => {
            info!(event = "shutdown_signal", signal = "SIGINT", "SIGINT received, shutting down");
        }
    }

    state.shutdown_token.cancel();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let args = parse_args();
    init_logging("codepulse", "server", &args.log_level);

    // A --database-url flag satisfies the DATABASE_URL requirement on its own.
    let cli_db_url = args.database_url.clone();
    let config = match Config::from_lookup(|key| match key {
        "DATABASE_URL" => cli_db_url.clone().or_else(|| std::env::var(key).ok()),
        _ => std::env::var(key).ok(),
    }) {
        Ok(config) => args.apply_overrides(config),
        Err(err) => {
            error!(event = "config_invalid", error = %format_error_report(&err), "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let addr = match config.bind_addr() {
        Ok(addr) => addr,
        Err(err) => {
            error!(event = "config_invalid", error = %err, "invalid bind address");
            return ExitCode::FAILURE;
        }
    };

    if args.skip_migrations {
        info!(event = "migrations_skipped", "skipping database migrations");
    } else {
        let applied = PgConnection::establish(&config.db_url)
            .map_err(|err| format_error_report(&err))
            .and_then(|mut conn| {
                run_postgres_migrations(&mut conn).map_err(|err| format_error_report(err.as_ref()))
            });
        match applied {
            Ok(versions) => {
                info!(event = "migrations_applied", count = versions.len(), versions = ?versions, "database migrations applied");
            }
            Err(report) => {
                error!(event = "migrations_failed", error = %report, "failed to run database migrations");
                return ExitCode::FAILURE;
            }
        }
    }

    let pool = match build_db_pool(&config.db_url, config.db_pool_max_size).await {
        Ok(pool) => pool,
        Err(err) => {
            error!(event = "pool_build_failed", error = %format_error_report(&err), "could not initialize DB pool");
            return ExitCode::FAILURE;
        }
    };

    let state = Arc::new(AppState::new(
        config.db_url.clone(),
        pool,
        CancellationToken::new(),
    ));
    let shutdown_handle = tokio::spawn(handle_shutdown_signals(state.clone()));

    let server_handle = match setup_server_with_addr(state.clone(), addr).await {
        Ok(handle) => handle,
        Err(err) => {
            error!(event = "server_bind_failed", %addr, error = %err, "failed to bind API server");
            return ExitCode::FAILURE;
        }
    };

    match shutdown_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(event = "signal_handler_failed", error = %err, "failed to register signal handlers");
            state.shutdown_token.cancel();
        }
        Err(err) => {
            error!(event = "signal_handler_failed", error = %err, "signal handler task failed");
            state.shutdown_token.cancel();
        }
    }

    if let Err(err) = server_handle.await {
        error!(event = "server_task_failed", error = %err, "API server task failed");
        return ExitCode::FAILURE;
    }

    info!(event = "shutdown_complete", "server stopped");
    ExitCode::SUCCESS
}
