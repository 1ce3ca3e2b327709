use std::{process, sync::Arc, time::Duration};

use studycache::{
    application::error::AppError,
    cache::{CacheAdmin, CacheConfig, CacheMonitor, CacheStore, Clock, SystemClock},
    config,
    infra::{
        error::InfraError,
        http::{self, AdminState, PublicState},
        telemetry,
    },
};
use tokio::{sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    match command {
        config::Command::CheckConfig(_) => {
            println!("{settings:#?}");
            Ok(())
        }
        config::Command::Serve(_) => {
            telemetry::init(&settings.logging)?;
            run_serve(settings).await
        }
    }
}

struct ApplicationContext {
    public_state: PublicState,
    admin_state: AdminState,
}

fn build_application_context(settings: &config::Settings) -> ApplicationContext {
    let cache_config = CacheConfig::from(&settings.cache);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = Arc::new(CacheStore::with_clock(&cache_config, clock.clone()));
    let monitor = Arc::new(CacheMonitor::new(store.clone(), &cache_config));
    let admin = Arc::new(CacheAdmin::new(
        store.clone(),
        monitor,
        &cache_config,
        clock,
    ));

    ApplicationContext {
        public_state: PublicState::new(store),
        admin_state: AdminState::new(admin),
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings);
    app.admin_state.admin.monitor().initialize();

    let public_router = http::build_public_router(app.public_state);
    let admin_router = http::build_admin_router(app.admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target: "studycache::serve",
        public_addr = %settings.server.public_addr,
        admin_addr = %settings.server.admin_addr,
        "listening"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!(target: "studycache::serve", "shutdown requested, draining connections");
        let _ = stop_tx.send(true);
    });

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(stopped(stop_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(stopped(stop_rx.clone()));

    let servers = async { try_join!(public_server, admin_server) };
    let drain_deadline = drain_deadline(stop_rx, settings.server.graceful_shutdown);

    tokio::select! {
        result = servers => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = drain_deadline => {
            warn!(
                target: "studycache::serve",
                grace_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn drain_deadline(rx: watch::Receiver<bool>, grace: Duration) {
    stopped(rx).await;
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
