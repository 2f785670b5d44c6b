use std::{future::IntoFuture, process, sync::Arc};

use quill::{
    application::error::AppError,
    cache::{CacheConfig, KeyValueCache, MemoryCache, NoopCache},
    config,
    infra::{
        db::{self, DocumentStore},
        error::InfraError,
        http::{self, HttpState},
        seed::SeedFixture,
        telemetry,
    },
};
use tokio::sync::Notify;
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Seed(args) => run_seed(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = db::connect(&settings.database).await?;

    if let Some(path) = settings.seed.path.as_deref() {
        seed_store(store.as_ref(), path).await?;
    }

    let cache_config = CacheConfig::from(&settings.cache);
    let cache: Arc<dyn KeyValueCache> = if cache_config.enabled {
        Arc::new(MemoryCache::new(&cache_config))
    } else {
        info!(target = "quill::cache", "Listing cache disabled");
        Arc::new(NoopCache)
    };

    let state = HttpState::new(store.clone(), cache.clone(), cache_config.ttl);
    let result = serve_http(&settings, state).await;

    store.close().await;
    if let Err(err) = cache.clear().await {
        warn!(target = "quill::cache", error = %err, "failed to clear cache on shutdown");
    }

    result
}

async fn run_seed(settings: config::Settings, args: config::SeedArgs) -> Result<(), AppError> {
    let store = db::connect(&settings.database).await?;
    if settings.database.url.is_none() {
        warn!(
            target = "quill::seed",
            "No database configured; fixture is validated into a throwaway in-memory store"
        );
    }

    let result = seed_store(store.as_ref(), &args.file).await;
    store.close().await;
    result
}

async fn seed_store(store: &dyn DocumentStore, path: &std::path::Path) -> Result<(), AppError> {
    info!(
        target = "quill::seed",
        path = %path.display(),
        backend = store.backend(),
        "Seeding document store"
    );

    let fixture = SeedFixture::load(path).await?;
    let report = fixture.apply(store).await?;

    info!(
        target = "quill::seed",
        documents = report.total(),
        "Seed completed"
    );
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(addr = %settings.server.addr, "Listening");

    let shutdown = Arc::new(Notify::new());
    let signalled = shutdown.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signalled.notify_one();
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            shutdown.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
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
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
