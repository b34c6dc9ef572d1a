use std::{future::IntoFuture, process, sync::Arc};

use pagelens::{
    application::{
        acquisition::{Acquirer, FixtureAcquirer},
        error::AppError,
        query::QueryService,
        repos::{PagesRepo, PagesWriteRepo},
        resolver::{PageLookup, PageResolver, ResolverConfig},
        summary::{Summarizer, SummaryService},
    },
    cache::{CacheConfig, MemoryCache, PageCache},
    config::{self, AcquisitionMode},
    infra::{
        acquisition::HttpAcquirer,
        db::{MemoryRepositories, PostgresRepositories},
        error::InfraError,
        http::{self, ApiState},
        summary::ChatCompletionsSummarizer,
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Resolve(args) => run_resolve(settings, args).await,
    }
}

struct Stores {
    pages: Arc<dyn PagesRepo>,
    writer: Arc<dyn PagesWriteRepo>,
}

async fn init_store(settings: &config::Settings) -> Result<Stores, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        warn!(
            target = "pagelens::startup",
            "database.url is not configured; pages are kept in memory and lost on exit"
        );
        let repositories = Arc::new(MemoryRepositories::new());
        return Ok(Stores {
            pages: repositories.clone(),
            writer: repositories,
        });
    };

    let repositories = Arc::new(
        PostgresRepositories::open(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| InfraError::database(err.to_string()))?,
    );

    Ok(Stores {
        pages: repositories.clone(),
        writer: repositories,
    })
}

fn build_acquirer(settings: &config::Settings) -> Result<Arc<dyn Acquirer>, AppError> {
    match settings.acquisition.mode {
        AcquisitionMode::Http => Ok(Arc::new(HttpAcquirer::new(&settings.acquisition)?)),
        AcquisitionMode::Fixture => {
            warn!(
                target = "pagelens::startup",
                "acquisition.mode = fixture; acquired pages are synthetic"
            );
            Ok(Arc::new(FixtureAcquirer::new()))
        }
    }
}

fn build_resolver(settings: &config::Settings, stores: &Stores) -> Result<PageResolver, AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let cache: Arc<dyn PageCache> = Arc::new(MemoryCache::new(&cache_config));

    Ok(PageResolver::new(
        stores.pages.clone(),
        stores.writer.clone(),
        cache,
        build_acquirer(settings)?,
        ResolverConfig {
            cache_ttl: cache_config.ttl,
            acquisition_timeout: settings.acquisition.timeout,
        },
    ))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let stores = init_store(&settings).await?;
    let resolver = Arc::new(build_resolver(&settings, &stores)?);
    let queries = Arc::new(QueryService::new(stores.pages.clone()));

    let summarizer = ChatCompletionsSummarizer::from_settings(&settings.summary)?
        .map(|summarizer| Arc::new(summarizer) as Arc<dyn Summarizer>);
    if summarizer.is_none() {
        info!(
            target = "pagelens::startup",
            "summary.api_key is not configured; summaries are generated offline"
        );
    }
    let lookup: Arc<dyn PageLookup> = resolver.clone();
    let summaries = Arc::new(SummaryService::new(lookup, summarizer));

    let router = http::build_router(ApiState {
        resolver,
        queries,
        summaries,
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "pagelens::startup",
        addr = %settings.server.addr,
        "listening"
    );

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.notified().await }
        })
        .into_future();
    tokio::pin!(server);

    let result = tokio::select! {
        result = &mut server => result,
        _ = shutdown_signal() => {
            info!(target = "pagelens::shutdown", "shutdown requested; draining connections");
            shutdown.notify_one();
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        target = "pagelens::shutdown",
                        timeout_secs = settings.server.graceful_shutdown.as_secs(),
                        "graceful shutdown timed out"
                    );
                    Ok(())
                }
            }
        }
    };

    result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn run_resolve(settings: config::Settings, args: config::ResolveArgs) -> Result<(), AppError> {
    let stores = init_store(&settings).await?;
    let resolver = build_resolver(&settings, &stores)?;

    let page = resolver.resolve(&args.page_id).await?;
    let rendered = serde_json::to_string_pretty(&page)
        .map_err(|err| AppError::unexpected(format!("failed to render page: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "pagelens::shutdown", error = %err, "ctrl-c handler failed");
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
                warn!(target = "pagelens::shutdown", error = %err, "SIGTERM handler failed");
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
}
