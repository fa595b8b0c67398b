use std::{process, sync::Arc, time::Duration};

use bizdash::{
    application::{
        dashboard::{DashboardService, OrdersQuery, StatsQuery, TopClientsQuery},
        error::AppError,
        repos::StatsRepo,
    },
    cache::{CacheContext, ChannelError, KeyValueStorage, LocalBroadcaster, MemoryStorage},
    config,
    domain::types::MonthFilter,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        notify::{PgBroadcaster, PgChangeFeed},
        storage::FileStorage,
        telemetry,
    },
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
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

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
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
        .unwrap_or(config::Command::Listen(config::ListenArgs::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Listen(_) => run_listen(settings).await,
        config::Command::Stats(args) => run_stats(settings, args).await,
        config::Command::Orders(args) => run_orders(settings, args).await,
        config::Command::TopClients(args) => run_top_clients(settings, args).await,
        config::Command::Invalidate(args) => run_invalidate(settings, args).await,
        config::Command::Purge => run_purge(settings).await,
        config::Command::Migrate => run_migrate(settings).await,
    }
}

const LISTENER_CHECK_INTERVAL: Duration = Duration::from_secs(5);

async fn run_listen(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let cache = build_cache_context(&settings, &repositories)?;

    cache
        .start_listener()
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        session_id = %cache.session_id(),
        broadcast_channel = %settings.notify.broadcast_channel,
        "Listening for cache invalidations; press Ctrl-C to stop"
    );

    let mut watchdog = tokio::time::interval(LISTENER_CHECK_INTERVAL);
    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal.map_err(InfraError::from),
            _ = watchdog.tick() => {
                if !cache.is_listening() {
                    break Err(InfraError::from(ChannelError::Connect(
                        "cache listener stopped unexpectedly".to_string(),
                    )));
                }
            }
        }
    };
    cache.shutdown().await;
    outcome.map_err(AppError::from)
}

async fn run_stats(settings: config::Settings, args: config::StatsArgs) -> Result<(), AppError> {
    let month: MonthFilter = args.month.parse()?;
    let (service, cache) = build_dashboard(&settings).await?;
    let stats = service
        .dashboard_stats(StatsQuery::new(args.year, month))
        .await;
    cache.shutdown().await;
    print_json(&stats?)
}

async fn run_orders(settings: config::Settings, args: config::OrdersArgs) -> Result<(), AppError> {
    let (service, cache) = build_dashboard(&settings).await?;
    let page = service
        .orders_list(OrdersQuery::new(args.year, args.page, args.page_size))
        .await;
    cache.shutdown().await;
    print_json(&page?)
}

async fn run_top_clients(
    settings: config::Settings,
    args: config::TopClientsArgs,
) -> Result<(), AppError> {
    let (service, cache) = build_dashboard(&settings).await?;
    let clients = service
        .top_clients(TopClientsQuery::new(args.year, args.limit))
        .await;
    cache.shutdown().await;
    print_json(&clients?)
}

async fn run_invalidate(
    settings: config::Settings,
    args: config::InvalidateArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let cache = build_cache_context(&settings, &repositories)?;

    let event = cache
        .invalidation()
        .invalidate(args.entity, args.id.as_deref())
        .await;
    cache.shutdown().await;
    print_json(&event)
}

async fn run_purge(settings: config::Settings) -> Result<(), AppError> {
    // Purging only touches local storage; peers need no notification.
    let cache = CacheContext::new(
        settings.cache.clone(),
        open_storage(&settings)?,
        Arc::new(LocalBroadcaster::new()),
    );
    let removed = cache.store().purge_expired();
    info!(removed, "Purged expired cache entries");
    cache.shutdown().await;
    print_json(&serde_json::json!({ "removed": removed }))
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    info!("Database migrations are up to date");
    Ok(())
}

async fn build_dashboard(
    settings: &config::Settings,
) -> Result<(DashboardService, CacheContext), AppError> {
    let repositories = init_repositories(settings).await?;
    let cache = build_cache_context(settings, &repositories)?;
    let stats_repo: Arc<dyn StatsRepo> = repositories;
    let service = DashboardService::new(stats_repo, cache.store().clone());
    Ok((service, cache))
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_cache_context(
    settings: &config::Settings,
    repositories: &PostgresRepositories,
) -> Result<CacheContext, AppError> {
    let pool = repositories.pool().clone();
    let broadcaster = Arc::new(PgBroadcaster::new(
        pool.clone(),
        settings.notify.broadcast_channel.clone(),
    ));

    let mut cache = CacheContext::new(settings.cache.clone(), open_storage(settings)?, broadcaster);
    if settings.notify.listen_table_changes {
        cache = cache.with_change_feed(Arc::new(PgChangeFeed::new(
            pool,
            settings.notify.change_channel.clone(),
        )));
    }
    Ok(cache)
}

fn open_storage(settings: &config::Settings) -> Result<Arc<dyn KeyValueStorage>, AppError> {
    if !settings.cache.enable_persistent_tier {
        return Ok(Arc::new(MemoryStorage::new()));
    }
    let storage = FileStorage::open(&settings.cache.storage_dir)
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    Ok(Arc::new(storage))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
