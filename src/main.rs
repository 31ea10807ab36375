use std::{process, sync::Arc};

use fpcache::{
    application::{admin::AdminService, error::AppError, repos::ConfigStore},
    cache::{CacheConfig, CacheStore, PageCache, open_backend},
    config,
    infra::{
        config_store::TomlConfigStore,
        error::InfraError,
        http::{self, AdminState},
        telemetry,
    },
};
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

    let admin = build_admin_service(&settings).await;

    match command {
        config::Command::Serve(_) => run_serve(&settings, admin).await,
        config::Command::Clear => run_clear(admin).await,
        config::Command::SetBackend(args) => run_set_backend(admin, &args.name).await,
        config::Command::Backends => {
            run_backends(&admin);
            Ok(())
        }
    }
}

async fn build_admin_service(settings: &config::Settings) -> AdminService {
    let cache_config = CacheConfig::from(&settings.cache);
    let config_store: Arc<dyn ConfigStore> =
        Arc::new(TomlConfigStore::new(&settings.cache.settings_file));

    let kind = AdminService::persisted_backend(config_store.as_ref()).await;
    let store = Arc::new(CacheStore::new(open_backend(kind, &cache_config)));
    let cache = Arc::new(PageCache::new(cache_config, store));

    info!(
        backend = kind.as_str(),
        ttl_seconds = cache.config().ttl_seconds,
        debug_mode = cache.config().debug_mode,
        "Page cache ready"
    );

    AdminService::detached(cache, config_store)
}

async fn run_serve(settings: &config::Settings, admin: AdminService) -> Result<(), AppError> {
    let router = http::build_admin_router(AdminState { admin });
    let listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(addr = %settings.server.admin_addr, "Admin listener started");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!("Admin listener stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn run_clear(admin: AdminService) -> Result<(), AppError> {
    if !admin.reaches_host() {
        return Err(AppError::unexpected(format!(
            "the {} backend is private to each process; clear it from the host",
            admin.backend_status().active
        )));
    }
    if admin.clear_all().await {
        println!("page cache cleared ({})", admin.backend_status().active);
        Ok(())
    } else {
        Err(AppError::unexpected("page cache backend failed to clear"))
    }
}

async fn run_set_backend(admin: AdminService, name: &str) -> Result<(), AppError> {
    let status = admin.set_backend(name).await?;
    println!("page cache backend set to {}", status.active);
    Ok(())
}

fn run_backends(admin: &AdminService) {
    for option in admin.backend_status().supported {
        let marker = if option.active { "*" } else { " " };
        println!("{marker} {:<8} {}", option.name, option.title);
    }
}
