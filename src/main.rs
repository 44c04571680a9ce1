use anyhow::{Context, Result};
use idp_vault::api::{create_router, AppState};
use idp_vault::config::load_or_default;
use idp_vault::crypto::GeneratedKey;
use idp_vault::migration::SecretMigrator;
use idp_vault::providers::ProviderService;
use idp_vault::redirect::{RedirectCache, RedirectResolver};
use idp_vault::store::SqliteProviderStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

fn print_help() {
    eprintln!(
        r#"idp-vault - OAuth provider configuration service

USAGE:
    idp-vault [OPTIONS]

OPTIONS:
    -g, --generate-key   Print a new [[encryption.keys]] entry and exit
    -h, --help           Print this help

ENVIRONMENT VARIABLES:
    IDP_VAULT_CONFIG              Config file (default: idp-vault.toml)
    IDP_VAULT_ENCRYPTION_KEY      Base64 32-byte key, becomes the active key
    RUST_LOG                      Log level (default: idp_vault=info)
"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    if args.iter().any(|a| a == "--generate-key" || a == "-g") {
        // Add to the config and set active_key_id to start encrypting with it
        print!("{}", GeneratedKey::new().to_toml());
        return Ok(());
    }

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idp_vault=info".into()),
        )
        .init();

    info!("idp-vault starting...");

    let config_path =
        std::env::var("IDP_VAULT_CONFIG").unwrap_or_else(|_| "idp-vault.toml".to_string());
    let config = load_or_default(&config_path)?;

    info!(
        config_path = %config_path,
        bind_addr = %config.server.bind_addr,
        db_path = %config.database.path,
        admin_token = config.server.admin_token.is_some(),
        "Configuration loaded"
    );
    if config.server.admin_token.is_none() {
        warn!("No admin token configured; provider and admin routes are unrestricted");
    }

    let store = Arc::new(
        SqliteProviderStore::new(&config.database.path)
            .context("Failed to initialize provider store")?,
    );
    info!("Provider store initialized");

    let keyring = Arc::new(config.encryption.keyring()?);
    info!(
        active_key_id = %keyring.active_key_id(),
        key_count = keyring.key_ids().len(),
        "Keyring initialized"
    );

    let shutdown = CancellationToken::new();
    let cache = Arc::new(RedirectCache::new());
    let migrator = Arc::new(SecretMigrator::new(store.clone(), keyring.clone()));

    if config.encryption.migrate_on_start {
        let startup = Arc::clone(&migrator);
        let cancel = shutdown.clone();
        let report = tokio::task::spawn_blocking(move || startup.migrate(&cancel))
            .await
            .context("Start-up migration task failed")??;
        if report.failed() > 0 {
            warn!(
                failed = report.failed(),
                total = report.total,
                "Start-up migration left records unmigrated"
            );
        }
    }

    let providers = Arc::new(
        ProviderService::new(store.clone(), keyring.clone(), cache.clone())
            .with_listing(config.listing.clone()),
    );
    let resolver = Arc::new(
        RedirectResolver::new(store, keyring, cache)
            .with_default_redirect_url(config.login.default_redirect_url.clone()),
    );

    let state = AppState {
        providers,
        migrator,
        resolver,
        admin_token: config.server.admin_token.clone(),
        shutdown: shutdown.clone(),
    };
    let router = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(bind_addr = %config.server.bind_addr, "HTTP API listening");

    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "HTTP API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    shutdown.cancel();
    if let Err(e) = server_handle.await {
        warn!(error = %e, "HTTP API task ended abnormally");
    }
    info!("idp-vault stopped");

    Ok(())
}
