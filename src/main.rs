// FloeDB server entrypoint
//!
//! Wires configuration, logging, the object store, the catalog variant and
//! the table engine together, then serves the operation protocol over HTTP.

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use floedb_catalog::{Catalog, RestCatalog, WarehouseCatalog};
use floedb_commons::settings::{CatalogType, EngineSettings};
use floedb_core::TableEngine;
use floedb_server::config::ServerConfig;
use floedb_server::routes::{self, AppState};
use log::info;
use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use std::sync::Arc;

mod logging;

#[actix_web::main]
async fn main() -> Result<()> {
    // Load configuration (fallback to defaults when config file missing)
    let config = match ServerConfig::from_file("config.toml") {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Warning: failed to load config.toml: {}", e);
            eprintln!("Using defaults");
            ServerConfig::default()
        }
    };

    // Logging before any other side effects
    logging::init_logging(
        &config.logging.level,
        &config.logging.file_path,
        config.logging.log_to_console,
    )?;

    info!("FloeDB server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Host: {}  Port: {}  Environment: {:?}",
        config.server.host, config.server.port, config.engine.environment
    );

    let store = build_store(&config.engine)?;
    let catalog = build_catalog(&config.engine, store.clone())?;
    let engine = Arc::new(TableEngine::new(catalog, store, config.engine.clone()));

    let state = web::Data::new(AppState { engine });
    let bind = (config.server.host.clone(), config.server.port);
    info!("Listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .workers(config.server.workers)
    .bind(bind)?
    .run()
    .await
    .context("HTTP server terminated")
}

fn build_store(settings: &EngineSettings) -> Result<Arc<dyn ObjectStore>> {
    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(&settings.s3.bucket_name)
        .with_region(&settings.s3.region);
    if let Some(endpoint) = &settings.s3.endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(!settings.s3.use_ssl);
    }
    if settings.s3.path_style_access {
        builder = builder.with_virtual_hosted_style_request(false);
    }
    let store = builder.build().context("object store configuration")?;
    Ok(Arc::new(store))
}

fn build_catalog(
    settings: &EngineSettings,
    store: Arc<dyn ObjectStore>,
) -> Result<Arc<dyn Catalog>> {
    match settings.catalog.catalog_type {
        CatalogType::Rest => {
            let uri = settings
                .catalog
                .uri
                .as_ref()
                .context("catalog.uri is required for catalog type 'rest'")?;
            info!("Using REST catalog at {}", uri);
            Ok(Arc::new(RestCatalog::new(uri.clone())))
        }
        CatalogType::Warehouse => {
            info!(
                "Using storage-managed catalog under '{}'",
                settings.s3.warehouse_path
            );
            Ok(Arc::new(WarehouseCatalog::new(
                store,
                settings.s3.warehouse_path.clone(),
            )))
        }
    }
}
