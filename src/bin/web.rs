//! Earshot 只读查询接口
//!
//! 启动: cargo run --bin earshot-web --features web -- [config.toml]
//! 监听地址取 server.bind，可用 EARSHOT__SERVER__BIND 覆盖

#![cfg(feature = "web")]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use earshot::api;
use earshot::config::load_config;
use earshot::observability;
use earshot::store::SqliteStore;
use earshot::QueryService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let store = SqliteStore::open(&cfg.app.db_path)
        .with_context(|| format!("Failed to open {}", cfg.app.db_path.display()))?;
    let app = api::router(QueryService::new(Arc::new(store)));

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.bind))?;
    tracing::info!("Earshot query API: http://{}", cfg.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}
