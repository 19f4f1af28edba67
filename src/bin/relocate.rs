//! Earshot 远端位置修复
//!
//! 按当前配置的 bucket/region 重算所有已上传容器的远端位置，
//! 并清空未上传容器上残留的远端位置。输出被改写的容器 ID（JSON）。
//!
//! 用法: cargo run --bin earshot-relocate -- [config.toml]

use std::path::PathBuf;

use anyhow::Context;
use earshot::config::load_config;
use earshot::lifecycle::reconcile_remote_locations;
use earshot::observability;
use earshot::store::SqliteStore;

fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    cfg.validate().context("Invalid config")?;

    let store = SqliteStore::open(&cfg.app.db_path)
        .with_context(|| format!("Failed to open {}", cfg.app.db_path.display()))?;
    let remote = cfg.remote_config();
    let changed = reconcile_remote_locations(&store, &remote).context("Relocation failed")?;

    tracing::info!(
        bucket = %remote.bucket,
        region = %remote.region,
        changed = changed.len(),
        "remote locations reconciled"
    );
    println!("{}", serde_json::to_string_pretty(&changed)?);
    Ok(())
}
