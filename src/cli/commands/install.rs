//! Install command - precache the asset list and activate the worker

use crate::cli::args::InstallArgs;
use crate::config::{Config, ConfigManager};
use crate::error::PrecacheResult;
use crate::network::Fetcher;
use crate::ui::{self, InstallProgressBar, UiContext};
use crate::worker::{CacheFirstWorker, PartialFailurePolicy, WorkerContainer, WorkerHost};
use std::sync::Arc;

/// Execute the install command
pub async fn execute(args: InstallArgs, config: &Config) -> PrecacheResult<()> {
    let ctx = UiContext::detect();

    let mut worker_config = config.worker.clone();
    if let Some(origin) = args.origin {
        worker_config.origin = origin;
    }
    if let Some(cache_name) = args.cache_name {
        worker_config.cache_name = cache_name;
    }
    if args.retain {
        worker_config.on_partial_failure = PartialFailurePolicy::Retain;
    }

    let storage = ConfigManager::storage(config);
    let fetcher: Arc<dyn Fetcher> = Arc::new(super::http_fetcher(config));
    let progress = Arc::new(InstallProgressBar::new(&ctx));

    ui::intro(&ctx, &format!("Installing {}", worker_config.cache_name));
    ui::key_value(&ctx, "origin", &worker_config.origin);
    ui::key_value(&ctx, "storage", storage.backend_name());
    ui::key_value(
        &ctx,
        "on partial failure",
        &worker_config.on_partial_failure.to_string(),
    );

    let worker = CacheFirstWorker::from_config(
        &worker_config,
        storage.clone(),
        Arc::clone(&fetcher),
        progress.clone(),
    )?;

    let mut host = WorkerHost::new(worker_config.cache_name.clone(), Arc::clone(&fetcher));
    worker.register(&mut host);

    let container = WorkerContainer::new(fetcher);
    let outcome = container.register(Arc::new(host)).await;
    progress.finish();
    outcome?;

    let bucket = storage.existing(&worker_config.cache_name).await?;
    let entries = bucket.entries().await?;
    let bytes: usize = entries.iter().map(|e| e.response.body.len()).sum();
    ui::step_ok_detail(
        &ctx,
        &format!("Bucket {} holds {} entries", bucket.name(), entries.len()),
        &format!("{} bytes", bytes),
    );

    if storage.backend_name() == "memory" {
        ui::remark(&ctx, "Memory storage is discarded when this process exits");
    }

    ui::outro_success(&ctx, "Worker installed and activated");
    Ok(())
}
