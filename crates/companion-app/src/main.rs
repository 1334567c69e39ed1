//! Companion application binary - composition root.
//!
//! Ties the engine crates into one executable:
//! 1. Load configuration from TOML
//! 2. Build the behavior scheduler and rhythm engine on a shared event bus
//! 3. Load (and optionally watch) the strategy catalog file
//! 4. Schedule behaviors for the requested state and print the result
//!
//! With `--watch` it keeps rescheduling at each hint until Ctrl-C.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use companion_behavior::{BehaviorScheduler, CatalogWatcher, ExecutionResult};
use companion_core::config::CompanionConfig;
use companion_core::events::EventBus;
use companion_core::types::{EmotionType, PetState, Timestamp};
use companion_rhythm::RhythmAdaptationEngine;

use cli::{expand_home, CliArgs};

/// Log every domain event until the bus closes.
async fn event_log_loop(bus: EventBus) {
    let mut rx = bus.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => tracing::debug!(event = event.event_name(), at = %event.timestamp(), "Domain event"),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log lagged behind the bus");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn print_outcome(
    result: &ExecutionResult,
    rhythm: &RhythmAdaptationEngine,
    scheduler: &BehaviorScheduler,
) -> Result<(), serde_json::Error> {
    let report = json!({
        "result": result,
        "rhythm": rhythm.get_state(),
        "scheduler": scheduler.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = CompanionConfig::load_or_default(&config_file);
    if let Some(intensity) = args.intensity {
        config.scheduler.default_intensity = intensity.clamp(0.0, 1.0);
    }

    // Tracing.
    let filter = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting companion v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    let state: PetState = args.state.parse()?;
    let emotion: EmotionType = args.emotion.parse()?;

    // Engines share one bus; nothing holds a callback into anything else.
    let bus = EventBus::new(config.events.capacity);
    tokio::spawn(event_log_loop(bus.clone()));

    let scheduler = BehaviorScheduler::builder(config.scheduler.clone())
        .events(bus.clone())
        .build()?;
    let rhythm = RhythmAdaptationEngine::with_events(config.rhythm.clone(), bus.clone());

    // Strategy catalog file.
    let data_dir = expand_home(&config.general.data_dir);
    let watcher = args
        .resolve_catalog_path(&config.catalog.path, &data_dir)
        .map(|path| {
            Arc::new(CatalogWatcher::new(
                path,
                Arc::clone(scheduler.manager().catalog()),
                Duration::from_millis(config.catalog.poll_interval_ms),
            ))
        });
    if let Some(ref watcher) = watcher {
        if let Err(e) = watcher.load_now() {
            tracing::warn!(path = %watcher.path().display(), error = %e, "Catalog not loaded, using built-in strategies");
        }
    }

    if let Some(ref export_path) = args.export {
        let json = scheduler.manager().export_catalog()?;
        if let Some(parent) = export_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(export_path, json)?;
        tracing::info!(path = %export_path.display(), "Strategy catalog exported");
        return Ok(());
    }

    // First decision is a real interaction.
    scheduler.update_last_interaction();
    rhythm.update_rhythm_by_context(state, emotion, Timestamp::now(), state != PetState::Idle);
    let result = scheduler.schedule(state, emotion, None).await;
    print_outcome(&result, &rhythm, &scheduler)?;

    if !args.watch {
        return Ok(());
    }

    let watch_task = match watcher {
        Some(ref watcher) if config.catalog.hot_reload => Some(Arc::clone(watcher).spawn()),
        _ => None,
    };

    let mut hint = result.next_schedule_hint;
    loop {
        let wait_ms = hint
            .map(|at| at.millis_since(Timestamp::now()))
            .unwrap_or(config.scheduler.base_interval_ms);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {
                // Repeats are status checks, not user interactions.
                let now = Timestamp::now();
                rhythm.update_rhythm_by_context(state, emotion, now, false);
                let ctx = scheduler.build_context(state, emotion, now, None);
                let result = scheduler.schedule_with_context(ctx).await;
                print_outcome(&result, &rhythm, &scheduler)?;
                hint = result.next_schedule_hint;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    scheduler.shutdown();
    if let Some(watcher) = watcher {
        watcher.shutdown();
    }
    if let Some(task) = watch_task {
        let _ = task.await;
    }

    Ok(())
}
