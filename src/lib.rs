pub mod cli;
pub mod db;
pub mod ingest;
pub mod linker;
pub mod metrics;
pub mod models;
pub mod sessions;
pub mod settings;
pub mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};

pub use cli::Cli;
pub use db::Database;
pub use ingest::{IngestController, IntakeSource, LinkerPipeline};
pub use linker::{LinkError, LinkerState};
pub use metrics::LinkerMetrics;
pub use models::{AnnotatedBatch, GlobalId, SessionEvent, SightingBatch};
pub use settings::{LinkerSettings, SettingsStore};

const DATA_DIR_ENV: &str = "CAMLINK_DATA_DIR";
const DEBUG_ENV: &str = "CAMLINK_DEBUG";
const DEFAULT_DATA_DIR: &str = "./data";

fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV).map(|v| v == "1").unwrap_or(false)
}

/// Link every source until all reach end of input or Ctrl-C arrives.
pub async fn run(sources: Vec<String>) -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("camlink starting up...");

    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let settings = settings_store.linker();
    let database = Database::new(data_dir.join("camlink.sqlite3"))?;

    let metrics = LinkerMetrics::new();
    let pipeline = LinkerPipeline::new(&settings, database, metrics.clone());
    let restored = pipeline
        .restore()
        .await
        .context("failed to restore linker state")?;
    if restored > 0 {
        log::warn!("restored {restored} open session(s) from a previous run");
    }

    let (downstream_tx, downstream_rx) = tokio::sync::mpsc::channel(settings.downstream_buffer);
    let emitter = tokio::spawn(ingest::emit_annotated(
        downstream_rx,
        tokio::io::stdout(),
        debug_enabled(),
    ));

    let mut controller = IngestController::new();
    for source in sources.iter().map(|arg| IntakeSource::parse(arg)) {
        controller
            .start_source(source, pipeline.clone(), downstream_tx.clone())
            .await?;
    }
    drop(downstream_tx);

    let summaries = tokio::select! {
        result = controller.wait() => result?,
        Ok(()) = tokio::signal::ctrl_c() => {
            log::info!("interrupt received, draining intake");
            controller.stop().await?
        }
    };
    for summary in &summaries {
        log::info!(
            "{}: {} line(s), {} forwarded, {} malformed, {} bad track(s), {} rejected",
            summary.source,
            summary.lines,
            summary.forwarded,
            summary.malformed,
            summary.malformed_tracks,
            summary.rejected
        );
    }

    let written = emitter.await.context("output task failed to join")??;
    let (still_open, gallery_entries, evicted, dim) = pipeline
        .inspect(|state| {
            let gallery = state.resolver().gallery();
            (
                state.tracker().open_count(),
                gallery.entry_count(),
                gallery.total_evicted(),
                state.embedding_dim(),
            )
        })
        .await;
    let snapshot = metrics.snapshot().await;
    log::info!(
        "wrote {written} batch(es): {} track(s) linked, {} new identities, {} sessions opened, {} closed, {} persist failure(s), {still_open} session(s) left open",
        snapshot.tracks_annotated,
        snapshot.allocated,
        snapshot.sessions_opened,
        snapshot.sessions_closed,
        snapshot.persist_failures
    );
    match dim {
        Some(dim) => log::info!(
            "gallery holds {gallery_entries} {dim}-d embedding(s), {evicted} evicted"
        ),
        None => log::info!("no embeddings were linked"),
    }

    Ok(())
}
