use anyhow::{Context, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::AnnotatedBatch;

use super::loop_worker::{intake_loop, IntakeSummary};
use super::pipeline::LinkerPipeline;
use super::source::IntakeSource;

/// Owns the intake tasks and their shared cancellation token.
pub struct IngestController {
    handles: Vec<JoinHandle<IntakeSummary>>,
    finished: Vec<IntakeSummary>,
    cancel_token: CancellationToken,
}

impl Default for IngestController {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestController {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            finished: Vec::new(),
            cancel_token: CancellationToken::new(),
        }
    }

    pub async fn start_source(
        &mut self,
        source: IntakeSource,
        pipeline: LinkerPipeline,
        downstream: mpsc::Sender<AnnotatedBatch>,
    ) -> Result<()> {
        let reader = source.open().await?;
        let name = source.name();
        info!("starting intake from {name}");

        let handle = tokio::spawn(intake_loop(
            name,
            reader,
            pipeline,
            downstream,
            self.cancel_token.child_token(),
        ));
        self.handles.push(handle);
        Ok(())
    }

    /// Wait for every source to reach end of input.
    ///
    /// Cancel safe: a handle is only released once its task has been joined,
    /// so dropping this future and calling [`Self::stop`] loses nothing.
    pub async fn wait(&mut self) -> Result<Vec<IntakeSummary>> {
        while let Some(handle) = self.handles.first_mut() {
            let joined = handle.await;
            self.handles.remove(0);
            self.finished
                .push(joined.context("intake task failed to join")?);
        }
        Ok(std::mem::take(&mut self.finished))
    }

    /// Stop reading on all sources and wait for in-flight batches.
    pub async fn stop(&mut self) -> Result<Vec<IntakeSummary>> {
        self.cancel_token.cancel();
        self.wait().await
    }
}
