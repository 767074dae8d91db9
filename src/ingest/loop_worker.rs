use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::{AnnotatedBatch, SightingBatch};

use super::pipeline::LinkerPipeline;

// Set to true to log skipped lines and intake lifecycle
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Line counts for one finished intake task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeSummary {
    pub source: String,
    pub lines: usize,
    pub forwarded: usize,
    pub malformed: usize,
    /// Tracks dropped from otherwise usable lines.
    pub malformed_tracks: usize,
    pub rejected: usize,
}

/// Read one JSON batch per line, link it, and forward the annotated result.
///
/// Cancellation stops reading at the next line boundary. A batch already
/// being linked is finished and forwarded.
pub async fn intake_loop<R>(
    source: String,
    reader: R,
    pipeline: LinkerPipeline,
    downstream: mpsc::Sender<AnnotatedBatch>,
    cancel_token: CancellationToken,
) -> IntakeSummary
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IntakeSummary {
        source: source.clone(),
        ..IntakeSummary::default()
    };
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("intake from {source} cancelled");
                break;
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                log_info!("intake from {source} reached end of input");
                break;
            }
            Err(err) => {
                log_error!("failed to read from {source}: {err}");
                break;
            }
        };
        summary.lines += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let batch = match SightingBatch::from_json_lenient(line) {
            Ok(parsed) => {
                for (index, err) in &parsed.rejected_tracks {
                    log_warn!(
                        "{source} line {}: dropping track #{index}: {err}",
                        summary.lines
                    );
                }
                summary.malformed_tracks += parsed.rejected_tracks.len();
                parsed.batch
            }
            Err(err) => {
                log_warn!("{source} line {}: skipping malformed batch: {err}", summary.lines);
                summary.malformed += 1;
                continue;
            }
        };

        match pipeline.handle_batch(batch).await {
            Ok(annotated) => {
                if downstream.send(annotated).await.is_err() {
                    log_warn!("downstream closed, stopping intake from {source}");
                    break;
                }
                summary.forwarded += 1;
            }
            Err(_) => summary.rejected += 1,
        }
    }

    summary
}
