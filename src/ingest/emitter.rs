use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::models::AnnotatedBatch;

// Set to true to echo every forwarded batch when debug output is requested
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Write annotated batches as JSON lines until every sender is gone.
/// Returns the number of batches written.
pub async fn emit_annotated<W>(
    mut downstream: mpsc::Receiver<AnnotatedBatch>,
    mut writer: W,
    debug: bool,
) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(batch) = downstream.recv().await {
        if debug {
            log_info!(
                "{} t={} frame={} -> {:?}",
                batch.camera_id,
                batch.t_ms,
                batch.frame_id,
                batch.global_ids()
            );
        }

        let mut line =
            serde_json::to_vec(&batch).context("failed to serialize annotated batch")?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .context("failed to write annotated batch")?;
        writer.flush().await.context("failed to flush output")?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnnotatedTrack, GlobalId};

    #[tokio::test]
    async fn writes_one_line_per_batch() {
        let (tx, rx) = mpsc::channel(4);
        for t_ms in [0, 100] {
            tx.send(AnnotatedBatch {
                camera_id: "cam1".into(),
                t_ms,
                frame_id: t_ms / 100,
                tracks: vec![AnnotatedTrack {
                    track_id: 4,
                    bbox: [0.0, 0.0, 1.0, 1.0],
                    global_id: GlobalId(1),
                    conf: None,
                    extra: Default::default(),
                }],
            })
            .await
            .unwrap();
        }
        drop(tx);

        let mut out = Vec::new();
        let written = emit_annotated(rx, &mut out, true).await.unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["tracks"][0]["global_id"], 1);
        assert!(first["tracks"][0].get("embedding").is_none());
    }
}
