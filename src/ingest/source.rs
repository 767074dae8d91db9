use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, BufReader};

pub type SourceReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Where an intake task reads JSON lines from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeSource {
    Stdin,
    File(PathBuf),
}

impl IntakeSource {
    /// `-` means stdin; anything else is a file path.
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            IntakeSource::Stdin
        } else {
            IntakeSource::File(PathBuf::from(arg))
        }
    }

    pub fn name(&self) -> String {
        match self {
            IntakeSource::Stdin => "stdin".to_string(),
            IntakeSource::File(path) => path.display().to_string(),
        }
    }

    pub async fn open(&self) -> Result<SourceReader> {
        match self {
            IntakeSource::Stdin => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
            IntakeSource::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("failed to open source {}", path.display()))?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}
