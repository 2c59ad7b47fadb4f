use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Serialize;

/// Where a command writes its result document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputSink {
    #[default]
    Stdout,
    File(PathBuf),
}

impl FromStr for OutputSink {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "" | "-" => Self::Stdout,
            path => Self::File(PathBuf::from(path)),
        })
    }
}

impl std::fmt::Display for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("-"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl OutputSink {
    /// Write `value` as pretty JSON.
    pub fn write_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut content =
            serde_json::to_string_pretty(value).context("Failed to serialize output")?;
        content.push('\n');

        match self {
            Self::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(content.as_bytes())
                    .context("Failed to write output")?;
                stdout.flush().context("Failed to flush output")?;
            }
            Self::File(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("Failed to write output to {}", path.display()))?;
                tracing::info!(path = %path.display(), "Output written");
            }
        }
        Ok(())
    }
}
