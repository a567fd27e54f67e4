// src/health/logs.rs
use super::probe::ProbeOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const PREVIEW_LINES: usize = 3;
const TAIL_BYTES: u64 = 4096;

/// Log freshness. Informational only: the probe succeeds whatever it finds.
#[derive(Debug, Clone)]
pub struct LogProbe {
    files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LogFileStatus {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<u64>,
    pub has_content: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct LogReport {
    files: BTreeMap<String, LogFileStatus>,
}

/// Last `n` non-blank lines of `text`.
pub fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

async fn read_tail(path: &Path, size: u64) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let start = size.saturating_sub(TAIL_BYTES);
    file.seek(SeekFrom::Start(start)).await?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer).await?;

    let text = String::from_utf8_lossy(&buffer);
    // A mid-file start may cut the first line; drop it.
    let text: &str = if start > 0 {
        text.split_once('\n').map(|(_, rest)| rest).unwrap_or("")
    } else {
        &text
    };
    Ok(last_lines(text, PREVIEW_LINES))
}

pub async fn inspect(path: &Path) -> LogFileStatus {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return LogFileStatus::default(),
        Err(e) => {
            return LogFileStatus {
                error: Some(e.to_string()),
                ..LogFileStatus::default()
            }
        }
    };

    let size = metadata.len();
    let modified = metadata.modified().ok();
    let mut status = LogFileStatus {
        exists: true,
        size: Some(size),
        modified: modified.map(DateTime::<Utc>::from),
        age_secs: modified
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .map(|age| age.as_secs()),
        has_content: size > 0,
        ..LogFileStatus::default()
    };

    if size > 0 {
        match read_tail(path, size).await {
            Ok(preview) => status.preview = Some(preview),
            Err(e) => status.error = Some(format!("error reading: {}", e)),
        }
    }

    status
}

impl LogProbe {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    pub async fn run(&self) -> ProbeOutcome {
        let mut files = BTreeMap::new();
        for path in &self.files {
            let key = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            files.insert(key, inspect(path).await);
        }
        ProbeOutcome::success(&LogReport { files })
    }
}
