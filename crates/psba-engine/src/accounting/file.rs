//! File-based CDR writer
//!
//! Appends one record per line to `<dir>/<prefix>-<period>.cdr`, where the
//! period is the UTC start of the current rotation window. Records are
//! either JSON objects or `;`-separated `name=value` lines.

use super::{CdrError, CdrWriter};
use crate::config::{CdrFormat, CdrWriterSpec};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use radius_model::{Avp, Packet};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

const TIMESTAMP_FIELD: &str = "Timestamp";

struct OpenFile {
    period: i64,
    file: tokio::fs::File,
}

pub struct FileCdrWriter {
    directory: PathBuf,
    prefix: String,
    format: CdrFormat,
    /// Attributes to write; empty means all
    attributes: Vec<String>,
    /// Rotation window; 0 disables rotation
    rotate_seconds: i64,
    /// File handle (protected by mutex for async writes)
    current: Mutex<Option<OpenFile>>,
}

impl FileCdrWriter {
    /// Files are opened lazily on the first write
    pub fn new(spec: &CdrWriterSpec) -> Self {
        FileCdrWriter {
            directory: spec.path.clone(),
            prefix: spec.file_prefix.clone(),
            format: spec.format,
            attributes: spec.attributes.clone(),
            rotate_seconds: i64::try_from(spec.rotate_seconds).unwrap_or(i64::MAX),
            current: Mutex::new(None),
        }
    }

    fn period_of(&self, now: DateTime<Utc>) -> i64 {
        if self.rotate_seconds == 0 {
            return 0;
        }
        let ts = now.timestamp();
        ts - ts.rem_euclid(self.rotate_seconds)
    }

    /// Path of the file covering `now`
    pub fn file_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.path_for_period(self.period_of(now))
    }

    fn path_for_period(&self, period: i64) -> PathBuf {
        if self.rotate_seconds == 0 {
            return self.directory.join(format!("{}.cdr", self.prefix));
        }
        let stamp = DateTime::<Utc>::from_timestamp(period, 0)
            .map(|start| start.format("%Y%m%dT%H%M%S").to_string())
            .unwrap_or_else(|| period.to_string());
        self.directory.join(format!("{}-{}.cdr", self.prefix, stamp))
    }

    fn selected<'p>(&self, packet: &'p Packet) -> impl Iterator<Item = &'p Avp> {
        let attributes = self.attributes.clone();
        packet
            .avps
            .iter()
            .filter(move |a| attributes.is_empty() || attributes.contains(&a.name))
    }

    /// Render one record line, without the trailing newline
    pub fn format_record(&self, packet: &Packet, now: DateTime<Utc>) -> Result<String, CdrError> {
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);

        match self.format {
            CdrFormat::Json => {
                let mut record = Map::new();
                record.insert(TIMESTAMP_FIELD.to_string(), Value::String(timestamp));
                for avp in self.selected(packet) {
                    let value = serde_json::to_value(&avp.value)?;
                    match record.get_mut(&avp.name) {
                        Some(Value::Array(values)) => values.push(value),
                        Some(existing) => {
                            let first = existing.take();
                            *existing = Value::Array(vec![first, value]);
                        }
                        None => {
                            record.insert(avp.name.clone(), value);
                        }
                    }
                }
                Ok(serde_json::to_string(&Value::Object(record))?)
            }
            CdrFormat::Csv => {
                let mut fields = vec![timestamp];
                fields.extend(self.selected(packet).map(|a| format!("{}={}", a.name, a.value)));
                Ok(fields.join(";"))
            }
        }
    }

    pub async fn write_at(&self, packet: &Packet, now: DateTime<Utc>) -> Result<(), CdrError> {
        let line = format!("{}\n", self.format_record(packet, now)?);
        let period = self.period_of(now);

        let mut guard = self.current.lock().await;
        if guard.as_ref().is_none_or(|open| open.period != period) {
            tokio::fs::create_dir_all(&self.directory).await?;
            let path = self.path_for_period(period);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            debug!(path = %path.display(), "Opened CDR file");
            *guard = Some(OpenFile { period, file });
        }

        if let Some(open) = guard.as_mut() {
            open.file.write_all(line.as_bytes()).await?;
            open.file.flush().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CdrWriter for FileCdrWriter {
    async fn write(&self, packet: &Packet) -> Result<(), CdrError> {
        self.write_at(packet, Utc::now()).await
    }
}
