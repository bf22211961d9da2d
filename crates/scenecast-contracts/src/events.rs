use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::prompt::AspectRatio;
use crate::slots::Slot;

/// Everything a session records. Serialized with its kind under `type`.
///
/// Image payloads never appear here: a loaded slot is described by name,
/// MIME type and size only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        provider: String,
    },
    SlotLoaded {
        slot: Slot,
        file_name: String,
        mime_type: String,
        size_bytes: usize,
        replaced: bool,
    },
    SlotLoadFailed {
        slot: Slot,
        path: String,
    },
    SlotRemoved {
        slot: Slot,
    },
    SlotIncluded {
        slot: Slot,
        included: bool,
    },
    GenerationStarted {
        mode: &'static str,
        aspect_ratio: AspectRatio,
        references: Vec<Slot>,
    },
    GenerationFinished {
        mode: &'static str,
        returned: usize,
        shown: usize,
    },
    GenerationFailed {
        mode: &'static str,
        error: String,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::SlotLoaded { .. } => "slot_loaded",
            Self::SlotLoadFailed { .. } => "slot_load_failed",
            Self::SlotRemoved { .. } => "slot_removed",
            Self::SlotIncluded { .. } => "slot_included",
            Self::GenerationStarted { .. } => "generation_started",
            Self::GenerationFinished { .. } => "generation_finished",
            Self::GenerationFailed { .. } => "generation_failed",
        }
    }
}

/// Append-only writer for a session's `events.jsonl`: one compact JSON
/// object per line, stamped with `session_id` and `ts`.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event: &SessionEvent) -> anyhow::Result<Value> {
        let mut row = match serde_json::to_value(event)? {
            Value::Object(map) => map,
            other => anyhow::bail!("{} serialized to non-object {other}", event.kind()),
        };
        row.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        row.insert("ts".to_string(), Value::String(now_utc_iso()));

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let line = serde_json::to_string(&row)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
            .with_context(|| format!("failed to open {}", self.inner.path.display()))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(row))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::{EventWriter, SessionEvent};
    use crate::prompt::AspectRatio;
    use crate::slots::Slot;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let emitted = writer.emit(&SessionEvent::SlotLoaded {
            slot: Slot::Character1,
            file_name: "hero.png".to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: 42,
            replaced: false,
        })?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], json!("slot_loaded"));
        assert_eq!(parsed["session_id"], json!("session-123"));
        assert_eq!(parsed["slot"], json!("char1"));
        assert_eq!(parsed["size_bytes"], json!(42));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn generation_started_uses_wire_names() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-1");

        let event = SessionEvent::GenerationStarted {
            mode: "composition",
            aspect_ratio: AspectRatio::Landscape,
            references: vec![Slot::Background, Slot::Character2],
        };
        let emitted = writer.emit(&event)?;

        assert_eq!(emitted["type"], json!(event.kind()));
        assert_eq!(emitted["aspect_ratio"], json!("16:9"));
        assert_eq!(emitted["references"], json!(["bg", "char2"]));
        Ok(())
    }

    #[test]
    fn emit_appends_lines_and_creates_parent_dirs() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        writer.emit(&SessionEvent::SlotRemoved {
            slot: Slot::Background,
        })?;
        writer.emit(&SessionEvent::GenerationFailed {
            mode: "text_to_image",
            error: "boom".to_string(),
        })?;

        let content = fs::read_to_string(writer.path())?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0])?;
        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(first["type"], json!("slot_removed"));
        assert_eq!(second["type"], json!("generation_failed"));
        assert_eq!(second["error"], json!("boom"));
        assert_eq!(writer.session_id(), "session-123");
        Ok(())
    }
}
