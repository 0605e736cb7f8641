use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Everything the engine reports about itself, one variant per line kind
/// in `events.jsonl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    EngineInitialized,
    ProbeCompleted,
    TextGenerated,
    FallbackUsed,
    ArtifactCreated,
    ChartCreated,
    AnalysisFailed,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::EngineInitialized => "engine_initialized",
            EventKind::ProbeCompleted => "probe_completed",
            EventKind::TextGenerated => "text_generated",
            EventKind::FallbackUsed => "fallback_used",
            EventKind::ArtifactCreated => "artifact_created",
            EventKind::ChartCreated => "chart_created",
            EventKind::AnalysisFailed => "analysis_failed",
        }
    }
}

/// Append-only writer for `events.jsonl`.
///
/// Every engine operation logs through this: probe results, which fallback
/// tier produced a text reply, artifact paths. Contract:
/// - default fields are `type`, `session_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
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

    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::from(kind.name()));
        event.insert(
            "session_id".to_string(),
            Value::from(self.inner.session_id.as_str()),
        );
        event.insert("ts".to_string(), Value::from(now_utc_iso()));
        event.extend(payload);

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        writeln!(file, "{line}")?;

        Ok(Value::Object(event))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");
        assert_eq!(writer.path(), path.as_path());
        assert_eq!(writer.session_id(), "session-123");

        let mut payload = EventPayload::new();
        payload.insert("tier".to_string(), Value::String("template".to_string()));
        let emitted = writer.emit(EventKind::TextGenerated, payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("text_generated".to_string()));
        assert_eq!(
            parsed["session_id"],
            Value::String("session-123".to_string())
        );
        assert_eq!(parsed["tier"], Value::String("template".to_string()));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let mut payload = EventPayload::new();
        payload.insert("type".to_string(), Value::String("override".to_string()));
        payload.insert(
            "session_id".to_string(),
            Value::String("override-session".to_string()),
        );
        let emitted = writer.emit(EventKind::ProbeCompleted, payload)?;

        assert_eq!(emitted["type"], Value::String("override".to_string()));
        assert_eq!(
            emitted["session_id"],
            Value::String("override-session".to_string())
        );
        Ok(())
    }

    #[test]
    fn emit_appends_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        writer.emit(EventKind::ProbeCompleted, EventPayload::new())?;
        writer.emit(EventKind::ArtifactCreated, EventPayload::new())?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0])?;
        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(first["type"], Value::String("probe_completed".to_string()));
        assert_eq!(
            second["type"],
            Value::String("artifact_created".to_string())
        );
        Ok(())
    }

    #[test]
    fn kind_names_cover_every_log_line_type() {
        let kinds = [
            (EventKind::EngineInitialized, "engine_initialized"),
            (EventKind::ProbeCompleted, "probe_completed"),
            (EventKind::TextGenerated, "text_generated"),
            (EventKind::FallbackUsed, "fallback_used"),
            (EventKind::ArtifactCreated, "artifact_created"),
            (EventKind::ChartCreated, "chart_created"),
            (EventKind::AnalysisFailed, "analysis_failed"),
        ];
        for (kind, expected) in kinds {
            assert_eq!(kind.name(), expected);
        }
    }
}
