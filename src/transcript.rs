// Session transcripts.
//
// One JSON object per line, in the order the events reached the engine:
//
//   {"event":"start"}
//   {"event":"output","data":"Looking for changes\n"}
//   {"event":"exit","code":0}
//
// Blank lines and lines starting with '#' are ignored, so transcripts can be
// annotated by hand. Output is stored as text; invalid UTF-8 is replaced.

use crate::engine::{Engine, Update};
use crate::error::{DriverError, Result};
use crate::session::{feed, ProcEvent};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Event {
    Start,
    Output {
        data: String,
    },
    Error {
        detail: String,
    },
    Exit {
        code: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl From<&ProcEvent> for Event {
    fn from(event: &ProcEvent) -> Self {
        match event {
            ProcEvent::Start => Event::Start,
            ProcEvent::Output(bytes) => Event::Output {
                data: String::from_utf8_lossy(bytes).into_owned(),
            },
            ProcEvent::Error(detail) => Event::Error {
                detail: detail.clone(),
            },
            ProcEvent::Exit { code, error } => Event::Exit {
                code: *code,
                error: error.clone(),
            },
        }
    }
}

impl Event {
    pub fn to_proc(&self) -> ProcEvent {
        match self {
            Event::Start => ProcEvent::Start,
            Event::Output { data } => ProcEvent::Output(Bytes::copy_from_slice(data.as_bytes())),
            Event::Error { detail } => ProcEvent::Error(detail.clone()),
            Event::Exit { code, error } => ProcEvent::Exit {
                code: *code,
                error: error.clone(),
            },
        }
    }
}

/// A recorded session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    events: Vec<Event>,
}

impl Transcript {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        Self::read(BufReader::new(file))
    }

    pub fn read<R: BufRead>(reader: R) -> Result<Self> {
        let mut events = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let event = serde_json::from_str(line).map_err(|source| DriverError::Transcript {
                line: index + 1,
                source,
            })?;
            events.push(event);
        }
        Ok(Self { events })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Feed every event into `engine`, returning one update per event.
    pub fn replay(&self, engine: &mut Engine) -> Vec<Update> {
        self.events
            .iter()
            .map(|event| feed(engine, &event.to_proc()))
            .collect()
    }
}

/// Writes a transcript while a session runs.
///
/// Events go to `<path>.tmp`; [`finish`](Self::finish) renames it into place
/// so an interrupted run never leaves a truncated transcript behind.
pub struct TranscriptRecorder {
    path: PathBuf,
    temp_path: PathBuf,
    writer: BufWriter<fs::File>,
    count: usize,
}

impl TranscriptRecorder {
    pub fn create(path: &Path) -> Result<Self> {
        let temp_path = path.with_extension("tmp");
        let file = fs::File::create(&temp_path)?;
        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            writer: BufWriter::new(file),
            count: 0,
        })
    }

    pub fn record(&mut self, event: &ProcEvent) -> Result<()> {
        let line = serde_json::to_string(&Event::from(event)).map_err(|source| {
            DriverError::Transcript {
                line: self.count + 1,
                source,
            }
        })?;
        writeln!(self.writer, "{}", line)?;
        self.count += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        fs::rename(&self.temp_path, &self.path)?;
        debug!(path = %self.path.display(), events = self.count, "Transcript written");
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::State;
    use tempfile::TempDir;

    #[test]
    fn test_wire_format() {
        let line = serde_json::to_string(&Event::Exit {
            code: 1,
            error: None,
        })
        .unwrap();
        assert_eq!(line, r#"{"event":"exit","code":1}"#);
        let event: Event = serde_json::from_str(r#"{"event":"output","data":"a\r\n"}"#).unwrap();
        assert_eq!(
            event,
            Event::Output {
                data: "a\r\n".into()
            }
        );
    }

    #[test]
    fn test_read_skips_comments_and_reports_bad_lines() {
        let text = "# nothing to do\n{\"event\":\"start\"}\n\n{\"event\":\"bogus\"}\n";
        match Transcript::read(text.as_bytes()) {
            Err(DriverError::Transcript { line, .. }) => assert_eq!(line, 4),
            other => panic!("expected a transcript error, got {:?}", other),
        }
    }

    #[test]
    fn test_record_then_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.jsonl");

        let mut recorder = TranscriptRecorder::create(&path).unwrap();
        recorder.record(&ProcEvent::Start).unwrap();
        recorder
            .record(&ProcEvent::Output(
                "Nothing to do: replicas have not changed since last sync.\n".into(),
            ))
            .unwrap();
        recorder
            .record(&ProcEvent::Exit {
                code: 0,
                error: None,
            })
            .unwrap();
        assert!(!path.exists());
        recorder.finish().unwrap();

        let transcript = Transcript::load(&path).unwrap();
        assert_eq!(transcript.len(), 3);
        let mut engine = Engine::new();
        let updates = transcript.replay(&mut engine);
        assert_eq!(updates.len(), 3);
        assert_eq!(engine.state(), &State::Exited);
        assert_eq!(engine.status(), "Nothing to do");
    }
}
