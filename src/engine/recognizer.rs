//! Patterns for the Unison `-dumbtty` text UI.
//!
//! Three shapes of output reach the engine:
//!
//! ```text
//! Looking for changes\n                    complete line
//! | docs/notes.txt\r              \r       progress, then an erase
//! changed  ---->  one  [f]                 prompt at the buffer tail
//! ```
//!
//! Complete lines are matched as `&str`; erases and progress are matched on
//! the raw bytes so an incomplete erase is never mistaken for text.

use once_cell::sync::Lazy;
use regex::bytes::Regex as BytesRegex;
use regex::Regex;

use super::update::AlertKind;
use crate::plan::{Content, PlanRow};

// =============================================================================
// Erase and progress
// =============================================================================

static ERASE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r"^\r *\r").expect("erase pattern"));

static PROGRESS_ERASED: Lazy<BytesRegex> = Lazy::new(|| {
    BytesRegex::new(
        r"^(?:[|/\\-] (?P<spin>[^\r\n]*)|(?P<pct>[ \t]*(?P<num>\d{1,3})%[ \t]+(?:\d\d:\d\d(?::\d\d)?|--:--) ETA[^\r\n]*))\r *\r",
    )
    .expect("progress pattern")
});

static PROGRESS_TAIL: Lazy<BytesRegex> = Lazy::new(|| {
    BytesRegex::new(
        r"^(?:[|/\\-] (?P<spin>[^\r\n]*)|(?P<pct>[ \t]*(?P<num>\d{1,3})%[ \t]+(?:\d\d:\d\d(?::\d\d)?|--:--) ETA[^\r\n]*))$",
    )
    .expect("progress tail pattern")
});

/// A progress indicator and the number of buffer bytes it spans.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressMatch {
    pub text: String,
    pub fraction: Option<f64>,
    pub len: usize,
}

/// Length of an erase sequence at the head of `buf`.
pub fn erase(buf: &[u8]) -> Option<usize> {
    ERASE.find(buf).map(|m| m.end())
}

/// A progress indicator followed by its erase.
pub fn progress_erased(buf: &[u8]) -> Option<ProgressMatch> {
    progress_with(&PROGRESS_ERASED, buf)
}

/// A progress indicator that is the whole (unterminated) buffer.
pub fn progress_tail(buf: &[u8]) -> Option<ProgressMatch> {
    progress_with(&PROGRESS_TAIL, buf)
}

fn progress_with(re: &BytesRegex, buf: &[u8]) -> Option<ProgressMatch> {
    let caps = re.captures(buf)?;
    let len = caps.get(0)?.end();
    if let Some(text) = caps.name("spin") {
        return Some(ProgressMatch {
            text: String::from_utf8_lossy(text.as_bytes()).trim().to_string(),
            fraction: None,
            len,
        });
    }
    let text = String::from_utf8_lossy(caps.name("pct")?.as_bytes())
        .trim()
        .to_string();
    let percent: f64 = std::str::from_utf8(caps.name("num")?.as_bytes())
        .ok()?
        .parse()
        .ok()?;
    Some(ProgressMatch {
        text,
        fraction: Some((percent / 100.0).clamp(0.0, 1.0)),
        len,
    })
}

// =============================================================================
// Status lines
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum StatusLine {
    /// A line mapped to a fixed human-readable status.
    Status(&'static str),
    Summary { complete: bool, detail: String },
    NothingToDo(String),
    Failure(String),
}

static CONTACTING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:Unison .*: )?Contacting server\.\.\.$").expect("contacting"));
static STARTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^UNISON .* started propagating changes").expect("started"));
static FINISHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^UNISON .* finished propagating changes").expect("finished"));
static SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Synchronization (?P<state>complete|incomplete) at .*?\((?P<detail>[^)]*)\)\s*$")
        .expect("summary")
});
static NOTHING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Nothing to do: (?P<why>.*)$").expect("nothing to do"));
static FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:Failed(?: \[(?P<path>[^\]]*)\])?: |\[ERROR\] )(?P<reason>.*)$")
        .expect("failure")
});

pub fn status_line(line: &str) -> Option<StatusLine> {
    let line = line.trim();
    let fixed = match line {
        "Looking for changes" => Some("Looking for changes"),
        "Waiting for changes from server" => Some("Waiting for changes from server"),
        "Reconciling changes" => Some("Reconciling changes"),
        "Propagating updates" => Some("Propagating updates"),
        "Saving synchronizer state" => Some("Saving synchronizer state"),
        _ => None,
    };
    if let Some(status) = fixed {
        return Some(StatusLine::Status(status));
    }
    if CONTACTING.is_match(line) {
        return Some(StatusLine::Status("Contacting server"));
    }
    if line.starts_with("Connected [") {
        return Some(StatusLine::Status("Connected"));
    }
    if STARTED.is_match(line) {
        return Some(StatusLine::Status("Propagating updates"));
    }
    if FINISHED.is_match(line) {
        return Some(StatusLine::Status("Saving synchronizer state"));
    }
    if let Some(caps) = SUMMARY.captures(line) {
        return Some(StatusLine::Summary {
            complete: &caps["state"] == "complete",
            detail: caps["detail"].to_string(),
        });
    }
    if let Some(caps) = NOTHING.captures(line) {
        return Some(StatusLine::NothingToDo(caps["why"].to_string()));
    }
    if let Some(caps) = FAILURE.captures(line) {
        let text = match caps.name("path") {
            Some(path) => format!("Failed [{}]: {}", path.as_str(), &caps["reason"]),
            None => caps["reason"].to_string(),
        };
        return Some(StatusLine::Failure(text));
    }
    None
}

// =============================================================================
// Plan header and listing
// =============================================================================

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<left>\S+(?: \S+)*) {2,}(?P<right>\S+(?: \S+)*) {2,}$").expect("plan header")
});

/// `left           right              ` gives the replica labels.
pub fn plan_header(line: &str) -> Option<(String, String)> {
    let caps = HEADER.captures(line)?;
    Some((caps["left"].to_string(), caps["right"].to_string()))
}

static DETAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<label>.*?)\s*: (?P<desc>.*)$").expect("detail"));

#[derive(Debug, Clone, PartialEq)]
pub enum Side {
    Left,
    Right,
}

/// A `<label> : <description>` line for one of the two replicas.
pub fn detail_line(line: &str, left: &str, right: &str) -> Option<(Side, Content)> {
    let caps = DETAIL.captures(line)?;
    let label = caps.name("label")?.as_str();
    let side = if label == left {
        Side::Left
    } else if label == right {
        Side::Right
    } else {
        return None;
    };
    Some((side, Content::parse(&caps["desc"])?))
}

// =============================================================================
// Diff replies
// =============================================================================

static CANT_DIFF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<msg>Can't diff: .*)$").expect("can't diff"));

pub fn cant_diff(line: &str) -> Option<String> {
    CANT_DIFF.captures(line).map(|c| c["msg"].to_string())
}

/// Cut a collected diff block down to the `---` header through the last hunk.
pub fn diff_body(block: &[String]) -> Option<String> {
    let start = block.iter().position(|l| l.starts_with("---"))?;
    let end = block.iter().rposition(|l| !l.trim().is_empty())?;
    if end < start {
        return None;
    }
    Some(block[start..=end].join("\n"))
}

// =============================================================================
// Tail prompts
// =============================================================================

static PROCEED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*Proceed with propagating updates\? \[\] $").expect("proceed prompt")
});
static PLAN_PROMPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<row>.*?)\s*\[(?P<default>f?)\] $").expect("plan prompt"));
static PRESS_RETURN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<text>.*?)\s*Press return to continue\.\s*\[(?P<opt>[^\]]*)\] $")
        .expect("press return")
});
static QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<text>.*?)\s*\[(?P<opt>[^\]]*)\] $").expect("question"));
/// Propagation log markers such as `[BGN]`, `[END]` and `[CONFLICT]`.
static LOG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[[A-Z]+\]").expect("log tag"));

#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Proceed,
    Plan(PlanRow),
    /// Any other bracketed prompt; `text` is the question without its brackets.
    Question { text: String, kind: AlertKind },
}

/// Recognize a prompt that is the entire unterminated `tail`.
pub fn prompt(tail: &str) -> Option<Prompt> {
    if tail.contains('\n') {
        return None;
    }
    if PROCEED.is_match(tail) {
        return Some(Prompt::Proceed);
    }
    if let Some(caps) = PLAN_PROMPT.captures(tail) {
        if let Some(row) = PlanRow::parse(&caps["row"]) {
            return Some(Prompt::Plan(row));
        }
    }
    if let Some(caps) = PRESS_RETURN.captures(tail) {
        let kind = if caps["opt"].contains("<spc>") {
            AlertKind::PressSpace
        } else {
            AlertKind::PressReturn
        };
        let text = caps["text"].trim();
        let text = if text.is_empty() {
            "Press return to continue.".to_string()
        } else {
            text.to_string()
        };
        return Some(Prompt::Question { text, kind });
    }
    // A partial line can end in `] ` too; only a question asks.
    let caps = QUESTION.captures(tail)?;
    let text = caps["text"].trim();
    if !text.ends_with('?') || LOG_TAG.is_match(text) {
        return None;
    }
    Some(Prompt::Question {
        text: text.to_string(),
        kind: AlertKind::YesNo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Action;

    #[test]
    fn test_spinner_with_and_without_erase() {
        assert_eq!(
            progress_tail(b"| some/file"),
            Some(ProgressMatch {
                text: "some/file".into(),
                fraction: None,
                len: 11
            })
        );
        assert_eq!(progress_erased(b"| some/file"), None);
        let m = progress_erased(b"/ some/file\r    \rLooking").unwrap();
        assert_eq!(m.text, "some/file");
        assert_eq!(m.len, 17);
    }

    #[test]
    fn test_percent_progress() {
        let m = progress_tail(b"  8%  07:45 ETA").unwrap();
        assert_eq!(m.text, "8%  07:45 ETA");
        assert!((m.fraction.unwrap() - 0.08).abs() < 1e-9);
        assert!(progress_tail(b"  8%").is_none());
    }

    #[test]
    fn test_erase_needs_both_carriage_returns() {
        assert_eq!(erase(b"\r   \rabc"), Some(5));
        assert_eq!(erase(b"\r   "), None);
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(
            status_line("Unison 2.51.3 (ocaml 4.11.1): Contacting server..."),
            Some(StatusLine::Status("Contacting server"))
        );
        assert_eq!(
            status_line("  Waiting for changes from server"),
            Some(StatusLine::Status("Waiting for changes from server"))
        );
        assert_eq!(
            status_line(
                "Synchronization complete at 16:49:02  (1 item transferred, 0 skipped, 0 failed)"
            ),
            Some(StatusLine::Summary {
                complete: true,
                detail: "1 item transferred, 0 skipped, 0 failed".into()
            })
        );
        assert_eq!(
            status_line("Failed [a/b]: Permission denied"),
            Some(StatusLine::Failure("Failed [a/b]: Permission denied".into()))
        );
        assert_eq!(status_line("[BGN] Copying one from /a to /b"), None);
    }

    #[test]
    fn test_plan_header_labels() {
        assert_eq!(
            plan_header("left           right              "),
            Some(("left".into(), "right".into()))
        );
        assert_eq!(
            plan_header("local          ssh host            "),
            Some(("local".into(), "ssh host".into()))
        );
        assert_eq!(plan_header("Looking for changes"), None);
        assert_eq!(plan_header("changed  ---->            one  "), None);
        assert_eq!(
            plan_header("Unison may delete everything in the other replica.  (Set the "),
            None
        );
    }

    #[test]
    fn test_detail_lines() {
        let (side, content) = detail_line(
            "left           : changed file       modified on 2021-02-07",
            "left",
            "right",
        )
        .unwrap();
        assert_eq!(side, Side::Left);
        assert_eq!(content.props, "modified on 2021-02-07");
        assert!(detail_line("other : absent", "left", "right").is_none());
    }

    #[test]
    fn test_prompts() {
        assert_eq!(
            prompt("Proceed with propagating updates? [] "),
            Some(Prompt::Proceed)
        );
        match prompt("changed  ---->            one  [f] ") {
            Some(Prompt::Plan(row)) => {
                assert_eq!(row.path, "one");
                assert_eq!(row.action, Action::LeftToRight);
            }
            other => panic!("expected plan prompt, got {:?}", other),
        }
        assert_eq!(
            prompt("Do you really want to proceed? [] "),
            Some(Prompt::Question {
                text: "Do you really want to proceed?".into(),
                kind: AlertKind::YesNo
            })
        );
        assert_eq!(
            prompt("Press return to continue.[<spc>] "),
            Some(Prompt::Question {
                text: "Press return to continue.".into(),
                kind: AlertKind::PressSpace
            })
        );
        assert_eq!(prompt("changed  ---->  one  [f"), None);
        assert_eq!(prompt("[] "), None);
        assert_eq!(prompt("[BGN] "), None);
        assert_eq!(prompt("[CONFLICT] Skipping dir/why? [x] "), None);
        assert_eq!(prompt("-see notes [x] "), None);
        assert_eq!(prompt("line\n[] "), None);
    }

    #[test]
    fn test_diff_body_trims_command_and_blank_tail() {
        let block: Vec<String> = [
            "",
            "diff -u '/l/file3' '/r/file3'",
            "--- /l/file3",
            "+++ /r/file3",
            "@@ -1 +1 @@",
            "-a",
            "+b",
            "",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(
            diff_body(&block).unwrap(),
            "--- /l/file3\n+++ /r/file3\n@@ -1 +1 @@\n-a\n+b"
        );
        assert_eq!(diff_body(&["diff -u".to_string()]), None);
    }
}
