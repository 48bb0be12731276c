//! The engine: a pure driver for Unison's `-dumbtty` text UI.
//!
//! Every entry point takes the current state plus one event and returns an
//! [`Update`]. The engine never touches a process, a file or a clock; the
//! session glue feeds it bytes and carries out what the updates ask for.
//!
//! # Architecture
//!
//! ```text
//! proc_output(bytes)
//!        |
//!        v
//! +--------------+   drain loop   +--------------+     +--------------+
//! | InputBuffer  | -------------> | Recognizers  | --> | State + ops  |
//! | (BytesMut)   | <- consume --- | (regex)      |     | -> Update    |
//! +--------------+                +--------------+     +--------------+
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Starting -> Working -> AwaitingPlan -> Listing -> PlanReady
//!     PlanReady -> Directing -> Propagating -> Completed -> Exited
//!     PlanReady -> Seeking -> DiffRequested -> PlanReady
//! ```
//!
//! Alerts can interrupt any working state; the state underneath is resumed
//! when the alert is confirmed.

pub mod buffer;
pub mod recognizer;
pub mod state;
pub mod update;

pub use buffer::InputBuffer;
pub use state::{Operation, Operations, State};
pub use update::{Alert, AlertKind, Diff, Importance, Message, Signals, Update};

use tracing::{debug, info, warn};

use crate::error::{DriverError, Result};
use crate::plan::{self, normalize_path, Action, Content, Item, PlanRow, SortRule, Tree};
use recognizer::{Prompt, ProgressMatch, Side, StatusLine};

/// Bound on remembered unclaimed lines (alert text and exit banners).
const UNCLAIMED_LIMIT: usize = 512;

/// Progress shown by the front-end.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub text: String,
    /// `None` while the backend only spins (no percentage known).
    pub fraction: Option<f64>,
}

/// A plan row whose two description lines are still arriving.
#[derive(Debug)]
struct PendingItem {
    row: PlanRow,
    left: Option<Content>,
    right: Option<Content>,
}

impl PendingItem {
    fn into_item(self) -> Item {
        Item {
            path: self.row.path,
            left: self.left.unwrap_or_else(Content::absent),
            right: self.right.unwrap_or_else(Content::absent),
            action: self.row.action,
        }
    }
}

#[derive(Debug)]
pub struct Engine {
    state: State,
    status: String,
    running: bool,
    progress: Option<Progress>,
    left: String,
    right: String,
    items: Option<Vec<Item>>,
    listing: Vec<Item>,
    pending: Option<PendingItem>,
    buffer: InputBuffer,
    unclaimed: Vec<String>,
    alert_seq: u64,
    live_alert: Option<u64>,
    summarized: bool,
    io_failed: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            state: State::Starting,
            status: "Starting Unison".to_string(),
            running: false,
            progress: None,
            left: String::new(),
            right: String::new(),
            items: None,
            listing: Vec::new(),
            pending: None,
            buffer: InputBuffer::new(),
            unclaimed: Vec::new(),
            alert_seq: 0,
            live_alert: None,
            summarized: false,
            io_failed: false,
        }
    }

    // =========================================================================
    // Observable fields
    // =========================================================================

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy() || self.live_alert.is_some()
    }

    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    pub fn left(&self) -> &str {
        &self.left
    }

    pub fn right(&self) -> &str {
        &self.right
    }

    /// `None` until the plan has been fully listed.
    pub fn items(&self) -> Option<&[Item]> {
        self.items.as_deref()
    }

    pub fn tree(&self, sort: SortRule) -> Option<Tree> {
        self.items.as_deref().map(|items| plan::fold(items, sort))
    }

    pub fn operations(&self) -> Operations {
        let mut ops = self.state.operations();
        if self.live_alert.is_some() {
            ops.remove(Operations::SYNC | Operations::DIFF | Operations::QUIT);
        }
        if self.running {
            ops |= Operations::INTERRUPT | Operations::KILL;
        }
        ops
    }

    pub fn is_enabled(&self, op: Operation) -> bool {
        self.operations().allows(op)
    }

    fn require(&self, op: Operation) -> Result<()> {
        if self.is_enabled(op) {
            Ok(())
        } else {
            Err(DriverError::Disabled {
                op,
                state: self.state.name(),
            })
        }
    }

    // =========================================================================
    // Process events
    // =========================================================================

    pub fn proc_start(&mut self) -> Update {
        let mut update = Update::new();
        self.running = true;
        if self.state == State::Starting {
            self.transition(State::Working);
        }
        update.progressed = true;
        update
    }

    pub fn proc_output(&mut self, bytes: &[u8]) -> Update {
        let mut update = Update::new();
        if self.state == State::Exited {
            warn!(len = bytes.len(), "Ignoring output after exit");
            return update;
        }
        self.buffer.push(bytes);
        while self.step(&mut update) {}
        if !update.input.is_empty() {
            debug!(input = %update.input_str().escape_debug(), "Answering backend");
        }
        update
    }

    pub fn proc_error(&mut self, error: impl std::fmt::Display) -> Update {
        let mut update = Update::new();
        warn!(%error, "Backend I/O error");
        self.io_failed = true;
        update.push(Message::error(format!("Unison I/O error: {}", error)));
        update.progressed = true;
        update
    }

    pub fn proc_exit(&mut self, code: i32, error: Option<&str>) -> Update {
        let mut update = Update::new();
        update.progressed = true;

        let rest = self.buffer.clear();
        if !rest.trim().is_empty() {
            self.remember(rest);
        }
        if let Some(error) = error {
            self.io_failed = true;
            update.push(Message::error(format!("Unison I/O error: {}", error)));
        }

        let expected = !self.io_failed
            && match self.state {
                State::Completed => code == 0 || (self.summarized && (code == 1 || code == 2)),
                State::Quitting | State::Aborting => true,
                _ => false,
            };

        if expected {
            info!(code, "Unison exited");
            if self.state == State::Aborting {
                self.status = "Sync aborted".to_string();
            }
        } else {
            warn!(code, state = self.state.name(), "Unison exited unexpectedly");
            let text = collapse_banner(&self.unclaimed)
                .unwrap_or_else(|| format!("Unison exited unexpectedly (code {})", code));
            update.push(Message::error(text));
            self.status = "Unison exited unexpectedly".to_string();
        }

        self.running = false;
        self.progress = None;
        self.live_alert = None;
        self.unclaimed.clear();
        self.transition(State::Exited);
        update
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub fn sync(&mut self) -> Result<Update> {
        self.require(Operation::Sync)?;
        let mut update = Update::new();
        update.send(b"0");
        self.set_status("Starting synchronization", &mut update);
        self.transition(State::Directing { cursor: 0 });
        Ok(update)
    }

    pub fn diff(&mut self, path: &str) -> Result<Update> {
        self.require(Operation::Diff)?;
        let mut update = Update::new();
        let target = normalize_path(path);
        let known = self
            .items
            .as_deref()
            .is_some_and(|items| items.iter().any(|i| i.path == target));
        if !known {
            update.push(Message::error(no_such_path(&target)));
            return Ok(update);
        }
        update.send(b"0");
        update.progressed = true;
        self.transition(State::Seeking {
            target,
            visited: 0,
            cancelled: false,
        });
        Ok(update)
    }

    pub fn quit(&mut self) -> Result<Update> {
        self.require(Operation::Quit)?;
        let mut update = Update::new();
        if self.state == State::PlanReady {
            update.send(b"q");
        }
        self.set_status("Quitting Unison", &mut update);
        self.transition(State::Quitting);
        Ok(update)
    }

    pub fn abort(&mut self) -> Result<Update> {
        self.require(Operation::Abort)?;
        let mut update = Update::new();
        update.progressed = true;
        match self.state {
            State::Seeking {
                ref mut cancelled, ..
            } => {
                // The next prompt is the way back to the plan.
                *cancelled = true;
            }
            State::DiffRequested { .. } => {
                update.signals |= Signals::INTERRUPT;
            }
            _ => {
                update.signals |= Signals::INTERRUPT;
                self.set_status("Aborting synchronization", &mut update);
                self.transition(State::Aborting);
            }
        }
        Ok(update)
    }

    pub fn interrupt(&mut self) -> Result<Update> {
        self.require(Operation::Interrupt)?;
        let mut update = Update::new();
        update.signals |= Signals::INTERRUPT;
        Ok(update)
    }

    pub fn kill(&mut self) -> Result<Update> {
        self.require(Operation::Kill)?;
        let mut update = Update::new();
        update.signals |= Signals::KILL;
        Ok(update)
    }

    /// Override the action for some plan items before syncing.
    pub fn set_action(&mut self, indices: &[usize], action: Action) -> Result<()> {
        if self.state != State::PlanReady || self.live_alert.is_some() {
            return Err(DriverError::NotReady(self.state.name()));
        }
        let items = self
            .items
            .as_mut()
            .ok_or(DriverError::NotReady(self.state.name()))?;
        plan::apply_action(items, indices, action)
    }

    pub(crate) fn answer_alert(&mut self, alert: Alert, proceed: bool) -> Update {
        let mut update = Update::new();
        if self.live_alert != Some(alert.id) || !self.running {
            warn!(id = alert.id, "Ignoring answer to an inactive alert");
            return update;
        }
        self.live_alert = None;
        update.progressed = true;
        if proceed {
            update.send(alert.kind.affirmative());
        } else {
            update.send(b"q");
            self.set_status("Quitting Unison", &mut update);
            self.transition(State::Quitting);
        }
        update
    }

    // =========================================================================
    // Drain loop
    // =========================================================================

    /// Run one recognizer step. Returns false once nothing more matches.
    fn step(&mut self, update: &mut Update) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        if let Some(len) = recognizer::erase(self.buffer.bytes()) {
            self.buffer.consume(len);
            return true;
        }
        let progress_allowed = !matches!(self.state, State::DiffRequested { .. });
        if progress_allowed {
            if let Some(m) = recognizer::progress_erased(self.buffer.bytes()) {
                self.buffer.consume(m.len);
                self.set_progress(m, update);
                return true;
            }
        }
        if let Some(line) = self.buffer.take_line() {
            self.on_line(line, update);
            return true;
        }
        if let Some(prompt) = recognizer::prompt(&self.buffer.tail()) {
            self.buffer.clear();
            self.on_prompt(prompt, update);
            return true;
        }
        if progress_allowed {
            // Shown, but left in the buffer until its erase arrives.
            if let Some(m) = recognizer::progress_tail(self.buffer.bytes()) {
                self.set_progress(m, update);
            }
        }
        false
    }

    fn on_line(&mut self, line: String, update: &mut Update) {
        if self.state == State::Listing && self.on_listing_line(&line) {
            return;
        }
        if matches!(self.state, State::DiffRequested { .. }) {
            self.on_diff_line(line, update);
            return;
        }

        if line.trim().is_empty() {
            self.remember(line);
            return;
        }
        if let Some(status) = recognizer::status_line(&line) {
            self.on_status(status, update);
            return;
        }
        if matches!(self.state, State::Working | State::Starting) {
            if let Some((left, right)) = recognizer::plan_header(&line) {
                self.left = left;
                self.right = right;
                self.unclaimed.clear();
                self.set_status("Assembling plan", update);
                self.transition(State::AwaitingPlan);
                return;
            }
        }
        debug!(line = %line, state = self.state.name(), "Unrecognized output");
        self.remember(line);
    }

    fn on_status(&mut self, status: StatusLine, update: &mut Update) {
        match status {
            StatusLine::Status(text) => {
                self.unclaimed.clear();
                self.set_status(text, update);
                if text == "Propagating updates" && matches!(self.state, State::Directing { .. })
                {
                    self.transition(State::Propagating);
                }
            }
            StatusLine::Summary { complete, detail } => {
                self.unclaimed.clear();
                self.summarized = true;
                if complete {
                    self.set_status(&format!("Sync complete ({})", detail), update);
                } else {
                    self.set_status(&format!("Sync incomplete ({})", detail), update);
                    update.push(Message::warning(format!(
                        "Synchronization incomplete: {}",
                        detail
                    )));
                }
                if self.state != State::Aborting {
                    self.transition(State::Completed);
                }
            }
            StatusLine::NothingToDo(why) => {
                self.unclaimed.clear();
                self.set_status("Nothing to do", update);
                update.push(Message::info(format!("Nothing to do: {}", why)));
                self.transition(State::Completed);
            }
            StatusLine::Failure(text) => {
                update.push(Message::error(text));
            }
        }
    }

    fn on_listing_line(&mut self, line: &str) -> bool {
        if let Some(row) = PlanRow::parse(line) {
            self.flush_pending();
            self.pending = Some(PendingItem {
                row,
                left: None,
                right: None,
            });
            return true;
        }
        let Some((side, content)) = recognizer::detail_line(line, &self.left, &self.right) else {
            return false;
        };
        let Some(pending) = self.pending.as_mut() else {
            warn!(line, "Description line without a plan row");
            return true;
        };
        match side {
            Side::Left => pending.left = Some(content),
            Side::Right => pending.right = Some(content),
        }
        if pending.left.is_some() && pending.right.is_some() {
            self.flush_pending();
        }
        true
    }

    fn flush_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            if pending.left.is_none() || pending.right.is_none() {
                warn!(path = %pending.row.path, "Plan row listed without both descriptions");
            }
            self.listing.push(pending.into_item());
        }
    }

    fn on_diff_line(&mut self, line: String, update: &mut Update) {
        if let Some(msg) = recognizer::cant_diff(&line) {
            update.push(Message::error(msg));
            self.transition(State::Settling);
            return;
        }
        if let State::DiffRequested { block, .. } = &mut self.state {
            block.push(line);
        }
    }

    fn on_prompt(&mut self, prompt: Prompt, update: &mut Update) {
        match prompt {
            Prompt::Proceed => {
                if matches!(self.state, State::Directing { .. }) {
                    update.send(b"y");
                    self.set_status("Propagating updates", update);
                    self.transition(State::Propagating);
                } else {
                    self.raise_alert(
                        "Proceed with propagating updates?".to_string(),
                        AlertKind::YesNo,
                        update,
                    );
                }
            }
            Prompt::Plan(row) => self.on_plan_prompt(row, update),
            Prompt::Question { text, kind } => self.raise_alert(text, kind, update),
        }
    }

    fn on_plan_prompt(&mut self, row: PlanRow, update: &mut Update) {
        self.unclaimed.clear();
        let state = std::mem::replace(&mut self.state, State::Exited);
        match state {
            State::Starting | State::Working | State::AwaitingPlan => {
                if !matches!(state, State::AwaitingPlan) {
                    warn!("Plan prompt before the plan header");
                }
                self.state = state;
                update.send(b"l");
                self.listing.clear();
                self.set_status("Assembling plan", update);
                self.transition(State::Listing);
            }
            State::Listing => {
                self.state = State::Listing;
                self.flush_pending();
                let items = std::mem::take(&mut self.listing);
                info!(items = items.len(), "Plan ready");
                self.items = Some(items);
                update.plan_ready = true;
                self.set_status("Ready to synchronize", update);
                self.transition(State::PlanReady);
            }
            State::Settling => {
                self.state = State::Settling;
                update.progressed = true;
                self.transition(State::PlanReady);
            }
            State::Directing { cursor } => {
                let items = self.items.as_deref().unwrap_or_default();
                match items.get(cursor) {
                    Some(item) => {
                        if item.path != row.path {
                            warn!(expected = %item.path, got = %row.path, "Plan prompt out of order");
                        }
                        // Mixed is never stored on an item.
                        update.send(item.action.directive().unwrap_or(b"/"));
                        self.state = State::Directing { cursor: cursor + 1 };
                    }
                    None => {
                        warn!(path = %row.path, "Plan prompt past the end of the plan");
                        self.state = State::Directing { cursor };
                    }
                }
            }
            State::Seeking {
                target,
                visited,
                cancelled,
            } => {
                self.state = State::Seeking {
                    target: target.clone(),
                    visited,
                    cancelled,
                };
                let items = self.items.as_deref().unwrap_or_default();
                let wrapped = visited > 0
                    && (visited >= items.len() || items.first().is_some_and(|i| i.path == row.path));
                if cancelled {
                    update.progressed = true;
                    self.transition(State::PlanReady);
                } else if row.path == target {
                    update.send(b"d");
                    self.transition(State::DiffRequested {
                        target,
                        block: Vec::new(),
                    });
                } else if wrapped {
                    update.push(Message::error(no_such_path(&target)));
                    update.send(b"n");
                    self.transition(State::Settling);
                } else {
                    update.send(b"n");
                    self.state = State::Seeking {
                        target,
                        visited: visited + 1,
                        cancelled,
                    };
                }
            }
            State::DiffRequested { target, block } => {
                self.state = State::DiffRequested {
                    target: target.clone(),
                    block: Vec::new(),
                };
                match recognizer::diff_body(&block) {
                    Some(text) => update.diff = Some(Diff { path: target, text }),
                    None => update.push(Message::warning(format!(
                        "Unison showed no differences for: {}",
                        target
                    ))),
                }
                update.progressed = true;
                self.transition(State::PlanReady);
            }
            other => {
                warn!(path = %row.path, state = other.name(), "Unexpected plan prompt");
                self.state = other;
            }
        }
    }

    fn raise_alert(&mut self, question: String, kind: AlertKind, update: &mut Update) {
        let mut lines = std::mem::take(&mut self.unclaimed);
        while lines.first().is_some_and(|l| l.trim().is_empty()) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
        if !question.is_empty() {
            lines.push(question);
        }
        let text = lines.join("\n");
        let importance = alert_importance(&text, kind);

        self.alert_seq += 1;
        self.live_alert = Some(self.alert_seq);
        info!(id = self.alert_seq, ?importance, "Backend is asking a question");
        update.alert = Some(Alert {
            id: self.alert_seq,
            message: Message { text, importance },
            kind,
        });
        update.progressed = true;
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn transition(&mut self, next: State) {
        if self.state != next {
            info!(from = self.state.name(), to = next.name(), "Engine state");
        }
        self.state = next;
    }

    fn set_status(&mut self, status: &str, update: &mut Update) {
        if self.status != status {
            self.status = status.to_string();
        }
        self.progress = None;
        update.progressed = true;
    }

    fn set_progress(&mut self, m: ProgressMatch, update: &mut Update) {
        let progress = Progress {
            text: m.text,
            fraction: m.fraction,
        };
        if self.progress.as_ref() != Some(&progress) {
            self.progress = Some(progress);
            update.progressed = true;
        }
    }

    fn remember(&mut self, line: String) {
        if self.unclaimed.len() >= UNCLAIMED_LIMIT {
            // Keep the first line; it usually names the problem.
            self.unclaimed.remove(1);
        }
        self.unclaimed.push(line);
    }
}

fn no_such_path(path: &str) -> String {
    format!(
        "Failed to get diff for: {}\nThere is no such path in Unison's plan. This is probably a bug in unison-drive.",
        path
    )
}

fn alert_importance(text: &str, kind: AlertKind) -> Importance {
    let lower = text.to_lowercase();
    if lower.contains("error") || lower.contains("fatal") {
        Importance::Error
    } else if kind == AlertKind::YesNo || lower.contains("warning") {
        Importance::Warning
    } else {
        Importance::Info
    }
}

/// `Unison exited, saying:` followed by the first and last banner lines.
fn collapse_banner(lines: &[String]) -> Option<String> {
    let lines: Vec<&str> = lines
        .iter()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .collect();
    let body = match lines.as_slice() {
        [] => return None,
        [only] => only.to_string(),
        [first, last] => format!("{}\n{}", first, last),
        [first, .., last] => format!("{}\n[...] {}", first, last),
    };
    Some(format!("Unison exited, saying:\n{}", body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> Engine {
        let mut engine = Engine::new();
        engine.proc_start();
        engine
    }

    #[test]
    fn test_new_engine_is_idle() {
        let engine = Engine::new();
        assert_eq!(engine.state(), &State::Starting);
        assert!(!engine.is_running());
        assert!(engine.items().is_none());
        assert!(engine.operations().is_empty());
    }

    #[test]
    fn test_start_enables_signals_only() {
        let engine = started();
        let ops = engine.operations();
        assert_eq!(ops, Operations::INTERRUPT | Operations::KILL);
        assert!(engine.is_busy());
    }

    #[test]
    fn test_disabled_operation_is_an_error() {
        let mut engine = started();
        match engine.sync() {
            Err(DriverError::Disabled { op, state }) => {
                assert_eq!(op, Operation::Sync);
                assert_eq!(state, "working");
            }
            other => panic!("expected Disabled, got {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_lines_are_tolerated() {
        let mut engine = started();
        let update = engine.proc_output(b"[BGN] something new\nLooking for changes\n");
        assert_eq!(engine.status(), "Looking for changes");
        assert!(update.messages.is_empty());
        assert!(engine.unclaimed.is_empty());
    }

    #[test]
    fn test_collapse_banner_shapes() {
        let lines = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(collapse_banner(&lines(&["", " "])), None);
        assert_eq!(
            collapse_banner(&lines(&["Fatal error: no"])).unwrap(),
            "Unison exited, saying:\nFatal error: no"
        );
        assert_eq!(
            collapse_banner(&lines(&["a", "", "b"])).unwrap(),
            "Unison exited, saying:\na\nb"
        );
        assert_eq!(
            collapse_banner(&lines(&["a", "b", "c"])).unwrap(),
            "Unison exited, saying:\na\n[...] c"
        );
    }

    #[test]
    fn test_io_error_makes_exit_unexpected() {
        let mut engine = started();
        engine.proc_output(b"Nothing to do: replicas have not changed since last sync.\n");
        assert_eq!(engine.state(), &State::Completed);
        let update = engine.proc_error("read failed");
        assert_eq!(update.messages[0].text, "Unison I/O error: read failed");
        engine.proc_exit(0, None);
        assert_eq!(engine.status(), "Unison exited unexpectedly");
    }

    #[test]
    fn test_nothing_to_do_exits_cleanly() {
        let mut engine = started();
        let update = engine.proc_output(b"Nothing to do: replicas have not changed since last sync.\n");
        assert_eq!(update.messages[0].importance, Importance::Info);
        assert!(engine.is_enabled(Operation::Quit));
        let update = engine.proc_exit(0, None);
        assert!(update.messages.is_empty());
        assert_eq!(engine.state(), &State::Exited);
        assert_eq!(engine.status(), "Nothing to do");
    }

    #[test]
    fn test_output_after_exit_is_ignored() {
        let mut engine = started();
        engine.proc_exit(3, None);
        assert!(engine.proc_output(b"Looking for changes\n").is_empty());
    }
}
