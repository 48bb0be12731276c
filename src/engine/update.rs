//! What every engine entry point hands back to the front-end.

use super::Engine;

bitflags::bitflags! {
    /// Signals to deliver to the backend, after any input bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Signals: u8 {
        const INTERRUPT = 1 << 0;
        const KILL = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Importance {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub importance: Importance,
}

impl Message {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            importance: Importance::Info,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            importance: Importance::Warning,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            importance: Importance::Error,
        }
    }
}

/// The unified diff Unison showed for one plan item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub path: String,
    /// From the first `---` line through the last hunk line.
    pub text: String,
}

/// Which keystroke confirms an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// `... [] ` yes/no question.
    YesNo,
    /// `Press return to continue.[] `
    PressReturn,
    /// `Press return to continue.[<spc>] `
    PressSpace,
}

impl AlertKind {
    pub fn affirmative(&self) -> &'static [u8] {
        match self {
            Self::YesNo => b"y",
            Self::PressReturn => b"\n",
            Self::PressSpace => b" ",
        }
    }
}

/// A modal question from the backend.
///
/// Alerts are not `Clone`: answering one consumes it, so each alert is
/// answered at most once. An alert superseded by a newer one is inert.
#[derive(Debug, PartialEq, Eq)]
pub struct Alert {
    pub(crate) id: u64,
    pub message: Message,
    pub kind: AlertKind,
}

impl Alert {
    pub fn text(&self) -> &str {
        &self.message.text
    }

    pub fn importance(&self) -> Importance {
        self.message.importance
    }

    /// Send the affirmative keystroke and resume.
    pub fn proceed(self, engine: &mut Engine) -> Update {
        engine.answer_alert(self, true)
    }

    /// Send `q` and quit the backend.
    pub fn abort(self, engine: &mut Engine) -> Update {
        engine.answer_alert(self, false)
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct Update {
    /// Status, progress or plan fields changed.
    pub progressed: bool,
    /// Bytes for the backend's stdin.
    pub input: Vec<u8>,
    pub signals: Signals,
    /// The plan has just been fully enumerated.
    pub plan_ready: bool,
    pub diff: Option<Diff>,
    /// Infobar messages, oldest first.
    pub messages: Vec<Message>,
    /// The live alert, if one was raised.
    pub alert: Option<Alert>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn interrupt(&self) -> bool {
        self.signals.contains(Signals::INTERRUPT)
    }

    pub fn kill(&self) -> bool {
        self.signals.contains(Signals::KILL)
    }

    pub(crate) fn send(&mut self, bytes: &[u8]) {
        self.input.extend_from_slice(bytes);
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Fold a later update into this one. The later alert and diff win.
    pub fn merge(&mut self, later: Update) {
        self.progressed |= later.progressed;
        self.input.extend_from_slice(&later.input);
        self.signals |= later.signals;
        self.plan_ready |= later.plan_ready;
        if later.diff.is_some() {
            self.diff = later.diff;
        }
        self.messages.extend(later.messages);
        if later.alert.is_some() {
            self.alert = later.alert;
        }
    }

    /// Input as text, for logs and tests.
    pub fn input_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.input)
    }
}
