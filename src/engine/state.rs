//! Engine states and the operations each one enables.

use std::fmt;

/// Internal protocol state. `Engine::status` is the human-readable parallel.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Starting,
    /// Scanning and reconciling; status lines arrive.
    Working,
    /// Plan header seen, waiting for the first plan prompt.
    AwaitingPlan,
    /// `l` sent; rows and their descriptions are being collected.
    Listing,
    PlanReady,
    /// Sync requested: answering each plan prompt with a directive.
    Directing { cursor: usize },
    /// `y` sent to the proceed prompt.
    Propagating,
    /// Diff requested, skipping prompts until `target` comes up.
    Seeking {
        target: String,
        visited: usize,
        cancelled: bool,
    },
    /// `d` sent for `target`; collecting the diff block.
    DiffRequested { target: String, block: Vec<String> },
    /// Waiting out one prompt before returning to `PlanReady`.
    Settling,
    Completed,
    Aborting,
    Quitting,
    Exited,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Working => "working",
            Self::AwaitingPlan => "awaiting the plan",
            Self::Listing => "listing the plan",
            Self::PlanReady => "ready",
            Self::Directing { .. } => "sending directives",
            Self::Propagating => "propagating updates",
            Self::Seeking { .. } => "seeking a diff target",
            Self::DiffRequested { .. } => "waiting for a diff",
            Self::Settling => "returning to the plan",
            Self::Completed => "completed",
            Self::Aborting => "aborting",
            Self::Quitting => "quitting",
            Self::Exited => "exited",
        }
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::PlanReady | Self::Completed | Self::Exited)
    }

    /// Operations enabled in this state, before the `running` gate.
    pub fn operations(&self) -> Operations {
        match self {
            Self::PlanReady => Operations::SYNC | Operations::DIFF | Operations::QUIT,
            Self::Completed => Operations::QUIT,
            Self::Directing { .. } | Self::Propagating => Operations::ABORT,
            Self::Seeking {
                cancelled: false, ..
            } => Operations::ABORT,
            Self::DiffRequested { .. } => Operations::ABORT,
            _ => Operations::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Sync,
    Quit,
    Abort,
    Interrupt,
    Kill,
    Diff,
}

impl Operation {
    pub fn flag(&self) -> Operations {
        match self {
            Self::Sync => Operations::SYNC,
            Self::Quit => Operations::QUIT,
            Self::Abort => Operations::ABORT,
            Self::Interrupt => Operations::INTERRUPT,
            Self::Kill => Operations::KILL,
            Self::Diff => Operations::DIFF,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Quit => "quit",
            Self::Abort => "abort",
            Self::Interrupt => "interrupt",
            Self::Kill => "kill",
            Self::Diff => "diff",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Operations: u8 {
        const SYNC = 1 << 0;
        const QUIT = 1 << 1;
        const ABORT = 1 << 2;
        const INTERRUPT = 1 << 3;
        const KILL = 1 << 4;
        const DIFF = 1 << 5;
    }
}

impl Operations {
    pub fn allows(&self, op: Operation) -> bool {
        self.contains(op.flag())
    }
}
