//! Drive Unison's `-dumbtty` text UI from a front-end.
//!
//! [`Engine`] turns the backend's output into status, progress, a plan and
//! alerts, and turns user operations into the keystrokes Unison expects.
//! [`session`] connects an engine to a real process; [`transcript`] records
//! and replays sessions without one.

pub mod config;
pub mod engine;
pub mod error;
pub mod plan;
pub mod session;
pub mod transcript;

pub use engine::{
    Alert, AlertKind, Diff, Engine, Importance, Message, Operation, Operations, Progress, Signals,
    State, Update,
};
pub use error::{DriverError, Result};
pub use plan::{Action, Content, ContentStatus, ContentType, Item};
