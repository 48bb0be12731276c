//! Events flowing from the backend process to the driver loop.

use bytes::Bytes;
use tokio::sync::mpsc;

/// Channel size for process events. Readers block when the driver lags.
pub const EVENT_CHANNEL_SIZE: usize = 64;

/// Read size for each stdout/stderr pipe.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Something that happened to the backend process.
///
/// A session produces exactly one `Start`, then any number of `Output` and
/// `Error` events, then exactly one `Exit`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcEvent {
    Start,
    /// A chunk from stdout or stderr, in arrival order.
    Output(Bytes),
    Error(String),
    Exit { code: i32, error: Option<String> },
}

pub type EventSender = mpsc::Sender<ProcEvent>;
pub type EventReceiver = mpsc::Receiver<ProcEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_SIZE)
}
