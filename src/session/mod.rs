//! Backend process session.
//!
//! Runs `<backend> <args…> -dumbtty` in its own process group and turns its
//! life into [`ProcEvent`]s. The engine never sees the process; the driver
//! loop feeds events in with [`feed`] and hands every resulting [`Update`]
//! back to [`Session::apply`].
//!
//! Stdout and stderr share one pipe, so the engine sees them interleaved
//! exactly as the backend wrote them.
//!
//! ```text
//! stdout --+
//!          +-- pipe --pump--> mpsc --> feed(engine) --> Update --> apply()
//! stderr --+                                                        |
//!   ^                                                               |
//!   +----------------------- stdin / SIGINT / SIGKILL --------------+
//! ```

pub mod channel;

pub use channel::{
    event_channel, EventReceiver, EventSender, ProcEvent, EVENT_CHANNEL_SIZE, READ_CHUNK_SIZE,
};

use anyhow::{Context, Result};
use bytes::BytesMut;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::process::{ChildStdin, Command};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{Engine, Update};

/// A running backend.
pub struct Session {
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    events: EventReceiver,
}

impl Session {
    /// Spawn the backend named in `config`. Must be called inside a tokio runtime.
    pub fn spawn(config: &Config) -> Result<Self> {
        Self::spawn_command(&config.backend, &config.args())
    }

    pub fn spawn_command(program: &str, args: &[String]) -> Result<Self> {
        let (reader, writer) = io::pipe().context("Failed to create output pipe")?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::piped());
        cmd.stderr(Stdio::from(
            writer.try_clone().context("Failed to share output pipe")?,
        ));
        cmd.stdout(Stdio::from(writer));
        cmd.kill_on_drop(true);
        // Own process group, so signals reach Unison's children too.
        cmd.process_group(0);
        let spawned = cmd.spawn();
        // Our copies of the write end must close, or the reader never sees EOF.
        drop(cmd);
        let mut child = spawned.with_context(|| format!("Failed to spawn {}", program))?;
        let pid = child.id();
        info!(program, ?args, ?pid, "Started backend");

        let stdin = child.stdin.take().context("Failed to open stdin")?;
        let output = pipe::Receiver::from_owned_fd(reader.into())
            .context("Failed to register output pipe")?;

        let (tx, rx) = event_channel();
        tx.try_send(ProcEvent::Start)
            .context("Event channel rejected the start event")?;

        let out = tokio::spawn(pump(output, tx.clone()));
        tokio::spawn(async move {
            // Exit is reported only after the pipe is drained.
            let _ = out.await;
            let event = match child.wait().await {
                Ok(status) => ProcEvent::Exit {
                    code: exit_code(status),
                    error: None,
                },
                Err(e) => ProcEvent::Exit {
                    code: -1,
                    error: Some(e.to_string()),
                },
            };
            if tx.send(event).await.is_err() {
                debug!("Driver went away before the backend exited");
            }
        });

        Ok(Self {
            pid,
            stdin: Some(stdin),
            events: rx,
        })
    }

    /// Next event, or `None` once `Exit` has been delivered.
    pub async fn next_event(&mut self) -> Option<ProcEvent> {
        self.events.recv().await
    }

    /// Carry out an update: input first, then SIGINT, then SIGKILL.
    ///
    /// A failed write is reported to the engine, and the engine's reaction is
    /// returned.
    pub async fn apply(&mut self, engine: &mut Engine, update: &Update) -> Update {
        let mut follow = Update::new();
        if !update.input.is_empty() {
            if let Err(e) = self.write_input(&update.input).await {
                follow.merge(engine.proc_error(e));
            }
        }
        if update.interrupt() {
            self.signal(libc::SIGINT);
        }
        if update.kill() {
            self.signal(libc::SIGKILL);
        }
        follow
    }

    async fn write_input(&mut self, input: &[u8]) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin is closed"))?;
        debug!(input = %String::from_utf8_lossy(input).escape_debug(), "Writing to backend");
        let result = async {
            stdin.write_all(input).await?;
            stdin.flush().await
        }
        .await;
        if result.is_err() {
            self.stdin = None;
        }
        result
    }

    /// Send `sig` to the backend's whole process group.
    pub fn signal(&self, sig: libc::c_int) {
        let Some(pid) = self.pid else {
            warn!(sig, "No backend process to signal");
            return;
        };
        info!(pid, sig, "Signalling backend");
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), sig) };
        if rc != 0 {
            debug!(pid, sig, error = %io::Error::last_os_error(), "Signal not delivered");
        }
    }
}

/// Feed one process event into the engine.
pub fn feed(engine: &mut Engine, event: &ProcEvent) -> Update {
    match event {
        ProcEvent::Start => engine.proc_start(),
        ProcEvent::Output(bytes) => engine.proc_output(bytes),
        ProcEvent::Error(detail) => engine.proc_error(detail),
        ProcEvent::Exit { code, error } => engine.proc_exit(*code, error.as_deref()),
    }
}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, tx: EventSender) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    loop {
        buf.reserve(READ_CHUNK_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = buf.split().freeze();
                if tx.send(ProcEvent::Output(chunk)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(ProcEvent::Error(e.to_string())).await;
                break;
            }
        }
    }
}

/// Exit code, or `128 + signal` for a signalled process.
fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    status.code().unwrap_or(-1)
}
