// ─── Logged Process ───
// Spawns a child process and supervises it: line-buffered stdout/stderr
// capture, exit classification, and kill-vs-crash disambiguation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::log::level::LogLevel;

/// Reassembles complete lines from arbitrarily chunked byte reads.
///
/// Bytes after the last line feed are carried over to the next push, so a
/// line — or a multi-byte sequence inside it — split across read
/// boundaries is never torn apart. Carriage returns are dropped, which
/// normalizes CRLF and LF endings uniformly.
#[derive(Default)]
pub struct LineDecoder {
    leftover: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every line completed by it.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.leftover.extend_from_slice(data);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.leftover[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(Self::decode(&self.leftover[start..end]));
            start = end + 1;
        }
        self.leftover.drain(..start);
        lines
    }

    /// Emit a trailing unterminated line, if any. Called once the stream
    /// has ended.
    pub fn flush(&mut self) -> Option<String> {
        if self.leftover.is_empty() {
            return None;
        }
        let last = Self::decode(&self.leftover);
        self.leftover.clear();
        Some(last)
    }

    fn decode(bytes: &[u8]) -> String {
        // CR bytes never occur inside multi-byte UTF-8 sequences, so they
        // can be stripped before decoding.
        let cleaned: Vec<u8> = bytes.iter().copied().filter(|&b| b != b'\r').collect();
        String::from_utf8_lossy(&cleaned).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotRunning,
    Starting,
    Running,
    Finished,
    Crashed,
    Aborted,
    FailedToStart,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::Finished
                | ProcessState::Crashed
                | ProcessState::Aborted
                | ProcessState::FailedToStart
        )
    }
}

#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Log { lines: Vec<String>, level: LogLevel },
    StateChanged(ProcessState),
}

/// Cloneable control handle, usable from abort hooks while the owner is
/// blocked in `wait()`.
#[derive(Clone)]
pub struct ProcessControl {
    killed: Arc<AtomicBool>,
    kill_notify: Arc<Notify>,
    state: Arc<Mutex<ProcessState>>,
}

impl ProcessControl {
    /// Request termination. The exit will be classified as Aborted rather
    /// than Crashed, regardless of the OS exit status.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
        self.kill_notify.notify_waiters();
    }

    pub fn state(&self) -> ProcessState {
        *self.state.lock().unwrap()
    }

    fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

pub struct LoggedProcess {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    events_tx: UnboundedSender<ProcessEvent>,
    events_rx: Option<UnboundedReceiver<ProcessEvent>>,
    control: ProcessControl,
    exit_code: Option<i32>,
}

impl LoggedProcess {
    /// Spawn `command` with all three standard streams piped.
    ///
    /// A spawn failure does not error out here: the process lands in the
    /// FailedToStart terminal state with a single Fatal log event, exactly
    /// like any other exit path, so callers have one reporting channel.
    pub fn spawn(mut command: Command) -> Self {
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let control = ProcessControl {
            killed: Arc::new(AtomicBool::new(false)),
            kill_notify: Arc::new(Notify::new()),
            state: Arc::new(Mutex::new(ProcessState::NotRunning)),
        };

        let mut process = Self {
            child: None,
            stdin: None,
            events_tx,
            events_rx: Some(events_rx),
            control,
            exit_code: None,
        };

        process.change_state(ProcessState::Starting);
        match command.spawn() {
            Ok(mut child) => {
                process.stdin = child.stdin.take();
                process.child = Some(child);
                process.change_state(ProcessState::Running);
            }
            Err(e) => {
                debug!("Process failed to start: {}", e);
                process.log(vec!["The process failed to start.".into()], LogLevel::Fatal);
                process.change_state(ProcessState::FailedToStart);
            }
        }
        process
    }

    pub fn control(&self) -> ProcessControl {
        self.control.clone()
    }

    pub fn state(&self) -> ProcessState {
        self.control.state()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Take the event stream. Call before `wait()` when events are to be
    /// consumed concurrently with supervision.
    pub fn take_events(&mut self) -> UnboundedReceiver<ProcessEvent> {
        self.events_rx.take().expect("process events already taken")
    }

    /// Write one line of the textual stdin handshake (`launch` / `abort`).
    pub async fn write_line(&mut self, line: &str) -> LauncherResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| LauncherError::Other("Process stdin is not available".into()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Supervise the child to exit: pump both output streams into log
    /// events and classify the termination.
    pub async fn wait(&mut self) -> ProcessState {
        if self.state() == ProcessState::FailedToStart {
            return ProcessState::FailedToStart;
        }
        let mut child = match self.child.take() {
            Some(child) => child,
            None => return self.state(),
        };

        let stdout_pump = tokio::spawn(pump_stream(
            child.stdout.take(),
            LogLevel::StdOut,
            self.events_tx.clone(),
        ));
        let stderr_pump = tokio::spawn(pump_stream(
            child.stderr.take(),
            LogLevel::StdErr,
            self.events_tx.clone(),
        ));

        let status = loop {
            let killed = self.control.kill_notify.notified();
            if self.control.was_killed() {
                let _ = child.start_kill();
            }
            tokio::select! {
                status = child.wait() => break status,
                _ = killed => {
                    let _ = child.start_kill();
                }
            }
        };

        // join the pumps so every line is delivered before the exit lines
        let _ = stdout_pump.await;
        let _ = stderr_pump.await;

        let code = status.ok().and_then(|s| s.code());
        self.exit_code = code;

        if self.control.was_killed() {
            self.log(vec!["Process was killed by user.".into()], LogLevel::Error);
            self.change_state(ProcessState::Aborted);
        } else {
            match code {
                Some(0) => {
                    self.log(vec!["Process exited with code 0.".into()], LogLevel::Launcher);
                    self.change_state(ProcessState::Finished);
                }
                Some(code) => {
                    self.log(
                        vec![format!("Process crashed with exitcode {code}.")],
                        LogLevel::Launcher,
                    );
                    self.change_state(ProcessState::Crashed);
                }
                None => {
                    self.log(vec!["Process crashed.".into()], LogLevel::Launcher);
                    self.change_state(ProcessState::Crashed);
                }
            }
        }
        self.state()
    }

    fn change_state(&mut self, next: ProcessState) {
        let mut state = self.control.state.lock().unwrap();
        if *state == next {
            return;
        }
        *state = next;
        drop(state);
        let _ = self.events_tx.send(ProcessEvent::StateChanged(next));
    }

    fn log(&self, lines: Vec<String>, level: LogLevel) {
        let _ = self.events_tx.send(ProcessEvent::Log { lines, level });
    }
}

async fn pump_stream<R>(
    stream: Option<R>,
    level: LogLevel,
    events: UnboundedSender<ProcessEvent>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(mut stream) = stream else {
        return;
    };
    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let lines = decoder.push(&buf[..n]);
                if !lines.is_empty() {
                    let _ = events.send(ProcessEvent::Log { lines, level });
                }
            }
        }
    }
    if let Some(last) = decoder.flush() {
        let _ = events.send(ProcessEvent::Log {
            lines: vec![last],
            level,
        });
    }
}
