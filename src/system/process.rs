// src/system/process.rs

use crate::{CancellationToken, core::console::Console};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Command as StdCommand, ExitStatus, Stdio};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, #[source] std::io::Error),
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("Operation was cancelled by the user.")]
    Cancelled,
}

/// Output of a command run to completion with piped streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// One line a child wrote, tagged with the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Splits a raw command line into argv with POSIX quoting rules.
pub fn split_command_line(line: &str) -> Result<Vec<String>, ProcessError> {
    let parts =
        shlex::split(line.trim()).ok_or_else(|| ProcessError::CommandParse(line.to_string()))?;
    if parts.is_empty() {
        return Err(ProcessError::EmptyCommand);
    }
    Ok(parts)
}

/// Runs a raw command line in `cwd`, forwarding its output to `console`.
///
/// On Windows, built-ins like `echo` are not binaries; a `NotFound` on spawn
/// retries the whole line through `cmd /C`.
pub fn run_line(
    line: &str,
    cwd: &Path,
    console: &Console,
    cancel: Option<&CancellationToken>,
) -> Result<i32, ProcessError> {
    let parts = split_command_line(line)?;
    let clean_cwd = dunce::simplified(cwd);

    let mut command = argv_command(&parts)?;
    command.current_dir(clean_cwd);

    match spawn_and_wait(&mut command, console, cancel) {
        Err(ProcessError::CommandFailed(program, e))
            if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") =>
        {
            log::debug!("Command '{}' not found. Retrying with cmd /C.", program);
            let mut fallback = StdCommand::new("cmd");
            fallback.arg("/C").arg(line.trim()).current_dir(clean_cwd);
            spawn_and_wait(&mut fallback, console, cancel)
        }
        other => other,
    }
}

/// Runs an already split argv in `cwd`, forwarding its output to `console`.
pub fn run_argv(
    argv: &[String],
    cwd: &Path,
    console: &Console,
    cancel: Option<&CancellationToken>,
) -> Result<i32, ProcessError> {
    let mut command = argv_command(argv)?;
    command.current_dir(dunce::simplified(cwd));
    spawn_and_wait(&mut command, console, cancel)
}

/// Runs `command` and forwards each line it prints to `console` as it arrives.
pub fn spawn_and_wait(
    command: &mut StdCommand,
    console: &Console,
    cancel: Option<&CancellationToken>,
) -> Result<i32, ProcessError> {
    spawn_and_forward(command, cancel, &mut |line| match line {
        OutputLine::Stdout(text) => console.stdout(&text),
        OutputLine::Stderr(text) => console.stderr(&text),
    })
}

/// Runs `command` with piped stdout/stderr and hands every line to `forward`.
///
/// One reader thread per stream feeds a channel; this thread polls the child
/// and the cancellation token in between. Once the token is set the child is
/// killed, nothing more is forwarded and the caller sees `Cancelled` rather
/// than the child's code.
pub fn spawn_and_forward(
    command: &mut StdCommand,
    cancel: Option<&CancellationToken>,
    forward: &mut dyn FnMut(OutputLine),
) -> Result<i32, ProcessError> {
    let description = describe(command);
    log::debug!("Spawning: {}", description);

    let mut child = command
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProcessError::CommandFailed(description.clone(), e))?;

    let (sender, receiver) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(read_lines(stdout, sender.clone(), OutputLine::Stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(read_lines(stderr, sender.clone(), OutputLine::Stderr));
    }
    drop(sender);

    let status = loop {
        if is_cancelled(cancel) {
            log::debug!(
                "Cancellation requested, killing child process (PID: {})...",
                child.id()
            );
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill child process {}: {}", child.id(), e);
            }
            child.wait().ok();
            return Err(ProcessError::Cancelled);
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(line) => forward(line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(POLL_INTERVAL),
            },
            Err(e) => return Err(ProcessError::CommandFailed(description, e)),
        }
    };

    drain(&receiver, cancel, forward)?;
    for reader in readers {
        reader.join().ok();
    }

    let code = exit_code(status);
    log::debug!("'{}' exited with {}", description, code);
    Ok(code)
}

/// Forwards what is left once the child exited, until both streams hit EOF.
fn drain(
    receiver: &Receiver<OutputLine>,
    cancel: Option<&CancellationToken>,
    forward: &mut dyn FnMut(OutputLine),
) -> Result<(), ProcessError> {
    loop {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(line) => forward(line),
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
            Err(RecvTimeoutError::Timeout) if is_cancelled(cancel) => {
                return Err(ProcessError::Cancelled);
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

fn read_lines<R: Read + Send + 'static>(
    stream: R,
    sender: Sender<OutputLine>,
    tag: fn(String) -> OutputLine,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    // The receiver is gone once the run was cancelled.
                    if sender.send(tag(line)).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Runs `command` attached to the terminal, for interactive sessions.
/// Ctrl+C belongs to the session, so no cancellation is polled.
pub fn run_interactive(command: &mut StdCommand) -> Result<i32, ProcessError> {
    let description = describe(command);
    let status = command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| ProcessError::CommandFailed(description, e))?;
    Ok(exit_code(status))
}

/// Runs `command` to completion and captures both streams.
pub fn capture(command: &mut StdCommand) -> Result<Captured, ProcessError> {
    let description = describe(command);
    log::trace!("Capturing: {}", description);

    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ProcessError::CommandFailed(description.clone(), e))?;

    let stdout = String::from_utf8(output.stdout).map_err(|e| ProcessError::InvalidUtf8Output {
        command: description.clone(),
        source: e,
    })?;
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    Ok(Captured {
        code: exit_code(output.status),
        stdout,
        stderr,
    })
}

/// Maps an exit status to a shell-style code; signals become `128 + n` on unix.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

pub fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::SeqCst))
}

fn argv_command(argv: &[String]) -> Result<StdCommand, ProcessError> {
    let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;
    let mut command = StdCommand::new(program);
    command.args(args);
    Ok(command)
}

fn describe(command: &StdCommand) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
