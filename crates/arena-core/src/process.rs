use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of a timed read from a child's output stream. End-of-stream is
/// distinct from a timeout: once `Eof` is returned the child has closed its
/// side and no further lines will ever arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    Line(String),
    Timeout,
    Eof,
}

/// A child process with line-oriented stdin/stdout. Stderr is folded into the
/// same line stream. A dedicated reader thread per stream splits the byte
/// stream into `\n`-delimited lines (trailing `\r` stripped) and queues them
/// in FIFO order.
pub struct LineProcess {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    rx: Receiver<String>,
    readers: Vec<JoinHandle<()>>,
    exit_status: Option<ExitStatus>,
}

impl LineProcess {
    pub fn spawn(command: &str, args: &[String], working_dir: Option<&Path>) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args).stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        let mut child =
            cmd.spawn().with_context(|| format!("failed to spawn process: {command}"))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin pipe"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout pipe"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("no stderr pipe"))?;

        let (tx, rx) = unbounded::<String>();
        let readers = vec![spawn_reader(stdout, tx.clone()), spawn_reader(stderr, tx)];

        log::debug!("spawned {} (pid {})", command, child.id());

        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            rx,
            readers,
            exit_status: None,
        })
    }

    /// Write one line (a trailing `\n` is appended) and flush. Fails once the
    /// child has been observed to exit or when the pipe write fails.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        if self.exit_status.is_some() {
            return Err(anyhow!("process has exited"));
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| anyhow!("stdin already closed"))?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;
        Ok(())
    }

    /// Block for up to `timeout` waiting for the next queued line.
    pub fn read_line(&self, timeout: Duration) -> ReadLine {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => ReadLine::Line(line),
            Err(RecvTimeoutError::Timeout) => ReadLine::Timeout,
            Err(RecvTimeoutError::Disconnected) => ReadLine::Eof,
        }
    }

    pub fn is_running(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Hard-kill the child. Idempotent; a process that already exited is left
    /// alone.
    pub fn terminate(&mut self) {
        if self.is_running() {
            let _ = self.child.kill();
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.exit_status = Some(status);
        }
    }

    /// Poll for exit for up to `timeout`. Returns true once the child is gone.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    pub fn exit_code(&mut self) -> Option<i32> {
        self.is_running();
        self.exit_status.and_then(|status| status.code())
    }
}

impl Drop for LineProcess {
    fn drop(&mut self) {
        // Closing stdin lets a well-behaved child exit on its own; anything
        // still alive afterwards gets killed and reaped.
        self.stdin.take();
        if self.is_running() {
            let _ = self.child.kill();
        }
        if let Ok(status) = self.child.wait() {
            self.exit_status = Some(status);
        }
        for handle in self.readers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(stream: R, tx: Sender<String>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(l) => {
                    if tx.send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> LineProcess {
        LineProcess::spawn("sh", &["-c".to_string(), script.to_string()], None).unwrap()
    }

    #[test]
    fn reads_lines_in_order_then_eof() {
        let proc = sh("printf 'one\\ntwo\\r\\nthree\\n'");
        assert_eq!(proc.read_line(Duration::from_secs(5)), ReadLine::Line("one".into()));
        assert_eq!(proc.read_line(Duration::from_secs(5)), ReadLine::Line("two".into()));
        assert_eq!(proc.read_line(Duration::from_secs(5)), ReadLine::Line("three".into()));
        assert_eq!(proc.read_line(Duration::from_secs(5)), ReadLine::Eof);
    }

    #[test]
    fn timeout_is_not_eof() {
        let proc = sh("sleep 5");
        assert_eq!(proc.read_line(Duration::from_millis(50)), ReadLine::Timeout);
    }

    #[test]
    fn echo_round_trip() {
        let mut proc = sh("while read line; do echo \"got $line\"; done");
        proc.write_line("ping").unwrap();
        assert_eq!(proc.read_line(Duration::from_secs(5)), ReadLine::Line("got ping".into()));
    }

    #[test]
    fn exit_code_and_running_state() {
        let mut proc = sh("exit 3");
        assert!(proc.wait_for_exit(Duration::from_secs(5)));
        assert!(!proc.is_running());
        assert_eq!(proc.exit_code(), Some(3));
    }

    #[test]
    fn write_after_exit_fails() {
        let mut proc = sh("exit 0");
        assert!(proc.wait_for_exit(Duration::from_secs(5)));
        assert!(proc.write_line("hello").is_err());
    }

    #[test]
    fn stderr_is_merged() {
        let proc = sh("echo oops >&2");
        assert_eq!(proc.read_line(Duration::from_secs(5)), ReadLine::Line("oops".into()));
    }
}
