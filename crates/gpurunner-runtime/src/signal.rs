//! Stop latch between the pool and a worker process
//!
//! The pool holds the write end of the worker's stdin. Setting the signal
//! writes [`STOP_LINE`] and closes the pipe; the worker's listener flips an
//! atomic flag when it reads that line or sees EOF, so a worker whose parent
//! vanished stops too.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tracing::debug;

/// Line written to a worker's stdin to stop it
pub const STOP_LINE: &str = "stop";

/// Pool side of the latch: set once, never cleared
#[derive(Debug, Default)]
pub struct StopSignal {
    set: bool,
    pipe: Option<ChildStdin>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.set
    }

    /// Connect the signal to a freshly spawned worker.
    ///
    /// If the signal was already set the worker is told to stop right away.
    pub async fn attach(&mut self, pipe: ChildStdin) {
        if self.set {
            deliver(pipe).await;
        } else {
            self.pipe = Some(pipe);
        }
    }

    /// Set the signal. Later calls are no-ops.
    pub async fn set(&mut self) {
        if self.set {
            return;
        }
        self.set = true;
        if let Some(pipe) = self.pipe.take() {
            deliver(pipe).await;
        }
    }
}

async fn deliver(mut pipe: ChildStdin) {
    let line = format!("{}\n", STOP_LINE);
    if let Err(e) = pipe.write_all(line.as_bytes()).await {
        // the worker is already gone; joining it will tell how
        debug!(error = %e, "Could not deliver stop line");
    }
    let _ = pipe.shutdown().await;
}

/// Worker side of the latch
#[derive(Debug, Clone, Default)]
pub struct StopListener {
    flag: Arc<AtomicBool>,
}

impl StopListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Watch `reader` on a background thread and set the flag on the stop
    /// line, on EOF, or on a read error. Other lines are ignored.
    pub fn watch<R>(&self, reader: R) -> JoinHandle<()>
    where
        R: BufRead + Send + 'static,
    {
        let listener = self.clone();
        std::thread::spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) if line.trim() == STOP_LINE => break,
                    Ok(line) => debug!(line = %line, "Ignoring unexpected input"),
                    Err(_) => break,
                }
            }
            listener.set();
        })
    }

    /// Watch this process's stdin
    pub fn watch_stdin(&self) -> JoinHandle<()> {
        self.watch(std::io::BufReader::new(std::io::stdin()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_listener_starts_unset() {
        let listener = StopListener::new();
        assert!(!listener.is_set());
        listener.set();
        assert!(listener.is_set());
        // clones share the latch
        assert!(listener.clone().is_set());
    }

    #[test]
    fn test_watch_sets_on_stop_line() {
        let listener = StopListener::new();
        listener
            .watch(Cursor::new("hello\nstop\nignored\n"))
            .join()
            .unwrap();
        assert!(listener.is_set());
    }

    #[test]
    fn test_watch_sets_on_eof() {
        let listener = StopListener::new();
        listener.watch(Cursor::new("")).join().unwrap();
        assert!(listener.is_set());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_set_before_attach_is_delivered() {
        use std::process::Stdio;
        use tokio::process::Command;

        let mut signal = StopSignal::new();
        signal.set().await;
        assert!(signal.is_set());

        let mut child = Command::new("sh")
            .arg("-c")
            .arg("read line; test \"$line\" = stop")
            .stdin(Stdio::piped())
            .spawn()
            .unwrap();
        let stdin = child.stdin.take().unwrap();
        signal.attach(stdin).await;

        let status = child.wait().await.unwrap();
        assert!(status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_set_twice_is_noop() {
        use std::process::Stdio;
        use tokio::process::Command;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg("read line; test \"$line\" = stop")
            .stdin(Stdio::piped())
            .spawn()
            .unwrap();

        let mut signal = StopSignal::new();
        signal.attach(child.stdin.take().unwrap()).await;
        signal.set().await;
        signal.set().await;

        assert!(child.wait().await.unwrap().success());
    }
}
