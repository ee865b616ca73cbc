//! A single-threaded async scheduler on its own OS thread.
//!
//! Synchronous call sites use [`WorkerLoop::submit`] to run a future there and
//! [`WorkHandle::result`] to block for its outcome, without touching the
//! runtime that owns the connection.

use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use rmcs_core::{Result, RmcsError};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

enum Command {
    Run(Job),
    Stop,
}

struct Running {
    tx: mpsc::UnboundedSender<Command>,
    done: std_mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

pub struct WorkerLoop {
    name: String,
    running: Mutex<Option<Running>>,
}

impl WorkerLoop {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawn the scheduler thread and block until it accepts work.
    /// Starting a loop that is already running does nothing.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (done_tx, done_rx) = std_mpsc::channel();
        let name = self.name.clone();

        let thread = std::thread::Builder::new()
            .name(format!("rmcs-{}", self.name))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                rt.block_on(run_jobs(&name, rx));
                drop(rt);
                let _ = done_tx.send(());
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(RmcsError::WorkFailed(format!(
                    "worker loop '{}' exited during startup",
                    self.name
                )));
            }
        }

        debug!(worker = %self.name, "worker loop started");
        *running = Some(Running {
            tx,
            done: done_rx,
            thread,
        });
        Ok(())
    }

    /// Schedule `work` on the loop. Fails at once if the loop is not running.
    pub fn submit<F, T>(&self, work: F) -> Result<WorkHandle<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let running = self.running.lock();
        let Some(running) = running.as_ref() else {
            return Err(RmcsError::WorkerNotRunning(self.name.clone()));
        };

        let (result_tx, result_rx) = std_mpsc::sync_channel(1);
        let job: Job = Box::pin(async move {
            let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(RmcsError::WorkFailed(panic_message(panic.as_ref()))),
            };
            let _ = result_tx.send(outcome);
        });

        running
            .tx
            .send(Command::Run(job))
            .map_err(|_| RmcsError::WorkerNotRunning(self.name.clone()))?;
        Ok(WorkHandle { rx: result_rx })
    }

    /// Cancel outstanding work, wait for it to unwind, and join the thread.
    ///
    /// Idempotent. Returns `WorkTimeout` if the thread has not finished within
    /// `timeout`; the thread is then left to exit on its own.
    pub fn stop(&self, timeout: Duration) -> Result<()> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };

        let _ = running.tx.send(Command::Stop);
        match running.done.recv_timeout(timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                let _ = running.thread.join();
                info!(worker = %self.name, "worker loop stopped");
                Ok(())
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(worker = %self.name, ?timeout, "worker loop did not stop in time");
                Err(RmcsError::WorkTimeout(timeout))
            }
        }
    }
}

impl Drop for WorkerLoop {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.tx.send(Command::Stop);
        }
    }
}

async fn run_jobs(name: &str, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut jobs = JoinSet::new();
    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Run(job)) => {
                    jobs.spawn(job);
                }
                Some(Command::Stop) | None => break,
            },
            Some(_) = jobs.join_next(), if !jobs.is_empty() => {}
        }
    }

    let pending = jobs.len();
    if pending > 0 {
        debug!(worker = %name, pending, "cancelling outstanding work");
    }
    jobs.abort_all();
    while jobs.join_next().await.is_some() {}
}

/// The pending outcome of one submission.
pub struct WorkHandle<T> {
    rx: std_mpsc::Receiver<Result<T>>,
}

impl<T: Send + 'static> WorkHandle<T> {
    /// Block the calling thread until the work finishes.
    ///
    /// Must not be called from inside an async task; use [`WorkHandle::join`].
    pub fn result(self, timeout: Duration) -> Result<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(std_mpsc::RecvTimeoutError::Timeout) => Err(RmcsError::WorkTimeout(timeout)),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(RmcsError::WorkCancelled),
        }
    }

    /// Await the outcome from async code.
    pub async fn join(self, timeout: Duration) -> Result<T> {
        tokio::task::spawn_blocking(move || self.result(timeout))
            .await
            .map_err(|e| RmcsError::WorkFailed(e.to_string()))?
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_extracts_str() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
    }
}
