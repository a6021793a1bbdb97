//! Dedicated render thread for thread-affine graphics contexts
//!
//! The worker owns a backend state `S` (GL context, Metal device, ...) that
//! is created on, used on and dropped on one OS thread. Callers submit
//! closures and block until the worker has run them.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use parking_lot::Mutex;

use crate::error::{GpuError, Result};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Pending jobs before `call` blocks the submitter
const QUEUE_DEPTH: usize = 64;

enum Inner<S> {
    #[cfg(not(target_arch = "wasm32"))]
    Thread {
        tx: Mutex<Option<SyncSender<Job<S>>>>,
        join: Mutex<Option<std::thread::JoinHandle<()>>>,
    },
    /// Runs jobs on the calling thread; wasm32 has a single thread
    #[cfg(target_arch = "wasm32")]
    Inline(Mutex<Option<S>>),
}

/// Synchronous executor bound to one thread
pub(crate) struct RenderWorker<S> {
    name: String,
    inner: Inner<S>,
}

impl<S: 'static> RenderWorker<S> {
    /// Spawn the worker thread and build its state there.
    ///
    /// Fails if the thread cannot start or `init` fails; the error from
    /// `init` is returned unchanged.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn spawn<F>(name: &str, init: F) -> Result<Self>
    where
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let (job_tx, job_rx) = sync_channel::<Job<S>>(QUEUE_DEPTH);
        let (ready_tx, ready_rx) = sync_channel::<Result<()>>(1);

        let thread_name = name.to_string();
        let join = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || match init() {
                Ok(state) => {
                    let _ = ready_tx.send(Ok(()));
                    run(state, job_rx);
                    tracing::debug!("{}: render worker stopped", thread_name);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(|e| GpuError::Worker(format!("failed to spawn {name}: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::debug!("{}: render worker started", name);
                Ok(Self {
                    name: name.to_string(),
                    inner: Inner::Thread {
                        tx: Mutex::new(Some(job_tx)),
                        join: Mutex::new(Some(join)),
                    },
                })
            }
            Ok(Err(err)) => {
                let _ = join.join();
                Err(err)
            }
            Err(_) => {
                let _ = join.join();
                Err(GpuError::Worker(format!("{name} exited during startup")))
            }
        }
    }

    /// Executor that runs jobs on the caller's thread
    #[cfg(target_arch = "wasm32")]
    pub fn inline(name: &str, state: S) -> Self {
        Self {
            name: name.to_string(),
            inner: Inner::Inline(Mutex::new(Some(state))),
        }
    }

    /// Run `f` on the worker and wait for its result
    pub fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        match &self.inner {
            #[cfg(not(target_arch = "wasm32"))]
            Inner::Thread { tx, .. } => {
                let (reply_tx, reply_rx) = sync_channel::<R>(1);
                let job: Job<S> = Box::new(move |state| {
                    let _ = reply_tx.send(f(state));
                });
                self.submit(tx, job)?;
                reply_rx
                    .recv()
                    .map_err(|_| GpuError::Worker(format!("{} dropped a job", self.name)))
            }
            #[cfg(target_arch = "wasm32")]
            Inner::Inline(state) => match state.lock().as_mut() {
                Some(state) => Ok(f(state)),
                None => Err(self.stopped()),
            },
        }
    }

    /// Queue `f` without waiting. Used for releasing resources from `Drop`.
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let result = match &self.inner {
            #[cfg(not(target_arch = "wasm32"))]
            Inner::Thread { tx, .. } => self.submit(tx, Box::new(f)),
            #[cfg(target_arch = "wasm32")]
            Inner::Inline(state) => match state.lock().as_mut() {
                Some(state) => {
                    f(state);
                    Ok(())
                }
                None => Err(self.stopped()),
            },
        };
        if let Err(err) = result {
            tracing::debug!("dropping job: {}", err);
        }
    }

    /// Drop the state on its own thread and join. Later calls fail.
    pub fn stop(&self) {
        match &self.inner {
            #[cfg(not(target_arch = "wasm32"))]
            Inner::Thread { tx, join } => {
                tx.lock().take();
                if let Some(handle) = join.lock().take() {
                    if handle.join().is_err() {
                        tracing::warn!("{}: render worker panicked", self.name);
                    }
                }
            }
            #[cfg(target_arch = "wasm32")]
            Inner::Inline(state) => {
                state.lock().take();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        match &self.inner {
            #[cfg(not(target_arch = "wasm32"))]
            Inner::Thread { tx, .. } => tx.lock().is_some(),
            #[cfg(target_arch = "wasm32")]
            Inner::Inline(state) => state.lock().is_some(),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn submit(&self, tx: &Mutex<Option<SyncSender<Job<S>>>>, job: Job<S>) -> Result<()> {
        // clone so the lock is not held while the queue is full
        let sender = tx.lock().clone().ok_or_else(|| self.stopped())?;
        sender.send(job).map_err(|_| self.stopped())
    }

    fn stopped(&self) -> GpuError {
        GpuError::Worker(format!("{} is stopped", self.name))
    }
}

impl<S> Drop for RenderWorker<S> {
    fn drop(&mut self) {
        match &self.inner {
            #[cfg(not(target_arch = "wasm32"))]
            Inner::Thread { tx, join } => {
                tx.lock().take();
                if let Some(handle) = join.lock().take() {
                    let _ = handle.join();
                }
            }
            #[cfg(target_arch = "wasm32")]
            Inner::Inline(state) => {
                state.lock().take();
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn run<S>(mut state: S, jobs: Receiver<Job<S>>) {
    while let Ok(job) = jobs.recv() {
        job(&mut state);
    }
}
