//! Background variant of the tail reader.
//!
//! A tokio task polls a [`TailReader`] on a fixed interval and pushes lines
//! into a bounded queue. The consumer side, [`ObservedLines`], is itself a
//! [`LineSource`], so the message pump runs unchanged on top of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{LineSource, TailReader};

/// What the producer does when the line queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Log a warning and skip reading for this tick. Unread lines stay in
    /// the file (or the reader's buffer) and are picked up later.
    #[default]
    Defer,
    /// Wait for the consumer to make room.
    Block,
}

/// Tuning for the background observer.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Delay between file polls.
    pub interval: Duration,
    /// Maximum number of lines waiting for the consumer.
    pub queue_capacity: usize,
    /// Behaviour when the queue is full.
    pub overflow: OverflowPolicy,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            queue_capacity: 1000,
            overflow: OverflowPolicy::Defer,
        }
    }
}

/// Handle to a running observer task.
///
/// Stopping is cooperative: the flag is checked once per poll interval.
/// Dropping the handle also requests a stop.
#[derive(Debug)]
pub struct LineObserver {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Consumer end of the observer queue.
#[derive(Debug)]
pub struct ObservedLines {
    rx: mpsc::Receiver<String>,
}

impl LineObserver {
    /// Start observing `reader` on the current tokio runtime.
    ///
    /// A zero `queue_capacity` is raised to 1.
    pub fn spawn(reader: TailReader, config: ObserverConfig) -> (Self, ObservedLines) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&running);
        let handle = tokio::spawn(observe(reader, tx, flag, config));

        (
            Self {
                running,
                handle: Some(handle),
            },
            ObservedLines { rx },
        )
    }

    /// Whether the observer has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the observer to stop after its current tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Stop the observer and wait for its task to finish.
    pub async fn join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "log observer task ended abnormally");
            }
        }
    }
}

impl Drop for LineObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

impl LineSource for ObservedLines {
    fn next_line(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

async fn observe(
    mut reader: TailReader,
    tx: mpsc::Sender<String>,
    running: Arc<AtomicBool>,
    config: ObserverConfig,
) {
    let mut interval = tokio::time::interval(config.interval);
    debug!(path = %reader.path().display(), "log observer started");

    'poll: loop {
        interval.tick().await;
        if !running.load(Ordering::Acquire) {
            break;
        }

        if config.overflow == OverflowPolicy::Defer && tx.capacity() == 0 {
            warn!(
                capacity = config.queue_capacity,
                "line queue is full, deferring log poll"
            );
            continue;
        }

        // Reserve a slot before pulling each line so nothing read from disk
        // is ever dropped on the floor.
        loop {
            let permit = match config.overflow {
                OverflowPolicy::Defer => match tx.try_reserve() {
                    Ok(permit) => permit,
                    Err(TrySendError::Full(())) => {
                        warn!(
                            buffered = reader.buffered(),
                            "line queue filled up mid-poll, deferring the rest"
                        );
                        break;
                    }
                    Err(TrySendError::Closed(())) => return,
                },
                OverflowPolicy::Block => {
                    match reserve_while_running(&tx, &running, config.interval).await {
                        Reserved::Permit(permit) => permit,
                        Reserved::Stopped => break 'poll,
                        Reserved::Closed => return,
                    }
                }
            };

            match reader.next_line() {
                Some(line) => permit.send(line),
                None => break,
            }
        }
    }

    debug!(path = %reader.path().display(), "log observer stopped");
}

enum Reserved<'a> {
    Permit(mpsc::Permit<'a, String>),
    Stopped,
    Closed,
}

/// Wait for queue space, rechecking the running flag every `interval`.
async fn reserve_while_running<'a>(
    tx: &'a mpsc::Sender<String>,
    running: &AtomicBool,
    interval: Duration,
) -> Reserved<'a> {
    loop {
        match tokio::time::timeout(interval, tx.reserve()).await {
            Ok(Ok(permit)) => return Reserved::Permit(permit),
            Ok(Err(_)) => return Reserved::Closed,
            Err(_) if !running.load(Ordering::Acquire) => return Reserved::Stopped,
            Err(_) => {}
        }
    }
}
