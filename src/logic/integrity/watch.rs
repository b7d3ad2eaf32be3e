//! Integrity Watch - polling monitor sessions
//!
//! A session polls the checksum of each target path and compares it to the
//! value it last saw (since-last-poll). A difference emits one
//! `IntegrityChange` and replaces the held value, so `c0 -> c1 -> c0` yields
//! two changes rather than one long-lived diff against the first capture.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::{Instant, MissedTickBehavior};

use super::checksum::{remote_checksum, Observation};
use super::types::{IntegrityChange, IntegrityError, MonitorOutcome};
use crate::logic::shell::ShellHandle;

// ============================================================================
// CANCELLATION
// ============================================================================

/// Cooperative cancellation shared between a caller and a running session
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// SESSION REGISTRY
// ============================================================================

/// Paths currently under watch. One session per path.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: Mutex<HashSet<String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `paths` for a new session, or fail if any is already watched
    pub fn claim(self: &Arc<Self>, paths: &[String]) -> Result<SessionGuard, IntegrityError> {
        let mut active = self.active.lock();

        let mut overlapping: Vec<String> = paths
            .iter()
            .filter(|p| active.contains(p.as_str()))
            .cloned()
            .collect();
        if !overlapping.is_empty() {
            overlapping.sort();
            overlapping.dedup();
            return Err(IntegrityError::SessionConflict { paths: overlapping });
        }

        let claimed: Vec<String> = paths
            .iter()
            .filter(|p| active.insert((*p).clone()))
            .cloned()
            .collect();

        Ok(SessionGuard {
            registry: Arc::clone(self),
            paths: claimed,
        })
    }

    pub fn is_watched(&self, path: &str) -> bool {
        self.active.lock().contains(path)
    }
}

/// Releases its paths when dropped
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    paths: Vec<String>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut active = self.registry.active.lock();
        for path in &self.paths {
            active.remove(path);
        }
    }
}

// ============================================================================
// MONITOR SESSION
// ============================================================================

pub struct MonitorSession {
    target_paths: Vec<String>,
    /// Last observed checksum per path (`None` = absent)
    baseline: HashMap<String, Option<String>>,
    active: bool,
    cancel: CancelToken,
    checksum_command: String,
    poll_interval: Duration,
}

impl MonitorSession {
    pub fn new(
        target_paths: Vec<String>,
        baseline: HashMap<String, Option<String>>,
        cancel: CancelToken,
        checksum_command: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        let mut seen = HashSet::new();
        let target_paths = target_paths
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .collect();

        Self {
            target_paths,
            baseline,
            active: false,
            cancel,
            checksum_command: checksum_command.into(),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn baseline(&self) -> &HashMap<String, Option<String>> {
        &self.baseline
    }

    /// Poll until `duration` elapses, the token is cancelled, or the channel dies.
    ///
    /// Each change is pushed to `events` (if any) as it is observed. The
    /// sender is dropped when this returns, so receivers see the stream end.
    pub async fn run(
        &mut self,
        shell: &ShellHandle,
        duration: Duration,
        events: Option<mpsc::UnboundedSender<IntegrityChange>>,
    ) -> MonitorOutcome {
        let deadline = tokio::time::sleep_until(Instant::now() + duration);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut outcome = MonitorOutcome {
            paths_watched: self.target_paths.len(),
            ..MonitorOutcome::default()
        };

        self.active = true;
        log::info!(
            "Monitoring {} path(s) for {:?} (every {:?})",
            self.target_paths.len(),
            duration,
            self.poll_interval
        );

        // The first tick fires at once; a slow pass pushes later ticks back
        // instead of bursting to catch up.
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                _ = &mut deadline => {
                    outcome.completed = true;
                    break;
                }
                _ = ticker.tick() => {}
            }

            outcome.polls += 1;
            if let Err(fault) = self.poll_once(shell, &mut outcome.changes, events.as_ref()).await {
                log::warn!("Monitor stopped: {}", fault);
                outcome.fault = Some(fault);
                break;
            }
        }

        self.active = false;
        outcome.missing = self.missing();
        drop(events);

        log::info!(
            "Monitor finished after {} poll(s): {} change(s), completed={}, cancelled={}",
            outcome.polls,
            outcome.changes.len(),
            outcome.completed,
            outcome.cancelled
        );
        outcome
    }

    /// One pass over every target. `Err` only for a dead channel.
    async fn poll_once(
        &mut self,
        shell: &ShellHandle,
        changes: &mut Vec<IntegrityChange>,
        events: Option<&mpsc::UnboundedSender<IntegrityChange>>,
    ) -> Result<(), String> {
        for path in self.target_paths.clone() {
            // In-flight calls finish; the rest of the pass does not start
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let current = match remote_checksum(shell, &self.checksum_command, &path).await {
                Ok(Observation::Present(sum)) => Some(sum),
                Ok(Observation::Missing) => None,
                Ok(Observation::Unreadable(reason)) => {
                    log::debug!("Skipping {} this poll: {}", path, reason);
                    continue;
                }
                Err(e) if e.is_unreachable() => return Err(e.to_string()),
                Err(e) => {
                    log::warn!("Skipping {} this poll: {}", path, e);
                    continue;
                }
            };

            match self.baseline.get(&path) {
                None => {
                    log::debug!("Established baseline for {}", path);
                    self.baseline.insert(path, current);
                }
                Some(previous) if *previous != current => {
                    let change = IntegrityChange {
                        path: path.clone(),
                        previous_checksum: previous.clone(),
                        current_checksum: current.clone(),
                        detected_at: Utc::now(),
                    };
                    log::warn!(
                        "Integrity change on {}: {:?} -> {:?}",
                        path,
                        change.previous_checksum,
                        change.current_checksum
                    );
                    if let Some(tx) = events {
                        let _ = tx.send(change.clone());
                    }
                    changes.push(change);
                    self.baseline.insert(path, current);
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn missing(&self) -> Vec<String> {
        self.target_paths
            .iter()
            .filter(|p| matches!(self.baseline.get(p.as_str()), Some(None)))
            .cloned()
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
