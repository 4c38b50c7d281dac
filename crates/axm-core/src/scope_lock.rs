//! Scope lock manager
//!
//! Active runs hold exclusive locks on scope paths. Two scopes conflict when
//! they are equal or one is a prefix of the other; the root conflicts with
//! everything. Acquisition is grant-or-fail: on denial nothing changes.
//!
//! Locks can outlive their run after a crash. On conflict the holders'
//! status is reread from the [`Repository`] and terminal or missing holders
//! are reaped before one more attempt.

use crate::capabilities::Repository;
use axm_types::{
    invariants, AxmError, AxmResult, RunId, ScopeConflictError, ScopeHolder, ScopePath,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// One granted lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeLock {
    pub run_id: RunId,
    pub scope_path: ScopePath,
    pub acquired_at: DateTime<Utc>,
    /// The holder's run row exists; unconfirmed locks are never reaped
    confirmed: bool,
}

impl ScopeLock {
    fn holder(&self) -> ScopeHolder {
        ScopeHolder {
            run_id: self.run_id,
            scope_path: self.scope_path.to_string(),
        }
    }
}

/// Table of active scope locks
#[derive(Debug, Default)]
pub struct ScopeLockManager {
    locks: Mutex<Vec<ScopeLock>>,
    released: Notify,
}

impl ScopeLockManager {
    /// Empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant the lock or report every conflicting holder
    pub fn try_acquire(
        &self,
        run_id: RunId,
        scope: &ScopePath,
        now: DateTime<Utc>,
    ) -> Result<(), ScopeConflictError> {
        let mut locks = self.locks.lock();
        let conflicts: Vec<ScopeHolder> = locks
            .iter()
            .filter(|l| l.run_id != run_id && l.scope_path.conflicts_with(scope))
            .map(ScopeLock::holder)
            .collect();
        if !conflicts.is_empty() {
            return Err(ScopeConflictError {
                requested_path: scope.to_string(),
                conflicts_with: conflicts,
            });
        }
        locks.retain(|l| l.run_id != run_id);
        locks.push(ScopeLock {
            run_id,
            scope_path: scope.clone(),
            acquired_at: now,
            confirmed: false,
        });
        debug_assert!(invariants::check_active_scopes(
            &locks.iter().map(ScopeLock::holder).collect::<Vec<_>>()
        )
        .is_ok());
        debug!(run_id = %run_id, scope = %scope, "scope lock granted");
        Ok(())
    }

    /// Mark the holder's run row as persisted
    pub fn confirm(&self, run_id: RunId) {
        if let Some(lock) = self.locks.lock().iter_mut().find(|l| l.run_id == run_id) {
            lock.confirmed = true;
        }
    }

    /// Release the lock of `run_id`; `false` if it held none
    pub fn release(&self, run_id: RunId) -> bool {
        let removed = {
            let mut locks = self.locks.lock();
            let before = locks.len();
            locks.retain(|l| l.run_id != run_id);
            locks.len() != before
        };
        if removed {
            debug!(run_id = %run_id, "scope lock released");
            self.released.notify_waiters();
        }
        removed
    }

    /// Current holders
    #[must_use]
    pub fn holders(&self) -> Vec<ScopeHolder> {
        self.locks.lock().iter().map(ScopeLock::holder).collect()
    }

    /// Whether `run_id` holds a lock
    #[must_use]
    pub fn is_held(&self, run_id: RunId) -> bool {
        self.locks.lock().iter().any(|l| l.run_id == run_id)
    }

    /// Acquire, reaping stale conflicting holders once
    pub async fn acquire(
        &self,
        run_id: RunId,
        scope: &ScopePath,
        now: DateTime<Utc>,
        repo: &dyn Repository,
    ) -> AxmResult<()> {
        let conflict = match self.try_acquire(run_id, scope, now) {
            Ok(()) => return Ok(()),
            Err(conflict) => conflict,
        };

        let mut stale = Vec::new();
        for holder in &conflict.conflicts_with {
            match repo.get_run(holder.run_id).await {
                Ok(run) if run.status.is_terminal() => stale.push(holder.run_id),
                Ok(_) => {}
                Err(AxmError::NotFound(_)) => stale.push(holder.run_id),
                Err(err) => return Err(err),
            }
        }
        if stale.is_empty() {
            return Err(conflict.into());
        }

        {
            let mut locks = self.locks.lock();
            locks.retain(|l| {
                let reap = l.confirmed && stale.contains(&l.run_id);
                if reap {
                    warn!(
                        run_id = %l.run_id,
                        scope = %l.scope_path,
                        "reaping stale scope lock of inactive run"
                    );
                }
                !reap
            });
        }
        self.released.notify_waiters();
        self.try_acquire(run_id, scope, now).map_err(Into::into)
    }

    /// Acquire, waiting up to `timeout` for conflicting locks to go away
    pub async fn acquire_queued(
        &self,
        run_id: RunId,
        scope: &ScopePath,
        now: DateTime<Utc>,
        repo: &dyn Repository,
        timeout: Duration,
    ) -> AxmResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.acquire(run_id, scope, now, repo).await {
                Err(AxmError::ScopeConflict(conflict)) => {
                    debug!(run_id = %run_id, scope = %scope, "queued behind conflicting scope lock");
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(conflict.into());
                    }
                }
                other => return other,
            }
        }
    }
}
