// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Cooperative cancellation.

Long-running operations poll a shared [CancelToken] between iterations.
Critical sections (signing one package, copying one package) hold a
[CancelGuard] so a cancel arriving mid-write only takes effect at the
next safe point.
*/

use {
    crate::error::{Result, RpmRepoError},
    std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    protected: AtomicUsize,
}

/// A shareable cancellation token.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Poll the token at a safe point.
    ///
    /// Returns [RpmRepoError::Cancelled] once cancellation is requested,
    /// unless a [CancelGuard] is currently held.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() && self.inner.protected.load(Ordering::SeqCst) == 0 {
            Err(RpmRepoError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Enter a cancel-protected critical section.
    pub fn protect(&self) -> CancelGuard {
        self.inner.protected.fetch_add(1, Ordering::SeqCst);

        CancelGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Scoped protection against cancellation. Dropping the guard leaves the
/// critical section.
pub struct CancelGuard {
    inner: Arc<Inner>,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.inner.protected.fetch_sub(1, Ordering::SeqCst);
    }
}
