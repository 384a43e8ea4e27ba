//! Single-entry lifecycle shared by buckets and controllers, together with the
//! background tasks that live for as long as the scope is entered.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinSet;

use crate::{Error, Result};

/// Lifecycle of a bucket or a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Constructed, but not entered yet.
    Unentered,
    /// Entered and usable.
    Entered,
    /// Exited; cannot be used or entered again.
    Closed,
}

#[derive(Debug, Default)]
enum Inner {
    #[default]
    Unentered,
    Entered {
        handle: Handle,
        tasks: JoinSet<()>,
    },
    Closed,
}

/// Explicit `Unentered -> Entered -> Closed` state machine owning the
/// background tasks spawned while entered.
#[derive(Debug, Default)]
pub(crate) struct Scope {
    inner: Mutex<Inner>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scope {
    pub(crate) fn state(&self) -> State {
        match *lock(&self.inner) {
            Inner::Unentered => State::Unentered,
            Inner::Entered { .. } => State::Entered,
            Inner::Closed => State::Closed,
        }
    }

    /// Enters the scope, capturing the current runtime for later spawns.
    pub(crate) fn enter(&self) -> Result<()> {
        let mut inner = lock(&self.inner);
        match *inner {
            Inner::Unentered => {
                let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
                *inner = Inner::Entered {
                    handle,
                    tasks: JoinSet::new(),
                };
                Ok(())
            }
            Inner::Entered { .. } => Err(Error::AlreadyEntered),
            Inner::Closed => Err(Error::Closed),
        }
    }

    pub(crate) fn ensure_entered(&self) -> Result<()> {
        match *lock(&self.inner) {
            Inner::Entered { .. } => Ok(()),
            Inner::Unentered => Err(Error::NotEntered),
            Inner::Closed => Err(Error::Closed),
        }
    }

    /// Runs `task` in the background until it completes or the scope exits.
    pub(crate) fn spawn<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &mut *lock(&self.inner) {
            Inner::Entered { handle, tasks } => {
                // Reap finished tasks so that short-lived timers do not pile up.
                while tasks.try_join_next().is_some() {}
                tasks.spawn_on(task, handle);
                Ok(())
            }
            Inner::Unentered => Err(Error::NotEntered),
            Inner::Closed => Err(Error::Closed),
        }
    }

    /// Closes the scope, cancelling its tasks and waiting for them to finish.
    pub(crate) async fn exit(&self) {
        let previous = std::mem::replace(&mut *lock(&self.inner), Inner::Closed);
        if let Inner::Entered { mut tasks, .. } = previous {
            tracing::trace!("Shutting down {} background task(s)", tasks.len());
            tasks.shutdown().await;
        }
    }

    /// Cancels the background tasks without waiting for them.
    pub(crate) fn abort(&self) {
        if let Inner::Entered { tasks, .. } = &mut *lock(&self.inner) {
            tasks.abort_all();
        }
    }
}
