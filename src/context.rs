use {
    crossbeam_channel::{Receiver, RecvTimeoutError, Sender},
    parking_lot::Mutex,
    std::{
        fmt,
        sync::{Arc, OnceLock, Weak},
        thread,
        time::{Duration, Instant},
    },
    thiserror::Error,
};

/// The reason a [`Context`] was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Cancelled {
    /// Cancelled explicitly through a [`CancelHandle`], or by a parent context.
    #[error("context canceled")]
    Canceled,
    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Context is a shared cancellation signal.
///
/// A context moves from active to cancelled at most once, and the first
/// reason given is the one every holder observes. Cancellation flows from a
/// parent to all contexts derived from it, never the other way.
///
/// Contexts are cheap to clone; clones observe the same signal.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    reason: OnceLock<Cancelled>,
    // Dropping the sender disconnects `done_rx`, which wakes every select
    // arm waiting on it. Nothing is ever sent.
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
    deadline: Option<Instant>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Arc<Inner> {
        let (done_tx, done_rx) = crossbeam_channel::bounded(0);
        Arc::new(Inner {
            reason: OnceLock::new(),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
            deadline,
            children: Mutex::new(Vec::new()),
        })
    }

    fn cancel(&self, reason: Cancelled) -> bool {
        // The reason must be visible before `done` disconnects.
        if self.reason.set(reason).is_err() {
            return false;
        }
        self.done_tx.lock().take();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(reason);
        }
        true
    }
}

impl Context {
    /// Returns a root context that is never cancelled.
    pub fn background() -> Context {
        Context {
            inner: Inner::new(None),
        }
    }

    /// Derives a child context that can be cancelled through the returned
    /// handle. The child is also cancelled when `self` is.
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let ctx = self.derive(None);
        let handle = CancelHandle {
            inner: ctx.inner.clone(),
        };
        (ctx, handle)
    }

    /// Derives a child context that cancels itself with
    /// [`Cancelled::DeadlineExceeded`] at `deadline`.
    ///
    /// If `self` already has an earlier deadline the child simply inherits
    /// it. A deadline in the past yields a context that is already cancelled.
    pub fn with_deadline(&self, deadline: Instant) -> (Context, CancelHandle) {
        let inherits_earlier = matches!(self.inner.deadline, Some(d) if d <= deadline);
        let ctx = self.derive(Some(deadline));
        if !inherits_earlier {
            arm_deadline(&ctx.inner, deadline);
        }
        let handle = CancelHandle {
            inner: ctx.inner.clone(),
        };
        (ctx, handle)
    }

    /// Shorthand for `with_deadline(Instant::now() + timeout)`.
    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelHandle) {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A receiver that becomes disconnected once this context is cancelled.
    ///
    /// It never yields a message, so it is meant to be used as an arm of
    /// `crossbeam_channel::select!`:
    ///
    /// ```
    /// use crossbeam_channel::select;
    /// use pmap::Context;
    ///
    /// let (ctx, cancel) = Context::background().with_cancel();
    /// cancel.cancel();
    /// select! {
    ///     recv(ctx.done()) -> _ => assert!(ctx.is_cancelled()),
    /// }
    /// ```
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done_rx
    }

    /// Returns the cancellation reason, or `None` while the context is active.
    pub fn err(&self) -> Option<Cancelled> {
        self.inner.reason.get().copied()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// The effective deadline, including any inherited from a parent.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Blocks until the context is cancelled and returns the reason.
    pub fn wait(&self) -> Cancelled {
        let _ = self.inner.done_rx.recv();
        self.err().unwrap_or(Cancelled::Canceled)
    }

    /// Like [`Context::wait`], but gives up after `timeout` and returns `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Cancelled> {
        match self.inner.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => None,
            _ => self.err(),
        }
    }

    fn derive(&self, deadline: Option<Instant>) -> Context {
        let deadline = match (self.inner.deadline, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let child = Inner::new(deadline);
        {
            let mut children = self.inner.children.lock();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        // A parent cancelled before the push above already drained its
        // children without seeing this one.
        if let Some(reason) = self.err() {
            child.cancel(reason);
        }
        Context { inner: child }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .finish()
    }
}

fn arm_deadline(inner: &Arc<Inner>, deadline: Instant) {
    if deadline <= Instant::now() {
        inner.cancel(Cancelled::DeadlineExceeded);
        return;
    }
    if inner.reason.get().is_some() {
        return;
    }

    // The timer only holds a weak reference, so it exits as soon as the
    // context is cancelled or every handle to it is dropped.
    let done = inner.done_rx.clone();
    let weak = Arc::downgrade(inner);
    thread::spawn(move || {
        crossbeam_channel::select! {
            recv(done) -> _ => {}
            recv(crossbeam_channel::at(deadline)) -> _ => {
                if let Some(inner) = weak.upgrade() {
                    if inner.cancel(Cancelled::DeadlineExceeded) {
                        tracing::debug!("context deadline exceeded");
                    }
                }
            }
        }
    });
}

/// Cancels the [`Context`] it was created with.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl CancelHandle {
    /// Cancels the context and everything derived from it.
    ///
    /// Returns `false` if the context was already cancelled, in which case
    /// the original reason is kept.
    pub fn cancel(&self) -> bool {
        self.inner.cancel(Cancelled::Canceled)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.inner.reason.get().is_some())
            .finish()
    }
}
