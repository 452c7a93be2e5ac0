use {
    super::context::{CancelHandle, Cancelled, Context},
    parking_lot::Mutex,
    std::thread,
};

/// Why a run stopped before completing.
#[derive(Debug)]
pub(crate) enum Abort<E> {
    Failed { index: usize, error: E },
    Cancelled(Cancelled),
}

/// Coordinator owns the single abort decision of one run.
///
/// Workers and the distributor see the run's derived context. It is
/// cancelled either by the caller's context or by the first failure, and
/// the cause is recorded before the cancellation becomes visible.
pub(crate) struct Coordinator<E> {
    parent: Context,
    scope: Context,
    cancel: CancelHandle,
    // Cause and flag live in one cell so nobody can see one without the other.
    abort: Mutex<Option<Abort<E>>>,
}

impl<E> Coordinator<E> {
    pub(crate) fn new(parent: &Context) -> Coordinator<E> {
        let (scope, cancel) = parent.with_cancel();
        Coordinator {
            parent: parent.clone(),
            scope,
            cancel,
            abort: Mutex::new(None),
        }
    }

    /// The context handed to every worker and to the transformation.
    pub(crate) fn scope(&self) -> &Context {
        &self.scope
    }

    /// Records a transformation failure. Returns true if it became the
    /// terminal error, in which case the run is cancelled.
    ///
    /// The caller's context is consulted directly: it publishes its reason
    /// before it reaches the run's context, and a transformation watching
    /// the caller's context can fail inside that gap.
    pub(crate) fn fail(&self, index: usize, error: E) -> bool {
        if self.parent.is_cancelled() || self.scope.is_cancelled() {
            self.observe_cancel();
            return false;
        }
        {
            let mut abort = self.abort.lock();
            if abort.is_some() {
                return false;
            }
            if let Some(reason) = self.parent.err() {
                *abort = Some(Abort::Cancelled(reason));
                return false;
            }
            *abort = Some(Abort::Failed { index, error });
        }
        self.cancel.cancel();
        true
    }

    /// Records the caller's cancellation as the cause, unless some cause is
    /// already recorded. Called by any component that stops early because
    /// the run was cancelled.
    pub(crate) fn observe_cancel(&self) {
        let Some(reason) = self.parent.err().or_else(|| self.scope.err()) else {
            return;
        };
        let mut abort = self.abort.lock();
        if abort.is_none() {
            *abort = Some(Abort::Cancelled(self.parent.err().unwrap_or(reason)));
        }
    }

    /// Cancels the run without recording a cause. The caller is expected to
    /// report its own error.
    pub(crate) fn abandon(&self) {
        self.cancel.cancel();
    }

    /// Cancels the run if the current thread unwinds while the guard lives.
    pub(crate) fn panic_guard(&self) -> PanicGuard<'_> {
        PanicGuard {
            cancel: &self.cancel,
        }
    }

    pub(crate) fn into_abort(self) -> Option<Abort<E>> {
        self.abort.into_inner()
    }
}

pub(crate) struct PanicGuard<'a> {
    cancel: &'a CancelHandle,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_wins() {
        let parent = Context::background();
        let coordinator = Coordinator::new(&parent);
        assert!(coordinator.fail(4, "first"));
        assert!(!coordinator.fail(1, "second"));
        assert!(coordinator.scope().is_cancelled());
        assert!(!parent.is_cancelled());
        match coordinator.into_abort() {
            Some(Abort::Failed { index, error }) => assert_eq!((index, error), (4, "first")),
            other => panic!("unexpected abort: {:?}", other),
        }
    }

    #[test]
    fn test_external_cancel_precedes_later_failure() {
        let (parent, cancel) = Context::background().with_cancel();
        let coordinator = Coordinator::new(&parent);
        cancel.cancel();
        assert!(!coordinator.fail(0, "too late"));
        assert!(matches!(
            coordinator.into_abort(),
            Some(Abort::Cancelled(Cancelled::Canceled))
        ));
    }

    #[test]
    fn test_failure_after_caller_deadline_is_cancellation() {
        let (parent, _cancel) = Context::background().with_deadline(std::time::Instant::now());
        let coordinator = Coordinator::new(&parent);
        assert!(!coordinator.fail(0, "woke on the deadline"));
        assert!(matches!(
            coordinator.into_abort(),
            Some(Abort::Cancelled(Cancelled::DeadlineExceeded))
        ));
    }

    #[test]
    fn test_observe_cancel_keeps_recorded_failure() {
        let coordinator = Coordinator::new(&Context::background());
        coordinator.observe_cancel();
        assert!(coordinator.fail(2, "boom"));
        coordinator.observe_cancel();
        assert!(matches!(
            coordinator.into_abort(),
            Some(Abort::Failed { index: 2, .. })
        ));
    }

    #[test]
    fn test_panic_guard_cancels_on_unwind() {
        let coordinator: Coordinator<()> = Coordinator::new(&Context::background());
        {
            let _guard = coordinator.panic_guard();
        }
        assert!(!coordinator.scope().is_cancelled());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = coordinator.panic_guard();
            panic!("worker died");
        }));
        assert!(result.is_err());
        assert!(coordinator.scope().is_cancelled());
        assert!(coordinator.into_abort().is_none());
    }
}
