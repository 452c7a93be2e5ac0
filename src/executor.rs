use {
    super::{
        collector::Collector,
        context::{Cancelled, Context},
        coordinator::{Abort, Coordinator},
        error::{ConfigError, Error},
        mapper::TryMapper,
        work::{self, Dispatch},
        worker,
    },
    crossbeam_utils::thread,
    std::{num::NonZeroUsize, panic},
};

/// Capacity of the channel carrying results from workers to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultBuffer {
    /// Workers never wait on the collector.
    #[default]
    Unbounded,
    /// At most this many results are queued; a worker blocked on a full
    /// buffer gives up when the run is cancelled.
    Bounded(usize),
}

/// Builder for an [`Executor`].
#[derive(Debug, Clone)]
pub struct ExecutorBuilder {
    workers: usize,
    clamp_to_input: bool,
    result_buffer: ResultBuffer,
    thread_name: String,
}

impl Default for ExecutorBuilder {
    fn default() -> ExecutorBuilder {
        ExecutorBuilder {
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            clamp_to_input: true,
            result_buffer: ResultBuffer::default(),
            thread_name: "pmap".to_string(),
        }
    }
}

impl ExecutorBuilder {
    /// Number of worker threads. Defaults to the available parallelism.
    pub fn workers(mut self, workers: usize) -> ExecutorBuilder {
        self.workers = workers;
        self
    }

    /// Start at most one worker per input item. Defaults to true.
    ///
    /// Either way no more than `workers` transformations ever run at once;
    /// surplus workers would only wait for items that never come.
    pub fn clamp_to_input(mut self, clamp: bool) -> ExecutorBuilder {
        self.clamp_to_input = clamp;
        self
    }

    pub fn result_buffer(mut self, buffer: ResultBuffer) -> ExecutorBuilder {
        self.result_buffer = buffer;
        self
    }

    /// Prefix for the names of spawned threads.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> ExecutorBuilder {
        self.thread_name = prefix.into();
        self
    }

    pub fn build(self) -> Result<Executor, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(Executor {
            workers: self.workers,
            clamp_to_input: self.clamp_to_input,
            result_buffer: self.result_buffer,
            thread_name: self.thread_name,
        })
    }
}

/// Executor maps a function over a vector on a fixed number of worker
/// threads and returns the outputs in input order.
///
/// The first failing item ends the whole run: pending items are never
/// started, running ones see their context cancelled, and the failure is
/// returned without any partial output. Cancelling the caller's context
/// ends the run the same way with [`Error::Cancelled`].
///
/// Workers are scoped to each call, so the function and the inputs may
/// borrow from the caller.
#[derive(Debug, Clone)]
pub struct Executor {
    workers: usize,
    clamp_to_input: bool,
    result_buffer: ResultBuffer,
    thread_name: String,
}

impl Executor {
    /// An executor with `workers` threads and default settings.
    pub fn new(workers: usize) -> Result<Executor, ConfigError> {
        Executor::builder().workers(workers).build()
    }

    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Applies `f` to every input in parallel.
    ///
    /// `f` receives the run's context, which is cancelled when the caller's
    /// context is or when any item fails.
    pub fn map<T, R, E, F>(&self, ctx: &Context, input: Vec<T>, f: F) -> Result<Vec<R>, Error<E>>
    where
        T: Send,
        R: Send,
        E: Send,
        F: Fn(&Context, T) -> Result<R, E> + Sync,
    {
        self.run(ctx, input, &f)
    }

    /// Like [`Executor::map`], but each worker applies its own clone of
    /// `mapper`.
    pub fn run<T, M>(
        &self,
        ctx: &Context,
        input: Vec<T>,
        mapper: M,
    ) -> Result<Vec<M::Out>, Error<M::Error>>
    where
        T: Send,
        M: TryMapper<T> + Clone + Send,
        M::Out: Send,
        M::Error: Send,
    {
        if let Some(reason) = ctx.err() {
            return Err(Error::Cancelled(reason));
        }
        let len = input.len();
        if len == 0 {
            return Ok(Vec::new());
        }
        let workers = if self.clamp_to_input {
            self.workers.min(len)
        } else {
            self.workers
        };
        tracing::debug!(workers, items = len, "starting parallel map");

        let coordinator = Coordinator::new(ctx);
        let (job_tx, job_rx) = crossbeam_channel::bounded(0);
        let (result_tx, result_rx) = match self.result_buffer {
            ResultBuffer::Unbounded => crossbeam_channel::unbounded(),
            ResultBuffer::Bounded(cap) => crossbeam_channel::bounded(cap),
        };

        let scoped = thread::scope(|s| {
            let coordinator = &coordinator;

            for id in 0..workers {
                let mapper = mapper.clone();
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                let spawned = s
                    .builder()
                    .name(format!("{}-worker-{}", self.thread_name, id))
                    .spawn(move |_| worker::work(mapper, jobs, results, coordinator));
                if let Err(err) = spawned {
                    coordinator.abandon();
                    return Err(err);
                }
            }
            // Only workers may keep these ends open, so the channels
            // disconnect once the distributor or the workers are done.
            drop(job_rx);
            drop(result_tx);

            let spawned = s
                .builder()
                .name(format!("{}-dispatch", self.thread_name))
                .spawn(move |_| {
                    let items = work::sequence(input);
                    match work::distribute(items, job_tx, coordinator.scope()) {
                        Dispatch::Exhausted { published } => {
                            tracing::trace!(published, "all items dispatched");
                        }
                        Dispatch::Stopped { published } => {
                            coordinator.observe_cancel();
                            tracing::trace!(published, "dispatch stopped early");
                        }
                    }
                });
            if let Err(err) = spawned {
                coordinator.abandon();
                return Err(err);
            }

            Ok(Collector::new(len).drain(result_rx))
        });

        let collector = match scoped {
            Ok(Ok(collector)) => collector,
            Ok(Err(err)) => return Err(Error::Spawn(err)),
            Err(payload) => panic::resume_unwind(payload),
        };
        // Release anything the transformation left watching the run context.
        coordinator.abandon();

        tracing::debug!(
            written = collector.written(),
            failed = collector.failed(),
            "parallel map finished"
        );
        let reason = match coordinator.into_abort() {
            Some(Abort::Failed { index, error }) => return Err(Error::Failed { index, error }),
            Some(Abort::Cancelled(reason)) => Some(reason),
            None => None,
        };
        // A cancellation noticed after every item was written does not undo
        // the completed run.
        collector.finish().ok_or_else(|| {
            Error::Cancelled(reason.or_else(|| ctx.err()).unwrap_or(Cancelled::Canceled))
        })
    }
}

/// Applies `f` to every element of `input` on `workers` threads and returns
/// the outputs in input order.
///
/// Fails with [`Error::Config`] if `workers` is zero, with
/// [`Error::Cancelled`] if `ctx` is cancelled before the run completes, and
/// with [`Error::Failed`] for the first element `f` fails on.
pub fn parallel_map<T, R, E, F>(
    ctx: &Context,
    workers: usize,
    input: Vec<T>,
    f: F,
) -> Result<Vec<R>, Error<E>>
where
    T: Send,
    R: Send,
    E: Send,
    F: Fn(&Context, T) -> Result<R, E> + Sync,
{
    Executor::new(workers)?.map(ctx, input, f)
}

/// ParallelMap can be imported to add the par_map function to iterators.
pub trait ParallelMap: IntoIterator + Sized {
    /// Collects the iterator and runs [`parallel_map`] over it.
    fn par_map<R, E, F>(self, ctx: &Context, workers: usize, f: F) -> Result<Vec<R>, Error<E>>
    where
        Self::Item: Send,
        R: Send,
        E: Send,
        F: Fn(&Context, Self::Item) -> Result<R, E> + Sync,
    {
        parallel_map(ctx, workers, self.into_iter().collect(), f)
    }
}

impl<I: IntoIterator> ParallelMap for I {}
