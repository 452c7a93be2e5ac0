use super::context::Context;

/// TryMapper is a fallible mapping from In to Out that can observe
/// cancellation. Implement it to run types other than closures.
///
/// TryMapper is essentially `FnMut(&Context, In) -> Result<Out, Error>`,
/// but users can implement it without experimental features. Every worker
/// thread gets its own clone, so `apply` may keep per-worker state in `self`.
pub trait TryMapper<In> {
    /// The output type.
    type Out;
    /// The error type a single application may fail with.
    type Error;
    /// Run the mapping function converting In to Out.
    ///
    /// Long-running implementations should watch `ctx` and give up once it
    /// is cancelled.
    fn apply(&mut self, ctx: &Context, v: In) -> Result<Self::Out, Self::Error>;
}

impl<A, B, E, F> TryMapper<A> for F
where
    F: FnMut(&Context, A) -> Result<B, E>,
{
    type Out = B;
    type Error = E;

    fn apply(&mut self, ctx: &Context, x: A) -> Result<B, E> {
        self(ctx, x)
    }
}
