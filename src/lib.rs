//! Bounded parallel map with ordered output and cooperative cancellation.
//!
//! This crate adds the parallel_map function, and the par_map iterator
//! extension, which apply a fallible function to every input on a fixed
//! number of worker threads. Outputs are returned in input order no matter
//! which order they complete in. The first failure aborts the rest of the
//! run and is returned on its own, without partial output.
//!
//! Every run observes a [`Context`], a cancellation signal that may carry a
//! deadline. Cancelling it aborts the run the same way a failure does.
//!
//! # Examples
//!
//! Parallel mapping:
//! ```
//! use pmap::{parallel_map, Context};
//!
//! // Map over a vector with 4 worker threads.
//! fn example() -> Result<(), pmap::Error<std::num::ParseIntError>> {
//!     let input = vec!["1", "2", "3"];
//!     let out = parallel_map(&Context::background(), 4, input, |_, s| s.parse::<i32>())?;
//!     assert_eq!(out, vec![1, 2, 3]);
//!     Ok(())
//! }
//! # example().unwrap();
//! ```
//!
//! First error wins:
//! ```
//! use pmap::{Context, Error, ParallelMap};
//!
//! let err = (0..100)
//!     .par_map(&Context::background(), 8, |_, x| if x == 42 { Err("no") } else { Ok(x) })
//!     .unwrap_err();
//! assert!(matches!(err, Error::Failed { index: 42, error: "no" }));
//! ```
//!
//! Bounding a run with a deadline:
//! ```
//! use std::time::Duration;
//! use pmap::{Cancelled, Context, Error, Executor};
//!
//! let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(10));
//! let executor = Executor::new(2).unwrap();
//! let res = executor.map(&ctx, vec![1, 2, 3], |ctx, x| match ctx.wait_timeout(Duration::from_secs(60)) {
//!     Some(reason) => Err(reason),
//!     None => Ok(x),
//! });
//! assert!(matches!(res, Err(Error::Cancelled(Cancelled::DeadlineExceeded))));
//! ```
//!
//! Map with your own type instead of a function:
//! ```
//! use pmap::{Context, Executor, TryMapper};
//!
//! // The type must support clone as each worker thread gets a copy.
//! #[derive(Clone)]
//! struct Checked {
//!     limit: i64,
//! }
//!
//! impl TryMapper<i64> for Checked {
//!     type Out = i64;
//!     type Error = String;
//!     fn apply(&mut self, _ctx: &Context, x: i64) -> Result<i64, String> {
//!         if x > self.limit {
//!             Err(format!("{} is over the limit", x))
//!         } else {
//!             Ok(x * 2)
//!         }
//!     }
//! }
//!
//! let executor = Executor::new(5).unwrap();
//! let out = executor.run(&Context::background(), (0..10i64).collect(), Checked { limit: 100 });
//! assert_eq!(out.unwrap()[9], 18);
//! ```

mod collector;
mod context;
mod coordinator;
mod error;
mod executor;
mod mapper;
mod work;
mod worker;

pub use context::*;
pub use error::*;
pub use executor::*;
pub use mapper::*;
