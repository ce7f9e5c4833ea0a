//! # Operations, keys, and refreshes
//!
//! Settle refreshes UI components after the data they wait on arrives, and
//! only once per burst of requests. There are three main pieces:
//!
//! - `Operation<T>` — settle-once handle to an async unit of work.
//! - `KeyedSet` — weak-keyed map from a target to its outstanding operations.
//! - `RefreshScheduler` — decides when a target actually gets refreshed.
//!
//! ## Scheduling
//!
//! ```rust
//! use settle_core::*;
//!
//! let root = FnTarget::new(|| log::info!("render"));
//! let target: Target = root.clone();
//! let scheduler = RefreshScheduler::init(InitOptions::default());
//!
//! let (op, resolver) = Operation::<u32>::pending();
//! scheduler.refresh_after(Some(&target), &op);
//!
//! // collapsed: `op` is still outstanding
//! scheduler.refresh(Some(&target));
//! assert!(scheduler.has_pending(Some(&target)));
//!
//! resolver.resolve(7); // refreshes `root` once
//! assert_eq!(scheduler.stats().fired, 1);
//! ```
//!
//! A refresh fires only when the target's key has nothing outstanding, the
//! target (or the default target, for requests without one) still exists,
//! and `is_alive()` reports it mounted. Every other case is a silent no-op.
//!
//! ## Failures
//!
//! Operations settle with `Result<T, OperationError>`. The scheduler treats
//! both branches identically: the slot is released and the refresh is
//! re-evaluated. Dropping a `Resolver` without settling counts as a failure.

pub mod clock;
pub mod config;
pub mod error;
pub mod keyed;
pub mod operation;
pub mod scheduler;
pub mod target;


pub use clock::*;
pub use config::*;
pub use error::*;
pub use keyed::*;
pub use operation::*;
pub use scheduler::*;
pub use target::*;
