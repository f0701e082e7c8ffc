//! Event sources: typed streams of DEX events for the runner.
//!
//! - [`push::PushSwapSource`] / [`push::PushLiquiditySource`] - live
//!   ingestion over `logsSubscribe`, one independent push connection each
//!   (providers collapse identical subscriptions on a shared connection,
//!   which would clobber the two pipelines' channels)
//! - [`backfill::BackfillSource`] - historical ingestion by paginating
//!   signatures for a time window
//!
//! All sources reconcile notifications against the authoritative
//! transaction (`getTransaction`) before parsing, and stamp events with the
//! canonical millisecond timestamp.

pub mod backfill;
pub mod push;

pub use backfill::BackfillSource;
pub use push::{PushLiquiditySource, PushSwapSource};
