//! Token discovery detectors.
//!
//! Two discovery modes produce [`crate::types::TokenCandidate`] rows:
//!
//! - [`first_sight::FirstSightDetector`] consumes the canonical swap stream
//!   and emits one NEW_TOKEN candidate the first time a mint is seen
//! - [`spike::SpikeDetector`] runs on the detection ticker, scans recent
//!   per-mint activity in storage, and emits ACTIVE_TOKEN candidates when
//!   the last hour spikes against the mint's own history
//!
//! Both cooperate with concurrent arrival of the same mint through the
//! candidate store's duplicate-key signal; at most one candidate exists per
//! mint across both sources.

pub mod first_sight;
pub mod spike;

pub use first_sight::FirstSightDetector;
pub use spike::{SpikeConfig, SpikeDetector};
