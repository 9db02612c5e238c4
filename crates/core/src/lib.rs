//! Core voting logic for boardvote.
//!
//! The lifecycle controller owns every write to votes, ballots and the
//! audit trail. The query service serves read projections. Tallying is a
//! pure function of configuration, eligibility and ballots.

pub mod services;

pub use services::*;
