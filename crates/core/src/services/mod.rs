//! Voting services.

#![allow(missing_docs)]

pub mod locks;
pub mod roster;
pub mod tally;
pub mod vote_lifecycle;
pub mod vote_query;

use std::sync::Arc;

use boardvote_db::repositories::{
    VoteActionRepository, VoteCastRepository, VoteConfigurationRepository,
    VoteEligibilityRepository, VoteRepository, VoteResultRepository,
};
use sea_orm::DatabaseConnection;

pub use locks::VoteLocks;
pub use roster::{
    HttpRosterProvider, NoRosterProvider, RosterEntry, RosterProvider, SnapshotEntry,
    StaticRosterProvider,
};
pub use tally::{Tally, TallyInput, effective_ballots, quorum_required, tally};
pub use vote_lifecycle::{
    Actor, CastOutcome, ClientInfo, CloseOutcome, CloseTrigger, ConfigureVoteInput,
    ConfiguredVote, CreateVoteInput, OpenedVote, OptionInput, ReconcileOutcome,
    VoteLifecycleService,
};
pub use vote_query::{
    BallotView, MyBallot, OverdueVote, ResultRow, ResultsSummary, VoteDetail, VoteQueryService,
    VoteResults, deadline,
};

/// The repositories both voting services work over.
#[derive(Clone)]
pub struct VoteRepositories {
    pub votes: VoteRepository,
    pub configurations: VoteConfigurationRepository,
    pub eligibility: VoteEligibilityRepository,
    pub casts: VoteCastRepository,
    pub actions: VoteActionRepository,
    pub results: VoteResultRepository,
}

impl VoteRepositories {
    /// Build every repository over one shared connection.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            votes: VoteRepository::new(Arc::clone(&db)),
            configurations: VoteConfigurationRepository::new(Arc::clone(&db)),
            eligibility: VoteEligibilityRepository::new(Arc::clone(&db)),
            casts: VoteCastRepository::new(Arc::clone(&db)),
            actions: VoteActionRepository::new(Arc::clone(&db)),
            results: VoteResultRepository::new(db),
        }
    }
}
