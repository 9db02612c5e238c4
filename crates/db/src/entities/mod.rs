//! Database entities.

pub mod vote;
pub mod vote_action;
pub mod vote_cast;
pub mod vote_configuration;
pub mod vote_eligibility;
pub mod vote_option;
pub mod vote_result;
pub mod vote_results_summary;

pub use vote::Entity as Vote;
pub use vote_action::Entity as VoteAction;
pub use vote_cast::Entity as VoteCast;
pub use vote_configuration::Entity as VoteConfiguration;
pub use vote_eligibility::Entity as VoteEligibility;
pub use vote_option::Entity as VoteOption;
pub use vote_result::Entity as VoteResult;
pub use vote_results_summary::Entity as VoteResultsSummary;
