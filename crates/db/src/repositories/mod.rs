//! Database repositories.
//!
//! Every method takes the connection it runs on, so lifecycle operations can
//! thread one transaction through several repositories.

mod vote;
mod vote_action;
mod vote_cast;
mod vote_configuration;
mod vote_eligibility;
mod vote_result;

pub use vote::VoteRepository;
pub use vote_action::VoteActionRepository;
pub use vote_cast::VoteCastRepository;
pub use vote_configuration::VoteConfigurationRepository;
pub use vote_eligibility::VoteEligibilityRepository;
pub use vote_result::VoteResultRepository;

use boardvote_common::{get_metrics, AppError};
use sea_orm::{DbErr, SqlErr};

/// Map a database error onto the application error type.
///
/// Unique-index violations become [`AppError::Conflict`]: they signal a lost
/// race with a concurrent writer and the caller may retry.
pub(crate) fn db_err(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => AppError::Conflict(msg),
        _ => {
            get_metrics().record_db_error();
            AppError::Database(err.to_string())
        }
    }
}
