//! Tally engine.
//!
//! A pure function from options, eligibility, ballots and configuration to
//! per-option results and a summary. No I/O; rerunning it over the same
//! inputs yields the same output, which is what makes the results cache
//! disposable.

use std::collections::HashMap;

use boardvote_db::entities::{
    vote::VoteOutcome, vote_cast, vote_configuration, vote_eligibility, vote_option, vote_result,
    vote_results_summary,
};
use sea_orm::prelude::DateTimeWithTimeZone;

/// Two weights closer than this are treated as a tie.
const WEIGHT_EPSILON: f64 = 1e-9;

/// Everything the tally reads.
#[derive(Debug, Clone, Copy)]
pub struct TallyInput<'a> {
    pub vote_id: &'a str,
    pub config: &'a vote_configuration::Model,
    pub options: &'a [vote_option::Model],
    pub eligibility: &'a [vote_eligibility::Model],
    pub ballots: &'a [vote_cast::Model],
    pub computed_at: DateTimeWithTimeZone,
}

/// Tally output, shaped like the results cache rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally {
    /// One row per option, in display order.
    pub results: Vec<vote_result::Model>,
    pub summary: vote_results_summary::Model,
}

/// The effective ballot of every voter: the one with the greatest `cast_at`,
/// later revisions winning ties. Returned in ledger order.
#[must_use]
pub fn effective_ballots(ballots: &[vote_cast::Model]) -> Vec<&vote_cast::Model> {
    let mut latest: HashMap<&str, &vote_cast::Model> = HashMap::new();
    for ballot in ballots {
        latest
            .entry(ballot.user_id.as_str())
            .and_modify(|current| {
                if (ballot.cast_at, ballot.revision) > (current.cast_at, current.revision) {
                    *current = ballot;
                }
            })
            .or_insert(ballot);
    }

    let mut effective: Vec<_> = latest.into_values().collect();
    effective.sort_by_key(|b| b.sequence);
    effective
}

/// Absolute number of voters needed for quorum.
#[must_use]
pub fn quorum_required(total_eligible: usize, config: &vote_configuration::Model) -> i32 {
    if !config.quorum_required {
        return 0;
    }
    // 7 eligible at 50% needs 4; the epsilon keeps exact products from
    // rounding up on float noise.
    let exact = total_eligible as f64 * config.quorum_percentage / 100.0;
    (exact - WEIGHT_EPSILON).ceil().max(0.0) as i32
}

/// Round a percentage to the two decimals it is stored and shown with.
fn round_percentage(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Run the tally.
#[must_use]
pub fn tally(input: TallyInput<'_>) -> Tally {
    let TallyInput {
        vote_id,
        config,
        options,
        eligibility,
        ballots,
        computed_at,
    } = input;

    let mut options: Vec<&vote_option::Model> = options.iter().collect();
    options.sort_by(|a, b| {
        a.display_order
            .cmp(&b.display_order)
            .then_with(|| a.id.cmp(&b.id))
    });

    let total_eligible = eligibility.iter().filter(|e| e.eligible).count();
    let quorum_required = quorum_required(total_eligible, config);

    let effective = effective_ballots(ballots);
    let total_voted = effective.len();
    let quorum_met = total_voted as i32 >= quorum_required;

    let mut weights: HashMap<&str, (f64, i32)> = HashMap::new();
    for ballot in &effective {
        let entry = weights.entry(ballot.option_id.as_str()).or_insert((0.0, 0));
        entry.0 += ballot.weight_applied;
        entry.1 += 1;
    }
    let total_weight: f64 = effective.iter().map(|b| b.weight_applied).sum();

    let decisive_weight: f64 = options
        .iter()
        .filter(|o| !o.is_abstain)
        .map(|o| weights.get(o.id.as_str()).map_or(0.0, |w| w.0))
        .sum();

    // Winner: the decisive option with the strictly greatest weight
    let mut winner: Option<&str> = None;
    if decisive_weight > WEIGHT_EPSILON {
        let max = options
            .iter()
            .filter(|o| !o.is_abstain)
            .map(|o| weights.get(o.id.as_str()).map_or(0.0, |w| w.0))
            .fold(f64::MIN, f64::max);
        let mut leaders = options
            .iter()
            .filter(|o| !o.is_abstain)
            .filter(|o| (weights.get(o.id.as_str()).map_or(0.0, |w| w.0) - max).abs() < WEIGHT_EPSILON);
        if let (Some(first), None) = (leaders.next(), leaders.next()) {
            winner = Some(first.id.as_str());
        }
    }

    let share = |weight: f64| {
        if decisive_weight <= WEIGHT_EPSILON {
            0.0
        } else {
            weight / decisive_weight * 100.0
        }
    };

    let results: Vec<vote_result::Model> = options
        .iter()
        .map(|option| {
            let (weight, count) = weights.get(option.id.as_str()).copied().unwrap_or((0.0, 0));
            let percentage = if option.is_abstain {
                0.0
            } else {
                round_percentage(share(weight))
            };
            vote_result::Model {
                vote_id: vote_id.to_string(),
                option_id: option.id.clone(),
                total_weight: weight,
                vote_count: count,
                percentage,
                is_winner: winner == Some(option.id.as_str()),
                computed_at,
            }
        })
        .collect();

    let outcome = match winner {
        _ if !quorum_met => VoteOutcome::Invalid,
        None => VoteOutcome::Invalid,
        Some(winner_id) => {
            let affirmative = options.iter().find(|o| !o.is_abstain).map(|o| o.id.as_str());
            // Against the unrounded share; the stored percentage is for display
            let winning_weight = weights.get(winner_id).map_or(0.0, |w| w.0);
            let meets_threshold =
                share(winning_weight) + WEIGHT_EPSILON >= config.pass_threshold_percentage;

            if config.voting_method.is_motion() && affirmative != Some(winner_id) {
                VoteOutcome::Failed
            } else if meets_threshold {
                VoteOutcome::Passed
            } else {
                VoteOutcome::Failed
            }
        }
    };

    let summary = vote_results_summary::Model {
        vote_id: vote_id.to_string(),
        total_eligible: total_eligible as i32,
        total_voted: total_voted as i32,
        total_weight,
        quorum_required,
        quorum_met,
        threshold_percentage: config.pass_threshold_percentage,
        outcome,
        computed_at,
    };

    Tally { results, summary }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use boardvote_db::entities::vote_configuration::{PassingRule, VotingMethod};
    use chrono::{Duration, TimeZone, Utc};

    fn at(seconds: i64) -> DateTimeWithTimeZone {
        (Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(seconds)).into()
    }

    fn config(method: VotingMethod, rule: PassingRule) -> vote_configuration::Model {
        vote_configuration::Model {
            vote_id: "vote1".to_string(),
            voting_method: method,
            quorum_required: true,
            quorum_percentage: 50.0,
            passing_rule: rule,
            pass_threshold_percentage: rule.default_threshold(),
            anonymous: false,
            allow_abstain: true,
            allow_change_vote: true,
            time_limit_minutes: None,
            auto_close_when_all_voted: false,
            updated_at: at(0),
        }
    }

    fn option(id: &str, order: i32, is_abstain: bool) -> vote_option::Model {
        vote_option::Model {
            id: id.to_string(),
            vote_id: "vote1".to_string(),
            label: id.to_string(),
            description: None,
            display_order: order,
            is_abstain,
        }
    }

    fn yes_no_abstain() -> Vec<vote_option::Model> {
        vec![
            option("yes", 0, false),
            option("no", 1, false),
            option("abstain", 2, true),
        ]
    }

    fn roster(count: usize) -> Vec<vote_eligibility::Model> {
        (0..count)
            .map(|i| vote_eligibility::Model {
                id: format!("elig{i}"),
                vote_id: "vote1".to_string(),
                user_id: format!("user{i}"),
                user_name: format!("User {i}"),
                user_role: "director".to_string(),
                weight: 1.0,
                eligible: true,
                created_at: at(0),
            })
            .collect()
    }

    fn ballot(seq: i64, user: &str, option_id: &str, revision: i32) -> vote_cast::Model {
        vote_cast::Model {
            id: format!("cast{seq}"),
            vote_id: "vote1".to_string(),
            option_id: option_id.to_string(),
            user_id: user.to_string(),
            weight_applied: 1.0,
            revision,
            sequence: seq,
            cast_at: at(seq),
            ip_address: None,
            user_agent: None,
        }
    }

    fn run(
        config: &vote_configuration::Model,
        options: &[vote_option::Model],
        eligibility: &[vote_eligibility::Model],
        ballots: &[vote_cast::Model],
    ) -> Tally {
        tally(TallyInput {
            vote_id: "vote1",
            config,
            options,
            eligibility,
            ballots,
            computed_at: at(3600),
        })
    }

    fn row<'a>(tally: &'a Tally, option_id: &str) -> &'a vote_result::Model {
        tally.results.iter().find(|r| r.option_id == option_id).unwrap()
    }

    #[test]
    fn test_quorum_boundary() {
        let config = config(VotingMethod::YesNoAbstain, PassingRule::SimpleMajority);
        let ballots = vec![
            ballot(1, "user0", "yes", 0),
            ballot(2, "user1", "yes", 0),
            ballot(3, "user2", "yes", 0),
        ];

        let result = run(&config, &yes_no_abstain(), &roster(7), &ballots);

        assert_eq!(result.summary.quorum_required, 4);
        assert_eq!(result.summary.total_voted, 3);
        assert!(!result.summary.quorum_met);
        assert_eq!(result.summary.outcome, VoteOutcome::Invalid);
    }

    #[test]
    fn test_simple_majority_passes() {
        let config = config(VotingMethod::YesNoAbstain, PassingRule::SimpleMajority);
        let ballots = vec![
            ballot(1, "user0", "yes", 0),
            ballot(2, "user1", "yes", 0),
            ballot(3, "user2", "yes", 0),
        ];

        let result = run(&config, &yes_no_abstain(), &roster(3), &ballots);

        let yes = row(&result, "yes");
        assert_eq!(yes.total_weight, 3.0);
        assert_eq!(yes.vote_count, 3);
        assert_eq!(yes.percentage, 100.0);
        assert!(yes.is_winner);
        assert_eq!(result.summary.outcome, VoteOutcome::Passed);
    }

    #[test]
    fn test_abstain_excluded_from_denominator() {
        let config = config(VotingMethod::YesNoAbstain, PassingRule::SimpleMajority);
        let mut ballots: Vec<_> = (0..6)
            .map(|i| ballot(i + 1, &format!("user{i}"), "yes", 0))
            .collect();
        ballots.push(ballot(7, "user6", "abstain", 0));

        let result = run(&config, &yes_no_abstain(), &roster(7), &ballots);

        assert_eq!(row(&result, "yes").percentage, 100.0);
        assert_eq!(row(&result, "abstain").percentage, 0.0);
        assert_eq!(row(&result, "abstain").vote_count, 1);
        assert!(!row(&result, "abstain").is_winner);
        assert_eq!(result.summary.total_voted, 7);
        assert_eq!(result.summary.total_weight, 7.0);
        assert_eq!(result.summary.outcome, VoteOutcome::Passed);
    }

    #[test]
    fn test_tie_is_invalid() {
        let config = config(VotingMethod::YesNo, PassingRule::SimpleMajority);
        let options = vec![option("yes", 0, false), option("no", 1, false)];
        let ballots = vec![
            ballot(1, "user0", "yes", 0),
            ballot(2, "user1", "no", 0),
        ];

        let result = run(&config, &options, &roster(2), &ballots);

        assert!(result.results.iter().all(|r| !r.is_winner));
        assert_eq!(result.summary.outcome, VoteOutcome::Invalid);
    }

    #[test]
    fn test_only_abstentions_is_invalid() {
        let config = config(VotingMethod::YesNoAbstain, PassingRule::SimpleMajority);
        let ballots = vec![
            ballot(1, "user0", "abstain", 0),
            ballot(2, "user1", "abstain", 0),
        ];

        let result = run(&config, &yes_no_abstain(), &roster(2), &ballots);

        assert!(result.summary.quorum_met);
        assert!(result.results.iter().all(|r| r.percentage == 0.0));
        assert_eq!(result.summary.outcome, VoteOutcome::Invalid);
    }

    #[test]
    fn test_winning_no_fails_motion() {
        let config = config(VotingMethod::YesNo, PassingRule::SimpleMajority);
        let options = vec![option("yes", 0, false), option("no", 1, false)];
        let ballots = vec![
            ballot(1, "user0", "no", 0),
            ballot(2, "user1", "no", 0),
            ballot(3, "user2", "yes", 0),
        ];

        let result = run(&config, &options, &roster(3), &ballots);

        assert!(row(&result, "no").is_winner);
        assert_eq!(result.summary.outcome, VoteOutcome::Failed);
    }

    #[test]
    fn test_two_thirds_boundary_passes() {
        let config = config(VotingMethod::YesNo, PassingRule::TwoThirds);
        let options = vec![option("yes", 0, false), option("no", 1, false)];
        let ballots = vec![
            ballot(1, "user0", "yes", 0),
            ballot(2, "user1", "yes", 0),
            ballot(3, "user2", "no", 0),
        ];

        let result = run(&config, &options, &roster(3), &ballots);

        assert_eq!(row(&result, "yes").percentage, 66.67);
        assert_eq!(result.summary.outcome, VoteOutcome::Passed);
    }

    #[test]
    fn test_threshold_uses_unrounded_share() {
        let config = config(VotingMethod::MultipleChoice, PassingRule::SimpleMajority);
        let options = vec![
            option("a", 0, false),
            option("b", 1, false),
            option("c", 2, false),
        ];
        let mut eligibility = roster(3);
        eligibility[0].weight = 4.9996;
        eligibility[1].weight = 3.0;
        eligibility[2].weight = 2.0004;
        let mut ballots = vec![
            ballot(1, "user0", "a", 0),
            ballot(2, "user1", "b", 0),
            ballot(3, "user2", "c", 0),
        ];
        for (ballot, entry) in ballots.iter_mut().zip(&eligibility) {
            ballot.weight_applied = entry.weight;
        }

        let result = run(&config, &options, &eligibility, &ballots);

        // 49.996% shows as 50.00 but is still short of a majority
        assert_eq!(row(&result, "a").percentage, 50.0);
        assert!(row(&result, "a").is_winner);
        assert_eq!(result.summary.outcome, VoteOutcome::Failed);
    }

    #[test]
    fn test_multiple_choice_below_threshold_fails() {
        let mut config = config(VotingMethod::MultipleChoice, PassingRule::SimpleMajority);
        config.pass_threshold_percentage = 60.0;
        let options = vec![
            option("a", 0, false),
            option("b", 1, false),
            option("c", 2, false),
        ];
        let ballots = vec![
            ballot(1, "user0", "a", 0),
            ballot(2, "user1", "a", 0),
            ballot(3, "user2", "b", 0),
            ballot(4, "user3", "c", 0),
        ];

        let result = run(&config, &options, &roster(4), &ballots);

        assert!(row(&result, "a").is_winner);
        assert_eq!(row(&result, "a").percentage, 50.0);
        assert_eq!(result.summary.outcome, VoteOutcome::Failed);
    }

    #[test]
    fn test_weights_decide_winner() {
        let config = config(VotingMethod::YesNo, PassingRule::SimpleMajority);
        let options = vec![option("yes", 0, false), option("no", 1, false)];
        let mut heavy = ballot(1, "user0", "yes", 0);
        heavy.weight_applied = 3.0;
        let ballots = vec![
            heavy,
            ballot(2, "user1", "no", 0),
            ballot(3, "user2", "no", 0),
        ];

        let result = run(&config, &options, &roster(3), &ballots);

        assert_eq!(row(&result, "yes").percentage, 60.0);
        assert_eq!(row(&result, "no").vote_count, 2);
        assert_eq!(result.summary.outcome, VoteOutcome::Passed);
    }

    #[test]
    fn test_changed_ballot_counts_once() {
        let config = config(VotingMethod::YesNo, PassingRule::SimpleMajority);
        let options = vec![option("yes", 0, false), option("no", 1, false)];
        let ballots = vec![
            ballot(1, "user0", "no", 0),
            ballot(2, "user1", "yes", 0),
            ballot(3, "user0", "yes", 1),
        ];

        let result = run(&config, &options, &roster(2), &ballots);

        assert_eq!(result.summary.total_voted, 2);
        assert_eq!(row(&result, "yes").vote_count, 2);
        assert_eq!(row(&result, "no").vote_count, 0);
        assert_eq!(result.summary.outcome, VoteOutcome::Passed);
    }

    #[test]
    fn test_quorum_not_required() {
        let mut config = config(VotingMethod::YesNo, PassingRule::SimpleMajority);
        config.quorum_required = false;
        let options = vec![option("yes", 0, false), option("no", 1, false)];
        let ballots = vec![ballot(1, "user0", "yes", 0)];

        let result = run(&config, &options, &roster(10), &ballots);

        assert_eq!(result.summary.quorum_required, 0);
        assert!(result.summary.quorum_met);
        assert_eq!(result.summary.outcome, VoteOutcome::Passed);
    }

    #[test]
    fn test_ineligible_entries_not_counted() {
        let config = config(VotingMethod::YesNo, PassingRule::SimpleMajority);
        let options = vec![option("yes", 0, false), option("no", 1, false)];
        let mut eligibility = roster(4);
        eligibility[3].eligible = false;

        let result = run(&config, &options, &eligibility, &[]);

        assert_eq!(result.summary.total_eligible, 3);
        assert_eq!(result.summary.quorum_required, 2);
        assert_eq!(result.summary.outcome, VoteOutcome::Invalid);
    }

    #[test]
    fn test_tally_is_idempotent() {
        let config = config(VotingMethod::YesNoAbstain, PassingRule::SimpleMajority);
        let options = yes_no_abstain();
        let eligibility = roster(5);
        let ballots = vec![
            ballot(1, "user0", "yes", 0),
            ballot(2, "user1", "no", 0),
            ballot(3, "user2", "yes", 0),
            ballot(4, "user1", "abstain", 1),
        ];

        let first = run(&config, &options, &eligibility, &ballots);
        let second = run(&config, &options, &eligibility, &ballots);

        assert_eq!(first, second);
    }

    #[test]
    fn test_effective_ballots_latest_wins() {
        let ballots = vec![
            ballot(1, "user0", "no", 0),
            ballot(2, "user1", "yes", 0),
            ballot(3, "user0", "yes", 1),
        ];

        let effective = effective_ballots(&ballots);

        assert_eq!(effective.len(), 2);
        assert_eq!(effective[0].user_id, "user1");
        assert_eq!(effective[1].option_id, "yes");
        assert_eq!(effective[1].revision, 1);
    }
}
