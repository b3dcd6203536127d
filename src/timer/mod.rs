//! Round lifecycle and countdown derived from the server-stamped start time.
//!
//! Every client computes its own phase from `server_now - started_at`; the
//! shared `timer_active` flag only says whether a countdown was started.

use chrono::{DateTime, Duration, Utc};

use crate::config::TimerConfig;
use crate::domain::{Hint, Problem, Round, TimerState};

pub mod engine;
pub mod phase;
pub mod sequential;

pub use engine::RoundTimerEngine;
pub use phase::RoundPhase;
pub use sequential::SequentialProgress;

#[derive(Debug, Clone, PartialEq)]
pub struct RoundStatus {
    pub round_number: i32,
    pub phase: RoundPhase,
    pub started_at: Option<DateTime<Utc>>,
    /// Whole seconds since the timer started; `None` until it has.
    pub elapsed_secs: Option<i64>,
    pub duration_secs: i64,
    pub total_remaining: i64,
    pub sequential: Option<SequentialProgress>,
}

impl RoundStatus {
    fn idle(round_number: i32, phase: RoundPhase, duration_secs: i64) -> Self {
        Self {
            round_number,
            phase,
            started_at: None,
            elapsed_secs: None,
            duration_secs,
            total_remaining: duration_secs,
            sequential: None,
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed_secs.and_then(Duration::try_seconds)
    }

    /// The problem a sequential round is currently showing.
    pub fn current_problem<'a>(&self, problems: &'a [Problem]) -> Option<&'a Problem> {
        let index = self.sequential?.current_index?;
        round_problems(self.round_number, problems).get(index).copied()
    }
}

/// Problems of one round in display order.
pub fn round_problems(round_number: i32, problems: &[Problem]) -> Vec<&Problem> {
    let mut own: Vec<&Problem> = problems
        .iter()
        .filter(|p| p.round_number == round_number)
        .collect();
    own.sort_by_key(|p| p.sort_order);
    own
}

/// Length of the round in seconds; the same value drives the phase and the sequential walk.
pub fn effective_duration_secs(round: &Round, problems: &[Problem], config: &TimerConfig) -> i64 {
    if round.is_sequential() {
        let own = round_problems(round.number, problems);
        sequential::total_secs(&sequential::slice_durations(&own, config.default_problem_seconds))
    } else {
        round
            .duration_minutes
            .unwrap_or(config.default_round_minutes)
            .max(0)
            .saturating_mul(60)
    }
}

/// Whole seconds elapsed, floored, with future start stamps clamped to zero.
fn elapsed_secs(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started_at).num_milliseconds().div_euclid(1000).max(0)
}

pub fn evaluate(
    round_number: i32,
    round: Option<&Round>,
    problems: &[Problem],
    server_now: DateTime<Utc>,
    config: &TimerConfig,
) -> RoundStatus {
    let round = match round {
        Some(round) => round,
        None => return RoundStatus::idle(round_number, RoundPhase::Waiting, 0),
    };

    let duration = effective_duration_secs(round, problems, config);
    if !round.is_unlocked {
        return RoundStatus::idle(round_number, RoundPhase::Locked, duration);
    }

    let started_at = match round.timer {
        TimerState::Running { started_at } => started_at,
        TimerState::Stopped => return RoundStatus::idle(round_number, RoundPhase::Waiting, duration),
    };

    let elapsed = elapsed_secs(started_at, server_now);
    let remaining = (duration - elapsed).max(0);

    let sequential = round.is_sequential().then(|| {
        let own = round_problems(round_number, problems);
        let slices = sequential::slice_durations(&own, config.default_problem_seconds);
        sequential::walk(&slices, elapsed)
    });

    RoundStatus {
        round_number,
        phase: if remaining > 0 {
            RoundPhase::Running
        } else {
            RoundPhase::Ended
        },
        started_at: Some(started_at),
        elapsed_secs: Some(elapsed),
        duration_secs: duration,
        total_remaining: remaining,
        sequential,
    }
}

/// Hints unlocked at this point of the round, in display order.
pub fn visible_hints<'a>(status: &RoundStatus, hints: &'a [Hint]) -> Vec<&'a Hint> {
    let elapsed = status.elapsed();
    let mut visible: Vec<&Hint> = hints.iter().filter(|h| h.is_visible(elapsed)).collect();
    visible.sort_by_key(|h| h.sort_order);
    visible
}

/// Link to the problem on the round's external judge.
pub fn judge_link(round: &Round, problem: &Problem) -> Option<String> {
    round
        .external_judge_url
        .as_ref()
        .map(|url| format!("{}#problem/{}", url, problem.code))
}
