//! Turnaround-time (TAT) countdown for an occupied bed.
//!
//! The countdown is a pure function of the persisted [`TatState`] and the current wall-clock time.
//! Nothing ticks in the background: readers call [`TatTimer::evaluate`] whenever they need a value,
//! so independent processes observing the same bed always agree on the remaining time.
//!
//! Status lifecycle:
//!
//! ```text
//! IDLE --start--> RUNNING --stop--> COMPLETED
//!                    |
//!                    +--(remaining reaches 0)--> EXPIRED
//! ```
//!
//! `EXPIRED` is derived lazily when a running countdown is read after its deadline; the stored
//! status only changes on `start` and `stop`.

use crate::error::{BedError, BedResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TatStatus {
    Idle,
    Running,
    Completed,
    Expired,
}

impl fmt::Display for TatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TatStatus::Idle => "IDLE",
            TatStatus::Running => "RUNNING",
            TatStatus::Completed => "COMPLETED",
            TatStatus::Expired => "EXPIRED",
        };
        f.write_str(label)
    }
}

/// Persisted countdown state embedded in a bed record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TatState {
    pub status: TatStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_secs: u64,
    /// Remaining seconds captured at the last persisted transition.
    pub remaining_secs: u64,
}

impl TatState {
    pub fn idle(duration_secs: u64) -> Self {
        Self {
            status: TatStatus::Idle,
            started_at: None,
            duration_secs,
            remaining_secs: duration_secs,
        }
    }
}

/// Evaluated view of a countdown at a given instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TatReading {
    pub status: TatStatus,
    pub remaining_secs: u64,
    pub elapsed_secs: u64,
    pub deadline: Option<DateTime<Utc>>,
}

/// Stateless evaluator for TAT countdowns.
pub struct TatTimer;

impl TatTimer {
    /// Computes the countdown at `now`.
    ///
    /// A start time in the future (clock skew between writers) counts as zero elapsed.
    pub fn evaluate(state: &TatState, now: DateTime<Utc>) -> TatReading {
        match (state.status, state.started_at) {
            (TatStatus::Running, Some(started_at)) => {
                let elapsed = elapsed_secs(started_at, now);
                let remaining = state.duration_secs.saturating_sub(elapsed);
                TatReading {
                    status: if remaining == 0 {
                        TatStatus::Expired
                    } else {
                        TatStatus::Running
                    },
                    remaining_secs: remaining,
                    elapsed_secs: elapsed.min(state.duration_secs),
                    deadline: deadline(started_at, state.duration_secs),
                }
            }
            (status, started_at) => TatReading {
                status,
                remaining_secs: state.remaining_secs,
                elapsed_secs: state.duration_secs.saturating_sub(state.remaining_secs),
                deadline: started_at.and_then(|s| deadline(s, state.duration_secs)),
            },
        }
    }

    /// Starts an idle countdown at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`BedError::InvalidTatTransition`] unless the countdown is `IDLE`.
    pub fn start(state: &TatState, now: DateTime<Utc>) -> BedResult<TatState> {
        if state.status != TatStatus::Idle {
            return Err(BedError::InvalidTatTransition {
                from: state.status,
                to: TatStatus::Running,
            });
        }
        Ok(TatState {
            status: TatStatus::Running,
            started_at: Some(now),
            duration_secs: state.duration_secs,
            remaining_secs: state.duration_secs,
        })
    }

    /// Stops a running countdown at `now`, freezing the remaining time.
    ///
    /// A countdown stopped after its deadline is recorded as `EXPIRED`, otherwise `COMPLETED`.
    ///
    /// # Errors
    ///
    /// Returns [`BedError::InvalidTatTransition`] unless the stored status is `RUNNING`.
    pub fn stop(state: &TatState, now: DateTime<Utc>) -> BedResult<TatState> {
        if state.status != TatStatus::Running {
            return Err(BedError::InvalidTatTransition {
                from: state.status,
                to: TatStatus::Completed,
            });
        }
        let reading = Self::evaluate(state, now);
        Ok(TatState {
            status: if reading.remaining_secs == 0 {
                TatStatus::Expired
            } else {
                TatStatus::Completed
            },
            started_at: state.started_at,
            duration_secs: state.duration_secs,
            remaining_secs: reading.remaining_secs,
        })
    }
}

fn elapsed_secs(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - started_at).num_seconds()).unwrap_or(0)
}

fn deadline(started_at: DateTime<Utc>, duration_secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(duration_secs).ok()?;
    started_at.checked_add_signed(Duration::try_seconds(secs)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn idle_countdown_reports_full_duration() {
        let reading = TatTimer::evaluate(&TatState::idle(1800), t0());
        assert_eq!(reading.status, TatStatus::Idle);
        assert_eq!(reading.remaining_secs, 1800);
        assert_eq!(reading.elapsed_secs, 0);
        assert_eq!(reading.deadline, None);
    }

    #[test]
    fn running_countdown_is_derived_from_wall_clock() {
        let running = TatTimer::start(&TatState::idle(1800), t0()).unwrap();

        let reading = TatTimer::evaluate(&running, t0() + Duration::seconds(600));
        assert_eq!(reading.status, TatStatus::Running);
        assert_eq!(reading.remaining_secs, 1200);
        assert_eq!(reading.elapsed_secs, 600);
        assert_eq!(reading.deadline, Some(t0() + Duration::seconds(1800)));
    }

    #[test]
    fn countdown_expires_at_deadline_and_never_goes_negative() {
        let running = TatTimer::start(&TatState::idle(1800), t0()).unwrap();

        let at_deadline = TatTimer::evaluate(&running, t0() + Duration::seconds(1800));
        assert_eq!(at_deadline.status, TatStatus::Expired);
        assert_eq!(at_deadline.remaining_secs, 0);

        let long_after = TatTimer::evaluate(&running, t0() + Duration::hours(5));
        assert_eq!(long_after.status, TatStatus::Expired);
        assert_eq!(long_after.remaining_secs, 0);
        assert_eq!(long_after.elapsed_secs, 1800);
    }

    #[test]
    fn start_in_the_future_counts_as_no_time_elapsed() {
        let running = TatTimer::start(&TatState::idle(1800), t0()).unwrap();
        let reading = TatTimer::evaluate(&running, t0() - Duration::seconds(30));
        assert_eq!(reading.remaining_secs, 1800);
        assert_eq!(reading.status, TatStatus::Running);
    }

    #[test]
    fn stop_freezes_remaining_time() {
        let running = TatTimer::start(&TatState::idle(1800), t0()).unwrap();
        let stopped = TatTimer::stop(&running, t0() + Duration::seconds(900)).unwrap();
        assert_eq!(stopped.status, TatStatus::Completed);
        assert_eq!(stopped.remaining_secs, 900);

        let later = TatTimer::evaluate(&stopped, t0() + Duration::hours(2));
        assert_eq!(later.status, TatStatus::Completed);
        assert_eq!(later.remaining_secs, 900);
    }

    #[test]
    fn stop_after_deadline_records_expiry() {
        let running = TatTimer::start(&TatState::idle(60), t0()).unwrap();
        let stopped = TatTimer::stop(&running, t0() + Duration::seconds(61)).unwrap();
        assert_eq!(stopped.status, TatStatus::Expired);
        assert_eq!(stopped.remaining_secs, 0);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let idle = TatState::idle(1800);
        assert!(matches!(
            TatTimer::stop(&idle, t0()),
            Err(BedError::InvalidTatTransition {
                from: TatStatus::Idle,
                ..
            })
        ));

        let running = TatTimer::start(&idle, t0()).unwrap();
        assert!(matches!(
            TatTimer::start(&running, t0()),
            Err(BedError::InvalidTatTransition {
                from: TatStatus::Running,
                to: TatStatus::Running
            })
        ));
    }
}
