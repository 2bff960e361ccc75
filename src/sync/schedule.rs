//! Cadence rules deciding when the prediction cache is due for a refresh.
//!
//! The decision is a pure function of the current local time and the
//! timestamp of the last refresh. Rules are plain data so each guard and
//! cadence is testable on its own and the composition is an ordered list
//! rather than branching code.

use chrono::{DateTime, Datelike, Duration, Timelike, Weekday};
use chrono_tz::Tz;

/// Predicate over the current local time that enables a rule.
pub type Guard = fn(&DateTime<Tz>) -> bool;

/// One scheduling rule: an optional guard plus the minimum elapsed time
/// since the last refresh required before a new one may start.
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub guard: Option<Guard>,
    pub cadence: Duration,
}

/// Walks the rules in order. The first rule whose guard matches `now`
/// (or which has no guard) answers: refresh when `now` is strictly after
/// `last_refreshed + cadence`. Guarded rules abstain when their guard
/// fails; no later rule's cadence is consulted once one has answered.
pub fn should_refresh(rules: &[Rule], now: DateTime<Tz>, last_refreshed: DateTime<Tz>) -> bool {
    for rule in rules {
        if let Some(guard) = rule.guard {
            if !guard(&now) {
                continue;
            }
        }
        return now > last_refreshed + rule.cadence;
    }
    false
}

/// Hour 23 or any hour before 7.
pub fn at_night(now: &DateTime<Tz>) -> bool {
    let h = now.hour();
    h == 23 || h < 7
}

pub fn on_weekends(now: &DateTime<Tz>) -> bool {
    matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Hours 8 through 10.
pub fn in_mornings(now: &DateTime<Tz>) -> bool {
    (8..11).contains(&now.hour())
}

/// The default rule set. Order is load-bearing: the weekend rule sits
/// before the morning rule, so weekend mornings run at the weekend
/// cadence and the morning rule only ever fires on weekdays.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "night",
            guard: Some(at_night),
            cadence: Duration::seconds(60),
        },
        Rule {
            name: "weekend",
            guard: Some(on_weekends),
            cadence: Duration::seconds(30),
        },
        Rule {
            name: "morning",
            guard: Some(in_mornings),
            cadence: Duration::seconds(10),
        },
        Rule {
            name: "default",
            guard: None,
            cadence: Duration::seconds(20),
        },
    ]
}
