//! Certainty evaluator
//!
//! Measures how often a rule's comparison held over a trailing window of a
//! device's events, and whether the log reaches far enough back to judge.
//!
//! # Algorithm
//!
//! With `cutoff = now - period` and `cutoff2 = now - 2 * period`, each event
//! on the rule's attribute falls into one of three bands:
//!
//! - before `cutoff2`: too old, ignored
//! - in `[cutoff2, cutoff)`: proves the log covers a full prior period
//! - at or after `cutoff`: tested against the comparison
//!
//! `certainty = satisfied / tested`. A window with no tested events has no
//! certainty at all rather than a zero one.
//!
//! The evaluator is pure: the same events, rule and `now` always produce the
//! same report.

use chrono::{DateTime, Duration, Utc};
use shared::models::{Comparison, Event, Rule};
use std::fmt;

/// Counts gathered over one evaluation window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CertaintyReport {
    /// Matching-attribute events inside the window
    pub events_tested: u32,
    /// Tested events whose value satisfied the comparison
    pub events_satisfied: u32,
    /// A matching-attribute event exists in the prior period
    pub period_satisfied: bool,
}

impl CertaintyReport {
    /// `satisfied / tested`, `None` when nothing was tested
    pub fn certainty(&self) -> Option<f64> {
        if self.events_tested == 0 {
            None
        } else {
            Some(f64::from(self.events_satisfied) / f64::from(self.events_tested))
        }
    }

    /// Certainty rendered with one decimal, `undefined` without samples
    pub fn certainty_label(&self) -> String {
        format_certainty(self.certainty())
    }

    /// `Certainty = S / T = Z`, appended to every outcome message
    pub fn summary(&self) -> String {
        format!(
            "Certainty = {} / {} = {}",
            self.events_satisfied,
            self.events_tested,
            self.certainty_label()
        )
    }
}

/// Render a certainty with one decimal
pub fn format_certainty(certainty: Option<f64>) -> String {
    match certainty {
        Some(c) => format!("{:.1}", c),
        None => "undefined".to_string(),
    }
}

/// Verdict drawn from a [`CertaintyReport`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Assessment {
    /// The log does not yet cover a prior period
    Pending,
    /// Certainty under the threshold, or no samples in the window
    BelowThreshold { certainty: Option<f64> },
    /// Certainty at or above the threshold
    Satisfied { certainty: f64 },
}

impl fmt::Display for Assessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assessment::Pending => write!(f, "pending"),
            Assessment::BelowThreshold { .. } => write!(f, "below_threshold"),
            Assessment::Satisfied { .. } => write!(f, "satisfied"),
        }
    }
}

/// Certainty evaluator for one rule
#[derive(Debug, Clone)]
pub struct CertaintyEvaluator {
    attribute: String,
    comparison: Comparison,
    period: Duration,
    threshold: f64,
}

impl CertaintyEvaluator {
    /// Build an evaluator from a validated rule
    pub fn from_rule(rule: &Rule) -> Self {
        Self {
            attribute: rule.trigger_attribute.clone(),
            comparison: rule.comparison.clone(),
            period: rule.period,
            threshold: rule.certainty,
        }
    }

    /// Count tested and satisfied events in the window ending at `now`
    ///
    /// # Arguments
    ///
    /// * `events` - Device log, in any order
    /// * `now` - End of the evaluation window
    pub fn measure(&self, events: &[Event], now: DateTime<Utc>) -> CertaintyReport {
        // Windows reaching past the earliest representable instant start there
        let cutoff = now
            .checked_sub_signed(self.period)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let cutoff2 = cutoff
            .checked_sub_signed(self.period)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut report = CertaintyReport::default();

        for event in events.iter().filter(|e| e.attribute == self.attribute) {
            if event.timestamp < cutoff2 {
                continue;
            }

            if event.timestamp < cutoff {
                report.period_satisfied = true;
                continue;
            }

            report.events_tested += 1;
            if self.comparison.matches(&event.value) {
                report.events_satisfied += 1;
            }
        }

        tracing::trace!(
            attribute = %self.attribute,
            tested = report.events_tested,
            satisfied = report.events_satisfied,
            period_satisfied = report.period_satisfied,
            "Certainty window measured"
        );

        report
    }

    /// Classify a report against the rule's threshold
    ///
    /// Priority: Pending, then BelowThreshold, then Satisfied.
    pub fn assess(&self, report: &CertaintyReport) -> Assessment {
        if !report.period_satisfied {
            return Assessment::Pending;
        }

        match report.certainty() {
            Some(certainty) if certainty >= self.threshold => Assessment::Satisfied { certainty },
            certainty => Assessment::BelowThreshold { certainty },
        }
    }

    /// Measure and assess in one step
    pub fn evaluate(&self, events: &[Event], now: DateTime<Utc>) -> (Assessment, CertaintyReport) {
        let report = self.measure(events, now);
        let assessment = self.assess(&report);

        tracing::debug!(
            attribute = %self.attribute,
            assessment = %assessment,
            certainty = %report.certainty_label(),
            threshold = self.threshold,
            "Certainty evaluation complete"
        );

        (assessment, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::models::EventValue;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    /// Event `secs` seconds after t0
    fn event_at(attribute: &str, value: impl Into<EventValue>, secs: i64) -> Event {
        Event::new("g88_pi", attribute, value, t0() + Duration::seconds(secs))
    }

    fn distance_rule() -> Rule {
        Rule {
            trigger_name: "lot_is_occupied".to_string(),
            trigger_attribute: "distance".to_string(),
            comparison: Comparison {
                below: Some(4.0),
                ..Default::default()
            },
            certainty: 0.8,
            period: Duration::seconds(60),
        }
    }

    // ========================================================================
    // Window scenarios
    // ========================================================================

    #[test]
    fn test_pending_without_prior_period_event() {
        let evaluator = CertaintyEvaluator::from_rule(&distance_rule());
        let events = vec![
            event_at("distance", 3.0, 0),
            event_at("distance", 3.0, 20),
            event_at("distance", 5.0, 40),
        ];

        let now = t0() + Duration::seconds(60);
        let (assessment, report) = evaluator.evaluate(&events, now);

        assert_eq!(assessment, Assessment::Pending);
        assert!(!report.period_satisfied);
        assert_eq!(report.events_tested, 3);
        assert_eq!(report.events_satisfied, 2);
    }

    #[test]
    fn test_satisfied_with_prior_period_and_four_of_five() {
        let evaluator = CertaintyEvaluator::from_rule(&distance_rule());
        // now = t0 + 120: prior period is [t0, t0+60), window is [t0+60, t0+120]
        let events = vec![
            event_at("distance", 3.0, 10),
            event_at("distance", 3.0, 60),
            event_at("distance", 2.0, 75),
            event_at("distance", 9.0, 90),
            event_at("distance", 1.0, 105),
            event_at("distance", 3.5, 120),
        ];

        let (assessment, report) = evaluator.evaluate(&events, t0() + Duration::seconds(120));

        assert_eq!(report.events_tested, 5);
        assert_eq!(report.events_satisfied, 4);
        assert_eq!(assessment, Assessment::Satisfied { certainty: 0.8 });
        assert_eq!(report.summary(), "Certainty = 4 / 5 = 0.8");
    }

    #[test]
    fn test_below_threshold() {
        let evaluator = CertaintyEvaluator::from_rule(&distance_rule());
        let events = vec![
            event_at("distance", 3.0, 10),
            event_at("distance", 3.0, 70),
            event_at("distance", 8.0, 80),
        ];

        let (assessment, report) = evaluator.evaluate(&events, t0() + Duration::seconds(120));
        assert_eq!(assessment, Assessment::BelowThreshold { certainty: Some(0.5) });
        assert_eq!(report.certainty_label(), "0.5");
    }

    #[test]
    fn test_no_samples_in_window_is_below_threshold() {
        let evaluator = CertaintyEvaluator::from_rule(&distance_rule());
        let events = vec![event_at("distance", 3.0, 10)];

        let (assessment, report) = evaluator.evaluate(&events, t0() + Duration::seconds(120));

        assert_eq!(assessment, Assessment::BelowThreshold { certainty: None });
        assert_eq!(report.certainty(), None);
        assert_eq!(report.summary(), "Certainty = 0 / 0 = undefined");
    }

    // ========================================================================
    // Band boundaries
    // ========================================================================

    #[test]
    fn test_event_at_cutoff_is_tested() {
        let evaluator = CertaintyEvaluator::from_rule(&distance_rule());
        let report = evaluator.measure(&[event_at("distance", 3.0, 60)], t0() + Duration::seconds(120));
        assert_eq!(report.events_tested, 1);
        assert!(!report.period_satisfied);
    }

    #[test]
    fn test_event_at_cutoff2_satisfies_period() {
        let evaluator = CertaintyEvaluator::from_rule(&distance_rule());
        let report = evaluator.measure(&[event_at("distance", 3.0, 0)], t0() + Duration::seconds(120));
        assert!(report.period_satisfied);
        assert_eq!(report.events_tested, 0);
    }

    #[test]
    fn test_events_older_than_two_periods_ignored() {
        let evaluator = CertaintyEvaluator::from_rule(&distance_rule());
        let report = evaluator.measure(&[event_at("distance", 3.0, -1)], t0() + Duration::seconds(120));
        assert_eq!(report, CertaintyReport::default());
    }

    #[test]
    fn test_other_attributes_ignored() {
        let evaluator = CertaintyEvaluator::from_rule(&distance_rule());
        let events = vec![
            event_at("temperature", 1.0, 10),
            event_at("temperature", 1.0, 100),
        ];
        let report = evaluator.measure(&events, t0() + Duration::seconds(120));
        assert_eq!(report, CertaintyReport::default());
    }

    #[test]
    fn test_zero_period_never_leaves_pending() {
        let mut rule = distance_rule();
        rule.period = Duration::zero();
        let evaluator = CertaintyEvaluator::from_rule(&rule);

        let events = vec![event_at("distance", 3.0, 0)];
        let (assessment, report) = evaluator.evaluate(&events, t0());
        assert_eq!(assessment, Assessment::Pending);
        assert_eq!(report.events_tested, 1);
    }

    #[test]
    fn test_period_reaching_past_earliest_instant() {
        let mut rule = distance_rule();
        rule.period = Duration::try_seconds(5_000_000_000_000).unwrap();
        let evaluator = CertaintyEvaluator::from_rule(&rule);

        let events = vec![event_at("distance", 3.0, 0), event_at("distance", 3.0, 10)];
        let (assessment, report) = evaluator.evaluate(&events, t0() + Duration::seconds(10));

        assert_eq!(assessment, Assessment::Pending);
        assert_eq!(report.events_tested, 2);
        assert!(!report.period_satisfied);
    }

    // ========================================================================
    // Comparisons
    // ========================================================================

    #[test]
    fn test_equals_on_text_values() {
        let rule = Rule {
            trigger_name: "lot_is_authorised".to_string(),
            trigger_attribute: "class".to_string(),
            comparison: Comparison {
                equals: Some("A".into()),
                ..Default::default()
            },
            certainty: 0.5,
            period: Duration::seconds(60),
        };
        let evaluator = CertaintyEvaluator::from_rule(&rule);
        let events = vec![
            event_at("class", "A", 10),
            event_at("class", "A", 70),
            event_at("class", "B", 80),
        ];

        let (assessment, _) = evaluator.evaluate(&events, t0() + Duration::seconds(120));
        assert_eq!(assessment, Assessment::Satisfied { certainty: 0.5 });
    }

    #[test]
    fn test_limits_or_together() {
        let mut rule = distance_rule();
        rule.comparison = Comparison {
            equals: None,
            above: Some(10.0),
            below: Some(2.0),
        };
        rule.certainty = 1.0;
        let evaluator = CertaintyEvaluator::from_rule(&rule);
        let events = vec![
            event_at("distance", 5.0, 10),
            event_at("distance", 11.0, 70),
            event_at("distance", 1.0, 80),
        ];

        let (assessment, _) = evaluator.evaluate(&events, t0() + Duration::seconds(120));
        assert_eq!(assessment, Assessment::Satisfied { certainty: 1.0 });
    }

    #[test]
    fn test_non_numeric_text_never_matches_limit() {
        let evaluator = CertaintyEvaluator::from_rule(&distance_rule());
        let events = vec![
            event_at("distance", 3.0, 10),
            event_at("distance", "near", 70),
            event_at("distance", "3", 80),
        ];

        let report = evaluator.measure(&events, t0() + Duration::seconds(120));
        assert_eq!(report.events_tested, 2);
        assert_eq!(report.events_satisfied, 1);
    }

    // ========================================================================
    // Purity
    // ========================================================================

    #[test]
    fn test_evaluation_is_idempotent() {
        let evaluator = CertaintyEvaluator::from_rule(&distance_rule());
        let events = vec![
            event_at("distance", 3.0, 10),
            event_at("distance", 3.0, 70),
            event_at("distance", 6.0, 90),
        ];
        let now = t0() + Duration::seconds(120);

        assert_eq!(evaluator.evaluate(&events, now), evaluator.evaluate(&events, now));
    }

    #[test]
    fn test_format_certainty() {
        assert_eq!(format_certainty(Some(0.8)), "0.8");
        assert_eq!(format_certainty(Some(2.0 / 3.0)), "0.7");
        assert_eq!(format_certainty(Some(1.0)), "1.0");
        assert_eq!(format_certainty(None), "undefined");
    }
}
