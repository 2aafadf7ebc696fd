//! Human-readable notifications for transitions and daily summaries.
//!
//! [`Notifier`] is a [`TransitionListener`] that renders every transition
//! into a [`Notification`] and pushes it down an mpsc channel. The
//! application drains the channel, logs each message and shows the latest
//! ones on the dashboard. Nothing is sent over the network.

use std::fmt::Write as _;
use std::sync::mpsc::Sender;

use crate::aggregator::RolloverRecord;
use crate::condition::{Condition, ConditionState};
use crate::registry::{Transition, TransitionListener};

/// A rendered transition.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub condition: Condition,
    pub state: ConditionState,
    pub timestamp: i64,
    pub text: String,
}

/// Listener that renders transitions for one node.
pub struct Notifier {
    node: String,
    tx: Sender<Notification>,
}

impl Notifier {
    pub fn new(node: impl Into<String>, tx: Sender<Notification>) -> Self {
        Self {
            node: node.into(),
            tx,
        }
    }

    fn send(&self, t: &Transition) {
        let notification = Notification {
            condition: t.condition,
            state: t.state,
            timestamp: t.timestamp,
            text: render_transition(&self.node, t),
        };
        // receiver gone means we are shutting down
        let _ = self.tx.send(notification);
    }
}

impl TransitionListener for Notifier {
    fn on_warning(&mut self, t: &Transition) {
        self.send(t);
    }

    fn on_failure(&mut self, t: &Transition) {
        self.send(t);
    }

    fn on_restore(&mut self, t: &Transition) {
        self.send(t);
    }
}

/// Split seconds into whole minutes and the remaining seconds.
pub fn minutes_seconds(secs: i64) -> (i64, i64) {
    let secs = secs.max(0);
    (secs / 60, secs % 60)
}

/// Render a transition message.
pub fn render_transition(node: &str, t: &Transition) -> String {
    let name = t.condition.name();
    if t.condition == Condition::PowerFailure {
        return render_power(node, t);
    }

    let header = match t.state {
        ConditionState::Failure => format!("FAILURE: {name} [{node}]"),
        ConditionState::Warning => format!("WARNING: {name} [{node}]"),
        ConditionState::Normal => format!("NORMALIZED: {name} [{node}]"),
    };

    let measured = match (t.value, t.condition.unit()) {
        (Some(v), Some(unit)) => Some(format!("{v:.2} {unit}")),
        _ => None,
    };

    let mut out = header;
    match (t.state, measured) {
        (ConditionState::Failure, Some(m)) => {
            let _ = write!(out, "\nDetected CRITICAL state: {m}");
        }
        (ConditionState::Failure, None) => out.push_str("\nDetected CRITICAL state!"),
        (ConditionState::Warning, Some(m)) => {
            let _ = write!(out, "\nDetected CAUTIOUS state: {m}");
        }
        (ConditionState::Warning, None) => out.push_str("\nDetected CAUTIOUS state!"),
        (ConditionState::Normal, Some(m)) => {
            let _ = write!(out, "\nCurrent state is: {m}");
        }
        (ConditionState::Normal, None) => {}
    }

    match t.state {
        ConditionState::Failure => {
            let _ = write!(out, "\nTotal failures today: {}", t.daily_failures);
        }
        ConditionState::Warning => {
            let _ = write!(out, "\nTotal warnings today: {}", t.daily_warnings);
        }
        ConditionState::Normal => {
            let _ = write!(
                out,
                "\nTotal warnings today: {}\nTotal failures today: {}",
                t.daily_warnings, t.daily_failures
            );
        }
    }
    out
}

fn render_power(node: &str, t: &Transition) -> String {
    if t.state == ConditionState::Normal {
        let (m, s) = minutes_seconds(t.last_failure_duration);
        return format!(
            "{node} energy provider is RESTORED\nTotal power loss duration:\n{m} minute(s) {s} second(s)"
        );
    }
    let label = |c: Condition| t.states[c].label();
    format!(
        "{node} energy provider is FAILED\nAdditional info:\n\
         Circuit Breaker: {}\nUPS Battery: {}\nSmart Home AC Line: {}\nCase: {}",
        label(Condition::Breaker),
        label(Condition::Battery),
        label(Condition::AcLine),
        label(Condition::CaseIntrusion),
    )
}

/// Render the summary of a closed day.
///
/// `nominal_voltage` converts the current extrema into an approximate load
/// range.
pub fn render_summary(node: &str, record: &RolloverRecord, nominal_voltage: f64) -> String {
    let d = &record.daily;
    let (m, s) = minutes_seconds(i64::try_from(d.power_failures_duration).unwrap_or(i64::MAX));
    let ws = |c: Condition| format!("{} warnings / {} failures", d.warnings[c], d.failures[c]);

    let mut out = String::new();
    let _ = writeln!(out, "-- Daily Summary -- {node}");
    let _ = writeln!(out, "Power consumed per day: {:.2} kWh", d.energy);
    let _ = writeln!(out, "Total consumption: {:.2} kWh", record.total.energy);
    let _ = writeln!(
        out,
        "Load during day: {:.2} kW - {:.2} kW approximately",
        d.current.min * nominal_voltage / 1000.0,
        d.current.max * nominal_voltage / 1000.0
    );
    let _ = writeln!(
        out,
        "Stability: {} power failures detected with total duration {m} minute(s) {s} second(s)",
        d.failures[Condition::PowerFailure]
    );
    let _ = writeln!(out, "Voltage: {:.2} V - {:.2} V", d.voltage.min, d.voltage.max);
    let _ = writeln!(out, "Frequency: {:.2} Hz - {:.2} Hz", d.frequency.min, d.frequency.max);
    for c in [
        Condition::Undervoltage,
        Condition::Overvoltage,
        Condition::Overload,
        Condition::PhaseImbalance,
        Condition::FrequencyShift,
        Condition::Overheat,
    ] {
        let _ = writeln!(out, "{}: {}", c.name(), ws(c));
    }
    for c in [Condition::Breaker, Condition::PowerMeter, Condition::CaseIntrusion] {
        let _ = writeln!(out, "{}: {} failures", c.name(), d.failures[c]);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::condition::ConditionMap;
    use crate::registry::ProblemRegistry;
    use crate::slice::SnapSlice;
    use crate::thresholds::Thresholds;

    fn transition(condition: Condition, state: ConditionState, value: Option<f64>) -> Transition {
        Transition {
            condition,
            previous: ConditionState::Normal,
            state,
            timestamp: 0,
            value,
            daily_warnings: 2,
            daily_failures: 1,
            last_failure_duration: 0,
            states: ConditionMap::filled(ConditionState::Normal),
        }
    }

    #[test]
    fn measured_failure_shows_value_and_unit() {
        let t = transition(Condition::Overvoltage, ConditionState::Failure, Some(266.0));
        let text = render_transition("Node-1", &t);
        assert!(text.starts_with("FAILURE: Overvoltage [Node-1]"));
        assert!(text.contains("266.00 V"));
        assert!(text.ends_with("Total failures today: 1"));
    }

    #[test]
    fn equipment_restore_lists_both_counters() {
        let t = transition(Condition::Breaker, ConditionState::Normal, None);
        let text = render_transition("Node-1", &t);
        assert_eq!(
            text,
            "NORMALIZED: Circuit Breaker [Node-1]\nTotal warnings today: 2\nTotal failures today: 1"
        );
    }

    #[test]
    fn power_failure_lists_equipment_states() {
        let mut t = transition(Condition::PowerFailure, ConditionState::Failure, None);
        t.states[Condition::Breaker] = ConditionState::Failure;
        let text = render_transition("Node-1", &t);
        assert!(text.contains("Circuit Breaker: Failure"));
        assert!(text.contains("UPS Battery: OK"));
    }

    #[test]
    fn power_restore_reports_duration() {
        let mut t = transition(Condition::PowerFailure, ConditionState::Normal, None);
        t.last_failure_duration = 125;
        assert!(render_transition("N", &t).ends_with("2 minute(s) 5 second(s)"));
    }

    #[test]
    fn notifier_sends_one_message_per_transition() {
        let (tx, rx) = mpsc::channel();
        let mut registry = ProblemRegistry::new(Thresholds::default());
        registry.add_listener(Box::new(Notifier::new("Node-1", tx)));
        registry.start();

        registry.monitor_power_failure(false, 1_000);
        registry.monitor_power_failure(false, 1_010);
        registry.monitor_power_failure(true, 1_090);

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].state, ConditionState::Failure);
        assert!(got[1].text.ends_with("1 minute(s) 30 second(s)"));
    }

    #[test]
    fn summary_mentions_outage_and_energy() {
        let mut daily = SnapSlice {
            energy: 5.5,
            power_failures_duration: 61,
            ..SnapSlice::default()
        };
        daily.failures[Condition::PowerFailure] = 1;
        let record = RolloverRecord {
            timestamp: 0,
            daily,
            total: daily,
        };
        let text = render_summary("Node-1", &record, 230.0);
        assert!(text.contains("Power consumed per day: 5.50 kWh"));
        assert!(text.contains("1 power failures detected with total duration 1 minute(s) 1 second(s)"));
        assert!(text.contains("Load during day: 7.36 kW - 7.36 kW"));
    }
}
