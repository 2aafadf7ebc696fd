//! Problem registry: live condition states and daily counters.
//!
//! The [`ProblemRegistry`] owns the current [`ConditionState`] of every
//! condition, the daily warning/failure counters, the running daily
//! extrema, and the [`PowerFailureTracker`]. Raw samples enter through the
//! `monitor_*` methods, which evaluate them against [`Thresholds`] and
//! apply the result with [`ProblemRegistry::set_state`].
//!
//! Counters count transition events, not samples: a repeated identical
//! state is suppressed before any counter or listener sees it.
//!
//! While the registry is stopped every mutation entry point is inert.

use tracing::debug;

use crate::condition::{Condition, ConditionMap, ConditionState};
use crate::power_failure::PowerFailureTracker;
use crate::thresholds::{self, Thresholds};

/// Running minimum and maximum of a measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extrema {
    pub min: f64,
    pub max: f64,
}

impl Extrema {
    /// Both ends seeded to the nominal value.
    pub const fn seeded(nominal: f64) -> Self {
        Self {
            min: nominal,
            max: nominal,
        }
    }

    /// Fold an observed range into the extrema.
    pub fn observe(&mut self, low: f64, high: f64) {
        self.min = self.min.min(low);
        self.max = self.max.max(high);
    }

    /// Combine two extrema.
    pub fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// A state change, as seen by listeners.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub condition: Condition,
    pub previous: ConditionState,
    pub state: ConditionState,
    /// Sample timestamp, `0` when unknown
    pub timestamp: i64,
    /// Evaluated measurement for measured conditions
    pub value: Option<f64>,
    /// Daily warnings of this condition, including this transition
    pub daily_warnings: u32,
    /// Daily failures of this condition, including this transition
    pub daily_failures: u32,
    /// Last completed outage in seconds (`-1` while one is open)
    pub last_failure_duration: i64,
    /// States of all conditions just before this change was stored
    pub states: ConditionMap<ConditionState>,
}

/// Observer of condition transitions.
///
/// Listeners are invoked synchronously, in registration order, exactly
/// once per actual change.
pub trait TransitionListener {
    fn on_warning(&mut self, _transition: &Transition) {}
    fn on_failure(&mut self, _transition: &Transition) {}
    fn on_restore(&mut self, _transition: &Transition) {}
}

/// Everything the registry tracks, minus configuration and listeners.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryState {
    pub states: ConditionMap<ConditionState>,
    pub daily_warnings: ConditionMap<u32>,
    pub daily_failures: ConditionMap<u32>,
    pub voltage: Extrema,
    pub current: Extrema,
    pub frequency: Extrema,
    pub tracker: PowerFailureTracker,
}

impl RegistryState {
    fn new(thresholds: &Thresholds) -> Self {
        Self {
            states: ConditionMap::filled(ConditionState::Normal),
            daily_warnings: ConditionMap::filled(0),
            daily_failures: ConditionMap::filled(0),
            voltage: Extrema::seeded(thresholds.nominal_voltage),
            current: Extrema::seeded(thresholds.rated_load),
            frequency: Extrema::seeded(thresholds.nominal_frequency),
            tracker: PowerFailureTracker::default(),
        }
    }
}

/// Owner of condition states, daily counters, and extrema.
pub struct ProblemRegistry {
    thresholds: Thresholds,
    data: RegistryState,
    is_active: bool,
    listeners: Vec<Box<dyn TransitionListener>>,
}

impl ProblemRegistry {
    /// Create a stopped registry with every condition Normal.
    pub fn new(thresholds: Thresholds) -> Self {
        let data = RegistryState::new(&thresholds);
        Self {
            thresholds,
            data,
            is_active: false,
            listeners: Vec::new(),
        }
    }

    /// Register a transition listener.
    pub fn add_listener(&mut self, listener: Box<dyn TransitionListener>) {
        self.listeners.push(listener);
    }

    pub fn start(&mut self) {
        self.is_active = true;
    }

    pub fn stop(&mut self) {
        self.is_active = false;
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Current state of a condition.
    pub fn state(&self, condition: Condition) -> ConditionState {
        self.data.states[condition]
    }

    pub fn daily_warnings(&self, condition: Condition) -> u32 {
        self.data.daily_warnings[condition]
    }

    pub fn daily_failures(&self, condition: Condition) -> u32 {
        self.data.daily_failures[condition]
    }

    pub fn voltage(&self) -> Extrema {
        self.data.voltage
    }

    pub fn current(&self) -> Extrema {
        self.data.current
    }

    pub fn frequency(&self) -> Extrema {
        self.data.frequency
    }

    pub fn tracker(&self) -> &PowerFailureTracker {
        &self.data.tracker
    }

    /// Full read-only view of the tracked data.
    pub fn data(&self) -> &RegistryState {
        &self.data
    }

    /// Apply a new state to a condition.
    ///
    /// `timestamp` is only used for the generic power-failure condition;
    /// pass `0` when no reliable clock is available.
    pub fn set_state(&mut self, condition: Condition, state: ConditionState, timestamp: i64) {
        self.apply(condition, state, timestamp, None);
    }

    fn apply(
        &mut self,
        condition: Condition,
        state: ConditionState,
        timestamp: i64,
        value: Option<f64>,
    ) {
        if !self.is_active {
            return;
        }
        let previous = self.data.states[condition];
        if previous == state {
            return;
        }

        match state {
            ConditionState::Warning => self.data.daily_warnings[condition] += 1,
            ConditionState::Failure => self.data.daily_failures[condition] += 1,
            ConditionState::Normal => {}
        }

        if condition == Condition::PowerFailure {
            match state {
                ConditionState::Failure => self.data.tracker.on_failure(timestamp),
                ConditionState::Normal => self.data.tracker.on_restore(timestamp),
                ConditionState::Warning => {}
            }
        }

        let transition = Transition {
            condition,
            previous,
            state,
            timestamp,
            value,
            daily_warnings: self.data.daily_warnings[condition],
            daily_failures: self.data.daily_failures[condition],
            last_failure_duration: self.data.tracker.last_duration(),
            states: self.data.states,
        };
        debug!(
            condition = condition.key(),
            from = transition.previous.label(),
            to = state.label(),
            "condition transition"
        );

        for listener in self.listeners.iter_mut() {
            match state {
                ConditionState::Warning => listener.on_warning(&transition),
                ConditionState::Failure => listener.on_failure(&transition),
                ConditionState::Normal => listener.on_restore(&transition),
            }
        }

        self.data.states[condition] = state;
    }

    /// Zero the daily counters and reseed the extrema.
    ///
    /// Condition states and the open outage interval are kept.
    pub fn reset(&mut self) {
        self.data.daily_warnings = ConditionMap::filled(0);
        self.data.daily_failures = ConditionMap::filled(0);
        self.data.voltage = Extrema::seeded(self.thresholds.nominal_voltage);
        self.data.current = Extrema::seeded(self.thresholds.rated_load);
        self.data.frequency = Extrema::seeded(self.thresholds.nominal_frequency);
        self.data.tracker.reset_daily();
    }

    /// Overwrite the daily counters and merge the extrema from a persisted
    /// day, then install the persisted tracker.
    pub(crate) fn restore_day(
        &mut self,
        warnings: ConditionMap<u32>,
        failures: ConditionMap<u32>,
        voltage: Extrema,
        current: Extrema,
        frequency: Extrema,
        tracker: PowerFailureTracker,
    ) {
        self.data.daily_warnings = warnings;
        self.data.daily_failures = failures;
        self.data.voltage = self.data.voltage.merge(voltage);
        self.data.current = self.data.current.merge(current);
        self.data.frequency = self.data.frequency.merge(frequency);
        self.data.tracker = tracker;
    }

    /// Mutable tracker access for rollover re-anchoring.
    pub(crate) fn tracker_mut(&mut self) -> &mut PowerFailureTracker {
        &mut self.data.tracker
    }

    /// Mark the supply as lost without counting or notifying, for an outage
    /// that was already open before a restart.
    pub(crate) fn mark_open_failure(&mut self) {
        self.data.states[Condition::PowerFailure] = ConditionState::Failure;
    }

    /// Seed today's failure count of a condition.
    pub(crate) fn seed_failures(&mut self, condition: Condition, count: u32) {
        self.data.daily_failures[condition] = count;
    }

    fn is_powered(&self) -> bool {
        self.data.states[Condition::PowerFailure] == ConditionState::Normal
    }

    /// Evaluate three phase voltages.
    pub fn monitor_voltage(&mut self, phases: [f64; 3]) {
        if !self.is_active || !self.is_powered() {
            return;
        }
        let Some((min, max)) = thresholds::phase_range(phases) else {
            return;
        };
        self.data.voltage.observe(min, max);

        let over = self.thresholds.overvoltage_state(max);
        self.apply(Condition::Overvoltage, over, 0, Some(max));
        let under = self.thresholds.undervoltage_state(min);
        self.apply(Condition::Undervoltage, under, 0, Some(min));
    }

    /// Evaluate three phase currents, then the derived phase imbalance.
    pub fn monitor_current(&mut self, phases: [f64; 3]) {
        if !self.is_active || !self.is_powered() {
            return;
        }
        let Some((min, max)) = thresholds::phase_range(phases) else {
            return;
        };
        self.data.current.observe(min, max);

        let overload = self.thresholds.overload_state(max);
        self.apply(Condition::Overload, overload, 0, Some(max));

        if let Some(shift) = thresholds::phase_imbalance_percent(phases) {
            self.monitor_phase_shift(shift);
        }
    }

    /// Evaluate a phase imbalance percentage.
    pub fn monitor_phase_shift(&mut self, shift_percent: f64) {
        if !self.is_active || !self.is_powered() || !shift_percent.is_finite() {
            return;
        }
        let state = self.thresholds.phase_shift_state(shift_percent);
        self.apply(Condition::PhaseImbalance, state, 0, Some(shift_percent.abs()));
    }

    /// Evaluate the line frequency.
    pub fn monitor_frequency(&mut self, hz: f64) {
        if !self.is_active || !self.is_powered() || !thresholds::is_valid_magnitude(hz) {
            return;
        }
        self.data.frequency.observe(hz, hz);
        let state = self.thresholds.frequency_state(hz);
        self.apply(Condition::FrequencyShift, state, 0, Some(hz));
    }

    /// Evaluate supply presence on the monitored line.
    pub fn monitor_power_failure(&mut self, is_powered: bool, timestamp: i64) {
        self.set_state(Condition::PowerFailure, ConditionState::from_ok(is_powered), timestamp);
    }

    pub fn monitor_breaker(&mut self, is_ok: bool) {
        self.set_state(Condition::Breaker, ConditionState::from_ok(is_ok), 0);
    }

    pub fn monitor_power_meter(&mut self, is_ok: bool) {
        self.set_state(Condition::PowerMeter, ConditionState::from_ok(is_ok), 0);
    }

    pub fn monitor_case_intrusion(&mut self, is_opened: bool) {
        self.set_state(Condition::CaseIntrusion, ConditionState::from_ok(!is_opened), 0);
    }

    pub fn monitor_battery(&mut self, is_ok: bool) {
        self.set_state(Condition::Battery, ConditionState::from_ok(is_ok), 0);
    }

    pub fn monitor_ac_line(&mut self, is_ok: bool) {
        self.set_state(Condition::AcLine, ConditionState::from_ok(is_ok), 0);
    }

    /// Evaluate the enclosure temperature. Negative values are valid.
    pub fn monitor_overheating(&mut self, celsius: f64) {
        if !self.is_active || !celsius.is_finite() {
            return;
        }
        let state = self.thresholds.overheat_state(celsius);
        self.apply(Condition::Overheat, state, 0, Some(celsius));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Listener that records every callback as `(kind, condition)`.
    #[derive(Clone, Default)]
    pub(crate) struct Recorder(pub Rc<RefCell<Vec<(&'static str, Condition)>>>);

    impl TransitionListener for Recorder {
        fn on_warning(&mut self, t: &Transition) {
            self.0.borrow_mut().push(("warning", t.condition));
        }
        fn on_failure(&mut self, t: &Transition) {
            self.0.borrow_mut().push(("failure", t.condition));
        }
        fn on_restore(&mut self, t: &Transition) {
            self.0.borrow_mut().push(("restore", t.condition));
        }
    }

    impl Recorder {
        fn count(&self, kind: &str) -> usize {
            self.0.borrow().iter().filter(|(k, _)| *k == kind).count()
        }
    }

    fn active_registry() -> (ProblemRegistry, Recorder) {
        let mut registry = ProblemRegistry::new(Thresholds::default());
        let recorder = Recorder::default();
        registry.add_listener(Box::new(recorder.clone()));
        registry.start();
        (registry, recorder)
    }

    #[test]
    fn redundant_transition_is_suppressed() {
        let (mut registry, recorder) = active_registry();

        registry.set_state(Condition::Breaker, ConditionState::Failure, 10);
        registry.set_state(Condition::Breaker, ConditionState::Failure, 20);

        assert_eq!(registry.daily_failures(Condition::Breaker), 1);
        assert_eq!(recorder.count("failure"), 1);
    }

    #[test]
    fn restore_does_not_count() {
        let (mut registry, recorder) = active_registry();

        registry.set_state(Condition::Overheat, ConditionState::Warning, 0);
        registry.set_state(Condition::Overheat, ConditionState::Normal, 0);

        assert_eq!(registry.daily_warnings(Condition::Overheat), 1);
        assert_eq!(registry.daily_failures(Condition::Overheat), 0);
        assert_eq!(recorder.count("restore"), 1);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        struct Tagged(&'static str, Rc<RefCell<Vec<&'static str>>>);
        impl TransitionListener for Tagged {
            fn on_failure(&mut self, _t: &Transition) {
                self.1.borrow_mut().push(self.0);
            }
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = ProblemRegistry::new(Thresholds::default());
        registry.add_listener(Box::new(Tagged("first", log.clone())));
        registry.add_listener(Box::new(Tagged("second", log.clone())));
        registry.start();

        registry.monitor_battery(false);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn extrema_seeded_to_nominal_after_reset() {
        let (mut registry, _) = active_registry();
        registry.monitor_voltage([210.0, 250.0, 230.0]);
        registry.reset();

        let v = registry.voltage();
        assert_eq!(v.min, 230.0);
        assert_eq!(v.max, 230.0);
        assert_eq!(registry.frequency(), Extrema::seeded(50.0));
        assert_eq!(registry.current(), Extrema::seeded(32.0));
    }

    #[test]
    fn reset_keeps_states() {
        let (mut registry, _) = active_registry();
        registry.monitor_case_intrusion(true);
        registry.reset();

        assert_eq!(registry.state(Condition::CaseIntrusion), ConditionState::Failure);
        assert_eq!(registry.daily_failures(Condition::CaseIntrusion), 0);
    }

    #[test]
    fn inactive_registry_is_inert() {
        let mut registry = ProblemRegistry::new(Thresholds::default());
        let recorder = Recorder::default();
        registry.add_listener(Box::new(recorder.clone()));
        let before = registry.data().clone();

        registry.set_state(Condition::Overload, ConditionState::Failure, 5);
        registry.monitor_voltage([300.0, 300.0, 300.0]);
        registry.monitor_current([50.0, 10.0, 10.0]);
        registry.monitor_frequency(45.0);
        registry.monitor_power_failure(false, 100);
        registry.monitor_breaker(false);
        registry.monitor_power_meter(false);
        registry.monitor_case_intrusion(true);
        registry.monitor_battery(false);
        registry.monitor_ac_line(false);
        registry.monitor_overheating(150.0);

        assert_eq!(registry.data(), &before);
        assert!(recorder.0.borrow().is_empty());
    }

    #[test]
    fn overvoltage_failure_then_restore() {
        let thresholds = Thresholds {
            overvoltage_warning: 1.05 * 230.0,
            overvoltage_failure: 265.0,
            ..Thresholds::default()
        };
        let mut registry = ProblemRegistry::new(thresholds);
        let recorder = Recorder::default();
        registry.add_listener(Box::new(recorder.clone()));
        registry.start();

        registry.monitor_voltage([260.0, 266.0, 262.0]);
        assert_eq!(registry.state(Condition::Overvoltage), ConditionState::Failure);
        assert_eq!(registry.daily_failures(Condition::Overvoltage), 1);
        assert_eq!(recorder.count("restore"), 0);

        registry.monitor_voltage([225.0, 228.0, 229.0]);
        assert_eq!(registry.state(Condition::Overvoltage), ConditionState::Normal);
        assert_eq!(registry.daily_failures(Condition::Overvoltage), 1);
        assert_eq!(recorder.count("restore"), 1);
        assert_eq!(registry.daily_failures(Condition::Undervoltage), 0);
    }

    #[test]
    fn bad_sample_does_not_revert_state() {
        let (mut registry, _) = active_registry();
        registry.monitor_voltage([300.0, 300.0, 300.0]);
        registry.monitor_voltage([f64::NAN, 230.0, 230.0]);
        registry.monitor_voltage([-1.0, 230.0, 230.0]);

        assert_eq!(registry.state(Condition::Overvoltage), ConditionState::Failure);
        assert_eq!(registry.voltage().max, 300.0);
    }

    #[test]
    fn unbalanced_current_raises_phase_imbalance() {
        let (mut registry, _) = active_registry();
        registry.monitor_current([10.0, 10.0, 13.0]);

        assert_eq!(registry.state(Condition::PhaseImbalance), ConditionState::Failure);
        assert_eq!(registry.state(Condition::Overload), ConditionState::Normal);
        assert_eq!(registry.current().min, 10.0);
        assert_eq!(registry.current().max, 32.0);
    }

    #[test]
    fn electrical_checks_pause_during_outage() {
        let (mut registry, _) = active_registry();
        registry.monitor_power_failure(false, 1_000);
        registry.monitor_voltage([0.0, 0.0, 0.0]);
        registry.monitor_frequency(0.0);

        assert_eq!(registry.state(Condition::Undervoltage), ConditionState::Normal);
        assert_eq!(registry.state(Condition::FrequencyShift), ConditionState::Normal);
        assert_eq!(registry.voltage(), Extrema::seeded(230.0));
    }

    #[test]
    fn power_failure_drives_tracker() {
        let (mut registry, _) = active_registry();
        registry.monitor_power_failure(false, 1_000);
        assert!(registry.tracker().in_progress());

        registry.monitor_power_failure(true, 1_300);
        assert_eq!(registry.tracker().last_duration(), 300);
        assert_eq!(registry.tracker().daily_duration(), 300);
        assert_eq!(registry.daily_failures(Condition::PowerFailure), 1);
    }

    #[test]
    fn transition_carries_counters_and_value() {
        struct Capture(Rc<RefCell<Option<Transition>>>);
        impl TransitionListener for Capture {
            fn on_warning(&mut self, t: &Transition) {
                *self.0.borrow_mut() = Some(t.clone());
            }
        }

        let seen = Rc::new(RefCell::new(None));
        let mut registry = ProblemRegistry::new(Thresholds::default());
        registry.add_listener(Box::new(Capture(seen.clone())));
        registry.start();
        registry.monitor_overheating(60.0);

        let t = seen.borrow().clone().unwrap();
        assert_eq!(t.condition, Condition::Overheat);
        assert_eq!(t.previous, ConditionState::Normal);
        assert_eq!(t.daily_warnings, 1);
        assert_eq!(t.value, Some(60.0));
    }
}
