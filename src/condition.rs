//! Monitored conditions and their states.
//!
//! A [`Condition`] is one fault category watched on the node. Each
//! condition is always in exactly one [`ConditionState`]. Per-condition
//! data (states, counters) lives in a [`ConditionMap`], which is indexed
//! by the closed enum so a missing entry cannot exist.

use std::ops::{Index, IndexMut};

/// One monitored electrical or equipment fault category.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Condition {
    /// Supply lost on the monitored line
    PowerFailure,
    /// Lowest phase voltage below limits
    Undervoltage,
    /// Highest phase voltage above limits
    Overvoltage,
    /// Highest phase current above rated load
    Overload,
    /// Phase currents deviate from their average
    PhaseImbalance,
    /// Line frequency drifted from nominal
    FrequencyShift,
    /// Main circuit breaker tripped or faulty
    Breaker,
    /// Power meter not answering
    PowerMeter,
    /// Enclosure opened
    CaseIntrusion,
    /// Node UPS battery fault
    Battery,
    /// Node enclosure temperature too high
    Overheat,
    /// Node's own AC feed lost
    AcLine,
}

impl Condition {
    /// Number of monitored conditions.
    pub const COUNT: usize = 12;

    /// All conditions in index order.
    pub const ALL: [Condition; Condition::COUNT] = [
        Condition::PowerFailure,
        Condition::Undervoltage,
        Condition::Overvoltage,
        Condition::Overload,
        Condition::PhaseImbalance,
        Condition::FrequencyShift,
        Condition::Breaker,
        Condition::PowerMeter,
        Condition::CaseIntrusion,
        Condition::Battery,
        Condition::Overheat,
        Condition::AcLine,
    ];

    /// Position of this condition in a [`ConditionMap`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable machine-readable key.
    pub const fn key(self) -> &'static str {
        match self {
            Self::PowerFailure => "PowerLoss",
            Self::Undervoltage => "Undervoltage",
            Self::Overvoltage => "Overvoltage",
            Self::Overload => "Overload",
            Self::PhaseImbalance => "PhaseShift",
            Self::FrequencyShift => "FrequencyShift",
            Self::Breaker => "CircuitBreaker",
            Self::PowerMeter => "PowerMeterConnectivity",
            Self::CaseIntrusion => "CaseIntrusion",
            Self::Battery => "NodeUPSBattery",
            Self::Overheat => "Overheat",
            Self::AcLine => "NodeACPower",
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::PowerFailure => "Power Loss",
            Self::Undervoltage => "Undervoltage",
            Self::Overvoltage => "Overvoltage",
            Self::Overload => "Overload",
            Self::PhaseImbalance => "Phase Imbalance",
            Self::FrequencyShift => "Frequency Shift",
            Self::Breaker => "Circuit Breaker",
            Self::PowerMeter => "Power Meter Connectivity",
            Self::CaseIntrusion => "Case Intrusion",
            Self::Battery => "Node UPS Battery",
            Self::Overheat => "Overheat",
            Self::AcLine => "Node AC Power",
        }
    }

    /// Measurement unit, or `None` for boolean equipment signals.
    pub const fn unit(self) -> Option<&'static str> {
        match self {
            Self::Undervoltage | Self::Overvoltage => Some("V"),
            Self::Overload => Some("A"),
            Self::PhaseImbalance => Some("%"),
            Self::FrequencyShift => Some("Hz"),
            Self::Overheat => Some("°C"),
            Self::PowerFailure
            | Self::Breaker
            | Self::PowerMeter
            | Self::CaseIntrusion
            | Self::Battery
            | Self::AcLine => None,
        }
    }
}

/// State of a single condition.
///
/// The ordering is only used for display (worst-first sorting); state
/// transitions are driven by the evaluator, never by comparing severity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub enum ConditionState {
    /// Within limits
    #[default]
    Normal,
    /// Past the warning threshold
    Warning,
    /// Past the failure threshold
    Failure,
}

impl ConditionState {
    /// Short display label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "OK",
            Self::Warning => "Warning",
            Self::Failure => "Failure",
        }
    }

    /// Map a boolean health signal to a state.
    pub const fn from_ok(is_ok: bool) -> Self {
        if is_ok {
            Self::Normal
        } else {
            Self::Failure
        }
    }
}

/// Fixed-size mapping from every [`Condition`] to a value.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ConditionMap<T>([T; Condition::COUNT]);

impl<T: Copy> ConditionMap<T> {
    /// Map with every condition set to `value`.
    pub const fn filled(value: T) -> Self {
        Self([value; Condition::COUNT])
    }

    /// Iterate over `(condition, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Condition, T)> + '_ {
        Condition::ALL.iter().map(move |&c| (c, self.0[c.index()]))
    }

    /// Combine two maps entry by entry.
    pub fn zip_with(self, other: Self, f: impl Fn(T, T) -> T) -> Self {
        let mut out = self;
        for c in Condition::ALL {
            out.0[c.index()] = f(self.0[c.index()], other.0[c.index()]);
        }
        out
    }
}

impl<T> Index<Condition> for ConditionMap<T> {
    type Output = T;

    fn index(&self, condition: Condition) -> &T {
        &self.0[condition.index()]
    }
}

impl<T> IndexMut<Condition> for ConditionMap<T> {
    fn index_mut(&mut self, condition: Condition) -> &mut T {
        &mut self.0[condition.index()]
    }
}
