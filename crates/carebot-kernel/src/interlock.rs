//! [`ContactInterlock`] – contact-force safety rules.
//!
//! After every downward arm step the actuation code hands the latest
//! [`ContactReading`] to [`ContactInterlock::evaluate`].  Rules run in
//! insertion order; the first one that reports [`ContactVerdict::Overpressed`]
//! wins and the caller must back the gripper off before continuing.

use carebot_types::ContactReading;
use tracing::warn;

/// Force above which the gripper is considered to be pressing too hard.
pub const DEFAULT_FORCE_LIMIT: f64 = 200.0;

/// Outcome of evaluating a contact reading.
#[derive(Debug, Clone, PartialEq)]
pub enum ContactVerdict {
    /// No rule objected.
    Clear,
    /// A rule found the gripper pressing harder than allowed.
    Overpressed {
        rule: String,
        force: f64,
        limit: f64,
    },
}

impl ContactVerdict {
    pub fn is_clear(&self) -> bool {
        matches!(self, ContactVerdict::Clear)
    }
}

/// A single condition on contact readings.
pub trait ContactRule: Send + Sync {
    /// Name used in logs and verdicts.
    fn name(&self) -> &str;

    fn evaluate(&self, reading: &ContactReading) -> ContactVerdict;
}

/// Trips when the most recent force sample is strictly above `max_force`.
/// A reading with no samples never trips.
#[derive(Debug, Clone, Copy)]
pub struct ForceLimitRule {
    pub max_force: f64,
}

impl Default for ForceLimitRule {
    fn default() -> Self {
        Self {
            max_force: DEFAULT_FORCE_LIMIT,
        }
    }
}

impl ContactRule for ForceLimitRule {
    fn name(&self) -> &str {
        "force_limit"
    }

    fn evaluate(&self, reading: &ContactReading) -> ContactVerdict {
        match reading.latest_force() {
            Some(force) if force > self.max_force => ContactVerdict::Overpressed {
                rule: self.name().to_string(),
                force,
                limit: self.max_force,
            },
            _ => ContactVerdict::Clear,
        }
    }
}

/// Ordered set of [`ContactRule`]s.
///
/// # Example
///
/// ```
/// use carebot_kernel::{ContactInterlock, ContactVerdict};
/// use carebot_types::ContactReading;
///
/// let interlock = ContactInterlock::with_force_limit(200.0);
///
/// let light = ContactReading { proportion: 0.0, forces: vec![150.0] };
/// assert_eq!(interlock.evaluate(&light), ContactVerdict::Clear);
///
/// let hard = ContactReading { proportion: 0.0, forces: vec![150.0, 260.0] };
/// assert!(!interlock.evaluate(&hard).is_clear());
/// ```
#[derive(Default)]
pub struct ContactInterlock {
    rules: Vec<Box<dyn ContactRule>>,
}

impl ContactInterlock {
    /// An interlock with no rules; every reading is clear.
    pub fn new() -> Self {
        Self::default()
    }

    /// An interlock holding a single [`ForceLimitRule`].
    pub fn with_force_limit(max_force: f64) -> Self {
        let mut interlock = Self::new();
        interlock.add_rule(Box::new(ForceLimitRule { max_force }));
        interlock
    }

    pub fn add_rule(&mut self, rule: Box<dyn ContactRule>) {
        self.rules.push(rule);
    }

    /// Evaluate `reading` against every rule; return the first objection.
    pub fn evaluate(&self, reading: &ContactReading) -> ContactVerdict {
        for rule in &self.rules {
            let verdict = rule.evaluate(reading);
            if let ContactVerdict::Overpressed { force, limit, .. } = &verdict {
                warn!(rule = rule.name(), force, limit, "contact interlock tripped");
                return verdict;
            }
        }
        ContactVerdict::Clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(forces: &[f64]) -> ContactReading {
        ContactReading {
            proportion: 0.0,
            forces: forces.to_vec(),
        }
    }

    #[test]
    fn empty_interlock_is_always_clear() {
        let interlock = ContactInterlock::new();
        assert!(interlock.evaluate(&reading(&[10_000.0])).is_clear());
    }

    #[test]
    fn limit_is_exclusive() {
        let rule = ForceLimitRule::default();
        assert!(rule.evaluate(&reading(&[200.0])).is_clear());
        assert!(!rule.evaluate(&reading(&[200.1])).is_clear());
    }

    #[test]
    fn only_latest_sample_counts() {
        let rule = ForceLimitRule::default();
        assert!(rule.evaluate(&reading(&[900.0, 50.0])).is_clear());
        assert!(!rule.evaluate(&reading(&[50.0, 900.0])).is_clear());
    }

    #[test]
    fn no_samples_is_clear() {
        let rule = ForceLimitRule::default();
        assert!(rule.evaluate(&reading(&[])).is_clear());
    }

    #[test]
    fn verdict_names_the_rule() {
        let interlock = ContactInterlock::with_force_limit(100.0);
        match interlock.evaluate(&reading(&[150.0])) {
            ContactVerdict::Overpressed { rule, force, limit } => {
                assert_eq!(rule, "force_limit");
                assert_eq!(force, 150.0);
                assert_eq!(limit, 100.0);
            }
            ContactVerdict::Clear => panic!("expected Overpressed"),
        }
    }

    #[test]
    fn first_objecting_rule_wins() {
        let mut interlock = ContactInterlock::new();
        interlock.add_rule(Box::new(ForceLimitRule { max_force: 500.0 }));
        interlock.add_rule(Box::new(ForceLimitRule { max_force: 100.0 }));
        match interlock.evaluate(&reading(&[300.0])) {
            ContactVerdict::Overpressed { limit, .. } => assert_eq!(limit, 100.0),
            ContactVerdict::Clear => panic!("expected Overpressed"),
        }
    }
}
