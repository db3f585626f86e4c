/// Session state: story flags, visited set, choice counter and lives.
///
/// Mutators are crate-private: only the routing controller (choice
/// application, visits) and the mini-game gate (lives) change a session.
use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::config::PhaseThresholds;
use crate::schema::scene::Phase;
use crate::schema::value::{StateMap, Value};

#[derive(Debug, Clone)]
pub struct SessionState {
    flags: FxHashMap<String, Value>,
    current_node_id: String,
    visited: FxHashSet<String>,
    choices_made: u32,
    lives: u32,
    max_lives: u32,
    phase: Phase,
}

impl SessionState {
    /// A fresh session: no flags, nothing visited, full lives.
    pub fn new(start_id: &str, max_lives: u32) -> Self {
        Self {
            flags: FxHashMap::default(),
            current_node_id: start_id.to_string(),
            visited: FxHashSet::default(),
            choices_made: 0,
            lives: max_lives,
            max_lives,
            phase: Phase::Intro,
        }
    }

    pub fn current_node_id(&self) -> &str {
        &self.current_node_id
    }

    pub fn choices_made(&self) -> u32 {
        self.choices_made
    }

    pub fn lives(&self) -> u32 {
        self.lives
    }

    pub fn max_lives(&self) -> u32 {
        self.max_lives
    }

    pub fn is_out_of_lives(&self) -> bool {
        self.lives == 0
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of distinct nodes presented this session.
    pub fn unique_section_count(&self) -> usize {
        self.visited.len()
    }

    pub fn has_visited(&self, id: &str) -> bool {
        self.visited.contains(id)
    }

    pub fn visited(&self) -> &FxHashSet<String> {
        &self.visited
    }

    pub fn flag(&self, key: &str) -> Option<&Value> {
        self.flags.get(key)
    }

    /// Numeric reading of a flag; unset flags read as 0.
    pub fn flag_number(&self, key: &str) -> f64 {
        self.flags.get(key).map(Value::as_number).unwrap_or(0.0)
    }

    pub fn flag_truthy(&self, key: &str) -> bool {
        self.flags.get(key).is_some_and(Value::is_truthy)
    }

    /// True when every required flag holds the required value. An unset
    /// flag satisfies a requirement for a falsy value (`false`, `0`, `""`).
    pub fn meets(&self, precondition: &StateMap) -> bool {
        precondition.iter().all(|(key, required)| match self.flags.get(key) {
            Some(current) => current == required,
            None => !required.is_truthy(),
        })
    }

    pub(crate) fn set_flag(&mut self, key: &str, value: Value) {
        self.flags.insert(key.to_string(), value);
    }

    pub(crate) fn apply(&mut self, mutation: &StateMap) {
        for (key, value) in mutation {
            self.set_flag(key, value.clone());
        }
    }

    /// Increment and return the choice counter.
    pub(crate) fn record_choice(&mut self) -> u32 {
        self.choices_made += 1;
        self.choices_made
    }

    /// Make `id` current. Returns true the first time `id` is seen.
    pub(crate) fn visit(&mut self, id: &str, phases: &PhaseThresholds) -> bool {
        self.current_node_id = id.to_string();
        let fresh = self.visited.insert(id.to_string());
        let count = self.visited.len();
        self.phase = if count > phases.late_after {
            Phase::Late
        } else if count > phases.middle_after {
            Phase::Middle
        } else {
            Phase::Intro
        };
        fresh
    }

    /// Remove one life. Returns false when already at zero.
    pub(crate) fn lose_life(&mut self) -> bool {
        if self.lives == 0 {
            return false;
        }
        self.lives -= 1;
        true
    }

    /// Restore one life. Returns false when already at the cap.
    pub(crate) fn gain_life(&mut self) -> bool {
        if self.lives >= self.max_lives {
            return false;
        }
        self.lives += 1;
        true
    }

    /// Drop to zero lives. Returns false when already at zero.
    pub(crate) fn drain_lives(&mut self) -> bool {
        if self.lives == 0 {
            return false;
        }
        self.lives = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(pairs: &[(&str, Value)]) -> StateMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn new_session_is_blank() {
        let s = SessionState::new("S01", 3);
        assert_eq!(s.current_node_id(), "S01");
        assert_eq!(s.lives(), 3);
        assert_eq!(s.max_lives(), 3);
        assert_eq!(s.choices_made(), 0);
        assert_eq!(s.unique_section_count(), 0);
        assert_eq!(s.phase(), Phase::Intro);
        assert!(!s.is_out_of_lives());
    }

    #[test]
    fn visits_count_unique_ids() {
        let mut s = SessionState::new("S01", 3);
        let phases = PhaseThresholds::default();
        assert!(s.visit("S01", &phases));
        assert!(s.visit("S02", &phases));
        assert!(!s.visit("S01", &phases));
        assert_eq!(s.unique_section_count(), 2);
        assert_eq!(s.current_node_id(), "S01");
        assert!(s.has_visited("S02"));
    }

    #[test]
    fn phase_advances_with_sections() {
        let mut s = SessionState::new("S01", 3);
        let phases = PhaseThresholds {
            middle_after: 2,
            late_after: 4,
        };
        for i in 0..3 {
            s.visit(&format!("N{}", i), &phases);
        }
        assert_eq!(s.phase(), Phase::Middle);
        for i in 3..5 {
            s.visit(&format!("N{}", i), &phases);
        }
        assert_eq!(s.phase(), Phase::Late);
    }

    #[test]
    fn preconditions_match_exact_values() {
        let mut s = SessionState::new("S01", 3);
        let needs_paw = req(&[("has_paw", Value::Bool(true))]);
        assert!(!s.meets(&needs_paw));
        s.apply(&req(&[("has_paw", Value::Bool(true))]));
        assert!(s.meets(&needs_paw));
        assert!(s.meets(&StateMap::default()));
    }

    #[test]
    fn unset_flag_meets_falsy_requirement() {
        let s = SessionState::new("S01", 3);
        assert!(s.meets(&req(&[("warned", Value::Bool(false))])));
        assert!(s.meets(&req(&[("wish_count", Value::Int(0))])));
        assert!(!s.meets(&req(&[("wish_count", Value::Int(1))])));
    }

    #[test]
    fn mutation_overwrites() {
        let mut s = SessionState::new("S01", 3);
        s.apply(&req(&[("wish_count", Value::Int(1))]));
        s.apply(&req(&[("wish_count", Value::Int(2))]));
        assert_eq!(s.flag("wish_count"), Some(&Value::Int(2)));
        assert_eq!(s.flag_number("wish_count"), 2.0);
        assert!(s.flag_truthy("wish_count"));
        assert!(!s.flag_truthy("missing"));
    }

    #[test]
    fn lives_stay_in_bounds() {
        let mut s = SessionState::new("S01", 2);
        assert!(!s.gain_life());
        assert!(s.lose_life());
        assert!(s.lose_life());
        assert!(!s.lose_life());
        assert_eq!(s.lives(), 0);
        assert!(s.is_out_of_lives());
        assert!(s.gain_life());
        assert!(s.drain_lives());
        assert_eq!(s.lives(), 0);
        assert!(!s.drain_lives());
    }

    #[test]
    fn choice_counter_increments() {
        let mut s = SessionState::new("S01", 3);
        assert_eq!(s.record_choice(), 1);
        assert_eq!(s.record_choice(), 2);
        assert_eq!(s.choices_made(), 2);
    }
}
