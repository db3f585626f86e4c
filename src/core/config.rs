/// Engine configuration: pacing constants, ending odds and gate policy.
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::session::SessionState;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Additive probability terms for forcing an ending once the minimum
/// number of sections has been seen. The sum is not clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndingOdds {
    pub base: f64,
    /// `(flag, weight)`: weight multiplied by the flag's numeric value.
    #[serde(default)]
    pub per_unit: Vec<(String, f64)>,
    /// `(flag, weight)`: weight added when the flag is truthy.
    #[serde(default)]
    pub flag_bonus: Vec<(String, f64)>,
}

impl Default for EndingOdds {
    fn default() -> Self {
        Self {
            base: 0.10,
            per_unit: vec![("wish_count".to_string(), 0.15)],
            flag_bonus: vec![
                ("son_returned".to_string(), 0.20),
                ("knock_heard".to_string(), 0.10),
            ],
        }
    }
}

impl EndingOdds {
    pub fn chance(&self, session: &SessionState) -> f64 {
        let units: f64 = self
            .per_unit
            .iter()
            .map(|(key, weight)| weight * session.flag_number(key))
            .sum();
        let bonus: f64 = self
            .flag_bonus
            .iter()
            .filter(|(key, _)| session.flag_truthy(key))
            .map(|(_, weight)| weight)
            .sum();
        self.base + units + bonus
    }
}

/// Matches when the flag's numeric value is at least `at_least`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRule {
    pub key: String,
    pub at_least: f64,
}

impl TierRule {
    pub fn new(key: &str, at_least: f64) -> Self {
        Self {
            key: key.to_string(),
            at_least,
        }
    }

    pub fn matches(&self, session: &SessionState) -> bool {
        session.flag_number(&self.key) >= self.at_least
    }
}

/// How the gate picks a mini-game tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TierPolicy {
    /// Cycle through every registered game regardless of tier.
    RoundRobin,
    /// Late if any late rule matches, else middle if any middle rule
    /// matches, else early.
    Flags {
        late: Vec<TierRule>,
        middle: Vec<TierRule>,
    },
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::Flags {
            late: vec![TierRule::new("son_dead", 1.0), TierRule::new("wish_count", 2.0)],
            middle: vec![TierRule::new("has_paw", 1.0), TierRule::new("wish_count", 1.0)],
        }
    }
}

/// Unique-section counts above which the narrative phase advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseThresholds {
    pub middle_after: usize,
    pub late_after: usize,
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self {
            middle_after: 8,
            late_after: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_min_sections")]
    pub min_sections_before_ending: usize,
    #[serde(default = "default_capacity_buffer")]
    pub capacity_buffer: usize,
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
    #[serde(default = "default_max_lives")]
    pub max_lives: u32,
    #[serde(default = "default_gate_cadence")]
    pub gate_cadence: u32,
    #[serde(default = "default_reward_cadence")]
    pub life_reward_cadence: u32,
    #[serde(default = "default_true")]
    pub minigames_enabled: bool,
    #[serde(default)]
    pub ending_odds: EndingOdds,
    #[serde(default)]
    pub tier_policy: TierPolicy,
    #[serde(default)]
    pub phases: PhaseThresholds,
}

fn default_min_sections() -> usize {
    30
}

fn default_capacity_buffer() -> usize {
    10
}

fn default_initial_capacity() -> usize {
    60
}

fn default_max_lives() -> u32 {
    3
}

fn default_gate_cadence() -> u32 {
    2
}

fn default_reward_cadence() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_sections_before_ending: default_min_sections(),
            capacity_buffer: default_capacity_buffer(),
            initial_capacity: default_initial_capacity(),
            max_lives: default_max_lives(),
            gate_cadence: default_gate_cadence(),
            life_reward_cadence: default_reward_cadence(),
            minigames_enabled: true,
            ending_odds: EndingOdds::default(),
            tier_policy: TierPolicy::default(),
            phases: PhaseThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a RON file. Missing fields take defaults.
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lives == 0 {
            return Err(ConfigError::Invalid("max_lives must be at least 1".to_string()));
        }
        if self.gate_cadence == 0 {
            return Err(ConfigError::Invalid("gate_cadence must be at least 1".to_string()));
        }
        if self.life_reward_cadence == 0 {
            return Err(ConfigError::Invalid(
                "life_reward_cadence must be at least 1".to_string(),
            ));
        }
        // Starvation recovery only terminates if synthesis can outgrow the visited set.
        if self.capacity_buffer == 0 {
            return Err(ConfigError::Invalid(
                "capacity_buffer must be at least 1".to_string(),
            ));
        }
        if self.phases.late_after < self.phases.middle_after {
            return Err(ConfigError::Invalid(
                "phases.late_after must not precede phases.middle_after".to_string(),
            ));
        }
        Ok(())
    }

    /// Non-ending node count the store is grown to when routing starves.
    pub fn starvation_capacity(&self) -> usize {
        self.min_sections_before_ending + self.capacity_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::value::Value;

    #[test]
    fn defaults_match_bundled_pacing() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.min_sections_before_ending, 30);
        assert_eq!(cfg.max_lives, 3);
        assert_eq!(cfg.gate_cadence, 2);
        assert_eq!(cfg.life_reward_cadence, 10);
        assert_eq!(cfg.starvation_capacity(), 40);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_ron_takes_defaults() {
        let cfg = EngineConfig::parse_ron("(min_sections_before_ending: 5, max_lives: 2)").unwrap();
        assert_eq!(cfg.min_sections_before_ending, 5);
        assert_eq!(cfg.max_lives, 2);
        assert_eq!(cfg.gate_cadence, 2);
        assert_eq!(cfg.ending_odds, EndingOdds::default());
    }

    #[test]
    fn ron_round_trip_with_round_robin() {
        let cfg = EngineConfig {
            tier_policy: TierPolicy::RoundRobin,
            ..EngineConfig::default()
        };
        let text = ron::to_string(&cfg).unwrap();
        let back = EngineConfig::parse_ron(&text).unwrap();
        assert_eq!(back.tier_policy, TierPolicy::RoundRobin);
    }

    #[test]
    fn rejects_zero_cadence() {
        assert!(matches!(
            EngineConfig::parse_ron("(gate_cadence: 0)"),
            Err(ConfigError::Invalid(_))
        ));
        let cfg = EngineConfig {
            capacity_buffer: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn ending_chance_is_additive() {
        let odds = EndingOdds::default();
        let mut session = SessionState::new("S01", 3);
        assert!((odds.chance(&session) - 0.10).abs() < 1e-9);

        session.set_flag("wish_count", Value::Int(2));
        session.set_flag("son_returned", Value::Bool(true));
        session.set_flag("knock_heard", Value::Bool(true));
        // 0.10 + 2 * 0.15 + 0.20 + 0.10
        assert!((odds.chance(&session) - 0.70).abs() < 1e-9);

        session.set_flag("wish_count", Value::Int(6));
        assert!(odds.chance(&session) > 1.0);
    }

    #[test]
    fn tier_rules_read_numbers_and_bools() {
        let mut session = SessionState::new("S01", 3);
        let rule = TierRule::new("has_paw", 1.0);
        assert!(!rule.matches(&session));
        session.set_flag("has_paw", Value::Bool(true));
        assert!(rule.matches(&session));
    }
}
