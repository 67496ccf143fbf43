//! Tunable simulation constants.
//!
//! `SimRules` is deserialized straight from the `[simulation]` section of the
//! config file and handed to every transition, so nothing in the model reads
//! a hardcoded rate. Periods are in seconds of simulated time; a period of
//! zero switches that rule off.

use serde::{Deserialize, Serialize};

/// One need loses `step` points each time simulated time crosses a multiple
/// of `period_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayRule {
    pub period_secs: u64,
    pub step: u32,
}

impl DecayRule {
    pub const fn new(period_secs: u64, step: u32) -> Self {
        Self { period_secs, step }
    }
}

/// Minimum pet age and cumulative care needed to enter a growth stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageThreshold {
    pub min_age_secs: u64,
    pub min_care: u32,
}

/// Points gained or spent by the care commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gains {
    pub carrot: u32,
    pub stew: u32,
    pub pet_affection: u32,
    pub play_affection: u32,
    pub play_energy_cost: u32,
    pub sleep_energy: u32,
    pub care_per_action: u32,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            carrot: 40,
            stew: 100,
            pet_affection: 15,
            play_affection: 25,
            play_energy_cost: 20,
            sleep_energy: 60,
            care_per_action: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimRules {
    /// Upper bound of every need level.
    pub max_level: u32,
    pub hunger: DecayRule,
    pub energy: DecayRule,
    pub affection: DecayRule,
    pub hygiene: DecayRule,
    pub fur_max: u32,
    pub fur_period_secs: u64,
    pub meadow_max: u32,
    pub meadow_period_secs: u64,
    pub woods_max: u32,
    pub woods_period_secs: u64,
    /// Trail supply. A hike only turns up a resource once the trail is full.
    pub trail_max: u32,
    pub trail_period_secs: u64,
    pub carrot_spoil_secs: u64,
    pub stew_spoil_secs: u64,
    pub hatch: StageThreshold,
    pub juvenile: StageThreshold,
    pub adult: StageThreshold,
    pub gains: Gains,
    /// How often the pet switches what it is doing when you look at it.
    pub activity_period_secs: u64,
    pub name_max_len: usize,
    /// Delay between owning ✂️ and the ghost's visit.
    pub visit_delay_secs: u64,
}

const HOUR: u64 = 60 * 60;

impl Default for SimRules {
    fn default() -> Self {
        Self {
            max_level: 100,
            hunger: DecayRule::new(900, 1),
            energy: DecayRule::new(1200, 1),
            affection: DecayRule::new(1800, 1),
            hygiene: DecayRule::new(1764, 1),
            fur_max: 7,
            fur_period_secs: HOUR,
            meadow_max: 7,
            meadow_period_secs: HOUR,
            woods_max: 7,
            woods_period_secs: HOUR,
            trail_max: 23,
            trail_period_secs: HOUR,
            carrot_spoil_secs: 48 * HOUR,
            stew_spoil_secs: 24 * HOUR,
            hatch: StageThreshold {
                min_age_secs: 0,
                min_care: 1,
            },
            juvenile: StageThreshold {
                min_age_secs: 24 * HOUR,
                min_care: 15,
            },
            adult: StageThreshold {
                min_age_secs: 72 * HOUR,
                min_care: 50,
            },
            gains: Gains::default(),
            activity_period_secs: 15 * 60,
            name_max_len: 24,
            visit_delay_secs: 2 * HOUR,
        }
    }
}

impl SimRules {
    /// Reject rule sets the model cannot honour.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_level == 0 {
            return Err("simulation.max_level must be greater than zero".to_string());
        }
        if self.fur_max == 0 || self.meadow_max == 0 || self.woods_max == 0 || self.trail_max == 0
        {
            return Err("simulation growth caps must be greater than zero".to_string());
        }
        if self.hatch.min_care == 0 {
            return Err("simulation.hatch.min_care must be at least 1".to_string());
        }
        let ordered = self.hatch.min_age_secs <= self.juvenile.min_age_secs
            && self.juvenile.min_age_secs <= self.adult.min_age_secs
            && self.hatch.min_care <= self.juvenile.min_care
            && self.juvenile.min_care <= self.adult.min_care;
        if !ordered {
            return Err("simulation stage thresholds must be non-decreasing".to_string());
        }
        if self.name_max_len == 0 {
            return Err("simulation.name_max_len must be greater than zero".to_string());
        }
        Ok(())
    }
}
