//! Profile file with default harvest, reprocessing and cache settings
//!
//! ```toml
//! [harvest]
//! cycle_yield = 1000.0
//! cycle_time = 92.2
//! minutes = 15
//!
//! [reprocessing]
//! facility_base_pct = 50
//! rig = "t2"
//! security = "null"
//! reprocessing = 5
//! reprocessing_efficiency = 5
//! ore_processing = 4
//! tax_pct = 2.5
//!
//! [cache]
//! price_max_age_minutes = 30
//! ```
//!
//! Every value is optional. Values given on the command line take precedence.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;

use crate::models::{ReprocessYieldConfig, RigTier, SecurityClass};
use crate::provider::CachePolicy;

pub const DEFAULT_CYCLE_TIME_SECONDS: f64 = 60.0;
pub const DEFAULT_PRICE_MAX_AGE_MINUTES: i64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    pub harvest: HarvestSection,
    pub reprocessing: ReprocessingSection,
    pub cache: CacheSection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestSection {
    pub cycle_yield: Option<f64>,
    pub cycle_time: Option<f64>,
    pub minutes: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReprocessingSection {
    pub facility_base_pct: Option<f64>,
    pub rig_bonus_points: Option<f64>,
    pub rig: Option<RigTier>,
    pub security_mod_pct: Option<f64>,
    pub security: Option<SecurityClass>,
    pub reprocessing: Option<f64>,
    pub reprocessing_efficiency: Option<f64>,
    pub ore_processing: Option<f64>,
    pub implant_pct: Option<f64>,
    pub tax_pct: Option<f64>,
}

/// Maximum cache ages; zero disables expiry
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub price_max_age_minutes: Option<i64>,
    pub type_max_age_days: Option<i64>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid profile {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl HarvestSection {
    /// Fill values missing here from `fallback`
    pub fn or(self, fallback: Self) -> Self {
        Self {
            cycle_yield: self.cycle_yield.or(fallback.cycle_yield),
            cycle_time: self.cycle_time.or(fallback.cycle_time),
            minutes: self.minutes.or(fallback.minutes),
        }
    }
}

impl ReprocessingSection {
    /// Fill values missing here from `fallback`.
    ///
    /// An explicit number and a preset for the same modifier travel
    /// together, so a preset given here still beats a number in `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        let (rig_bonus_points, rig) = if self.rig_bonus_points.is_some() || self.rig.is_some() {
            (self.rig_bonus_points, self.rig)
        } else {
            (fallback.rig_bonus_points, fallback.rig)
        };
        let (security_mod_pct, security) = if self.security_mod_pct.is_some() || self.security.is_some() {
            (self.security_mod_pct, self.security)
        } else {
            (fallback.security_mod_pct, fallback.security)
        };

        Self {
            facility_base_pct: self.facility_base_pct.or(fallback.facility_base_pct),
            rig_bonus_points,
            rig,
            security_mod_pct,
            security,
            reprocessing: self.reprocessing.or(fallback.reprocessing),
            reprocessing_efficiency: self.reprocessing_efficiency.or(fallback.reprocessing_efficiency),
            ore_processing: self.ore_processing.or(fallback.ore_processing),
            implant_pct: self.implant_pct.or(fallback.implant_pct),
            tax_pct: self.tax_pct.or(fallback.tax_pct),
        }
    }

    pub fn to_config(&self) -> ReprocessYieldConfig {
        let defaults = ReprocessYieldConfig::default();
        ReprocessYieldConfig {
            facility_base_pct: self.facility_base_pct.unwrap_or(defaults.facility_base_pct),
            rig_bonus_points: self
                .rig_bonus_points
                .or(self.rig.map(RigTier::bonus_points))
                .unwrap_or(defaults.rig_bonus_points),
            security_mod_pct: self
                .security_mod_pct
                .or(self.security.map(SecurityClass::modifier_pct))
                .unwrap_or(defaults.security_mod_pct),
            reprocessing_level: self.reprocessing.unwrap_or(defaults.reprocessing_level),
            reprocessing_efficiency_level: self
                .reprocessing_efficiency
                .unwrap_or(defaults.reprocessing_efficiency_level),
            ore_processing_level: self.ore_processing.unwrap_or(defaults.ore_processing_level),
            implant_pct: self.implant_pct.unwrap_or(defaults.implant_pct),
            tax_pct: self.tax_pct.unwrap_or(defaults.tax_pct),
        }
    }
}

fn max_age(value: Option<i64>, default: Option<Duration>, unit: fn(i64) -> Duration) -> Option<Duration> {
    match value {
        None => default,
        Some(v) if v <= 0 => None,
        Some(v) => Some(unit(v)),
    }
}

impl CacheSection {
    pub fn or(self, fallback: Self) -> Self {
        Self {
            price_max_age_minutes: self.price_max_age_minutes.or(fallback.price_max_age_minutes),
            type_max_age_days: self.type_max_age_days.or(fallback.type_max_age_days),
        }
    }

    pub fn to_policy(&self) -> CachePolicy {
        CachePolicy {
            price_max_age: max_age(
                self.price_max_age_minutes,
                Some(Duration::minutes(DEFAULT_PRICE_MAX_AGE_MINUTES)),
                Duration::minutes,
            ),
            type_max_age: max_age(self.type_max_age_days, None, Duration::days),
        }
    }
}
