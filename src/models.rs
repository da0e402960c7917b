//! Data models for harvesting, reference data, prices and computed candidates

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Item identity as used by the reference data source
pub type TypeId = u32;

/// User-supplied harvesting rate model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarvestInput {
    pub cycle_yield_volume: f64,
    pub cycle_time_seconds: f64,
    pub duration_minutes: f64,
}

impl HarvestInput {
    /// Volume harvested over `cycles` completed cycles
    pub fn total_volume(&self, cycles: u64) -> f64 {
        cycles as f64 * self.cycle_yield_volume
    }
}

/// Completed cycles within a requested duration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleResult {
    pub total_seconds: f64,
    pub cycles: u64,
    pub used_seconds: f64,
    pub leftover_seconds: f64,
}

/// One entry of a material breakdown, exactly as the reference data gave it.
///
/// Reference data comes from outside and may be malformed, so identity and
/// quantity are kept wide here and checked by [`MaterialEntry::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialEntry {
    pub material_type_id: i64,
    pub quantity: f64,
}

/// A breakdown entry after validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Breakdown {
    Valid { material_type_id: TypeId, quantity: f64 },
    Invalid,
}

impl MaterialEntry {
    /// Valid only for a positive identity and a positive whole quantity
    pub fn classify(&self) -> Breakdown {
        let id_ok = self.material_type_id > 0 && self.material_type_id <= TypeId::MAX as i64;
        let qty_ok = self.quantity.is_finite() && self.quantity > 0.0 && self.quantity.fract() == 0.0;
        if id_ok && qty_ok {
            Breakdown::Valid {
                material_type_id: self.material_type_id as TypeId,
                quantity: self.quantity,
            }
        } else {
            Breakdown::Invalid
        }
    }
}

/// Slow-changing reference data for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemType {
    pub type_id: TypeId,
    pub name: String,
    pub volume: f64,
    pub portion_size: u32,
    pub materials: Vec<MaterialEntry>,
}

impl ItemType {
    /// Portion size as used for reprocessing; unknown or zero means 1
    pub fn effective_portion_size(&self) -> u64 {
        u64::from(self.portion_size.max(1))
    }

    /// Identities of every well-formed output material
    pub fn output_ids(&self) -> Vec<TypeId> {
        self.materials
            .iter()
            .filter_map(|m| match m.classify() {
                Breakdown::Valid { material_type_id, .. } => Some(material_type_id),
                Breakdown::Invalid => None,
            })
            .collect()
    }
}

/// Point-in-time market snapshot for one item
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub sell_min: Option<f64>,
    pub buy_max: Option<f64>,
}

/// Which side of the market values an item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PriceBasis {
    #[default]
    Sell,
    Buy,
}

/// Prices keyed by identity; an absent identity means "unknown"
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceBook {
    quotes: HashMap<TypeId, PriceQuote>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_id: TypeId, quote: PriceQuote) {
        self.quotes.insert(type_id, quote);
    }

    pub fn get(&self, type_id: TypeId) -> Option<&PriceQuote> {
        self.quotes.get(&type_id)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Unit price on the given side, if known and usable
    pub fn price(&self, type_id: TypeId, basis: PriceBasis) -> Option<f64> {
        let quote = self.quotes.get(&type_id)?;
        let value = match basis {
            PriceBasis::Sell => quote.sell_min,
            PriceBasis::Buy => quote.buy_max,
        }?;
        (value.is_finite() && value >= 0.0).then_some(value)
    }
}

/// Security band of the reprocessing facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SecurityClass {
    High,
    Low,
    Null,
}

impl SecurityClass {
    pub fn modifier_pct(self) -> f64 {
        match self {
            SecurityClass::High => 0.0,
            SecurityClass::Low => 6.0,
            SecurityClass::Null => 12.0,
        }
    }
}

/// Reprocessing rig fitted to the facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RigTier {
    None,
    T1,
    T2,
}

impl RigTier {
    pub fn bonus_points(self) -> f64 {
        match self {
            RigTier::None => 0.0,
            RigTier::T1 => 1.0,
            RigTier::T2 => 3.0,
        }
    }
}

/// Raw reprocessing modifiers as entered by the user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReprocessYieldConfig {
    pub facility_base_pct: f64,
    pub rig_bonus_points: f64,
    pub security_mod_pct: f64,
    pub reprocessing_level: f64,
    pub reprocessing_efficiency_level: f64,
    pub ore_processing_level: f64,
    pub implant_pct: f64,
    pub tax_pct: f64,
}

impl Default for ReprocessYieldConfig {
    fn default() -> Self {
        Self {
            facility_base_pct: 50.0,
            rig_bonus_points: 0.0,
            security_mod_pct: 0.0,
            reprocessing_level: 0.0,
            reprocessing_efficiency_level: 0.0,
            ore_processing_level: 0.0,
            implant_pct: 0.0,
            tax_pct: 0.0,
        }
    }
}

/// A material named by the caller, either directly or by display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MaterialRef {
    Id(TypeId),
    Name(String),
}

/// One reprocessing product of a candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub material_type_id: TypeId,
    pub name: String,
    pub quantity: u64,
    pub unit_price: Option<f64>,
    pub value: Option<f64>,
}

/// Reprocessed value before and after tax
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReprocessValue {
    pub gross: f64,
    pub tax_fee: f64,
    pub net: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RowStatus {
    Complete,
    TypeDataUnavailable(String),
}

/// Full computed result for one candidate material
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRow {
    pub type_id: TypeId,
    pub name: String,
    pub status: RowStatus,
    pub unit_volume: Option<f64>,
    pub units: u64,
    pub units_per_hour: Option<f64>,
    pub portions: u64,
    pub unit_price: Option<f64>,
    pub raw_total: Option<f64>,
    pub raw_per_hour: Option<f64>,
    pub outputs: Vec<OutputRow>,
    pub reprocess: Option<ReprocessValue>,
    pub reprocess_per_hour: Option<f64>,
}

impl CandidateRow {
    pub fn reprocess_net(&self) -> Option<f64> {
        self.reprocess.map(|r| r.net)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    TypeData,
    Price,
}

/// A value that could not be obtained and is reported as unknown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataGap {
    pub type_id: TypeId,
    pub kind: DataKind,
    pub reason: String,
}
