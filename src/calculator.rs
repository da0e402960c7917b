//! Harvest, reprocessing and valuation calculator logic
//!
//! Every function here is pure. [`calculate`] is the only entry point that
//! talks to data providers, and it does so once per pass before handing
//! plain data to the rest of the engine.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CalcError, ProviderError};
use crate::models::{
    Breakdown, CandidateRow, CycleResult, DataGap, DataKind, HarvestInput, ItemType,
    MaterialEntry, MaterialRef, OutputRow, PriceBasis, PriceBook, ReprocessValue,
    ReprocessYieldConfig, RowStatus, TypeId,
};
use crate::provider::{NameResolver, PriceProvider, TypeDataProvider};

/// Added before flooring so quotients that should be whole do not lose a unit
pub const FLOOR_EPSILON: f64 = 1e-9;

const SECONDS_PER_HOUR: f64 = 3600.0;

const MAX_SKILL_LEVEL: f64 = 5.0;
const REPROCESSING_BONUS_PER_LEVEL: f64 = 0.03;
const EFFICIENCY_BONUS_PER_LEVEL: f64 = 0.02;
const ORE_PROCESSING_BONUS_PER_LEVEL: f64 = 0.02;

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Split a duration into whole cycles and leftover time.
///
/// Partial cycles are never counted. A non-positive cycle time yields zero
/// cycles with the whole duration left over.
pub fn count_cycles(duration_minutes: f64, cycle_time_seconds: f64) -> CycleResult {
    let total_seconds = (finite_or_zero(duration_minutes) * 60.0).max(0.0);

    if !cycle_time_seconds.is_finite() || cycle_time_seconds <= 0.0 {
        return CycleResult {
            total_seconds,
            cycles: 0,
            used_seconds: 0.0,
            leftover_seconds: total_seconds,
        };
    }

    let mut cycles = (total_seconds / cycle_time_seconds).floor() as u64;
    let mut used_seconds = cycles as f64 * cycle_time_seconds;
    // the quotient can land either side of an integer; settle on the largest
    // count whose used time stays within the duration
    while cycles > 0 && used_seconds > total_seconds {
        cycles -= 1;
        used_seconds = cycles as f64 * cycle_time_seconds;
    }
    while (cycles + 1) as f64 * cycle_time_seconds <= total_seconds {
        cycles += 1;
        used_seconds = cycles as f64 * cycle_time_seconds;
    }

    CycleResult {
        total_seconds,
        cycles,
        used_seconds,
        leftover_seconds: total_seconds - used_seconds,
    }
}

/// Whole units of `unit_volume` that fit into `total_volume`
pub fn units_from_volume(total_volume: f64, unit_volume: f64) -> u64 {
    if !unit_volume.is_finite() || unit_volume <= 0.0 {
        return 0;
    }
    if !total_volume.is_finite() || total_volume <= 0.0 {
        return 0;
    }
    (total_volume / unit_volume + FLOOR_EPSILON).floor() as u64
}

/// Output quantity of one material from reprocessing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaterialYield {
    pub material_type_id: TypeId,
    pub quantity: u64,
}

/// Result of reprocessing a batch of units
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reprocessed {
    pub portions: u64,
    /// Largest quantity first, then ascending material id
    pub outputs: Vec<MaterialYield>,
}

/// Reprocess `units` in whole portions at `yield_fraction` efficiency.
///
/// Malformed breakdown entries are dropped. Entries that round down to zero
/// are kept.
pub fn reprocess(
    units: u64,
    portion_size: u64,
    breakdown: &[MaterialEntry],
    yield_fraction: f64,
) -> Reprocessed {
    let portions = units / portion_size.max(1);
    let fraction = finite_or_zero(yield_fraction).clamp(0.0, 1.0);

    let mut outputs: Vec<MaterialYield> = breakdown
        .iter()
        .filter_map(|entry| match entry.classify() {
            Breakdown::Valid {
                material_type_id,
                quantity,
            } => Some(MaterialYield {
                material_type_id,
                quantity: (portions as f64 * quantity * fraction + FLOOR_EPSILON).floor() as u64,
            }),
            Breakdown::Invalid => None,
        })
        .collect();

    outputs.sort_by(|a, b| {
        b.quantity
            .cmp(&a.quantity)
            .then(a.material_type_id.cmp(&b.material_type_id))
    });

    Reprocessed { portions, outputs }
}

/// Skill level truncated to a whole level in 0..=5
pub fn skill_level(raw: f64) -> f64 {
    finite_or_zero(raw).trunc().clamp(0.0, MAX_SKILL_LEVEL)
}

/// Effective reprocessing yield as a fraction in [0, 1].
///
/// The security modifier only counts when a rig bonus is present.
pub fn effective_yield(config: &ReprocessYieldConfig) -> f64 {
    let rig = finite_or_zero(config.rig_bonus_points);
    let security = finite_or_zero(config.security_mod_pct);

    let mut base_yield = (finite_or_zero(config.facility_base_pct) + rig) / 100.0;
    if rig > 0.0 && security > 0.0 {
        base_yield *= 1.0 + security / 100.0;
    }

    let effective = base_yield
        * (1.0 + REPROCESSING_BONUS_PER_LEVEL * skill_level(config.reprocessing_level))
        * (1.0 + EFFICIENCY_BONUS_PER_LEVEL * skill_level(config.reprocessing_efficiency_level))
        * (1.0 + ORE_PROCESSING_BONUS_PER_LEVEL * skill_level(config.ore_processing_level))
        * (1.0 + finite_or_zero(config.implant_pct) / 100.0);

    effective.clamp(0.0, 1.0)
}

/// Normalize a total over `used_seconds` to an hourly rate
pub fn per_hour(total: Option<f64>, used_seconds: f64) -> Option<f64> {
    let total = total?;
    (used_seconds > 0.0).then(|| total * (SECONDS_PER_HOUR / used_seconds))
}

/// Attach names and prices to reprocessing outputs
pub fn price_outputs(
    outputs: &[MaterialYield],
    names: &HashMap<TypeId, String>,
    prices: &PriceBook,
    basis: PriceBasis,
) -> Vec<OutputRow> {
    outputs
        .iter()
        .map(|out| {
            let unit_price = prices.price(out.material_type_id, basis);
            OutputRow {
                material_type_id: out.material_type_id,
                name: display_name(names, out.material_type_id),
                quantity: out.quantity,
                unit_price,
                value: unit_price.map(|p| out.quantity as f64 * p),
            }
        })
        .collect()
}

/// Sum the priced outputs and apply tax.
///
/// Unpriced rows add nothing. With no priced row at all the value is unknown.
pub fn reprocess_value(outputs: &[OutputRow], tax_pct: f64) -> Option<ReprocessValue> {
    let mut priced = outputs.iter().filter_map(|o| o.value).peekable();
    priced.peek()?;

    let gross: f64 = priced.sum();
    let tax = finite_or_zero(tax_pct).max(0.0);
    let tax_fee = if tax == 0.0 { 0.0 } else { gross * (tax / 100.0) };
    Some(ReprocessValue {
        gross,
        tax_fee,
        net: gross - tax_fee,
    })
}

fn display_name(names: &HashMap<TypeId, String>, type_id: TypeId) -> String {
    names
        .get(&type_id)
        .cloned()
        .unwrap_or_else(|| format!("Type {}", type_id))
}

/// Shared inputs for building every candidate of one pass
#[derive(Debug, Clone, Copy)]
pub struct ValuationContext<'a> {
    pub harvest: &'a HarvestInput,
    pub cycles: &'a CycleResult,
    pub yield_fraction: f64,
    pub tax_pct: f64,
    pub prices: &'a PriceBook,
    pub basis: PriceBasis,
    pub names: &'a HashMap<TypeId, String>,
}

/// Compute the full row for one harvested material
pub fn build_candidate(item: &ItemType, ctx: &ValuationContext<'_>) -> CandidateRow {
    let used = ctx.cycles.used_seconds;
    let total_volume = ctx.harvest.total_volume(ctx.cycles.cycles);
    let units = units_from_volume(total_volume, item.volume);

    let reprocessed = reprocess(
        units,
        item.effective_portion_size(),
        &item.materials,
        ctx.yield_fraction,
    );
    let outputs = price_outputs(&reprocessed.outputs, ctx.names, ctx.prices, ctx.basis);
    let reprocess = reprocess_value(&outputs, ctx.tax_pct);

    let unit_price = ctx.prices.price(item.type_id, ctx.basis);
    let raw_total = unit_price.map(|p| units as f64 * p);

    CandidateRow {
        type_id: item.type_id,
        name: item.name.clone(),
        status: RowStatus::Complete,
        unit_volume: Some(item.volume),
        units,
        units_per_hour: per_hour(Some(units as f64), used),
        portions: reprocessed.portions,
        unit_price,
        raw_total,
        raw_per_hour: per_hour(raw_total, used),
        outputs,
        reprocess,
        reprocess_per_hour: per_hour(reprocess.map(|r| r.net), used),
    }
}

/// Placeholder row for a candidate whose reference data could not be fetched
pub fn unavailable_candidate(type_id: TypeId, name: String, reason: String) -> CandidateRow {
    CandidateRow {
        type_id,
        name,
        status: RowStatus::TypeDataUnavailable(reason),
        unit_volume: None,
        units: 0,
        units_per_hour: None,
        portions: 0,
        unit_price: None,
        raw_total: None,
        raw_per_hour: None,
        outputs: Vec::new(),
        reprocess: None,
        reprocess_per_hour: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    Name,
    Units,
    RawPerHour,
    ReprocessPerHour,
    RawTotal,
    ReprocessNet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Numeric sort value; unknown counts as zero for ordering only
fn sort_value(row: &CandidateRow, key: SortKey) -> f64 {
    let value = match key {
        SortKey::Name => None,
        SortKey::Units => Some(row.units as f64),
        SortKey::RawPerHour => row.raw_per_hour,
        SortKey::ReprocessPerHour => row.reprocess_per_hour,
        SortKey::RawTotal => row.raw_total,
        SortKey::ReprocessNet => row.reprocess_net(),
    };
    value.unwrap_or(0.0)
}

fn compare_rows(a: &CandidateRow, b: &CandidateRow, key: SortKey, direction: SortDirection) -> Ordering {
    let ord = match key {
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        _ => sort_value(a, key).total_cmp(&sort_value(b, key)),
    };
    match direction {
        SortDirection::Ascending => ord,
        SortDirection::Descending => ord.reverse(),
    }
}

/// Indices of `rows` in ranked order; ties keep input order
pub fn rank(rows: &[CandidateRow], key: SortKey, direction: SortDirection) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| compare_rows(&rows[a], &rows[b], key, direction));
    order
}

/// Stable in-place sort of candidate rows
pub fn sort_rows(rows: &mut [CandidateRow], key: SortKey, direction: SortDirection) {
    rows.sort_by(|a, b| compare_rows(a, b, key, direction));
}

/// Row with the best reprocessed value per hour, first one on ties
pub fn select_default(rows: &[CandidateRow]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, row) in rows.iter().enumerate() {
        let value = row.reprocess_per_hour.filter(|v| v.is_finite()).unwrap_or(0.0);
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Honour an explicit selection when it is among the rows
pub fn select(rows: &[CandidateRow], preferred: Option<TypeId>) -> Option<usize> {
    preferred
        .and_then(|id| rows.iter().position(|row| row.type_id == id))
        .or_else(|| select_default(rows))
}

/// Everything needed for one calculation pass
#[derive(Debug, Clone, PartialEq)]
pub struct CalcRequest {
    pub harvest: HarvestInput,
    pub materials: Vec<MaterialRef>,
    pub yield_config: ReprocessYieldConfig,
    pub price_basis: PriceBasis,
}

/// Computed result of a pass that harvested something
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calculation {
    pub harvest: HarvestInput,
    pub cycles: CycleResult,
    pub total_volume: f64,
    pub yield_fraction: f64,
    pub tax_pct: f64,
    pub price_basis: PriceBasis,
    pub rows: Vec<CandidateRow>,
    pub gaps: Vec<DataGap>,
}

impl Calculation {
    /// Raw value over all candidates; unknown rows add nothing
    pub fn combined_raw_total(&self) -> f64 {
        self.rows.iter().filter_map(|r| r.raw_total).sum()
    }

    /// Net reprocessed value over all candidates; unknown rows add nothing
    pub fn combined_reprocess_net(&self) -> f64 {
        self.rows.iter().filter_map(|r| r.reprocess_net()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CalcOutcome {
    /// The duration does not cover a single cycle
    NothingHarvested { cycles: CycleResult },
    Computed(Calculation),
}

fn validate(request: &CalcRequest) -> Result<(), CalcError> {
    let harvest = &request.harvest;

    if !harvest.cycle_time_seconds.is_finite() || harvest.cycle_time_seconds <= 0.0 {
        return Err(CalcError::InvalidInput(format!(
            "cycle time must be a positive number of seconds, got {}",
            harvest.cycle_time_seconds
        )));
    }
    if !harvest.cycle_yield_volume.is_finite() || harvest.cycle_yield_volume <= 0.0 {
        return Err(CalcError::InvalidInput(format!(
            "cycle yield must be a positive volume, got {}",
            harvest.cycle_yield_volume
        )));
    }
    if !harvest.duration_minutes.is_finite() {
        return Err(CalcError::InvalidInput(format!(
            "duration must be a number of minutes, got {}",
            harvest.duration_minutes
        )));
    }
    if request.materials.is_empty() {
        return Err(CalcError::InvalidInput("no material given".to_string()));
    }
    Ok(())
}

/// Map every reference to an identity, stopping at the first failure.
///
/// Returns identities in request order without duplicates, with the name the
/// caller used where there was one.
fn resolve_materials(
    refs: &[MaterialRef],
    names: &dyn NameResolver,
) -> Result<Vec<(TypeId, Option<String>)>, CalcError> {
    let mut resolved: Vec<(TypeId, Option<String>)> = Vec::with_capacity(refs.len());

    for material in refs {
        let (type_id, label) = match material {
            MaterialRef::Id(0) => {
                return Err(CalcError::InvalidInput("material id must be positive".to_string()));
            }
            MaterialRef::Id(id) => (*id, None),
            MaterialRef::Name(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(CalcError::InvalidInput("empty material name".to_string()));
                }
                let id = names.resolve(name).map_err(|e| CalcError::ResolutionFailure {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
                debug!("Resolved '{}' to type {}", name, id);
                (id, Some(name.to_string()))
            }
        };

        if !resolved.iter().any(|(id, _)| *id == type_id) {
            resolved.push((type_id, label));
        }
    }

    Ok(resolved)
}

/// Run one full calculation pass.
///
/// Invalid input and unresolvable names abort the pass. Missing reference
/// data or prices only turn the affected values into unknowns.
pub fn calculate(
    request: &CalcRequest,
    types: &dyn TypeDataProvider,
    prices: &dyn PriceProvider,
    names: &dyn NameResolver,
) -> Result<CalcOutcome, CalcError> {
    validate(request)?;
    let candidates = resolve_materials(&request.materials, names)?;

    let harvest = request.harvest;
    let cycles = count_cycles(harvest.duration_minutes, harvest.cycle_time_seconds);
    debug!(
        "{} cycles in {}s ({}s left over)",
        cycles.cycles, cycles.total_seconds, cycles.leftover_seconds
    );
    if cycles.cycles == 0 {
        return Ok(CalcOutcome::NothingHarvested { cycles });
    }

    let mut gaps = Vec::new();
    let mut display_names: HashMap<TypeId, String> = HashMap::new();

    let fetched: Vec<(TypeId, Option<String>, Result<ItemType, ProviderError>)> = candidates
        .into_iter()
        .map(|(id, label)| (id, label, types.fetch_type(id)))
        .collect();

    for (id, _, item) in &fetched {
        match item {
            Ok(item) => {
                display_names.insert(*id, item.name.clone());
            }
            Err(e) => {
                warn!("Type data for {} unavailable: {}", id, e);
                gaps.push(DataGap {
                    type_id: *id,
                    kind: DataKind::TypeData,
                    reason: e.to_string(),
                });
            }
        }
    }

    let output_ids: BTreeSet<TypeId> = fetched
        .iter()
        .filter_map(|(_, _, item)| item.as_ref().ok())
        .flat_map(|item| item.output_ids())
        .collect();

    for &id in &output_ids {
        if display_names.contains_key(&id) {
            continue;
        }
        match types.fetch_type(id) {
            Ok(item) => {
                display_names.insert(id, item.name);
            }
            Err(e) => {
                warn!("Name of output material {} unavailable: {}", id, e);
                gaps.push(DataGap {
                    type_id: id,
                    kind: DataKind::TypeData,
                    reason: e.to_string(),
                });
            }
        }
    }

    let mut price_ids: Vec<TypeId> = fetched.iter().map(|(id, _, _)| *id).collect();
    for &id in &output_ids {
        if !price_ids.contains(&id) {
            price_ids.push(id);
        }
    }

    let book = match prices.fetch_prices(&price_ids) {
        Ok(book) => {
            for &id in &price_ids {
                if book.price(id, request.price_basis).is_none() {
                    gaps.push(DataGap {
                        type_id: id,
                        kind: DataKind::Price,
                        reason: "no usable price".to_string(),
                    });
                }
            }
            book
        }
        Err(e) => {
            warn!("Price lookup failed: {}", e);
            gaps.extend(price_ids.iter().map(|&id| DataGap {
                type_id: id,
                kind: DataKind::Price,
                reason: e.to_string(),
            }));
            PriceBook::new()
        }
    };

    let yield_fraction = effective_yield(&request.yield_config);
    let tax_pct = finite_or_zero(request.yield_config.tax_pct).max(0.0);
    let ctx = ValuationContext {
        harvest: &harvest,
        cycles: &cycles,
        yield_fraction,
        tax_pct,
        prices: &book,
        basis: request.price_basis,
        names: &display_names,
    };

    let rows = fetched
        .into_iter()
        .map(|(id, label, item)| match item {
            Ok(item) => build_candidate(&item, &ctx),
            Err(e) => unavailable_candidate(
                id,
                label.unwrap_or_else(|| format!("Type {}", id)),
                e.to_string(),
            ),
        })
        .collect();

    Ok(CalcOutcome::Computed(Calculation {
        harvest,
        total_volume: harvest.total_volume(cycles.cycles),
        cycles,
        yield_fraction,
        tax_pct,
        price_basis: request.price_basis,
        rows,
        gaps,
    }))
}

/// Format an amount with thousands separators; unknown stays visibly unknown
pub fn format_amount(value: Option<f64>) -> String {
    let Some(value) = value else {
        return "unknown".to_string();
    };
    let text = format!("{:.2}", value.abs());
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if value < 0.0 && text != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, group_thousands(whole), frac)
}

pub fn format_count(value: u64) -> String {
    group_thousands(&value.to_string())
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Text report of a calculation: ranked comparison plus one candidate in detail
#[derive(Debug)]
pub struct Report<'a> {
    pub calculation: &'a Calculation,
    pub order: Vec<usize>,
    pub selected: Option<usize>,
}

impl<'a> Report<'a> {
    pub fn new(
        calculation: &'a Calculation,
        key: SortKey,
        direction: SortDirection,
        preferred: Option<TypeId>,
    ) -> Self {
        Self {
            order: rank(&calculation.rows, key, direction),
            selected: select(&calculation.rows, preferred),
            calculation,
        }
    }
}

impl std::fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let calc = self.calculation;
        let cycles = &calc.cycles;

        writeln!(f, "=== Harvest Summary ===")?;
        writeln!(
            f,
            "Cycles: {} x {:.1}s ({:.1}s used, {:.1}s left over)",
            cycles.cycles, calc.harvest.cycle_time_seconds, cycles.used_seconds, cycles.leftover_seconds
        )?;
        writeln!(f, "Volume harvested: {:.2} m3", calc.total_volume)?;
        writeln!(
            f,
            "Reprocessing yield: {:.2}%  tax: {:.2}%",
            calc.yield_fraction * 100.0,
            calc.tax_pct
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "{:<24} {:>12} {:>18} {:>18} {:>18} {:>18}",
            "Material", "Units", "Raw value", "Raw/h", "Reprocessed net", "Reprocessed/h"
        )?;
        writeln!(f, "{}", "-".repeat(113))?;
        for &idx in &self.order {
            let row = &calc.rows[idx];
            let marker = if Some(idx) == self.selected { "*" } else { " " };
            writeln!(
                f,
                "{}{:<23} {:>12} {:>18} {:>18} {:>18} {:>18}",
                marker,
                row.name,
                format_count(row.units),
                format_amount(row.raw_total),
                format_amount(row.raw_per_hour),
                format_amount(row.reprocess_net()),
                format_amount(row.reprocess_per_hour),
            )?;
        }

        if calc.rows.len() > 1 {
            writeln!(f)?;
            writeln!(
                f,
                "Combined: raw {}  reprocessed net {}",
                format_amount(Some(calc.combined_raw_total())),
                format_amount(Some(calc.combined_reprocess_net()))
            )?;
        }

        let Some(row) = self.selected.map(|idx| &calc.rows[idx]) else {
            return Ok(());
        };

        writeln!(f)?;
        writeln!(f, "=== {} (#{}) ===", row.name, row.type_id)?;
        if let RowStatus::TypeDataUnavailable(reason) = &row.status {
            writeln!(f, "Reference data unavailable: {}", reason)?;
            return Ok(());
        }
        writeln!(
            f,
            "Units: {} ({} portions)  unit price: {}",
            format_count(row.units),
            format_count(row.portions),
            format_amount(row.unit_price)
        )?;
        if row.outputs.is_empty() {
            writeln!(f, "Not reprocessable")?;
            return Ok(());
        }

        writeln!(f, "{:<24} {:>14} {:>14} {:>18}", "Output", "Quantity", "Unit price", "Value")?;
        for out in &row.outputs {
            writeln!(
                f,
                "  {:<22} {:>14} {:>14} {:>18}",
                out.name,
                format_count(out.quantity),
                format_amount(out.unit_price),
                format_amount(out.value)
            )?;
        }
        match row.reprocess {
            Some(value) => {
                writeln!(f, "Gross: {}", format_amount(Some(value.gross)))?;
                writeln!(f, "Tax:   {}", format_amount(Some(value.tax_fee)))?;
                writeln!(f, "Net:   {}", format_amount(Some(value.net)))?;
            }
            None => writeln!(f, "Reprocessed value: unknown")?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn entry(id: i64, qty: f64) -> MaterialEntry {
        MaterialEntry {
            material_type_id: id,
            quantity: qty,
        }
    }

    fn row(name: &str, units: u64, reprocess_per_hour: Option<f64>) -> CandidateRow {
        let mut row = unavailable_candidate(1, name.to_string(), String::new());
        row.status = RowStatus::Complete;
        row.units = units;
        row.reprocess_per_hour = reprocess_per_hour;
        row
    }

    #[test]
    fn cycles_discard_partial_cycle() {
        let c = count_cycles(15.0, 92.2);
        assert!(close(c.total_seconds, 900.0));
        assert_eq!(c.cycles, 9);
        assert!(close(c.used_seconds, 829.8));
        assert!(close(c.used_seconds + c.leftover_seconds, c.total_seconds));
        assert!(c.leftover_seconds >= 0.0 && c.leftover_seconds < 92.2);
    }

    #[test]
    fn cycles_zero_for_non_positive_cycle_time() {
        assert_eq!(count_cycles(10.0, 0.0).cycles, 0);
        assert_eq!(count_cycles(10.0, -5.0).cycles, 0);
        assert_eq!(count_cycles(10.0, f64::NAN).cycles, 0);
    }

    #[test]
    fn negative_duration_counts_as_zero() {
        let c = count_cycles(-3.0, 60.0);
        assert_eq!(c.total_seconds, 0.0);
        assert_eq!(c.cycles, 0);
        assert_eq!(c.leftover_seconds, 0.0);
    }

    #[test]
    fn cycles_match_floor_over_a_range() {
        for minutes in [0.0, 0.5, 1.0, 7.3, 60.0, 240.0] {
            for cycle in [1.0, 12.5, 60.0, 92.2, 180.0] {
                let c = count_cycles(minutes, cycle);
                assert_eq!(c.cycles, (minutes * 60.0 / cycle).floor() as u64);
                assert!(c.used_seconds <= c.total_seconds);
                assert!(c.leftover_seconds >= 0.0 && c.leftover_seconds < cycle);
            }
        }
    }

    #[test]
    fn cycles_count_whole_cycle_lost_to_rounding() {
        // 1215 / 9.72 comes out just under 125
        let c = count_cycles(20.25, 9.72);
        assert_eq!(c.cycles, 125);
        assert!(c.used_seconds <= c.total_seconds);
        assert!(c.leftover_seconds >= 0.0 && c.leftover_seconds < 9.72);

        let c = count_cycles(72.25, 0.17);
        assert!(c.used_seconds <= c.total_seconds);
        assert!(c.leftover_seconds >= 0.0 && c.leftover_seconds < 0.17);
    }

    #[test]
    fn units_absorb_representation_error() {
        assert_eq!(units_from_volume(9000.0, 0.1), 90_000);
        assert_eq!(units_from_volume(0.3, 0.1), 3);
        assert_eq!(units_from_volume(0.35, 0.1), 3);
    }

    #[test]
    fn units_zero_for_bad_unit_volume() {
        assert_eq!(units_from_volume(1000.0, 0.0), 0);
        assert_eq!(units_from_volume(1000.0, -1.0), 0);
        assert_eq!(units_from_volume(0.0, 0.1), 0);
    }

    #[test]
    fn units_monotonic_in_volume() {
        let mut last = 0;
        for step in 0..500 {
            let units = units_from_volume(step as f64 * 0.37, 0.15);
            assert!(units >= last);
            last = units;
        }
    }

    #[test]
    fn reprocess_full_yield() {
        let r = reprocess(1000, 100, &[entry(34, 400.0)], 1.0);
        assert_eq!(r.portions, 10);
        assert_eq!(r.outputs, vec![MaterialYield { material_type_id: 34, quantity: 4000 }]);
    }

    #[test]
    fn reprocess_partial_yield_floors() {
        let r = reprocess(1000, 100, &[entry(34, 400.0)], 0.54321);
        assert_eq!(r.outputs[0].quantity, 2172);
    }

    #[test]
    fn reprocess_ignores_incomplete_portion() {
        let r = reprocess(199, 100, &[entry(34, 400.0)], 1.0);
        assert_eq!(r.portions, 1);
        assert_eq!(r.outputs[0].quantity, 400);
    }

    #[test]
    fn reprocess_skips_malformed_entries() {
        let breakdown = [
            entry(34, 400.0),
            entry(0, 10.0),
            entry(-2, 10.0),
            entry(35, 0.0),
            entry(36, -4.0),
            entry(37, f64::NAN),
            entry(38, f64::INFINITY),
        ];
        let r = reprocess(100, 100, &breakdown, 1.0);
        assert_eq!(r.outputs.len(), 1);
        assert_eq!(r.outputs[0].material_type_id, 34);
    }

    #[test]
    fn reprocess_keeps_zero_rows_and_orders_them() {
        let breakdown = [entry(36, 1.0), entry(35, 3.0), entry(34, 300.0), entry(40, 3.0)];
        let r = reprocess(100, 100, &breakdown, 0.5);
        let ids: Vec<TypeId> = r.outputs.iter().map(|o| o.material_type_id).collect();
        assert_eq!(ids, vec![34, 35, 40, 36]);
        assert_eq!(r.outputs[3].quantity, 0);
    }

    #[test]
    fn reprocess_zero_yield_gives_nothing() {
        let r = reprocess(10_000, 100, &[entry(34, 400.0), entry(35, 12.0)], 0.0);
        assert!(r.outputs.iter().all(|o| o.quantity == 0));
        assert_eq!(r.outputs.len(), 2);
    }

    #[test]
    fn reprocess_monotonic_in_yield() {
        let mut last = 0;
        for step in 0..=100 {
            let q = reprocess(12_345, 100, &[entry(34, 417.0)], step as f64 / 100.0).outputs[0].quantity;
            assert!(q >= last);
            last = q;
        }
    }

    #[test]
    fn reprocess_portion_size_zero_treated_as_one() {
        let r = reprocess(7, 0, &[entry(34, 2.0)], 1.0);
        assert_eq!(r.portions, 7);
        assert_eq!(r.outputs[0].quantity, 14);
    }

    #[test]
    fn security_ignored_without_rig() {
        let config = ReprocessYieldConfig {
            facility_base_pct: 52.0,
            security_mod_pct: 10.0,
            ..Default::default()
        };
        assert_eq!(effective_yield(&config), 0.52);

        for security in [0.0, 6.0, 12.0, 500.0] {
            let c = ReprocessYieldConfig {
                security_mod_pct: security,
                ..config
            };
            assert_eq!(effective_yield(&c), 0.52);
        }
    }

    #[test]
    fn full_yield_stack() {
        let config = ReprocessYieldConfig {
            facility_base_pct: 50.0,
            rig_bonus_points: 2.0,
            security_mod_pct: 10.0,
            reprocessing_level: 5.0,
            reprocessing_efficiency_level: 5.0,
            ore_processing_level: 5.0,
            implant_pct: 5.0,
            tax_pct: 0.0,
        };
        let expected = 0.52 * 1.10 * 1.15 * 1.10 * 1.10 * 1.05;
        let got = effective_yield(&config);
        assert!(close(got, expected), "{} != {}", got, expected);
        assert!(got < 1.0);
    }

    #[test]
    fn yield_is_clamped() {
        let high = ReprocessYieldConfig {
            facility_base_pct: 90.0,
            rig_bonus_points: 3.0,
            security_mod_pct: 12.0,
            reprocessing_level: 5.0,
            reprocessing_efficiency_level: 5.0,
            ore_processing_level: 5.0,
            implant_pct: 4.0,
            tax_pct: 0.0,
        };
        assert_eq!(effective_yield(&high), 1.0);

        let negative = ReprocessYieldConfig {
            facility_base_pct: -20.0,
            ..Default::default()
        };
        assert_eq!(effective_yield(&negative), 0.0);
    }

    #[test]
    fn skill_levels_are_clamped_whole_levels() {
        assert_eq!(skill_level(7.0), 5.0);
        assert_eq!(skill_level(-1.0), 0.0);
        assert_eq!(skill_level(3.9), 3.0);
        assert_eq!(skill_level(f64::NAN), 0.0);

        let over = ReprocessYieldConfig {
            reprocessing_level: 9.0,
            ..Default::default()
        };
        let max = ReprocessYieldConfig {
            reprocessing_level: 5.0,
            ..Default::default()
        };
        assert_eq!(effective_yield(&over), effective_yield(&max));
    }

    #[test]
    fn base_only_yield_is_base_fraction() {
        for base in [0.0, 30.0, 50.0, 55.0, 100.0, 140.0] {
            let c = ReprocessYieldConfig {
                facility_base_pct: base,
                ..Default::default()
            };
            assert!(close(effective_yield(&c), (base / 100.0).clamp(0.0, 1.0)));
        }
    }

    #[test]
    fn per_hour_guards_zero_time() {
        assert_eq!(per_hour(Some(100.0), 0.0), None);
        assert_eq!(per_hour(None, 1800.0), None);
        assert!(close(per_hour(Some(100.0), 1800.0).unwrap(), 200.0));
    }

    #[test]
    fn reprocess_value_skips_unknown_prices() {
        let outputs = vec![
            OutputRow {
                material_type_id: 34,
                name: "Tritanium".into(),
                quantity: 100,
                unit_price: Some(4.0),
                value: Some(400.0),
            },
            OutputRow {
                material_type_id: 35,
                name: "Pyerite".into(),
                quantity: 50,
                unit_price: None,
                value: None,
            },
        ];
        let value = reprocess_value(&outputs, 10.0).unwrap();
        assert!(close(value.gross, 400.0));
        assert!(close(value.tax_fee, 40.0));
        assert!(close(value.net, 360.0));

        assert_eq!(reprocess_value(&outputs[1..], 10.0), None);
        assert_eq!(reprocess_value(&[], 10.0), None);
    }

    #[test]
    fn untaxed_overflowing_value_stays_infinite() {
        let outputs = vec![OutputRow {
            material_type_id: 34,
            name: "Tritanium".into(),
            quantity: u64::MAX,
            unit_price: Some(f64::MAX),
            value: Some(f64::INFINITY),
        }];
        let value = reprocess_value(&outputs, 0.0).unwrap();
        assert_eq!(value.tax_fee, 0.0);
        assert!(value.net.is_infinite());
        assert!(!value.net.is_nan());
    }

    #[test]
    fn rank_is_stable_and_treats_unknown_as_zero() {
        let rows = vec![
            row("Scordite", 10, None),
            row("veldspar", 30, Some(5.0)),
            row("Pyroxeres", 10, Some(-1.0)),
            row("Kernite", 20, Some(0.0)),
        ];
        assert_eq!(rank(&rows, SortKey::Units, SortDirection::Ascending), vec![0, 2, 3, 1]);
        assert_eq!(rank(&rows, SortKey::Units, SortDirection::Descending), vec![1, 3, 0, 2]);
        assert_eq!(
            rank(&rows, SortKey::ReprocessPerHour, SortDirection::Descending),
            vec![1, 0, 3, 2]
        );
        assert_eq!(rank(&rows, SortKey::Name, SortDirection::Ascending), vec![3, 2, 0, 1]);
    }

    #[test]
    fn reversing_twice_restores_order() {
        let mut rows = vec![
            row("A", 5, Some(2.0)),
            row("B", 5, Some(1.0)),
            row("C", 1, None),
            row("D", 5, Some(2.0)),
        ];
        sort_rows(&mut rows, SortKey::Units, SortDirection::Descending);
        let first: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();

        let dir = SortDirection::Descending;
        sort_rows(&mut rows, SortKey::Units, dir.reversed());
        sort_rows(&mut rows, SortKey::Units, dir.reversed().reversed());
        let again: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();
        assert_eq!(first, again);
        assert_eq!(first, vec!["A", "B", "D", "C"]);
    }

    #[test]
    fn default_selection_prefers_first_best() {
        let rows = vec![
            row("A", 1, Some(3.0)),
            row("B", 1, Some(7.0)),
            row("C", 1, Some(7.0)),
        ];
        assert_eq!(select_default(&rows), Some(1));
        assert_eq!(select_default(&[]), None);

        let unknown = vec![row("A", 1, None), row("B", 1, None)];
        assert_eq!(select_default(&unknown), Some(0));
    }

    #[test]
    fn default_selection_skips_non_finite_values() {
        let rows = vec![row("A", 1, Some(3.0)), row("B", 1, Some(f64::NAN))];
        assert_eq!(select_default(&rows), Some(0));
    }

    #[test]
    fn explicit_selection_wins_when_present() {
        let mut rows = vec![row("A", 1, Some(1.0)), row("B", 1, Some(9.0))];
        rows[0].type_id = 10;
        rows[1].type_id = 20;
        assert_eq!(select(&rows, Some(10)), Some(0));
        assert_eq!(select(&rows, Some(99)), Some(1));
        assert_eq!(select(&rows, None), Some(1));
    }

    #[test]
    fn amounts_format_with_separators() {
        assert_eq!(format_amount(None), "unknown");
        assert_eq!(format_amount(Some(0.0)), "0.00");
        assert_eq!(format_amount(Some(1234567.891)), "1,234,567.89");
        assert_eq!(format_amount(Some(-950.5)), "-950.50");
        assert_eq!(format_count(90_000), "90,000");
        assert_eq!(format_count(7), "7");
    }
}
