//! Sample reference data and prices for trying the calculator without an import

use anyhow::Result;
use rusqlite::Connection;

use crate::db;
use crate::models::{ItemType, MaterialEntry, PriceQuote, TypeId};

pub const TRITANIUM: TypeId = 34;
pub const PYERITE: TypeId = 35;
pub const MEXALLON: TypeId = 36;
pub const HEAVY_WATER: TypeId = 16272;
pub const LIQUID_OZONE: TypeId = 16273;
pub const HELIUM_ISOTOPES: TypeId = 16274;
pub const STRONTIUM_CLATHRATES: TypeId = 16275;

pub const VELDSPAR: TypeId = 1230;
pub const SCORDITE: TypeId = 1228;
pub const PYROXERES: TypeId = 1224;
pub const PLAGIOCLASE: TypeId = 18;
pub const CLEAR_ICICLE: TypeId = 16262;

fn item(type_id: TypeId, name: &str, volume: f64, portion_size: u32, materials: &[(TypeId, f64)]) -> ItemType {
    ItemType {
        type_id,
        name: name.to_string(),
        volume,
        portion_size,
        materials: materials
            .iter()
            .map(|&(id, quantity)| MaterialEntry {
                material_type_id: i64::from(id),
                quantity,
            })
            .collect(),
    }
}

/// Sample items: a few ores, one ice and their products
pub fn sample_types() -> Vec<ItemType> {
    vec![
        item(TRITANIUM, "Tritanium", 0.01, 1, &[]),
        item(PYERITE, "Pyerite", 0.01, 1, &[]),
        item(MEXALLON, "Mexallon", 0.01, 1, &[]),
        item(HEAVY_WATER, "Heavy Water", 0.4, 1, &[]),
        item(LIQUID_OZONE, "Liquid Ozone", 0.4, 1, &[]),
        item(HELIUM_ISOTOPES, "Helium Isotopes", 0.03, 1, &[]),
        item(STRONTIUM_CLATHRATES, "Strontium Clathrates", 3.0, 1, &[]),
        item(VELDSPAR, "Veldspar", 0.1, 100, &[(TRITANIUM, 400.0)]),
        item(SCORDITE, "Scordite", 0.15, 100, &[(TRITANIUM, 150.0), (PYERITE, 90.0)]),
        item(PYROXERES, "Pyroxeres", 0.3, 100, &[(PYERITE, 90.0), (MEXALLON, 30.0)]),
        item(PLAGIOCLASE, "Plagioclase", 0.35, 100, &[(TRITANIUM, 175.0), (MEXALLON, 70.0)]),
        item(
            CLEAR_ICICLE,
            "Clear Icicle",
            1000.0,
            1,
            &[
                (HEAVY_WATER, 69.0),
                (LIQUID_OZONE, 35.0),
                (STRONTIUM_CLATHRATES, 1.0),
                (HELIUM_ISOTOPES, 414.0),
            ],
        ),
    ]
}

/// Sample market snapshot. Plagioclase and Strontium Clathrates are left unpriced.
pub fn sample_prices() -> Vec<(TypeId, PriceQuote)> {
    let quote = |sell: f64, buy: f64| PriceQuote {
        sell_min: Some(sell),
        buy_max: Some(buy),
    };
    vec![
        (TRITANIUM, quote(4.5, 4.1)),
        (PYERITE, quote(9.8, 8.9)),
        (MEXALLON, quote(62.0, 57.5)),
        (HEAVY_WATER, quote(210.0, 180.0)),
        (LIQUID_OZONE, quote(160.0, 141.0)),
        (HELIUM_ISOTOPES, quote(640.0, 590.0)),
        (VELDSPAR, quote(14.0, 12.2)),
        (SCORDITE, quote(22.5, 19.0)),
        (PYROXERES, quote(31.0, 26.5)),
        (CLEAR_ICICLE, quote(310_000.0, 280_000.0)),
    ]
}

/// Replace the cache contents with the sample data
pub fn load_sample_data(conn: &Connection, fetched_at: i64) -> Result<usize> {
    db::clear_reference_data(conn)?;

    let types = sample_types();
    for item in &types {
        db::upsert_type(conn, item, fetched_at)?;
    }
    for (type_id, quote) in sample_prices() {
        db::upsert_price(conn, type_id, &quote, fetched_at)?;
    }
    Ok(types.len())
}
