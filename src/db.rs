//! Database schema and operations for cached reference data and prices

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::models::{ItemType, MaterialEntry, PriceQuote, TypeId};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Reference data per item
        CREATE TABLE IF NOT EXISTS item_types (
            type_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            volume REAL NOT NULL,
            portion_size INTEGER NOT NULL DEFAULT 1,
            fetched_at INTEGER NOT NULL
        );

        -- Reprocessing breakdown, stored as received
        CREATE TABLE IF NOT EXISTS type_materials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type_id INTEGER NOT NULL,
            material_type_id INTEGER NOT NULL,
            quantity REAL NOT NULL
        );

        -- Latest market snapshot per item
        CREATE TABLE IF NOT EXISTS prices (
            type_id INTEGER PRIMARY KEY,
            sell_min REAL,
            buy_max REAL,
            fetched_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_type_materials_type ON type_materials(type_id);
        CREATE INDEX IF NOT EXISTS idx_item_types_name ON item_types(name COLLATE NOCASE);
        "#,
    )?;
    Ok(())
}

/// Reference data together with the time it was cached (Unix seconds)
#[derive(Debug, Clone, PartialEq)]
pub struct CachedType {
    pub item: ItemType,
    pub fetched_at: i64,
}

/// Insert or replace an item and its material breakdown
pub fn upsert_type(conn: &Connection, item: &ItemType, fetched_at: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO item_types (type_id, name, volume, portion_size, fetched_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (item.type_id, &item.name, item.volume, item.portion_size, fetched_at),
    )?;
    conn.execute("DELETE FROM type_materials WHERE type_id = ?1", [item.type_id])?;
    for material in &item.materials {
        conn.execute(
            "INSERT INTO type_materials (type_id, material_type_id, quantity)
             VALUES (?1, ?2, ?3)",
            (item.type_id, material.material_type_id, material.quantity),
        )?;
    }
    Ok(())
}

/// Insert or replace the market snapshot for an item
pub fn upsert_price(conn: &Connection, type_id: TypeId, quote: &PriceQuote, fetched_at: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO prices (type_id, sell_min, buy_max, fetched_at)
         VALUES (?1, ?2, ?3, ?4)",
        (type_id, quote.sell_min, quote.buy_max, fetched_at),
    )?;
    Ok(())
}

fn portion_from_db(raw: i64) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}

/// Get the material breakdown of an item
pub fn get_materials(conn: &Connection, type_id: TypeId) -> Result<Vec<MaterialEntry>> {
    let mut stmt = conn.prepare(
        "SELECT material_type_id, quantity FROM type_materials WHERE type_id = ?1 ORDER BY id",
    )?;

    let rows = stmt.query_map([type_id], |row| {
        Ok(MaterialEntry {
            material_type_id: row.get(0)?,
            quantity: row.get(1)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Get an item with its breakdown, if cached
pub fn get_type(conn: &Connection, type_id: TypeId) -> Result<Option<CachedType>> {
    let found = conn
        .query_row(
            "SELECT type_id, name, volume, portion_size, fetched_at FROM item_types WHERE type_id = ?1",
            [type_id],
            |row| {
                Ok((
                    ItemType {
                        type_id: row.get(0)?,
                        name: row.get(1)?,
                        volume: row.get(2)?,
                        portion_size: portion_from_db(row.get(3)?),
                        materials: Vec::new(),
                    },
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((mut item, fetched_at)) = found else {
        return Ok(None);
    };
    item.materials = get_materials(conn, type_id)?;
    Ok(Some(CachedType { item, fetched_at }))
}

/// Look up an item id by display name, ignoring case
pub fn find_type_id(conn: &Connection, name: &str) -> Result<Option<TypeId>> {
    let id = conn
        .query_row(
            "SELECT type_id FROM item_types WHERE name = ?1 COLLATE NOCASE ORDER BY type_id LIMIT 1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Get the cached market snapshot for an item and when it was taken
pub fn get_price(conn: &Connection, type_id: TypeId) -> Result<Option<(PriceQuote, i64)>> {
    let found = conn
        .query_row(
            "SELECT sell_min, buy_max, fetched_at FROM prices WHERE type_id = ?1",
            [type_id],
            |row| {
                Ok((
                    PriceQuote {
                        sell_min: row.get(0)?,
                        buy_max: row.get(1)?,
                    },
                    row.get(2)?,
                ))
            },
        )
        .optional()?;
    Ok(found)
}

/// List all cached items, without their breakdowns
pub fn list_types(conn: &Connection) -> Result<Vec<ItemType>> {
    let mut stmt = conn.prepare(
        "SELECT type_id, name, volume, portion_size FROM item_types ORDER BY name",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(ItemType {
            type_id: row.get(0)?,
            name: row.get(1)?,
            volume: row.get(2)?,
            portion_size: portion_from_db(row.get(3)?),
            materials: Vec::new(),
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Clear all cached reference data and prices (for re-import)
pub fn clear_reference_data(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM prices;
        DELETE FROM type_materials;
        DELETE FROM item_types;
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn veldspar() -> ItemType {
        ItemType {
            type_id: 1230,
            name: "Veldspar".to_string(),
            volume: 0.1,
            portion_size: 100,
            materials: vec![
                MaterialEntry {
                    material_type_id: 34,
                    quantity: 400.0,
                },
                MaterialEntry {
                    material_type_id: -1,
                    quantity: 3.0,
                },
            ],
        }
    }

    #[test]
    fn type_round_trips_with_breakdown() {
        let conn = memory_db();
        upsert_type(&conn, &veldspar(), 1_700_000_000).unwrap();

        let cached = get_type(&conn, 1230).unwrap().unwrap();
        assert_eq!(cached.item, veldspar());
        assert_eq!(cached.fetched_at, 1_700_000_000);
        assert!(get_type(&conn, 1).unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_breakdown() {
        let conn = memory_db();
        upsert_type(&conn, &veldspar(), 1).unwrap();

        let mut changed = veldspar();
        changed.materials.truncate(1);
        upsert_type(&conn, &changed, 2).unwrap();

        assert_eq!(get_materials(&conn, 1230).unwrap().len(), 1);
        assert_eq!(get_type(&conn, 1230).unwrap().unwrap().fetched_at, 2);
    }

    #[test]
    fn names_match_without_case() {
        let conn = memory_db();
        upsert_type(&conn, &veldspar(), 1).unwrap();
        assert_eq!(find_type_id(&conn, "veldSPAR").unwrap(), Some(1230));
        assert_eq!(find_type_id(&conn, "Velds").unwrap(), None);
    }

    #[test]
    fn price_keeps_missing_sides() {
        let conn = memory_db();
        let quote = PriceQuote {
            sell_min: Some(14.5),
            buy_max: None,
        };
        upsert_price(&conn, 1230, &quote, 99).unwrap();
        assert_eq!(get_price(&conn, 1230).unwrap(), Some((quote, 99)));
        assert_eq!(get_price(&conn, 34).unwrap(), None);
    }

    #[test]
    fn clear_removes_everything() {
        let conn = memory_db();
        upsert_type(&conn, &veldspar(), 1).unwrap();
        upsert_price(&conn, 1230, &PriceQuote::default(), 1).unwrap();
        clear_reference_data(&conn).unwrap();
        assert!(list_types(&conn).unwrap().is_empty());
        assert_eq!(get_price(&conn, 1230).unwrap(), None);
    }
}
