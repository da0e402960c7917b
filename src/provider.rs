//! Data provider interfaces and the SQLite-backed cache implementing them

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::db;
use crate::error::ProviderError;
use crate::models::{ItemType, PriceBook, TypeId};

/// Source of slow-changing reference data
pub trait TypeDataProvider {
    fn fetch_type(&self, type_id: TypeId) -> Result<ItemType, ProviderError>;
}

/// Source of market snapshots. Identities missing from the book are unknown.
pub trait PriceProvider {
    fn fetch_prices(&self, type_ids: &[TypeId]) -> Result<PriceBook, ProviderError>;
}

/// Maps display names to identities
pub trait NameResolver {
    fn resolve(&self, name: &str) -> Result<TypeId, ProviderError>;
}

/// How old cached entries may be before they count as missing.
/// `None` never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub price_max_age: Option<Duration>,
    pub type_max_age: Option<Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            price_max_age: Some(Duration::minutes(60)),
            type_max_age: None,
        }
    }
}

fn is_fresh(fetched_at: i64, now: DateTime<Utc>, max_age: Option<Duration>) -> bool {
    match max_age {
        None => true,
        Some(max_age) => now.timestamp() - fetched_at <= max_age.num_seconds(),
    }
}

/// Cache of reference data and prices held in a SQLite database
pub struct SqliteStore<'a> {
    conn: &'a Connection,
    policy: CachePolicy,
    now: DateTime<Utc>,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection, policy: CachePolicy) -> Self {
        Self::at(conn, policy, Utc::now())
    }

    /// Store evaluating freshness at a fixed instant
    pub fn at(conn: &'a Connection, policy: CachePolicy, now: DateTime<Utc>) -> Self {
        Self { conn, policy, now }
    }
}

fn transport(err: anyhow::Error) -> ProviderError {
    ProviderError::Transport(format!("{:#}", err))
}

impl TypeDataProvider for SqliteStore<'_> {
    fn fetch_type(&self, type_id: TypeId) -> Result<ItemType, ProviderError> {
        let cached = db::get_type(self.conn, type_id)
            .map_err(transport)?
            .ok_or_else(|| ProviderError::NotFound(format!("type {}", type_id)))?;

        if !is_fresh(cached.fetched_at, self.now, self.policy.type_max_age) {
            debug!("Cached type data for {} is stale", type_id);
            return Err(ProviderError::NotFound(format!("fresh type data for {}", type_id)));
        }
        Ok(cached.item)
    }
}

impl PriceProvider for SqliteStore<'_> {
    fn fetch_prices(&self, type_ids: &[TypeId]) -> Result<PriceBook, ProviderError> {
        let mut book = PriceBook::new();
        for &type_id in type_ids {
            match db::get_price(self.conn, type_id).map_err(transport)? {
                Some((quote, fetched_at)) if is_fresh(fetched_at, self.now, self.policy.price_max_age) => {
                    book.insert(type_id, quote);
                }
                Some(_) => debug!("Cached price for {} is stale", type_id),
                None => {}
            }
        }
        Ok(book)
    }
}

impl NameResolver for SqliteStore<'_> {
    fn resolve(&self, name: &str) -> Result<TypeId, ProviderError> {
        db::find_type_id(self.conn, name.trim())
            .map_err(transport)?
            .ok_or_else(|| ProviderError::NotFound(format!("item named '{}'", name.trim())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceQuote;

    fn store_with_data() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let item = ItemType {
            type_id: 1230,
            name: "Veldspar".to_string(),
            volume: 0.1,
            portion_size: 100,
            materials: Vec::new(),
        };
        db::upsert_type(&conn, &item, 1_000).unwrap();
        db::upsert_price(&conn, 1230, &PriceQuote { sell_min: Some(14.0), buy_max: None }, 1_000).unwrap();
        db::upsert_price(&conn, 34, &PriceQuote { sell_min: Some(4.0), buy_max: Some(3.5) }, 4_000).unwrap();
        conn
    }

    fn instant(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn stale_prices_are_left_out() {
        let conn = store_with_data();
        let policy = CachePolicy {
            price_max_age: Some(Duration::minutes(60)),
            type_max_age: None,
        };
        let store = SqliteStore::at(&conn, policy, instant(4_500));

        let book = store.fetch_prices(&[1230, 34, 35]).unwrap();
        assert_eq!(book.len(), 2);

        let later = SqliteStore::at(&conn, policy, instant(1_000 + 3_601));
        let book = later.fetch_prices(&[1230, 34]).unwrap();
        assert!(book.get(1230).is_none());
        assert!(book.get(34).is_some());
    }

    #[test]
    fn unlimited_policy_keeps_everything() {
        let conn = store_with_data();
        let policy = CachePolicy {
            price_max_age: None,
            type_max_age: None,
        };
        let store = SqliteStore::at(&conn, policy, instant(10_000_000));
        assert_eq!(store.fetch_prices(&[1230, 34]).unwrap().len(), 2);
        assert!(store.fetch_type(1230).is_ok());
    }

    #[test]
    fn stale_type_data_is_not_found() {
        let conn = store_with_data();
        let policy = CachePolicy {
            price_max_age: None,
            type_max_age: Some(Duration::days(1)),
        };
        let store = SqliteStore::at(&conn, policy, instant(1_000 + 2 * 86_400));
        assert!(matches!(store.fetch_type(1230), Err(ProviderError::NotFound(_))));
    }

    #[test]
    fn missing_type_is_not_found() {
        let conn = store_with_data();
        let store = SqliteStore::at(&conn, CachePolicy::default(), instant(1_000));
        assert!(matches!(store.fetch_type(42), Err(ProviderError::NotFound(_))));
    }

    #[test]
    fn resolves_names() {
        let conn = store_with_data();
        let store = SqliteStore::at(&conn, CachePolicy::default(), instant(1_000));
        assert_eq!(store.resolve(" veldspar ").unwrap(), 1230);
        assert!(matches!(store.resolve("Mercoxit"), Err(ProviderError::NotFound(_))));
    }
}
