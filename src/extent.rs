//! Collection extent computation and caching
//!
//! The spatial extent of a collection is an aggregate min/max over its
//! geometry column. An empty table aggregates to all-null, which
//! resolves to `None`; callers substitute the whole-world extent in
//! capability metadata rather than propagating the null.
//!
//! Extents are cached per collection: concurrent reads, single writer,
//! explicit invalidation (the tables only change when an ETL run loads
//! new data).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::bbox::BoundingBox;
use crate::engine::{EnginePool, JsonRow};
use crate::sql::{self, TableRef};
use crate::Result;

pub struct ExtentResolver {
    pool: Arc<EnginePool>,
    cache: RwLock<HashMap<String, Option<BoundingBox>>>,
}

impl ExtentResolver {
    pub fn new(pool: Arc<EnginePool>) -> Self {
        Self {
            pool,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The extent of `table`'s geometry column, or `None` for an empty
    /// table. Cached after the first computation.
    pub async fn resolve(
        &self,
        table: &TableRef,
        geom_column: &str,
    ) -> Result<Option<BoundingBox>> {
        if let Some(cached) = self.cache.read().unwrap().get(&table.table) {
            return Ok(*cached);
        }

        let statement = sql::extent_select(table, geom_column)?;
        let rows = self.pool.query_rows(&statement).await?;
        let extent = rows.first().and_then(extent_from_row);

        self.cache
            .write()
            .unwrap()
            .insert(table.table.clone(), extent);
        Ok(extent)
    }

    /// Drop one cached extent, forcing recomputation on next access.
    pub fn invalidate(&self, collection: &str) {
        self.cache.write().unwrap().remove(collection);
    }

    /// Drop every cached extent.
    pub fn invalidate_all(&self) {
        self.cache.write().unwrap().clear();
    }
}

fn extent_from_row(row: &JsonRow) -> Option<BoundingBox> {
    let min_x = row.get("minx")?.as_f64()?;
    let min_y = row.get("miny")?.as_f64()?;
    let max_x = row.get("maxx")?.as_f64()?;
    let max_y = row.get("maxy")?.as_f64()?;
    BoundingBox::new(min_x, min_y, max_x, max_y).ok()
}
