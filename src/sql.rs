//! SQL fragment construction with validated tokens
//!
//! Every identifier or literal that ends up inside outgoing SQL passes
//! through an allow-list here first. Identifiers (tables, columns,
//! catalogs) must match `[A-Za-z_][A-Za-z0-9_]*`; H3 cell ids must be
//! hex. Anything else fails closed: client-supplied projection names are
//! rejected as `InvalidParameter` before a query is issued, while an
//! unsafe token arriving from inside the service is an `Internal` error,
//! because only a bug can put one there.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::bbox::BoundingBox;
use crate::{HexgateError, Result};

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

fn cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]+$").unwrap())
}

/// Validate an identifier produced by the service itself (column,
/// table, catalog, schema). Failure means an invariant was violated.
pub fn validate_identifier(name: &str) -> Result<&str> {
    if identifier_re().is_match(name) {
        Ok(name)
    } else {
        Err(HexgateError::Internal(format!(
            "unsafe identifier reached the SQL builder: '{}'",
            name
        )))
    }
}

/// Validate client-supplied projection names. Unknown-but-safe names are
/// passed through to the engine; unsafe ones are rejected up front.
pub fn validate_projection(names: &[String]) -> Result<()> {
    for name in names {
        if !identifier_re().is_match(name) {
            return Err(HexgateError::InvalidParameter(format!(
                "invalid property name: '{}'",
                name
            )));
        }
    }
    Ok(())
}

fn validate_cell(cell: &str) -> Result<&str> {
    if cell_re().is_match(cell) {
        Ok(cell)
    } else {
        Err(HexgateError::Internal(format!(
            "unsafe cell identifier reached the SQL builder: '{}'",
            cell
        )))
    }
}

/// Quote a string literal for embedding in SQL. Values containing quote
/// or control characters are refused rather than escaped; everything fed
/// through here comes from operator configuration, not request input.
pub fn quote_literal(value: &str) -> Result<String> {
    if value.contains('\'') || value.contains('\\') || value.chars().any(char::is_control) {
        return Err(HexgateError::Internal(format!(
            "unsafe literal reached the SQL builder: '{}'",
            value
        )));
    }
    Ok(format!("'{}'", value))
}

/// A fully-qualified `catalog.schema.table` reference.
#[derive(Debug, Clone)]
pub struct TableRef {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(catalog: &str, schema: &str, table: &str) -> Self {
        Self {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }

    pub fn qualified(&self) -> Result<String> {
        Ok(format!(
            "{}.{}.{}",
            validate_identifier(&self.catalog)?,
            validate_identifier(&self.schema)?,
            validate_identifier(&self.table)?
        ))
    }
}

/// Build the WHERE fragment for a feature query.
///
/// Combines partition pruning (cell-set membership) with the exact
/// intersects test. An empty cell set contributes no pruning clause --
/// the degraded full-scan path. No bounding box at all yields the
/// universal predicate.
pub fn spatial_filter(
    bbox: Option<&BoundingBox>,
    cells: &BTreeSet<String>,
    geom_column: &str,
    cell_column: &str,
) -> Result<String> {
    let bbox = match bbox {
        Some(bbox) => bbox,
        None => return Ok("1=1".to_string()),
    };

    let mut clauses = Vec::with_capacity(2);

    if !cells.is_empty() {
        let mut quoted = Vec::with_capacity(cells.len());
        for cell in cells {
            quoted.push(format!("'{}'", validate_cell(cell)?));
        }
        clauses.push(format!(
            "{} IN ({})",
            validate_identifier(cell_column)?,
            quoted.join(", ")
        ));
    }

    clauses.push(format!(
        "ST_Intersects(ST_GeomFromWKB({}), ST_GeomFromText('{}'))",
        validate_identifier(geom_column)?,
        bbox.to_wkt()
    ));

    Ok(clauses.join(" AND "))
}

/// Build the SELECT for the record-form feature query. The geometry is
/// re-encoded to WKT under the `geom_wkt` alias; the raw column and the
/// partition cell are stripped from properties later.
pub fn feature_select(
    table: &TableRef,
    projection: Option<&[String]>,
    filter: &str,
    geom_column: &str,
    limit: usize,
    offset: usize,
) -> Result<String> {
    let columns = match projection {
        Some(names) if !names.is_empty() => {
            validate_projection(names)?;
            names.join(", ")
        }
        _ => "*".to_string(),
    };

    Ok(format!(
        "SELECT {}, ST_AsText(ST_GeomFromWKB({})) AS geom_wkt FROM {} WHERE {} LIMIT {} OFFSET {}",
        columns,
        validate_identifier(geom_column)?,
        table.qualified()?,
        filter,
        limit,
        offset
    ))
}

/// Build the SELECT for the bulk columnar form. No per-row re-encoding:
/// the engine's native columns go straight into the Arrow stream.
pub fn bulk_select(table: &TableRef, filter: &str, limit: usize, offset: usize) -> Result<String> {
    Ok(format!(
        "SELECT * FROM {} WHERE {} LIMIT {} OFFSET {}",
        table.qualified()?,
        filter,
        limit,
        offset
    ))
}

/// Aggregate min/max over the geometry column, for collection extents.
pub fn extent_select(table: &TableRef, geom_column: &str) -> Result<String> {
    let geom = validate_identifier(geom_column)?;
    Ok(format!(
        "SELECT MIN(ST_XMin(ST_GeomFromWKB({g}))) AS minx, \
         MIN(ST_YMin(ST_GeomFromWKB({g}))) AS miny, \
         MAX(ST_XMax(ST_GeomFromWKB({g}))) AS maxx, \
         MAX(ST_YMax(ST_GeomFromWKB({g}))) AS maxy FROM {t}",
        g = geom,
        t = table.qualified()?
    ))
}

/// List table names in the catalog's schema.
pub fn listing_select(catalog: &str, schema: &str) -> Result<String> {
    validate_identifier(schema)?;
    Ok(format!(
        "SELECT table_name FROM {}.information_schema.tables WHERE table_schema = {}",
        validate_identifier(catalog)?,
        quote_literal(schema)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_bbox_yields_universal_predicate() {
        let filter = spatial_filter(None, &BTreeSet::new(), "geometry", "h3_cell").unwrap();
        assert_eq!(filter, "1=1");
    }

    #[test]
    fn bbox_without_cells_uses_exact_test_only() {
        let bbox = BoundingBox::new(-5.0, -5.0, 5.0, 5.0).unwrap();
        let filter = spatial_filter(Some(&bbox), &BTreeSet::new(), "geometry", "h3_cell").unwrap();
        assert!(!filter.contains("IN ("));
        assert!(filter.contains("ST_Intersects"));
        assert!(filter.contains("POLYGON((-5 -5, 5 -5, 5 5, -5 5, -5 -5))"));
    }

    #[test]
    fn bbox_with_cells_combines_both_clauses() {
        let bbox = BoundingBox::new(-5.0, -5.0, 5.0, 5.0).unwrap();
        let filter = spatial_filter(
            Some(&bbox),
            &cells(&["85283473fffffff", "85283477fffffff"]),
            "geometry",
            "h3_cell",
        )
        .unwrap();
        assert!(filter.contains("h3_cell IN ('85283473fffffff', '85283477fffffff')"));
        assert!(filter.contains(" AND ST_Intersects"));
    }

    #[test]
    fn malicious_cell_fails_closed() {
        let bbox = BoundingBox::new(-5.0, -5.0, 5.0, 5.0).unwrap();
        let err = spatial_filter(
            Some(&bbox),
            &cells(&["8528') OR ('1'='1"]),
            "geometry",
            "h3_cell",
        )
        .unwrap_err();
        assert!(matches!(err, HexgateError::Internal(_)));
    }

    #[test]
    fn malicious_column_fails_closed() {
        let bbox = BoundingBox::new(-5.0, -5.0, 5.0, 5.0).unwrap();
        let err =
            spatial_filter(Some(&bbox), &BTreeSet::new(), "geom; DROP TABLE x", "h3_cell")
                .unwrap_err();
        assert!(matches!(err, HexgateError::Internal(_)));
    }

    #[test]
    fn projection_with_unsafe_name_is_invalid_parameter() {
        let err = validate_projection(&["name".to_string(), "1; DROP".to_string()]).unwrap_err();
        assert!(matches!(err, HexgateError::InvalidParameter(_)));
    }

    #[test]
    fn feature_select_shape() {
        let table = TableRef::new("polaris", "default", "roads");
        let sql = feature_select(&table, None, "1=1", "geometry", 100, 20).unwrap();
        assert_eq!(
            sql,
            "SELECT *, ST_AsText(ST_GeomFromWKB(geometry)) AS geom_wkt \
             FROM polaris.default.roads WHERE 1=1 LIMIT 100 OFFSET 20"
        );
    }

    #[test]
    fn feature_select_with_projection() {
        let table = TableRef::new("polaris", "default", "roads");
        let names = vec!["id".to_string(), "name".to_string()];
        let sql = feature_select(&table, Some(&names), "1=1", "geometry", 10, 0).unwrap();
        assert!(sql.starts_with("SELECT id, name, ST_AsText"));
    }

    #[test]
    fn unsafe_table_name_fails_closed() {
        let table = TableRef::new("polaris", "default", "roads; DROP TABLE roads");
        let err = feature_select(&table, None, "1=1", "geometry", 10, 0).unwrap_err();
        assert!(matches!(err, HexgateError::Internal(_)));
    }

    #[test]
    fn extent_select_shape() {
        let table = TableRef::new("polaris", "default", "roads");
        let sql = extent_select(&table, "geometry").unwrap();
        assert!(sql.contains("MIN(ST_XMin(ST_GeomFromWKB(geometry))) AS minx"));
        assert!(sql.contains("MAX(ST_YMax(ST_GeomFromWKB(geometry))) AS maxy"));
        assert!(sql.ends_with("FROM polaris.default.roads"));
    }

    #[test]
    fn listing_select_shape() {
        let sql = listing_select("polaris", "default").unwrap();
        assert_eq!(
            sql,
            "SELECT table_name FROM polaris.information_schema.tables \
             WHERE table_schema = 'default'"
        );
    }

    #[test]
    fn literal_with_quote_is_refused() {
        assert!(quote_literal("it's").is_err());
        assert_eq!(quote_literal("2GB").unwrap(), "'2GB'");
    }
}
