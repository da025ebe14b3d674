//! Schema catalog
//!
//! Table, column and index metadata the planner validates against. Loaded once
//! from JSON:
//!
//! ```json
//! { "tables": [{ "name": "item", "columns": ["i_item_sk", "i_item_id"], "indexes": ["i_item_id"] }] }
//! ```
//!
//! Every name is case-insensitive and stored lowercased.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    /// Columns usable for an index lookup
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl TableDef {
    fn normalized(self) -> Self {
        Self {
            name: self.name.to_lowercase(),
            columns: self.columns.iter().map(|c| c.to_lowercase()).collect(),
            indexes: self.indexes.iter().map(|c| c.to_lowercase()).collect(),
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// How strictly statements are checked against the catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogMode {
    /// Unknown tables are planned with unknown columns and no indexes
    #[default]
    Lenient,
    /// Unknown tables and columns are validation errors
    Strict,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tables: Vec<TableDef>,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: BTreeMap<String, TableDef>,
    mode: CatalogMode,
}

impl SchemaCatalog {
    pub fn new(tables: Vec<TableDef>, mode: CatalogMode) -> Self {
        let tables = tables
            .into_iter()
            .map(TableDef::normalized)
            .map(|t| (t.name.clone(), t))
            .collect();
        Self { tables, mode }
    }

    /// Empty lenient catalog: every table is unknown, nothing is indexed
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str, mode: CatalogMode) -> Result<Self, serde_json::Error> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Ok(Self::new(file.tables, mode))
    }

    pub fn load(path: &Path, mode: CatalogMode) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
        let catalog = Self::from_json(&content, mode)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            tables = catalog.len(),
            ?mode,
            "Loaded schema catalog"
        );
        Ok(catalog)
    }

    pub fn mode(&self) -> CatalogMode {
        self.mode
    }

    pub fn is_strict(&self) -> bool {
        self.mode == CatalogMode::Strict
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    fn table(name: &str, columns: &[&str], indexes: &[&str]) -> TableDef {
        TableDef {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            indexes: indexes.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Subset of the TPC-DS schema
    pub fn tpcds(mode: CatalogMode) -> SchemaCatalog {
        SchemaCatalog::new(
            vec![
                table(
                    "date_dim",
                    &["d_date_sk", "d_date_id", "d_date", "d_year", "d_moy"],
                    &["d_date_sk"],
                ),
                table(
                    "item",
                    &["i_item_sk", "i_item_id", "i_color", "i_brand", "i_category"],
                    &["i_item_sk", "i_item_id"],
                ),
                table(
                    "store_sales",
                    &[
                        "ss_sold_date_sk",
                        "ss_item_sk",
                        "ss_store_sk",
                        "ss_customer_sk",
                        "ss_promo_sk",
                        "ss_net_paid",
                    ],
                    &["ss_item_sk"],
                ),
                table("store", &["s_store_sk", "s_store_name", "s_state"], &["s_store_sk"]),
                table(
                    "customer",
                    &["c_customer_sk", "c_first_name", "c_last_name"],
                    &["c_customer_sk"],
                ),
                table("promotion", &["p_promo_sk", "p_channel_tv"], &["p_promo_sk"]),
                table("call_center", &["cc_call_center_sk", "cc_name"], &[]),
            ],
            mode,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_normalizes_names() {
        let catalog = SchemaCatalog::from_json(
            r#"{ "tables": [{ "name": "Item", "columns": ["I_Item_Id"], "indexes": ["I_ITEM_ID"] }] }"#,
            CatalogMode::Strict,
        )
        .unwrap();

        let item = catalog.table("ITEM").unwrap();
        assert_eq!(item.name, "item");
        assert!(item.has_column("i_item_id"));
        assert_eq!(item.indexes, vec!["i_item_id".to_string()]);
        assert!(catalog.is_strict());
    }

    #[test]
    fn test_missing_sections_default_empty() {
        let catalog = SchemaCatalog::from_json(r#"{ "tables": [{ "name": "t" }] }"#, CatalogMode::Lenient)
            .unwrap();
        let t = catalog.table("t").unwrap();
        assert!(t.columns.is_empty());
        assert!(t.indexes.is_empty());

        let catalog = SchemaCatalog::from_json("{}", CatalogMode::Lenient).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"{ "tables": [{ "name": "a" }, { "name": "b" }] }"#).unwrap();

        let catalog = SchemaCatalog::load(&path, CatalogMode::Lenient).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.mode(), CatalogMode::Lenient);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = SchemaCatalog::load(Path::new("/nonexistent/catalog.json"), CatalogMode::Strict)
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read catalog file"));
    }
}
