use std::sync::Arc;

use arrow_schema::SchemaRef;
use fpd_common::{FpdError, Result};
use fpd_planner::{OptimizerContext, SchemaProvider, TableHandle, TableResolver};
use fpd_storage::Catalog;

/// Planner-facing view of a [`Catalog`].
#[derive(Debug, Clone, Copy)]
pub struct CatalogContext<'a> {
    catalog: &'a Catalog,
}

impl<'a> CatalogContext<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }
}

impl SchemaProvider for CatalogContext<'_> {
    fn table_schema(&self, table: &TableHandle) -> Result<SchemaRef> {
        let def = self
            .catalog
            .get_remote(&table.connector_id, &table.table_name)
            .ok_or_else(|| {
                FpdError::Planning(format!(
                    "unknown table {} for connector {}",
                    table.table_name, table.connector_id
                ))
            })?;
        Ok(Arc::new(def.schema()?))
    }
}

impl OptimizerContext for CatalogContext<'_> {}

impl TableResolver for CatalogContext<'_> {
    fn resolve_table(&self, name: &str) -> Result<TableHandle> {
        let def = self.catalog.get(name)?;
        Ok(TableHandle::new(def.connector.clone(), def.remote_name()))
    }
}
