use std::collections::HashMap;
use std::fs;

use arrow_schema::{DataType, Field, Schema, TimeUnit};
use fpd_common::{ConnectorId, FpdError, Result};
use serde::{Deserialize, Serialize};

/// One column of a remote table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    /// Type name as written in the catalog file (`bigint`, `double`, `varchar`, ...).
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Name the host engine uses for the table.
    pub name: String,
    pub connector: ConnectorId,
    /// Table name inside the remote store, when it differs from `name`.
    #[serde(default)]
    pub remote_table: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn remote_name(&self) -> &str {
        self.remote_table.as_deref().unwrap_or(&self.name)
    }

    /// Arrow schema of the table, columns in catalog order.
    pub fn schema(&self) -> Result<Schema> {
        let fields = self
            .columns
            .iter()
            .map(|c| Ok(Field::new(&c.name, parse_type_name(&c.data_type)?, true)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema::new(fields))
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    tables: HashMap<String, TableDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    pub fn register_table(&mut self, table: TableDef) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Result<&TableDef> {
        self.tables
            .get(name)
            .ok_or_else(|| FpdError::Planning(format!("unknown table: {name}")))
    }

    /// Look up a table by its name in the remote store.
    pub fn get_remote(&self, connector: &ConnectorId, remote_name: &str) -> Option<&TableDef> {
        self.tables
            .values()
            .find(|t| &t.connector == connector && t.remote_name() == remote_name)
    }

    /// Registered tables sorted by name.
    pub fn tables(&self) -> Vec<&TableDef> {
        let mut out = self.tables.values().collect::<Vec<_>>();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let tables: Vec<TableDef> =
            serde_json::from_str(s).map_err(|e| FpdError::InvalidConfig(e.to_string()))?;
        let mut cat = Catalog::new();
        for t in tables {
            t.schema()?;
            cat.register_table(t);
        }
        Ok(cat)
    }

    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }
}

fn parse_type_name(name: &str) -> Result<DataType> {
    Ok(match name.trim().to_ascii_lowercase().as_str() {
        "int" | "integer" | "int32" => DataType::Int32,
        "bigint" | "long" | "int64" => DataType::Int64,
        "float" | "real" | "float32" => DataType::Float32,
        "double" | "float64" => DataType::Float64,
        "varchar" | "string" | "utf8" => DataType::Utf8,
        "boolean" | "bool" => DataType::Boolean,
        "timestamp" => DataType::Timestamp(TimeUnit::Millisecond, None),
        other => {
            return Err(FpdError::InvalidConfig(format!(
                "unknown column type '{other}'"
            )))
        }
    })
}
