//! Schema model for constraint-aware generation.
//!
//! This module provides:
//! - Data models for tables, columns, keys and check constraints
//! - DDL parsing for building a schema without a live database
//! - Dependency graph construction with staged topological sorting
//! - A single constraint-classification pass consulted by the generator

mod ddl;
mod graph;

pub use ddl::*;
pub use graph::*;

use crate::error::SeedError;
use ahash::AHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::ops::Bound;

/// Unique identifier for a table within a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

/// Unique identifier for a column within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnId(pub u16);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColumnId({})", self.0)
    }
}

/// Storage width of an integer column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    Tiny,
    Small,
    Medium,
    Regular,
    Big,
    Huge,
    UTiny,
    USmall,
    UMedium,
    URegular,
    UBig,
}

impl IntWidth {
    /// Width of an integer SQL type, `None` for anything else.
    /// `type_lower` is the full lowercase type, used for MySQL's `UNSIGNED`.
    fn from_base_type(base_type: &str, type_lower: &str) -> Option<Self> {
        let unsigned = type_lower.contains("unsigned");
        let width = match base_type {
            "tinyint" | "int1" if unsigned => IntWidth::UTiny,
            "tinyint" | "int1" => IntWidth::Tiny,
            "smallint" | "int2" | "smallserial" | "serial2" if unsigned => IntWidth::USmall,
            "smallint" | "int2" | "smallserial" | "serial2" => IntWidth::Small,
            "mediumint" if unsigned => IntWidth::UMedium,
            "mediumint" => IntWidth::Medium,
            "int" | "integer" | "int4" | "serial" | "serial4" if unsigned => {
                IntWidth::URegular
            }
            "int" | "integer" | "int4" | "serial" | "serial4" => IntWidth::Regular,
            "bigint" | "int8" | "bigserial" | "serial8" if unsigned => IntWidth::UBig,
            "bigint" | "int8" | "bigserial" | "serial8" => IntWidth::Big,
            "hugeint" | "int128" => IntWidth::Huge,
            "utinyint" => IntWidth::UTiny,
            "usmallint" => IntWidth::USmall,
            "uinteger" => IntWidth::URegular,
            "ubigint" | "uhugeint" => IntWidth::UBig,
            _ => return None,
        };
        Some(width)
    }

    /// Inclusive value limits, clipped to `i64`
    pub fn limits(self) -> (i64, i64) {
        match self {
            IntWidth::Tiny => (i8::MIN as i64, i8::MAX as i64),
            IntWidth::Small => (i16::MIN as i64, i16::MAX as i64),
            IntWidth::Medium => (-(1 << 23), (1 << 23) - 1),
            IntWidth::Regular => (i32::MIN as i64, i32::MAX as i64),
            IntWidth::Big | IntWidth::Huge => (i64::MIN, i64::MAX),
            IntWidth::UTiny => (0, u8::MAX as i64),
            IntWidth::USmall => (0, u16::MAX as i64),
            IntWidth::UMedium => (0, (1 << 24) - 1),
            IntWidth::URegular => (0, u32::MAX as i64),
            IntWidth::UBig => (0, i64::MAX),
        }
    }
}

/// Logical column type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Integer(IntWidth),
    Decimal,
    Text,
    Date,
    DateTime,
    Boolean,
    Json,
    Binary,
    Uuid,
    Enum,
}

impl ColumnType {
    /// Parse a SQL type string into a ColumnType.
    /// Supports MySQL, PostgreSQL, SQLite and DuckDB spellings; anything
    /// unrecognised is generated as text.
    pub fn from_sql_type(type_str: &str) -> Self {
        let type_lower = type_str.to_lowercase();
        let base_type = type_lower.split('(').next().unwrap_or(&type_lower).trim();
        let base_type = base_type.split_whitespace().next().unwrap_or(base_type);

        // MySQL's TINYINT(1) is the conventional boolean
        if base_type == "tinyint" && type_lower.contains("(1)") {
            return ColumnType::Boolean;
        }
        if let Some(width) = IntWidth::from_base_type(base_type, &type_lower) {
            return ColumnType::Integer(width);
        }

        match base_type {
            "decimal" | "numeric" | "float" | "double" | "real" | "float4" | "float8" | "money" => {
                ColumnType::Decimal
            }
            "date" => ColumnType::Date,
            "datetime" | "timestamp" | "timestamptz" => ColumnType::DateTime,
            "bool" | "boolean" | "bit" => ColumnType::Boolean,
            "json" | "jsonb" => ColumnType::Json,
            "binary" | "varbinary" | "blob" | "bytea" | "tinyblob" | "mediumblob" | "longblob" => {
                if base_type == "binary" && type_lower.contains("(16)") {
                    ColumnType::Uuid
                } else {
                    ColumnType::Binary
                }
            }
            "uuid" | "uniqueidentifier" => ColumnType::Uuid,
            "enum" => ColumnType::Enum,
            _ => ColumnType::Text,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer(_) | ColumnType::Decimal)
    }

    /// Value limits of integer columns
    pub fn integer_limits(&self) -> Option<(i64, i64)> {
        match self {
            ColumnType::Integer(width) => Some(width.limits()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer(_) => "integer",
            ColumnType::Decimal => "decimal",
            ColumnType::Text => "text",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Boolean => "boolean",
            ColumnType::Json => "json",
            ColumnType::Binary => "binary",
            ColumnType::Uuid => "uuid",
            ColumnType::Enum => "enum",
        }
    }
}

/// Column definition within a table
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column type
    pub col_type: ColumnType,
    /// Position in table (0-indexed)
    pub ordinal: ColumnId,
    /// Whether this column is part of the primary key
    pub is_primary_key: bool,
    /// Whether this column allows NULL values
    pub is_nullable: bool,
    /// Declared character/byte length
    pub max_length: Option<u32>,
    /// Declared numeric precision and scale
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    /// Raw DEFAULT expression
    pub default: Option<String>,
    pub is_auto_increment: bool,
    /// Allowed values of ENUM columns
    pub enum_values: Vec<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, col_type: ColumnType, ordinal: ColumnId) -> Self {
        Self {
            name: name.into(),
            col_type,
            ordinal,
            is_primary_key: false,
            is_nullable: true,
            max_length: None,
            precision: None,
            scale: None,
            default: None,
            is_auto_increment: false,
            enum_values: Vec::new(),
        }
    }
}

/// Constraint kinds a column can take part in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
    NotNull,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintKind::PrimaryKey => "PRIMARY KEY",
            ConstraintKind::ForeignKey => "FOREIGN KEY",
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::Check => "CHECK",
            ConstraintKind::NotNull => "NOT NULL",
        };
        f.write_str(s)
    }
}

/// Foreign key constraint definition
#[derive(Debug, Clone)]
pub struct ForeignKey {
    /// Constraint name (optional)
    pub name: Option<String>,
    /// Column IDs in this table that form the FK
    pub columns: Vec<ColumnId>,
    /// Column names in this table (before resolution)
    pub column_names: Vec<String>,
    /// Referenced table name
    pub referenced_table: String,
    /// Referenced column names
    pub referenced_columns: Vec<String>,
    /// Resolved referenced table ID (set after schema is complete)
    pub referenced_table_id: Option<TableId>,
}

/// PRIMARY KEY or UNIQUE constraint over one or more columns
#[derive(Debug, Clone)]
pub struct UniqueKey {
    pub name: Option<String>,
    pub columns: Vec<ColumnId>,
    pub column_names: Vec<String>,
    pub is_primary: bool,
}

impl UniqueKey {
    pub fn label(&self) -> String {
        self.column_names.join(", ")
    }
}

/// Inclusive or exclusive numeric bounds parsed from a CHECK expression
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub min: Bound<f64>,
    pub max: Bound<f64>,
}

impl NumericRange {
    pub fn unbounded() -> Self {
        Self {
            min: Bound::Unbounded,
            max: Bound::Unbounded,
        }
    }

    pub fn contains(&self, v: f64) -> bool {
        let above = match self.min {
            Bound::Included(m) => v >= m,
            Bound::Excluded(m) => v > m,
            Bound::Unbounded => true,
        };
        let below = match self.max {
            Bound::Included(m) => v <= m,
            Bound::Excluded(m) => v < m,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Narrow this range by another one.
    pub fn intersect(self, other: NumericRange) -> NumericRange {
        let min = match (self.min, other.min) {
            (Bound::Unbounded, b) | (b, Bound::Unbounded) => b,
            (a, b) => {
                if bound_value(a) >= bound_value(b) {
                    a
                } else {
                    b
                }
            }
        };
        let max = match (self.max, other.max) {
            (Bound::Unbounded, b) | (b, Bound::Unbounded) => b,
            (a, b) => {
                if bound_value(a) <= bound_value(b) {
                    a
                } else {
                    b
                }
            }
        };
        NumericRange { min, max }
    }
}

fn bound_value(b: Bound<f64>) -> f64 {
    match b {
        Bound::Included(v) | Bound::Excluded(v) => v,
        Bound::Unbounded => 0.0,
    }
}

/// CHECK constraint with its parsed range, when it is a simple comparison
#[derive(Debug, Clone)]
pub struct CheckConstraint {
    pub expression: String,
    pub column: Option<String>,
    pub range: Option<NumericRange>,
}

/// Constraint classification of one column, computed once per table
#[derive(Debug, Clone, Default)]
pub struct ColumnClass {
    pub is_primary_key: bool,
    /// Member of any single or composite UNIQUE constraint
    pub is_unique: bool,
    pub is_foreign_key: bool,
    pub is_self_reference: bool,
    pub is_auto_increment: bool,
    pub is_not_null: bool,
    /// Index into `TableSchema::foreign_keys`
    pub foreign_key: Option<usize>,
    pub range: Option<NumericRange>,
}

impl ColumnClass {
    /// Whether values of this column must not repeat.
    pub fn must_be_distinct(&self) -> bool {
        self.is_primary_key || self.is_unique || self.is_auto_increment
    }

    pub fn kinds(&self) -> SmallVec<[ConstraintKind; 4]> {
        let mut kinds = SmallVec::new();
        if self.is_primary_key {
            kinds.push(ConstraintKind::PrimaryKey);
        }
        if self.is_foreign_key {
            kinds.push(ConstraintKind::ForeignKey);
        }
        if self.is_unique {
            kinds.push(ConstraintKind::Unique);
        }
        if self.range.is_some() {
            kinds.push(ConstraintKind::Check);
        }
        if self.is_not_null {
            kinds.push(ConstraintKind::NotNull);
        }
        kinds
    }
}

/// Complete table schema definition
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Table ID within the schema
    pub id: TableId,
    /// Column definitions in order
    pub columns: Vec<Column>,
    /// Primary key column IDs (ordered for composite PKs)
    pub primary_key: Vec<ColumnId>,
    /// Foreign key constraints
    pub foreign_keys: Vec<ForeignKey>,
    /// UNIQUE constraints (the primary key is kept separately)
    pub unique_keys: Vec<UniqueKey>,
    pub checks: Vec<CheckConstraint>,
    /// Raw CREATE TABLE statement
    pub create_statement: Option<String>,
    /// Per-column classification, filled by [`Schema::finalize`]
    pub classes: Vec<ColumnClass>,
}

impl TableSchema {
    /// Create a new empty table schema
    pub fn new(name: String, id: TableId) -> Self {
        Self {
            name,
            id,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            unique_keys: Vec::new(),
            checks: Vec::new(),
            create_statement: None,
            classes: Vec::new(),
        }
    }

    /// Get a column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Get column ID by name
    pub fn get_column_id(&self, name: &str) -> Option<ColumnId> {
        self.get_column(name).map(|c| c.ordinal)
    }

    /// Get column by ID
    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.get(id.0 as usize)
    }

    /// Check if column is part of the primary key
    pub fn is_pk_column(&self, col_id: ColumnId) -> bool {
        self.primary_key.contains(&col_id)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn class(&self, col_id: ColumnId) -> &ColumnClass {
        static EMPTY: ColumnClass = ColumnClass {
            is_primary_key: false,
            is_unique: false,
            is_foreign_key: false,
            is_self_reference: false,
            is_auto_increment: false,
            is_not_null: false,
            foreign_key: None,
            range: None,
        };
        self.classes.get(col_id.0 as usize).unwrap_or(&EMPTY)
    }

    /// The primary key followed by every UNIQUE constraint.
    pub fn key_constraints(&self) -> Vec<UniqueKey> {
        let mut keys = Vec::with_capacity(self.unique_keys.len() + 1);
        if !self.primary_key.is_empty() {
            keys.push(UniqueKey {
                name: None,
                columns: self.primary_key.clone(),
                column_names: self
                    .primary_key
                    .iter()
                    .filter_map(|&id| self.column(id).map(|c| c.name.clone()))
                    .collect(),
                is_primary: true,
            });
        }
        keys.extend(self.unique_keys.iter().cloned());
        keys
    }

    /// Whether this table has an FK pointing back at itself
    pub fn has_self_reference(&self) -> bool {
        self.foreign_keys
            .iter()
            .any(|fk| fk.referenced_table_id == Some(self.id))
    }

    fn classify(&mut self) {
        let mut classes: Vec<ColumnClass> = self
            .columns
            .iter()
            .map(|c| ColumnClass {
                is_primary_key: c.is_primary_key || self.primary_key.contains(&c.ordinal),
                is_auto_increment: c.is_auto_increment,
                is_not_null: !c.is_nullable,
                ..ColumnClass::default()
            })
            .collect();

        for key in &self.unique_keys {
            for id in &key.columns {
                classes[id.0 as usize].is_unique = true;
            }
        }

        for (idx, fk) in self.foreign_keys.iter().enumerate() {
            let self_ref = fk.referenced_table_id == Some(self.id);
            for id in &fk.columns {
                let class = &mut classes[id.0 as usize];
                class.is_foreign_key = true;
                class.is_self_reference |= self_ref;
                class.foreign_key.get_or_insert(idx);
            }
        }

        for check in &self.checks {
            let (Some(col), Some(range)) = (&check.column, check.range) else {
                continue;
            };
            if let Some(id) = self.get_column_id(col) {
                let class = &mut classes[id.0 as usize];
                class.range = Some(match class.range {
                    Some(existing) => existing.intersect(range),
                    None => range,
                });
            }
        }

        self.classes = classes;
    }
}

/// Complete database schema
#[derive(Debug, Clone)]
pub struct Schema {
    /// Map from table name to table ID
    pub tables: AHashMap<String, TableId>,
    /// Table schemas indexed by TableId
    pub table_schemas: Vec<TableSchema>,
}

impl Schema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self {
            tables: AHashMap::new(),
            table_schemas: Vec::new(),
        }
    }

    /// Get table ID by name (case-insensitive)
    pub fn get_table_id(&self, name: &str) -> Option<TableId> {
        // Try exact match first
        if let Some(&id) = self.tables.get(name) {
            return Some(id);
        }
        // Try case-insensitive match
        let name_lower = name.to_lowercase();
        self.tables
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, &id)| id)
    }

    /// Get table schema by ID
    pub fn table(&self, id: TableId) -> Option<&TableSchema> {
        self.table_schemas.get(id.0 as usize)
    }

    /// Get mutable table schema by ID
    pub fn table_mut(&mut self, id: TableId) -> Option<&mut TableSchema> {
        self.table_schemas.get_mut(id.0 as usize)
    }

    /// Get table schema by name
    pub fn get_table(&self, name: &str) -> Option<&TableSchema> {
        self.get_table_id(name).and_then(|id| self.table(id))
    }

    /// Table name for an ID, or a placeholder for dangling IDs
    pub fn table_name(&self, id: TableId) -> &str {
        self.table(id).map(|t| t.name.as_str()).unwrap_or("<unknown>")
    }

    /// Add a new table schema, returning its ID
    pub fn add_table(&mut self, mut schema: TableSchema) -> TableId {
        let id = TableId(self.table_schemas.len() as u32);
        schema.id = id;
        self.tables.insert(schema.name.clone(), id);
        self.table_schemas.push(schema);
        id
    }

    /// Resolve all foreign key references to table IDs
    pub fn resolve_foreign_keys(&mut self) {
        let table_ids: AHashMap<String, TableId> = self.tables.clone();

        for table in &mut self.table_schemas {
            for fk in &mut table.foreign_keys {
                fk.referenced_table_id = table_ids
                    .get(&fk.referenced_table)
                    .or_else(|| {
                        // Case-insensitive fallback
                        let lower = fk.referenced_table.to_lowercase();
                        table_ids
                            .iter()
                            .find(|(k, _)| k.to_lowercase() == lower)
                            .map(|(_, v)| v)
                    })
                    .copied();
            }
        }
    }

    /// Resolve references, validate them and classify every column.
    ///
    /// Fails fast with [`SeedError::SchemaAnalysis`] when a foreign key
    /// names a table or column that does not exist.
    pub fn finalize(&mut self) -> Result<(), SeedError> {
        self.resolve_foreign_keys();
        self.validate()?;
        for table in &mut self.table_schemas {
            let pk = table.primary_key.clone();
            for id in pk {
                if let Some(col) = table.columns.get_mut(id.0 as usize) {
                    col.is_primary_key = true;
                    col.is_nullable = false;
                }
            }
            table.classify();
        }
        Ok(())
    }

    /// Check that every foreign key resolves to existing tables and columns.
    pub fn validate(&self) -> Result<(), SeedError> {
        for table in &self.table_schemas {
            for fk in &table.foreign_keys {
                let Some(parent_id) = fk.referenced_table_id else {
                    return Err(SeedError::SchemaAnalysis(format!(
                        "{}: foreign key ({}) references unknown table {}",
                        table.name,
                        fk.column_names.join(", "),
                        fk.referenced_table
                    )));
                };
                if fk.columns.len() != fk.column_names.len() {
                    return Err(SeedError::SchemaAnalysis(format!(
                        "{}: foreign key names unknown local column in ({})",
                        table.name,
                        fk.column_names.join(", ")
                    )));
                }
                if fk.referenced_columns.len() != fk.column_names.len() {
                    return Err(SeedError::SchemaAnalysis(format!(
                        "{}: foreign key ({}) has {} columns but references {}",
                        table.name,
                        fk.column_names.join(", "),
                        fk.column_names.len(),
                        fk.referenced_columns.len()
                    )));
                }
                let parent = &self.table_schemas[parent_id.0 as usize];
                if let Some(missing) = fk
                    .referenced_columns
                    .iter()
                    .find(|c| parent.get_column(c).is_none())
                {
                    return Err(SeedError::SchemaAnalysis(format!(
                        "{}: foreign key references unknown column {}.{}",
                        table.name, parent.name, missing
                    )));
                }
            }
            for key in &table.unique_keys {
                if key.columns.len() != key.column_names.len() {
                    return Err(SeedError::SchemaAnalysis(format!(
                        "{}: unique constraint names unknown column in ({})",
                        table.name,
                        key.label()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Get the number of tables
    pub fn len(&self) -> usize {
        self.table_schemas.len()
    }

    /// Check if schema is empty
    pub fn is_empty(&self) -> bool {
        self.table_schemas.is_empty()
    }

    /// Iterate over all table schemas
    pub fn iter(&self) -> impl Iterator<Item = &TableSchema> {
        self.table_schemas.iter()
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}
