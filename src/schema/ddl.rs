//! DDL parsing for schema extraction.
//!
//! Parses CREATE TABLE, ALTER TABLE and CREATE UNIQUE INDEX statements to extract:
//! - Column definitions with types, lengths, defaults and auto-increment
//! - Primary key and UNIQUE constraints (inline and table-level)
//! - Foreign key constraints (inline REFERENCES and table-level)
//! - CHECK constraints, with numeric ranges for simple comparisons

use super::{
    CheckConstraint, Column, ColumnId, ColumnType, ForeignKey, NumericRange, Schema, TableId,
    TableSchema, UniqueKey,
};
use crate::error::SeedError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Bound;

/// Regex to extract table name from CREATE TABLE
/// Supports: `table` (MySQL), "table" (PostgreSQL), [table] (MSSQL), table (SQLite/unquoted), schema.table
static CREATE_TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)CREATE\s+(?:TEMP(?:ORARY)?\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:[\[\]`"\w]+\s*\.\s*)*[\[`"]?([^\[\]`"\s(]+)[\]`"]?"#)
        .unwrap()
});

/// Regex to extract table name from ALTER TABLE
static ALTER_TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)ALTER\s+TABLE\s+(?:ONLY\s+)?(?:[\[\]`"\w]+\s*\.\s*)*[\[`"]?([^\[\]`"\s]+)[\]`"]?"#).unwrap()
});

/// Regex for column definition: name followed by type with optional parameters
static COLUMN_DEF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*[\[`"]?([^\[\]`"\s,]+)[\]`"]?\s+(\w+(?:\s*\([^)]*\))?(?:\s+unsigned)?)"#)
        .unwrap()
});

/// Numeric type parameters: (length) or (precision, scale)
static TYPE_PARAMS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)").unwrap());

/// Quoted ENUM member
static ENUM_VALUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"'((?:[^']|'')*)'").unwrap());

/// Regex for PRIMARY KEY constraint
/// Supports MSSQL CLUSTERED/NONCLUSTERED keywords: PRIMARY KEY CLUSTERED ([col])
static PRIMARY_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)PRIMARY\s+KEY\s*(?:CLUSTERED\s+|NONCLUSTERED\s+)?\(([^)]+)\)").unwrap()
});

/// Regex for inline PRIMARY KEY on column
static INLINE_PRIMARY_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bPRIMARY\s+KEY\b").unwrap());

/// Regex for FOREIGN KEY constraint with optional constraint name
static FOREIGN_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?:CONSTRAINT\s+[\[`"]?([^\[\]`"\s]+)[\]`"]?\s+)?FOREIGN\s+KEY\s*\(([^)]+)\)\s*REFERENCES\s+(?:[\[\]`"\w]+\s*\.\s*)*[\[`"]?([^\[\]`"\s(]+)[\]`"]?\s*\(([^)]+)\)"#,
    )
    .unwrap()
});

/// Inline `REFERENCES parent(col)` on a column definition
static INLINE_REFERENCES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\bREFERENCES\s+(?:[\[\]`"\w]+\s*\.\s*)*[\[`"]?([^\[\]`"\s(]+)[\]`"]?\s*\(([^)]+)\)"#,
    )
    .unwrap()
});

/// Table-level UNIQUE: UNIQUE (a, b), UNIQUE KEY name (a), CONSTRAINT name UNIQUE (a)
static TABLE_UNIQUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)^(?:CONSTRAINT\s+[\[`"]?(\w+)[\]`"]?\s+)?UNIQUE\s*(?:KEY|INDEX)?\s*(?:[\[`"]?(\w+)[\]`"]?\s*)?\(([^)]+)\)"#,
    )
    .unwrap()
});

/// Inline UNIQUE on a column definition
static INLINE_UNIQUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bUNIQUE\b").unwrap());

/// Regex to detect NOT NULL constraint
static NOT_NULL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bNOT\s+NULL\b").unwrap());

static AUTO_INCREMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:AUTO_INCREMENT|AUTOINCREMENT|IDENTITY|GENERATED\s+(?:ALWAYS|BY\s+DEFAULT)\s+AS\s+IDENTITY)\b",
    )
    .unwrap()
});

static DEFAULT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bDEFAULT\s+('(?:[^']|'')*'|\([^)]*\)|[^\s,()]+(?:\([^)]*\))?)").unwrap()
});

static CHECK_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bCHECK\s*\(").unwrap());

/// Table-level clause (as opposed to a column definition)
static CONSTRAINT_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:PRIMARY\s+KEY|CONSTRAINT|FOREIGN\s+KEY|UNIQUE|KEY|INDEX|FULLTEXT|SPATIAL|CHECK)\b",
    )
    .unwrap()
});

/// `ADD` clause separator in ALTER TABLE
static ALTER_ADD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bADD\s+").unwrap());

/// Regex for CREATE UNIQUE INDEX statement
static CREATE_UNIQUE_INDEX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)CREATE\s+UNIQUE\s+(?:CLUSTERED\s+|NONCLUSTERED\s+)?INDEX\s+(?:IF\s+NOT\s+EXISTS\s+)?[\[`"]?(\w+)[\]`"]?\s+ON\s+(?:[\[\]`"\w]+\s*\.\s*)*[\[`"]?(\w+)[\]`"]?\s*(?:USING\s+\w+\s*)?\(([^)]+)\)"#,
    )
    .unwrap()
});

static BETWEEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^[\[`"]?(\w+)[\]`"]?\s+BETWEEN\s+(-?\d+(?:\.\d+)?)\s+AND\s+(-?\d+(?:\.\d+)?)$"#)
        .unwrap()
});

static COMPARISON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[\[`"]?([A-Za-z_]\w*)[\]`"]?\s*(>=|<=|>|<)\s*(-?\d+(?:\.\d+)?)$"#).unwrap()
});

static REVERSED_COMPARISON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(-?\d+(?:\.\d+)?)\s*(>=|<=|>|<)\s*[\[`"]?([A-Za-z_]\w*)[\]`"]?$"#).unwrap()
});

static AND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+AND\s+").unwrap());

/// Builder for constructing schema from DDL statements
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Create a new schema builder
    pub fn new() -> Self {
        Self {
            schema: Schema::new(),
        }
    }

    /// Parse a whole DDL script and build the schema.
    pub fn from_ddl(sql: &str) -> Result<Schema, SeedError> {
        let mut builder = Self::new();
        for stmt in split_statements(sql) {
            builder.parse_statement(&stmt);
        }
        builder.build()
    }

    /// Dispatch one statement to the matching parser; other statements are ignored.
    pub fn parse_statement(&mut self, stmt: &str) -> Option<TableId> {
        let upper = stmt.trim_start().to_uppercase();
        if upper.starts_with("CREATE") && CREATE_UNIQUE_INDEX_RE.is_match(stmt) {
            self.parse_create_index(stmt)
        } else if upper.starts_with("CREATE") && CREATE_TABLE_NAME_RE.is_match(stmt) {
            self.parse_create_table(stmt)
        } else if upper.starts_with("ALTER") {
            self.parse_alter_table(stmt)
        } else {
            None
        }
    }

    /// Parse a CREATE TABLE statement and add to schema
    pub fn parse_create_table(&mut self, stmt: &str) -> Option<TableId> {
        let table_name = extract_create_table_name(stmt)?;

        // Check if table already exists
        if self.schema.get_table_id(&table_name).is_some() {
            return self.schema.get_table_id(&table_name);
        }

        let mut table = TableSchema::new(table_name, TableId(0));
        table.create_statement = Some(stmt.to_string());

        let body = extract_parenthesized(stmt)?;
        parse_table_body(&body, &mut table);

        Some(self.schema.add_table(table))
    }

    /// Parse an ALTER TABLE statement and update existing table
    pub fn parse_alter_table(&mut self, stmt: &str) -> Option<TableId> {
        let table_name = extract_alter_table_name(stmt)?;
        let table_id = self.schema.get_table_id(&table_name)?;
        let table = self.schema.table_mut(table_id)?;

        for clause in ALTER_ADD_RE.split(stmt).skip(1) {
            let clause = clause.trim().trim_end_matches(';').trim();
            if CONSTRAINT_START_RE.is_match(clause) {
                apply_constraint_clause(clause, table);
            }
        }

        Some(table_id)
    }

    /// Parse a CREATE UNIQUE INDEX statement into a UNIQUE constraint
    pub fn parse_create_index(&mut self, stmt: &str) -> Option<TableId> {
        let caps = CREATE_UNIQUE_INDEX_RE.captures(stmt)?;

        let index_name = caps.get(1)?.as_str().to_string();
        let table_name = caps.get(2)?.as_str().to_string();
        let columns = parse_column_list(caps.get(3)?.as_str());

        let table_id = self.schema.get_table_id(&table_name)?;
        if let Some(table) = self.schema.table_mut(table_id) {
            push_unique(table, Some(index_name), columns);
        }

        Some(table_id)
    }

    /// Finalize the schema, resolving and validating all FK references
    pub fn build(mut self) -> Result<Schema, SeedError> {
        self.schema.finalize()?;
        Ok(self.schema)
    }

    /// Get current schema (for inspection during building)
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Extract table name from CREATE TABLE statement
pub fn extract_create_table_name(stmt: &str) -> Option<String> {
    CREATE_TABLE_NAME_RE
        .captures(stmt)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract table name from ALTER TABLE statement
pub fn extract_alter_table_name(stmt: &str) -> Option<String> {
    ALTER_TABLE_NAME_RE
        .captures(stmt)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Split a script into statements on `;`, ignoring separators inside quotes
/// and dropping `--` line comments.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;

    for line in sql.lines() {
        let mut chars = line.chars().peekable();
        while let Some(ch) = chars.next() {
            if !in_string && ch == '-' && chars.peek() == Some(&'-') {
                break;
            }
            if ch == '\'' {
                in_string = !in_string;
            }
            if ch == ';' && !in_string {
                if !current.trim().is_empty() {
                    statements.push(current.trim().to_string());
                }
                current.clear();
                continue;
            }
            current.push(ch);
        }
        current.push('\n');
    }

    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }

    statements
}

/// Extract the text between the first `(` and its matching `)`
fn extract_parenthesized(stmt: &str) -> Option<String> {
    let bytes = stmt.as_bytes();
    let mut depth = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }

        if b == b'\\' && in_string {
            escape_next = true;
            continue;
        }

        if b == b'\'' {
            in_string = !in_string;
            continue;
        }

        if in_string {
            continue;
        }

        if b == b'(' {
            if depth == 0 {
                start = Some(i + 1);
            }
            depth += 1;
        } else if b == b')' {
            depth -= 1;
            if depth == 0 {
                if let Some(s) = start {
                    return Some(stmt[s..i].to_string());
                }
            }
        }
    }

    None
}

/// Parse the body of a CREATE TABLE to extract columns and constraints
fn parse_table_body(body: &str, table: &mut TableSchema) {
    for part in split_table_body(body) {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }

        if CONSTRAINT_START_RE.is_match(trimmed) {
            apply_constraint_clause(trimmed, table);
        } else if let Some(col) = parse_column_def(trimmed, ColumnId(table.columns.len() as u16))
        {
            apply_inline_constraints(trimmed, &col, table);
            table.columns.push(col);
        }
    }
}

/// Apply a table-level PRIMARY KEY / FOREIGN KEY / UNIQUE / CHECK clause
fn apply_constraint_clause(clause: &str, table: &mut TableSchema) {
    if let Some(pk_cols) = parse_primary_key_constraint(clause) {
        for col_name in pk_cols {
            if let Some(col) = table
                .columns
                .iter_mut()
                .find(|c| c.name.eq_ignore_ascii_case(&col_name))
            {
                col.is_primary_key = true;
                col.is_nullable = false;
                if !table.primary_key.contains(&col.ordinal) {
                    table.primary_key.push(col.ordinal);
                }
            }
        }
        return;
    }

    let fks = parse_foreign_keys(clause);
    if !fks.is_empty() {
        for fk in fks {
            push_foreign_key(table, fk);
        }
        return;
    }

    if let Some(caps) = TABLE_UNIQUE_RE.captures(clause) {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string());
        let columns = caps
            .get(3)
            .map(|m| parse_column_list(m.as_str()))
            .unwrap_or_default();
        push_unique(table, name, columns);
        return;
    }

    if let Some(check) = parse_check(clause) {
        table.checks.push(check);
    }
}

/// Apply PRIMARY KEY / UNIQUE / REFERENCES / CHECK written on the column itself
fn apply_inline_constraints(def: &str, col: &Column, table: &mut TableSchema) {
    if col.is_primary_key {
        table.primary_key.push(col.ordinal);
    }

    // Strip CHECK bodies and references before looking for UNIQUE
    let head = CHECK_KEYWORD_RE
        .find(def)
        .map(|m| &def[..m.start()])
        .unwrap_or(def);
    if INLINE_UNIQUE_RE.is_match(head) && !col.is_primary_key {
        table.unique_keys.push(UniqueKey {
            name: None,
            columns: vec![col.ordinal],
            column_names: vec![col.name.clone()],
            is_primary: false,
        });
    }

    if let Some(caps) = INLINE_REFERENCES_RE.captures(def) {
        let referenced_table = caps.get(1).map(|m| m.as_str().to_string());
        let referenced_columns = caps
            .get(2)
            .map(|m| parse_column_list(m.as_str()))
            .unwrap_or_default();
        if let Some(referenced_table) = referenced_table {
            table.foreign_keys.push(ForeignKey {
                name: None,
                columns: vec![col.ordinal],
                column_names: vec![col.name.clone()],
                referenced_table,
                referenced_columns,
                referenced_table_id: None,
            });
        }
    }

    if let Some(mut check) = parse_check(def) {
        if check.column.is_none() {
            check.column = Some(col.name.clone());
        }
        table.checks.push(check);
    }
}

fn push_foreign_key(table: &mut TableSchema, mut fk: ForeignKey) {
    fk.columns = fk
        .column_names
        .iter()
        .filter_map(|name| table.get_column_id(name))
        .collect();
    table.foreign_keys.push(fk);
}

fn push_unique(table: &mut TableSchema, name: Option<String>, column_names: Vec<String>) {
    if column_names.is_empty() {
        return;
    }
    let columns: Vec<ColumnId> = column_names
        .iter()
        .filter_map(|n| table.get_column_id(n))
        .collect();
    if !table.primary_key.is_empty() && columns == table.primary_key {
        return;
    }
    if table.unique_keys.iter().any(|k| k.columns == columns) {
        return;
    }
    table.unique_keys.push(UniqueKey {
        name,
        columns,
        column_names,
        is_primary: false,
    });
}

/// Split table body by commas, respecting nested parentheses
pub fn split_table_body(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for ch in body.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        if ch == '\\' && in_string {
            current.push(ch);
            escape_next = true;
            continue;
        }

        if ch == '\'' {
            in_string = !in_string;
            current.push(ch);
            continue;
        }

        if in_string {
            current.push(ch);
            continue;
        }

        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }

    parts
}

/// Parse a column definition
fn parse_column_def(def: &str, ordinal: ColumnId) -> Option<Column> {
    let caps = COLUMN_DEF_RE.captures(def)?;
    let name = caps.get(1)?.as_str().to_string();
    let type_str = caps.get(2)?.as_str();
    let type_lower = type_str.to_lowercase();

    let col_type = ColumnType::from_sql_type(type_str);
    let mut col = Column::new(name, col_type, ordinal);
    col.is_nullable = !NOT_NULL_RE.is_match(def);
    col.is_primary_key = INLINE_PRIMARY_KEY_RE.is_match(def);
    if col.is_primary_key {
        col.is_nullable = false;
    }

    if let Some(params) = TYPE_PARAMS_RE.captures(type_str) {
        let first = params.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
        let second = params.get(2).and_then(|m| m.as_str().parse::<u8>().ok());
        match col.col_type {
            ColumnType::Decimal => {
                col.precision = first.map(|p| p.min(38) as u8);
                col.scale = second.or(Some(0));
            }
            ColumnType::Text | ColumnType::Binary => col.max_length = first,
            _ => {}
        }
    }

    if col.col_type == ColumnType::Enum {
        col.enum_values = ENUM_VALUE_RE
            .captures_iter(type_str)
            .filter_map(|c| c.get(1).map(|m| m.as_str().replace("''", "'")))
            .collect();
    }

    if let Some(caps) = DEFAULT_RE.captures(def) {
        let raw = caps.get(1).map(|m| m.as_str().to_string());
        if let Some(raw) = raw {
            if raw.to_lowercase().starts_with("nextval") {
                col.is_auto_increment = true;
            } else if !raw.eq_ignore_ascii_case("null") {
                col.default = Some(raw);
            }
        }
    }

    col.is_auto_increment |= AUTO_INCREMENT_RE.is_match(def) || type_lower.contains("serial");

    Some(col)
}

/// Parse PRIMARY KEY constraint, returns column names
fn parse_primary_key_constraint(constraint: &str) -> Option<Vec<String>> {
    let caps = PRIMARY_KEY_RE.captures(constraint)?;
    let cols_str = caps.get(1)?.as_str();
    Some(parse_column_list(cols_str))
}

/// Parse FOREIGN KEY constraints from a statement
fn parse_foreign_keys(stmt: &str) -> Vec<ForeignKey> {
    let mut fks = Vec::new();

    for caps in FOREIGN_KEY_RE.captures_iter(stmt) {
        let name = caps.get(1).map(|m| m.as_str().to_string());
        let local_cols = caps
            .get(2)
            .map(|m| parse_column_list(m.as_str()))
            .unwrap_or_default();
        let ref_table = caps
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let ref_cols = caps
            .get(4)
            .map(|m| parse_column_list(m.as_str()))
            .unwrap_or_default();

        if !local_cols.is_empty() && !ref_table.is_empty() && !ref_cols.is_empty() {
            fks.push(ForeignKey {
                name,
                columns: Vec::new(), // Will be resolved later
                column_names: local_cols,
                referenced_table: ref_table,
                referenced_columns: ref_cols,
                referenced_table_id: None,
            });
        }
    }

    fks
}

/// Parse a CHECK (...) clause found anywhere in `text`
fn parse_check(text: &str) -> Option<CheckConstraint> {
    let m = CHECK_KEYWORD_RE.find(text)?;
    let expression = extract_parenthesized(&text[m.start()..])?;
    let parsed = parse_check_range(&expression);
    Some(CheckConstraint {
        expression: expression.trim().to_string(),
        column: parsed.as_ref().map(|(c, _)| c.clone()),
        range: parsed.map(|(_, r)| r),
    })
}

/// Parse a numeric range from a simple CHECK expression.
///
/// Recognises `col >= a`, `col <= b`, `col > a`, `col < b`, `a <= col`,
/// `col BETWEEN a AND b` and conjunctions of those over a single column.
pub fn parse_check_range(expression: &str) -> Option<(String, NumericRange)> {
    let expr = strip_outer_parens(expression);

    if let Some(caps) = BETWEEN_RE.captures(expr) {
        let column = caps.get(1)?.as_str().to_string();
        let lo: f64 = caps.get(2)?.as_str().parse().ok()?;
        let hi: f64 = caps.get(3)?.as_str().parse().ok()?;
        return Some((
            column,
            NumericRange {
                min: Bound::Included(lo),
                max: Bound::Included(hi),
            },
        ));
    }

    let mut column: Option<String> = None;
    let mut range = NumericRange::unbounded();

    for part in AND_RE.split(expr) {
        let part = strip_outer_parens(part);
        let (name, op, value) = if let Some(caps) = COMPARISON_RE.captures(part) {
            (
                caps.get(1)?.as_str().to_string(),
                caps.get(2)?.as_str().to_string(),
                caps.get(3)?.as_str().parse::<f64>().ok()?,
            )
        } else if let Some(caps) = REVERSED_COMPARISON_RE.captures(part) {
            // a <= col is col >= a
            let flipped = match caps.get(2)?.as_str() {
                "<=" => ">=",
                "<" => ">",
                ">=" => "<=",
                _ => "<",
            };
            (
                caps.get(3)?.as_str().to_string(),
                flipped.to_string(),
                caps.get(1)?.as_str().parse::<f64>().ok()?,
            )
        } else {
            return None;
        };

        match &column {
            Some(existing) if !existing.eq_ignore_ascii_case(&name) => return None,
            None => column = Some(name),
            _ => {}
        }

        let bound = match op.as_str() {
            ">=" => NumericRange {
                min: Bound::Included(value),
                max: Bound::Unbounded,
            },
            ">" => NumericRange {
                min: Bound::Excluded(value),
                max: Bound::Unbounded,
            },
            "<=" => NumericRange {
                min: Bound::Unbounded,
                max: Bound::Included(value),
            },
            _ => NumericRange {
                min: Bound::Unbounded,
                max: Bound::Excluded(value),
            },
        };
        range = range.intersect(bound);
    }

    column.map(|c| (c, range))
}

/// Remove parentheses that wrap the whole expression
fn strip_outer_parens(s: &str) -> &str {
    let mut current = s.trim();
    while current.starts_with('(') && current.ends_with(')') {
        let inner = &current[1..current.len() - 1];
        // Only strip when the opening paren closes at the very end
        let mut depth = 0i32;
        let balanced = inner.chars().all(|c| {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            depth >= 0
        });
        if !balanced || depth != 0 {
            break;
        }
        current = inner.trim();
    }
    current
}

/// Parse a comma-separated column list, stripping quotes (backticks, double quotes, brackets)
pub fn parse_column_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|c| {
            c.trim()
                .trim_matches('`')
                .trim_matches('"')
                .trim_matches('[')
                .trim_matches(']')
                .to_string()
        })
        .filter(|c| !c.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_range_forms() {
        let (col, r) = parse_check_range("price >= 0").unwrap();
        assert_eq!(col, "price");
        assert_eq!(r.min, Bound::Included(0.0));
        assert_eq!(r.max, Bound::Unbounded);

        let (_, r) = parse_check_range("((qty > 0) AND (qty <= 100))").unwrap();
        assert_eq!(r.min, Bound::Excluded(0.0));
        assert_eq!(r.max, Bound::Included(100.0));

        let (_, r) = parse_check_range("rating BETWEEN 1 AND 5").unwrap();
        assert!(r.contains(1.0) && r.contains(5.0) && !r.contains(6.0));

        let (col, r) = parse_check_range("0 <= score").unwrap();
        assert_eq!(col, "score");
        assert_eq!(r.min, Bound::Included(0.0));
    }

    #[test]
    fn test_parse_check_range_rejects_complex() {
        assert!(parse_check_range("a > b").is_none());
        assert!(parse_check_range("a > 0 AND b < 5").is_none());
        assert!(parse_check_range("status IN ('a', 'b')").is_none());
    }

    #[test]
    fn test_split_statements_ignores_quoted_semicolons() {
        let sql = "CREATE TABLE a (x TEXT DEFAULT ';'); -- trailing; comment\nCREATE TABLE b (y INT);";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("';'"));
    }

    #[test]
    fn test_strip_outer_parens_keeps_partial() {
        assert_eq!(strip_outer_parens("((a > 1))"), "a > 1");
        assert_eq!(strip_outer_parens("(a > 1) AND (b < 2)"), "(a > 1) AND (b < 2)");
    }
}
