//! Embedded DuckDB backend.

use super::sql::{
    after_predicate, insert_statement, key_predicate, not_null_predicate, quote_ident,
    select_text, update_statement,
};
use super::{DatabaseAccess, InsertOutcome};
use crate::error::{DbError, SeedError};
use crate::generator::{KeyTuple, Row, Value};
use crate::schema::{ColumnType, Schema, SchemaBuilder};
use duckdb::Connection;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use tracing::{debug, info};

/// Maximum tuples per UPDATE statement
const UPDATE_CHUNK: usize = 1000;

impl From<duckdb::Error> for DbError {
    fn from(e: duckdb::Error) -> Self {
        classify(&e.to_string())
    }
}

/// Error classes DuckDB raises for a single bad row rather than a broken statement
const ROW_ERRORS: [&str; 4] = [
    "Constraint Error",
    "Conversion Error",
    "Out of Range Error",
    "Invalid Input Error",
];

/// Map a DuckDB error message onto the error kinds the pipeline reacts to
fn classify(message: &str) -> DbError {
    if ROW_ERRORS.iter().any(|class| message.contains(class)) {
        DbError::ConstraintViolation {
            table: String::new(),
            message: message.to_string(),
        }
    } else if message.contains("Table with name") && message.contains("does not exist") {
        let table = message
            .split("Table with name ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or_default()
            .to_string();
        DbError::TableNotFound(table)
    } else {
        DbError::Backend(message.to_string())
    }
}

/// A DuckDB database shared by every worker of a run.
///
/// DuckDB serializes writers on a single connection, so the connection sits
/// behind a mutex rather than being cloned per worker.
pub struct DuckDbDatabase {
    conn: Mutex<Connection>,
    schema: RwLock<Option<Schema>>,
}

impl DuckDbDatabase {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened DuckDB database");
        Ok(Self::with_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self::with_connection(Connection::open_in_memory()?))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            schema: RwLock::new(None),
        }
    }

    /// Run a script of statements, e.g. the DDL of a fresh database.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.conn.lock().execute_batch(sql)?;
        *self.schema.write() = None;
        Ok(())
    }

    /// Column types used to parse text read back from the database
    fn column_types(
        &self,
        table: &str,
        columns: &[String],
    ) -> Result<Vec<(ColumnType, Option<u8>)>, DbError> {
        if self.schema.read().is_none() {
            let schema = self
                .load_schema()
                .map_err(|e| DbError::Backend(e.to_string()))?;
            *self.schema.write() = Some(schema);
        }
        let guard = self.schema.read();
        let schema = guard
            .as_ref()
            .ok_or_else(|| DbError::Backend("schema unavailable".to_string()))?;
        let table_schema = schema
            .get_table(table)
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))?;
        columns
            .iter()
            .map(|name| {
                table_schema
                    .get_column(name)
                    .map(|c| (c.col_type.clone(), c.scale))
                    .ok_or_else(|| DbError::ColumnNotFound {
                        table: table.to_string(),
                        column: name.clone(),
                    })
            })
            .collect()
    }

    fn load_schema(&self) -> Result<Schema, SeedError> {
        let conn = self.conn.lock();
        let mut script = String::new();

        let mut stmt = conn
            .prepare("SELECT sql FROM duckdb_tables() WHERE schema_name = 'main' AND NOT internal ORDER BY table_name")
            .map_err(DbError::from)?;
        let mut rows = stmt.query([]).map_err(DbError::from)?;
        while let Some(row) = rows.next().map_err(DbError::from)? {
            if let Some(sql) = row.get::<_, Option<String>>(0).map_err(DbError::from)? {
                script.push_str(sql.trim_end_matches(';'));
                script.push_str(";\n");
            }
        }

        // Unique indexes created outside CREATE TABLE
        let mut stmt = conn
            .prepare("SELECT sql FROM duckdb_indexes() WHERE schema_name = 'main' AND is_unique")
            .map_err(DbError::from)?;
        let mut rows = stmt.query([]).map_err(DbError::from)?;
        while let Some(row) = rows.next().map_err(DbError::from)? {
            if let Some(sql) = row.get::<_, Option<String>>(0).map_err(DbError::from)? {
                script.push_str(sql.trim_end_matches(';'));
                script.push_str(";\n");
            }
        }

        SchemaBuilder::from_ddl(&script)
    }

    /// Run a SELECT whose cells are all VARCHAR and parse them back into values
    fn query_rows(
        &self,
        sql: &str,
        types: &[(ColumnType, Option<u8>)],
    ) -> Result<Vec<Row>, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(types.len());
            for (i, (col_type, scale)) in types.iter().enumerate() {
                let cell: Option<String> = row.get(i)?;
                let value = cell
                    .and_then(|raw| Value::parse_typed(&raw, col_type, *scale))
                    .unwrap_or(Value::Null);
                values.push(value);
            }
            out.push(values);
        }
        Ok(out)
    }

    /// Insert rows one at a time after a batch statement was refused
    fn insert_each(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<InsertOutcome, DbError> {
        let conn = self.conn.lock();
        let mut outcome = InsertOutcome::default();
        for row in rows {
            let sql = insert_statement(table, columns, std::slice::from_ref(row));
            match conn.execute(&sql, []) {
                Ok(n) => outcome.inserted += n as u64,
                Err(e) => match with_table(classify(&e.to_string()), table) {
                    DbError::ConstraintViolation { message, .. } => {
                        debug!(table, %message, "row rejected");
                        outcome.rejected += 1;
                    }
                    other => return Err(other),
                },
            }
        }
        Ok(outcome)
    }
}

fn with_table(err: DbError, table: &str) -> DbError {
    match err {
        DbError::ConstraintViolation { message, .. } => DbError::ConstraintViolation {
            table: table.to_string(),
            message,
        },
        other => other,
    }
}

impl DatabaseAccess for DuckDbDatabase {
    fn name(&self) -> &str {
        "duckdb"
    }

    fn introspect(&self) -> Result<Schema, SeedError> {
        let schema = self.load_schema()?;
        *self.schema.write() = Some(schema.clone());
        Ok(schema)
    }

    fn insert_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<InsertOutcome, DbError> {
        let sql = insert_statement(table, columns, rows);
        if sql.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let result = self.conn.lock().execute(&sql, []);
        match result {
            Ok(n) => Ok(InsertOutcome {
                inserted: n as u64,
                rejected: 0,
            }),
            // A missing table or column fails every row alike; anything else
            // may be one bad row, so retry singly and reject only that one.
            Err(e) => match with_table(classify(&e.to_string()), table) {
                err @ (DbError::TableNotFound(_) | DbError::ColumnNotFound { .. }) => Err(err),
                err => {
                    debug!(table, error = %err, "batch refused, inserting row by row");
                    self.insert_each(table, columns, rows)
                }
            },
        }
    }

    fn count_rows(&self, table: &str) -> Result<u64, DbError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn sample_rows(
        &self,
        table: &str,
        columns: &[String],
        limit: usize,
    ) -> Result<Vec<Row>, DbError> {
        if limit == 0 || columns.is_empty() {
            return Ok(Vec::new());
        }
        let types = self.column_types(table, columns)?;
        let sql = format!("{} USING SAMPLE {} ROWS", select_text(table, columns), limit);
        self.query_rows(&sql, &types)
    }

    fn column_values(
        &self,
        table: &str,
        columns: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<KeyTuple>, DbError> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let types = self.column_types(table, columns)?;
        let mut sql = format!(
            "SELECT DISTINCT {} WHERE {}",
            select_text(table, columns).trim_start_matches("SELECT "),
            not_null_predicate(columns)
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(self
            .query_rows(&sql, &types)?
            .into_iter()
            .map(KeyTuple::from_vec)
            .collect())
    }

    fn key_page(
        &self,
        table: &str,
        columns: &[String],
        after: Option<&KeyTuple>,
        limit: usize,
    ) -> Result<Vec<KeyTuple>, DbError> {
        if columns.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let types = self.column_types(table, columns)?;
        let mut predicate = not_null_predicate(columns);
        if let Some(after) = after {
            predicate = format!("{} AND ({})", predicate, after_predicate(columns, after));
        }
        let order = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "{} WHERE {} GROUP BY {} ORDER BY {} LIMIT {}",
            select_text(table, columns),
            predicate,
            order,
            order,
            limit
        );
        Ok(self
            .query_rows(&sql, &types)?
            .into_iter()
            .map(KeyTuple::from_vec)
            .collect())
    }

    fn max_integer(&self, table: &str, column: &str) -> Result<Option<i64>, DbError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT CAST(MAX({}) AS BIGINT) FROM {}",
            quote_ident(column),
            quote_ident(table)
        );
        Ok(conn.query_row(&sql, [], |row| row.get::<_, Option<i64>>(0))?)
    }

    fn update_rows(
        &self,
        table: &str,
        key_columns: &[String],
        set_columns: &[String],
        updates: &[(KeyTuple, KeyTuple)],
    ) -> Result<u64, DbError> {
        let conn = self.conn.lock();
        let mut changed = 0u64;
        for chunk in updates.chunks(UPDATE_CHUNK) {
            let sql = update_statement(table, key_columns, set_columns, chunk);
            changed += conn
                .execute(&sql, [])
                .map_err(|e| with_table(e.into(), table))? as u64;
        }
        Ok(changed)
    }

    fn contains_key(
        &self,
        table: &str,
        columns: &[String],
        tuple: &KeyTuple,
    ) -> Result<bool, DbError> {
        if tuple.iter().any(Value::is_null) {
            return Ok(false);
        }
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {})",
            quote_ident(table),
            key_predicate(columns, tuple)
        );
        Ok(conn.query_row(&sql, [], |row| row.get::<_, bool>(0))?)
    }

    fn truncate(&self, table: &str) -> Result<(), DbError> {
        self.conn
            .lock()
            .execute(&format!("DELETE FROM {}", quote_ident(table)), [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn db() -> DuckDbDatabase {
        let db = DuckDbDatabase::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR UNIQUE, score DECIMAL(6,2));
             CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL REFERENCES users(id));",
        )
        .unwrap();
        db
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_introspect() {
        let schema = db().introspect().unwrap();
        assert_eq!(schema.len(), 2);
        let orders = schema.get_table("orders").unwrap();
        assert_eq!(orders.foreign_keys.len(), 1);
        assert_eq!(orders.foreign_keys[0].referenced_table, "users");
    }

    #[test]
    fn test_insert_rejects_duplicates_row_by_row() {
        let db = db();
        let columns = cols(&["id", "email", "score"]);
        let rows = vec![
            vec![Value::Int(1), Value::Text("a@x".into()), Value::decimal(1.5, 2)],
            vec![Value::Int(2), Value::Text("a@x".into()), Value::Null],
            vec![Value::Int(3), Value::Text("c@x".into()), Value::Null],
        ];
        let outcome = db.insert_batch("users", &columns, &rows).unwrap();
        assert_eq!(outcome, InsertOutcome { inserted: 2, rejected: 1 });
        assert_eq!(db.count_rows("users").unwrap(), 2);
        assert_eq!(db.max_integer("users", "id").unwrap(), Some(3));
    }

    #[test]
    fn test_reads_parse_values() {
        let db = db();
        let rows = vec![vec![Value::Int(7), Value::Text("x@y".into()), Value::decimal(12.25, 2)]];
        db.insert_batch("users", &cols(&["id", "email", "score"]), &rows)
            .unwrap();

        let sample = db.sample_rows("users", &cols(&["id", "score"]), 10).unwrap();
        assert_eq!(sample, vec![vec![Value::Int(7), Value::decimal(12.25, 2)]]);

        let keys = db.column_values("users", &cols(&["id"]), None).unwrap();
        assert_eq!(keys, vec![smallvec![Value::Int(7)] as KeyTuple]);
        assert!(db
            .contains_key("users", &cols(&["id"]), &smallvec![Value::Int(7)])
            .unwrap());
        assert!(!db
            .contains_key("users", &cols(&["id"]), &smallvec![Value::Int(8)])
            .unwrap());
    }

    #[test]
    fn test_out_of_range_row_is_rejected_alone() {
        let db = DuckDbDatabase::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, qty SMALLINT, flag TINYINT);")
            .unwrap();
        let rows = vec![
            vec![Value::Int(1), Value::Int(30_000), Value::Int(1)],
            vec![Value::Int(2), Value::Int(70_000), Value::Int(0)],
            vec![Value::Int(3), Value::Int(5), Value::Int(300)],
            vec![Value::Int(4), Value::Int(-5), Value::Int(-128)],
        ];
        let outcome = db
            .insert_batch("t", &cols(&["id", "qty", "flag"]), &rows)
            .unwrap();
        assert_eq!(outcome, InsertOutcome { inserted: 2, rejected: 2 });
        assert_eq!(db.count_rows("t").unwrap(), 2);
    }

    #[test]
    fn test_classify_row_errors() {
        let conversion =
            classify("Conversion Error: Type INT32 with value 70000 can't be cast because the value is out of range for the destination type INT16");
        assert!(matches!(conversion, DbError::ConstraintViolation { .. }));
        let duplicate = classify("Constraint Error: Duplicate key \"id: 1\" violates primary key constraint");
        assert!(matches!(duplicate, DbError::ConstraintViolation { .. }));
        let missing = classify("Catalog Error: Table with name nope does not exist!");
        assert!(matches!(missing, DbError::TableNotFound(ref t) if t == "nope"));
    }

    #[test]
    fn test_key_pages_follow_key_order() {
        let db = db();
        let rows: Vec<_> = [5, 1, 4, 2, 3]
            .into_iter()
            .map(|id| vec![Value::Int(id)])
            .collect();
        db.insert_batch("users", &cols(&["id"]), &rows).unwrap();

        let id = cols(&["id"]);
        let first = db.key_page("users", &id, None, 2).unwrap();
        assert_eq!(first, vec![smallvec![Value::Int(1)], smallvec![Value::Int(2)]] as Vec<KeyTuple>);
        let rest = db.key_page("users", &id, first.last(), 10).unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0], smallvec![Value::Int(3)] as KeyTuple);
        assert!(db.key_page("users", &id, rest.last(), 10).unwrap().is_empty());
    }

    #[test]
    fn test_missing_table() {
        let err = db()
            .insert_batch("nope", &cols(&["id"]), &[vec![Value::Int(1)]])
            .unwrap_err();
        assert!(matches!(err, DbError::TableNotFound(_) | DbError::Backend(_)));
    }

    #[test]
    fn test_truncate() {
        let db = db();
        db.insert_batch("users", &cols(&["id"]), &[vec![Value::Int(1)]])
            .unwrap();
        db.truncate("users").unwrap();
        assert_eq!(db.count_rows("users").unwrap(), 0);
    }
}
