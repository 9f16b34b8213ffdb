//! In-memory database enforcing keys, foreign keys, NOT NULL and CHECK
//! ranges. Backs dry runs and the test suite.

use super::{DatabaseAccess, InsertOutcome};
use crate::error::{DbError, SeedError};
use crate::generator::{KeyTuple, Reservoir, Row, Value};
use crate::pk::{hash_key, hash_row_key, PkHash};
use crate::schema::{Schema, SchemaBuilder, TableId, TableSchema};
use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Default)]
struct MemTable {
    rows: Vec<Row>,
    /// Column positions and issued tuple hashes of each key constraint
    keys: Vec<(Vec<usize>, AHashSet<PkHash>)>,
}

impl MemTable {
    fn for_schema(table: &TableSchema) -> Self {
        let keys = table
            .key_constraints()
            .into_iter()
            .map(|k| (k.columns.iter().map(|c| c.0 as usize).collect(), AHashSet::new()))
            .collect();
        Self {
            rows: Vec::new(),
            keys,
        }
    }

    fn accept(&mut self, row: Row) {
        self.remember(&row);
        self.rows.push(row);
    }

    fn remember(&mut self, row: &[Value]) {
        for (slots, seen) in &mut self.keys {
            if let Some(h) = hash_row_key(row, slots) {
                seen.insert(h);
            }
        }
    }

    fn forget(&mut self, row: &[Value]) {
        for (slots, seen) in &mut self.keys {
            if let Some(h) = hash_row_key(row, slots) {
                seen.remove(&h);
            }
        }
    }

    fn has_tuple(&self, slots: &[usize], hash: PkHash) -> bool {
        if let Some((_, seen)) = self.keys.iter().find(|(s, _)| s.as_slice() == slots) {
            return seen.contains(&hash);
        }
        self.rows
            .iter()
            .any(|r| hash_row_key(r, slots) == Some(hash))
    }

    fn clear(&mut self) {
        self.rows.clear();
        for (_, seen) in &mut self.keys {
            seen.clear();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Times(u32),
    Always,
}

/// Constraint-enforcing in-memory tables for a fixed schema.
#[derive(Debug)]
pub struct MemoryDatabase {
    schema: Schema,
    tables: RwLock<Vec<MemTable>>,
    failures: Mutex<AHashMap<TableId, Failure>>,
    update_calls: AtomicU64,
    sample_seed: u64,
    /// Tables whose rows live in another database; references into them
    /// are trusted
    external: AHashSet<TableId>,
}

impl MemoryDatabase {
    /// Empty tables for a finalized schema
    pub fn from_schema(schema: Schema) -> Self {
        let tables = schema.iter().map(MemTable::for_schema).collect();
        Self {
            schema,
            tables: RwLock::new(tables),
            failures: Mutex::new(AHashMap::new()),
            update_calls: AtomicU64::new(0),
            sample_seed: 0,
            external: AHashSet::new(),
        }
    }

    /// Trust foreign keys pointing at these tables without checking them
    pub fn with_external_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in tables {
            if let Some(id) = self.schema.get_table_id(name.as_ref()) {
                self.external.insert(id);
            }
        }
        self
    }

    pub fn from_ddl(sql: &str) -> Result<Self, SeedError> {
        Ok(Self::from_schema(SchemaBuilder::from_ddl(sql)?))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Make the next `times` inserts into `table` fail
    pub fn fail_inserts(&self, table: &str, times: u32) {
        if let Some(id) = self.schema.get_table_id(table) {
            self.failures.lock().insert(id, Failure::Times(times));
        }
    }

    /// Make every insert into `table` fail
    pub fn fail_always(&self, table: &str) {
        if let Some(id) = self.schema.get_table_id(table) {
            self.failures.lock().insert(id, Failure::Always);
        }
    }

    /// Number of `update_rows` calls so far
    pub fn update_calls(&self) -> u64 {
        self.update_calls.load(Ordering::Relaxed)
    }

    /// Full copy of a table's rows, columns in table order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        match self.schema.get_table_id(table) {
            Some(id) => self.tables.read()[id.0 as usize].rows.clone(),
            None => Vec::new(),
        }
    }

    fn table_id(&self, table: &str) -> Result<TableId, DbError> {
        self.schema
            .get_table_id(table)
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))
    }

    fn positions(&self, id: TableId, columns: &[String]) -> Result<Vec<usize>, DbError> {
        let table = &self.schema.table_schemas[id.0 as usize];
        columns
            .iter()
            .map(|name| {
                table
                    .get_column_id(name)
                    .map(|c| c.0 as usize)
                    .ok_or_else(|| DbError::ColumnNotFound {
                        table: table.name.clone(),
                        column: name.clone(),
                    })
            })
            .collect()
    }

    fn take_failure(&self, id: TableId) -> bool {
        let mut failures = self.failures.lock();
        match failures.get_mut(&id) {
            Some(Failure::Always) => true,
            Some(Failure::Times(n)) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    /// Why `row` cannot be stored, if it cannot
    fn violation(&self, tables: &[MemTable], id: TableId, row: &Row) -> Option<String> {
        let schema = &self.schema.table_schemas[id.0 as usize];
        let own = &tables[id.0 as usize];

        for (idx, column) in schema.columns.iter().enumerate() {
            let class = schema.class(column.ordinal);
            let value = &row[idx];
            if value.is_null() {
                if class.is_not_null {
                    return Some(format!("NOT NULL constraint failed: {}", column.name));
                }
                continue;
            }
            if let (Some((lo, hi)), Value::Int(n)) = (column.col_type.integer_limits(), value) {
                if *n < lo || *n > hi {
                    return Some(format!("value {} out of range for {}", n, column.name));
                }
            }
            if let (Some(range), Some(n)) = (class.range, value.as_f64()) {
                if !range.contains(n) {
                    return Some(format!("CHECK constraint failed: {} = {}", column.name, value));
                }
            }
        }

        for (slots, seen) in &own.keys {
            if let Some(h) = hash_row_key(row, slots) {
                if seen.contains(&h) {
                    return Some("duplicate key".to_string());
                }
            }
        }

        for fk in &schema.foreign_keys {
            let local: Vec<usize> = fk.columns.iter().map(|c| c.0 as usize).collect();
            let Some(hash) = hash_row_key(row, &local) else {
                continue;
            };
            let Some(parent_id) = fk.referenced_table_id else {
                continue;
            };
            if self.external.contains(&parent_id) {
                continue;
            }
            let parent_schema = &self.schema.table_schemas[parent_id.0 as usize];
            let parent_slots: Vec<usize> = fk
                .referenced_columns
                .iter()
                .filter_map(|c| parent_schema.get_column_id(c).map(|c| c.0 as usize))
                .collect();
            if parent_id == id && hash_row_key(row, &parent_slots) == Some(hash) {
                continue;
            }
            if !tables[parent_id.0 as usize].has_tuple(&parent_slots, hash) {
                return Some(format!(
                    "foreign key ({}) has no parent in {}",
                    fk.column_names.join(", "),
                    parent_schema.name
                ));
            }
        }
        None
    }
}

impl DatabaseAccess for MemoryDatabase {
    fn name(&self) -> &str {
        "memory"
    }

    fn introspect(&self) -> Result<Schema, SeedError> {
        Ok(self.schema.clone())
    }

    fn insert_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<InsertOutcome, DbError> {
        let id = self.table_id(table)?;
        if self.take_failure(id) {
            return Err(DbError::Backend(format!("injected failure on {}", table)));
        }
        let positions = self.positions(id, columns)?;
        let width = self.schema.table_schemas[id.0 as usize].columns.len();

        let mut tables = self.tables.write();
        let mut outcome = InsertOutcome::default();
        for input in rows {
            let mut row = vec![Value::Null; width];
            for (&pos, value) in positions.iter().zip(input) {
                row[pos] = value.clone();
            }
            if let Some(reason) = self.violation(&tables, id, &row) {
                debug!(table = %table, %reason, "row rejected");
                outcome.rejected += 1;
                continue;
            }
            tables[id.0 as usize].accept(row);
            outcome.inserted += 1;
        }
        Ok(outcome)
    }

    fn count_rows(&self, table: &str) -> Result<u64, DbError> {
        let id = self.table_id(table)?;
        Ok(self.tables.read()[id.0 as usize].rows.len() as u64)
    }

    fn sample_rows(
        &self,
        table: &str,
        columns: &[String],
        limit: usize,
    ) -> Result<Vec<Row>, DbError> {
        let id = self.table_id(table)?;
        let positions = self.positions(id, columns)?;
        let tables = self.tables.read();
        let mut reservoir = Reservoir::new(limit, StdRng::seed_from_u64(self.sample_seed));
        for row in &tables[id.0 as usize].rows {
            reservoir.consider(row);
        }
        Ok(reservoir
            .into_items()
            .into_iter()
            .map(|row| positions.iter().map(|&p| row[p].clone()).collect())
            .collect())
    }

    fn column_values(
        &self,
        table: &str,
        columns: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<KeyTuple>, DbError> {
        let id = self.table_id(table)?;
        let positions = self.positions(id, columns)?;
        let tables = self.tables.read();
        let mut seen = AHashSet::new();
        let mut out = Vec::new();
        for row in &tables[id.0 as usize].rows {
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
            let Some(h) = hash_row_key(row, &positions) else {
                continue;
            };
            if seen.insert(h) {
                out.push(positions.iter().map(|&p| row[p].clone()).collect());
            }
        }
        Ok(out)
    }

    fn key_page(
        &self,
        table: &str,
        columns: &[String],
        after: Option<&KeyTuple>,
        limit: usize,
    ) -> Result<Vec<KeyTuple>, DbError> {
        let id = self.table_id(table)?;
        let positions = self.positions(id, columns)?;
        let tables = self.tables.read();
        let mut keys: Vec<KeyTuple> = tables[id.0 as usize]
            .rows
            .iter()
            .filter(|row| positions.iter().all(|&p| !row[p].is_null()))
            .map(|row| positions.iter().map(|&p| row[p].clone()).collect::<KeyTuple>())
            .filter(|key| after.map_or(true, |after| key > after))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys.truncate(limit);
        Ok(keys)
    }

    fn max_integer(&self, table: &str, column: &str) -> Result<Option<i64>, DbError> {
        let id = self.table_id(table)?;
        let pos = self.positions(id, &[column.to_string()])?[0];
        let tables = self.tables.read();
        Ok(tables[id.0 as usize]
            .rows
            .iter()
            .filter_map(|r| r[pos].as_i64())
            .max())
    }

    fn update_rows(
        &self,
        table: &str,
        key_columns: &[String],
        set_columns: &[String],
        updates: &[(KeyTuple, KeyTuple)],
    ) -> Result<u64, DbError> {
        self.update_calls.fetch_add(1, Ordering::Relaxed);
        let id = self.table_id(table)?;
        let key_pos = self.positions(id, key_columns)?;
        let set_pos = self.positions(id, set_columns)?;

        let mut tables = self.tables.write();
        let index: AHashMap<PkHash, usize> = tables[id.0 as usize]
            .rows
            .iter()
            .enumerate()
            .filter_map(|(i, r)| hash_row_key(r, &key_pos).map(|h| (h, i)))
            .collect();

        let mut changed = 0u64;
        for (key, values) in updates {
            let Some(&row_idx) = index.get(&hash_key(key.iter())) else {
                continue;
            };
            let t = id.0 as usize;
            let original = tables[t].rows[row_idx].clone();
            let mut candidate = original.clone();
            for (&pos, value) in set_pos.iter().zip(values.iter()) {
                candidate[pos] = value.clone();
            }
            // The row must not collide with its own key tuples
            tables[t].forget(&original);
            let ok = self.violation(&tables, id, &candidate).is_none();
            let keep = if ok { candidate } else { original };
            tables[t].remember(&keep);
            tables[t].rows[row_idx] = keep;
            if ok {
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn contains_key(
        &self,
        table: &str,
        columns: &[String],
        tuple: &KeyTuple,
    ) -> Result<bool, DbError> {
        let id = self.table_id(table)?;
        let positions = self.positions(id, columns)?;
        let hash = hash_key(tuple.iter());
        Ok(self.tables.read()[id.0 as usize].has_tuple(&positions, hash))
    }

    fn truncate(&self, table: &str) -> Result<(), DbError> {
        let id = self.table_id(table)?;
        self.tables.write()[id.0 as usize].clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    const DDL: &str = "
        CREATE TABLE users (id INT PRIMARY KEY, email TEXT UNIQUE, age INT CHECK (age >= 18));
        CREATE TABLE posts (id INT PRIMARY KEY, user_id INT NOT NULL REFERENCES users(id),
            parent_id INT REFERENCES posts(id));
    ";

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rejects_constraint_violations() {
        let db = MemoryDatabase::from_ddl(DDL).unwrap();
        let users = cols(&["id", "email", "age"]);
        let out = db
            .insert_batch(
                "users",
                &users,
                &[
                    vec![Value::Int(1), Value::Text("a".into()), Value::Int(20)],
                    vec![Value::Int(1), Value::Text("b".into()), Value::Int(20)],
                    vec![Value::Int(2), Value::Text("a".into()), Value::Int(20)],
                    vec![Value::Int(3), Value::Text("c".into()), Value::Int(10)],
                    vec![Value::Int(4), Value::Null, Value::Null],
                ],
            )
            .unwrap();
        assert_eq!(out, InsertOutcome { inserted: 2, rejected: 3 });

        let posts = cols(&["id", "user_id"]);
        let out = db
            .insert_batch(
                "posts",
                &posts,
                &[
                    vec![Value::Int(1), Value::Int(1)],
                    vec![Value::Int(2), Value::Int(99)],
                    vec![Value::Int(3), Value::Null],
                ],
            )
            .unwrap();
        assert_eq!(out.inserted, 1);
        assert_eq!(out.rejected, 2);
    }

    #[test]
    fn test_rejects_values_wider_than_the_column() {
        let db = MemoryDatabase::from_ddl("CREATE TABLE t (id INT PRIMARY KEY, qty SMALLINT);")
            .unwrap();
        let out = db
            .insert_batch(
                "t",
                &cols(&["id", "qty"]),
                &[
                    vec![Value::Int(1), Value::Int(32_767)],
                    vec![Value::Int(2), Value::Int(32_768)],
                ],
            )
            .unwrap();
        assert_eq!(out, InsertOutcome { inserted: 1, rejected: 1 });
    }

    #[test]
    fn test_key_pages() {
        let db = MemoryDatabase::from_ddl(DDL).unwrap();
        let rows: Vec<_> = [30, 10, 20].into_iter().map(|id| vec![Value::Int(id)]).collect();
        db.insert_batch("users", &cols(&["id"]), &rows).unwrap();

        let id = cols(&["id"]);
        let first = db.key_page("users", &id, None, 2).unwrap();
        assert_eq!(first, vec![smallvec![Value::Int(10)], smallvec![Value::Int(20)]] as Vec<KeyTuple>);
        let after: KeyTuple = smallvec![Value::Int(20)];
        let rest = db.key_page("users", &id, Some(&after), 2).unwrap();
        assert_eq!(rest, vec![smallvec![Value::Int(30)]] as Vec<KeyTuple>);
    }

    #[test]
    fn test_self_reference_update() {
        let db = MemoryDatabase::from_ddl(DDL).unwrap();
        db.insert_batch("users", &cols(&["id"]), &[vec![Value::Int(1)]])
            .unwrap();
        db.insert_batch(
            "posts",
            &cols(&["id", "user_id"]),
            &[vec![Value::Int(1), Value::Int(1)], vec![Value::Int(2), Value::Int(1)]],
        )
        .unwrap();
        let changed = db
            .update_rows(
                "posts",
                &cols(&["id"]),
                &cols(&["parent_id"]),
                &[
                    (smallvec![Value::Int(2)], smallvec![Value::Int(1)]),
                    (smallvec![Value::Int(1)], smallvec![Value::Int(42)]),
                ],
            )
            .unwrap();
        assert_eq!(changed, 1);
        let rows = db.rows("posts");
        assert_eq!(rows[1][2], Value::Int(1));
        assert_eq!(rows[0][2], Value::Null);
        assert_eq!(db.update_calls(), 1);
    }

    #[test]
    fn test_injected_failures() {
        let db = MemoryDatabase::from_ddl(DDL).unwrap();
        db.fail_inserts("users", 1);
        let row = vec![vec![Value::Int(1)]];
        assert!(db.insert_batch("users", &cols(&["id"]), &row).is_err());
        assert!(db.insert_batch("users", &cols(&["id"]), &row).is_ok());
    }

    #[test]
    fn test_reads() {
        let db = MemoryDatabase::from_ddl(DDL).unwrap();
        let rows: Vec<Row> = (1..=5)
            .map(|i| vec![Value::Int(i), Value::Text(format!("u{i}")), Value::Int(30)])
            .collect();
        db.insert_batch("users", &cols(&["id", "email", "age"]), &rows)
            .unwrap();
        assert_eq!(db.count_rows("users").unwrap(), 5);
        assert_eq!(db.max_integer("users", "id").unwrap(), Some(5));
        assert_eq!(
            db.column_values("users", &cols(&["id"]), Some(2))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(db.sample_rows("users", &cols(&["email"]), 3).unwrap().len(), 3);
        assert!(db
            .contains_key("users", &cols(&["id"]), &smallvec![Value::Int(3)])
            .unwrap());
        db.truncate("users").unwrap();
        assert_eq!(db.count_rows("users").unwrap(), 0);
        assert!(matches!(
            db.count_rows("nope"),
            Err(DbError::TableNotFound(_))
        ));
    }
}
