//! Constraint-aware row generation.
//!
//! A [`GenerationScope`] executes a [`TablePlan`] against a uniqueness
//! registry. Rows are built in three steps: foreign key tuples, plain
//! columns, then self-references. The finished row is registered with every
//! key constraint at once; on collision the whole row is regenerated.

mod fabricate;
mod plan;
mod pool;
mod uniqueness;
mod value;

pub use fabricate::{
    detect_category, type_value, CapabilityRegistry, Category, ChoiceProducer, FakeProducer,
    FieldSpec, PatternProducer, Producer, TypeProducer, WeightedProducer,
};
pub use plan::{
    build_table_plan, sequence_columns, ColumnPlan, FkDraw, SelfRefPlan, TableInputs, TablePlan,
    ValueSource,
};
pub use pool::{Reservoir, ValuePool};
pub use uniqueness::{Claim, KeyScope, Partition, UniquenessRegistry};
pub use value::{format_decimal, KeyTuple, Row, Value, DATETIME_FORMAT, DATE_FORMAT};

use crate::duplicate::ColumnDuplicator;
use crate::error::GenerationError;
use crate::schema::TableId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Generation errors kept per batch; the rest are only counted
const MAX_BATCH_ERRORS: usize = 8;

/// RNG for one batch, derived from the run seed, table and batch index so
/// results do not depend on which worker runs the batch.
pub fn batch_rng(seed: u64, table: TableId, batch_index: u64) -> StdRng {
    let mix = (table.0 as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(batch_index.wrapping_mul(0xBF58_476D_1CE4_E5B9));
    StdRng::seed_from_u64(seed ^ mix)
}

/// Rows produced for one batch plus the rows that could not be produced
#[derive(Debug, Default)]
pub struct GeneratedBatch {
    pub rows: Vec<Row>,
    pub exhausted: u64,
    pub no_parent_keys: u64,
    pub errors: Vec<GenerationError>,
}

impl GeneratedBatch {
    pub fn failed(&self) -> u64 {
        self.exhausted + self.no_parent_keys
    }

    fn record(&mut self, err: GenerationError) {
        match err {
            GenerationError::Exhausted { .. } => self.exhausted += 1,
            GenerationError::NoParentKeys { .. } => self.no_parent_keys += 1,
        }
        if self.errors.len() < MAX_BATCH_ERRORS {
            self.errors.push(err);
        }
    }
}

/// Designated key slice owned by one partitioned worker
#[derive(Debug, Clone)]
struct OwnedSlice {
    key: usize,
    partition: Partition,
    registry: Arc<UniquenessRegistry>,
}

/// Everything one worker needs to generate rows of one table.
#[derive(Debug, Clone)]
pub struct GenerationScope {
    plan: Arc<TablePlan>,
    registry: Arc<UniquenessRegistry>,
    duplicators: Vec<ColumnDuplicator>,
    owned: Option<OwnedSlice>,
}

impl GenerationScope {
    /// Scope sharing the plan's pools and the given registry with other
    /// workers.
    pub fn shared(plan: Arc<TablePlan>, registry: Arc<UniquenessRegistry>) -> Self {
        let duplicators = plan.columns.iter().map(|c| c.duplicator.clone()).collect();
        Self {
            plan,
            registry,
            duplicators,
            owned: None,
        }
    }

    /// Scope owning one partition of the table's designated key and private
    /// copies of the pools. Other keys are claimed in the shared `registry`.
    pub fn isolated(
        plan: Arc<TablePlan>,
        registry: Arc<UniquenessRegistry>,
        partition: Partition,
    ) -> Self {
        let duplicators = plan.columns.iter().map(|c| c.duplicator.isolated()).collect();
        let owned = registry.designated_key().map(|key| OwnedSlice {
            key,
            partition,
            registry: Arc::new(registry.partition(key, &partition)),
        });
        Self {
            registry,
            plan,
            duplicators,
            owned,
        }
    }

    pub fn plan(&self) -> &TablePlan {
        &self.plan
    }

    pub fn registry(&self) -> &UniquenessRegistry {
        &self.registry
    }

    /// Shrink pools after a memory-pressure hint
    pub fn relieve(&self) {
        for dup in &self.duplicators {
            dup.relieve();
        }
    }

    /// Generate rows `start..start + count` of the table.
    pub fn generate_rows(&self, start: u64, count: usize, rng: &mut StdRng) -> GeneratedBatch {
        let mut batch = GeneratedBatch {
            rows: Vec::with_capacity(count),
            ..Default::default()
        };
        for offset in start..start + count as u64 {
            match self.generate_row(offset, rng) {
                Ok(row) => batch.rows.push(row),
                Err(err) => batch.record(err),
            }
        }
        batch
    }

    /// Generate one row, retrying until its key tuples are new.
    pub fn generate_row(&self, offset: u64, rng: &mut StdRng) -> Result<Row, GenerationError> {
        let attempts = self.plan.unique_attempts.max(1);
        let workers = self.owned.as_ref().map_or(1, |o| o.partition.count.max(1));
        let foreign_budget = attempts.saturating_mul(workers as u32);
        let mut collisions = 0u32;
        let mut foreign = 0u32;
        let mut last_key = 0usize;

        loop {
            let row = self.build_row(offset, rng)?;
            if self.registry.is_trivial() {
                return Ok(row);
            }
            match self.claim(&row) {
                Claim::Accepted => return Ok(row),
                Claim::Collision { key } => {
                    collisions += 1;
                    last_key = key;
                }
                Claim::Foreign { key } => {
                    foreign += 1;
                    last_key = key;
                }
            }
            if collisions >= attempts || foreign >= foreign_budget {
                return Err(GenerationError::Exhausted {
                    table: self.plan.table.clone(),
                    columns: self.registry.key_name(last_key).to_string(),
                    attempts: collisions + foreign,
                });
            }
        }
    }

    fn claim(&self, row: &[Value]) -> Claim {
        let Some(owned) = &self.owned else {
            return self
                .registry
                .try_claim(row, &Partition::single(), KeyScope::All);
        };
        let designated = KeyScope::Only(owned.key);
        match owned.registry.try_claim(row, &owned.partition, designated) {
            Claim::Accepted => {}
            other => return other,
        }
        match self
            .registry
            .try_claim(row, &Partition::single(), KeyScope::Except(owned.key))
        {
            Claim::Accepted => Claim::Accepted,
            other => {
                owned.registry.release(row, designated);
                other
            }
        }
    }

    fn build_row(&self, offset: u64, rng: &mut StdRng) -> Result<Row, GenerationError> {
        let plan = &*self.plan;
        let mut row: Row = vec![Value::Null; plan.width()];

        for draw in &plan.foreign_keys {
            self.draw_foreign_key(draw, &mut row, rng)?;
        }

        for (col, dup) in plan.columns.iter().zip(&self.duplicators) {
            let value = match &col.source {
                ValueSource::Sequence { base } => {
                    Value::Int(base.saturating_add(1).saturating_add(offset as i64))
                }
                ValueSource::ForeignKey | ValueSource::SelfReference => continue,
                ValueSource::Default(value) => value.clone(),
                ValueSource::Fabricate(producer) => {
                    if col.null_probability > 0.0 && rng.random_bool(col.null_probability) {
                        Value::Null
                    } else {
                        dup.next(rng, |rng| producer.produce(&col.field, rng))
                    }
                }
            };
            row[col.index] = value;
        }

        // Self-references start out NULL, or point at the row itself when
        // NULL is not allowed; the update pass assigns real parents.
        for self_ref in &plan.self_refs {
            if self_ref.nullable {
                continue;
            }
            for (&slot, &key_slot) in self_ref.slots.iter().zip(&self_ref.key_slots) {
                row[slot] = row[key_slot].clone();
            }
        }

        Ok(row)
    }

    fn draw_foreign_key(
        &self,
        draw: &FkDraw,
        row: &mut Row,
        rng: &mut StdRng,
    ) -> Result<(), GenerationError> {
        if draw.keys.is_empty() {
            if draw.nullable {
                return Ok(());
            }
            let column = draw
                .slots
                .iter()
                .map(|&s| self.plan.columns[s].name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(GenerationError::NoParentKeys {
                table: self.plan.table.clone(),
                column,
                parent: draw.parent.clone(),
            });
        }
        if draw.nullable && draw.null_probability > 0.0 && rng.random_bool(draw.null_probability) {
            return Ok(());
        }
        let tuple = &draw.keys[rng.random_range(0..draw.keys.len())];
        for (&slot, value) in draw.slots.iter().zip(tuple.iter()) {
            row[slot] = value.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnConfig, SeedConfig};
    use crate::schema::SchemaBuilder;
    use ahash::AHashSet;
    use smallvec::smallvec;

    fn plan_and_registry(
        ddl: &str,
        table: &str,
        config: &SeedConfig,
        inputs: TableInputs,
    ) -> (Arc<TablePlan>, Arc<UniquenessRegistry>) {
        let schema = SchemaBuilder::from_ddl(ddl).unwrap();
        let id = schema.get_table_id(table).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let (plan, _) = build_table_plan(
            &schema,
            id,
            config,
            &CapabilityRegistry::with_builtins(),
            &inputs,
            &mut rng,
        )
        .unwrap();
        let registry = UniquenessRegistry::for_table(schema.table(id).unwrap(), &plan.sequence_columns);
        (Arc::new(plan), Arc::new(registry))
    }

    fn scope(ddl: &str, table: &str, config: &SeedConfig, inputs: TableInputs) -> GenerationScope {
        let (plan, registry) = plan_and_registry(ddl, table, config, inputs);
        GenerationScope::shared(plan, registry)
    }

    #[test]
    fn test_sequence_continues_existing_max() {
        let mut inputs = TableInputs::default();
        inputs.sequence_base.insert(0, 41);
        let s = scope(
            "CREATE TABLE t (id INT PRIMARY KEY, name TEXT);",
            "t",
            &SeedConfig::default(),
            inputs,
        );
        let mut rng = batch_rng(1, TableId(0), 0);
        let batch = s.generate_rows(10, 3, &mut rng);
        let ids: Vec<_> = batch.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids, vec![Value::Int(52), Value::Int(53), Value::Int(54)]);
    }

    #[test]
    fn test_small_domain_exhausts() {
        let config = SeedConfig {
            unique_attempts: 60,
            ..Default::default()
        }
        .with_column(
            "t",
            "code",
            ColumnConfig {
                min_value: Some(1.0),
                max_value: Some(3.0),
                ..Default::default()
            },
        );
        let s = scope(
            "CREATE TABLE t (id INT PRIMARY KEY, code INT UNIQUE);",
            "t",
            &config,
            TableInputs::default(),
        );
        let mut rng = batch_rng(7, TableId(0), 0);
        let batch = s.generate_rows(0, 10, &mut rng);
        assert_eq!(batch.rows.len(), 3);
        assert_eq!(batch.exhausted, 7);
        let codes: AHashSet<_> = batch.rows.iter().map(|r| r[1].clone()).collect();
        assert_eq!(codes.len(), 3);
    }

    #[test]
    fn test_not_null_fk_without_parent_keys() {
        let ddl = "CREATE TABLE p (id INT PRIMARY KEY);
                   CREATE TABLE c (id INT PRIMARY KEY, p_id INT NOT NULL REFERENCES p(id));";
        let s = scope(ddl, "c", &SeedConfig::default(), TableInputs::default());
        let mut rng = batch_rng(0, TableId(1), 0);
        let batch = s.generate_rows(0, 5, &mut rng);
        assert!(batch.rows.is_empty());
        assert_eq!(batch.no_parent_keys, 5);
    }

    #[test]
    fn test_fk_draws_parent_tuples() {
        let ddl = "CREATE TABLE p (a INT, b INT, PRIMARY KEY (a, b));
                   CREATE TABLE c (id INT PRIMARY KEY, pa INT NOT NULL, pb INT NOT NULL,
                       FOREIGN KEY (pa, pb) REFERENCES p(a, b));";
        let keys: Vec<KeyTuple> = vec![
            smallvec![Value::Int(1), Value::Int(10)],
            smallvec![Value::Int(2), Value::Int(20)],
        ];
        let mut inputs = TableInputs::default();
        inputs.parent_keys.insert(0, Arc::new(keys.clone()));
        let s = scope(ddl, "c", &SeedConfig::default(), inputs);
        let mut rng = batch_rng(3, TableId(1), 0);
        let batch = s.generate_rows(0, 50, &mut rng);
        assert_eq!(batch.rows.len(), 50);
        for row in &batch.rows {
            let tuple: KeyTuple = smallvec![row[1].clone(), row[2].clone()];
            assert!(keys.contains(&tuple));
        }
    }

    #[test]
    fn test_self_reference_initial_values() {
        let ddl = "CREATE TABLE e (id INT PRIMARY KEY, manager_id INT REFERENCES e(id),
                       root_id INT NOT NULL REFERENCES e(id));";
        let s = scope(ddl, "e", &SeedConfig::default(), TableInputs::default());
        let mut rng = batch_rng(0, TableId(0), 0);
        let row = s.generate_row(4, &mut rng).unwrap();
        assert_eq!(row[0], Value::Int(5));
        assert_eq!(row[1], Value::Null);
        assert_eq!(row[2], Value::Int(5));
    }

    #[test]
    fn test_same_seed_same_rows() {
        let ddl = "CREATE TABLE t (id INT PRIMARY KEY, email VARCHAR(80) UNIQUE, city TEXT);";
        let a = scope(ddl, "t", &SeedConfig::default(), TableInputs::default());
        let b = scope(ddl, "t", &SeedConfig::default(), TableInputs::default());
        let rows_a = a.generate_rows(0, 20, &mut batch_rng(99, TableId(0), 0)).rows;
        let rows_b = b.generate_rows(0, 20, &mut batch_rng(99, TableId(0), 0)).rows;
        assert_eq!(rows_a, rows_b);
    }

    #[test]
    fn test_partitioned_scopes_with_several_unique_keys() {
        let ddl = "CREATE TABLE acct (id UUID PRIMARY KEY, email VARCHAR(120) UNIQUE,
                       username VARCHAR(60) UNIQUE);";
        let (plan, registry) =
            plan_and_registry(ddl, "acct", &SeedConfig::default(), TableInputs::default());
        let workers = 8;

        let mut rows = Vec::new();
        let mut exhausted = 0;
        for index in 0..workers {
            let partition = Partition {
                index,
                count: workers,
            };
            let s = GenerationScope::isolated(Arc::clone(&plan), Arc::clone(&registry), partition);
            let mut rng = batch_rng(5, TableId(0), index as u64);
            let batch = s.generate_rows(index as u64 * 250, 250, &mut rng);
            exhausted += batch.exhausted;
            rows.extend(batch.rows);
        }

        assert_eq!(exhausted, 0);
        assert_eq!(rows.len(), 2000);
        for col in 0..3 {
            let distinct: AHashSet<_> = rows.iter().map(|r| r[col].clone()).collect();
            assert_eq!(distinct.len(), 2000, "column {}", col);
        }
    }
}
