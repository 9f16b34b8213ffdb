//! Uniqueness registries.
//!
//! One registry per table holds a set of issued tuple hashes for every
//! PRIMARY KEY / UNIQUE constraint. All sets of a table sit behind one lock,
//! so a row's tuples are checked and claimed in a single critical section.
//!
//! Partitioned workers split one designated key of the table by hash and keep
//! their slice in a private registry. The remaining keys stay in the shared
//! registry, so a row never has to hash into the same worker on every key.

use super::value::{KeyTuple, Value};
use crate::pk::{hash_key, hash_row_key, PkHash};
use crate::schema::TableSchema;
use ahash::AHashSet;
use parking_lot::Mutex;

/// Slice of a uniqueness space owned by one isolated worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub count: usize,
}

impl Partition {
    /// The whole space
    pub fn single() -> Self {
        Self { index: 0, count: 1 }
    }

    pub fn owns(&self, hash: PkHash) -> bool {
        self.count <= 1 || (hash % self.count as u64) as usize == self.index
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::single()
    }
}

/// Which keys a claim covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    All,
    Only(usize),
    Except(usize),
}

impl KeyScope {
    fn covers(&self, key: usize) -> bool {
        match *self {
            KeyScope::All => true,
            KeyScope::Only(k) => k == key,
            KeyScope::Except(k) => k != key,
        }
    }
}

/// Outcome of registering a candidate row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Accepted,
    /// A tuple of this row was already issued
    Collision { key: usize },
    /// The designated tuple hashes into another worker's partition
    Foreign { key: usize },
}

#[derive(Debug, Clone)]
struct KeySpace {
    name: String,
    slots: Vec<usize>,
    /// Contains a sequence column, so tuples are distinct by construction
    sequential: bool,
}

/// Issued tuples for every key constraint of one table.
#[derive(Debug)]
pub struct UniquenessRegistry {
    table: String,
    keys: Vec<KeySpace>,
    seen: Mutex<Vec<AHashSet<PkHash>>>,
}

impl UniquenessRegistry {
    /// Build an empty registry for `table`. Keys containing one of the
    /// `sequence_columns` are tracked but never checked.
    pub fn for_table(table: &TableSchema, sequence_columns: &[usize]) -> Self {
        let keys: Vec<KeySpace> = table
            .key_constraints()
            .into_iter()
            .map(|key| {
                let slots: Vec<usize> = key.columns.iter().map(|c| c.0 as usize).collect();
                let sequential = slots.iter().any(|s| sequence_columns.contains(s));
                KeySpace {
                    name: key.label(),
                    slots,
                    sequential,
                }
            })
            .collect();
        let seen = Mutex::new(vec![AHashSet::new(); keys.len()]);
        Self {
            table: table.name.clone(),
            keys,
            seen,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Column list of a key, e.g. `"tenant_id, email"`
    pub fn key_name(&self, key: usize) -> &str {
        self.keys.get(key).map(|k| k.name.as_str()).unwrap_or("")
    }

    /// Column positions of a key
    pub fn key_slots(&self, key: usize) -> &[usize] {
        self.keys.get(key).map(|k| k.slots.as_slice()).unwrap_or(&[])
    }

    /// Whether any key actually needs checking
    pub fn is_trivial(&self) -> bool {
        self.keys.iter().all(|k| k.sequential)
    }

    /// The key partitioned workers split by hash: the first checked key,
    /// which is the primary key when it is not sequential.
    pub fn designated_key(&self) -> Option<usize> {
        self.keys.iter().position(|k| !k.sequential)
    }

    /// Number of issued tuples for a key
    pub fn issued(&self, key: usize) -> usize {
        self.seen.lock().get(key).map(|s| s.len()).unwrap_or(0)
    }

    /// Register tuples already present in the table.
    pub fn seed<I>(&self, key: usize, tuples: I)
    where
        I: IntoIterator<Item = KeyTuple>,
    {
        let mut seen = self.seen.lock();
        let Some(set) = seen.get_mut(key) else {
            return;
        };
        for tuple in tuples {
            if tuple.iter().any(Value::is_null) {
                continue;
            }
            set.insert(hash_key(tuple.iter()));
        }
    }

    /// Register every key tuple of `row` within `scope`, all or nothing.
    ///
    /// Tuples containing NULL are never registered. A covered tuple outside
    /// `partition` rejects the row before anything is claimed.
    pub fn try_claim(&self, row: &[Value], partition: &Partition, scope: KeyScope) -> Claim {
        let mut hashes: smallvec::SmallVec<[(usize, PkHash); 4]> = smallvec::SmallVec::new();
        for (idx, space) in self.keys.iter().enumerate() {
            if space.sequential || !scope.covers(idx) {
                continue;
            }
            let Some(hash) = hash_row_key(row, &space.slots) else {
                continue;
            };
            if !partition.owns(hash) {
                return Claim::Foreign { key: idx };
            }
            hashes.push((idx, hash));
        }

        let mut seen = self.seen.lock();
        if let Some(&(key, _)) = hashes.iter().find(|(idx, hash)| seen[*idx].contains(hash)) {
            return Claim::Collision { key };
        }
        for (idx, hash) in hashes {
            seen[idx].insert(hash);
        }
        Claim::Accepted
    }

    /// Forget the tuples of `row` within `scope`.
    pub fn release(&self, row: &[Value], scope: KeyScope) {
        let mut seen = self.seen.lock();
        for (idx, space) in self.keys.iter().enumerate() {
            if space.sequential || !scope.covers(idx) {
                continue;
            }
            if let Some(hash) = hash_row_key(row, &space.slots) {
                seen[idx].remove(&hash);
            }
        }
    }

    /// Private copy of `key`'s space restricted to the hashes `partition`
    /// owns. Other keys of the copy stay empty.
    pub fn partition(&self, key: usize, partition: &Partition) -> UniquenessRegistry {
        let seen = self.seen.lock();
        let sets = (0..self.keys.len())
            .map(|idx| {
                if idx != key {
                    return AHashSet::new();
                }
                seen[idx]
                    .iter()
                    .copied()
                    .filter(|h| partition.owns(*h))
                    .collect()
            })
            .collect();
        UniquenessRegistry {
            table: self.table.clone(),
            keys: self.keys.clone(),
            seen: Mutex::new(sets),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;
    use smallvec::smallvec;
    use std::sync::Arc;
    use std::thread;

    fn registry(sequence: &[usize]) -> UniquenessRegistry {
        let schema = SchemaBuilder::from_ddl(
            "CREATE TABLE t (id INT PRIMARY KEY, a INT, b INT, email TEXT UNIQUE, UNIQUE (a, b));",
        )
        .unwrap();
        UniquenessRegistry::for_table(schema.get_table("t").unwrap(), sequence)
    }

    fn row(id: i64, a: i64, b: i64, email: &str) -> Vec<Value> {
        vec![
            Value::Int(id),
            Value::Int(a),
            Value::Int(b),
            Value::Text(email.into()),
        ]
    }

    fn claim(reg: &UniquenessRegistry, r: &[Value]) -> Claim {
        reg.try_claim(r, &Partition::single(), KeyScope::All)
    }

    #[test]
    fn test_collision_claims_nothing() {
        let reg = registry(&[]);
        assert_eq!(claim(&reg, &row(1, 1, 1, "x")), Claim::Accepted);
        // id is new but email collides: id must stay free
        assert!(matches!(
            claim(&reg, &row(2, 2, 2, "x")),
            Claim::Collision { .. }
        ));
        assert_eq!(claim(&reg, &row(2, 2, 2, "y")), Claim::Accepted);
    }

    #[test]
    fn test_composite_key_is_a_tuple() {
        let reg = registry(&[0]);
        assert_eq!(claim(&reg, &row(1, 1, 2, "a")), Claim::Accepted);
        assert_eq!(claim(&reg, &row(2, 2, 1, "b")), Claim::Accepted);
        assert!(matches!(
            claim(&reg, &row(3, 1, 2, "c")),
            Claim::Collision { .. }
        ));
    }

    #[test]
    fn test_nulls_never_collide() {
        let reg = registry(&[0]);
        let mut r = row(1, 1, 1, "a");
        r[3] = Value::Null;
        assert_eq!(claim(&reg, &r), Claim::Accepted);
        let mut r2 = row(2, 2, 2, "b");
        r2[3] = Value::Null;
        assert_eq!(claim(&reg, &r2), Claim::Accepted);
    }

    #[test]
    fn test_seeded_tuples_are_taken() {
        let reg = registry(&[0]);
        let email_key = (0..reg.key_count())
            .find(|&k| reg.key_name(k) == "email")
            .unwrap();
        reg.seed(email_key, vec![smallvec![Value::Text("taken".into())]]);
        assert!(matches!(
            claim(&reg, &row(1, 1, 1, "taken")),
            Claim::Collision { .. }
        ));
    }

    #[test]
    fn test_release_frees_scoped_tuples_only() {
        let reg = registry(&[]);
        let r = row(1, 1, 1, "x");
        assert_eq!(claim(&reg, &r), Claim::Accepted);
        reg.release(&r, KeyScope::Only(0));
        assert_eq!(reg.issued(0), 0);
        assert_eq!(reg.issued(1), 1);
    }

    #[test]
    fn test_designated_key_skips_sequential_keys() {
        assert_eq!(registry(&[]).designated_key(), Some(0));
        assert_eq!(registry(&[0]).designated_key(), Some(1));
    }

    #[test]
    fn test_only_the_designated_key_is_partitioned() {
        let reg = registry(&[]);
        let key = reg.designated_key().unwrap();
        let parts = [
            Partition { index: 0, count: 2 },
            Partition { index: 1, count: 2 },
        ];
        let owned: Vec<_> = parts.iter().map(|p| reg.partition(key, p)).collect();

        // Every row is owned by exactly one worker, whatever its other keys hash to
        for id in 0..64 {
            let r = row(id, id, id, &format!("u{}", id));
            let accepted = owned
                .iter()
                .zip(&parts)
                .filter(|(o, p)| o.try_claim(&r, p, KeyScope::Only(key)) == Claim::Accepted)
                .count();
            assert_eq!(accepted, 1);
            assert_eq!(
                reg.try_claim(&r, &Partition::single(), KeyScope::Except(key)),
                Claim::Accepted
            );
        }
    }

    #[test]
    fn test_concurrent_claims_of_one_row_admit_exactly_one() {
        for _ in 0..50 {
            let reg = Arc::new(registry(&[]));
            let r = row(9, 9, 9, "same");
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let reg = Arc::clone(&reg);
                    let r = r.clone();
                    thread::spawn(move || claim(&reg, &r) == Claim::Accepted)
                })
                .collect();
            let accepted = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|a| *a)
                .count();
            assert_eq!(accepted, 1);
        }
    }

    #[test]
    fn test_sequential_keys_are_trivial() {
        let schema =
            SchemaBuilder::from_ddl("CREATE TABLE s (id INT PRIMARY KEY, name TEXT);").unwrap();
        let reg = UniquenessRegistry::for_table(schema.get_table("s").unwrap(), &[0]);
        assert!(reg.is_trivial());
        assert_eq!(reg.designated_key(), None);
    }
}
