//! Bounded value pools and reservoir sampling.

use super::value::Value;
use rand::rngs::StdRng;
use rand::Rng;

/// Per-column pool of previously issued values.
///
/// Capacity is fixed when the pool is created. Draws prefer the least-used
/// entry so repeated values spread evenly across the pool.
#[derive(Debug)]
pub struct ValuePool {
    capacity: usize,
    values: Vec<Value>,
    uses: Vec<u64>,
}

impl ValuePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            values: Vec::new(),
            uses: Vec::new(),
        }
    }

    /// Pool pre-filled with `values`, truncated to `capacity`.
    pub fn filled(capacity: usize, mut values: Vec<Value>) -> Self {
        values.truncate(capacity);
        let uses = vec![0; values.len()];
        Self {
            capacity,
            values,
            uses,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a value if there is room and it is not pooled already.
    pub fn offer(&mut self, value: Value) -> bool {
        if self.is_full() || value.is_null() || self.values.contains(&value) {
            return false;
        }
        self.values.push(value);
        self.uses.push(1);
        true
    }

    /// Least-used value, ties broken by insertion order.
    pub fn least_used(&mut self) -> Option<Value> {
        let (idx, _) = self.uses.iter().enumerate().min_by_key(|(_, &n)| n)?;
        self.uses[idx] += 1;
        Some(self.values[idx].clone())
    }

    /// Drop spare allocation under memory pressure.
    pub fn relieve(&mut self) {
        self.values.shrink_to_fit();
        self.uses.shrink_to_fit();
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Reservoir sampler using Algorithm R.
///
/// Keeps a uniform sample of at most `capacity` items from a stream.
#[derive(Debug)]
pub struct Reservoir<T> {
    capacity: usize,
    count: usize,
    items: Vec<T>,
    rng: StdRng,
}

impl<T> Reservoir<T> {
    pub fn new(capacity: usize, rng: StdRng) -> Self {
        Self {
            capacity,
            count: 0,
            items: Vec::with_capacity(capacity.min(1024)),
            rng,
        }
    }

    /// Consider an item for inclusion in the reservoir
    pub fn consider(&mut self, item: T) {
        self.count += 1;

        if self.items.len() < self.capacity {
            self.items.push(item);
        } else {
            let j = self.rng.random_range(0..self.count);
            if j < self.capacity {
                self.items[j] = item;
            }
        }
    }

    /// Uniformly chosen item of the current sample
    pub fn choose(&mut self) -> Option<&T> {
        if self.items.is_empty() {
            return None;
        }
        let idx = self.rng.random_range(0..self.items.len());
        self.items.get(idx)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_pool_is_bounded_and_distinct() {
        let mut pool = ValuePool::new(2);
        assert!(pool.offer(Value::Int(1)));
        assert!(!pool.offer(Value::Int(1)));
        assert!(pool.offer(Value::Int(2)));
        assert!(!pool.offer(Value::Int(3)));
        assert_eq!(pool.len(), 2);
        assert!(!pool.offer(Value::Null));
    }

    #[test]
    fn test_least_used_rotates() {
        let mut pool = ValuePool::filled(3, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let drawn: Vec<_> = (0..3).filter_map(|_| pool.least_used()).collect();
        assert_eq!(drawn, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_empty_reservoir_has_nothing_to_choose() {
        let mut r: Reservoir<u32> = Reservoir::new(4, StdRng::seed_from_u64(1));
        assert!(r.choose().is_none());
        r.consider(7);
        assert_eq!(r.choose(), Some(&7));
    }

    #[test]
    fn test_reservoir_keeps_capacity() {
        let mut r = Reservoir::new(10, StdRng::seed_from_u64(9));
        for i in 0..1000 {
            r.consider(i);
        }
        assert_eq!(r.len(), 10);
        assert!(r.choose().is_some_and(|i| *i < 1000));
        assert!(r.into_items().iter().all(|i| *i < 1000));
    }
}
