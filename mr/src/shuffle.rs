use std::collections::{BTreeMap, HashMap};

/// Which reduce partition a key belongs to. Stable across runs and processes.
pub fn partition_for(key: &str, partitions: usize) -> usize {
    let mut hash: u32 = 0;
    for byte in key.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(byte as u32);
    }
    (hash & i32::MAX as u32) as usize % partitions.max(1)
}

/// What one map task hands to the shuffle: one bucket of `key -> values` per
/// reduce partition.
#[derive(Debug, Clone)]
pub struct MapOutput {
    buckets: Vec<HashMap<String, Vec<u64>>>,
}

impl MapOutput {
    pub fn new(partitions: usize) -> Self {
        MapOutput {
            buckets: vec![HashMap::new(); partitions.max(1)],
        }
    }

    pub fn emit(&mut self, key: &str, value: u64) {
        let index = partition_for(key, self.buckets.len());
        let bucket = &mut self.buckets[index];
        // only allocate the key the first time it is seen
        match bucket.get_mut(key) {
            Some(values) => values.push(value),
            None => {
                bucket.insert(key.to_string(), vec![value]);
            }
        }
    }

    /// Applies `combine` to every key, leaving a single value per key.
    /// Returns the number of values consumed and produced.
    pub fn combine(&mut self, mut combine: impl FnMut(&str, &[u64]) -> u64) -> (u64, u64) {
        let mut consumed = 0;
        let mut produced = 0;
        for bucket in &mut self.buckets {
            for (key, values) in bucket.iter_mut() {
                consumed += values.len() as u64;
                let combined = combine(key.as_str(), values.as_slice());
                values.clear();
                values.push(combined);
                produced += 1;
            }
        }
        (consumed, produced)
    }

    pub fn partitions(&self) -> usize {
        self.buckets.len()
    }

    pub fn record_count(&self) -> u64 {
        self.buckets
            .iter()
            .flat_map(|b| b.values())
            .map(|v| v.len() as u64)
            .sum()
    }
}

/// The input of one reduce task: every key hashed to `index`, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    index: usize,
    groups: BTreeMap<String, Vec<u64>>,
}

impl Partition {
    pub fn get_index(&self) -> usize {
        self.index
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[u64])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn value_count(&self) -> u64 {
        self.groups.values().map(|v| v.len() as u64).sum()
    }
}

/// Gathers map outputs until the barrier, then hands out one [`Partition`]
/// per reducer.
#[derive(Debug, Clone)]
pub struct Shuffle {
    partitions: Vec<Partition>,
}

impl Shuffle {
    pub fn new(partitions: usize) -> Self {
        Shuffle {
            partitions: (0..partitions.max(1))
                .map(|index| Partition {
                    index,
                    groups: BTreeMap::new(),
                })
                .collect(),
        }
    }

    pub fn absorb(&mut self, output: MapOutput) {
        debug_assert_eq!(output.partitions(), self.partitions.len());
        for (partition, bucket) in self.partitions.iter_mut().zip(output.buckets) {
            for (key, values) in bucket {
                partition.groups.entry(key).or_default().extend(values);
            }
        }
    }

    pub fn into_partitions(self) -> Vec<Partition> {
        self.partitions
    }
}
