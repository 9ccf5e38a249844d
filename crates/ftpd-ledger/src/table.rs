use std::fmt;

/// Maps a key onto a bucket index in `0..bucket_count`.
pub type BucketHash<K> = fn(u32, &K) -> u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    DuplicateKey,
    MissingKey,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::DuplicateKey => f.write_str("duplicate key in accounting table"),
            TableError::MissingKey => f.write_str("key missing from accounting table"),
        }
    }
}

impl std::error::Error for TableError {}

#[derive(Debug, Clone)]
struct Entry<K, V> {
    key: K,
    value: V,
}

/// Bucket-chained hash table over fixed-width keys and values.
///
/// The bucket hash is supplied by the caller so that one structure can serve
/// both address-keyed and worker-keyed accounting. Every key appears at most
/// once; inserting a present key or removing an absent one is reported as a
/// `TableError`, which callers treat as a bookkeeping bug.
#[derive(Debug, Clone)]
pub struct AccountingTable<K, V> {
    buckets: Vec<Vec<Entry<K, V>>>,
    hash_fn: BucketHash<K>,
    len: usize,
}

impl<K, V> AccountingTable<K, V>
where
    K: Copy + Eq,
    V: Copy,
{
    pub fn new(bucket_count: u32, hash_fn: BucketHash<K>) -> Self {
        let bucket_count = bucket_count.max(1) as usize;
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, Vec::new);
        Self {
            buckets,
            hash_fn,
            len: 0,
        }
    }

    pub fn bucket_count(&self) -> u32 {
        self.buckets.len() as u32
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket_index(&self, key: &K) -> usize {
        let n = self.bucket_count();
        // Out-of-range hashes wrap.
        ((self.hash_fn)(n, key) % n) as usize
    }

    pub fn insert(&mut self, key: K, value: V) -> Result<(), TableError> {
        let idx = self.bucket_index(&key);
        let bucket = &mut self.buckets[idx];
        if bucket.iter().any(|e| e.key == key) {
            return Err(TableError::DuplicateKey);
        }
        bucket.push(Entry { key, value });
        self.len += 1;
        Ok(())
    }

    /// Returns a mutable view of the stored value so counts can be updated in
    /// place.
    pub fn lookup(&mut self, key: &K) -> Option<&mut V> {
        let idx = self.bucket_index(key);
        self.buckets[idx]
            .iter_mut()
            .find(|e| e.key == *key)
            .map(|e| &mut e.value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let idx = self.bucket_index(key);
        self.buckets[idx]
            .iter()
            .find(|e| e.key == *key)
            .map(|e| e.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &K) -> Result<V, TableError> {
        let idx = self.bucket_index(key);
        let bucket = &mut self.buckets[idx];
        let pos = bucket
            .iter()
            .position(|e| e.key == *key)
            .ok_or(TableError::MissingKey)?;
        let entry = bucket.swap_remove(pos);
        self.len -= 1;
        Ok(entry.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.buckets
            .iter()
            .flat_map(|b| b.iter().map(|e| (e.key, e.value)))
    }
}
