//! Fixed-bucket lookup table used for header dispatch and MIME types
//!
//! The table has two stages. A [`TableBuilder`] accepts inserts during
//! startup; [`TableBuilder::freeze`] turns it into a [`KeyedTable`] which has
//! no mutating methods at all. Worker threads only ever see the frozen form,
//! which makes shared reads sound without any locking.

use rustc_hash::FxHasher;
use std::hash::Hasher;

struct Node<V> {
    key: &'static [u8],
    value: V,
    next: Option<Box<Node<V>>>,
}

type Bucket<V> = Option<Box<Node<V>>>;

/// Insert-only stage of a [`KeyedTable`].
pub struct TableBuilder<V> {
    buckets: Box<[Bucket<V>]>,
    len: usize,
}

impl<V> TableBuilder<V> {
    /// Creates a builder whose bucket count is `buckets` rounded up to a
    /// power of two (at least 1). The count never changes afterwards.
    pub fn with_buckets(buckets: usize) -> Self {
        let count = buckets.max(1).next_power_of_two();

        Self {
            buckets: (0..count).map(|_| None).collect(),
            len: 0,
        }
    }

    /// Prepends the entry to its chain, so a repeated key shadows the
    /// earlier value on lookup.
    pub fn insert(&mut self, key: &'static [u8], value: V) -> &mut Self {
        let index = bucket_of(key, self.buckets.len());
        let next = self.buckets[index].take();

        self.buckets[index] = Some(Box::new(Node { key, value, next }));
        self.len += 1;
        self
    }

    pub fn freeze(self) -> KeyedTable<V> {
        KeyedTable {
            buckets: self.buckets,
            len: self.len,
        }
    }
}

/// Read-only chained hash table keyed by byte strings.
///
/// Keys are compared exactly; callers normalise case before lookup.
pub struct KeyedTable<V> {
    buckets: Box<[Bucket<V>]>,
    len: usize,
}

impl<V> KeyedTable<V> {
    #[inline]
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let mut node = self.buckets[bucket_of(key, self.buckets.len())].as_deref();

        while let Some(current) = node {
            if current.key == key {
                return Some(&current.value);
            }
            node = current.next.as_deref();
        }

        None
    }

    /// Number of inserted entries, shadowed ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<V> std::fmt::Debug for KeyedTable<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedTable")
            .field("len", &self.len)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

#[inline(always)]
fn bucket_of(key: &[u8], count: usize) -> usize {
    let mut hasher = FxHasher::default();
    hasher.write(key);
    (hasher.finish() as usize) & (count - 1)
}
