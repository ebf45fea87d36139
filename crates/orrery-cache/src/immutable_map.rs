//! Persistent hash map with structural sharing.
//!
//! A hash array mapped trie: each level consumes five bits of a 64-bit key
//! hash, nodes are `Arc`-shared, and every write copies only the path from the
//! root to the touched slot. Cloning a map is a single reference-count bump,
//! and a map value, once created, never changes.

use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const BITS: u32 = 5;
const MASK: u64 = (1 << BITS) - 1;
/// Deepest shift at which a fragment still has hash bits left.
const MAX_SHIFT: u32 = 60;

fn hash_key<Q: Hash + ?Sized>(key: &Q) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

fn fragment(hash: u64, shift: u32) -> u32 {
    debug_assert!(shift <= MAX_SHIFT);
    ((hash >> shift) & MASK) as u32
}

struct Leaf<K, V> {
    hash: u64,
    key: K,
    value: Arc<V>,
}

impl<K: Clone, V> Clone for Leaf<K, V> {
    fn clone(&self) -> Self {
        Self {
            hash: self.hash,
            key: self.key.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

enum Slot<K, V> {
    Leaf(Leaf<K, V>),
    /// Two or more keys whose full hashes are equal.
    Collision(u64, Vec<Leaf<K, V>>),
    Branch(Arc<Node<K, V>>),
}

impl<K: Clone, V> Clone for Slot<K, V> {
    fn clone(&self) -> Self {
        match self {
            Slot::Leaf(leaf) => Slot::Leaf(leaf.clone()),
            Slot::Collision(hash, leaves) => Slot::Collision(*hash, leaves.clone()),
            Slot::Branch(node) => Slot::Branch(Arc::clone(node)),
        }
    }
}

struct Node<K, V> {
    bitmap: u32,
    slots: Vec<Slot<K, V>>,
}

impl<K: Clone, V> Clone for Node<K, V> {
    fn clone(&self) -> Self {
        Self {
            bitmap: self.bitmap,
            slots: self.slots.clone(),
        }
    }
}

impl<K, V> Node<K, V> {
    fn empty() -> Self {
        Self {
            bitmap: 0,
            slots: Vec::new(),
        }
    }

    fn index(&self, bit: u32) -> usize {
        (self.bitmap & (bit - 1)).count_ones() as usize
    }
}

impl<K: Clone + Eq, V> Node<K, V> {
    fn get<Q>(&self, hash: u64, shift: u32, key: &Q) -> Option<&Arc<V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let bit = 1u32 << fragment(hash, shift);
        if self.bitmap & bit == 0 {
            return None;
        }
        match &self.slots[self.index(bit)] {
            Slot::Leaf(leaf) => {
                (leaf.hash == hash && leaf.key.borrow() == key).then_some(&leaf.value)
            }
            Slot::Collision(collision_hash, leaves) if *collision_hash == hash => leaves
                .iter()
                .find(|leaf| leaf.key.borrow() == key)
                .map(|leaf| &leaf.value),
            Slot::Collision(..) => None,
            Slot::Branch(node) => node.get(hash, shift + BITS, key),
        }
    }

    /// Two slots with different hashes, placed at the first level where
    /// their fragments diverge.
    fn pair(a: Slot<K, V>, a_hash: u64, b: Slot<K, V>, b_hash: u64, shift: u32) -> Self {
        let a_fragment = fragment(a_hash, shift);
        let b_fragment = fragment(b_hash, shift);
        if a_fragment == b_fragment {
            let child = Self::pair(a, a_hash, b, b_hash, shift + BITS);
            return Self {
                bitmap: 1 << a_fragment,
                slots: vec![Slot::Branch(Arc::new(child))],
            };
        }
        let slots = if a_fragment < b_fragment {
            vec![a, b]
        } else {
            vec![b, a]
        };
        Self {
            bitmap: (1 << a_fragment) | (1 << b_fragment),
            slots,
        }
    }

    /// Returns the rewritten node and whether the key was newly added.
    fn insert(&self, leaf: Leaf<K, V>, shift: u32) -> (Self, bool) {
        let bit = 1u32 << fragment(leaf.hash, shift);
        let idx = self.index(bit);
        let mut node = self.clone();

        if self.bitmap & bit == 0 {
            node.slots.insert(idx, Slot::Leaf(leaf));
            node.bitmap |= bit;
            return (node, true);
        }

        let leaf_hash = leaf.hash;
        let (slot, added) = match &self.slots[idx] {
            Slot::Leaf(existing) if existing.hash == leaf_hash => {
                if existing.key == leaf.key {
                    (Slot::Leaf(leaf), false)
                } else {
                    (Slot::Collision(leaf_hash, vec![existing.clone(), leaf]), true)
                }
            }
            Slot::Leaf(existing) => {
                let child = Self::pair(
                    Slot::Leaf(existing.clone()),
                    existing.hash,
                    Slot::Leaf(leaf),
                    leaf_hash,
                    shift + BITS,
                );
                (Slot::Branch(Arc::new(child)), true)
            }
            Slot::Collision(collision_hash, leaves) if *collision_hash == leaf_hash => {
                let mut leaves = leaves.clone();
                match leaves.iter().position(|existing| existing.key == leaf.key) {
                    Some(pos) => {
                        leaves[pos] = leaf;
                        (Slot::Collision(leaf_hash, leaves), false)
                    }
                    None => {
                        leaves.push(leaf);
                        (Slot::Collision(leaf_hash, leaves), true)
                    }
                }
            }
            Slot::Collision(collision_hash, leaves) => {
                let child = Self::pair(
                    Slot::Collision(*collision_hash, leaves.clone()),
                    *collision_hash,
                    Slot::Leaf(leaf),
                    leaf_hash,
                    shift + BITS,
                );
                (Slot::Branch(Arc::new(child)), true)
            }
            Slot::Branch(child) => {
                let (child, added) = child.insert(leaf, shift + BITS);
                (Slot::Branch(Arc::new(child)), added)
            }
        };
        node.slots[idx] = slot;
        (node, added)
    }

    /// Returns the rewritten node, or `None` when the key is absent.
    fn remove<Q>(&self, hash: u64, shift: u32, key: &Q) -> Option<Self>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let bit = 1u32 << fragment(hash, shift);
        if self.bitmap & bit == 0 {
            return None;
        }
        let idx = self.index(bit);

        let replacement = match &self.slots[idx] {
            Slot::Leaf(leaf) => {
                if leaf.hash != hash || leaf.key.borrow() != key {
                    return None;
                }
                None
            }
            Slot::Collision(collision_hash, leaves) => {
                if *collision_hash != hash {
                    return None;
                }
                let pos = leaves.iter().position(|leaf| leaf.key.borrow() == key)?;
                let mut leaves = leaves.clone();
                leaves.remove(pos);
                if leaves.len() == 1 {
                    leaves.pop().map(Slot::Leaf)
                } else {
                    Some(Slot::Collision(hash, leaves))
                }
            }
            Slot::Branch(child) => {
                let mut child = child.remove(hash, shift + BITS, key)?;
                if child.slots.is_empty() {
                    None
                } else if child.slots.len() == 1 && !matches!(child.slots[0], Slot::Branch(_)) {
                    // A lone leaf needs no branch of its own.
                    child.slots.pop()
                } else {
                    Some(Slot::Branch(Arc::new(child)))
                }
            }
        };

        let mut node = self.clone();
        match replacement {
            Some(slot) => node.slots[idx] = slot,
            None => {
                node.slots.remove(idx);
                node.bitmap &= !bit;
            }
        }
        Some(node)
    }
}

/// An immutable, structurally shared hash map.
///
/// `insert` and `remove` return a new map and leave `self` untouched. Values
/// are stored behind `Arc`, so they are shared between versions rather than
/// copied.
pub struct ImmutableMap<K, V> {
    root: Arc<Node<K, V>>,
    len: usize,
}

impl<K, V> Clone for ImmutableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            len: self.len,
        }
    }
}

impl<K, V> Default for ImmutableMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ImmutableMap<K, V> {
    pub fn new() -> Self {
        Self {
            root: Arc::new(Node::empty()),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when both maps are the same version (share the same root).
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            stack: vec![self.root.slots.iter()],
            collision: Default::default(),
            remaining: self.len,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }
}

impl<K: Clone + Eq + Hash, V> ImmutableMap<K, V> {
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.root.get(hash_key(key), 0, key).map(Arc::as_ref)
    }

    /// The shared handle to a value, for re-inserting it elsewhere without
    /// copying.
    pub fn get_shared<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.root.get(hash_key(key), 0, key).cloned()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    pub fn insert(&self, key: K, value: V) -> Self {
        self.insert_shared(key, Arc::new(value))
    }

    pub fn insert_shared(&self, key: K, value: Arc<V>) -> Self {
        let leaf = Leaf {
            hash: hash_key(&key),
            key,
            value,
        };
        let (root, added) = self.root.insert(leaf, 0);
        Self {
            root: Arc::new(root),
            len: if added { self.len + 1 } else { self.len },
        }
    }

    /// A map without `key`. When the key is absent the result shares this
    /// map's root.
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.root.remove(hash_key(key), 0, key) {
            Some(root) => Self {
                root: Arc::new(root),
                len: self.len - 1,
            },
            None => self.clone(),
        }
    }
}

impl<K: Clone + Eq + Hash, V> FromIterator<(K, V)> for ImmutableMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |map, (key, value)| map.insert(key, value))
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ImmutableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over the entries of an [`ImmutableMap`], in unspecified order.
pub struct Iter<'a, K, V> {
    stack: Vec<std::slice::Iter<'a, Slot<K, V>>>,
    collision: std::slice::Iter<'a, Leaf<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(leaf) = self.collision.next() {
                self.remaining -= 1;
                return Some((&leaf.key, leaf.value.as_ref()));
            }
            let top = self.stack.last_mut()?;
            match top.next() {
                None => {
                    self.stack.pop();
                }
                Some(Slot::Leaf(leaf)) => {
                    self.remaining -= 1;
                    return Some((&leaf.key, leaf.value.as_ref()));
                }
                Some(Slot::Collision(_, leaves)) => self.collision = leaves.iter(),
                Some(Slot::Branch(node)) => self.stack.push(node.slots.iter()),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<'a, K, V> IntoIterator for &'a ImmutableMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
