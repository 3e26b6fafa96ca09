use std::collections::BTreeSet;
use std::fmt::Display;

use thiserror::Error;

use crate::hash::hash_bytes;

/// Errors from ring lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("hash ring is empty")]
    Empty,
}

pub type RingResult<T> = Result<T, RingError>;

/// A single virtual node on the ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingEntry<T> {
    pub position: u64,
    pub member: T,
}

/// Consistent hash ring with virtual nodes.
///
/// Entries are kept sorted by `(position, member)`. Members are hashed by
/// their `Display` form, so that form must be stable across processes.
#[derive(Debug, Clone)]
pub struct HashRing<T> {
    entries: Vec<RingEntry<T>>,
    members: BTreeSet<T>,
    virtual_nodes_factor: u32,
}

impl<T> HashRing<T>
where
    T: Clone + Ord + Display,
{
    /// An empty ring.
    pub fn new(virtual_nodes_factor: u32) -> Self {
        Self {
            entries: Vec::new(),
            members: BTreeSet::new(),
            virtual_nodes_factor: virtual_nodes_factor.max(1),
        }
    }

    /// Build a ring from scratch.
    ///
    /// Duplicate members are ignored. The result depends only on the member
    /// set and the factor, not on iteration order.
    pub fn rebuild<I>(members: I, virtual_nodes_factor: u32) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut ring = Self::new(virtual_nodes_factor);
        ring.members = members.into_iter().collect();

        let mut entries = Vec::with_capacity(ring.members.len() * ring.virtual_nodes_factor as usize);
        for member in &ring.members {
            entries.extend(ring.entries_for(member));
        }
        entries.sort_by(|a, b| (a.position, &a.member).cmp(&(b.position, &b.member)));
        ring.entries = entries;
        ring
    }

    /// Add one member incrementally. No-op if already present.
    pub fn add(&mut self, member: T) {
        if self.members.contains(&member) {
            return;
        }
        for entry in self.entries_for(&member) {
            let idx = self
                .entries
                .partition_point(|e| (e.position, &e.member) < (entry.position, &entry.member));
            self.entries.insert(idx, entry);
        }
        self.members.insert(member);
    }

    /// Remove one member and all of its entries. Returns whether it was present.
    pub fn remove(&mut self, member: &T) -> bool {
        if !self.members.remove(member) {
            return false;
        }
        self.entries.retain(|e| &e.member != member);
        true
    }

    /// Owner of a pre-hashed key.
    ///
    /// The first entry with `position >= key_hash`, wrapping to the first
    /// entry of the ring.
    pub fn lookup(&self, key_hash: u64) -> RingResult<&T> {
        if self.entries.is_empty() {
            return Err(RingError::Empty);
        }
        let idx = self.entries.partition_point(|e| e.position < key_hash);
        let entry = self.entries.get(idx).unwrap_or(&self.entries[0]);
        Ok(&entry.member)
    }

    /// Owner of a raw key.
    pub fn lookup_key(&self, key: &[u8]) -> RingResult<&T> {
        self.lookup(hash_bytes(key))
    }

    pub fn contains(&self, member: &T) -> bool {
        self.members.contains(member)
    }

    /// Members in ascending order.
    pub fn members(&self) -> impl Iterator<Item = &T> {
        self.members.iter()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn entries(&self) -> &[RingEntry<T>] {
        &self.entries
    }

    pub fn virtual_nodes_factor(&self) -> u32 {
        self.virtual_nodes_factor
    }

    fn entries_for(&self, member: &T) -> Vec<RingEntry<T>> {
        let name = member.to_string();
        (0..self.virtual_nodes_factor)
            .map(|replica| RingEntry {
                position: hash_bytes(format!("{name}-{replica}").as_bytes()),
                member: member.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("routee-{i}")).collect()
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("key-{i}")).collect()
    }

    #[test]
    fn empty_ring_lookup_fails() {
        let ring: HashRing<String> = HashRing::new(10);
        assert_eq!(ring.lookup(42), Err(RingError::Empty));
        assert_eq!(ring.lookup_key(b"a"), Err(RingError::Empty));
    }

    #[test]
    fn single_member_owns_everything() {
        let ring = HashRing::rebuild(vec!["only".to_string()], 5);
        for key in keys(100) {
            assert_eq!(ring.lookup_key(key.as_bytes()).unwrap(), "only");
        }
        assert_eq!(ring.lookup(u64::MAX).unwrap(), "only");
        assert_eq!(ring.lookup(0).unwrap(), "only");
    }

    #[test]
    fn lookup_wraps_past_last_entry() {
        let ring = HashRing::rebuild(members(3), 4);
        let first = ring.entries()[0].member.clone();
        let last_position = ring.entries().last().unwrap().position;
        if last_position < u64::MAX {
            assert_eq!(ring.lookup(last_position + 1).unwrap(), &first);
        }
        assert_eq!(ring.lookup(ring.entries()[0].position).unwrap(), &first);
    }

    #[test]
    fn entries_sorted_and_counted() {
        let ring = HashRing::rebuild(members(8), 16);
        assert_eq!(ring.entries().len(), 8 * 16);
        assert!(ring.entries().windows(2).all(|w| w[0].position <= w[1].position));
        for m in members(8) {
            let count = ring.entries().iter().filter(|e| e.member == m).count();
            assert_eq!(count, 16);
        }
    }

    #[test]
    fn rebuild_is_order_independent() {
        let forward = HashRing::rebuild(members(6), 10);
        let mut reversed_members = members(6);
        reversed_members.reverse();
        let reversed = HashRing::rebuild(reversed_members, 10);

        assert_eq!(forward.entries(), reversed.entries());
        for key in keys(1000) {
            assert_eq!(
                forward.lookup_key(key.as_bytes()).unwrap(),
                reversed.lookup_key(key.as_bytes()).unwrap()
            );
        }
    }

    #[test]
    fn incremental_equals_full_rebuild() {
        let mut ring = HashRing::rebuild(members(3), 10);
        ring.add("routee-3".to_string());
        ring.add("routee-3".to_string());
        assert!(ring.remove(&"routee-1".to_string()));
        assert!(!ring.remove(&"routee-1".to_string()));

        let expected = HashRing::rebuild(
            vec!["routee-0".to_string(), "routee-2".to_string(), "routee-3".to_string()],
            10,
        );
        assert_eq!(ring.entries(), expected.entries());
        assert_eq!(ring.member_count(), 3);
    }

    #[test]
    fn removing_member_only_remaps_its_keys() {
        let all = members(10);
        let before = HashRing::rebuild(all.clone(), 100);
        let removed = all[4].clone();
        let after = HashRing::rebuild(all.into_iter().filter(|m| m != &removed), 100);

        let sample = keys(10_000);
        let mut moved = 0;
        for key in &sample {
            let old = before.lookup_key(key.as_bytes()).unwrap();
            let new = after.lookup_key(key.as_bytes()).unwrap();
            if old != new {
                assert_eq!(old, &removed, "{key} moved but was not owned by the removed member");
                moved += 1;
            }
        }
        let fraction = moved as f64 / sample.len() as f64;
        assert!(fraction > 0.0 && fraction < 0.2, "moved fraction {fraction}");
    }

    #[test]
    fn adding_member_only_takes_keys() {
        let before = HashRing::rebuild(members(5), 50);
        let mut after = before.clone();
        after.add("routee-new".to_string());

        for key in keys(5000) {
            let old = before.lookup_key(key.as_bytes()).unwrap();
            let new = after.lookup_key(key.as_bytes()).unwrap();
            if old != new {
                assert_eq!(new, "routee-new");
            }
        }
    }

    #[test]
    fn load_is_roughly_even() {
        let ring = HashRing::rebuild(members(4), 100);
        let mut counts = std::collections::HashMap::new();
        for key in keys(20_000) {
            *counts.entry(ring.lookup_key(key.as_bytes()).unwrap().clone()).or_insert(0u32) += 1;
        }
        assert_eq!(counts.len(), 4);
        for (member, count) in counts {
            assert!(count > 3_000 && count < 7_500, "{member} got {count}");
        }
    }

    #[test]
    fn zero_factor_is_clamped() {
        let ring = HashRing::rebuild(members(2), 0);
        assert_eq!(ring.virtual_nodes_factor(), 1);
        assert_eq!(ring.entries().len(), 2);
    }
}
