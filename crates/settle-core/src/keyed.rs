//! # Weak-keyed operation sets
//!
//! `KeyedSet` maps a target identity to the operations still outstanding for
//! it. Two rules hold at all times:
//!
//! - a key has an entry iff its collection is non-empty; the remove that
//!   drains a collection deletes the entry in the same call;
//! - an item appears at most once per key.
//!
//! Keys are held through `Weak`, so tracking never keeps a destroyed
//! component alive. The `Weak` pins the allocation (not the value), which
//! keeps the address-based identity unique for as long as the entry exists.
//! Entries whose key has died are dropped by [`KeyedSet::sweep`], which also
//! runs whenever a new entry is created.

use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use web_time::Instant;

use crate::operation::OperationId;
use crate::target::Refreshable;

new_key_type! {
    /// Stable arena token for one key's entry.
    pub struct EntryKey;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Ident {
    Fallback,
    Addr(usize),
}

/// Lookup identity: a specific target, or the shared fallback used when no
/// target is given.
pub enum TargetKey<T: ?Sized> {
    Fallback,
    Target { addr: usize, weak: Weak<T> },
}

impl<T: ?Sized> TargetKey<T> {
    pub fn target(target: &Rc<T>) -> Self {
        TargetKey::Target {
            addr: Rc::as_ptr(target) as *const () as usize,
            weak: Rc::downgrade(target),
        }
    }

    pub fn of(target: Option<&Rc<T>>) -> Self {
        target.map_or(TargetKey::Fallback, Self::target)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, TargetKey::Fallback)
    }

    /// The live target behind this key; `None` for the fallback or a dropped target.
    pub fn upgrade(&self) -> Option<Rc<T>> {
        match self {
            TargetKey::Fallback => None,
            TargetKey::Target { weak, .. } => weak.upgrade(),
        }
    }

    fn is_dead(&self) -> bool {
        match self {
            TargetKey::Fallback => false,
            TargetKey::Target { weak, .. } => weak.strong_count() == 0,
        }
    }

    fn ident(&self) -> Ident {
        match self {
            TargetKey::Fallback => Ident::Fallback,
            TargetKey::Target { addr, .. } => Ident::Addr(*addr),
        }
    }
}

impl<T: ?Sized> Clone for TargetKey<T> {
    fn clone(&self) -> Self {
        match self {
            TargetKey::Fallback => TargetKey::Fallback,
            TargetKey::Target { addr, weak } => TargetKey::Target {
                addr: *addr,
                weak: weak.clone(),
            },
        }
    }
}

impl<T: ?Sized> PartialEq for TargetKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ident() == other.ident()
    }
}
impl<T: ?Sized> Eq for TargetKey<T> {}

impl<T: ?Sized> fmt::Debug for TargetKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKey::Fallback => f.write_str("TargetKey::Fallback"),
            TargetKey::Target { addr, weak } => write!(
                f,
                "TargetKey::Target({addr:#x}{})",
                if weak.strong_count() == 0 { ", dead" } else { "" }
            ),
        }
    }
}

struct Entry<T: ?Sized, V> {
    key: TargetKey<T>,
    items: SmallVec<[V; 4]>,
    since: Instant,
}

/// A key that has had outstanding items for longer than some threshold.
#[derive(Debug)]
pub struct Stall<T: ?Sized> {
    pub key: TargetKey<T>,
    pub outstanding: usize,
    pub pending_for: Duration,
}

pub struct KeyedSet<T: ?Sized, V> {
    entries: SlotMap<EntryKey, Entry<T, V>>,
    index: HashMap<Ident, EntryKey>,
}

pub type KeyedOperationSet = KeyedSet<dyn Refreshable, OperationId>;

impl<T: ?Sized, V> Default for KeyedSet<T, V> {
    fn default() -> Self {
        Self {
            entries: SlotMap::with_key(),
            index: HashMap::new(),
        }
    }
}

impl<T: ?Sized, V: PartialEq> KeyedSet<T, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &TargetKey<T>) -> bool {
        self.index.contains_key(&key.ident())
    }

    pub fn outstanding(&self, key: &TargetKey<T>) -> usize {
        self.index
            .get(&key.ident())
            .and_then(|ek| self.entries.get(*ek))
            .map_or(0, |e| e.items.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, key: &TargetKey<T>, item: V) -> bool {
        self.add_at(key, item, Instant::now())
    }

    /// Adds `item` under `key`, stamping a newly created entry with `now`.
    /// Returns `false` if the item was already present for that key.
    pub fn add_at(&mut self, key: &TargetKey<T>, item: V, now: Instant) -> bool {
        if let Some(ek) = self.index.get(&key.ident()) {
            let entry = &mut self.entries[*ek];
            if entry.items.contains(&item) {
                return false;
            }
            entry.items.push(item);
            return true;
        }

        self.sweep();
        let mut items = SmallVec::new();
        items.push(item);
        let ek = self.entries.insert(Entry {
            key: key.clone(),
            items,
            since: now,
        });
        self.index.insert(key.ident(), ek);
        true
    }

    /// Removes `item` from `key`, deleting the entry if it was the last one.
    pub fn remove(&mut self, key: &TargetKey<T>, item: &V) -> bool {
        let ident = key.ident();
        let Some(&ek) = self.index.get(&ident) else {
            return false;
        };
        let entry = &mut self.entries[ek];
        let Some(pos) = entry.items.iter().position(|i| i == item) else {
            return false;
        };

        if entry.items.len() == 1 {
            self.entries.remove(ek);
            self.index.remove(&ident);
        } else {
            entry.items.remove(pos);
        }
        true
    }

    /// Drops entries whose key has been destroyed. Returns how many went.
    pub fn sweep(&mut self) -> usize {
        let dead: Vec<(EntryKey, Ident)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.key.is_dead())
            .map(|(ek, e)| (ek, e.key.ident()))
            .collect();
        for (ek, ident) in &dead {
            self.entries.remove(*ek);
            self.index.remove(ident);
        }
        if !dead.is_empty() {
            log::trace!("swept {} entries with dead keys", dead.len());
        }
        dead.len()
    }

    pub fn stalled(&self, now: Instant, threshold: Duration) -> Vec<Stall<T>> {
        self.entries
            .values()
            .filter_map(|e| {
                let pending_for = now.saturating_duration_since(e.since);
                (pending_for >= threshold).then(|| Stall {
                    key: e.key.clone(),
                    outstanding: e.items.len(),
                    pending_for,
                })
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
