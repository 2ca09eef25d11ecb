//! Shared transposition table.
//!
//! A contiguous arena of two-entry clusters: slot 0 is depth-preferred,
//! slot 1 always-replace. Probe and store take a stripe lock only when the
//! engine runs parallel workers; the single-thread path skips locking
//! entirely. Entries are aged, never evicted, between searches.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use crate::moves::Move;

pub const TT_EXACT: u8 = 0;
pub const TT_LOWER: u8 = 1;
pub const TT_UPPER: u8 = 2;

const TT_BUCKET: usize = 2;
const STRIPES: usize = 1024;

/// Packed entry; scores are clamped to ±32000 on store.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct TTEntry {
    pub key: u64,
    pub depth: i16,
    pub val: i16,
    pub flag: u8,
    pub age: u8,
    mv_pid: i16,
    mv_dc: i8,
    mv_dr: i8,
}

impl TTEntry {
    const fn empty() -> Self {
        TTEntry {
            key: 0,
            depth: 0,
            val: 0,
            flag: 0,
            age: 0,
            mv_pid: -1,
            mv_dc: -1,
            mv_dr: -1,
        }
    }

    pub fn best_move(&self) -> Option<Move> {
        if self.mv_pid < 0 {
            None
        } else {
            Some(Move::new(self.mv_pid as i32, self.mv_dc, self.mv_dr))
        }
    }

    fn pack_move(&mut self, m: Option<Move>) {
        match m {
            Some(m) => {
                self.mv_pid = m.pid as i16;
                self.mv_dc = m.dc;
                self.mv_dr = m.dr;
            }
            None => {
                self.mv_pid = -1;
                self.mv_dc = -1;
                self.mv_dr = -1;
            }
        }
    }
}

#[derive(Clone, Copy)]
#[repr(C)]
struct TTCluster {
    e: [TTEntry; TT_BUCKET],
}

pub struct TranspositionTable {
    clusters: UnsafeCell<Vec<TTCluster>>,
    mask: usize,
    age: AtomicU8,
    /// Present only when parallel workers may touch the arena.
    stripes: Option<Vec<Mutex<()>>>,
    degenerate: bool,
    allocated_mb: usize,
}

// Interior mutability is guarded by the stripe locks (parallel mode) or by
// the single-thread discipline of the caller.
unsafe impl Sync for TranspositionTable {}
unsafe impl Send for TranspositionTable {}

fn try_alloc(clusters: usize) -> Option<Vec<TTCluster>> {
    let mut v: Vec<TTCluster> = Vec::new();
    v.try_reserve_exact(clusters).ok()?;
    v.resize(clusters, TTCluster {
        e: [TTEntry::empty(); TT_BUCKET],
    });
    Some(v)
}

impl TranspositionTable {
    /// Allocate the requested size, walking down through smaller powers of
    /// two (to 8 MiB) on failure. A zero-capacity degenerate table is the
    /// last resort; search still runs, probes just never hit.
    pub fn new(size_mb: usize, striped: bool) -> Self {
        let cluster_size = std::mem::size_of::<TTCluster>();
        let mut size_mb = size_mb.max(8);
        loop {
            let bytes = size_mb * 1024 * 1024;
            let wanted = (bytes / cluster_size).max(1);
            // Round down to a power of two for mask indexing.
            let mut pot = 1usize;
            while pot * 2 <= wanted {
                pot *= 2;
            }
            if let Some(clusters) = try_alloc(pot) {
                let stripes = striped.then(|| (0..STRIPES).map(|_| Mutex::new(())).collect());
                return TranspositionTable {
                    clusters: UnsafeCell::new(clusters),
                    mask: pot - 1,
                    age: AtomicU8::new(0),
                    stripes,
                    degenerate: false,
                    allocated_mb: size_mb,
                };
            }
            if size_mb <= 8 {
                log::warn!("transposition table allocation failed at every size; running degenerate");
                return TranspositionTable {
                    clusters: UnsafeCell::new(Vec::new()),
                    mask: 0,
                    age: AtomicU8::new(0),
                    stripes: None,
                    degenerate: true,
                    allocated_mb: 0,
                };
            }
            size_mb /= 2;
        }
    }

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn allocated_mb(&self) -> usize {
        self.allocated_mb
    }

    pub fn capacity(&self) -> usize {
        let clusters = unsafe { &*self.clusters.get() };
        clusters.len() * TT_BUCKET
    }

    #[inline]
    fn stripe_for(&self, key: u64) -> Option<&Mutex<()>> {
        self.stripes
            .as_ref()
            .map(|s| &s[(key as usize) & (STRIPES - 1)])
    }

    /// Pull the cluster for `key` toward L1 ahead of the child's probe.
    #[inline]
    #[cfg(target_arch = "x86_64")]
    pub fn prefetch(&self, key: u64) {
        if self.degenerate {
            return;
        }
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        let clusters = unsafe { &*self.clusters.get() };
        let ptr = clusters.as_ptr().wrapping_add((key as usize) & self.mask) as *const i8;
        // SAFETY: ptr stays inside the allocated arena; prefetch has no
        // architectural effect beyond the cache.
        unsafe { _mm_prefetch(ptr, _MM_HINT_T0) };
    }

    #[inline]
    #[cfg(not(target_arch = "x86_64"))]
    pub fn prefetch(&self, _key: u64) {}

    /// Bump the generation at the start of each new search; old entries
    /// stay probeable but lose replacement priority.
    pub fn bump_age(&self) {
        self.age.fetch_add(1, Ordering::Relaxed);
    }

    pub fn current_age(&self) -> u8 {
        self.age.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        let _guards: Vec<_> = self
            .stripes
            .iter()
            .flat_map(|s| s.iter())
            .map(|m| m.lock().unwrap())
            .collect();
        let clusters = unsafe { &mut *self.clusters.get() };
        for c in clusters.iter_mut() {
            *c = TTCluster {
                e: [TTEntry::empty(); TT_BUCKET],
            };
        }
        self.age.store(0, Ordering::Relaxed);
    }

    /// Two-slot probe: a key hit returns the fresher entry, then the
    /// deeper one.
    pub fn probe(&self, key: u64) -> Option<TTEntry> {
        if self.degenerate {
            return None;
        }
        let _guard = self.stripe_for(key).map(|m| m.lock().unwrap());
        let clusters = unsafe { &*self.clusters.get() };
        let c = &clusters[(key as usize) & self.mask];
        let age = self.current_age();

        let dp = &c.e[0];
        let ar = &c.e[1];
        let dp_hit = dp.key == key;
        let ar_hit = ar.key == key;
        if dp_hit && ar_hit {
            let dp_current = dp.age == age;
            let ar_current = ar.age == age;
            if dp_current != ar_current {
                return Some(if dp_current { *dp } else { *ar });
            }
            return Some(if dp.depth >= ar.depth { *dp } else { *ar });
        }
        if dp_hit {
            return Some(*dp);
        }
        if ar_hit {
            return Some(*ar);
        }
        None
    }

    pub fn store(&self, key: u64, depth: i32, flag: u8, val: i32, best: Option<Move>) {
        if self.degenerate {
            return;
        }
        let _guard = self.stripe_for(key).map(|m| m.lock().unwrap());
        let clusters = unsafe { &mut *self.clusters.get() };
        let c = &mut clusters[(key as usize) & self.mask];
        let age = self.current_age();

        let write_entry = |e: &mut TTEntry| {
            // Key goes in last so a torn concurrent read sees either the
            // old entry or a fully formed new one.
            e.key = 0;
            e.depth = depth.min(i16::MAX as i32) as i16;
            e.flag = flag;
            e.val = val.clamp(-32000, 32000) as i16;
            e.age = age;
            e.pack_move(best);
            e.key = key;
        };

        // Slot 0: depth-preferred, displacing stale generations.
        let depth_slot = &mut c.e[0];
        let slot0_stale = depth_slot.age != age;
        if depth_slot.key == key {
            if depth >= depth_slot.depth as i32 || flag == TT_EXACT {
                write_entry(depth_slot);
            }
        } else if depth_slot.key == 0 || slot0_stale || depth >= depth_slot.depth as i32 {
            write_entry(depth_slot);
        }

        // Slot 1: always replace.
        write_entry(&mut c.e[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_probe_round_trip() {
        let tt = TranspositionTable::new(8, false);
        assert!(!tt.is_degenerate());
        let key = 0x1234_5678_9abc_def0u64;
        tt.store(key, 5, TT_EXACT, 120, Some(Move::new(3, 4, 5)));
        let e = tt.probe(key).expect("hit");
        assert_eq!(e.depth, 5);
        assert_eq!(e.val, 120);
        assert_eq!(e.flag, TT_EXACT);
        assert_eq!(e.best_move(), Some(Move::new(3, 4, 5)));
        assert!(tt.probe(key ^ 1).is_none());
    }

    #[test]
    fn test_value_clamped() {
        let tt = TranspositionTable::new(8, false);
        tt.store(7, 1, TT_LOWER, 999_999, None);
        assert_eq!(tt.probe(7).unwrap().val, 32000);
        tt.store(9, 1, TT_UPPER, -999_999, None);
        assert_eq!(tt.probe(9).unwrap().val, -32000);
    }

    #[test]
    fn test_depth_preferred_slot_survives_shallow_store() {
        let tt = TranspositionTable::new(8, false);
        let key = 42u64;
        tt.store(key, 9, TT_EXACT, 50, Some(Move::new(1, 2, 3)));
        // A shallower non-exact store of the same key must not displace
        // slot 0's deep entry.
        tt.store(key, 2, TT_LOWER, 10, None);
        let e = tt.probe(key).unwrap();
        assert_eq!(e.depth, 9, "deep entry preferred on probe");
    }

    #[test]
    fn test_aging_prefers_current_generation() {
        let tt = TranspositionTable::new(8, false);
        let key = 99u64;
        tt.store(key, 9, TT_EXACT, 11, None);
        tt.bump_age();
        // New generation stores displace the stale deep slot.
        tt.store(key, 3, TT_LOWER, 22, None);
        let e = tt.probe(key).unwrap();
        assert_eq!(e.val, 22, "fresh generation wins the probe");
    }

    #[test]
    fn test_striped_mode_basics() {
        let tt = TranspositionTable::new(8, true);
        tt.store(5, 4, TT_EXACT, 77, None);
        assert_eq!(tt.probe(5).unwrap().val, 77);
        tt.clear();
        assert!(tt.probe(5).is_none());
    }

    #[test]
    fn test_capacity_is_power_of_two_clusters() {
        let tt = TranspositionTable::new(8, false);
        let clusters = tt.capacity() / TT_BUCKET;
        assert!(clusters.is_power_of_two());
    }
}
