//! Process-wide PP registry
//!
//! An append-only table of distinct preemption points keyed by directive
//! string, supporting priority updates, exploration marks, and snapshot
//! reads under a readers/writers discipline. Unlike the C source this is
//! threaded explicitly through the dispatcher and jobs rather than kept as
//! static global state, per the Design Notes; the double-checked lazy-init
//! dance collapses into `Registry::new`, which installs the built-ins
//! synchronously.

use std::sync::RwLock;
use tracing::{debug, warn};

const INITIAL_CAPACITY: usize = 16;

/// Priority values double as single-bit masks so [`PpSet::create`] can select
/// PPs by OR-ing together the categories it wants. The low bits name specific
/// categories; the high 16 bits are reserved for suspected data races so that
/// any value in that half satisfies [`is_data_race`].
pub const PRIORITY_MUTEX_LOCK: u32 = 1 << 0;
pub const PRIORITY_MUTEX_UNLOCK: u32 = 1 << 1;
pub const PRIORITY_ORDINARY: u32 = 1 << 2;
pub const PRIORITY_DATA_RACE_BASE: u32 = 1 << 16;
pub const PRIORITY_DATA_RACE_MASK: u32 = 0xFFFF_0000;

/// Sentinel returned by `unexplored_priority` for a nonempty, fully-explored set.
pub const PRIORITY_ALL: u32 = u32::MAX;
/// Sentinel returned by `unexplored_priority` for an empty set.
pub const PRIORITY_NONE: u32 = 0;

/// Long-description prefix the C source special-cased to suppress unreadable
/// obfuscated kernel addresses from the data-race report.
const OBFUSCATED_ADDR_PREFIX: &str = "0x00102917";

pub fn is_data_race(priority: u32) -> bool {
    priority >= PRIORITY_DATA_RACE_BASE && priority & PRIORITY_DATA_RACE_MASK != 0
}

/// A single preemption point. Identity fields (`id`, `directive`, `short`,
/// `long_desc`) are immutable after insertion; `priority`, `generation`, and
/// `explored` are mutated only under the registry's write lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pp {
    pub id: u32,
    pub directive: String,
    pub short: String,
    pub long_desc: String,
    pub priority: u32,
    pub generation: u32,
    pub explored: bool,
}

struct Inner {
    pps: Vec<Pp>,
    max_generation: u32,
}

impl Inner {
    fn append(&mut self, directive: String, short: String, long_desc: String, priority: u32, generation: u32) -> Pp {
        debug_assert!(priority != 0, "PP priority must be nonzero");
        if generation > self.max_generation {
            self.max_generation = generation;
        }
        let pp = Pp {
            id: self.pps.len() as u32,
            directive,
            short,
            long_desc,
            priority,
            generation,
            explored: false,
        };
        self.pps.push(pp.clone());
        pp
    }
}

/// Process-wide table of distinct PPs. Never shrinks; ids are positions and
/// are never reused or reordered.
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    /// Construct a registry with the two built-in seed PPs already installed
    /// at their prescribed ids (0, 1).
    pub fn new() -> Self {
        let mut inner = Inner {
            pps: Vec::with_capacity(INITIAL_CAPACITY),
            max_generation: 0,
        };
        let lock = inner.append(
            "within_user_function mutex_lock".to_string(),
            "mutex_lock".to_string(),
            "<at beginning of mutex_lock>".to_string(),
            PRIORITY_MUTEX_LOCK,
            0,
        );
        assert_eq!(lock.id, 0, "mutex_lock must be seeded at id 0");
        let unlock = inner.append(
            "within_user_function mutex_unlock".to_string(),
            "mutex_unlock".to_string(),
            "<at end of mutex_unlock>".to_string(),
            PRIORITY_MUTEX_UNLOCK,
            0,
        );
        assert_eq!(unlock.id, 1, "mutex_unlock must be seeded at id 1");
        assert_eq!(inner.pps.len(), 2);

        Self { inner: RwLock::new(inner) }
    }

    /// Current registry size (one past the highest valid id).
    pub fn len(&self) -> u32 {
        self.inner.read().unwrap().pps.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `directive`; if present, lower its priority (and overwrite its
    /// generation) when the caller's priority is strictly lower, otherwise
    /// intern a new PP. Returns the PP and whether it was already present.
    pub fn get_or_intern(
        &self,
        directive: &str,
        short: &str,
        long_desc: &str,
        priority: u32,
        generation: u32,
    ) -> (Pp, bool) {
        debug_assert!(priority != 0, "PP priority must be nonzero");
        let mut inner = self.inner.write().unwrap();

        if let Some(existing) = inner.pps.iter_mut().find(|pp| pp.directive == directive) {
            if priority < existing.priority {
                debug!(
                    directive,
                    from = existing.priority,
                    to = priority,
                    "lowering PP priority"
                );
                existing.priority = priority;
                existing.generation = generation;
            }
            return (existing.clone(), true);
        }

        if is_data_race(priority) {
            warn!(directive, long_desc, "found a potentially-racy access");
        }
        let pp = inner.append(directive.to_string(), short.to_string(), long_desc.to_string(), priority, generation);
        (pp, false)
    }

    /// Bounds-checked lookup by id.
    pub fn get(&self, id: u32) -> Pp {
        let inner = self.inner.read().unwrap();
        let pp = inner
            .pps
            .get(id as usize)
            .unwrap_or_else(|| panic!("nonexistent PP of id {id}"));
        assert_eq!(pp.id, id, "inconsistent PP id in PP registry");
        pp.clone()
    }

    fn report_unexplored_locked(pps: &[Pp]) {
        let mut any = false;
        for pp in pps {
            if is_data_race(pp.priority) && !pp.explored {
                if pp.long_desc.starts_with(OBFUSCATED_ADDR_PREFIX) {
                    continue;
                }
                if !any {
                    any = true;
                    warn!("the following potentially-racy accesses were never confirmed benign or buggy; you may wish to inspect them manually:");
                }
                warn!(directive = %pp.directive, "data race at {}", pp.long_desc);
            }
        }
    }

    /// Enumerate unexplored data-race PPs and warn about each, under the read lock.
    pub fn report_unexplored_data_races(&self) {
        let inner = self.inner.read().unwrap();
        Self::report_unexplored_locked(&inner.pps);
    }

    /// Signal-handler-safe variant: skips silently rather than blocking if
    /// the registry lock is contended.
    pub fn try_report_unexplored_data_races(&self) {
        match self.inner.try_read() {
            Ok(inner) => Self::report_unexplored_locked(&inner.pps),
            Err(_) => debug!("couldn't get PP registry lock to print data-race PPs"),
        }
    }

    /// Mark every PP in `set` explored, except data-race PPs when the
    /// worker's state space was too small (`elapsed_branches <= 1`) for the
    /// race to plausibly have manifested.
    pub fn mark_explored(&self, set: &crate::ppset::PpSet, elapsed_branches: u64) {
        let mut inner = self.inner.write().unwrap();
        for id in set.iter_ids() {
            let pp = &mut inner.pps[id as usize];
            if !is_data_race(pp.priority) || elapsed_branches > 1 {
                pp.explored = true;
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
