//! View pool
//!
//! A keyed cache of pre-built component trees, one pool per view id
//! under a process-wide registry. Entries live in three tiers:
//! static-structure (reusable verbatim), partial-structure (reusable
//! after clearing dynamically-added content), and dynamic-structure
//! (structure varies per facelet-state token, keyed lookup).
//!
//! Pools are bounded per view id; eviction is insertion-order (oldest
//! first), reuse consumes from the front, and a popped entry is gone —
//! concurrent pops never hand out the same tree twice. In soft mode
//! the trees sit behind weak handles whose strong anchors the registry
//! can drop under memory pressure, so a soft pop may spuriously miss.

use crate::config::{EntryMode, PoolConfig};
use crate::metadata::{RenderEnvironment, ViewStructureMetadata};
use arbor_component::tree::ComponentTree;
use arbor_types::{FaceletStateToken, ViewId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Verdict attached to a pooled tree when it is stored, and returned
/// to the caller that pops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreResult {
    /// Tree usable as-is; the caller still runs request-scoped
    /// re-binding but skips the view build
    Complete,

    /// Tree usable only after clearing transient and
    /// dynamically-added content and reconciling against the view
    /// description
    RefreshRequired,
}

/// A tree handed back by a pop, together with its verdict and the
/// metadata it was stored under.
#[derive(Debug)]
pub struct PoppedView {
    pub tree: ComponentTree,
    pub result: RestoreResult,
    pub metadata: Arc<ViewStructureMetadata>,
}

/// Strong holder for a soft-mode tree; the pool entry only keeps a
/// weak handle to it.
type SoftAnchor = Arc<Mutex<Option<ComponentTree>>>;

/// Retention handle for a pooled tree.
enum TreeHandle {
    Hard(ComponentTree),
    Soft(Weak<Mutex<Option<ComponentTree>>>),
}

impl TreeHandle {
    /// Take the tree out of the handle. `None` means a soft handle was
    /// reclaimed under memory pressure.
    fn take(self) -> Option<ComponentTree> {
        match self {
            TreeHandle::Hard(tree) => Some(tree),
            TreeHandle::Soft(weak) => weak.upgrade().and_then(|anchor| anchor.lock().take()),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            TreeHandle::Hard(_) => true,
            TreeHandle::Soft(weak) => weak.strong_count() > 0,
        }
    }
}

impl fmt::Debug for TreeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeHandle::Hard(_) => write!(f, "TreeHandle::Hard"),
            TreeHandle::Soft(_) => write!(f, "TreeHandle::Soft"),
        }
    }
}

#[derive(Debug)]
struct PoolEntry {
    tree: TreeHandle,
    metadata: Arc<ViewStructureMetadata>,
    result: RestoreResult,
    token: Option<FaceletStateToken>,

    /// Global insertion sequence, the eviction and reuse order
    seq: u64,
}

/// Per-view-id pool state. All tiers share one lock so pop/push and
/// eviction are atomic with respect to each other.
#[derive(Debug, Default)]
struct PoolTiers {
    static_entries: VecDeque<PoolEntry>,
    partial_entries: VecDeque<PoolEntry>,
    dynamic_entries: VecDeque<PoolEntry>,

    /// Strong anchors keeping soft handles alive until reclamation.
    /// Every anchor here belongs to exactly one soft entry; dropping
    /// an entry drops its anchor too, so the pooled tree is freed.
    soft_anchors: Vec<SoftAnchor>,
}

impl PoolTiers {
    fn len(&self) -> usize {
        self.static_entries.len() + self.partial_entries.len() + self.dynamic_entries.len()
    }

    /// Drop the globally oldest entry across all tiers, anchor
    /// included.
    fn evict_oldest(&mut self) {
        let fronts = [
            self.static_entries.front().map(|e| e.seq),
            self.partial_entries.front().map(|e| e.seq),
            self.dynamic_entries.front().map(|e| e.seq),
        ];
        let Some(tier) = fronts
            .iter()
            .enumerate()
            .filter_map(|(index, seq)| seq.map(|seq| (index, seq)))
            .min_by_key(|&(_, seq)| seq)
            .map(|(index, _)| index)
        else {
            return;
        };
        let entry = match tier {
            0 => self.static_entries.pop_front(),
            1 => self.partial_entries.pop_front(),
            _ => self.dynamic_entries.pop_front(),
        };
        if let Some(entry) = entry {
            release_anchor(&mut self.soft_anchors, anchor_target(&entry.tree));
        }
    }

    /// Drop entries whose soft handle is already gone.
    fn drop_dead_entries(&mut self) {
        self.static_entries.retain(|e| e.tree.is_live());
        self.partial_entries.retain(|e| e.tree.is_live());
        self.dynamic_entries.retain(|e| e.tree.is_live());
    }
}

/// Pointer identity of the anchor backing a soft handle, `None` for a
/// hard one.
fn anchor_target(handle: &TreeHandle) -> Option<*const Mutex<Option<ComponentTree>>> {
    match handle {
        TreeHandle::Soft(weak) => Some(weak.as_ptr()),
        TreeHandle::Hard(_) => None,
    }
}

/// Remove the anchor at the given identity, letting the tree drop if
/// it was not already taken.
fn release_anchor(
    anchors: &mut Vec<SoftAnchor>,
    target: Option<*const Mutex<Option<ComponentTree>>>,
) {
    if let Some(target) = target {
        anchors.retain(|anchor| !std::ptr::eq(Arc::as_ptr(anchor), target));
    }
}

/// Counters shared by every pool in a registry.
#[derive(Debug, Default)]
pub struct PoolStats {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
    reclamations: AtomicU64,
}

impl PoolStats {
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            reclamations: self.reclamations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub reclamations: u64,
}

impl PoolStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for PoolStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "View Pool Statistics:")?;
        writeln!(
            f,
            "  Hits: {} | Misses: {} | Hit Rate: {:.1}%",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0
        )?;
        writeln!(
            f,
            "  Stores: {} | Evictions: {} | Soft Reclamations: {}",
            self.stores, self.evictions, self.reclamations
        )?;
        Ok(())
    }
}

/// Process-wide registry of per-view-id pools.
///
/// Explicitly constructed at application start and dropped at stop;
/// there is no static state. All cross-request sharing goes through
/// the per-view locks inside.
#[derive(Debug)]
pub struct ViewPoolRegistry {
    pools: DashMap<ViewId, Arc<Mutex<PoolTiers>>>,

    /// First-build structure baselines, per view id
    baselines: DashMap<ViewId, Arc<ViewStructureMetadata>>,

    config: PoolConfig,
    stats: PoolStats,
    seq: AtomicU64,
}

impl ViewPoolRegistry {
    pub fn new(config: PoolConfig) -> Self {
        ViewPoolRegistry {
            pools: DashMap::new(),
            baselines: DashMap::new(),
            config,
            stats: PoolStats::default(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }

    /// Record the structural baseline captured by a view's first full
    /// build. Later stores compare against it to pick the dynamic
    /// tier for structural variants.
    pub fn store_structure_metadata(&self, metadata: Arc<ViewStructureMetadata>) {
        self.baselines
            .entry(metadata.environment.view_id.clone())
            .or_insert(metadata);
    }

    /// The recorded baseline for a view id, if any build completed.
    pub fn structure_metadata(&self, view_id: &ViewId) -> Option<Arc<ViewStructureMetadata>> {
        self.baselines.get(view_id).map(|e| e.value().clone())
    }

    /// Offer a rendered tree to the pool.
    ///
    /// `Complete` trees whose digest equals the view's baseline go to
    /// the static tier, `RefreshRequired` ones to the partial tier;
    /// trees stored under a facelet-state token whose structure
    /// diverges from the baseline go to the dynamic tier. Respects the
    /// capacity bound, evicting the oldest entry under the same lock.
    pub fn store(
        &self,
        tree: ComponentTree,
        metadata: Arc<ViewStructureMetadata>,
        result: RestoreResult,
        token: Option<FaceletStateToken>,
    ) {
        if !self.config.enabled || self.config.max_pool_size == 0 {
            return;
        }
        let view_id = metadata.environment.view_id.clone();
        self.store_structure_metadata(metadata.clone());

        let dynamic = match self.structure_metadata(&view_id) {
            Some(baseline) => token.is_some() && baseline.digest != metadata.digest,
            None => false,
        };

        let pool = self
            .pools
            .entry(view_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(PoolTiers::default())))
            .clone();
        let mut tiers = pool.lock();
        tiers.drop_dead_entries();

        while tiers.len() >= self.config.max_pool_size {
            tiers.evict_oldest();
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }

        let handle = match self.config.entry_mode {
            EntryMode::Hard => TreeHandle::Hard(tree),
            EntryMode::Soft => {
                let anchor = Arc::new(Mutex::new(Some(tree)));
                let weak = Arc::downgrade(&anchor);
                tiers.soft_anchors.push(anchor);
                TreeHandle::Soft(weak)
            }
        };
        let entry = PoolEntry {
            tree: handle,
            metadata,
            result,
            token,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };

        debug!(
            view_id = %view_id,
            ?result,
            dynamic,
            "storing view in pool"
        );
        if dynamic {
            tiers.dynamic_entries.push_back(entry);
        } else {
            match result {
                RestoreResult::Complete => tiers.static_entries.push_back(entry),
                RestoreResult::RefreshRequired => tiers.partial_entries.push_back(entry),
            }
        }
        self.stats.stores.fetch_add(1, Ordering::Relaxed);
    }

    /// Pop a static- or partial-structure entry for the given
    /// environment. Static entries are preferred; within a tier the
    /// oldest matching entry is consumed.
    pub fn pop_static_or_partial_structure_view(
        &self,
        environment: &RenderEnvironment,
    ) -> Option<PoppedView> {
        let Some(pool) = self.pools.get(&environment.view_id).map(|p| p.value().clone()) else {
            self.count_lookup(&environment.view_id, false);
            return None;
        };
        let mut tiers = pool.lock();
        let tiers = &mut *tiers;

        let mut popped = pop_matching(
            &mut tiers.static_entries,
            &mut tiers.soft_anchors,
            environment,
            None,
            &self.stats,
        );
        if popped.is_none() {
            popped = pop_matching(
                &mut tiers.partial_entries,
                &mut tiers.soft_anchors,
                environment,
                None,
                &self.stats,
            );
        }
        self.count_lookup(&environment.view_id, popped.is_some());
        popped
    }

    /// Pop a dynamic-structure entry for the given environment and
    /// facelet-state token. The most specific token match wins; ties
    /// fall back to insertion order.
    pub fn pop_dynamic_structure_view(
        &self,
        environment: &RenderEnvironment,
        token: &FaceletStateToken,
    ) -> Option<PoppedView> {
        let Some(pool) = self.pools.get(&environment.view_id).map(|p| p.value().clone()) else {
            self.count_lookup(&environment.view_id, false);
            return None;
        };
        let mut tiers = pool.lock();
        let tiers = &mut *tiers;

        let popped = pop_matching(
            &mut tiers.dynamic_entries,
            &mut tiers.soft_anchors,
            environment,
            Some(token),
            &self.stats,
        );
        self.count_lookup(&environment.view_id, popped.is_some());
        popped
    }

    /// Memory pressure hook: drop the strong anchors of every soft
    /// entry. Subsequent pops of those entries miss.
    pub fn release_soft_references(&self) {
        for pool in self.pools.iter() {
            let mut tiers = pool.value().lock();
            let released = tiers.soft_anchors.len();
            tiers.soft_anchors.clear();
            tiers.drop_dead_entries();
            if released > 0 {
                self.stats
                    .reclamations
                    .fetch_add(released as u64, Ordering::Relaxed);
                trace!(view_id = %pool.key(), released, "released soft references");
            }
        }
    }

    /// Number of live entries pooled for a view id (test support).
    pub fn entry_count(&self, view_id: &ViewId) -> usize {
        self.pools
            .get(view_id)
            .map(|pool| {
                let mut tiers = pool.value().lock();
                tiers.drop_dead_entries();
                tiers.len()
            })
            .unwrap_or(0)
    }

    /// Number of strong anchors held for a view id (test support).
    pub fn soft_anchor_count(&self, view_id: &ViewId) -> usize {
        self.pools
            .get(view_id)
            .map(|pool| pool.value().lock().soft_anchors.len())
            .unwrap_or(0)
    }

    fn count_lookup(&self, view_id: &ViewId, hit: bool) {
        if hit {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            trace!(view_id = %view_id, "pool hit");
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            trace!(view_id = %view_id, "pool miss");
        }
    }
}

/// Pop the preferred matching entry from one tier.
///
/// With a token, exact token matches are preferred over token-less
/// entries; both fall back to insertion order. Reclaimed soft entries
/// encountered on the way are dropped. A removed entry's anchor is
/// released with it, whether the take succeeded or not.
fn pop_matching(
    tier: &mut VecDeque<PoolEntry>,
    anchors: &mut Vec<SoftAnchor>,
    environment: &RenderEnvironment,
    token: Option<&FaceletStateToken>,
    stats: &PoolStats,
) -> Option<PoppedView> {
    loop {
        let index = scan_tier(tier, environment, token)?;
        let entry = tier.remove(index)?;
        let target = anchor_target(&entry.tree);
        let taken = entry.tree.take();
        release_anchor(anchors, target);
        match taken {
            Some(tree) => {
                return Some(PoppedView {
                    tree,
                    result: entry.result,
                    metadata: entry.metadata,
                });
            }
            None => {
                // Soft entry reclaimed between lookup and take; treat
                // it as never pooled and keep scanning.
                stats.reclamations.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Index of the preferred matching entry in one tier: with a token,
/// the oldest exact token match, falling back to the oldest token-less
/// entry; without one, plain insertion order.
fn scan_tier(
    tier: &VecDeque<PoolEntry>,
    environment: &RenderEnvironment,
    token: Option<&FaceletStateToken>,
) -> Option<usize> {
    let mut fallback = None;
    for (index, entry) in tier.iter().enumerate() {
        if !entry.metadata.environment_matches(environment) {
            continue;
        }
        match token {
            Some(token) => {
                if entry.token.as_ref() == Some(token) {
                    return Some(index);
                }
                if entry.token.is_none() && fallback.is_none() {
                    fallback = Some(index);
                }
            }
            None => return Some(index),
        }
    }
    fallback
}
