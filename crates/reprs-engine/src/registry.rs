//! Converter registry and path search.
//!
//! The graph has one node per [`ReprKind`] and one edge per registered
//! converter or package. [`ConverterRegistry::find_path`] runs a
//! uniform-cost search seeded with every valid source kind at once. Queue
//! entries are ordered by:
//!
//! 1. total hop cost
//! 2. number of edges (a package beats the chain it composes)
//! 3. discovery order (first source, then first registered edge)
//!
//! The order is total, so the same registry always returns the same path.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use reprs_core::{KindSet, ReprKind, Result};

use crate::converter::{ConverterPackage, RepresentationConverter};
use crate::converters::{default_converters, default_packages};

/// Sequence of edges from a source kind to a target kind.
#[derive(Clone)]
pub struct ConversionPath {
    source: ReprKind,
    target: ReprKind,
    edges: Vec<Arc<dyn RepresentationConverter>>,
}

impl ConversionPath {
    /// Starting kind.
    pub fn source(&self) -> ReprKind {
        self.source
    }

    /// Final kind.
    pub fn target(&self) -> ReprKind {
        self.target
    }

    /// Edges in execution order.
    pub fn edges(&self) -> &[Arc<dyn RepresentationConverter>] {
        &self.edges
    }

    /// Sum of edge costs.
    pub fn cost(&self) -> u32 {
        self.edges.iter().map(|e| e.cost()).sum()
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the source already is the target.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Edge names, e.g. `["ram => graphics => interop"]`.
    pub fn edge_names(&self) -> Vec<String> {
        self.edges.iter().map(|e| e.name()).collect()
    }
}

impl std::fmt::Display for ConversionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)?;
        for edge in &self.edges {
            write!(f, " -> {}", edge.destination())?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConversionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionPath")
            .field("path", &self.to_string())
            .field("edges", &self.edge_names())
            .field("cost", &self.cost())
            .finish()
    }
}

/// Path cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathCacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that ran the search.
    pub misses: u64,
    /// Cached (sources, target) pairs.
    pub entries: usize,
}

type PathKey = (Vec<ReprKind>, ReprKind);

#[derive(Default)]
struct PathCache {
    paths: HashMap<PathKey, Option<ConversionPath>>,
    hits: u64,
    misses: u64,
}

/// Registered converters plus the memoized path search over them.
pub struct ConverterRegistry {
    edges: Vec<Arc<dyn RepresentationConverter>>,
    cache_enabled: bool,
    cache: Mutex<PathCache>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterRegistry {
    /// Empty registry with path caching on.
    pub fn new() -> Self {
        Self {
            edges: Vec::new(),
            cache_enabled: true,
            cache: Mutex::new(PathCache::default()),
        }
    }

    /// Registry with the built-in converters, then the built-in packages.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        for converter in default_converters() {
            registry.register(converter);
        }
        for package in default_packages()? {
            registry.register_package(package);
        }
        Ok(registry)
    }

    /// Enable or disable path memoization.
    pub fn with_path_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self.clear_cache();
        self
    }

    /// Add a converter edge. Later registrations lose ties.
    pub fn register(&mut self, converter: Arc<dyn RepresentationConverter>) {
        debug!(converter = %converter.name(), cost = converter.cost(), "converter registered");
        self.edges.push(converter);
        self.clear_cache();
    }

    /// Add a package as a single edge.
    pub fn register_package(&mut self, package: ConverterPackage) {
        self.register(Arc::new(package));
    }

    /// Registered edges in order.
    pub fn edges(&self) -> &[Arc<dyn RepresentationConverter>] {
        &self.edges
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Kinds reachable from `source`, excluding itself.
    pub fn reachable_from(&self, source: ReprKind) -> KindSet {
        ReprKind::ALL
            .into_iter()
            .filter(|k| *k != source && self.search(&[source], *k).is_some())
            .collect()
    }

    fn cache(&self) -> MutexGuard<'_, PathCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop all memoized paths.
    pub fn clear_cache(&self) {
        self.cache().paths.clear();
    }

    /// Cache counters.
    pub fn cache_stats(&self) -> PathCacheStats {
        let cache = self.cache();
        PathCacheStats {
            hits: cache.hits,
            misses: cache.misses,
            entries: cache.paths.len(),
        }
    }

    /// Cheapest path from any of `sources` to `target`.
    ///
    /// `sources` are tried in the given order when costs tie. Returns an
    /// empty path when `target` is among the sources and `None` when no
    /// chain of converters reaches it.
    pub fn find_path(&self, sources: &[ReprKind], target: ReprKind) -> Option<ConversionPath> {
        if !self.cache_enabled {
            return self.search(sources, target);
        }
        let key = (sources.to_vec(), target);
        {
            let mut cache = self.cache();
            if let Some(path) = cache.paths.get(&key).cloned() {
                cache.hits += 1;
                return path;
            }
            cache.misses += 1;
        }
        let path = self.search(sources, target);
        self.cache().paths.insert(key, path.clone());
        path
    }

    fn search(&self, sources: &[ReprKind], target: ReprKind) -> Option<ConversionPath> {
        if let Some(&source) = sources.iter().find(|&&s| s == target) {
            return Some(ConversionPath { source, target, edges: Vec::new() });
        }

        // (cost, edges, seq) per node; prev = (edge index, from node)
        let mut best: [Option<(u32, usize, u64)>; ReprKind::COUNT] = [None; ReprKind::COUNT];
        let mut prev: [Option<usize>; ReprKind::COUNT] = [None; ReprKind::COUNT];
        let mut origin: [Option<ReprKind>; ReprKind::COUNT] = [None; ReprKind::COUNT];
        let mut settled = [false; ReprKind::COUNT];
        let mut heap = BinaryHeap::new();
        let mut seq = 0u64;

        for &source in sources {
            if best[source.index()].is_none() {
                best[source.index()] = Some((0, 0, seq));
                origin[source.index()] = Some(source);
                heap.push(Reverse((0u32, 0usize, seq, source)));
                seq += 1;
            }
        }

        while let Some(Reverse((cost, hops, order, node))) = heap.pop() {
            if settled[node.index()] || best[node.index()] != Some((cost, hops, order)) {
                continue;
            }
            settled[node.index()] = true;
            trace!(%node, cost, hops, "path search: settled");

            if node == target {
                return self.rebuild(target, &prev, &origin);
            }

            for (index, edge) in self.edges.iter().enumerate() {
                if edge.source() != node {
                    continue;
                }
                let next = edge.destination();
                if settled[next.index()] {
                    continue;
                }
                let candidate = (cost + edge.cost(), hops + 1);
                let improves = match best[next.index()] {
                    None => true,
                    Some((c, h, _)) => candidate < (c, h),
                };
                if improves {
                    best[next.index()] = Some((candidate.0, candidate.1, seq));
                    prev[next.index()] = Some(index);
                    origin[next.index()] = origin[node.index()];
                    heap.push(Reverse((candidate.0, candidate.1, seq, next)));
                    seq += 1;
                }
            }
        }
        None
    }

    fn rebuild(
        &self,
        target: ReprKind,
        prev: &[Option<usize>; ReprKind::COUNT],
        origin: &[Option<ReprKind>; ReprKind::COUNT],
    ) -> Option<ConversionPath> {
        let source = origin[target.index()]?;
        let mut edges = Vec::new();
        let mut node = target;
        while node != source {
            let edge = &self.edges[prev[node.index()]?];
            node = edge.source();
            edges.push(edge.clone());
        }
        edges.reverse();
        Some(ConversionPath { source, target, edges })
    }

    /// One line per edge: `name (cost N)`.
    pub fn describe(&self) -> String {
        let mut desc = String::new();
        for (i, edge) in self.edges.iter().enumerate() {
            desc.push_str(&format!("{:>2}. {} (cost {})\n", i + 1, edge.name(), edge.cost()));
        }
        desc
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("edges", &self.edges.iter().map(|e| e.name()).collect::<Vec<_>>())
            .field("cache_enabled", &self.cache_enabled)
            .finish()
    }
}
