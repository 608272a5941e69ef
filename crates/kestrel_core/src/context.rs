//! # Engine Context
//!
//! Explicit dependency bundle handed to every scene at construction. There
//! is no ambient "current engine" global: whatever collaborators a scene
//! needs (the component registry, a resource cache, the work queue) ride
//! in here, which keeps scenes relocatable and unit-testable in isolation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::component::ComponentRegistry;

/// An opaque loaded resource, addressed by kind and name.
///
/// Asset-specific loaders live outside this crate; the scene core only
/// ever holds resources as named byte blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Resource kind tag, e.g. `"Script"` or `"Model"`.
    pub kind: String,
    /// Name the resource was requested under.
    pub name: String,
    /// Raw resource payload.
    pub data: Vec<u8>,
}

/// Lookup interface of the resource-cache collaborator.
pub trait ResourceCache: Send + Sync {
    /// Returns the resource of `kind` registered under `name`, if present.
    fn get_resource(&self, kind: &str, name: &str) -> Option<Arc<Resource>>;
}

/// In-memory resource cache.
///
/// The production asset pipeline provides its own implementation; this one
/// backs tests and headless tools.
#[derive(Default)]
pub struct MemoryResourceCache {
    entries: HashMap<(String, String), Arc<Resource>>,
}

impl MemoryResourceCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Inserts a resource, replacing any previous entry of the same kind
    /// and name.
    pub fn insert(&mut self, resource: Resource) {
        self.entries.insert(
            (resource.kind.clone(), resource.name.clone()),
            Arc::new(resource),
        );
    }
}

impl ResourceCache for MemoryResourceCache {
    fn get_resource(&self, kind: &str, name: &str) -> Option<Arc<Resource>> {
        self.entries
            .get(&(kind.to_owned(), name.to_owned()))
            .cloned()
    }
}

/// Work-queue collaborator interface.
///
/// The scene only consults the worker count to decide whether entering the
/// threaded-update bracket is worthwhile; scheduling itself is the
/// collaborator's business.
pub trait WorkQueue: Send + Sync {
    /// Number of worker threads available; 0 means single-threaded.
    fn num_threads(&self) -> usize;
}

/// Work queue with no workers; threaded-update brackets become no-ops.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialWorkQueue;

impl WorkQueue for SerialWorkQueue {
    fn num_threads(&self) -> usize {
        0
    }
}

/// Work queue reporting a fixed worker-pool size.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    threads: usize,
}

impl WorkerPool {
    /// Creates a descriptor for a pool of `threads` workers.
    #[must_use]
    pub const fn new(threads: usize) -> Self {
        Self { threads }
    }
}

impl WorkQueue for WorkerPool {
    fn num_threads(&self) -> usize {
        self.threads
    }
}

/// Subsystem accessors bundled for scene construction.
#[derive(Clone)]
pub struct EngineContext {
    components: Arc<ComponentRegistry>,
    resource_cache: Option<Arc<dyn ResourceCache>>,
    work_queue: Arc<dyn WorkQueue>,
}

impl EngineContext {
    /// Creates a context around a component registry, with no resource
    /// cache and a serial work queue.
    #[must_use]
    pub fn new(components: ComponentRegistry) -> Self {
        Self {
            components: Arc::new(components),
            resource_cache: None,
            work_queue: Arc::new(SerialWorkQueue),
        }
    }

    /// Context with the built-in component set registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::new(ComponentRegistry::with_builtins())
    }

    /// Attaches a resource cache.
    #[must_use]
    pub fn with_resource_cache(mut self, cache: Arc<dyn ResourceCache>) -> Self {
        self.resource_cache = Some(cache);
        self
    }

    /// Replaces the work queue.
    #[must_use]
    pub fn with_work_queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.work_queue = queue;
        self
    }

    /// The component factory registry.
    #[inline]
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// The resource cache, if one was provided.
    #[inline]
    #[must_use]
    pub fn resource_cache(&self) -> Option<&Arc<dyn ResourceCache>> {
        self.resource_cache.as_ref()
    }

    /// The work-queue collaborator.
    #[inline]
    #[must_use]
    pub fn work_queue(&self) -> &dyn WorkQueue {
        self.work_queue.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache_lookup() {
        let mut cache = MemoryResourceCache::new();
        cache.insert(Resource {
            kind: "Script".into(),
            name: "ai/patrol.ks".into(),
            data: vec![1, 2, 3],
        });

        assert!(cache.get_resource("Script", "ai/patrol.ks").is_some());
        assert!(cache.get_resource("Script", "missing.ks").is_none());
        assert!(cache.get_resource("Model", "ai/patrol.ks").is_none());
    }

    #[test]
    fn test_context_defaults() {
        let ctx = EngineContext::with_builtins();
        assert!(ctx.resource_cache().is_none());
        assert_eq!(ctx.work_queue().num_threads(), 0);
        assert!(!ctx.components().is_empty());
    }

    #[test]
    fn test_worker_pool_reports_threads() {
        let ctx = EngineContext::with_builtins().with_work_queue(Arc::new(WorkerPool::new(4)));
        assert_eq!(ctx.work_queue().num_threads(), 4);
    }
}
