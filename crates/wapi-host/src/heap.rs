//! Mark-sweep heap
//!
//! Objects live in an id-keyed table. Roots are the named globals and every
//! object with a positive retain count. Values captured inside native
//! callbacks are not traced; hold them through a reference or a global.

use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};
use wapi_core::{EnvId, FinalizeToken, NativeCallback, ObjectId, ObjectKind, Value, WeakId};

/// Collector statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Objects freed in last collection
    pub last_freed_count: usize,

    /// Live objects after last collection
    pub live_objects: usize,

    /// Finalize events queued across all collections
    pub finalizers_queued: usize,

    /// Last collection duration
    pub last_pause_time: Duration,
}

pub(crate) struct HeapObject {
    pub kind: ObjectKind,
    pub proto: Option<ObjectId>,
    pub properties: FxHashMap<String, Value>,
    pub callback: Option<NativeCallback>,
    /// Backing memory of an external `Uint8Array`
    pub external: Option<(*mut u8, usize)>,
    pub retain_count: u32,
    marked: bool,
}

impl HeapObject {
    fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            proto: None,
            properties: FxHashMap::default(),
            callback: None,
            external: None,
            retain_count: 0,
            marked: false,
        }
    }

    fn children(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.proto
            .into_iter()
            .chain(self.properties.values().filter_map(Value::as_object))
    }
}

#[derive(Default)]
pub(crate) struct Heap {
    objects: FxHashMap<ObjectId, HeapObject>,
    next_object: u64,
    pub globals: FxHashMap<String, Value>,
    /// `None` once the target was collected
    weak: FxHashMap<WeakId, Option<ObjectId>>,
    next_weak: u64,
    registrations: FxHashMap<FinalizeToken, ObjectId>,
    finalized: FxHashMap<EnvId, Vec<FinalizeToken>>,
    stats: GcStats,
}

impl Heap {
    // ========================================================================
    // Allocation
    // ========================================================================

    pub fn alloc(&mut self, kind: ObjectKind) -> ObjectId {
        self.next_object += 1;
        let id = ObjectId(self.next_object);
        self.objects.insert(id, HeapObject::new(kind));
        id
    }

    pub fn alloc_function(&mut self, callback: NativeCallback) -> ObjectId {
        let id = self.alloc(ObjectKind::Function);
        if let Some(object) = self.objects.get_mut(&id) {
            object.callback = Some(callback);
        }
        id
    }

    pub fn alloc_external(&mut self, ptr: *mut u8, len: usize) -> ObjectId {
        let id = self.alloc(ObjectKind::TypedArray);
        if let Some(object) = self.objects.get_mut(&id) {
            object.external = Some((ptr, len));
        }
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.objects.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    // ========================================================================
    // Weak references and finalization
    // ========================================================================

    pub fn create_weak(&mut self, target: ObjectId) -> WeakId {
        self.next_weak += 1;
        let id = WeakId(self.next_weak);
        self.weak.insert(id, Some(target));
        id
    }

    pub fn upgrade_weak(&self, weak: WeakId) -> Option<ObjectId> {
        self.weak.get(&weak).copied().flatten()
    }

    pub fn drop_weak(&mut self, weak: WeakId) {
        self.weak.remove(&weak);
    }

    pub fn register(&mut self, target: ObjectId, token: FinalizeToken) {
        self.registrations.insert(token, target);
    }

    pub fn unregister(&mut self, token: FinalizeToken) -> bool {
        self.registrations.remove(&token).is_some()
    }

    pub fn take_finalized(&mut self, env: EnvId) -> Vec<FinalizeToken> {
        self.finalized.remove(&env).unwrap_or_default()
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Free everything unreachable from the roots. Returns the number of
    /// objects freed.
    pub fn collect(&mut self) -> usize {
        let start = Instant::now();

        self.mark();
        let freed = self.sweep();
        let queued = self.queue_finalizers(&freed);

        self.stats.collections += 1;
        self.stats.objects_freed += freed.len();
        self.stats.last_freed_count = freed.len();
        self.stats.live_objects = self.objects.len();
        self.stats.finalizers_queued += queued;
        self.stats.last_pause_time = start.elapsed();

        log::debug!(
            "gc: freed {} objects, {} live, {} finalize events queued",
            freed.len(),
            self.objects.len(),
            queued
        );
        freed.len()
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    fn mark(&mut self) {
        for object in self.objects.values_mut() {
            object.marked = false;
        }

        let mut stack: Vec<ObjectId> = self
            .globals
            .values()
            .filter_map(Value::as_object)
            .chain(
                self.objects
                    .iter()
                    .filter(|(_, object)| object.retain_count > 0)
                    .map(|(id, _)| *id),
            )
            .collect();

        while let Some(id) = stack.pop() {
            let Some(object) = self.objects.get_mut(&id) else {
                continue;
            };
            if object.marked {
                continue;
            }
            object.marked = true;
            stack.extend(object.children());
        }
    }

    fn sweep(&mut self) -> FxHashSet<ObjectId> {
        let freed: FxHashSet<ObjectId> = self
            .objects
            .iter()
            .filter(|(_, object)| !object.marked)
            .map(|(id, _)| *id)
            .collect();

        for id in &freed {
            self.objects.remove(id);
        }
        for target in self.weak.values_mut() {
            if target.is_some_and(|id| freed.contains(&id)) {
                *target = None;
            }
        }
        freed
    }

    /// Move registrations whose target died into the per-context queues
    fn queue_finalizers(&mut self, freed: &FxHashSet<ObjectId>) -> usize {
        let mut fired: Vec<FinalizeToken> = self
            .registrations
            .iter()
            .filter(|(_, target)| freed.contains(target))
            .map(|(token, _)| *token)
            .collect();
        fired.sort_by_key(|token| (token.env, token.seq));

        for token in &fired {
            self.registrations.remove(token);
            self.finalized.entry(token.env).or_default().push(*token);
        }
        fired.len()
    }
}
