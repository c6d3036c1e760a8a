//! Reference host runtime
//!
//! [`Runtime`] implements [`HostRuntime`] over a single-threaded [`Heap`].
//! Collection only happens when [`Runtime::collect_garbage`] is called, so
//! values held by native code between collections stay valid. The heap is
//! never borrowed while a native callback runs; callbacks may re-enter both
//! the runtime and the bridge.

use std::cell::RefCell;

use wapi_core::{
    CallbackInfo, EnvId, Env, Exception, Feature, FinalizeToken, HostError, HostRuntime,
    NativeCallback, ObjectId, ObjectKind, Value, WeakId,
};

use crate::heap::{GcStats, Heap};
use crate::options::HostOptions;

/// Prototype chains longer than this are treated as cyclic
const MAX_PROTO_DEPTH: usize = 1024;

/// Single-threaded managed heap with weak references and a finalization
/// registry
#[derive(Default)]
pub struct Runtime {
    options: HostOptions,
    heap: RefCell<Heap>,
}

impl Runtime {
    pub fn new(options: HostOptions) -> Self {
        Self {
            options,
            heap: RefCell::new(Heap::default()),
        }
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    // ========================================================================
    // Harness API
    // ========================================================================

    /// Bind a global. Globals are collection roots.
    pub fn set_global(&self, name: &str, value: Value) {
        self.heap.borrow_mut().globals.insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.heap.borrow().globals.get(name).cloned()
    }

    /// Unbind a global, returning whether it existed
    pub fn delete_global(&self, name: &str) -> bool {
        self.heap.borrow_mut().globals.remove(name).is_some()
    }

    /// `object[name](...args)`, as managed code would call a method
    pub fn call_method(
        &self,
        env: &Env,
        object: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, HostError> {
        let receiver = object
            .as_object()
            .ok_or_else(|| HostError::Rejected(format!("cannot read property '{}' of a primitive", name)))?;
        let method = self.get_property(receiver, name)?;
        match method.as_object() {
            Some(function) if self.object_kind(function) == Some(ObjectKind::Function) => {
                self.call(env, function, object.clone(), args)
            }
            _ => Err(HostError::Exception(
                Exception::new(format!("{} is not a function", name)).with_code("TypeError"),
            )),
        }
    }

    /// Run a full mark-sweep collection. Returns the number of objects freed.
    pub fn collect_garbage(&self) -> usize {
        self.heap.borrow_mut().collect()
    }

    /// Copy of the bytes visible through an external buffer
    pub fn read_bytes(&self, buffer: ObjectId) -> Option<Vec<u8>> {
        let (ptr, len) = self.buffer_info(buffer)?;
        if len == 0 {
            return Some(Vec::new());
        }
        // SAFETY: the creator of the buffer keeps `ptr..ptr+len` valid until
        // its release callback runs, which cannot happen while it is alive.
        Some(unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec())
    }

    pub fn is_alive(&self, object: ObjectId) -> bool {
        self.heap.borrow().get(object).is_some()
    }

    pub fn object_count(&self) -> usize {
        self.heap.borrow().len()
    }

    pub fn stats(&self) -> GcStats {
        self.heap.borrow().stats().clone()
    }

    /// Run a function's native body. The heap borrow ends before the callback
    /// starts. Whatever the callback leaves pending on `env` becomes the throw.
    fn invoke(&self, env: &Env, function: ObjectId, info: CallbackInfo) -> Result<Value, HostError> {
        let callback: NativeCallback = self
            .heap
            .borrow()
            .get(function)
            .and_then(|object| object.callback.clone())
            .ok_or_else(|| HostError::Rejected(format!("{} is not callable", function)))?;

        let result = callback(env, &info);
        let pending = env.get_and_clear_last_exception();
        match (result, pending) {
            (_, Some(exception)) => Err(HostError::Exception(exception)),
            (Ok(value), None) => Ok(value),
            (Err(err), None) => Err(HostError::Exception(
                err.to_exception()
                    .unwrap_or_else(|| Exception::new(err.to_string())),
            )),
        }
    }

    fn fail_collected(object: ObjectId) -> HostError {
        HostError::Collected(object.0)
    }
}

impl HostRuntime for Runtime {
    fn query_feature(&self, feature: Feature) -> Option<bool> {
        if !self.options.feature_queries {
            return None;
        }
        Some(match feature {
            Feature::WeakReferences => self.options.weak_references,
            Feature::BigInt => self.options.bigint,
        })
    }

    fn object_kind(&self, object: ObjectId) -> Option<ObjectKind> {
        self.heap.borrow().get(object).map(|object| object.kind)
    }

    fn create_object(&self) -> Result<ObjectId, HostError> {
        Ok(self.heap.borrow_mut().alloc(ObjectKind::Plain))
    }

    fn create_function(&self, name: &str, callback: NativeCallback) -> Result<ObjectId, HostError> {
        let mut heap = self.heap.borrow_mut();
        let function = heap.alloc_function(callback);
        if let Some(object) = heap.get_mut(function) {
            object
                .properties
                .insert("name".to_string(), Value::string(name));
        }
        Ok(function)
    }

    fn get_property(&self, object: ObjectId, name: &str) -> Result<Value, HostError> {
        let heap = self.heap.borrow();
        let mut current = Some(object);
        let mut depth = 0;

        while let Some(id) = current {
            let entry = heap.get(id).ok_or_else(|| Self::fail_collected(id))?;
            if let Some(value) = entry.properties.get(name) {
                return Ok(value.clone());
            }
            depth += 1;
            if depth > MAX_PROTO_DEPTH {
                return Err(HostError::Rejected("prototype chain too deep".to_string()));
            }
            current = entry.proto;
        }
        Ok(Value::Undefined)
    }

    fn set_property(&self, object: ObjectId, name: &str, value: Value) -> Result<(), HostError> {
        let mut heap = self.heap.borrow_mut();
        let entry = heap
            .get_mut(object)
            .ok_or_else(|| Self::fail_collected(object))?;
        entry.properties.insert(name.to_string(), value);
        Ok(())
    }

    fn construct(&self, env: &Env, constructor: ObjectId, args: &[Value]) -> Result<Value, HostError> {
        let prototype = {
            let heap = self.heap.borrow();
            let entry = heap
                .get(constructor)
                .ok_or_else(|| Self::fail_collected(constructor))?;
            if entry.kind != ObjectKind::Function {
                return Err(HostError::Rejected(format!("{} is not a constructor", constructor)));
            }
            entry.properties.get("prototype").and_then(Value::as_object)
        };

        let instance = {
            let mut heap = self.heap.borrow_mut();
            let instance = heap.alloc(ObjectKind::Plain);
            if let Some(entry) = heap.get_mut(instance) {
                entry.proto = prototype;
                // Rooted while the constructor runs; it may collect.
                entry.retain_count += 1;
            }
            instance
        };

        let info = CallbackInfo {
            this: Value::Object(instance),
            args: args.to_vec(),
            new_target: Some(constructor),
        };
        let result = self.invoke(env, constructor, info);
        self.release(instance)?;

        match result? {
            Value::Object(returned) => Ok(Value::Object(returned)),
            _ => Ok(Value::Object(instance)),
        }
    }

    fn call(&self, env: &Env, function: ObjectId, this: Value, args: &[Value]) -> Result<Value, HostError> {
        let info = CallbackInfo {
            this,
            args: args.to_vec(),
            new_target: None,
        };
        self.invoke(env, function, info)
    }

    fn retain(&self, object: ObjectId) -> Result<(), HostError> {
        let mut heap = self.heap.borrow_mut();
        let entry = heap
            .get_mut(object)
            .ok_or_else(|| Self::fail_collected(object))?;
        entry.retain_count += 1;
        Ok(())
    }

    fn release(&self, object: ObjectId) -> Result<(), HostError> {
        let mut heap = self.heap.borrow_mut();
        let entry = heap
            .get_mut(object)
            .ok_or_else(|| Self::fail_collected(object))?;
        if entry.retain_count == 0 {
            return Err(HostError::Rejected(format!("{} is not retained", object)));
        }
        entry.retain_count -= 1;
        Ok(())
    }

    fn create_weak(&self, object: ObjectId) -> Result<WeakId, HostError> {
        if !self.options.weak_references {
            return Err(HostError::Unsupported("WeakRef"));
        }
        let mut heap = self.heap.borrow_mut();
        if heap.get(object).is_none() {
            return Err(Self::fail_collected(object));
        }
        Ok(heap.create_weak(object))
    }

    fn upgrade_weak(&self, weak: WeakId) -> Option<ObjectId> {
        self.heap.borrow().upgrade_weak(weak)
    }

    fn drop_weak(&self, weak: WeakId) {
        self.heap.borrow_mut().drop_weak(weak);
    }

    fn register_finalizer(&self, target: ObjectId, token: FinalizeToken) -> Result<(), HostError> {
        if !self.options.weak_references {
            return Err(HostError::Unsupported("FinalizationRegistry"));
        }
        let mut heap = self.heap.borrow_mut();
        if heap.get(target).is_none() {
            return Err(Self::fail_collected(target));
        }
        heap.register(target, token);
        Ok(())
    }

    fn unregister_finalizer(&self, token: FinalizeToken) -> bool {
        self.heap.borrow_mut().unregister(token)
    }

    fn take_finalized(&self, env: EnvId) -> Vec<FinalizeToken> {
        self.heap.borrow_mut().take_finalized(env)
    }

    fn create_external_uint8array(&self, ptr: *mut u8, len: usize) -> Result<ObjectId, HostError> {
        if let Some(limit) = self.options.external_buffer_limit {
            if len > limit {
                return Err(HostError::Rejected(format!(
                    "external buffer of {} bytes exceeds the {} byte limit",
                    len, limit
                )));
            }
        }
        Ok(self.heap.borrow_mut().alloc_external(ptr, len))
    }

    fn buffer_info(&self, object: ObjectId) -> Option<(*mut u8, usize)> {
        self.heap.borrow().get(object).and_then(|object| object.external)
    }
}
