//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::cell::Cell;
use std::ptr;
use std::rc::Rc;

use wapi_core::{
    BridgeConfig, BridgeResult, CallbackInfo, Env, EnvId, Feature, FinalizeCallback,
    FinalizeCounter, FinalizeToken, HostError, HostRuntime, NativeCallback, ObjectId, ObjectKind,
    PropertyDescriptor, RawPtr, RefId, Value, ValueType, WeakId,
};
use wapi_host::{HostOptions, Runtime};

/// Runtime with weak references and big integers
pub fn modern() -> (Rc<Runtime>, Env) {
    with_options(HostOptions::default(), BridgeConfig::default())
}

/// Runtime without weak references or big integers
pub fn legacy() -> (Rc<Runtime>, Env) {
    with_options(HostOptions::legacy(), BridgeConfig::default())
}

pub fn with_options(options: HostOptions, config: BridgeConfig) -> (Rc<Runtime>, Env) {
    let runtime = Rc::new(Runtime::new(options));
    let env = Env::builder(runtime.clone())
        .config(config)
        .finalize_counter(FinalizeCounter::new())
        .build();
    (runtime, env)
}

/// Leak a boxed value as an opaque native pointer
pub fn boxed<T>(value: T) -> RawPtr {
    Box::into_raw(Box::new(value)).cast()
}

/// Native state behind a `Counter` instance
#[derive(Debug)]
pub struct Counter {
    pub value: u32,
}

fn free_counter(_env: &Env, native: RawPtr, _hint: RawPtr) {
    // SAFETY: every Counter pointer comes from `boxed` and is freed exactly once.
    unsafe { drop(Box::from_raw(native.cast::<Counter>())) };
}

fn counter_new(env: &Env, info: &CallbackInfo) -> BridgeResult<Value> {
    let arg = info.arg(0);
    let value = match env.type_of(&arg)? {
        ValueType::Undefined => 0,
        _ => env.get_value_uint32(&arg)?,
    };

    let native = boxed(Counter { value });
    let finalizer: FinalizeCallback = Box::new(free_counter);
    if let Err(err) = env.wrap(&info.this, native, Some(finalizer), ptr::null_mut(), false) {
        free_counter(env, native, ptr::null_mut());
        return Err(err);
    }
    Ok(info.this.clone())
}

fn counter_plus_one(env: &Env, info: &CallbackInfo) -> BridgeResult<Value> {
    let native = env.unwrap(&info.this)?.cast::<Counter>();
    // SAFETY: the wrap keeps the Counter alive while the instance is wrapped.
    let counter = unsafe { &mut *native };
    counter.value += 1;
    env.create_double(counter.value as f64)
}

fn counter_dispose(env: &Env, info: &CallbackInfo) -> BridgeResult<Value> {
    env.dispose(&info.this)?;
    env.get_undefined()
}

/// Define the `Counter` class and store its constructor for `new_instance`
pub fn define_counter(env: &Env) -> BridgeResult<RefId> {
    let class = env.define_class(
        "Counter",
        Rc::new(counter_new) as NativeCallback,
        &[
            PropertyDescriptor::method("plusOne", Rc::new(counter_plus_one)),
            PropertyDescriptor::method("dispose", Rc::new(counter_dispose)),
        ],
    )?;
    let constructor = env.create_reference(&class, 1)?;
    env.set_instance_constructor::<Counter>(constructor);
    Ok(constructor)
}

pub fn new_counter(env: &Env, initial: Value) -> BridgeResult<Value> {
    let constructor = env
        .instance_constructor::<Counter>()
        .ok_or(wapi_core::Status::GenericFailure)?;
    env.new_instance(constructor, &[initial])
}

pub fn counter_value(env: &Env, instance: &Value) -> u32 {
    let native = env.unwrap(instance).unwrap().cast::<Counter>();
    unsafe { (*native).value }
}

/// Reference runtime whose weak-reference and retain primitives can be made
/// to fail on demand
#[derive(Default)]
pub struct FlakyHost {
    pub inner: Runtime,
    pub fail_weak: Cell<bool>,
    pub fail_retain: Cell<bool>,
}

impl FlakyHost {
    pub fn env(self: &Rc<Self>) -> Env {
        Env::new(self.clone())
    }
}

impl HostRuntime for FlakyHost {
    fn query_feature(&self, feature: Feature) -> Option<bool> {
        self.inner.query_feature(feature)
    }

    fn object_kind(&self, object: ObjectId) -> Option<ObjectKind> {
        self.inner.object_kind(object)
    }

    fn create_object(&self) -> Result<ObjectId, HostError> {
        self.inner.create_object()
    }

    fn create_function(&self, name: &str, callback: NativeCallback) -> Result<ObjectId, HostError> {
        self.inner.create_function(name, callback)
    }

    fn get_property(&self, object: ObjectId, name: &str) -> Result<Value, HostError> {
        self.inner.get_property(object, name)
    }

    fn set_property(&self, object: ObjectId, name: &str, value: Value) -> Result<(), HostError> {
        self.inner.set_property(object, name, value)
    }

    fn construct(&self, env: &Env, constructor: ObjectId, args: &[Value]) -> Result<Value, HostError> {
        self.inner.construct(env, constructor, args)
    }

    fn call(&self, env: &Env, function: ObjectId, this: Value, args: &[Value]) -> Result<Value, HostError> {
        self.inner.call(env, function, this, args)
    }

    fn retain(&self, object: ObjectId) -> Result<(), HostError> {
        if self.fail_retain.get() {
            return Err(HostError::Rejected("retain disabled".to_string()));
        }
        self.inner.retain(object)
    }

    fn release(&self, object: ObjectId) -> Result<(), HostError> {
        self.inner.release(object)
    }

    fn create_weak(&self, object: ObjectId) -> Result<WeakId, HostError> {
        if self.fail_weak.get() {
            return Err(HostError::Rejected("weak references disabled".to_string()));
        }
        self.inner.create_weak(object)
    }

    fn upgrade_weak(&self, weak: WeakId) -> Option<ObjectId> {
        self.inner.upgrade_weak(weak)
    }

    fn drop_weak(&self, weak: WeakId) {
        self.inner.drop_weak(weak)
    }

    fn register_finalizer(&self, target: ObjectId, token: FinalizeToken) -> Result<(), HostError> {
        self.inner.register_finalizer(target, token)
    }

    fn unregister_finalizer(&self, token: FinalizeToken) -> bool {
        self.inner.unregister_finalizer(token)
    }

    fn take_finalized(&self, env: EnvId) -> Vec<FinalizeToken> {
        self.inner.take_finalized(env)
    }

    fn create_external_uint8array(&self, ptr: *mut u8, len: usize) -> Result<ObjectId, HostError> {
        self.inner.create_external_uint8array(ptr, len)
    }

    fn buffer_info(&self, object: ObjectId) -> Option<(*mut u8, usize)> {
        self.inner.buffer_info(object)
    }
}
