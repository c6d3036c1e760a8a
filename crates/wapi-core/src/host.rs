//! HostRuntime trait: the managed runtime the bridge plugs into
//!
//! The bridge never implements a garbage collector. A host runtime (a JS engine
//! binding, or the reference heap in `wapi-host`) provides objects, weak
//! references and a finalization registry through this trait, and the bridge
//! layers the wrap/buffer/reference protocol on top.

use std::ffi::c_void;
use std::rc::Rc;

use crate::capability::Feature;
use crate::env::{Env, EnvId};
use crate::error::{BridgeResult, HostError};
use crate::value::{ObjectId, ObjectKind, Value};

/// Untyped native pointer passed through the bridge untouched
pub type RawPtr = *mut c_void;

/// Native function body callable from managed code
pub type NativeCallback = Rc<dyn Fn(&Env, &CallbackInfo) -> BridgeResult<Value>>;

/// Identity of a host weak reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeakId(pub u64);

/// Identifies one finalizer registration.
///
/// The host hands the token back (via `take_finalized`) once the registered
/// target has been collected; the context owning `env` then runs the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FinalizeToken {
    pub env: EnvId,
    pub seq: u64,
}

/// Arguments of a native callback invocation
#[derive(Debug, Clone)]
pub struct CallbackInfo {
    /// Receiver (`this`)
    pub this: Value,
    pub args: Vec<Value>,
    /// The constructor when invoked with `new`
    pub new_target: Option<ObjectId>,
}

impl CallbackInfo {
    /// Argument at `index`, `undefined` when missing
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

/// Payload of a class property
#[derive(Clone)]
pub enum PropertyValue {
    Method(NativeCallback),
    Value(Value),
}

/// One property installed by `Env::define_class`
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub value: PropertyValue,
    /// Installed on the constructor instead of the prototype
    pub is_static: bool,
}

impl PropertyDescriptor {
    pub fn method(name: impl Into<String>, callback: NativeCallback) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Method(callback),
            is_static: false,
        }
    }

    pub fn value(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Value(value),
            is_static: false,
        }
    }

    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// Operations a managed runtime provides to the bridge.
///
/// Methods taking `&Env` may run managed code, which may re-enter the bridge
/// on the same context. Implementations must not hold internal borrows across
/// those calls.
pub trait HostRuntime {
    // ========================================================================
    // Capabilities
    // ========================================================================

    /// Whether `feature` is available; `None` when the runtime cannot tell
    fn query_feature(&self, feature: Feature) -> Option<bool>;

    // ========================================================================
    // Objects
    // ========================================================================

    /// Kind of a live object, `None` if unknown or collected
    fn object_kind(&self, object: ObjectId) -> Option<ObjectKind>;

    fn create_object(&self) -> Result<ObjectId, HostError>;

    /// Create a function whose body is a native callback
    fn create_function(&self, name: &str, callback: NativeCallback) -> Result<ObjectId, HostError>;

    /// Property lookup, following the prototype chain
    fn get_property(&self, object: ObjectId, name: &str) -> Result<Value, HostError>;

    fn set_property(&self, object: ObjectId, name: &str, value: Value) -> Result<(), HostError>;

    // ========================================================================
    // Execution
    // ========================================================================

    /// `new constructor(...args)`
    fn construct(&self, env: &Env, constructor: ObjectId, args: &[Value]) -> Result<Value, HostError>;

    /// `function.call(this, ...args)`
    fn call(&self, env: &Env, function: ObjectId, this: Value, args: &[Value]) -> Result<Value, HostError>;

    // ========================================================================
    // Strong and weak handles
    // ========================================================================

    /// Add a strong root for `object`
    fn retain(&self, object: ObjectId) -> Result<(), HostError>;

    /// Drop one strong root added by `retain`
    fn release(&self, object: ObjectId) -> Result<(), HostError>;

    fn create_weak(&self, object: ObjectId) -> Result<WeakId, HostError>;

    /// Target of a weak reference, `None` once collected
    fn upgrade_weak(&self, weak: WeakId) -> Option<ObjectId>;

    fn drop_weak(&self, weak: WeakId);

    // ========================================================================
    // Finalization
    // ========================================================================

    /// Queue `token` for its context once `target` is collected
    fn register_finalizer(&self, target: ObjectId, token: FinalizeToken) -> Result<(), HostError>;

    /// Cancel a registration. Returns false if it was unknown or already fired.
    fn unregister_finalizer(&self, token: FinalizeToken) -> bool;

    /// Drain finalize events queued for `env`, in collection order
    fn take_finalized(&self, env: EnvId) -> Vec<FinalizeToken>;

    // ========================================================================
    // External memory
    // ========================================================================

    /// `Uint8Array` of exactly `len` bytes backed by `ptr`, without copying
    fn create_external_uint8array(&self, ptr: *mut u8, len: usize) -> Result<ObjectId, HostError>;

    /// Backing pointer and length of an external byte buffer
    fn buffer_info(&self, object: ObjectId) -> Option<(*mut u8, usize)>;
}
