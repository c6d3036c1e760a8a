//! C ABI for the wapi bridge
//!
//! Exposes the bridge under the N-API entry point names so existing native
//! addons can link against it. The API follows these principles:
//! - ABI-stable (only C-compatible types cross the boundary)
//! - every entry point returns a `napi_status` and writes results through
//!   out-parameters
//! - opaque pointers for contexts, values and references
//!
//! Value handles created inside a handle scope, or inside a native callback,
//! die when it closes; handles created outside any scope live as long as the
//! context. A context is created from Rust with [`env_into_raw`] and destroyed
//! from C with [`wapi_env_destroy`].

use std::cell::RefCell;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::rc::Rc;

use once_cell::sync::{Lazy, OnceCell};
use wapi_core::{
    node_version, BridgeResult, CallbackInfo, Capabilities, Env, FinalizeCallback,
    NativeCallback, PropertyDescriptor, RefId, Status, TypeTag, Value, ValueType, NAPI_VERSION,
    STATUS_COUNT,
};

// ============================================================================
// Opaque Types
// ============================================================================

/// Opaque handle to a bridge context (`napi_env`)
#[repr(C)]
pub struct NapiEnv {
    _private: [u8; 0],
}

/// Opaque handle to a managed value (`napi_value`)
#[repr(C)]
pub struct NapiValue {
    _private: [u8; 0],
}

/// Opaque handle to a counted reference (`napi_ref`)
#[repr(C)]
pub struct NapiRef {
    _private: [u8; 0],
}

/// Opaque handle to a handle scope (`napi_handle_scope`)
#[repr(C)]
pub struct NapiHandleScope {
    _private: [u8; 0],
}

/// Opaque handle to an escapable handle scope (`napi_escapable_handle_scope`)
#[repr(C)]
pub struct NapiEscapableHandleScope {
    _private: [u8; 0],
}

/// Opaque handle to the arguments of a native callback (`napi_callback_info`)
#[repr(C)]
pub struct NapiCallbackInfo {
    _private: [u8; 0],
}

/// `void (*)(napi_env env, void* data, void* hint)`
pub type NapiFinalize = Option<unsafe extern "C" fn(*mut NapiEnv, *mut c_void, *mut c_void)>;

/// `napi_value (*)(napi_env env, napi_callback_info info)`
pub type NapiCallback =
    Option<unsafe extern "C" fn(*mut NapiEnv, *mut NapiCallbackInfo) -> *mut NapiValue>;

/// `napi_property_attributes`
pub type NapiPropertyAttributes = c_int;

pub const NAPI_DEFAULT: NapiPropertyAttributes = 0;
/// Install on the constructor instead of the prototype
pub const NAPI_STATIC: NapiPropertyAttributes = 1 << 10;

/// `NAPI_AUTO_LENGTH`: the string is NUL-terminated
pub const NAPI_AUTO_LENGTH: usize = usize::MAX;

/// `napi_property_descriptor`
///
/// Accessors (`getter`/`setter`) are not supported.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NapiPropertyDescriptor {
    pub utf8name: *const c_char,
    pub name: *mut NapiValue,
    pub method: NapiCallback,
    pub getter: NapiCallback,
    pub setter: NapiCallback,
    pub value: *mut NapiValue,
    pub attributes: NapiPropertyAttributes,
    pub data: *mut c_void,
}

/// `napi_extended_error_info`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NapiExtendedErrorInfo {
    pub error_message: *const c_char,
    pub engine_reserved: *mut c_void,
    pub engine_error_code: u32,
    pub error_code: Status,
}

impl Default for NapiExtendedErrorInfo {
    fn default() -> Self {
        Self {
            error_message: ptr::null(),
            engine_reserved: ptr::null_mut(),
            engine_error_code: 0,
            error_code: Status::Ok,
        }
    }
}

/// `napi_node_version`
#[repr(C)]
#[derive(Debug)]
pub struct NapiNodeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub release: *const c_char,
}

// Internal representation of a context (not exposed to C)
struct EnvHandle {
    env: Env,
    values: RefCell<Vec<Value>>,
    scopes: RefCell<Vec<ScopeFrame>>,
    error_info: RefCell<NapiExtendedErrorInfo>,
}

// One open handle scope: handles at or past `mark` die when it closes
#[derive(Debug, Clone, Copy)]
struct ScopeFrame {
    mark: usize,
    escape_slot: Option<usize>,
    escaped: bool,
}

// Table sizes to restore when an implicit scope ends
#[derive(Debug, Clone, Copy)]
struct ScopeMark {
    values: usize,
    scopes: usize,
}

// Arguments of one native callback invocation, on the caller's stack
struct CallbackFrame {
    info: *const CallbackInfo,
    data: *mut c_void,
}

impl EnvHandle {
    fn value(&self, raw: *mut NapiValue) -> Option<Value> {
        let index = (raw as usize).checked_sub(1)?;
        self.values.borrow().get(index).cloned()
    }

    fn push(&self, value: Value) -> *mut NapiValue {
        let mut values = self.values.borrow_mut();
        values.push(value);
        values.len() as *mut NapiValue
    }

    fn open_scope(&self, escapable: bool) -> usize {
        let mut values = self.values.borrow_mut();
        let escape_slot = escapable.then(|| {
            values.push(Value::Undefined);
            values.len() - 1
        });
        let mut scopes = self.scopes.borrow_mut();
        scopes.push(ScopeFrame {
            mark: values.len(),
            escape_slot,
            escaped: false,
        });
        scopes.len()
    }

    /// Close the innermost scope. `depth` must name it.
    fn close_scope(&self, depth: usize, escapable: bool) -> Status {
        let frame = {
            let mut scopes = self.scopes.borrow_mut();
            let innermost = scopes.len() == depth
                && scopes
                    .last()
                    .is_some_and(|frame| frame.escape_slot.is_some() == escapable);
            if innermost {
                scopes.pop()
            } else {
                None
            }
        };
        let Some(frame) = frame else {
            return self.env.set_last_error(Status::HandleScopeMismatch, 0, ptr::null_mut());
        };
        self.values.borrow_mut().truncate(frame.mark);
        self.env.clear_last_error()
    }

    /// Start an implicit scope around a call into native code
    fn enter(&self) -> ScopeMark {
        ScopeMark {
            values: self.values.borrow().len(),
            scopes: self.scopes.borrow().len(),
        }
    }

    fn leave(&self, mark: ScopeMark) {
        let mut scopes = self.scopes.borrow_mut();
        if scopes.len() > mark.scopes {
            log::warn!("{} handle scopes left open by a native callback", scopes.len() - mark.scopes);
            scopes.truncate(mark.scopes);
        }
        self.values.borrow_mut().truncate(mark.values);
    }

    fn invalid_arg(&self) -> Status {
        self.env.set_last_error(Status::InvalidArg, 0, ptr::null_mut())
    }
}

// ============================================================================
// Static tables
// ============================================================================

struct MessageTable {
    _owned: Vec<Option<CString>>,
    pointers: Vec<*const c_char>,
}

// The table is immutable after construction.
unsafe impl Send for MessageTable {}
unsafe impl Sync for MessageTable {}

static MESSAGES: Lazy<MessageTable> = Lazy::new(|| {
    let owned: Vec<Option<CString>> = Status::ALL
        .iter()
        .map(|status| status.message().and_then(|message| CString::new(message).ok()))
        .collect();
    let pointers = owned
        .iter()
        .map(|message| message.as_ref().map_or(ptr::null(), |message| message.as_ptr()))
        .collect();
    MessageTable {
        _owned: owned,
        pointers,
    }
});

struct NodeVersionRecord {
    _release: CString,
    version: NapiNodeVersion,
}

unsafe impl Send for NodeVersionRecord {}
unsafe impl Sync for NodeVersionRecord {}

static NODE_VERSION: Lazy<NodeVersionRecord> = Lazy::new(|| {
    let version = node_version();
    let release = CString::new(version.release).unwrap_or_default();
    NodeVersionRecord {
        version: NapiNodeVersion {
            major: version.major,
            minor: version.minor,
            patch: version.patch,
            release: release.as_ptr(),
        },
        _release: release,
    }
});

/// Answer of the first context handed to C. Native modules ask once at load,
/// so a process is expected to host one kind of runtime.
static CAPABILITIES: OnceCell<Capabilities> = OnceCell::new();

// ============================================================================
// Helper Functions
// ============================================================================

unsafe fn handle<'a>(env: *mut NapiEnv) -> Option<&'a EnvHandle> {
    (env as *const EnvHandle).as_ref()
}

fn ref_to_raw(reference: RefId) -> *mut NapiRef {
    reference.0 as usize as *mut NapiRef
}

fn ref_from_raw(raw: *mut NapiRef) -> Option<RefId> {
    (!raw.is_null()).then(|| RefId(raw as usize as u64))
}

/// Wrap a C finalizer so the core can run it with the raw context pointer
fn c_finalizer(
    env: *mut NapiEnv,
    callback: unsafe extern "C" fn(*mut NapiEnv, *mut c_void, *mut c_void),
) -> FinalizeCallback {
    Box::new(move |_env, data, hint| unsafe {
        let mark = handle(env).map(EnvHandle::enter);
        callback(env, data, hint);
        if let (Some(handle), Some(mark)) = (handle(env), mark) {
            handle.leave(mark);
        }
    })
}

/// Wrap a C callback as a native function body. Handles it creates die when
/// it returns; a NULL result is `undefined`.
fn c_callback(
    env: *mut NapiEnv,
    callback: unsafe extern "C" fn(*mut NapiEnv, *mut NapiCallbackInfo) -> *mut NapiValue,
    data: *mut c_void,
) -> NativeCallback {
    Rc::new(move |_env: &Env, info: &CallbackInfo| -> BridgeResult<Value> {
        let Some(handle) = (unsafe { handle(env) }) else {
            return Err(Status::InvalidArg.into());
        };
        let frame = CallbackFrame { info, data };
        let mark = handle.enter();
        let result = unsafe { callback(env, &frame as *const CallbackFrame as *mut NapiCallbackInfo) };
        let value = handle.value(result).unwrap_or_default();
        handle.leave(mark);
        Ok(value)
    })
}

/// UTF-8 name of `length` bytes, or up to the NUL with [`NAPI_AUTO_LENGTH`]
unsafe fn c_name<'a>(name: *const c_char, length: usize) -> Option<&'a str> {
    if name.is_null() {
        return None;
    }
    let bytes = if length == NAPI_AUTO_LENGTH {
        CStr::from_ptr(name).to_bytes()
    } else {
        std::slice::from_raw_parts(name.cast::<u8>(), length)
    };
    std::str::from_utf8(bytes).ok()
}

/// Turn an operation result into its status, writing the value on success.
/// The core has already recorded the outcome in the last-error slot.
fn complete<T>(result: BridgeResult<T>, write: impl FnOnce(T)) -> Status {
    match result {
        Ok(value) => {
            write(value);
            Status::Ok
        }
        Err(err) => err.status(),
    }
}

/// Hand a context over to C. Destroy it with [`wapi_env_destroy`].
pub fn env_into_raw(env: Env) -> *mut NapiEnv {
    log::debug!(
        "context {} exposed to C (weak references: {}, bigint: {})",
        env.id(),
        env.supports_weak_references(),
        env.supports_bigint()
    );
    let ours = env.capabilities();
    let capabilities = *CAPABILITIES.get_or_init(|| ours);
    if capabilities != ours {
        log::warn!(
            "context {} differs from the capabilities reported to native modules",
            env.id()
        );
    }
    let handle = Box::new(EnvHandle {
        env,
        values: RefCell::new(Vec::new()),
        scopes: RefCell::new(Vec::new()),
        error_info: RefCell::new(NapiExtendedErrorInfo::default()),
    });
    Box::into_raw(handle) as *mut NapiEnv
}

/// Borrow the context behind a raw handle
///
/// # Safety
/// `env` must be null or a live pointer from [`env_into_raw`].
pub unsafe fn env_from_raw<'a>(env: *mut NapiEnv) -> Option<&'a Env> {
    handle(env).map(|handle| &handle.env)
}

/// Register `value` with the context and return its handle
///
/// # Safety
/// `env` must be null or a live pointer from [`env_into_raw`].
pub unsafe fn value_to_raw(env: *mut NapiEnv, value: Value) -> *mut NapiValue {
    match handle(env) {
        Some(handle) => handle.push(value),
        None => ptr::null_mut(),
    }
}

/// Resolve a value handle. `None` for null or unknown handles.
///
/// # Safety
/// `env` must be null or a live pointer from [`env_into_raw`].
pub unsafe fn value_from_raw(env: *mut NapiEnv, raw: *mut NapiValue) -> Option<Value> {
    handle(env)?.value(raw)
}

// ============================================================================
// Context lifecycle
// ============================================================================

/// Destroy a context created by [`env_into_raw`]
///
/// Finalizers that have not run are dropped without being called.
///
/// # Safety
/// - `env` must be null or a live pointer from [`env_into_raw`]
/// - `env` and every handle obtained from it must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn wapi_env_destroy(env: *mut NapiEnv) {
    if env.is_null() {
        return;
    }

    let handle = Box::from_raw(env as *mut EnvHandle);
    drop(handle);
}

/// Run the finalizers whose targets the host has collected
///
/// # Arguments
/// * `env` - Context
/// * `result` - Optional; receives how many finalizers ran
///
/// # Safety
/// `env` must be null or a live context pointer.
#[no_mangle]
pub unsafe extern "C" fn wapi_run_pending_finalizers(env: *mut NapiEnv, result: *mut usize) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    let ran = handle.env.run_pending_finalizers();
    if !result.is_null() {
        *result = ran;
    }
    handle.env.clear_last_error()
}

// ============================================================================
// Last error
// ============================================================================

/// Record `error_code` in the context's last-error slot
///
/// # Returns
/// * `error_code` on success
/// * `napi_invalid_arg` if `error_code` is not a known status
///
/// # Safety
/// `env` must be null or a live context pointer.
#[no_mangle]
pub unsafe extern "C" fn napi_set_last_error(
    env: *mut NapiEnv,
    error_code: u32,
    engine_error_code: u32,
    engine_reserved: *mut c_void,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    match Status::from_raw(error_code) {
        Some(status) => handle.env.set_last_error(status, engine_error_code, engine_reserved),
        None => handle.invalid_arg(),
    }
}

/// Reset the last-error slot to `napi_ok`
///
/// # Safety
/// `env` must be null or a live context pointer.
#[no_mangle]
pub unsafe extern "C" fn napi_clear_last_error(env: *mut NapiEnv) -> Status {
    match handle(env) {
        Some(handle) => handle.env.clear_last_error(),
        None => Status::InvalidArg,
    }
}

/// Read the last-error slot
///
/// The returned record belongs to the context and is overwritten by the next
/// call.
///
/// # Safety
/// `env` must be null or a live context pointer; `result` must be null or
/// writable.
#[no_mangle]
pub unsafe extern "C" fn napi_get_last_error_info(
    env: *mut NapiEnv,
    result: *mut *const NapiExtendedErrorInfo,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }

    let info = handle.env.last_error_info();
    let error_message = MESSAGES
        .pointers
        .get(info.error_code.as_raw() as usize)
        .copied()
        .unwrap_or(ptr::null());
    *handle.error_info.borrow_mut() = NapiExtendedErrorInfo {
        error_message,
        engine_reserved: info.engine_reserved,
        engine_error_code: info.engine_error_code,
        error_code: info.error_code,
    };
    *result = handle.error_info.as_ptr();
    Status::Ok
}

/// Message table indexed by status; entry 0 (`napi_ok`) is NULL
///
/// # Safety
/// The table is static and must not be freed or written.
#[no_mangle]
pub unsafe extern "C" fn wapi_error_messages_get() -> *const *const c_char {
    debug_assert_eq!(MESSAGES.pointers.len(), STATUS_COUNT);
    MESSAGES.pointers.as_ptr()
}

// ============================================================================
// Capabilities
// ============================================================================

/// 1 if the host supports weak references, 0 otherwise (or before any
/// context exists)
///
/// The answer is fixed by the first context handed to C. A later context on a
/// runtime with different support is not reflected; check
/// [`Env::supports_weak_references`] per context when mixing runtimes.
#[no_mangle]
pub extern "C" fn wapi_is_support_weakref() -> c_int {
    CAPABILITIES
        .get()
        .map_or(0, |capabilities| capabilities.supports_weak_references() as c_int)
}

/// 1 if the host supports big integers, 0 otherwise (or before any context
/// exists)
#[no_mangle]
pub extern "C" fn wapi_is_support_bigint() -> c_int {
    CAPABILITIES
        .get()
        .map_or(0, |capabilities| capabilities.supports_bigint() as c_int)
}

// ============================================================================
// External buffers
// ============================================================================

/// Expose `byte_length` bytes at `external_data` as a `Uint8Array`
///
/// # Arguments
/// * `external_data` - May be NULL only when `byte_length` is 0
/// * `finalize_cb` - Optional; called once after the array is collected
/// * `finalize_hint` - Passed through to `finalize_cb`
/// * `result` - Receives the array
///
/// # Safety
/// `external_data` must stay valid until `finalize_cb` runs (or forever if
/// none is given).
#[no_mangle]
pub unsafe extern "C" fn wapi_create_external_uint8array(
    env: *mut NapiEnv,
    external_data: *mut c_void,
    byte_length: usize,
    finalize_cb: NapiFinalize,
    finalize_hint: *mut c_void,
    result: *mut *mut NapiValue,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }

    let release = finalize_cb.map(|callback| c_finalizer(env, callback));
    complete(
        handle
            .env
            .create_external_buffer(external_data.cast(), byte_length, release, finalize_hint),
        |value| *result = handle.push(value),
    )
}

// ============================================================================
// Object wrap
// ============================================================================

/// Attach `native_object` to `js_object`
///
/// # Arguments
/// * `finalize_cb` - Optional; runs once the object is collected
/// * `result` - Optional; receives a zero-count reference to `js_object`.
///   Left NULL when the host has no weak references.
///
/// # Safety
/// `env` must be null or a live context pointer; handles must come from it.
#[no_mangle]
pub unsafe extern "C" fn napi_wrap(
    env: *mut NapiEnv,
    js_object: *mut NapiValue,
    native_object: *mut c_void,
    finalize_cb: NapiFinalize,
    finalize_hint: *mut c_void,
    result: *mut *mut NapiRef,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    let Some(object) = handle.value(js_object) else {
        return handle.invalid_arg();
    };

    let finalizer = finalize_cb.map(|callback| c_finalizer(env, callback));
    complete(
        handle
            .env
            .wrap(&object, native_object, finalizer, finalize_hint, !result.is_null()),
        |reference| {
            if !result.is_null() {
                *result = reference.map_or(ptr::null_mut(), ref_to_raw);
            }
        },
    )
}

/// Read the native pointer attached to `js_object`
///
/// # Safety
/// `env` must be null or a live context pointer; handles must come from it.
#[no_mangle]
pub unsafe extern "C" fn napi_unwrap(
    env: *mut NapiEnv,
    js_object: *mut NapiValue,
    result: *mut *mut c_void,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }
    let Some(object) = handle.value(js_object) else {
        return handle.invalid_arg();
    };

    complete(handle.env.unwrap(&object), |native| *result = native)
}

/// Detach the native pointer without running its finalizer
///
/// # Safety
/// `env` must be null or a live context pointer; `result` may be NULL.
#[no_mangle]
pub unsafe extern "C" fn napi_remove_wrap(
    env: *mut NapiEnv,
    js_object: *mut NapiValue,
    result: *mut *mut c_void,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    let Some(object) = handle.value(js_object) else {
        return handle.invalid_arg();
    };

    complete(handle.env.remove_wrap(&object), |native| {
        if !result.is_null() {
            *result = native;
        }
    })
}

/// Run `finalize_cb(env, finalize_data, finalize_hint)` once `js_object` is
/// collected. Requires weak references.
///
/// # Safety
/// `env` must be null or a live context pointer; `result` may be NULL.
#[no_mangle]
pub unsafe extern "C" fn napi_add_finalizer(
    env: *mut NapiEnv,
    js_object: *mut NapiValue,
    finalize_data: *mut c_void,
    finalize_cb: NapiFinalize,
    finalize_hint: *mut c_void,
    result: *mut *mut NapiRef,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    let (Some(object), Some(callback)) = (handle.value(js_object), finalize_cb) else {
        return handle.invalid_arg();
    };

    complete(
        handle.env.add_finalizer(
            &object,
            finalize_data,
            c_finalizer(env, callback),
            finalize_hint,
            !result.is_null(),
        ),
        |reference| {
            if !result.is_null() {
                *result = reference.map_or(ptr::null_mut(), ref_to_raw);
            }
        },
    )
}

// ============================================================================
// References
// ============================================================================

/// # Safety
/// `env` must be null or a live context pointer; handles must come from it.
#[no_mangle]
pub unsafe extern "C" fn napi_create_reference(
    env: *mut NapiEnv,
    value: *mut NapiValue,
    initial_refcount: u32,
    result: *mut *mut NapiRef,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }
    let Some(value) = handle.value(value) else {
        return handle.invalid_arg();
    };

    complete(handle.env.create_reference(&value, initial_refcount), |reference| {
        *result = ref_to_raw(reference)
    })
}

/// # Safety
/// `env` must be null or a live context pointer; `reference` must not be used
/// after this call.
#[no_mangle]
pub unsafe extern "C" fn napi_delete_reference(env: *mut NapiEnv, reference: *mut NapiRef) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    let Some(reference) = ref_from_raw(reference) else {
        return handle.invalid_arg();
    };

    complete(handle.env.delete_reference(reference), |()| {})
}

/// # Safety
/// `env` must be null or a live context pointer; `result` may be NULL.
#[no_mangle]
pub unsafe extern "C" fn napi_reference_ref(
    env: *mut NapiEnv,
    reference: *mut NapiRef,
    result: *mut u32,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    let Some(reference) = ref_from_raw(reference) else {
        return handle.invalid_arg();
    };

    complete(handle.env.reference_ref(reference), |count| {
        if !result.is_null() {
            *result = count;
        }
    })
}

/// # Safety
/// `env` must be null or a live context pointer; `result` may be NULL.
#[no_mangle]
pub unsafe extern "C" fn napi_reference_unref(
    env: *mut NapiEnv,
    reference: *mut NapiRef,
    result: *mut u32,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    let Some(reference) = ref_from_raw(reference) else {
        return handle.invalid_arg();
    };

    complete(handle.env.reference_unref(reference), |count| {
        if !result.is_null() {
            *result = count;
        }
    })
}

/// Resolve a reference. `*result` is NULL if the target was collected.
///
/// # Safety
/// `env` must be null or a live context pointer; `result` must be writable.
#[no_mangle]
pub unsafe extern "C" fn napi_get_reference_value(
    env: *mut NapiEnv,
    reference: *mut NapiRef,
    result: *mut *mut NapiValue,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }
    let Some(reference) = ref_from_raw(reference) else {
        return handle.invalid_arg();
    };

    complete(handle.env.get_reference_value(reference), |value| {
        *result = value.map_or(ptr::null_mut(), |value| handle.push(value))
    })
}

// ============================================================================
// Instances
// ============================================================================

/// `new constructor(...argv)`
///
/// # Safety
/// `argv` must point to `argc` handles (it may be NULL when `argc` is 0).
#[no_mangle]
pub unsafe extern "C" fn napi_new_instance(
    env: *mut NapiEnv,
    constructor: *mut NapiValue,
    argc: usize,
    argv: *const *mut NapiValue,
    result: *mut *mut NapiValue,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() || (argc > 0 && argv.is_null()) {
        return handle.invalid_arg();
    }
    let Some(constructor) = handle.value(constructor) else {
        return handle.invalid_arg();
    };

    let mut args = Vec::with_capacity(argc);
    for index in 0..argc {
        match handle.value(*argv.add(index)) {
            Some(arg) => args.push(arg),
            None => return handle.invalid_arg(),
        }
    }

    complete(handle.env.construct(&constructor, &args), |instance| {
        *result = handle.push(instance)
    })
}

// ============================================================================
// Handle scopes
// ============================================================================

/// Open a scope; handles created until it closes die with it
///
/// # Safety
/// `env` must be null or a live context pointer; `result` must be writable.
#[no_mangle]
pub unsafe extern "C" fn napi_open_handle_scope(
    env: *mut NapiEnv,
    result: *mut *mut NapiHandleScope,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }

    *result = handle.open_scope(false) as *mut NapiHandleScope;
    handle.env.clear_last_error()
}

/// Close the innermost scope
///
/// # Returns
/// * `napi_handle_scope_mismatch` if `scope` is not the innermost open scope
///
/// # Safety
/// `env` must be null or a live context pointer.
#[no_mangle]
pub unsafe extern "C" fn napi_close_handle_scope(
    env: *mut NapiEnv,
    scope: *mut NapiHandleScope,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if scope.is_null() {
        return handle.invalid_arg();
    }
    handle.close_scope(scope as usize, false)
}

/// Open a scope that can hand one handle to its parent
///
/// # Safety
/// `env` must be null or a live context pointer; `result` must be writable.
#[no_mangle]
pub unsafe extern "C" fn napi_open_escapable_handle_scope(
    env: *mut NapiEnv,
    result: *mut *mut NapiEscapableHandleScope,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }

    *result = handle.open_scope(true) as *mut NapiEscapableHandleScope;
    handle.env.clear_last_error()
}

/// # Safety
/// `env` must be null or a live context pointer.
#[no_mangle]
pub unsafe extern "C" fn napi_close_escapable_handle_scope(
    env: *mut NapiEnv,
    scope: *mut NapiEscapableHandleScope,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if scope.is_null() {
        return handle.invalid_arg();
    }
    handle.close_scope(scope as usize, true)
}

/// Move `escapee` into the parent of `scope`. Allowed once per scope.
///
/// # Safety
/// `env` must be null or a live context pointer; `result` must be writable.
#[no_mangle]
pub unsafe extern "C" fn napi_escape_handle(
    env: *mut NapiEnv,
    scope: *mut NapiEscapableHandleScope,
    escapee: *mut NapiValue,
    result: *mut *mut NapiValue,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }
    let Some(value) = handle.value(escapee) else {
        return handle.invalid_arg();
    };

    let slot = {
        let mut scopes = handle.scopes.borrow_mut();
        let Some(frame) = (scope as usize)
            .checked_sub(1)
            .and_then(|index| scopes.get_mut(index))
        else {
            return handle.invalid_arg();
        };
        let Some(slot) = frame.escape_slot else {
            return handle.invalid_arg();
        };
        if frame.escaped {
            return handle
                .env
                .set_last_error(Status::EscapeCalledTwice, 0, ptr::null_mut());
        }
        frame.escaped = true;
        slot
    };

    match handle.values.borrow_mut().get_mut(slot) {
        Some(target) => *target = value,
        None => return handle.invalid_arg(),
    }
    *result = (slot + 1) as *mut NapiValue;
    handle.env.clear_last_error()
}

// ============================================================================
// Classes and callbacks
// ============================================================================

/// Define a class whose constructor and methods are C callbacks
///
/// # Arguments
/// * `utf8name` - Class name, `length` bytes or NUL-terminated with
///   `NAPI_AUTO_LENGTH`
/// * `constructor` - Called with `this` bound to the new instance
/// * `data` - Passed to the constructor through `napi_get_cb_info`
/// * `properties` - `property_count` descriptors; `napi_static` ones go on the
///   constructor
///
/// # Safety
/// Pointers must be valid for the lengths given.
#[no_mangle]
pub unsafe extern "C" fn napi_define_class(
    env: *mut NapiEnv,
    utf8name: *const c_char,
    length: usize,
    constructor: NapiCallback,
    data: *mut c_void,
    property_count: usize,
    properties: *const NapiPropertyDescriptor,
    result: *mut *mut NapiValue,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() || (property_count > 0 && properties.is_null()) {
        return handle.invalid_arg();
    }
    let (Some(name), Some(constructor)) = (c_name(utf8name, length), constructor) else {
        return handle.invalid_arg();
    };

    let mut descriptors = Vec::with_capacity(property_count);
    for index in 0..property_count {
        let property = &*properties.add(index);
        let name = match c_name(property.utf8name, NAPI_AUTO_LENGTH) {
            Some(name) => name.to_string(),
            None => match handle.value(property.name) {
                Some(Value::String(name)) => name.to_string(),
                _ => return handle.env.set_last_error(Status::NameExpected, 0, ptr::null_mut()),
            },
        };
        if property.getter.is_some() || property.setter.is_some() {
            log::debug!("napi_define_class: accessor {} is not supported", name);
            return handle.invalid_arg();
        }

        let descriptor = match property.method {
            Some(method) => PropertyDescriptor::method(name, c_callback(env, method, property.data)),
            None => PropertyDescriptor::value(name, handle.value(property.value).unwrap_or_default()),
        };
        descriptors.push(if property.attributes & NAPI_STATIC != 0 {
            descriptor.into_static()
        } else {
            descriptor
        });
    }

    complete(
        handle
            .env
            .define_class(name, c_callback(env, constructor, data), &descriptors),
        |class| *result = handle.push(class),
    )
}

/// Read the arguments of the running callback
///
/// # Arguments
/// * `argc` - In: capacity of `argv`. Out: actual argument count
/// * `argv` - Filled up to capacity; missing arguments are `undefined`
/// * `this_arg`, `data` - Optional
///
/// # Safety
/// `cbinfo` must be the value passed to the running callback; `argv` must
/// hold `*argc` handles.
#[no_mangle]
pub unsafe extern "C" fn napi_get_cb_info(
    env: *mut NapiEnv,
    cbinfo: *mut NapiCallbackInfo,
    argc: *mut usize,
    argv: *mut *mut NapiValue,
    this_arg: *mut *mut NapiValue,
    data: *mut *mut c_void,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    let Some(frame) = (cbinfo as *const CallbackFrame).as_ref() else {
        return handle.invalid_arg();
    };
    let info = &*frame.info;

    if !argc.is_null() {
        if *argc > 0 && argv.is_null() {
            return handle.invalid_arg();
        }
        for index in 0..*argc {
            *argv.add(index) = handle.push(info.arg(index));
        }
        *argc = info.args.len();
    }
    if !this_arg.is_null() {
        *this_arg = handle.push(info.this.clone());
    }
    if !data.is_null() {
        *data = frame.data;
    }
    handle.env.clear_last_error()
}

// ============================================================================
// Values
// ============================================================================

/// # Safety
/// `env` must be null or a live context pointer; `result` must be writable.
#[no_mangle]
pub unsafe extern "C" fn napi_typeof(
    env: *mut NapiEnv,
    value: *mut NapiValue,
    result: *mut ValueType,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }
    let Some(value) = handle.value(value) else {
        return handle.invalid_arg();
    };

    complete(handle.env.type_of(&value), |value_type| *result = value_type)
}

/// # Safety
/// `env` must be null or a live context pointer; `result` must be writable.
#[no_mangle]
pub unsafe extern "C" fn napi_get_value_uint32(
    env: *mut NapiEnv,
    value: *mut NapiValue,
    result: *mut u32,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }
    let Some(value) = handle.value(value) else {
        return handle.invalid_arg();
    };

    complete(handle.env.get_value_uint32(&value), |number| *result = number)
}

/// # Safety
/// `env` must be null or a live context pointer; `result` must be writable.
#[no_mangle]
pub unsafe extern "C" fn napi_create_int32(
    env: *mut NapiEnv,
    value: i32,
    result: *mut *mut NapiValue,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }

    complete(handle.env.create_int32(value), |value| *result = handle.push(value))
}

/// # Safety
/// `env` must be null or a live context pointer; `result` must be writable.
#[no_mangle]
pub unsafe extern "C" fn napi_create_uint32(
    env: *mut NapiEnv,
    value: u32,
    result: *mut *mut NapiValue,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }

    complete(handle.env.create_uint32(value), |value| *result = handle.push(value))
}

/// # Safety
/// `env` must be null or a live context pointer; `result` must be writable.
#[no_mangle]
pub unsafe extern "C" fn napi_get_undefined(env: *mut NapiEnv, result: *mut *mut NapiValue) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }

    complete(handle.env.get_undefined(), |value| *result = handle.push(value))
}

// ============================================================================
// Exceptions
// ============================================================================

/// Throw an `Error` with `msg` and an optional `code`
///
/// # Safety
/// `code` must be null or NUL-terminated; `msg` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn napi_throw_error(
    env: *mut NapiEnv,
    code: *const c_char,
    msg: *const c_char,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    let Some(message) = c_name(msg, NAPI_AUTO_LENGTH) else {
        return handle.invalid_arg();
    };
    let code = c_name(code, NAPI_AUTO_LENGTH);

    complete(handle.env.throw_error(code, message), |()| {})
}

/// # Safety
/// `env` must be null or a live context pointer; `result` must be writable.
#[no_mangle]
pub unsafe extern "C" fn napi_is_exception_pending(env: *mut NapiEnv, result: *mut bool) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }

    *result = handle.env.is_exception_pending();
    Status::Ok
}

// ============================================================================
// Type tags
// ============================================================================

/// Tag `object` with the 128-bit value at `type_tag`. Once per object.
///
/// # Safety
/// `type_tag` must point to a `napi_type_tag`.
#[no_mangle]
pub unsafe extern "C" fn napi_type_tag_object(
    env: *mut NapiEnv,
    object: *mut NapiValue,
    type_tag: *const TypeTag,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    let (Some(object), Some(tag)) = (handle.value(object), type_tag.as_ref()) else {
        return handle.invalid_arg();
    };

    complete(handle.env.type_tag_object(&object, tag), |()| {})
}

/// Whether `object` carries the tag at `type_tag`
///
/// # Safety
/// `type_tag` must point to a `napi_type_tag`; `result` must be writable.
#[no_mangle]
pub unsafe extern "C" fn napi_check_object_type_tag(
    env: *mut NapiEnv,
    object: *mut NapiValue,
    type_tag: *const TypeTag,
    result: *mut bool,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }
    let (Some(object), Some(tag)) = (handle.value(object), type_tag.as_ref()) else {
        return handle.invalid_arg();
    };

    complete(handle.env.check_object_type_tag(&object, tag), |matches| *result = matches)
}

// ============================================================================
// Version Information
// ============================================================================

/// # Safety
/// `env` must be null or a live context pointer. The record is static and
/// must not be freed.
#[no_mangle]
pub unsafe extern "C" fn napi_get_node_version(
    env: *mut NapiEnv,
    result: *mut *const NapiNodeVersion,
) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }

    *result = &NODE_VERSION.version;
    handle.env.clear_last_error()
}

/// # Safety
/// `env` must be null or a live context pointer.
#[no_mangle]
pub unsafe extern "C" fn napi_get_version(env: *mut NapiEnv, result: *mut u32) -> Status {
    let Some(handle) = handle(env) else {
        return Status::InvalidArg;
    };
    if result.is_null() {
        return handle.invalid_arg();
    }

    *result = NAPI_VERSION;
    handle.env.clear_last_error()
}

// ============================================================================
// Tests
// ============================================================================
