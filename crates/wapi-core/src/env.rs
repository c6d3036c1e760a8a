//! Per-context state
//!
//! An [`Env`] is the handle every bridge operation takes. It owns the
//! last-error slot, the pending-exception slot, and the bookkeeping for wraps,
//! finalizers and references created through it. It is single-threaded: state
//! lives in `Cell`/`RefCell` and the type is `!Send`.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::capability::Capabilities;
use crate::config::BridgeConfig;
use crate::counter::FinalizeCounter;
use crate::error::{BridgeResult, Exception, HostError};
use crate::finalizer::FinalizerRegistry;
use crate::host::{FinalizeToken, HostRuntime, RawPtr};
use crate::reference::{RefId, ReferenceStore};
use crate::status::Status;
use crate::type_tag::TypeTag;
use crate::value::{ObjectId, Value};
use crate::wrap::WrapRecord;

static NEXT_ENV_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique context identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId(u64);

impl EnvId {
    fn next() -> Self {
        EnvId(NEXT_ENV_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env{}", self.0)
    }
}

/// Most recent failure recorded on a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastError {
    pub status: Status,
    /// Engine-specific error code
    pub engine_error_code: u32,
    /// Opaque engine-specific detail
    pub engine_reserved: RawPtr,
}

impl Default for LastError {
    fn default() -> Self {
        Self {
            status: Status::Ok,
            engine_error_code: 0,
            engine_reserved: ptr::null_mut(),
        }
    }
}

impl LastError {
    pub fn is_clear(&self) -> bool {
        *self == LastError::default()
    }
}

/// Last error plus its message, as handed to native callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedErrorInfo {
    pub message: Option<&'static str>,
    pub engine_reserved: RawPtr,
    pub engine_error_code: u32,
    pub error_code: Status,
}

/// Builder for [`Env`]
pub struct EnvBuilder {
    host: Rc<dyn HostRuntime>,
    config: BridgeConfig,
    finalize_counter: FinalizeCounter,
}

impl EnvBuilder {
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a finalize counter with the harness
    pub fn finalize_counter(mut self, counter: FinalizeCounter) -> Self {
        self.finalize_counter = counter;
        self
    }

    pub fn build(self) -> Env {
        let capabilities = Capabilities::detect(self.host.as_ref(), &self.config.capabilities);
        let id = EnvId::next();
        log::debug!(
            "created context {} (weak references: {}, bigint: {})",
            id,
            capabilities.supports_weak_references(),
            capabilities.supports_bigint()
        );

        Env {
            id,
            host: self.host,
            capabilities,
            config: self.config,
            last_error: Cell::new(LastError::default()),
            pending_exception: RefCell::new(None),
            wraps: RefCell::new(FxHashMap::default()),
            finalizers: RefCell::new(FinalizerRegistry::default()),
            references: RefCell::new(ReferenceStore::default()),
            constructors: RefCell::new(FxHashMap::default()),
            type_tags: RefCell::new(FxHashMap::default()),
            finalize_counter: self.finalize_counter,
            next_token: Cell::new(0),
        }
    }
}

/// One execution context of a host runtime
pub struct Env {
    id: EnvId,
    host: Rc<dyn HostRuntime>,
    capabilities: Capabilities,
    config: BridgeConfig,
    last_error: Cell<LastError>,
    pub(crate) pending_exception: RefCell<Option<Exception>>,
    pub(crate) wraps: RefCell<FxHashMap<ObjectId, WrapRecord>>,
    pub(crate) finalizers: RefCell<FinalizerRegistry>,
    pub(crate) references: RefCell<ReferenceStore>,
    pub(crate) constructors: RefCell<FxHashMap<TypeId, RefId>>,
    pub(crate) type_tags: RefCell<FxHashMap<ObjectId, TypeTag>>,
    pub(crate) finalize_counter: FinalizeCounter,
    next_token: Cell<u64>,
}

impl Env {
    /// Context with default configuration and its own finalize counter
    pub fn new(host: Rc<dyn HostRuntime>) -> Self {
        Self::builder(host).build()
    }

    pub fn builder(host: Rc<dyn HostRuntime>) -> EnvBuilder {
        EnvBuilder {
            host,
            config: BridgeConfig::default(),
            finalize_counter: FinalizeCounter::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> EnvId {
        self.id
    }

    #[inline]
    pub fn host(&self) -> &Rc<dyn HostRuntime> {
        &self.host
    }

    #[inline]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[inline]
    pub fn finalize_counter(&self) -> &FinalizeCounter {
        &self.finalize_counter
    }

    #[inline]
    pub fn supports_weak_references(&self) -> bool {
        self.capabilities.supports_weak_references()
    }

    #[inline]
    pub fn supports_bigint(&self) -> bool {
        self.capabilities.supports_bigint()
    }

    // ========================================================================
    // Last error
    // ========================================================================

    /// Record a failure and hand `status` back unchanged
    pub fn set_last_error(&self, status: Status, engine_error_code: u32, engine_reserved: RawPtr) -> Status {
        self.last_error.set(LastError {
            status,
            engine_error_code,
            engine_reserved,
        });
        status
    }

    /// Reset the slot to `(ok, 0, null)`
    pub fn clear_last_error(&self) -> Status {
        self.last_error.set(LastError::default());
        Status::Ok
    }

    pub fn last_error(&self) -> LastError {
        self.last_error.get()
    }

    /// Snapshot with the table message attached. Reading an `ok` slot clears it.
    pub fn last_error_info(&self) -> ExtendedErrorInfo {
        let last = self.last_error.get();
        if last.status.is_ok() {
            self.clear_last_error();
        }
        ExtendedErrorInfo {
            message: last.status.message(),
            engine_reserved: last.engine_reserved,
            engine_error_code: last.engine_error_code,
            error_code: last.status,
        }
    }

    /// Route an operation's outcome through the last-error slot. Failures that
    /// raise an exception leave it pending unless one already is.
    pub(crate) fn track<T>(&self, result: BridgeResult<T>) -> BridgeResult<T> {
        match &result {
            Ok(_) => {
                self.clear_last_error();
            }
            Err(err) => {
                if let Some(exception) = err.to_exception() {
                    self.pending_exception.borrow_mut().get_or_insert(exception);
                }
                self.set_last_error(err.status(), 0, ptr::null_mut());
            }
        }
        result
    }

    /// Operations that may run managed code refuse to start while an
    /// exception is pending
    pub(crate) fn check_no_pending_exception(&self) -> BridgeResult<()> {
        if self.pending_exception.borrow().is_some() {
            return Err(Status::PendingException.into());
        }
        Ok(())
    }

    pub(crate) fn expect_object(&self, value: &Value) -> BridgeResult<ObjectId> {
        match value.as_object() {
            Some(id) if self.host.object_kind(id).is_some() => Ok(id),
            _ => Err(Status::ObjectExpected.into()),
        }
    }

    /// Collapse a host failure into `generic-failure`. A managed throw is left
    /// pending.
    pub(crate) fn host_failure(&self, api: &str, err: HostError) -> crate::error::BridgeError {
        match err {
            HostError::Exception(exception) => {
                log::debug!("{}: managed code threw: {}", api, exception);
                self.pending_exception.borrow_mut().get_or_insert(exception);
            }
            other => log::debug!("{}: host failure: {}", api, other),
        }
        Status::GenericFailure.into()
    }

    pub(crate) fn next_finalize_token(&self) -> FinalizeToken {
        let seq = self.next_token.get();
        self.next_token.set(seq + 1);
        FinalizeToken { env: self.id, seq }
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("last_error", &self.last_error.get())
            .field("wraps", &self.wraps.borrow().len())
            .field("references", &self.references.borrow().len())
            .finish()
    }
}

impl Drop for Env {
    fn drop(&mut self) {
        // Registered finalizers are dropped without running.
        let finalizers = std::mem::take(self.finalizers.get_mut());
        for token in finalizers.tokens() {
            self.host.unregister_finalizer(token);
        }
        self.host.take_finalized(self.id);
        let dropped = finalizers.len();

        for entry in self.references.get_mut().drain() {
            entry.release(self.host.as_ref());
        }
        self.wraps.get_mut().clear();
        self.type_tags.get_mut().clear();

        log::debug!(
            "destroyed context {} ({} finalizers never ran)",
            self.id,
            dropped
        );
    }
}
