//! Native object wrapping
//!
//! A managed instance moves `Unwrapped -> Wrapped -> {Finalized | Disposed}`.
//! While wrapped, the native pointer can be read back (`unwrap`), detached
//! without cleanup (`remove_wrap`), detached with cleanup (`dispose`), or
//! reclaimed by the host's collector through the registered finalizer.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use crate::config::DegradedWrapPolicy;
use crate::env::Env;
use crate::error::{BridgeError, BridgeResult, HostError};
use crate::finalizer::{FinalizeCallback, PendingFinalizer};
use crate::host::{FinalizeToken, NativeCallback, PropertyDescriptor, PropertyValue, RawPtr};
use crate::reference::RefId;
use crate::status::Status;
use crate::value::{ObjectId, ObjectKind, Value};

/// Who is responsible for running a wrap's finalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipMode {
    /// Tracked by the host; the record (and its finalizer, if any) goes when
    /// the instance is collected
    RuntimeFinalized,
    /// Host has no weak references; native code must `remove_wrap` or `dispose`
    CallerManaged,
}

/// Native pointer attached to one managed instance
pub struct WrapRecord {
    pub(crate) native: NonNull<c_void>,
    pub(crate) mode: OwnershipMode,
    pub(crate) finalizer: Option<FinalizeCallback>,
    pub(crate) hint: RawPtr,
    pub(crate) token: Option<FinalizeToken>,
}

impl fmt::Debug for WrapRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapRecord")
            .field("native", &self.native)
            .field("mode", &self.mode)
            .field("has_finalizer", &self.finalizer.is_some())
            .field("token", &self.token)
            .finish()
    }
}

impl Env {
    /// Attach `native` to `instance`.
    ///
    /// With weak-reference support the instance is tracked to collection and,
    /// if `want_reference`, a zero-count reference to it is returned.
    /// Without it the registration is skipped and the wrap is caller-managed:
    /// the finalizer only ever runs through [`Env::dispose`].
    pub fn wrap(
        &self,
        instance: &Value,
        native: RawPtr,
        finalizer: Option<FinalizeCallback>,
        hint: RawPtr,
        want_reference: bool,
    ) -> BridgeResult<Option<RefId>> {
        let result = self.wrap_inner(instance, native, finalizer, hint, want_reference);
        self.track(result)
    }

    fn wrap_inner(
        &self,
        instance: &Value,
        native: RawPtr,
        finalizer: Option<FinalizeCallback>,
        hint: RawPtr,
        want_reference: bool,
    ) -> BridgeResult<Option<RefId>> {
        self.check_no_pending_exception()?;
        let object = self.expect_object(instance)?;
        let native = NonNull::new(native).ok_or(Status::InvalidArg)?;
        if self.wraps.borrow().contains_key(&object) {
            return Err(Status::InvalidArg.into());
        }

        let weak_references = self.supports_weak_references();
        if !weak_references && finalizer.is_some() {
            if self.config().wrap.degraded_policy == DegradedWrapPolicy::Reject {
                return Err(BridgeError::WeakRefUnsupported {
                    api: "napi_wrap",
                    detail: "Parameter \"finalize_cb\" must be 0(NULL)",
                });
            }
            log::warn!(
                "napi_wrap: no weak references, finalizer for {} will only run on dispose",
                object
            );
        }

        // Every wrap on a weak-reference host is tracked to collection, so
        // the record leaves `wraps` with its instance.
        let token = if weak_references {
            Some(self.register_finalizer("napi_wrap", object, PendingFinalizer::Wrap(object))?)
        } else {
            None
        };
        let mode = if token.is_some() {
            OwnershipMode::RuntimeFinalized
        } else {
            OwnershipMode::CallerManaged
        };

        self.wraps.borrow_mut().insert(
            object,
            WrapRecord {
                native,
                mode,
                finalizer,
                hint,
                token,
            },
        );

        if want_reference && weak_references {
            // create_reference tracks on its own; its status is ours.
            return match self.create_reference(instance, 0) {
                Ok(reference) => Ok(Some(reference)),
                Err(err) => {
                    // The caller keeps ownership of `native` on failure.
                    if let Err(detach_err) = self.detach(instance) {
                        log::debug!("napi_wrap: rollback of {} failed: {}", object, detach_err);
                    }
                    Err(err)
                }
            };
        }
        Ok(None)
    }

    /// Read the native pointer without changing anything
    pub fn unwrap(&self, instance: &Value) -> BridgeResult<RawPtr> {
        let result = self.expect_object(instance).and_then(|object| {
            self.wraps
                .borrow()
                .get(&object)
                .map(|record| record.native.as_ptr())
                .ok_or_else(|| Status::InvalidArg.into())
        });
        self.track(result)
    }

    /// Detach the native pointer without running its finalizer
    pub fn remove_wrap(&self, instance: &Value) -> BridgeResult<RawPtr> {
        let result = self
            .detach(instance)
            .map(|record| record.native.as_ptr());
        self.track(result)
    }

    /// Detach and run the stored finalizer now. Terminal for the instance.
    pub fn dispose(&self, instance: &Value) -> BridgeResult<()> {
        let result = self.detach(instance);
        let result = self.track(result);
        let record = result?;

        if let Some(finalizer) = record.finalizer {
            self.finalize_counter.increment();
            finalizer(self, record.native.as_ptr(), record.hint);
        }
        Ok(())
    }

    /// Whether `instance` currently has a native pointer attached
    pub fn is_wrapped(&self, instance: &Value) -> bool {
        instance
            .as_object()
            .is_some_and(|object| self.wraps.borrow().contains_key(&object))
    }

    /// Ownership mode of a wrapped instance
    pub fn ownership_mode(&self, instance: &Value) -> Option<OwnershipMode> {
        let object = instance.as_object()?;
        self.wraps.borrow().get(&object).map(|record| record.mode)
    }

    fn detach(&self, instance: &Value) -> BridgeResult<WrapRecord> {
        let object = self.expect_object(instance)?;
        let record = self
            .wraps
            .borrow_mut()
            .remove(&object)
            .ok_or(Status::InvalidArg)?;

        if let (OwnershipMode::RuntimeFinalized, Some(token)) = (record.mode, record.token) {
            self.unregister_finalizer(token);
        }
        Ok(record)
    }

    /// Finalize event for a wrapped object. Drops the record and reports
    /// whether a finalizer ran.
    pub(crate) fn finalize_wrap(&self, object: ObjectId, token: FinalizeToken) -> bool {
        let record = {
            let mut wraps = self.wraps.borrow_mut();
            let current = wraps
                .get(&object)
                .is_some_and(|record| record.token == Some(token));
            if current {
                wraps.remove(&object)
            } else {
                None
            }
        };
        let Some(record) = record else {
            return false;
        };
        let Some(finalizer) = record.finalizer else {
            log::trace!("{} collected without a finalizer", object);
            return false;
        };

        self.finalize_counter.increment();
        finalizer(self, record.native.as_ptr(), record.hint);
        true
    }

    /// Run `finalizer(env, data, hint)` once `object` is collected, without
    /// wrapping it
    pub fn add_finalizer(
        &self,
        object: &Value,
        data: RawPtr,
        finalizer: FinalizeCallback,
        hint: RawPtr,
        want_reference: bool,
    ) -> BridgeResult<Option<RefId>> {
        let result = (|| -> BridgeResult<()> {
            if !self.supports_weak_references() {
                return Err(BridgeError::WeakRefUnsupported {
                    api: "napi_add_finalizer",
                    detail: "This API is unavailable",
                });
            }
            let target = self.expect_object(object)?;
            self.register_finalizer(
                "napi_add_finalizer",
                target,
                PendingFinalizer::Callback {
                    callback: finalizer,
                    data,
                    hint,
                },
            )?;
            Ok(())
        })();
        self.track(result)?;

        if want_reference {
            return self.create_reference(object, 0).map(Some);
        }
        Ok(None)
    }

    // ========================================================================
    // Classes and instances
    // ========================================================================

    /// `new constructor(...args)`. A throw inside the constructor fails with
    /// `generic-failure` and leaves the exception pending.
    pub fn construct(&self, constructor: &Value, args: &[Value]) -> BridgeResult<Value> {
        let result = (|| -> BridgeResult<Value> {
            self.check_no_pending_exception()?;
            let constructor = self.expect_function(constructor)?;
            // No borrow of context state is held here; the constructor may
            // re-enter.
            self.host()
                .construct(self, constructor, args)
                .map_err(|err| self.host_failure("napi_new_instance", err))
        })();
        self.track(result)
    }

    /// Instantiate through a stored constructor reference
    pub fn new_instance(&self, constructor: RefId, args: &[Value]) -> BridgeResult<Value> {
        let constructor = self
            .get_reference_value(constructor)?
            .ok_or(Status::FunctionExpected);
        let constructor = self.track(constructor.map_err(BridgeError::from))?;
        self.construct(&constructor, args)
    }

    /// Create a class: a constructor function plus prototype methods and
    /// static members
    pub fn define_class(
        &self,
        name: &str,
        constructor: NativeCallback,
        properties: &[PropertyDescriptor],
    ) -> BridgeResult<Value> {
        let result = (|| -> BridgeResult<Value> {
            self.check_no_pending_exception()?;
            if name.is_empty() {
                return Err(Status::InvalidArg.into());
            }
            let host = self.host();
            let fail = |err: HostError| self.host_failure("napi_define_class", err);

            let function = host.create_function(name, constructor).map_err(fail)?;
            let prototype = host.create_object().map_err(fail)?;
            host.set_property(function, "prototype", Value::Object(prototype))
                .map_err(fail)?;
            host.set_property(prototype, "constructor", Value::Object(function))
                .map_err(fail)?;

            for property in properties {
                if property.name.is_empty() {
                    return Err(Status::NameExpected.into());
                }
                let target = if property.is_static { function } else { prototype };
                let value = match &property.value {
                    PropertyValue::Method(callback) => {
                        let method = host
                            .create_function(&property.name, callback.clone())
                            .map_err(fail)?;
                        Value::Object(method)
                    }
                    PropertyValue::Value(value) => value.clone(),
                };
                host.set_property(target, &property.name, value).map_err(fail)?;
            }

            log::trace!("defined class {} as {}", name, function);
            Ok(Value::Object(function))
        })();
        self.track(result)
    }

    pub(crate) fn expect_function(&self, value: &Value) -> BridgeResult<ObjectId> {
        match value.as_object() {
            Some(id) if self.host().object_kind(id) == Some(ObjectKind::Function) => Ok(id),
            _ => Err(Status::FunctionExpected.into()),
        }
    }
}
