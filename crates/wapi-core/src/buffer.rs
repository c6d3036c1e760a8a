//! External byte buffers
//!
//! Native memory exposed to managed code as a `Uint8Array` without copying.
//! The caller keeps ownership of the bytes until its release callback runs,
//! which happens at most once, after the buffer became unreachable and the
//! finalize event was drained. A context torn down first never runs it.

use std::ffi::c_void;

use crate::env::Env;
use crate::error::{BridgeError, BridgeResult};
use crate::finalizer::{FinalizeCallback, PendingFinalizer};
use crate::status::Status;
use crate::value::{ObjectKind, Value};

impl Env {
    /// Expose `byte_length` bytes at `ptr` as a `Uint8Array`.
    ///
    /// `ptr` may only be null when `byte_length` is 0. If given, `release`
    /// is called as `release(env, ptr, hint)` once the buffer is collected.
    pub fn create_external_buffer(
        &self,
        ptr: *mut u8,
        byte_length: usize,
        release: Option<FinalizeCallback>,
        hint: *mut c_void,
    ) -> BridgeResult<Value> {
        let result = (|| -> BridgeResult<Value> {
            self.check_no_pending_exception()?;
            if ptr.is_null() && byte_length > 0 {
                return Err(Status::InvalidArg.into());
            }
            if release.is_some() && !self.supports_weak_references() {
                return Err(BridgeError::WeakRefUnsupported {
                    api: "wapi_create_external_uint8array",
                    detail: "Parameter \"finalize_cb\" must be 0(NULL)",
                });
            }

            let buffer = self
                .host()
                .create_external_uint8array(ptr, byte_length)
                .map_err(|err| self.host_failure("wapi_create_external_uint8array", err))?;

            if let Some(callback) = release {
                self.register_finalizer(
                    "wapi_create_external_uint8array",
                    buffer,
                    PendingFinalizer::Callback {
                        callback,
                        data: ptr.cast(),
                        hint,
                    },
                )?;
            }

            log::trace!("external buffer {} over {} bytes", buffer, byte_length);
            Ok(Value::Object(buffer))
        })();
        self.track(result)
    }

    /// Backing pointer and exact length of an external buffer
    pub fn get_buffer_info(&self, value: &Value) -> BridgeResult<(*mut u8, usize)> {
        let result = match value.as_object() {
            Some(id) if self.host().object_kind(id) == Some(ObjectKind::TypedArray) => self
                .host()
                .buffer_info(id)
                .ok_or_else(|| Status::ArraybufferExpected.into()),
            _ => Err(Status::ArraybufferExpected.into()),
        };
        self.track(result)
    }
}
