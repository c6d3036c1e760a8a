//! Per-object type tags
//!
//! A tag is a 128-bit value native code attaches to an object once, and later
//! compares against before trusting `unwrap` to hand back its own type.

use crate::env::Env;
use crate::error::BridgeResult;
use crate::finalizer::PendingFinalizer;
use crate::status::Status;
use crate::value::Value;

/// `napi_type_tag`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeTag {
    pub lower: u64,
    pub upper: u64,
}

impl TypeTag {
    pub const fn new(lower: u64, upper: u64) -> Self {
        Self { lower, upper }
    }
}

impl Env {
    /// Attach `tag` to `object`. An object can be tagged only once.
    pub fn type_tag_object(&self, object: &Value, tag: &TypeTag) -> BridgeResult<()> {
        let result = (|| -> BridgeResult<()> {
            self.check_no_pending_exception()?;
            let target = self.expect_object(object)?;
            if self.type_tags.borrow().contains_key(&target) {
                return Err(Status::InvalidArg.into());
            }
            // The tag leaves with its object; without weak references it
            // stays for the lifetime of the context.
            if self.supports_weak_references() {
                self.register_finalizer("napi_type_tag_object", target, PendingFinalizer::TypeTag(target))?;
            }
            self.type_tags.borrow_mut().insert(target, *tag);
            Ok(())
        })();
        self.track(result)
    }

    /// Whether `object` carries exactly `tag`. Untagged objects never match.
    pub fn check_object_type_tag(&self, object: &Value, tag: &TypeTag) -> BridgeResult<bool> {
        let result = (|| -> BridgeResult<bool> {
            self.check_no_pending_exception()?;
            let target = self.expect_object(object)?;
            Ok(self.type_tags.borrow().get(&target) == Some(tag))
        })();
        self.track(result)
    }
}
