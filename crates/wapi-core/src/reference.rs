//! Counted references to managed objects
//!
//! A reference with a positive count keeps its target alive through a host
//! root. At count zero it only observes the target through a weak reference.
//! Hosts without weak references cannot observe without retaining, so there a
//! zero-count reference stays strong: a leak instead of a dangling handle.

use std::any::TypeId;

use rustc_hash::FxHashMap;

use crate::env::Env;
use crate::error::BridgeResult;
use crate::host::{HostRuntime, WeakId};
use crate::status::Status;
use crate::value::{ObjectId, Value};

/// Handle to a reference owned by one context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Strong(ObjectId),
    Weak(WeakId),
    /// Target was collected while held weakly
    Gone,
}

#[derive(Debug)]
pub(crate) struct ReferenceEntry {
    count: u32,
    hold: Hold,
}

impl ReferenceEntry {
    /// Give up whatever the entry holds on the host side
    pub(crate) fn release(self, host: &dyn HostRuntime) {
        match self.hold {
            Hold::Strong(object) => {
                if let Err(err) = host.release(object) {
                    log::debug!("releasing {} failed: {}", object, err);
                }
            }
            Hold::Weak(weak) => host.drop_weak(weak),
            Hold::Gone => {}
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ReferenceStore {
    entries: FxHashMap<RefId, ReferenceEntry>,
    next_id: u64,
}

impl ReferenceStore {
    fn insert(&mut self, entry: ReferenceEntry) -> RefId {
        self.next_id += 1;
        let id = RefId(self.next_id);
        self.entries.insert(id, entry);
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = ReferenceEntry> + '_ {
        self.entries.drain().map(|(_, entry)| entry)
    }
}

impl Env {
    /// Create a reference to an object with an initial count
    pub fn create_reference(&self, value: &Value, initial_count: u32) -> BridgeResult<RefId> {
        let result = self.expect_object(value).and_then(|object| {
            let hold = if initial_count > 0 || !self.supports_weak_references() {
                self.host()
                    .retain(object)
                    .map_err(|err| self.host_failure("napi_create_reference", err))?;
                Hold::Strong(object)
            } else {
                let weak = self
                    .host()
                    .create_weak(object)
                    .map_err(|err| self.host_failure("napi_create_reference", err))?;
                Hold::Weak(weak)
            };

            Ok(self.references.borrow_mut().insert(ReferenceEntry {
                count: initial_count,
                hold,
            }))
        });
        self.track(result)
    }

    /// Increment the count, returning the new value
    pub fn reference_ref(&self, reference: RefId) -> BridgeResult<u32> {
        let result = self.with_reference(reference, |host, entry| {
            // Upgrade first so a failed retain leaves the entry untouched.
            if entry.count == 0 {
                if let Hold::Weak(weak) = entry.hold {
                    entry.hold = match host.upgrade_weak(weak) {
                        Some(object) => {
                            host.retain(object).map_err(|err| {
                                log::debug!("napi_reference_ref: {}", err);
                                Status::GenericFailure
                            })?;
                            host.drop_weak(weak);
                            Hold::Strong(object)
                        }
                        None => Hold::Gone,
                    };
                }
            }
            entry.count += 1;
            Ok(entry.count)
        });
        self.track(result)
    }

    /// Decrement the count, returning the new value. Fails at zero.
    pub fn reference_unref(&self, reference: RefId) -> BridgeResult<u32> {
        let weak_references = self.supports_weak_references();
        let result = self.with_reference(reference, |host, entry| {
            if entry.count == 0 {
                return Err(Status::GenericFailure);
            }
            entry.count -= 1;
            if entry.count == 0 && weak_references {
                if let Hold::Strong(object) = entry.hold {
                    let weak = host.create_weak(object).map_err(|err| {
                        log::debug!("napi_reference_unref: {}", err);
                        Status::GenericFailure
                    })?;
                    if let Err(err) = host.release(object) {
                        log::debug!("napi_reference_unref: {}", err);
                    }
                    entry.hold = Hold::Weak(weak);
                }
            }
            Ok(entry.count)
        });
        self.track(result)
    }

    /// Current target, `None` once it has been collected
    pub fn get_reference_value(&self, reference: RefId) -> BridgeResult<Option<Value>> {
        let result = self.with_reference(reference, |host, entry| {
            let target = match entry.hold {
                Hold::Strong(object) => Some(object),
                Hold::Weak(weak) => host.upgrade_weak(weak),
                Hold::Gone => None,
            };
            Ok(target.map(Value::Object))
        });
        self.track(result)
    }

    pub fn delete_reference(&self, reference: RefId) -> BridgeResult<()> {
        let entry = self.references.borrow_mut().entries.remove(&reference);
        let result = match entry {
            Some(entry) => {
                entry.release(self.host().as_ref());
                Ok(())
            }
            None => Err(Status::InvalidArg.into()),
        };
        self.track(result)
    }

    /// Remember the constructor for class `T`, returning the one it replaces
    pub fn set_instance_constructor<T: 'static>(&self, constructor: RefId) -> Option<RefId> {
        self.constructors
            .borrow_mut()
            .insert(TypeId::of::<T>(), constructor)
    }

    pub fn instance_constructor<T: 'static>(&self) -> Option<RefId> {
        self.constructors.borrow().get(&TypeId::of::<T>()).copied()
    }

    fn with_reference<T>(
        &self,
        reference: RefId,
        f: impl FnOnce(&dyn HostRuntime, &mut ReferenceEntry) -> Result<T, Status>,
    ) -> BridgeResult<T> {
        let mut references = self.references.borrow_mut();
        let entry = references
            .entries
            .get_mut(&reference)
            .ok_or(Status::InvalidArg)?;
        Ok(f(self.host().as_ref(), entry)?)
    }
}
