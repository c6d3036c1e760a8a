//! Deferred finalizers
//!
//! A finalizer is registered with the host under a [`FinalizeToken`]. When the
//! target is collected the host queues the token for the owning context, and
//! [`Env::run_pending_finalizers`] later runs the matching callback on the
//! context's thread. Events for tokens that were unregistered or already ran
//! are ignored, so each callback runs at most once.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::env::Env;
use crate::error::BridgeResult;
use crate::host::{FinalizeToken, RawPtr};
use crate::value::ObjectId;

/// Native cleanup callback: `(env, data, hint)`
pub type FinalizeCallback = Box<dyn FnOnce(&Env, RawPtr, RawPtr)>;

pub(crate) enum PendingFinalizer {
    /// Finalizer stored on the wrap record of this object
    Wrap(ObjectId),
    /// Drop the type tag of a collected object
    TypeTag(ObjectId),
    /// Buffer release or anonymous finalizer
    Callback {
        callback: FinalizeCallback,
        data: RawPtr,
        hint: RawPtr,
    },
}

impl fmt::Debug for PendingFinalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingFinalizer::Wrap(object) => write!(f, "Wrap({})", object),
            PendingFinalizer::TypeTag(object) => write!(f, "TypeTag({})", object),
            PendingFinalizer::Callback { data, hint, .. } => f
                .debug_struct("Callback")
                .field("data", data)
                .field("hint", hint)
                .finish(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct FinalizerRegistry {
    entries: FxHashMap<FinalizeToken, PendingFinalizer>,
}

impl FinalizerRegistry {
    pub fn insert(&mut self, token: FinalizeToken, pending: PendingFinalizer) {
        self.entries.insert(token, pending);
    }

    pub fn remove(&mut self, token: &FinalizeToken) -> Option<PendingFinalizer> {
        self.entries.remove(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn tokens(&self) -> Vec<FinalizeToken> {
        self.entries.keys().copied().collect()
    }
}

impl Env {
    /// Register `pending` to run once `target` is collected
    pub(crate) fn register_finalizer(
        &self,
        api: &str,
        target: ObjectId,
        pending: PendingFinalizer,
    ) -> BridgeResult<FinalizeToken> {
        let token = self.next_finalize_token();
        self.host()
            .register_finalizer(target, token)
            .map_err(|err| self.host_failure(api, err))?;

        log::trace!("{}: registered finalizer {:?} on {}", api, token, target);
        self.finalizers.borrow_mut().insert(token, pending);
        Ok(token)
    }

    /// Cancel a registration made by `register_finalizer`
    pub(crate) fn unregister_finalizer(&self, token: FinalizeToken) {
        self.finalizers.borrow_mut().remove(&token);
        if !self.host().unregister_finalizer(token) {
            log::trace!("finalizer {:?} was not registered with the host", token);
        }
    }

    /// Run the finalizers whose targets the host has collected.
    ///
    /// Returns how many callbacks ran. Callbacks may call back into this
    /// context. Calling again with no new collections is a no-op.
    pub fn run_pending_finalizers(&self) -> usize {
        let events = self.host().take_finalized(self.id());
        let mut ran = 0;

        for token in events {
            let pending = self.finalizers.borrow_mut().remove(&token);
            match pending {
                None => log::trace!("ignoring stale finalize event {:?}", token),
                Some(PendingFinalizer::Wrap(object)) => {
                    if self.finalize_wrap(object, token) {
                        ran += 1;
                    }
                }
                Some(PendingFinalizer::TypeTag(object)) => {
                    self.type_tags.borrow_mut().remove(&object);
                }
                Some(PendingFinalizer::Callback { callback, data, hint }) => {
                    callback(self, data, hint);
                    ran += 1;
                }
            }
        }

        if ran > 0 {
            log::debug!("context {} ran {} finalizers", self.id(), ran);
        }
        ran
    }

    /// Finalizers registered and not yet run
    pub fn pending_finalizer_count(&self) -> usize {
        self.finalizers.borrow().len()
    }
}
