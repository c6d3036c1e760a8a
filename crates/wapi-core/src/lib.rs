//! wapi-core - native/managed compatibility bridge
//!
//! Lets native code take part in a managed runtime's object model through a
//! [`HostRuntime`] it does not control:
//!
//! - capability detection (weak references, big integers)
//! - status codes and the per-context last-error slot
//! - external byte buffers with deferred release callbacks
//! - wrap / unwrap / remove-wrap / dispose of native objects, with finalizers
//!   driven by the host's collector
//! - counted references and per-class constructor references
//! - type tags for checking an object's native type before unwrapping
//!
//! # Example
//!
//! ```ignore
//! use wapi_core::{Env, Value};
//!
//! let env = Env::new(host);
//! let instance = env.create_object()?;
//! env.wrap(&instance, native_ptr, Some(Box::new(|_, ptr, _| free(ptr))), null_mut(), false)?;
//! assert_eq!(env.unwrap(&instance)?, native_ptr);
//! ```

pub mod buffer;
pub mod capability;
pub mod config;
pub mod counter;
pub mod env;
pub mod error;
pub mod finalizer;
pub mod host;
pub mod reference;
pub mod status;
pub mod type_tag;
pub mod value;
pub mod value_ops;
pub mod version;
pub mod wrap;

pub use capability::{Capabilities, Feature};
pub use config::{BridgeConfig, CapabilityOverride, ConfigError, DegradedWrapPolicy};
pub use counter::FinalizeCounter;
pub use env::{Env, EnvBuilder, EnvId, ExtendedErrorInfo, LastError};
pub use error::{BridgeError, BridgeResult, Exception, HostError};
pub use finalizer::FinalizeCallback;
pub use host::{
    CallbackInfo, FinalizeToken, HostRuntime, NativeCallback, PropertyDescriptor, PropertyValue,
    RawPtr, WeakId,
};
pub use reference::RefId;
pub use status::{error_messages, Status, STATUS_COUNT};
pub use type_tag::TypeTag;
pub use value::{ObjectId, ObjectKind, Value, ValueType};
pub use version::{napi_version, node_version, NodeVersion, NAPI_VERSION};
pub use wrap::{OwnershipMode, WrapRecord};
