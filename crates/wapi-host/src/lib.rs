//! wapi-host - reference managed runtime
//!
//! A small single-threaded heap that implements [`wapi_core::HostRuntime`]:
//! plain objects with prototypes, functions backed by native callbacks,
//! `Uint8Array`s over external memory, weak references and a finalization
//! registry. Collection is explicit, which makes finalizer timing
//! deterministic for tests and embedders.
//!
//! ```ignore
//! let runtime = Rc::new(Runtime::new(HostOptions::default()));
//! let env = Env::new(runtime.clone());
//! let object = env.create_object()?;
//! runtime.collect_garbage();
//! env.run_pending_finalizers();
//! ```

pub mod heap;
pub mod options;
pub mod runtime;

pub use heap::GcStats;
pub use options::{HostOptions, OptionsError};
pub use runtime::Runtime;
