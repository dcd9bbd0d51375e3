//! Handle-based wrapper over the QuickJS engine
//!
//! This crate owns one rquickjs (QuickJS-NG) runtime and context per
//! [`Engine`] handle and exposes a small, flat set of operations over it:
//! evaluate source, test for and read exceptions, coerce values to native
//! types, bridge to and from JSON, construct primitive values, register
//! native functions and bind globals.
//!
//! Values cross the API as [`JsValue`] records with a pinned 16-byte layout so
//! they can be handed to a C caller unchanged (see `quickjs-shim-ffi`).
//! Heap values stay alive in the handle's value table until released or
//! consumed, and a released record is detected rather than reused.
//!
//! # Example
//!
//! ```rust,no_run
//! use quickjs_shim::Engine;
//!
//! let engine = Engine::new().unwrap();
//!
//! engine.set_property_str("x", engine.new_int(40)).unwrap();
//! let result = engine.eval("x + 2");
//! assert!(!engine.is_exception(result));
//! assert_eq!(engine.to_int(result).unwrap(), 42);
//!
//! let failed = engine.eval("var a = ;");
//! assert!(engine.is_exception(failed));
//! println!("{}", engine.take_exception().unwrap());
//! ```

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod value;

pub use config::EngineConfig;
pub use engine::{Engine, Scope, ScopedValue};
pub use error::{Result, ShimError};
pub use value::{JsValue, ValueId, ValueTable, ValueTag};
