//! C-callable surface over quickjs-shim engine handles
//!
//! Every function takes the opaque handle returned by [`quickjs_create`] as
//! its first argument and forwards to the matching [`Engine`] operation.
//! The declarations live in `include/quickjs_shim.h`.
//!
//! Conventions:
//! - Value-producing calls return a [`JsValue`]; failure is the exception
//!   marker, tested with [`quickjs_is_exception`] and read with
//!   [`quickjs_get_exception`].
//! - Status-returning calls return `0`/`1` on success and `-1` on failure.
//! - Every returned `char *` is owned by the caller and must be released with
//!   [`quickjs_free_string`].
//! - A handle must only be used from one thread at a time and not after
//!   [`quickjs_free`].
#![allow(clippy::not_unsafe_ptr_arg_deref)]

pub mod convert;
pub mod handle;
pub mod logging;
pub mod values;

pub use convert::*;
pub use handle::*;
pub use logging::quickjs_init_logging;
pub use values::*;

pub use quickjs_shim::JsValue;

use quickjs_shim::Engine;
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;
use tracing::{error, warn};

/// Opaque engine handle (`QuickJS_t` in C)
pub type QuickJsHandle = *mut c_void;

/// Borrow the engine behind `handle`, rejecting NULL
fn engine<'a>(handle: QuickJsHandle) -> Option<&'a Engine> {
    if handle.is_null() {
        error!("quickjs: called with a NULL handle");
        return None;
    }
    // SAFETY: non-NULL handles are produced by `quickjs_create` and stay valid
    // until `quickjs_free`; using a freed handle is undefined behaviour.
    Some(unsafe { &*(handle as *const Engine) })
}

/// Borrow a NUL-terminated UTF-8 argument
fn read_str<'a>(s: *const c_char, what: &str) -> Option<&'a str> {
    if s.is_null() {
        error!("quickjs: NULL {}", what);
        return None;
    }
    // SAFETY: the caller passes a NUL-terminated string valid for this call
    match unsafe { CStr::from_ptr(s) }.to_str() {
        Ok(s) => Some(s),
        Err(e) => {
            error!("quickjs: {} is not valid UTF-8: {}", what, e);
            None
        }
    }
}

/// Hand a string to the caller; interior NULs truncate it
fn into_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(c) => c.into_raw(),
        Err(e) => {
            let nul = e.nul_position();
            warn!("quickjs: string truncated at interior NUL (byte {})", nul);
            let mut bytes = e.into_vec();
            bytes.truncate(nul);
            CString::new(bytes)
                .map(CString::into_raw)
                .unwrap_or(ptr::null_mut())
        }
    }
}
