//! Value conversions and JSON encode/decode
//!
//! Conversions consume the value passed in.

use crate::{engine, into_c_string, read_str, QuickJsHandle};
use quickjs_shim::JsValue;
use std::ffi::{c_char, c_int};
use std::ptr;
use tracing::warn;

/// Coerce to a string (`String(val)`); NULL on failure
#[no_mangle]
pub extern "C" fn quickjs_to_cstring(handle: QuickJsHandle, val: JsValue) -> *mut c_char {
    let Some(engine) = engine(handle) else {
        return ptr::null_mut();
    };
    match engine.to_string(val) {
        Ok(s) => into_c_string(s),
        Err(e) => {
            warn!("quickjs_to_cstring: {}", e);
            ptr::null_mut()
        }
    }
}

/// Truthiness: 1 or 0, -1 on failure
#[no_mangle]
pub extern "C" fn quickjs_to_bool(handle: QuickJsHandle, val: JsValue) -> c_int {
    let Some(engine) = engine(handle) else {
        return -1;
    };
    match engine.to_bool(val) {
        Ok(b) => b as c_int,
        Err(e) => {
            warn!("quickjs_to_bool: {}", e);
            -1
        }
    }
}

/// `ToInt32` into `*out`: 0 on success, -1 on failure (`*out` untouched)
#[no_mangle]
pub extern "C" fn quickjs_to_int(handle: QuickJsHandle, val: JsValue, out: *mut i32) -> c_int {
    let Some(engine) = engine(handle) else {
        return -1;
    };
    if out.is_null() {
        warn!("quickjs_to_int: NULL output pointer");
        return -1;
    }
    match engine.to_int(val) {
        Ok(i) => {
            // SAFETY: checked non-NULL; the caller provides writable storage
            unsafe { out.write(i) };
            0
        }
        Err(e) => {
            warn!("quickjs_to_int: {}", e);
            -1
        }
    }
}

/// `ToNumber` into `*out`: 0 on success, -1 on failure (`*out` untouched)
#[no_mangle]
pub extern "C" fn quickjs_to_double(handle: QuickJsHandle, val: JsValue, out: *mut f64) -> c_int {
    let Some(engine) = engine(handle) else {
        return -1;
    };
    if out.is_null() {
        warn!("quickjs_to_double: NULL output pointer");
        return -1;
    }
    match engine.to_double(val) {
        Ok(f) => {
            // SAFETY: checked non-NULL; the caller provides writable storage
            unsafe { out.write(f) };
            0
        }
        Err(e) => {
            warn!("quickjs_to_double: {}", e);
            -1
        }
    }
}

/// `JSON.stringify(val)`; NULL on failure
#[no_mangle]
pub extern "C" fn quickjs_json_stringify(handle: QuickJsHandle, val: JsValue) -> *mut c_char {
    let Some(engine) = engine(handle) else {
        return ptr::null_mut();
    };
    match engine.stringify_json(val) {
        Ok(s) => into_c_string(s),
        Err(e) => {
            warn!("quickjs_json_stringify: {}", e);
            ptr::null_mut()
        }
    }
}

/// `JSON.parse(json)`
#[no_mangle]
pub extern "C" fn quickjs_json_parse(handle: QuickJsHandle, json: *const c_char) -> JsValue {
    let Some(engine) = engine(handle) else {
        return JsValue::EXCEPTION;
    };
    match read_str(json, "JSON text") {
        Some(text) => engine.parse_json(text),
        None => JsValue::EXCEPTION,
    }
}

/// Same as [`quickjs_json_parse`]
#[no_mangle]
pub extern "C" fn quickjs_new_json(handle: QuickJsHandle, json: *const c_char) -> JsValue {
    quickjs_json_parse(handle, json)
}
