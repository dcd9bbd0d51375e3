//! Value construction, global bindings and release calls
//!
//! Constructed values stay live until released with [`quickjs_free_value`]
//! or consumed by [`quickjs_set_property_str`] or a conversion.

use crate::{engine, read_str, QuickJsHandle};
use quickjs_shim::JsValue;
use std::ffi::{c_char, c_int, c_void, CString};
use tracing::{error, warn};

/// Native function callable from script.
///
/// `this_val` and `argv` are borrowed for the duration of the call; the
/// returned value is consumed. Returning the exception marker throws.
pub type NativeFn = unsafe extern "C" fn(
    handle: QuickJsHandle,
    this_val: JsValue,
    argc: c_int,
    argv: *const JsValue,
    user_data: *mut c_void,
) -> JsValue;

#[no_mangle]
pub extern "C" fn quickjs_new_undefined(_handle: QuickJsHandle) -> JsValue {
    JsValue::UNDEFINED
}

#[no_mangle]
pub extern "C" fn quickjs_new_null(_handle: QuickJsHandle) -> JsValue {
    JsValue::NULL
}

#[no_mangle]
pub extern "C" fn quickjs_new_true(_handle: QuickJsHandle) -> JsValue {
    JsValue::TRUE
}

#[no_mangle]
pub extern "C" fn quickjs_new_false(_handle: QuickJsHandle) -> JsValue {
    JsValue::FALSE
}

#[no_mangle]
pub extern "C" fn quickjs_new_int(_handle: QuickJsHandle, val: i32) -> JsValue {
    JsValue::from_i32(val)
}

#[no_mangle]
pub extern "C" fn quickjs_new_double(_handle: QuickJsHandle, val: f64) -> JsValue {
    JsValue::from_f64(val)
}

#[no_mangle]
pub extern "C" fn quickjs_new_string(handle: QuickJsHandle, s: *const c_char) -> JsValue {
    let Some(engine) = engine(handle) else {
        return JsValue::EXCEPTION;
    };
    match read_str(s, "string value") {
        Some(s) => engine.new_string(s),
        None => JsValue::EXCEPTION,
    }
}

/// Wrap `func` as a function value named `name` with `length` declared parameters
#[no_mangle]
pub extern "C" fn quickjs_new_function(
    handle: QuickJsHandle,
    name: *const c_char,
    length: c_int,
    func: Option<NativeFn>,
    user_data: *mut c_void,
) -> JsValue {
    let Some(engine) = engine(handle) else {
        return JsValue::EXCEPTION;
    };
    let Some(name) = read_str(name, "function name") else {
        return JsValue::EXCEPTION;
    };
    let Some(func) = func else {
        error!("quickjs_new_function: NULL callback for '{}'", name);
        return JsValue::EXCEPTION;
    };

    let arity = usize::try_from(length).unwrap_or(0);
    engine.new_function(name, arity, move |_scope, this_val, args| {
        // SAFETY: `func` was registered by the host with this signature; argv
        // points at `args.len()` records that outlive the call.
        let result = unsafe {
            func(
                handle,
                this_val,
                args.len() as c_int,
                args.as_ptr(),
                user_data,
            )
        };
        Ok(result)
    })
}

/// Bind `value` as a global named `property_name`, consuming it.
/// Returns 1 on success, -1 on failure.
#[no_mangle]
pub extern "C" fn quickjs_set_property_str(
    handle: QuickJsHandle,
    property_name: *const c_char,
    value: JsValue,
) -> c_int {
    let Some(engine) = engine(handle) else {
        return -1;
    };
    let Some(name) = read_str(property_name, "property name") else {
        let _ = engine.release(value);
        return -1;
    };
    match engine.set_property_str(name, value) {
        Ok(()) => 1,
        Err(e) => {
            warn!("quickjs_set_property_str: {}", e);
            -1
        }
    }
}

/// Read the global named `property_name`; `undefined` when unset
#[no_mangle]
pub extern "C" fn quickjs_get_property_str(
    handle: QuickJsHandle,
    property_name: *const c_char,
) -> JsValue {
    let Some(engine) = engine(handle) else {
        return JsValue::EXCEPTION;
    };
    match read_str(property_name, "property name") {
        Some(name) => engine.get_property_str(name),
        None => JsValue::EXCEPTION,
    }
}

/// Release a value. 0 on success, -1 when stale or foreign.
#[no_mangle]
pub extern "C" fn quickjs_free_value(handle: QuickJsHandle, value: JsValue) -> c_int {
    let Some(engine) = engine(handle) else {
        return -1;
    };
    match engine.release(value) {
        Ok(()) => 0,
        Err(e) => {
            warn!("quickjs_free_value: {}", e);
            -1
        }
    }
}

/// Release a string returned by this library. NULL is ignored.
#[no_mangle]
pub extern "C" fn quickjs_free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    // SAFETY: every non-NULL string handed out comes from `CString::into_raw`
    drop(unsafe { CString::from_raw(s) });
}
