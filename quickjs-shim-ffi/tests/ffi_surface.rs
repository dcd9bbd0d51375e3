//! Drives the exported C surface the way a foreign host would

use quickjs_shim_ffi::*;
use serial_test::serial;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// RAII wrapper so a failing assertion still frees the handle
struct Handle(QuickJsHandle);

impl Handle {
    fn new() -> Self {
        let handle = quickjs_create();
        assert!(!handle.is_null());
        Self(handle)
    }

    fn eval(&self, code: &str) -> JsValue {
        let code = CString::new(code).unwrap();
        quickjs_eval(self.0, code.as_ptr())
    }

    fn int(&self, val: JsValue) -> i32 {
        let mut out = 0;
        assert_eq!(quickjs_to_int(self.0, val, &mut out), 0);
        out
    }

    fn string(&self, val: JsValue) -> String {
        take_string(quickjs_to_cstring(self.0, val)).expect("string conversion failed")
    }

    fn set(&self, name: &str, val: JsValue) -> c_int {
        let name = CString::new(name).unwrap();
        quickjs_set_property_str(self.0, name.as_ptr(), val)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        quickjs_free(self.0);
    }
}

fn take_string(ptr: *mut c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
    quickjs_free_string(ptr);
    Some(s)
}

#[test]
fn test_eval_one_plus_one() {
    let js = Handle::new();
    let result = js.eval("1+1");
    assert!(!quickjs_is_exception(js.0, result));
    assert_eq!(js.int(result), 2);
}

#[test]
fn test_syntax_error_reports_message() {
    let js = Handle::new();
    let result = js.eval("var a = ;");
    assert!(quickjs_is_exception(js.0, result));

    let message = take_string(quickjs_get_exception(js.0)).unwrap();
    assert!(!message.is_empty());
    assert!(quickjs_get_exception(js.0).is_null());
}

#[test]
fn test_thrown_primitive_reports_its_value() {
    let js = Handle::new();
    for (source, expected) in [("throw null", "null"), ("throw undefined", "undefined")] {
        assert!(quickjs_is_exception(js.0, js.eval(source)));
        assert_eq!(take_string(quickjs_get_exception(js.0)).as_deref(), Some(expected));
    }
}

#[test]
fn test_json_round_trip() {
    let js = Handle::new();
    let text = CString::new("{\"a\":1}").unwrap();
    let parsed = quickjs_json_parse(js.0, text.as_ptr());
    assert!(!quickjs_is_exception(js.0, parsed));

    let out = take_string(quickjs_json_stringify(js.0, parsed)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value, serde_json::json!({"a": 1}));
}

#[test]
fn test_new_json_is_parse() {
    let js = Handle::new();
    let text = CString::new("[1, 2, 3]").unwrap();
    let arr = quickjs_new_json(js.0, text.as_ptr());
    assert_eq!(js.set("arr", arr), 1);
    assert_eq!(js.int(js.eval("arr.length")), 3);
}

#[test]
fn test_set_property_then_eval() {
    let js = Handle::new();
    assert_eq!(js.set("x", quickjs_new_int(js.0, 42)), 1);
    assert_eq!(js.int(js.eval("x")), 42);
}

#[test]
fn test_constructors_are_live_values() {
    let js = Handle::new();
    let s = CString::new("héllo").unwrap();
    assert_eq!(js.set("s", quickjs_new_string(js.0, s.as_ptr())), 1);
    assert_eq!(js.set("d", quickjs_new_double(js.0, 0.5)), 1);
    assert_eq!(js.set("t", quickjs_new_true(js.0)), 1);
    assert_eq!(js.set("f", quickjs_new_false(js.0)), 1);
    assert_eq!(js.set("n", quickjs_new_null(js.0)), 1);
    assert_eq!(js.set("u", quickjs_new_undefined(js.0)), 1);

    let summary = js.eval("[s, d * 4, t && !f, n === null, u === undefined].join('|')");
    assert_eq!(js.string(summary), "héllo|2|true|true|true");
}

#[test]
fn test_handles_are_isolated() {
    let a = Handle::new();
    let b = Handle::new();
    assert_eq!(a.set("only_in_a", quickjs_new_int(a.0, 1)), 1);

    let result = b.eval("typeof only_in_a");
    assert_eq!(b.string(result), "undefined");
    assert!(quickjs_is_exception(b.0, b.eval("only_in_a")));
}

#[test]
fn test_to_int_failure_is_signalled() {
    let js = Handle::new();
    let symbol = js.eval("Symbol('nope')");
    let mut out = 7;
    assert_eq!(quickjs_to_int(js.0, symbol, &mut out), -1);
    assert_eq!(out, 7);
}

#[test]
fn test_to_bool_and_double() {
    let js = Handle::new();
    assert_eq!(quickjs_to_bool(js.0, js.eval("'x'")), 1);
    assert_eq!(quickjs_to_bool(js.0, js.eval("0")), 0);
    assert_eq!(quickjs_to_bool(js.0, quickjs_new_undefined(js.0)), 0);

    let mut out = 0.0;
    assert_eq!(quickjs_to_double(js.0, js.eval("Math.PI"), &mut out), 0);
    assert!((out - std::f64::consts::PI).abs() < 1e-12);
}

#[test]
fn test_free_value_detects_stale_records() {
    let js = Handle::new();
    let obj = js.eval("({})");
    assert_eq!(quickjs_free_value(js.0, obj), 0);
    assert_eq!(quickjs_free_value(js.0, obj), -1);
    assert!(quickjs_to_cstring(js.0, obj).is_null());
    assert_eq!(quickjs_free_value(js.0, quickjs_new_int(js.0, 3)), 0);
}

#[test]
fn test_get_property_str() {
    let js = Handle::new();
    js.eval("var greeting = 'hi'");
    let name = CString::new("greeting").unwrap();
    let value = quickjs_get_property_str(js.0, name.as_ptr());
    assert_eq!(js.string(value), "hi");
}

#[test]
fn test_null_arguments_are_rejected() {
    assert!(quickjs_is_exception(
        std::ptr::null_mut(),
        quickjs_eval(std::ptr::null_mut(), std::ptr::null())
    ));
    quickjs_free(std::ptr::null_mut());
    quickjs_free_string(std::ptr::null_mut());

    let js = Handle::new();
    assert!(quickjs_is_exception(js.0, quickjs_eval(js.0, std::ptr::null())));
    assert_eq!(quickjs_set_property_str(js.0, std::ptr::null(), quickjs_new_int(js.0, 1)), -1);
    assert_eq!(quickjs_to_int(js.0, quickjs_new_int(js.0, 1), std::ptr::null_mut()), -1);
}

#[test]
fn test_interior_nul_truncates() {
    let js = Handle::new();
    let result = js.eval("'abc\\u0000def'");
    assert_eq!(js.string(result), "abc");
}

unsafe extern "C" fn native_add(
    handle: QuickJsHandle,
    _this_val: JsValue,
    argc: c_int,
    argv: *const JsValue,
    user_data: *mut c_void,
) -> JsValue {
    let calls = &*(user_data as *const AtomicUsize);
    calls.fetch_add(1, Ordering::SeqCst);

    let args = std::slice::from_raw_parts(argv, argc as usize);
    let mut sum = 0;
    for arg in args {
        let mut n = 0;
        if quickjs_to_int(handle, *arg, &mut n) != 0 {
            return JsValue::EXCEPTION;
        }
        sum += n;
    }
    quickjs_new_int(handle, sum)
}

#[test]
fn test_native_function() {
    let js = Handle::new();
    let calls = AtomicUsize::new(0);
    let name = CString::new("add").unwrap();
    let func = quickjs_new_function(
        js.0,
        name.as_ptr(),
        2,
        Some(native_add),
        &calls as *const AtomicUsize as *mut c_void,
    );
    assert!(!quickjs_is_exception(js.0, func));
    assert_eq!(js.set("add", func), 1);

    assert_eq!(js.int(js.eval("add(2, 3) + add(10, 20)")), 35);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(js.string(js.eval("add.length")), "2");
}

unsafe extern "C" fn native_eval(
    handle: QuickJsHandle,
    _this_val: JsValue,
    argc: c_int,
    argv: *const JsValue,
    _user_data: *mut c_void,
) -> JsValue {
    if argc < 1 {
        return quickjs_new_undefined(handle);
    }
    let source = quickjs_to_cstring(handle, *argv);
    let result = quickjs_eval(handle, source);
    quickjs_free_string(source);
    result
}

#[test]
fn test_native_function_reenters_and_rethrows() {
    let js = Handle::new();
    let name = CString::new("nested").unwrap();
    let func = quickjs_new_function(
        js.0,
        name.as_ptr(),
        1,
        Some(native_eval),
        std::ptr::null_mut(),
    );
    assert_eq!(js.set("nested", func), 1);

    assert_eq!(js.int(js.eval("nested('6 * 7')")), 42);

    let caught = js.eval("try { nested('null.x') } catch (e) { e.name }");
    assert_eq!(js.string(caught), "TypeError");

    let caught = js.eval("try { nested('throw null') } catch (e) { e === null }");
    assert_eq!(quickjs_to_bool(js.0, caught), 1);
}

#[test]
fn test_new_function_requires_callback() {
    let js = Handle::new();
    let name = CString::new("missing").unwrap();
    let func = quickjs_new_function(js.0, name.as_ptr(), 0, None, std::ptr::null_mut());
    assert!(quickjs_is_exception(js.0, func));
}

#[test]
#[serial]
fn test_create_with_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("engine.toml");
    fs::write(&path, "strict = true\n").unwrap();
    let path = CString::new(path.to_str().unwrap()).unwrap();

    let js = Handle(quickjs_create_with_config(path.as_ptr()));
    assert!(!js.0.is_null());
    assert!(quickjs_is_exception(js.0, js.eval("undeclared = 1")));
    let message = take_string(quickjs_get_exception(js.0)).unwrap();
    assert!(message.contains("ReferenceError"), "Got: {}", message);
}

#[test]
#[serial]
fn test_create_with_invalid_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("engine.toml");
    fs::write(&path, "strict = \"sometimes\"\n").unwrap();
    let path = CString::new(path.to_str().unwrap()).unwrap();

    assert!(quickjs_create_with_config(path.as_ptr()).is_null());
}
