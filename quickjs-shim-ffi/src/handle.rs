//! Handle lifecycle, evaluation and the exception channel

use crate::{engine, into_c_string, read_str, QuickJsHandle};
use quickjs_shim::{Engine, EngineConfig, JsValue, Result};
use std::ffi::c_char;
use std::ptr;
use tracing::{debug, error};

fn into_handle(engine: Result<Engine>) -> QuickJsHandle {
    match engine {
        Ok(engine) => {
            let handle = Box::into_raw(Box::new(engine)) as QuickJsHandle;
            debug!("quickjs: created handle {:p}", handle);
            handle
        }
        Err(e) => {
            error!("quickjs: failed to create engine handle: {}", e);
            ptr::null_mut()
        }
    }
}

/// Create a runtime and context. Returns NULL on failure.
#[no_mangle]
pub extern "C" fn quickjs_create() -> QuickJsHandle {
    into_handle(Engine::new())
}

/// Create a handle configured from the TOML file at `path` (NULL: defaults)
#[no_mangle]
pub extern "C" fn quickjs_create_with_config(path: *const c_char) -> QuickJsHandle {
    if path.is_null() {
        return quickjs_create();
    }
    let Some(path) = read_str(path, "config path") else {
        return ptr::null_mut();
    };
    into_handle(EngineConfig::load_from(path).and_then(Engine::with_config))
}

/// Free the context, then the runtime. NULL is ignored.
#[no_mangle]
pub extern "C" fn quickjs_free(handle: QuickJsHandle) {
    if handle.is_null() {
        return;
    }
    debug!("quickjs: freeing handle {:p}", handle);
    // SAFETY: `handle` came from `quickjs_create*` and is freed exactly once
    drop(unsafe { Box::from_raw(handle as *mut Engine) });
}

/// Evaluate `js_code` as a global script
#[no_mangle]
pub extern "C" fn quickjs_eval(handle: QuickJsHandle, js_code: *const c_char) -> JsValue {
    let Some(engine) = engine(handle) else {
        return JsValue::EXCEPTION;
    };
    match read_str(js_code, "script source") {
        Some(source) => engine.eval(source),
        None => JsValue::EXCEPTION,
    }
}

#[no_mangle]
pub extern "C" fn quickjs_is_exception(_handle: QuickJsHandle, val: JsValue) -> bool {
    val.is_exception()
}

/// Take the pending exception message; NULL when none is pending
#[no_mangle]
pub extern "C" fn quickjs_get_exception(handle: QuickJsHandle) -> *mut c_char {
    engine(handle)
        .and_then(Engine::take_exception)
        .map(into_c_string)
        .unwrap_or(ptr::null_mut())
}
