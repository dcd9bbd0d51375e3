//! Bidirectional conversion between serde_json::Value and rquickjs Value
//!
//! Lets Rust hosts move structured data in and out of a handle without going
//! through text on their side.

use crate::error::{Result, ShimError};
use rquickjs::{Ctx, Value};

/// Convert a serde_json::Value into a rquickjs Value by round-tripping through JSON.parse()
pub fn json_to_js<'js>(ctx: &Ctx<'js>, value: &serde_json::Value) -> Result<Value<'js>> {
    let json_str = serde_json::to_string(value).map_err(|e| ShimError::json(e.to_string()))?;

    ctx.json_parse(json_str)
        .map_err(|e| ShimError::json(format!("JSON.parse failed: {}", e)))
}

/// Convert a rquickjs Value back to serde_json::Value by round-tripping through JSON.stringify()
///
/// - undefined and functions are converted to null
/// - All other types go through JSON.stringify -> serde_json::from_str
pub fn js_to_json<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Result<serde_json::Value> {
    if value.is_undefined() || value.is_null() || value.is_function() {
        return Ok(serde_json::Value::Null);
    }

    match ctx.json_stringify(value) {
        Ok(Some(js_string)) => {
            let s: String = js_string.to_string()?;
            serde_json::from_str(&s)
                .map_err(|e| ShimError::json(format!("JSON parse failed: {}", e)))
        }
        // JSON.stringify returns undefined for symbols
        Ok(None) => Ok(serde_json::Value::Null),
        Err(e) => {
            let _ = ctx.catch();
            Err(ShimError::json(format!("JSON.stringify failed: {}", e)))
        }
    }
}
