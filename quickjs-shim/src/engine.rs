//! Engine handle: one QuickJS runtime plus one context
//!
//! # Architecture
//!
//! - **Owned Pair**: an [`Engine`] owns exactly one `Runtime` and one full
//!   `Context`, torn down context-first on drop
//! - **Value Table**: engine-heap values handed out as [`JsValue`] records live
//!   in a per-handle [`ValueTable`] until released or consumed
//! - **Pending Exception**: a failed evaluation returns the exception marker and
//!   parks the thrown value on the handle until [`Engine::take_exception`]
//! - **Re-entrant Scope**: native callbacks may call back into the same handle;
//!   the already-entered context is re-used instead of locked a second time

use crate::bridge;
use crate::config::EngineConfig;
use crate::error::{Result, ShimError};
use crate::value::{JsValue, ValueId, ValueTable, ValueTag};
use rquickjs::context::EvalOptions;
use rquickjs::convert::Coerced;
use rquickjs::function::{Rest, This};
use rquickjs::{Context, Ctx, Exception, FromJs, Function, Persistent, Runtime, Type, Value};
use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::ops::Deref;
use std::rc::Rc;
use tracing::{debug, trace, warn};

type Stored = Persistent<Value<'static>>;

/// Pending failure recorded by the last fallible call
enum Pending {
    Thrown(Stored),
    Message(String),
}

/// State shared between the handle and the native functions it created
struct Shared {
    values: RefCell<ValueTable<Stored>>,
    pending: RefCell<Option<Pending>>,
    /// Address of the `Ctx` currently entered on this handle, if any
    active: Cell<Option<*const c_void>>,
    strict: bool,
}

/// Marks a context as entered for the lifetime of the guard
struct ActiveCtx<'a> {
    slot: &'a Cell<Option<*const c_void>>,
    previous: Option<*const c_void>,
}

impl<'a> ActiveCtx<'a> {
    fn enter(slot: &'a Cell<Option<*const c_void>>, ctx: &Ctx<'_>) -> Self {
        let previous = slot.replace(Some(ctx as *const Ctx<'_> as *const c_void));
        Self { slot, previous }
    }
}

impl Drop for ActiveCtx<'_> {
    fn drop(&mut self) {
        self.slot.set(self.previous);
    }
}

/// Operations against an entered context.
///
/// Every [`Engine`] method runs through a `Scope`; native callbacks receive
/// one directly.
pub struct Scope<'a, 'js> {
    ctx: &'a Ctx<'js>,
    shared: &'a Rc<Shared>,
}

impl<'a, 'js> Scope<'a, 'js> {
    /// Store `value` and return its record. Primitives are encoded inline.
    fn register(&self, value: Value<'js>) -> JsValue {
        if let Some(b) = value.as_bool() {
            return JsValue::from_bool(b);
        }
        if let Some(i) = value.as_int() {
            return JsValue::from_i32(i);
        }
        if let Some(f) = value.as_float() {
            return JsValue::from_f64(f);
        }
        if value.is_null() {
            return JsValue::NULL;
        }
        if value.is_undefined() {
            return JsValue::UNDEFINED;
        }

        let tag = match value.type_of() {
            Type::String => ValueTag::String,
            Type::Symbol => ValueTag::Symbol,
            Type::BigInt => ValueTag::BigInt,
            _ => ValueTag::Object,
        };
        let stored = Persistent::save(self.ctx, value);
        let id = self.shared.values.borrow_mut().insert(stored);
        trace!("stored {:?} value as {:#x}", tag, id.to_bits());
        JsValue::from_id(tag, id)
    }

    /// Materialize a record without releasing it
    fn resolve(&self, record: JsValue) -> Result<Value<'js>> {
        match self.inline(record)? {
            Some(value) => Ok(value),
            None => {
                let id = ValueId::from_bits(record.payload);
                let stored = self.shared.values.borrow().get(id)?.clone();
                Ok(stored.restore(self.ctx)?)
            }
        }
    }

    /// Materialize a record and release its table slot
    fn take(&self, record: JsValue) -> Result<Value<'js>> {
        match self.inline(record)? {
            Some(value) => Ok(value),
            None => {
                let id = ValueId::from_bits(record.payload);
                let stored = self.shared.values.borrow_mut().remove(id)?;
                Ok(stored.restore(self.ctx)?)
            }
        }
    }

    /// Decode inline records; `None` for reference tags
    fn inline(&self, record: JsValue) -> Result<Option<Value<'js>>> {
        let ctx = self.ctx.clone();
        Ok(Some(match record.kind()? {
            ValueTag::Undefined => Value::new_undefined(ctx),
            ValueTag::Null => Value::new_null(ctx),
            ValueTag::Bool => Value::new_bool(ctx, record.payload != 0),
            ValueTag::Int => Value::new_int(ctx, record.payload as u32 as i32),
            ValueTag::Float64 => Value::new_float(ctx, f64::from_bits(record.payload)),
            ValueTag::Exception => return Err(ShimError::ExceptionValue),
            ValueTag::Object | ValueTag::String | ValueTag::Symbol | ValueTag::BigInt => {
                return Ok(None)
            }
        }))
    }

    /// Park `err` as the pending exception and return the exception marker
    fn fail(&self, err: rquickjs::Error) -> JsValue {
        let pending = match self.catch_pending() {
            Some(thrown) => Pending::Thrown(Persistent::save(self.ctx, thrown)),
            None => Pending::Message(err.to_string()),
        };
        let replaced = self.shared.pending.borrow_mut().replace(pending);
        if replaced.is_some() {
            trace!("discarding unread pending exception");
        }
        JsValue::EXCEPTION
    }

    /// Render an error, clearing the engine-side exception it raised
    fn error_message(&self, err: rquickjs::Error) -> String {
        match self.catch_pending() {
            Some(thrown) => self.describe(thrown),
            None => err.to_string(),
        }
    }

    /// Clear and return the context's pending exception, if one is set.
    /// `throw null` and `throw undefined` are real exceptions; only
    /// `uninitialized` means nothing is pending.
    fn catch_pending(&self) -> Option<Value<'js>> {
        let thrown = self.ctx.catch();
        match thrown.type_of() {
            Type::Uninitialized => None,
            _ => Some(thrown),
        }
    }

    fn describe(&self, thrown: Value<'js>) -> String {
        if let Ok(Coerced(text)) = thrown.get::<Coerced<String>>() {
            return text;
        }
        self.catch_pending();
        match thrown.as_exception() {
            Some(exception) => exception.to_string(),
            None => "unknown exception".to_string(),
        }
    }

    fn coerce<T>(&self, value: Value<'js>, target: &'static str) -> Result<T>
    where
        Coerced<T>: FromJs<'js>,
    {
        match value.get::<Coerced<T>>() {
            Ok(Coerced(converted)) => Ok(converted),
            Err(err) => {
                let message = self.error_message(err);
                warn!("failed to convert JS value to {}: {}", target, message);
                Err(ShimError::conversion(target, message))
            }
        }
    }

    /// Run `source` as a global script
    pub fn eval(&self, source: &str) -> JsValue {
        let mut options = EvalOptions::default();
        options.global = true;
        options.strict = self.shared.strict;

        debug!("evaluating {} bytes of script", source.len());
        match self.ctx.eval_with_options::<Value<'js>, _>(source, options) {
            Ok(value) => self.register(value),
            Err(err) => self.fail(err),
        }
    }

    pub fn is_exception(&self, record: JsValue) -> bool {
        record.is_exception()
    }

    /// Take the pending exception as text, clearing it
    pub fn take_exception(&self) -> Option<String> {
        let pending = self.shared.pending.borrow_mut().take()?;
        Some(match pending {
            Pending::Message(message) => message,
            Pending::Thrown(stored) => match stored.restore(self.ctx) {
                Ok(thrown) => self.describe(thrown),
                Err(err) => err.to_string(),
            },
        })
    }

    pub fn to_string(&self, record: JsValue) -> Result<String> {
        let value = self.take(record)?;
        self.coerce(value, "string")
    }

    pub fn to_bool(&self, record: JsValue) -> Result<bool> {
        let value = self.take(record)?;
        self.coerce(value, "bool")
    }

    pub fn to_int(&self, record: JsValue) -> Result<i32> {
        let value = self.take(record)?;
        self.coerce(value, "int")
    }

    pub fn to_double(&self, record: JsValue) -> Result<f64> {
        let value = self.take(record)?;
        self.coerce(value, "double")
    }

    /// `JSON.stringify`; values JSON cannot represent render as `undefined`
    pub fn stringify_json(&self, record: JsValue) -> Result<String> {
        let value = self.take(record)?;
        match self.ctx.json_stringify(value) {
            Ok(Some(text)) => Ok(text.to_string()?),
            Ok(None) => Ok("undefined".to_string()),
            Err(err) => {
                let message = self.error_message(err);
                warn!("failed to convert JS value to json: {}", message);
                Err(ShimError::json(message))
            }
        }
    }

    /// `JSON.parse`; malformed text yields the exception marker
    pub fn parse_json(&self, text: &str) -> JsValue {
        match self.ctx.json_parse(text) {
            Ok(value) => self.register(value),
            Err(err) => self.fail(err),
        }
    }

    pub fn new_string(&self, s: &str) -> JsValue {
        match rquickjs::String::from_str(self.ctx.clone(), s) {
            Ok(string) => self.register(string.into_value()),
            Err(err) => self.fail(err),
        }
    }

    /// Wrap `callback` as a script-callable function.
    ///
    /// `this` and the arguments are released when the callback returns; the
    /// returned record is consumed. An error, or the exception marker, throws
    /// into script (re-throwing the pending exception when one is parked).
    pub fn new_function<F>(&self, name: &str, arity: usize, callback: F) -> JsValue
    where
        F: Fn(&Scope<'_, '_>, JsValue, &[JsValue]) -> Result<JsValue> + 'static,
    {
        let shared = Rc::downgrade(self.shared);
        let fn_name = name.to_string();

        let trampoline = move |ctx: Ctx<'js>,
                               this: This<Value<'js>>,
                               args: Rest<Value<'js>>|
              -> rquickjs::Result<Value<'js>> {
            let Some(shared) = shared.upgrade() else {
                return Err(Exception::throw_internal(&ctx, "engine handle has been freed"));
            };
            let _active = ActiveCtx::enter(&shared.active, &ctx);
            let scope = Scope {
                ctx: &ctx,
                shared: &shared,
            };

            let this = scope.register(this.0);
            let args: Vec<JsValue> = args.0.into_iter().map(|arg| scope.register(arg)).collect();

            let outcome = callback(&scope, this, &args).and_then(|result| scope.take(result));

            for borrowed in std::iter::once(this).chain(args) {
                // The callback may already have consumed its arguments
                let _ = scope.release(borrowed);
            }

            match outcome {
                Ok(value) => Ok(value),
                Err(ShimError::ExceptionValue) => {
                    let pending = scope.shared.pending.borrow_mut().take();
                    match pending {
                        Some(Pending::Thrown(stored)) => Err(ctx.throw(stored.restore(&ctx)?)),
                        Some(Pending::Message(message)) => {
                            Err(Exception::throw_internal(&ctx, &message))
                        }
                        None => Err(Exception::throw_internal(
                            &ctx,
                            &format!("native function '{}' failed", fn_name),
                        )),
                    }
                }
                Err(err) => {
                    let err = ShimError::callback(&fn_name, err.to_string());
                    debug!("{}", err);
                    Err(Exception::throw_internal(&ctx, &err.to_string()))
                }
            }
        };

        let created = Function::new(self.ctx.clone(), trampoline)
            .and_then(|function| function.with_name(name))
            .and_then(|function| function.with_length(arity));
        match created {
            Ok(function) => self.register(function.into_value()),
            Err(err) => self.fail(err),
        }
    }

    /// Bind `record` on the global object, consuming it
    pub fn set_property_str(&self, name: &str, record: JsValue) -> Result<()> {
        let value = self.take(record)?;
        self.ctx.globals().set(name, value).map_err(|err| {
            let message = self.error_message(err);
            ShimError::engine(format!("Failed to set global '{}': {}", name, message))
        })
    }

    /// Read a global; missing names are `undefined`
    pub fn get_property_str(&self, name: &str) -> JsValue {
        match self.ctx.globals().get::<_, Value<'js>>(name) {
            Ok(value) => self.register(value),
            Err(err) => self.fail(err),
        }
    }

    /// Release a record. Primitives are a no-op.
    pub fn release(&self, record: JsValue) -> Result<()> {
        if record.kind()?.is_reference() {
            let id = ValueId::from_bits(record.payload);
            let stored = self.shared.values.borrow_mut().remove(id)?;
            drop(stored);
        }
        Ok(())
    }

    /// Convert to `serde_json::Value`, consuming the record
    pub fn to_json_value(&self, record: JsValue) -> Result<serde_json::Value> {
        let value = self.take(record)?;
        bridge::js_to_json(self.ctx, value)
    }

    pub fn from_json_value(&self, json: &serde_json::Value) -> JsValue {
        match bridge::json_to_js(self.ctx, json) {
            Ok(value) => self.register(value),
            Err(err) => {
                let pending = Pending::Message(err.to_string());
                let _replaced = self.shared.pending.borrow_mut().replace(pending);
                JsValue::EXCEPTION
            }
        }
    }

    /// Script-level `typeof` of a record, without releasing it
    pub fn type_of(&self, record: JsValue) -> Result<&'static str> {
        let value = self.resolve(record)?;
        Ok(match value.type_of() {
            Type::Undefined | Type::Uninitialized => "undefined",
            Type::Bool => "boolean",
            Type::Int | Type::Float => "number",
            Type::String => "string",
            Type::Symbol => "symbol",
            Type::BigInt => "bigint",
            Type::Function | Type::Constructor => "function",
            _ => "object",
        })
    }
}

/// Owned handle to one runtime and its context.
///
/// Not `Send`: a handle must be driven from one thread at a time.
pub struct Engine {
    shared: Rc<Shared>,
    context: Context,
    runtime: Runtime,
    config: EngineConfig,
}

impl Engine {
    /// Create a handle using configuration from the environment
    pub fn new() -> Result<Self> {
        Self::with_config(EngineConfig::load()?)
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        let runtime = Runtime::new()?;
        if let Some(limit) = config.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = config.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        let context = Context::full(&runtime)?;

        debug!(
            "created engine handle (memory_limit={:?}, max_stack_size={:?})",
            config.memory_limit, config.max_stack_size
        );

        Ok(Self {
            shared: Rc::new(Shared {
                values: RefCell::new(ValueTable::new()),
                pending: RefCell::new(None),
                active: Cell::new(None),
                strict: config.strict,
            }),
            context,
            runtime,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `f` inside the context, re-using it when already entered
    pub fn with_scope<R>(&self, f: impl FnOnce(&Scope<'_, '_>) -> R) -> R {
        if let Some(ptr) = self.shared.active.get() {
            // SAFETY: `active` is only set by an `ActiveCtx` guard whose `Ctx`
            // lives further up this thread's stack and outlives this call.
            let ctx = unsafe { &*(ptr as *const Ctx<'_>) };
            return f(&Scope {
                ctx,
                shared: &self.shared,
            });
        }

        self.context.with(|ctx| {
            let _active = ActiveCtx::enter(&self.shared.active, &ctx);
            f(&Scope {
                ctx: &ctx,
                shared: &self.shared,
            })
        })
    }

    fn is_nested(&self) -> bool {
        self.shared.active.get().is_some()
    }

    /// Evaluate `source`; the exception marker signals failure
    pub fn eval(&self, source: &str) -> JsValue {
        let nested = self.is_nested();
        let result = self.with_scope(|scope| scope.eval(source));
        if !nested && self.config.run_pending_jobs {
            self.run_pending_jobs();
        }
        result
    }

    /// Drain queued promise jobs; returns how many ran
    pub fn run_pending_jobs(&self) -> usize {
        if self.is_nested() {
            return 0;
        }
        let mut ran = 0;
        loop {
            match self.runtime.execute_pending_job() {
                Ok(false) => break,
                Ok(true) => ran += 1,
                Err(e) => {
                    warn!("error executing pending JS job: {:?}", e);
                    break;
                }
            }
        }
        ran
    }

    pub fn is_exception(&self, record: JsValue) -> bool {
        record.is_exception()
    }

    pub fn take_exception(&self) -> Option<String> {
        self.with_scope(|scope| scope.take_exception())
    }

    pub fn to_string(&self, record: JsValue) -> Result<String> {
        self.with_scope(|scope| scope.to_string(record))
    }

    pub fn to_bool(&self, record: JsValue) -> Result<bool> {
        self.with_scope(|scope| scope.to_bool(record))
    }

    pub fn to_int(&self, record: JsValue) -> Result<i32> {
        self.with_scope(|scope| scope.to_int(record))
    }

    pub fn to_double(&self, record: JsValue) -> Result<f64> {
        self.with_scope(|scope| scope.to_double(record))
    }

    pub fn stringify_json(&self, record: JsValue) -> Result<String> {
        self.with_scope(|scope| scope.stringify_json(record))
    }

    pub fn parse_json(&self, text: &str) -> JsValue {
        self.with_scope(|scope| scope.parse_json(text))
    }

    pub fn new_undefined(&self) -> JsValue {
        JsValue::UNDEFINED
    }

    pub fn new_null(&self) -> JsValue {
        JsValue::NULL
    }

    pub fn new_true(&self) -> JsValue {
        JsValue::TRUE
    }

    pub fn new_false(&self) -> JsValue {
        JsValue::FALSE
    }

    pub fn new_bool(&self, b: bool) -> JsValue {
        JsValue::from_bool(b)
    }

    pub fn new_int(&self, i: i32) -> JsValue {
        JsValue::from_i32(i)
    }

    pub fn new_double(&self, f: f64) -> JsValue {
        JsValue::from_f64(f)
    }

    pub fn new_string(&self, s: &str) -> JsValue {
        self.with_scope(|scope| scope.new_string(s))
    }

    pub fn new_function<F>(&self, name: &str, arity: usize, callback: F) -> JsValue
    where
        F: Fn(&Scope<'_, '_>, JsValue, &[JsValue]) -> Result<JsValue> + 'static,
    {
        self.with_scope(|scope| scope.new_function(name, arity, callback))
    }

    pub fn set_property_str(&self, name: &str, record: JsValue) -> Result<()> {
        self.with_scope(|scope| scope.set_property_str(name, record))
    }

    pub fn get_property_str(&self, name: &str) -> JsValue {
        self.with_scope(|scope| scope.get_property_str(name))
    }

    pub fn release(&self, record: JsValue) -> Result<()> {
        self.with_scope(|scope| scope.release(record))
    }

    pub fn to_json_value(&self, record: JsValue) -> Result<serde_json::Value> {
        self.with_scope(|scope| scope.to_json_value(record))
    }

    pub fn from_json_value(&self, json: &serde_json::Value) -> JsValue {
        self.with_scope(|scope| scope.from_json_value(json))
    }

    pub fn type_of(&self, record: JsValue) -> Result<&'static str> {
        self.with_scope(|scope| scope.type_of(record))
    }

    /// Number of engine-heap values currently held for the caller
    pub fn live_values(&self) -> usize {
        self.shared.values.borrow().len()
    }

    /// Guard `record` so it is released when the guard drops
    pub fn scoped(&self, record: JsValue) -> ScopedValue<'_> {
        ScopedValue {
            engine: self,
            record: Some(record),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let held = self.live_values();
        if held > 0 {
            debug!("releasing {} values still held at handle free", held);
        }
        self.shared.values.borrow_mut().clear();
        self.shared.pending.borrow_mut().take();
        debug!("freeing engine handle");
        // Remaining fields drop in declaration order: context before runtime
    }
}

/// A [`JsValue`] released when dropped
pub struct ScopedValue<'e> {
    engine: &'e Engine,
    record: Option<JsValue>,
}

impl ScopedValue<'_> {
    /// Give up the guard and hand ownership of the record back to the caller
    pub fn into_inner(mut self) -> JsValue {
        self.record.take().unwrap_or(JsValue::UNDEFINED)
    }
}

impl Deref for ScopedValue<'_> {
    type Target = JsValue;

    fn deref(&self) -> &JsValue {
        self.record.as_ref().unwrap_or(&JsValue::UNDEFINED)
    }
}

impl Drop for ScopedValue<'_> {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            if let Err(e) = self.engine.release(record) {
                trace!("scoped value already released: {}", e);
            }
        }
    }
}
