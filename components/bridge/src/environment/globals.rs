//! Script globals: `console`, timers and the root `require`, plus the
//! per-frame servicing of timers and inbox messages.

use super::{environment_of, Environment};
use crate::inbox::MessageKind;
use core_types::ErrorKind;
use log::{debug, error, log, warn, Level};
use script_engine::{CallInfo, Engine, JsValue, Thrown, TryCatch};

const CONSOLE_METHODS: [(&str, Level); 5] = [
    ("log", Level::Info),
    ("info", Level::Info),
    ("warn", Level::Warn),
    ("error", Level::Error),
    ("debug", Level::Debug),
];

fn console_line(engine: &Engine, call: &CallInfo) -> String {
    call.args
        .iter()
        .map(|arg| engine.display_string(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Milliseconds from a timer delay argument; missing or invalid delays are 0.
fn delay_of(value: &JsValue) -> u64 {
    match value.as_number() {
        Some(delay) if delay.is_finite() && delay > 0.0 => delay as u64,
        _ => 0,
    }
}

impl Environment {
    pub(crate) fn install_globals(&self) {
        let engine = &self.engine;
        let global = engine.global();

        let console = engine.new_object();
        for (name, level) in CONSOLE_METHODS {
            let function = engine.new_function(name, move |engine, call| {
                log!(target: "script", level, "{}", console_line(engine, call));
                Ok(JsValue::Undefined)
            });
            engine.define(console, name, JsValue::Object(function));
        }
        engine.define(global, "console", JsValue::Object(console));

        for (name, repeat) in [("setTimeout", false), ("setInterval", true)] {
            let weak = self.weak();
            let function = engine.new_function(name, move |engine, call| {
                let env = environment_of(engine, &weak)?;
                env.schedule_timer(call, repeat)
            });
            engine.define(global, name, JsValue::Object(function));
        }
        for name in ["clearTimeout", "clearInterval"] {
            let weak = self.weak();
            let function = engine.new_function(name, move |engine, call| {
                let env = environment_of(engine, &weak)?;
                let cleared = call
                    .arg(0)
                    .as_number()
                    .filter(|id| id.is_finite() && *id >= 1.0)
                    .and_then(|id| env.timers.borrow_mut().clear(id as u32));
                if let Some(callback) = cleared {
                    engine.reset_global(callback);
                }
                Ok(JsValue::Undefined)
            });
            engine.define(global, name, JsValue::Object(function));
        }

        let require = self.new_require_function(None);
        engine.define(global, "require", JsValue::Object(require));
    }

    fn schedule_timer(&self, call: &CallInfo, repeat: bool) -> Result<JsValue, Thrown> {
        let callback = call.arg(0);
        if !self.engine.is_function(&callback) {
            return Err(self
                .engine
                .throw_error(ErrorKind::TypeError, "timer callback must be a function"));
        }
        let global = self.engine.new_global(callback);
        let id = self
            .timers
            .borrow_mut()
            .add(global, delay_of(&call.arg(1)), repeat);
        Ok(JsValue::Number(f64::from(id)))
    }

    /// Fires due timers, earliest first. Exceptions are logged and
    /// swallowed.
    pub(crate) fn invoke_timers(&self) {
        let due = self.timers.borrow_mut().take_due();
        for timer in due {
            if let Some(callback) = self.engine.global_value(timer.callback) {
                let try_catch = TryCatch::new(&self.engine);
                if self.engine.call(&callback, JsValue::Undefined, &[]).is_err() {
                    if let Some(err) = try_catch.exception() {
                        error!("timer {} threw: {}\n{}", timer.id, err, err.stack_trace());
                    }
                }
            }
            if timer.finished {
                self.engine.reset_global(timer.callback);
            }
        }
    }

    /// Delivers inbox messages to the `onmessage`/`onerror` handler of
    /// their target, with `this` set to the target.
    pub(crate) fn dispatch_messages(&self) {
        for message in self.inbox.take() {
            let Some(target) = self.get_object(message.target) else {
                warn!("dropping message for unbound object {}", message.target);
                continue;
            };
            let name = match message.kind {
                MessageKind::Message => "onmessage",
                MessageKind::Error => "onerror",
            };
            let try_catch = TryCatch::new(&self.engine);
            let handler = match self.engine.get(target, name) {
                Ok(handler) if self.engine.is_function(&handler) => handler,
                Ok(_) => {
                    debug!("object {} has no {} handler", message.target, name);
                    continue;
                }
                Err(_) => {
                    if let Some(err) = try_catch.exception() {
                        error!("reading {} of {}: {}", name, message.target, err);
                    }
                    continue;
                }
            };
            let payload = self.engine.from_json(&message.payload);
            if self
                .engine
                .call(&handler, JsValue::Object(target), &[payload])
                .is_err()
            {
                if let Some(err) = try_catch.exception() {
                    error!("{} of {} threw: {}\n{}", name, message.target, err, err.stack_trace());
                }
            }
        }
    }
}
