//! Runs logic bodies on an embedded QuickJS engine.
//!
//! Every run gets a fresh runtime holding only the ECMAScript built-ins, the
//! utility surface from `prelude.js` and the globals the host defines. The
//! runtime is dropped when the run ends, so nothing leaks between runs.

use crate::error::{Result, ScriptError};
use crate::guard::check_source;
use crate::syntax::return_trailing_expression;
use canvascore::Value;
use rquickjs::{CatchResultExt, Context, Function, Object, Promise, Runtime, Undefined};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PRELUDE: &str = include_str!("prelude.js");

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Wall-clock limit for the whole body, promise jobs included.
    pub timeout: Option<Duration>,
    /// Heap available to the engine, in bytes.
    pub memory_limit: usize,
    /// Native stack the engine may use, in bytes.
    pub max_stack_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout: None,
            memory_limit: 64 * 1024 * 1024,
            max_stack_size: 512 * 1024,
        }
    }
}

/// Result of one run plus everything the body logged through `console`.
#[derive(Debug)]
pub struct Outcome {
    pub result: Result<Value>,
    pub logs: Vec<String>,
}

type InterruptCheck = Box<dyn Fn() -> bool + Send>;

/// A configured sandbox. Globals are copied into each run by value.
pub struct Sandbox {
    limits: Limits,
    globals: Vec<(String, Value)>,
    hidden: Vec<String>,
    interrupt: Option<InterruptCheck>,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

#[derive(Default)]
struct Flags {
    timed_out: AtomicBool,
    interrupted: AtomicBool,
}

impl Sandbox {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            globals: Vec::new(),
            hidden: Vec::new(),
            interrupt: None,
        }
    }

    /// Bind `name` to a copy of `value` in every run.
    pub fn define_global(&mut self, name: &str, value: &Value) {
        self.globals.push((name.to_string(), value.clone()));
    }

    /// Bind `name` to `undefined`, shadowing anything the engine provides.
    pub fn hide_global(&mut self, name: &str) {
        self.hidden.push(name.to_string());
    }

    /// Stop the body as soon as `check` returns true.
    pub fn interrupt_when(&mut self, check: impl Fn() -> bool + Send + 'static) {
        self.interrupt = Some(Box::new(check));
    }

    /// Run `source` to completion. A top-level `return` gives the result;
    /// otherwise a trailing expression statement does.
    pub fn run(self, source: &str) -> Outcome {
        let logs = Rc::new(RefCell::new(Vec::new()));
        let result = self.execute(source, &logs);
        let logs = logs.take();
        Outcome { result, logs }
    }

    fn execute(self, source: &str, logs: &Rc<RefCell<Vec<String>>>) -> Result<Value> {
        check_source(source)?;
        let body = return_trailing_expression(source).unwrap_or_else(|| source.to_string());
        let wrapped = format!("(async () => {{\n{}\n}})()", body);

        let runtime = Runtime::new()?;
        runtime.set_memory_limit(self.limits.memory_limit);
        runtime.set_max_stack_size(self.limits.max_stack_size);

        let flags = Arc::new(Flags::default());
        let deadline = self.limits.timeout.map(|timeout| Instant::now() + timeout);
        let interrupt = self.interrupt;
        let handler_flags = flags.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                handler_flags.timed_out.store(true, Ordering::Relaxed);
                return true;
            }
            if interrupt.as_ref().is_some_and(|check| check()) {
                handler_flags.interrupted.store(true, Ordering::Relaxed);
                return true;
            }
            false
        })));

        let context = Context::full(&runtime)?;
        let limits = self.limits;
        let outcome = context.with(|ctx| -> Result<Value> {
            let engine_failure = |message: String| {
                if flags.timed_out.load(Ordering::Relaxed) {
                    let millis = limits.timeout.map_or(0, |t| t.as_millis() as u64);
                    ScriptError::TimedOut(millis)
                } else if flags.interrupted.load(Ordering::Relaxed) {
                    ScriptError::Interrupted
                } else {
                    ScriptError::Engine(message)
                }
            };

            let sink = logs.clone();
            let emit = Function::new(ctx.clone(), move |line: String| {
                sink.borrow_mut().push(line);
            })?;
            let install: Function = ctx
                .eval(PRELUDE)
                .catch(&ctx)
                .map_err(|e| engine_failure(e.to_string()))?;
            let run: Function = install
                .call((emit,))
                .catch(&ctx)
                .map_err(|e| engine_failure(e.to_string()))?;

            let globals = ctx.globals();
            for (name, value) in &self.globals {
                let copied = ctx
                    .json_parse(value.to_json().to_string())
                    .catch(&ctx)
                    .map_err(|e| engine_failure(e.to_string()))?;
                globals.set(name.as_str(), copied)?;
            }
            for name in &self.hidden {
                globals.set(name.as_str(), Undefined)?;
            }

            let settled: Promise = run
                .call((wrapped,))
                .catch(&ctx)
                .map_err(|e| engine_failure(e.to_string()))?;
            let settled: Object = settled
                .finish()
                .catch(&ctx)
                .map_err(|e| engine_failure(e.to_string()))?;

            if flags.timed_out.load(Ordering::Relaxed) || flags.interrupted.load(Ordering::Relaxed) {
                return Err(engine_failure(String::new()));
            }
            if settled.get::<_, bool>("ok")? {
                let json: String = settled.get("json")?;
                let data: serde_json::Value = serde_json::from_str(&json)
                    .map_err(|e| ScriptError::Unrepresentable(e.to_string()))?;
                return Ok(Value::from(data));
            }

            let message: String = settled.get("error")?;
            if settled.get::<_, Option<bool>>("unrepresentable")?.unwrap_or(false) {
                return Err(ScriptError::Unrepresentable(message));
            }
            // uncatchable interrupts surface here as ordinary rejections
            if flags.timed_out.load(Ordering::Relaxed) || flags.interrupted.load(Ordering::Relaxed) {
                return Err(engine_failure(message));
            }
            Err(ScriptError::Thrown(message))
        });
        tracing::trace!(target: "canvasscript", ok = outcome.is_ok(), "logic body finished");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_is_rebuilt_per_run() {
        let mut sandbox = Sandbox::default();
        sandbox.define_global("seed", &Value::Number(1.0));
        let first = sandbox.run("globalThis.leak = 1; return seed");
        assert_eq!(first.result, Ok(Value::Number(1.0)));

        let second = Sandbox::default().run("return typeof leak");
        assert_eq!(second.result, Ok(Value::from("undefined")));
    }

    #[test]
    fn globals_are_copies() {
        let context = Value::object([("A", Value::object([("data", Value::Number(1.0))]))]);
        let mut sandbox = Sandbox::default();
        sandbox.define_global("$node", &context);
        let outcome = sandbox.run("$node.A.data = 2; return $node.A.data");
        assert_eq!(outcome.result, Ok(Value::Number(2.0)));
        assert_eq!(context.get("A").and_then(|a| a.get("data")), Some(&Value::Number(1.0)));
    }

    #[test]
    fn interrupt_check_stops_the_body() {
        let mut sandbox = Sandbox::default();
        sandbox.interrupt_when(|| true);
        let outcome = sandbox.run("while (true) {}");
        assert_eq!(outcome.result, Err(ScriptError::Interrupted));
    }
}
