//! The instrumented Lua environment.
//!
//! The real global table is emptied and given `__index` / `__newindex`
//! metamethods; every global value lives in a backing table kept in the Lua
//! registry. That makes every global read and write observable, which is how
//! undefined reads, definitions, cross-file uses and overrides are recorded.

use crate::session::AnalysisSession;
use crate::unknown::{empty_iteration, is_unknown, Unknown};
use crate::watchdog::{Watchdog, TIMEOUT_MESSAGE};
use crate::ProbeError;
use modweave_schema::ProbeSettings;
use mlua::{Function, Lua, LuaOptions, MultiValue, StdLib, Table, Value};
use tracing::{debug, trace};

const BACKING_KEY: &str = "modweave.globals";
const MODULES_KEY: &str = "modweave.modules";

/// Base-library functions that reach the filesystem.
const REMOVED_GLOBALS: &[&str] = &["dofile", "loadfile"];

struct Callback {
    event: String,
    file: String,
    function: Function,
    removed: bool,
}

/// Per-run state reachable from the Rust callbacks through the Lua app data.
struct ProbeState {
    session: AnalysisSession,
    current: String,
    callbacks: Vec<Callback>,
    watchdog: Watchdog,
}

fn with_state<R>(lua: &Lua, f: impl FnOnce(&mut ProbeState) -> R) -> Option<R> {
    lua.app_data_mut::<ProbeState>().map(|mut state| f(&mut state))
}

fn key_name(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.to_string_lossy().to_string()),
        _ => None,
    }
}

/// Normalize a `require` argument or a script path into a module name:
/// forward slashes, no `.lua` suffix.
pub fn module_name(raw: &str) -> String {
    let name = raw.trim().replace('\\', "/");
    let name = name.trim_start_matches('/');
    name.strip_suffix(".lua").unwrap_or(name).to_owned()
}

fn describe_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
            describe_error(cause)
        }
        other => other
            .to_string()
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_owned(),
    }
}

fn timeout_error() -> mlua::Error {
    mlua::Error::RuntimeError(TIMEOUT_MESSAGE.to_owned())
}

fn global_index(lua: &Lua, (_, key): (Value, Value)) -> mlua::Result<Value> {
    let backing: Table = lua.named_registry_value(BACKING_KEY)?;
    let value: Value = backing.raw_get(key.clone())?;
    let Some(name) = key_name(&key) else {
        return Ok(value);
    };
    let missing = matches!(value, Value::Nil);

    let tripped = with_state(lua, |state| {
        if state.watchdog.tripped() {
            return true;
        }
        if missing {
            state.session.record_missing(&state.current, &name);
        } else {
            state.session.record_use(&state.current, &name);
        }
        false
    })
    .unwrap_or(false);
    if tripped {
        return Err(timeout_error());
    }

    if missing {
        trace!("undefined global {name}");
        return Ok(Value::UserData(lua.create_userdata(Unknown::root(&name))?));
    }
    Ok(value)
}

fn global_newindex(lua: &Lua, (_, key, value): (Value, Value, Value)) -> mlua::Result<()> {
    let backing: Table = lua.named_registry_value(BACKING_KEY)?;
    if let Some(name) = key_name(&key) {
        if !matches!(value, Value::Nil) {
            let previous: Value = backing.raw_get(name.as_str())?;
            let replaced_function = matches!(
                (&previous, &value),
                (Value::Function(old), Value::Function(new)) if old != new
            );
            with_state(lua, |state| {
                state
                    .session
                    .record_definition(&state.current, &name, replaced_function);
            });
        }
    }
    backing.raw_set(key, value)
}

/// One stand-in per module name for the whole run. Modules registered by a
/// loaded file return that file's chunk result instead.
fn require(lua: &Lua, name: Value) -> mlua::Result<Value> {
    let module = key_name(&name).map_or_else(|| "?".to_owned(), |n| module_name(&n));
    let modules: Table = lua.named_registry_value(MODULES_KEY)?;
    let cached: Value = modules.raw_get(module.as_str())?;
    if !matches!(cached, Value::Nil) {
        return Ok(cached);
    }
    let stand_in = Unknown::root(&format!("require({module})"));
    let stand_in = Value::UserData(lua.create_userdata(stand_in)?);
    modules.raw_set(module, stand_in.clone())?;
    Ok(stand_in)
}

fn register_module(lua: &Lua, module: &str, value: Value) -> mlua::Result<()> {
    let modules: Table = lua.named_registry_value(MODULES_KEY)?;
    let existing: Value = modules.raw_get(module)?;
    if matches!(existing, Value::Nil) {
        let value = if matches!(value, Value::Nil) {
            Value::Boolean(true)
        } else {
            value
        };
        modules.raw_set(module, value)?;
    }
    Ok(())
}

fn first_function(args: &MultiValue) -> Option<Function> {
    args.iter().find_map(|v| match v {
        Value::Function(f) => Some(f.clone()),
        _ => None,
    })
}

fn event_table(lua: &Lua, name: &str) -> mlua::Result<Table> {
    let event = lua.create_table()?;

    let add_name = name.to_owned();
    let add = lua.create_function(move |lua, args: MultiValue| {
        if let Some(function) = first_function(&args) {
            with_state(lua, |state| {
                let file = state.current.clone();
                state.callbacks.push(Callback {
                    event: add_name.clone(),
                    file,
                    function,
                    removed: false,
                });
            });
        }
        Ok(())
    })?;

    let remove_name = name.to_owned();
    let remove = lua.create_function(move |lua, args: MultiValue| {
        if let Some(function) = first_function(&args) {
            with_state(lua, |state| {
                for callback in state
                    .callbacks
                    .iter_mut()
                    .filter(|c| c.event == remove_name && c.function == function)
                {
                    callback.removed = true;
                }
            });
        }
        Ok(())
    })?;

    event.raw_set("Add", add)?;
    event.raw_set("Remove", remove)?;
    Ok(event)
}

/// `Events.<Name>` tables are created on first access and cached.
fn events_table(lua: &Lua) -> mlua::Result<Table> {
    let events = lua.create_table()?;
    let meta = lua.create_table()?;
    let index = lua.create_function(|lua, (events, key): (Table, Value)| {
        let name = key_name(&key).unwrap_or_else(|| "?".to_owned());
        let event = event_table(lua, &name)?;
        events.raw_set(name, event.clone())?;
        Ok(event)
    })?;
    meta.raw_set("__index", index)?;
    events.set_metatable(Some(meta));
    Ok(events)
}

/// Lua 5.4's `ipairs` follows `__index`, and every index of an `Unknown`
/// is non-nil, so the stock iterator would never stop.
fn guarded_ipairs(lua: &Lua, stock: Function) -> mlua::Result<Function> {
    lua.create_function(move |lua, value: Value| {
        if is_unknown(&value) {
            let (next, state, init) = empty_iteration(lua)?;
            return Ok(MultiValue::from_vec(vec![
                Value::Function(next),
                state,
                init,
            ]));
        }
        stock.call::<MultiValue>(value)
    })
}

fn install_global_proxy(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();
    let backing = lua.create_table()?;

    let mut keys = Vec::new();
    globals.for_each(|key: Value, value: Value| {
        keys.push(key.clone());
        backing.raw_set(key, value)
    })?;
    for key in keys {
        globals.raw_set(key, Value::Nil)?;
    }

    for name in REMOVED_GLOBALS {
        backing.raw_set(*name, Value::Nil)?;
    }
    let stock_ipairs: Function = backing.raw_get("ipairs")?;
    backing.raw_set("ipairs", guarded_ipairs(lua, stock_ipairs)?)?;
    let noop = lua.create_function(|_, _: MultiValue| Ok(()))?;
    backing.raw_set("_G", globals.clone())?;
    backing.raw_set("print", noop.clone())?;
    backing.raw_set("triggerEvent", noop)?;
    backing.raw_set("require", lua.create_function(require)?)?;
    backing.raw_set("Events", events_table(lua)?)?;

    lua.set_named_registry_value(BACKING_KEY, backing)?;
    lua.set_named_registry_value(MODULES_KEY, lua.create_table()?)?;

    let meta = lua.create_table()?;
    meta.raw_set("__index", lua.create_function(global_index)?)?;
    meta.raw_set("__newindex", lua.create_function(global_newindex)?)?;
    globals.set_metatable(Some(meta));
    Ok(())
}

/// A Lua state prepared for probing, plus the watchdog hooked into it.
pub struct Sandbox {
    lua: Lua,
    watchdog: Watchdog,
}

impl Sandbox {
    pub fn new(settings: &ProbeSettings) -> Result<Self, ProbeError> {
        let libs =
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE | StdLib::UTF8;
        let lua = Lua::new_with(libs, LuaOptions::default())?;
        lua.set_memory_limit(settings.memory_limit_mb.saturating_mul(1024 * 1024))?;
        install_global_proxy(&lua)?;

        let watchdog = Watchdog::new(settings.instruction_budget, settings.check_interval);
        watchdog.install(&lua);
        debug!(
            "sandbox ready: budget {} instructions, hook every {}, {} MiB",
            settings.instruction_budget, settings.check_interval, settings.memory_limit_mb
        );
        Ok(Self { lua, watchdog })
    }

    #[inline]
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Hand the session to the Lua state for the duration of a run.
    pub fn begin(&self, session: AnalysisSession) {
        self.lua.set_app_data(ProbeState {
            session,
            current: String::new(),
            callbacks: Vec::new(),
            watchdog: self.watchdog.clone(),
        });
    }

    /// Take the session back. Pending callbacks are dropped.
    pub fn finish(&self) -> AnalysisSession {
        self.lua
            .remove_app_data::<ProbeState>()
            .map(|state| state.session)
            .unwrap_or_default()
    }

    fn set_current(&self, file: &str) {
        with_state(&self.lua, |state| file.clone_into(&mut state.current));
    }

    pub fn record_load_error(&self, file: &str, message: String) {
        with_state(&self.lua, |state| state.session.record_load_error(file, message));
    }

    /// Execute one chunk attributed to `file`. Faults are recorded in the
    /// session; the return value says whether the chunk completed.
    pub fn execute(&self, file: &str, source: &str, module: Option<&str>) -> bool {
        self.set_current(file);
        self.watchdog.arm();
        let result = self
            .lua
            .load(source)
            .set_name(format!("@{file}"))
            .call::<Value>(());

        match result {
            Ok(value) => {
                if let Some(module) = module {
                    if let Err(e) = register_module(&self.lua, module, value) {
                        debug!("could not register module {module}: {e}");
                    }
                }
                with_state(&self.lua, |state| state.session.files_loaded += 1);
                true
            }
            Err(e) => {
                let message = describe_error(&e);
                let timed_out = self.watchdog.tripped();
                debug!("{file}: {message}");
                with_state(&self.lua, |state| {
                    if timed_out {
                        state.session.record_timeout(file, message);
                    } else {
                        state.session.record_load_error(file, message);
                    }
                });
                false
            }
        }
    }

    /// Replay every registered callback, ordered by event name and by
    /// registration within an event. Returns how many ran.
    pub fn run_callbacks(&self) -> usize {
        let mut callbacks =
            with_state(&self.lua, |state| std::mem::take(&mut state.callbacks)).unwrap_or_default();
        callbacks.sort_by(|a, b| a.event.cmp(&b.event));

        let mut ran = 0;
        for callback in callbacks.into_iter().filter(|c| !c.removed) {
            self.set_current(&callback.file);
            self.watchdog.arm();
            let event = callback.event.as_str();
            let args = (
                Unknown::root(&format!("{event}#1")),
                Unknown::root(&format!("{event}#2")),
                Unknown::root(&format!("{event}#3")),
            );
            let result = callback.function.call::<()>(args);
            ran += 1;

            let timed_out = self.watchdog.tripped();
            with_state(&self.lua, |state| {
                state.session.callbacks_run += 1;
                if let Err(e) = &result {
                    let message = describe_error(e);
                    if timed_out {
                        state.session.record_timeout(&callback.file, message);
                    } else {
                        state
                            .session
                            .record_callback_error(&callback.event, &callback.file, message);
                    }
                }
            });
        }
        ran
    }
}
