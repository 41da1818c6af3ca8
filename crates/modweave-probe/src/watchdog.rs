use mlua::{HookTriggers, Lua, VmState};
use std::cell::Cell;
use std::rc::Rc;

pub(crate) const TIMEOUT_MESSAGE: &str = "instruction budget exhausted";

/// Instruction-count guard for one unit of execution (a file load or a
/// callback). The counter is shared by reference with a VM hook that fires
/// every `interval` instructions and raises a Lua error once the budget is
/// spent. [`Watchdog::arm`] resets it before each unit.
///
/// A script can swallow the error with `pcall`; the sandbox's global proxy
/// re-raises it on the next global access while the watchdog stays tripped.
#[derive(Debug, Clone)]
pub struct Watchdog {
    budget: u64,
    interval: u32,
    used: Rc<Cell<u64>>,
    tripped: Rc<Cell<bool>>,
}

impl Watchdog {
    pub fn new(budget: u64, interval: u32) -> Self {
        Self {
            budget,
            interval: interval.max(1),
            used: Rc::new(Cell::new(0)),
            tripped: Rc::new(Cell::new(false)),
        }
    }

    pub fn install(&self, lua: &Lua) {
        let budget = self.budget;
        let step = u64::from(self.interval);
        let used = Rc::clone(&self.used);
        let tripped = Rc::clone(&self.tripped);
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(self.interval),
            move |_, _| {
                let spent = used.get().saturating_add(step);
                used.set(spent);
                if spent > budget {
                    tripped.set(true);
                    return Err(mlua::Error::RuntimeError(TIMEOUT_MESSAGE.to_owned()));
                }
                Ok(VmState::Continue)
            },
        );
    }

    pub fn arm(&self) {
        self.used.set(0);
        self.tripped.set(false);
    }

    /// Whether the budget ran out since the last [`Watchdog::arm`].
    pub fn tripped(&self) -> bool {
        self.tripped.get()
    }
}
