//! Execution hooks: mask parsing, per-thread hook state and the decision of
//! which events fire for a given call, instruction or return.

use crate::thread::LuaThread;
use lunatrace_core::{Function, Value};
use std::fmt;

/// Which events a hook listens to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HookMask {
    pub call: bool,
    pub line: bool,
    pub ret: bool,
}

impl HookMask {
    /// Parse a mask string. Characters other than `c`, `l` and `r` are ignored.
    pub fn parse(mask: &str) -> Self {
        let mut m = HookMask::default();
        for ch in mask.chars() {
            match ch {
                'c' => m.call = true,
                'l' => m.line = true,
                'r' => m.ret = true,
                _ => {}
            }
        }
        m
    }

    pub fn is_empty(&self) -> bool {
        !(self.call || self.line || self.ret)
    }
}

impl fmt::Display for HookMask {
    /// Always in the order call, line, return.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.call {
            f.write_str("c")?;
        }
        if self.line {
            f.write_str("l")?;
        }
        if self.ret {
            f.write_str("r")?;
        }
        Ok(())
    }
}

/// An event delivered to a hook function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookEvent {
    Call,
    Return,
    Line(u32),
    Count,
}

impl HookEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HookEvent::Call => "call",
            HookEvent::Return => "return",
            HookEvent::Line(_) => "line",
            HookEvent::Count => "count",
        }
    }

    /// Arguments the hook function is called with.
    pub fn args(&self) -> [Value; 2] {
        let line = match self {
            HookEvent::Line(line) => Value::Integer(i64::from(*line)),
            _ => Value::Nil,
        };
        [Value::from(self.name()), line]
    }
}

/// Hook configuration and bookkeeping for one thread.
#[derive(Clone, Debug, Default)]
pub struct HookState {
    pub func: Option<Function>,
    pub mask: HookMask,
    /// Count-event threshold; 0 disables count events.
    pub count: u32,
    /// Instructions executed while a hook was installed.
    pub counter: u64,
    /// True while the hook function runs.
    pub in_hook: bool,
    /// Line seen at the previous instruction.
    pub last_line: Option<u32>,
}

impl HookState {
    /// Replace the whole configuration.
    pub fn install(&mut self, func: Option<Function>, mask: HookMask, count: u32) {
        self.func = func;
        self.mask = mask;
        self.count = count;
        self.counter = 0;
        self.last_line = None;
    }

    pub fn info(&self) -> HookInfo {
        HookInfo {
            func: self.func.clone(),
            mask: self.mask.to_string(),
            count: self.count,
        }
    }

    fn armed(&self) -> Option<&Function> {
        if self.in_hook {
            None
        } else {
            self.func.as_ref()
        }
    }

    /// Events raised by entering a call.
    pub fn call_events(&self) -> Option<PendingHooks> {
        let func = self.armed()?;
        self.mask
            .call
            .then(|| PendingHooks::single(func.clone(), HookEvent::Call))
    }

    /// Events raised by leaving a call.
    pub fn return_events(&self) -> Option<PendingHooks> {
        let func = self.armed()?;
        self.mask
            .ret
            .then(|| PendingHooks::single(func.clone(), HookEvent::Return))
    }

    /// Events raised by executing one instruction whose line is `line`.
    /// Count is evaluated before line.
    pub fn instruction_events(&mut self, line: Option<u32>) -> Option<PendingHooks> {
        let func = self.armed()?.clone();
        let mut pending = PendingHooks {
            func,
            events: Vec::new(),
        };
        if self.count > 0 {
            self.counter += 1;
            if self.counter % u64::from(self.count) == 0 {
                pending.events.push(HookEvent::Count);
            }
        }
        if self.mask.line {
            let previous = std::mem::replace(&mut self.last_line, line);
            if let Some(new_line) = line {
                if previous != line {
                    pending.events.push(HookEvent::Line(new_line));
                }
            }
        }
        (!pending.events.is_empty()).then_some(pending)
    }
}

/// Result of `gethook`.
#[derive(Clone, Debug, PartialEq)]
pub struct HookInfo {
    pub func: Option<Function>,
    pub mask: String,
    pub count: u32,
}

/// Hook calls decided under the thread lock, run after it is released.
#[derive(Clone, Debug)]
pub struct PendingHooks {
    pub func: Function,
    pub events: Vec<HookEvent>,
}

impl PendingHooks {
    fn single(func: Function, event: HookEvent) -> Self {
        PendingHooks {
            func,
            events: vec![event],
        }
    }
}

/// Holds a thread's re-entrancy flag for the duration of a hook call and
/// clears it on every exit path.
pub struct HookGuard<'a> {
    thread: &'a LuaThread,
}

impl<'a> HookGuard<'a> {
    /// Set the flag. Returns `None` if the thread is already inside a hook.
    pub fn enter(thread: &'a LuaThread) -> Option<Self> {
        let mut state = thread.lock();
        if state.hook.in_hook {
            return None;
        }
        state.hook.in_hook = true;
        Some(HookGuard { thread })
    }
}

impl Drop for HookGuard<'_> {
    fn drop(&mut self) {
        self.thread.lock().hook.in_hook = false;
    }
}
