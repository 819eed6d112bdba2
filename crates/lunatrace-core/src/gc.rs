//! Arena heap with typed indices, plus the function and upvalue objects.

use crate::error::NativeError;
use crate::register::RegisterWindow;
use crate::table::Table;
use crate::value::{ThreadId, Value};
use lunatrace_bytecode::Proto;
use parking_lot::RwLock;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed index into an arena in the GcHeap.
pub struct GcIdx<T>(pub u32, pub PhantomData<T>);

impl<T> GcIdx<T> {
    pub fn new(index: u32) -> Self {
        GcIdx(index, PhantomData)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

impl<T> Clone for GcIdx<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for GcIdx<T> {}

impl<T> PartialEq for GcIdx<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<T> Eq for GcIdx<T> {}

impl<T> std::hash::Hash for GcIdx<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> fmt::Debug for GcIdx<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A script closure: prototype plus captured upvalue cells.
pub struct LuaClosure {
    pub proto: Arc<Proto>,
    /// Upvalue handles. Behind a lock so `upvaluejoin` can re-point a slot.
    upvalues: RwLock<Vec<GcIdx<UpVal>>>,
}

impl LuaClosure {
    pub fn new(proto: Arc<Proto>, upvalues: Vec<GcIdx<UpVal>>) -> Arc<Self> {
        Arc::new(LuaClosure {
            proto,
            upvalues: RwLock::new(upvalues),
        })
    }

    /// Cell behind upvalue slot `idx` (0-based).
    pub fn upvalue(&self, idx: usize) -> Option<GcIdx<UpVal>> {
        self.upvalues.read().get(idx).copied()
    }

    /// Re-point upvalue slot `idx` at `cell`. Returns false if out of range.
    pub fn set_upvalue(&self, idx: usize, cell: GcIdx<UpVal>) -> bool {
        match self.upvalues.write().get_mut(idx) {
            Some(slot) => {
                *slot = cell;
                true
            }
            None => false,
        }
    }

    pub fn num_upvalues(&self) -> usize {
        self.upvalues.read().len()
    }
}

/// Signature shared by every native function.
pub type NativeFn =
    Arc<dyn Fn(&mut NativeContext<'_>) -> Result<Vec<Value>, NativeError> + Send + Sync>;

/// A native (Rust) function callable from scripts.
pub struct NativeFunction {
    pub name: Arc<str>,
    pub func: NativeFn,
}

impl NativeFunction {
    pub fn new<F>(name: &str, func: F) -> Arc<Self>
    where
        F: Fn(&mut NativeContext<'_>) -> Result<Vec<Value>, NativeError> + Send + Sync + 'static,
    {
        Arc::new(NativeFunction {
            name: Arc::from(name),
            func: Arc::new(func),
        })
    }

    pub fn call(&self, ctx: &mut NativeContext<'_>) -> Result<Vec<Value>, NativeError> {
        (self.func)(ctx)
    }
}

/// Context passed to native functions.
pub struct NativeContext<'a> {
    pub args: &'a [Value],
    /// The thread the native was called on.
    pub thread: ThreadId,
}

impl<'a> NativeContext<'a> {
    pub fn new(args: &'a [Value], thread: ThreadId) -> Self {
        NativeContext { args, thread }
    }

    /// Argument `n` (0-based), nil when absent.
    pub fn arg(&self, n: usize) -> Value {
        self.args.get(n).cloned().unwrap_or_default()
    }
}

/// An upvalue: either open (aliasing a live register) or closed (holding a value).
#[derive(Debug)]
pub struct UpVal {
    pub location: UpValLocation,
}

/// Where an upvalue's value lives.
#[derive(Debug)]
pub enum UpValLocation {
    /// Aliases register `slot` of an active call's register window.
    Open { window: RegisterWindow, slot: usize },
    /// Value has been captured (the owning call returned).
    Closed(Value),
}

impl UpVal {
    pub fn get(&self) -> Value {
        match &self.location {
            UpValLocation::Open { window, slot } => window.get(*slot),
            UpValLocation::Closed(v) => v.clone(),
        }
    }

    pub fn set(&mut self, value: Value) {
        match &mut self.location {
            UpValLocation::Open { window, slot } => {
                window.set(*slot, value);
            }
            UpValLocation::Closed(v) => *v = value,
        }
    }

    /// Copy the aliased register into the cell.
    pub fn close(&mut self) {
        if let UpValLocation::Open { window, slot } = &self.location {
            let value = window.get(*slot);
            self.location = UpValLocation::Closed(value);
        }
    }
}

/// A full userdata: identity, user value, and its own metatable.
#[derive(Debug, Default)]
pub struct Userdata {
    pub user_value: Value,
    pub metatable: Option<GcIdx<Table>>,
}

/// Arena-based heap.
pub struct GcHeap {
    pub tables: Vec<Table>,
    pub upvals: Vec<UpVal>,
    pub userdata: Vec<Userdata>,
}

impl GcHeap {
    pub fn new() -> Self {
        GcHeap {
            tables: Vec::new(),
            upvals: Vec::new(),
            userdata: Vec::new(),
        }
    }

    pub fn alloc_table(&mut self) -> GcIdx<Table> {
        let idx = self.tables.len() as u32;
        self.tables.push(Table::new());
        GcIdx::new(idx)
    }

    pub fn get_table(&self, idx: GcIdx<Table>) -> Option<&Table> {
        self.tables.get(idx.0 as usize)
    }

    pub fn get_table_mut(&mut self, idx: GcIdx<Table>) -> Option<&mut Table> {
        self.tables.get_mut(idx.0 as usize)
    }

    pub fn alloc_upval(&mut self, location: UpValLocation) -> GcIdx<UpVal> {
        let idx = self.upvals.len() as u32;
        self.upvals.push(UpVal { location });
        GcIdx::new(idx)
    }

    /// Allocate a closed cell holding `value`.
    pub fn alloc_closed_upval(&mut self, value: Value) -> GcIdx<UpVal> {
        self.alloc_upval(UpValLocation::Closed(value))
    }

    pub fn get_upval(&self, idx: GcIdx<UpVal>) -> Option<&UpVal> {
        self.upvals.get(idx.0 as usize)
    }

    pub fn get_upval_mut(&mut self, idx: GcIdx<UpVal>) -> Option<&mut UpVal> {
        self.upvals.get_mut(idx.0 as usize)
    }

    pub fn alloc_userdata(&mut self) -> GcIdx<Userdata> {
        let idx = self.userdata.len() as u32;
        self.userdata.push(Userdata::default());
        GcIdx::new(idx)
    }

    pub fn get_userdata(&self, idx: GcIdx<Userdata>) -> Option<&Userdata> {
        self.userdata.get(idx.0 as usize)
    }

    pub fn get_userdata_mut(&mut self, idx: GcIdx<Userdata>) -> Option<&mut Userdata> {
        self.userdata.get_mut(idx.0 as usize)
    }
}

impl Default for GcHeap {
    fn default() -> Self {
        Self::new()
    }
}
