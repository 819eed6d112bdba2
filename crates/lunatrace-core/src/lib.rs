//! lunatrace core types: values, functions, the arena heap, tables and
//! register windows.

pub mod error;
pub mod gc;
pub mod object;
pub mod register;
pub mod table;
pub mod value;

pub use error::NativeError;
pub use gc::{GcHeap, GcIdx, LuaClosure, NativeContext, NativeFunction, UpVal, UpValLocation, Userdata};
pub use object::ValueKind;
pub use register::{RegisterWindow, Varargs};
pub use table::Table;
pub use value::{Function, ThreadId, Value};
