//! Static function metadata the debug layer reads: code, constants, line
//! table, local scopes and upvalue names.

use crate::opcode::Instruction;
use std::fmt;
use std::sync::Arc;

/// Source name reported for prototypes compiled without one.
pub const UNKNOWN_SOURCE: &str = "=?";

/// Constant pool entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Arc<str>),
}

impl Constant {
    /// The text of a string constant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Nil => write!(f, "nil"),
            Constant::Boolean(b) => write!(f, "{b}"),
            Constant::Integer(i) => write!(f, "{i}"),
            Constant::Float(x) => write!(f, "{x}"),
            Constant::String(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Static upvalue descriptor.
#[derive(Clone, Debug)]
pub struct UpvalDesc {
    /// Debug name; stripped chunks carry none.
    pub name: Option<Arc<str>>,
    /// Captured from an enclosing register rather than an enclosing upvalue.
    pub in_stack: bool,
    /// Register or parent upvalue slot, depending on `in_stack`.
    pub index: u8,
}

/// Scope of a named register.
#[derive(Clone, Debug)]
pub struct LocalVar {
    pub name: Arc<str>,
    /// Inclusive.
    pub start_pc: u32,
    /// Exclusive.
    pub end_pc: u32,
}

/// Function prototype as produced by the compiler.
#[derive(Clone, Debug)]
pub struct Proto {
    pub code: Vec<Instruction>,
    pub constants: Vec<Constant>,
    /// Children, referenced by `CLOSURE`.
    pub protos: Vec<Arc<Proto>>,
    pub upvalues: Vec<UpvalDesc>,
    pub num_params: u8,
    pub is_vararg: bool,
    /// Register window size.
    pub max_stack_size: u8,
    /// Chunk name in `=name` / `@file` / literal form.
    pub source: Option<Arc<str>>,
    /// Line where the function definition starts; 0 for a main chunk.
    pub line_defined: u32,
    /// Line where the function definition ends.
    pub last_line_defined: u32,

    /// Absolute source line per instruction (0 = unknown).
    pub line_info: Vec<u32>,
    /// Local variable debug info, ordered by register.
    pub local_vars: Vec<LocalVar>,
}

impl Proto {
    pub fn new() -> Self {
        Proto {
            code: Vec::new(),
            constants: Vec::new(),
            protos: Vec::new(),
            upvalues: Vec::new(),
            num_params: 0,
            is_vararg: false,
            max_stack_size: 2,
            source: None,
            line_defined: 0,
            last_line_defined: 0,
            line_info: Vec::new(),
            local_vars: Vec::new(),
        }
    }

    /// Create an empty prototype for the given source name.
    pub fn with_source(source: &str) -> Self {
        Proto {
            source: Some(Arc::from(source)),
            ..Proto::new()
        }
    }

    /// Append `inst` attributed to `line`; returns its pc.
    pub fn emit(&mut self, inst: Instruction, line: u32) -> usize {
        let pc = self.code.len();
        self.code.push(inst);
        self.line_info.push(line);
        pc
    }

    /// Intern a constant and return its pool index.
    pub fn add_constant(&mut self, k: Constant) -> usize {
        if let Some(i) = self.constants.iter().position(|c| same_constant(c, &k)) {
            return i;
        }
        self.constants.push(k);
        self.constants.len() - 1
    }

    pub fn add_string(&mut self, s: &str) -> usize {
        self.add_constant(Constant::String(Arc::from(s)))
    }

    /// Declare a local variable alive over `[start_pc, end_pc)`.
    pub fn add_local(&mut self, name: &str, start_pc: u32, end_pc: u32) {
        self.local_vars.push(LocalVar {
            name: Arc::from(name),
            start_pc,
            end_pc,
        });
    }

    /// Declare an upvalue, returning its index.
    pub fn add_upvalue(&mut self, name: Option<&str>, in_stack: bool, index: u8) -> usize {
        self.upvalues.push(UpvalDesc {
            name: name.map(Arc::from),
            in_stack,
            index,
        });
        self.upvalues.len() - 1
    }

    /// Source line of `pc`, `None` when stripped or out of range.
    pub fn get_line(&self, pc: usize) -> Option<u32> {
        match self.line_info.get(pc) {
            Some(&line) if line > 0 => Some(line),
            _ => None,
        }
    }

    /// Name of the `n`-th (1-based) local variable active at `pc`.
    pub fn local_name(&self, n: usize, pc: usize) -> Option<&Arc<str>> {
        if n == 0 {
            return None;
        }
        self.local_vars
            .iter()
            .take_while(|var| var.start_pc as usize <= pc)
            .filter(|var| pc < var.end_pc as usize)
            .nth(n - 1)
            .map(|var| &var.name)
    }

    /// Number of local variables active at `pc`.
    pub fn active_locals(&self, pc: usize) -> usize {
        self.local_vars
            .iter()
            .take_while(|var| var.start_pc as usize <= pc)
            .filter(|var| pc < var.end_pc as usize)
            .count()
    }

    /// Static name of upvalue `idx` (0-based).
    pub fn upvalue_name(&self, idx: usize) -> Option<&Arc<str>> {
        self.upvalues.get(idx).and_then(|u| u.name.as_ref())
    }

    /// The raw source name.
    pub fn source_name(&self) -> &str {
        self.source.as_deref().unwrap_or(UNKNOWN_SOURCE)
    }

    /// Is this the body of a main chunk?
    pub fn is_main(&self) -> bool {
        self.line_defined == 0
    }

    pub fn code_len(&self) -> usize {
        self.code.len()
    }
}

impl Default for Proto {
    fn default() -> Self {
        Self::new()
    }
}

/// Floats compare by bit pattern so NaN constants share a slot.
fn same_constant(a: &Constant, b: &Constant) -> bool {
    match (a, b) {
        (Constant::Float(x), Constant::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}
