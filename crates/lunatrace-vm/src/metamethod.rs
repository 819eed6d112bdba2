//! Metamethod names.

use lunatrace_bytecode::OpCode;

/// Metamethods an instruction can trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagMethod {
    Index,
    NewIndex,
    Eq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Unm,
    Len,
    Lt,
    Le,
    Concat,
}

impl TagMethod {
    pub fn name(self) -> &'static str {
        match self {
            TagMethod::Index => "__index",
            TagMethod::NewIndex => "__newindex",
            TagMethod::Eq => "__eq",
            TagMethod::Add => "__add",
            TagMethod::Sub => "__sub",
            TagMethod::Mul => "__mul",
            TagMethod::Div => "__div",
            TagMethod::Mod => "__mod",
            TagMethod::Pow => "__pow",
            TagMethod::Unm => "__unm",
            TagMethod::Len => "__len",
            TagMethod::Lt => "__lt",
            TagMethod::Le => "__le",
            TagMethod::Concat => "__concat",
        }
    }

    /// The metamethod an instruction falls back to, if any.
    pub fn for_opcode(op: OpCode) -> Option<TagMethod> {
        use OpCode::*;
        Some(match op {
            Self_ | GetTabUp | GetTable => TagMethod::Index,
            SetTabUp | SetTable => TagMethod::NewIndex,
            Eq => TagMethod::Eq,
            Add => TagMethod::Add,
            Sub => TagMethod::Sub,
            Mul => TagMethod::Mul,
            Div => TagMethod::Div,
            Mod => TagMethod::Mod,
            Pow => TagMethod::Pow,
            Unm => TagMethod::Unm,
            Len => TagMethod::Len,
            Lt => TagMethod::Lt,
            Le => TagMethod::Le,
            Concat => TagMethod::Concat,
            _ => return None,
        })
    }
}
