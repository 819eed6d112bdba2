//! Lua 5.2 instruction words.
//!
//! Layout of a 32-bit word, low bits first: opcode (6), A (8), then either
//! C (9) and B (9), an unsigned Bx (18), a biased signed sBx, or a 26-bit Ax
//! covering everything above the opcode.
//!
//! An RK operand (B or C) refers to the constant pool when its top bit is set.
use std::fmt;

const SIZE_OP: u32 = 6;
const SIZE_A: u32 = 8;
const SIZE_B: u32 = 9;
const SIZE_C: u32 = 9;
const SIZE_BX: u32 = SIZE_B + SIZE_C; // 18
const SIZE_AX: u32 = SIZE_A + SIZE_B + SIZE_C; // 26

const POS_OP: u32 = 0;
const POS_A: u32 = POS_OP + SIZE_OP; // 6
const POS_C: u32 = POS_A + SIZE_A; // 14
const POS_B: u32 = POS_C + SIZE_C; // 23
const POS_BX: u32 = POS_C;
const POS_AX: u32 = POS_A;

const fn mask(n: u32) -> u32 {
    (1 << n) - 1
}

pub const MAX_A: u32 = mask(SIZE_A); // 255
pub const MAX_B: u32 = mask(SIZE_B); // 511
pub const MAX_C: u32 = mask(SIZE_C); // 511
pub const MAX_BX: u32 = mask(SIZE_BX); // 262143
pub const MAX_SBX: i32 = (MAX_BX >> 1) as i32; // 131071
pub const MIN_SBX: i32 = -MAX_SBX;
pub const MAX_AX: u32 = mask(SIZE_AX);

const OFFSET_SBX: i32 = MAX_SBX;

/// Bit set in an RK operand when it names a constant.
pub const BITRK: u32 = 1 << (SIZE_B - 1);

/// Does this RK operand name a constant?
pub fn is_k(x: u32) -> bool {
    x & BITRK != 0
}

/// Constant-pool index of an RK operand.
pub fn index_k(x: u32) -> usize {
    (x & !BITRK) as usize
}

/// Encode a constant index as an RK operand.
pub fn rk_ask(x: u32) -> u32 {
    x | BITRK
}

/// All 40 opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Move = 0,
    LoadK,
    LoadKX,
    LoadBool,
    LoadNil,
    GetUpval,
    GetTabUp,
    GetTable,
    SetTabUp,
    SetUpval,
    SetTable,
    NewTable,
    Self_,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Unm,
    Not,
    Len,
    Concat,
    Jmp,
    Eq,
    Lt,
    Le,
    Test,
    TestSet,
    Call,
    TailCall,
    Return,
    ForLoop,
    ForPrep,
    TForCall,
    TForLoop,
    SetList,
    Closure,
    VarArg,
    ExtraArg,
}

impl OpCode {
    /// Opcode count.
    pub const COUNT: usize = 40;

    /// Every opcode, indexed by its numeric value.
    pub const ALL: [OpCode; Self::COUNT] = {
        use OpCode::*;
        [
            Move, LoadK, LoadKX, LoadBool, LoadNil, GetUpval, GetTabUp, GetTable, SetTabUp,
            SetUpval, SetTable, NewTable, Self_, Add, Sub, Mul, Div, Mod, Pow, Unm, Not, Len,
            Concat, Jmp, Eq, Lt, Le, Test, TestSet, Call, TailCall, Return, ForLoop, ForPrep,
            TForCall, TForLoop, SetList, Closure, VarArg, ExtraArg,
        ]
    };

    /// Decode a raw opcode number.
    pub fn from_u8(val: u8) -> Option<OpCode> {
        Self::ALL.get(val as usize).copied()
    }

    /// Operand layout used by this opcode.
    pub fn format(&self) -> InstructionFormat {
        use InstructionFormat::*;
        use OpCode::*;
        match self {
            ExtraArg => IAx,
            LoadK | LoadKX | Closure => IABx,
            Jmp | ForLoop | ForPrep | TForLoop => IAsBx,
            _ => IABC,
        }
    }

    /// Does this opcode write its A register?
    pub fn test_a_mode(&self) -> bool {
        use OpCode::*;
        !matches!(
            self,
            SetTabUp
                | SetUpval
                | SetTable
                | Jmp
                | Eq
                | Lt
                | Le
                | Test
                | Return
                | TForCall
                | SetList
                | ExtraArg
        )
    }

    /// Mnemonic as printed by the disassembler.
    pub fn name(&self) -> &'static str {
        use OpCode::*;
        match self {
            Move => "MOVE",
            LoadK => "LOADK",
            LoadKX => "LOADKX",
            LoadBool => "LOADBOOL",
            LoadNil => "LOADNIL",
            GetUpval => "GETUPVAL",
            GetTabUp => "GETTABUP",
            GetTable => "GETTABLE",
            SetTabUp => "SETTABUP",
            SetUpval => "SETUPVAL",
            SetTable => "SETTABLE",
            NewTable => "NEWTABLE",
            Self_ => "SELF",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            Pow => "POW",
            Unm => "UNM",
            Not => "NOT",
            Len => "LEN",
            Concat => "CONCAT",
            Jmp => "JMP",
            Eq => "EQ",
            Lt => "LT",
            Le => "LE",
            Test => "TEST",
            TestSet => "TESTSET",
            Call => "CALL",
            TailCall => "TAILCALL",
            Return => "RETURN",
            ForLoop => "FORLOOP",
            ForPrep => "FORPREP",
            TForCall => "TFORCALL",
            TForLoop => "TFORLOOP",
            SetList => "SETLIST",
            Closure => "CLOSURE",
            VarArg => "VARARG",
            ExtraArg => "EXTRAARG",
        }
    }
}

/// Operand layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionFormat {
    IABC,
    IABx,
    IAsBx,
    IAx,
}

/// A 32-bit bytecode instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(pub u32);

impl Instruction {
    /// Encode `op A B C`.
    pub fn abc(op: OpCode, a: u8, b: u16, c: u16) -> Self {
        debug_assert!(b as u32 <= MAX_B, "B out of range: {b}");
        debug_assert!(c as u32 <= MAX_C, "C out of range: {c}");
        let mut i = (op as u32) << POS_OP;
        i |= (a as u32) << POS_A;
        i |= ((b as u32) & MAX_B) << POS_B;
        i |= ((c as u32) & MAX_C) << POS_C;
        Instruction(i)
    }

    /// Encode `op A Bx`.
    pub fn abx(op: OpCode, a: u8, bx: u32) -> Self {
        debug_assert!(bx <= MAX_BX, "Bx out of range: {bx}");
        let mut i = (op as u32) << POS_OP;
        i |= (a as u32) << POS_A;
        i |= (bx & MAX_BX) << POS_BX;
        Instruction(i)
    }

    /// Encode `op A sBx`; the offset is stored biased.
    pub fn asbx(op: OpCode, a: u8, sbx: i32) -> Self {
        debug_assert!(
            (MIN_SBX..=MAX_SBX).contains(&sbx),
            "sBx out of range: {sbx}"
        );
        let bx = (sbx + OFFSET_SBX) as u32;
        Self::abx(op, a, bx)
    }

    /// Encode `op Ax`.
    pub fn ax(op: OpCode, ax: u32) -> Self {
        debug_assert!(ax <= MAX_AX, "Ax out of range: {ax}");
        let mut i = (op as u32) << POS_OP;
        i |= (ax & MAX_AX) << POS_AX;
        Instruction(i)
    }

    /// `None` for an undefined opcode number.
    pub fn try_opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(((self.0 >> POS_OP) & mask(SIZE_OP)) as u8)
    }

    /// Undefined opcode numbers decode as `EXTRAARG`, which
    /// has no effect on any register.
    pub fn opcode(&self) -> OpCode {
        self.try_opcode().unwrap_or(OpCode::ExtraArg)
    }

    pub fn a(&self) -> u32 {
        (self.0 >> POS_A) & mask(SIZE_A)
    }

    pub fn b(&self) -> u32 {
        (self.0 >> POS_B) & mask(SIZE_B)
    }

    pub fn c(&self) -> u32 {
        (self.0 >> POS_C) & mask(SIZE_C)
    }

    pub fn bx(&self) -> u32 {
        (self.0 >> POS_BX) & mask(SIZE_BX)
    }

    /// Signed jump offset.
    pub fn sbx(&self) -> i32 {
        self.bx() as i32 - OFFSET_SBX
    }

    pub fn ax_field(&self) -> u32 {
        (self.0 >> POS_AX) & mask(SIZE_AX)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(op) = self.try_opcode() else {
            return write!(f, "<invalid {:#010x}>", self.0);
        };
        write!(f, "{}", op.name())?;
        match op.format() {
            InstructionFormat::IABC => {
                write!(f, " A={} B={} C={}", self.a(), self.b(), self.c())
            }
            InstructionFormat::IABx => write!(f, " A={} Bx={}", self.a(), self.bx()),
            InstructionFormat::IAsBx => write!(f, " A={} sBx={}", self.a(), self.sbx()),
            InstructionFormat::IAx => write!(f, " Ax={}", self.ax_field()),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
