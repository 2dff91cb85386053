//! Corvid VM instruction set as seen by the finalization pipeline.
//!
//! Every instruction is a variant of one closed enum. The operand shape,
//! encoded size and stack effect are all derived from the variant value, so
//! a rewrite that wants to change any of them has to build a new variant and
//! overwrite the old one as a whole.
//!
//! # Encoding
//!
//! The encoded stream is an array of 32-bit code units. The first unit of
//! every instruction is laid out as:
//! ```text
//! ┌────────────┬────────────┬─────────────────────────┐
//! │   Opcode   │    zero    │      first operand      │
//! │  (8 bits)  │  (8 bits)  │        (16 bits)        │
//! └────────────┴────────────┴─────────────────────────┘
//! ```
//! The remaining units depend only on the [`OperandShape`].
//!
//! # Stack Discipline
//!
//! Stack effects are counted in code units. A pointer occupies
//! [`PTR_SIZE`] units.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Frame slot operand. Negative slots are parameters, positive are locals.
pub type Var = i16;

/// Index of a global variable.
pub type GlobalId = u16;

/// Number of code units a pointer occupies on the VM stack.
pub const PTR_SIZE: i32 = 1;

/// Symbolic jump target, resolved into a relative distance by the label resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Destination of a jump: symbolic before label resolution, a signed
/// code-unit distance (relative to the end of the jump) afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpTarget {
    Label(LabelId),
    Offset(i32),
}

impl fmt::Display for JumpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpTarget::Label(label) => write!(f, "{}", label),
            JumpTarget::Offset(offset) => write!(f, "{:+}", offset),
        }
    }
}

/// Source location carried by a line marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Condition tested by `Test` and `Branch` against the value register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Zero,
    NotZero,
    Negative,
    NotNegative,
    Positive,
    NotPositive,
}

impl Condition {
    pub const fn negate(self) -> Self {
        match self {
            Condition::Zero => Condition::NotZero,
            Condition::NotZero => Condition::Zero,
            Condition::Negative => Condition::NotNegative,
            Condition::NotNegative => Condition::Negative,
            Condition::Positive => Condition::NotPositive,
            Condition::NotPositive => Condition::Positive,
        }
    }

    /// Evaluates the condition against a register value.
    pub const fn holds(self, value: i32) -> bool {
        match self {
            Condition::Zero => value == 0,
            Condition::NotZero => value != 0,
            Condition::Negative => value < 0,
            Condition::NotNegative => value >= 0,
            Condition::Positive => value > 0,
            Condition::NotPositive => value <= 0,
        }
    }
}

/// Three-slot arithmetic and bitwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    AddI,
    SubI,
    MulI,
    DivI,
    ModI,
    AddF,
    SubF,
    MulF,
    DivF,
    ModF,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
}

impl ArithOp {
    /// The slot+constant form of this operation, if the VM has one.
    pub const fn immediate_form(self) -> Option<ImmOp> {
        match self {
            ArithOp::AddI => Some(ImmOp::AddI),
            ArithOp::SubI => Some(ImmOp::SubI),
            ArithOp::MulI => Some(ImmOp::MulI),
            ArithOp::AddF => Some(ImmOp::AddF),
            ArithOp::SubF => Some(ImmOp::SubF),
            ArithOp::MulF => Some(ImmOp::MulF),
            _ => None,
        }
    }

    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            ArithOp::AddI
                | ArithOp::MulI
                | ArithOp::AddF
                | ArithOp::MulF
                | ArithOp::And
                | ArithOp::Or
                | ArithOp::Xor
        )
    }
}

/// Arithmetic operations with a constant right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmOp {
    AddI,
    SubI,
    MulI,
    AddF,
    SubF,
    MulF,
}

/// In-place single-slot operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    NegI,
    NegF,
    BitNot,
}

/// Operand type of a comparison between two slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpKind {
    Int,
    Uint,
    Float,
    Double,
}

impl CmpKind {
    /// The slot+constant form of this comparison, if the VM has one.
    pub const fn immediate_form(self) -> Option<ImmCmpKind> {
        match self {
            CmpKind::Int => Some(ImmCmpKind::Int),
            CmpKind::Uint => Some(ImmCmpKind::Uint),
            CmpKind::Float => Some(ImmCmpKind::Float),
            CmpKind::Double => None,
        }
    }
}

/// Operand type of a comparison against a 32-bit constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmCmpKind {
    Int,
    Uint,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Script,
    System,
    Bound,
    Interface,
}

/// Layout category of an instruction's operands.
///
/// The shape alone decides how many code units an instruction occupies and
/// how its operands are packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandShape {
    /// Zero-size pseudo instruction.
    Marker,
    NoArg,
    Word,
    WriteVar,
    ReadVar,
    Dword,
    ReadVarDword,
    Qword,
    DwordDword,
    WriteReadRead,
    WriteVarQword,
    WriteRead,
    WriteVarDword,
    WriteReadDword,
    ReadRead,
    WordReadVar,
    WriteVarWord,
    WordDword,
}

impl OperandShape {
    /// Encoded size in code units.
    pub const fn size(self) -> u32 {
        match self {
            OperandShape::Marker => 0,
            OperandShape::NoArg
            | OperandShape::Word
            | OperandShape::WriteVar
            | OperandShape::ReadVar => 1,
            OperandShape::Dword
            | OperandShape::ReadVarDword
            | OperandShape::WriteReadRead
            | OperandShape::WriteRead
            | OperandShape::WriteVarDword
            | OperandShape::ReadRead
            | OperandShape::WordReadVar
            | OperandShape::WriteVarWord
            | OperandShape::WordDword => 2,
            OperandShape::Qword
            | OperandShape::DwordDword
            | OperandShape::WriteVarQword
            | OperandShape::WriteReadDword => 3,
        }
    }
}

/// Opcode byte written into the first code unit of an encoded instruction.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ========================================================================
    // Stack (0x01 - 0x1F)
    // ========================================================================
    Pop = 0x01,
    Push = 0x02,
    PshC4 = 0x03,
    PshC8 = 0x04,
    PshV4 = 0x05,
    Psf = 0x06,
    Psp = 0x07,
    Var = 0x08,
    PshG4 = 0x09,
    PshRPtr = 0x0A,
    PopRPtr = 0x0B,
    Str = 0x0C,
    Swap4 = 0x0D,
    Rds4 = 0x0E,
    Rds8 = 0x0F,
    GetRef = 0x10,
    ChkRefS = 0x11,
    ChkRef = 0x12,
    ChkNullV = 0x13,

    // ========================================================================
    // Variables & Registers (0x20 - 0x3F)
    // ========================================================================
    SetV4 = 0x20,
    SetV8 = 0x21,
    CpyVtoV4 = 0x22,
    CpyVtoR4 = 0x23,
    CpyRtoV4 = 0x24,
    CpyVtoG4 = 0x25,
    CpyGtoV4 = 0x26,
    LdGRdR4 = 0x27,
    SetG4 = 0x28,
    Ldg = 0x29,
    Ldv = 0x2A,
    WrtV4 = 0x2B,
    Rdr4 = 0x2C,
    IncVi = 0x2D,
    DecVi = 0x2E,
    IncI = 0x2F,
    DecI = 0x30,
    Not = 0x38,
    NegI = 0x39,
    NegF = 0x3A,
    BNot = 0x3B,

    // ========================================================================
    // Arithmetic (0x40 - 0x57)
    // ========================================================================
    AddI = 0x40,
    SubI = 0x41,
    MulI = 0x42,
    DivI = 0x43,
    ModI = 0x44,
    AddF = 0x45,
    SubF = 0x46,
    MulF = 0x47,
    DivF = 0x48,
    ModF = 0x49,
    BAnd = 0x4A,
    BOr = 0x4B,
    BXor = 0x4C,
    BSll = 0x4D,
    BSrl = 0x4E,
    BSra = 0x4F,
    AddIi = 0x50,
    SubIi = 0x51,
    MulIi = 0x52,
    AddIf = 0x53,
    SubIf = 0x54,
    MulIf = 0x55,

    // ========================================================================
    // Comparison & Tests (0x58 - 0x6F)
    // ========================================================================
    CmpI = 0x58,
    CmpU = 0x59,
    CmpF = 0x5A,
    CmpD = 0x5B,
    CmpIi = 0x5C,
    CmpIu = 0x5D,
    CmpIf = 0x5E,
    Tz = 0x60,
    Tnz = 0x61,
    Ts = 0x62,
    Tns = 0x63,
    Tp = 0x64,
    Tnp = 0x65,

    // ========================================================================
    // Control Flow (0x70 - 0x7F)
    // ========================================================================
    Jmp = 0x70,
    Jz = 0x71,
    Jnz = 0x72,
    Js = 0x73,
    Jns = 0x74,
    Jp = 0x75,
    Jnp = 0x76,
    JmpP = 0x77,
    Call = 0x78,
    CallSys = 0x79,
    CallBnd = 0x7A,
    CallIntf = 0x7B,
    Alloc = 0x7C,
    Ret = 0x7D,
    Suspend = 0x7E,
    JitEntry = 0x7F,
}

impl Opcode {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Pop => "POP",
            Opcode::Push => "PUSH",
            Opcode::PshC4 => "PshC4",
            Opcode::PshC8 => "PshC8",
            Opcode::PshV4 => "PshV4",
            Opcode::Psf => "PSF",
            Opcode::Psp => "PSP",
            Opcode::Var => "VAR",
            Opcode::PshG4 => "PshG4",
            Opcode::PshRPtr => "PshRPtr",
            Opcode::PopRPtr => "PopRPtr",
            Opcode::Str => "STR",
            Opcode::Swap4 => "SWAP4",
            Opcode::Rds4 => "RDS4",
            Opcode::Rds8 => "RDS8",
            Opcode::GetRef => "GETREF",
            Opcode::ChkRefS => "ChkRefS",
            Opcode::ChkRef => "CHKREF",
            Opcode::ChkNullV => "ChkNullV",
            Opcode::SetV4 => "SetV4",
            Opcode::SetV8 => "SetV8",
            Opcode::CpyVtoV4 => "CpyVtoV4",
            Opcode::CpyVtoR4 => "CpyVtoR4",
            Opcode::CpyRtoV4 => "CpyRtoV4",
            Opcode::CpyVtoG4 => "CpyVtoG4",
            Opcode::CpyGtoV4 => "CpyGtoV4",
            Opcode::LdGRdR4 => "LdGRdR4",
            Opcode::SetG4 => "SetG4",
            Opcode::Ldg => "LDG",
            Opcode::Ldv => "LDV",
            Opcode::WrtV4 => "WRTV4",
            Opcode::Rdr4 => "RDR4",
            Opcode::IncVi => "IncVi",
            Opcode::DecVi => "DecVi",
            Opcode::IncI => "INCi",
            Opcode::DecI => "DECi",
            Opcode::Not => "NOT",
            Opcode::NegI => "NEGi",
            Opcode::NegF => "NEGf",
            Opcode::BNot => "BNOT",
            Opcode::AddI => "ADDi",
            Opcode::SubI => "SUBi",
            Opcode::MulI => "MULi",
            Opcode::DivI => "DIVi",
            Opcode::ModI => "MODi",
            Opcode::AddF => "ADDf",
            Opcode::SubF => "SUBf",
            Opcode::MulF => "MULf",
            Opcode::DivF => "DIVf",
            Opcode::ModF => "MODf",
            Opcode::BAnd => "BAND",
            Opcode::BOr => "BOR",
            Opcode::BXor => "BXOR",
            Opcode::BSll => "BSLL",
            Opcode::BSrl => "BSRL",
            Opcode::BSra => "BSRA",
            Opcode::AddIi => "ADDIi",
            Opcode::SubIi => "SUBIi",
            Opcode::MulIi => "MULIi",
            Opcode::AddIf => "ADDIf",
            Opcode::SubIf => "SUBIf",
            Opcode::MulIf => "MULIf",
            Opcode::CmpI => "CMPi",
            Opcode::CmpU => "CMPu",
            Opcode::CmpF => "CMPf",
            Opcode::CmpD => "CMPd",
            Opcode::CmpIi => "CMPIi",
            Opcode::CmpIu => "CMPIu",
            Opcode::CmpIf => "CMPIf",
            Opcode::Tz => "TZ",
            Opcode::Tnz => "TNZ",
            Opcode::Ts => "TS",
            Opcode::Tns => "TNS",
            Opcode::Tp => "TP",
            Opcode::Tnp => "TNP",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::Jnz => "JNZ",
            Opcode::Js => "JS",
            Opcode::Jns => "JNS",
            Opcode::Jp => "JP",
            Opcode::Jnp => "JNP",
            Opcode::JmpP => "JMPP",
            Opcode::Call => "CALL",
            Opcode::CallSys => "CALLSYS",
            Opcode::CallBnd => "CALLBND",
            Opcode::CallIntf => "CALLINTF",
            Opcode::Alloc => "ALLOC",
            Opcode::Ret => "RET",
            Opcode::Suspend => "SUSPEND",
            Opcode::JitEntry => "JitEntry",
        }
    }
}

/// Slot operands read and written by one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VarAccess {
    pub write: Option<Var>,
    pub reads: [Option<Var>; 2],
}

impl VarAccess {
    const fn none() -> Self {
        Self {
            write: None,
            reads: [None, None],
        }
    }

    const fn read(var: Var) -> Self {
        Self {
            write: None,
            reads: [Some(var), None],
        }
    }

    const fn write(var: Var) -> Self {
        Self {
            write: Some(var),
            reads: [None, None],
        }
    }

    pub fn reads_var(&self, var: Var) -> bool {
        self.reads.contains(&Some(var))
    }

    pub fn writes_var(&self, var: Var) -> bool {
        self.write == Some(var)
    }
}

/// Operand words and wide payload of an instruction, stripped of meaning.
///
/// Consumed by the encoder, which packs them according to the shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawOperands {
    pub words: [u16; 3],
    /// A 32-bit payload in the low half, or a 64-bit payload, or two
    /// 32-bit payloads (first in the low half).
    pub wide: u64,
}

/// A single pipeline instruction.
///
/// Stack effect notation in the docs: `[...] -> [..., value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    // ========================================================================
    // Markers
    // ========================================================================
    /// Jump target. Zero size, never encoded.
    Label(LabelId),

    /// Debug position marker.
    ///
    /// With `cue` set it occupies one unit and becomes a `Suspend` during
    /// line extraction; otherwise it is zero-size and vanishes.
    Line { pos: SourcePos, cue: bool },

    // ========================================================================
    // Stack
    // ========================================================================
    /// Discard `n` units | Stack: [..., n units] -> [...]
    Pop(u16),

    /// Reserve `n` units | Stack: [...] -> [..., n units]
    Push(u16),

    /// Stack: [...] -> [..., constant]
    PushConst(u32),

    /// Stack: [...] -> [..., constant (2 units)]
    PushConst8(u64),

    /// Push the value of a slot | Stack: [...] -> [..., value]
    PushVar(Var),

    /// Push the address of a frame slot | Stack: [...] -> [..., ptr]
    PushFrameAddr(Var),

    /// Placeholder for a stack-relative slot address. The analyzer rewrites
    /// it into `PushFrameAddr` once the depth at this point is known.
    PushStackAddr(i16),

    /// Push a reference held in a slot | Stack: [...] -> [..., ptr]
    PushVarRef(Var),

    /// Stack: [...] -> [..., global value]
    PushGlobal(GlobalId),

    /// Push the value register as a pointer | Stack: [...] -> [..., ptr]
    PushRegPtr,

    /// Pop a pointer into the value register | Stack: [..., ptr] -> [...]
    PopRegPtr,

    /// Push a string constant | Stack: [...] -> [..., ptr, length]
    PushString(u16),

    /// Stack: [..., a, b] -> [..., b, a]
    Swap4,

    /// Replace the pointer on top with the value it points to.
    /// Stack: [..., ptr] -> [..., value]
    ReadStack4,

    /// Stack: [..., ptr] -> [..., value (2 units)]
    ReadStack8,

    /// Dereference the slot address stored `n` units down the stack.
    GetRef(u16),

    /// Null check of the pointer the top of the stack points to.
    ChkRefS,

    /// Null check of the pointer on top of the stack.
    ChkRef,

    /// Null check of a slot.
    ChkNullV(Var),

    // ========================================================================
    // Variables & Registers
    // ========================================================================
    SetVar4 { dst: Var, value: u32 },
    SetVar8 { dst: Var, value: u64 },
    CopyVar4 { dst: Var, src: Var },
    CopyVarToReg4(Var),
    CopyRegToVar4(Var),
    CopyVarToGlobal4 { global: GlobalId, src: Var },
    CopyGlobalToVar4 { dst: Var, global: GlobalId },
    /// Load a global's address into the register and its value into `dst`.
    LoadGlobalReadReg4 { dst: Var, global: GlobalId },
    SetGlobal4 { global: GlobalId, value: u32 },
    /// Load a global's address into the register.
    LoadGlobal(GlobalId),
    /// Load a slot's address into the register.
    LoadVar(Var),
    /// Write a slot's value through the address in the register.
    WriteVar4(Var),
    /// Read through the address in the register into a slot.
    ReadReg4(Var),
    IncVi(Var),
    DecVi(Var),
    /// Increment the integer the register points to.
    IncI,
    DecI,
    Unary { op: UnaryOp, var: Var },
    BinOp { op: ArithOp, dst: Var, lhs: Var, rhs: Var },
    BinOpImm { op: ImmOp, dst: Var, lhs: Var, imm: u32 },
    /// Compare two slots, result in the register.
    Cmp { kind: CmpKind, lhs: Var, rhs: Var },
    CmpImm { kind: ImmCmpKind, lhs: Var, imm: u32 },
    /// Replace the register with 1 if `cond` holds for it, else 0.
    Test(Condition),

    // ========================================================================
    // Control Flow
    // ========================================================================
    Jump(JumpTarget),
    /// Jump if `cond` holds for the register.
    Branch { cond: Condition, target: JumpTarget },
    /// Computed jump into the `fan_out` instructions that follow, indexed by
    /// the value of `var`.
    JumpPtr { var: Var, fan_out: u32 },
    /// Call `func`, popping `pop` units of arguments.
    Call { kind: CallKind, func: u32, pop: u16 },
    /// Allocate an object of `type_id` and run constructor `func`.
    Alloc { type_id: u32, func: u32, pop: u16 },
    /// Return, freeing `n` units of parameters.
    Ret(u16),
    /// Runtime checkpoint (debugger, line callback, context suspension).
    Suspend,
    /// Position where JIT-compiled code may hand back to the interpreter.
    JitEntry(u16),
}

static_assertions::const_assert!(core::mem::size_of::<Instruction>() <= 16);

impl Instruction {
    pub const fn shape(&self) -> OperandShape {
        use Instruction::*;
        match self {
            Label(_) => OperandShape::Marker,
            Line { cue, .. } => {
                if *cue {
                    OperandShape::NoArg
                } else {
                    OperandShape::Marker
                }
            }
            PushRegPtr | PopRegPtr | Swap4 | ReadStack4 | ReadStack8 | ChkRefS | ChkRef | IncI
            | DecI | Test(_) | Suspend => OperandShape::NoArg,
            Pop(_) | Push(_) | PushStackAddr(_) | PushGlobal(_) | PushString(_) | GetRef(_)
            | LoadGlobal(_) | Ret(_) | JitEntry(_) => OperandShape::Word,
            CopyRegToVar4(_) | ReadReg4(_) => OperandShape::WriteVar,
            PushVar(_) | PushFrameAddr(_) | PushVarRef(_) | ChkNullV(_) | CopyVarToReg4(_)
            | LoadVar(_) | WriteVar4(_) | IncVi(_) | DecVi(_) | Unary { .. } | JumpPtr { .. } => {
                OperandShape::ReadVar
            }
            PushConst(_) | Jump(_) | Branch { .. } | Call { .. } => OperandShape::Dword,
            CmpImm { .. } => OperandShape::ReadVarDword,
            PushConst8(_) => OperandShape::Qword,
            Alloc { .. } => OperandShape::DwordDword,
            BinOp { .. } => OperandShape::WriteReadRead,
            SetVar8 { .. } => OperandShape::WriteVarQword,
            CopyVar4 { .. } => OperandShape::WriteRead,
            SetVar4 { .. } => OperandShape::WriteVarDword,
            BinOpImm { .. } => OperandShape::WriteReadDword,
            Cmp { .. } => OperandShape::ReadRead,
            CopyVarToGlobal4 { .. } => OperandShape::WordReadVar,
            CopyGlobalToVar4 { .. } | LoadGlobalReadReg4 { .. } => OperandShape::WriteVarWord,
            SetGlobal4 { .. } => OperandShape::WordDword,
        }
    }

    /// Encoded size in code units.
    pub const fn size(&self) -> u32 {
        self.shape().size()
    }

    /// Change in VM stack depth caused by executing this instruction.
    pub const fn stack_effect(&self) -> i32 {
        use Instruction::*;
        match self {
            Pop(n) => -(*n as i32),
            Push(n) => *n as i32,
            PushConst(_) | PushVar(_) | PushGlobal(_) => 1,
            PushConst8(_) => 2,
            PushFrameAddr(_) | PushStackAddr(_) | PushVarRef(_) | PushRegPtr => PTR_SIZE,
            PopRegPtr => -PTR_SIZE,
            PushString(_) => 1 + PTR_SIZE,
            ReadStack4 => 1 - PTR_SIZE,
            ReadStack8 => 2 - PTR_SIZE,
            Call { pop, .. } | Alloc { pop, .. } => -(*pop as i32),
            _ => 0,
        }
    }

    /// Opcode byte, or `None` for markers which never reach the encoder.
    pub const fn opcode(&self) -> Option<Opcode> {
        use Instruction::*;
        let op = match self {
            Label(_) | Line { .. } => return None,
            Pop(_) => Opcode::Pop,
            Push(_) => Opcode::Push,
            PushConst(_) => Opcode::PshC4,
            PushConst8(_) => Opcode::PshC8,
            PushVar(_) => Opcode::PshV4,
            PushFrameAddr(_) => Opcode::Psf,
            PushStackAddr(_) => Opcode::Psp,
            PushVarRef(_) => Opcode::Var,
            PushGlobal(_) => Opcode::PshG4,
            PushRegPtr => Opcode::PshRPtr,
            PopRegPtr => Opcode::PopRPtr,
            PushString(_) => Opcode::Str,
            Swap4 => Opcode::Swap4,
            ReadStack4 => Opcode::Rds4,
            ReadStack8 => Opcode::Rds8,
            GetRef(_) => Opcode::GetRef,
            ChkRefS => Opcode::ChkRefS,
            ChkRef => Opcode::ChkRef,
            ChkNullV(_) => Opcode::ChkNullV,
            SetVar4 { .. } => Opcode::SetV4,
            SetVar8 { .. } => Opcode::SetV8,
            CopyVar4 { .. } => Opcode::CpyVtoV4,
            CopyVarToReg4(_) => Opcode::CpyVtoR4,
            CopyRegToVar4(_) => Opcode::CpyRtoV4,
            CopyVarToGlobal4 { .. } => Opcode::CpyVtoG4,
            CopyGlobalToVar4 { .. } => Opcode::CpyGtoV4,
            LoadGlobalReadReg4 { .. } => Opcode::LdGRdR4,
            SetGlobal4 { .. } => Opcode::SetG4,
            LoadGlobal(_) => Opcode::Ldg,
            LoadVar(_) => Opcode::Ldv,
            WriteVar4(_) => Opcode::WrtV4,
            ReadReg4(_) => Opcode::Rdr4,
            IncVi(_) => Opcode::IncVi,
            DecVi(_) => Opcode::DecVi,
            IncI => Opcode::IncI,
            DecI => Opcode::DecI,
            Unary { op, .. } => match op {
                UnaryOp::Not => Opcode::Not,
                UnaryOp::NegI => Opcode::NegI,
                UnaryOp::NegF => Opcode::NegF,
                UnaryOp::BitNot => Opcode::BNot,
            },
            BinOp { op, .. } => match op {
                ArithOp::AddI => Opcode::AddI,
                ArithOp::SubI => Opcode::SubI,
                ArithOp::MulI => Opcode::MulI,
                ArithOp::DivI => Opcode::DivI,
                ArithOp::ModI => Opcode::ModI,
                ArithOp::AddF => Opcode::AddF,
                ArithOp::SubF => Opcode::SubF,
                ArithOp::MulF => Opcode::MulF,
                ArithOp::DivF => Opcode::DivF,
                ArithOp::ModF => Opcode::ModF,
                ArithOp::And => Opcode::BAnd,
                ArithOp::Or => Opcode::BOr,
                ArithOp::Xor => Opcode::BXor,
                ArithOp::Shl => Opcode::BSll,
                ArithOp::Shr => Opcode::BSrl,
                ArithOp::Sar => Opcode::BSra,
            },
            BinOpImm { op, .. } => match op {
                ImmOp::AddI => Opcode::AddIi,
                ImmOp::SubI => Opcode::SubIi,
                ImmOp::MulI => Opcode::MulIi,
                ImmOp::AddF => Opcode::AddIf,
                ImmOp::SubF => Opcode::SubIf,
                ImmOp::MulF => Opcode::MulIf,
            },
            Cmp { kind, .. } => match kind {
                CmpKind::Int => Opcode::CmpI,
                CmpKind::Uint => Opcode::CmpU,
                CmpKind::Float => Opcode::CmpF,
                CmpKind::Double => Opcode::CmpD,
            },
            CmpImm { kind, .. } => match kind {
                ImmCmpKind::Int => Opcode::CmpIi,
                ImmCmpKind::Uint => Opcode::CmpIu,
                ImmCmpKind::Float => Opcode::CmpIf,
            },
            Test(cond) => match cond {
                Condition::Zero => Opcode::Tz,
                Condition::NotZero => Opcode::Tnz,
                Condition::Negative => Opcode::Ts,
                Condition::NotNegative => Opcode::Tns,
                Condition::Positive => Opcode::Tp,
                Condition::NotPositive => Opcode::Tnp,
            },
            Jump(_) => Opcode::Jmp,
            Branch { cond, .. } => match cond {
                Condition::Zero => Opcode::Jz,
                Condition::NotZero => Opcode::Jnz,
                Condition::Negative => Opcode::Js,
                Condition::NotNegative => Opcode::Jns,
                Condition::Positive => Opcode::Jp,
                Condition::NotPositive => Opcode::Jnp,
            },
            JumpPtr { .. } => Opcode::JmpP,
            Call { kind, .. } => match kind {
                CallKind::Script => Opcode::Call,
                CallKind::System => Opcode::CallSys,
                CallKind::Bound => Opcode::CallBnd,
                CallKind::Interface => Opcode::CallIntf,
            },
            Alloc { .. } => Opcode::Alloc,
            Ret(_) => Opcode::Ret,
            Suspend => Opcode::Suspend,
            JitEntry(_) => Opcode::JitEntry,
        };
        Some(op)
    }

    pub const fn is_marker(&self) -> bool {
        matches!(self, Instruction::Label(_) | Instruction::Line { .. })
    }

    pub const fn is_jump(&self) -> bool {
        matches!(
            self,
            Instruction::Jump(_) | Instruction::Branch { .. } | Instruction::JumpPtr { .. }
        )
    }

    /// Instructions a peephole window must not move code across.
    pub const fn is_jump_or_label(&self) -> bool {
        self.is_jump() || matches!(self, Instruction::Label(_))
    }

    /// Target of a jump or branch, if any.
    pub const fn target(&self) -> Option<JumpTarget> {
        match self {
            Instruction::Jump(target) | Instruction::Branch { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Symbolic label a jump or branch still refers to.
    pub const fn label_target(&self) -> Option<LabelId> {
        match self.target() {
            Some(JumpTarget::Label(label)) => Some(label),
            _ => None,
        }
    }

    /// The same jump or branch aimed at a different target.
    pub const fn with_target(&self, target: JumpTarget) -> Option<Instruction> {
        match *self {
            Instruction::Jump(_) => Some(Instruction::Jump(target)),
            Instruction::Branch { cond, .. } => Some(Instruction::Branch { cond, target }),
            _ => None,
        }
    }

    /// Slots this instruction reads and writes.
    pub const fn var_access(&self) -> VarAccess {
        use Instruction::*;
        match *self {
            PushVar(v) | PushFrameAddr(v) | PushVarRef(v) | ChkNullV(v) | CopyVarToReg4(v)
            | LoadVar(v) | WriteVar4(v) | IncVi(v) | DecVi(v) | JumpPtr { var: v, .. }
            | CopyVarToGlobal4 { src: v, .. }
            | CmpImm { lhs: v, .. }
            | Unary { var: v, .. } => VarAccess::read(v),
            CopyRegToVar4(v)
            | ReadReg4(v)
            | SetVar4 { dst: v, .. }
            | SetVar8 { dst: v, .. }
            | CopyGlobalToVar4 { dst: v, .. }
            | LoadGlobalReadReg4 { dst: v, .. } => VarAccess::write(v),
            CopyVar4 { dst, src } | BinOpImm { dst, lhs: src, .. } => VarAccess {
                write: Some(dst),
                reads: [Some(src), None],
            },
            BinOp { dst, lhs, rhs, .. } => VarAccess {
                write: Some(dst),
                reads: [Some(lhs), Some(rhs)],
            },
            Cmp { lhs, rhs, .. } => VarAccess {
                write: None,
                reads: [Some(lhs), Some(rhs)],
            },
            _ => VarAccess::none(),
        }
    }

    /// Whether executing this instruction ends the life of every temporary:
    /// a return leaves the frame, a suspend may hand it to a debugger.
    pub const fn ends_temporaries(&self) -> bool {
        matches!(self, Instruction::Ret(_) | Instruction::Suspend)
    }

    /// The same three-operand producer writing into `dst` instead.
    pub const fn with_write_var(&self, dst: Var) -> Option<Instruction> {
        match *self {
            Instruction::BinOp { op, lhs, rhs, .. } => {
                Some(Instruction::BinOp { op, dst, lhs, rhs })
            }
            Instruction::BinOpImm { op, lhs, imm, .. } => {
                Some(Instruction::BinOpImm { op, dst, lhs, imm })
            }
            _ => None,
        }
    }

    /// The same instruction with every slot operand passed through `f`.
    pub fn map_vars(&self, mut f: impl FnMut(Var) -> Var) -> Instruction {
        use Instruction::*;
        match *self {
            PushVar(v) => PushVar(f(v)),
            PushFrameAddr(v) => PushFrameAddr(f(v)),
            PushVarRef(v) => PushVarRef(f(v)),
            ChkNullV(v) => ChkNullV(f(v)),
            CopyVarToReg4(v) => CopyVarToReg4(f(v)),
            CopyRegToVar4(v) => CopyRegToVar4(f(v)),
            LoadVar(v) => LoadVar(f(v)),
            WriteVar4(v) => WriteVar4(f(v)),
            ReadReg4(v) => ReadReg4(f(v)),
            IncVi(v) => IncVi(f(v)),
            DecVi(v) => DecVi(f(v)),
            Unary { op, var } => Unary { op, var: f(var) },
            JumpPtr { var, fan_out } => JumpPtr {
                var: f(var),
                fan_out,
            },
            SetVar4 { dst, value } => SetVar4 { dst: f(dst), value },
            SetVar8 { dst, value } => SetVar8 { dst: f(dst), value },
            CopyVar4 { dst, src } => CopyVar4 {
                dst: f(dst),
                src: f(src),
            },
            CopyVarToGlobal4 { global, src } => CopyVarToGlobal4 { global, src: f(src) },
            CopyGlobalToVar4 { dst, global } => CopyGlobalToVar4 { dst: f(dst), global },
            LoadGlobalReadReg4 { dst, global } => LoadGlobalReadReg4 { dst: f(dst), global },
            BinOp { op, dst, lhs, rhs } => BinOp {
                op,
                dst: f(dst),
                lhs: f(lhs),
                rhs: f(rhs),
            },
            BinOpImm { op, dst, lhs, imm } => BinOpImm {
                op,
                dst: f(dst),
                lhs: f(lhs),
                imm,
            },
            Cmp { kind, lhs, rhs } => Cmp {
                kind,
                lhs: f(lhs),
                rhs: f(rhs),
            },
            CmpImm { kind, lhs, imm } => CmpImm {
                kind,
                lhs: f(lhs),
                imm,
            },
            other => other,
        }
    }

    /// Whether this instruction consumes the value register.
    pub const fn reads_register(&self) -> bool {
        matches!(
            self,
            Instruction::IncI
                | Instruction::DecI
                | Instruction::WriteVar4(_)
                | Instruction::ReadReg4(_)
                | Instruction::PushRegPtr
                | Instruction::CopyRegToVar4(_)
                | Instruction::Test(_)
                | Instruction::Branch { .. }
        )
    }

    /// Whether this instruction overwrites the value register, or leaves the
    /// straight-line region a register scan may look at.
    pub const fn clobbers_register(&self) -> bool {
        matches!(
            self,
            Instruction::Call { .. }
                | Instruction::Alloc { .. }
                | Instruction::PopRegPtr
                | Instruction::Suspend
                | Instruction::CopyVarToReg4(_)
                | Instruction::LoadGlobalReadReg4 { .. }
                | Instruction::LoadGlobal(_)
                | Instruction::LoadVar(_)
                | Instruction::Cmp { .. }
                | Instruction::CmpImm { .. }
                | Instruction::Test(_)
                | Instruction::Jump(_)
                | Instruction::Branch { .. }
                | Instruction::JumpPtr { .. }
                | Instruction::Label(_)
        )
    }

    /// Operand words and wide payload, in the order the shape packs them.
    pub const fn raw_operands(&self) -> RawOperands {
        use Instruction::*;
        let (words, wide): ([u16; 3], u64) = match *self {
            Label(_) | Line { .. } => ([0; 3], 0),
            Pop(n) | Push(n) | PushGlobal(n) | PushString(n) | GetRef(n) | LoadGlobal(n)
            | Ret(n) | JitEntry(n) => ([n, 0, 0], 0),
            PushStackAddr(v) | PushVar(v) | PushFrameAddr(v) | PushVarRef(v) | ChkNullV(v)
            | CopyVarToReg4(v) | CopyRegToVar4(v) | LoadVar(v) | WriteVar4(v) | ReadReg4(v)
            | IncVi(v) | DecVi(v) | Unary { var: v, .. } | JumpPtr { var: v, .. } => {
                ([v as u16, 0, 0], 0)
            }
            PushRegPtr | PopRegPtr | Swap4 | ReadStack4 | ReadStack8 | ChkRefS | ChkRef | IncI
            | DecI | Test(_) | Suspend => ([0; 3], 0),
            PushConst(value) => ([0; 3], value as u64),
            PushConst8(value) => ([0; 3], value),
            Jump(target) | Branch { target, .. } => match target {
                JumpTarget::Offset(offset) => ([0; 3], offset as u32 as u64),
                JumpTarget::Label(label) => ([0; 3], label.0 as u64),
            },
            Call { func, .. } => ([0; 3], func as u64),
            Alloc { type_id, func, .. } => ([0; 3], type_id as u64 | (func as u64) << 32),
            SetVar4 { dst, value } => ([dst as u16, 0, 0], value as u64),
            SetVar8 { dst, value } => ([dst as u16, 0, 0], value),
            CopyVar4 { dst, src } => ([dst as u16, src as u16, 0], 0),
            CopyVarToGlobal4 { global, src } => ([global, src as u16, 0], 0),
            CopyGlobalToVar4 { dst, global } | LoadGlobalReadReg4 { dst, global } => {
                ([dst as u16, global, 0], 0)
            }
            SetGlobal4 { global, value } => ([global, 0, 0], value as u64),
            BinOp { dst, lhs, rhs, .. } => ([dst as u16, lhs as u16, rhs as u16], 0),
            BinOpImm { dst, lhs, imm, .. } => ([dst as u16, lhs as u16, 0], imm as u64),
            Cmp { lhs, rhs, .. } => ([lhs as u16, rhs as u16, 0], 0),
            CmpImm { lhs, imm, .. } => ([lhs as u16, 0, 0], imm as u64),
        };
        RawOperands { words, wide }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        let mnemonic = match self.opcode() {
            Some(op) => op.mnemonic(),
            None => {
                return match self {
                    Label(label) => write!(f, "{}:", label),
                    Line { pos, cue } => {
                        write!(f, "# line {}{}", pos, if *cue { " (cue)" } else { "" })
                    }
                    _ => Ok(()),
                };
            }
        };
        match *self {
            Pop(n) | Push(n) | PushGlobal(n) | PushString(n) | GetRef(n) | LoadGlobal(n)
            | Ret(n) | JitEntry(n) => write!(f, "{:<8} {}", mnemonic, n),
            PushStackAddr(offset) => write!(f, "{:<8} sp{:+}", mnemonic, offset),
            PushVar(v) | PushFrameAddr(v) | PushVarRef(v) | ChkNullV(v) | CopyVarToReg4(v)
            | CopyRegToVar4(v) | LoadVar(v) | WriteVar4(v) | ReadReg4(v) | IncVi(v) | DecVi(v)
            | Unary { var: v, .. } => write!(f, "{:<8} v{}", mnemonic, v),
            JumpPtr { var, fan_out } => write!(f, "{:<8} v{}, max {}", mnemonic, var, fan_out),
            PushConst(value) => write!(f, "{:<8} {:#x}", mnemonic, value),
            PushConst8(value) => write!(f, "{:<8} {:#x}", mnemonic, value),
            Jump(target) | Branch { target, .. } => write!(f, "{:<8} {}", mnemonic, target),
            Call { func, pop, .. } => write!(f, "{:<8} {} ({} args)", mnemonic, func, pop),
            Alloc { type_id, func, .. } => write!(f, "{:<8} {}, {}", mnemonic, type_id, func),
            SetVar4 { dst, value } => write!(f, "{:<8} v{}, {:#x}", mnemonic, dst, value),
            SetVar8 { dst, value } => write!(f, "{:<8} v{}, {:#x}", mnemonic, dst, value),
            CopyVar4 { dst, src } => write!(f, "{:<8} v{}, v{}", mnemonic, dst, src),
            CopyVarToGlobal4 { global, src } => write!(f, "{:<8} g{}, v{}", mnemonic, global, src),
            CopyGlobalToVar4 { dst, global } | LoadGlobalReadReg4 { dst, global } => {
                write!(f, "{:<8} v{}, g{}", mnemonic, dst, global)
            }
            SetGlobal4 { global, value } => write!(f, "{:<8} g{}, {:#x}", mnemonic, global, value),
            BinOp { dst, lhs, rhs, .. } => {
                write!(f, "{:<8} v{}, v{}, v{}", mnemonic, dst, lhs, rhs)
            }
            BinOpImm { dst, lhs, imm, .. } => {
                write!(f, "{:<8} v{}, v{}, {:#x}", mnemonic, dst, lhs, imm)
            }
            Cmp { lhs, rhs, .. } => write!(f, "{:<8} v{}, v{}", mnemonic, lhs, rhs),
            CmpImm { lhs, imm, .. } => write!(f, "{:<8} v{}, {:#x}", mnemonic, lhs, imm),
            _ => f.write_str(mnemonic),
        }
    }
}
