//! Opcode set

use num_enum::TryFromPrimitive;

/// What the `a` operand of an instruction refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    /// Index of an Int, Float or Str constant
    Const,
    /// Local slot of the current frame
    Slot,
    /// Index of a type-descriptor constant
    Type,
    /// Instruction index within the current function
    Target,
    /// Index into the function table
    Function,
    /// Field position within a struct
    Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    // === PUSH: literals ===
    PushConst = 0,
    PushUnit,
    PushNull,
    PushTrue,
    PushFalse,

    // === LOCAL: frame slots ===
    LoadLocal,
    StoreLocal,
    Pop,

    // === ARITH: Int ===
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    RemInt,
    NegInt,

    // === ARITH: Float ===
    AddFloat,
    SubFloat,
    MulFloat,
    DivFloat,
    RemFloat,
    NegFloat,

    // === ARITH: Str ===
    Concat,

    // === CMP: Int ===
    EqInt,
    NeInt,
    LtInt,
    LeInt,
    GtInt,
    GeInt,

    // === CMP: Float ===
    EqFloat,
    NeFloat,
    LtFloat,
    LeFloat,
    GtFloat,
    GeFloat,

    // === CMP: Bool / Str ===
    EqBool,
    NeBool,
    EqStr,
    NeStr,
    Not,
    IsNull,

    // === CONTROL ===
    Jump,
    JumpIfFalse,
    Call,
    Return,

    // === OBJECT ===
    Alloc,
    MakeStruct,
    LoadField,
    StoreField,
    Clone,

    // === DROP ===
    Drop,
    DropTop,

    // === IO ===
    Print,
}

impl Opcode {
    pub fn operand(self) -> OperandKind {
        use Opcode::*;
        match self {
            PushConst => OperandKind::Const,
            LoadLocal | StoreLocal | Drop => OperandKind::Slot,
            Alloc | MakeStruct => OperandKind::Type,
            Jump | JumpIfFalse => OperandKind::Target,
            Call => OperandKind::Function,
            LoadField | StoreField => OperandKind::Field,
            _ => OperandKind::None,
        }
    }

    /// Does control never fall through to the next instruction?
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Return | Opcode::Jump)
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            PushConst => "push.const",
            PushUnit => "push.unit",
            PushNull => "push.null",
            PushTrue => "push.true",
            PushFalse => "push.false",
            LoadLocal => "load",
            StoreLocal => "store",
            Pop => "pop",
            AddInt => "add.i",
            SubInt => "sub.i",
            MulInt => "mul.i",
            DivInt => "div.i",
            RemInt => "rem.i",
            NegInt => "neg.i",
            AddFloat => "add.f",
            SubFloat => "sub.f",
            MulFloat => "mul.f",
            DivFloat => "div.f",
            RemFloat => "rem.f",
            NegFloat => "neg.f",
            Concat => "concat",
            EqInt => "eq.i",
            NeInt => "ne.i",
            LtInt => "lt.i",
            LeInt => "le.i",
            GtInt => "gt.i",
            GeInt => "ge.i",
            EqFloat => "eq.f",
            NeFloat => "ne.f",
            LtFloat => "lt.f",
            LeFloat => "le.f",
            GtFloat => "gt.f",
            GeFloat => "ge.f",
            EqBool => "eq.b",
            NeBool => "ne.b",
            EqStr => "eq.s",
            NeStr => "ne.s",
            Not => "not",
            IsNull => "is_null",
            Jump => "jump",
            JumpIfFalse => "jump_if_false",
            Call => "call",
            Return => "ret",
            Alloc => "alloc",
            MakeStruct => "make_struct",
            LoadField => "load_field",
            StoreField => "store_field",
            Clone => "clone",
            Drop => "drop",
            DropTop => "drop_top",
            Print => "print",
        }
    }
}
