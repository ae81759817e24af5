/// Opcodes and 32-bit instruction encoding.
///
/// Instruction layout:
/// - Bits 0-6: OpCode (7 bits)
/// - Bit 7: k flag
/// - Bits 8-15: A
/// - iABC: B = bits 16-23, C = bits 24-31
/// - iABx: Bx = bits 16-31 (unsigned); iAsBx is the same field with an offset
/// - iAx: Ax = bits 8-31
/// - isJ: sJ = bits 8-31 (signed with offset)
use std::fmt;

const SIZE_OP: u32 = 7;
const SIZE_A: u32 = 8;
const SIZE_B: u32 = 8;
const SIZE_C: u32 = 8;
const SIZE_BX: u32 = SIZE_B + SIZE_C;
const SIZE_AX: u32 = SIZE_A + SIZE_B + SIZE_C;
const SIZE_SJ: u32 = SIZE_A + SIZE_B + SIZE_C;

const POS_OP: u32 = 0;
const POS_K: u32 = POS_OP + SIZE_OP;
const POS_A: u32 = POS_K + 1;
const POS_B: u32 = POS_A + SIZE_A;
const POS_C: u32 = POS_B + SIZE_B;

const fn mask(n: u32) -> u32 {
    (1 << n) - 1
}

pub const MAX_A: u32 = mask(SIZE_A);
pub const MAX_B: u32 = mask(SIZE_B);
pub const MAX_C: u32 = mask(SIZE_C);
pub const MAX_BX: u32 = mask(SIZE_BX);
pub const MAX_SBX: i32 = (MAX_BX >> 1) as i32;
pub const MIN_SBX: i32 = -MAX_SBX;
pub const MAX_AX: u32 = mask(SIZE_AX);
pub const MAX_SJ: i32 = (mask(SIZE_SJ) >> 1) as i32;
pub const MIN_SJ: i32 = -MAX_SJ;

const OFFSET_SBX: i32 = MAX_SBX;
const OFFSET_SJ: i32 = MAX_SJ;

/// Number of list items stored per SETLIST.
pub const FIELDS_PER_FLUSH: usize = 50;

/// Operation codes. `R` is a register, `K` a constant, `U` an upvalue,
/// `RK(C)` is `K[C]` when k is set and `R[C]` otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// R[A] := R[B]
    Move = 0,
    /// R[A] := sBx
    LoadI,
    /// R[A] := K[Bx]
    LoadK,
    LoadFalse,
    /// R[A] := false; pc++
    LFalseSkip,
    LoadTrue,
    /// R[A], ..., R[A+B] := nil
    LoadNil,
    GetUpval,
    /// U[B] := R[A]
    SetUpval,
    /// R[A] := U[B][K[C]]
    GetTabUp,
    /// R[A] := R[B][R[C]]
    GetTable,
    /// R[A] := R[B][C]
    GetI,
    /// R[A] := R[B][K[C]]
    GetField,
    /// U[A][K[B]] := RK(C)
    SetTabUp,
    /// R[A][R[B]] := RK(C)
    SetTable,
    /// R[A][B] := RK(C)
    SetI,
    /// R[A][K[B]] := RK(C)
    SetField,
    /// R[A] := {} with B hash and C array size hints
    NewTable,
    /// R[A+1] := R[B]; R[A] := R[B][RK(C)]
    Self_,
    /// R[A] := R[B] op K[C]
    AddK,
    SubK,
    MulK,
    ModK,
    PowK,
    DivK,
    IDivK,
    /// R[A] := R[B] op R[C]
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    /// Metamethod fallback for the preceding arithmetic op over R[A], R[B]
    /// with event C.
    MMBin,
    /// Fallback over R[A], K[B] with event C; k means the operands were swapped.
    MMBinK,
    Unm,
    BNot,
    Not,
    Len,
    /// R[A] := R[A] .. ... .. R[A+B-1]
    Concat,
    /// Close upvalues and to-be-closed variables >= R[A]
    Close,
    /// Mark R[A] as to-be-closed
    Tbc,
    /// pc += sJ
    Jmp,
    /// if ((R[A] == R[B]) ~= k) then pc++
    Eq,
    Lt,
    Le,
    /// if ((R[A] == K[B]) ~= k) then pc++
    EqK,
    /// if (not R[A] == k) then pc++
    Test,
    /// if (not R[B] == k) then pc++ else R[A] := R[B]
    TestSet,
    /// R[A], ..., R[A+C-2] := R[A](R[A+1], ..., R[A+B-1])
    Call,
    TailCall,
    /// return R[A], ..., R[A+B-2]
    Return,
    Return0,
    Return1,
    /// Numeric loop step; jump back Bx if the loop continues.
    ForLoop,
    /// Numeric loop setup; skip Bx+1 if the loop does not run.
    ForPrep,
    /// Mark R[A+3] to-be-closed; pc += Bx
    TForPrep,
    /// R[A+4], ..., R[A+3+C] := R[A](R[A+1], R[A+2])
    TForCall,
    /// if R[A+4] ~= nil then { R[A+2] := R[A+4]; pc -= Bx }
    TForLoop,
    /// R[A][C+i] := R[A+i], 1 <= i <= B; C comes from EXTRAARG when k is set
    SetList,
    /// R[A] := closure(children[Bx])
    Closure,
    /// R[A], ..., R[A+C-2] := varargs
    VarArg,
    /// Adjust vararg frame; A is the number of fixed parameters
    VarArgPrep,
    ExtraArg,
}

impl OpCode {
    pub const COUNT: usize = OpCode::ExtraArg as usize + 1;

    const ALL: [OpCode; OpCode::COUNT] = {
        use OpCode::*;
        [
            Move, LoadI, LoadK, LoadFalse, LFalseSkip, LoadTrue, LoadNil, GetUpval, SetUpval,
            GetTabUp, GetTable, GetI, GetField, SetTabUp, SetTable, SetI, SetField, NewTable,
            Self_, AddK, SubK, MulK, ModK, PowK, DivK, IDivK, Add, Sub, Mul, Mod, Pow, Div, IDiv,
            BAnd, BOr, BXor, Shl, Shr, MMBin, MMBinK, Unm, BNot, Not, Len, Concat, Close, Tbc,
            Jmp, Eq, Lt, Le, EqK, Test, TestSet, Call, TailCall, Return, Return0, Return1,
            ForLoop, ForPrep, TForPrep, TForCall, TForLoop, SetList, Closure, VarArg, VarArgPrep,
            ExtraArg,
        ]
    };

    pub fn from_u8(val: u8) -> Option<OpCode> {
        Self::ALL.get(val as usize).copied()
    }

    pub fn format(&self) -> InstructionFormat {
        use InstructionFormat::*;
        use OpCode::*;
        match self {
            ExtraArg => IAx,
            Jmp => IsJ,
            LoadI => IAsBx,
            LoadK | ForLoop | ForPrep | TForPrep | TForLoop | Closure => IABx,
            _ => IABC,
        }
    }

    pub fn name(&self) -> &'static str {
        use OpCode::*;
        match self {
            Move => "MOVE",
            LoadI => "LOADI",
            LoadK => "LOADK",
            LoadFalse => "LOADFALSE",
            LFalseSkip => "LFALSESKIP",
            LoadTrue => "LOADTRUE",
            LoadNil => "LOADNIL",
            GetUpval => "GETUPVAL",
            SetUpval => "SETUPVAL",
            GetTabUp => "GETTABUP",
            GetTable => "GETTABLE",
            GetI => "GETI",
            GetField => "GETFIELD",
            SetTabUp => "SETTABUP",
            SetTable => "SETTABLE",
            SetI => "SETI",
            SetField => "SETFIELD",
            NewTable => "NEWTABLE",
            Self_ => "SELF",
            AddK => "ADDK",
            SubK => "SUBK",
            MulK => "MULK",
            ModK => "MODK",
            PowK => "POWK",
            DivK => "DIVK",
            IDivK => "IDIVK",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Mod => "MOD",
            Pow => "POW",
            Div => "DIV",
            IDiv => "IDIV",
            BAnd => "BAND",
            BOr => "BOR",
            BXor => "BXOR",
            Shl => "SHL",
            Shr => "SHR",
            MMBin => "MMBIN",
            MMBinK => "MMBINK",
            Unm => "UNM",
            BNot => "BNOT",
            Not => "NOT",
            Len => "LEN",
            Concat => "CONCAT",
            Close => "CLOSE",
            Tbc => "TBC",
            Jmp => "JMP",
            Eq => "EQ",
            Lt => "LT",
            Le => "LE",
            EqK => "EQK",
            Test => "TEST",
            TestSet => "TESTSET",
            Call => "CALL",
            TailCall => "TAILCALL",
            Return => "RETURN",
            Return0 => "RETURN0",
            Return1 => "RETURN1",
            ForLoop => "FORLOOP",
            ForPrep => "FORPREP",
            TForPrep => "TFORPREP",
            TForCall => "TFORCALL",
            TForLoop => "TFORLOOP",
            SetList => "SETLIST",
            Closure => "CLOSURE",
            VarArg => "VARARG",
            VarArgPrep => "VARARGPREP",
            ExtraArg => "EXTRAARG",
        }
    }

    /// Conditional tests that are always followed by a jump.
    pub fn is_test(&self) -> bool {
        use OpCode::*;
        matches!(self, Eq | Lt | Le | EqK | Test | TestSet)
    }
}

/// Binary metamethod events named by MMBIN/MMBINK.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MetaEvent {
    Add = 0,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

impl MetaEvent {
    const ALL: [MetaEvent; 12] = {
        use MetaEvent::*;
        [Add, Sub, Mul, Mod, Pow, Div, IDiv, BAnd, BOr, BXor, Shl, Shr]
    };

    pub fn from_u8(val: u8) -> Option<MetaEvent> {
        Self::ALL.get(val as usize).copied()
    }

    /// Metatable key, e.g. `__add`.
    pub fn key(self) -> &'static str {
        match self {
            MetaEvent::Add => "__add",
            MetaEvent::Sub => "__sub",
            MetaEvent::Mul => "__mul",
            MetaEvent::Mod => "__mod",
            MetaEvent::Pow => "__pow",
            MetaEvent::Div => "__div",
            MetaEvent::IDiv => "__idiv",
            MetaEvent::BAnd => "__band",
            MetaEvent::BOr => "__bor",
            MetaEvent::BXor => "__bxor",
            MetaEvent::Shl => "__shl",
            MetaEvent::Shr => "__shr",
        }
    }

    pub fn is_bitwise(self) -> bool {
        self as u8 >= MetaEvent::BAnd as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionFormat {
    IABC,
    IABx,
    IAsBx,
    IAx,
    IsJ,
}

/// A 32-bit instruction.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    // ---- Constructors ----

    pub fn abc(op: OpCode, a: u8, b: u8, c: u8, k: bool) -> Self {
        let mut i = (op as u32) << POS_OP;
        i |= (k as u32) << POS_K;
        i |= (a as u32) << POS_A;
        i |= (b as u32) << POS_B;
        i |= (c as u32) << POS_C;
        Instruction(i)
    }

    pub fn abx(op: OpCode, a: u8, bx: u32) -> Self {
        debug_assert!(bx <= MAX_BX, "Bx out of range: {bx}");
        let mut i = (op as u32) << POS_OP;
        i |= (a as u32) << POS_A;
        i |= bx << POS_B;
        Instruction(i)
    }

    pub fn asbx(op: OpCode, a: u8, sbx: i32) -> Self {
        debug_assert!((MIN_SBX..=MAX_SBX).contains(&sbx), "sBx out of range: {sbx}");
        Self::abx(op, a, (sbx + OFFSET_SBX) as u32)
    }

    pub fn ax(op: OpCode, ax: u32) -> Self {
        debug_assert!(ax <= MAX_AX, "Ax out of range: {ax}");
        Instruction(((op as u32) << POS_OP) | (ax << POS_A))
    }

    pub fn sj(op: OpCode, sj: i32) -> Self {
        debug_assert!((MIN_SJ..=MAX_SJ).contains(&sj), "sJ out of range: {sj}");
        let val = (sj + OFFSET_SJ) as u32;
        Instruction(((op as u32) << POS_OP) | (val << POS_A))
    }

    // ---- Decoders ----

    pub fn opcode(&self) -> OpCode {
        let val = (self.0 >> POS_OP) & mask(SIZE_OP);
        OpCode::from_u8(val as u8).unwrap_or(OpCode::Move)
    }

    pub fn k(&self) -> bool {
        ((self.0 >> POS_K) & 1) != 0
    }

    pub fn a(&self) -> u8 {
        ((self.0 >> POS_A) & mask(SIZE_A)) as u8
    }

    pub fn b(&self) -> u8 {
        ((self.0 >> POS_B) & mask(SIZE_B)) as u8
    }

    pub fn c(&self) -> u8 {
        ((self.0 >> POS_C) & mask(SIZE_C)) as u8
    }

    pub fn bx(&self) -> u32 {
        (self.0 >> POS_B) & mask(SIZE_BX)
    }

    pub fn sbx(&self) -> i32 {
        self.bx() as i32 - OFFSET_SBX
    }

    pub fn ax_field(&self) -> u32 {
        (self.0 >> POS_A) & mask(SIZE_AX)
    }

    pub fn get_sj(&self) -> i32 {
        let val = (self.0 >> POS_A) & mask(SIZE_SJ);
        val as i32 - OFFSET_SJ
    }

    // ---- Mutators (for backpatching) ----

    pub fn set_a(&mut self, a: u8) {
        self.0 = (self.0 & !(mask(SIZE_A) << POS_A)) | ((a as u32) << POS_A);
    }

    pub fn set_b(&mut self, b: u8) {
        self.0 = (self.0 & !(mask(SIZE_B) << POS_B)) | ((b as u32) << POS_B);
    }

    pub fn set_c(&mut self, c: u8) {
        self.0 = (self.0 & !(mask(SIZE_C) << POS_C)) | ((c as u32) << POS_C);
    }

    pub fn set_bx(&mut self, bx: u32) {
        debug_assert!(bx <= MAX_BX);
        self.0 = (self.0 & !(mask(SIZE_BX) << POS_B)) | (bx << POS_B);
    }

    pub fn set_sbx(&mut self, sbx: i32) {
        debug_assert!((MIN_SBX..=MAX_SBX).contains(&sbx));
        self.set_bx((sbx + OFFSET_SBX) as u32);
    }

    pub fn set_sj(&mut self, sj: i32) {
        debug_assert!((MIN_SJ..=MAX_SJ).contains(&sj));
        let val = (sj + OFFSET_SJ) as u32;
        self.0 = (self.0 & !(mask(SIZE_SJ) << POS_A)) | (val << POS_A);
    }

    pub fn set_k(&mut self, k: bool) {
        self.0 = (self.0 & !(1 << POS_K)) | ((k as u32) << POS_K);
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode();
        write!(f, "{}", op.name())?;
        match op.format() {
            InstructionFormat::IABC => {
                write!(f, " A={} B={} C={}", self.a(), self.b(), self.c())?;
                if self.k() {
                    write!(f, " k")?;
                }
            }
            InstructionFormat::IABx => write!(f, " A={} Bx={}", self.a(), self.bx())?,
            InstructionFormat::IAsBx => write!(f, " A={} sBx={}", self.a(), self.sbx())?,
            InstructionFormat::IAx => write!(f, " Ax={}", self.ax_field())?,
            InstructionFormat::IsJ => write!(f, " sJ={}", self.get_sj())?,
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
