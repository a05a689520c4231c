/// Bytecode instruction set.
///
/// Every instruction is one opcode byte, optionally followed by big-endian
/// operands read from the program image. Binary operators pop twice and the
/// value popped first is the left-hand operand: `PUSH a; PUSH b; SUB`
/// computes `b - a`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// PUSH (0): push a sign-extended 4-byte operand.
    Push = 0,
    /// LPSH (1): push an 8-byte operand.
    Lpsh = 1,
    /// PROC (2): operands priority(4) name_len(2) name. Spawns a child
    /// process and pushes its id.
    Proc = 2,
    /// PROCFUN (3): operand offset(4). Pops a process id and binds that
    /// process to this program entered at `offset`.
    ProcFun = 3,
    /// PRCE (4): pops a process id and dispatches it to a worker.
    Prce = 4,
    Add = 5,
    Sub = 6,
    Mul = 7,
    Div = 8,
    Mod = 9,
    Equals = 10,
    /// LOGAND (11): 1 when both operands are positive.
    LogAnd = 11,
    /// LOGOR (12): 1 when either operand is positive.
    LogOr = 12,
    /// LOGSHFT (13): unsigned right shift.
    LogShift = 13,
    And = 14,
    Or = 15,
    Xor = 16,
    Not = 17,
    LShift = 18,
    /// RSHIFT (19): arithmetic right shift.
    RShift = 19,
    /// ISTORE (20): reserved.
    IStore = 20,
    /// ILOAD (21): reserved.
    ILoad = 21,
    /// JUMP (22): operand target(4), an offset from the image start.
    Jump = 22,
    /// IF (23): pops a condition. Branching is reserved; execution always
    /// falls through.
    If = 23,
    CmpG = 24,
    CmpL = 25,
    CmpGe = 26,
    CmpLe = 27,
    /// APUSH (28): operand len(2) bytes. Copies the literal into a fresh heap
    /// allocation and pushes its address.
    APush = 28,
    /// PRINT (29): pops a heap address and writes the allocation as text.
    Print = 29,
    /// POP (30): discard the top slot.
    Pop = 30,
    /// DREF (31): reserved.
    Dref = 31,
    /// AREF (32): reserved.
    Aref = 32,
    /// CALL (33): pops a tagged function word, tag in the top byte and the
    /// address in the low 24 bits. Dispatch is not implemented.
    Call = 33,
    /// HALT (127): hangs the process and pops a flag. Nonzero halts only this
    /// process, zero halts its whole subtree.
    Halt = 127,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        use Opcode::*;
        Some(match value {
            0 => Push,
            1 => Lpsh,
            2 => Proc,
            3 => ProcFun,
            4 => Prce,
            5 => Add,
            6 => Sub,
            7 => Mul,
            8 => Div,
            9 => Mod,
            10 => Equals,
            11 => LogAnd,
            12 => LogOr,
            13 => LogShift,
            14 => And,
            15 => Or,
            16 => Xor,
            17 => Not,
            18 => LShift,
            19 => RShift,
            20 => IStore,
            21 => ILoad,
            22 => Jump,
            23 => If,
            24 => CmpG,
            25 => CmpL,
            26 => CmpGe,
            27 => CmpLe,
            28 => APush,
            29 => Print,
            30 => Pop,
            31 => Dref,
            32 => Aref,
            33 => Call,
            127 => Halt,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Bytes of fixed-width operand following the opcode. `PROC` and
    /// `APUSH` carry a variable tail after these bytes.
    pub fn operand_bytes(self) -> u32 {
        use Opcode::*;
        match self {
            Push | ProcFun | Jump => 4,
            Lpsh => 8,
            Proc => 6,
            APush => 2,
            _ => 0,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Push => "PUSH",
            Lpsh => "LPSH",
            Proc => "PROC",
            ProcFun => "PROCFUN",
            Prce => "PRCE",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            Equals => "EQUALS",
            LogAnd => "LOGAND",
            LogOr => "LOGOR",
            LogShift => "LOGSHFT",
            And => "AND",
            Or => "OR",
            Xor => "XOR",
            Not => "NOT",
            LShift => "LSHIFT",
            RShift => "RSHIFT",
            IStore => "ISTORE",
            ILoad => "ILOAD",
            Jump => "JUMP",
            If => "IF",
            CmpG => "CMPG",
            CmpL => "CMPL",
            CmpGe => "CMPGE",
            CmpLe => "CMPLE",
            APush => "APUSH",
            Print => "PRINT",
            Pop => "POP",
            Dref => "DREF",
            Aref => "AREF",
            Call => "CALL",
            Halt => "HALT",
        }
    }
}
