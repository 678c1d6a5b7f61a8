//! Progs VM Opcodes
//!
//! Raw statement opcodes of the progs virtual machine. Every statement is
//! `{op, a, b, c}`; the operand roles per opcode are:
//!
//! - arithmetic, comparison, logic: `c = a op b`
//! - `NOT_*`: `c = !a`
//! - `LOAD_*`: `c = a.b` (entity `a`, field offset `b`)
//! - `ADDRESS`: `c = &a.b`
//! - `STORE_*`: `b = a`
//! - `STOREP_*`: `*b = a`
//! - `RETURN`: `a` is the returned value
//! - `IF`/`IFNOT`: `a` is the condition, `b` the relative jump
//! - `GOTO`: `a` is the relative jump
//! - `CALL0`..`CALL8`: `a` holds the function number, arguments are
//!   already copied into the parameter slots

use std::fmt;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Done = 0,
    MulF = 1,
    MulV = 2,
    MulFV = 3,
    MulVF = 4,
    DivF = 5,
    AddF = 6,
    AddV = 7,
    SubF = 8,
    SubV = 9,
    EqF = 10,
    EqV = 11,
    EqS = 12,
    EqE = 13,
    EqFnc = 14,
    NeF = 15,
    NeV = 16,
    NeS = 17,
    NeE = 18,
    NeFnc = 19,
    Le = 20,
    Ge = 21,
    Lt = 22,
    Gt = 23,
    LoadF = 24,
    LoadV = 25,
    LoadS = 26,
    LoadEnt = 27,
    LoadFld = 28,
    LoadFnc = 29,
    Address = 30,
    StoreF = 31,
    StoreV = 32,
    StoreS = 33,
    StoreEnt = 34,
    StoreFld = 35,
    StoreFnc = 36,
    StorePF = 37,
    StorePV = 38,
    StorePS = 39,
    StorePEnt = 40,
    StorePFld = 41,
    StorePFnc = 42,
    Return = 43,
    NotF = 44,
    NotV = 45,
    NotS = 46,
    NotEnt = 47,
    NotFnc = 48,
    If = 49,
    IfNot = 50,
    Call0 = 51,
    Call1 = 52,
    Call2 = 53,
    Call3 = 54,
    Call4 = 55,
    Call5 = 56,
    Call6 = 57,
    Call7 = 58,
    Call8 = 59,
    State = 60,
    Goto = 61,
    And = 62,
    Or = 63,
    BitAnd = 64,
    BitOr = 65,
}

const ALL: [Opcode; 66] = [
    Opcode::Done,
    Opcode::MulF,
    Opcode::MulV,
    Opcode::MulFV,
    Opcode::MulVF,
    Opcode::DivF,
    Opcode::AddF,
    Opcode::AddV,
    Opcode::SubF,
    Opcode::SubV,
    Opcode::EqF,
    Opcode::EqV,
    Opcode::EqS,
    Opcode::EqE,
    Opcode::EqFnc,
    Opcode::NeF,
    Opcode::NeV,
    Opcode::NeS,
    Opcode::NeE,
    Opcode::NeFnc,
    Opcode::Le,
    Opcode::Ge,
    Opcode::Lt,
    Opcode::Gt,
    Opcode::LoadF,
    Opcode::LoadV,
    Opcode::LoadS,
    Opcode::LoadEnt,
    Opcode::LoadFld,
    Opcode::LoadFnc,
    Opcode::Address,
    Opcode::StoreF,
    Opcode::StoreV,
    Opcode::StoreS,
    Opcode::StoreEnt,
    Opcode::StoreFld,
    Opcode::StoreFnc,
    Opcode::StorePF,
    Opcode::StorePV,
    Opcode::StorePS,
    Opcode::StorePEnt,
    Opcode::StorePFld,
    Opcode::StorePFnc,
    Opcode::Return,
    Opcode::NotF,
    Opcode::NotV,
    Opcode::NotS,
    Opcode::NotEnt,
    Opcode::NotFnc,
    Opcode::If,
    Opcode::IfNot,
    Opcode::Call0,
    Opcode::Call1,
    Opcode::Call2,
    Opcode::Call3,
    Opcode::Call4,
    Opcode::Call5,
    Opcode::Call6,
    Opcode::Call7,
    Opcode::Call8,
    Opcode::State,
    Opcode::Goto,
    Opcode::And,
    Opcode::Or,
    Opcode::BitAnd,
    Opcode::BitOr,
];

impl Opcode {
    pub fn raw_value(self) -> u16 {
        self as u16
    }

    pub fn from_raw(raw: u16) -> Option<Opcode> {
        ALL.get(raw as usize).copied()
    }

    /// CALL0..CALL8 for the given argument count
    pub fn call(args: usize) -> Option<Opcode> {
        if args > 8 {
            return None;
        }
        Opcode::from_raw(Opcode::Call0 as u16 + args as u16)
    }

    /// Mnemonic as printed by disassemblers
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Done => "DONE",
            Opcode::MulF => "MUL_F",
            Opcode::MulV => "MUL_V",
            Opcode::MulFV => "MUL_FV",
            Opcode::MulVF => "MUL_VF",
            Opcode::DivF => "DIV_F",
            Opcode::AddF => "ADD_F",
            Opcode::AddV => "ADD_V",
            Opcode::SubF => "SUB_F",
            Opcode::SubV => "SUB_V",
            Opcode::EqF => "EQ_F",
            Opcode::EqV => "EQ_V",
            Opcode::EqS => "EQ_S",
            Opcode::EqE => "EQ_E",
            Opcode::EqFnc => "EQ_FNC",
            Opcode::NeF => "NE_F",
            Opcode::NeV => "NE_V",
            Opcode::NeS => "NE_S",
            Opcode::NeE => "NE_E",
            Opcode::NeFnc => "NE_FNC",
            Opcode::Le => "LE",
            Opcode::Ge => "GE",
            Opcode::Lt => "LT",
            Opcode::Gt => "GT",
            Opcode::LoadF => "LOAD_F",
            Opcode::LoadV => "LOAD_V",
            Opcode::LoadS => "LOAD_S",
            Opcode::LoadEnt => "LOAD_ENT",
            Opcode::LoadFld => "LOAD_FLD",
            Opcode::LoadFnc => "LOAD_FNC",
            Opcode::Address => "ADDRESS",
            Opcode::StoreF => "STORE_F",
            Opcode::StoreV => "STORE_V",
            Opcode::StoreS => "STORE_S",
            Opcode::StoreEnt => "STORE_ENT",
            Opcode::StoreFld => "STORE_FLD",
            Opcode::StoreFnc => "STORE_FNC",
            Opcode::StorePF => "STOREP_F",
            Opcode::StorePV => "STOREP_V",
            Opcode::StorePS => "STOREP_S",
            Opcode::StorePEnt => "STOREP_ENT",
            Opcode::StorePFld => "STOREP_FLD",
            Opcode::StorePFnc => "STOREP_FNC",
            Opcode::Return => "RETURN",
            Opcode::NotF => "NOT_F",
            Opcode::NotV => "NOT_V",
            Opcode::NotS => "NOT_S",
            Opcode::NotEnt => "NOT_ENT",
            Opcode::NotFnc => "NOT_FNC",
            Opcode::If => "IF",
            Opcode::IfNot => "IFNOT",
            Opcode::Call0 => "CALL0",
            Opcode::Call1 => "CALL1",
            Opcode::Call2 => "CALL2",
            Opcode::Call3 => "CALL3",
            Opcode::Call4 => "CALL4",
            Opcode::Call5 => "CALL5",
            Opcode::Call6 => "CALL6",
            Opcode::Call7 => "CALL7",
            Opcode::Call8 => "CALL8",
            Opcode::State => "STATE",
            Opcode::Goto => "GOTO",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::BitAnd => "BITAND",
            Opcode::BitOr => "BITOR",
        }
    }

    /// Jump opcodes and the operand (0 = a, 1 = b) holding the offset
    pub fn jump_operand(self) -> Option<usize> {
        match self {
            Opcode::Goto => Some(0),
            Opcode::If | Opcode::IfNot => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
#[path = "opcodes_tests.rs"]
mod tests;
