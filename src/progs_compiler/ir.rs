// Intermediate Representation for the progs compiler
//
// Each node pairs an optional instruction with the reference holding its
// result. Nodes without an instruction are markers: a declaration, or a
// value that already lives somewhere (constant, variable, member offset).

use super::instruction::{Instruction, Ref};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Ir {
    pub instruction: Option<Instruction>,
    pub result: Ref,
    pub name: String,
}

impl Ir {
    pub fn new(instruction: Instruction, result: Ref, name: impl Into<String>) -> Self {
        Ir {
            instruction: Some(instruction),
            result,
            name: name.into(),
        }
    }

    /// Marker carrying a result without emitting anything
    pub fn value(result: Ref, name: impl Into<String>) -> Self {
        Ir {
            instruction: None,
            result,
            name: name.into(),
        }
    }

    pub fn label(id: impl Into<String>) -> Self {
        let id = id.into();
        Ir::new(Instruction::Label(id.clone()), Ref::Null, id)
    }

    pub fn statement_count(&self) -> usize {
        self.instruction
            .as_ref()
            .map_or(0, |instruction| instruction.statement_count())
    }
}

impl fmt::Display for Ir {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.instruction {
            Some(instruction) => write!(f, "{} /* {} */", instruction, self.name),
            None => write!(f, "{} /* {} */", self.result, self.name),
        }
    }
}

/// Result reference of a lowered sequence (the last node's result)
pub fn result_of(ir: &[Ir]) -> Ref {
    ir.last().map_or(Ref::Null, |node| node.result)
}

/// Total VM statements a sequence will emit
pub fn statement_count(ir: &[Ir]) -> usize {
    ir.iter().map(Ir::statement_count).sum()
}

/// Function-table facts known before emission
#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    /// Index in the function table (0 is the null function)
    pub index: usize,
    pub builtin: Option<i32>,
    pub param_sizes: Vec<u8>,
    /// `None` for prototypes that were never defined
    pub body: Option<Vec<Ir>>,
}

impl IrFunction {
    pub fn num_params(&self) -> usize {
        self.param_sizes.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrProgram {
    /// Ordered by function-table index
    pub functions: Vec<IrFunction>,
    pub declarations: Vec<Ir>,
}

impl fmt::Display for IrProgram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for declaration in &self.declarations {
            writeln!(f, "{}", declaration)?;
        }
        for function in &self.functions {
            match (&function.builtin, &function.body) {
                (Some(number), _) => writeln!(f, "function {} = #{}", function.name, number)?,
                (None, None) => writeln!(f, "function {};", function.name)?,
                (None, Some(body)) => {
                    writeln!(f, "function {} {{", function.name)?;
                    for node in body {
                        writeln!(f, "    {}", node)?;
                    }
                    writeln!(f, "}}")?;
                }
            }
        }
        Ok(())
    }
}
