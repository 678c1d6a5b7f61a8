// Binary image emitter
//
// Linearizes each function's IR into VM statements, resolves label jumps
// once the whole function is emitted, then lays out the global and field
// definitions, the function table, global data and the string blob.

use super::allocator::{Allocator, Entry};
use super::config::CompilerOptions;
use super::error::CompilerError;
use super::instruction::{BinaryInstr, Instruction, Jump, Ref, MAX_PARAMS};
use super::ir::{Ir, IrFunction, IrProgram};
use super::opcodes::Opcode;
use super::program::{Definition, FunctionRecord, Header, ProgramData, Statement, StringTable};
use super::types::Type;
use super::value::Value;
use indexmap::IndexMap;

/// Definition type tag written for a static type
pub fn type_tag(ty: &Type) -> u16 {
    match ty {
        Type::Void => 0,
        Type::String => 1,
        Type::Float | Type::Int | Type::Bool => 2,
        Type::Vector => 3,
        Type::Entity => 4,
        Type::Field(_) => 5,
        Type::Function { .. } => 6,
        Type::Struct(_) | Type::Array(..) => 7,
    }
}

// Typed opcode variants, indexed by `variant`
const LOAD: [Opcode; 6] = [
    Opcode::LoadF,
    Opcode::LoadV,
    Opcode::LoadS,
    Opcode::LoadEnt,
    Opcode::LoadFld,
    Opcode::LoadFnc,
];
const STORE: [Opcode; 6] = [
    Opcode::StoreF,
    Opcode::StoreV,
    Opcode::StoreS,
    Opcode::StoreEnt,
    Opcode::StoreFld,
    Opcode::StoreFnc,
];
const STOREP: [Opcode; 6] = [
    Opcode::StorePF,
    Opcode::StorePV,
    Opcode::StorePS,
    Opcode::StorePEnt,
    Opcode::StorePFld,
    Opcode::StorePFnc,
];
// no field variants: field offsets compare as function numbers do
const EQ: [Opcode; 6] = [
    Opcode::EqF,
    Opcode::EqV,
    Opcode::EqS,
    Opcode::EqE,
    Opcode::EqFnc,
    Opcode::EqFnc,
];
const NE: [Opcode; 6] = [
    Opcode::NeF,
    Opcode::NeV,
    Opcode::NeS,
    Opcode::NeE,
    Opcode::NeFnc,
    Opcode::NeFnc,
];
const NOT: [Opcode; 6] = [
    Opcode::NotF,
    Opcode::NotV,
    Opcode::NotS,
    Opcode::NotEnt,
    Opcode::NotFnc,
    Opcode::NotFnc,
];

/// Pick the typed variant of an opcode family. Types without a variant
/// fall back to the float form.
fn typed(table: &[Opcode; 6], ty: &Type) -> Opcode {
    let variant = match ty {
        Type::Float | Type::Int | Type::Bool => 0,
        Type::Vector => 1,
        Type::String => 2,
        Type::Entity => 3,
        Type::Field(_) => 4,
        Type::Function { .. } => 5,
        other => {
            log::warn!(
                "no {} variant for type {}, using {}",
                table[0].name(),
                other,
                table[0].name()
            );
            0
        }
    };
    table[variant]
}

fn binary_opcode(op: &BinaryInstr) -> Opcode {
    match op {
        BinaryInstr::MulFloat => Opcode::MulF,
        BinaryInstr::MulVec => Opcode::MulV,
        BinaryInstr::MulFloatVec => Opcode::MulFV,
        BinaryInstr::MulVecFloat => Opcode::MulVF,
        BinaryInstr::DivFloat => Opcode::DivF,
        BinaryInstr::AddFloat => Opcode::AddF,
        BinaryInstr::AddVec => Opcode::AddV,
        BinaryInstr::SubFloat => Opcode::SubF,
        BinaryInstr::SubVec => Opcode::SubV,
        BinaryInstr::Eq(ty) => typed(&EQ, ty),
        BinaryInstr::Ne(ty) => typed(&NE, ty),
        BinaryInstr::Le => Opcode::Le,
        BinaryInstr::Ge => Opcode::Ge,
        BinaryInstr::Lt => Opcode::Lt,
        BinaryInstr::Gt => Opcode::Gt,
        BinaryInstr::And => Opcode::And,
        BinaryInstr::Or => Opcode::Or,
        BinaryInstr::BitAnd => Opcode::BitAnd,
        BinaryInstr::BitOr => Opcode::BitOr,
    }
}

/// Label positions and the jumps waiting on them, for one function
#[derive(Debug, Default)]
pub struct JumpManager {
    labels: IndexMap<String, usize>,
    deferred: Vec<(String, usize)>,
}

impl JumpManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&mut self, id: &str, statement: usize) -> Result<(), CompilerError> {
        if self.labels.insert(id.to_string(), statement).is_some() {
            return Err(CompilerError::UnsupportedConstruct(format!(
                "label '{}' defined twice",
                id
            )));
        }
        Ok(())
    }

    pub fn defer(&mut self, id: &str, statement: usize) {
        self.deferred.push((id.to_string(), statement));
    }

    /// Patch every deferred jump with `target - issuer`
    pub fn fixup(&self, statements: &mut [Statement]) -> Result<(), CompilerError> {
        for (id, issuer) in &self.deferred {
            let target = *self
                .labels
                .get(id)
                .ok_or_else(|| CompilerError::UndefinedSymbol(id.clone()))?;
            let relative = target as i64 - *issuer as i64;
            if relative == 0 {
                return Err(CompilerError::MalformedJump {
                    label: id.clone(),
                    statement: *issuer,
                });
            }
            let relative = i16::try_from(relative).map_err(|_| {
                CompilerError::ImageFormat(format!("jump to '{}' spans {} statements", id, relative))
            })?;
            let statement = statements.get_mut(*issuer).ok_or_else(|| {
                CompilerError::ImageFormat(format!("jump issued from missing statement {}", issuer))
            })?;
            match statement.op.jump_operand() {
                Some(0) => statement.a = relative,
                Some(_) => statement.b = relative,
                None => {
                    return Err(CompilerError::ImageFormat(format!(
                        "{} at {} is not a jump",
                        statement.op, issuer
                    )))
                }
            }
            log::debug!("FIXUP {} @{} -> {:+}", id, issuer, relative);
        }
        Ok(())
    }
}

pub struct ProgramEmitter<'a> {
    allocator: &'a mut Allocator,
    options: &'a CompilerOptions,
}

impl<'a> ProgramEmitter<'a> {
    pub fn new(allocator: &'a mut Allocator, options: &'a CompilerOptions) -> Self {
        ProgramEmitter { allocator, options }
    }

    pub fn emit(&mut self, program: &IrProgram) -> Result<ProgramData, CompilerError> {
        let globals: Vec<Entry> = self
            .allocator
            .references()
            .all()
            .iter()
            .chain(self.allocator.constants().all())
            .filter(|entry| matches!(entry.reference, Ref::Global(_)))
            .cloned()
            .collect();
        let local_ofs = globals
            .iter()
            .map(|entry| entry.reference.to_global(0) + entry.ty.size_of() as i32)
            .fold(self.options.user_storage_start, i32::max);
        let num_locals = self
            .allocator
            .references()
            .all()
            .iter()
            .filter_map(|entry| match entry.reference {
                Ref::Local(i) => Some(i + entry.ty.size_of() as i32),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        let mut statements = vec![Statement::new(Opcode::Done, 0, 0, 0)];
        let mut functions = vec![FunctionRecord::default()];
        let options = self.options;
        let file = self.string_offset(&options.source_name);
        for function in &program.functions {
            if function.index != functions.len() {
                return Err(CompilerError::ImageFormat(format!(
                    "function '{}' has table index {}, expected {}",
                    function.name,
                    function.index,
                    functions.len()
                )));
            }
            let first_statement = match (function.builtin, &function.body) {
                (Some(number), _) => -number,
                (None, None) => {
                    log::warn!("function '{}' is declared but never defined", function.name);
                    0
                }
                (None, Some(body)) => {
                    let first = statements.len() as i32;
                    statements.extend(self.emit_body(function, body, local_ofs)?);
                    first
                }
            };
            let mut param_sizes = [0u8; 8];
            for (slot, size) in param_sizes.iter_mut().zip(&function.param_sizes) {
                *slot = *size;
            }
            functions.push(FunctionRecord {
                first_statement,
                first_local: local_ofs,
                num_locals,
                profile: 0,
                name: self.string_offset(&function.name),
                file,
                num_params: function.num_params() as i32,
                param_sizes,
            });
        }

        let mut global_data = vec![0u32; (local_ofs + num_locals) as usize];
        let mut global_defs = Vec::with_capacity(globals.len());
        for entry in &globals {
            let index = entry.reference.to_global(0);
            global_defs.push(Definition {
                ty: type_tag(&entry.ty),
                offset: global_index(index)?,
                name: self.string_offset(&entry.name),
            });
            if let Some(value) = &entry.value {
                self.write_value(&mut global_data, index as usize, value);
            }
        }

        let fields: Vec<(String, i32, Type)> = self
            .allocator
            .fields()
            .map(|slot| (slot.name.clone(), slot.offset, slot.ty.clone()))
            .collect();
        let mut field_defs = Vec::with_capacity(fields.len());
        for (name, offset, ty) in &fields {
            field_defs.push(Definition {
                ty: type_tag(ty),
                offset: global_index(*offset)?,
                name: self.string_offset(name),
            });
        }

        let strings = StringTable::new(
            self.allocator
                .strings()
                .all()
                .iter()
                .map(|entry| entry.name.clone())
                .collect(),
        );
        let mut data = ProgramData {
            header: Header {
                version: self.options.version,
                crc: self.options.crc,
                entity_fields: self.allocator.entity_field_count(),
                ..Header::default()
            },
            statements,
            global_defs,
            field_defs,
            functions,
            global_data,
            strings,
        };
        data.layout();
        log::info!(
            "Emitted {} statements, {} functions, {} globals ({} locals at {}), {} fields, {} bytes of strings",
            data.statements.len(),
            data.functions.len(),
            data.global_data.len(),
            num_locals,
            local_ofs,
            data.field_defs.len(),
            data.strings.size()
        );
        Ok(data)
    }

    fn string_offset(&mut self, text: &str) -> i32 {
        self.allocator.allocate_string(text).reference.to_global(0)
    }

    fn write_value(&mut self, data: &mut [u32], index: usize, value: &Value) {
        let mut put = |at: usize, word: u32| {
            if let Some(slot) = data.get_mut(at) {
                *slot = word;
            }
        };
        match value {
            Value::Int(i) => put(index, (*i as f32).to_bits()),
            Value::Float(f) => put(index, f.to_bits()),
            Value::Vector(v) => {
                for (i, component) in v.iter().enumerate() {
                    put(index + i, component.to_bits());
                }
            }
            Value::Pointer(p) => put(index, *p as u32),
            Value::String(text) => {
                let offset = self.string_offset(text);
                put(index, offset as u32);
            }
        }
    }

    fn emit_body(
        &mut self,
        function: &IrFunction,
        body: &[Ir],
        local_ofs: i32,
    ) -> Result<Vec<Statement>, CompilerError> {
        let mut jumps = JumpManager::new();
        let mut code: Vec<Statement> = Vec::new();
        let at = |r: Ref| operand(r, local_ofs);

        for node in body {
            let Some(instruction) = &node.instruction else {
                continue;
            };
            let statement = code.len();
            match instruction {
                Instruction::Label(id) => {
                    jumps.label(id, statement)?;
                    continue;
                }
                Instruction::Call { function, args } => {
                    for (i, (arg, ty)) in args.iter().take(MAX_PARAMS).enumerate() {
                        code.push(Statement::new(
                            typed(&STORE, ty),
                            at(*arg)?,
                            at(Ref::param(i))?,
                            0,
                        ));
                    }
                    let op = Opcode::call(args.len().min(MAX_PARAMS)).unwrap_or(Opcode::Call8);
                    code.push(Statement::new(op, at(*function)?, 0, 0));
                    continue;
                }
                _ => {}
            }
            let emitted = match instruction {
                Instruction::Binary {
                    op,
                    left,
                    right,
                    out,
                } => Statement::new(binary_opcode(op), at(*left)?, at(*right)?, at(*out)?),
                Instruction::Not { ty, operand, out } => {
                    Statement::new(typed(&NOT, ty), at(*operand)?, 0, at(*out)?)
                }
                Instruction::Load {
                    ty,
                    entity,
                    field,
                    out,
                } => Statement::new(typed(&LOAD, ty), at(*entity)?, at(*field)?, at(*out)?),
                Instruction::Address { entity, field, out } => {
                    Statement::new(Opcode::Address, at(*entity)?, at(*field)?, at(*out)?)
                }
                Instruction::Store { ty, value, target } => {
                    Statement::new(typed(&STORE, ty), at(*value)?, at(*target)?, 0)
                }
                Instruction::StoreP { ty, value, pointer } => {
                    Statement::new(typed(&STOREP, ty), at(*value)?, at(*pointer)?, 0)
                }
                Instruction::Return { value } => Statement::new(Opcode::Return, at(*value)?, 0, 0),
                Instruction::Goto(target) => {
                    let offset = jump(&mut jumps, target, statement)?;
                    Statement::new(Opcode::Goto, offset, 0, 0)
                }
                Instruction::If {
                    condition,
                    expect,
                    target,
                } => {
                    let op = if *expect { Opcode::If } else { Opcode::IfNot };
                    let offset = jump(&mut jumps, target, statement)?;
                    Statement::new(op, at(*condition)?, offset, 0)
                }
                Instruction::Done => Statement::new(Opcode::Done, 0, 0, 0),
                Instruction::Label(_) | Instruction::Call { .. } => continue,
            };
            code.push(emitted);
        }
        code.push(Statement::new(Opcode::Done, 0, 0, 0));
        jumps.fixup(&mut code)?;
        log::debug!("FUNCTION '{}': {} statements", function.name, code.len());
        Ok(code)
    }
}

fn operand(reference: Ref, local_ofs: i32) -> Result<i16, CompilerError> {
    let index = reference.to_global(local_ofs);
    i16::try_from(index).map_err(|_| {
        CompilerError::ImageFormat(format!(
            "global {} does not fit a statement operand",
            index
        ))
    })
}

fn global_index(index: i32) -> Result<u16, CompilerError> {
    u16::try_from(index)
        .map_err(|_| CompilerError::ImageFormat(format!("definition offset {} out of range", index)))
}

/// Relative offset operand, or 0 with the jump deferred until fixup
fn jump(jumps: &mut JumpManager, target: &Jump, statement: usize) -> Result<i16, CompilerError> {
    match target {
        Jump::Relative(0) => Err(CompilerError::MalformedJump {
            label: target.to_string(),
            statement,
        }),
        Jump::Relative(offset) => i16::try_from(*offset).map_err(|_| {
            CompilerError::ImageFormat(format!("relative jump {} out of range", offset))
        }),
        Jump::Label(id) => {
            jumps.defer(id, statement);
            Ok(0)
        }
        Jump::Break | Jump::Continue => Err(CompilerError::UnsupportedConstruct(format!(
            "{} outside of a loop",
            target
        ))),
    }
}

#[cfg(test)]
#[path = "emit_tests.rs"]
mod tests;
