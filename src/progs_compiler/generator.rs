// Expression -> IR generator
//
// Lowers each expression tree into IR, threading the result reference of
// every subexpression into its parent. Operators go through the registry;
// control flow lives in ir_gen_control.rs and stores in ir_gen_lvalues.rs.

use super::allocator::{Allocator, Entry, ScopeKind, Storage};
use super::ast::{BinaryOp, Expr, FunctionDecl, UnaryOp};
use super::config::CompilerOptions;
use super::error::CompilerError;
use super::instruction::{Instruction, Jump, Ref, MAX_PARAMS};
use super::ir::{result_of, Ir, IrFunction, IrProgram};
use super::reduce::reduce;
use super::registry::{OperationRegistry, BUILTIN_MOD, BUILTIN_XOR};
use super::types::Type;
use super::value::Value;
use indexmap::IndexMap;
use std::collections::VecDeque;

pub struct Generator<'a> {
    registry: &'a OperationRegistry,
    options: CompilerOptions,
    allocator: Allocator,
    functions: IndexMap<usize, IrFunction>,
    /// name -> (function index, has a body or builtin number)
    declared: IndexMap<String, (usize, bool)>,
    /// Function indices in root order, consumed by the generation pass
    pending: VecDeque<usize>,
    declarations: Vec<Ir>,
    label_counter: usize,
}

impl<'a> Generator<'a> {
    pub fn new(registry: &'a OperationRegistry, options: CompilerOptions) -> Self {
        let allocator = Allocator::new(options.clone());
        Generator {
            registry,
            options,
            allocator,
            functions: IndexMap::new(),
            declared: IndexMap::new(),
            pending: VecDeque::new(),
            declarations: Vec::new(),
            label_counter: 0,
        }
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut Allocator {
        &mut self.allocator
    }

    pub fn into_allocator(self) -> Allocator {
        self.allocator
    }

    /// Lower a whole compilation unit. Globals and function signatures are
    /// allocated first (declaration order) so bodies may refer forward.
    pub fn generate_program(&mut self, roots: Vec<Expr>) -> Result<IrProgram, CompilerError> {
        let roots: Vec<Expr> = roots.into_iter().map(reduce).collect();

        for root in &roots {
            self.declare_globals(root)?;
        }
        for root in &roots {
            self.generate_root(root)?;
        }

        let mut functions: Vec<IrFunction> = self.functions.values().cloned().collect();
        functions.sort_by_key(|function| function.index);
        log::debug!(
            "IR generated: {} functions, {} globals",
            functions.len(),
            self.declarations.len()
        );
        Ok(IrProgram {
            functions,
            declarations: std::mem::take(&mut self.declarations),
        })
    }

    fn declare_globals(&mut self, expr: &Expr) -> Result<(), CompilerError> {
        match expr {
            Expr::Block(children) => {
                for child in children {
                    self.declare_globals(child)?;
                }
            }
            Expr::Function(decl) => {
                let index = self.declare_function(decl)?;
                self.pending.push_back(index);
            }
            Expr::Declaration { name, ty, value } => {
                let value = match (ty, value) {
                    (Type::Field(inner), None) => Some(Value::Pointer(
                        self.allocator.allocate_field(name, (**inner).clone()),
                    )),
                    _ => value.clone(),
                };
                let entry =
                    self.allocator
                        .allocate_reference(Some(name), ty.clone(), value, Storage::Global);
                log::debug!("GLOBAL '{}' {} at {}", name, ty, entry.reference);
                self.declarations.push(Ir::value(entry.reference, entry.name));
            }
            _ => {}
        }
        Ok(())
    }

    fn declare_function(&mut self, decl: &FunctionDecl) -> Result<usize, CompilerError> {
        let Type::Function { args, .. } = &decl.signature else {
            return Err(CompilerError::UnsupportedConstruct(format!(
                "function '{}' declared with non-function type {}",
                decl.name, decl.signature
            )));
        };
        let defines = decl.body.is_some() || decl.builtin.is_some();
        let index = match self.declared.get(&decl.name).copied() {
            // a prototype followed by its definition shares one table entry
            Some((index, defined)) if !(defined && defines) => index,
            _ => {
                let entry = self
                    .allocator
                    .allocate_function(&decl.name, decl.signature.clone());
                function_number(&entry)?
            }
        };
        let defined = defines
            || self
                .declared
                .get(&decl.name)
                .is_some_and(|&(previous, defined)| previous == index && defined);
        self.declared.insert(decl.name.clone(), (index, defined));

        let record = self.functions.entry(index).or_insert_with(|| IrFunction {
            name: decl.name.clone(),
            index,
            builtin: None,
            param_sizes: Vec::new(),
            body: None,
        });
        record.param_sizes = args
            .iter()
            .take(MAX_PARAMS)
            .map(|arg| arg.size_of() as u8)
            .collect();
        if decl.builtin.is_some() {
            record.builtin = decl.builtin;
        }
        log::debug!("FUNCTION '{}' -> #{}", decl.name, index);
        Ok(index)
    }

    fn generate_root(&mut self, expr: &Expr) -> Result<(), CompilerError> {
        match expr {
            Expr::Block(children) => {
                for child in children {
                    self.generate_root(child)?;
                }
                Ok(())
            }
            Expr::Function(decl) => {
                let index = self.pending.pop_front().ok_or_else(|| {
                    CompilerError::UnsupportedConstruct(format!(
                        "function '{}' was not declared",
                        decl.name
                    ))
                })?;
                if let Some(body) = &decl.body {
                    let body = self.generate_function(decl, body)?;
                    if let Some(record) = self.functions.get_mut(&index) {
                        record.body = Some(body);
                    }
                }
                Ok(())
            }
            Expr::Declaration { .. } | Expr::Nop => Ok(()),
            other => Err(CompilerError::UnsupportedConstruct(format!(
                "{} at global scope",
                other.shape()
            ))),
        }
    }

    fn generate_function(
        &mut self,
        decl: &FunctionDecl,
        statements: &[Expr],
    ) -> Result<Vec<Ir>, CompilerError> {
        self.allocator.push(&decl.name, ScopeKind::Function);
        let mut body = Vec::new();
        for param in &decl.params {
            let entry = self.allocator.allocate_reference(
                Some(&param.name),
                param.ty.clone(),
                None,
                Storage::Local,
            );
            body.push(Ir::value(entry.reference, format!("param {}", param.name)));
        }
        if let Some(vararg) = &decl.vararg {
            log::debug!("VARARG '{}' of '{}' is read through builtins", vararg.name, decl.name);
        }

        self.allocator.push("body", ScopeKind::Block);
        for statement in statements {
            body.extend(self.generate(statement)?);
        }
        self.allocator.pop();
        self.allocator.pop();
        Ok(body)
    }

    pub fn generate(&mut self, expr: &Expr) -> Result<Vec<Ir>, CompilerError> {
        match expr {
            Expr::Nop => Ok(Vec::new()),
            Expr::Block(children) => {
                self.allocator.push("block", ScopeKind::Block);
                let mut ir = Vec::new();
                for child in children {
                    ir.extend(self.generate(child)?);
                }
                self.allocator.pop();
                Ok(ir)
            }
            Expr::Constant(value) => {
                let entry = self
                    .allocator
                    .allocate_constant(value.clone(), value.type_of(), None);
                Ok(vec![Ir::value(entry.reference, entry.name)])
            }
            Expr::Reference(name) => {
                let entry = self.resolve_symbol(name)?;
                Ok(vec![Ir::value(entry.reference, name.clone())])
            }
            Expr::Memory { reference, .. } => Ok(vec![Ir::value(*reference, reference.to_string())]),
            Expr::Declaration { name, ty, value } => {
                self.generate_declaration(name, ty, value.as_ref())
            }
            Expr::Function(decl) => Err(CompilerError::UnsupportedConstruct(format!(
                "nested function '{}'",
                decl.name
            ))),
            Expr::Binary { op, left, right } => self.generate_binary(*op, left, right),
            Expr::Unary { op, operand } => self.generate_unary(*op, operand),
            Expr::Cast { ty, operand } => {
                let mut ir = self.generate(operand)?;
                let value = result_of(&ir);
                ir.push(Ir::value(value, format!("({}) {}", ty, value)));
                Ok(ir)
            }
            Expr::Conditional {
                test,
                pass,
                fail,
                expression,
            } => self.generate_conditional(test, pass, fail.as_deref(), *expression),
            Expr::Loop(lp) => self.generate_loop(lp),
            Expr::Switch { test, body } => self.generate_switch(test, body),
            Expr::Case(_) => Err(CompilerError::UnsupportedConstruct(
                "case label outside of a switch".to_string(),
            )),
            Expr::Break => Ok(vec![Ir::new(
                Instruction::Goto(Jump::Break),
                Ref::Null,
                "break",
            )]),
            Expr::Continue => Ok(vec![Ir::new(
                Instruction::Goto(Jump::Continue),
                Ref::Null,
                "continue",
            )]),
            Expr::Goto(label) => Ok(vec![Ir::new(
                Instruction::Goto(Jump::Label(label.clone())),
                Ref::Null,
                format!("goto {}", label),
            )]),
            Expr::Label(label) => Ok(vec![Ir::label(label.clone())]),
            Expr::Return(value) => {
                let (mut ir, value) = match value {
                    Some(value) => {
                        let ir = self.generate(value)?;
                        let result = result_of(&ir);
                        (ir, result)
                    }
                    None => (Vec::new(), Ref::Null),
                };
                ir.push(Ir::new(Instruction::Return { value }, Ref::Null, "return"));
                Ok(ir)
            }
            Expr::Call { function, args } => self.generate_call(function, args),
            Expr::Member { left, field } => self.generate_member(left, field),
            Expr::Index { left, right } => self.generate_index(left, right),
        }
    }

    /// Static type of an expression, consulting the registry for operators
    pub fn type_of(&self, expr: &Expr) -> Result<Type, CompilerError> {
        match expr {
            Expr::Constant(value) => Ok(value.type_of()),
            Expr::Reference(name) => self.symbol_type(name),
            Expr::Memory { ty, .. } | Expr::Declaration { ty, .. } | Expr::Cast { ty, .. } => {
                Ok(ty.clone())
            }
            Expr::Binary { op, left, right } => {
                let left = self.type_of(left)?;
                let right = self.type_of(right)?;
                Ok(self.registry.resolve(op.symbol(), &left, Some(&right))?.result)
            }
            Expr::Unary { op, operand } => {
                let operand = self.type_of(operand)?;
                Ok(self.registry.resolve(op.symbol(), &operand, None)?.result)
            }
            Expr::Conditional {
                pass, expression, ..
            } => match expression {
                true => self.type_of(pass),
                false => Ok(Type::Void),
            },
            Expr::Call { function, .. } => match self.type_of(function)? {
                Type::Function { ret, .. } => Ok(*ret),
                other => Err(CompilerError::UnsupportedConstruct(format!(
                    "call through non-function type {}",
                    other
                ))),
            },
            Expr::Member { left, field } => {
                let ty = self.type_of(left)?;
                ty.member(field).map(|(_, member)| member).ok_or_else(|| {
                    CompilerError::UnsupportedConstruct(format!("no member '{}' on {}", field, ty))
                })
            }
            Expr::Index { left, right } => match self.type_of(left)? {
                Type::Entity => match self.type_of(right)? {
                    Type::Field(inner) => Ok(*inner),
                    other => Err(CompilerError::UnsupportedConstruct(format!(
                        "entity indexed by {}",
                        other
                    ))),
                },
                Type::Array(element, _) => Ok(*element),
                other => Err(CompilerError::UnsupportedConstruct(format!(
                    "indexing into {}",
                    other
                ))),
            },
            Expr::Nop
            | Expr::Block(_)
            | Expr::Function(_)
            | Expr::Loop(_)
            | Expr::Switch { .. }
            | Expr::Case(_)
            | Expr::Break
            | Expr::Continue
            | Expr::Goto(_)
            | Expr::Label(_)
            | Expr::Return(_) => Ok(Type::Void),
        }
    }

    pub(crate) fn allocate_temp(&mut self, ty: &Type) -> Ref {
        let storage = if self.allocator.inside_function() {
            Storage::Local
        } else {
            Storage::Global
        };
        self.allocator
            .allocate_reference(None, ty.clone(), None, storage)
            .reference
    }

    pub(crate) fn next_label(&mut self, prefix: &str) -> String {
        self.label_counter += 1;
        format!("{}.{}", prefix, self.label_counter)
    }

    fn generate_declaration(
        &mut self,
        name: &str,
        ty: &Type,
        value: Option<&Value>,
    ) -> Result<Vec<Ir>, CompilerError> {
        if !self.allocator.inside_function() {
            let entry = self.allocator.allocate_reference(
                Some(name),
                ty.clone(),
                value.cloned(),
                Storage::Global,
            );
            return Ok(vec![Ir::value(entry.reference, entry.name)]);
        }
        let entry = self
            .allocator
            .allocate_reference(Some(name), ty.clone(), None, Storage::Local);
        let mut ir = vec![Ir::value(entry.reference, format!("local {}", name))];
        if let Some(value) = value {
            let constant = self
                .allocator
                .allocate_constant(value.clone(), value.type_of(), None);
            ir.extend(Self::store_ir(ty, constant.reference, entry.reference));
            ir.push(Ir::value(entry.reference, name));
        }
        Ok(ir)
    }

    fn generate_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Vec<Ir>, CompilerError> {
        let left_type = self.type_of(left)?;
        let right_type = self.type_of(right)?;
        let registry = self.registry;
        let resolved = registry.resolve(op.symbol(), &left_type, Some(&right_type))?;
        log::debug!(
            "OP {} {} {} via ({}) -> {}",
            left_type,
            op.symbol(),
            right_type,
            resolved.key,
            resolved.result
        );
        resolved
            .handler
            .lower(self, &resolved.result, left, Some(right))
    }

    fn generate_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<Vec<Ir>, CompilerError> {
        let operand_type = self.type_of(operand)?;
        let registry = self.registry;
        let resolved = registry.resolve(op.symbol(), &operand_type, None)?;
        resolved.handler.lower(self, &resolved.result, operand, None)
    }

    fn generate_call(&mut self, function: &Expr, args: &[Expr]) -> Result<Vec<Ir>, CompilerError> {
        let signature = self.type_of(function)?;
        let Type::Function { ret, .. } = &signature else {
            return Err(CompilerError::UnsupportedConstruct(format!(
                "call through non-function type {}",
                signature
            )));
        };
        if args.len() > MAX_PARAMS {
            return Err(CompilerError::UnsupportedConstruct(format!(
                "call with {} arguments (at most {})",
                args.len(),
                MAX_PARAMS
            )));
        }

        let mut ir = self.generate(function)?;
        let target = result_of(&ir);
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let ty = self.type_of(arg)?;
            let arg_ir = self.generate(arg)?;
            values.push((result_of(&arg_ir), ty));
            ir.extend(arg_ir);
        }
        ir.push(Ir::new(
            Instruction::Call {
                function: target,
                args: values,
            },
            Ref::RETURN,
            format!("call {}", target),
        ));
        // copy the result out before another call can overwrite it
        if **ret != Type::Void {
            let out = self.allocate_temp(ret);
            ir.extend(Self::store_ir(ret, Ref::RETURN, out));
            ir.push(Ir::value(out, "call result"));
        }
        Ok(ir)
    }

    fn generate_member(&mut self, left: &Expr, field: &str) -> Result<Vec<Ir>, CompilerError> {
        let ty = self.type_of(left)?;
        let (offset, _) = ty.member(field).ok_or_else(|| {
            CompilerError::UnsupportedConstruct(format!("no member '{}' on {}", field, ty))
        })?;
        let mut ir = self.generate(left)?;
        let base = result_of(&ir);
        ir.push(Ir::value(base.offset(offset as i32), format!("{}.{}", base, field)));
        Ok(ir)
    }

    fn generate_index(&mut self, left: &Expr, right: &Expr) -> Result<Vec<Ir>, CompilerError> {
        match self.type_of(left)? {
            Type::Entity => {
                let inner = match self.type_of(right)? {
                    Type::Field(inner) => *inner,
                    other => {
                        return Err(CompilerError::UnsupportedConstruct(format!(
                            "entity indexed by {}",
                            other
                        )))
                    }
                };
                let mut ir = self.generate(left)?;
                let entity = result_of(&ir);
                let field_ir = self.generate(right)?;
                let field = result_of(&field_ir);
                ir.extend(field_ir);
                let out = self.allocate_temp(&inner);
                ir.push(Ir::new(
                    Instruction::Load {
                        ty: inner,
                        entity,
                        field,
                        out,
                    },
                    out,
                    format!("{}.{}", entity, field),
                ));
                Ok(ir)
            }
            Type::Array(element, length) => {
                let index = constant_index(right)?;
                if index >= length {
                    return Err(CompilerError::UnsupportedConstruct(format!(
                        "index {} out of bounds for array of {}",
                        index, length
                    )));
                }
                let mut ir = self.generate(left)?;
                let base = result_of(&ir);
                let offset = (index * element.size_of()) as i32;
                ir.push(Ir::value(base.offset(offset), format!("{}[{}]", base, index)));
                Ok(ir)
            }
            other => Err(CompilerError::UnsupportedConstruct(format!(
                "indexing into {}",
                other
            ))),
        }
    }

    fn symbol_type(&self, name: &str) -> Result<Type, CompilerError> {
        if let Some(entry) = self.allocator.get(name) {
            return Ok(entry.ty.clone());
        }
        match builtin_number(&self.options, name) {
            Some(_) => Ok(builtin_signature()),
            None => Err(CompilerError::UndefinedSymbol(name.to_string())),
        }
    }

    /// Resolve a name, declaring the arithmetic builtins on first use when
    /// the program does not provide them.
    fn resolve_symbol(&mut self, name: &str) -> Result<Entry, CompilerError> {
        if let Some(entry) = self.allocator.get(name) {
            return Ok(entry.clone());
        }
        let number = builtin_number(&self.options, name)
            .ok_or_else(|| CompilerError::UndefinedSymbol(name.to_string()))?;
        let entry = self
            .allocator
            .allocate_builtin_function(name, builtin_signature());
        let index = function_number(&entry)?;
        log::debug!("BUILTIN '{}' implicitly bound to #{}", name, number);
        self.functions.insert(
            index,
            IrFunction {
                name: name.to_string(),
                index,
                builtin: Some(number),
                param_sizes: vec![1, 1],
                body: None,
            },
        );
        Ok(entry)
    }
}

fn builtin_number(options: &CompilerOptions, name: &str) -> Option<i32> {
    match name {
        BUILTIN_MOD => Some(options.builtin_mod),
        BUILTIN_XOR => Some(options.builtin_xor),
        _ => None,
    }
}

fn builtin_signature() -> Type {
    Type::function(Type::Float, vec![Type::Float, Type::Float])
}

fn function_number(entry: &Entry) -> Result<usize, CompilerError> {
    match entry.value {
        Some(Value::Pointer(index)) if index > 0 => Ok(index as usize),
        _ => Err(CompilerError::UnsupportedConstruct(format!(
            "'{}' is not a function",
            entry.name
        ))),
    }
}

fn constant_index(expr: &Expr) -> Result<usize, CompilerError> {
    match expr {
        Expr::Constant(Value::Int(i)) if *i >= 0 => Ok(*i as usize),
        Expr::Constant(Value::Float(f)) if *f >= 0.0 && f.fract() == 0.0 => Ok(*f as usize),
        other => Err(CompilerError::UnsupportedConstruct(format!(
            "array index must be a non-negative constant, found {}",
            other.shape()
        ))),
    }
}

// Lowering split out by concern
#[path = "ir_gen_control.rs"]
mod ir_gen_control;
#[path = "ir_gen_lvalues.rs"]
mod ir_gen_lvalues;

#[cfg(test)]
#[path = "generator_tests.rs"]
mod tests;
