// IR Generator - Assignment
//
// Stores to variables, members, constant array elements and entity fields.
// Entity fields are written through a pointer: ADDRESS then STOREP.

use super::super::ast::{BinaryOp, Expr};
use super::super::error::CompilerError;
use super::super::instruction::{Instruction, Ref};
use super::super::ir::{result_of, Ir};
use super::super::types::Type;
use super::Generator;

impl Generator<'_> {
    /// Lower `left = right`, or `left op= right` when `compound` is set.
    /// The result reference holds the stored value.
    pub(crate) fn generate_assignment(
        &mut self,
        compound: Option<BinaryOp>,
        left: &Expr,
        right: &Expr,
    ) -> Result<Vec<Ir>, CompilerError> {
        match left {
            Expr::Index { left: entity, right: field } if self.type_of(entity)? == Type::Entity => {
                self.generate_field_store(compound, entity, field, right)
            }
            Expr::Member { left: base, .. } if self.is_entity_field(base)? => {
                Err(CompilerError::UnsupportedConstruct(
                    "member store through an entity field".to_string(),
                ))
            }
            Expr::Reference(_)
            | Expr::Memory { .. }
            | Expr::Member { .. }
            | Expr::Index { .. }
            | Expr::Declaration { .. } => {
                let ty = self.type_of(left)?;
                let mut ir = self.generate(left)?;
                let target = result_of(&ir);
                let rvalue = match compound {
                    Some(op) => Expr::binary(
                        op,
                        Expr::Memory {
                            reference: target,
                            ty: ty.clone(),
                        },
                        right.clone(),
                    ),
                    None => right.clone(),
                };
                let value_ir = self.generate(&rvalue)?;
                let value = result_of(&value_ir);
                ir.extend(value_ir);
                ir.extend(Self::store_ir(&ty, value, target));
                ir.push(Ir::value(value, format!("{} = {}", target, value)));
                Ok(ir)
            }
            other => Err(CompilerError::UnsupportedConstruct(format!(
                "assignment to {}",
                other.shape()
            ))),
        }
    }

    fn is_entity_field(&self, expr: &Expr) -> Result<bool, CompilerError> {
        match expr {
            Expr::Index { left, .. } => Ok(self.type_of(left)? == Type::Entity),
            _ => Ok(false),
        }
    }

    /// `e.f = v`: the entity and field are evaluated once, even for a
    /// compound assignment that also reads the field.
    fn generate_field_store(
        &mut self,
        compound: Option<BinaryOp>,
        entity: &Expr,
        field: &Expr,
        right: &Expr,
    ) -> Result<Vec<Ir>, CompilerError> {
        let field_type = self.type_of(field)?;
        let inner = match &field_type {
            Type::Field(inner) => (**inner).clone(),
            other => {
                return Err(CompilerError::UnsupportedConstruct(format!(
                    "entity indexed by {}",
                    other
                )))
            }
        };
        if matches!(inner, Type::Struct(_) | Type::Array(..)) {
            return Err(CompilerError::UnsupportedConstruct(format!(
                "store of {} through an entity field",
                inner
            )));
        }

        let mut ir = self.generate(entity)?;
        let e = result_of(&ir);
        let field_ir = self.generate(field)?;
        let f = result_of(&field_ir);
        ir.extend(field_ir);

        let rvalue = match compound {
            Some(op) => Expr::binary(
                op,
                Expr::index(
                    Expr::Memory {
                        reference: e,
                        ty: Type::Entity,
                    },
                    Expr::Memory {
                        reference: f,
                        ty: field_type.clone(),
                    },
                ),
                right.clone(),
            ),
            None => right.clone(),
        };
        let value_ir = self.generate(&rvalue)?;
        let value = result_of(&value_ir);
        ir.extend(value_ir);

        let pointer = self.allocate_temp(&field_type);
        ir.push(Ir::new(
            Instruction::Address {
                entity: e,
                field: f,
                out: pointer,
            },
            pointer,
            format!("&{}.{}", e, f),
        ));
        ir.push(Ir::new(
            Instruction::StoreP {
                ty: inner,
                value,
                pointer,
            },
            value,
            format!("*{} = {}", pointer, value),
        ));
        Ok(ir)
    }

    /// One STORE per scalar slot; structs and arrays are copied member-wise
    pub(crate) fn store_ir(ty: &Type, value: Ref, target: Ref) -> Vec<Ir> {
        match ty {
            Type::Struct(fields) => {
                let mut ir = Vec::new();
                let mut offset = 0;
                for (_, field) in fields {
                    ir.extend(Self::store_ir(
                        field,
                        value.offset(offset),
                        target.offset(offset),
                    ));
                    offset += field.size_of() as i32;
                }
                ir
            }
            Type::Array(element, length) => {
                let stride = element.size_of() as i32;
                (0..*length as i32)
                    .flat_map(|i| {
                        Self::store_ir(element, value.offset(i * stride), target.offset(i * stride))
                    })
                    .collect()
            }
            _ => vec![Ir::new(
                Instruction::Store {
                    ty: ty.clone(),
                    value,
                    target,
                },
                target,
                format!("{} -> {}", value, target),
            )],
        }
    }
}
