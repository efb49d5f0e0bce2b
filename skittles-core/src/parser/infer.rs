//! Expression typing for the lowering pass.
//!
//! Types are only as precise as lowering needs: enough to pick string
//! operators, struct literals, element types for `for..of` and the types
//! of unannotated locals. `None` means "not known", never "ill typed".

use crate::builtins;
use crate::ir::{BinaryOp, Expression, Literal, UnaryOp};
use crate::types::{self, Type};

use super::Parser;

/// Scoped variable environment, searched innermost first.
#[derive(Debug, Default)]
pub(super) struct TypeEnv {
    entries: Vec<(String, Type)>,
    scopes: Vec<usize>,
}

impl TypeEnv {
    pub fn push_scope(&mut self) {
        self.scopes.push(self.entries.len());
    }

    pub fn pop_scope(&mut self) {
        let mark = self.scopes.pop().unwrap_or(0);
        self.entries.truncate(mark);
    }

    /// Returns false when `name` is already declared in the innermost scope.
    pub fn declare(&mut self, name: &str, ty: Type) -> bool {
        let mark = self.scopes.last().copied().unwrap_or(0);
        if self.entries[mark..].iter().any(|(n, _)| n == name) {
            return false;
        }
        self.entries.push((name.to_string(), ty));
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.entries
            .iter()
            .rev()
            .find_map(|(n, t)| if n == name { Some(t) } else { None })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.scopes.clear();
    }
}

impl Parser<'_> {
    pub(super) fn type_of(&self, expr: &Expression) -> Option<Type> {
        match expr {
            Expression::Identifier(name) => self.identifier_type(name),
            Expression::Literal(Literal::Number(_)) => Some(Type::UINT256),
            Expression::Literal(Literal::String(_)) => Some(Type::String),
            Expression::Literal(Literal::Bool(_)) => Some(Type::Boolean),
            Expression::Binary { op, left, right } => {
                if op.is_comparison() {
                    Some(Type::Boolean)
                } else if matches!(op, BinaryOp::Shl | BinaryOp::Shr) {
                    self.type_of(left)
                } else {
                    self.type_of(left).or_else(|| self.type_of(right))
                }
            }
            Expression::Unary { op, operand } => match op {
                UnaryOp::Not => Some(Type::Boolean),
                _ => self.type_of(operand),
            },
            Expression::Assign { target, .. } => self.type_of(target),
            Expression::Call { callee, .. } => self.call_type(callee),
            Expression::Property { object, property } => self.property_type(object, property),
            Expression::Index { object, .. } => self.type_of(object)?.index_result(),
            Expression::Conditional {
                then_value,
                else_value,
                ..
            } => self.type_of(then_value).or_else(|| self.type_of(else_value)),
            Expression::StructLiteral { name, .. } => Some(Type::Interface(name.clone())),
            Expression::Tuple(items) => items
                .iter()
                .map(|item| self.type_of(item))
                .collect::<Option<Vec<_>>>()
                .map(Type::Tuple),
            Expression::New { ty, .. } => Some(ty.clone()),
        }
    }

    fn identifier_type(&self, name: &str) -> Option<Type> {
        if name == "this" {
            return Some(Type::Address);
        }
        if let Some(ty) = self.env.lookup(name) {
            return Some(ty.clone());
        }
        self.symbols
            .constants
            .get(name)
            .map(|constant| constant.variable.ty.clone())
    }

    fn call_type(&self, callee: &Expression) -> Option<Type> {
        match callee {
            Expression::Identifier(name) => {
                if let Some(function) = builtins::find_function(name) {
                    return Some(function.returns.clone());
                }
                if let Some(def) = self.symbols.functions.get(name) {
                    return Some(def.function.returns.clone());
                }
                match name.as_str() {
                    "string" => Some(Type::String),
                    "bytes" => Some(Type::Bytes),
                    _ => types::primitive(name),
                }
            }
            Expression::Property { object, property } => {
                if let Expression::Identifier(root) = object.as_ref() {
                    match root.as_str() {
                        "this" => return self.method_sig(property).map(|sig| sig.returns),
                        "super" => return self.base_method_sig(property).map(|sig| sig.returns),
                        _ => {}
                    }
                    if self.env.lookup(root).is_none() {
                        if let Some(member) = builtins::find_member(root, property) {
                            return Some(member.ty.clone());
                        }
                    }
                }
                match (self.type_of(object)?, property.as_str()) {
                    (Type::Contract(class), _) => {
                        if let Some(method) = self.symbols.find_method(&class, property) {
                            Some(method.returns.clone())
                        } else {
                            self.symbols
                                .find_field(&class, property)
                                .map(|field| field.ty.clone())
                        }
                    }
                    (Type::Address, "send") => Some(Type::Boolean),
                    (Type::Address, "call" | "delegatecall" | "staticcall") => {
                        Some(Type::Tuple(vec![Type::Boolean, Type::Bytes]))
                    }
                    (_, "push" | "pop" | "transfer") => Some(Type::Void),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn property_type(&self, object: &Expression, property: &str) -> Option<Type> {
        if let Expression::Identifier(root) = object {
            if root == "this" {
                return self.field_info(property).map(|field| field.ty);
            }
            if self.env.lookup(root).is_none() {
                if let Some(member) = builtins::find_member(root, property) {
                    return Some(member.ty.clone());
                }
                if self.symbols.enums.contains_key(root) {
                    return Some(Type::Enum(root.clone()));
                }
            }
        }
        let object_ty = self.type_of(object)?;
        if let Type::Interface(name) = &object_ty {
            let def = self.symbols.structs.get(name)?;
            return def
                .fields
                .iter()
                .find(|(field, _)| field == property)
                .map(|(_, ty)| ty.clone());
        }
        builtins::value_member(&object_ty, property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scopes_shadow_and_unwind() {
        let mut env = TypeEnv::default();
        env.push_scope();
        assert!(env.declare("x", Type::UINT256));
        env.push_scope();
        assert!(env.declare("x", Type::String));
        assert_eq!(env.lookup("x"), Some(&Type::String));
        env.pop_scope();
        assert_eq!(env.lookup("x"), Some(&Type::UINT256));
        assert!(!env.declare("x", Type::Boolean));
    }
}
