//! Syntactic type annotations, before name resolution.
//!
//! Everything else in the source is lowered straight into the IR; only
//! type annotations keep a surface form because the collector has to
//! record them before every type name in the project is known.

use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// `number`, `Point`, `Record<address, number>`, `Indexed<address>`.
    Named {
        name: String,
        args: Vec<TypeExpr>,
        span: Span,
    },
    /// `T[]`
    Array(Box<TypeExpr>),
    /// `[A, B]`
    Tuple(Vec<TypeExpr>, Span),
    /// `{ a: A; b: B }`
    Object(Vec<ObjectTypeField>, Span),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTypeField {
    pub name: String,
    pub ty: TypeExpr,
}

/// What a class field declares, judged from its annotation alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind<'a> {
    Storage(&'a TypeExpr),
    Event(&'a [ObjectTypeField]),
    Error(&'a [ObjectTypeField]),
}

pub const EVENT_TYPE: &str = "SkittlesEvent";
pub const ERROR_TYPE: &str = "SkittlesError";
pub const INDEXED_TYPE: &str = "Indexed";

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Named { span, .. } => *span,
            TypeExpr::Array(inner) => inner.span(),
            TypeExpr::Tuple(_, span) | TypeExpr::Object(_, span) => *span,
        }
    }

    pub fn member_kind(&self) -> MemberKind<'_> {
        if let TypeExpr::Named { name, args, .. } = self {
            if let [TypeExpr::Object(fields, _)] = args.as_slice() {
                match name.as_str() {
                    EVENT_TYPE => return MemberKind::Event(fields),
                    ERROR_TYPE => return MemberKind::Error(fields),
                    _ => {}
                }
            }
        }
        MemberKind::Storage(self)
    }

    /// Strips an `Indexed<T>` wrapper, reporting whether it was present.
    pub fn unwrap_indexed(&self) -> (&TypeExpr, bool) {
        match self {
            TypeExpr::Named { name, args, .. } if name == INDEXED_TYPE && args.len() == 1 => {
                (&args[0], true)
            }
            _ => (self, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, args: Vec<TypeExpr>) -> TypeExpr {
        TypeExpr::Named {
            name: name.to_string(),
            args,
            span: Span::default(),
        }
    }

    #[test]
    fn recognises_event_members() {
        let fields = vec![ObjectTypeField {
            name: "from".to_string(),
            ty: named(INDEXED_TYPE, vec![named("address", vec![])]),
        }];
        let ty = named(EVENT_TYPE, vec![TypeExpr::Object(fields, Span::default())]);
        match ty.member_kind() {
            MemberKind::Event(fields) => {
                let (inner, indexed) = fields[0].ty.unwrap_indexed();
                assert!(indexed);
                assert_eq!(inner, &named("address", vec![]));
            }
            other => panic!("unexpected member kind {other:?}"),
        }
    }

    #[test]
    fn plain_types_are_storage() {
        let ty = named("number", vec![]);
        assert_eq!(ty.member_kind(), MemberKind::Storage(&ty));
    }
}
