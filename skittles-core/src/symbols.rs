//! Project-wide table of shared definitions.
//!
//! The collector fills this table before any contract body is parsed, so
//! that a file can use structs, enums, constants, free functions and
//! classes declared anywhere in the project. Each entry carries the hash
//! of its declaration text and the shared definitions it refers to, which
//! is what the incremental cache keys on.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::ast::{MemberKind, ObjectTypeField, TypeExpr};
use crate::ir::{Field, Function, SharedRef, Variable, Visibility};
use crate::parser::decl::{ClassSignature, MemberSignatureKind};
use crate::span::Span;
use crate::types::{self, Type};

/// Where a definition came from and what it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionMeta {
    pub file: PathBuf,
    pub hash: String,
    pub references: BTreeSet<SharedRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<(String, Type)>,
    pub meta: DefinitionMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<String>,
    pub meta: DefinitionMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDef {
    pub variable: Variable,
    pub meta: DefinitionMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub function: Function,
    pub meta: DefinitionMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub ty: Type,
    pub visibility: Visibility,
    /// `static readonly`: compiled to a constant, never a storage read.
    pub constant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    pub params: Vec<Type>,
    /// Parameters without a default value.
    pub required: usize,
    pub returns: Type,
    pub visibility: Visibility,
}

/// Member signatures of a class, enough to type-check code that uses it
/// without parsing its method bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub is_abstract: bool,
    pub base: Option<String>,
    pub fields: BTreeMap<String, FieldInfo>,
    pub methods: BTreeMap<String, MethodSig>,
    pub constructor: Option<MethodSig>,
    pub events: BTreeMap<String, Vec<Field>>,
    pub errors: BTreeMap<String, Vec<Field>>,
    pub meta: DefinitionMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    pub span: Span,
    pub message: String,
}

impl ResolveError {
    fn new(span: Span, message: impl Into<String>) -> Self {
        ResolveError {
            span,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub structs: BTreeMap<String, StructDef>,
    pub enums: BTreeMap<String, EnumDef>,
    pub constants: BTreeMap<String, ConstantDef>,
    pub functions: BTreeMap<String, FunctionDef>,
    pub classes: BTreeMap<String, ClassInfo>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is a type name declared somewhere in the project.
    pub fn is_type_name(&self, name: &str) -> bool {
        self.structs.contains_key(name)
            || self.enums.contains_key(name)
            || self.classes.contains_key(name)
    }

    /// Resolve a syntactic annotation into a type.
    pub fn resolve_type(&self, expr: &TypeExpr) -> Result<Type, ResolveError> {
        match expr {
            TypeExpr::Array(element) => Ok(Type::array(self.resolve_type(element)?)),
            TypeExpr::Tuple(items, _) => {
                let items = items
                    .iter()
                    .map(|item| self.resolve_type(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Type::Tuple(items))
            }
            TypeExpr::Object(_, span) => Err(ResolveError::new(
                *span,
                "inline object types are only allowed in event and error declarations",
            )),
            TypeExpr::Named { name, args, span } => self.resolve_named(name, args, *span),
        }
    }

    fn resolve_named(&self, name: &str, args: &[TypeExpr], span: Span) -> Result<Type, ResolveError> {
        match (name, args) {
            ("Record" | "Map", [key, value]) => {
                let key = self.resolve_type(key)?;
                if !(key.is_value_type() || matches!(key, Type::String | Type::Bytes)) {
                    return Err(ResolveError::new(
                        span,
                        format!("`{key}` cannot be used as a mapping key"),
                    ));
                }
                Ok(Type::mapping(key, self.resolve_type(value)?))
            }
            ("Array", [element]) => Ok(Type::array(self.resolve_type(element)?)),
            (_, []) => {
                if let Some(ty) = types::primitive(name) {
                    return Ok(ty);
                }
                if self.structs.contains_key(name) {
                    Ok(Type::Interface(name.to_string()))
                } else if self.enums.contains_key(name) {
                    Ok(Type::Enum(name.to_string()))
                } else if self.classes.contains_key(name) {
                    Ok(Type::Contract(name.to_string()))
                } else {
                    Err(ResolveError::new(span, format!("unknown type `{name}`")))
                }
            }
            _ => Err(ResolveError::new(
                span,
                format!("unsupported generic type `{name}` with {} argument(s)", args.len()),
            )),
        }
    }

    /// Resolve the fields of an event or error declaration.
    pub fn resolve_fields(
        &self,
        fields: &[ObjectTypeField],
        allow_indexed: bool,
    ) -> Result<Vec<Field>, ResolveError> {
        fields
            .iter()
            .map(|field| {
                let (inner, indexed) = field.ty.unwrap_indexed();
                if indexed && !allow_indexed {
                    return Err(ResolveError::new(
                        field.ty.span(),
                        format!("error parameter `{}` cannot be indexed", field.name),
                    ));
                }
                Ok(Field {
                    name: field.name.clone(),
                    ty: self.resolve_type(inner)?,
                    indexed,
                })
            })
            .collect()
    }

    /// Build the member summary of a class from its scanned signature.
    ///
    /// Fields without an annotation are recorded only when their type is
    /// evident from a literal initializer.
    pub fn resolve_class(
        &self,
        name: &str,
        signature: &ClassSignature,
        meta: DefinitionMeta,
    ) -> Result<ClassInfo, ResolveError> {
        let mut info = ClassInfo {
            name: name.to_string(),
            is_abstract: signature.is_abstract,
            base: signature.base.clone(),
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
            constructor: None,
            events: BTreeMap::new(),
            errors: BTreeMap::new(),
            meta,
        };

        for member in &signature.members {
            let visibility = member.modifiers.visibility.unwrap_or(Visibility::Public);
            match &member.kind {
                MemberSignatureKind::Field { ty: Some(ty), .. } => match ty.member_kind() {
                    MemberKind::Event(fields) => {
                        let fields = self.resolve_fields(fields, true)?;
                        info.events.insert(member.name.clone(), fields);
                    }
                    MemberKind::Error(fields) => {
                        let fields = self.resolve_fields(fields, false)?;
                        info.errors.insert(member.name.clone(), fields);
                    }
                    MemberKind::Storage(ty) => {
                        let field = FieldInfo {
                            ty: self.resolve_type(ty)?,
                            visibility,
                            constant: member.modifiers.is_static && member.modifiers.is_readonly,
                        };
                        info.fields.insert(member.name.clone(), field);
                    }
                },
                MemberSignatureKind::Field {
                    ty: None,
                    literal_type,
                    ..
                } => {
                    if let Some(ty) = literal_type {
                        let field = FieldInfo {
                            ty: ty.clone(),
                            visibility,
                            constant: member.modifiers.is_static && member.modifiers.is_readonly,
                        };
                        info.fields.insert(member.name.clone(), field);
                    }
                }
                MemberSignatureKind::Method { params, returns, .. } => {
                    let sig = MethodSig {
                        params: params
                            .iter()
                            .map(|p| self.resolve_type(&p.ty))
                            .collect::<Result<_, _>>()?,
                        required: params.iter().filter(|p| !p.has_default()).count(),
                        returns: match returns {
                            Some(ty) => self.resolve_type(ty)?,
                            None => Type::Void,
                        },
                        visibility,
                    };
                    info.methods.insert(member.name.clone(), sig);
                }
                // Defaulted constructor parameters become locals, so
                // callers only ever pass the required ones.
                MemberSignatureKind::Constructor { params, .. } => {
                    let params: Vec<Type> = params
                        .iter()
                        .filter(|p| !p.has_default())
                        .map(|p| self.resolve_type(&p.ty))
                        .collect::<Result<_, _>>()?;
                    let sig = MethodSig {
                        required: params.len(),
                        params,
                        returns: Type::Void,
                        visibility,
                    };
                    info.constructor = Some(sig);
                }
            }
        }
        Ok(info)
    }

    /// The class followed by its ancestors, nearest first. Stops at an
    /// unknown base or a cycle.
    pub fn class_chain(&self, name: &str) -> Vec<&ClassInfo> {
        let mut chain: Vec<&ClassInfo> = Vec::new();
        let mut next = self.classes.get(name);
        while let Some(class) = next {
            if chain.iter().any(|c| c.name == class.name) {
                break;
            }
            chain.push(class);
            next = class.base.as_deref().and_then(|base| self.classes.get(base));
        }
        chain
    }

    pub fn find_field(&self, class: &str, name: &str) -> Option<&FieldInfo> {
        self.class_chain(class)
            .into_iter()
            .find_map(|c| c.fields.get(name))
    }

    pub fn find_method(&self, class: &str, name: &str) -> Option<&MethodSig> {
        self.class_chain(class)
            .into_iter()
            .find_map(|c| c.methods.get(name))
    }

    pub fn find_event(&self, class: &str, name: &str) -> Option<&[Field]> {
        self.class_chain(class)
            .into_iter()
            .find_map(|c| c.events.get(name).map(Vec::as_slice))
    }

    pub fn find_error(&self, class: &str, name: &str) -> Option<&[Field]> {
        self.class_chain(class)
            .into_iter()
            .find_map(|c| c.errors.get(name).map(Vec::as_slice))
    }

    pub fn meta(&self, reference: &SharedRef) -> Option<&DefinitionMeta> {
        match reference {
            SharedRef::Struct(name) => self.structs.get(name).map(|d| &d.meta),
            SharedRef::Enum(name) => self.enums.get(name).map(|d| &d.meta),
            SharedRef::Constant(name) => self.constants.get(name).map(|d| &d.meta),
            SharedRef::Function(name) => self.functions.get(name).map(|d| &d.meta),
            SharedRef::Class(name) => self.classes.get(name).map(|d| &d.meta),
        }
    }

    pub fn hash_of(&self, reference: &SharedRef) -> Option<&str> {
        self.meta(reference).map(|meta| meta.hash.as_str())
    }

    /// `roots` plus everything they transitively refer to.
    pub fn closure<'a>(&self, roots: impl IntoIterator<Item = &'a SharedRef>) -> BTreeSet<SharedRef> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<SharedRef> = roots.into_iter().cloned().collect();
        while let Some(reference) = pending.pop() {
            if !seen.insert(reference.clone()) {
                continue;
            }
            if let Some(meta) = self.meta(&reference) {
                pending.extend(meta.references.iter().cloned());
            }
        }
        seen
    }

    /// Current hash of every reference in `refs` that still exists.
    pub fn dependency_hashes(&self, refs: &BTreeSet<SharedRef>) -> BTreeMap<String, String> {
        refs.iter()
            .filter_map(|r| self.hash_of(r).map(|hash| (r.key(), hash.to_string())))
            .collect()
    }

    /// Every definition hash currently in the table, keyed like
    /// [`SymbolTable::dependency_hashes`].
    pub fn definition_hashes(&self) -> BTreeMap<String, String> {
        let mut hashes = BTreeMap::new();
        let entries = self
            .structs
            .values()
            .map(|d| (SharedRef::Struct(d.name.clone()), &d.meta))
            .chain(self.enums.values().map(|d| (SharedRef::Enum(d.name.clone()), &d.meta)))
            .chain(
                self.constants
                    .values()
                    .map(|d| (SharedRef::Constant(d.variable.name.clone()), &d.meta)),
            )
            .chain(
                self.functions
                    .values()
                    .map(|d| (SharedRef::Function(d.function.name.clone()), &d.meta)),
            )
            .chain(self.classes.values().map(|d| (SharedRef::Class(d.name.clone()), &d.meta)));
        for (reference, meta) in entries {
            hashes.insert(reference.key(), meta.hash.clone());
        }
        hashes
    }
}

impl SharedRef {
    /// Stable textual key, e.g. `struct:Point`.
    pub fn key(&self) -> String {
        let (kind, name) = match self {
            SharedRef::Struct(name) => ("struct", name),
            SharedRef::Enum(name) => ("enum", name),
            SharedRef::Constant(name) => ("const", name),
            SharedRef::Function(name) => ("function", name),
            SharedRef::Class(name) => ("class", name),
        };
        format!("{kind}:{name}")
    }
}

/// Shared definitions a resolved type mentions.
pub fn type_references(ty: &Type, out: &mut BTreeSet<SharedRef>) {
    match ty {
        Type::Interface(name) => {
            out.insert(SharedRef::Struct(name.clone()));
        }
        Type::Enum(name) => {
            out.insert(SharedRef::Enum(name.clone()));
        }
        Type::Contract(name) => {
            out.insert(SharedRef::Class(name.clone()));
        }
        Type::Array(element) => type_references(element, out),
        Type::Mapping(key, value) => {
            type_references(key, out);
            type_references(value, out);
        }
        Type::Tuple(items) => {
            for item in items {
                type_references(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(hash: &str, references: &[SharedRef]) -> DefinitionMeta {
        DefinitionMeta {
            file: PathBuf::from("contracts/shared.ts"),
            hash: hash.to_string(),
            references: references.iter().cloned().collect(),
        }
    }

    fn named(name: &str, args: Vec<TypeExpr>) -> TypeExpr {
        TypeExpr::Named {
            name: name.to_string(),
            args,
            span: Span::default(),
        }
    }

    fn table() -> SymbolTable {
        let mut table = SymbolTable::new();
        table.enums.insert(
            "Status".to_string(),
            EnumDef {
                name: "Status".to_string(),
                members: vec!["Active".to_string(), "Paused".to_string()],
                meta: meta("e1", &[]),
            },
        );
        table.structs.insert(
            "Order".to_string(),
            StructDef {
                name: "Order".to_string(),
                fields: vec![("status".to_string(), Type::Enum("Status".to_string()))],
                meta: meta("s1", &[SharedRef::Enum("Status".to_string())]),
            },
        );
        table
    }

    #[test]
    fn resolves_records_and_user_types() {
        let table = table();
        let ty = named(
            "Record",
            vec![named("address", vec![]), named("Order", vec![])],
        );
        assert_eq!(
            table.resolve_type(&ty),
            Ok(Type::mapping(Type::Address, Type::Interface("Order".to_string())))
        );
    }

    #[test]
    fn rejects_unknown_and_bad_key_types() {
        let table = table();
        let err = table.resolve_type(&named("Missing", vec![])).unwrap_err();
        assert!(err.message.contains("unknown type `Missing`"));

        let bad_key = named("Record", vec![named("Order", vec![]), named("number", vec![])]);
        assert!(table.resolve_type(&bad_key).is_err());
    }

    #[test]
    fn closure_follows_references() {
        let table = table();
        let closure = table.closure([&SharedRef::Struct("Order".to_string())]);
        assert!(closure.contains(&SharedRef::Enum("Status".to_string())));

        let hashes = table.dependency_hashes(&closure);
        assert_eq!(hashes.get("enum:Status").map(String::as_str), Some("e1"));
        assert_eq!(hashes.get("struct:Order").map(String::as_str), Some("s1"));
    }
}
