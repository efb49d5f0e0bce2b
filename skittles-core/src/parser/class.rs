use std::collections::{BTreeSet, HashSet};

use crate::ast::{MemberKind, TypeExpr};
use crate::error::ParseError;
use crate::ir::{
    Constructor, Contract, CustomError, Event, Expression, Function, FunctionKind, Literal,
    Mutability, Parameter, SharedRef, Statement, VarDecl, Variable, Visibility,
};
use crate::lexer::TokenKind;
use crate::symbols::{DefinitionMeta, FieldInfo, type_references};
use crate::types::Type;

use super::annotation::parse_type;
use super::decl::{ClassSignature, Declaration, MemberSignature, MemberSignatureKind, ParamSignature, scan_params};
use super::{FunctionContext, Parser};

const MAX_INDEXED_FIELDS: usize = 3;

type LoweredMembers = (
    Vec<Variable>,
    Vec<Function>,
    Option<Constructor>,
    Vec<Event>,
    Vec<CustomError>,
);

impl Parser<'_> {
    pub(super) fn lower_class(&mut self, decl: &Declaration, sig: &ClassSignature) -> Result<Contract, ParseError> {
        let name = decl.name.as_str();
        self.take_references();
        self.env.clear();

        let meta = match self.symbols.classes.get(name) {
            Some(class) => class.meta.clone(),
            None => DefinitionMeta {
                file: self.cursor.file().to_path_buf(),
                hash: String::new(),
                references: BTreeSet::new(),
            },
        };
        let info = self
            .symbols
            .resolve_class(name, sig, meta)
            .map_err(|err| self.resolve_error(err))?;

        if let Some(base) = &sig.base {
            if base == name {
                return Err(self.error(sig.base_span, &format!("class `{name}` cannot extend itself")));
            }
            if !self.symbols.classes.contains_key(base) {
                return Err(self.error(sig.base_span, &format!("unknown base class `{base}`")));
            }
            self.reference(SharedRef::Class(base.clone()));
        }

        let mut seen = HashSet::new();
        for member in &sig.members {
            if matches!(member.kind, MemberSignatureKind::Constructor { .. }) {
                continue;
            }
            if !seen.insert(member.name.as_str()) {
                return Err(self.error(member.name_span, &format!("duplicate member `{}`", member.name)));
            }
        }

        self.class = Some(info);
        let lowered = self.lower_members(name, sig);
        self.class = None;
        self.function = None;
        let (variables, functions, constructor, events, errors) = lowered?;

        Ok(Contract {
            name: name.to_string(),
            file: self.cursor.file().to_path_buf(),
            is_abstract: sig.is_abstract,
            variables,
            functions,
            constructor,
            events,
            errors,
            inherits: sig.base.iter().cloned().collect(),
            references: self.take_references(),
        })
    }

    fn lower_members(&mut self, name: &str, sig: &ClassSignature) -> Result<LoweredMembers, ParseError> {
        let mut variables = Vec::new();
        let mut events = Vec::new();
        let mut errors = Vec::new();

        // Fields first, so every method body sees every field.
        for member in &sig.members {
            let MemberSignatureKind::Field { ty, initializer, .. } = &member.kind else {
                continue;
            };
            if member.modifiers.is_abstract {
                return Err(self.error(member.name_span, "abstract fields are not supported"));
            }
            if member.modifiers.payable {
                return Err(self.error(member.name_span, "`@payable` applies to methods only"));
            }
            match ty.as_ref().map(TypeExpr::member_kind) {
                Some(MemberKind::Event(fields)) => {
                    let fields = self
                        .symbols
                        .resolve_fields(fields, true)
                        .map_err(|err| self.resolve_error(err))?;
                    if fields.iter().filter(|field| field.indexed).count() > MAX_INDEXED_FIELDS {
                        return Err(self.error(
                            member.name_span,
                            &format!("event `{}` has more than {MAX_INDEXED_FIELDS} indexed fields", member.name),
                        ));
                    }
                    for field in &fields {
                        type_references(&field.ty, &mut self.references);
                    }
                    events.push(Event {
                        name: member.name.clone(),
                        fields,
                    });
                }
                Some(MemberKind::Error(fields)) => {
                    let fields = self
                        .symbols
                        .resolve_fields(fields, false)
                        .map_err(|err| self.resolve_error(err))?;
                    for field in &fields {
                        type_references(&field.ty, &mut self.references);
                    }
                    errors.push(CustomError {
                        name: member.name.clone(),
                        fields,
                    });
                }
                Some(MemberKind::Storage(annotation)) => {
                    variables.push(self.lower_field(member, Some(annotation), *initializer)?);
                }
                None => variables.push(self.lower_field(member, None, *initializer)?),
            }
        }

        let mut functions = Vec::new();
        let mut constructor = None;
        for member in &sig.members {
            match &member.kind {
                MemberSignatureKind::Constructor { params, body } => {
                    if constructor.is_some() {
                        return Err(self.error(member.name_span, "a class can have only one constructor"));
                    }
                    constructor = Some(self.lower_constructor(member, params, *body)?);
                }
                MemberSignatureKind::Method { params, returns, body } => {
                    let method = self.lower_method(member, params, returns.as_ref(), *body, sig.is_abstract)?;
                    functions.extend(default_overloads(&method));
                    functions.push(method);
                }
                MemberSignatureKind::Field { .. } => {}
            }
        }

        if let Some(base) = &sig.base {
            let base_required = self
                .symbols
                .classes
                .get(base)
                .and_then(|class| class.constructor.as_ref())
                .is_some_and(|ctor| ctor.required > 0);
            let passes_args = constructor
                .as_ref()
                .is_some_and(|ctor: &Constructor| ctor.base_args.is_some());
            if base_required && !passes_args && !sig.is_abstract {
                return Err(self.error(
                    sig.base_span,
                    &format!("`{name}` must call `super(...)` with the arguments `{base}` needs"),
                ));
            }
        }

        Ok((variables, functions, constructor, events, errors))
    }

    fn lower_field(
        &mut self,
        member: &MemberSignature,
        annotation: Option<&TypeExpr>,
        initializer: Option<usize>,
    ) -> Result<Variable, ParseError> {
        let declared = annotation.map(|ty| self.resolve(ty)).transpose()?;
        self.env.clear();

        let value = match initializer {
            None => None,
            Some(start) => {
                self.cursor.seek(start);
                // `{}` and `[]` are the zero values of mappings and arrays.
                let empty = match &declared {
                    Some(Type::Mapping(..)) => {
                        self.cursor.check(TokenKind::LBrace) && self.cursor.check_nth(1, TokenKind::RBrace)
                    }
                    Some(Type::Array(_)) => {
                        self.cursor.check(TokenKind::LBracket) && self.cursor.check_nth(1, TokenKind::RBracket)
                    }
                    _ => false,
                };
                if empty {
                    None
                } else {
                    let value = self.parse_expression(declared.as_ref())?;
                    self.consume_semi()?;
                    Some(value)
                }
            }
        };

        let inferred = value.as_ref().and_then(|value| self.type_of(value));
        let Some(ty) = declared.or(inferred) else {
            return Err(self.error(
                member.name_span,
                &format!("cannot infer the type of field `{}`; add a type annotation", member.name),
            ));
        };
        if ty.is_void() {
            return Err(self.error(member.name_span, &format!("field `{}` cannot be void", member.name)));
        }

        let modifiers = &member.modifiers;
        let mutability = if modifiers.is_static {
            if !modifiers.is_readonly {
                return Err(self.error(member.name_span, "static fields must be `readonly`"));
            }
            if value.is_none() {
                return Err(self.error(
                    member.name_span,
                    &format!("constant `{}` needs an initializer", member.name),
                ));
            }
            Mutability::Constant
        } else if modifiers.is_readonly {
            if ty.is_value_type() {
                Mutability::Immutable
            } else if matches!(value, Some(Expression::Literal(Literal::String(_)))) {
                Mutability::Constant
            } else {
                Mutability::Mutable
            }
        } else {
            Mutability::Mutable
        };

        let visibility = modifiers.visibility.unwrap_or(Visibility::Public);
        if let Some(class) = self.class.as_mut() {
            class
                .fields
                .entry(member.name.clone())
                .or_insert_with(|| FieldInfo {
                    ty: ty.clone(),
                    visibility,
                    constant: mutability == Mutability::Constant,
                });
        }

        Ok(Variable {
            name: member.name.clone(),
            ty,
            visibility,
            mutability,
            initializer: value,
        })
    }

    fn lower_method(
        &mut self,
        member: &MemberSignature,
        params: &[ParamSignature],
        returns: Option<&TypeExpr>,
        body: Option<usize>,
        in_abstract_class: bool,
    ) -> Result<Function, ParseError> {
        let modifiers = &member.modifiers;
        if modifiers.is_static {
            return Err(self.error(
                member.name_span,
                "static methods are not supported; use a top-level function",
            ));
        }
        if modifiers.is_readonly {
            return Err(self.error(member.name_span, "methods cannot be `readonly`"));
        }
        let kind = match member.name.as_str() {
            "receive" => FunctionKind::Receive,
            "fallback" => FunctionKind::Fallback,
            _ => FunctionKind::Method,
        };
        if kind == FunctionKind::Receive && !params.is_empty() {
            return Err(self.error(member.name_span, "`receive` takes no parameters"));
        }
        if kind != FunctionKind::Method && params.iter().any(ParamSignature::has_default) {
            return Err(self.error(member.name_span, "default parameters are not allowed here"));
        }
        if modifiers.is_abstract && body.is_some() {
            return Err(self.error(member.name_span, "abstract methods cannot have a body"));
        }
        if body.is_none() && !in_abstract_class {
            return Err(self.error(
                member.name_span,
                &format!("abstract method `{}` in a class that is not abstract", member.name),
            ));
        }

        let returns = match returns {
            Some(annotation) => self.resolve(annotation)?,
            None => Type::Void,
        };
        self.env.clear();
        self.env.push_scope();
        let params = self.lower_params(member, params)?;
        let statements = match body {
            Some(start) => self.lower_body(start, returns.clone(), false)?.0,
            None => Vec::new(),
        };
        self.env.clear();

        Ok(Function {
            name: member.name.clone(),
            kind,
            params,
            returns,
            visibility: modifiers.visibility.unwrap_or(Visibility::Public),
            payable: modifiers.payable || kind == FunctionKind::Receive,
            is_virtual: false,
            is_override: modifiers.is_override,
            is_abstract: body.is_none(),
            body: statements,
        })
    }

    fn lower_constructor(
        &mut self,
        member: &MemberSignature,
        params: &[ParamSignature],
        body: usize,
    ) -> Result<Constructor, ParseError> {
        if let Some(visibility) = member.modifiers.visibility {
            if visibility != Visibility::Public {
                return Err(self.error(member.name_span, "constructors are always public"));
            }
        }
        self.env.clear();
        self.env.push_scope();
        let lowered = self.lower_params(member, params)?;

        let mut kept = Vec::new();
        let mut statements = Vec::new();
        for param in lowered {
            match param.default {
                Some(value) => statements.push(Statement::VarDecl(VarDecl {
                    name: param.name,
                    ty: param.ty,
                    initializer: Some(value),
                    from_parameter: true,
                })),
                None => kept.push(param),
            }
        }
        let (body, base_args) = self.lower_body(body, Type::Void, true)?;
        self.env.clear();
        statements.extend(body);

        Ok(Constructor {
            params: kept,
            payable: member.modifiers.payable,
            base_args,
            body: statements,
        })
    }

    /// Declares each parameter. Defaults are lowered with no locals in
    /// scope, since they may only use constants and state.
    fn lower_params(
        &mut self,
        member: &MemberSignature,
        params: &[ParamSignature],
    ) -> Result<Vec<Parameter>, ParseError> {
        let mut lowered = Vec::with_capacity(params.len());
        for param in params {
            let ty = self.resolve(&param.ty)?;
            if matches!(ty, Type::Mapping(..)) {
                return Err(self.error(
                    member.name_span,
                    &format!("parameter `{}` cannot be a mapping", param.name),
                ));
            }
            let default = match param.default {
                Some(start) => {
                    let resume = self.cursor.position();
                    let env = std::mem::take(&mut self.env);
                    self.cursor.seek(start);
                    let value = self.parse_expression(Some(&ty));
                    self.env = env;
                    self.cursor.seek(resume);
                    Some(value?)
                }
                None => None,
            };
            if !self.env.declare(&param.name, ty.clone()) {
                return Err(self.error(
                    member.name_span,
                    &format!("duplicate parameter `{}`", param.name),
                ));
            }
            lowered.push(Parameter {
                name: param.name.clone(),
                ty,
                default,
            });
        }
        Ok(lowered)
    }

    /// Lower the block starting at token `start`. Returns the body and
    /// the arguments of a `super(...)` call, if one was made.
    fn lower_body(
        &mut self,
        start: usize,
        returns: Type,
        is_constructor: bool,
    ) -> Result<(Vec<Statement>, Option<Vec<Expression>>), ParseError> {
        self.cursor.seek(start);
        self.function = Some(FunctionContext {
            returns,
            is_constructor,
            base_args: None,
            breakable: Vec::new(),
            temp_counter: 0,
        });
        let body = self.parse_block();
        let context = self.function.take();
        Ok((body?, context.and_then(|context| context.base_args)))
    }

    /// `const NAME: T = value;` at file level.
    pub fn constant_at(&mut self, start: usize) -> Result<Variable, ParseError> {
        self.cursor.seek(start);
        self.class = None;
        self.function = None;
        self.env.clear();

        self.cursor.consume(TokenKind::Const, "expected `const`")?;
        let span = self.cursor.peek().span;
        let name = self.cursor.consume_identifier("expected constant name")?;
        let declared = if self.cursor.match_token(TokenKind::Colon) {
            let annotation = parse_type(&mut self.cursor)?;
            Some(self.resolve(&annotation)?)
        } else {
            None
        };
        if !self.cursor.match_token(TokenKind::Equal) {
            return Err(self.error(span, &format!("constant `{name}` needs an initializer")));
        }
        let value = self.parse_expression(declared.as_ref())?;
        self.consume_semi()?;

        let inferred = self.type_of(&value);
        let Some(ty) = declared.or(inferred) else {
            return Err(self.error(span, &format!("cannot infer the type of constant `{name}`")));
        };
        Ok(Variable {
            name,
            ty,
            visibility: Visibility::Internal,
            mutability: Mutability::Constant,
            initializer: Some(value),
        })
    }

    /// `function name(params): T { ... }` at file level.
    pub fn function_at(&mut self, start: usize) -> Result<Function, ParseError> {
        let (mut function, body) = self.function_header(start)?;
        self.env.push_scope();
        for param in &function.params {
            if !self.env.declare(&param.name, param.ty.clone()) {
                let span = self.cursor.peek().span;
                return Err(self.error(span, &format!("duplicate parameter `{}`", param.name)));
            }
        }
        let (statements, _) = self.lower_body(body, function.returns.clone(), false)?;
        self.env.clear();
        function.body = statements;
        Ok(function)
    }

    /// The signature of a free function, leaving its body unlowered.
    pub fn function_signature_at(&mut self, start: usize) -> Result<Function, ParseError> {
        self.function_header(start).map(|(function, _)| function)
    }

    /// Header of a free function and the token index of its body.
    fn function_header(&mut self, start: usize) -> Result<(Function, usize), ParseError> {
        self.cursor.seek(start);
        self.class = None;
        self.function = None;
        self.env.clear();

        self.cursor.consume(TokenKind::Function, "expected `function`")?;
        let span = self.cursor.peek().span;
        let name = self.cursor.consume_identifier("expected function name")?;
        let params = scan_params(&mut self.cursor)?;
        if params.iter().any(ParamSignature::has_default) {
            return Err(self.error(span, "default parameters are only supported on class methods"));
        }
        let returns = if self.cursor.match_token(TokenKind::Colon) {
            let annotation = parse_type(&mut self.cursor)?;
            self.resolve(&annotation)?
        } else {
            Type::Void
        };
        let params = params
            .iter()
            .map(|param| {
                Ok(Parameter {
                    name: param.name.clone(),
                    ty: self.resolve(&param.ty)?,
                    default: None,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        let function = Function {
            name,
            kind: FunctionKind::Free,
            params,
            returns,
            visibility: Visibility::Internal,
            payable: false,
            is_virtual: false,
            is_override: false,
            is_abstract: false,
            body: Vec::new(),
        };
        Ok((function, self.cursor.position()))
    }
}

/// One overload per omittable suffix of defaulted parameters, each
/// forwarding to the full method with the defaults filled in.
fn default_overloads(method: &Function) -> Vec<Function> {
    let Some(first) = method.params.iter().position(|param| param.default.is_some()) else {
        return Vec::new();
    };
    (first..method.params.len())
        .map(|kept| {
            let params: Vec<Parameter> = method.params[..kept]
                .iter()
                .map(|param| Parameter {
                    default: None,
                    ..param.clone()
                })
                .collect();
            let args = method
                .params
                .iter()
                .enumerate()
                .map(|(index, param)| match (&param.default, index < kept) {
                    (Some(default), false) => default.clone(),
                    _ => Expression::ident(param.name.as_str()),
                })
                .collect();
            let call = Expression::call(Expression::this_member(method.name.as_str()), args);
            let statement = if method.returns.is_void() {
                Statement::Expr(call)
            } else {
                Statement::Return(Some(call))
            };
            Function {
                name: method.name.clone(),
                kind: method.kind,
                params,
                returns: method.returns.clone(),
                visibility: method.visibility,
                payable: method.payable,
                is_virtual: false,
                is_override: false,
                is_abstract: false,
                body: vec![statement],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{parse_one, parse_with};
    use super::*;

    #[test]
    fn classifies_field_mutability() {
        let contract = parse_one(
            "class A {\n\
               static readonly FEE: number = 5;\n\
               readonly owner: address = msg.sender;\n\
               readonly label: string = \"vault\";\n\
               balances: Record<address, number> = {};\n\
               count = 0;\n\
             }",
        );
        let mutability = |name: &str| contract.variable(name).map(|v| v.mutability);
        assert_eq!(mutability("FEE"), Some(Mutability::Constant));
        assert_eq!(mutability("owner"), Some(Mutability::Immutable));
        assert_eq!(mutability("label"), Some(Mutability::Constant));
        assert_eq!(mutability("balances"), Some(Mutability::Mutable));
        assert_eq!(contract.variable("balances").and_then(|v| v.initializer.as_ref()), None);
        assert_eq!(contract.variable("count").map(|v| &v.ty), Some(&Type::UINT256));
    }

    #[test]
    fn expands_default_parameters_into_overloads() {
        let contract = parse_one(
            "class A { add(a: number, b: number = 1, c: number = 2): number { return a + b + c; } }",
        );
        let arities: Vec<usize> = contract.functions.iter().map(|f| f.params.len()).collect();
        assert_eq!(arities, vec![1, 2, 3]);
        let Statement::Return(Some(Expression::Call { args, .. })) = &contract.functions[0].body[0] else {
            panic!("expected forwarding call");
        };
        assert_eq!(args[1], Expression::number("1"));
        assert_eq!(args[2], Expression::number("2"));
    }

    #[test]
    fn turns_constructor_defaults_into_locals() {
        let contract = parse_one(
            "class A { supply: number; constructor(owner: address, supply: number = 100) { this.supply = supply; } }",
        );
        let constructor = contract.constructor.expect("constructor");
        assert_eq!(constructor.params.len(), 1);
        assert!(matches!(
            &constructor.body[0],
            Statement::VarDecl(decl) if decl.name == "supply" && decl.from_parameter
        ));
    }

    #[test]
    fn captures_base_constructor_arguments() {
        let base = ("base.ts", "class Base { owner: address; constructor(owner: address) { this.owner = owner; } }");
        let contracts = parse_with(
            "class Child extends Base { constructor() { super(msg.sender); } }",
            &[base],
        )
        .expect("parse");
        let constructor = contracts[0].constructor.as_ref().expect("constructor");
        assert_eq!(constructor.base_args.as_ref().map(Vec::len), Some(1));
        assert_eq!(contracts[0].inherits, vec!["Base".to_string()]);
        assert!(contracts[0].references.contains(&SharedRef::Class("Base".to_string())));

        let err = parse_with("class Child extends Base { }", &[base]).unwrap_err();
        assert!(err.message.contains("super(...)"), "{}", err.message);
    }

    #[test]
    fn rejects_too_many_indexed_fields() {
        let err = parse_with(
            "class A { E: SkittlesEvent<{ a: Indexed<number>; b: Indexed<number>; c: Indexed<number>; d: Indexed<number> }>; }",
            &[],
        )
        .unwrap_err();
        assert!(err.message.contains("indexed"), "{}", err.message);
    }

    #[test]
    fn lowers_receive_and_free_functions() {
        let contracts = parse_with(
            "function twice(x: number): number { return x * 2; }\n\
             class A { total: number = 0; receive(): void { this.total = twice(msg.value); } }",
            &[],
        )
        .expect("parse");
        let receive = &contracts[0].functions[0];
        assert_eq!(receive.kind, FunctionKind::Receive);
        assert!(receive.payable);
        assert!(contracts[0].references.contains(&SharedRef::Function("twice".to_string())));
    }

    #[test]
    fn rejects_abstract_methods_in_concrete_classes() {
        let err = parse_with("class A { abstract rate(): number; }", &[]).unwrap_err();
        assert!(err.message.contains("not abstract"), "{}", err.message);
    }
}
