//! Shallow declaration scan.
//!
//! Reads the top level of a file and the member headers of every class
//! without looking inside function bodies or initializers. The collector
//! builds the symbol table from this alone; the full parser uses the
//! recorded token positions to come back and lower each body.

use crate::ast::{ObjectTypeField, TypeExpr};
use crate::error::ParseError;
use crate::ir::Visibility;
use crate::lexer::TokenKind;
use crate::span::Span;
use crate::types::Type;

use super::annotation::{parse_object_fields, parse_type};
use super::cursor::Cursor;

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
    /// Whole declaration text, used for its definition hash.
    pub span: Span,
    /// Token index of the declaration's first token.
    pub start: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationKind {
    Struct(Vec<ObjectTypeField>),
    Enum(Vec<String>),
    Constant,
    Function,
    Class(ClassSignature),
}

impl DeclarationKind {
    pub fn tag(&self) -> &'static str {
        match self {
            DeclarationKind::Struct(_) => "struct",
            DeclarationKind::Enum(_) => "enum",
            DeclarationKind::Constant => "const",
            DeclarationKind::Function => "function",
            DeclarationKind::Class(_) => "class",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassSignature {
    pub is_abstract: bool,
    pub base: Option<String>,
    pub base_span: Span,
    pub members: Vec<MemberSignature>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub visibility: Option<Visibility>,
    pub is_static: bool,
    pub is_readonly: bool,
    pub is_abstract: bool,
    pub is_override: bool,
    pub payable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSignature {
    pub name: String,
    pub name_span: Span,
    pub modifiers: Modifiers,
    pub kind: MemberSignatureKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberSignatureKind {
    Field {
        ty: Option<TypeExpr>,
        /// Type of a lone literal initializer, for unannotated fields.
        literal_type: Option<Type>,
        initializer: Option<usize>,
    },
    Method {
        params: Vec<ParamSignature>,
        returns: Option<TypeExpr>,
        /// Token index of `{`, absent for abstract methods.
        body: Option<usize>,
    },
    Constructor {
        params: Vec<ParamSignature>,
        body: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSignature {
    pub name: String,
    pub ty: TypeExpr,
    /// Token index of the default value expression.
    pub default: Option<usize>,
}

impl ParamSignature {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// Scan every top-level declaration in the token stream.
pub fn scan_declarations(cursor: &mut Cursor<'_>) -> Result<Vec<Declaration>, ParseError> {
    let mut declarations = Vec::new();
    while !cursor.is_at_end() {
        match cursor.peek_kind() {
            TokenKind::Semi => {
                cursor.advance();
            }
            TokenKind::Import => cursor.skip_statement()?,
            TokenKind::Export => {
                cursor.advance();
                cursor.match_token(TokenKind::Default);
            }
            _ => declarations.push(scan_declaration(cursor)?),
        }
    }
    Ok(declarations)
}

fn scan_declaration(cursor: &mut Cursor<'_>) -> Result<Declaration, ParseError> {
    let start = cursor.position();
    let first = cursor.peek().span;
    let (name, kind) = match cursor.peek_kind() {
        TokenKind::Interface => {
            cursor.advance();
            let name = cursor.consume_identifier("expected interface name")?;
            if cursor.check(TokenKind::Extends) {
                return Err(cursor.error_at_current("interface inheritance is not supported"));
            }
            cursor.consume(TokenKind::LBrace, "expected `{` after interface name")?;
            (name, DeclarationKind::Struct(parse_object_fields(cursor)?))
        }
        TokenKind::Ident if cursor.check_word("type") => {
            cursor.advance();
            let name = cursor.consume_identifier("expected type name")?;
            cursor.consume(TokenKind::Equal, "expected `=` in type declaration")?;
            if !cursor.check(TokenKind::LBrace) {
                return Err(cursor.error_at_current("only object type declarations are supported"));
            }
            cursor.advance();
            let fields = parse_object_fields(cursor)?;
            cursor.match_token(TokenKind::Semi);
            (name, DeclarationKind::Struct(fields))
        }
        TokenKind::Enum => {
            cursor.advance();
            let name = cursor.consume_identifier("expected enum name")?;
            (name, DeclarationKind::Enum(scan_enum_members(cursor)?))
        }
        TokenKind::Const => {
            cursor.advance();
            let name = cursor.consume_identifier("expected constant name")?;
            cursor.skip_statement()?;
            (name, DeclarationKind::Constant)
        }
        TokenKind::Function => {
            cursor.advance();
            let name = cursor.consume_identifier("expected function name")?;
            skip_to_body(cursor)?;
            cursor.skip_balanced()?;
            (name, DeclarationKind::Function)
        }
        TokenKind::Class => scan_class(cursor, false)?,
        TokenKind::Ident if cursor.check_word("abstract") => {
            cursor.advance();
            if !cursor.check(TokenKind::Class) {
                return Err(cursor.error_at_current("expected `class` after `abstract`"));
            }
            scan_class(cursor, true)?
        }
        TokenKind::Let | TokenKind::Var => {
            return Err(cursor.error_at_current("top-level variables must be `const`"));
        }
        _ => return Err(cursor.error_at_current("unexpected token at top level")),
    };
    Ok(Declaration {
        name,
        kind,
        span: first.to(cursor.previous().span),
        start,
    })
}

fn scan_enum_members(cursor: &mut Cursor<'_>) -> Result<Vec<String>, ParseError> {
    cursor.consume(TokenKind::LBrace, "expected `{` after enum name")?;
    let mut members: Vec<String> = Vec::new();
    while !cursor.check(TokenKind::RBrace) {
        let token = cursor.peek();
        let member = cursor.consume_identifier("expected enum member")?;
        if cursor.check(TokenKind::Equal) {
            return Err(cursor.error_at_current("enum members cannot have initializers"));
        }
        if members.contains(&member) {
            return Err(cursor.error_at(token.span, &format!("duplicate enum member `{member}`")));
        }
        members.push(member);
        if !cursor.match_token(TokenKind::Comma) {
            break;
        }
    }
    cursor.consume(TokenKind::RBrace, "expected `}` to close enum")?;
    Ok(members)
}

/// Skip a parameter list and optional return annotation, stopping at `{`.
fn skip_to_body(cursor: &mut Cursor<'_>) -> Result<(), ParseError> {
    if !cursor.check(TokenKind::LParen) {
        return Err(cursor.error_at_current("expected `(`"));
    }
    cursor.skip_balanced()?;
    if cursor.match_token(TokenKind::Colon) {
        parse_type(cursor)?;
    }
    if !cursor.check(TokenKind::LBrace) {
        return Err(cursor.error_at_current("expected function body"));
    }
    Ok(())
}

fn scan_class(
    cursor: &mut Cursor<'_>,
    is_abstract: bool,
) -> Result<(String, DeclarationKind), ParseError> {
    cursor.consume(TokenKind::Class, "expected `class`")?;
    let name = cursor.consume_identifier("expected class name")?;
    if cursor.check(TokenKind::Less) {
        return Err(cursor.error_at_current("generic classes are not supported"));
    }

    let mut base = None;
    let mut base_span = Span::default();
    if cursor.match_token(TokenKind::Extends) {
        base_span = cursor.peek().span;
        base = Some(cursor.consume_identifier("expected base class name")?);
        if cursor.check(TokenKind::Comma) {
            return Err(cursor.error_at_current("a class can extend only one base"));
        }
    }
    // Interfaces only shape the TypeScript view of the class.
    if cursor.match_token(TokenKind::Implements) {
        loop {
            cursor.consume_identifier("expected interface name")?;
            if !cursor.match_token(TokenKind::Comma) {
                break;
            }
        }
    }

    cursor.consume(TokenKind::LBrace, "expected `{` to open class body")?;
    let mut members = Vec::new();
    while !cursor.check(TokenKind::RBrace) {
        if cursor.is_at_end() {
            return Err(cursor.error_at_current("unterminated class body"));
        }
        if cursor.match_token(TokenKind::Semi) {
            continue;
        }
        members.push(scan_member(cursor)?);
    }
    cursor.consume(TokenKind::RBrace, "expected `}`")?;

    Ok((
        name,
        DeclarationKind::Class(ClassSignature {
            is_abstract,
            base,
            base_span,
            members,
        }),
    ))
}

pub(super) fn scan_modifiers(cursor: &mut Cursor<'_>) -> Result<Modifiers, ParseError> {
    let mut modifiers = Modifiers::default();
    loop {
        if cursor.match_token(TokenKind::At) {
            let decorator = cursor.peek();
            match cursor.consume_identifier("expected decorator name")?.as_str() {
                "payable" => modifiers.payable = true,
                other => {
                    return Err(
                        cursor.error_at(decorator.span, &format!("unknown decorator `@{other}`"))
                    );
                }
            }
            if cursor.match_token(TokenKind::LParen) {
                cursor.consume(TokenKind::RParen, "decorator takes no arguments")?;
            }
            continue;
        }
        // A modifier word followed by `(`, `:` or `=` is a member name.
        let is_member_name = matches!(
            cursor.peek_nth(1).kind,
            TokenKind::LParen | TokenKind::Colon | TokenKind::Equal | TokenKind::Semi
        );
        if cursor.peek_kind() != TokenKind::Ident || is_member_name {
            break;
        }
        let visibility = match cursor.text(cursor.peek()) {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            "protected" => Some(Visibility::Internal),
            _ => None,
        };
        if let Some(visibility) = visibility {
            modifiers.visibility = Some(visibility);
        } else if cursor.check_word("static") {
            modifiers.is_static = true;
        } else if cursor.check_word("readonly") {
            modifiers.is_readonly = true;
        } else if cursor.check_word("abstract") {
            modifiers.is_abstract = true;
        } else if cursor.check_word("override") {
            modifiers.is_override = true;
        } else {
            break;
        }
        cursor.advance();
    }
    Ok(modifiers)
}

fn scan_member(cursor: &mut Cursor<'_>) -> Result<MemberSignature, ParseError> {
    let modifiers = scan_modifiers(cursor)?;
    let name_span = cursor.peek().span;
    if cursor.peek_kind() != TokenKind::Ident {
        return Err(cursor.error_at_current("expected member name"));
    }
    let name = cursor.consume_member_name()?;

    let kind = if name == "constructor" && cursor.check(TokenKind::LParen) {
        let params = scan_params(cursor)?;
        if !cursor.check(TokenKind::LBrace) {
            return Err(cursor.error_at_current("expected constructor body"));
        }
        let body = cursor.position();
        cursor.skip_balanced()?;
        MemberSignatureKind::Constructor { params, body }
    } else if cursor.check(TokenKind::LParen) {
        let params = scan_params(cursor)?;
        let returns = if cursor.match_token(TokenKind::Colon) {
            Some(parse_type(cursor)?)
        } else {
            None
        };
        let body = if cursor.check(TokenKind::LBrace) {
            let body = cursor.position();
            cursor.skip_balanced()?;
            Some(body)
        } else if modifiers.is_abstract {
            cursor.match_token(TokenKind::Semi);
            None
        } else {
            return Err(cursor.error_at_current("expected method body"));
        };
        MemberSignatureKind::Method {
            params,
            returns,
            body,
        }
    } else {
        if cursor.check(TokenKind::Question) {
            return Err(cursor.error_at_current("optional fields are not supported"));
        }
        cursor.match_token(TokenKind::Bang);
        let ty = if cursor.match_token(TokenKind::Colon) {
            Some(parse_type(cursor)?)
        } else {
            None
        };
        let mut literal_type = None;
        let mut initializer = None;
        if cursor.match_token(TokenKind::Equal) {
            initializer = Some(cursor.position());
            let ends = matches!(
                cursor.peek_nth(1).kind,
                TokenKind::Semi | TokenKind::RBrace
            );
            if ends {
                literal_type = match cursor.peek_kind() {
                    TokenKind::Number => Some(Type::UINT256),
                    TokenKind::String => Some(Type::String),
                    TokenKind::True | TokenKind::False => Some(Type::Boolean),
                    _ => None,
                };
            }
            cursor.skip_statement()?;
        } else if ty.is_none() {
            return Err(cursor.error_at(name_span, &format!("field `{name}` needs a type annotation")));
        } else {
            cursor.match_token(TokenKind::Semi);
        }
        MemberSignatureKind::Field {
            ty,
            literal_type,
            initializer,
        }
    };

    Ok(MemberSignature {
        name,
        name_span,
        modifiers,
        kind,
    })
}

/// `(a: T, b: U = expr)`, leaving default expressions unparsed.
pub(super) fn scan_params(cursor: &mut Cursor<'_>) -> Result<Vec<ParamSignature>, ParseError> {
    cursor.consume(TokenKind::LParen, "expected `(`")?;
    let mut params: Vec<ParamSignature> = Vec::new();
    while !cursor.check(TokenKind::RParen) {
        if cursor.check_word("public")
            || cursor.check_word("private")
            || cursor.check_word("readonly")
        {
            return Err(cursor.error_at_current("parameter properties are not supported"));
        }
        let name_token = cursor.peek();
        let name = cursor.consume_identifier("expected parameter name")?;
        if cursor.check(TokenKind::Question) {
            return Err(cursor.error_at_current("optional parameters are not supported; use a default value"));
        }
        if !cursor.match_token(TokenKind::Colon) {
            return Err(cursor.error_at(
                name_token.span,
                &format!("parameter `{name}` needs a type annotation"),
            ));
        }
        let ty = parse_type(cursor)?;
        let default = if cursor.match_token(TokenKind::Equal) {
            let start = cursor.position();
            skip_default_value(cursor)?;
            Some(start)
        } else {
            if params.last().is_some_and(ParamSignature::has_default) {
                return Err(cursor.error_at(
                    name_token.span,
                    "parameters after a defaulted parameter need defaults too",
                ));
            }
            None
        };
        params.push(ParamSignature { name, ty, default });
        if !cursor.match_token(TokenKind::Comma) {
            break;
        }
    }
    cursor.consume(TokenKind::RParen, "expected `)` to close parameters")?;
    Ok(params)
}

fn skip_default_value(cursor: &mut Cursor<'_>) -> Result<(), ParseError> {
    loop {
        match cursor.peek_kind() {
            TokenKind::Comma | TokenKind::RParen => return Ok(()),
            TokenKind::Eof => return Err(cursor.error_at_current("unterminated parameter list")),
            TokenKind::LParen | TokenKind::LBrace | TokenKind::LBracket => cursor.skip_balanced()?,
            _ => {
                cursor.advance();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::lexer::lex;

    fn scan(source: &str) -> Result<Vec<Declaration>, ParseError> {
        let tokens = lex(source).expect("lex");
        let mut cursor = Cursor::new(source, &tokens, Path::new("scan.ts"));
        scan_declarations(&mut cursor)
    }

    #[test]
    fn scans_top_level_declarations() {
        let source = r#"
            import { address } from "skittles";
            export interface Point { x: number; y: number }
            export enum Status { Active, Paused }
            export const FEE: number = 3;
            export function double(x: number): number { return x * 2; }
            export class Token extends Base { total: number = 0; }
        "#;
        let decls = scan(source).expect("scan");
        let names: Vec<(&str, &str)> = decls
            .iter()
            .map(|d| (d.kind.tag(), d.name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("struct", "Point"),
                ("enum", "Status"),
                ("const", "FEE"),
                ("function", "double"),
                ("class", "Token"),
            ]
        );
        assert_eq!(decls[2].span.text(source), "const FEE: number = 3;");
    }

    #[test]
    fn scans_class_members() {
        let source = r#"
            abstract class Vault {
                private owner: address;
                static readonly FEE = 5;
                Deposit: SkittlesEvent<{ who: Indexed<address>; amount: number }>;
                constructor(owner: address) { this.owner = owner; }
                @payable deposit(note: string = "none"): void {}
                abstract rate(): number;
            }
        "#;
        let decls = scan(source).expect("scan");
        let DeclarationKind::Class(class) = &decls[0].kind else {
            panic!("expected class");
        };
        assert!(class.is_abstract);
        let names: Vec<&str> = class.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["owner", "FEE", "Deposit", "constructor", "deposit", "rate"]);

        assert_eq!(class.members[0].modifiers.visibility, Some(Visibility::Private));
        match &class.members[1].kind {
            MemberSignatureKind::Field { literal_type, .. } => {
                assert_eq!(literal_type, &Some(Type::UINT256));
            }
            other => panic!("unexpected member {other:?}"),
        }
        assert!(class.members[4].modifiers.payable);
        match &class.members[4].kind {
            MemberSignatureKind::Method { params, .. } => assert!(params[0].has_default()),
            other => panic!("unexpected member {other:?}"),
        }
        assert!(matches!(
            class.members[5].kind,
            MemberSignatureKind::Method { body: None, .. }
        ));
    }

    #[test]
    fn rejects_enum_initializers() {
        let err = scan("enum E { A = 1 }").unwrap_err();
        assert!(err.message.contains("initializers"));
    }

    #[test]
    fn rejects_missing_parameter_types() {
        let err = scan("class A { f(x) {} }").unwrap_err();
        assert!(err.message.contains("needs a type annotation"));
    }
}
