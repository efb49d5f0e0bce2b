//! Expression lowering by precedence climbing.
//!
//! `expected` carries the type the surrounding context wants, when there
//! is one. Object and tuple literals have no type of their own and need
//! it to become struct literals and tuples.

use crate::builtins;
use crate::error::ParseError;
use crate::ir::{BinaryOp, Expression, Field, Literal, SharedRef, UnaryOp};
use crate::lexer::TokenKind;
use crate::span::Span;
use crate::types::{self, Type};

use super::Parser;
use super::annotation::parse_type;
use super::stmt::is_simple_path;

/// Infix operators; `**` is kept apart because it lowers to `Math.pow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Infix {
    Binary(BinaryOp),
    Pow,
}

const LOWEST_BINARY: u8 = 1;

/// How the arguments of a call are typed.
enum CallShape {
    Params { params: Vec<Type>, required: usize },
    Emit(Vec<Field>),
    Untyped,
}

impl Parser<'_> {
    pub(super) fn parse_expression(&mut self, expected: Option<&Type>) -> Result<Expression, ParseError> {
        self.parse_assignment(expected)
    }

    fn parse_assignment(&mut self, expected: Option<&Type>) -> Result<Expression, ParseError> {
        let start = self.cursor.peek().span;
        let target = self.parse_conditional(expected)?;
        let Some((op, width)) = self.peek_assignment() else {
            return Ok(target);
        };
        self.check_assignable(&target, start)?;
        for _ in 0..width {
            self.cursor.advance();
        }
        let target_ty = self.type_of(&target);
        let rewritten = match op {
            Some(Infix::Pow) => Some("**="),
            Some(Infix::Binary(BinaryOp::Add)) if target_ty.as_ref().is_some_and(Type::is_string) => Some("+="),
            _ => None,
        };
        // These read the target again on the right-hand side.
        if let Some(operator) = rewritten {
            if !is_simple_path(&target) {
                return Err(self.error(
                    start,
                    &format!("`{operator}` target must not contain calls or updates; store the index in a local first"),
                ));
            }
        }
        let value = self.parse_assignment(target_ty.as_ref())?;

        Ok(match op {
            None => assign(None, target, value),
            Some(Infix::Pow) => {
                let power = Expression::builtin_call("Math", "pow", vec![target.clone(), value]);
                assign(None, target, power)
            }
            Some(Infix::Binary(BinaryOp::Add)) if target_ty.as_ref().is_some_and(Type::is_string) => {
                let joined = concat(target.clone(), value);
                assign(None, target, joined)
            }
            Some(Infix::Binary(op)) => assign(Some(op), target, value),
        })
    }

    fn peek_assignment(&self) -> Option<(Option<Infix>, usize)> {
        use TokenKind::*;
        let binary = |op| Some((Some(Infix::Binary(op)), 1));
        match self.cursor.peek_kind() {
            Equal => Some((None, 1)),
            PlusEq => binary(BinaryOp::Add),
            MinusEq => binary(BinaryOp::Sub),
            StarEq => binary(BinaryOp::Mul),
            SlashEq => binary(BinaryOp::Div),
            PercentEq => binary(BinaryOp::Mod),
            ShiftLeftEq => binary(BinaryOp::Shl),
            AmpEq => binary(BinaryOp::BitAnd),
            PipeEq => binary(BinaryOp::BitOr),
            CaretEq => binary(BinaryOp::BitXor),
            StarStarEq => Some((Some(Infix::Pow), 1)),
            Greater
                if self.cursor.check_nth(1, Greater)
                    && self.cursor.check_nth(2, Equal)
                    && self.cursor.adjacent(1)
                    && self.cursor.adjacent(2) =>
            {
                Some((Some(Infix::Binary(BinaryOp::Shr)), 3))
            }
            _ => None,
        }
    }

    pub(super) fn check_assignable(&self, target: &Expression, span: Span) -> Result<(), ParseError> {
        match target {
            Expression::Identifier(name) => {
                if self.env.lookup(name).is_some() {
                    Ok(())
                } else {
                    Err(self.error(span, &format!("cannot assign to `{name}`")))
                }
            }
            Expression::Property { object, property } => {
                if let Some(member) = target.this_member_name() {
                    return match self.field_info(member) {
                        Some(field) if field.constant => {
                            Err(self.error(span, &format!("cannot assign to constant `{member}`")))
                        }
                        Some(_) => Ok(()),
                        None => Err(self.error(span, &format!("`{member}` is not a field"))),
                    };
                }
                match object.as_ref() {
                    Expression::Identifier(root)
                        if self.env.lookup(root).is_none()
                            && (builtins::is_namespace(root) || self.symbols.enums.contains_key(root)) =>
                    {
                        Err(self.error(span, &format!("cannot assign to `{root}.{property}`")))
                    }
                    _ => Ok(()),
                }
            }
            Expression::Index { object, .. } => match self.type_of(object) {
                Some(Type::String) => Err(self.error(span, "strings are immutable")),
                _ => Ok(()),
            },
            _ => Err(self.error(span, "invalid assignment target")),
        }
    }

    fn parse_conditional(&mut self, expected: Option<&Type>) -> Result<Expression, ParseError> {
        let condition = self.parse_binary(LOWEST_BINARY, expected)?;
        if !self.cursor.match_token(TokenKind::Question) {
            return Ok(condition);
        }
        let then_value = self.parse_assignment(expected)?;
        self.cursor
            .consume(TokenKind::Colon, "expected `:` in conditional expression")?;
        let else_value = self.parse_assignment(expected)?;
        Ok(Expression::Conditional {
            condition: Box::new(condition),
            then_value: Box::new(then_value),
            else_value: Box::new(else_value),
        })
    }

    fn parse_binary(&mut self, min: u8, expected: Option<&Type>) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary(expected)?;
        while let Some((op, precedence, width)) = self.peek_infix()? {
            if precedence < min {
                break;
            }
            let span = self.cursor.peek().span;
            for _ in 0..width {
                self.cursor.advance();
            }
            // `**` is right associative.
            let next_min = if op == Infix::Pow {
                precedence
            } else {
                precedence + 1
            };
            let right = self.parse_binary(next_min, None)?;
            left = self.combine(op, left, right, span)?;
        }
        Ok(left)
    }

    /// Operator at the cursor with its precedence and token width.
    fn peek_infix(&self) -> Result<Option<(Infix, u8, usize)>, ParseError> {
        use TokenKind::*;
        let binary = |op, precedence| Some((Infix::Binary(op), precedence, 1));
        let infix = match self.cursor.peek_kind() {
            PipePipe => binary(BinaryOp::Or, 1),
            AmpAmp => binary(BinaryOp::And, 2),
            Pipe => binary(BinaryOp::BitOr, 3),
            Caret => binary(BinaryOp::BitXor, 4),
            Amp => binary(BinaryOp::BitAnd, 5),
            EqEq | EqEqEq => binary(BinaryOp::Eq, 6),
            NotEq | NotEqEq => binary(BinaryOp::Ne, 6),
            Less => binary(BinaryOp::Lt, 7),
            LessEq => binary(BinaryOp::Le, 7),
            Greater => {
                let joined = |n: usize, kind| self.cursor.check_nth(n, kind) && self.cursor.adjacent(n);
                if joined(1, Greater) {
                    if joined(2, Equal) {
                        None
                    } else if joined(2, Greater) {
                        return Err(self.cursor.error_at_current("`>>>` is not supported"));
                    } else {
                        Some((Infix::Binary(BinaryOp::Shr), 8, 2))
                    }
                } else if joined(1, Equal) {
                    Some((Infix::Binary(BinaryOp::Ge), 7, 2))
                } else {
                    binary(BinaryOp::Gt, 7)
                }
            }
            ShiftLeft => binary(BinaryOp::Shl, 8),
            Plus => binary(BinaryOp::Add, 9),
            Minus => binary(BinaryOp::Sub, 9),
            Star => binary(BinaryOp::Mul, 10),
            Slash => binary(BinaryOp::Div, 10),
            Percent => binary(BinaryOp::Mod, 10),
            StarStar => Some((Infix::Pow, 11, 1)),
            Nullish => return Err(self.cursor.error_at_current("`??` is not supported")),
            _ => None,
        };
        Ok(infix)
    }

    fn combine(
        &self,
        op: Infix,
        left: Expression,
        right: Expression,
        span: Span,
    ) -> Result<Expression, ParseError> {
        let op = match op {
            Infix::Pow => return Ok(Expression::builtin_call("Math", "pow", vec![left, right])),
            Infix::Binary(op) => op,
        };
        let strings = self.type_of(&left).as_ref().is_some_and(Type::is_string)
            || self.type_of(&right).as_ref().is_some_and(Type::is_string);
        if !strings {
            return Ok(Expression::binary(op, left, right));
        }
        match op {
            BinaryOp::Add => Ok(concat(left, right)),
            BinaryOp::Eq | BinaryOp::Ne => Ok(Expression::binary(op, string_hash(left), string_hash(right))),
            _ => Err(self.error(
                span,
                &format!("operator `{}` is not supported on strings", op.symbol()),
            )),
        }
    }

    fn parse_unary(&mut self, expected: Option<&Type>) -> Result<Expression, ParseError> {
        let op = match self.cursor.peek_kind() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::PlusPlus => UnaryOp::PreIncrement,
            TokenKind::MinusMinus => UnaryOp::PreDecrement,
            TokenKind::Plus => {
                self.cursor.advance();
                return self.parse_unary(expected);
            }
            TokenKind::Delete => {
                return Err(self.cursor.error_at_current("`delete` must be used as a statement"));
            }
            _ => return self.parse_postfix(expected),
        };
        self.cursor.advance();
        let span = self.cursor.peek().span;
        let operand = self.parse_unary(None)?;
        if op.is_update() {
            self.check_assignable(&operand, span)?;
        }
        Ok(Expression::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self, expected: Option<&Type>) -> Result<Expression, ParseError> {
        let start = self.cursor.peek().span;
        let mut expr = self.parse_primary(expected)?;
        loop {
            match self.cursor.peek_kind() {
                TokenKind::Dot => {
                    self.cursor.advance();
                    let span = self.cursor.peek().span;
                    let name = self.cursor.consume_member_name()?;
                    expr = self.member_access(expr, &name, span)?;
                }
                TokenKind::LBracket => {
                    let span = self.cursor.advance().span;
                    let object_ty = self.type_of(&expr);
                    let key = match &object_ty {
                        Some(Type::Mapping(key, _)) => Some((**key).clone()),
                        _ => Some(Type::UINT256),
                    };
                    let index = self.parse_expression(key.as_ref())?;
                    self.cursor
                        .consume(TokenKind::RBracket, "expected `]` after index")?;
                    match &object_ty {
                        Some(Type::String) => {
                            return Err(self.error(span, "strings cannot be indexed; use bytes(s)[i]"));
                        }
                        Some(ty) if ty.index_result().is_none() => {
                            return Err(self.error(span, &format!("`{ty}` cannot be indexed")));
                        }
                        _ => {}
                    }
                    expr = Expression::index(expr, index);
                }
                TokenKind::LParen => {
                    expr = self.parse_call(expr, start)?;
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus if !self.newline_before_current() => {
                    self.check_assignable(&expr, start)?;
                    let op = if self.cursor.advance().kind == TokenKind::PlusPlus {
                        UnaryOp::PostIncrement
                    } else {
                        UnaryOp::PostDecrement
                    };
                    expr = Expression::Unary {
                        op,
                        operand: Box::new(expr),
                    };
                }
                // Non-null assertion has no runtime meaning.
                TokenKind::Bang => {
                    self.cursor.advance();
                }
                TokenKind::QuestionDot => {
                    return Err(self.cursor.error_at_current("optional chaining is not supported"));
                }
                TokenKind::Ident if self.cursor.check_word("as") => {
                    self.cursor.advance();
                    parse_type(&mut self.cursor)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    pub(super) fn newline_before_current(&self) -> bool {
        let gap = Span::new(self.cursor.previous().span.end, self.cursor.peek().span.start);
        gap.text(self.cursor.source()).contains('\n')
    }

    fn member_access(&mut self, object: Expression, name: &str, span: Span) -> Result<Expression, ParseError> {
        if let Expression::Identifier(root) = &object {
            match root.as_str() {
                "this" => return self.this_member(name, span),
                "super" => {
                    return if self.base_method_sig(name).is_some() {
                        Ok(Expression::property(object, name))
                    } else {
                        Err(self.error(span, &format!("base class has no method `{name}`")))
                    };
                }
                _ => {}
            }
            if self.env.lookup(root).is_none() {
                if builtins::is_namespace(root) {
                    return if builtins::find_member(root, name).is_some() {
                        Ok(Expression::property(object, name))
                    } else {
                        Err(self.error(span, &format!("unknown member `{root}.{name}`")))
                    };
                }
                if let Some(def) = self.symbols.enums.get(root) {
                    if !def.members.iter().any(|member| member == name) {
                        return Err(self.error(span, &format!("enum `{root}` has no member `{name}`")));
                    }
                    let reference = SharedRef::Enum(root.clone());
                    self.reference(reference);
                    return Ok(Expression::property(object, name));
                }
            }
        }

        if let Some(event) = object.this_member_name() {
            if self.event_fields(event).is_some() {
                return if name == "emit" {
                    Ok(Expression::property(object, name))
                } else {
                    Err(self.error(span, &format!("event `{event}` only supports `.emit(...)`")))
                };
            }
        }

        let Some(object_ty) = self.type_of(&object) else {
            return Ok(Expression::property(object, name));
        };
        match (&object_ty, name) {
            (Type::String, "length") => Ok(Expression::property(
                Expression::call(Expression::ident("bytes"), vec![object]),
                "length",
            )),
            (Type::Address, "transfer" | "send") => Ok(Expression::property(
                Expression::call(Expression::ident("payable"), vec![object]),
                name,
            )),
            (Type::Address, "call" | "delegatecall" | "staticcall") => {
                Ok(Expression::property(object, name))
            }
            (Type::Array(_), "push" | "pop") => Ok(Expression::property(object, name)),
            (Type::Contract(class), _) => {
                if self.symbols.find_method(class, name).is_some() {
                    return Ok(Expression::property(object, name));
                }
                match self.symbols.find_field(class, name) {
                    Some(field) if field.visibility != crate::ir::Visibility::Public => Err(
                        self.error(span, &format!("field `{name}` of `{class}` is not public")),
                    ),
                    Some(field) if matches!(field.ty, Type::Mapping(..) | Type::Array(_)) => {
                        Err(self.error(
                            span,
                            &format!("read `{name}` from `{class}` through a method"),
                        ))
                    }
                    // Public state is read through its generated getter.
                    Some(_) => Ok(Expression::call(Expression::property(object, name), Vec::new())),
                    None => Err(self.error(span, &format!("`{class}` has no member `{name}`"))),
                }
            }
            (Type::Interface(struct_name), _) => {
                let known = self
                    .symbols
                    .structs
                    .get(struct_name)
                    .is_some_and(|def| def.fields.iter().any(|(field, _)| field == name));
                if known {
                    Ok(Expression::property(object, name))
                } else {
                    Err(self.error(span, &format!("`{struct_name}` has no field `{name}`")))
                }
            }
            (ty, _) if builtins::value_member(ty, name).is_some() => Ok(Expression::property(object, name)),
            (ty, _) => Err(self.error(span, &format!("`{ty}` has no member `{name}`"))),
        }
    }

    fn this_member(&mut self, name: &str, span: Span) -> Result<Expression, ParseError> {
        let known = self.field_info(name).is_some()
            || self.method_sig(name).is_some()
            || self.event_fields(name).is_some()
            || self.error_fields(name).is_some();
        if known {
            Ok(Expression::this_member(name))
        } else {
            let class = self.current_class().unwrap_or("this");
            Err(self.error(span, &format!("`{class}` has no member `{name}`")))
        }
    }

    fn parse_call(&mut self, callee: Expression, start: Span) -> Result<Expression, ParseError> {
        let shape = self.call_shape(&callee, start)?;
        let open = self.cursor.peek().span;
        let args = match shape {
            CallShape::Emit(fields) => self.parse_emit_args(&fields)?,
            CallShape::Params { params, required } => {
                let args = self.parse_args(Some(&params))?;
                if args.len() < required || args.len() > params.len() {
                    let expected = if required == params.len() {
                        required.to_string()
                    } else {
                        format!("{required} to {}", params.len())
                    };
                    return Err(self.error(
                        open,
                        &format!("expected {expected} argument(s), found {}", args.len()),
                    ));
                }
                args
            }
            CallShape::Untyped => self.parse_args(None)?,
        };
        Ok(Expression::call(callee, args))
    }

    fn call_shape(&self, callee: &Expression, span: Span) -> Result<CallShape, ParseError> {
        let params = |params: Vec<Type>, required: usize| Ok(CallShape::Params { params, required });
        match callee {
            Expression::Property { object, property } => {
                if property == "emit" {
                    if let Some(fields) = object.this_member_name().and_then(|e| self.event_fields(e)) {
                        return Ok(CallShape::Emit(fields));
                    }
                }
                if let Some(member) = callee.this_member_name() {
                    if let Some(sig) = self.method_sig(member) {
                        return params(sig.params, sig.required);
                    }
                    if let Some(fields) = self.error_fields(member) {
                        let count = fields.len();
                        return params(fields.into_iter().map(|f| f.ty).collect(), count);
                    }
                    return Err(self.error(span, &format!("`{member}` is not a method")));
                }
                if matches!(object.as_ref(), Expression::Identifier(root) if root == "super") {
                    if let Some(sig) = self.base_method_sig(property) {
                        return params(sig.params, sig.required);
                    }
                }
                match (self.type_of(object), property.as_str()) {
                    (Some(Type::Contract(class)), _) => match self.symbols.find_method(&class, property) {
                        Some(sig) => params(sig.params.clone(), sig.required),
                        None => Ok(CallShape::Untyped),
                    },
                    (Some(Type::Array(element)), "push") => params(vec![*element], 0),
                    _ => Ok(CallShape::Untyped),
                }
            }
            Expression::Identifier(name) if self.env.lookup(name).is_some() => {
                Err(self.error(span, &format!("`{name}` is not a function")))
            }
            Expression::Identifier(name) => match self.symbols.functions.get(name) {
                Some(def) => {
                    let types: Vec<Type> = def.function.params.iter().map(|p| p.ty.clone()).collect();
                    let count = types.len();
                    params(types, count)
                }
                None => Ok(CallShape::Untyped),
            },
            _ => Ok(CallShape::Untyped),
        }
    }

    pub(super) fn parse_args(&mut self, params: Option<&[Type]>) -> Result<Vec<Expression>, ParseError> {
        self.cursor.consume(TokenKind::LParen, "expected `(`")?;
        let mut args = Vec::new();
        while !self.cursor.check(TokenKind::RParen) {
            let expected = params.and_then(|params| params.get(args.len()));
            args.push(self.parse_expression(expected)?);
            if !self.cursor.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.cursor
            .consume(TokenKind::RParen, "expected `)` after arguments")?;
        Ok(args)
    }

    /// Positional arguments, or a single object literal naming each field.
    fn parse_emit_args(&mut self, fields: &[Field]) -> Result<Vec<Expression>, ParseError> {
        let open = self.cursor.peek().span;
        if self.cursor.check_nth(1, TokenKind::LBrace) && !fields.is_empty() {
            self.cursor.advance();
            let shape: Vec<(String, Type)> = fields.iter().map(|f| (f.name.clone(), f.ty.clone())).collect();
            let args = self.parse_named_values(&shape, "event")?;
            self.cursor
                .consume(TokenKind::RParen, "expected `)` after event fields")?;
            return Ok(args);
        }
        let types: Vec<Type> = fields.iter().map(|f| f.ty.clone()).collect();
        let args = self.parse_args(Some(&types))?;
        if args.len() != fields.len() {
            return Err(self.error(
                open,
                &format!("event expects {} value(s), found {}", fields.len(), args.len()),
            ));
        }
        Ok(args)
    }

    /// `{ a: x, b }` ordered by `fields`; every field must be given once.
    fn parse_named_values(&mut self, fields: &[(String, Type)], what: &str) -> Result<Vec<Expression>, ParseError> {
        let open = self.cursor.consume(TokenKind::LBrace, "expected `{`")?.span;
        let mut given: Vec<(String, Expression)> = Vec::new();
        while !self.cursor.check(TokenKind::RBrace) {
            let span = self.cursor.peek().span;
            let key = self.cursor.consume_member_name()?;
            let Some((_, ty)) = fields.iter().find(|(name, _)| *name == key) else {
                return Err(self.error(span, &format!("unknown {what} field `{key}`")));
            };
            if given.iter().any(|(name, _)| *name == key) {
                return Err(self.error(span, &format!("field `{key}` is given twice")));
            }
            let value = if self.cursor.match_token(TokenKind::Colon) {
                self.parse_expression(Some(ty))?
            } else if self.env.lookup(&key).is_some() {
                Expression::ident(key.as_str())
            } else {
                return Err(self.error(span, &format!("unknown identifier `{key}`")));
            };
            given.push((key, value));
            if !self.cursor.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.cursor
            .consume(TokenKind::RBrace, "expected `}` after fields")?;

        let mut ordered = Vec::with_capacity(fields.len());
        for (name, _) in fields {
            let position = given.iter().position(|(key, _)| key == name);
            match position {
                Some(index) => ordered.push(given.swap_remove(index).1),
                None => return Err(self.error(open, &format!("missing {what} field `{name}`"))),
            }
        }
        Ok(ordered)
    }

    fn parse_primary(&mut self, expected: Option<&Type>) -> Result<Expression, ParseError> {
        let token = self.cursor.peek();
        match token.kind {
            TokenKind::Number => {
                self.cursor.advance();
                let text = self.cursor.text(token);
                Ok(Expression::number(text.strip_suffix('n').unwrap_or(text)))
            }
            TokenKind::String => {
                self.cursor.advance();
                let value = unescape(self.cursor.text(token)).map_err(|message| self.error(token.span, &message))?;
                Ok(Expression::Literal(Literal::String(value)))
            }
            TokenKind::True | TokenKind::False => {
                self.cursor.advance();
                Ok(Expression::Literal(Literal::Bool(token.kind == TokenKind::True)))
            }
            TokenKind::This => {
                if self.class.is_none() {
                    return Err(self.error(token.span, "`this` is only available inside a class"));
                }
                self.cursor.advance();
                Ok(Expression::ident("this"))
            }
            TokenKind::Super => {
                self.cursor.advance();
                if self.base_class().is_none() {
                    return Err(self.error(token.span, "`super` used in a class without a base"));
                }
                if !self.cursor.check(TokenKind::Dot) {
                    return Err(self.error(token.span, "`super(...)` is only allowed as a constructor statement"));
                }
                Ok(Expression::ident("super"))
            }
            TokenKind::LParen => {
                self.cursor.advance();
                let inner = self.parse_expression(expected)?;
                self.cursor.consume(TokenKind::RParen, "expected `)`")?;
                if self.cursor.check(TokenKind::FatArrow) {
                    return Err(self.error(token.span, "arrow functions are not supported"));
                }
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_tuple(expected),
            TokenKind::LBrace => self.parse_struct_literal(expected),
            TokenKind::New => self.parse_new(expected),
            TokenKind::Ident => self.parse_identifier(),
            TokenKind::Function => Err(self.error(token.span, "function expressions are not supported")),
            _ => Err(self.cursor.error_at_current("expected expression")),
        }
    }

    fn parse_identifier(&mut self) -> Result<Expression, ParseError> {
        let token = self.cursor.advance();
        let name = self.cursor.text(token).to_string();
        if self.cursor.check(TokenKind::FatArrow) {
            return Err(self.error(token.span, "arrow functions are not supported"));
        }
        if self.env.lookup(&name).is_some() {
            return Ok(Expression::Identifier(name));
        }
        if self.symbols.constants.contains_key(&name) {
            self.reference(SharedRef::Constant(name.clone()));
            return Ok(Expression::Identifier(name));
        }
        if self.symbols.functions.contains_key(&name) {
            if !self.cursor.check(TokenKind::LParen) {
                return Err(self.error(token.span, &format!("function `{name}` must be called")));
            }
            self.reference(SharedRef::Function(name.clone()));
            return Ok(Expression::Identifier(name));
        }
        if self.symbols.enums.contains_key(&name) {
            if !self.cursor.check(TokenKind::Dot) {
                return Err(self.error(token.span, &format!("enum `{name}` must be followed by a member")));
            }
            return Ok(Expression::Identifier(name));
        }
        if builtins::is_namespace(&name) || builtins::find_function(&name).is_some() {
            return Ok(Expression::Identifier(name));
        }
        if let Some(ty) = types::primitive(&name) {
            if ty.is_value_type() && self.cursor.check(TokenKind::LParen) {
                return Ok(Expression::Identifier(ty.solidity_name()));
            }
        }
        let message = match name.as_str() {
            "null" | "undefined" => format!("`{name}` has no contract equivalent"),
            _ => format!("unknown identifier `{name}`"),
        };
        Err(self.error(token.span, &message))
    }

    fn parse_tuple(&mut self, expected: Option<&Type>) -> Result<Expression, ParseError> {
        let open = self.cursor.advance().span;
        let Some(Type::Tuple(items)) = expected else {
            return Err(self.error(open, "array literals are only supported as tuple values"));
        };
        let mut values = Vec::with_capacity(items.len());
        while !self.cursor.check(TokenKind::RBracket) {
            let item_ty = items.get(values.len());
            values.push(self.parse_expression(item_ty)?);
            if !self.cursor.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.cursor.consume(TokenKind::RBracket, "expected `]`")?;
        if values.len() != items.len() {
            return Err(self.error(
                open,
                &format!("expected a tuple of {} value(s), found {}", items.len(), values.len()),
            ));
        }
        Ok(Expression::Tuple(values))
    }

    fn parse_struct_literal(&mut self, expected: Option<&Type>) -> Result<Expression, ParseError> {
        let open = self.cursor.peek().span;
        let Some(Type::Interface(name)) = expected else {
            return Err(self.error(open, "cannot infer the struct type of this object literal"));
        };
        let Some(def) = self.symbols.structs.get(name) else {
            return Err(self.error(open, &format!("unknown struct `{name}`")));
        };
        let fields = def.fields.clone();
        self.reference(SharedRef::Struct(name.clone()));
        let values = self.parse_named_values(&fields, "struct")?;
        Ok(Expression::StructLiteral {
            name: name.clone(),
            fields: fields.into_iter().map(|(field, _)| field).zip(values).collect(),
        })
    }

    fn parse_new(&mut self, expected: Option<&Type>) -> Result<Expression, ParseError> {
        self.cursor.consume(TokenKind::New, "expected `new`")?;
        let span = self.cursor.peek().span;
        let name = self.cursor.consume_identifier("expected class name after `new`")?;
        if name == "Array" {
            let element = if self.cursor.match_token(TokenKind::Less) {
                let annotation = parse_type(&mut self.cursor)?;
                self.cursor.consume(TokenKind::Greater, "expected `>`")?;
                Some(self.resolve(&annotation)?)
            } else {
                match expected {
                    Some(Type::Array(element)) => Some((**element).clone()),
                    _ => None,
                }
            };
            let Some(element) = element else {
                return Err(self.error(span, "cannot infer the element type of `new Array`"));
            };
            let args = self.parse_args(Some(&[Type::UINT256]))?;
            if args.len() != 1 {
                return Err(self.error(span, "`new Array` takes exactly one length argument"));
            }
            return Ok(Expression::New {
                ty: Type::array(element),
                args,
            });
        }
        if name == "Error" {
            return Err(self.error(span, "`new Error(...)` can only be thrown"));
        }
        let Some(class) = self.symbols.classes.get(&name) else {
            return Err(self.error(span, &format!("unknown class `{name}`")));
        };
        if class.is_abstract {
            return Err(self.error(span, &format!("cannot instantiate abstract class `{name}`")));
        }
        let (params, required) = match &class.constructor {
            Some(sig) => (sig.params.clone(), sig.required),
            None => (Vec::new(), 0),
        };
        self.reference(SharedRef::Class(name.clone()));
        let args = self.parse_args(Some(&params))?;
        if args.len() < required || args.len() > params.len() {
            return Err(self.error(span, &format!("wrong number of constructor arguments for `{name}`")));
        }
        Ok(Expression::New {
            ty: Type::Contract(name),
            args,
        })
    }
}

fn assign(op: Option<BinaryOp>, target: Expression, value: Expression) -> Expression {
    Expression::Assign {
        op,
        target: Box::new(target),
        value: Box::new(value),
    }
}

/// `string.concat(a, b)`, flattening a left-nested concatenation.
fn concat(left: Expression, right: Expression) -> Expression {
    if let Expression::Call { callee, mut args } = left {
        let is_concat = matches!(
            callee.as_ref(),
            Expression::Property { object, property }
                if property == "concat"
                    && matches!(object.as_ref(), Expression::Identifier(ns) if ns == "string")
        );
        if is_concat {
            args.push(right);
            return Expression::Call { callee, args };
        }
        return Expression::builtin_call("string", "concat", vec![Expression::Call { callee, args }, right]);
    }
    Expression::builtin_call("string", "concat", vec![left, right])
}

/// `keccak256(abi.encodePacked(value))`
fn string_hash(value: Expression) -> Expression {
    Expression::call(
        Expression::ident("keccak256"),
        vec![Expression::builtin_call("abi", "encodePacked", vec![value])],
    )
}

/// Decode a quoted string literal, quotes included.
pub(super) fn unescape(raw: &str) -> Result<String, String> {
    let inner = raw
        .get(1..raw.len().saturating_sub(1))
        .ok_or_else(|| "malformed string literal".to_string())?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let escaped = chars.next().ok_or_else(|| "dangling escape".to_string())?;
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' | '\'' | '"' => out.push(escaped),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(hex_char(&hex)?);
            }
            'u' => {
                let rest = chars.as_str();
                let hex = if let Some(braced) = rest.strip_prefix('{') {
                    let end = braced.find('}').ok_or_else(|| "unterminated unicode escape".to_string())?;
                    let hex = braced[..end].to_string();
                    chars = braced[end + 1..].chars();
                    hex
                } else {
                    let hex: String = chars.by_ref().take(4).collect();
                    hex
                };
                out.push(hex_char(&hex)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn hex_char(hex: &str) -> Result<char, String> {
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| format!("invalid escape `{hex}`"))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{parse_one, parse_with};
    use super::*;
    use crate::ir::{Statement, Variable};

    fn return_value(source: &str) -> Expression {
        let contract = parse_one(source);
        match contract.functions[0].body.last() {
            Some(Statement::Return(Some(value))) => value.clone(),
            other => panic!("expected return, got {other:?}"),
        }
    }

    fn field(contract: &crate::ir::Contract, name: &str) -> Variable {
        contract.variable(name).cloned().expect("field")
    }

    #[test]
    fn respects_precedence_and_associativity() {
        let value = return_value("class A { f(a: number, b: number, c: number): number { return a - b - c * 2; } }");
        let Expression::Binary { op, left, right } = value else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Sub);
        assert!(matches!(*left, Expression::Binary { op: BinaryOp::Sub, .. }));
        assert!(matches!(*right, Expression::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn lowers_exponent_to_math_pow() {
        let value = return_value("class A { f(a: number): number { return a ** 2 ** 3; } }");
        let (namespace, member, args) = value.as_builtin_call().expect("call");
        assert_eq!((namespace, member), ("Math", "pow"));
        assert!(args[1].as_builtin_call().is_some(), "right associative");
    }

    #[test]
    fn joins_split_shift_and_comparison_tokens() {
        let value = return_value("class A { f(a: number): boolean { return a >> 1 >= a; } }");
        let Expression::Binary { op, left, .. } = value else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Ge);
        assert!(matches!(*left, Expression::Binary { op: BinaryOp::Shr, .. }));
    }

    #[test]
    fn lowers_string_operators() {
        let value = return_value(
            "class A { f(a: string, b: string): boolean { return a + b === \"xy\"; } }",
        );
        let Expression::Binary { op, left, .. } = value else {
            panic!("expected comparison");
        };
        assert_eq!(op, BinaryOp::Eq);
        let Expression::Call { callee, args } = *left else {
            panic!("expected keccak256");
        };
        assert_eq!(*callee, Expression::ident("keccak256"));
        let (_, _, packed) = args[0].as_builtin_call().expect("abi.encodePacked");
        assert_eq!(packed[0].as_builtin_call().map(|(ns, m, _)| (ns, m)), Some(("string", "concat")));
    }

    #[test]
    fn lowers_string_length_through_bytes() {
        let value = return_value("class A { name: string = \"x\"; f(): number { return this.name.length; } }");
        let Expression::Property { object, property } = value else {
            panic!("expected property");
        };
        assert_eq!(property, "length");
        assert!(matches!(*object, Expression::Call { .. }));
    }

    #[test]
    fn builds_struct_literals_in_declaration_order() {
        let contract = parse_one(
            "interface Point { x: number; y: number }\n\
             class A { origin: Point = { y: 2, x: 1 }; }",
        );
        let Some(Expression::StructLiteral { name, fields }) = field(&contract, "origin").initializer else {
            panic!("expected struct literal");
        };
        assert_eq!(name, "Point");
        let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn wraps_address_transfer_in_payable() {
        let contract = parse_one("class A { pay(to: address, amount: number): void { to.transfer(amount); } }");
        let Statement::Expr(Expression::Call { callee, .. }) = &contract.functions[0].body[0] else {
            panic!("expected call");
        };
        let Expression::Property { object, property } = callee.as_ref() else {
            panic!("expected member call");
        };
        assert_eq!(property, "transfer");
        assert!(matches!(object.as_ref(), Expression::Call { callee, .. } if **callee == Expression::ident("payable")));
    }

    #[test]
    fn rejects_rewritten_compound_assignment_to_effectful_targets() {
        let err = parse_with(
            "class A { a: number[] = []; n: number = 0; next(): number { this.n += 1; return this.n; } f(): void { this.a[this.next()] **= 2; } }",
            &[],
        )
        .unwrap_err();
        assert!(err.message.contains("`**=` target"), "{}", err.message);

        let err = parse_with(
            "class A { names: string[] = []; i: number = 0; f(): void { this.names[this.i++] += \"x\"; } }",
            &[],
        )
        .unwrap_err();
        assert!(err.message.contains("`+=` target"), "{}", err.message);

        let contract = parse_one("class A { a: number[] = []; f(i: number): void { this.a[i] **= 2; this.a[i] += 1; } }");
        assert_eq!(contract.functions[0].body.len(), 2);
    }

    #[test]
    fn rejects_unknown_identifiers() {
        let err = parse_with("class A { f(): number { return missing; } }", &[]).unwrap_err();
        assert!(err.message.contains("unknown identifier `missing`"), "{}", err.message);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn rejects_object_literals_without_a_struct_type() {
        let err = parse_with("class A { f(): void { let x = { a: 1 }; } }", &[]).unwrap_err();
        assert!(err.message.contains("struct type"), "{}", err.message);
    }

    #[test]
    fn decodes_escapes() {
        assert_eq!(unescape(r#""a\nb\x41\u{1F600}""#).expect("unescape"), "a\nbA\u{1F600}");
        assert_eq!(unescape("'it\\'s'").expect("unescape"), "it's");
    }
}
