//! Statement lowering.
//!
//! A statement may lower to several IR statements (`let a = 1, b = 2;`,
//! or a `for..of` whose iterable is hoisted into a local), so the
//! statement parser appends to an output list instead of returning one.

use crate::error::ParseError;
use crate::ir::{
    BinaryOp, Expression, Revert, Statement, SwitchCase, TryCatch, UnaryOp, VarDecl,
};
use crate::lexer::TokenKind;
use crate::span::Span;
use crate::types::Type;

use super::annotation::parse_type;
use super::{BreakTarget, Parser, ends_with_terminator};

type GuardedCall = (Expression, Option<(String, Type)>, Vec<Statement>);

impl Parser<'_> {
    /// `{ ... }` in a fresh scope.
    pub(super) fn parse_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.cursor
            .consume(TokenKind::LBrace, "expected `{`")?;
        self.env.push_scope();
        let body = self.parse_statements();
        self.env.pop_scope();
        body
    }

    /// Statements up to and including the closing `}`.
    fn parse_statements(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut body = Vec::new();
        while !self.cursor.check(TokenKind::RBrace) {
            if self.cursor.is_at_end() {
                return Err(self.cursor.error_at_current("unterminated block"));
            }
            self.parse_statement(&mut body)?;
        }
        self.cursor.advance();
        Ok(body)
    }

    /// Body of `if`, loops and the like: a block or a single statement.
    fn parse_body(&mut self) -> Result<Vec<Statement>, ParseError> {
        if self.cursor.check(TokenKind::LBrace) {
            return self.parse_block();
        }
        self.env.push_scope();
        let mut body = Vec::new();
        let result = self.parse_statement(&mut body);
        self.env.pop_scope();
        result.map(|()| body)
    }

    fn parse_loop_body(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.enter_breakable(BreakTarget::Loop);
        let body = self.parse_body();
        self.leave_breakable();
        body
    }

    fn enter_breakable(&mut self, target: BreakTarget) {
        if let Some(function) = self.function_mut() {
            function.breakable.push(target);
        }
    }

    fn leave_breakable(&mut self) {
        if let Some(function) = self.function_mut() {
            function.breakable.pop();
        }
    }

    pub(super) fn parse_statement(&mut self, out: &mut Vec<Statement>) -> Result<(), ParseError> {
        let token = self.cursor.peek();
        match token.kind {
            TokenKind::Semi => {
                self.cursor.advance();
            }
            // A bare block shares the enclosing scope.
            TokenKind::LBrace => {
                self.cursor.advance();
                while !self.cursor.check(TokenKind::RBrace) {
                    if self.cursor.is_at_end() {
                        return Err(self.cursor.error_at_current("unterminated block"));
                    }
                    self.parse_statement(out)?;
                }
                self.cursor.advance();
            }
            TokenKind::Let | TokenKind::Const | TokenKind::Var => {
                self.parse_var_decl(out)?;
                self.consume_semi()?;
            }
            TokenKind::Return => out.push(self.parse_return()?),
            TokenKind::If => out.push(self.parse_if()?),
            TokenKind::For => self.parse_for(out)?,
            TokenKind::While => {
                self.cursor.advance();
                let condition = self.parse_condition()?;
                let body = self.parse_loop_body()?;
                out.push(Statement::While { condition, body });
            }
            TokenKind::Do => {
                self.cursor.advance();
                let body = self.parse_loop_body()?;
                self.cursor
                    .consume(TokenKind::While, "expected `while` after `do` body")?;
                let condition = self.parse_condition()?;
                self.consume_semi()?;
                out.push(Statement::DoWhile { body, condition });
            }
            TokenKind::Switch => out.push(self.parse_switch()?),
            TokenKind::Try => out.push(self.parse_try()?),
            TokenKind::Throw => {
                out.push(self.parse_throw()?);
                self.consume_semi()?;
            }
            TokenKind::Break => {
                self.cursor.advance();
                let inside = self
                    .function
                    .as_ref()
                    .is_some_and(|function| !function.breakable.is_empty());
                if !inside {
                    return Err(self.error(token.span, "`break` outside a loop or switch"));
                }
                self.consume_semi()?;
                out.push(Statement::Break);
            }
            TokenKind::Continue => {
                self.cursor.advance();
                let inside = self
                    .function
                    .as_ref()
                    .is_some_and(|function| function.breakable.contains(&BreakTarget::Loop));
                if !inside {
                    return Err(self.error(token.span, "`continue` outside a loop"));
                }
                self.consume_semi()?;
                out.push(Statement::Continue);
            }
            TokenKind::Delete => {
                self.cursor.advance();
                let span = self.cursor.peek().span;
                let target = self.parse_expression(None)?;
                self.check_assignable(&target, span)?;
                self.consume_semi()?;
                out.push(Statement::Delete(target));
            }
            TokenKind::Super if self.cursor.check_nth(1, TokenKind::LParen) => {
                self.parse_super_call()?;
                self.consume_semi()?;
            }
            TokenKind::Function | TokenKind::Class => {
                return Err(self.error(token.span, "nested declarations are not supported"));
            }
            _ => {
                let statement = self.parse_expression_statement()?;
                self.consume_semi()?;
                out.push(statement);
            }
        }
        Ok(())
    }

    /// `let`/`const` with one or more declarators; the `;` is left for
    /// the caller.
    fn parse_var_decl(&mut self, out: &mut Vec<Statement>) -> Result<(), ParseError> {
        let is_const = self.cursor.advance().kind == TokenKind::Const;
        loop {
            let span = self.cursor.peek().span;
            if matches!(self.cursor.peek_kind(), TokenKind::LBrace | TokenKind::LBracket) {
                return Err(self.error(span, "destructuring declarations are not supported"));
            }
            let name = self
                .cursor
                .consume_identifier("expected variable name")?;
            let annotated = if self.cursor.match_token(TokenKind::Colon) {
                let annotation = parse_type(&mut self.cursor)?;
                Some(self.resolve(&annotation)?)
            } else {
                None
            };
            let initializer = if self.cursor.match_token(TokenKind::Equal) {
                Some(self.parse_expression(annotated.as_ref())?)
            } else {
                None
            };
            if is_const && initializer.is_none() {
                return Err(self.error(span, &format!("`const {name}` needs an initializer")));
            }

            let inferred = initializer.as_ref().and_then(|value| self.type_of(value));
            let Some(ty) = annotated.or(inferred) else {
                return Err(self.error(
                    span,
                    &format!("cannot infer the type of `{name}`; add a type annotation"),
                ));
            };
            if ty.is_void() {
                return Err(self.error(span, &format!("`{name}` is assigned a value of type void")));
            }
            if matches!(ty, Type::Mapping(..)) {
                return Err(self.error(span, "mappings can only be class fields"));
            }
            if matches!(ty, Type::Tuple(_)) {
                return Err(self.error(span, "tuple values can only be returned, not stored in a local"));
            }
            if !self.env.declare(&name, ty.clone()) {
                return Err(self.error(span, &format!("`{name}` is already declared in this scope")));
            }
            out.push(Statement::VarDecl(VarDecl {
                name,
                ty,
                initializer,
                from_parameter: false,
            }));
            if !self.cursor.match_token(TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        let span = self.cursor.advance().span;
        let returns = self
            .function
            .as_ref()
            .map(|function| function.returns.clone())
            .unwrap_or(Type::Void);
        let bare = matches!(self.cursor.peek_kind(), TokenKind::Semi | TokenKind::RBrace)
            || self.newline_before_current();
        if bare {
            self.consume_semi()?;
            if !returns.is_void() {
                return Err(self.error(span, &format!("missing return value of type `{returns}`")));
            }
            return Ok(Statement::Return(None));
        }
        if returns.is_void() {
            return Err(self.error(span, "a void function cannot return a value"));
        }
        let value = self.parse_expression(Some(&returns))?;
        self.consume_semi()?;
        Ok(Statement::Return(Some(value)))
    }

    fn parse_condition(&mut self) -> Result<Expression, ParseError> {
        self.cursor.consume(TokenKind::LParen, "expected `(`")?;
        let condition = self.parse_expression(Some(&Type::Boolean))?;
        self.cursor
            .consume(TokenKind::RParen, "expected `)` after condition")?;
        Ok(condition)
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        self.cursor.advance();
        let condition = self.parse_condition()?;
        let then_body = self.parse_body()?;
        let else_body = if self.cursor.match_token(TokenKind::Else) {
            Some(self.parse_body()?)
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_for(&mut self, out: &mut Vec<Statement>) -> Result<(), ParseError> {
        let span = self.cursor.advance().span;
        self.cursor
            .consume(TokenKind::LParen, "expected `(` after `for`")?;
        let declares = matches!(
            self.cursor.peek_kind(),
            TokenKind::Let | TokenKind::Const | TokenKind::Var
        );
        if declares && self.cursor.check_word_nth(2, "of") {
            return self.parse_for_of(out);
        }
        if declares && self.cursor.check_word_nth(2, "in") {
            return Err(self.error(span, "`for..in` is not supported; use `for..of`"));
        }

        self.env.push_scope();
        let result = self.parse_for_rest(span);
        self.env.pop_scope();
        out.push(result?);
        Ok(())
    }

    fn parse_for_rest(&mut self, span: Span) -> Result<Statement, ParseError> {
        let init = if self.cursor.check(TokenKind::Semi) {
            None
        } else if matches!(
            self.cursor.peek_kind(),
            TokenKind::Let | TokenKind::Const | TokenKind::Var
        ) {
            let mut decls = Vec::new();
            self.parse_var_decl(&mut decls)?;
            if decls.len() != 1 {
                return Err(self.error(span, "a `for` initializer may declare only one variable"));
            }
            decls.pop().map(Box::new)
        } else {
            Some(Box::new(Statement::Expr(self.parse_expression(None)?)))
        };
        self.cursor
            .consume(TokenKind::Semi, "expected `;` after `for` initializer")?;

        let condition = if self.cursor.check(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expression(Some(&Type::Boolean))?)
        };
        self.cursor
            .consume(TokenKind::Semi, "expected `;` after `for` condition")?;

        let update = if self.cursor.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression(None)?)
        };
        self.cursor
            .consume(TokenKind::RParen, "expected `)` after `for` clauses")?;

        let body = self.parse_loop_body()?;
        Ok(Statement::For {
            init,
            condition,
            update,
            body,
        })
    }

    /// `for (const x of items)` becomes an indexed loop whose body starts
    /// by binding `x` to the current element.
    fn parse_for_of(&mut self, out: &mut Vec<Statement>) -> Result<(), ParseError> {
        self.cursor.advance();
        let span = self.cursor.peek().span;
        let name = self
            .cursor
            .consume_identifier("expected loop variable name")?;
        self.cursor.advance();
        let iterable = self.parse_expression(None)?;
        self.cursor
            .consume(TokenKind::RParen, "expected `)` after `for..of` header")?;

        let element = match self.type_of(&iterable) {
            Some(Type::Array(element)) => *element,
            Some(other) => {
                return Err(self.error(span, &format!("cannot iterate over a value of type `{other}`")));
            }
            None => return Err(self.error(span, "cannot infer the type of the iterated value")),
        };

        let items = if is_simple_path(&iterable) {
            iterable
        } else {
            let hoisted = self.temp_name("items");
            self.env.declare(&hoisted, Type::array(element.clone()));
            out.push(Statement::VarDecl(VarDecl {
                name: hoisted.clone(),
                ty: Type::array(element.clone()),
                initializer: Some(iterable),
                from_parameter: false,
            }));
            Expression::Identifier(hoisted)
        };

        self.env.push_scope();
        let index = self.temp_name("i");
        self.env.declare(&index, Type::UINT256);
        self.env.declare(&name, element.clone());
        let mut body = vec![Statement::VarDecl(VarDecl {
            name,
            ty: element,
            initializer: Some(Expression::index(items.clone(), Expression::ident(index.as_str()))),
            from_parameter: false,
        })];
        let rest = self.parse_loop_body();
        self.env.pop_scope();
        body.extend(rest?);

        out.push(Statement::For {
            init: Some(Box::new(Statement::VarDecl(VarDecl {
                name: index.clone(),
                ty: Type::UINT256,
                initializer: Some(Expression::number("0")),
                from_parameter: false,
            }))),
            condition: Some(Expression::binary(
                BinaryOp::Lt,
                Expression::ident(index.as_str()),
                Expression::property(items, "length"),
            )),
            update: Some(Expression::Unary {
                op: UnaryOp::PreIncrement,
                operand: Box::new(Expression::ident(index)),
            }),
            body,
        });
        Ok(())
    }

    fn parse_switch(&mut self) -> Result<Statement, ParseError> {
        let span = self.cursor.advance().span;
        self.cursor
            .consume(TokenKind::LParen, "expected `(` after `switch`")?;
        let discriminant = self.parse_expression(None)?;
        self.cursor.consume(TokenKind::RParen, "expected `)`")?;
        let Some(ty) = self.type_of(&discriminant) else {
            return Err(self.error(span, "cannot infer the type of the switch value"));
        };
        self.cursor
            .consume(TokenKind::LBrace, "expected `{` to open switch body")?;

        self.enter_breakable(BreakTarget::Switch);
        let parsed = self.parse_switch_cases(&ty);
        self.leave_breakable();
        let mut cases = parsed?;

        let count = cases.len();
        for (position, (case, case_span)) in cases.iter_mut().enumerate() {
            if matches!(case.body.last(), Some(Statement::Break)) {
                case.body.pop();
            } else if position + 1 < count && !ends_with_terminator(&case.body) {
                return Err(self.error(
                    *case_span,
                    "falling through to the next case is not supported; end the case with `break`",
                ));
            }
            if has_nested_break(&case.body) {
                return Err(self.error(
                    *case_span,
                    "`break` is only supported as the last statement of a case",
                ));
            }
        }

        Ok(Statement::Switch {
            discriminant,
            ty,
            cases: cases.into_iter().map(|(case, _)| case).collect(),
        })
    }

    /// Cases through the closing `}`. Labels with an empty body share the
    /// body of the next label.
    fn parse_switch_cases(&mut self, ty: &Type) -> Result<Vec<(SwitchCase, Span)>, ParseError> {
        let mut cases = Vec::new();
        let mut tests = Vec::new();
        let mut is_default = false;
        let mut first_label: Option<Span> = None;
        while !self.cursor.check(TokenKind::RBrace) {
            let label = self.cursor.peek().span;
            first_label.get_or_insert(label);
            if self.cursor.match_token(TokenKind::Case) {
                tests.push(self.parse_expression(Some(ty))?);
            } else if self.cursor.match_token(TokenKind::Default) {
                if is_default || cases.iter().any(|(case, _): &(SwitchCase, Span)| case.is_default) {
                    return Err(self.error(label, "duplicate `default` label"));
                }
                is_default = true;
            } else {
                return Err(self.cursor.error_at_current("expected `case` or `default`"));
            }
            self.cursor
                .consume(TokenKind::Colon, "expected `:` after case label")?;

            self.env.push_scope();
            let mut body = Vec::new();
            let mut result = Ok(());
            while !matches!(
                self.cursor.peek_kind(),
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
            ) {
                result = self.parse_statement(&mut body);
                if result.is_err() {
                    break;
                }
            }
            self.env.pop_scope();
            result?;

            if body.is_empty() && !self.cursor.check(TokenKind::RBrace) {
                continue;
            }
            let case = SwitchCase {
                tests: std::mem::take(&mut tests),
                is_default: std::mem::take(&mut is_default),
                body,
            };
            cases.push((case, first_label.take().unwrap_or(label)));
        }
        self.cursor
            .consume(TokenKind::RBrace, "expected `}` to close switch")?;
        Ok(cases)
    }

    fn parse_try(&mut self) -> Result<Statement, ParseError> {
        let span = self.cursor.advance().span;
        self.cursor
            .consume(TokenKind::LBrace, "expected `{` after `try`")?;
        self.env.push_scope();
        let guarded = self.parse_try_body(span);
        self.env.pop_scope();
        let (call, returns, body) = guarded?;

        if !self.cursor.match_token(TokenKind::Catch) {
            return Err(self.cursor.error_at_current("expected `catch` after `try` block"));
        }
        let error_binding = if self.cursor.match_token(TokenKind::LParen) {
            let name = self
                .cursor
                .consume_identifier("expected error binding name")?;
            if self.cursor.match_token(TokenKind::Colon) {
                parse_type(&mut self.cursor)?;
            }
            self.cursor.consume(TokenKind::RParen, "expected `)`")?;
            Some(name)
        } else {
            None
        };

        self.env.push_scope();
        if let Some(binding) = &error_binding {
            self.env.declare(binding, Type::Bytes);
        }
        let catch_body = self.parse_block();
        self.env.pop_scope();
        let catch_body = catch_body?;

        if self.cursor.check(TokenKind::Finally) {
            return Err(self.cursor.error_at_current("`finally` is not supported"));
        }
        Ok(Statement::Try(Box::new(TryCatch {
            call,
            returns,
            body,
            error_binding,
            catch_body,
        })))
    }

    /// The guarded call, its optional result binding, then the rest of
    /// the `try` block.
    fn parse_try_body(&mut self, span: Span) -> Result<GuardedCall, ParseError> {
        let (call, returns) = if matches!(self.cursor.peek_kind(), TokenKind::Let | TokenKind::Const) {
            self.cursor.advance();
            let name_span = self.cursor.peek().span;
            let name = self
                .cursor
                .consume_identifier("expected variable name")?;
            let annotated = if self.cursor.match_token(TokenKind::Colon) {
                let annotation = parse_type(&mut self.cursor)?;
                Some(self.resolve(&annotation)?)
            } else {
                None
            };
            self.cursor
                .consume(TokenKind::Equal, "expected `=` after variable name")?;
            let call = self.parse_expression(annotated.as_ref())?;
            let ty = match annotated.or_else(|| self.type_of(&call)) {
                Some(ty) if !ty.is_void() => ty,
                _ => return Err(self.error(name_span, &format!("the call bound to `{name}` returns nothing"))),
            };
            self.env.declare(&name, ty.clone());
            (call, Some((name, ty)))
        } else {
            (self.parse_expression(None)?, None)
        };
        self.consume_semi()?;
        self.check_external_call(&call, span)?;
        let body = self.parse_statements()?;
        Ok((call, returns, body))
    }

    fn check_external_call(&self, call: &Expression, span: Span) -> Result<(), ParseError> {
        let external = match call {
            Expression::New {
                ty: Type::Contract(_),
                ..
            } => true,
            Expression::Call { callee, .. } => match callee.as_ref() {
                Expression::Property { object, .. } => {
                    let local_root = matches!(
                        object.as_ref(),
                        Expression::Identifier(root) if root == "this" || root == "super"
                    );
                    !local_root && matches!(self.type_of(object), Some(Type::Contract(_)))
                }
                _ => false,
            },
            _ => false,
        };
        if external {
            Ok(())
        } else {
            Err(self.error(
                span,
                "a `try` block must start with an external call or a contract creation",
            ))
        }
    }

    fn parse_throw(&mut self) -> Result<Statement, ParseError> {
        let span = self.cursor.advance().span;
        if self.cursor.check(TokenKind::New) && self.cursor.check_word_nth(1, "Error") {
            self.cursor.advance();
            self.cursor.advance();
            let args = self.parse_args(Some(&[Type::String]))?;
            if args.len() > 1 {
                return Err(self.error(span, "`Error` takes at most one message"));
            }
            return Ok(Statement::Revert(Revert::Message(args.into_iter().next())));
        }
        let name_span;
        let name = if self.cursor.match_token(TokenKind::New) {
            name_span = self.cursor.peek().span;
            self.cursor.consume_identifier("expected error name")?
        } else if self.cursor.check(TokenKind::This) && self.cursor.check_nth(1, TokenKind::Dot) {
            self.cursor.advance();
            self.cursor.advance();
            name_span = self.cursor.peek().span;
            self.cursor.consume_member_name()?
        } else {
            return Err(self.error(
                span,
                "only `new Error(...)` and declared custom errors can be thrown",
            ));
        };
        let Some(fields) = self.error_fields(&name) else {
            return Err(self.error(name_span, &format!("unknown error `{name}`")));
        };
        let types: Vec<Type> = fields.iter().map(|field| field.ty.clone()).collect();
        let args = self.parse_args(Some(&types))?;
        if args.len() != types.len() {
            return Err(self.error(
                name_span,
                &format!("error `{name}` expects {} argument(s), found {}", types.len(), args.len()),
            ));
        }
        Ok(Statement::Revert(Revert::Custom { error: name, args }))
    }

    fn parse_super_call(&mut self) -> Result<(), ParseError> {
        let span = self.cursor.advance().span;
        let in_constructor = self
            .function
            .as_ref()
            .is_some_and(|function| function.is_constructor);
        if !in_constructor {
            return Err(self.error(span, "`super(...)` is only allowed in a constructor"));
        }
        let Some(base) = self.base_class().map(str::to_string) else {
            return Err(self.error(span, "`super(...)` in a class without a base"));
        };
        let (params, required) = match self
            .symbols
            .classes
            .get(&base)
            .and_then(|class| class.constructor.as_ref())
        {
            Some(sig) => (sig.params.clone(), sig.required),
            None => (Vec::new(), 0),
        };
        let args = self.parse_args(Some(&params))?;
        if args.len() < required || args.len() > params.len() {
            return Err(self.error(span, &format!("wrong number of arguments for `{base}` constructor")));
        }
        let Some(function) = self.function_mut() else {
            return Err(self.error(span, "`super(...)` is only allowed in a constructor"));
        };
        if function.base_args.replace(args).is_some() {
            return Err(self.error(span, "`super(...)` is called more than once"));
        }
        Ok(())
    }

    fn parse_expression_statement(&mut self) -> Result<Statement, ParseError> {
        let span = self.cursor.peek().span;
        let expr = self.parse_expression(None)?;
        if let Expression::Call { callee, args } = &expr {
            if let Expression::Property { object, property } = callee.as_ref() {
                if let Some(event) = object.this_member_name() {
                    if property == "emit" && self.event_fields(event).is_some() {
                        return Ok(Statement::Emit {
                            event: event.to_string(),
                            args: args.clone(),
                        });
                    }
                }
            }
            if let Some(member) = callee.this_member_name() {
                if self.error_fields(member).is_some() {
                    return Err(self.error(span, &format!("custom error `{member}` must be thrown")));
                }
            }
        }
        Ok(Statement::Expr(expr))
    }
}

/// No calls or side effects, so evaluating it again is harmless.
pub(super) fn is_simple_path(expr: &Expression) -> bool {
    let mut simple = true;
    expr.walk(&mut |node| {
        if matches!(
            node,
            Expression::Call { .. } | Expression::Assign { .. } | Expression::New { .. }
        ) || matches!(node, Expression::Unary { op, .. } if op.is_update())
        {
            simple = false;
        }
    });
    simple
}

/// A `break` that would leave the switch from inside a nested `if` or
/// `try`. Breaks in nested loops and switches belong to those.
fn has_nested_break(body: &[Statement]) -> bool {
    body.iter().any(|statement| match statement {
        Statement::Break => true,
        Statement::If { .. } | Statement::Try(_) => statement
            .blocks()
            .into_iter()
            .any(has_nested_break),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{parse_one, parse_with};
    use super::*;

    fn body_of(source: &str) -> Vec<Statement> {
        parse_one(source).functions.remove(0).body
    }

    #[test]
    fn splits_multiple_declarators() {
        let body = body_of("class A { f(): void { let a = 1, b: string = \"x\"; a = 2; } }");
        assert_eq!(body.len(), 3);
        let Statement::VarDecl(second) = &body[1] else {
            panic!("expected declaration");
        };
        assert_eq!(second.ty, Type::String);
    }

    #[test]
    fn lowers_for_of_to_an_indexed_loop() {
        let body = body_of(
            "class A { items: number[] = []; sum(): number { let total = 0; for (const x of this.items) { total += x; } return total; } }",
        );
        let Statement::For {
            init: Some(init),
            condition: Some(condition),
            body: loop_body,
            ..
        } = &body[1]
        else {
            panic!("expected for loop, got {:?}", body[1]);
        };
        assert!(matches!(init.as_ref(), Statement::VarDecl(decl) if decl.name == "__i1"));
        assert!(matches!(condition, Expression::Binary { op: BinaryOp::Lt, .. }));
        let Statement::VarDecl(element) = &loop_body[0] else {
            panic!("expected element binding");
        };
        assert_eq!(element.name, "x");
        assert_eq!(element.ty, Type::UINT256);
    }

    #[test]
    fn hoists_computed_iterables() {
        let body = body_of(
            "class A { list(): number[] { return new Array<number>(3); } f(): void { for (const x of this.list()) { x; } } }",
        );
        assert!(matches!(&body[0], Statement::VarDecl(decl) if decl.name.starts_with("__items")));
        assert!(matches!(&body[1], Statement::For { .. }));
    }

    #[test]
    fn groups_empty_cases_and_strips_breaks() {
        let contract = parse_one(
            "class A { f(x: number): number { switch (x) { case 1: case 2: return 10; case 3: x = 4; break; default: return 0; } return x; } }",
        );
        let Statement::Switch { cases, .. } = &contract.functions[0].body[0] else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].tests.len(), 2);
        assert_eq!(cases[1].body.len(), 1);
        assert!(cases[2].is_default);
    }

    #[test]
    fn rejects_fallthrough() {
        let err = parse_with(
            "class A { f(x: number): void { switch (x) { case 1: x = 2; case 2: x = 3; } } }",
            &[],
        )
        .unwrap_err();
        assert!(err.message.contains("falling through"), "{}", err.message);
    }

    #[test]
    fn lowers_throws() {
        let body = body_of(
            "class A { Low: SkittlesError<{ have: number }>; f(x: number): void { if (x == 0) throw new Error(\"zero\"); throw this.Low(x); } }",
        );
        assert!(matches!(
            &body[0],
            Statement::If { then_body, .. } if matches!(then_body[0], Statement::Revert(Revert::Message(Some(_))))
        ));
        assert!(matches!(&body[1], Statement::Revert(Revert::Custom { error, .. }) if error == "Low"));
    }

    #[test]
    fn emits_events_with_named_fields() {
        let body = body_of(
            "class A { Moved: SkittlesEvent<{ from: Indexed<address>; amount: number }>; f(n: number): void { this.Moved.emit({ amount: n, from: msg.sender }); } }",
        );
        let Statement::Emit { event, args } = &body[0] else {
            panic!("expected emit");
        };
        assert_eq!(event, "Moved");
        assert_eq!(args[1], Expression::ident("n"));
    }

    #[test]
    fn requires_external_calls_in_try() {
        let sources = [(
            "oracle.ts",
            "class Oracle { price(): number { return 1; } }",
        )];
        let ok = parse_with(
            "class A { o: Oracle; f(): number { try { const p = this.o.price(); return p; } catch (e) { return 0; } } }",
            &sources,
        )
        .expect("parse");
        let Statement::Try(try_catch) = &ok[0].functions[0].body[0] else {
            panic!("expected try");
        };
        assert_eq!(try_catch.returns, Some(("p".to_string(), Type::UINT256)));
        assert_eq!(try_catch.error_binding.as_deref(), Some("e"));

        let err = parse_with(
            "class A { g(): number { return 1; } f(): void { try { this.g(); } catch { } } }",
            &[],
        )
        .unwrap_err();
        assert!(err.message.contains("external call"), "{}", err.message);
    }

    #[test]
    fn rejects_break_outside_loops() {
        let err = parse_with("class A { f(): void { break; } }", &[]).unwrap_err();
        assert!(err.message.contains("outside a loop"));
    }

    #[test]
    fn rejects_redeclaration_in_one_scope() {
        let err = parse_with("class A { f(): void { let a = 1; let a = 2; } }", &[]).unwrap_err();
        assert!(err.message.contains("already declared"));
    }
}
