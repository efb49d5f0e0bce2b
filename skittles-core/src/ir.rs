//! Contract intermediate representation.
//!
//! The IR is the parser's output and the code generator's input. It is
//! already desugared: default parameters, `for..of` loops and string
//! operators have been rewritten into plain forms, and every identifier
//! has been resolved against the symbol table. Nodes are immutable once
//! built; later phases only read them.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::Type;

/// A shared definition a contract depends on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "camelCase")]
pub enum SharedRef {
    Struct(String),
    Enum(String),
    Constant(String),
    Function(String),
    Class(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    pub name: String,
    pub file: PathBuf,
    pub is_abstract: bool,
    pub variables: Vec<Variable>,
    pub functions: Vec<Function>,
    pub constructor: Option<Constructor>,
    pub events: Vec<Event>,
    pub errors: Vec<CustomError>,
    /// Direct base contract, if any.
    pub inherits: Vec<String>,
    pub references: BTreeSet<SharedRef>,
}

impl Contract {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Internal,
    Private,
}

impl Visibility {
    pub fn keyword(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Internal => "internal",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Mutable,
    Immutable,
    Constant,
}

/// A state variable, or a file-level constant when it appears in the
/// symbol table.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub visibility: Visibility,
    pub mutability: Mutability,
    pub initializer: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    pub default: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Method,
    Receive,
    Fallback,
    /// File-level function outside any class.
    Free,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<Parameter>,
    pub returns: Type,
    pub visibility: Visibility,
    pub payable: bool,
    pub is_virtual: bool,
    pub is_override: bool,
    pub is_abstract: bool,
    pub body: Vec<Statement>,
}

impl Function {
    pub fn param_types(&self) -> Vec<&Type> {
        self.params.iter().map(|p| &p.ty).collect()
    }

    /// Same name and parameter types.
    pub fn same_signature(&self, other: &Function) -> bool {
        self.name == other.name && self.param_types() == other.param_types()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constructor {
    pub params: Vec<Parameter>,
    pub payable: bool,
    /// Arguments of a `super(...)` call, forwarded to the base constructor.
    pub base_args: Option<Vec<Expression>>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub indexed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomError {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub initializer: Option<Expression>,
    /// Introduced for a defaulted constructor parameter.
    pub from_parameter: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// Empty for a lone `default:`.
    pub tests: Vec<Expression>,
    pub is_default: bool,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Revert {
    Message(Option<Expression>),
    Custom { error: String, args: Vec<Expression> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryCatch {
    /// External call or contract creation.
    pub call: Expression,
    pub returns: Option<(String, Type)>,
    pub body: Vec<Statement>,
    pub error_binding: Option<String>,
    pub catch_body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    VarDecl(VarDecl),
    Return(Option<Expression>),
    Expr(Expression),
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        else_body: Option<Vec<Statement>>,
    },
    For {
        init: Option<Box<Statement>>,
        condition: Option<Expression>,
        update: Option<Expression>,
        body: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    DoWhile {
        body: Vec<Statement>,
        condition: Expression,
    },
    Switch {
        discriminant: Expression,
        ty: Type,
        cases: Vec<SwitchCase>,
    },
    Revert(Revert),
    Emit {
        event: String,
        args: Vec<Expression>,
    },
    Delete(Expression),
    Try(Box<TryCatch>),
    Break,
    Continue,
}

impl Statement {
    /// Statements after this one in the same block never run.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Statement::Return(_) | Statement::Revert(_) | Statement::Break | Statement::Continue
        )
    }

    /// Nested statement blocks, in source order.
    pub fn blocks(&self) -> Vec<&[Statement]> {
        match self {
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                let mut blocks = vec![then_body.as_slice()];
                if let Some(else_body) = else_body {
                    blocks.push(else_body.as_slice());
                }
                blocks
            }
            Statement::For { body, .. }
            | Statement::While { body, .. }
            | Statement::DoWhile { body, .. } => vec![body.as_slice()],
            Statement::Switch { cases, .. } => cases.iter().map(|c| c.body.as_slice()).collect(),
            Statement::Try(try_catch) => {
                vec![try_catch.body.as_slice(), try_catch.catch_body.as_slice()]
            }
            _ => Vec::new(),
        }
    }

    /// Expressions owned directly by this statement, not by nested blocks.
    pub fn expressions(&self) -> Vec<&Expression> {
        match self {
            Statement::VarDecl(decl) => decl.initializer.iter().collect(),
            Statement::Return(value) => value.iter().collect(),
            Statement::Expr(expr) | Statement::Delete(expr) => vec![expr],
            Statement::If { condition, .. }
            | Statement::While { condition, .. }
            | Statement::DoWhile { condition, .. } => vec![condition],
            // The `for` initialiser is a statement of its own.
            Statement::For {
                condition, update, ..
            } => condition.iter().chain(update.iter()).collect(),
            Statement::Switch {
                discriminant,
                cases,
                ..
            } => {
                let mut exprs = vec![discriminant];
                for case in cases {
                    exprs.extend(case.tests.iter());
                }
                exprs
            }
            Statement::Revert(Revert::Message(message)) => message.iter().collect(),
            Statement::Revert(Revert::Custom { args, .. }) | Statement::Emit { args, .. } => {
                args.iter().collect()
            }
            Statement::Try(try_catch) => vec![&try_catch.call],
            Statement::Break | Statement::Continue => Vec::new(),
        }
    }
}

/// Visit every statement in `body`, including nested blocks, depth first.
pub fn walk_statements<'a>(body: &'a [Statement], visit: &mut impl FnMut(&'a Statement)) {
    for stmt in body {
        visit(stmt);
        if let Statement::For {
            init: Some(init), ..
        } = stmt
        {
            visit(init.as_ref());
        }
        for block in stmt.blocks() {
            walk_statements(block, visit);
        }
    }
}

/// Visit every expression in `body`, including subexpressions.
pub fn walk_body_expressions<'a>(body: &'a [Statement], visit: &mut impl FnMut(&'a Expression)) {
    walk_statements(body, &mut |stmt| {
        for expr in stmt.expressions() {
            expr.walk(visit);
        }
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Decimal or hex digits, already normalised for Solidity.
    Number(String),
    String(String),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    BitNot,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

impl UnaryOp {
    pub fn is_update(self) -> bool {
        matches!(
            self,
            UnaryOp::PreIncrement
                | UnaryOp::PreDecrement
                | UnaryOp::PostIncrement
                | UnaryOp::PostDecrement
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Local, parameter, constant, free function or environment name.
    /// `this` and `super` are identifiers too.
    Identifier(String),
    Literal(Literal),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    /// `op` is set for compound assignment.
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expression>,
        value: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    Property {
        object: Box<Expression>,
        property: String,
    },
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        then_value: Box<Expression>,
        else_value: Box<Expression>,
    },
    StructLiteral {
        name: String,
        fields: Vec<(String, Expression)>,
    },
    Tuple(Vec<Expression>),
    New {
        ty: Type,
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn ident(name: impl Into<String>) -> Expression {
        Expression::Identifier(name.into())
    }

    pub fn number(digits: impl Into<String>) -> Expression {
        Expression::Literal(Literal::Number(digits.into()))
    }

    pub fn property(object: Expression, property: impl Into<String>) -> Expression {
        Expression::Property {
            object: Box::new(object),
            property: property.into(),
        }
    }

    /// `this.<name>`
    pub fn this_member(name: impl Into<String>) -> Expression {
        Expression::property(Expression::ident("this"), name)
    }

    pub fn call(callee: Expression, args: Vec<Expression>) -> Expression {
        Expression::Call {
            callee: Box::new(callee),
            args,
        }
    }

    /// `namespace.member(args)`
    pub fn builtin_call(namespace: &str, member: &str, args: Vec<Expression>) -> Expression {
        Expression::call(Expression::property(Expression::ident(namespace), member), args)
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn index(object: Expression, index: Expression) -> Expression {
        Expression::Index {
            object: Box::new(object),
            index: Box::new(index),
        }
    }

    /// Name of the state member accessed as `this.<name>`.
    pub fn this_member_name(&self) -> Option<&str> {
        match self {
            Expression::Property { object, property } => match object.as_ref() {
                Expression::Identifier(root) if root == "this" => Some(property),
                _ => None,
            },
            _ => None,
        }
    }

    /// Root of an access path: `this.a[b].c` has root `this.a`.
    pub fn access_root(&self) -> &Expression {
        let mut current = self;
        loop {
            if current.this_member_name().is_some() {
                return current;
            }
            match current {
                Expression::Property { object, .. } | Expression::Index { object, .. } => {
                    current = object;
                }
                _ => return current,
            }
        }
    }

    /// `namespace.member(...)` with an identifier namespace.
    pub fn as_builtin_call(&self) -> Option<(&str, &str, &[Expression])> {
        let Expression::Call { callee, args } = self else {
            return None;
        };
        let Expression::Property { object, property } = callee.as_ref() else {
            return None;
        };
        let Expression::Identifier(namespace) = object.as_ref() else {
            return None;
        };
        Some((namespace, property, args))
    }

    /// Pre-order walk over this expression and all subexpressions.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expression)) {
        visit(self);
        match self {
            Expression::Identifier(_) | Expression::Literal(_) => {}
            Expression::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expression::Unary { operand, .. } => operand.walk(visit),
            Expression::Assign { target, value, .. } => {
                target.walk(visit);
                value.walk(visit);
            }
            Expression::Call { callee, args } => {
                callee.walk(visit);
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expression::Property { object, .. } => object.walk(visit),
            Expression::Index { object, index } => {
                object.walk(visit);
                index.walk(visit);
            }
            Expression::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                condition.walk(visit);
                then_value.walk(visit);
                else_value.walk(visit);
            }
            Expression::StructLiteral { fields, .. } => {
                for (_, value) in fields {
                    value.walk(visit);
                }
            }
            Expression::Tuple(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Expression::New { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_access_root() {
        let expr = Expression::property(
            Expression::index(Expression::this_member("balances"), Expression::ident("who")),
            "amount",
        );
        assert_eq!(expr.access_root().this_member_name(), Some("balances"));
        assert_eq!(
            Expression::index(Expression::ident("local"), Expression::number("0")).access_root(),
            &Expression::ident("local")
        );
    }

    #[test]
    fn walks_nested_blocks() {
        let body = vec![Statement::If {
            condition: Expression::ident("a"),
            then_body: vec![Statement::Return(Some(Expression::ident("b")))],
            else_body: Some(vec![Statement::Expr(Expression::ident("c"))]),
        }];
        let mut names = Vec::new();
        walk_body_expressions(&body, &mut |expr| {
            if let Expression::Identifier(name) = expr {
                names.push(name.clone());
            }
        });
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
