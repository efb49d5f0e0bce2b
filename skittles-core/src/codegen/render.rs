//! Solidity text output.

use std::collections::BTreeSet;

use crate::ir::{
    BinaryOp, Constructor, Contract, Event, Expression, Field, Function, FunctionKind, Literal, Mutability, Parameter,
    Revert, SharedRef, Statement, SwitchCase, TryCatch, UnaryOp, VarDecl, Variable,
};
use crate::symbols::SymbolTable;
use crate::types::{DataLocation, Type};

use super::mutability::{MutabilityTable, StateMutability};
use super::{FunctionRef, HEADER, Unit};

const INDENT: &str = "    ";

/// Binding strength of Solidity operators, loosest first.
mod prec {
    pub const ASSIGN: u8 = 2;
    pub const CONDITIONAL: u8 = 3;
    pub const PREFIX: u8 = 15;
    pub const POSTFIX: u8 = 16;
    pub const PRIMARY: u8 = 17;
    pub const POW: u8 = 14;
}

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 4,
        BinaryOp::And => 5,
        BinaryOp::Eq | BinaryOp::Ne => 6,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 7,
        BinaryOp::BitOr => 8,
        BinaryOp::BitXor => 9,
        BinaryOp::BitAnd => 10,
        BinaryOp::Shl | BinaryOp::Shr => 11,
        BinaryOp::Add | BinaryOp::Sub => 12,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 13,
    }
}

pub(crate) fn render_unit(unit: &Unit<'_>, mutability: &MutabilityTable) -> String {
    let mut w = Writer::default();
    w.out.push_str(HEADER);

    let symbols = unit.symbols;
    for reference in &unit.shared {
        if let SharedRef::Enum(name) = reference {
            if let Some(def) = symbols.enums.get(name) {
                w.blank();
                w.line(&format!("enum {} {{ {} }}", def.name, def.members.join(", ")));
            }
        }
    }
    for reference in &unit.shared {
        if let SharedRef::Struct(name) = reference {
            render_struct(&mut w, symbols, name);
        }
    }
    let mut constants = unit
        .shared
        .iter()
        .filter_map(|r| match r {
            SharedRef::Constant(name) => symbols.constants.get(name),
            _ => None,
        })
        .peekable();
    if constants.peek().is_some() {
        w.blank();
    }
    for constant in constants {
        let variable = &constant.variable;
        let value = variable
            .initializer
            .as_ref()
            .map(|value| format!(" = {}", Scope::file(unit).expr(value)))
            .unwrap_or_default();
        w.line(&format!(
            "{} constant {}{};",
            variable.ty.solidity_name(),
            variable.name,
            value
        ));
    }
    if !unit.errors.is_empty() {
        w.blank();
    }
    for (name, fields) in &unit.errors {
        w.line(&format!("error {name}({});", field_list(fields, false)));
    }
    for index in 0..unit.free_functions.len() {
        w.blank();
        render_function(&mut w, unit, mutability, FunctionRef::Free(index));
    }
    for (index, contract) in unit.contracts.iter().enumerate() {
        w.blank();
        render_contract(&mut w, unit, mutability, index, contract);
    }
    w.out
}

fn render_struct(w: &mut Writer, symbols: &SymbolTable, name: &str) {
    let Some(def) = symbols.structs.get(name) else {
        return;
    };
    w.blank();
    w.open(&format!("struct {} {{", def.name));
    for (field, ty) in &def.fields {
        w.line(&format!("{} {field};", ty.solidity_name()));
    }
    w.close("}");
}

fn field_list(fields: &[Field], allow_indexed: bool) -> String {
    fields
        .iter()
        .map(|field| {
            let indexed = if allow_indexed && field.indexed { " indexed" } else { "" };
            format!("{}{indexed} {}", field.ty.solidity_name(), field.name)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_contract(w: &mut Writer, unit: &Unit<'_>, mutability: &MutabilityTable, index: usize, contract: &Contract) {
    let keyword = if contract.is_abstract { "abstract contract" } else { "contract" };
    let bases = if contract.inherits.is_empty() {
        String::new()
    } else {
        format!(" is {}", contract.inherits.join(", "))
    };
    w.open(&format!("{keyword} {}{bases} {{", contract.name));

    for Event { name, fields } in &contract.events {
        w.line(&format!("event {name}({});", field_list(fields, true)));
    }
    if !contract.events.is_empty() && !contract.variables.is_empty() {
        w.blank();
    }
    for variable in &contract.variables {
        render_variable(w, unit, index, variable);
    }

    if let Some(constructor) = &contract.constructor {
        w.blank();
        render_constructor(w, unit, index, contract, constructor);
    }
    for position in 0..contract.functions.len() {
        w.blank();
        render_function(
            w,
            unit,
            mutability,
            FunctionRef::Method {
                contract: index,
                index: position,
            },
        );
    }
    w.close("}");
}

fn render_variable(w: &mut Writer, unit: &Unit<'_>, contract: usize, variable: &Variable) {
    let qualifier = match variable.mutability {
        Mutability::Mutable => "",
        Mutability::Immutable => " immutable",
        Mutability::Constant => " constant",
    };
    let value = variable
        .initializer
        .as_ref()
        .map(|value| format!(" = {}", Scope::method(unit, contract).expr(value)))
        .unwrap_or_default();
    w.line(&format!(
        "{} {}{qualifier} {}{value};",
        variable.ty.solidity_name(),
        variable.visibility.keyword(),
        variable.name
    ));
}

fn parameter_list(params: &[Parameter], state: &BTreeSet<String>) -> String {
    params
        .iter()
        .map(|p| format!("{} {}", p.ty.declaration(DataLocation::Memory), local_name(state, &p.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn returns_clause(returns: &Type) -> String {
    match returns {
        Type::Void => String::new(),
        Type::Tuple(items) => {
            let items: Vec<String> = items
                .iter()
                .map(|ty| ty.declaration(DataLocation::Memory))
                .collect();
            format!(" returns ({})", items.join(", "))
        }
        other => format!(" returns ({})", other.declaration(DataLocation::Memory)),
    }
}

fn render_constructor(w: &mut Writer, unit: &Unit<'_>, index: usize, contract: &Contract, constructor: &Constructor) {
    let mut scope = Scope::method(unit, index);
    let mut header = format!("constructor({})", parameter_list(&constructor.params, &scope.state));
    if constructor.payable {
        header.push_str(" payable");
    }
    if let (Some(args), Some(base)) = (&constructor.base_args, contract.inherits.first()) {
        header.push_str(&format!(" {base}({})", scope.args(args)));
    }
    header.push_str(" {");
    w.open(&header);
    scope.block(w, &constructor.body);
    w.close("}");
}

fn render_function(w: &mut Writer, unit: &Unit<'_>, mutability: &MutabilityTable, reference: FunctionRef) {
    let function = unit.function(reference);
    let level = mutability.get(&reference).copied().unwrap_or(StateMutability::NonPayable);
    let mut scope = match reference {
        FunctionRef::Method { contract, .. } => Scope::method(unit, contract),
        FunctionRef::Free(_) => Scope::file(unit),
    };
    let mut header = signature(function, level, &scope.state);
    if !matches!(reference, FunctionRef::Free(_)) {
        if function.is_virtual || function.is_abstract || unit.overridden.contains(&reference) {
            header.push_str(" virtual");
        }
        if unit.overriding.contains(&reference) {
            header.push_str(" override");
        }
    }
    header.push_str(&returns_clause(&function.returns));
    if function.is_abstract {
        header.push(';');
        w.line(&header);
        return;
    }
    header.push_str(" {");
    w.open(&header);
    scope.block(w, &function.body);
    w.close("}");
}

/// Everything before the `returns` clause.
fn signature(function: &Function, level: StateMutability, state: &BTreeSet<String>) -> String {
    match function.kind {
        FunctionKind::Receive => "receive() external payable".to_string(),
        FunctionKind::Fallback => {
            let payable = if level == StateMutability::Payable { " payable" } else { "" };
            format!("fallback() external{payable}")
        }
        FunctionKind::Free => {
            let mut header = format!("function {}({})", function.name, parameter_list(&function.params, state));
            if let Some(keyword) = level.min(StateMutability::NonPayable).keyword() {
                header.push(' ');
                header.push_str(keyword);
            }
            header
        }
        FunctionKind::Method => {
            let mut header = format!(
                "function {}({}) {}",
                function.name,
                parameter_list(&function.params, state),
                function.visibility.keyword()
            );
            if let Some(keyword) = level.keyword() {
                header.push(' ');
                header.push_str(keyword);
            }
            header
        }
    }
}

#[derive(Default)]
struct Writer {
    out: String,
    indent: usize,
}

impl Writer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn open(&mut self, text: &str) {
        self.line(text);
        self.indent += 1;
    }

    fn close(&mut self, text: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
    }

    /// Separate the next item from the previous one with an empty line.
    fn blank(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("{\n") && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }
}

/// Solidity spelling of a parameter or local. Names that collide with a
/// state variable get a trailing `_` so `this.x = x` stays a storage write.
fn local_name(state: &BTreeSet<String>, name: &str) -> String {
    let mut out = name.to_string();
    while state.contains(&out) {
        out.push('_');
    }
    out
}

/// Per-body rendering state.
struct Scope<'u, 'a> {
    unit: &'u Unit<'a>,
    contract: Option<usize>,
    /// State variables visible in the body, bases included.
    state: BTreeSet<String>,
    storage_locals: BTreeSet<String>,
    temps: usize,
}

impl<'u, 'a> Scope<'u, 'a> {
    fn file(unit: &'u Unit<'a>) -> Self {
        Scope {
            unit,
            contract: None,
            state: BTreeSet::new(),
            storage_locals: BTreeSet::new(),
            temps: 0,
        }
    }

    fn method(unit: &'u Unit<'a>, contract: usize) -> Self {
        let state = unit
            .chain(contract)
            .into_iter()
            .flat_map(|c| unit.contracts[c].variables.iter())
            .map(|variable| variable.name.clone())
            .collect();
        Scope {
            contract: Some(contract),
            state,
            ..Scope::file(unit)
        }
    }

    fn block(&mut self, w: &mut Writer, body: &[Statement]) {
        for stmt in body {
            self.statement(w, stmt);
        }
    }

    fn statement(&mut self, w: &mut Writer, stmt: &Statement) {
        match stmt {
            Statement::VarDecl(decl) => {
                let text = self.var_decl(decl);
                w.line(&format!("{text};"));
            }
            Statement::Return(None) => w.line("return;"),
            Statement::Return(Some(value)) => w.line(&format!("return {};", self.expr(value))),
            Statement::Expr(expr) => w.line(&format!("{};", self.expr(expr))),
            Statement::If {
                condition,
                then_body,
                else_body,
            } => self.if_chain(w, condition, then_body, else_body.as_deref()),
            Statement::For {
                init,
                condition,
                update,
                body,
            } => {
                let init = match init.as_deref() {
                    Some(Statement::VarDecl(decl)) => self.var_decl(decl),
                    Some(Statement::Expr(expr)) => self.expr(expr),
                    _ => String::new(),
                };
                let condition = condition.as_ref().map(|c| self.expr(c)).unwrap_or_default();
                let update = update.as_ref().map(|u| self.expr(u)).unwrap_or_default();
                w.open(&format!("for ({init}; {condition}; {update}) {{"));
                self.block(w, body);
                w.close("}");
            }
            Statement::While { condition, body } => {
                w.open(&format!("while ({}) {{", self.expr(condition)));
                self.block(w, body);
                w.close("}");
            }
            Statement::DoWhile { body, condition } => {
                w.open("do {");
                self.block(w, body);
                w.close(&format!("}} while ({});", self.expr(condition)));
            }
            Statement::Switch {
                discriminant,
                ty,
                cases,
            } => self.switch(w, discriminant, ty, cases),
            Statement::Revert(Revert::Message(message)) => {
                let message = message.as_ref().map(|m| self.expr(m)).unwrap_or_default();
                w.line(&format!("revert({message});"));
            }
            Statement::Revert(Revert::Custom { error, args }) => {
                w.line(&format!("revert {error}({});", self.args(args)));
            }
            Statement::Emit { event, args } => w.line(&format!("emit {event}({});", self.args(args))),
            Statement::Delete(target) => w.line(&format!("delete {};", self.expr(target))),
            Statement::Try(try_catch) => self.try_catch(w, try_catch),
            Statement::Break => w.line("break;"),
            Statement::Continue => w.line("continue;"),
        }
    }

    fn var_decl(&mut self, decl: &VarDecl) -> String {
        let from_storage = decl.ty.is_reference()
            && decl
                .initializer
                .as_ref()
                .is_some_and(|value| self.unit.is_storage_place(self.contract, value, &self.storage_locals));
        let location = if from_storage {
            self.storage_locals.insert(decl.name.clone());
            DataLocation::Storage
        } else {
            DataLocation::Memory
        };
        let mut text = format!("{} {}", decl.ty.declaration(location), local_name(&self.state, &decl.name));
        if let Some(value) = &decl.initializer {
            text.push_str(" = ");
            text.push_str(&self.expr(value));
        }
        text
    }

    fn if_chain(&mut self, w: &mut Writer, condition: &Expression, then_body: &[Statement], else_body: Option<&[Statement]>) {
        w.open(&format!("if ({}) {{", self.expr(condition)));
        self.block(w, then_body);
        let mut rest = else_body;
        while let Some(body) = rest {
            if let [Statement::If {
                condition,
                then_body,
                else_body,
            }] = body
            {
                w.close(&format!("}} else if ({}) {{", self.expr(condition)));
                w.indent += 1;
                self.block(w, then_body);
                rest = else_body.as_deref();
            } else {
                w.close("} else {");
                w.indent += 1;
                self.block(w, body);
                rest = None;
            }
        }
        w.close("}");
    }

    /// `switch` becomes an `if`/`else if` chain with the default case last.
    fn switch(&mut self, w: &mut Writer, discriminant: &Expression, ty: &Type, cases: &[SwitchCase]) {
        let value = if is_simple(discriminant) {
            self.expr(discriminant)
        } else {
            self.temps += 1;
            let temp = format!("__switch{}", self.temps);
            w.line(&format!(
                "{} {temp} = {};",
                ty.declaration(DataLocation::Memory),
                self.expr(discriminant)
            ));
            temp
        };

        let default = cases.iter().find(|case| case.is_default);
        let mut first = true;
        for case in cases.iter().filter(|case| !case.is_default) {
            let tests: Vec<String> = case
                .tests
                .iter()
                .map(|test| {
                    if ty.is_string() {
                        format!(
                            "keccak256(abi.encodePacked({value})) == keccak256(abi.encodePacked({}))",
                            self.expr(test)
                        )
                    } else {
                        format!("{value} == {}", self.expr_at(test, binary_precedence(BinaryOp::Eq) + 1))
                    }
                })
                .collect();
            let condition = tests.join(" || ");
            if first {
                w.open(&format!("if ({condition}) {{"));
                first = false;
            } else {
                w.close(&format!("}} else if ({condition}) {{"));
                w.indent += 1;
            }
            self.block(w, &case.body);
        }
        match (default, first) {
            (Some(case), true) => {
                w.open("{");
                self.block(w, &case.body);
                w.close("}");
            }
            (Some(case), false) => {
                w.close("} else {");
                w.indent += 1;
                self.block(w, &case.body);
                w.close("}");
            }
            (None, false) => w.close("}"),
            (None, true) => {}
        }
    }

    fn try_catch(&mut self, w: &mut Writer, try_catch: &TryCatch) {
        let returns = match &try_catch.returns {
            Some((name, ty)) => format!(
                " returns ({} {})",
                ty.declaration(DataLocation::Memory),
                local_name(&self.state, name)
            ),
            None => String::new(),
        };
        w.open(&format!("try {}{returns} {{", self.expr(&try_catch.call)));
        self.block(w, &try_catch.body);
        match &try_catch.error_binding {
            Some(name) => w.close(&format!("}} catch (bytes memory {}) {{", local_name(&self.state, name))),
            None => w.close("} catch {"),
        }
        w.indent += 1;
        self.block(w, &try_catch.catch_body);
        w.close("}");
    }

    fn args(&self, args: &[Expression]) -> String {
        args.iter()
            .map(|arg| self.expr_at(arg, prec::ASSIGN))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn expr(&self, expr: &Expression) -> String {
        self.expr_at(expr, prec::ASSIGN)
    }

    /// Render `expr`, parenthesized if it binds looser than `min`.
    fn expr_at(&self, expr: &Expression, min: u8) -> String {
        let (text, precedence) = self.expr_inner(expr);
        if precedence < min {
            format!("({text})")
        } else {
            text
        }
    }

    fn expr_inner(&self, expr: &Expression) -> (String, u8) {
        match expr {
            Expression::Identifier(name) if name == "this" => ("address(this)".to_string(), prec::PRIMARY),
            Expression::Identifier(name) => (local_name(&self.state, name), prec::PRIMARY),
            Expression::Literal(literal) => (render_literal(literal), prec::PRIMARY),
            Expression::Binary { op, left, right } => {
                let p = binary_precedence(*op);
                let text = format!(
                    "{} {} {}",
                    self.expr_at(left, p),
                    op.symbol(),
                    self.expr_at(right, p + 1)
                );
                (text, p)
            }
            Expression::Unary { op, operand } => match op {
                UnaryOp::PostIncrement => (format!("{}++", self.expr_at(operand, prec::POSTFIX)), prec::POSTFIX),
                UnaryOp::PostDecrement => (format!("{}--", self.expr_at(operand, prec::POSTFIX)), prec::POSTFIX),
                prefix => {
                    let symbol = match prefix {
                        UnaryOp::Not => "!",
                        UnaryOp::Negate => "-",
                        UnaryOp::BitNot => "~",
                        UnaryOp::PreIncrement => "++",
                        _ => "--",
                    };
                    // `- -x` must not collapse into `--x`.
                    let operand = match operand.as_ref() {
                        Expression::Unary { op, .. } if !matches!(op, UnaryOp::PostIncrement | UnaryOp::PostDecrement) => {
                            format!("({})", self.expr(operand))
                        }
                        _ => self.expr_at(operand, prec::PREFIX),
                    };
                    (format!("{symbol}{operand}"), prec::PREFIX)
                }
            },
            Expression::Assign { op, target, value } => {
                let op = op.map(BinaryOp::symbol).unwrap_or_default();
                let text = format!(
                    "{} {op}= {}",
                    self.expr_at(target, prec::PREFIX),
                    self.expr_at(value, prec::ASSIGN)
                );
                (text, prec::ASSIGN)
            }
            Expression::Call { callee, args } => {
                if let Some(("Math", "pow", [base, exponent])) = expr.as_builtin_call() {
                    let text = format!(
                        "{} ** {}",
                        self.expr_at(base, prec::POW + 1),
                        self.expr_at(exponent, prec::POW)
                    );
                    return (text, prec::POW);
                }
                let callee = match callee.this_member_name() {
                    Some(name) => name.to_string(),
                    None => self.expr_at(callee, prec::POSTFIX),
                };
                (format!("{callee}({})", self.args(args)), prec::POSTFIX)
            }
            Expression::Property { object, property } => {
                if let Some(name) = expr.this_member_name() {
                    return (name.to_string(), prec::PRIMARY);
                }
                let object = match object.as_ref() {
                    Expression::Identifier(root) if root == "super" => "super".to_string(),
                    other => self.expr_at(other, prec::POSTFIX),
                };
                (format!("{object}.{property}"), prec::POSTFIX)
            }
            Expression::Index { object, index } => (
                format!("{}[{}]", self.expr_at(object, prec::POSTFIX), self.expr(index)),
                prec::POSTFIX,
            ),
            Expression::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                let text = format!(
                    "{} ? {} : {}",
                    self.expr_at(condition, prec::CONDITIONAL + 1),
                    self.expr_at(then_value, prec::CONDITIONAL),
                    self.expr_at(else_value, prec::CONDITIONAL)
                );
                (text, prec::CONDITIONAL)
            }
            Expression::StructLiteral { name, fields } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|(field, value)| format!("{field}: {}", self.expr(value)))
                    .collect();
                (format!("{name}({{{}}})", fields.join(", ")), prec::POSTFIX)
            }
            Expression::Tuple(items) => (format!("({})", self.args(items)), prec::PRIMARY),
            Expression::New { ty, args } => (
                format!("new {}({})", ty.solidity_name(), self.args(args)),
                prec::POSTFIX,
            ),
        }
    }
}

/// A discriminant that can be evaluated repeatedly without side effects.
fn is_simple(expr: &Expression) -> bool {
    match expr {
        Expression::Identifier(_) | Expression::Literal(_) => true,
        Expression::Property { object, .. } => is_simple(object),
        _ => false,
    }
}

fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::Number(digits) => digits.clone(),
        Literal::Bool(value) => value.to_string(),
        Literal::String(text) => {
            let mut out = String::with_capacity(text.len() + 2);
            if !text.is_ascii() {
                out.push_str("unicode");
            }
            out.push('"');
            for c in text.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
                    c => out.push(c),
                }
            }
            out.push('"');
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::generate_unit;
    use crate::parser::test_support::{parse_with, symbols_for};

    fn solidity_with(source: &str, extra: &[(&str, &str)]) -> String {
        let contracts = parse_with(source, extra).expect("parse");
        let mut files = extra.to_vec();
        files.push(("main.ts", source));
        let symbols = symbols_for(&files);
        let refs: Vec<&Contract> = contracts.iter().collect();
        generate_unit(&refs, &symbols).expect("generate")
    }

    fn solidity(source: &str) -> String {
        solidity_with(source, &[])
    }

    #[test]
    fn renders_the_token_example() {
        let out = solidity(
            "class Token {\n  Transfer: SkittlesEvent<{ from: Indexed<address>; to: Indexed<address>; value: number }>;\n  totalSupply: number = 0;\n  private balances: Record<address, number> = {};\n  constructor(supply: number) {\n    this.totalSupply = supply;\n    this.balances[msg.sender] = supply;\n  }\n  transfer(to: address, amount: number): boolean {\n    this.balances[msg.sender] -= amount;\n    this.balances[to] += amount;\n    this.Transfer.emit(msg.sender, to, amount);\n    return true;\n  }\n}",
        );
        let expected = "\
contract Token {
    event Transfer(address indexed from, address indexed to, uint256 value);

    uint256 public totalSupply = 0;
    mapping(address => uint256) private balances;

    constructor(uint256 supply) {
        totalSupply = supply;
        balances[msg.sender] = supply;
    }

    function transfer(address to, uint256 amount) public returns (bool) {
        balances[msg.sender] -= amount;
        balances[to] += amount;
        emit Transfer(msg.sender, to, amount);
        return true;
    }
}
";
        assert!(out.ends_with(expected), "{out}");
    }

    #[test]
    fn parenthesizes_by_solidity_precedence() {
        let out = solidity(
            "class C { f(a: number, b: number): number { return (a + b) * 2 - a ** 2 ** b + (a > b ? a : b); } }",
        );
        assert!(out.contains("return (a + b) * 2 - a ** 2 ** b + (a > b ? a : b);"), "{out}");
    }

    #[test]
    fn emits_shared_definitions_before_contracts() {
        let out = solidity_with(
            "class Shop {\n  orders: Order[] = [];\n  static readonly LIMIT: number = MAX;\n  Missing: SkittlesError<{ id: number }>;\n  open(): void { this.orders.push({ owner: msg.sender, status: Status.Open }); }\n  check(id: number): void { if (id >= this.orders.length) { throw this.Missing(id); } }\n}",
            &[(
                "shared.ts",
                "export enum Status { Open, Closed }\nexport interface Order { owner: address; status: Status }\nexport const MAX = 10;",
            )],
        );
        let enum_at = out.find("enum Status { Open, Closed }").expect("enum");
        let struct_at = out.find("struct Order {\n    address owner;\n    Status status;\n}").expect("struct");
        let const_at = out.find("uint256 constant MAX = 10;").expect("constant");
        let error_at = out.find("error Missing(uint256 id);").expect("error");
        let contract_at = out.find("contract Shop {").expect("contract");
        assert!(enum_at < struct_at && struct_at < const_at && const_at < error_at && error_at < contract_at);
        assert!(out.contains("uint256 public constant LIMIT = MAX;"), "{out}");
        assert!(out.contains("orders.push(Order({owner: msg.sender, status: Status.Open}));"), "{out}");
        assert!(out.contains("revert Missing(id);"), "{out}");
    }

    #[test]
    fn switch_becomes_an_if_chain() {
        let out = solidity(
            "class C {\n  f(x: number): number {\n    switch (x + 1) {\n      case 1:\n      case 2:\n        return 10;\n      default:\n        return 0;\n      case 3:\n        return 30;\n    }\n  }\n}",
        );
        assert!(out.contains("uint256 __switch1 = x + 1;"), "{out}");
        assert!(
            out.contains("if (__switch1 == 1 || __switch1 == 2) {\n            return 10;\n        } else if (__switch1 == 3) {\n            return 30;\n        } else {\n            return 0;\n        }"),
            "{out}"
        );
    }

    #[test]
    fn string_switch_compares_hashes() {
        let out = solidity(
            "class C {\n  f(s: string): number {\n    switch (s) {\n      case \"a\":\n        return 1;\n    }\n    return 0;\n  }\n}",
        );
        assert!(
            out.contains("if (keccak256(abi.encodePacked(s)) == keccak256(abi.encodePacked(\"a\"))) {"),
            "{out}"
        );
    }

    #[test]
    fn renders_special_functions_and_try_catch() {
        let out = solidity(
            "class Other { ping(): number { return 1; } }\nclass C {\n  other: Other = new Other();\n  last: number = 0;\n  receive(): void { }\n  poke(): void {\n    try {\n      const r = this.other.ping();\n      this.last = r;\n    } catch (e) {\n      this.last = 0;\n    }\n  }\n}",
        );
        assert!(out.contains("Other public other = new Other();"), "{out}");
        assert!(out.contains("receive() external payable {"), "{out}");
        assert!(out.contains("try other.ping() returns (uint256 r) {"), "{out}");
        assert!(out.contains("} catch (bytes memory e) {"), "{out}");
    }

    #[test]
    fn free_functions_have_no_visibility() {
        let out = solidity_with(
            "class C { f(x: number): number { return double(x); } }",
            &[("math.ts", "export function double(x: number): number { return x * 2; }")],
        );
        assert!(out.contains("function double(uint256 x) pure returns (uint256) {"), "{out}");
        assert!(out.contains("return double(x);"), "{out}");
    }

    #[test]
    fn renames_locals_that_shadow_state() {
        let out = solidity(
            "class Base { owner: address = msg.sender; }\nclass Token extends Base {\n  public totalSupply: number;\n  constructor(totalSupply: number) {\n    this.totalSupply = totalSupply;\n  }\n  set(totalSupply: number, owner: address): void {\n    const before = this.totalSupply;\n    this.totalSupply = totalSupply + before;\n    this.owner = owner;\n  }\n}",
        );
        assert!(out.contains("constructor(uint256 totalSupply_) {"), "{out}");
        assert!(out.contains("totalSupply = totalSupply_;"), "{out}");
        assert!(out.contains("function set(uint256 totalSupply_, address owner_) public {"), "{out}");
        assert!(out.contains("totalSupply = totalSupply_ + before;"), "{out}");
        assert!(out.contains("owner = owner_;"), "{out}");
        assert!(!out.contains("totalSupply = totalSupply;"), "{out}");
    }

    #[test]
    fn escapes_string_literals() {
        assert_eq!(render_literal(&Literal::String("say \"hi\"\n".to_string())), "\"say \\\"hi\\\"\\n\"");
        assert_eq!(render_literal(&Literal::String("é".to_string())), "unicode\"é\"");
    }
}
