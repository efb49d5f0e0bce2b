//! Body analysis that produces warnings, never errors.
//!
//! Two checks run over every function and constructor body:
//!
//! * code after a `return`, `throw`, `break` or `continue` in the same
//!   block, reported once per block;
//! * locals that are declared but never read or written afterwards,
//!   resolved per block so shadowed names are checked separately.

use crate::diagnostic::Warning;
use crate::ir::{Constructor, Contract, Expression, Function, Statement};

/// Warnings for every body in a contract, constructor first.
pub fn analyze_contract(contract: &Contract) -> Vec<Warning> {
    let mut warnings = Vec::new();
    if let Some(constructor) = &contract.constructor {
        warnings.extend(analyze_constructor(constructor, &contract.name));
    }
    for function in &contract.functions {
        warnings.extend(analyze(function, &contract.name));
    }
    warnings
}

pub fn analyze(function: &Function, contract: &str) -> Vec<Warning> {
    analyze_body(&function.body, &[], contract, &function.name)
}

pub fn analyze_constructor(constructor: &Constructor, contract: &str) -> Vec<Warning> {
    let base_args = constructor.base_args.as_deref().unwrap_or_default();
    analyze_body(&constructor.body, base_args, contract, "constructor")
}

fn analyze_body(body: &[Statement], extra: &[Expression], contract: &str, function: &str) -> Vec<Warning> {
    let mut warnings = Vec::new();
    unreachable_code(body, contract, function, &mut warnings);
    unused_locals(body, extra, contract, function, &mut warnings);
    warnings
}

fn unreachable_code(block: &[Statement], contract: &str, function: &str, out: &mut Vec<Warning>) {
    if let Some(position) = block.iter().position(Statement::is_terminator) {
        if let Some(first) = block.get(position + 1) {
            out.push(Warning::unreachable(contract, function, statement_name(first)));
        }
    }
    for stmt in block {
        for nested in stmt.blocks() {
            unreachable_code(nested, contract, function, out);
        }
    }
}

fn unused_locals(body: &[Statement], extra: &[Expression], contract: &str, function: &str, out: &mut Vec<Warning>) {
    let mut locals = Locals::default();
    locals.scopes.push(Vec::new());
    for stmt in body {
        locals.statement(stmt);
    }
    for expr in extra {
        locals.resolve(expr);
    }
    for local in locals.declared {
        if !local.used {
            out.push(Warning::unused(contract, function, local.name));
        }
    }
}

struct Local<'a> {
    name: &'a str,
    used: bool,
}

/// Block-scoped declarations. A name resolves to the innermost visible
/// declaration, so same-named locals in sibling blocks are tracked apart.
#[derive(Default)]
struct Locals<'a> {
    declared: Vec<Local<'a>>,
    /// Indices into `declared`, innermost scope last.
    scopes: Vec<Vec<usize>>,
}

impl<'a> Locals<'a> {
    fn declare(&mut self, name: &'a str, used: bool) {
        let id = self.declared.len();
        self.declared.push(Local { name, used });
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(id);
        }
    }

    fn resolve(&mut self, expr: &Expression) {
        expr.walk(&mut |node| {
            let Expression::Identifier(name) = node else {
                return;
            };
            let found = self
                .scopes
                .iter()
                .rev()
                .flat_map(|scope| scope.iter().rev())
                .copied()
                .find(|&id| self.declared[id].name == name.as_str());
            if let Some(id) = found {
                self.declared[id].used = true;
            }
        });
    }

    fn block(&mut self, binding: Option<&'a str>, body: &'a [Statement]) {
        self.scopes.push(Vec::new());
        if let Some(name) = binding {
            self.declare(name, false);
        }
        for stmt in body {
            self.statement(stmt);
        }
        self.scopes.pop();
    }

    fn statement(&mut self, stmt: &'a Statement) {
        match stmt {
            Statement::VarDecl(decl) => {
                if let Some(initializer) = &decl.initializer {
                    self.resolve(initializer);
                }
                // Parameter defaults are never reported.
                self.declare(&decl.name, decl.from_parameter);
            }
            Statement::For {
                init,
                condition,
                update,
                body,
            } => {
                self.scopes.push(Vec::new());
                if let Some(init) = init {
                    self.statement(init);
                }
                for expr in condition.iter().chain(update.iter()) {
                    self.resolve(expr);
                }
                self.block(None, body);
                self.scopes.pop();
            }
            // Cases share the switch block.
            Statement::Switch { cases, .. } => {
                for expr in stmt.expressions() {
                    self.resolve(expr);
                }
                self.scopes.push(Vec::new());
                for case in cases {
                    for nested in &case.body {
                        self.statement(nested);
                    }
                }
                self.scopes.pop();
            }
            Statement::Try(try_catch) => {
                self.resolve(&try_catch.call);
                let returns = try_catch.returns.as_ref().map(|(name, _)| name.as_str());
                self.block(returns, &try_catch.body);
                self.block(try_catch.error_binding.as_deref(), &try_catch.catch_body);
            }
            _ => {
                for expr in stmt.expressions() {
                    self.resolve(expr);
                }
                for nested in stmt.blocks() {
                    self.block(None, nested);
                }
            }
        }
    }
}

fn statement_name(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::VarDecl(_) => "let",
        Statement::Return(_) => "return",
        Statement::Expr(_) => "expression",
        Statement::If { .. } => "if",
        Statement::For { .. } => "for",
        Statement::While { .. } => "while",
        Statement::DoWhile { .. } => "do",
        Statement::Switch { .. } => "switch",
        Statement::Revert(_) => "throw",
        Statement::Emit { .. } => "emit",
        Statement::Delete(_) => "delete",
        Statement::Try(_) => "try",
        Statement::Break => "break",
        Statement::Continue => "continue",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::WarningKind;
    use crate::parser::test_support::parse_one;

    fn warnings(source: &str) -> Vec<Warning> {
        analyze_contract(&parse_one(source))
    }

    fn count(warnings: &[Warning], kind: WarningKind) -> usize {
        warnings.iter().filter(|w| w.kind == kind).count()
    }

    #[test]
    fn reports_code_after_return_once_per_block() {
        let found = warnings(
            "class C { f(): number { return 1; let a = 2; let b = a; } }",
        );
        assert_eq!(count(&found, WarningKind::UnreachableCode), 1);
        assert_eq!(found[0].function, "f");
        assert!(found[0].message.contains("`let`"));
    }

    #[test]
    fn checks_nested_blocks_independently() {
        let found = warnings(
            "class C { f(x: number): void { if (x > 1) { throw new Error(\"no\"); x = 2; } while (x > 0) { break; x -= 1; } } }",
        );
        assert_eq!(count(&found, WarningKind::UnreachableCode), 2);
    }

    #[test]
    fn terminators_at_the_end_are_fine() {
        let found = warnings(
            "class C { f(x: number): number { for (let i = 0; i < x; i++) { if (i == 3) { continue; } } return x; } }",
        );
        assert!(found.is_empty(), "{found:?}");
    }

    #[test]
    fn reports_unused_locals_but_not_parameters() {
        let found = warnings(
            "class C { total: number = 0; constructor(start: number = 5) { let unused = 1; } f(x: number): void { let y = x; let z = 2; this.total = z; } }",
        );
        let unused: Vec<_> = found
            .iter()
            .filter(|w| w.kind == WarningKind::UnusedVariable)
            .map(|w| (w.function.as_str(), w.message.as_str()))
            .collect();
        assert_eq!(
            unused,
            vec![
                ("constructor", "local variable `unused` is never used"),
                ("f", "local variable `y` is never used"),
            ]
        );
    }

    #[test]
    fn catch_bindings_count_as_locals() {
        let source = "class Other { ping(): number { return 1; } }\nclass C { other: Other = new Other(); f(): void { try { const r = this.other.ping(); } catch (e) { } } }";
        let contracts = crate::parser::test_support::parse_with(source, &[]).expect("parse");
        let found: Vec<_> = contracts.iter().flat_map(analyze_contract).collect();
        assert_eq!(count(&found, WarningKind::UnusedVariable), 2);
    }

    #[test]
    fn same_named_locals_in_sibling_blocks_are_separate() {
        let found = warnings(
            "class C { f(c: boolean): number { if (c) { let t = 1; } else { let t = 2; return t; } return 0; } }",
        );
        let unused: Vec<_> = found
            .iter()
            .filter(|w| w.kind == WarningKind::UnusedVariable)
            .map(|w| w.message.as_str())
            .collect();
        assert_eq!(unused, vec!["local variable `t` is never used"]);
    }

    #[test]
    fn inner_declarations_shadow_outer_ones() {
        let found = warnings(
            "class C { total: number = 0; f(): void { let n = 1; for (let i = 0; i < 3; i++) { let n = i; this.total += n; } } }",
        );
        assert_eq!(count(&found, WarningKind::UnusedVariable), 1);
        assert!(found.iter().any(|w| w.message == "local variable `n` is never used"));
    }
}
