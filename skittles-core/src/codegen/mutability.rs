//! State mutability inference.
//!
//! Each function first gets the level its own body requires. Calls then
//! propagate levels to a fixpoint, and every override family is raised to
//! the loosest level among its members.

use std::collections::{BTreeMap, BTreeSet};

use crate::builtins::{self, Effect};
use crate::ir::{Expression, Function, FunctionKind, Mutability, Revert, Statement, Visibility, walk_statements};
use crate::types::Type;

use super::{FunctionRef, Unit};

/// Ordered from most to least restrictive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum StateMutability {
    #[default]
    Pure,
    View,
    NonPayable,
    Payable,
}

impl StateMutability {
    /// Keyword in a function header; non-payable has none.
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            StateMutability::Pure => Some("pure"),
            StateMutability::View => Some("view"),
            StateMutability::NonPayable => None,
            StateMutability::Payable => Some("payable"),
        }
    }
}

pub(crate) type MutabilityTable = BTreeMap<FunctionRef, StateMutability>;

pub(crate) fn infer(unit: &Unit<'_>) -> MutabilityTable {
    let functions = unit.functions();
    let scanned: Vec<(FunctionRef, BodyEffects)> = functions
        .iter()
        .map(|&reference| (reference, scan(unit, reference)))
        .collect();
    let families = families(unit, &functions);

    let mut table: MutabilityTable = scanned
        .iter()
        .map(|(reference, effects)| (*reference, effects.level))
        .collect();
    // Unimplemented in this unit: leave room for any implementation.
    for family in &families {
        let all_abstract = family.iter().all(|&r| unit.function(r).is_abstract);
        if all_abstract {
            for &member in family {
                table.insert(member, StateMutability::NonPayable);
            }
        }
    }

    loop {
        let mut changed = false;
        for (reference, effects) in &scanned {
            let mut level = table[reference];
            for callee in &effects.calls {
                let callee_level = table.get(callee).copied().unwrap_or(StateMutability::NonPayable);
                level = level.max(callee_level.min(StateMutability::NonPayable));
            }
            if level > table[reference] {
                table.insert(*reference, level);
                changed = true;
            }
        }
        for family in &families {
            let loosest = family
                .iter()
                .map(|member| table[member])
                .max()
                .unwrap_or(StateMutability::Pure);
            for member in family {
                if table[member] < loosest {
                    table.insert(*member, loosest);
                    changed = true;
                }
            }
        }
        if !changed {
            return table;
        }
    }
}

/// Methods sharing a name and parameter types along one inheritance
/// chain. A method nobody overrides forms a family of one.
fn families(unit: &Unit<'_>, functions: &[FunctionRef]) -> Vec<Vec<FunctionRef>> {
    let mut groups: BTreeMap<(usize, String, Vec<String>), Vec<FunctionRef>> = BTreeMap::new();
    for &reference in functions {
        let FunctionRef::Method { contract, .. } = reference else {
            continue;
        };
        let function = unit.function(reference);
        // The topmost ancestor declaring the same signature roots the family.
        let root = unit
            .chain(contract)
            .into_iter()
            .rev()
            .find(|&c| {
                unit.contracts[c].functions.iter().any(|f| {
                    f.same_signature(function) && (c == contract || f.visibility != Visibility::Private)
                })
            })
            .unwrap_or(contract);
        let params = function.params.iter().map(|p| p.ty.solidity_name()).collect();
        groups
            .entry((root, function.name.clone(), params))
            .or_default()
            .push(reference);
    }
    groups.into_values().collect()
}

#[derive(Debug, Default)]
struct BodyEffects {
    level: StateMutability,
    calls: BTreeSet<FunctionRef>,
}

fn scan(unit: &Unit<'_>, reference: FunctionRef) -> BodyEffects {
    let function = unit.function(reference);
    let contract = match reference {
        FunctionRef::Method { contract, .. } => Some(contract),
        FunctionRef::Free(_) => None,
    };
    let mut scanner = Scanner {
        unit,
        contract,
        // `fallback` is always external, whatever the modifiers say.
        public: function.visibility == Visibility::Public || function.kind == FunctionKind::Fallback,
        storage_locals: BTreeSet::new(),
        effects: BodyEffects::default(),
    };
    scanner.body(function);
    if function.payable || function.kind == FunctionKind::Receive {
        scanner.effects.level = StateMutability::Payable;
    }
    scanner.effects
}

struct Scanner<'u, 'a> {
    unit: &'u Unit<'a>,
    contract: Option<usize>,
    public: bool,
    storage_locals: BTreeSet<String>,
    effects: BodyEffects,
}

impl Scanner<'_, '_> {
    fn raise(&mut self, level: StateMutability) {
        self.effects.level = self.effects.level.max(level);
    }

    fn body(&mut self, function: &Function) {
        let mut statements: Vec<&Statement> = Vec::new();
        walk_statements(&function.body, &mut |stmt| statements.push(stmt));
        for stmt in statements {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::VarDecl(decl) => {
                if let Some(value) = &decl.initializer {
                    if decl.ty.is_reference()
                        && self.unit.is_storage_place(self.contract, value, &self.storage_locals)
                    {
                        self.storage_locals.insert(decl.name.clone());
                    }
                }
            }
            Statement::Emit { .. } | Statement::Revert(Revert::Custom { .. }) | Statement::Try(_) => {
                self.raise(StateMutability::NonPayable);
            }
            Statement::Delete(target) => self.write(target),
            _ => {}
        }
        for expr in stmt.expressions() {
            self.expression(expr);
        }
    }

    /// `target` is modified in place.
    fn write(&mut self, target: &Expression) {
        let through_pointer = matches!(target.access_root(), Expression::Identifier(_))
            && !matches!(target, Expression::Identifier(_));
        let is_state = target.access_root().this_member_name().is_some();
        if (is_state || through_pointer)
            && self.unit.is_storage_place(self.contract, target, &self.storage_locals)
        {
            self.raise(StateMutability::NonPayable);
        }
    }

    fn expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Identifier(name) => {
                if name == "this" {
                    self.raise(StateMutability::View);
                }
            }
            Expression::Literal(_) => {}
            Expression::Binary { left, right, .. } => {
                self.expression(left);
                self.expression(right);
            }
            Expression::Unary { op, operand } => {
                if op.is_update() {
                    self.write(operand);
                }
                self.expression(operand);
            }
            Expression::Assign { target, value, .. } => {
                self.write(target);
                self.expression(target);
                self.expression(value);
            }
            Expression::Call { callee, args } => {
                self.call(callee, args.len());
                for arg in args {
                    self.expression(arg);
                }
            }
            Expression::Property { object, property } => self.property(object, property),
            Expression::Index { object, index } => {
                self.expression(object);
                self.expression(index);
            }
            Expression::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                self.expression(condition);
                self.expression(then_value);
                self.expression(else_value);
            }
            Expression::StructLiteral { fields, .. } => {
                for (_, value) in fields {
                    self.expression(value);
                }
            }
            Expression::Tuple(items) => {
                for item in items {
                    self.expression(item);
                }
            }
            Expression::New { ty, args } => {
                if matches!(ty, Type::Contract(_)) {
                    self.raise(StateMutability::NonPayable);
                }
                for arg in args {
                    self.expression(arg);
                }
            }
        }
    }

    fn property(&mut self, object: &Expression, property: &str) {
        if let Expression::Identifier(root) = object {
            match root.as_str() {
                "this" => {
                    let reads_state = self
                        .contract
                        .and_then(|c| self.unit.state_variable(c, property))
                        .is_some_and(|v| v.mutability != Mutability::Constant);
                    if reads_state {
                        self.raise(StateMutability::View);
                    }
                    return;
                }
                "super" => return,
                _ => {}
            }
            if let Some(member) = builtins::find_member(root, property) {
                self.builtin_effect(member.effect);
                return;
            }
        }
        if matches!(property, "balance" | "code" | "codehash") {
            self.raise(StateMutability::View);
        }
        self.expression(object);
    }

    fn builtin_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Pure => {}
            Effect::View => self.raise(StateMutability::View),
            Effect::Payable if self.public => self.raise(StateMutability::Payable),
            Effect::Payable => self.raise(StateMutability::View),
        }
    }

    fn call(&mut self, callee: &Expression, arity: usize) {
        match callee {
            Expression::Identifier(name) => {
                if let Some(function) = builtins::find_function(name) {
                    self.builtin_effect(function.effect);
                } else if let Some(free) = self.unit.resolve_free(name) {
                    self.effects.calls.insert(free);
                }
            }
            Expression::Property { object, property } => match object.as_ref() {
                Expression::Identifier(root) if root == "this" => {
                    match self
                        .contract
                        .and_then(|c| self.unit.resolve_method(c, property, arity))
                    {
                        Some(method) => {
                            self.effects.calls.insert(method);
                        }
                        None => self.raise(StateMutability::NonPayable),
                    }
                }
                Expression::Identifier(root) if root == "super" => {
                    let base = self
                        .contract
                        .and_then(|c| self.unit.chain(c).get(1).copied())
                        .and_then(|base| self.unit.resolve_method(base, property, arity));
                    match base {
                        Some(method) => {
                            self.effects.calls.insert(method);
                        }
                        None => self.raise(StateMutability::NonPayable),
                    }
                }
                Expression::Identifier(root) if builtins::is_namespace(root) => {
                    if let Some(member) = builtins::find_member(root, property) {
                        self.builtin_effect(member.effect);
                    }
                }
                _ => {
                    match property.as_str() {
                        "push" | "pop" => self.write(object),
                        "staticcall" => self.raise(StateMutability::View),
                        // Any other member call leaves the contract.
                        _ => self.raise(StateMutability::NonPayable),
                    }
                    self.expression(object);
                }
            },
            other => self.expression(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::generate_unit;
    use crate::ir::Contract;
    use crate::parser::test_support::{parse_with, symbols_for};

    fn solidity(source: &str) -> String {
        let contracts = parse_with(source, &[]).expect("parse");
        let symbols = symbols_for(&[("main.ts", source)]);
        let refs: Vec<&Contract> = contracts.iter().collect();
        generate_unit(&refs, &symbols).expect("generate")
    }

    #[test]
    fn classifies_reads_writes_and_computation() {
        let out = solidity(
            "class C {\n  total: number = 0;\n  add(x: number): void { this.total += x; }\n  get(): number { return this.total; }\n  twice(x: number): number { return x * 2; }\n  who(): address { return msg.sender; }\n}",
        );
        assert!(out.contains("function add(uint256 x) public {"), "{out}");
        assert!(out.contains("function get() public view returns (uint256)"), "{out}");
        assert!(out.contains("function twice(uint256 x) public pure returns (uint256)"), "{out}");
        assert!(out.contains("function who() public view returns (address)"), "{out}");
    }

    #[test]
    fn constants_do_not_make_a_function_view() {
        let out = solidity("class C {\n  static readonly RATE: number = 3;\n  f(x: number): number { return x * this.RATE; }\n}");
        assert!(out.contains("function f(uint256 x) public pure returns (uint256)"), "{out}");
    }

    #[test]
    fn calls_propagate_to_a_fixpoint() {
        let out = solidity(
            "class C {\n  n: number = 0;\n  a(): number { return this.b(); }\n  b(): number { return this.c(); }\n  c(): number { return this.n; }\n  bump(): void { this.touch(); }\n  private touch(): void { this.n = 1; }\n}",
        );
        assert!(out.contains("function a() public view returns (uint256)"), "{out}");
        assert!(out.contains("function b() public view returns (uint256)"), "{out}");
        assert!(out.contains("function bump() public {"), "{out}");
    }

    #[test]
    fn msg_value_makes_public_functions_payable() {
        let out = solidity(
            "class C {\n  paid: number = 0;\n  deposit(): void { this.paid += msg.value; }\n  receive(): void { }\n  private peek(): number { return msg.value; }\n  @payable tip(): void { }\n}",
        );
        assert!(out.contains("function deposit() public payable {"), "{out}");
        assert!(out.contains("receive() external payable {"), "{out}");
        assert!(out.contains("function peek() private view returns (uint256)"), "{out}");
        assert!(out.contains("function tip() public payable {"), "{out}");
    }

    #[test]
    fn msg_value_makes_fallback_payable() {
        let out = solidity(
            "class C {\n  paid: number = 0;\n  fallback(): void { this.paid += msg.value; }\n}",
        );
        assert!(out.contains("fallback() external payable {"), "{out}");

        let out = solidity("class D {\n  hits: number = 0;\n  fallback(): void { this.hits += 1; }\n}");
        assert!(out.contains("fallback() external {"), "{out}");
    }

    #[test]
    fn storage_pointer_writes_are_state_changes() {
        let out = solidity(
            "interface Order { amount: number }\nclass C {\n  orders: Order[] = [];\n  settle(i: number): void { const o = this.orders[i]; o.amount = 0; }\n  copy(i: number): number { const o: Order = { amount: 1 }; o.amount = 2; return o.amount + i; }\n}",
        );
        assert!(out.contains("Order storage o = orders[i];"), "{out}");
        assert!(out.contains("function settle(uint256 i) public {"), "{out}");
        assert!(out.contains("function copy(uint256 i) public pure returns (uint256)"), "{out}");
    }

    #[test]
    fn override_families_share_the_loosest_level() {
        let out = solidity(
            "abstract class Base {\n  abstract f(): number;\n  g(): number { return 1; }\n}\nclass Child extends Base {\n  n: number = 0;\n  f(): number { return 2; }\n  g(): number { return this.n; }\n}",
        );
        assert!(out.contains("function f() public pure virtual returns (uint256);"), "{out}");
        assert!(out.contains("function f() public pure override returns (uint256)"), "{out}");
        assert!(out.contains("function g() public view virtual returns (uint256)"), "{out}");
        assert!(out.contains("function g() public view override returns (uint256)"), "{out}");
    }
}
