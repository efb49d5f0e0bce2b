//! # Solidity code generation
//!
//! A compilation unit is one output file: the contracts that must be
//! emitted together (a contract, its bases and any contract it creates or
//! stores) plus every shared definition they transitively reference.
//!
//! Generation runs in three steps:
//!
//! 1. [`Unit::new`] orders the contracts bases-first and checks the
//!    inheritance rules that Solidity would otherwise reject with a less
//!    helpful message.
//! 2. [`mutability::infer`] computes `pure`/`view`/`payable` for every
//!    function in the unit.
//! 3. [`render`] prints the file.
//!
//! Generation is a pure function of the IR and the symbol table.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::CodegenError;
use crate::ir::{Contract, Expression, Field, Function, Mutability, SharedRef, Variable, Visibility};
use crate::symbols::SymbolTable;

mod mutability;
mod render;

pub use mutability::StateMutability;

const HEADER: &str = "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.20;\n";

/// Solidity source for a single contract with no bases.
pub fn generate(contract: &Contract, symbols: &SymbolTable) -> Result<String, CodegenError> {
    generate_unit(&[contract], symbols)
}

/// Solidity source for a set of contracts emitted into one file.
pub fn generate_unit(contracts: &[&Contract], symbols: &SymbolTable) -> Result<String, CodegenError> {
    let unit = Unit::new(contracts, symbols)?;
    let mutability = mutability::infer(&unit);
    let source = render::render_unit(&unit, &mutability);
    debug!(
        contracts = unit.contracts.len(),
        shared = unit.shared.len(),
        bytes = source.len(),
        "generated solidity unit"
    );
    Ok(source)
}

/// Index of a function inside a [`Unit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum FunctionRef {
    Method { contract: usize, index: usize },
    Free(usize),
}

/// Validated, ordered input of one generated file.
pub(crate) struct Unit<'a> {
    /// Bases before the contracts that extend them.
    pub contracts: Vec<&'a Contract>,
    pub symbols: &'a SymbolTable,
    /// Shared definitions referenced anywhere in the unit.
    pub shared: BTreeSet<SharedRef>,
    pub free_functions: Vec<&'a Function>,
    pub errors: Vec<(String, Vec<Field>)>,
    /// Methods redefined by a derived contract in this unit.
    pub overridden: BTreeSet<FunctionRef>,
    /// Methods that redefine a base method.
    pub overriding: BTreeSet<FunctionRef>,
}

impl<'a> Unit<'a> {
    pub fn new(contracts: &[&'a Contract], symbols: &'a SymbolTable) -> Result<Self, CodegenError> {
        let ordered = order_bases_first(contracts)?;
        let mut unit = Unit {
            contracts: ordered,
            symbols,
            shared: BTreeSet::new(),
            free_functions: Vec::new(),
            errors: Vec::new(),
            overridden: BTreeSet::new(),
            overriding: BTreeSet::new(),
        };
        unit.check_fields()?;
        unit.link_overrides()?;
        unit.collect_shared()?;
        unit.collect_errors()?;
        Ok(unit)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.contracts.iter().position(|c| c.name == name)
    }

    /// `contract` followed by its bases, nearest first.
    pub fn chain(&self, contract: usize) -> Vec<usize> {
        let mut chain = vec![contract];
        let mut current = contract;
        while let Some(base) = self.contracts[current].inherits.first() {
            match self.position(base) {
                Some(next) if !chain.contains(&next) => {
                    chain.push(next);
                    current = next;
                }
                _ => break,
            }
        }
        chain
    }

    pub fn function(&self, reference: FunctionRef) -> &'a Function {
        match reference {
            FunctionRef::Method { contract, index } => &self.contracts[contract].functions[index],
            FunctionRef::Free(index) => self.free_functions[index],
        }
    }

    /// All functions of the unit, free functions last.
    pub fn functions(&self) -> Vec<FunctionRef> {
        let mut refs = Vec::new();
        for (contract, c) in self.contracts.iter().enumerate() {
            for index in 0..c.functions.len() {
                refs.push(FunctionRef::Method { contract, index });
            }
        }
        refs.extend((0..self.free_functions.len()).map(FunctionRef::Free));
        refs
    }

    /// State variable visible from `contract` as `this.<name>`.
    pub fn state_variable(&self, contract: usize, name: &str) -> Option<&'a Variable> {
        self.chain(contract)
            .into_iter()
            .find_map(|c| self.contracts[c].variable(name))
    }

    /// Method called as `this.<name>(args)`, searching from `start` upwards.
    pub fn resolve_method(&self, start: usize, name: &str, arity: usize) -> Option<FunctionRef> {
        self.chain(start).into_iter().find_map(|contract| {
            self.contracts[contract]
                .functions
                .iter()
                .position(|f| f.name == name && f.params.len() == arity)
                .map(|index| FunctionRef::Method { contract, index })
        })
    }

    pub fn resolve_free(&self, name: &str) -> Option<FunctionRef> {
        self.free_functions
            .iter()
            .position(|f| f.name == name)
            .map(FunctionRef::Free)
    }

    /// The expression designates contract storage: a state variable, or a
    /// place reached through a storage-pointer local.
    pub fn is_storage_place(
        &self,
        contract: Option<usize>,
        expr: &Expression,
        storage_locals: &BTreeSet<String>,
    ) -> bool {
        match expr.access_root() {
            root @ Expression::Property { .. } => match (contract, root.this_member_name()) {
                (Some(contract), Some(name)) => self
                    .state_variable(contract, name)
                    .is_some_and(|v| v.mutability != Mutability::Constant),
                _ => false,
            },
            Expression::Identifier(name) => storage_locals.contains(name),
            _ => false,
        }
    }

    fn check_fields(&self) -> Result<(), CodegenError> {
        for (index, contract) in self.contracts.iter().enumerate() {
            for base in self.chain(index).into_iter().skip(1) {
                let base = self.contracts[base];
                if let Some(field) = contract.variables.iter().find(|v| base.variable(&v.name).is_some()) {
                    return Err(CodegenError::new(
                        &contract.name,
                        format!(
                            "state variable `{}` shadows a variable of base contract `{}`",
                            field.name, base.name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn link_overrides(&mut self) -> Result<(), CodegenError> {
        for (index, contract) in self.contracts.iter().enumerate() {
            for (position, function) in contract.functions.iter().enumerate() {
                let mut matched = false;
                for base in self.chain(index).into_iter().skip(1) {
                    let found = self.contracts[base].functions.iter().position(|f| {
                        f.visibility != Visibility::Private && f.same_signature(function)
                    });
                    if let Some(found) = found {
                        matched = true;
                        self.overridden.insert(FunctionRef::Method {
                            contract: base,
                            index: found,
                        });
                    }
                }
                if matched {
                    self.overriding.insert(FunctionRef::Method {
                        contract: index,
                        index: position,
                    });
                } else if function.is_override {
                    return Err(CodegenError::new(
                        &contract.name,
                        format!(
                            "method `{}` is marked override but no base method has the same signature",
                            function.name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn collect_shared(&mut self) -> Result<(), CodegenError> {
        let roots: Vec<SharedRef> = self
            .contracts
            .iter()
            .flat_map(|c| c.references.iter().cloned())
            .collect();
        let shared = self.symbols.closure(roots.iter());
        for reference in &shared {
            let owner = self
                .contracts
                .iter()
                .find(|c| c.references.contains(reference))
                .map_or_else(String::new, |c| c.name.clone());
            match reference {
                SharedRef::Class(name) => {
                    if self.position(name).is_none() {
                        return Err(CodegenError::new(
                            owner,
                            format!("contract `{name}` is used but not part of this compilation unit"),
                        ));
                    }
                }
                SharedRef::Function(name) => match self.symbols.functions.get(name) {
                    Some(def) => self.free_functions.push(&def.function),
                    None => return Err(missing(owner, reference)),
                },
                _ => {
                    if self.symbols.meta(reference).is_none() {
                        return Err(missing(owner, reference));
                    }
                }
            }
        }
        self.shared = shared;
        Ok(())
    }

    fn collect_errors(&mut self) -> Result<(), CodegenError> {
        let mut seen: BTreeMap<&str, &Vec<Field>> = BTreeMap::new();
        for contract in &self.contracts {
            for error in &contract.errors {
                match seen.get(error.name.as_str()) {
                    Some(fields) => {
                        let same = fields.len() == error.fields.len()
                            && fields.iter().zip(&error.fields).all(|(a, b)| a.ty == b.ty);
                        if !same {
                            return Err(CodegenError::new(
                                &contract.name,
                                format!("custom error `{}` is declared with conflicting parameters", error.name),
                            ));
                        }
                    }
                    None => {
                        seen.insert(&error.name, &error.fields);
                        self.errors.push((error.name.clone(), error.fields.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

fn missing(owner: String, reference: &SharedRef) -> CodegenError {
    CodegenError::new(owner, format!("shared definition `{}` is not available", reference.key()))
}

/// Stable topological order: every base precedes its derived contracts,
/// otherwise the input order is kept.
fn order_bases_first<'a>(contracts: &[&'a Contract]) -> Result<Vec<&'a Contract>, CodegenError> {
    let by_name: BTreeMap<&str, &'a Contract> = contracts.iter().map(|c| (c.name.as_str(), *c)).collect();
    if by_name.len() != contracts.len() {
        let duplicate = contracts
            .iter()
            .find(|c| contracts.iter().filter(|o| o.name == c.name).count() > 1)
            .map_or_else(String::new, |c| c.name.clone());
        return Err(CodegenError::new(duplicate, "contract is declared more than once in this unit"));
    }

    let mut ordered: Vec<&'a Contract> = Vec::new();
    let mut visiting: Vec<&str> = Vec::new();
    for &contract in contracts {
        visit(contract, &by_name, &mut visiting, &mut ordered)?;
    }
    Ok(ordered)
}

fn visit<'a>(
    contract: &'a Contract,
    by_name: &BTreeMap<&str, &'a Contract>,
    visiting: &mut Vec<&'a str>,
    ordered: &mut Vec<&'a Contract>,
) -> Result<(), CodegenError> {
    if ordered.iter().any(|c| c.name == contract.name) {
        return Ok(());
    }
    if visiting.contains(&contract.name.as_str()) {
        return Err(CodegenError::new(&contract.name, "inheritance cycle"));
    }
    visiting.push(&contract.name);
    for base in &contract.inherits {
        let Some(&base_contract) = by_name.get(base.as_str()) else {
            return Err(CodegenError::new(
                &contract.name,
                format!("base contract `{base}` is not available"),
            ));
        };
        visit(base_contract, by_name, visiting, ordered)?;
    }
    visiting.pop();
    ordered.push(contract);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_support::{parse_with, symbols_for};

    fn unit_source(source: &str) -> Result<String, CodegenError> {
        let contracts = parse_with(source, &[]).expect("parse");
        let symbols = symbols_for(&[("main.ts", source)]);
        let refs: Vec<&Contract> = contracts.iter().collect();
        generate_unit(&refs, &symbols)
    }

    #[test]
    fn emits_header_and_bases_first() {
        let source = "class Child extends Base { g(): number { return 2; } }\nclass Base { f(): number { return 1; } }";
        let contracts = parse_with(source, &[]).expect("parse");
        let symbols = symbols_for(&[("main.ts", source)]);
        let refs: Vec<&Contract> = contracts.iter().collect();
        let out = generate_unit(&refs, &symbols).expect("generate");
        assert!(out.starts_with(HEADER));
        let base = out.find("contract Base").expect("base");
        let child = out.find("contract Child is Base").expect("child");
        assert!(base < child);
    }

    #[test]
    fn missing_base_is_an_error() {
        let source = "class Base { }\nclass Child extends Base { }";
        let contracts = parse_with(source, &[]).expect("parse");
        let symbols = symbols_for(&[("main.ts", source)]);
        let err = generate(&contracts[1], &symbols).unwrap_err();
        assert_eq!(err.contract, "Child");
        assert!(err.message.contains("base contract `Base`"));
    }

    #[test]
    fn redeclared_base_field_is_an_error() {
        let err = unit_source("class Base { x: number = 1; }\nclass Child extends Base { x: number = 2; }")
            .unwrap_err();
        assert!(err.message.contains("shadows"), "{err}");
    }

    #[test]
    fn explicit_override_needs_a_base_method() {
        let err = unit_source("class Base { f(): void { } }\nclass Child extends Base { override g(): void { } }")
            .unwrap_err();
        assert!(err.message.contains("marked override"), "{err}");
    }

    #[test]
    fn overrides_mark_both_sides() {
        let out = unit_source(
            "class Base { f(x: number): number { return x; } }\nclass Child extends Base { f(x: number): number { return x + 1; } }",
        )
        .expect("generate");
        assert!(out.contains("function f(uint256 x) public pure virtual returns (uint256)"), "{out}");
        assert!(out.contains("function f(uint256 x) public pure override returns (uint256)"), "{out}");
    }

    #[test]
    fn conflicting_custom_errors_are_rejected() {
        let err = unit_source(
            "class A { Low: SkittlesError<{ have: number }>; }\nclass B { Low: SkittlesError<{ who: address }>; }",
        )
        .unwrap_err();
        assert!(err.message.contains("conflicting"), "{err}");
    }

    #[test]
    fn identical_custom_errors_are_emitted_once() {
        let out = unit_source(
            "class A { Low: SkittlesError<{ have: number }>; }\nclass B { Low: SkittlesError<{ have: number }>; }",
        )
        .expect("generate");
        assert_eq!(out.matches("error Low(uint256 have);").count(), 1, "{out}");
    }
}
