//! Project-wide declaration pre-pass.
//!
//! Every source file is scanned before any class body is lowered, so a
//! file may use structs, enums, constants, free functions and classes
//! declared anywhere in the project. Collection never fails: a file or
//! declaration that cannot be read contributes nothing and is reported
//! as a [`CollectionError`]; the full parse of that file then reports the
//! real error.
//!
//! Files are visited in path order and a later declaration replaces an
//! earlier one of the same name.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::CollectionError;
use crate::hash::definition_hash;
use crate::ir::SharedRef;
use crate::lexer::{Token, lex};
use crate::parser::cursor::Cursor;
use crate::parser::decl::{Declaration, DeclarationKind, scan_declarations};
use crate::parser::{Parser, lex_error};
use crate::symbols::{
    ClassInfo, ConstantDef, DefinitionMeta, EnumDef, FunctionDef, StructDef, SymbolTable,
    type_references,
};

/// Result of the pre-pass.
#[derive(Debug, Default)]
pub struct Collection {
    pub symbols: SymbolTable,
    pub errors: Vec<CollectionError>,
}

/// Build the symbol table for a set of `(path, source)` files.
pub fn collect(files: &[(PathBuf, String)]) -> Collection {
    let mut sorted: Vec<&(PathBuf, String)> = files.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut collector = Collection::default();
    let scanned: Vec<ScannedFile<'_>> = sorted
        .into_iter()
        .filter_map(|(path, source)| collector.scan(path, source))
        .collect();

    collector.register_names(&scanned);
    collector.resolve_signatures(&scanned);
    collector.lower_constants(&scanned);
    collector.lower_functions(&scanned);

    debug!(
        structs = collector.symbols.structs.len(),
        enums = collector.symbols.enums.len(),
        constants = collector.symbols.constants.len(),
        functions = collector.symbols.functions.len(),
        classes = collector.symbols.classes.len(),
        skipped = collector.errors.len(),
        "collected shared definitions"
    );
    collector
}

/// The symbol table alone, for callers that ignore collection errors.
pub fn collect_sources(files: &[(PathBuf, String)]) -> SymbolTable {
    collect(files).symbols
}

struct ScannedFile<'a> {
    path: &'a Path,
    source: &'a str,
    tokens: Vec<Token>,
    declarations: Vec<Declaration>,
}

impl ScannedFile<'_> {
    fn meta(&self, decl: &Declaration) -> DefinitionMeta {
        DefinitionMeta {
            file: self.path.to_path_buf(),
            hash: definition_hash(decl.kind.tag(), &decl.name, decl.span.text(self.source)),
            references: BTreeSet::new(),
        }
    }

    /// The table entry was registered from this very declaration, not
    /// replaced by a later one of the same name.
    fn owns(&self, decl: &Declaration, meta: &DefinitionMeta) -> bool {
        meta.file == self.path && meta.hash == self.meta(decl).hash
    }

    fn parser<'s>(&'s self, symbols: &'s SymbolTable) -> Parser<'s> {
        Parser::new(self.source, &self.tokens, self.path, symbols)
    }

    fn skipped(&self, decl: &Declaration, message: impl Into<String>) -> CollectionError {
        CollectionError::Declaration {
            file: self.path.to_path_buf(),
            name: decl.name.clone(),
            message: message.into(),
        }
    }
}

impl Collection {
    fn skip(&mut self, error: CollectionError) {
        debug!(%error, "collection skipped a definition");
        self.errors.push(error);
    }

    fn scan<'a>(&mut self, path: &'a Path, source: &'a str) -> Option<ScannedFile<'a>> {
        let tokens = match lex(source) {
            Ok(tokens) => tokens,
            Err(err) => {
                let message = lex_error(source, path, err).to_string();
                self.skip(CollectionError::File {
                    file: path.to_path_buf(),
                    message,
                });
                return None;
            }
        };
        let declarations = {
            let mut cursor = Cursor::new(source, &tokens, path);
            scan_declarations(&mut cursor)
        };
        match declarations {
            Ok(declarations) => Some(ScannedFile {
                path,
                source,
                tokens,
                declarations,
            }),
            Err(err) => {
                self.skip(CollectionError::File {
                    file: path.to_path_buf(),
                    message: err.to_string(),
                });
                None
            }
        }
    }

    /// Make every type name known before any annotation is resolved.
    fn register_names(&mut self, scanned: &[ScannedFile<'_>]) {
        for file in scanned {
            for decl in &file.declarations {
                let meta = file.meta(decl);
                let name = decl.name.clone();
                match &decl.kind {
                    DeclarationKind::Struct(_) => {
                        let def = StructDef {
                            name: name.clone(),
                            fields: Vec::new(),
                            meta,
                        };
                        self.symbols.structs.insert(name, def);
                    }
                    DeclarationKind::Enum(members) => {
                        let def = EnumDef {
                            name: name.clone(),
                            members: members.clone(),
                            meta,
                        };
                        self.symbols.enums.insert(name, def);
                    }
                    DeclarationKind::Class(signature) => {
                        let info = ClassInfo {
                            name: name.clone(),
                            is_abstract: signature.is_abstract,
                            base: signature.base.clone(),
                            fields: BTreeMap::new(),
                            methods: BTreeMap::new(),
                            constructor: None,
                            events: BTreeMap::new(),
                            errors: BTreeMap::new(),
                            meta,
                        };
                        self.symbols.classes.insert(name, info);
                    }
                    DeclarationKind::Constant | DeclarationKind::Function => {}
                }
            }
        }
    }

    /// Struct fields, class member signatures and free-function headers.
    fn resolve_signatures(&mut self, scanned: &[ScannedFile<'_>]) {
        for file in scanned {
            for decl in &file.declarations {
                match &decl.kind {
                    DeclarationKind::Struct(fields) => {
                        let owned = self
                            .symbols
                            .structs
                            .get(&decl.name)
                            .is_some_and(|def| file.owns(decl, &def.meta));
                        if !owned {
                            continue;
                        }
                        let resolved = fields
                            .iter()
                            .map(|field| {
                                self.symbols
                                    .resolve_type(&field.ty)
                                    .map(|ty| (field.name.clone(), ty))
                            })
                            .collect::<Result<Vec<_>, _>>();
                        match resolved {
                            Ok(fields) => {
                                if let Some(def) = self.symbols.structs.get_mut(&decl.name) {
                                    let mut references = BTreeSet::new();
                                    for (_, ty) in &fields {
                                        type_references(ty, &mut references);
                                    }
                                    def.fields = fields;
                                    def.meta.references = references;
                                }
                            }
                            Err(err) => {
                                self.symbols.structs.remove(&decl.name);
                                self.skip(file.skipped(decl, err.message));
                            }
                        }
                    }
                    DeclarationKind::Class(signature) => {
                        let Some(meta) = self
                            .symbols
                            .classes
                            .get(&decl.name)
                            .filter(|info| file.owns(decl, &info.meta))
                            .map(|info| info.meta.clone())
                        else {
                            continue;
                        };
                        match self.symbols.resolve_class(&decl.name, signature, meta) {
                            Ok(mut info) => {
                                info.meta.references = class_references(&info);
                                self.symbols.classes.insert(decl.name.clone(), info);
                            }
                            Err(err) => {
                                self.symbols.classes.remove(&decl.name);
                                self.skip(file.skipped(decl, err.message));
                            }
                        }
                    }
                    DeclarationKind::Function => {
                        let result = {
                            let mut parser = file.parser(&self.symbols);
                            parser
                                .function_signature_at(decl.start)
                                .map(|function| (function, parser.take_references()))
                        };
                        match result {
                            Ok((function, references)) => {
                                let meta = DefinitionMeta {
                                    references,
                                    ..file.meta(decl)
                                };
                                self.symbols
                                    .functions
                                    .insert(decl.name.clone(), FunctionDef { function, meta });
                            }
                            Err(err) => self.skip(file.skipped(decl, err.to_string())),
                        }
                    }
                    DeclarationKind::Enum(_) | DeclarationKind::Constant => {}
                }
            }
        }
    }

    /// Constants may refer to each other in any order, so lowering repeats
    /// until a pass makes no progress.
    fn lower_constants(&mut self, scanned: &[ScannedFile<'_>]) {
        let mut pending: Vec<(&ScannedFile<'_>, &Declaration)> = scanned
            .iter()
            .flat_map(|file| {
                file.declarations
                    .iter()
                    .filter(|decl| matches!(decl.kind, DeclarationKind::Constant))
                    .map(move |decl| (file, decl))
            })
            .collect();

        while !pending.is_empty() {
            let results: Vec<_> = pending
                .iter()
                .map(|&(file, decl)| {
                    let mut parser = file.parser(&self.symbols);
                    let lowered = parser
                        .constant_at(decl.start)
                        .map(|variable| (variable, parser.take_references()));
                    (file, decl, lowered)
                })
                .collect();

            let mut failed = Vec::new();
            for (file, decl, lowered) in results {
                match lowered {
                    Ok((variable, references)) => {
                        let meta = DefinitionMeta {
                            references,
                            ..file.meta(decl)
                        };
                        self.symbols
                            .constants
                            .insert(decl.name.clone(), ConstantDef { variable, meta });
                    }
                    Err(err) => failed.push((file, decl, err)),
                }
            }

            if failed.len() == pending.len() {
                for (file, decl, err) in failed {
                    self.skip(file.skipped(decl, err.to_string()));
                }
                break;
            }
            pending = failed.into_iter().map(|(file, decl, _)| (file, decl)).collect();
        }
    }

    fn lower_functions(&mut self, scanned: &[ScannedFile<'_>]) {
        for file in scanned {
            for decl in &file.declarations {
                if !matches!(decl.kind, DeclarationKind::Function) {
                    continue;
                }
                let owned = self
                    .symbols
                    .functions
                    .get(&decl.name)
                    .is_some_and(|def| file.owns(decl, &def.meta));
                if !owned {
                    continue;
                }
                let result = {
                    let mut parser = file.parser(&self.symbols);
                    parser
                        .function_at(decl.start)
                        .map(|function| (function, parser.take_references()))
                };
                match result {
                    Ok((function, references)) => {
                        if let Some(def) = self.symbols.functions.get_mut(&decl.name) {
                            def.function = function;
                            def.meta.references = references;
                        }
                    }
                    Err(err) => {
                        self.symbols.functions.remove(&decl.name);
                        self.skip(file.skipped(decl, err.to_string()));
                    }
                }
            }
        }
    }
}

/// Shared definitions named in a class's member signatures.
fn class_references(info: &ClassInfo) -> BTreeSet<SharedRef> {
    let mut references = BTreeSet::new();
    if let Some(base) = &info.base {
        references.insert(SharedRef::Class(base.clone()));
    }
    for field in info.fields.values() {
        type_references(&field.ty, &mut references);
    }
    for method in info.methods.values().chain(info.constructor.iter()) {
        for param in &method.params {
            type_references(param, &mut references);
        }
        type_references(&method.returns, &mut references);
    }
    for field in info.events.values().chain(info.errors.values()).flatten() {
        type_references(&field.ty, &mut references);
    }
    references.remove(&SharedRef::Class(info.name.clone()));
    references
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn files(sources: &[(&str, &str)]) -> Vec<(PathBuf, String)> {
        sources
            .iter()
            .map(|(path, text)| (PathBuf::from(path), text.to_string()))
            .collect()
    }

    #[test]
    fn collects_definitions_across_files() {
        let collection = collect(&files(&[
            ("contracts/types.ts", "export interface Order { owner: address; status: Status }"),
            ("contracts/enums.ts", "export enum Status { Open, Closed }"),
            (
                "contracts/shop.ts",
                "const FEE: number = BASE * 2;\nconst BASE = 5;\nfunction fee(x: number): number { return x * FEE; }\nclass Shop { orders: Order[] = []; }",
            ),
        ]));
        assert!(collection.errors.is_empty(), "{:?}", collection.errors);
        let symbols = collection.symbols;

        let order = &symbols.structs["Order"];
        assert_eq!(order.fields[1].1, Type::Enum("Status".to_string()));
        assert!(order.meta.references.contains(&SharedRef::Enum("Status".to_string())));

        assert_eq!(symbols.constants["FEE"].variable.ty, Type::UINT256);
        assert!(
            symbols.constants["FEE"]
                .meta
                .references
                .contains(&SharedRef::Constant("BASE".to_string()))
        );
        assert!(
            symbols.functions["fee"]
                .meta
                .references
                .contains(&SharedRef::Constant("FEE".to_string()))
        );
        assert!(
            symbols.classes["Shop"]
                .meta
                .references
                .contains(&SharedRef::Struct("Order".to_string()))
        );
    }

    #[test]
    fn later_files_win_name_collisions() {
        let collection = collect(&files(&[
            ("b.ts", "interface Point { x: number; y: number }"),
            ("a.ts", "interface Point { x: number }"),
        ]));
        let point = &collection.symbols.structs["Point"];
        assert_eq!(point.fields.len(), 2);
        assert_eq!(point.meta.file, PathBuf::from("b.ts"));
    }

    #[test]
    fn broken_files_contribute_nothing() {
        let collection = collect(&files(&[
            ("good.ts", "enum Side { Buy, Sell }"),
            ("bad.ts", "interface Broken { x: number ; @ }"),
            ("worse.ts", "class A { f(x) {} }"),
        ]));
        assert!(collection.symbols.enums.contains_key("Side"));
        assert!(!collection.symbols.structs.contains_key("Broken"));
        assert!(!collection.symbols.classes.contains_key("A"));
        assert_eq!(collection.errors.len(), 2);
    }

    #[test]
    fn skips_only_the_declaration_that_fails() {
        let collection = collect(&files(&[(
            "mixed.ts",
            "interface Bad { x: Missing }\ninterface Good { x: number }",
        )]));
        assert!(collection.symbols.structs.contains_key("Good"));
        assert!(!collection.symbols.structs.contains_key("Bad"));
        assert!(matches!(
            &collection.errors[0],
            CollectionError::Declaration { name, .. } if name == "Bad"
        ));
    }

    #[test]
    fn allows_recursive_free_functions() {
        let symbols = collect_sources(&files(&[(
            "math.ts",
            "function fact(n: number): number { if (n == 0) { return 1; } return n * fact(n - 1); }",
        )]));
        let fact = &symbols.functions["fact"];
        assert_eq!(fact.function.body.len(), 2);
        assert!(fact.meta.references.contains(&SharedRef::Function("fact".to_string())));
    }
}
