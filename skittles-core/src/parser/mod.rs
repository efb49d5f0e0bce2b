//! # Contract parser
//!
//! Turns one source file into contract IR. Parsing runs in two layers:
//!
//! * [`decl`] scans declarations and member headers without entering
//!   bodies. The collector uses it to build the project symbol table.
//! * [`Parser`] comes back to each recorded body and lowers it, resolving
//!   every name against the symbol table and desugaring the constructs
//!   that have no direct Solidity counterpart.
//!
//! Statements use recursive descent; expressions use precedence climbing.
//! Local variable types are tracked in a scoped environment so that
//! string operators and struct literals can be lowered by type.

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::ParseError;
use crate::ir::{Contract, Expression, SharedRef, Statement};
use crate::lexer::{LexError, Token, lex};
use crate::span::{Span, line_col};
use crate::symbols::{ClassInfo, FieldInfo, MethodSig, ResolveError, SymbolTable, type_references};
use crate::types::Type;

pub mod annotation;
mod class;
pub mod cursor;
pub mod decl;
mod expr;
mod infer;
mod stmt;

use cursor::Cursor;
use decl::{DeclarationKind, scan_declarations};
use infer::TypeEnv;

/// Parse a whole file into the contracts it declares.
///
/// Shared declarations (structs, enums, constants, free functions) are
/// validated here too, so a broken shared declaration fails its file.
pub fn parse_file(source: &str, file: &Path, symbols: &SymbolTable) -> Result<Vec<Contract>, ParseError> {
    let tokens = lex(source).map_err(|err| lex_error(source, file, err))?;
    let mut parser = Parser::new(source, &tokens, file, symbols);
    let declarations = parser.declarations()?;

    let mut contracts: Vec<Contract> = Vec::new();
    for decl in &declarations {
        match &decl.kind {
            DeclarationKind::Struct(fields) => {
                for field in fields {
                    parser.resolve(&field.ty)?;
                }
            }
            DeclarationKind::Enum(_) => {}
            DeclarationKind::Constant => {
                parser.constant_at(decl.start)?;
            }
            DeclarationKind::Function => {
                parser.function_at(decl.start)?;
            }
            DeclarationKind::Class(signature) => {
                if contracts.iter().any(|c| c.name == decl.name) {
                    return Err(parser.cursor.error_at(
                        decl.span,
                        &format!("class `{}` is declared twice in this file", decl.name),
                    ));
                }
                contracts.push(parser.lower_class(decl, signature)?);
            }
        }
    }
    Ok(contracts)
}

pub fn lex_error(source: &str, file: &Path, err: LexError) -> ParseError {
    let (line, column) = line_col(source, err.position);
    ParseError {
        file: file.to_path_buf(),
        line,
        column,
        message: err.message,
    }
}

/// What the statement parser needs to know about the enclosing function.
#[derive(Debug, Clone)]
struct FunctionContext {
    returns: Type,
    is_constructor: bool,
    base_args: Option<Vec<Expression>>,
    /// Innermost last: what a `break` inside the current position exits.
    breakable: Vec<BreakTarget>,
    temp_counter: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakTarget {
    Loop,
    Switch,
}

pub struct Parser<'a> {
    cursor: Cursor<'a>,
    symbols: &'a SymbolTable,
    env: TypeEnv,
    class: Option<ClassInfo>,
    function: Option<FunctionContext>,
    references: BTreeSet<SharedRef>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: &'a [Token], file: &'a Path, symbols: &'a SymbolTable) -> Self {
        Parser {
            cursor: Cursor::new(source, tokens, file),
            symbols,
            env: TypeEnv::default(),
            class: None,
            function: None,
            references: BTreeSet::new(),
        }
    }

    /// Rescan the file's top-level declarations from the start.
    pub fn declarations(&mut self) -> Result<Vec<decl::Declaration>, ParseError> {
        self.cursor.seek(0);
        scan_declarations(&mut self.cursor)
    }

    /// Shared definitions referenced since the last call.
    pub fn take_references(&mut self) -> BTreeSet<SharedRef> {
        std::mem::take(&mut self.references)
    }

    fn reference(&mut self, reference: SharedRef) {
        self.references.insert(reference);
    }

    fn resolve(&mut self, expr: &crate::ast::TypeExpr) -> Result<Type, ParseError> {
        let ty = self
            .symbols
            .resolve_type(expr)
            .map_err(|err| self.resolve_error(err))?;
        type_references(&ty, &mut self.references);
        Ok(ty)
    }

    fn resolve_error(&self, err: ResolveError) -> ParseError {
        self.cursor.error_at(err.span, &err.message)
    }

    fn error(&self, span: Span, message: &str) -> ParseError {
        self.cursor.error_at(span, message)
    }

    fn current_class(&self) -> Option<&str> {
        self.class.as_ref().map(|class| class.name.as_str())
    }

    fn base_class(&self) -> Option<&str> {
        self.class.as_ref().and_then(|class| class.base.as_deref())
    }

    fn field_info(&self, name: &str) -> Option<FieldInfo> {
        let class = self.class.as_ref()?;
        if let Some(field) = class.fields.get(name) {
            return Some(field.clone());
        }
        let base = class.base.as_deref()?;
        self.symbols.find_field(base, name).cloned()
    }

    fn method_sig(&self, name: &str) -> Option<MethodSig> {
        let class = self.class.as_ref()?;
        if let Some(method) = class.methods.get(name) {
            return Some(method.clone());
        }
        let base = class.base.as_deref()?;
        self.symbols.find_method(base, name).cloned()
    }

    fn base_method_sig(&self, name: &str) -> Option<MethodSig> {
        let base = self.base_class()?;
        self.symbols.find_method(base, name).cloned()
    }

    fn event_fields(&self, name: &str) -> Option<Vec<crate::ir::Field>> {
        let class = self.class.as_ref()?;
        if let Some(fields) = class.events.get(name) {
            return Some(fields.clone());
        }
        let base = class.base.as_deref()?;
        self.symbols.find_event(base, name).map(<[_]>::to_vec)
    }

    fn error_fields(&self, name: &str) -> Option<Vec<crate::ir::Field>> {
        let class = self.class.as_ref()?;
        if let Some(fields) = class.errors.get(name) {
            return Some(fields.clone());
        }
        let base = class.base.as_deref()?;
        self.symbols.find_error(base, name).map(<[_]>::to_vec)
    }

    fn function_mut(&mut self) -> Option<&mut FunctionContext> {
        self.function.as_mut()
    }

    /// Fresh compiler-introduced local name.
    fn temp_name(&mut self, prefix: &str) -> String {
        let counter = match self.function.as_mut() {
            Some(function) => {
                function.temp_counter += 1;
                function.temp_counter
            }
            None => 0,
        };
        format!("__{prefix}{counter}")
    }

    /// Accept `;`, or nothing before `}`, end of file or a line break.
    fn consume_semi(&mut self) -> Result<(), ParseError> {
        use crate::lexer::TokenKind;
        if self.cursor.match_token(TokenKind::Semi) {
            return Ok(());
        }
        if matches!(self.cursor.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            return Ok(());
        }
        let gap = Span::new(self.cursor.previous().span.end, self.cursor.peek().span.start);
        if gap.text(self.cursor.source()).contains('\n') {
            return Ok(());
        }
        Err(self.cursor.error_at_current("expected `;`"))
    }
}

/// The block cannot complete normally through its last statement.
fn ends_with_terminator(body: &[Statement]) -> bool {
    body.last().is_some_and(Statement::is_terminator)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    use crate::collector::collect_sources;
    use crate::error::ParseError;
    use crate::ir::Contract;
    use crate::symbols::SymbolTable;

    pub fn symbols_for(sources: &[(&str, &str)]) -> SymbolTable {
        let files: Vec<(PathBuf, String)> = sources
            .iter()
            .map(|(path, text)| (PathBuf::from(path), text.to_string()))
            .collect();
        collect_sources(&files)
    }

    /// Parse `source` as `main.ts` alongside any extra project files.
    pub fn parse_with(source: &str, extra: &[(&str, &str)]) -> Result<Vec<Contract>, ParseError> {
        let mut files = extra.to_vec();
        files.push(("main.ts", source));
        let symbols = symbols_for(&files);
        super::parse_file(source, Path::new("main.ts"), &symbols)
    }

    pub fn parse_one(source: &str) -> Contract {
        let mut contracts = parse_with(source, &[]).expect("parse");
        assert_eq!(contracts.len(), 1, "expected a single contract");
        contracts.remove(0)
    }
}
