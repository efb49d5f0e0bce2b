//! Core of the Skittles toolchain: TypeScript classes in, Solidity out.
//!
//! The pipeline is roughly:
//!
//!   contracts/**/*.ts
//!     -> collector  (project-wide shared definitions)
//!     -> lexer      (tokens)
//!     -> parser     (AST, then typed contract IR)
//!     -> analyzer   (warnings)
//!     -> codegen    (Solidity text per contract)
//!     -> external   (solc: ABI + bytecode)
//!
//! with the build cache deciding which files go through it at all.
//! Higher-level tools (the CLI, editor integrations) should depend on
//! this crate rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: types, IR, shared symbols
// ---------------------------------------------------------------------

pub mod types;
pub mod ir;
pub mod symbols;
pub mod builtins;
pub mod hash;
pub mod collector;
pub mod analyzer;

// ---------------------------------------------------------------------
// Back-end: code generation
// ---------------------------------------------------------------------

pub mod codegen;

// ---------------------------------------------------------------------
// Project plumbing: sources, config, cache, external tools, batches
// ---------------------------------------------------------------------

pub mod sources;
pub mod config;
pub mod cache;
pub mod external;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use cache::{BuildArtifact, FileState};
pub use codegen::{generate, generate_unit};
pub use compiler::{CompileResult, Compiler, compile};
pub use config::SkittlesConfig;
pub use diagnostic::Warning;
pub use error::CoreError;
