use std::path::PathBuf;

use thiserror::Error;

/// Any failure reported by a compilation batch.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source {}: {source}", .path.display())]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    OutputIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Bytecode(#[from] BytecodeCompilationError),
    #[error("type check failed:\n{}", .0.join("\n"))]
    TypeCheck(Vec<String>),
}

/// Fatal for one file: the file's contracts are excluded from the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}:{line}:{column}: {message}", .file.display())]
pub struct ParseError {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Fatal for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("contract {contract}: {message}")]
pub struct CodegenError {
    pub contract: String,
    pub message: String,
}

impl CodegenError {
    pub fn new(contract: impl Into<String>, message: impl Into<String>) -> Self {
        CodegenError {
            contract: contract.into(),
            message: message.into(),
        }
    }
}

/// Errors reported verbatim by the external bytecode compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bytecode compilation of {contract} failed:\n{}", .messages.join("\n"))]
pub struct BytecodeCompilationError {
    pub contract: String,
    pub messages: Vec<String>,
}

/// Non-fatal: the collector skips the offending file or declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("{}: skipped file: {message}", .file.display())]
    File { file: PathBuf, message: String },
    #[error("{}: skipped declaration `{name}`: {message}", .file.display())]
    Declaration {
        file: PathBuf,
        name: String,
        message: String,
    },
}

/// Recovered automatically by treating every file as a cache miss.
#[derive(Debug, Error)]
pub enum CacheCorruptionError {
    #[error("cache document could not be read: {0}")]
    Unreadable(#[from] std::io::Error),
    #[error("cache document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("cache document has version {found:?}, expected {expected:?}")]
    VersionMismatch { found: String, expected: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
