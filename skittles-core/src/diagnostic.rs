//! Non-fatal findings reported alongside a successful compilation.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    UnreachableCode,
    UnusedVariable,
    /// Passed through from the bytecode compiler.
    Compiler,
}

impl WarningKind {
    pub fn code(self) -> &'static str {
        match self {
            WarningKind::UnreachableCode => "unreachable-code",
            WarningKind::UnusedVariable => "unused-variable",
            WarningKind::Compiler => "solc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub contract: String,
    /// Enclosing function, `constructor`, or empty for whole-contract findings.
    pub function: String,
    pub message: String,
}

impl Warning {
    /// `statement` names the first statement that can never run.
    pub fn unreachable(contract: &str, function: &str, statement: &str) -> Self {
        Warning {
            kind: WarningKind::UnreachableCode,
            contract: contract.to_string(),
            function: function.to_string(),
            message: format!("unreachable code: `{statement}` statement follows a terminator"),
        }
    }

    pub fn unused(contract: &str, function: &str, variable: &str) -> Self {
        Warning {
            kind: WarningKind::UnusedVariable,
            contract: contract.to_string(),
            function: function.to_string(),
            message: format!("local variable `{variable}` is never used"),
        }
    }

    pub fn compiler(contract: &str, message: &str) -> Self {
        Warning {
            kind: WarningKind::Compiler,
            contract: contract.to_string(),
            function: String::new(),
            message: message.trim_end().to_string(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "warning[{}]: {}", self.kind.code(), self.contract)?;
        if !self.function.is_empty() {
            write!(f, ".{}", self.function)?;
        }
        write!(f, ": {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_code_and_location() {
        let warning = Warning::unused("Token", "transfer", "tmp");
        assert_eq!(
            warning.to_string(),
            "warning[unused-variable]: Token.transfer: local variable `tmp` is never used"
        );
    }

    #[test]
    fn compiler_warnings_name_only_the_contract() {
        let warning = Warning::compiler("Token", "Unused function parameter.\n");
        assert_eq!(warning.to_string(), "warning[solc]: Token: Unused function parameter.");
    }
}
