//! Processes the pipeline delegates to: the Solidity compiler and the
//! TypeScript checker.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::OptimizerConfig;

/// One contract handed to the bytecode compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileInput {
    pub name: String,
    pub solidity: String,
}

/// What the bytecode compiler produced for one contract. A non-empty
/// `errors` fails the contract.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledContract {
    pub abi: serde_json::Value,
    pub bytecode: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub trait BytecodeCompiler: Send + Sync {
    /// Compile a batch. Every input name has an entry in the result.
    fn compile(&self, inputs: &[CompileInput], optimizer: &OptimizerConfig) -> BTreeMap<String, CompiledContract>;
}

pub trait TypeChecker: Send + Sync {
    fn check(&self, root: &Path) -> Result<(), Vec<String>>;
}

fn failed_batch(inputs: &[CompileInput], message: &str) -> BTreeMap<String, CompiledContract> {
    inputs
        .iter()
        .map(|input| {
            let compiled = CompiledContract {
                errors: vec![message.to_string()],
                ..CompiledContract::default()
            };
            (input.name.clone(), compiled)
        })
        .collect()
}

// ---------------------------------------------------------------------
// solc
// ---------------------------------------------------------------------

/// Runs `solc --standard-json` once per batch.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    pub binary: PathBuf,
}

impl Default for SolcCompiler {
    fn default() -> Self {
        SolcCompiler {
            binary: PathBuf::from("solc"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SolcOutput {
    #[serde(default)]
    errors: Vec<SolcDiagnostic>,
    #[serde(default)]
    contracts: BTreeMap<String, BTreeMap<String, SolcContract>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolcDiagnostic {
    severity: String,
    #[serde(default)]
    formatted_message: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    source_location: Option<SolcLocation>,
}

#[derive(Debug, Deserialize)]
struct SolcLocation {
    file: String,
}

#[derive(Debug, Deserialize)]
struct SolcContract {
    #[serde(default)]
    abi: serde_json::Value,
    #[serde(default)]
    evm: Option<SolcEvm>,
}

#[derive(Debug, Deserialize)]
struct SolcEvm {
    bytecode: SolcBytecode,
}

#[derive(Debug, Deserialize)]
struct SolcBytecode {
    object: String,
}

fn source_name(contract: &str) -> String {
    format!("{contract}.sol")
}

impl SolcCompiler {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        SolcCompiler {
            binary: binary.into(),
        }
    }

    fn standard_input(inputs: &[CompileInput], optimizer: &OptimizerConfig) -> serde_json::Value {
        let sources: serde_json::Map<String, serde_json::Value> = inputs
            .iter()
            .map(|input| (source_name(&input.name), json!({ "content": input.solidity })))
            .collect();
        json!({
            "language": "Solidity",
            "sources": sources,
            "settings": {
                "optimizer": { "enabled": optimizer.enabled, "runs": optimizer.runs },
                "outputSelection": { "*": { "*": ["abi", "evm.bytecode.object"] } }
            }
        })
    }

    fn run(&self, input: &str) -> Result<String, String> {
        let mut child = Command::new(&self.binary)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| format!("failed to start {}: {err}", self.binary.display()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .map_err(|err| format!("failed to write to solc: {err}"))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|err| format!("solc did not finish: {err}"))?;
        if !output.status.success() {
            return Err(format!(
                "solc exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        String::from_utf8(output.stdout).map_err(|err| format!("solc wrote invalid UTF-8: {err}"))
    }

    fn distribute(inputs: &[CompileInput], output: SolcOutput) -> BTreeMap<String, CompiledContract> {
        let mut results: BTreeMap<String, CompiledContract> = inputs
            .iter()
            .map(|input| (input.name.clone(), CompiledContract::default()))
            .collect();

        for diagnostic in output.errors {
            let text = diagnostic
                .formatted_message
                .unwrap_or(diagnostic.message);
            let targets: Vec<String> = match &diagnostic.source_location {
                Some(location) => location
                    .file
                    .strip_suffix(".sol")
                    .map(|name| vec![name.to_string()])
                    .unwrap_or_default(),
                None => results.keys().cloned().collect(),
            };
            let is_error = diagnostic.severity == "error";
            for target in targets {
                if let Some(result) = results.get_mut(&target) {
                    if is_error {
                        result.errors.push(text.clone());
                    } else {
                        result.warnings.push(text.clone());
                    }
                }
            }
        }

        for (name, result) in results.iter_mut() {
            let compiled = output
                .contracts
                .get(&source_name(name))
                .and_then(|contracts| contracts.get(name));
            match compiled {
                Some(contract) => {
                    result.abi = contract.abi.clone();
                    if let Some(evm) = &contract.evm {
                        result.bytecode = evm.bytecode.object.clone();
                    }
                }
                None if result.errors.is_empty() => {
                    result.errors.push(format!("solc produced no output for {name}"));
                }
                None => {}
            }
        }
        results
    }
}

impl BytecodeCompiler for SolcCompiler {
    fn compile(&self, inputs: &[CompileInput], optimizer: &OptimizerConfig) -> BTreeMap<String, CompiledContract> {
        if inputs.is_empty() {
            return BTreeMap::new();
        }
        debug!(contracts = inputs.len(), binary = %self.binary.display(), "invoking solc");
        let input = Self::standard_input(inputs, optimizer).to_string();
        let stdout = match self.run(&input) {
            Ok(stdout) => stdout,
            Err(message) => return failed_batch(inputs, &message),
        };
        match serde_json::from_str::<SolcOutput>(&stdout) {
            Ok(output) => Self::distribute(inputs, output),
            Err(err) => failed_batch(inputs, &format!("unreadable solc output: {err}")),
        }
    }
}

// ---------------------------------------------------------------------
// tsc
// ---------------------------------------------------------------------

/// Runs `tsc --noEmit` against the project's `tsconfig.json`. Projects
/// without one are not checked.
#[derive(Debug, Clone)]
pub struct TscTypeChecker {
    pub binary: PathBuf,
}

impl Default for TscTypeChecker {
    fn default() -> Self {
        TscTypeChecker {
            binary: PathBuf::from("tsc"),
        }
    }
}

impl TypeChecker for TscTypeChecker {
    fn check(&self, root: &Path) -> Result<(), Vec<String>> {
        let tsconfig = root.join("tsconfig.json");
        if !tsconfig.is_file() {
            debug!(root = %root.display(), "no tsconfig.json, skipping type check");
            return Ok(());
        }
        let output = Command::new(&self.binary)
            .arg("--noEmit")
            .arg("-p")
            .arg(&tsconfig)
            .current_dir(root)
            .output()
            .map_err(|err| vec![format!("failed to start {}: {err}", self.binary.display())])?;
        if output.status.success() {
            return Ok(());
        }
        let messages: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if messages.is_empty() {
            Err(vec![format!("tsc exited with {}", output.status)])
        } else {
            Err(messages)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str) -> CompileInput {
        CompileInput {
            name: name.to_string(),
            solidity: format!("contract {name} {{}}"),
        }
    }

    #[test]
    fn standard_input_names_sources_after_contracts() {
        let value = SolcCompiler::standard_input(
            &[input("Token")],
            &OptimizerConfig { enabled: true, runs: 500 },
        );
        assert_eq!(value["sources"]["Token.sol"]["content"], "contract Token {}");
        assert_eq!(value["settings"]["optimizer"]["runs"], 500);
    }

    #[test]
    fn diagnostics_are_attributed_to_their_contract() {
        let output: SolcOutput = serde_json::from_value(json!({
            "errors": [
                { "severity": "error", "message": "bad", "formattedMessage": "A.sol: bad",
                  "sourceLocation": { "file": "A.sol" } },
                { "severity": "warning", "message": "meh", "sourceLocation": { "file": "B.sol" } }
            ],
            "contracts": {
                "B.sol": { "B": { "abi": [{ "type": "function", "name": "f" }],
                                  "evm": { "bytecode": { "object": "6080" } } } }
            }
        }))
        .expect("output");
        let results = SolcCompiler::distribute(&[input("A"), input("B")], output);
        assert_eq!(results["A"].errors, vec!["A.sol: bad".to_string()]);
        assert!(results["B"].errors.is_empty());
        assert_eq!(results["B"].warnings, vec!["meh".to_string()]);
        assert_eq!(results["B"].bytecode, "6080");
        assert_eq!(results["B"].abi[0]["name"], "f");
    }

    #[test]
    fn missing_binary_fails_every_contract() {
        let compiler = SolcCompiler::new("/nonexistent/solc-binary");
        let results = compiler.compile(&[input("A"), input("B")], &OptimizerConfig::default());
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|result| !result.errors.is_empty()));
    }

    #[test]
    fn projects_without_tsconfig_skip_the_type_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checker = TscTypeChecker::default();
        assert_eq!(checker.check(dir.path()), Ok(()));
    }
}
