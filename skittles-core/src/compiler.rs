//! One compilation batch: sources in, artifacts and cache out.
//!
//! The batch runs the collector over every file, then parses, analyzes
//! and generates only the files the cache cannot answer for. Files that
//! are not misses are still parsed when a miss needs one of their
//! contracts as a base or as a referenced contract. All misses go to the
//! bytecode compiler in one call.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::analyzer::analyze_contract;
use crate::cache::{
    BuildArtifact, BuildCache, CACHE_FILE, FileState, content_hash, settings_fingerprint,
};
use crate::codegen::generate_unit;
use crate::collector::collect;
use crate::config::SkittlesConfig;
use crate::diagnostic::Warning;
use crate::error::{BytecodeCompilationError, CoreError, ParseError};
use crate::external::{
    BytecodeCompiler, CompileInput, CompiledContract, SolcCompiler, TscTypeChecker, TypeChecker,
};
use crate::ir::{Contract, SharedRef};
use crate::parser::parse_file;
use crate::sources::{SourceFile, load_sources, path_key};
use crate::symbols::SymbolTable;

/// Outcome of a batch. `success` is false whenever `errors` is non-empty,
/// but every artifact that did compile is still present.
#[derive(Debug, Default)]
pub struct CompileResult {
    pub success: bool,
    pub artifacts: Vec<BuildArtifact>,
    pub errors: Vec<CoreError>,
    pub warnings: Vec<Warning>,
    /// Final cache state of every source file, keyed by relative path.
    pub files: BTreeMap<String, FileState>,
}

pub struct Compiler {
    root: PathBuf,
    config: SkittlesConfig,
    bytecode: Box<dyn BytecodeCompiler>,
    type_checker: Box<dyn TypeChecker>,
}

/// Compile the project at `root` with `solc` and `tsc` from `PATH`.
pub fn compile(root: &Path, config: SkittlesConfig) -> CompileResult {
    Compiler::new(root, config).compile()
}

type ParsedFiles = BTreeMap<String, Result<Vec<Contract>, ParseError>>;

struct Generated {
    name: String,
    solidity: String,
}

#[derive(Default)]
struct FileOutcome {
    key: String,
    hash: String,
    generated: Vec<Generated>,
    errors: Vec<CoreError>,
    warnings: Vec<Warning>,
    dependencies: BTreeMap<String, String>,
}

impl Compiler {
    pub fn new(root: impl Into<PathBuf>, config: SkittlesConfig) -> Self {
        Compiler {
            root: root.into(),
            config,
            bytecode: Box::new(SolcCompiler::default()),
            type_checker: Box::new(TscTypeChecker::default()),
        }
    }

    pub fn with_bytecode_compiler(mut self, compiler: impl BytecodeCompiler + 'static) -> Self {
        self.bytecode = Box::new(compiler);
        self
    }

    pub fn with_type_checker(mut self, checker: impl TypeChecker + 'static) -> Self {
        self.type_checker = Box::new(checker);
        self
    }

    pub fn config(&self) -> &SkittlesConfig {
        &self.config
    }

    pub fn compile(&self) -> CompileResult {
        let mut result = CompileResult::default();
        self.run(&mut result);
        result.artifacts.sort_by(|a, b| a.contract_name.cmp(&b.contract_name));
        result.success = result.errors.is_empty();
        info!(
            artifacts = result.artifacts.len(),
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            success = result.success,
            "compilation finished"
        );
        result
    }

    fn run(&self, result: &mut CompileResult) {
        let contracts_dir = self.config.contracts_path(&self.root);
        let sources = match load_sources(&self.root, &contracts_dir) {
            Ok(sources) => sources,
            Err(err) => {
                result.errors.push(err);
                return;
            }
        };
        info!(files = sources.len(), dir = %contracts_dir.display(), "compiling sources");

        if self.config.type_check {
            if let Err(messages) = self.type_checker.check(&self.root) {
                result.errors.push(CoreError::TypeCheck(messages));
                return;
            }
        }

        let files: Vec<(PathBuf, String)> = sources
            .iter()
            .map(|source| (source.path.clone(), source.contents.clone()))
            .collect();
        let collection = collect(&files);
        let symbols = &collection.symbols;

        let output = self.config.output_path(&self.root);
        let cache_path = output.join(CACHE_FILE);
        let mut cache = BuildCache::load_or_empty(&cache_path);
        let fingerprint = settings_fingerprint(&self.config.optimizer);
        let definitions = symbols.definition_hashes();

        let mut misses: Vec<(&SourceFile, String)> = Vec::new();
        let mut keys = BTreeSet::new();
        for source in &sources {
            let key = source.key();
            let hash = content_hash(&source.contents, &fingerprint);
            cache.mark_hashed(&key);
            if cache.should_recompile(&key, &hash, &definitions) {
                misses.push((source, hash));
            } else if let Some(artifacts) = cache.artifacts(&key) {
                result.artifacts.extend(artifacts.iter().cloned());
            }
            keys.insert(key);
        }
        cache.retain_files(&keys);
        debug!(
            misses = misses.len(),
            hits = sources.len() - misses.len(),
            "classified sources"
        );

        let roots: Vec<&SourceFile> = misses.iter().map(|(source, _)| *source).collect();
        let parsed = parse_required(&sources, &roots, symbols);
        let index = contract_index(&parsed);
        let outcomes: Vec<FileOutcome> = misses
            .par_iter()
            .map(|(source, hash)| build_file(source, hash, &parsed, &index, symbols))
            .collect();

        let inputs: Vec<CompileInput> = outcomes
            .iter()
            .flat_map(|outcome| outcome.generated.iter())
            .map(|generated| CompileInput {
                name: generated.name.clone(),
                solidity: generated.solidity.clone(),
            })
            .collect();
        let compiled = if inputs.is_empty() {
            BTreeMap::new()
        } else {
            self.bytecode.compile(&inputs, &self.config.optimizer)
        };

        for outcome in outcomes {
            self.finish_file(outcome, &compiled, &mut cache, result);
        }

        if let Err(err) = write_artifacts(&output, &result.artifacts) {
            result.errors.push(err);
        }
        if let Err(source) = cache.save(&cache_path) {
            result.errors.push(CoreError::OutputIo {
                path: cache_path,
                source,
            });
        }
        result.files = cache.states().clone();
    }

    /// Attach bytecode to a file's generated contracts and update the cache.
    fn finish_file(
        &self,
        outcome: FileOutcome,
        compiled: &BTreeMap<String, CompiledContract>,
        cache: &mut BuildCache,
        result: &mut CompileResult,
    ) {
        let mut failed = !outcome.errors.is_empty();
        result.errors.extend(outcome.errors);
        result.warnings.extend(outcome.warnings);

        let mut artifacts = Vec::new();
        for generated in outcome.generated {
            let Some(contract) = compiled.get(&generated.name) else {
                failed = true;
                result.errors.push(CoreError::Bytecode(BytecodeCompilationError {
                    contract: generated.name,
                    messages: vec!["no output from the bytecode compiler".to_string()],
                }));
                continue;
            };
            result.warnings.extend(
                contract
                    .warnings
                    .iter()
                    .map(|message| Warning::compiler(&generated.name, message)),
            );
            if !contract.errors.is_empty() {
                failed = true;
                result.errors.push(CoreError::Bytecode(BytecodeCompilationError {
                    contract: generated.name,
                    messages: contract.errors.clone(),
                }));
                continue;
            }
            artifacts.push(BuildArtifact {
                contract_name: generated.name,
                abi: contract.abi.clone(),
                bytecode: contract.bytecode.trim_start_matches("0x").to_string(),
                solidity: generated.solidity,
            });
        }

        result.artifacts.extend(artifacts.iter().cloned());
        if failed {
            debug!(file = %outcome.key, "file failed");
            cache.record_failure(&outcome.key);
        } else {
            cache.record_result(&outcome.key, &outcome.hash, outcome.dependencies, artifacts);
        }
    }
}

/// Parse every miss, then every file providing a contract that a parsed
/// contract inherits from or refers to, until nothing is missing.
fn parse_required(sources: &[SourceFile], misses: &[&SourceFile], symbols: &SymbolTable) -> ParsedFiles {
    let by_key: BTreeMap<String, &SourceFile> = sources.iter().map(|s| (s.key(), s)).collect();
    let mut parsed = ParsedFiles::new();
    let mut wanted: BTreeSet<String> = misses.iter().map(|s| s.key()).collect();

    while !wanted.is_empty() {
        let round: Vec<(String, Result<Vec<Contract>, ParseError>)> = wanted
            .par_iter()
            .filter_map(|key| {
                let source = by_key.get(key)?;
                Some((key.clone(), parse_file(&source.contents, &source.path, symbols)))
            })
            .collect();
        debug!(files = round.len(), "parsed files");
        parsed.extend(round);

        wanted = missing_providers(&parsed, misses, symbols);
        wanted.retain(|key| by_key.contains_key(key));
    }
    parsed
}

fn missing_providers(parsed: &ParsedFiles, misses: &[&SourceFile], symbols: &SymbolTable) -> BTreeSet<String> {
    let index = contract_index(parsed);
    let mut wanted = BTreeSet::new();
    let mut seen = BTreeSet::new();
    let mut pending: Vec<String> = misses
        .iter()
        .filter_map(|source| parsed.get(&source.key()))
        .flat_map(|contracts| contracts.iter().flatten())
        .map(|contract| contract.name.clone())
        .collect();

    while let Some(name) = pending.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        match index.get(name.as_str()) {
            Some(contract) => pending.extend(required_contracts(contract)),
            None => {
                if let Some(class) = symbols.classes.get(&name) {
                    let key = path_key(&class.meta.file);
                    if !parsed.contains_key(&key) {
                        wanted.insert(key);
                    }
                }
            }
        }
    }
    wanted
}

fn required_contracts(contract: &Contract) -> Vec<String> {
    let referenced = contract.references.iter().filter_map(|reference| match reference {
        SharedRef::Class(name) => Some(name.clone()),
        _ => None,
    });
    contract.inherits.iter().cloned().chain(referenced).collect()
}

fn contract_index(parsed: &ParsedFiles) -> BTreeMap<&str, &Contract> {
    parsed
        .values()
        .flat_map(|contracts| contracts.iter().flatten())
        .map(|contract| (contract.name.as_str(), contract))
        .collect()
}

/// `root` followed by every contract it needs, transitively. Contracts
/// that could not be parsed are left out; code generation reports them.
fn unit_members<'a>(root: &'a Contract, index: &BTreeMap<&str, &'a Contract>) -> Vec<&'a Contract> {
    let mut members = vec![root];
    let mut seen = BTreeSet::from([root.name.clone()]);
    let mut pending = required_contracts(root);
    while let Some(name) = pending.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(&contract) = index.get(name.as_str()) {
            members.push(contract);
            pending.extend(required_contracts(contract));
        }
    }
    members
}

fn build_file(
    source: &SourceFile,
    hash: &str,
    parsed: &ParsedFiles,
    index: &BTreeMap<&str, &Contract>,
    symbols: &SymbolTable,
) -> FileOutcome {
    let mut outcome = FileOutcome {
        key: source.key(),
        hash: hash.to_string(),
        ..FileOutcome::default()
    };
    let contracts = match parsed.get(&outcome.key) {
        Some(Ok(contracts)) => contracts,
        Some(Err(err)) => {
            debug!(file = %outcome.key, error = %err, "parse failed");
            outcome.errors.push(CoreError::Parse(err.clone()));
            return outcome;
        }
        None => return outcome,
    };

    let mut references = BTreeSet::new();
    for contract in contracts {
        outcome.warnings.extend(analyze_contract(contract));
        let unit = unit_members(contract, index);
        for member in &unit {
            references.insert(SharedRef::Class(member.name.clone()));
            references.extend(member.references.iter().cloned());
        }
        match generate_unit(&unit, symbols) {
            Ok(solidity) => outcome.generated.push(Generated {
                name: contract.name.clone(),
                solidity,
            }),
            Err(err) => outcome.errors.push(err.into()),
        }
    }
    outcome.dependencies = symbols.dependency_hashes(&symbols.closure(&references));
    debug!(
        file = %outcome.key,
        contracts = contracts.len(),
        dependencies = outcome.dependencies.len(),
        "generated solidity"
    );
    outcome
}

fn write_artifacts(output: &Path, artifacts: &[BuildArtifact]) -> Result<(), CoreError> {
    for artifact in artifacts {
        let name = &artifact.contract_name;
        let abi = serde_json::to_string_pretty(&artifact.abi).map_err(|err| CoreError::OutputIo {
            path: output.join("abi"),
            source: std::io::Error::other(err),
        })?;
        write_output(&output.join("abi").join(format!("{name}.json")), &abi)?;
        write_output(
            &output.join("bytecode").join(format!("{name}.bin")),
            &artifact.bytecode,
        )?;
        write_output(
            &output.join("solidity").join(format!("{name}.sol")),
            &artifact.solidity,
        )?;
    }
    Ok(())
}

fn write_output(path: &Path, contents: &str) -> Result<(), CoreError> {
    let failed = |source| CoreError::OutputIo {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(failed)?;
    }
    fs::write(path, contents).map_err(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::hash::sha256_hex;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Records each batch and "compiles" by hashing the Solidity text.
    #[derive(Clone, Default)]
    struct RecordingCompiler {
        batches: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl RecordingCompiler {
        fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().expect("lock").clone()
        }
    }

    impl BytecodeCompiler for RecordingCompiler {
        fn compile(&self, inputs: &[CompileInput], _: &OptimizerConfig) -> BTreeMap<String, CompiledContract> {
            self.batches
                .lock()
                .expect("lock")
                .push(inputs.iter().map(|input| input.name.clone()).collect());
            inputs
                .iter()
                .map(|input| {
                    let compiled = if input.solidity.contains("function explode") {
                        CompiledContract {
                            errors: vec!["Error: boom".to_string()],
                            ..CompiledContract::default()
                        }
                    } else {
                        CompiledContract {
                            abi: json!([{ "type": "constructor", "inputs": [] }]),
                            bytecode: format!("0x{}", sha256_hex(&[input.solidity.as_bytes()])),
                            errors: Vec::new(),
                            warnings: Vec::new(),
                        }
                    };
                    (input.name.clone(), compiled)
                })
                .collect()
        }
    }

    struct Unchecked;

    impl TypeChecker for Unchecked {
        fn check(&self, _: &Path) -> Result<(), Vec<String>> {
            Ok(())
        }
    }

    struct Rejecting;

    impl TypeChecker for Rejecting {
        fn check(&self, _: &Path) -> Result<(), Vec<String>> {
            Err(vec!["contracts/a.ts(1,1): error TS2304".to_string()])
        }
    }

    fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, contents) in files {
            write_source(dir.path(), name, contents);
        }
        dir
    }

    fn write_source(root: &Path, name: &str, contents: &str) {
        let path = root.join("contracts").join(name);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, contents).expect("write");
    }

    fn compiler(root: &Path, solc: &RecordingCompiler) -> Compiler {
        Compiler::new(root, SkittlesConfig::default())
            .with_bytecode_compiler(solc.clone())
            .with_type_checker(Unchecked)
    }

    const TOKEN: &str = "class Token {\n  public totalSupply: number;\n  constructor(supply: number) {\n    this.totalSupply = supply;\n  }\n}";

    #[test]
    fn compiles_a_fresh_contract_end_to_end() {
        let dir = project(&[("Token.ts", TOKEN)]);
        let result = compiler(dir.path(), &RecordingCompiler::default()).compile();
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.artifacts.len(), 1);

        let artifact = &result.artifacts[0];
        assert_eq!(artifact.contract_name, "Token");
        assert!(artifact.solidity.contains("uint256 public totalSupply;"));
        assert!(artifact.solidity.contains("constructor(uint256 supply) {"));
        assert!(!artifact.bytecode.is_empty());
        assert!(!artifact.bytecode.starts_with("0x"));

        let build = dir.path().join("build");
        assert!(build.join("abi").join("Token.json").is_file());
        assert!(build.join("bytecode").join("Token.bin").is_file());
        assert!(build.join("solidity").join("Token.sol").is_file());
        assert!(build.join(CACHE_FILE).is_file());
    }

    #[test]
    fn unchanged_projects_are_served_from_the_cache() {
        let dir = project(&[("Token.ts", TOKEN)]);
        let solc = RecordingCompiler::default();
        let first = compiler(dir.path(), &solc).compile();
        let second = compiler(dir.path(), &solc).compile();

        assert!(second.success);
        assert_eq!(solc.batches(), vec![vec!["Token".to_string()]]);
        assert_eq!(first.artifacts, second.artifacts);
        assert_eq!(second.files["contracts/Token.ts"], FileState::CacheHit);
    }

    #[test]
    fn changing_a_shared_definition_recompiles_only_its_users() {
        let dir = project(&[
            ("types.ts", "export interface Order { id: number; amount: number }"),
            ("Shop.ts", "class Shop { orders: Order[] = []; count(): number { return this.orders.length; } }"),
            ("Counter.ts", "class Counter { n: number = 0; bump(): void { this.n += 1; } }"),
        ]);
        let solc = RecordingCompiler::default();
        assert!(compiler(dir.path(), &solc).compile().success);

        write_source(
            dir.path(),
            "types.ts",
            "export interface Order { id: number; amount: number; paid: boolean }",
        );
        let result = compiler(dir.path(), &solc).compile();
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(solc.batches()[1], vec!["Shop".to_string()]);
        assert_eq!(result.files["contracts/Shop.ts"], FileState::Compiled);
        assert_eq!(result.files["contracts/Counter.ts"], FileState::CacheHit);
        let shop = result
            .artifacts
            .iter()
            .find(|a| a.contract_name == "Shop")
            .expect("shop artifact");
        assert!(shop.solidity.contains("bool paid;"));
    }

    #[test]
    fn changing_a_base_recompiles_the_derived_contract() {
        let dir = project(&[
            ("Base.ts", "class Base { f(): number { return 1; } }"),
            ("Child.ts", "class Child extends Base { g(): number { return 2; } }"),
        ]);
        let solc = RecordingCompiler::default();
        assert!(compiler(dir.path(), &solc).compile().success);

        write_source(dir.path(), "Base.ts", "class Base { f(): number { return 3; } }");
        let result = compiler(dir.path(), &solc).compile();
        assert!(result.success, "{:?}", result.errors);
        let mut recompiled = solc.batches()[1].clone();
        recompiled.sort();
        assert_eq!(recompiled, vec!["Base".to_string(), "Child".to_string()]);
    }

    #[test]
    fn derived_contracts_pull_in_unchanged_bases() {
        let dir = project(&[
            ("Base.ts", "class Base { f(): number { return 1; } }"),
            ("Child.ts", "class Child extends Base { g(): number { return 2; } }"),
        ]);
        let solc = RecordingCompiler::default();
        assert!(compiler(dir.path(), &solc).compile().success);

        write_source(dir.path(), "Child.ts", "class Child extends Base { g(): number { return 5; } }");
        let result = compiler(dir.path(), &solc).compile();
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(solc.batches()[1], vec!["Child".to_string()]);
        let child = result
            .artifacts
            .iter()
            .find(|a| a.contract_name == "Child")
            .expect("child artifact");
        assert!(child.solidity.contains("contract Base {"));
        assert!(child.solidity.contains("contract Child is Base {"));
    }

    #[test]
    fn corrupt_caches_trigger_a_full_rebuild() {
        let dir = project(&[("Token.ts", TOKEN)]);
        let solc = RecordingCompiler::default();
        let first = compiler(dir.path(), &solc).compile();

        let cache_path = dir.path().join("build").join(CACHE_FILE);
        fs::write(&cache_path, "{ definitely not json").expect("corrupt");
        let second = compiler(dir.path(), &solc).compile();

        assert!(second.success);
        assert_eq!(solc.batches().len(), 2);
        assert_eq!(first.artifacts, second.artifacts);
        assert!(BuildCache::load(&cache_path).is_ok());
    }

    #[test]
    fn errors_stay_scoped_to_their_file() {
        let dir = project(&[
            ("Token.ts", TOKEN),
            ("Broken.ts", "class Broken { f(): number { return ; } }"),
            ("Bad.ts", "class Bad { explode(): void {} }"),
        ]);
        let solc = RecordingCompiler::default();
        let result = compiler(dir.path(), &solc).compile();

        assert!(!result.success);
        assert_eq!(result.errors.len(), 2, "{:?}", result.errors);
        assert!(result.errors.iter().any(|e| matches!(e, CoreError::Parse(_))));
        assert!(result.errors.iter().any(|e| matches!(e, CoreError::Bytecode(_))));
        let names: Vec<&str> = result.artifacts.iter().map(|a| a.contract_name.as_str()).collect();
        assert_eq!(names, vec!["Token"]);
        assert_eq!(result.files["contracts/Broken.ts"], FileState::Failed);
        assert_eq!(result.files["contracts/Bad.ts"], FileState::Failed);

        let cache = BuildCache::load(&dir.path().join("build").join(CACHE_FILE)).expect("cache");
        assert!(cache.artifacts("contracts/Bad.ts").is_none());
        assert!(cache.artifacts("contracts/Token.ts").is_some());
    }

    #[test]
    fn analyzer_warnings_are_reported() {
        let dir = project(&[(
            "Warn.ts",
            "class Warn { f(x: number): number { let unused = 1; return x; x += 1; } }",
        )]);
        let result = compiler(dir.path(), &RecordingCompiler::default()).compile();
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.warnings.len(), 2, "{:?}", result.warnings);
    }

    #[test]
    fn type_check_failures_stop_the_batch() {
        let dir = project(&[("Token.ts", TOKEN)]);
        let solc = RecordingCompiler::default();
        let result = Compiler::new(dir.path(), SkittlesConfig::default())
            .with_bytecode_compiler(solc.clone())
            .with_type_checker(Rejecting)
            .compile();
        assert!(!result.success);
        assert!(matches!(result.errors[0], CoreError::TypeCheck(_)));
        assert!(solc.batches().is_empty());

        let config = SkittlesConfig {
            type_check: false,
            ..SkittlesConfig::default()
        };
        let result = Compiler::new(dir.path(), config)
            .with_bytecode_compiler(solc.clone())
            .with_type_checker(Rejecting)
            .compile();
        assert!(result.success);
    }

    #[test]
    fn empty_projects_succeed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let solc = RecordingCompiler::default();
        let result = compiler(dir.path(), &solc).compile();
        assert!(result.success);
        assert!(result.artifacts.is_empty());
        assert!(solc.batches().is_empty());
    }

    #[test]
    #[ignore = "requires solc on PATH"]
    fn real_solc_produces_abi_and_bytecode() {
        let dir = project(&[("Token.ts", TOKEN)]);
        let config = SkittlesConfig {
            type_check: false,
            ..SkittlesConfig::default()
        };
        let result = compile(dir.path(), config);
        assert!(result.success, "{:?}", result.errors);
        let artifact = &result.artifacts[0];
        let abi = artifact.abi.as_array().expect("abi array");
        let constructors = abi.iter().filter(|e| e["type"] == "constructor").count();
        let getters = abi
            .iter()
            .filter(|e| e["type"] == "function" && e["name"] == "totalSupply")
            .count();
        assert_eq!((constructors, getters), (1, 1));
        assert!(!artifact.bytecode.is_empty());
    }
}
