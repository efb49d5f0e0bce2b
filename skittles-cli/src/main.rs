use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use skittles_core::external::SolcCompiler;
use skittles_core::{CompileResult, Compiler, SkittlesConfig};
use tracing_subscriber::EnvFilter;

/// Compile TypeScript contract classes to Solidity, ABI and bytecode.
#[derive(Parser, Debug)]
#[command(name = "skittles", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile every contract under the project's contracts directory.
    Compile {
        #[arg(long, value_name = "DIR", default_value = ".", help = "Project root")]
        root: PathBuf,

        #[arg(
            long,
            value_name = "PATH",
            default_value = "solc",
            help = "Solidity compiler binary"
        )]
        solc: PathBuf,

        #[arg(long, help = "Skip the TypeScript type check")]
        no_type_check: bool,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Compile {
            root,
            solc,
            no_type_check,
        } => {
            let mut config = SkittlesConfig::load(&root)
                .with_context(|| format!("failed to load configuration from {}", root.display()))?;
            if no_type_check {
                config.type_check = false;
            }
            let result = Compiler::new(&root, config)
                .with_bytecode_compiler(SolcCompiler::new(solc))
                .compile();
            Ok(report(&result))
        }
    }
}

fn report(result: &CompileResult) -> ExitCode {
    for warning in &result.warnings {
        eprintln!("{warning}");
    }
    for error in &result.errors {
        eprintln!("error: {error}");
    }
    for artifact in &result.artifacts {
        println!("compiled {}", artifact.contract_name);
    }
    if result.success {
        ExitCode::SUCCESS
    } else {
        eprintln!("compilation failed with {} error(s)", result.errors.len());
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn empty_project_succeeds() {
        let dir = tempdir().expect("tempdir");

        Command::cargo_bin("skittles")
            .expect("binary exists")
            .arg("compile")
            .arg("--root")
            .arg(dir.path())
            .arg("--no-type-check")
            .assert()
            .success();

        assert!(dir.path().join("build").join(".skittles-cache.json").exists());
    }

    #[test]
    fn reports_parse_errors_with_location() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("contracts")).expect("mkdir");
        fs::write(
            dir.path().join("contracts").join("Broken.ts"),
            "class Broken {\n  f(): number { return ; }\n}",
        )
        .expect("write source");

        Command::cargo_bin("skittles")
            .expect("binary exists")
            .arg("compile")
            .arg("--root")
            .arg(dir.path())
            .arg("--no-type-check")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Broken.ts:2:"))
            .stderr(predicate::str::contains("compilation failed with 1 error(s)"));
    }

    #[test]
    fn reports_a_missing_solc_per_contract() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("contracts")).expect("mkdir");
        fs::write(
            dir.path().join("contracts").join("Counter.ts"),
            "class Counter { n: number = 0; bump(): void { this.n += 1; } }",
        )
        .expect("write source");

        Command::cargo_bin("skittles")
            .expect("binary exists")
            .arg("compile")
            .arg("--root")
            .arg(dir.path())
            .arg("--no-type-check")
            .arg("--solc")
            .arg(dir.path().join("no-such-solc"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("bytecode compilation of Counter failed"));

        let solidity = dir.path().join("build").join("solidity").join("Counter.sol");
        assert!(!solidity.exists(), "failed contracts must not leave artifacts");
    }

    #[test]
    fn rejects_invalid_configuration() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("skittles.config.json"), "{ \"optimizer\": 3 }")
            .expect("write config");

        Command::cargo_bin("skittles")
            .expect("binary exists")
            .arg("compile")
            .arg("--root")
            .arg(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("failed to load configuration"));
    }
}
