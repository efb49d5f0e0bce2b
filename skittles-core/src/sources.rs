use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::CoreError;

/// A contract source. `path` is relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: String,
}

impl SourceFile {
    /// Stable key used by the build cache.
    pub fn key(&self) -> String {
        path_key(&self.path)
    }
}

/// `/`-separated form of a relative path.
pub fn path_key(path: &Path) -> String {
    path.components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_contract_source(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    name.ends_with(".ts") && !name.ends_with(".d.ts")
}

/// Every `.ts` file under `contracts_dir`, sorted by path. A missing
/// directory has no sources.
pub fn load_sources(root: &Path, contracts_dir: &Path) -> Result<Vec<SourceFile>, CoreError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(contracts_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if path.is_file() && is_contract_source(path) {
            let contents = fs::read_to_string(path).map_err(|source| CoreError::SourceIo {
                path: path.to_path_buf(),
                source,
            })?;
            let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
            files.push(SourceFile {
                path: relative,
                contents,
            });
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_typescript_sources_but_not_declarations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let contracts = dir.path().join("contracts");
        fs::create_dir_all(contracts.join("tokens")).expect("mkdir");
        fs::write(contracts.join("b.ts"), "class B {}").expect("write");
        fs::write(contracts.join("tokens").join("a.ts"), "class A {}").expect("write");
        fs::write(contracts.join("types.d.ts"), "declare const x: number;").expect("write");
        fs::write(contracts.join("notes.md"), "# notes").expect("write");

        let files = load_sources(dir.path(), &contracts).expect("load");
        let keys: Vec<String> = files.iter().map(SourceFile::key).collect();
        assert_eq!(keys, vec!["contracts/b.ts", "contracts/tokens/a.ts"]);
        assert_eq!(files[0].contents, "class B {}");
    }

    #[test]
    fn missing_directory_has_no_sources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = load_sources(dir.path(), &dir.path().join("contracts")).expect("load");
        assert!(files.is_empty());
    }
}
