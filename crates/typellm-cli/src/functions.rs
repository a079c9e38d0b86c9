use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use typellm_core::FunctionSpec;
use typellm_core::function::is_valid_function_name;

use crate::constants::FUNCTIONS_DIR_NAME;

/// Store for function definitions kept as `<config>/functions/<name>.toml`
pub struct FunctionStore {
    functions_dir: PathBuf,
    functions: BTreeMap<String, FunctionSpec>,
}

impl FunctionStore {
    /// Create a new FunctionStore with the given base directory
    pub fn new(base_path: &Path) -> Self {
        Self {
            functions_dir: base_path.join(FUNCTIONS_DIR_NAME),
            functions: BTreeMap::new(),
        }
    }

    /// Load all function files; unparsable files are skipped with a warning
    pub fn load(&mut self) -> Result<()> {
        self.functions.clear();

        if !self.functions_dir.exists() {
            fs::create_dir_all(&self.functions_dir)
                .context("Failed to create functions directory")?;
            return Ok(());
        }

        let entries =
            fs::read_dir(&self.functions_dir).context("Failed to read functions directory")?;

        for entry in entries {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("toml") {
                match Self::read_file(&path) {
                    Ok(spec) => {
                        self.functions.insert(spec.name.clone(), spec);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load function {}: {e:#}", path.display());
                    }
                }
            }
        }

        Ok(())
    }

    /// Parse a function definition file
    pub fn read_file(path: &Path) -> Result<FunctionSpec> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read function file: {}", path.display()))?;

        FunctionSpec::from_toml(&content)
            .with_context(|| format!("Failed to parse function file: {}", path.display()))
    }

    /// Write a definition to disk, replacing any file of the same name
    pub fn save(&mut self, spec: &FunctionSpec) -> Result<()> {
        if !is_valid_function_name(&spec.name) {
            anyhow::bail!(
                "'{}' is not a valid function name (letters, digits, '_' and '-', at most 64)",
                spec.name
            );
        }

        if !self.functions_dir.exists() {
            fs::create_dir_all(&self.functions_dir)
                .context("Failed to create functions directory")?;
        }

        let file_path = self.file_path(&spec.name);
        let temp_path = file_path.with_extension("toml.tmp");
        let content = spec.to_toml()?;

        // write to temp file then rename
        fs::write(&temp_path, content).with_context(|| {
            format!("Failed to write temporary function file: {}", temp_path.display())
        })?;
        fs::rename(&temp_path, &file_path)
            .with_context(|| format!("Failed to rename function file: {}", file_path.display()))?;

        self.functions.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    /// Remove a definition; `Ok(false)` when it was not stored
    pub fn delete(&mut self, name: &str) -> Result<bool> {
        if self.functions.remove(name).is_none() {
            return Ok(false);
        }

        let file_path = self.file_path(name);
        if file_path.exists() {
            fs::remove_file(&file_path)
                .with_context(|| format!("Failed to delete function file: {}", file_path.display()))?;
        }
        Ok(true)
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(name)
    }

    /// Function names in sorted order
    pub fn list(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn functions_dir(&self) -> &Path {
        &self.functions_dir
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.functions_dir.join(format!("{name}.toml"))
    }
}
