//! Reading modules from disk

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tarn_ast::Module;
use tarn_bytecode::{BytecodeModule, MAGIC};
use tracing::debug;

/// An AST module read from a JSON file
#[derive(Debug, Clone)]
pub struct SourceModule {
    pub path: PathBuf,
    pub module: Module,
    /// Program text from a sibling `.tarn` file, used only for rendering
    pub text: Option<String>,
}

impl SourceModule {
    pub fn read(path: &Path) -> Result<Self> {
        let json = fs::read(path).with_context(|| format!("cannot read `{}`", path.display()))?;
        Self::from_json(path, &json)
    }

    fn from_json(path: &Path, json: &[u8]) -> Result<Self> {
        let module: Module =
            serde_json::from_slice(json).with_context(|| format!("`{}` is not an AST module", path.display()))?;
        let text = fs::read_to_string(path.with_extension("tarn")).ok();
        debug!(path = %path.display(), module = %format!("{}::{}", module.package, module.name), has_text = text.is_some(), "loaded module");
        Ok(Self { path: path.to_path_buf(), module, text })
    }
}

/// Everything named on the command line
#[derive(Debug)]
pub enum Inputs {
    /// AST modules in dependency order
    Ast(Vec<SourceModule>),
    /// A single encoded bytecode module
    Bytecode(BytecodeModule),
}

impl Inputs {
    /// Load every path. A file starting with the bytecode magic must be the
    /// only input; anything else is parsed as an AST module.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        if paths.is_empty() {
            bail!("no input files");
        }

        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs::read(path).with_context(|| format!("cannot read `{}`", path.display()))?;
            if bytes.starts_with(&MAGIC) {
                if paths.len() != 1 {
                    bail!("`{}` is bytecode and must be the only input", path.display());
                }
                let module = BytecodeModule::from_bytes(&bytes)
                    .with_context(|| format!("cannot decode `{}`", path.display()))?;
                return Ok(Inputs::Bytecode(module));
            }
            sources.push(SourceModule::from_json(path, &bytes)?);
        }
        Ok(Inputs::Ast(sources))
    }

    /// AST modules only; bytecode cannot be checked again
    pub fn into_sources(self) -> Result<Vec<SourceModule>> {
        match self {
            Inputs::Ast(sources) => Ok(sources),
            Inputs::Bytecode(_) => bail!("expected AST modules, found a bytecode file"),
        }
    }
}
