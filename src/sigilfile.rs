use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::diagnostics::CheckError;

pub const DEFAULT_FILE_NAME: &str = "Sigilfile";
pub const DEFAULT_CHECK_WORKERS: usize = 2;
pub const DEFAULT_PROGRESS_THRESHOLD: usize = 10;

// ---- TOML deserialization types ----

#[derive(Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    signatures: Vec<PathBuf>,
    #[serde(default)]
    code: Vec<PathBuf>,
    check: Option<TomlCheck>,
}

#[derive(Deserialize)]
struct TomlCheck {
    workers: Option<usize>,
    progress_threshold: Option<usize>,
}

/// Resolved project configuration.
#[derive(Debug, Clone)]
pub struct SigilConfig {
    pub root: PathBuf,
    pub sigilfile: Option<PathBuf>,
    /// Directories scanned for `.sig` files, absolute.
    pub signature_dirs: Vec<PathBuf>,
    /// Directories scanned for `.sgl` code files, absolute.
    pub code_dirs: Vec<PathBuf>,
    pub check_workers: usize,
    pub progress_threshold: usize,
}

impl SigilConfig {
    /// Load from an explicit path, or from `Sigilfile` in the current
    /// directory. A missing default file is not an error: the defaults
    /// check `sig/` and `src/` with two workers.
    pub fn load(path: Option<&Path>) -> Result<SigilConfig, CheckError> {
        let (file, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_FILE_NAME), false),
        };
        if !file.exists() {
            if required {
                return Err(CheckError::config("Sigilfile not found", file));
            }
            return Ok(Self::defaults(PathBuf::from("."), None));
        }

        let text = std::fs::read_to_string(&file)?;
        let parsed: TomlConfig = toml::from_str(&text)
            .map_err(|e| CheckError::config(e.to_string(), file.clone()))?;

        let root = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = Self::defaults(root.clone(), Some(file));
        if !parsed.signatures.is_empty() {
            config.signature_dirs = resolve_dirs(parsed.signatures, &root);
        }
        if !parsed.code.is_empty() {
            config.code_dirs = resolve_dirs(parsed.code, &root);
        }
        if let Some(check) = parsed.check {
            if let Some(workers) = check.workers {
                config.check_workers = workers.max(1);
            }
            if let Some(threshold) = check.progress_threshold {
                config.progress_threshold = threshold;
            }
        }
        Ok(config)
    }

    fn defaults(root: PathBuf, sigilfile: Option<PathBuf>) -> SigilConfig {
        SigilConfig {
            signature_dirs: vec![root.join("sig")],
            code_dirs: vec![root.join("src")],
            root,
            sigilfile,
            check_workers: DEFAULT_CHECK_WORKERS,
            progress_threshold: DEFAULT_PROGRESS_THRESHOLD,
        }
    }
}

fn resolve_dirs(dirs: Vec<PathBuf>, root: &Path) -> Vec<PathBuf> {
    dirs.into_iter()
        .map(|d| if d.is_absolute() { d } else { root.join(d) })
        .collect()
}
