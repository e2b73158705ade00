pub mod span;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod types;
pub mod sig;
pub mod subtyping;
pub mod constraints;
pub mod check;
pub mod lsp_util;
pub mod controller;
pub mod progress;
pub mod server;
pub mod sigilfile;

use std::path::PathBuf;

use diagnostics::{CheckError, Diagnostic};
use sig::Overlays;
use sigilfile::SigilConfig;

/// Check a project in-process (no worker pool). Used by the CLI and by
/// tests; the LSP path goes through `server::run_master` instead.
///
/// Returns, per checked file: its path, its source text, and its
/// diagnostics. An empty `paths` checks every signature file the config
/// knows about.
pub fn check_project(
    config: &SigilConfig,
    paths: &[PathBuf],
) -> Result<Vec<(PathBuf, String, Vec<Diagnostic>)>, CheckError> {
    let overlays = Overlays::new();

    // 1. Load every signature into the environment.
    let (env, load_diagnostics) = sig::load_environment(&config.signature_dirs, &overlays)?;

    // 2. Decide the file set: every signature, then every code file.
    let files = if paths.is_empty() {
        let mut files = sig::collect_signature_files(&config.signature_dirs)?;
        files.extend(sig::collect_code_files(&config.code_dirs)?);
        files
    } else {
        paths.to_vec()
    };

    // 3. Check each file whole.
    let mut results = Vec::new();
    for path in files {
        let source = sig::read_source(&path, &overlays)?;
        let mut diagnostics: Vec<Diagnostic> = load_diagnostics
            .iter()
            .filter(|d| d.path == path)
            .cloned()
            .collect();
        if sig::is_code_path(&path) {
            diagnostics.extend(check::code::check_code_file(&env, &path, &source)?);
        } else {
            diagnostics.extend(check::check_file(&env, &path, &source)?);
        }
        results.push((path, source, diagnostics));
    }
    Ok(results)
}
