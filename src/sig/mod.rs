pub mod env;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::diagnostics::{CheckError, Diagnostic, DiagnosticCode};
use crate::parser::ast::{Decl, SourceFile};
use crate::parser::parse_source;

use env::{AliasInfo, ClassInfo, InterfaceInfo, MethodSig, TypeEnv};

pub const SIGNATURE_EXTENSION: &str = "sig";
pub const CODE_EXTENSION: &str = "sgl";

pub fn is_signature_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SIGNATURE_EXTENSION)
}

pub fn is_code_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(CODE_EXTENSION)
}

/// Unsaved editor buffers, keyed by path. Checked before the filesystem.
pub type Overlays = HashMap<PathBuf, String>;

/// Recursively collect `.sig` files under `dirs`, sorted for determinism.
pub fn collect_signature_files(dirs: &[PathBuf]) -> Result<Vec<PathBuf>, CheckError> {
    collect_files(dirs, is_signature_path)
}

/// Recursively collect `.sgl` files under `dirs`, sorted for determinism.
pub fn collect_code_files(dirs: &[PathBuf]) -> Result<Vec<PathBuf>, CheckError> {
    collect_files(dirs, is_code_path)
}

fn collect_files(
    dirs: &[PathBuf],
    matches: fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, CheckError> {
    let mut files = Vec::new();
    for dir in dirs {
        walk(dir, matches, &mut files)?;
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk(dir: &Path, matches: fn(&Path) -> bool, out: &mut Vec<PathBuf>) -> Result<(), CheckError> {
    if !dir.exists() {
        // Default config directories need not exist.
        return Ok(());
    }
    if dir.is_file() {
        if matches(dir) {
            out.push(dir.to_path_buf());
        }
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, matches, out)?;
        } else if matches(&path) {
            out.push(path);
        }
    }
    Ok(())
}

pub fn read_source(path: &Path, overlays: &Overlays) -> Result<String, CheckError> {
    if let Some(text) = overlays.get(path) {
        return Ok(text.clone());
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Load every signature file under `dirs` into a fresh environment seeded
/// with the builtins. Syntax errors and duplicate declarations come back
/// as diagnostics; the environment keeps the first declaration of a name.
pub fn load_environment(
    dirs: &[PathBuf],
    overlays: &Overlays,
) -> Result<(TypeEnv, Vec<Diagnostic>), CheckError> {
    let mut env = TypeEnv::with_builtins();
    let mut diagnostics = Vec::new();

    for path in collect_signature_files(dirs)? {
        let source = read_source(&path, overlays)?;
        match parse_source(&source) {
            Ok(file) => diagnostics.extend(register_file(&mut env, &path, &file)),
            Err(CheckError::Syntax { msg, span }) => {
                diagnostics.push(Diagnostic::error(
                    &path,
                    span,
                    DiagnosticCode::SyntaxError,
                    msg,
                ));
            }
            Err(other) => return Err(other),
        }
    }

    Ok((env, diagnostics))
}

/// Register a parsed file's declarations. A name already taken (by a
/// builtin or an earlier file) is reported and the earlier winner kept.
pub fn register_file(env: &mut TypeEnv, path: &Path, file: &SourceFile) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for decl in &file.decls {
        let name = decl.node.name().to_string();
        let taken = env.classes.contains_key(&name)
            || env.interfaces.contains_key(&name)
            || env.aliases.contains_key(&name);
        if taken {
            diagnostics.push(Diagnostic::error(
                path,
                decl.span,
                DiagnosticCode::DuplicateDeclaration,
                format!("'{name}' is already declared"),
            ));
            continue;
        }

        match &decl.node {
            Decl::Class(class) => {
                let methods = register_methods(&class.methods, path, &mut diagnostics);
                env.classes.insert(
                    name.clone(),
                    ClassInfo {
                        name,
                        type_params: class
                            .type_params
                            .iter()
                            .map(|p| (p.name.node.clone(), p.variance))
                            .collect(),
                        superclass: class
                            .superclass
                            .as_ref()
                            .map(|s| (s.node.name.clone(), s.node.args.clone())),
                        includes: class
                            .includes
                            .iter()
                            .map(|i| (i.node.name.clone(), i.node.args.clone()))
                            .collect(),
                        methods,
                        path: Some(path.to_path_buf()),
                        span: decl.span,
                    },
                );
            }
            Decl::Interface(iface) => {
                let methods = register_methods(&iface.methods, path, &mut diagnostics);
                env.interfaces.insert(
                    name.clone(),
                    InterfaceInfo {
                        name,
                        type_params: iface
                            .type_params
                            .iter()
                            .map(|p| (p.name.node.clone(), p.variance))
                            .collect(),
                        methods,
                        path: Some(path.to_path_buf()),
                        span: decl.span,
                    },
                );
            }
            Decl::Alias(alias) => {
                env.aliases.insert(
                    name.clone(),
                    AliasInfo {
                        name,
                        body: alias.body.clone(),
                        path: Some(path.to_path_buf()),
                        span: decl.span,
                    },
                );
            }
        }
    }

    diagnostics
}

fn register_methods(
    methods: &[crate::parser::ast::MethodDecl],
    path: &Path,
    diagnostics: &mut Vec<Diagnostic>,
) -> BTreeMap<String, MethodSig> {
    let mut out = BTreeMap::new();
    for m in methods {
        let sig = MethodSig {
            type_params: m.type_params.iter().map(|p| p.node.clone()).collect(),
            ty: m.ty.clone(),
            span: m.span,
        };
        if out.insert(m.name.node.clone(), sig).is_some() {
            diagnostics.push(Diagnostic::error(
                path,
                m.name.span,
                DiagnosticCode::DuplicateDeclaration,
                format!("method '{}' is declared twice", m.name.node),
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_reports_duplicates() {
        let mut env = TypeEnv::with_builtins();
        let file = parse_source(
            "class Foo < Object\nend\n\
             class Foo < Object\nend\n\
             class Integer < Object\nend",
        )
        .unwrap();
        let diags = register_file(&mut env, Path::new("a.sig"), &file);
        // Second Foo and the builtin clash both reported.
        assert_eq!(diags.len(), 2);
        assert!(diags
            .iter()
            .all(|d| d.code == DiagnosticCode::DuplicateDeclaration));
        assert!(env.classes.contains_key("Foo"));
    }

    #[test]
    fn duplicate_methods_reported() {
        let mut env = TypeEnv::with_builtins();
        let file = parse_source(
            "class Foo < Object\n\
             \x20 def go: () -> Nil\n\
             \x20 def go: () -> Integer\n\
             end",
        )
        .unwrap();
        let diags = register_file(&mut env, Path::new("a.sig"), &file);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("go"));
    }
}
