pub mod code;

use std::path::Path;

use crate::constraints::solve::{solve, SolveFailure};
use crate::constraints::ConstraintStore;
use crate::diagnostics::{CheckError, Diagnostic, DiagnosticCode};
use crate::parser::ast::{ClassDecl, Decl, MethodDecl, SourceFile};
use crate::parser::parse_source;
use crate::sig::env::{MethodSig, TypeEnv};
use crate::span::Span;
use crate::subtyping::{CheckContext, Relation, SubtypeError, Subtyping};
use crate::types::variance::VariableVariance;
use crate::types::{NominalKind, Type, TypeKind};

/// Whole-file validation of one signature file against the loaded
/// environment. Type-level problems come back as diagnostics; `Err` is
/// reserved for infrastructure failures and store invariant violations.
pub fn check_file(
    env: &TypeEnv,
    path: &Path,
    source: &str,
) -> Result<Vec<Diagnostic>, CheckError> {
    let file = match parse_source(source) {
        Ok(file) => file,
        Err(CheckError::Syntax { msg, span }) => {
            return Ok(vec![Diagnostic::error(
                path,
                span,
                DiagnosticCode::SyntaxError,
                msg,
            )]);
        }
        Err(other) => return Err(other),
    };
    check_parsed(env, path, &file)
}

pub fn check_parsed(
    env: &TypeEnv,
    path: &Path,
    file: &SourceFile,
) -> Result<Vec<Diagnostic>, CheckError> {
    let mut diagnostics = Vec::new();

    for decl in &file.decls {
        match &decl.node {
            Decl::Class(class) => {
                check_class(env, path, class, &mut diagnostics)?;
            }
            Decl::Interface(iface) => {
                for method in &iface.methods {
                    validate_method_types(env, path, method, &mut diagnostics);
                }
            }
            Decl::Alias(alias) => {
                validate_type(env, path, &alias.body, alias.name.span, &mut diagnostics);
                if let Some(cycle) = env.alias_cycle(&alias.name.node) {
                    diagnostics.push(Diagnostic::error(
                        path,
                        alias.name.span,
                        DiagnosticCode::AliasCycle,
                        format!("type alias cycle: {}", cycle.join(" -> ")),
                    ));
                }
            }
        }
    }

    Ok(diagnostics)
}

fn check_class(
    env: &TypeEnv,
    path: &Path,
    class: &ClassDecl,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), CheckError> {
    let name = &class.name.node;

    if let Some(sup) = &class.superclass {
        if !env.classes.contains_key(&sup.node.name) {
            diagnostics.push(Diagnostic::error(
                path,
                sup.span,
                DiagnosticCode::UnknownSuperclass,
                format!("unknown superclass '{}'", sup.node.name),
            ));
        } else {
            check_arity(env, path, &sup.node.name, sup.node.args.len(), sup.span, diagnostics);
        }
        for arg in &sup.node.args {
            validate_type(env, path, arg, sup.span, diagnostics);
        }
    }

    for include in &class.includes {
        if !env.interfaces.contains_key(&include.node.name) {
            diagnostics.push(Diagnostic::error(
                path,
                include.span,
                DiagnosticCode::InvalidInclude,
                format!("'{}' is not an interface", include.node.name),
            ));
            continue;
        }
        check_arity(
            env,
            path,
            &include.node.name,
            include.node.args.len(),
            include.span,
            diagnostics,
        );
        for arg in &include.node.args {
            validate_type(env, path, arg, include.span, diagnostics);
        }
    }

    for method in &class.methods {
        validate_method_types(env, path, method, diagnostics);
    }

    // Semantic passes need the class registered; a file mid-edit may not be.
    if !env.classes.contains_key(name) {
        return Ok(());
    }

    if let Some(cycle) = env.superclass_cycle(name) {
        diagnostics.push(Diagnostic::error(
            path,
            class.name.span,
            DiagnosticCode::InheritanceCycle,
            format!("superclass cycle: {}", cycle.join(" < ")),
        ));
        return Ok(());
    }

    let ctx = CheckContext::for_class(env, name);
    check_overrides(env, &ctx, path, class, diagnostics)?;
    check_includes(env, &ctx, path, class, diagnostics)?;
    Ok(())
}

/// A redefined method must accept everything the inherited one accepts and
/// return no more than it returned: redefinition <: inherited, with the
/// redefinition's generic parameters as unknowns and the inherited one's
/// as rigid variables.
fn check_overrides(
    env: &TypeEnv,
    ctx: &CheckContext,
    path: &Path,
    class: &ClassDecl,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), CheckError> {
    let name = &class.name.node;
    let own_args: Vec<Type> = class
        .type_params
        .iter()
        .map(|p| Type::var(p.name.node.clone()))
        .collect();
    let Some(parent) = env.instance_supertype(name, &own_args) else {
        return Ok(());
    };
    let TypeKind::Nominal { name: parent_name, args: parent_args, .. } = &parent.kind else {
        return Ok(());
    };

    for method in &class.methods {
        let Some((owner, inherited)) =
            env.lookup_method(parent_name, parent_args, &method.name.node)
        else {
            continue;
        };
        let sub_sig = MethodSig {
            type_params: method.type_params.iter().map(|p| p.node.clone()).collect(),
            ty: method.ty.clone(),
            span: method.span,
        };
        let outcome = check_method_compat(ctx, class, &sub_sig, &inherited)?;
        if let Some(message) = outcome {
            diagnostics.push(Diagnostic::error(
                path,
                method.name.span,
                DiagnosticCode::IncompatibleOverride,
                format!(
                    "'{}#{}' is incompatible with the definition in '{owner}': {message}",
                    class.name.node, method.name.node,
                ),
            ));
        }
    }
    Ok(())
}

/// Every method of an included interface must exist on the class with a
/// conforming signature.
fn check_includes(
    env: &TypeEnv,
    ctx: &CheckContext,
    path: &Path,
    class: &ClassDecl,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), CheckError> {
    let name = &class.name.node;
    let own_args: Vec<Type> = class
        .type_params
        .iter()
        .map(|p| Type::var(p.name.node.clone()))
        .collect();

    for include in &class.includes {
        let Some(wanted) = env.interface_methods(&include.node.name, &include.node.args) else {
            continue;
        };
        for (method_name, iface_sig) in wanted {
            let Some((_, found)) = env.lookup_method(name, &own_args, &method_name) else {
                diagnostics.push(Diagnostic::error(
                    path,
                    include.span,
                    DiagnosticCode::MissingInterfaceMethod,
                    format!(
                        "'{name}' includes '{}' but does not define '{method_name}'",
                        include.node.name,
                    ),
                ));
                continue;
            };
            let outcome = check_method_compat(ctx, class, &found, &iface_sig)?;
            if let Some(message) = outcome {
                diagnostics.push(Diagnostic::error(
                    path,
                    found.span,
                    DiagnosticCode::IncompatibleOverride,
                    format!(
                        "'{name}#{method_name}' does not satisfy '{}': {message}",
                        include.node.name,
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Check `sub <: expected` between two method signatures, inferring the
/// sub side's generic parameters. Returns a human-readable incompatibility
/// when the signatures do not line up; `Err` only for invariant
/// violations.
fn check_method_compat(
    ctx: &CheckContext,
    class: &ClassDecl,
    sub: &MethodSig,
    expected: &MethodSig,
) -> Result<Option<String>, CheckError> {
    // A method type parameter shadows a class parameter of the same name.
    let rigid = class
        .type_params
        .iter()
        .map(|p| p.name.node.clone())
        .chain(expected.type_params.iter().cloned())
        .filter(|name| !sub.type_params.contains(name));
    let mut store = ConstraintStore::new(sub.type_params.iter().cloned(), rigid)
        .map_err(|e| CheckError::invariant(e.to_string()))?;

    let mut checker = Subtyping::new(ctx);
    let relation = Relation::new(sub.as_type(), expected.as_type());
    match checker.check(&relation, &mut store) {
        Ok(()) => {}
        Err(SubtypeError::Failure(failure)) => {
            return Ok(Some(failure.to_string()));
        }
        Err(SubtypeError::Invariant(e)) => {
            return Err(CheckError::invariant(e.to_string()));
        }
    }

    if store.is_empty() {
        return Ok(None);
    }
    let variance = VariableVariance::from_proc(&sub.ty);
    match solve(&store, ctx, &variance) {
        Ok(_) => Ok(None),
        Err(SolveFailure::Unsatisfiable { var, lower, upper }) => Ok(Some(format!(
            "no type for '{var}' satisfies {lower} <: {var} <: {upper}"
        ))),
        Err(SolveFailure::Invariant(e)) => Err(CheckError::invariant(e.to_string())),
    }
}

fn validate_method_types(
    env: &TypeEnv,
    path: &Path,
    method: &MethodDecl,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for ty in method
        .ty
        .params
        .iter()
        .chain(method.ty.keywords.values())
        .chain(std::iter::once(&*method.ty.return_type))
    {
        validate_type(env, path, ty, method.span, diagnostics);
    }
}

/// Name resolution and generic arity over one type tree.
pub(crate) fn validate_type(
    env: &TypeEnv,
    path: &Path,
    ty: &Type,
    fallback: Span,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let span = ty.span.unwrap_or(fallback);
    match &ty.kind {
        TypeKind::Nominal { kind, name, args } => {
            let known = match kind {
                NominalKind::Instance | NominalKind::Class => env.classes.contains_key(name),
                NominalKind::Interface => env.interfaces.contains_key(name),
                NominalKind::Alias => env.aliases.contains_key(name),
            };
            if !known {
                diagnostics.push(Diagnostic::error(
                    path,
                    span,
                    DiagnosticCode::UnknownTypeName,
                    format!("unknown type name '{name}'"),
                ));
            } else {
                check_arity(env, path, name, args.len(), span, diagnostics);
            }
            for arg in args {
                validate_type(env, path, arg, span, diagnostics);
            }
        }
        TypeKind::Union(items) | TypeKind::Intersection(items) | TypeKind::Tuple(items) => {
            for t in items {
                validate_type(env, path, t, span, diagnostics);
            }
        }
        TypeKind::Record(fields) => {
            for t in fields.values() {
                validate_type(env, path, t, span, diagnostics);
            }
        }
        TypeKind::Proc(p) => {
            for t in p.params.iter().chain(p.keywords.values()) {
                validate_type(env, path, t, span, diagnostics);
            }
            validate_type(env, path, &p.return_type, span, diagnostics);
        }
        TypeKind::Var(_)
        | TypeKind::Top
        | TypeKind::Bot
        | TypeKind::Any
        | TypeKind::Logic(_) => {}
    }
}

fn check_arity(
    env: &TypeEnv,
    path: &Path,
    name: &str,
    given: usize,
    span: Span,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let Some(wanted) = env.arity_of(name) {
        if wanted != given {
            diagnostics.push(Diagnostic::error(
                path,
                span,
                DiagnosticCode::ArityMismatch,
                format!("'{name}' takes {wanted} type argument(s), {given} given"),
            ));
        }
    }
}
