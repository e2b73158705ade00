use std::collections::HashMap;
use std::path::Path;

use crate::constraints::solve::{solve, SolveFailure};
use crate::constraints::ConstraintStore;
use crate::diagnostics::{CheckError, Diagnostic, DiagnosticCode};
use crate::parser::ast::{Expr, Stmt};
use crate::parser::parse_code;
use crate::sig::env::TypeEnv;
use crate::span::{Span, Spanned};
use crate::subtyping::{CheckContext, Relation, SubtypeError, Subtyping};
use crate::types::variance::VariableVariance;
use crate::types::{builtin, NominalKind, Type, TypeKind};

/// Check one code file against the signature environment: bindings
/// introduce typed names, method calls resolve through declared
/// signatures, and every generic call gets its own constraint store.
pub fn check_code_file(
    env: &TypeEnv,
    path: &Path,
    source: &str,
) -> Result<Vec<Diagnostic>, CheckError> {
    let file = match parse_code(source) {
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

    let ctx = CheckContext::new(env);
    let mut checker = CodeChecker {
        env,
        ctx: &ctx,
        path,
        scope: HashMap::new(),
        diagnostics: Vec::new(),
    };
    for stmt in &file.stmts {
        checker.check_stmt(stmt)?;
    }
    Ok(checker.diagnostics)
}

struct CodeChecker<'a> {
    env: &'a TypeEnv,
    ctx: &'a CheckContext<'a>,
    path: &'a Path,
    scope: HashMap<String, Type>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> CodeChecker<'a> {
    fn check_stmt(&mut self, stmt: &Spanned<Stmt>) -> Result<(), CheckError> {
        match &stmt.node {
            Stmt::Let { name, ty, value } => {
                if let Some(declared) = ty {
                    super::validate_type(self.env, self.path, declared, name.span, &mut self.diagnostics);
                }
                let bound = match (ty, value) {
                    (Some(declared), Some(value)) => {
                        let actual = self.infer_expr(value)?;
                        self.expect_subtype(&actual, declared, value.span)?;
                        declared.clone()
                    }
                    (Some(declared), None) => declared.clone(),
                    (None, Some(value)) => self.infer_expr(value)?,
                    (None, None) => {
                        self.diagnostics.push(Diagnostic::error(
                            self.path,
                            stmt.span,
                            DiagnosticCode::SyntaxError,
                            format!(
                                "let '{}' needs a type annotation or an initializer",
                                name.node
                            ),
                        ));
                        Type::any()
                    }
                };
                self.scope.insert(name.node.clone(), bound);
            }
            Stmt::Expr(expr) => {
                self.infer_expr(expr)?;
            }
        }
        Ok(())
    }

    fn infer_expr(&mut self, expr: &Spanned<Expr>) -> Result<Type, CheckError> {
        match &expr.node {
            Expr::Int(_) => Ok(Type::instance(builtin::INTEGER, vec![])),
            Expr::Float(_) => Ok(Type::instance(builtin::FLOAT, vec![])),
            Expr::Str(_) => Ok(Type::instance(builtin::STRING, vec![])),
            Expr::Bool(_) => Ok(Type::bool_instance()),
            Expr::Nil => Ok(Type::nil_instance()),
            Expr::Var(name) => match self.scope.get(name) {
                Some(ty) => Ok(ty.clone()),
                None => {
                    self.diagnostics.push(Diagnostic::error(
                        self.path,
                        expr.span,
                        DiagnosticCode::UndefinedVariable,
                        format!("undefined variable '{name}'"),
                    ));
                    Ok(Type::any())
                }
            },
            Expr::Call { receiver, method, args } => {
                let receiver_ty = self.infer_expr(receiver)?;
                let mut arg_types = Vec::new();
                for arg in args {
                    arg_types.push(self.infer_expr(arg)?);
                }
                self.check_call(&receiver_ty, method, &arg_types, args, expr.span)
            }
        }
    }

    /// Resolve one method call: look the method up through the receiver's
    /// class chain, check each argument against its parameter, and solve
    /// the call's constraint store to instantiate generic methods.
    fn check_call(
        &mut self,
        receiver: &Type,
        method: &Spanned<String>,
        arg_types: &[Type],
        args: &[Spanned<Expr>],
        span: Span,
    ) -> Result<Type, CheckError> {
        if receiver.is_any() {
            return Ok(Type::any());
        }
        let receiver = self.expand_receiver(receiver);
        let TypeKind::Nominal { kind: NominalKind::Instance, name, args: targs } = &receiver.kind
        else {
            self.diagnostics.push(Diagnostic::error(
                self.path,
                method.span,
                DiagnosticCode::UnknownMethod,
                format!("type {receiver} has no method '{}'", method.node),
            ));
            return Ok(Type::any());
        };
        let Some((_, sig)) = self.env.lookup_method(name, targs, &method.node) else {
            self.diagnostics.push(Diagnostic::error(
                self.path,
                method.span,
                DiagnosticCode::UnknownMethod,
                format!("type {receiver} has no method '{}'", method.node),
            ));
            return Ok(Type::any());
        };

        if sig.ty.params.len() != arg_types.len() {
            self.diagnostics.push(Diagnostic::error(
                self.path,
                span,
                DiagnosticCode::ArityMismatch,
                format!(
                    "'{}' takes {} argument(s), {} given",
                    method.node,
                    sig.ty.params.len(),
                    arg_types.len()
                ),
            ));
            return Ok(Type::any());
        }

        // One store per call site; the method's type parameters are its
        // unknowns.
        let mut store = ConstraintStore::new(sig.type_params.iter().cloned(), [] as [String; 0])
            .map_err(|e| CheckError::invariant(e.to_string()))?;
        let mut checker = Subtyping::new(self.ctx);
        for ((arg_ty, param), arg) in arg_types.iter().zip(&sig.ty.params).zip(args) {
            match checker.check(&Relation::new(arg_ty.clone(), param.clone()), &mut store) {
                Ok(()) => {}
                Err(SubtypeError::Failure(_)) => {
                    self.diagnostics.push(Diagnostic::error(
                        self.path,
                        arg.span,
                        DiagnosticCode::TypeMismatch,
                        format!(
                            "argument of '{}': expected {param}, found {arg_ty}",
                            method.node
                        ),
                    ));
                }
                Err(SubtypeError::Invariant(e)) => {
                    return Err(CheckError::invariant(e.to_string()));
                }
            }
        }

        if store.is_empty() {
            return Ok((*sig.ty.return_type).clone());
        }
        let variance = VariableVariance::from_proc(&sig.ty);
        match solve(&store, self.ctx, &variance) {
            Ok(solution) => Ok(solution.apply(&sig.ty.return_type)),
            Err(SolveFailure::Unsatisfiable { var, lower, upper }) => {
                self.diagnostics.push(Diagnostic::error(
                    self.path,
                    span,
                    DiagnosticCode::UnsatisfiableConstraint,
                    format!("no type for '{var}' satisfies {lower} <: {var} <: {upper}"),
                ));
                Ok(Type::any())
            }
            Err(SolveFailure::Invariant(e)) => Err(CheckError::invariant(e.to_string())),
        }
    }

    fn expect_subtype(
        &mut self,
        actual: &Type,
        expected: &Type,
        span: Span,
    ) -> Result<(), CheckError> {
        let mut checker = Subtyping::new(self.ctx);
        match checker.check_static(&Relation::new(actual.clone(), expected.clone())) {
            Ok(()) => Ok(()),
            Err(SubtypeError::Failure(_)) => {
                self.diagnostics.push(Diagnostic::error(
                    self.path,
                    span,
                    DiagnosticCode::TypeMismatch,
                    format!("type mismatch: expected {expected}, found {actual}"),
                ));
                Ok(())
            }
            Err(SubtypeError::Invariant(e)) => Err(CheckError::invariant(e.to_string())),
        }
    }

    /// Aliases on the receiver expand before method lookup.
    fn expand_receiver(&self, receiver: &Type) -> Type {
        let mut current = receiver.clone();
        let mut hops = 0;
        while let TypeKind::Nominal { kind: NominalKind::Alias, name, .. } = &current.kind {
            // Alias cycles are reported by the signature checks; stop
            // rather than spin.
            if hops > self.env.aliases.len() {
                break;
            }
            hops += 1;
            match self.env.expand_alias(name) {
                Some(body) => current = body.clone(),
                None => break,
            }
        }
        current
    }
}
