use std::collections::BTreeSet;

use super::{ProcType, Type, TypeKind};

/// Per-position polarity controlling the direction of recursive subtype
/// checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variance {
    Covariant,
    Contravariant,
    Invariant,
}

impl Variance {
    /// Polarity on the other side of a contravariant position.
    pub fn flip(self) -> Variance {
        match self {
            Variance::Covariant => Variance::Contravariant,
            Variance::Contravariant => Variance::Covariant,
            Variance::Invariant => Variance::Invariant,
        }
    }
}

impl std::fmt::Display for Variance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variance::Covariant => write!(f, "out"),
            Variance::Contravariant => write!(f, "in"),
            Variance::Invariant => write!(f, "inv"),
        }
    }
}

/// Where each type variable occurs within a proc type: return position,
/// parameter position, or both. The solver uses this to decide which bound
/// to bind a double-ended unknown to.
#[derive(Debug, Clone, Default)]
pub struct VariableVariance {
    covariants: BTreeSet<String>,
    contravariants: BTreeSet<String>,
}

impl VariableVariance {
    /// Mark every variable of every type in `tys` as occurring both ways.
    /// Useful for contexts with no proc structure to read polarity from.
    pub fn invariant_over<'a>(tys: impl IntoIterator<Item = &'a Type>) -> Self {
        let mut vv = VariableVariance::default();
        for ty in tys {
            for v in ty.free_vars() {
                vv.covariants.insert(v.clone());
                vv.contravariants.insert(v);
            }
        }
        vv
    }

    /// Read polarity off a proc type: parameters are contravariant
    /// positions, the return type covariant.
    pub fn from_proc(proc: &ProcType) -> Self {
        let mut vv = VariableVariance::default();
        for p in &proc.params {
            vv.visit(p, Variance::Contravariant);
        }
        for p in proc.keywords.values() {
            vv.visit(p, Variance::Contravariant);
        }
        vv.visit(&proc.return_type, Variance::Covariant);
        vv
    }

    pub fn insert(&mut self, name: impl Into<String>, variance: Variance) {
        let name = name.into();
        match variance {
            Variance::Covariant => {
                self.covariants.insert(name);
            }
            Variance::Contravariant => {
                self.contravariants.insert(name);
            }
            Variance::Invariant => {
                self.covariants.insert(name.clone());
                self.contravariants.insert(name);
            }
        }
    }

    pub fn variance_of(&self, name: &str) -> Variance {
        match (self.covariants.contains(name), self.contravariants.contains(name)) {
            (true, false) => Variance::Covariant,
            (false, true) => Variance::Contravariant,
            _ => Variance::Invariant,
        }
    }

    fn visit(&mut self, ty: &Type, polarity: Variance) {
        match &ty.kind {
            TypeKind::Var(name) => self.insert(name.clone(), polarity),
            TypeKind::Top | TypeKind::Bot | TypeKind::Any | TypeKind::Logic(_) => {}
            // Declared argument variance lives in the environment; without
            // it, nominal arguments are treated as invariant positions.
            TypeKind::Nominal { args, .. } => {
                for a in args {
                    self.visit(a, Variance::Invariant);
                }
            }
            TypeKind::Union(items) | TypeKind::Intersection(items) | TypeKind::Tuple(items) => {
                for t in items {
                    self.visit(t, polarity);
                }
            }
            TypeKind::Record(fields) => {
                for t in fields.values() {
                    self.visit(t, polarity);
                }
            }
            TypeKind::Proc(p) => {
                for t in &p.params {
                    self.visit(t, polarity.flip());
                }
                for t in p.keywords.values() {
                    self.visit(t, polarity.flip());
                }
                self.visit(&p.return_type, polarity);
            }
        }
    }
}
