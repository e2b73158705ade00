pub mod solve;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::types::{ProcType, Type, TypeKind};

/// Raised when the store's invariants are broken; always a programmer bug,
/// never a property of user signatures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("variable sets overlap: {0:?} registered as both unknown and rigid")]
    OverlappingVars(Vec<String>),

    #[error("'{var}' is not an unknown of this store")]
    NotAnUnknown { var: String },

    #[error("bound {bound} of '{var}' still mentions unknowns {offenders:?} after elimination")]
    OpenBound {
        var: String,
        bound: Type,
        offenders: Vec<String>,
    },
}

/// Polarity of the bound a type is about to be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Lower,
    Upper,
}

impl Polarity {
    fn flip(self) -> Polarity {
        match self {
            Polarity::Lower => Polarity::Upper,
            Polarity::Upper => Polarity::Lower,
        }
    }
}

/// Per-variable lower/upper bound sets for one inference site.
///
/// `unknowns` are the variables the solver may bind; `vars` are rigid:
/// free in the problem but off-limits. Bounds are canonicalized on entry
/// (elimination, logic coercion) so that stored bounds never mention an
/// unknown.
#[derive(Debug, Clone, Default)]
pub struct ConstraintStore {
    unknowns: BTreeSet<String>,
    vars: BTreeSet<String>,
    lower: BTreeMap<String, Vec<Type>>,
    upper: BTreeMap<String, Vec<Type>>,
}

/// Saved bound state, for speculative subtype exploration.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    lower: BTreeMap<String, Vec<Type>>,
    upper: BTreeMap<String, Vec<Type>>,
}

impl ConstraintStore {
    /// A store with no unknowns: checks against it are purely decisional.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(
        unknowns: impl IntoIterator<Item = String>,
        vars: impl IntoIterator<Item = String>,
    ) -> Result<Self, StoreError> {
        let unknowns: BTreeSet<String> = unknowns.into_iter().collect();
        let vars: BTreeSet<String> = vars.into_iter().collect();
        let overlap: Vec<String> = unknowns.intersection(&vars).cloned().collect();
        if !overlap.is_empty() {
            return Err(StoreError::OverlappingVars(overlap));
        }
        Ok(Self { unknowns, vars, lower: BTreeMap::new(), upper: BTreeMap::new() })
    }

    pub fn is_unknown(&self, name: &str) -> bool {
        self.unknowns.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.unknowns.is_empty()
    }

    pub fn unknowns(&self) -> impl Iterator<Item = &String> {
        self.unknowns.iter()
    }

    /// Register bounds for `var`. Either side may be absent. Trivial
    /// bounds (`lower = bot`, `upper = top`) are dropped silently.
    pub fn add(
        &mut self,
        var: &str,
        lower: Option<Type>,
        upper: Option<Type>,
    ) -> Result<(), StoreError> {
        if !self.is_unknown(var) {
            return Err(StoreError::NotAnUnknown { var: var.to_string() });
        }

        if let Some(lo) = lower {
            let lo = self.eliminate(var, &lo.coerce_logic(), Polarity::Lower);
            if !lo.is_bot() {
                self.verify_closed(var, &lo)?;
                let bounds = self.lower.entry(var.to_string()).or_default();
                if !bounds.contains(&lo) {
                    bounds.push(lo);
                }
            }
        }
        if let Some(up) = upper {
            let up = self.eliminate(var, &up.coerce_logic(), Polarity::Upper);
            if !up.is_top() {
                self.verify_closed(var, &up)?;
                let bounds = self.upper.entry(var.to_string()).or_default();
                if !bounds.contains(&up) {
                    bounds.push(up);
                }
            }
        }
        Ok(())
    }

    /// The union of all lower bounds; `bot` when unconstrained from below.
    pub fn lower_bound(&self, var: &str) -> Type {
        match self.lower.get(var) {
            Some(bounds) => Type::union(bounds.clone()),
            None => Type::bot(),
        }
    }

    /// The intersection of all upper bounds; `top` when unconstrained
    /// from above.
    pub fn upper_bound(&self, var: &str) -> Type {
        match self.upper.get(var) {
            Some(bounds) => Type::intersection(bounds.clone()),
            None => Type::top(),
        }
    }

    pub fn has_bounds(&self, var: &str) -> bool {
        self.lower.get(var).map(|b| !b.is_empty()).unwrap_or(false)
            || self.upper.get(var).map(|b| !b.is_empty()).unwrap_or(false)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot { lower: self.lower.clone(), upper: self.upper.clone() }
    }

    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        self.lower = snapshot.lower;
        self.upper = snapshot.upper;
    }

    /// Canonicalize a bound of `var`: other unknowns become `top`/`bot`
    /// according to the polarity of their position, rigid variables become
    /// `any`. Keeps the stored bound monotone in `var`.
    fn eliminate(&self, var: &str, ty: &Type, polarity: Polarity) -> Type {
        let kind = match &ty.kind {
            TypeKind::Var(name) => {
                if name != var && self.unknowns.contains(name) {
                    match polarity {
                        Polarity::Upper => TypeKind::Top,
                        Polarity::Lower => TypeKind::Bot,
                    }
                } else if self.vars.contains(name) {
                    TypeKind::Any
                } else {
                    return ty.clone();
                }
            }
            TypeKind::Top | TypeKind::Bot | TypeKind::Any | TypeKind::Logic(_) => {
                return ty.clone();
            }
            TypeKind::Nominal { kind, name, args } => TypeKind::Nominal {
                kind: *kind,
                name: name.clone(),
                args: args.iter().map(|a| self.eliminate(var, a, polarity)).collect(),
            },
            TypeKind::Union(items) => {
                return Type::union(
                    items.iter().map(|t| self.eliminate(var, t, polarity)).collect(),
                );
            }
            TypeKind::Intersection(items) => {
                return Type::intersection(
                    items.iter().map(|t| self.eliminate(var, t, polarity)).collect(),
                );
            }
            TypeKind::Tuple(items) => TypeKind::Tuple(
                items.iter().map(|t| self.eliminate(var, t, polarity)).collect(),
            ),
            TypeKind::Record(fields) => TypeKind::Record(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.eliminate(var, v, polarity)))
                    .collect(),
            ),
            TypeKind::Proc(p) => TypeKind::Proc(ProcType {
                params: p
                    .params
                    .iter()
                    .map(|t| self.eliminate(var, t, polarity.flip()))
                    .collect(),
                keywords: p
                    .keywords
                    .iter()
                    .map(|(k, v)| (k.clone(), self.eliminate(var, v, polarity.flip())))
                    .collect(),
                return_type: Box::new(self.eliminate(var, &p.return_type, polarity)),
            }),
        };
        Type { kind, span: ty.span }
    }

    fn verify_closed(&self, var: &str, bound: &Type) -> Result<(), StoreError> {
        let offenders: Vec<String> = bound
            .free_vars()
            .into_iter()
            .filter(|v| self.unknowns.contains(v))
            .collect();
        if offenders.is_empty() {
            Ok(())
        } else {
            Err(StoreError::OpenBound {
                var: var.to_string(),
                bound: bound.clone(),
                offenders,
            })
        }
    }
}

impl std::fmt::Display for ConstraintStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, var) in self.unknowns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} <: {} <: {}", self.lower_bound(var), var, self.upper_bound(var))?;
        }
        Ok(())
    }
}
