use std::collections::BTreeMap;

use super::{Type, TypeKind};

/// A finite map from type-variable names to types.
///
/// Kept idempotent by construction: adding a binding first applies the
/// existing substitution to the incoming type, then rewrites every stored
/// entry with the new binding. Applying a substitution twice therefore
/// yields the same result as applying it once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    map: BTreeMap<String, Type>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.map.get(name)
    }

    pub fn domain(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Type)> {
        self.map.iter()
    }

    /// A simultaneous substitution: every binding applies to the original
    /// input only, never to another binding's output. Used for renaming
    /// declared type parameters, where `[A, B] -> [B, A]` must swap.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Type)>) -> Self {
        Self { map: pairs.into_iter().collect() }
    }

    /// Bind `name` to `ty`, preserving idempotence.
    pub fn add(&mut self, name: impl Into<String>, ty: Type) {
        let name = name.into();
        let ty = self.apply(&ty);
        let single = Substitution {
            map: BTreeMap::from([(name.clone(), ty.clone())]),
        };
        for existing in self.map.values_mut() {
            *existing = single.apply(existing);
        }
        self.map.insert(name, ty);
    }

    /// Fold every binding of `other` into `self`.
    pub fn merge(&mut self, other: &Substitution) {
        for (name, ty) in &other.map {
            self.add(name.clone(), ty.clone());
        }
    }

    /// Apply the substitution to a type, producing a new tree.
    pub fn apply(&self, ty: &Type) -> Type {
        if self.map.is_empty() {
            return ty.clone();
        }
        ty.map(&mut |t| match &t.kind {
            TypeKind::Var(name) => self.map.get(name).cloned(),
            _ => None,
        })
    }
}

impl std::fmt::Display for Substitution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (name, ty)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name} => {ty}")?;
        }
        write!(f, "}}")
    }
}
