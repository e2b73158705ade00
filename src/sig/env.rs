use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::span::Span;
use crate::types::subst::Substitution;
use crate::types::variance::Variance;
use crate::types::{builtin, ProcType, Type};

/// A method signature as registered in the environment: method-level type
/// parameters plus the proc type, with `self`/`instance`/`class` already
/// resolved against the owning declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    pub type_params: Vec<String>,
    pub ty: ProcType,
    pub span: Span,
}

impl MethodSig {
    /// The signature as a plain type, for display and variance analysis.
    pub fn as_type(&self) -> Type {
        Type::new(crate::types::TypeKind::Proc(self.ty.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    pub type_params: Vec<(String, Variance)>,
    /// Superclass name and arguments, expressed over this class's own
    /// type parameters. `None` only for the root class.
    pub superclass: Option<(String, Vec<Type>)>,
    pub includes: Vec<(String, Vec<Type>)>,
    pub methods: BTreeMap<String, MethodSig>,
    pub path: Option<PathBuf>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceInfo {
    pub name: String,
    pub type_params: Vec<(String, Variance)>,
    pub methods: BTreeMap<String, MethodSig>,
    pub path: Option<PathBuf>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasInfo {
    pub name: String,
    pub body: Type,
    pub path: Option<PathBuf>,
    pub span: Span,
}

/// The signature environment: every declaration the checker knows about.
///
/// Built once per load, immutable during checking. Builtins are registered
/// by [`TypeEnv::with_builtins`]; there is no global registry.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    pub classes: BTreeMap<String, ClassInfo>,
    pub interfaces: BTreeMap<String, InterfaceInfo>,
    pub aliases: BTreeMap<String, AliasInfo>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment seeded with the core class hierarchy.
    pub fn with_builtins() -> Self {
        let mut env = Self::new();
        env.add_builtin_class(builtin::OBJECT, &[], None);
        env.add_builtin_class(builtin::NIL, &[], Some(builtin::OBJECT));
        env.add_builtin_class(builtin::BOOL, &[], Some(builtin::OBJECT));
        env.add_builtin_class(builtin::NUMERIC, &[], Some(builtin::OBJECT));
        env.add_builtin_class(builtin::INTEGER, &[], Some(builtin::NUMERIC));
        env.add_builtin_class(builtin::FLOAT, &[], Some(builtin::NUMERIC));
        env.add_builtin_class(builtin::STRING, &[], Some(builtin::OBJECT));
        env.add_builtin_class(builtin::SYMBOL, &[], Some(builtin::OBJECT));
        env.add_builtin_class(
            builtin::ARRAY,
            &[("T", Variance::Covariant)],
            Some(builtin::OBJECT),
        );
        env.add_builtin_class(
            builtin::HASH,
            &[("K", Variance::Invariant), ("V", Variance::Covariant)],
            Some(builtin::OBJECT),
        );
        env
    }

    fn add_builtin_class(
        &mut self,
        name: &str,
        type_params: &[(&str, Variance)],
        superclass: Option<&str>,
    ) {
        self.classes.insert(
            name.to_string(),
            ClassInfo {
                name: name.to_string(),
                type_params: type_params
                    .iter()
                    .map(|(n, v)| (n.to_string(), *v))
                    .collect(),
                superclass: superclass.map(|s| (s.to_string(), Vec::new())),
                includes: Vec::new(),
                methods: BTreeMap::new(),
                path: None,
                span: Span::dummy(),
            },
        );
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.classes
            .get(name)
            .map(|c| c.path.is_none())
            .unwrap_or(false)
    }

    /// Declared argument variance for a class or interface.
    pub fn variance_table(&self, name: &str) -> Option<Vec<Variance>> {
        if let Some(c) = self.classes.get(name) {
            return Some(c.type_params.iter().map(|(_, v)| *v).collect());
        }
        self.interfaces
            .get(name)
            .map(|i| i.type_params.iter().map(|(_, v)| *v).collect())
    }

    /// Declared generic arity for any named declaration.
    pub fn arity_of(&self, name: &str) -> Option<usize> {
        if let Some(c) = self.classes.get(name) {
            return Some(c.type_params.len());
        }
        if let Some(i) = self.interfaces.get(name) {
            return Some(i.type_params.len());
        }
        self.aliases.get(name).map(|_| 0)
    }

    /// The instantiated direct supertype of `name[args]`, if any.
    pub fn instance_supertype(&self, name: &str, args: &[Type]) -> Option<Type> {
        let class = self.classes.get(name)?;
        let (sup_name, sup_args) = class.superclass.as_ref()?;
        let subst = param_subst(&class.type_params, args);
        let args = sup_args.iter().map(|a| subst.apply(a)).collect();
        Some(Type::instance(sup_name.clone(), args))
    }

    /// Detect a cycle in the alias graph reachable from `start`. Returns
    /// the names on the cycle when one exists.
    pub fn alias_cycle(&self, start: &str) -> Option<Vec<String>> {
        let mut trail = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = start.to_string();
        loop {
            if !seen.insert(current.clone()) {
                let pos = trail.iter().position(|n| *n == current)?;
                return Some(trail[pos..].to_vec());
            }
            trail.push(current.clone());
            let body = &self.aliases.get(&current)?.body;
            // Follow the first alias referenced by the body. Aliases whose
            // expansion goes through a class constructor (e.g. a list of
            // itself) are productive and terminate name lookup.
            match direct_alias_ref(body) {
                Some(next) => current = next,
                None => return None,
            }
        }
    }

    /// One-step alias expansion.
    pub fn expand_alias(&self, name: &str) -> Option<&Type> {
        self.aliases.get(name).map(|a| &a.body)
    }

    /// Detect a cycle in the superclass chain starting at `start`.
    pub fn superclass_cycle(&self, start: &str) -> Option<Vec<String>> {
        let mut trail = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = start.to_string();
        loop {
            if !seen.insert(current.clone()) {
                let pos = trail.iter().position(|n| *n == current)?;
                return Some(trail[pos..].to_vec());
            }
            trail.push(current.clone());
            match self.classes.get(&current).and_then(|c| c.superclass.as_ref()) {
                Some((parent, _)) => current = parent.clone(),
                None => return None,
            }
        }
    }

    /// Look up a method on a class, walking the super-chain. Returns the
    /// owning class name and the signature substituted into the namespace
    /// of `name[args]`. Declaration cycles terminate the walk.
    pub fn lookup_method(
        &self,
        name: &str,
        args: &[Type],
        method: &str,
    ) -> Option<(String, MethodSig)> {
        let mut seen = BTreeSet::new();
        let mut name = name.to_string();
        let mut args = args.to_vec();
        loop {
            if !seen.insert(name.clone()) {
                return None;
            }
            let class = self.classes.get(&name)?;
            let subst = param_subst(&class.type_params, &args);
            if let Some(sig) = class.methods.get(method) {
                return Some((name, apply_to_sig(&subst, sig)));
            }
            let (sup_name, sup_args) = class.superclass.as_ref()?;
            args = sup_args.iter().map(|a| subst.apply(a)).collect();
            name = sup_name.clone();
        }
    }

    /// Interface methods substituted for a concrete instantiation.
    pub fn interface_methods(
        &self,
        name: &str,
        args: &[Type],
    ) -> Option<BTreeMap<String, MethodSig>> {
        let iface = self.interfaces.get(name)?;
        let subst = param_subst(&iface.type_params, args);
        Some(
            iface
                .methods
                .iter()
                .map(|(n, sig)| (n.clone(), apply_to_sig(&subst, sig)))
                .collect(),
        )
    }

    /// All declaration names, for completion.
    pub fn decl_names(&self) -> impl Iterator<Item = &String> {
        self.classes
            .keys()
            .chain(self.interfaces.keys())
            .chain(self.aliases.keys())
    }
}

/// Substitution binding declared parameters to concrete arguments,
/// simultaneously (arguments may mention the parameter names themselves).
/// Missing arguments map to `any`, surplus arguments are ignored; arity
/// errors are reported separately by the file checker.
fn param_subst(params: &[(String, Variance)], args: &[Type]) -> Substitution {
    Substitution::from_pairs(params.iter().enumerate().map(|(i, (name, _))| {
        (name.clone(), args.get(i).cloned().unwrap_or_else(Type::any))
    }))
}

fn apply_to_sig(subst: &Substitution, sig: &MethodSig) -> MethodSig {
    MethodSig {
        type_params: sig.type_params.clone(),
        ty: ProcType {
            params: sig.ty.params.iter().map(|t| subst.apply(t)).collect(),
            keywords: sig
                .ty
                .keywords
                .iter()
                .map(|(k, v)| (k.clone(), subst.apply(v)))
                .collect(),
            return_type: Box::new(subst.apply(&sig.ty.return_type)),
        },
        span: sig.span,
    }
}

/// The first alias mentioned at a name-lookup position of `ty`: through
/// unions/intersections but not through class constructors.
fn direct_alias_ref(ty: &Type) -> Option<String> {
    use crate::types::{NominalKind, TypeKind};
    match &ty.kind {
        TypeKind::Nominal { kind: NominalKind::Alias, name, .. } => Some(name.clone()),
        TypeKind::Union(items) | TypeKind::Intersection(items) => {
            items.iter().find_map(direct_alias_ref)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_form_a_chain() {
        let env = TypeEnv::with_builtins();
        let sup = env.instance_supertype(builtin::INTEGER, &[]).unwrap();
        assert_eq!(sup, Type::instance(builtin::NUMERIC, vec![]));
        let sup = env.instance_supertype(builtin::NUMERIC, &[]).unwrap();
        assert_eq!(sup, Type::instance(builtin::OBJECT, vec![]));
        assert!(env.instance_supertype(builtin::OBJECT, &[]).is_none());
    }

    #[test]
    fn supertype_substitutes_arguments() {
        let mut env = TypeEnv::with_builtins();
        env.classes.insert(
            "Stack".to_string(),
            ClassInfo {
                name: "Stack".to_string(),
                type_params: vec![("E".to_string(), Variance::Invariant)],
                superclass: Some(("Array".to_string(), vec![Type::var("E")])),
                includes: Vec::new(),
                methods: BTreeMap::new(),
                path: None,
                span: Span::dummy(),
            },
        );
        let sup = env
            .instance_supertype("Stack", &[Type::instance("Integer", vec![])])
            .unwrap();
        assert_eq!(
            sup,
            Type::instance("Array", vec![Type::instance("Integer", vec![])])
        );
    }

    #[test]
    fn alias_cycle_detected() {
        let mut env = TypeEnv::new();
        for (name, target) in [("a", "b"), ("b", "a")] {
            env.aliases.insert(
                name.to_string(),
                AliasInfo {
                    name: name.to_string(),
                    body: Type::alias(target, vec![]),
                    path: None,
                    span: Span::dummy(),
                },
            );
        }
        let cycle = env.alias_cycle("a").unwrap();
        assert_eq!(cycle.len(), 2);
    }

    #[test]
    fn productive_alias_is_not_a_cycle() {
        let mut env = TypeEnv::new();
        env.aliases.insert(
            "json".to_string(),
            AliasInfo {
                name: "json".to_string(),
                body: Type::union(vec![
                    Type::instance("Integer", vec![]),
                    Type::instance("Array", vec![Type::alias("json", vec![])]),
                ]),
                path: None,
                span: Span::dummy(),
            },
        );
        assert!(env.alias_cycle("json").is_none());
    }
}
