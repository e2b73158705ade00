use std::collections::HashSet;

use thiserror::Error;

use crate::constraints::{ConstraintStore, StoreError};
use crate::sig::env::TypeEnv;
use crate::types::variance::Variance;
use crate::types::{NominalKind, ProcType, Type, TypeKind};

/// An ordered pair whose intended meaning is `sub <: sup`.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub sub: Type,
    pub sup: Type,
}

impl Relation {
    pub fn new(sub: Type, sup: Type) -> Self {
        Self { sub, sup }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <: {}", self.sub, self.sup)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    TypeMismatch,
    MissingMethod { method: String },
    ParameterMismatch,
    UnsatisfiableBound,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::TypeMismatch => write!(f, "type mismatch"),
            FailureReason::MissingMethod { method } => write!(f, "missing method '{method}'"),
            FailureReason::ParameterMismatch => write!(f, "parameter mismatch"),
            FailureReason::UnsatisfiableBound => write!(f, "unsatisfiable bound"),
        }
    }
}

/// A refuted subtyping obligation: the failing relation, the stack of
/// relations that led to it, and why.
#[derive(Debug, Clone)]
pub struct CheckFailure {
    pub relation: Relation,
    pub trace: Vec<Relation>,
    pub reason: FailureReason,
}

impl std::fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} does not hold: {}", self.relation, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum SubtypeError {
    /// The relation does not hold. An answer, not an error.
    #[error("{0}")]
    Failure(CheckFailure),

    /// The constraint store rejected a mutation; programmer bug.
    #[error(transparent)]
    Invariant(#[from] StoreError),
}

/// What the current check knows about its surroundings.
#[derive(Debug, Clone)]
pub struct CheckContext<'e> {
    pub env: &'e TypeEnv,
    pub self_type: Type,
    pub instance_type: Type,
    pub class_type: Type,
}

impl<'e> CheckContext<'e> {
    /// A context standing outside any class body.
    pub fn new(env: &'e TypeEnv) -> Self {
        let object = Type::instance(crate::types::builtin::OBJECT, Vec::new());
        Self {
            env,
            self_type: object.clone(),
            instance_type: object,
            class_type: Type::singleton(crate::types::builtin::OBJECT),
        }
    }

    /// The context inside the body of `name`, with its own type parameters
    /// as variables.
    pub fn for_class(env: &'e TypeEnv, name: &str) -> Self {
        let args = env
            .classes
            .get(name)
            .map(|c| c.type_params.iter().map(|(p, _)| Type::var(p.clone())).collect())
            .unwrap_or_default();
        let instance = Type::instance(name, args);
        Self {
            env,
            self_type: instance.clone(),
            instance_type: instance,
            class_type: Type::singleton(name),
        }
    }
}

/// The subtyping checker. Holds the coinduction guard set and the relation
/// trace; bounds flow into the store passed to [`Subtyping::check`].
pub struct Subtyping<'a, 'e> {
    ctx: &'a CheckContext<'e>,
    assumptions: HashSet<(Type, Type)>,
    trace: Vec<Relation>,
}

impl<'a, 'e> Subtyping<'a, 'e> {
    pub fn new(ctx: &'a CheckContext<'e>) -> Self {
        Self { ctx, assumptions: HashSet::new(), trace: Vec::new() }
    }

    /// Decide `relation`, recording bounds on the store's unknowns. On any
    /// failure the store is left exactly as it was found.
    pub fn check(
        &mut self,
        relation: &Relation,
        store: &mut ConstraintStore,
    ) -> Result<(), SubtypeError> {
        let snapshot = store.snapshot();
        match self.check_relation(relation, store) {
            Ok(()) => Ok(()),
            Err(err) => {
                store.restore(snapshot);
                Err(err)
            }
        }
    }

    /// Decide a relation without recording anything: checks against an
    /// empty store.
    pub fn check_static(&mut self, relation: &Relation) -> Result<(), SubtypeError> {
        let mut store = ConstraintStore::empty();
        self.check(relation, &mut store)
    }

    fn check_relation(
        &mut self,
        relation: &Relation,
        store: &mut ConstraintStore,
    ) -> Result<(), SubtypeError> {
        if relation.sub == relation.sup {
            return Ok(());
        }
        // Coinduction: a pair already on the stack holds by assumption.
        let key = (relation.sub.clone(), relation.sup.clone());
        if self.assumptions.contains(&key) {
            return Ok(());
        }
        self.assumptions.insert(key.clone());
        self.trace.push(relation.clone());
        let result = self.check_cases(relation, store);
        self.trace.pop();
        self.assumptions.remove(&key);
        result
    }

    fn check_cases(
        &mut self,
        relation: &Relation,
        store: &mut ConstraintStore,
    ) -> Result<(), SubtypeError> {
        let Relation { sub, sup } = relation;

        if sub.is_bot() || sup.is_top() || sub.is_any() || sup.is_any() {
            return Ok(());
        }

        // Logic types compare as the builtin bool in queries, matching the
        // coercion the store applies at its boundary.
        if matches!(sub.kind, TypeKind::Logic(_)) {
            return self.check_relation(
                &Relation::new(Type::bool_instance(), sup.clone()),
                store,
            );
        }
        if matches!(sup.kind, TypeKind::Logic(_)) {
            return self.check_relation(
                &Relation::new(sub.clone(), Type::bool_instance()),
                store,
            );
        }

        // An unknown on either side becomes a bound instead of a decision.
        if let TypeKind::Var(name) = &sup.kind {
            if store.is_unknown(name) {
                store.add(name, Some(sub.clone()), None)?;
                return Ok(());
            }
        }
        if let TypeKind::Var(name) = &sub.kind {
            if store.is_unknown(name) {
                store.add(name, None, Some(sup.clone()))?;
                return Ok(());
            }
        }

        // Aliases expand by name before any structural rule applies.
        if let TypeKind::Nominal { kind: NominalKind::Alias, name, .. } = &sub.kind {
            return match self.ctx.env.expand_alias(name) {
                Some(body) => {
                    let body = body.clone();
                    self.check_relation(&Relation::new(body, sup.clone()), store)
                }
                None => Err(self.fail(relation, FailureReason::TypeMismatch)),
            };
        }
        if let TypeKind::Nominal { kind: NominalKind::Alias, name, .. } = &sup.kind {
            return match self.ctx.env.expand_alias(name) {
                Some(body) => {
                    let body = body.clone();
                    self.check_relation(&Relation::new(sub.clone(), body), store)
                }
                None => Err(self.fail(relation, FailureReason::TypeMismatch)),
            };
        }

        // Union/intersection distribution. The universally quantified
        // sides first; the existential sides explore with rollback.
        if let TypeKind::Union(items) = &sub.kind {
            for item in items.clone() {
                self.check_relation(&Relation::new(item, sup.clone()), store)?;
            }
            return Ok(());
        }
        if let TypeKind::Intersection(items) = &sup.kind {
            for item in items.clone() {
                self.check_relation(&Relation::new(sub.clone(), item), store)?;
            }
            return Ok(());
        }
        if let TypeKind::Union(items) = &sup.kind {
            let candidates: Vec<Relation> = items
                .iter()
                .map(|item| Relation::new(sub.clone(), item.clone()))
                .collect();
            return self.check_any(relation, &candidates, store);
        }
        if let TypeKind::Intersection(items) = &sub.kind {
            let candidates: Vec<Relation> = items
                .iter()
                .map(|item| Relation::new(item.clone(), sup.clone()))
                .collect();
            return self.check_any(relation, &candidates, store);
        }

        let sub_kind = sub.kind.clone();
        let sup_kind = sup.kind.clone();
        match (sub_kind, sup_kind) {
            (
                TypeKind::Nominal { kind: NominalKind::Instance, name: sub_name, args: sub_args },
                TypeKind::Nominal { kind: NominalKind::Instance, name: sup_name, args: sup_args },
            ) => {
                if sub_name == sup_name {
                    self.check_nominal_args(relation, &sub_name, &sub_args, &sup_args, store)
                } else {
                    self.check_super_chain(relation, &sub_name, &sub_args, store)
                }
            }
            (
                TypeKind::Nominal { kind: NominalKind::Class, name: sub_name, .. },
                TypeKind::Nominal { kind: NominalKind::Class, name: sup_name, .. },
            ) => self.check_singleton_chain(relation, &sub_name, &sup_name),
            (
                TypeKind::Nominal { kind: NominalKind::Class, .. },
                TypeKind::Nominal { kind: NominalKind::Instance, name, .. },
            ) if name == crate::types::builtin::OBJECT => {
                // Class objects are objects.
                Ok(())
            }
            (
                TypeKind::Nominal { kind: NominalKind::Instance, name, args },
                TypeKind::Nominal { kind: NominalKind::Interface, name: iface, args: iface_args },
            ) => self.check_interface(relation, &name, &args, &iface, &iface_args, store),
            (
                TypeKind::Nominal { kind: NominalKind::Interface, name: sub_name, args: sub_args },
                TypeKind::Nominal { kind: NominalKind::Interface, name: sup_name, args: sup_args },
            ) => {
                if sub_name == sup_name {
                    self.check_nominal_args(relation, &sub_name, &sub_args, &sup_args, store)
                } else {
                    Err(self.fail(relation, FailureReason::TypeMismatch))
                }
            }
            (TypeKind::Tuple(sub_items), TypeKind::Tuple(sup_items)) => {
                if sub_items.len() != sup_items.len() {
                    return Err(self.fail(relation, FailureReason::TypeMismatch));
                }
                for (a, b) in sub_items.iter().zip(sup_items.iter()) {
                    self.check_relation(&Relation::new(a.clone(), b.clone()), store)?;
                }
                Ok(())
            }
            (TypeKind::Record(sub_fields), TypeKind::Record(sup_fields)) => {
                for (key, sup_ty) in &sup_fields {
                    let Some(sub_ty) = sub_fields.get(key) else {
                        return Err(self.fail(relation, FailureReason::TypeMismatch));
                    };
                    self.check_relation(&Relation::new(sub_ty.clone(), sup_ty.clone()), store)?;
                }
                Ok(())
            }
            (TypeKind::Proc(sub_proc), TypeKind::Proc(sup_proc)) => {
                self.check_proc(relation, &sub_proc, &sup_proc, store)
            }
            _ => Err(self.fail(relation, FailureReason::TypeMismatch)),
        }
    }

    /// Existential exploration: succeed on the first candidate that holds,
    /// rolling back any bounds a failed attempt recorded.
    fn check_any(
        &mut self,
        whole: &Relation,
        candidates: &[Relation],
        store: &mut ConstraintStore,
    ) -> Result<(), SubtypeError> {
        for candidate in candidates {
            let snapshot = store.snapshot();
            match self.check_relation(candidate, store) {
                Ok(()) => return Ok(()),
                Err(SubtypeError::Failure(_)) => store.restore(snapshot),
                Err(err @ SubtypeError::Invariant(_)) => return Err(err),
            }
        }
        Err(self.fail(whole, FailureReason::TypeMismatch))
    }

    /// Same-name nominal arguments, each under its declared variance.
    fn check_nominal_args(
        &mut self,
        relation: &Relation,
        name: &str,
        sub_args: &[Type],
        sup_args: &[Type],
        store: &mut ConstraintStore,
    ) -> Result<(), SubtypeError> {
        if sub_args.len() != sup_args.len() {
            return Err(self.fail(relation, FailureReason::TypeMismatch));
        }
        let variances = self
            .ctx
            .env
            .variance_table(name)
            .unwrap_or_else(|| vec![Variance::Invariant; sub_args.len()]);
        for ((a, b), variance) in sub_args.iter().zip(sup_args.iter()).zip(variances) {
            match variance {
                Variance::Covariant => {
                    self.check_relation(&Relation::new(a.clone(), b.clone()), store)?;
                }
                Variance::Contravariant => {
                    self.check_relation(&Relation::new(b.clone(), a.clone()), store)?;
                }
                Variance::Invariant => {
                    self.check_relation(&Relation::new(a.clone(), b.clone()), store)?;
                    self.check_relation(&Relation::new(b.clone(), a.clone()), store)?;
                }
            }
        }
        Ok(())
    }

    /// Differently-named instances: climb the subtype's super-chain.
    fn check_super_chain(
        &mut self,
        relation: &Relation,
        sub_name: &str,
        sub_args: &[Type],
        store: &mut ConstraintStore,
    ) -> Result<(), SubtypeError> {
        match self.ctx.env.instance_supertype(sub_name, sub_args) {
            Some(parent) => {
                self.check_relation(&Relation::new(parent, relation.sup.clone()), store)
            }
            None => Err(self.fail(relation, FailureReason::TypeMismatch)),
        }
    }

    fn check_singleton_chain(
        &mut self,
        relation: &Relation,
        sub_name: &str,
        sup_name: &str,
    ) -> Result<(), SubtypeError> {
        let mut seen = HashSet::new();
        let mut current = sub_name.to_string();
        loop {
            if current == sup_name {
                return Ok(());
            }
            if !seen.insert(current.clone()) {
                return Err(self.fail(relation, FailureReason::TypeMismatch));
            }
            match self
                .ctx
                .env
                .classes
                .get(&current)
                .and_then(|c| c.superclass.as_ref())
            {
                Some((parent, _)) => current = parent.clone(),
                None => return Err(self.fail(relation, FailureReason::TypeMismatch)),
            }
        }
    }

    /// Structural conformance of an instance against an interface: every
    /// interface method must exist on the class with a compatible type.
    fn check_interface(
        &mut self,
        relation: &Relation,
        class_name: &str,
        class_args: &[Type],
        iface_name: &str,
        iface_args: &[Type],
        store: &mut ConstraintStore,
    ) -> Result<(), SubtypeError> {
        let Some(wanted) = self.ctx.env.interface_methods(iface_name, iface_args) else {
            return Err(self.fail(relation, FailureReason::TypeMismatch));
        };
        for (method, sig) in wanted {
            let Some((_, found)) = self.ctx.env.lookup_method(class_name, class_args, &method)
            else {
                return Err(self.fail(relation, FailureReason::MissingMethod { method }));
            };
            self.check_proc(relation, &found.ty, &sig.ty, store)?;
        }
        Ok(())
    }

    /// Procs: parameters contravariant, keywords matched by name, return
    /// covariant.
    fn check_proc(
        &mut self,
        relation: &Relation,
        sub_proc: &ProcType,
        sup_proc: &ProcType,
        store: &mut ConstraintStore,
    ) -> Result<(), SubtypeError> {
        if sub_proc.params.len() != sup_proc.params.len() {
            return Err(self.fail(relation, FailureReason::ParameterMismatch));
        }
        for (sub_param, sup_param) in sub_proc.params.iter().zip(sup_proc.params.iter()) {
            self.check_relation(
                &Relation::new(sup_param.clone(), sub_param.clone()),
                store,
            )?;
        }
        for (name, sup_kw) in &sup_proc.keywords {
            let Some(sub_kw) = sub_proc.keywords.get(name) else {
                return Err(self.fail(relation, FailureReason::ParameterMismatch));
            };
            self.check_relation(&Relation::new(sup_kw.clone(), sub_kw.clone()), store)?;
        }
        self.check_relation(
            &Relation::new(
                (*sub_proc.return_type).clone(),
                (*sup_proc.return_type).clone(),
            ),
            store,
        )
    }

    fn fail(&self, relation: &Relation, reason: FailureReason) -> SubtypeError {
        SubtypeError::Failure(CheckFailure {
            relation: relation.clone(),
            trace: self.trace.clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::register_file;
    use crate::types::builtin;
    use std::path::Path;

    fn env_with(source: &str) -> TypeEnv {
        let mut env = TypeEnv::with_builtins();
        let file = crate::parser::parse_source(source).unwrap();
        let diags = register_file(&mut env, Path::new("test.sig"), &file);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        env
    }

    fn holds(env: &TypeEnv, sub: Type, sup: Type) -> bool {
        let ctx = CheckContext::new(env);
        let mut checker = Subtyping::new(&ctx);
        checker.check_static(&Relation::new(sub, sup)).is_ok()
    }

    fn int() -> Type {
        Type::instance(builtin::INTEGER, vec![])
    }

    fn string() -> Type {
        Type::instance(builtin::STRING, vec![])
    }

    fn numeric() -> Type {
        Type::instance(builtin::NUMERIC, vec![])
    }

    #[test]
    fn lattice_extremes() {
        let env = TypeEnv::with_builtins();
        assert!(holds(&env, Type::bot(), int()));
        assert!(holds(&env, int(), Type::top()));
        assert!(holds(&env, Type::any(), int()));
        assert!(holds(&env, int(), Type::any()));
        assert!(!holds(&env, Type::top(), int()));
    }

    #[test]
    fn super_chain_walks_transitively() {
        let env = TypeEnv::with_builtins();
        assert!(holds(&env, int(), numeric()));
        assert!(holds(&env, int(), Type::instance(builtin::OBJECT, vec![])));
        assert!(!holds(&env, numeric(), int()));
        assert!(!holds(&env, int(), string()));
    }

    #[test]
    fn covariant_generic_arguments() {
        let env = TypeEnv::with_builtins();
        let ints = Type::instance(builtin::ARRAY, vec![int()]);
        let nums = Type::instance(builtin::ARRAY, vec![numeric()]);
        assert!(holds(&env, ints.clone(), nums.clone()));
        assert!(!holds(&env, nums, ints));
    }

    #[test]
    fn invariant_generic_arguments() {
        let env = TypeEnv::with_builtins();
        let by_int = Type::instance(builtin::HASH, vec![int(), string()]);
        let by_num = Type::instance(builtin::HASH, vec![numeric(), string()]);
        assert!(!holds(&env, by_int.clone(), by_num.clone()));
        assert!(!holds(&env, by_num, by_int.clone()));
        assert!(holds(&env, by_int.clone(), by_int));
    }

    #[test]
    fn union_distribution() {
        let env = TypeEnv::with_builtins();
        let int_or_float = Type::union(vec![
            int(),
            Type::instance(builtin::FLOAT, vec![]),
        ]);
        assert!(holds(&env, int_or_float.clone(), numeric()));
        assert!(holds(&env, int(), int_or_float.clone()));
        assert!(!holds(&env, int_or_float, int()));
    }

    #[test]
    fn intersection_distribution() {
        let env = TypeEnv::with_builtins();
        let both = Type::intersection(vec![int(), string()]);
        assert!(holds(&env, both.clone(), int()));
        assert!(holds(&env, both, string()));
        assert!(!holds(&env, int(), Type::intersection(vec![int(), string()])));
    }

    #[test]
    fn tuples_are_position_sensitive() {
        let env = TypeEnv::with_builtins();
        let sub = Type::tuple(vec![int(), string()]);
        let sup = Type::tuple(vec![numeric(), string()]);
        assert!(holds(&env, sub.clone(), sup));
        assert!(!holds(&env, sub.clone(), Type::tuple(vec![string(), int()])));
        assert!(!holds(&env, sub, Type::tuple(vec![int()])));
    }

    #[test]
    fn record_width_and_depth() {
        use std::collections::BTreeMap;
        let env = TypeEnv::with_builtins();
        let wide = Type::record(BTreeMap::from([
            ("name".to_string(), string()),
            ("size".to_string(), int()),
        ]));
        let narrow = Type::record(BTreeMap::from([("size".to_string(), numeric())]));
        assert!(holds(&env, wide.clone(), narrow.clone()));
        assert!(!holds(&env, narrow, wide));
    }

    #[test]
    fn proc_parameters_are_contravariant() {
        use std::collections::BTreeMap;
        let env = TypeEnv::with_builtins();
        let takes_num = Type::proc_type(vec![numeric()], BTreeMap::new(), int());
        let takes_int = Type::proc_type(vec![int()], BTreeMap::new(), int());
        assert!(holds(&env, takes_num.clone(), takes_int.clone()));
        assert!(!holds(&env, takes_int, takes_num));
    }

    #[test]
    fn proc_keywords_match_by_name() {
        use std::collections::BTreeMap;
        let env = TypeEnv::with_builtins();
        let with_kw = Type::proc_type(
            vec![],
            BTreeMap::from([("depth".to_string(), numeric())]),
            int(),
        );
        let wants_kw = Type::proc_type(
            vec![],
            BTreeMap::from([("depth".to_string(), int())]),
            int(),
        );
        assert!(holds(&env, with_kw, wants_kw.clone()));
        let without = Type::proc_type(vec![], BTreeMap::new(), int());
        assert!(!holds(&env, without, wants_kw));
    }

    #[test]
    fn unknown_on_the_right_records_a_lower_bound() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut checker = Subtyping::new(&ctx);
        let mut store =
            ConstraintStore::new(["T".to_string()], []).unwrap();
        checker
            .check(&Relation::new(int(), Type::var("T")), &mut store)
            .unwrap();
        assert_eq!(store.lower_bound("T"), int());
        assert!(store.upper_bound("T").is_top());
    }

    #[test]
    fn unknown_on_the_left_records_an_upper_bound() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut checker = Subtyping::new(&ctx);
        let mut store =
            ConstraintStore::new(["T".to_string()], []).unwrap();
        checker
            .check(&Relation::new(Type::var("T"), numeric()), &mut store)
            .unwrap();
        assert_eq!(store.upper_bound("T"), numeric());
    }

    #[test]
    fn failed_check_leaves_no_bounds_behind() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut checker = Subtyping::new(&ctx);
        let mut store =
            ConstraintStore::new(["T".to_string()], []).unwrap();
        // The tuple arm records a bound on T before the Integer/String
        // mismatch fails the whole relation.
        let sub = Type::tuple(vec![int(), int()]);
        let sup = Type::tuple(vec![Type::var("T"), string()]);
        let result = checker.check(&Relation::new(sub, sup), &mut store);
        assert!(result.is_err());
        assert!(!store.has_bounds("T"));
    }

    #[test]
    fn union_supertype_rolls_back_failed_branches() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut checker = Subtyping::new(&ctx);
        let mut store =
            ConstraintStore::new(["T".to_string()], []).unwrap();
        // First disjunct [T, String] fails on the second element; the
        // bound recorded for T along the way must not survive. Second
        // disjunct [T, Integer] succeeds and records Integer.
        let sub = Type::tuple(vec![int(), int()]);
        let sup = Type::union(vec![
            Type::tuple(vec![Type::var("T"), string()]),
            Type::tuple(vec![Type::var("T"), int()]),
        ]);
        checker.check(&Relation::new(sub, sup), &mut store).unwrap();
        assert_eq!(store.lower_bound("T"), int());
    }

    #[test]
    fn recursive_alias_terminates_by_coinduction() {
        let env = env_with("type json = Integer | String | Array[json]");
        assert!(holds(
            &env,
            Type::instance(builtin::ARRAY, vec![Type::alias("json", vec![])]),
            Type::alias("json", vec![]),
        ));
    }

    #[test]
    fn interface_conformance_is_structural() {
        let env = env_with(
            "interface _Sized\n\
             \x20 def size: () -> Integer\n\
             end\n\
             class Buffer < Object\n\
             \x20 def size: () -> Integer\n\
             end\n\
             class Blob < Object\n\
             end",
        );
        assert!(holds(
            &env,
            Type::instance("Buffer", vec![]),
            Type::interface("_Sized", vec![]),
        ));
        let ctx = CheckContext::new(&env);
        let mut checker = Subtyping::new(&ctx);
        let err = checker
            .check_static(&Relation::new(
                Type::instance("Blob", vec![]),
                Type::interface("_Sized", vec![]),
            ))
            .unwrap_err();
        match err {
            SubtypeError::Failure(failure) => {
                assert_eq!(
                    failure.reason,
                    FailureReason::MissingMethod { method: "size".to_string() }
                );
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[test]
    fn user_hierarchy_with_substituted_superclass() {
        let env = env_with(
            "class Stack[E] < Array[E]\n\
             \x20 def pop: () -> (E | Nil)\n\
             end",
        );
        let sub = Type::instance("Stack", vec![int()]);
        let sup = Type::instance(builtin::ARRAY, vec![numeric()]);
        assert!(holds(&env, sub, sup));
    }
}
