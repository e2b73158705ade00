use std::collections::BTreeSet;

use thiserror::Error;

use super::{ConstraintStore, StoreError};
use crate::subtyping::{CheckContext, Relation, SubtypeError, Subtyping};
use crate::types::subst::Substitution;
use crate::types::variance::{VariableVariance, Variance};
use crate::types::Type;

/// Solver failure values. `Unsatisfiable` is an answer about the user's
/// types; `Invariant` is a programmer bug surfacing.
#[derive(Debug, Error)]
pub enum SolveFailure {
    #[error("no type satisfies {lower} <: {var} <: {upper}")]
    Unsatisfiable { var: String, lower: Type, upper: Type },

    #[error(transparent)]
    Invariant(#[from] StoreError),
}

/// Produce a substitution binding every unknown of `store` such that all
/// accumulated bounds hold under the subtyping checker.
///
/// Unknowns with a single non-trivial bound bind to it directly. Unknowns
/// bounded on both ends are verified (`lower <: upper`) under a nested
/// store whose unknowns are the still-free variables of those relations;
/// the nested solution refines the bounds before the variance-directed
/// pick. Unconstrained unknowns default to `any`.
pub fn solve(
    store: &ConstraintStore,
    ctx: &CheckContext,
    variance: &VariableVariance,
) -> Result<Substitution, SolveFailure> {
    let mut solution = Substitution::new();
    let mut double_ended = Vec::new();

    for var in store.unknowns() {
        let lower = store.lower_bound(var);
        let upper = store.upper_bound(var);
        match (lower.is_bot(), upper.is_top()) {
            // Free: provisionally unbound, defaulted at the end.
            (true, true) => {}
            (false, true) => solution.add(var.clone(), lower),
            (true, false) => solution.add(var.clone(), upper),
            (false, false) => double_ended.push(var.clone()),
        }
    }

    if !double_ended.is_empty() {
        let relations: Vec<(String, Relation)> = double_ended
            .iter()
            .map(|var| {
                let lower = solution.apply(&store.lower_bound(var));
                let upper = solution.apply(&store.upper_bound(var));
                (var.clone(), Relation::new(lower, upper))
            })
            .collect();

        // The nested store binds the variables still free in the
        // relations. Elimination keeps stored bounds clear of this store's
        // unknowns, so the nested unknown set never overlaps ours and the
        // recursion bottoms out.
        let mut nested_unknowns = BTreeSet::new();
        for (_, relation) in &relations {
            for v in relation.sub.free_vars().into_iter().chain(relation.sup.free_vars()) {
                if !store.is_unknown(&v) {
                    nested_unknowns.insert(v);
                }
            }
        }
        let mut nested = ConstraintStore::new(nested_unknowns, [])?;

        let mut checker = Subtyping::new(ctx);
        for (var, relation) in &relations {
            if let Err(err) = checker.check(relation, &mut nested) {
                return Err(match err {
                    SubtypeError::Failure(_) => SolveFailure::Unsatisfiable {
                        var: var.clone(),
                        lower: relation.sub.clone(),
                        upper: relation.sup.clone(),
                    },
                    SubtypeError::Invariant(e) => SolveFailure::Invariant(e),
                });
            }
        }

        let nested_solution = if nested.is_empty() {
            Substitution::new()
        } else {
            solve(&nested, ctx, variance)?
        };
        solution.merge(&nested_solution);

        for (var, relation) in &relations {
            let lower = nested_solution.apply(&relation.sub);
            let upper = nested_solution.apply(&relation.sup);
            let chosen = match variance.variance_of(var) {
                Variance::Contravariant => upper,
                Variance::Covariant => lower,
                // Prefer the smaller type tree; ties go to the lower bound.
                Variance::Invariant => {
                    if lower.level() <= upper.level() {
                        lower
                    } else {
                        upper
                    }
                }
            };
            solution.add(var.clone(), chosen);
        }
    }

    for var in store.unknowns() {
        if solution.get(var).is_none() {
            solution.add(var.clone(), Type::any());
        }
    }

    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::env::TypeEnv;
    use crate::types::builtin;

    fn int() -> Type {
        Type::instance(builtin::INTEGER, vec![])
    }

    fn numeric() -> Type {
        Type::instance(builtin::NUMERIC, vec![])
    }

    fn string() -> Type {
        Type::instance(builtin::STRING, vec![])
    }

    fn store_with(unknowns: &[&str]) -> ConstraintStore {
        ConstraintStore::new(unknowns.iter().map(|s| s.to_string()), []).unwrap()
    }

    fn covariant(vars: &[&str]) -> VariableVariance {
        let mut vv = VariableVariance::default();
        for v in vars {
            vv.insert(*v, Variance::Covariant);
        }
        vv
    }

    #[test]
    fn lower_bounded_unknown_binds_to_lower() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut store = store_with(&["T"]);
        store.add("T", Some(int()), None).unwrap();

        let solution = solve(&store, &ctx, &covariant(&["T"])).unwrap();
        assert_eq!(solution.apply(&Type::var("T")), int());
    }

    #[test]
    fn upper_bounded_unknown_binds_to_upper() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut store = store_with(&["T"]);
        store.add("T", None, Some(numeric())).unwrap();

        let solution = solve(&store, &ctx, &covariant(&["T"])).unwrap();
        assert_eq!(solution.apply(&Type::var("T")), numeric());
    }

    #[test]
    fn invariant_tiebreak_prefers_lower() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut store = store_with(&["T"]);
        store.add("T", Some(int()), Some(numeric())).unwrap();

        // Both bounds have level 1; the tie goes to the lower bound.
        let mut vv = VariableVariance::default();
        vv.insert("T", Variance::Invariant);
        let solution = solve(&store, &ctx, &vv).unwrap();
        assert_eq!(solution.apply(&Type::var("T")), int());
    }

    #[test]
    fn invariant_pick_takes_smaller_tree() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut store = store_with(&["T"]);
        let small = Type::instance(builtin::ARRAY, vec![Type::bot()]);
        let large = Type::instance(builtin::ARRAY, vec![Type::union(vec![int(), string()])]);
        store.add("T", Some(small.clone()), Some(large)).unwrap();

        let mut vv = VariableVariance::default();
        vv.insert("T", Variance::Invariant);
        let solution = solve(&store, &ctx, &vv).unwrap();
        assert_eq!(solution.apply(&Type::var("T")), small);
    }

    #[test]
    fn double_ended_covariant_binds_to_lower() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut store = store_with(&["T"]);
        store.add("T", Some(int()), Some(numeric())).unwrap();

        let solution = solve(&store, &ctx, &covariant(&["T"])).unwrap();
        assert_eq!(solution.apply(&Type::var("T")), int());
    }

    #[test]
    fn double_ended_contravariant_binds_to_upper() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut store = store_with(&["T"]);
        store.add("T", Some(int()), Some(numeric())).unwrap();

        let mut vv = VariableVariance::default();
        vv.insert("T", Variance::Contravariant);
        let solution = solve(&store, &ctx, &vv).unwrap();
        assert_eq!(solution.apply(&Type::var("T")), numeric());
    }

    #[test]
    fn contradictory_bounds_are_unsatisfiable() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut store = store_with(&["T"]);
        store.add("T", Some(string()), Some(int())).unwrap();

        let err = solve(&store, &ctx, &covariant(&["T"])).unwrap_err();
        match err {
            SolveFailure::Unsatisfiable { var, lower, upper } => {
                assert_eq!(var, "T");
                assert_eq!(lower, string());
                assert_eq!(upper, int());
            }
            other => panic!("expected unsatisfiable, got {other}"),
        }
    }

    #[test]
    fn unconstrained_unknowns_default_to_any() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let store = store_with(&["T", "U"]);

        let solution = solve(&store, &ctx, &covariant(&["T", "U"])).unwrap();
        assert!(solution.apply(&Type::var("T")).is_any());
        assert!(solution.apply(&Type::var("U")).is_any());
    }

    #[test]
    fn solution_is_idempotent() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut store = store_with(&["T", "U"]);
        store
            .add("T", Some(Type::instance(builtin::ARRAY, vec![Type::var("U")])), None)
            .unwrap();
        store.add("U", Some(int()), None).unwrap();

        let solution = solve(&store, &ctx, &covariant(&["T", "U"])).unwrap();
        for var in ["T", "U"] {
            let once = solution.apply(&Type::var(var));
            let twice = solution.apply(&once);
            assert_eq!(once, twice, "solution not idempotent on {var}");
        }
    }

    #[test]
    fn solution_satisfies_both_bounds() {
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut store = store_with(&["T"]);
        store.add("T", Some(int()), Some(numeric())).unwrap();

        let solution = solve(&store, &ctx, &covariant(&["T"])).unwrap();
        let bound = solution.apply(&Type::var("T"));

        let mut checker = Subtyping::new(&ctx);
        checker
            .check_static(&Relation::new(store.lower_bound("T"), bound.clone()))
            .unwrap();
        checker
            .check_static(&Relation::new(bound, store.upper_bound("T")))
            .unwrap();
    }

    #[test]
    fn nested_store_never_shares_unknowns() {
        // Bounds mention a variable that is not an unknown of the outer
        // store; it becomes a nested unknown and gets solved one level
        // down, strictly shrinking the original problem.
        let env = TypeEnv::with_builtins();
        let ctx = CheckContext::new(&env);
        let mut store = ConstraintStore::new(
            ["T".to_string()],
            [],
        )
        .unwrap();
        store
            .add(
                "T",
                Some(Type::instance(builtin::ARRAY, vec![Type::var("E")])),
                Some(Type::instance(builtin::ARRAY, vec![Type::var("E")])),
            )
            .unwrap();

        let mut vv = VariableVariance::default();
        vv.insert("T", Variance::Invariant);
        let solution = solve(&store, &ctx, &vv).unwrap();
        // E was free in the nested store and defaulted to any.
        assert_eq!(
            solution.apply(&Type::var("T")),
            Type::instance(builtin::ARRAY, vec![Type::any()])
        );
    }
}
