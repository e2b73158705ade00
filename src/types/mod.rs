pub mod subst;
pub mod variance;

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use crate::span::Span;

/// Names of the core classes every environment starts with.
pub mod builtin {
    pub const OBJECT: &str = "Object";
    pub const NIL: &str = "Nil";
    pub const BOOL: &str = "Bool";
    pub const NUMERIC: &str = "Numeric";
    pub const INTEGER: &str = "Integer";
    pub const FLOAT: &str = "Float";
    pub const STRING: &str = "String";
    pub const SYMBOL: &str = "Symbol";
    pub const ARRAY: &str = "Array";
    pub const HASH: &str = "Hash";
}

/// Which flavor of named type a `Nominal` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NominalKind {
    /// An instance of a class, e.g. `Integer`.
    Instance,
    /// The class object itself, e.g. `singleton(Integer)`.
    Class,
    /// A named type alias, expanded on demand.
    Alias,
    /// A structural interface.
    Interface,
}

/// Truthiness-tracking types produced at expression positions.
/// Coerced to the builtin bool at the constraint-store boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LogicKind {
    Truthy,
    Falsy,
    Envelope,
}

/// A function/block type: positional parameters, keyword parameters, return.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProcType {
    pub params: Vec<Type>,
    pub keywords: BTreeMap<String, Type>,
    pub return_type: Box<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TypeKind {
    /// A type variable. Whether it is an unknown or rigid is decided by the
    /// constraint store consulted at check time.
    Var(String),
    /// Supertype of everything.
    Top,
    /// Subtype of everything.
    Bot,
    /// The dynamic escape hatch: compatible in both directions.
    Any,
    Nominal {
        kind: NominalKind,
        name: String,
        args: Vec<Type>,
    },
    Union(Vec<Type>),
    Intersection(Vec<Type>),
    Tuple(Vec<Type>),
    Record(BTreeMap<String, Type>),
    Proc(ProcType),
    Logic(LogicKind),
}

/// A structural type. Equality and hashing ignore the span: two types that
/// print the same are the same.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Type {
    pub kind: TypeKind,
    pub span: Option<Span>,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self { kind, span: None }
    }

    pub fn with_span(kind: TypeKind, span: Span) -> Self {
        Self { kind, span: Some(span) }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::new(TypeKind::Var(name.into()))
    }

    pub fn top() -> Self {
        Self::new(TypeKind::Top)
    }

    pub fn bot() -> Self {
        Self::new(TypeKind::Bot)
    }

    pub fn any() -> Self {
        Self::new(TypeKind::Any)
    }

    pub fn instance(name: impl Into<String>, args: Vec<Type>) -> Self {
        Self::new(TypeKind::Nominal { kind: NominalKind::Instance, name: name.into(), args })
    }

    pub fn singleton(name: impl Into<String>) -> Self {
        Self::new(TypeKind::Nominal { kind: NominalKind::Class, name: name.into(), args: Vec::new() })
    }

    pub fn alias(name: impl Into<String>, args: Vec<Type>) -> Self {
        Self::new(TypeKind::Nominal { kind: NominalKind::Alias, name: name.into(), args })
    }

    pub fn interface(name: impl Into<String>, args: Vec<Type>) -> Self {
        Self::new(TypeKind::Nominal { kind: NominalKind::Interface, name: name.into(), args })
    }

    pub fn tuple(items: Vec<Type>) -> Self {
        Self::new(TypeKind::Tuple(items))
    }

    pub fn record(fields: BTreeMap<String, Type>) -> Self {
        Self::new(TypeKind::Record(fields))
    }

    pub fn proc_type(params: Vec<Type>, keywords: BTreeMap<String, Type>, return_type: Type) -> Self {
        Self::new(TypeKind::Proc(ProcType { params, keywords, return_type: Box::new(return_type) }))
    }

    pub fn logic(kind: LogicKind) -> Self {
        Self::new(TypeKind::Logic(kind))
    }

    pub fn bool_instance() -> Self {
        Self::instance(builtin::BOOL, Vec::new())
    }

    pub fn nil_instance() -> Self {
        Self::instance(builtin::NIL, Vec::new())
    }

    /// Normalizing union constructor: flattens nested unions, drops
    /// duplicates, sorts members, and collapses the degenerate cases
    /// (`Union([]) == Bot`, `Union([t]) == t`).
    pub fn union(members: Vec<Type>) -> Self {
        let mut flat = Vec::new();
        flatten_into(members, &mut flat, |k| match k {
            TypeKind::Union(inner) => Some(inner),
            _ => None,
        });
        normalize_members(&mut flat);
        match flat.len() {
            0 => Self::bot(),
            1 => flat.into_iter().next().unwrap(),
            _ => Self::new(TypeKind::Union(flat)),
        }
    }

    /// Normalizing intersection constructor, dual to [`Type::union`].
    pub fn intersection(members: Vec<Type>) -> Self {
        let mut flat = Vec::new();
        flatten_into(members, &mut flat, |k| match k {
            TypeKind::Intersection(inner) => Some(inner),
            _ => None,
        });
        normalize_members(&mut flat);
        match flat.len() {
            0 => Self::top(),
            1 => flat.into_iter().next().unwrap(),
            _ => Self::new(TypeKind::Intersection(flat)),
        }
    }

    pub fn is_top(&self) -> bool {
        matches!(self.kind, TypeKind::Top)
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.kind, TypeKind::Bot)
    }

    pub fn is_any(&self) -> bool {
        matches!(self.kind, TypeKind::Any)
    }

    /// Free variables, computed structurally.
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_free_vars(&mut out);
        out
    }

    fn collect_free_vars(&self, out: &mut BTreeSet<String>) {
        match &self.kind {
            TypeKind::Var(name) => {
                out.insert(name.clone());
            }
            TypeKind::Top | TypeKind::Bot | TypeKind::Any | TypeKind::Logic(_) => {}
            TypeKind::Nominal { args, .. } => {
                for a in args {
                    a.collect_free_vars(out);
                }
            }
            TypeKind::Union(items) | TypeKind::Intersection(items) | TypeKind::Tuple(items) => {
                for t in items {
                    t.collect_free_vars(out);
                }
            }
            TypeKind::Record(fields) => {
                for t in fields.values() {
                    t.collect_free_vars(out);
                }
            }
            TypeKind::Proc(p) => {
                for t in &p.params {
                    t.collect_free_vars(out);
                }
                for t in p.keywords.values() {
                    t.collect_free_vars(out);
                }
                p.return_type.collect_free_vars(out);
            }
        }
    }

    /// Nesting level: total node count of the type tree. Used as the
    /// tiebreak metric when the solver must pick between two bounds.
    pub fn level(&self) -> usize {
        1 + match &self.kind {
            TypeKind::Var(_)
            | TypeKind::Top
            | TypeKind::Bot
            | TypeKind::Any
            | TypeKind::Logic(_) => 0,
            TypeKind::Nominal { args, .. } => args.iter().map(Type::level).sum(),
            TypeKind::Union(items) | TypeKind::Intersection(items) | TypeKind::Tuple(items) => {
                items.iter().map(Type::level).sum()
            }
            TypeKind::Record(fields) => fields.values().map(Type::level).sum(),
            TypeKind::Proc(p) => {
                p.params.iter().map(Type::level).sum::<usize>()
                    + p.keywords.values().map(Type::level).sum::<usize>()
                    + p.return_type.level()
            }
        }
    }

    /// Replace `Logic` nodes with the builtin bool instance. Applied at the
    /// constraint-store boundary; logic types never enter the solver.
    pub fn coerce_logic(&self) -> Type {
        self.map(&mut |t| match &t.kind {
            TypeKind::Logic(_) => Some(Type::bool_instance()),
            _ => None,
        })
    }

    /// Rebuild the tree bottom-up, letting `f` replace whole nodes.
    /// `f` returning `None` keeps the node (children already rewritten).
    pub fn map(&self, f: &mut impl FnMut(&Type) -> Option<Type>) -> Type {
        if let Some(replacement) = f(self) {
            return replacement;
        }
        let kind = match &self.kind {
            TypeKind::Var(_)
            | TypeKind::Top
            | TypeKind::Bot
            | TypeKind::Any
            | TypeKind::Logic(_) => self.kind.clone(),
            TypeKind::Nominal { kind, name, args } => TypeKind::Nominal {
                kind: *kind,
                name: name.clone(),
                args: args.iter().map(|a| a.map(f)).collect(),
            },
            TypeKind::Union(items) => {
                return Type::union(items.iter().map(|t| t.map(f)).collect());
            }
            TypeKind::Intersection(items) => {
                return Type::intersection(items.iter().map(|t| t.map(f)).collect());
            }
            TypeKind::Tuple(items) => TypeKind::Tuple(items.iter().map(|t| t.map(f)).collect()),
            TypeKind::Record(fields) => TypeKind::Record(
                fields.iter().map(|(k, v)| (k.clone(), v.map(f))).collect(),
            ),
            TypeKind::Proc(p) => TypeKind::Proc(ProcType {
                params: p.params.iter().map(|t| t.map(f)).collect(),
                keywords: p.keywords.iter().map(|(k, v)| (k.clone(), v.map(f))).collect(),
                return_type: Box::new(p.return_type.map(f)),
            }),
        };
        Type { kind, span: self.span }
    }
}

fn flatten_into(
    members: Vec<Type>,
    out: &mut Vec<Type>,
    split: impl Fn(TypeKind) -> Option<Vec<Type>> + Copy,
) {
    for m in members {
        match split(m.kind.clone()) {
            Some(inner) => flatten_into(inner, out, split),
            None => out.push(m),
        }
    }
}

/// Sort members into canonical print order and drop structural duplicates,
/// making unions/intersections order-insensitive.
fn normalize_members(members: &mut Vec<Type>) {
    members.sort_by_key(|t| t.to_string());
    members.dedup();
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TypeKind::Var(name) => write!(f, "{name}"),
            TypeKind::Top => write!(f, "top"),
            TypeKind::Bot => write!(f, "bot"),
            TypeKind::Any => write!(f, "any"),
            TypeKind::Nominal { kind, name, args } => {
                match kind {
                    NominalKind::Class => write!(f, "singleton({name})")?,
                    _ => write!(f, "{name}")?,
                }
                if !args.is_empty() {
                    write!(f, "[")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{a}")?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            TypeKind::Union(items) => write_joined(f, items, " | "),
            TypeKind::Intersection(items) => write_joined(f, items, " & "),
            TypeKind::Tuple(items) => {
                write!(f, "[")?;
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, "]")
            }
            TypeKind::Record(fields) => {
                write!(f, "{{ ")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, " }}")
            }
            TypeKind::Proc(p) => {
                write!(f, "^(")?;
                let mut first = true;
                for t in &p.params {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{t}")?;
                }
                for (k, v) in &p.keywords {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{k}: {v}")?;
                }
                write!(f, ") -> {}", p.return_type)
            }
            TypeKind::Logic(LogicKind::Truthy) => write!(f, "<truthy>"),
            TypeKind::Logic(LogicKind::Falsy) => write!(f, "<falsy>"),
            TypeKind::Logic(LogicKind::Envelope) => write!(f, "<logic>"),
        }
    }
}

fn write_joined(f: &mut std::fmt::Formatter<'_>, items: &[Type], sep: &str) -> std::fmt::Result {
    for (i, t) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        match &t.kind {
            TypeKind::Union(_) | TypeKind::Intersection(_) | TypeKind::Proc(_) => {
                write!(f, "({t})")?
            }
            _ => write!(f, "{t}")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_union_is_bot() {
        assert!(Type::union(vec![]).is_bot());
        assert!(Type::intersection(vec![]).is_top());
    }

    #[test]
    fn unit_union_unwraps() {
        let t = Type::union(vec![Type::instance("Integer", vec![])]);
        assert_eq!(t, Type::instance("Integer", vec![]));
    }

    #[test]
    fn union_is_order_insensitive() {
        let a = Type::union(vec![
            Type::instance("Integer", vec![]),
            Type::instance("String", vec![]),
        ]);
        let b = Type::union(vec![
            Type::instance("String", vec![]),
            Type::instance("Integer", vec![]),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn nested_unions_flatten() {
        let inner = Type::union(vec![
            Type::instance("Integer", vec![]),
            Type::instance("Float", vec![]),
        ]);
        let outer = Type::union(vec![inner, Type::instance("String", vec![])]);
        match &outer.kind {
            TypeKind::Union(items) => assert_eq!(items.len(), 3),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn equality_ignores_spans() {
        let a = Type::with_span(TypeKind::Top, Span::new(0, 3));
        let b = Type::top();
        assert_eq!(a, b);
    }

    #[test]
    fn free_vars_structural() {
        let t = Type::proc_type(
            vec![Type::var("A")],
            BTreeMap::from([("key".to_string(), Type::var("B"))]),
            Type::instance("Array", vec![Type::var("A")]),
        );
        let fv = t.free_vars();
        assert_eq!(fv, BTreeSet::from(["A".to_string(), "B".to_string()]));
    }

    #[test]
    fn level_counts_nodes() {
        assert_eq!(Type::instance("Integer", vec![]).level(), 1);
        assert_eq!(Type::instance("Array", vec![Type::var("T")]).level(), 2);
    }

    #[test]
    fn logic_coerces_to_bool() {
        let t = Type::union(vec![Type::logic(LogicKind::Truthy), Type::var("T")]);
        let coerced = t.coerce_logic();
        assert_eq!(
            coerced,
            Type::union(vec![Type::bool_instance(), Type::var("T")])
        );
    }
}
