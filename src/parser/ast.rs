use crate::span::{Span, Spanned};
use crate::types::variance::Variance;
use crate::types::{ProcType, Type};

/// One parsed signature file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceFile {
    pub decls: Vec<Spanned<Decl>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Alias(AliasDecl),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Class(c) => &c.name.node,
            Decl::Interface(i) => &i.name.node,
            Decl::Alias(a) => &a.name.node,
        }
    }
}

/// A declared type parameter with its variance annotation
/// (`out T` covariant, `in T` contravariant, bare invariant).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: Spanned<String>,
    pub variance: Variance,
}

/// A reference to a named generic type in superclass or include position.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub name: String,
    pub args: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Spanned<String>,
    pub type_params: Vec<TypeParam>,
    pub superclass: Option<Spanned<TypeRef>>,
    pub includes: Vec<Spanned<TypeRef>>,
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: Spanned<String>,
    pub type_params: Vec<TypeParam>,
    pub methods: Vec<MethodDecl>,
}

/// `type name = T`. Alias names are lowercase and non-generic.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasDecl {
    pub name: Spanned<String>,
    pub body: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: Spanned<String>,
    /// Method-level type parameters, e.g. `def map: [U] (^(T) -> U) -> Array[U]`.
    pub type_params: Vec<Spanned<String>>,
    pub ty: ProcType,
    pub span: Span,
}

/// One parsed code file: the typed core the checker validates against the
/// signature environment. Bindings introduce typed names; calls resolve
/// against declared method signatures.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeFile {
    pub stmts: Vec<Spanned<Stmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let name: Type = expr`. The annotation and the initializer are
    /// each optional, but not both.
    Let {
        name: Spanned<String>,
        ty: Option<Type>,
        value: Option<Spanned<Expr>>,
    },
    Expr(Spanned<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Nil,
    Var(String),
    Call {
        receiver: Box<Spanned<Expr>>,
        method: Spanned<String>,
        args: Vec<Spanned<Expr>>,
    },
}
