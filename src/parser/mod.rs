pub mod ast;

use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::CheckError;
use crate::lexer::{lex, token::Token};
use crate::span::{Span, Spanned};
use crate::types::variance::Variance;
use crate::types::{ProcType, Type};

use ast::*;

/// Lex and parse one signature file.
pub fn parse_source(source: &str) -> Result<SourceFile, CheckError> {
    let tokens = lex(source)?;
    let mut parser = Parser::new(&tokens, source.len());
    parser.parse_file()
}

/// Lex and parse one code file.
pub fn parse_code(source: &str) -> Result<CodeFile, CheckError> {
    let tokens = lex(source)?;
    let mut parser = Parser::new(&tokens, source.len());
    parser.parse_code_file()
}

/// Names of type parameters in scope; decides whether an uppercase name is
/// a type variable or a class reference.
#[derive(Debug, Clone, Default)]
struct TypeScope {
    names: BTreeSet<String>,
}

impl TypeScope {
    fn with(&self, extra: impl IntoIterator<Item = String>) -> TypeScope {
        let mut names = self.names.clone();
        names.extend(extra);
        TypeScope { names }
    }

    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

struct Parser<'a> {
    tokens: &'a [Spanned<Token>],
    pos: usize,
    eof: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned<Token>], source_len: usize) -> Self {
        Self { tokens, pos: 0, eof: source_len }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.node)
    }

    fn peek2(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|t| &t.node)
    }

    fn here(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_else(|| Span::new(self.eof, self.eof))
    }

    fn advance(&mut self) -> Option<Spanned<Token>> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token) -> Result<Span, CheckError> {
        match self.advance() {
            Some(t) if t.node == tok => Ok(t.span),
            Some(t) => Err(CheckError::syntax(
                format!("expected '{tok}', found '{}'", t.node),
                t.span,
            )),
            None => Err(CheckError::syntax(
                format!("expected '{tok}', found end of file"),
                Span::new(self.eof, self.eof),
            )),
        }
    }

    fn expect_upper_name(&mut self) -> Result<Spanned<String>, CheckError> {
        match self.advance() {
            Some(Spanned { node: Token::UpperName(name), span }) => Ok(Spanned::new(name, span)),
            Some(t) => Err(CheckError::syntax(
                format!("expected a capitalized name, found '{}'", t.node),
                t.span,
            )),
            None => Err(CheckError::syntax(
                "expected a capitalized name, found end of file",
                Span::new(self.eof, self.eof),
            )),
        }
    }

    fn expect_lower_name(&mut self) -> Result<Spanned<String>, CheckError> {
        match self.advance() {
            Some(Spanned { node: Token::LowerName(name), span }) => Ok(Spanned::new(name, span)),
            Some(t) => Err(CheckError::syntax(
                format!("expected a lowercase name, found '{}'", t.node),
                t.span,
            )),
            None => Err(CheckError::syntax(
                "expected a lowercase name, found end of file",
                Span::new(self.eof, self.eof),
            )),
        }
    }

    fn parse_file(&mut self) -> Result<SourceFile, CheckError> {
        let mut decls = Vec::new();
        while let Some(tok) = self.peek() {
            match tok {
                Token::Class => decls.push(self.parse_class()?),
                Token::Interface => decls.push(self.parse_interface()?),
                Token::Type => decls.push(self.parse_alias()?),
                other => {
                    return Err(CheckError::syntax(
                        format!("expected a declaration, found '{other}'"),
                        self.here(),
                    ));
                }
            }
        }
        Ok(SourceFile { decls })
    }

    fn parse_class(&mut self) -> Result<Spanned<Decl>, CheckError> {
        let start = self.expect(Token::Class)?;
        let name = self.expect_upper_name()?;
        let type_params = self.parse_type_params()?;
        let scope = TypeScope::default().with(type_params.iter().map(|p| p.name.node.clone()));

        let superclass = if self.eat(&Token::Lt) {
            let sup_start = self.here();
            let sup_name = self.expect_upper_name()?;
            let args = self.parse_type_args(&scope)?;
            let span = sup_start.join(sup_name.span);
            Some(Spanned::new(TypeRef { name: sup_name.node, args }, span))
        } else {
            None
        };

        let mut includes = Vec::new();
        let mut methods = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Include) => {
                    let inc_start = self.here();
                    self.advance();
                    let iface = match self.advance() {
                        Some(Spanned { node: Token::InterfaceName(name), span }) => {
                            Spanned::new(name, span)
                        }
                        Some(t) => {
                            return Err(CheckError::syntax(
                                format!("expected an interface name, found '{}'", t.node),
                                t.span,
                            ));
                        }
                        None => {
                            return Err(CheckError::syntax(
                                "expected an interface name, found end of file",
                                Span::new(self.eof, self.eof),
                            ));
                        }
                    };
                    let args = self.parse_type_args(&scope)?;
                    let span = inc_start.join(iface.span);
                    includes.push(Spanned::new(TypeRef { name: iface.node, args }, span));
                }
                Some(Token::Def) => methods.push(self.parse_method(&scope)?),
                Some(Token::End) => break,
                Some(other) => {
                    return Err(CheckError::syntax(
                        format!("expected 'def', 'include' or 'end', found '{other}'"),
                        self.here(),
                    ));
                }
                None => {
                    return Err(CheckError::syntax(
                        format!("unterminated class '{}': expected 'end'", name.node),
                        Span::new(self.eof, self.eof),
                    ));
                }
            }
        }
        let end = self.expect(Token::End)?;

        Ok(Spanned::new(
            Decl::Class(ClassDecl { name, type_params, superclass, includes, methods }),
            start.join(end),
        ))
    }

    fn parse_interface(&mut self) -> Result<Spanned<Decl>, CheckError> {
        let start = self.expect(Token::Interface)?;
        let name = match self.advance() {
            Some(Spanned { node: Token::InterfaceName(name), span }) => Spanned::new(name, span),
            Some(t) => {
                return Err(CheckError::syntax(
                    format!("interface names start with '_', found '{}'", t.node),
                    t.span,
                ));
            }
            None => {
                return Err(CheckError::syntax(
                    "expected an interface name, found end of file",
                    Span::new(self.eof, self.eof),
                ));
            }
        };
        let type_params = self.parse_type_params()?;
        let scope = TypeScope::default().with(type_params.iter().map(|p| p.name.node.clone()));

        let mut methods = Vec::new();
        while self.peek() == Some(&Token::Def) {
            methods.push(self.parse_method(&scope)?);
        }
        let end = self.expect(Token::End)?;

        Ok(Spanned::new(
            Decl::Interface(InterfaceDecl { name, type_params, methods }),
            start.join(end),
        ))
    }

    fn parse_alias(&mut self) -> Result<Spanned<Decl>, CheckError> {
        let start = self.expect(Token::Type)?;
        let name = self.expect_lower_name()?;
        self.expect(Token::Eq)?;
        let body = self.parse_type(&TypeScope::default())?;
        let span = start.join(body.span.unwrap_or(name.span));
        Ok(Spanned::new(Decl::Alias(AliasDecl { name, body }), span))
    }

    /// `[out T, in U, V]`, or nothing.
    fn parse_type_params(&mut self) -> Result<Vec<TypeParam>, CheckError> {
        let mut params = Vec::new();
        if !self.eat(&Token::LBracket) {
            return Ok(params);
        }
        loop {
            let variance = if self.eat(&Token::Out) {
                Variance::Covariant
            } else if self.eat(&Token::In) {
                Variance::Contravariant
            } else {
                Variance::Invariant
            };
            let name = self.expect_upper_name()?;
            params.push(TypeParam { name, variance });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBracket)?;
        Ok(params)
    }

    /// `def name: [U] (T, key: U) -> R`
    fn parse_method(&mut self, scope: &TypeScope) -> Result<MethodDecl, CheckError> {
        let start = self.expect(Token::Def)?;
        let name = self.expect_lower_name()?;
        self.expect(Token::Colon)?;

        let mut type_params = Vec::new();
        if self.eat(&Token::LBracket) {
            loop {
                type_params.push(self.expect_upper_name()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RBracket)?;
        }
        let scope = scope.with(type_params.iter().map(|p| p.node.clone()));

        self.expect(Token::LParen)?;
        let (params, keywords) = self.parse_params(&scope)?;
        self.expect(Token::RParen)?;
        self.expect(Token::Arrow)?;
        let return_type = self.parse_type(&scope)?;

        let span = start.join(return_type.span.unwrap_or(name.span));
        Ok(MethodDecl {
            name,
            type_params,
            ty: ProcType { params, keywords, return_type: Box::new(return_type) },
            span,
        })
    }

    /// Comma-separated parameter list: positional types first, then
    /// `name: T` keyword parameters.
    fn parse_params(
        &mut self,
        scope: &TypeScope,
    ) -> Result<(Vec<Type>, BTreeMap<String, Type>), CheckError> {
        let mut params = Vec::new();
        let mut keywords = BTreeMap::new();

        if self.peek() == Some(&Token::RParen) {
            return Ok((params, keywords));
        }
        loop {
            let is_keyword = matches!(self.peek(), Some(Token::LowerName(_)))
                && self.peek2() == Some(&Token::Colon);
            if is_keyword {
                let name = self.expect_lower_name()?;
                self.expect(Token::Colon)?;
                let ty = self.parse_type(scope)?;
                if keywords.insert(name.node.clone(), ty).is_some() {
                    return Err(CheckError::syntax(
                        format!("duplicate keyword parameter '{}'", name.node),
                        name.span,
                    ));
                }
            } else {
                if !keywords.is_empty() {
                    return Err(CheckError::syntax(
                        "positional parameters must precede keyword parameters",
                        self.here(),
                    ));
                }
                params.push(self.parse_type(scope)?);
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok((params, keywords))
    }

    /// Union level: `A & B | C` parses as `(A & B) | C`.
    fn parse_type(&mut self, scope: &TypeScope) -> Result<Type, CheckError> {
        let first = self.parse_intersection(scope)?;
        if self.peek() != Some(&Token::Pipe) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(&Token::Pipe) {
            members.push(self.parse_intersection(scope)?);
        }
        Ok(Type::union(members))
    }

    fn parse_intersection(&mut self, scope: &TypeScope) -> Result<Type, CheckError> {
        let first = self.parse_primary(scope)?;
        if self.peek() != Some(&Token::Amp) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(&Token::Amp) {
            members.push(self.parse_primary(scope)?);
        }
        Ok(Type::intersection(members))
    }

    fn parse_primary(&mut self, scope: &TypeScope) -> Result<Type, CheckError> {
        let start = self.here();
        match self.peek().cloned() {
            Some(Token::Top) => {
                self.advance();
                Ok(Type::with_span(crate::types::TypeKind::Top, start))
            }
            Some(Token::Bot) => {
                self.advance();
                Ok(Type::with_span(crate::types::TypeKind::Bot, start))
            }
            Some(Token::Any) => {
                self.advance();
                Ok(Type::with_span(crate::types::TypeKind::Any, start))
            }
            Some(Token::Singleton) => {
                self.advance();
                self.expect(Token::LParen)?;
                let name = self.expect_upper_name()?;
                let end = self.expect(Token::RParen)?;
                let mut ty = Type::singleton(name.node);
                ty.span = Some(start.join(end));
                Ok(ty)
            }
            Some(Token::UpperName(name)) => {
                self.advance();
                if scope.contains(&name) {
                    let mut ty = Type::var(name);
                    ty.span = Some(start);
                    return Ok(ty);
                }
                let args = self.parse_type_args(scope)?;
                let mut ty = Type::instance(name, args);
                ty.span = Some(start);
                Ok(ty)
            }
            Some(Token::LowerName(name)) => {
                self.advance();
                let mut ty = Type::alias(name, Vec::new());
                ty.span = Some(start);
                Ok(ty)
            }
            Some(Token::InterfaceName(name)) => {
                self.advance();
                let args = self.parse_type_args(scope)?;
                let mut ty = Type::interface(name, args);
                ty.span = Some(start);
                Ok(ty)
            }
            Some(Token::LBracket) => {
                self.advance();
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.parse_type(scope)?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                let end = self.expect(Token::RBracket)?;
                let mut ty = Type::tuple(items);
                ty.span = Some(start.join(end));
                Ok(ty)
            }
            Some(Token::LBrace) => {
                self.advance();
                let mut fields = BTreeMap::new();
                if self.peek() != Some(&Token::RBrace) {
                    loop {
                        let name = self.expect_lower_name()?;
                        self.expect(Token::Colon)?;
                        let ty = self.parse_type(scope)?;
                        if fields.insert(name.node.clone(), ty).is_some() {
                            return Err(CheckError::syntax(
                                format!("duplicate record key '{}'", name.node),
                                name.span,
                            ));
                        }
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                let end = self.expect(Token::RBrace)?;
                let mut ty = Type::record(fields);
                ty.span = Some(start.join(end));
                Ok(ty)
            }
            Some(Token::Caret) => {
                self.advance();
                self.expect(Token::LParen)?;
                let (params, keywords) = self.parse_params(scope)?;
                self.expect(Token::RParen)?;
                self.expect(Token::Arrow)?;
                let return_type = self.parse_type(scope)?;
                let end = return_type.span.unwrap_or(start);
                let mut ty = Type::proc_type(params, keywords, return_type);
                ty.span = Some(start.join(end));
                Ok(ty)
            }
            Some(Token::LParen) => {
                self.advance();
                let ty = self.parse_type(scope)?;
                self.expect(Token::RParen)?;
                Ok(ty)
            }
            Some(other) => Err(CheckError::syntax(
                format!("expected a type, found '{other}'"),
                start,
            )),
            None => Err(CheckError::syntax(
                "expected a type, found end of file",
                Span::new(self.eof, self.eof),
            )),
        }
    }

    fn parse_code_file(&mut self) -> Result<CodeFile, CheckError> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            stmts.push(self.parse_stmt()?);
        }
        Ok(CodeFile { stmts })
    }

    fn parse_stmt(&mut self) -> Result<Spanned<Stmt>, CheckError> {
        if self.peek() == Some(&Token::Let) {
            let start = self.expect(Token::Let)?;
            let name = self.expect_lower_name()?;
            let ty = if self.eat(&Token::Colon) {
                Some(self.parse_type(&TypeScope::default())?)
            } else {
                None
            };
            let value = if self.eat(&Token::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            let end = value
                .as_ref()
                .map(|v| v.span)
                .or_else(|| ty.as_ref().and_then(|t| t.span))
                .unwrap_or(name.span);
            return Ok(Spanned::new(Stmt::Let { name, ty, value }, start.join(end)));
        }
        let expr = self.parse_expr()?;
        let span = expr.span;
        Ok(Spanned::new(Stmt::Expr(expr), span))
    }

    /// Postfix method-call chain over a primary expression.
    fn parse_expr(&mut self) -> Result<Spanned<Expr>, CheckError> {
        let mut expr = self.parse_primary_expr()?;
        while self.eat(&Token::Dot) {
            let method = self.expect_lower_name()?;
            self.expect(Token::LParen)?;
            let mut args = Vec::new();
            if self.peek() != Some(&Token::RParen) {
                loop {
                    args.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
            }
            let end = self.expect(Token::RParen)?;
            let span = expr.span.join(end);
            expr = Spanned::new(
                Expr::Call { receiver: Box::new(expr), method, args },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<Spanned<Expr>, CheckError> {
        let start = self.here();
        match self.peek().cloned() {
            Some(Token::Int(value)) => {
                self.advance();
                Ok(Spanned::new(Expr::Int(value), start))
            }
            Some(Token::Float(value)) => {
                self.advance();
                Ok(Spanned::new(Expr::Float(value), start))
            }
            Some(Token::Str(value)) => {
                self.advance();
                Ok(Spanned::new(Expr::Str(value), start))
            }
            Some(Token::True) => {
                self.advance();
                Ok(Spanned::new(Expr::Bool(true), start))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Spanned::new(Expr::Bool(false), start))
            }
            Some(Token::Nil) => {
                self.advance();
                Ok(Spanned::new(Expr::Nil, start))
            }
            Some(Token::LowerName(name)) => {
                self.advance();
                Ok(Spanned::new(Expr::Var(name), start))
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(other) => Err(CheckError::syntax(
                format!("expected an expression, found '{other}'"),
                start,
            )),
            None => Err(CheckError::syntax(
                "expected an expression, found end of file",
                Span::new(self.eof, self.eof),
            )),
        }
    }

    /// `[T, U]` after a name, or nothing.
    fn parse_type_args(&mut self, scope: &TypeScope) -> Result<Vec<Type>, CheckError> {
        let mut args = Vec::new();
        if !self.eat(&Token::LBracket) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_type(scope)?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBracket)?;
        Ok(args)
    }
}
