use std::path::{Path, PathBuf};

use lsp_types::{
    CompletionItem, CompletionItemKind, CompletionParams, CompletionResponse,
    GotoDefinitionParams, Hover, HoverContents, HoverParams, Location, MarkupContent, MarkupKind,
    TextDocumentPositionParams,
};

use crate::lsp_util::{path_to_uri, uri_to_path, LineIndex};
use crate::parser::ast::{ClassDecl, Decl, InterfaceDecl, MethodDecl};
use crate::span::Span;
use crate::types::{ProcType, Type, TypeKind};

use super::worker::Worker;

/// Hover shows the declaration under the cursor: the innermost method if
/// the cursor is on one, the enclosing declaration header otherwise.
pub fn hover(worker: &Worker, params: &HoverParams) -> Option<Hover> {
    let (path, offset) = resolve_position(worker, &params.text_document_position_params)?;
    let file = worker.parsed().get(&path)?;

    for decl in &file.decls {
        if !contains(decl.span, offset) {
            continue;
        }
        let text = match &decl.node {
            Decl::Class(class) => match method_at(&class.methods, offset) {
                Some(method) => fmt_method(method),
                None => fmt_class(class),
            },
            Decl::Interface(iface) => match method_at(&iface.methods, offset) {
                Some(method) => fmt_method(method),
                None => fmt_interface(iface),
            },
            Decl::Alias(alias) => format!("type {} = {}", alias.name.node, alias.body),
        };
        return Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: format!("```sigil\n{text}\n```"),
            }),
            range: None,
        });
    }
    None
}

/// Every declared name, plus the methods of every class and interface.
pub fn completion(worker: &Worker, params: &CompletionParams) -> CompletionResponse {
    let _ = params;
    let mut items = Vec::new();
    for (name, class) in &worker.env().classes {
        let mut detail = format!("class {name}");
        if let Some((sup, _)) = &class.superclass {
            detail.push_str(&format!(" < {sup}"));
        }
        items.push(CompletionItem {
            label: name.clone(),
            kind: Some(CompletionItemKind::CLASS),
            detail: Some(detail),
            ..Default::default()
        });
        for (method, sig) in &class.methods {
            items.push(CompletionItem {
                label: method.clone(),
                kind: Some(CompletionItemKind::METHOD),
                detail: Some(format!("{name}#{method}: {}", fmt_proc(&sig.ty))),
                ..Default::default()
            });
        }
    }
    for (name, iface) in &worker.env().interfaces {
        items.push(CompletionItem {
            label: name.clone(),
            kind: Some(CompletionItemKind::INTERFACE),
            ..Default::default()
        });
        for (method, sig) in &iface.methods {
            items.push(CompletionItem {
                label: method.clone(),
                kind: Some(CompletionItemKind::METHOD),
                detail: Some(format!("{name}#{method}: {}", fmt_proc(&sig.ty))),
                ..Default::default()
            });
        }
    }
    for name in worker.env().aliases.keys() {
        items.push(CompletionItem {
            label: name.clone(),
            kind: Some(CompletionItemKind::REFERENCE),
            ..Default::default()
        });
    }
    CompletionResponse::Array(items)
}

/// The declaration site of the name under the cursor.
pub fn definition(worker: &Worker, params: &GotoDefinitionParams) -> Vec<Location> {
    let Some((path, offset)) = resolve_position(worker, &params.text_document_position_params)
    else {
        return Vec::new();
    };
    let Some(source) = worker.sources().get(&path) else {
        return Vec::new();
    };
    let Some(word) = word_at_offset(source, offset) else {
        return Vec::new();
    };
    declaration_site(worker, word).into_iter().collect()
}

/// For an interface name, every class that includes it; for anything else
/// the declaration site.
pub fn implementation(worker: &Worker, params: &GotoDefinitionParams) -> Vec<Location> {
    let Some((path, offset)) = resolve_position(worker, &params.text_document_position_params)
    else {
        return Vec::new();
    };
    let Some(source) = worker.sources().get(&path) else {
        return Vec::new();
    };
    let Some(word) = word_at_offset(source, offset) else {
        return Vec::new();
    };

    if worker.env().interfaces.contains_key(word) {
        let mut out = Vec::new();
        for class in worker.env().classes.values() {
            if class.includes.iter().any(|(name, _)| name == word) {
                if let Some(location) = location_of(worker, class.path.as_deref(), class.span) {
                    out.push(location);
                }
            }
        }
        return out;
    }
    declaration_site(worker, word).into_iter().collect()
}

fn declaration_site(worker: &Worker, name: &str) -> Option<Location> {
    let env = worker.env();
    if let Some(class) = env.classes.get(name) {
        return location_of(worker, class.path.as_deref(), class.span);
    }
    if let Some(iface) = env.interfaces.get(name) {
        return location_of(worker, iface.path.as_deref(), iface.span);
    }
    if let Some(alias) = env.aliases.get(name) {
        return location_of(worker, alias.path.as_deref(), alias.span);
    }
    None
}

fn location_of(worker: &Worker, path: Option<&Path>, span: Span) -> Option<Location> {
    let path = path?;
    let source = worker.sources().get(path)?;
    let index = LineIndex::new(source);
    Some(Location { uri: path_to_uri(path), range: index.span_to_range(span) })
}

fn resolve_position(
    worker: &Worker,
    position: &TextDocumentPositionParams,
) -> Option<(PathBuf, usize)> {
    let path = uri_to_path(&position.text_document.uri)?;
    let source = worker.sources().get(&path)?;
    let index = LineIndex::new(source);
    Some((path, index.position_to_offset(position.position)))
}

fn contains(span: Span, offset: usize) -> bool {
    span.start <= offset && offset <= span.end
}

fn method_at(methods: &[MethodDecl], offset: usize) -> Option<&MethodDecl> {
    methods.iter().find(|m| contains(m.span, offset))
}

fn word_at_offset(source: &str, offset: usize) -> Option<&str> {
    if offset > source.len() {
        return None;
    }
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let start = source[..offset]
        .rfind(|c| !is_word(c))
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = source[offset..]
        .find(|c| !is_word(c))
        .map(|i| offset + i)
        .unwrap_or(source.len());
    if start >= end {
        None
    } else {
        Some(&source[start..end])
    }
}

fn fmt_class(class: &ClassDecl) -> String {
    let mut out = format!("class {}", class.name.node);
    if !class.type_params.is_empty() {
        out.push('[');
        for (i, p) in class.type_params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            match p.variance {
                crate::types::variance::Variance::Covariant => out.push_str("out "),
                crate::types::variance::Variance::Contravariant => out.push_str("in "),
                crate::types::variance::Variance::Invariant => {}
            }
            out.push_str(&p.name.node);
        }
        out.push(']');
    }
    if let Some(sup) = &class.superclass {
        out.push_str(&format!(" < {}", sup.node.name));
    }
    out
}

fn fmt_interface(iface: &InterfaceDecl) -> String {
    let mut out = format!("interface {}", iface.name.node);
    if !iface.type_params.is_empty() {
        out.push('[');
        for (i, p) in iface.type_params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&p.name.node);
        }
        out.push(']');
    }
    out
}

fn fmt_method(method: &MethodDecl) -> String {
    let mut out = format!("def {}: ", method.name.node);
    if !method.type_params.is_empty() {
        out.push('[');
        for (i, p) in method.type_params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&p.node);
        }
        out.push_str("] ");
    }
    out.push_str(&fmt_proc(&method.ty));
    out
}

/// Method-position rendering of a proc type, without the `^` prefix.
fn fmt_proc(proc: &ProcType) -> String {
    let rendered = Type::new(TypeKind::Proc(proc.clone())).to_string();
    rendered.strip_prefix('^').unwrap_or(&rendered).to_string()
}
