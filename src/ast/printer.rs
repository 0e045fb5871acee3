//! Printing trees back to source text.
//!
//! [`SourcePrinter`] is format preserving: a baseline subtree that a mutant did
//! not touch is copied byte for byte from the original source, a path copy is
//! re-emitted with the original text between its children, and only nodes
//! created by an operator are rendered from scratch.

use super::{Literal, Node, NodeKind, NodeRef, Position, SourceUnit, Span, TreeView};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PrintError {
    #[error("dangling node reference {0:?}")]
    Dangling(NodeRef),
    #[error("mutant source failed the round-trip check: {0}")]
    RoundTrip(String),
}

/// The printer collaborator: turns a (possibly mutated) tree into source text.
pub trait Printer: Send + Sync {
    fn print(&self, view: &dyn TreeView, unit: &SourceUnit) -> Result<String, PrintError>;

    /// Sanity check run on every mutant before it is scheduled.
    fn verify(&self, _source: &str) -> Result<(), PrintError> {
        Ok(())
    }
}

/// Built-in format-preserving printer.
#[derive(Debug, Clone, Default)]
pub struct SourcePrinter;

impl Printer for SourcePrinter {
    fn print(&self, view: &dyn TreeView, unit: &SourceUnit) -> Result<String, PrintError> {
        let root = view.root_ref();
        let root_span = origin_span(view, root, unit);

        let mut renderer = Renderer::new(view, Some(&unit.source));
        match root_span {
            Some(span) => {
                renderer.w.push(&unit.source[..span.start.offset]);
                renderer.emit(root)?;
                renderer.w.push(&unit.source[span.end.offset..]);
            }
            None => renderer.emit(root)?,
        }
        Ok(renderer.w.out)
    }

    fn verify(&self, source: &str) -> Result<(), PrintError> {
        check_delimiters(source).map_err(PrintError::RoundTrip)
    }
}

/// Span in the baseline source that the node at `r` stands in for.
fn origin_span(view: &dyn TreeView, r: NodeRef, unit: &SourceUnit) -> Option<Span> {
    match view.splice_of(r) {
        Some(splice) => unit.tree.node(splice.origin).span,
        None => match r {
            NodeRef::Base(_) => view.lookup(r).and_then(|n| n.span),
            NodeRef::Local(_) => None,
        },
    }
}

/// Balanced `()`, `[]` and `{}` outside of quoted strings.
fn check_delimiters(source: &str) -> Result<(), String> {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (line_idx, line) in source.split('\n').enumerate() {
        for ch in line.chars() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
                continue;
            }
            match ch {
                '\'' | '"' => quote = Some(ch),
                '(' | '[' | '{' => stack.push(ch),
                ')' | ']' | '}' => {
                    let expected = match ch {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    if stack.pop() != Some(expected) {
                        return Err(format!("unbalanced `{}` on line {}", ch, line_idx + 1));
                    }
                }
                _ => {}
            }
        }
    }

    match stack.last() {
        Some(open) => Err(format!("unclosed `{}`", open)),
        None => Ok(()),
    }
}

/// Text sink that tracks line and column.
pub(crate) struct Writer {
    pub(crate) out: String,
    line: u32,
    column: u32,
}

impl Writer {
    fn new() -> Self {
        Self {
            out: String::new(),
            line: 1,
            column: 1,
        }
    }

    pub(crate) fn push(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.out.push_str(text);
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.out.len(),
        }
    }
}

/// Walks a tree view and writes text. With a source, baseline nodes are
/// copied verbatim; without one every node is rendered canonically, which is
/// how [`super::builder::TreeBuilder`] lays out fresh trees.
pub(crate) struct Renderer<'a> {
    view: &'a dyn TreeView,
    source: Option<&'a str>,
    pub(crate) w: Writer,
    indent: usize,
    spans: Option<HashMap<NodeRef, Span>>,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(view: &'a dyn TreeView, source: Option<&'a str>) -> Self {
        Self {
            view,
            source,
            w: Writer::new(),
            indent: 0,
            spans: None,
        }
    }

    pub(crate) fn recording_spans(mut self) -> Self {
        self.spans = Some(HashMap::new());
        self
    }

    pub(crate) fn into_spans(self) -> (String, HashMap<NodeRef, Span>) {
        (self.w.out, self.spans.unwrap_or_default())
    }

    fn node(&self, r: NodeRef) -> Result<&'a Node, PrintError> {
        self.view.lookup(r).ok_or(PrintError::Dangling(r))
    }

    pub(crate) fn emit(&mut self, r: NodeRef) -> Result<(), PrintError> {
        let start = self.w.position();

        let view = self.view;
        if let Some(source) = self.source {
            if let Some(splice) = view.splice_of(r) {
                if self.emit_splice(source, splice.origin, splice.replaced, &splice.with)? {
                    return Ok(());
                }
            } else if let NodeRef::Base(_) = r {
                if let Some(span) = self.node(r)?.span {
                    self.w.push(&source[span.byte_range()]);
                    return Ok(());
                }
            }
        }

        self.render(r)?;

        if let Some(spans) = self.spans.as_mut() {
            spans.insert(
                r,
                Span {
                    start,
                    end: self.w.position(),
                },
            );
        }
        Ok(())
    }

    /// Re-emit a path copy over the original text of its origin. Only the
    /// replaced child differs between a copy and its origin. Returns
    /// `false` when the origin or its children carry no positions, in which
    /// case the caller falls back to canonical rendering.
    fn emit_splice(
        &mut self,
        source: &str,
        origin: super::NodeId,
        replaced: super::NodeId,
        with: &[NodeRef],
    ) -> Result<bool, PrintError> {
        let origin_ref = NodeRef::Base(origin);
        let origin_node = self.node(origin_ref)?;
        let Some(origin_span) = origin_node.span else {
            return Ok(false);
        };

        let mut children = Vec::new();
        for child in origin_node.kind.children() {
            match self.node(child)?.span {
                Some(span) => children.push((child, span)),
                None => return Ok(false),
            }
        }

        let separator = origin_node
            .kind
            .list_separator(NodeRef::Base(replaced))
            .unwrap_or(" ");

        let mut cursor = origin_span.start.offset;
        for (child, span) in children {
            self.w.push(&source[cursor..span.start.offset]);
            if child == NodeRef::Base(replaced) {
                for (idx, node) in with.iter().enumerate() {
                    if idx > 0 {
                        self.w.push(separator);
                    }
                    self.emit(*node)?;
                }
            } else {
                self.emit(child)?;
            }
            cursor = span.end.offset;
        }
        self.w.push(&source[cursor..origin_span.end.offset]);
        Ok(true)
    }

    fn newline(&mut self) {
        self.w.push("\n");
        for _ in 0..self.indent {
            self.w.push("    ");
        }
    }

    fn emit_operand(&mut self, r: NodeRef) -> Result<(), PrintError> {
        let compound = matches!(
            self.node(r)?.kind,
            NodeKind::Binary { .. } | NodeKind::Assign { .. }
        );
        if compound {
            self.w.push("(");
            self.emit(r)?;
            self.w.push(")");
            Ok(())
        } else {
            self.emit(r)
        }
    }

    fn render(&mut self, r: NodeRef) -> Result<(), PrintError> {
        let node = self.node(r)?;
        match &node.kind {
            NodeKind::Unit { items } => {
                for item in items {
                    self.emit(*item)?;
                    self.w.push("\n");
                }
            }
            NodeKind::Block { stmts } => {
                self.w.push("{");
                self.indent += 1;
                for stmt in stmts {
                    self.newline();
                    self.emit(*stmt)?;
                }
                self.indent -= 1;
                self.newline();
                self.w.push("}");
            }
            NodeKind::ExprStmt { expr } => {
                self.emit(*expr)?;
                self.w.push(";");
            }
            NodeKind::Return { value } => {
                self.w.push("return");
                if let Some(value) = value {
                    self.w.push(" ");
                    self.emit(*value)?;
                }
                self.w.push(";");
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.w.push("if (");
                self.emit(*cond)?;
                self.w.push(") ");
                self.emit(*then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.w.push(" else ");
                    self.emit(*else_branch)?;
                }
            }
            NodeKind::Call { callee, args } => {
                self.emit(*callee)?;
                self.w.push("(");
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        self.w.push(", ");
                    }
                    self.emit(*arg)?;
                }
                self.w.push(")");
            }
            NodeKind::Name { ident } => self.w.push(ident),
            NodeKind::Literal { value } => {
                let text = render_literal(value);
                self.w.push(&text);
            }
            NodeKind::Const { name } | NodeKind::Var { name } => self.w.push(name),
            NodeKind::Binary { op, lhs, rhs } => {
                self.emit_operand(*lhs)?;
                self.w.push(" ");
                self.w.push(op.symbol());
                self.w.push(" ");
                self.emit_operand(*rhs)?;
            }
            NodeKind::Unary { op, operand } => {
                self.w.push(op.symbol());
                self.emit_operand(*operand)?;
            }
            NodeKind::Assign { op, target, value } => {
                self.emit(*target)?;
                self.w.push(" ");
                self.w.push(op.symbol());
                self.w.push(" ");
                self.emit(*value)?;
            }
        }
        Ok(())
    }
}

fn render_literal(value: &Literal) -> String {
    match value {
        Literal::Int(v) => v.to_string(),
        Literal::Float(v) => format!("{:?}", v),
        Literal::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Literal::Bool(true) => "true".to_string(),
        Literal::Bool(false) => "false".to_string(),
        Literal::Null => "null".to_string(),
    }
}
