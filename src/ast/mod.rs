//! Syntax tree model.
//!
//! Trees come from an external parser as JSON and are stored in an index-based
//! arena. The baseline tree of a [`SourceUnit`] is never modified: mutants are
//! expressed as overlays (see [`crate::mutation::materializer`]) that copy only
//! the path from the root to the substituted node.

pub mod builder;
pub mod printer;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Index of a node in a baseline [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reference to a child node.
///
/// `Base` points into the baseline arena. `Local` points into whatever arena
/// owns the referencing node: a replacement fragment or a mutant overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRef {
    Base(NodeId),
    Local(u32),
}

impl NodeRef {
    pub fn base(self) -> Option<NodeId> {
        match self {
            NodeRef::Base(id) => Some(id),
            NodeRef::Local(_) => None,
        }
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Base(id)
    }
}

/// A point in the source text. Line and column are 1-based, offset is a byte index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.start.offset..self.end.offset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Identical,
    NotIdentical,
    And,
    Or,
    Coalesce,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Concat => ".",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Identical => "===",
            BinaryOp::NotIdentical => "!==",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Coalesce => "??",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    Plain,
    Add,
    Sub,
    Mul,
    Div,
    Concat,
    Coalesce,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Plain => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Concat => ".=",
            AssignOp::Coalesce => "??=",
        }
    }
}

/// The closed set of node shapes the engine understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Unit {
        items: Vec<NodeRef>,
    },
    Block {
        stmts: Vec<NodeRef>,
    },
    ExprStmt {
        expr: NodeRef,
    },
    Return {
        value: Option<NodeRef>,
    },
    If {
        cond: NodeRef,
        then_branch: NodeRef,
        else_branch: Option<NodeRef>,
    },
    Call {
        callee: NodeRef,
        args: Vec<NodeRef>,
    },
    Name {
        ident: String,
    },
    Literal {
        value: Literal,
    },
    Const {
        name: String,
    },
    Var {
        name: String,
    },
    Binary {
        op: BinaryOp,
        lhs: NodeRef,
        rhs: NodeRef,
    },
    Unary {
        op: UnaryOp,
        operand: NodeRef,
    },
    Assign {
        op: AssignOp,
        target: NodeRef,
        value: NodeRef,
    },
}

/// Failure to substitute a child inside a node.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SpliceError {
    #[error("node has no child {0:?}")]
    NotAChild(NodeRef),
    #[error("slot `{slot}` takes exactly one node, got {got}")]
    SingleSlot { slot: &'static str, got: usize },
    #[error("slot `{slot}` takes at most one node, got {got}")]
    OptionalSlot { slot: &'static str, got: usize },
}

impl NodeKind {
    /// Children in source order.
    pub fn children(&self) -> Vec<NodeRef> {
        match self {
            NodeKind::Unit { items } => items.clone(),
            NodeKind::Block { stmts } => stmts.clone(),
            NodeKind::ExprStmt { expr } => vec![*expr],
            NodeKind::Return { value } => value.iter().copied().collect(),
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let mut children = vec![*cond, *then_branch];
                children.extend(else_branch.iter().copied());
                children
            }
            NodeKind::Call { callee, args } => {
                let mut children = vec![*callee];
                children.extend(args.iter().copied());
                children
            }
            NodeKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            NodeKind::Unary { operand, .. } => vec![*operand],
            NodeKind::Assign { target, value, .. } => vec![*target, *value],
            NodeKind::Name { .. }
            | NodeKind::Literal { .. }
            | NodeKind::Const { .. }
            | NodeKind::Var { .. } => Vec::new(),
        }
    }

    /// Separator used when several nodes occupy the list slot holding `child`.
    pub fn list_separator(&self, child: NodeRef) -> Option<&'static str> {
        match self {
            NodeKind::Unit { items } if items.contains(&child) => Some("\n"),
            NodeKind::Block { stmts } if stmts.contains(&child) => Some("\n"),
            NodeKind::Call { args, .. } if args.contains(&child) => Some(", "),
            _ => None,
        }
    }

    /// Replace `child` with `with`. List slots accept any number of nodes,
    /// scalar slots exactly one, optional slots zero or one.
    pub fn splice(&mut self, child: NodeRef, with: &[NodeRef]) -> Result<(), SpliceError> {
        fn splice_list(list: &mut Vec<NodeRef>, child: NodeRef, with: &[NodeRef]) -> bool {
            match list.iter().position(|c| *c == child) {
                Some(idx) => {
                    list.splice(idx..=idx, with.iter().copied());
                    true
                }
                None => false,
            }
        }

        fn single(slot: &'static str, with: &[NodeRef]) -> Result<NodeRef, SpliceError> {
            match with {
                [one] => Ok(*one),
                _ => Err(SpliceError::SingleSlot {
                    slot,
                    got: with.len(),
                }),
            }
        }

        fn optional(slot: &'static str, with: &[NodeRef]) -> Result<Option<NodeRef>, SpliceError> {
            match with {
                [] => Ok(None),
                [one] => Ok(Some(*one)),
                _ => Err(SpliceError::OptionalSlot {
                    slot,
                    got: with.len(),
                }),
            }
        }

        let not_a_child = Err(SpliceError::NotAChild(child));
        match self {
            NodeKind::Unit { items: list } | NodeKind::Block { stmts: list } => {
                if splice_list(list, child, with) {
                    Ok(())
                } else {
                    not_a_child
                }
            }
            NodeKind::Call { callee, args } => {
                if *callee == child {
                    *callee = single("callee", with)?;
                    Ok(())
                } else if splice_list(args, child, with) {
                    Ok(())
                } else {
                    not_a_child
                }
            }
            NodeKind::ExprStmt { expr } if *expr == child => {
                *expr = single("expr", with)?;
                Ok(())
            }
            NodeKind::Return { value } if *value == Some(child) => {
                *value = optional("value", with)?;
                Ok(())
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if *cond == child {
                    *cond = single("cond", with)?;
                } else if *then_branch == child {
                    *then_branch = single("then_branch", with)?;
                } else if *else_branch == Some(child) {
                    *else_branch = optional("else_branch", with)?;
                } else {
                    return not_a_child;
                }
                Ok(())
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                if *lhs == child {
                    *lhs = single("lhs", with)?;
                } else if *rhs == child {
                    *rhs = single("rhs", with)?;
                } else {
                    return not_a_child;
                }
                Ok(())
            }
            NodeKind::Unary { operand, .. } if *operand == child => {
                *operand = single("operand", with)?;
                Ok(())
            }
            NodeKind::Assign { target, value, .. } => {
                if *target == child {
                    *target = single("target", with)?;
                } else if *value == child {
                    *value = single("value", with)?;
                } else {
                    return not_a_child;
                }
                Ok(())
            }
            _ => not_a_child,
        }
    }

    /// Rewrite every child reference in place.
    pub fn map_refs(&mut self, mut f: impl FnMut(NodeRef) -> NodeRef) {
        match self {
            NodeKind::Unit { items: list } | NodeKind::Block { stmts: list } => {
                list.iter_mut().for_each(|r| *r = f(*r));
            }
            NodeKind::ExprStmt { expr } => *expr = f(*expr),
            NodeKind::Return { value } => {
                if let Some(v) = value {
                    *v = f(*v);
                }
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                *cond = f(*cond);
                *then_branch = f(*then_branch);
                if let Some(e) = else_branch {
                    *e = f(*e);
                }
            }
            NodeKind::Call { callee, args } => {
                *callee = f(*callee);
                args.iter_mut().for_each(|r| *r = f(*r));
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                *lhs = f(*lhs);
                *rhs = f(*rhs);
            }
            NodeKind::Unary { operand, .. } => *operand = f(*operand),
            NodeKind::Assign { target, value, .. } => {
                *target = f(*target);
                *value = f(*value);
            }
            NodeKind::Name { .. }
            | NodeKind::Literal { .. }
            | NodeKind::Const { .. }
            | NodeKind::Var { .. } => {}
        }
    }

    /// Short label used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Unit { .. } => "unit",
            NodeKind::Block { .. } => "block",
            NodeKind::ExprStmt { .. } => "expr_stmt",
            NodeKind::Return { .. } => "return",
            NodeKind::If { .. } => "if",
            NodeKind::Call { .. } => "call",
            NodeKind::Name { .. } => "name",
            NodeKind::Literal { .. } => "literal",
            NodeKind::Const { .. } => "const",
            NodeKind::Var { .. } => "var",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Unary { .. } => "unary",
            NodeKind::Assign { .. } => "assign",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Node {
    /// A node created by an operator, with no position in the baseline source.
    pub fn fresh(kind: NodeKind) -> Self {
        Self { kind, span: None }
    }
}

/// Errors detected while validating a tree handed over by the parser.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("tree has no nodes")]
    Empty,
    #[error("root {0:?} is out of range")]
    RootOutOfRange(NodeId),
    #[error("node {parent:?} references missing child {child:?}")]
    DanglingChild { parent: NodeId, child: NodeRef },
    #[error("node {child:?} has more than one parent")]
    SharedChild { child: NodeId },
    #[error("node {0:?} is not reachable from the root")]
    Unreachable(NodeId),
    #[error("span of node {node:?} lies outside the source text")]
    SpanOutOfRange { node: NodeId },
}

#[derive(Debug, Serialize, Deserialize)]
struct RawTree {
    root: NodeId,
    nodes: Vec<Node>,
}

/// An immutable arena holding one parsed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTree", into = "RawTree")]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    parents: Vec<Option<NodeId>>,
    root: NodeId,
}

impl TryFrom<RawTree> for SyntaxTree {
    type Error = TreeError;

    fn try_from(raw: RawTree) -> Result<Self, Self::Error> {
        SyntaxTree::new(raw.nodes, raw.root)
    }
}

impl From<SyntaxTree> for RawTree {
    fn from(tree: SyntaxTree) -> Self {
        RawTree {
            root: tree.root,
            nodes: tree.nodes,
        }
    }
}

impl SyntaxTree {
    /// Validate and index a node arena. Every child must be a `Base` reference
    /// to an existing node, and the nodes must form a single tree under `root`.
    pub fn new(nodes: Vec<Node>, root: NodeId) -> Result<Self, TreeError> {
        if nodes.is_empty() {
            return Err(TreeError::Empty);
        }
        if root.index() >= nodes.len() {
            return Err(TreeError::RootOutOfRange(root));
        }

        let mut parents = vec![None; nodes.len()];
        for (idx, node) in nodes.iter().enumerate() {
            let parent = NodeId(idx as u32);
            for child in node.kind.children() {
                let child_id = match child {
                    NodeRef::Base(id) if id.index() < nodes.len() => id,
                    _ => return Err(TreeError::DanglingChild { parent, child }),
                };
                if child_id == root || parents[child_id.index()].is_some() {
                    return Err(TreeError::SharedChild { child: child_id });
                }
                parents[child_id.index()] = Some(parent);
            }
        }

        let tree = Self {
            nodes,
            parents,
            root,
        };

        let reachable = tree.preorder().len();
        if reachable != tree.nodes.len() {
            let orphan = (0..tree.nodes.len())
                .map(|i| NodeId(i as u32))
                .find(|id| *id != root && tree.parents[id.index()].is_none())
                .unwrap_or(root);
            return Err(TreeError::Unreachable(orphan));
        }

        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Node by id. Ids handed out by this tree are always valid.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(id.index()).copied().flatten()
    }

    /// Path from the root down to `id`, both included.
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Depth-first pre-order traversal; children are visited in source order.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            let children = self.nodes[id.index()].kind.children();
            stack.extend(children.iter().rev().filter_map(|c| c.base()));
        }
        order
    }

    /// Resolve a reference found in a baseline node. Baseline nodes only hold
    /// `Base` references, so `Local` resolves to `None`.
    pub fn resolve(&self, r: NodeRef) -> Option<(NodeId, &Node)> {
        let id = r.base()?;
        self.get(id).map(|node| (id, node))
    }
}

/// Read access shared by the baseline tree and mutant overlays.
pub trait TreeView {
    fn root_ref(&self) -> NodeRef;

    fn lookup(&self, r: NodeRef) -> Option<&Node>;

    /// For a node that is a copy of a baseline node with one child swapped out,
    /// describes the swap. Printers use it to preserve the original layout.
    fn splice_of(&self, _r: NodeRef) -> Option<&Splice> {
        None
    }
}

/// A baseline node copied with one child replaced by zero or more nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Splice {
    pub origin: NodeId,
    pub replaced: NodeId,
    pub with: Vec<NodeRef>,
}

impl TreeView for SyntaxTree {
    fn root_ref(&self) -> NodeRef {
        NodeRef::Base(self.root)
    }

    fn lookup(&self, r: NodeRef) -> Option<&Node> {
        self.resolve(r).map(|(_, node)| node)
    }
}

/// One parsed file: its path relative to the project root, its text and its tree.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub source: String,
    pub tree: SyntaxTree,
}

/// On-disk form produced by the parser collaborator.
#[derive(Debug, Deserialize)]
struct UnitFile {
    path: PathBuf,
    tree: SyntaxTree,
}

impl SourceUnit {
    pub fn new(path: impl Into<PathBuf>, source: String, tree: SyntaxTree) -> Result<Self, TreeError> {
        for (idx, node) in tree.nodes.iter().enumerate() {
            if let Some(span) = node.span {
                let range = span.byte_range();
                if range.start > range.end
                    || range.end > source.len()
                    || !source.is_char_boundary(range.start)
                    || !source.is_char_boundary(range.end)
                {
                    return Err(TreeError::SpanOutOfRange {
                        node: NodeId(idx as u32),
                    });
                }
            }
        }

        Ok(Self {
            path: path.into(),
            source,
            tree,
        })
    }

    /// Load a unit description (`{"path": ..., "tree": ...}`) and read the
    /// source text it refers to from `project_root`.
    pub fn load(unit_file: &Path, project_root: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(unit_file)
            .with_context(|| format!("Failed to read syntax tree from {:?}", unit_file))?;
        let raw: UnitFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse syntax tree from {:?}", unit_file))?;

        let source_path = project_root.join(&raw.path);
        let source = std::fs::read_to_string(&source_path)
            .with_context(|| format!("Failed to read source file {:?}", source_path))?;

        Self::new(raw.path, source, raw.tree)
            .with_context(|| format!("Syntax tree in {:?} does not match its source", unit_file))
    }

    /// Text covered by a span.
    pub fn text(&self, span: &Span) -> &str {
        &self.source[span.byte_range()]
    }

    /// Path with forward slashes and no leading `./`, as used for coverage
    /// lookups and glob matching.
    pub fn display_path(&self) -> String {
        normalize_path(&self.path)
    }
}

/// Load every `*.json` unit description under `units_dir`, sorted by file
/// name so enumeration order does not depend on the file system.
pub fn load_units(units_dir: &Path, project_root: &Path) -> Result<Vec<SourceUnit>> {
    let mut units = Vec::new();

    for entry in walkdir::WalkDir::new(units_dir)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to walk {:?}", units_dir))?;
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }
        units.push(SourceUnit::load(entry.path(), project_root)?);
    }

    Ok(units)
}

pub fn normalize_path(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    text.trim_start_matches("./").to_string()
}
