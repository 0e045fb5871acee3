//! Builds a tree together with the source text it describes.
//!
//! Useful for collaborators without a parser of their own and for tests: the
//! text is laid out by the canonical renderer and every node gets an exact span.

use super::printer::Renderer;
use super::{
    AssignOp, BinaryOp, Literal, Node, NodeKind, NodeRef, SourceUnit, SyntaxTree, TreeError,
    UnaryOp,
};
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: NodeKind) -> NodeRef {
        self.nodes.push(Node::fresh(kind));
        NodeRef::Base(super::NodeId((self.nodes.len() - 1) as u32))
    }

    pub fn unit(&mut self, items: Vec<NodeRef>) -> NodeRef {
        self.push(NodeKind::Unit { items })
    }

    pub fn block(&mut self, stmts: Vec<NodeRef>) -> NodeRef {
        self.push(NodeKind::Block { stmts })
    }

    pub fn expr_stmt(&mut self, expr: NodeRef) -> NodeRef {
        self.push(NodeKind::ExprStmt { expr })
    }

    pub fn ret(&mut self, value: Option<NodeRef>) -> NodeRef {
        self.push(NodeKind::Return { value })
    }

    pub fn if_else(
        &mut self,
        cond: NodeRef,
        then_branch: NodeRef,
        else_branch: Option<NodeRef>,
    ) -> NodeRef {
        self.push(NodeKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    pub fn call(&mut self, name: &str, args: Vec<NodeRef>) -> NodeRef {
        let callee = self.name(name);
        self.push(NodeKind::Call { callee, args })
    }

    pub fn name(&mut self, ident: &str) -> NodeRef {
        self.push(NodeKind::Name {
            ident: ident.to_string(),
        })
    }

    pub fn literal(&mut self, value: Literal) -> NodeRef {
        self.push(NodeKind::Literal { value })
    }

    pub fn int(&mut self, value: i64) -> NodeRef {
        self.literal(Literal::Int(value))
    }

    pub fn string(&mut self, value: &str) -> NodeRef {
        self.literal(Literal::Str(value.to_string()))
    }

    pub fn boolean(&mut self, value: bool) -> NodeRef {
        self.literal(Literal::Bool(value))
    }

    pub fn constant(&mut self, name: &str) -> NodeRef {
        self.push(NodeKind::Const {
            name: name.to_string(),
        })
    }

    pub fn var(&mut self, name: &str) -> NodeRef {
        self.push(NodeKind::Var {
            name: name.to_string(),
        })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: NodeRef, rhs: NodeRef) -> NodeRef {
        self.push(NodeKind::Binary { op, lhs, rhs })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeRef) -> NodeRef {
        self.push(NodeKind::Unary { op, operand })
    }

    pub fn assign(&mut self, op: AssignOp, target: NodeRef, value: NodeRef) -> NodeRef {
        self.push(NodeKind::Assign { op, target, value })
    }

    pub fn finish(self, path: impl Into<PathBuf>, root: NodeRef) -> Result<SourceUnit, TreeError> {
        self.finish_with_prelude(path, "", root)
    }

    /// Lay out the tree under `prelude` (e.g. an opening `<?php` tag) and
    /// record every node's span.
    pub fn finish_with_prelude(
        self,
        path: impl Into<PathBuf>,
        prelude: &str,
        root: NodeRef,
    ) -> Result<SourceUnit, TreeError> {
        let root_id = match root {
            NodeRef::Base(id) => id,
            NodeRef::Local(_) => return Err(TreeError::Empty),
        };
        let mut tree = SyntaxTree::new(self.nodes, root_id)?;

        let (source, spans) = {
            let mut renderer = Renderer::new(&tree, None).recording_spans();
            renderer.w.push(prelude);
            // Rendering a validated tree without a source cannot dangle.
            renderer
                .emit(root)
                .map_err(|_| TreeError::RootOutOfRange(root_id))?;
            renderer.into_spans()
        };

        for (r, span) in spans {
            if let NodeRef::Base(id) = r {
                tree.nodes[id.index()].span = Some(span);
            }
        }

        SourceUnit::new(path, source, tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeId;

    #[test]
    fn test_builder_lays_out_call_statement() {
        let mut b = TreeBuilder::new();
        let a = b.var("$a");
        let one = b.int(1);
        let call = b.call("widen_length", vec![a, one]);
        let stmt = b.expr_stmt(call);
        let root = b.unit(vec![stmt]);
        let unit = b.finish("src/a.php", root).unwrap();

        assert_eq!(unit.source, "widen_length($a, 1);\n");
        let call_id = call.base().unwrap();
        let span = unit.tree.node(call_id).span.unwrap();
        assert_eq!(unit.text(&span), "widen_length($a, 1)");
        assert_eq!(span.start.line, 1);
        assert_eq!(span.start.column, 1);
    }

    #[test]
    fn test_builder_tracks_lines_inside_blocks() {
        let mut b = TreeBuilder::new();
        let cond = b.var("$ok");
        let x = b.var("$x");
        let one = b.int(1);
        let assign = b.assign(AssignOp::Plain, x, one);
        let stmt = b.expr_stmt(assign);
        let body = b.block(vec![stmt]);
        let branch = b.if_else(cond, body, None);
        let root = b.unit(vec![branch]);
        let unit = b.finish_with_prelude("a.php", "<?php\n", root).unwrap();

        assert_eq!(unit.source, "<?php\nif ($ok) {\n    $x = 1;\n}\n");
        let stmt_span = unit.tree.node(stmt.base().unwrap()).span.unwrap();
        assert_eq!(stmt_span.start.line, 3);
        assert_eq!(stmt_span.start.column, 5);
        assert_eq!(unit.text(&stmt_span), "$x = 1;");
        assert_eq!(unit.tree.root(), NodeId(7));
    }
}
