//! Applies one mutation to a copy of the root-to-target path and prints it.
//!
//! The baseline tree is never touched. A [`MutantTree`] owns only the copied
//! ancestors of the target; everything else is shared with the baseline.

use super::{Mutation, Replacement};
use crate::ast::printer::{PrintError, Printer};
use crate::ast::{Node, NodeId, NodeRef, SourceUnit, Splice, SpliceError, SyntaxTree, TreeView};
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("mutation target {0:?} is not in the tree")]
    MissingTarget(NodeId),

    #[error("replacement refers to a node it does not contain: {0:?}")]
    DanglingReplacement(NodeRef),

    #[error("cannot substitute into {node:?}: {source}")]
    Splice {
        node: NodeId,
        #[source]
        source: SpliceError,
    },

    #[error("the root can only be replaced by exactly one node, got {0}")]
    RootReplacement(usize),

    #[error(transparent)]
    Print(#[from] PrintError),
}

/// A mutant as an overlay over the baseline arena.
///
/// `Local` references below `fragment.nodes.len()` resolve into the
/// replacement fragment; the ones above it are the path copies.
pub struct MutantTree<'a> {
    base: &'a SyntaxTree,
    fragment: &'a Replacement,
    copies: Vec<(Node, Splice)>,
    root: NodeRef,
}

impl<'a> MutantTree<'a> {
    pub fn new(unit: &'a SourceUnit, mutation: &'a Mutation) -> Result<Self, MaterializeError> {
        let base = &unit.tree;
        let fragment = &mutation.replacement;
        let target = mutation.target;

        if base.get(target).is_none() {
            return Err(MaterializeError::MissingTarget(target));
        }
        check_fragment(base, fragment)?;

        let path = base.path_to(target);
        let mut copies = Vec::with_capacity(path.len().saturating_sub(1));
        let mut with = fragment.roots.clone();
        let mut replaced = target;

        for &ancestor in path.iter().rev().skip(1) {
            let mut node = base.node(ancestor).clone();
            node.kind
                .splice(NodeRef::Base(replaced), &with)
                .map_err(|source| MaterializeError::Splice {
                    node: ancestor,
                    source,
                })?;
            node.span = None;

            let copy = NodeRef::Local((fragment.nodes.len() + copies.len()) as u32);
            copies.push((
                node,
                Splice {
                    origin: ancestor,
                    replaced,
                    with,
                },
            ));
            with = vec![copy];
            replaced = ancestor;
        }

        let root = match with.as_slice() {
            [root] => *root,
            other => return Err(MaterializeError::RootReplacement(other.len())),
        };

        Ok(Self {
            base,
            fragment,
            copies,
            root,
        })
    }

    fn copy(&self, r: NodeRef) -> Option<&(Node, Splice)> {
        match r {
            NodeRef::Local(idx) => {
                let idx = (idx as usize).checked_sub(self.fragment.nodes.len())?;
                self.copies.get(idx)
            }
            NodeRef::Base(_) => None,
        }
    }
}

impl TreeView for MutantTree<'_> {
    fn root_ref(&self) -> NodeRef {
        self.root
    }

    fn lookup(&self, r: NodeRef) -> Option<&Node> {
        match r {
            NodeRef::Base(_) => self.base.lookup(r),
            NodeRef::Local(idx) => self
                .fragment
                .nodes
                .get(idx as usize)
                .or_else(|| self.copy(r).map(|(node, _)| node)),
        }
    }

    fn splice_of(&self, r: NodeRef) -> Option<&Splice> {
        self.copy(r).map(|(_, splice)| splice)
    }
}

/// Every reference inside the fragment must resolve.
fn check_fragment(base: &SyntaxTree, fragment: &Replacement) -> Result<(), MaterializeError> {
    let resolves = |r: &NodeRef| match r {
        NodeRef::Base(id) => base.get(*id).is_some(),
        NodeRef::Local(idx) => (*idx as usize) < fragment.nodes.len(),
    };
    let refs = fragment
        .roots
        .iter()
        .copied()
        .chain(fragment.nodes.iter().flat_map(|node| node.kind.children()));
    for r in refs {
        if !resolves(&r) {
            return Err(MaterializeError::DanglingReplacement(r));
        }
    }
    Ok(())
}

pub fn materialize<'a>(
    unit: &'a SourceUnit,
    mutation: &'a Mutation,
) -> Result<MutantTree<'a>, MaterializeError> {
    MutantTree::new(unit, mutation)
}

/// Printed mutant ready to be written into a working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutantSource {
    pub source: String,
    /// SHA-256 over the unit path and the mutant text
    pub digest: String,
    pub diff: String,
}

/// Materialize, print and sanity-check a mutant.
pub fn render_mutant(
    printer: &dyn Printer,
    unit: &SourceUnit,
    mutation: &Mutation,
) -> Result<MutantSource, MaterializeError> {
    let tree = materialize(unit, mutation)?;
    let source = printer.print(&tree, unit)?;
    printer.verify(&source)?;

    let digest = compute_digest(&unit.display_path(), &source);
    let diff = generate_diff(&unit.display_path(), &unit.source, &source);
    Ok(MutantSource {
        source,
        digest,
        diff,
    })
}

fn compute_digest(path: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn generate_diff(path: &str, original: &str, mutated: &str) -> String {
    if original == mutated {
        return String::new();
    }
    similar::TextDiff::from_lines(original, mutated)
        .unified_diff()
        .context_radius(2)
        .header(&format!("a/{}", path), &format!("b/{}", path))
        .to_string()
}
