//! Tree rewriting. A rewriter collects node replacements and removals, then
//! produces a new tree: unchanged subtrees are referenced directly, while
//! changed subtrees and their ancestors up to the root are rebuilt. The
//! input tree is consumed by the rewrite; its parent links are re-pointed
//! into the produced tree, so the old root must not be used afterwards.

use crate::ast::{link, SyntaxArena, SyntaxElem, SyntaxNode};
use rustc_hash::{FxHashMap, FxHashSet};

pub struct Rewriter<'a> {
    arena: &'a SyntaxArena<'a>,
    replacements: FxHashMap<*const SyntaxNode<'a>, &'a SyntaxNode<'a>>,
    removals: FxHashSet<*const SyntaxNode<'a>>,
}

impl<'a> Rewriter<'a> {
    pub fn new(arena: &'a SyntaxArena<'a>) -> Rewriter<'a> {
        Rewriter {
            arena,
            replacements: FxHashMap::default(),
            removals: FxHashSet::default(),
        }
    }

    /// Replace `old` with `new` wherever `old` appears.
    pub fn replace(&mut self, old: &'a SyntaxNode<'a>, new: &'a SyntaxNode<'a>) -> &mut Self {
        self.replacements.insert(old as *const _, new);
        self
    }

    /// Drop `node` from its parent's child list.
    pub fn remove(&mut self, node: &'a SyntaxNode<'a>) -> &mut Self {
        self.removals.insert(node as *const _);
        self
    }

    /// Produce the rewritten tree rooted at `root`.
    pub fn rewrite(self, root: &'a SyntaxNode<'a>) -> &'a SyntaxNode<'a> {
        let new_root = self.go(root);
        link(new_root);
        new_root
    }

    fn go(&self, node: &'a SyntaxNode<'a>) -> &'a SyntaxNode<'a> {
        if let Some(rep) = self.replacements.get(&(node as *const _)) {
            return rep;
        }
        let mut changed = false;
        let mut children = Vec::with_capacity(node.children.len());
        for child in node.children() {
            match child {
                SyntaxElem::Token(tok) => children.push(SyntaxElem::Token(tok.clone())),
                SyntaxElem::Node(n) => {
                    if self.removals.contains(&(*n as *const _)) {
                        changed = true;
                        continue;
                    }
                    let mapped = self.go(n);
                    if !std::ptr::eq(mapped, *n) {
                        changed = true;
                    }
                    children.push(SyntaxElem::Node(mapped));
                }
            }
        }
        if changed {
            SyntaxNode::alloc(self.arena, node.kind, children)
        } else {
            node
        }
    }
}
