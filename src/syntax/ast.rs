//! The concrete syntax tree. Nodes are kind-tagged and store their children
//! as an interleaving of tokens and child nodes, in source order; nothing is
//! dropped, so a depth-first emission of every token's trivia and raw text
//! reconstructs the input. Every node carries a parent back-link which is
//! populated by a linking pass once the tree is complete, after which a
//! published subtree is immutable.

use crate::token::{Kw, Token, TokenKind};
use shale_common::source::{Span, INVALID_SPAN};
use shale_common::util::HasSpan;
use std::cell::Cell;
use typed_arena::Arena;

/// The arena all nodes of a tree are allocated in. Lives at least as long as
/// the compilation that parsed the tree.
pub type SyntaxArena<'a> = Arena<SyntaxNode<'a>>;

/// The discriminant over all grammar productions the parser emits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SyntaxKind {
    // Top level
    SourceText,
    ModuleDecl,
    InterfaceDecl,
    ProgramDecl,
    PackageDecl,
    PrimitiveDecl,
    TimeunitsDecl,

    // Headers
    ParamPortList,
    ParamDecl,
    ParamAssign,
    PortList,
    NonAnsiPortList,
    AnsiPort,
    NonAnsiPort,
    PortDecl,

    // Members
    ImportDecl,
    ImportItem,
    ExportDecl,
    NettypeDecl,
    TypedefDecl,
    DataDecl,
    Declarator,
    NetDecl,
    NetStrength,
    DelayControl,
    ContinuousAssign,
    GenvarDecl,
    EmptyMember,
    ElabSystemTask,
    ModportDecl,
    ModportItem,
    ModportSimplePort,
    ModportExplicitPort,
    ModportSubroutinePort,
    ModportClockingPort,
    ClockingBlock,
    DefaultSkewItem,
    ClockingItem,
    ClockingSkew,
    ClockingAssign,
    SequenceDecl,
    PropertyDecl,
    LetDecl,
    AssertionPortList,
    AssertionPort,
    FunctionDecl,
    TaskDecl,
    TfPortList,
    TfPort,
    ProceduralBlock,
    Instantiation,
    HierInstance,
    ParamAssignments,
    PortConnectionList,
    PortConnection,
    NamedArg,
    OrderedArg,

    // Primitives
    UdpPortList,
    UdpPortDecl,
    UdpInitial,
    UdpTable,
    UdpEntry,

    // Types and dimensions
    DataType,
    ImplicitType,
    NamedType,
    Dimension,

    // Statements
    BlockStmt,
    ExprStmt,
    IfStmt,
    CaseStmt,
    CaseItem,
    ForStmt,
    RepeatStmt,
    WhileStmt,
    ForeverStmt,
    ReturnStmt,
    NullStmt,
    TimingStmt,
    EventControl,
    RandsequenceStmt,
    RsProduction,
    RsRule,
    RsProdItem,
    RsCodeBlock,
    RsIfElse,
    RsRepeat,
    RsCase,
    RsCaseItem,
    RsWeightClause,

    // Expressions
    LiteralExpr,
    IdentExpr,
    SysTfCall,
    ScopedName,
    MemberExpr,
    SelectExpr,
    RangeSelectExpr,
    CallExpr,
    CastExpr,
    UnaryExpr,
    BinaryExpr,
    CondExpr,
    ConcatExpr,
    ReplicationExpr,
    ParenExpr,
    EventExpr,
    SequenceExpr,
    ArgumentList,

    // List flavors
    List,
    SeparatedList,
    TokenList,

    // Error recovery
    ErrorNode,
}

/// One child of a syntax node: either a token or a nested node.
#[derive(Debug)]
pub enum SyntaxElem<'a> {
    Token(Token),
    Node(&'a SyntaxNode<'a>),
}

/// A node of the concrete syntax tree.
#[derive(Debug)]
pub struct SyntaxNode<'a> {
    pub kind: SyntaxKind,
    pub span: Span,
    pub parent: Cell<Option<&'a SyntaxNode<'a>>>,
    pub children: Vec<SyntaxElem<'a>>,
}

impl<'a> SyntaxNode<'a> {
    /// Allocate a node from its children. The span is computed from the
    /// first and last child; synthetic tokens contribute their zero-width
    /// positions.
    pub fn alloc(
        arena: &'a SyntaxArena<'a>,
        kind: SyntaxKind,
        children: Vec<SyntaxElem<'a>>,
    ) -> &'a SyntaxNode<'a> {
        let mut span = INVALID_SPAN;
        for child in &children {
            let csp = match child {
                SyntaxElem::Token(tok) => tok.span,
                SyntaxElem::Node(node) => node.span,
            };
            if !span.source.is_valid() {
                span = csp;
            } else if csp.source == span.source {
                span.expand(csp);
            }
        }
        arena.alloc(SyntaxNode {
            kind,
            span,
            parent: Cell::new(None),
            children,
        })
    }

    pub fn parent(&self) -> Option<&'a SyntaxNode<'a>> {
        self.parent.get()
    }

    /// Iterate the direct children, tokens and nodes interleaved in source
    /// order.
    pub fn children(&self) -> std::slice::Iter<'_, SyntaxElem<'a>> {
        self.children.iter()
    }

    /// Iterate the direct child nodes.
    pub fn child_nodes(&self) -> impl Iterator<Item = &'a SyntaxNode<'a>> + '_ {
        self.children.iter().filter_map(|c| match c {
            SyntaxElem::Node(n) => Some(*n),
            SyntaxElem::Token(_) => None,
        })
    }

    /// Iterate the direct child tokens.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> + use<'_, 'a> {
        self.children.iter().filter_map(|c| match c {
            SyntaxElem::Token(t) => Some(t),
            SyntaxElem::Node(_) => None,
        })
    }

    /// The first token in this subtree, in source order.
    pub fn first_token(&self) -> Option<&Token> {
        for child in &self.children {
            match child {
                SyntaxElem::Token(t) => return Some(t),
                SyntaxElem::Node(n) => {
                    if let Some(t) = n.first_token() {
                        return Some(t);
                    }
                }
            }
        }
        None
    }

    /// The last token in this subtree, in source order.
    pub fn last_token(&self) -> Option<&Token> {
        for child in self.children.iter().rev() {
            match child {
                SyntaxElem::Token(t) => return Some(t),
                SyntaxElem::Node(n) => {
                    if let Some(t) = n.last_token() {
                        return Some(t);
                    }
                }
            }
        }
        None
    }

    /// Direct child nodes of a given kind.
    pub fn nodes_of(&self, kind: SyntaxKind) -> impl Iterator<Item = &'a SyntaxNode<'a>> + '_ {
        self.child_nodes().filter(move |n| n.kind == kind)
    }

    /// The first direct child node of a given kind.
    pub fn first_node_of(&self, kind: SyntaxKind) -> Option<&'a SyntaxNode<'a>> {
        self.nodes_of(kind).next()
    }

    /// The first direct child node of a given kind, searching nested list
    /// nodes transparently.
    pub fn find_node(&self, kind: SyntaxKind) -> Option<&'a SyntaxNode<'a>> {
        for node in self.child_nodes() {
            if node.kind == kind {
                return Some(node);
            }
            if matches!(
                node.kind,
                SyntaxKind::List | SyntaxKind::SeparatedList | SyntaxKind::TokenList
            ) {
                if let Some(found) = node.find_node(kind) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// The first direct identifier token (plain or escaped).
    pub fn ident(&self) -> Option<&Token> {
        self.tokens()
            .find(|t| matches!(t.kind, TokenKind::Ident(_) | TokenKind::EscIdent(_)))
    }

    /// The first direct token with the given kind.
    pub fn token_of(&self, kind: TokenKind) -> Option<&Token> {
        self.tokens().find(|t| t.kind == kind)
    }

    /// Whether a direct child token is the given keyword.
    pub fn has_keyword(&self, kw: Kw) -> bool {
        self.token_of(TokenKind::Keyword(kw)).is_some()
    }

    /// Walk all nodes of the given kind in this subtree, in source order.
    pub fn descendants_of(&'a self, kind: SyntaxKind, out: &mut Vec<&'a SyntaxNode<'a>>) {
        for node in self.child_nodes() {
            if node.kind == kind {
                out.push(node);
            }
            node.descendants_of(kind, out);
        }
    }

    /// The nearest ancestor of the given kind, if any.
    pub fn ancestor_of(&self, kind: SyntaxKind) -> Option<&'a SyntaxNode<'a>> {
        let mut cur = self.parent();
        while let Some(node) = cur {
            if node.kind == kind {
                return Some(node);
            }
            cur = node.parent();
        }
        None
    }
}

impl HasSpan for SyntaxNode<'_> {
    fn span(&self) -> Span {
        self.span
    }
}

/// Set the parent back-links of every node in the subtree. Called once by
/// the parser before a tree is published; the root's parent stays `None`.
pub fn link<'a>(root: &'a SyntaxNode<'a>) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        for child in &node.children {
            if let SyntaxElem::Node(n) = child {
                n.parent.set(Some(node));
                stack.push(n);
            }
        }
    }
}

/// A depth-first visitor over nodes and tokens. `enter_node` may return
/// `false` to skip the subtree.
pub trait Visitor<'a> {
    fn enter_node(&mut self, _node: &'a SyntaxNode<'a>) -> bool {
        true
    }
    fn leave_node(&mut self, _node: &'a SyntaxNode<'a>) {}
    fn visit_token(&mut self, _token: &'a Token) {}
}

/// Drive a visitor over a subtree, respecting list ordering.
pub fn walk<'a, V: Visitor<'a> + ?Sized>(node: &'a SyntaxNode<'a>, visitor: &mut V) {
    if !visitor.enter_node(node) {
        return;
    }
    for child in &node.children {
        match child {
            SyntaxElem::Token(tok) => visitor.visit_token(tok),
            SyntaxElem::Node(n) => walk(n, visitor),
        }
    }
    visitor.leave_node(node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use shale_common::source::{Source, Span};

    fn tok(kind: TokenKind, begin: usize, end: usize) -> Token {
        Token::new(kind, Span::new(Source(1), begin, end))
    }

    #[test]
    fn alloc_computes_span_and_links() {
        let arena = SyntaxArena::new();
        let inner = SyntaxNode::alloc(
            &arena,
            SyntaxKind::IdentExpr,
            vec![SyntaxElem::Token(tok(TokenKind::Semicolon, 4, 5))],
        );
        let root = SyntaxNode::alloc(
            &arena,
            SyntaxKind::SourceText,
            vec![
                SyntaxElem::Token(tok(TokenKind::Keyword(Kw::Module), 0, 3)),
                SyntaxElem::Node(inner),
            ],
        );
        link(root);
        assert_eq!(root.span, Span::new(Source(1), 0, 5));
        assert_eq!(inner.parent().unwrap().kind, SyntaxKind::SourceText);
        assert!(root.parent().is_none());
        assert!(root.span.contains(inner.span));
    }

    #[test]
    fn walk_order() {
        let arena = SyntaxArena::new();
        let inner = SyntaxNode::alloc(
            &arena,
            SyntaxKind::IdentExpr,
            vec![SyntaxElem::Token(tok(TokenKind::Semicolon, 3, 4))],
        );
        let root = SyntaxNode::alloc(
            &arena,
            SyntaxKind::SourceText,
            vec![
                SyntaxElem::Token(tok(TokenKind::Keyword(Kw::Module), 0, 3)),
                SyntaxElem::Node(inner),
            ],
        );
        struct Collect(Vec<String>);
        impl<'a> Visitor<'a> for Collect {
            fn enter_node(&mut self, node: &'a SyntaxNode<'a>) -> bool {
                self.0.push(format!("enter {:?}", node.kind));
                true
            }
            fn leave_node(&mut self, node: &'a SyntaxNode<'a>) {
                self.0.push(format!("leave {:?}", node.kind));
            }
            fn visit_token(&mut self, token: &'a Token) {
                self.0.push(format!("tok {}", token.kind));
            }
        }
        let mut c = Collect(Vec::new());
        walk(root, &mut c);
        assert_eq!(
            c.0,
            vec![
                "enter SourceText",
                "tok module",
                "enter IdentExpr",
                "tok ;",
                "leave IdentExpr",
                "leave SourceText",
            ]
        );
    }
}
