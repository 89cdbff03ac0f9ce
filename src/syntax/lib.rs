//! This crate implements lexing, preprocessing, and parsing of SystemVerilog
//! source files into lossless concrete syntax trees. The tree retains every
//! byte of the input as tokens and trivia; printing a tree reproduces the
//! buffer it was parsed from. Name resolution and elaboration live in the
//! sibling `shale-sem` crate.

#[macro_use]
extern crate log;

pub mod ast;
pub mod cat;
pub mod lexer;
pub mod parser;
pub mod preproc;
pub mod printer;
pub mod rewrite;
pub mod token;

pub use crate::ast::{SyntaxArena, SyntaxElem, SyntaxKind, SyntaxNode, Visitor};
pub use crate::parser::Guess;
pub use crate::preproc::{DefaultNetType, MacroDef, PreprocOptions, Preprocessor, TimeScale};
pub use crate::token::{Kw, KeywordVersion, Token, TokenKind, Trivia, TriviaKind};

use shale_common::diag::DiagnosticEngine;
use shale_common::name::NameTable;
use shale_common::source::{Location, Source, SourceManager, Spanned};

/// A parsed buffer: the root syntax node plus the preprocessor state that
/// the symbol layer needs (default-nettype changes, time scale, macro
/// snapshot).
pub struct SyntaxTree<'a> {
    pub root: &'a SyntaxNode<'a>,
    pub source: Source,
    pub default_nettypes: Vec<(Location, DefaultNetType)>,
    pub timescale: Option<Spanned<TimeScale>>,
    pub macros: Vec<MacroDef>,
}

impl<'a> SyntaxTree<'a> {
    /// Preprocess and parse one buffer into a tree.
    pub fn parse(
        source: Source,
        sm: &SourceManager,
        names: &NameTable,
        diag: &DiagnosticEngine,
        arena: &'a SyntaxArena<'a>,
        options: PreprocOptions,
        predefines: &[(String, String)],
    ) -> SyntaxTree<'a> {
        debug!("parsing buffer {:?}", source);
        let mut pp = Preprocessor::new(source, sm, names, diag, options);
        for (name, text) in predefines {
            pp.predefine(name, text);
        }
        let root = parser::parse_source_text(&mut pp, arena, names, diag);
        SyntaxTree {
            root,
            source,
            default_nettypes: pp.nettype_events().to_vec(),
            timescale: pp.timescale(),
            macros: pp.defined_macros(),
        }
    }

    /// The `default_nettype` in effect at a location of the parsed buffer.
    pub fn default_nettype_at(&self, loc: Location) -> DefaultNetType {
        let mut current = DefaultNetType::Wire;
        for (at, nt) in &self.default_nettypes {
            if at.source == loc.source && at.offset <= loc.offset {
                current = *nt;
            }
        }
        current
    }

    /// Render the tree back to the text of its buffer.
    pub fn print(&self, sm: &SourceManager) -> String {
        printer::print_source(self.root, sm, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SyntaxKind;

    struct Fixture {
        sm: SourceManager,
        names: NameTable,
        diag: DiagnosticEngine,
    }

    impl Fixture {
        fn new() -> Fixture {
            Fixture {
                sm: SourceManager::new(),
                names: NameTable::new(),
                diag: DiagnosticEngine::new(),
            }
        }

        fn parse<'a>(&self, arena: &'a SyntaxArena<'a>, input: &str) -> SyntaxTree<'a> {
            let src = self.sm.add_anonymous(input.to_string());
            SyntaxTree::parse(
                src,
                &self.sm,
                &self.names,
                &self.diag,
                arena,
                PreprocOptions::default(),
                &[],
            )
        }
    }

    fn roundtrip(input: &str) {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(&arena, input);
        assert_eq!(tree.print(&f.sm), input, "print(parse(S)) != S");
    }

    #[test]
    fn roundtrip_simple_module() {
        roundtrip("module m;\n  wire foo;\n  assign foo = 1, foo = 'z;\nendmodule\n");
    }

    #[test]
    fn roundtrip_with_comments_and_whitespace() {
        roundtrip("  // leading\nmodule /* why */ m ;\n\tlogic [7:0] x = 8'hff;  \nendmodule // trailing\n");
    }

    #[test]
    fn roundtrip_survives_errors() {
        // Missing semicolons and garbage tokens become synthetic tokens and
        // skipped trivia, both of which print as the original text.
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let input = "module m\n  wire w\n  assign = 1;\n  ??? garbage\nendmodule\n";
        let tree = f.parse(&arena, input);
        assert!(f.diag.has_errors());
        assert_eq!(tree.print(&f.sm), input);
    }

    #[test]
    fn roundtrip_with_macros() {
        roundtrip("`define W 8\nmodule m;\n  logic [`W-1:0] bus;\nendmodule\n");
    }

    #[test]
    fn roundtrip_package_and_import() {
        roundtrip("package p;\n  nettype logic [3:0] nibble;\nendpackage\nmodule m;\n  import p::*;\n  nibble a = 1;\nendmodule\n");
    }

    #[test]
    fn parse_tree_shape() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(
            &arena,
            "module m; wire foo; assign foo = 1, foo = 'z; endmodule",
        );
        assert!(f.diag.is_empty());
        let module = tree.root.first_node_of(SyntaxKind::ModuleDecl).unwrap();
        assert_eq!(
            f.names.get(module.ident().unwrap().ident_name().unwrap()).to_string(),
            "m"
        );
        let mut nets = Vec::new();
        module.descendants_of(SyntaxKind::NetDecl, &mut nets);
        assert_eq!(nets.len(), 1);
        let mut assigns = Vec::new();
        module.descendants_of(SyntaxKind::ContinuousAssign, &mut assigns);
        assert_eq!(assigns.len(), 1);
    }

    #[test]
    fn parent_links_are_set() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(&arena, "module m; int x = 1 + 2; endmodule");
        let mut exprs = Vec::new();
        tree.root.descendants_of(SyntaxKind::BinaryExpr, &mut exprs);
        let e = exprs[0];
        let mut cur = Some(e);
        let mut hops = 0;
        while let Some(n) = cur {
            if n.kind == SyntaxKind::SourceText {
                break;
            }
            cur = n.parent();
            hops += 1;
            assert!(hops < 64, "parent chain must terminate at the root");
        }
        assert!(cur.is_some());
        // Token spans stay within every ancestor.
        let tok_span = e.first_token().unwrap().span;
        let mut up = e.parent();
        while let Some(n) = up {
            assert!(n.span.contains(tok_span));
            up = n.parent();
        }
    }

    #[test]
    fn missing_token_synthesized() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(&arena, "module m; int x = 1");
        assert!(f.diag.has_errors());
        let mut found_missing = false;
        let mut stack = vec![tree.root];
        while let Some(n) = stack.pop() {
            for t in n.tokens() {
                if t.missing && t.kind == TokenKind::Semicolon {
                    found_missing = true;
                }
            }
            stack.extend(n.child_nodes());
        }
        assert!(found_missing, "a synthetic `;` should be in the tree");
    }

    #[test]
    fn ansi_and_non_ansi_ports() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(
            &arena,
            "module a(input logic x, output y); endmodule\nmodule b(p, q); input p; output q; endmodule",
        );
        assert!(f.diag.is_empty(), "diags: {:?}", f.diag.diagnostics());
        let mut mods = Vec::new();
        tree.root.descendants_of(SyntaxKind::ModuleDecl, &mut mods);
        assert!(mods[0].first_node_of(SyntaxKind::PortList).is_some());
        assert!(mods[1].first_node_of(SyntaxKind::NonAnsiPortList).is_some());
    }

    #[test]
    fn instantiation_vs_declaration() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(
            &arena,
            "module m; foo u0(.a(1), .b(x)); foo v; foo #(8) u1(); endmodule",
        );
        assert!(f.diag.is_empty(), "diags: {:?}", f.diag.diagnostics());
        let mut insts = Vec::new();
        tree.root.descendants_of(SyntaxKind::Instantiation, &mut insts);
        assert_eq!(insts.len(), 2);
        let mut decls = Vec::new();
        tree.root.descendants_of(SyntaxKind::DataDecl, &mut decls);
        assert_eq!(decls.len(), 1);
    }

    #[test]
    fn named_type_with_packed_dims() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(&arena, "module m; mytype [3:0] v; endmodule");
        assert!(f.diag.is_empty(), "diags: {:?}", f.diag.diagnostics());
        let mut decls = Vec::new();
        tree.root.descendants_of(SyntaxKind::DataDecl, &mut decls);
        assert_eq!(decls.len(), 1);
        assert!(decls[0].first_node_of(SyntaxKind::NamedType).is_some());
    }

    #[test]
    fn expression_precedence() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(&arena, "module m; int x = 1 + 2 * 3; endmodule");
        assert!(f.diag.is_empty());
        let mut bins = Vec::new();
        tree.root.descendants_of(SyntaxKind::BinaryExpr, &mut bins);
        // The outermost expression is the addition; the multiplication
        // nests below it.
        let outer = bins
            .iter()
            .find(|b| b.token_of(TokenKind::Operator(token::Op::Add)).is_some())
            .unwrap();
        assert!(outer
            .child_nodes()
            .any(|n| n.token_of(TokenKind::Operator(token::Op::Mul)).is_some()));
    }

    #[test]
    fn clocking_and_modport_parse() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(
            &arena,
            "interface bus(input clk);\n  logic req;\n  logic ack;\n  clocking cb @(posedge clk);\n    default input #1 output #2;\n    input req;\n    output ack;\n  endclocking\n  modport master(input ack, output req, clocking cb);\nendinterface\n",
        );
        assert!(f.diag.is_empty(), "diags: {:?}", f.diag.diagnostics());
        let mut blocks = Vec::new();
        tree.root.descendants_of(SyntaxKind::ClockingBlock, &mut blocks);
        assert_eq!(blocks.len(), 1);
        let mut items = Vec::new();
        blocks[0].descendants_of(SyntaxKind::DefaultSkewItem, &mut items);
        assert_eq!(items.len(), 1);
        let mut ports = Vec::new();
        tree.root
            .descendants_of(SyntaxKind::ModportClockingPort, &mut ports);
        assert_eq!(ports.len(), 1);
    }

    #[test]
    fn primitive_parses() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(
            &arena,
            "primitive latch(q, clk, d);\n  output reg q;\n  input clk, d;\n  initial q = 1'bx;\n  table\n    1 0 : ? : 0;\n    1 1 : ? : 1;\n  endtable\nendprimitive\n",
        );
        assert!(f.diag.is_empty(), "diags: {:?}", f.diag.diagnostics());
        let mut tables = Vec::new();
        tree.root.descendants_of(SyntaxKind::UdpTable, &mut tables);
        assert_eq!(tables.len(), 1);
        let mut rows = Vec::new();
        tables[0].descendants_of(SyntaxKind::UdpEntry, &mut rows);
        assert_eq!(rows.len(), 2);
        let mut inits = Vec::new();
        tree.root.descendants_of(SyntaxKind::UdpInitial, &mut inits);
        assert_eq!(inits.len(), 1);
    }

    #[test]
    fn sequence_and_property_parse() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(
            &arena,
            "module m(input clk, a, b);\n  sequence s1(local input int x, y = 1);\n    a ##1 b;\n  endsequence\n  property p1;\n    @(posedge clk) a |-> b;\n  endproperty\n  let two = 1 + 1;\nendmodule\n",
        );
        assert!(f.diag.is_empty(), "diags: {:?}", f.diag.diagnostics());
        let mut seqs = Vec::new();
        tree.root.descendants_of(SyntaxKind::SequenceDecl, &mut seqs);
        assert_eq!(seqs.len(), 1);
        let mut props = Vec::new();
        tree.root.descendants_of(SyntaxKind::PropertyDecl, &mut props);
        assert_eq!(props.len(), 1);
        let mut lets = Vec::new();
        tree.root.descendants_of(SyntaxKind::LetDecl, &mut lets);
        assert_eq!(lets.len(), 1);
        let mut ports = Vec::new();
        tree.root.descendants_of(SyntaxKind::AssertionPort, &mut ports);
        assert_eq!(ports.len(), 2);
    }

    #[test]
    fn randsequence_parses() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(
            &arena,
            "module m;\n  initial begin\n    randsequence(main)\n      main : first second := 3;\n      first : { x = 1; } | repeat (2) second;\n      second : case (x) 0: first; default: first; endcase;\n    endsequence\n  end\nendmodule\n",
        );
        assert!(f.diag.is_empty(), "diags: {:?}", f.diag.diagnostics());
        let mut prods = Vec::new();
        tree.root.descendants_of(SyntaxKind::RsProduction, &mut prods);
        assert_eq!(prods.len(), 3);
        let mut weights = Vec::new();
        tree.root.descendants_of(SyntaxKind::RsWeightClause, &mut weights);
        assert_eq!(weights.len(), 1);
    }

    #[test]
    fn elab_task_parses() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(
            &arena,
            "module m;\n  $error(\"bad %d\", 42);\n  $static_assert(1 == 1);\nendmodule\n",
        );
        assert!(f.diag.is_empty(), "diags: {:?}", f.diag.diagnostics());
        let mut tasks = Vec::new();
        tree.root.descendants_of(SyntaxKind::ElabSystemTask, &mut tasks);
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn guess_classifies() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let mut run = |input: &str| {
            let src = f.sm.add_anonymous(input.to_string());
            let mut pp = Preprocessor::new(src, &f.sm, &f.names, &f.diag, PreprocOptions::default());
            parser::parse_guess(&mut pp, &arena, &f.names, &f.diag).0
        };
        assert_eq!(run("module m; endmodule"), Guess::SourceText);
        assert_eq!(run("assign a = b;"), Guess::Member);
        assert_eq!(run("begin a = 1; end"), Guess::Statement);
        assert_eq!(run("a + b * c"), Guess::Expression);
        assert_eq!(run("a = b;"), Guess::Statement);
    }

    #[test]
    fn rewriter_replaces_subtree() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let tree = f.parse(&arena, "module m; int x = 1; endmodule");
        let mut lits = Vec::new();
        tree.root.descendants_of(SyntaxKind::LiteralExpr, &mut lits);
        let old = lits[0];
        // Synthesize a replacement literal from a scratch parse.
        let scratch = f.parse(&arena, "module s; int y = 42; endmodule");
        let mut new_lits = Vec::new();
        scratch.root.descendants_of(SyntaxKind::LiteralExpr, &mut new_lits);
        let mut rw = rewrite::Rewriter::new(&arena);
        rw.replace(old, new_lits[0]);
        let new_root = rw.rewrite(tree.root);
        let mut after = Vec::new();
        new_root.descendants_of(SyntaxKind::LiteralExpr, &mut after);
        assert!(std::ptr::eq(after[0], new_lits[0]));
        // Unchanged subtrees are shared, changed ancestors are rebuilt.
        assert!(!std::ptr::eq(new_root, tree.root));
        assert_eq!(after[0].parent().unwrap().kind, SyntaxKind::Declarator);
    }

    #[test]
    fn trivia_attachment_is_contiguous() {
        let f = Fixture::new();
        let arena = SyntaxArena::new();
        let input = "module m;  /* a */ // b\n  wire w;\nendmodule";
        let tree = f.parse(&arena, input);
        // For every non-synthetic token, trivia + text covers the slice
        // between the previous token's end and its own end.
        struct Check<'s> {
            sm: &'s SourceManager,
            src: Source,
            prev_end: usize,
        }
        impl<'a, 's> Visitor<'a> for Check<'s> {
            fn visit_token(&mut self, tok: &'a Token) {
                if tok.missing || tok.span.source != self.src {
                    return;
                }
                let mut text = String::new();
                for tr in &tok.trivia {
                    if tr.span.source == self.src {
                        text.push_str(&self.sm.span_text(tr.span));
                    }
                }
                text.push_str(&self.sm.span_text(tok.span));
                let expected =
                    self.sm.span_text(shale_common::source::Span::new(
                        self.src,
                        self.prev_end,
                        tok.span.end,
                    ));
                assert_eq!(text, expected);
                self.prev_end = tok.span.end;
            }
        }
        let mut check = Check {
            sm: &f.sm,
            src: tree.source,
            prev_end: 0,
        };
        ast::walk(tree.root, &mut check);
        assert_eq!(check.prev_end, input.len());
    }
}
