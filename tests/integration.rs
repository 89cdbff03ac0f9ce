//! End-to-end tests over the public surface: parse, print, elaborate, and
//! query through the facade the way external tools would.

use shale::sem::eval;
use shale::sem::symbol::{NetKind, SymbolKind};
use shale::{Compilation, DiagCode, GlobalArenas, SyntaxKind};

fn compile<'a>(arenas: &'a GlobalArenas<'a>, sources: &[(&str, &str)]) -> Compilation<'a> {
    let comp = Compilation::new(arenas);
    for (name, text) in sources {
        comp.parse_str(name, text);
    }
    comp.root();
    comp
}

#[test]
fn roundtrip_through_facade() {
    let arenas = GlobalArenas::default();
    let comp = Compilation::new(&arenas);
    let input = "// top\nmodule top #(parameter N = 2) (input logic clk);\n  wire [N-1:0] bus;\n  assign bus = '0;\nendmodule\n";
    let tree = comp.parse_str("top.sv", input);
    assert_eq!(tree.print(&comp.sm), input);
}

#[test]
fn seed_net_and_assigns() {
    let arenas = GlobalArenas::default();
    let comp = compile(
        &arenas,
        &[("t.sv", "module m; wire foo; assign foo = 1, foo = 'z; endmodule")],
    );
    assert!(!comp.diag.has_errors(), "diags: {:?}", comp.diagnostics());
    let m = comp.find("m").unwrap();
    let body = match &m.kind {
        SymbolKind::Instance(i) => i.body,
        _ => panic!("m should be an instance"),
    };
    let members = body.as_scope().unwrap().members();
    assert_eq!(
        members
            .iter()
            .filter(|s| matches!(s.kind, SymbolKind::Net(_)))
            .count(),
        1
    );
    assert_eq!(
        members
            .iter()
            .filter(|s| matches!(s.kind, SymbolKind::ContinuousAssign { .. }))
            .count(),
        2
    );
}

#[test]
fn seed_nettype_import() {
    let arenas = GlobalArenas::default();
    let comp = compile(
        &arenas,
        &[
            ("p.sv", "package p; nettype logic [3:0] foo; endpackage"),
            ("m.sv", "module m; import p::*; foo a = 1; endmodule"),
        ],
    );
    assert!(!comp.diag.has_errors(), "diags: {:?}", comp.diagnostics());
    let a = comp.find("m.a").unwrap();
    match &a.kind {
        SymbolKind::Net(n) => assert!(matches!(n.kind, NetKind::UserDefined(_))),
        _ => panic!("m.a should be a net"),
    }
}

#[test]
fn seed_macro_default() {
    let arenas = GlobalArenas::default();
    let comp = compile(
        &arenas,
        &[("t.sv", "`define F(x,y=3) x+y\nmodule m; int i = `F(1); endmodule\n")],
    );
    let i = comp.find("m.i").unwrap();
    assert_eq!(
        eval::eval_symbol(&comp, i),
        Some(eval::Value::Int(4.into()))
    );
}

#[test]
fn seed_time_scales() {
    let arenas = GlobalArenas::default();
    let comp = compile(
        &arenas,
        &[
            ("a.sv", "timeunit 10us;\n"),
            ("b.sv", "module m; timeunit 20ns; endmodule\n"),
        ],
    );
    assert!(comp
        .diagnostics()
        .iter()
        .any(|d| d.code == DiagCode::MismatchedTimeScales));
}

#[test]
fn seed_sequential_udp() {
    let arenas = GlobalArenas::default();
    let comp = compile(
        &arenas,
        &[(
            "u.sv",
            "primitive p(q, a);\n  input a;\n  output reg q;\n  initial q = 1'bx;\n  table\n    0 : ? : 1;\n  endtable\nendprimitive\n",
        )],
    );
    assert!(!comp.diag.has_errors(), "diags: {:?}", comp.diagnostics());
    let prim = comp.primitive(comp.names.find("p").unwrap()).unwrap();
    match &prim.kind {
        SymbolKind::Primitive(d) => {
            assert!(d.sequential.get());
            assert_eq!(d.initial.get(), Some('x'));
        }
        _ => unreachable!(),
    }
}

#[test]
fn seed_port_decl_in_ansi() {
    let arenas = GlobalArenas::default();
    let comp = compile(
        &arenas,
        &[("t.sv", "module m(input logic a); input b; endmodule")],
    );
    assert!(comp
        .diagnostics()
        .iter()
        .any(|d| d.code == DiagCode::PortDeclInANSIModule));
}

#[test]
fn instance_identity_by_binding() {
    let arenas = GlobalArenas::default();
    let comp = compile(
        &arenas,
        &[(
            "t.sv",
            "module leaf #(parameter W = 4); endmodule\nmodule top; leaf #(8) a(); leaf #(.W(8)) b(); endmodule\n",
        )],
    );
    assert!(!comp.diag.has_errors(), "diags: {:?}", comp.diagnostics());
    let a = comp.find("top.a").unwrap();
    let b = comp.find("top.b").unwrap();
    let (ab, bb) = match (&a.kind, &b.kind) {
        (SymbolKind::Instance(x), SymbolKind::Instance(y)) => (x.body, y.body),
        _ => unreachable!(),
    };
    assert!(std::ptr::eq(ab, bb), "identical bindings share one body");
}

#[test]
fn diagnostics_are_enumerable_and_located() {
    let arenas = GlobalArenas::default();
    let comp = compile(&arenas, &[("t.sv", "module m; unknown_t x = ; endmodule")]);
    assert!(comp.diag.has_errors());
    for d in comp.diagnostics() {
        if d.span.source.is_valid() {
            let resolved = comp.sm.resolve(d.span.begin());
            assert_eq!(&*resolved.path, "t.sv");
            assert!(resolved.line >= 1);
        }
    }
}

#[test]
fn visitor_walks_facade_tree() {
    let arenas = GlobalArenas::default();
    let comp = Compilation::new(&arenas);
    let tree = comp.parse_str("t.sv", "module m; int x = 1 + 2; endmodule");
    struct Count(usize);
    impl<'a> shale::Visitor<'a> for Count {
        fn enter_node(&mut self, node: &'a shale::SyntaxNode<'a>) -> bool {
            if node.kind == SyntaxKind::BinaryExpr {
                self.0 += 1;
            }
            true
        }
    }
    let mut count = Count(0);
    shale::syntax::ast::walk(tree.root, &mut count);
    assert_eq!(count.0, 1);
}

#[test]
fn independent_compilations_in_threads() {
    // No process-wide state: compilations on separate threads do not
    // interfere.
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let arenas = GlobalArenas::default();
                let comp = Compilation::new(&arenas);
                comp.parse_str(
                    "t.sv",
                    &format!("module m{}; int x = {}; endmodule", i, i),
                );
                comp.root();
                assert!(!comp.diag.has_errors());
                comp.diagnostics().len()
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), 0);
    }
}
