//! This crate implements the symbol and elaboration layer of the shale
//! SystemVerilog front-end: scoped symbol hierarchies with lazily resolved
//! types, parameters, instances, nets, variables, modports, clocking
//! blocks, and assertion declarations, built from the syntax trees produced
//! by `shale-syntax`.

#[macro_use]
extern crate log;

pub mod assertion;
pub mod clocking;
pub mod compilation;
pub mod decl;
pub mod eval;
pub mod inst;
pub mod members;
pub mod modport;
pub mod primitive;
pub mod randseq;
pub mod scope;
pub mod symbol;
pub mod ty;

pub use crate::compilation::{Compilation, CompilationOptions, GlobalArenas};
pub use crate::decl::{DeclaredType, DeclaredTypeFlags};
pub use crate::eval::Value;
pub use crate::scope::{LookupFlags, LookupLocation, Scope};
pub use crate::symbol::{Direction, Lifetime, Symbol, SymbolKind, ValueFlags};
pub use crate::ty::{Type, TypeInterner};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::*;
    use shale_common::diag::DiagCode;

    fn compile<'a>(arenas: &'a GlobalArenas<'a>, sources: &[(&str, &str)]) -> Compilation<'a> {
        let comp = Compilation::new(arenas);
        for (name, text) in sources {
            comp.parse_str(name, text);
        }
        comp.root();
        comp
    }

    fn body_of<'a>(comp: &Compilation<'a>, name: &str) -> &'a Symbol<'a> {
        match &comp.find(name).expect("symbol should exist").kind {
            SymbolKind::Instance(i) => i.body,
            _ => panic!("`{}` is not an instance", name),
        }
    }

    fn has_code(comp: &Compilation, code: DiagCode) -> bool {
        comp.diagnostics().iter().any(|d| d.code == code)
    }

    #[test]
    fn nets_and_continuous_assigns() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[("t.sv", "module m; wire foo; assign foo = 1, foo = 'z; endmodule")],
        );
        assert!(
            !comp.diag.has_errors(),
            "diags: {:?}",
            comp.diagnostics()
        );
        let body = body_of(&comp, "m");
        let members = body.as_scope().unwrap().members();
        let nets = members
            .iter()
            .filter(|s| matches!(s.kind, SymbolKind::Net(_)))
            .count();
        let assigns = members
            .iter()
            .filter(|s| matches!(s.kind, SymbolKind::ContinuousAssign { .. }))
            .count();
        assert_eq!(nets, 1);
        assert_eq!(assigns, 2);
        // Both assignments drive the net.
        let foo = comp.find("m.foo").unwrap();
        assert_eq!(foo.as_value().unwrap().drivers.borrow().len(), 2);
    }

    #[test]
    fn nettype_through_wildcard_import() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[
                ("p.sv", "package p; nettype logic [3:0] foo; endpackage"),
                ("m.sv", "module m; import p::*; foo a = 1; endmodule"),
            ],
        );
        assert!(
            !comp.diag.has_errors(),
            "diags: {:?}",
            comp.diagnostics()
        );
        let a = comp.find("m.a").expect("m.a should resolve");
        let net = match &a.kind {
            SymbolKind::Net(n) => n,
            other => panic!("expected a net, got {}", other.desc()),
        };
        assert!(matches!(net.kind, NetKind::UserDefined(_)));
        let body = body_of(&comp, "m");
        let ty = comp.resolve_declared_type(&net.value.declared_type, body);
        match ty {
            Type::UserNet { nettype, inner } => {
                assert_eq!(&*comp.names.get(*nettype), "foo");
                assert_eq!(inner.bit_width(), Some(4));
            }
            other => panic!("expected a user net type, got {}", other),
        }
    }

    #[test]
    fn macro_default_argument_initializer() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[("t.sv", "`define F(x,y=3) x+y\nmodule m; int i = `F(1); endmodule\n")],
        );
        assert!(
            !comp.diag.has_errors(),
            "diags: {:?}",
            comp.diagnostics()
        );
        let i = comp.find("m.i").expect("m.i should resolve");
        let value = eval::eval_symbol(&comp, i).expect("constant initializer");
        assert_eq!(value, Value::Int(4.into()));
    }

    #[test]
    fn mismatched_time_scales() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[
                ("a.sv", "timeunit 10us;\n"),
                ("b.sv", "module m; timeunit 20ns; endmodule\n"),
            ],
        );
        assert!(has_code(&comp, DiagCode::MismatchedTimeScales));
    }

    #[test]
    fn sequential_primitive_with_initial() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[(
                "u.sv",
                "primitive p(q, a);\n  input a;\n  output reg q;\n  initial q = 1'bx;\n  table\n    0 : ? : 1;\n  endtable\nendprimitive\n",
            )],
        );
        assert!(
            !comp.diag.has_errors(),
            "diags: {:?}",
            comp.diagnostics()
        );
        let name = comp.names.find("p").unwrap();
        let prim = comp.primitive(name).expect("primitive registered");
        let data = match &prim.kind {
            SymbolKind::Primitive(d) => d,
            _ => unreachable!(),
        };
        assert!(data.sequential.get());
        assert_eq!(data.initial.get(), Some('x'));
        assert!(data.table.get().is_some());
    }

    #[test]
    fn port_decl_in_ansi_module() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[("t.sv", "module m(input logic a); input b; endmodule")],
        );
        assert!(has_code(&comp, DiagCode::PortDeclInANSIModule));
    }

    #[test]
    fn instance_bodies_shared_by_binding() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[(
                "t.sv",
                "module leaf #(parameter W = 4); endmodule\nmodule top;\n  leaf #(8) a();\n  leaf #(8) b();\n  leaf #(16) c();\n  leaf d();\nendmodule\n",
            )],
        );
        assert!(
            !comp.diag.has_errors(),
            "diags: {:?}",
            comp.diagnostics()
        );
        let top = body_of(&comp, "top");
        let bodies: Vec<_> = top
            .as_scope()
            .unwrap()
            .members()
            .iter()
            .filter_map(|s| match &s.kind {
                SymbolKind::Instance(i) => Some(i.body as *const Symbol),
                _ => None,
            })
            .collect();
        assert_eq!(bodies.len(), 4);
        // a and b share; c and d are distinct.
        assert_eq!(bodies[0], bodies[1]);
        assert_ne!(bodies[0], bodies[2]);
        assert_ne!(bodies[0], bodies[3]);
        assert_ne!(bodies[2], bodies[3]);
        // The bound parameter value is observable on the shared body.
        let a = comp.find("top.a").unwrap();
        let body = match &a.kind {
            SymbolKind::Instance(i) => i.body,
            _ => unreachable!(),
        };
        let w = body.as_scope().unwrap().get(comp.names.find("W").unwrap()).unwrap();
        assert_eq!(eval::eval_symbol(&comp, w), Some(Value::Int(8.into())));
    }

    #[test]
    fn lookup_is_monotonic_in_location() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[("t.sv", "module m; int a = 1; int b = 2; endmodule")],
        );
        let body = body_of(&comp, "m");
        let name = comp.names.find("b").unwrap();
        let b = comp.find("m.b").unwrap();
        let before = comp.lookup_unqualified(
            body,
            name,
            LookupLocation::before(b),
            LookupFlags::empty(),
        );
        let after = comp.lookup_unqualified(
            body,
            name,
            LookupLocation::after(b),
            LookupFlags::empty(),
        );
        // Not visible before its declaration, visible after; the later
        // location agrees with the earlier one when both resolve.
        assert!(before.is_none());
        assert!(after.is_some());
        let anywhere = comp.lookup_unqualified(
            body,
            name,
            LookupLocation::ANYWHERE,
            LookupFlags::empty(),
        );
        assert!(std::ptr::eq(after.unwrap(), anywhere.unwrap()));
        // Functions are visible before their declaration point.
        let comp2_arenas = GlobalArenas::default();
        let comp2 = compile(
            &comp2_arenas,
            &[("t.sv", "module m; int x = 1; function int f; return 1; endfunction endmodule")],
        );
        let body2 = body_of(&comp2, "m");
        let f = comp2.names.find("f").unwrap();
        let x = comp2.find("m.x").unwrap();
        assert!(comp2
            .lookup_unqualified(body2, f, LookupLocation::before(x), LookupFlags::empty())
            .is_some());
    }

    #[test]
    fn variable_lifetime_rules() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[(
                "t.sv",
                "module m;\n  automatic int bad = 1;\n  initial begin\n    int s = 2;\n    const int c;\n  end\nendmodule\n",
            )],
        );
        assert!(has_code(&comp, DiagCode::AutomaticNotAllowed));
        assert!(has_code(&comp, DiagCode::StaticInitializerMustBeExplicit));
        assert!(has_code(&comp, DiagCode::ConstVarRequiresInitializer));
    }

    #[test]
    fn implicit_nets_follow_default_nettype() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[("t.sv", "module m; assign undeclared = 1; endmodule")],
        );
        assert!(!comp.diag.has_errors());
        let net = comp.find("m.undeclared").expect("implicit net created");
        assert!(matches!(net.kind, SymbolKind::Net(_)));
        assert!(net
            .as_value()
            .unwrap()
            .has_flag(ValueFlags::IMPLICIT_NET));

        let arenas2 = GlobalArenas::default();
        let comp2 = compile(
            &arenas2,
            &[(
                "t.sv",
                "`default_nettype none\nmodule m; assign undeclared = 1; endmodule\n",
            )],
        );
        assert!(has_code(&comp2, DiagCode::ImplicitNetNotAllowed));
    }

    #[test]
    fn package_net_initializer_rejected() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[("t.sv", "package p; wire w = 1; endpackage")],
        );
        assert!(has_code(&comp, DiagCode::PackageNetInit));
    }

    #[test]
    fn clocking_block_rules() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[(
                "t.sv",
                "module m(input clk);\n  logic req;\n  logic ack;\n  clocking cb @(posedge clk);\n    default input #1 output #2;\n    default input #3;\n    input req;\n    output ack;\n  endclocking\nendmodule\n",
            )],
        );
        assert!(has_code(&comp, DiagCode::MultipleDefaultInputSkew));
        let cb = comp.find("m.cb").expect("clocking block resolves");
        let data = match &cb.kind {
            SymbolKind::ClockingBlock(d) => d,
            _ => unreachable!(),
        };
        assert!(data.default_input_skew.get().is_some());
        assert!(data.default_output_skew.get().is_some());
        let members = cb.as_scope().unwrap().members();
        let vars: Vec<_> = members
            .iter()
            .filter_map(|s| match &s.kind {
                SymbolKind::ClockVar(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].direction, Direction::In);
        assert_eq!(vars[1].direction, Direction::Out);
        // The output registers as a driver of the referenced signal.
        let ack = comp.find("m.ack").unwrap();
        assert_eq!(ack.as_value().unwrap().drivers.borrow().len(), 1);
    }

    #[test]
    fn modport_rules() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[(
                "i.sv",
                "interface bus;\n  logic data;\n  function void poke; endfunction\n  modport m(input data, output missing, import poke);\n  modport bad(input poke);\nendinterface\nmodule top; bus u(); endmodule\n",
            )],
        );
        assert!(has_code(&comp, DiagCode::UnresolvedName));
        assert!(has_code(&comp, DiagCode::ExpectedImportExport));
        let body = body_of(&comp, "top");
        let u = body
            .as_scope()
            .unwrap()
            .get(comp.names.find("u").unwrap())
            .unwrap();
        let bus_body = match &u.kind {
            SymbolKind::Instance(i) => i.body,
            _ => unreachable!(),
        };
        let m = bus_body
            .as_scope()
            .unwrap()
            .get(comp.names.find("m").unwrap())
            .unwrap();
        assert!(matches!(m.kind, SymbolKind::Modport(_)));
        let ports = m.as_scope().unwrap().members();
        assert_eq!(ports.len(), 3);
    }

    #[test]
    fn elab_tasks_report() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[(
                "t.sv",
                "module m;\n  localparam N = 3;\n  $info(\"have %d units\", N);\n  $static_assert(N > 2);\n  $static_assert(N > 5, \"N too small: %d\", N);\n  $fatal(7, \"boom\");\nendmodule\n",
            )],
        );
        let diags = comp.diagnostics();
        let info = diags
            .iter()
            .find(|d| d.code == DiagCode::ElabTaskMessage && d.message.contains("3"))
            .expect("$info formats its message");
        assert_eq!(info.severity, shale_common::diag::Severity::Note);
        assert!(diags
            .iter()
            .any(|d| d.code == DiagCode::StaticAssertFailed && d.message.contains("N too small: 3")));
        assert!(has_code(&comp, DiagCode::InvalidFinishNum));
        // The passing assert stays silent.
        assert_eq!(
            diags
                .iter()
                .filter(|d| d.code == DiagCode::StaticAssertFailed)
                .count(),
            1
        );
    }

    #[test]
    fn assertion_port_rules() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[(
                "t.sv",
                "module m(input logic a, b);\n  property p(local output int x, int y = 1);\n    a |-> b;\n  endproperty\nendmodule\n",
            )],
        );
        assert!(has_code(&comp, DiagCode::LocalVarDirection));
        let p = comp.find("m.p").expect("property resolves");
        let ports = p.as_scope().unwrap().members();
        assert_eq!(ports.len(), 2);
        assert!(matches!(ports[0].kind, SymbolKind::LocalAssertionVar(_)));
        assert!(matches!(ports[1].kind, SymbolKind::FormalArg(_)));
    }

    #[test]
    fn randseq_productions_bind() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[(
                "t.sv",
                "module m;\n  initial begin\n    randsequence(main)\n      main : first nosuch := 2;\n      first : { $display; };\n    endsequence\n  end\nendmodule\n",
            )],
        );
        assert!(has_code(&comp, DiagCode::UnresolvedName));
    }

    #[test]
    fn recursive_parameter_reported() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[("t.sv", "module m; parameter X = X + 1; endmodule")],
        );
        assert!(has_code(&comp, DiagCode::RecursiveDefinition));
    }

    #[test]
    fn net_delay_is_lazy() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[("t.sv", "module m; wire #3 w; wire (weak0, weak1) s; endmodule")],
        );
        assert!(
            !comp.diag.has_errors(),
            "diags: {:?}",
            comp.diagnostics()
        );
        let w = comp.find("m.w").unwrap();
        let net = match &w.kind {
            SymbolKind::Net(n) => n,
            _ => panic!("w should be a net"),
        };
        assert!(net.delay.peek().is_none(), "delay starts unresolved");
        assert!(net.delay_syntax().is_some());
        assert!(net.delay.peek().is_some(), "delay is memoized after query");
        let s = comp.find("m.s").unwrap();
        let net = match &s.kind {
            SymbolKind::Net(n) => n,
            _ => panic!("s should be a net"),
        };
        assert!(net.strength_syntax().is_some());
        assert!(net.delay_syntax().is_none());
    }

    #[test]
    fn typedef_resolves_through_alias() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[(
                "t.sv",
                "module m; typedef logic [7:0] byte_t; byte_t v; endmodule",
            )],
        );
        assert!(
            !comp.diag.has_errors(),
            "diags: {:?}",
            comp.diagnostics()
        );
        let v = comp.find("m.v").unwrap();
        let body = body_of(&comp, "m");
        let ty = comp.resolve_declared_type(&v.as_value().unwrap().declared_type, body);
        assert_eq!(ty.bit_width(), Some(8));
        assert!(matches!(ty, Type::Alias { .. }));
    }

    #[test]
    fn explicit_import_and_reexport() {
        let arenas = GlobalArenas::default();
        let comp = compile(
            &arenas,
            &[
                ("p.sv", "package p; localparam K = 9; endpackage"),
                (
                    "q.sv",
                    "package q; import p::K; export p::K; endpackage",
                ),
                ("m.sv", "module m; import q::*; int v = K; endmodule"),
            ],
        );
        assert!(
            !comp.diag.has_errors(),
            "diags: {:?}",
            comp.diagnostics()
        );
        let v = comp.find("m.v").unwrap();
        assert_eq!(eval::eval_symbol(&comp, v), Some(Value::Int(9.into())));
    }
}
