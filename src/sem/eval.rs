//! Constant evaluation over syntax expressions, used for parameter binding,
//! packed dimensions, initializers, elaboration-task messages, and static
//! asserts. Evaluation is best-effort: anything not constant yields `None`
//! and the caller decides whether that is an error.

use crate::compilation::Compilation;
use crate::scope::{LookupFlags, LookupLocation};
use crate::symbol::{Symbol, SymbolKind, ValueFlags};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use shale_common::diag::{DiagCode, DiagEmitter, Diagnostic};
use shale_syntax::ast::{SyntaxKind, SyntaxNode};
use shale_syntax::token::{Op, TokenKind, TokenValue};
use std::fmt;

/// A constant value.
#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    Int(BigInt),
    Real(f64),
    Str(String),
    /// An unbased unsized `'x` or `'z` bit.
    UnbasedUnsized(char),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Int(v) => Some(!v.is_zero()),
            Value::Real(v) => Some(*v != 0.0),
            Value::Str(_) => None,
            Value::UnbasedUnsized(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_int().and_then(|v| v.to_i64())
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    /// A canonical string used to key instance bodies by their parameter
    /// bindings.
    pub fn to_key(&self) -> String {
        match self {
            Value::Int(v) => format!("i{}", v),
            Value::Real(v) => format!("r{}", v.to_bits()),
            Value::Str(v) => format!("s{}", v),
            Value::UnbasedUnsized(c) => format!("u{}", c),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::UnbasedUnsized(c) => write!(f, "'{}", c),
        }
    }
}

/// The expression child nodes of a syntax node, skipping list wrappers.
pub fn child_exprs<'a>(node: &'a SyntaxNode<'a>) -> Vec<&'a SyntaxNode<'a>> {
    let mut out = Vec::new();
    for child in node.child_nodes() {
        match child.kind {
            SyntaxKind::List | SyntaxKind::SeparatedList => out.extend(child_exprs(child)),
            _ => out.push(child),
        }
    }
    out
}

/// Evaluate an expression in a scope. Returns `None` when the expression is
/// not a compile-time constant.
pub fn eval<'a>(
    comp: &Compilation<'a>,
    scope: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
) -> Option<Value> {
    match node.kind {
        SyntaxKind::LiteralExpr => {
            let tok = node.first_token()?;
            match &tok.value {
                Some(TokenValue::Int { value, .. }) => Some(Value::Int(value.clone())),
                Some(TokenValue::Real(v)) => Some(Value::Real(*v)),
                Some(TokenValue::Str(s)) => Some(Value::Str(s.clone())),
                Some(TokenValue::Time(v, unit)) => {
                    Some(Value::Real(v * 10f64.powi(unit.magnitude())))
                }
                None => match tok.kind {
                    TokenKind::Literal(shale_syntax::token::Lit::UnbasedUnsized(c)) => {
                        Some(Value::UnbasedUnsized(c))
                    }
                    _ => None,
                },
            }
        }
        SyntaxKind::IdentExpr => {
            let tok = node.first_token()?;
            let name = tok.ident_name()?;
            let sym = comp.lookup_unqualified(
                scope,
                name,
                LookupLocation::ANYWHERE,
                LookupFlags::empty(),
            )?;
            eval_symbol(comp, sym)
        }
        SyntaxKind::ParenExpr | SyntaxKind::OrderedArg => {
            eval(comp, scope, node.child_nodes().next()?)
        }
        SyntaxKind::SequenceExpr => {
            let exprs = child_exprs(node);
            if exprs.len() == 1 {
                eval(comp, scope, exprs[0])
            } else {
                None
            }
        }
        SyntaxKind::UnaryExpr => {
            let op = node.tokens().find_map(|t| match t.kind {
                TokenKind::Operator(op) => Some(op),
                _ => None,
            })?;
            let operand = eval(comp, scope, node.child_nodes().next()?)?;
            eval_unary(op, operand)
        }
        SyntaxKind::BinaryExpr => {
            let op = node.tokens().find_map(|t| match t.kind {
                TokenKind::Operator(op) => Some(op),
                _ => None,
            })?;
            let mut operands = node.child_nodes();
            let lhs = eval(comp, scope, operands.next()?)?;
            let rhs = eval(comp, scope, operands.next()?)?;
            eval_binary(op, lhs, rhs)
        }
        SyntaxKind::CondExpr => {
            let mut operands = node.child_nodes();
            let cond = eval(comp, scope, operands.next()?)?;
            let then = operands.next()?;
            let alt = operands.next()?;
            if cond.as_bool()? {
                eval(comp, scope, then)
            } else {
                eval(comp, scope, alt)
            }
        }
        SyntaxKind::CastExpr => {
            // The inner expression is the last child; the width and type
            // rules of the cast are not modeled.
            let inner = node.child_nodes().last()?;
            eval(comp, scope, inner)
        }
        SyntaxKind::ConcatExpr => {
            let exprs = child_exprs(node);
            let mut out = String::new();
            for e in exprs {
                match eval(comp, scope, e)? {
                    Value::Str(s) => out.push_str(&s),
                    _ => return None,
                }
            }
            Some(Value::Str(out))
        }
        SyntaxKind::ScopedName => {
            // `pkg::name` resolution.
            let mut nodes = node.child_nodes();
            let base = nodes.next()?;
            let pkg_name = base.first_token()?.ident_name()?;
            let item = node.tokens().filter_map(|t| t.ident_name()).next()?;
            let pkg = comp.package(pkg_name)?;
            let sym = pkg.as_scope()?.get(item)?;
            eval_symbol(comp, sym)
        }
        _ => None,
    }
}

/// Evaluate the constant value of a symbol (parameter, genvar, constant
/// variable). Guards against self-referential definitions.
pub fn eval_symbol<'a>(comp: &Compilation<'a>, sym: &'a Symbol<'a>) -> Option<Value> {
    let value = match &sym.kind {
        SymbolKind::Parameter(v) => v,
        SymbolKind::Variable(v) if v.has_flag(ValueFlags::CONST) => v,
        SymbolKind::LetDecl(a) => {
            let body = a.body?;
            let scope = sym.parent()?;
            return with_guard(comp, sym, |comp| eval(comp, scope, body));
        }
        _ => return None,
    };
    let init = value.initializer()?;
    let scope = sym.parent()?;
    with_guard(comp, sym, |comp| eval(comp, scope, init))
}

fn with_guard<'a, F: FnOnce(&Compilation<'a>) -> Option<Value>>(
    comp: &Compilation<'a>,
    sym: &'a Symbol<'a>,
    f: F,
) -> Option<Value> {
    let ptr = sym as *const Symbol;
    {
        let mut stack = comp.eval_stack.borrow_mut();
        if stack.contains(&(ptr as usize)) {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::RecursiveDefinition,
                    format!("{} definition is recursive", sym.kind.desc()),
                )
                .span(shale_common::source::Span::new(
                    sym.loc.source,
                    sym.loc.offset,
                    sym.loc.offset,
                )),
            );
            return None;
        }
        stack.push(ptr as usize);
    }
    let result = f(comp);
    comp.eval_stack.borrow_mut().pop();
    result
}

fn eval_unary(op: Op, operand: Value) -> Option<Value> {
    Some(match (op, operand) {
        (Op::Add, v) => v,
        (Op::Sub, Value::Int(v)) => Value::Int(-v),
        (Op::Sub, Value::Real(v)) => Value::Real(-v),
        (Op::LogicNot, v) => Value::Int(BigInt::from(!v.as_bool()? as u8)),
        (Op::BitNot, Value::Int(v)) => Value::Int(!v),
        (Op::BitAnd, Value::Int(v)) => Value::Int(BigInt::from((v != BigInt::zero()) as u8)),
        (Op::BitOr, Value::Int(v)) => Value::Int(BigInt::from(!v.is_zero() as u8)),
        _ => return None,
    })
}

fn eval_binary(op: Op, lhs: Value, rhs: Value) -> Option<Value> {
    use Value::*;
    // Mixed integer/real arithmetic promotes to real.
    if let (Int(a), Int(b)) = (&lhs, &rhs) {
        let result = match op {
            Op::Add => Int(a + b),
            Op::Sub => Int(a - b),
            Op::Mul => Int(a * b),
            Op::Div => {
                if b.is_zero() {
                    return None;
                }
                Int(a / b)
            }
            Op::Mod => {
                if b.is_zero() {
                    return None;
                }
                Int(a % b)
            }
            Op::Pow => {
                let exp = b.to_u32()?;
                Int(a.pow(exp))
            }
            Op::BitAnd => Int(a & b),
            Op::BitOr => Int(a | b),
            Op::BitXor => Int(a ^ b),
            Op::BitXnor | Op::BitNxor => Int(!(a ^ b)),
            Op::LogicShL => Int(a << b.to_u64()?),
            Op::LogicShR => Int(a >> b.to_u64()?),
            Op::ArithShL => Int(a << b.to_u64()?),
            Op::ArithShR => Int(a >> b.to_u64()?),
            Op::LogicEq | Op::CaseEq => Int(BigInt::from((a == b) as u8)),
            Op::LogicNeq | Op::CaseNeq => Int(BigInt::from((a != b) as u8)),
            Op::Lt => Int(BigInt::from((a < b) as u8)),
            Op::Leq => Int(BigInt::from((a <= b) as u8)),
            Op::Gt => Int(BigInt::from((a > b) as u8)),
            Op::Geq => Int(BigInt::from((a >= b) as u8)),
            Op::LogicAnd => Int(BigInt::from((!a.is_zero() && !b.is_zero()) as u8)),
            Op::LogicOr => Int(BigInt::from((!a.is_zero() || !b.is_zero()) as u8)),
            Op::LogicImpl => Int(BigInt::from((a.is_zero() || !b.is_zero()) as u8)),
            Op::LogicEquiv => Int(BigInt::from((a.is_zero() == b.is_zero()) as u8)),
            _ => return None,
        };
        return Some(result);
    }
    if let (Str(a), Str(b)) = (&lhs, &rhs) {
        let result = match op {
            Op::LogicEq | Op::CaseEq => Int(BigInt::from((a == b) as u8)),
            Op::LogicNeq | Op::CaseNeq => Int(BigInt::from((a != b) as u8)),
            _ => return None,
        };
        return Some(result);
    }
    let a = to_real(&lhs)?;
    let b = to_real(&rhs)?;
    Some(match op {
        Op::Add => Real(a + b),
        Op::Sub => Real(a - b),
        Op::Mul => Real(a * b),
        Op::Div => Real(a / b),
        Op::Pow => Real(a.powf(b)),
        Op::LogicEq => Int(BigInt::from((a == b) as u8)),
        Op::LogicNeq => Int(BigInt::from((a != b) as u8)),
        Op::Lt => Int(BigInt::from((a < b) as u8)),
        Op::Leq => Int(BigInt::from((a <= b) as u8)),
        Op::Gt => Int(BigInt::from((a > b) as u8)),
        Op::Geq => Int(BigInt::from((a >= b) as u8)),
        _ => return None,
    })
}

fn to_real(v: &Value) -> Option<f64> {
    match v {
        Value::Int(v) => v.to_f64(),
        Value::Real(v) => Some(*v),
        _ => None,
    }
}

/// `$display`-style formatting of elaboration-task messages: the first
/// string argument is the format, remaining arguments fill `%` directives.
pub fn format_message<'a>(
    comp: &Compilation<'a>,
    scope: &'a Symbol<'a>,
    args: &[&'a SyntaxNode<'a>],
) -> String {
    let mut values = args.iter().map(|a| eval(comp, scope, a));
    let first = match values.next() {
        Some(Some(Value::Str(fmt))) => fmt,
        Some(Some(other)) => return other.to_string(),
        _ => return String::new(),
    };
    let mut out = String::new();
    let mut chars = first.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        // Skip width/precision digits between `%` and the conversion.
        let mut conv = chars.next();
        while matches!(conv, Some(d) if d.is_ascii_digit() || d == '.') {
            conv = chars.next();
        }
        match conv {
            Some('%') => out.push('%'),
            Some('m') => out.push_str("<scope>"),
            Some('d') | Some('h') | Some('x') | Some('o') | Some('b') | Some('s') | Some('f')
            | Some('g') | Some('e') | Some('t') | Some('c') => {
                match values.next().flatten() {
                    Some(Value::Int(v)) => match conv {
                        Some('h') | Some('x') => out.push_str(&format!("{:x}", v)),
                        Some('o') => out.push_str(&format!("{:o}", v)),
                        Some('b') => {
                            if v.is_zero() {
                                out.push('0');
                            } else {
                                let (sign, digits) = v.to_radix_be(2);
                                if sign == num_bigint::Sign::Minus {
                                    out.push('-');
                                }
                                for d in digits {
                                    out.push((b'0' + d) as char);
                                }
                            }
                        }
                        _ => out.push_str(&v.to_string()),
                    },
                    Some(v) => out.push_str(&v.to_string()),
                    None => out.push_str("<unknown>"),
                }
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => break,
        }
    }
    out
}
