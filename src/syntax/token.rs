//! Defines all tokens that may result from performing lexical analysis on a
//! SystemVerilog source file, together with the trivia model that makes the
//! token stream lossless: every token carries the whitespace, comments, and
//! preprocessor residue that preceded it.

use num_bigint::BigInt;
use shale_common::name::Name;
use shale_common::source::{Location, Span};
use std::fmt;

pub use self::DelimKind::*;
pub use self::TokenKind::*;

/// The language profile keywords are recognized under. Selected per
/// compilation and adjustable mid-stream via `begin_keywords`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum KeywordVersion {
    V1364_1995,
    V1364_2001,
    V1364_2005,
    V1800_2005,
    V1800_2009,
    V1800_2012,
    V1800_2017,
}

impl KeywordVersion {
    /// Parse a `begin_keywords` version string.
    pub fn from_str(s: &str) -> Option<KeywordVersion> {
        Some(match s {
            "1364-1995" => KeywordVersion::V1364_1995,
            "1364-2001" | "1364-2001-noconfig" => KeywordVersion::V1364_2001,
            "1364-2005" => KeywordVersion::V1364_2005,
            "1800-2005" => KeywordVersion::V1800_2005,
            "1800-2009" => KeywordVersion::V1800_2009,
            "1800-2012" => KeywordVersion::V1800_2012,
            "1800-2017" => KeywordVersion::V1800_2017,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeywordVersion::V1364_1995 => "1364-1995",
            KeywordVersion::V1364_2001 => "1364-2001",
            KeywordVersion::V1364_2005 => "1364-2005",
            KeywordVersion::V1800_2005 => "1800-2005",
            KeywordVersion::V1800_2009 => "1800-2009",
            KeywordVersion::V1800_2012 => "1800-2012",
            KeywordVersion::V1800_2017 => "1800-2017",
        }
    }
}

impl Default for KeywordVersion {
    fn default() -> Self {
        KeywordVersion::V1800_2017
    }
}

macro_rules! keywords {
    ($($text:literal => $ident:ident in $ver:ident;)*) => {
        /// A reserved word of the language.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub enum Kw {
            $($ident,)*
        }

        impl Kw {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Kw::$ident => $text,)*
                }
            }

            /// The first language version in which this word is reserved.
            pub fn min_version(self) -> KeywordVersion {
                match self {
                    $(Kw::$ident => KeywordVersion::$ver,)*
                }
            }
        }

        /// Look up a reserved word. Returns the keyword regardless of the
        /// active profile; the lexer compares against `min_version` itself.
        pub fn find_keyword(text: &str) -> Option<Kw> {
            Some(match text {
                $($text => Kw::$ident,)*
                _ => return None,
            })
        }
    };
}

keywords! {
    "alias" => Alias in V1800_2005;
    "always" => Always in V1364_1995;
    "always_comb" => AlwaysComb in V1800_2005;
    "always_ff" => AlwaysFf in V1800_2005;
    "always_latch" => AlwaysLatch in V1800_2005;
    "and" => And in V1364_1995;
    "assert" => Assert in V1800_2005;
    "assign" => Assign in V1364_1995;
    "assume" => Assume in V1800_2005;
    "automatic" => Automatic in V1364_2001;
    "before" => Before in V1800_2005;
    "begin" => Begin in V1364_1995;
    "bind" => Bind in V1800_2005;
    "bins" => Bins in V1800_2005;
    "binsof" => Binsof in V1800_2005;
    "bit" => Bit in V1800_2005;
    "break" => Break in V1800_2005;
    "buf" => Buf in V1364_1995;
    "bufif0" => Bufif0 in V1364_1995;
    "bufif1" => Bufif1 in V1364_1995;
    "byte" => Byte in V1800_2005;
    "case" => Case in V1364_1995;
    "casex" => Casex in V1364_1995;
    "casez" => Casez in V1364_1995;
    "cell" => Cell in V1364_2001;
    "chandle" => Chandle in V1800_2005;
    "checker" => Checker in V1800_2009;
    "class" => Class in V1800_2005;
    "clocking" => Clocking in V1800_2005;
    "cmos" => Cmos in V1364_1995;
    "config" => Config in V1364_2001;
    "const" => Const in V1800_2005;
    "constraint" => Constraint in V1800_2005;
    "context" => Context in V1800_2005;
    "continue" => Continue in V1800_2005;
    "cover" => Cover in V1800_2005;
    "covergroup" => Covergroup in V1800_2005;
    "coverpoint" => Coverpoint in V1800_2005;
    "cross" => Cross in V1800_2005;
    "deassign" => Deassign in V1364_1995;
    "default" => Default in V1364_1995;
    "defparam" => Defparam in V1364_1995;
    "design" => Design in V1364_2001;
    "disable" => Disable in V1364_1995;
    "dist" => Dist in V1800_2005;
    "do" => Do in V1800_2005;
    "edge" => Edge in V1364_1995;
    "else" => Else in V1364_1995;
    "end" => End in V1364_1995;
    "endcase" => Endcase in V1364_1995;
    "endchecker" => Endchecker in V1800_2009;
    "endclass" => Endclass in V1800_2005;
    "endclocking" => Endclocking in V1800_2005;
    "endconfig" => Endconfig in V1364_2001;
    "endfunction" => Endfunction in V1364_1995;
    "endgenerate" => Endgenerate in V1364_2001;
    "endgroup" => Endgroup in V1800_2005;
    "endinterface" => Endinterface in V1800_2005;
    "endmodule" => Endmodule in V1364_1995;
    "endpackage" => Endpackage in V1800_2005;
    "endprimitive" => Endprimitive in V1364_1995;
    "endprogram" => Endprogram in V1800_2005;
    "endproperty" => Endproperty in V1800_2005;
    "endsequence" => Endsequence in V1800_2005;
    "endspecify" => Endspecify in V1364_1995;
    "endtable" => Endtable in V1364_1995;
    "endtask" => Endtask in V1364_1995;
    "enum" => Enum in V1800_2005;
    "event" => Event in V1364_1995;
    "eventually" => Eventually in V1800_2009;
    "expect" => Expect in V1800_2005;
    "export" => Export in V1800_2005;
    "extends" => Extends in V1800_2005;
    "extern" => Extern in V1800_2005;
    "final" => Final in V1800_2005;
    "first_match" => FirstMatch in V1800_2005;
    "for" => For in V1364_1995;
    "force" => Force in V1364_1995;
    "foreach" => Foreach in V1800_2005;
    "forever" => Forever in V1364_1995;
    "fork" => Fork in V1364_1995;
    "forkjoin" => Forkjoin in V1800_2005;
    "function" => Function in V1364_1995;
    "generate" => Generate in V1364_2001;
    "genvar" => Genvar in V1364_2001;
    "global" => Global in V1800_2009;
    "highz0" => Highz0 in V1364_1995;
    "highz1" => Highz1 in V1364_1995;
    "if" => If in V1364_1995;
    "iff" => Iff in V1800_2005;
    "ifnone" => Ifnone in V1364_1995;
    "ignore_bins" => IgnoreBins in V1800_2005;
    "illegal_bins" => IllegalBins in V1800_2005;
    "implements" => Implements in V1800_2012;
    "implies" => Implies in V1800_2009;
    "import" => Import in V1800_2005;
    "incdir" => Incdir in V1364_2001;
    "include" => Include in V1364_2001;
    "initial" => Initial in V1364_1995;
    "inout" => Inout in V1364_1995;
    "input" => Input in V1364_1995;
    "inside" => Inside in V1800_2005;
    "instance" => Instance in V1364_2001;
    "int" => Int in V1800_2005;
    "integer" => Integer in V1364_1995;
    "interconnect" => Interconnect in V1800_2012;
    "interface" => Interface in V1800_2005;
    "intersect" => Intersect in V1800_2005;
    "join" => Join in V1364_1995;
    "join_any" => JoinAny in V1800_2005;
    "join_none" => JoinNone in V1800_2005;
    "large" => Large in V1364_1995;
    "let" => Let in V1800_2009;
    "liblist" => Liblist in V1364_2001;
    "library" => Library in V1364_2001;
    "local" => Local in V1800_2005;
    "localparam" => Localparam in V1364_2001;
    "logic" => Logic in V1800_2005;
    "longint" => Longint in V1800_2005;
    "macromodule" => Macromodule in V1364_1995;
    "matches" => Matches in V1800_2005;
    "medium" => Medium in V1364_1995;
    "modport" => Modport in V1800_2005;
    "module" => Module in V1364_1995;
    "nand" => Nand in V1364_1995;
    "negedge" => Negedge in V1364_1995;
    "nettype" => Nettype in V1800_2012;
    "new" => New in V1800_2005;
    "nexttime" => Nexttime in V1800_2009;
    "nmos" => Nmos in V1364_1995;
    "nor" => Nor in V1364_1995;
    "noshowcancelled" => Noshowcancelled in V1364_2001;
    "not" => Not in V1364_1995;
    "notif0" => Notif0 in V1364_1995;
    "notif1" => Notif1 in V1364_1995;
    "null" => Null in V1800_2005;
    "or" => Or in V1364_1995;
    "output" => Output in V1364_1995;
    "package" => Package in V1800_2005;
    "packed" => Packed in V1800_2005;
    "parameter" => Parameter in V1364_1995;
    "pmos" => Pmos in V1364_1995;
    "posedge" => Posedge in V1364_1995;
    "primitive" => Primitive in V1364_1995;
    "priority" => Priority in V1800_2005;
    "program" => Program in V1800_2005;
    "property" => Property in V1800_2005;
    "protected" => Protected in V1800_2005;
    "pull0" => Pull0 in V1364_1995;
    "pull1" => Pull1 in V1364_1995;
    "pulldown" => Pulldown in V1364_1995;
    "pullup" => Pullup in V1364_1995;
    "pulsestyle_ondetect" => PulsestyleOndetect in V1364_2001;
    "pulsestyle_onevent" => PulsestyleOnevent in V1364_2001;
    "pure" => Pure in V1800_2005;
    "rand" => Rand in V1800_2005;
    "randc" => Randc in V1800_2005;
    "randcase" => Randcase in V1800_2005;
    "randsequence" => Randsequence in V1800_2005;
    "rcmos" => Rcmos in V1364_1995;
    "real" => Real in V1364_1995;
    "realtime" => Realtime in V1364_1995;
    "ref" => Ref in V1800_2005;
    "reg" => Reg in V1364_1995;
    "reject_on" => RejectOn in V1800_2009;
    "release" => Release in V1364_1995;
    "repeat" => Repeat in V1364_1995;
    "restrict" => Restrict in V1800_2009;
    "return" => Return in V1800_2005;
    "rnmos" => Rnmos in V1364_1995;
    "rpmos" => Rpmos in V1364_1995;
    "rtran" => Rtran in V1364_1995;
    "rtranif0" => Rtranif0 in V1364_1995;
    "rtranif1" => Rtranif1 in V1364_1995;
    "s_always" => SAlways in V1800_2009;
    "s_eventually" => SEventually in V1800_2009;
    "s_nexttime" => SNexttime in V1800_2009;
    "s_until" => SUntil in V1800_2009;
    "s_until_with" => SUntilWith in V1800_2009;
    "scalared" => Scalared in V1364_1995;
    "sequence" => Sequence in V1800_2005;
    "shortint" => Shortint in V1800_2005;
    "shortreal" => Shortreal in V1800_2005;
    "showcancelled" => Showcancelled in V1364_2001;
    "signed" => Signed in V1364_2001;
    "small" => Small in V1364_1995;
    "soft" => Soft in V1800_2012;
    "solve" => Solve in V1800_2005;
    "specify" => Specify in V1364_1995;
    "specparam" => Specparam in V1364_1995;
    "static" => Static in V1800_2005;
    "string" => String in V1800_2005;
    "strong" => Strong in V1800_2009;
    "strong0" => Strong0 in V1364_1995;
    "strong1" => Strong1 in V1364_1995;
    "struct" => Struct in V1800_2005;
    "super" => Super in V1800_2005;
    "supply0" => Supply0 in V1364_1995;
    "supply1" => Supply1 in V1364_1995;
    "sync_accept_on" => SyncAcceptOn in V1800_2009;
    "sync_reject_on" => SyncRejectOn in V1800_2009;
    "table" => Table in V1364_1995;
    "tagged" => Tagged in V1800_2005;
    "task" => Task in V1364_1995;
    "this" => This in V1800_2005;
    "throughout" => Throughout in V1800_2005;
    "time" => Time in V1364_1995;
    "timeprecision" => Timeprecision in V1800_2005;
    "timeunit" => Timeunit in V1800_2005;
    "tran" => Tran in V1364_1995;
    "tranif0" => Tranif0 in V1364_1995;
    "tranif1" => Tranif1 in V1364_1995;
    "tri" => Tri in V1364_1995;
    "tri0" => Tri0 in V1364_1995;
    "tri1" => Tri1 in V1364_1995;
    "triand" => Triand in V1364_1995;
    "trior" => Trior in V1364_1995;
    "trireg" => Trireg in V1364_1995;
    "type" => Type in V1800_2005;
    "typedef" => Typedef in V1800_2005;
    "union" => Union in V1800_2005;
    "unique" => Unique in V1800_2005;
    "unique0" => Unique0 in V1800_2009;
    "unsigned" => Unsigned in V1364_2001;
    "until" => Until in V1800_2009;
    "until_with" => UntilWith in V1800_2009;
    "untyped" => Untyped in V1800_2009;
    "use" => Use in V1364_2001;
    "uwire" => Uwire in V1364_2005;
    "var" => Var in V1800_2005;
    "vectored" => Vectored in V1364_1995;
    "virtual" => Virtual in V1800_2005;
    "void" => Void in V1800_2005;
    "wait" => Wait in V1364_1995;
    "wait_order" => WaitOrder in V1800_2005;
    "wand" => Wand in V1364_1995;
    "weak" => Weak in V1800_2009;
    "weak0" => Weak0 in V1364_1995;
    "weak1" => Weak1 in V1364_1995;
    "while" => While in V1364_1995;
    "wildcard" => Wildcard in V1800_2005;
    "wire" => Wire in V1364_1995;
    "with" => With in V1800_2005;
    "within" => Within in V1800_2005;
    "wor" => Wor in V1364_1995;
    "xnor" => Xnor in V1364_1995;
    "xor" => Xor in V1364_1995;
}

impl fmt::Display for Kw {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An operator symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Op {
    // Assignment
    Assign,
    AssignAdd,
    AssignSub,
    AssignMul,
    AssignDiv,
    AssignMod,
    AssignBitAnd,
    AssignBitOr,
    AssignBitXor,
    AssignLogicShL,
    AssignLogicShR,
    AssignArithShL,
    AssignArithShR,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Inc,
    Dec,

    // Equality
    LogicEq,
    LogicNeq,
    CaseEq,
    CaseNeq,
    WildcardEq,
    WildcardNeq,

    // Relational
    Lt,
    Leq,
    Gt,
    Geq,

    // Logic
    LogicNot,
    LogicAnd,
    LogicOr,
    LogicImpl,
    LogicEquiv,

    // Bitwise
    BitNot,
    BitAnd,
    BitNand,
    BitOr,
    BitNor,
    BitXor,
    BitXnor,
    BitNxor,

    // Shift
    LogicShL,
    LogicShR,
    ArithShL,
    ArithShR,

    // Sequence
    SeqImplOl,
    SeqImplNol,
    SeqFollowOl,
    SeqFollowNol,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Assign => "=",
            Op::AssignAdd => "+=",
            Op::AssignSub => "-=",
            Op::AssignMul => "*=",
            Op::AssignDiv => "/=",
            Op::AssignMod => "%=",
            Op::AssignBitAnd => "&=",
            Op::AssignBitOr => "|=",
            Op::AssignBitXor => "^=",
            Op::AssignLogicShL => "<<=",
            Op::AssignLogicShR => ">>=",
            Op::AssignArithShL => "<<<=",
            Op::AssignArithShR => ">>>=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Pow => "**",
            Op::Inc => "++",
            Op::Dec => "--",
            Op::LogicEq => "==",
            Op::LogicNeq => "!=",
            Op::CaseEq => "===",
            Op::CaseNeq => "!==",
            Op::WildcardEq => "==?",
            Op::WildcardNeq => "!=?",
            Op::Lt => "<",
            Op::Leq => "<=",
            Op::Gt => ">",
            Op::Geq => ">=",
            Op::LogicNot => "!",
            Op::LogicAnd => "&&",
            Op::LogicOr => "||",
            Op::LogicImpl => "->",
            Op::LogicEquiv => "<->",
            Op::BitNot => "~",
            Op::BitAnd => "&",
            Op::BitNand => "~&",
            Op::BitOr => "|",
            Op::BitNor => "~|",
            Op::BitXor => "^",
            Op::BitXnor => "^~",
            Op::BitNxor => "~^",
            Op::LogicShL => "<<",
            Op::LogicShR => ">>",
            Op::ArithShL => "<<<",
            Op::ArithShR => ">>>",
            Op::SeqImplOl => "|->",
            Op::SeqImplNol => "|=>",
            Op::SeqFollowOl => "#-#",
            Op::SeqFollowNol => "#=#",
        }
    }

    /// Binary binding power per the published precedence table; higher binds
    /// tighter. `None` if the operator is not a binary expression operator.
    pub fn binary_prec(self) -> Option<u8> {
        Some(match self {
            Op::Pow => 12,
            Op::Mul | Op::Div | Op::Mod => 11,
            Op::Add | Op::Sub => 10,
            Op::LogicShL | Op::LogicShR | Op::ArithShL | Op::ArithShR => 9,
            Op::Lt | Op::Leq | Op::Gt | Op::Geq => 8,
            Op::LogicEq | Op::LogicNeq | Op::CaseEq | Op::CaseNeq | Op::WildcardEq
            | Op::WildcardNeq => 7,
            Op::BitAnd => 6,
            Op::BitXor | Op::BitXnor | Op::BitNxor => 5,
            Op::BitOr => 4,
            Op::LogicAnd => 3,
            Op::LogicOr => 2,
            Op::LogicImpl | Op::LogicEquiv => 1,
            _ => return None,
        })
    }

    /// Whether the binary operator associates to the right.
    pub fn is_right_assoc(self) -> bool {
        matches!(self, Op::Pow | Op::LogicImpl | Op::LogicEquiv)
    }

    /// Whether this operator may introduce a unary expression.
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Op::Add
                | Op::Sub
                | Op::LogicNot
                | Op::BitNot
                | Op::BitAnd
                | Op::BitNand
                | Op::BitOr
                | Op::BitNor
                | Op::BitXor
                | Op::BitXnor
                | Op::BitNxor
                | Op::Inc
                | Op::Dec
        )
    }

    /// Whether this is one of the assignment operators.
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            Op::Assign
                | Op::AssignAdd
                | Op::AssignSub
                | Op::AssignMul
                | Op::AssignDiv
                | Op::AssignMod
                | Op::AssignBitAnd
                | Op::AssignBitOr
                | Op::AssignBitXor
                | Op::AssignLogicShL
                | Op::AssignLogicShR
                | Op::AssignArithShL
                | Op::AssignArithShR
        )
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A delimiter token such as parentheses or brackets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DelimKind {
    /// A round parenthesis `(` or `)`.
    Paren,
    /// A square bracket `[` or `]`.
    Brack,
    /// A curly brace `{` or `}`.
    Brace,
}

/// An SI unit suffix of a time literal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TimeUnit {
    Second,
    MilliSecond,
    MicroSecond,
    NanoSecond,
    PicoSecond,
    FemtoSecond,
}

impl TimeUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Second => "s",
            TimeUnit::MilliSecond => "ms",
            TimeUnit::MicroSecond => "us",
            TimeUnit::NanoSecond => "ns",
            TimeUnit::PicoSecond => "ps",
            TimeUnit::FemtoSecond => "fs",
        }
    }

    pub fn from_suffix(s: &str) -> Option<TimeUnit> {
        Some(match s {
            "s" => TimeUnit::Second,
            "ms" => TimeUnit::MilliSecond,
            "us" => TimeUnit::MicroSecond,
            "ns" => TimeUnit::NanoSecond,
            "ps" => TimeUnit::PicoSecond,
            "fs" => TimeUnit::FemtoSecond,
            _ => return None,
        })
    }

    /// Power-of-ten magnitude relative to one second.
    pub fn magnitude(self) -> i32 {
        match self {
            TimeUnit::Second => 0,
            TimeUnit::MilliSecond => -3,
            TimeUnit::MicroSecond => -6,
            TimeUnit::NanoSecond => -9,
            TimeUnit::PicoSecond => -12,
            TimeUnit::FemtoSecond => -15,
        }
    }
}

/// Abstract literals. The names refer to the raw digit text interned in the
/// name table; decoded values are carried separately on the token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Lit {
    Str(Name),
    /// A decimal number with an optional fractional part and exponent, e.g.
    /// `42`, `4.2`, `1e-3`.
    Number(Name, Option<Name>),
    /// A based integer `[size]'[s]base digits`.
    BasedInteger(Option<Name>, bool, char, Name),
    /// `'0`, `'1`, `'x`, `'z`.
    UnbasedUnsized(char),
    /// A time literal with unit suffix.
    Time(Name, Option<Name>, TimeUnit),
}

/// A primary token kind emitted by the lexer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TokenKind {
    Keyword(Kw),
    Operator(Op),

    /// An opening delimiter.
    OpenDelim(DelimKind),
    /// A closing delimiter.
    CloseDelim(DelimKind),

    Comma,
    Period,
    Colon,
    Semicolon,
    Hashtag,
    DoubleHashtag,
    At,
    Ternary,
    Apostrophe,
    Dollar,
    /// The `::` scope resolution operator.
    Namespace,
    /// `+:` in a range select.
    AddColon,
    /// `-:` in a range select.
    SubColon,
    /// `:=` in weight and distribution specifications.
    ColonEq,
    /// `.*` in a port connection list.
    WildcardConnect,

    /// A literal.
    Literal(Lit),
    /// An identifier.
    Ident(Name),
    /// An escaped identifier, e.g. `\foo+bar`.
    EscIdent(Name),
    /// A system task or function identifier, e.g. `$display`.
    SysIdent(Name),
    /// A compiler directive or macro usage, e.g. `` `timescale `` or
    /// `` `MYMACRO ``.
    Directive(Name),
    /// The token paste operator ` `` ` inside a macro body.
    MacroPaste,
    /// The ` `" ` stringification quote inside a macro body.
    MacroQuote,
    /// The ` `\`" ` escaped quote inside a macro body.
    MacroEscQuote,

    /// A byte that does not introduce any token.
    Unknown(char),
    /// The end of the input.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Keyword(kw) => write!(f, "{}", kw),
            Operator(op) => write!(f, "{}", op),
            OpenDelim(Paren) => write!(f, "("),
            OpenDelim(Brack) => write!(f, "["),
            OpenDelim(Brace) => write!(f, "{{"),
            CloseDelim(Paren) => write!(f, ")"),
            CloseDelim(Brack) => write!(f, "]"),
            CloseDelim(Brace) => write!(f, "}}"),
            Comma => write!(f, ","),
            Period => write!(f, "."),
            Colon => write!(f, ":"),
            Semicolon => write!(f, ";"),
            Hashtag => write!(f, "#"),
            DoubleHashtag => write!(f, "##"),
            At => write!(f, "@"),
            Ternary => write!(f, "?"),
            Apostrophe => write!(f, "'"),
            Dollar => write!(f, "$"),
            Namespace => write!(f, "::"),
            AddColon => write!(f, "+:"),
            SubColon => write!(f, "-:"),
            ColonEq => write!(f, ":="),
            WildcardConnect => write!(f, ".*"),
            Literal(_) => write!(f, "literal"),
            Ident(_) => write!(f, "identifier"),
            EscIdent(_) => write!(f, "escaped identifier"),
            SysIdent(_) => write!(f, "system identifier"),
            Directive(_) => write!(f, "compiler directive"),
            MacroPaste => write!(f, "``"),
            MacroQuote => write!(f, "`\""),
            MacroEscQuote => write!(f, "`\\`\""),
            Unknown(c) => write!(f, "{}", c),
            Eof => write!(f, "end of input"),
        }
    }
}

/// The kinds of source text that attach to the next valid token without
/// being grammar-significant.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TriviaKind {
    Whitespace,
    EndOfLine,
    LineComment,
    BlockComment,
    /// A consumed preprocessor directive, including its arguments.
    Directive,
    /// A run of tokens the parser discarded during recovery.
    SkippedTokens,
    /// The call-site text of a macro usage whose expansion follows.
    MacroUsage,
    /// Source text in a non-taken conditional branch.
    DisabledText,
}

/// A piece of non-grammar source text attached to the following token.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Trivia {
    pub kind: TriviaKind,
    pub span: Span,
}

impl Trivia {
    pub fn new(kind: TriviaKind, span: Span) -> Trivia {
        Trivia { kind, span }
    }
}

/// A decoded literal value carried alongside the raw text.
#[derive(Clone, PartialEq, Debug)]
pub enum TokenValue {
    /// Integer value plus signedness and bit width, if sized.
    Int {
        value: BigInt,
        signed: bool,
        width: Option<u32>,
    },
    Real(f64),
    /// Decoded string contents.
    Str(std::string::String),
    /// Time magnitude and unit.
    Time(f64, TimeUnit),
}

/// A full token: kind, source range, preceding trivia, decoded value, and a
/// flag marking tokens synthesized during error recovery. The raw text is
/// recovered from the span; synthetic tokens have zero-width spans.
#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub trivia: Vec<Trivia>,
    pub value: Option<TokenValue>,
    pub missing: bool,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Token {
        Token {
            kind,
            span,
            trivia: Vec::new(),
            value: None,
            missing: false,
        }
    }

    /// Create a zero-width synthetic token of the given kind at a location.
    pub fn missing_at(kind: TokenKind, loc: Location) -> Token {
        Token {
            kind,
            span: Span::new(loc.source, loc.offset, loc.offset),
            trivia: Vec::new(),
            value: None,
            missing: true,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == Eof
    }

    /// The span covering this token together with its attached trivia that
    /// lives in the same buffer.
    pub fn full_span(&self) -> Span {
        let mut span = self.span;
        for t in &self.trivia {
            if t.span.source == span.source {
                span.expand(t.span);
            }
        }
        span
    }

    /// The interned identifier name, if this is any identifier flavor.
    pub fn ident_name(&self) -> Option<Name> {
        match self.kind {
            Ident(n) | EscIdent(n) => Some(n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_lookup() {
        assert_eq!(find_keyword("module"), Some(Kw::Module));
        assert_eq!(find_keyword("nettype"), Some(Kw::Nettype));
        assert_eq!(find_keyword("frobnicate"), None);
        assert!(Kw::Nettype.min_version() > KeywordVersion::V1800_2009);
        assert_eq!(Kw::Module.min_version(), KeywordVersion::V1364_1995);
    }

    #[test]
    fn precedence_table_is_ordered() {
        assert!(Op::Mul.binary_prec() > Op::Add.binary_prec());
        assert!(Op::Add.binary_prec() > Op::LogicShL.binary_prec());
        assert!(Op::LogicAnd.binary_prec() > Op::LogicOr.binary_prec());
        assert_eq!(Op::Assign.binary_prec(), None);
        assert!(Op::Pow.is_right_assoc());
        assert!(!Op::Mul.is_right_assoc());
    }

    #[test]
    fn keyword_version_strings() {
        assert_eq!(
            KeywordVersion::from_str("1800-2012"),
            Some(KeywordVersion::V1800_2012)
        );
        assert_eq!(KeywordVersion::from_str("2200-0000"), None);
        assert_eq!(KeywordVersion::V1364_2005.as_str(), "1364-2005");
    }
}
