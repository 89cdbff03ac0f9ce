//! A lexical analyzer for SystemVerilog files, based on IEEE 1800, section 5.
//! Contrary to a classical scanner this one is lossless: whitespace,
//! newlines, and comments are collected as trivia and attached to the next
//! valid token, such that concatenating every token's trivia and raw text in
//! order reconstructs the input buffer exactly. Lexing never aborts; unknown
//! bytes become skipped-text trivia with a diagnostic.

use crate::cat::{Cat, CatTokenKind};
use crate::token::*;
use num_bigint::BigInt;
use num_traits::Num;
use shale_common::diag::{DiagCode, DiagEmitter, Diagnostic, DiagnosticEngine};
use shale_common::name::NameTable;
use shale_common::source::{Source, SourceManager, Span};
use std::rc::Rc;

type CatTokenAndSpan = (CatTokenKind, Span);

/// A lexical analyzer for one source buffer.
pub struct Lexer<'c> {
    cat: Cat,
    peek: [CatTokenAndSpan; 4],
    primed: bool,
    names: &'c NameTable,
    diag: &'c dyn DiagEmitter,
    version: KeywordVersion,
}

impl<'c> Lexer<'c> {
    pub fn new(
        source: Source,
        text: Rc<String>,
        names: &'c NameTable,
        diag: &'c dyn DiagEmitter,
    ) -> Lexer<'c> {
        Lexer::new_at(source, text, 0, names, diag)
    }

    /// Create a lexer that starts producing tokens at the given byte offset.
    /// Used to resume lexing from a saved position.
    pub fn new_at(
        source: Source,
        text: Rc<String>,
        offset: usize,
        names: &'c NameTable,
        diag: &'c dyn DiagEmitter,
    ) -> Lexer<'c> {
        Lexer {
            cat: Cat::new(source, text, offset),
            peek: [(CatTokenKind::Eof, Span::new(source, offset, offset)); 4],
            primed: false,
            names,
            diag,
            version: KeywordVersion::default(),
        }
    }

    pub fn source(&self) -> Source {
        self.cat.source()
    }

    /// The byte offset of the next character that has not been consumed into
    /// a token yet.
    pub fn offset(&self) -> usize {
        if self.primed {
            self.peek[0].1.begin
        } else {
            self.cat.offset()
        }
    }

    /// Restart lexing at the given byte offset, discarding the window.
    pub fn seek(&mut self, offset: usize) {
        self.cat.seek(offset);
        self.primed = false;
    }

    pub fn keyword_version(&self) -> KeywordVersion {
        self.version
    }

    pub fn set_keyword_version(&mut self, version: KeywordVersion) {
        self.version = version;
    }

    fn text_of(&self, sp: Span) -> &str {
        &self.cat.text()[sp.begin..sp.end]
    }

    fn bump(&mut self) {
        self.peek[0] = self.peek[1];
        self.peek[1] = self.peek[2];
        self.peek[2] = self.peek[3];
        self.peek[3] = self.cat.next();
    }

    fn prime(&mut self) {
        if !self.primed {
            for _ in 0..4 {
                self.bump();
            }
            self.primed = true;
        }
    }

    /// Produce the next token with its attached trivia. At the end of the
    /// buffer this returns an `Eof` token; calling it again keeps returning
    /// `Eof` with no further trivia.
    pub fn next_token(&mut self) -> Token {
        self.prime();
        let mut trivia = Vec::new();
        loop {
            let (kind, span) = match self.lex(&mut trivia) {
                Some(x) => x,
                None => continue,
            };
            let mut tok = Token::new(kind, span);
            tok.value = self.decode(&tok);
            tok.trivia = trivia;
            return tok;
        }
    }

    /// Gather leading trivia, then match one token. Returns `None` if only
    /// trivia was consumed and the caller should loop.
    fn lex(&mut self, trivia: &mut Vec<Trivia>) -> Option<(TokenKind, Span)> {
        // Collect whitespace, newlines, and comments.
        loop {
            match (self.peek[0], self.peek[1].0) {
                ((CatTokenKind::Whitespace, sp), _) => {
                    trivia.push(Trivia::new(TriviaKind::Whitespace, sp));
                    self.bump();
                }
                ((CatTokenKind::Newline, sp), _) => {
                    trivia.push(Trivia::new(TriviaKind::EndOfLine, sp));
                    self.bump();
                }
                ((CatTokenKind::Symbol('/'), sp), CatTokenKind::Symbol('/')) => {
                    let mut sp = sp;
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek[0] {
                            (CatTokenKind::Eof, _) | (CatTokenKind::Newline, _) => break,
                            (_, s) => {
                                sp.expand(s);
                                self.bump();
                            }
                        }
                    }
                    sp.end = self.peek[0].1.begin;
                    trivia.push(Trivia::new(TriviaKind::LineComment, sp));
                }
                ((CatTokenKind::Symbol('/'), sp), CatTokenKind::Symbol('*')) => {
                    let mut sp = sp;
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek[0], self.peek[1].0) {
                            ((CatTokenKind::Eof, _), _) => {
                                self.diag.emit(
                                    Diagnostic::error(
                                        DiagCode::UnterminatedBlockComment,
                                        "unterminated block comment",
                                    )
                                    .span(sp),
                                );
                                break;
                            }
                            ((CatTokenKind::Symbol('*'), s), CatTokenKind::Symbol('/')) => {
                                sp.expand(s);
                                sp.expand(self.peek[1].1);
                                self.bump();
                                self.bump();
                                break;
                            }
                            ((_, s), _) => {
                                sp.expand(s);
                                self.bump();
                            }
                        }
                    }
                    trivia.push(Trivia::new(TriviaKind::BlockComment, sp));
                }
                _ => break,
            }
        }

        // Match multi-character symbols, longest first.
        if let (
            CatTokenKind::Symbol(c0),
            CatTokenKind::Symbol(c1),
            CatTokenKind::Symbol(c2),
            CatTokenKind::Symbol(c3),
        ) = (
            self.peek[0].0,
            self.peek[1].0,
            self.peek[2].0,
            self.peek[3].0,
        ) {
            let sym = match (c0, c1, c2, c3) {
                ('<', '<', '<', '=') => Some(Operator(Op::AssignArithShL)),
                ('>', '>', '>', '=') => Some(Operator(Op::AssignArithShR)),
                _ => None,
            };
            if let Some(tkn) = sym {
                let sp = Span::union(self.peek[0].1, self.peek[3].1);
                for _ in 0..4 {
                    self.bump();
                }
                return Some((tkn, sp));
            }
        }

        if let (CatTokenKind::Symbol(c0), CatTokenKind::Symbol(c1), CatTokenKind::Symbol(c2)) =
            (self.peek[0].0, self.peek[1].0, self.peek[2].0)
        {
            let sym = match (c0, c1, c2) {
                ('<', '<', '=') => Some(Operator(Op::AssignLogicShL)),
                ('>', '>', '=') => Some(Operator(Op::AssignLogicShR)),
                ('=', '=', '=') => Some(Operator(Op::CaseEq)),
                ('!', '=', '=') => Some(Operator(Op::CaseNeq)),
                ('=', '=', '?') => Some(Operator(Op::WildcardEq)),
                ('!', '=', '?') => Some(Operator(Op::WildcardNeq)),
                ('<', '-', '>') => Some(Operator(Op::LogicEquiv)),
                ('<', '<', '<') => Some(Operator(Op::ArithShL)),
                ('>', '>', '>') => Some(Operator(Op::ArithShR)),
                ('|', '-', '>') => Some(Operator(Op::SeqImplOl)),
                ('|', '=', '>') => Some(Operator(Op::SeqImplNol)),
                ('#', '-', '#') => Some(Operator(Op::SeqFollowOl)),
                ('#', '=', '#') => Some(Operator(Op::SeqFollowNol)),
                _ => None,
            };
            if let Some(tkn) = sym {
                let sp = Span::union(self.peek[0].1, self.peek[2].1);
                for _ in 0..3 {
                    self.bump();
                }
                return Some((tkn, sp));
            }
        }

        if let (CatTokenKind::Symbol(c0), CatTokenKind::Symbol(c1)) =
            (self.peek[0].0, self.peek[1].0)
        {
            let sym = match (c0, c1) {
                ('+', '=') => Some(Operator(Op::AssignAdd)),
                ('-', '=') => Some(Operator(Op::AssignSub)),
                ('*', '=') => Some(Operator(Op::AssignMul)),
                ('/', '=') => Some(Operator(Op::AssignDiv)),
                ('%', '=') => Some(Operator(Op::AssignMod)),
                ('&', '=') => Some(Operator(Op::AssignBitAnd)),
                ('|', '=') => Some(Operator(Op::AssignBitOr)),
                ('^', '=') => Some(Operator(Op::AssignBitXor)),
                ('+', '+') => Some(Operator(Op::Inc)),
                ('-', '-') => Some(Operator(Op::Dec)),
                ('*', '*') => Some(Operator(Op::Pow)),
                ('<', '=') => Some(Operator(Op::Leq)),
                ('>', '=') => Some(Operator(Op::Geq)),
                ('=', '=') => Some(Operator(Op::LogicEq)),
                ('!', '=') => Some(Operator(Op::LogicNeq)),
                ('-', '>') => Some(Operator(Op::LogicImpl)),
                ('|', '|') => Some(Operator(Op::LogicOr)),
                ('&', '&') => Some(Operator(Op::LogicAnd)),
                ('~', '&') => Some(Operator(Op::BitNand)),
                ('~', '|') => Some(Operator(Op::BitNor)),
                ('~', '^') => Some(Operator(Op::BitNxor)),
                ('^', '~') => Some(Operator(Op::BitXnor)),
                ('<', '<') => Some(Operator(Op::LogicShL)),
                ('>', '>') => Some(Operator(Op::LogicShR)),
                (':', ':') => Some(Namespace),
                (':', '=') => Some(ColonEq),
                ('+', ':') => Some(AddColon),
                ('-', ':') => Some(SubColon),
                ('#', '#') => Some(DoubleHashtag),
                ('.', '*') => Some(WildcardConnect),
                _ => None,
            };
            if let Some(tkn) = sym {
                let sp = Span::union(self.peek[0].1, self.peek[1].1);
                self.bump();
                self.bump();
                return Some((tkn, sp));
            }
        }

        if let CatTokenKind::Symbol(c0) = self.peek[0].0 {
            let sym = match c0 {
                '=' => Some(Operator(Op::Assign)),
                '+' => Some(Operator(Op::Add)),
                '-' => Some(Operator(Op::Sub)),
                '*' => Some(Operator(Op::Mul)),
                '/' => Some(Operator(Op::Div)),
                '%' => Some(Operator(Op::Mod)),
                '<' => Some(Operator(Op::Lt)),
                '>' => Some(Operator(Op::Gt)),
                '!' => Some(Operator(Op::LogicNot)),
                '~' => Some(Operator(Op::BitNot)),
                '&' => Some(Operator(Op::BitAnd)),
                '|' => Some(Operator(Op::BitOr)),
                '^' => Some(Operator(Op::BitXor)),
                '(' => Some(OpenDelim(Paren)),
                ')' => Some(CloseDelim(Paren)),
                '[' => Some(OpenDelim(Brack)),
                ']' => Some(CloseDelim(Brack)),
                '{' => Some(OpenDelim(Brace)),
                '}' => Some(CloseDelim(Brace)),
                '#' => Some(Hashtag),
                ',' => Some(Comma),
                '.' => Some(Period),
                ':' => Some(Colon),
                ';' => Some(Semicolon),
                '?' => Some(Ternary),
                '@' => Some(At),
                _ => None,
            };
            if let Some(tkn) = sym {
                let sp = self.peek[0].1;
                self.bump();
                return Some((tkn, sp));
            }
        }

        match self.peek[0] {
            // A text token either represents an identifier or a number,
            // depending on whether it starts with a digit or a letter.
            // Underscores also introduce an identifier. Keywords under the
            // active profile become keyword tokens.
            // IEEE 1800-2017 5.6 Identifiers, 5.6.2 Keywords
            (CatTokenKind::Text, _) | (CatTokenKind::Symbol('_'), _) => {
                let (m, msp) = self.match_ident();
                match find_keyword(&m) {
                    Some(kw) if kw.min_version() <= self.version => {
                        Some((Keyword(kw), msp))
                    }
                    _ => Some((Ident(self.names.intern(&m)), msp)),
                }
            }

            // System tasks and functions start with a dollar sign, after
            // which all regular identifier characters are allowed.
            // IEEE 1800-2017 5.6.3
            (CatTokenKind::Symbol('$'), sp) => {
                self.bump();
                match self.peek[0].0 {
                    CatTokenKind::Text
                    | CatTokenKind::Digits
                    | CatTokenKind::Symbol('_')
                    | CatTokenKind::Symbol('$') => {
                        let (m, msp) = self.match_ident();
                        Some((SysIdent(self.names.intern(&m)), Span::union(sp, msp)))
                    }
                    _ => Some((Dollar, sp)),
                }
            }

            // Compiler directives and the macro operators all start with a
            // back-tick.
            // IEEE 1800-2017 22.5.1
            (CatTokenKind::Symbol('`'), sp) => {
                self.bump();
                match (self.peek[0].0, self.peek[1].0, self.peek[2].0) {
                    (CatTokenKind::Symbol('`'), _, _) => {
                        let full = Span::union(sp, self.peek[0].1);
                        self.bump();
                        Some((MacroPaste, full))
                    }
                    (CatTokenKind::Symbol('"'), _, _) => {
                        let full = Span::union(sp, self.peek[0].1);
                        self.bump();
                        Some((MacroQuote, full))
                    }
                    (
                        CatTokenKind::Symbol('\\'),
                        CatTokenKind::Symbol('`'),
                        CatTokenKind::Symbol('"'),
                    ) => {
                        let full = Span::union(sp, self.peek[2].1);
                        self.bump();
                        self.bump();
                        self.bump();
                        Some((MacroEscQuote, full))
                    }
                    (CatTokenKind::Text, _, _) | (CatTokenKind::Symbol('_'), _, _) => {
                        let (m, msp) = self.match_ident();
                        Some((Directive(self.names.intern(&m)), Span::union(sp, msp)))
                    }
                    _ => {
                        self.diag.emit(
                            Diagnostic::error(
                                DiagCode::UnknownToken,
                                "expected directive name after `",
                            )
                            .span(sp),
                        );
                        trivia.push(Trivia::new(TriviaKind::SkippedTokens, sp));
                        None
                    }
                }
            }

            // Escaped identifiers are introduced with a backslash and last
            // until the next whitespace or newline character.
            // IEEE 1800-2017 5.6.1
            (CatTokenKind::Symbol('\\'), mut sp) => {
                let mut s = String::new();
                loop {
                    self.bump();
                    match self.peek[0].0 {
                        CatTokenKind::Whitespace
                        | CatTokenKind::Newline
                        | CatTokenKind::Eof => break,
                        _ => {
                            sp.expand(self.peek[0].1);
                            s.push_str(self.text_of(self.peek[0].1));
                        }
                    }
                }
                if s.is_empty() {
                    self.diag.emit(
                        Diagnostic::error(
                            DiagCode::ExpectedEscapedIdent,
                            "expected escaped identifier after backslash `\\`",
                        )
                        .span(sp),
                    );
                    trivia.push(Trivia::new(TriviaKind::SkippedTokens, sp));
                    None
                } else {
                    Some((EscIdent(self.names.intern(&s)), sp))
                }
            }

            // Numbers are either introduced by a set of digits, or by an
            // apostrophe in the case of an unsized based number.
            // IEEE 1800-2017 5.7
            (CatTokenKind::Symbol('\''), sp) => {
                self.bump();
                Some(self.match_based_number(None, sp))
            }
            (CatTokenKind::Digits, sp) => Some(self.match_number(sp)),

            // IEEE 1800-2017 5.9 String literals
            (CatTokenKind::Symbol('"'), sp) => Some(self.match_string(sp)),

            (CatTokenKind::Eof, sp) => Some((Eof, sp)),

            (_, sp) => {
                let text = self.text_of(sp).to_string();
                self.diag.emit(
                    Diagnostic::error(
                        DiagCode::UnknownToken,
                        format!("`{}` does not introduce any token", text),
                    )
                    .span(sp),
                );
                self.bump();
                trivia.push(Trivia::new(TriviaKind::SkippedTokens, sp));
                None
            }
        }
    }

    /// Matches an identifier: letters, digits, underscores, and dollar signs.
    fn match_ident(&mut self) -> (String, Span) {
        let mut s = String::new();
        let mut sp = self.peek[0].1;
        loop {
            match self.peek[0] {
                (CatTokenKind::Text, this_sp)
                | (CatTokenKind::Digits, this_sp)
                | (CatTokenKind::Symbol('_'), this_sp)
                | (CatTokenKind::Symbol('$'), this_sp) => {
                    s.push_str(self.text_of(this_sp));
                    sp.expand(this_sp);
                    self.bump();
                }
                _ => break,
            }
        }
        debug_assert!(!s.is_empty());
        (s, sp)
    }

    /// Match a number introduced by digits: a plain decimal, a real with
    /// fraction or exponent, a time literal, or the size prefix of a based
    /// literal.
    fn match_number(&mut self, sp: Span) -> (TokenKind, Span) {
        let mut sp = sp;
        let value = {
            let mut s = String::new();
            s.push_str(self.text_of(sp));
            self.bump();
            self.eat_number_body_into(&mut s, &mut sp, false);
            self.names.intern(&s)
        };
        let frac = if self.peek[0].0 == CatTokenKind::Symbol('.')
            && self.peek[1].0 == CatTokenKind::Digits
        {
            let mut s = String::new();
            sp.expand(self.peek[0].1);
            self.bump();
            self.eat_number_body_into(&mut s, &mut sp, false);
            Some(self.names.intern(&s))
        } else {
            None
        };

        // A time unit suffix makes this a time literal.
        if let Some(unit) = self.try_time_unit() {
            sp.expand(self.peek[0].1);
            self.bump();
            return (Literal(Lit::Time(value, frac, unit)), sp);
        }

        // An exponent makes this a real. The categorizer merges `e10` into
        // one text run; a signed exponent arrives as `e`, `+`/`-`, digits.
        if let (CatTokenKind::Text, esp) = (self.peek[0].0, self.peek[0].1) {
            let text = self.text_of(esp).to_string();
            let mut chars = text.chars();
            let head = chars.next();
            if (head == Some('e') || head == Some('E'))
                && (chars.clone().all(|c| c.is_ascii_digit()))
            {
                if text.len() > 1 {
                    // e.g. `1e9`
                    sp.expand(esp);
                    self.bump();
                    let frac_text = format!(
                        "{}e{}",
                        frac.map(|f| self.names.get(f).to_string()).unwrap_or_default(),
                        &text[1..]
                    );
                    return (
                        Literal(Lit::Number(value, Some(self.names.intern(&frac_text)))),
                        sp,
                    );
                } else if matches!(
                    (self.peek[1].0, self.peek[2].0),
                    (CatTokenKind::Symbol('+'), CatTokenKind::Digits)
                        | (CatTokenKind::Symbol('-'), CatTokenKind::Digits)
                ) {
                    // e.g. `1e-9`
                    let sign = match self.peek[1].0 {
                        CatTokenKind::Symbol(c) => c,
                        _ => unreachable!(),
                    };
                    let digits = self.text_of(self.peek[2].1).to_string();
                    sp.expand(self.peek[2].1);
                    self.bump();
                    self.bump();
                    self.bump();
                    let frac_text = format!(
                        "{}e{}{}",
                        frac.map(|f| self.names.get(f).to_string()).unwrap_or_default(),
                        sign,
                        digits
                    );
                    return (
                        Literal(Lit::Number(value, Some(self.names.intern(&frac_text)))),
                        sp,
                    );
                }
            }
            if frac.is_none() {
                self.diag.emit(
                    Diagnostic::error(
                        DiagCode::DigitsLeadingLetters,
                        format!(
                            "number literal may not directly be followed by letters `{}`",
                            text
                        ),
                    )
                    .span(sp),
                );
                // Close the literal here and let the letters lex separately.
                return (Literal(Lit::Number(value, frac)), sp);
            }
        }

        if frac.is_some() {
            return (Literal(Lit::Number(value, frac)), sp);
        }

        // Whitespace is allowed between a size indication and the base.
        let mut probe = 0;
        while matches!(
            self.peek[probe].0,
            CatTokenKind::Whitespace | CatTokenKind::Newline
        ) && probe < 2
        {
            probe += 1;
        }
        match (self.peek[probe].0, self.peek[probe + 1].0) {
            (CatTokenKind::Symbol('\''), CatTokenKind::Text)
            | (CatTokenKind::Symbol('\''), CatTokenKind::Digits) => {
                for _ in 0..=probe {
                    self.bump();
                }
                self.match_based_number(Some(value), sp)
            }
            _ => (Literal(Lit::Number(value, None)), sp),
        }
    }

    /// This function assumes that we have just consumed the apostrophe before
    /// the base indication.
    fn match_based_number(
        &mut self,
        size: Option<shale_common::name::Name>,
        span: Span,
    ) -> (TokenKind, Span) {
        let mut span = span;
        match self.peek[0] {
            (CatTokenKind::Text, sp) => {
                self.bump();
                let text = self.text_of(sp).to_string();
                span.expand(sp);
                let mut chars = text.chars();
                let mut c = chars.next();

                // Consume the optional sign indicator, or emit an unbased
                // unsized literal if the apostrophe is immediately followed
                // by [zZxX].
                let signed = match c {
                    Some('s') | Some('S') => {
                        c = chars.next();
                        true
                    }
                    Some('z') | Some('Z') if text.len() == 1 => {
                        return (Literal(Lit::UnbasedUnsized('z')), span)
                    }
                    Some('x') | Some('X') if text.len() == 1 => {
                        return (Literal(Lit::UnbasedUnsized('x')), span)
                    }
                    _ => false,
                };

                let base = match c {
                    Some('d') | Some('D') => 'd',
                    Some('b') | Some('B') => 'b',
                    Some('o') | Some('O') => 'o',
                    Some('h') | Some('H') => 'h',
                    Some(x) => {
                        self.diag.emit(
                            Diagnostic::error(
                                DiagCode::InvalidNumberBase,
                                format!("`{}` is not a valid number base", x),
                            )
                            .span(span),
                        );
                        return (Literal(Lit::BasedInteger(size, signed, 'd', self.names.intern("0"))), span);
                    }
                    None => {
                        self.diag.emit(
                            Diagnostic::error(DiagCode::InvalidNumberBase, "missing number base")
                                .span(span),
                        );
                        return (Literal(Lit::BasedInteger(size, signed, 'd', self.names.intern("0"))), span);
                    }
                };
                c = chars.next();

                // If no more characters remain, whitespace and digits may
                // follow. Otherwise the remaining characters are the number
                // body.
                let mut body = String::new();
                if let Some(c) = c {
                    body.push(c);
                    body.push_str(chars.as_str());
                } else {
                    while matches!(
                        self.peek[0].0,
                        CatTokenKind::Whitespace | CatTokenKind::Newline
                    ) {
                        // Keep the whitespace between base and digits inside
                        // the literal's span so the raw text survives.
                        span.expand(self.peek[0].1);
                        self.bump();
                    }
                }
                self.eat_number_body_into(&mut body, &mut span, true);
                if body.is_empty() {
                    self.diag.emit(
                        Diagnostic::error(
                            DiagCode::MissingNumberDigits,
                            "based literal is missing its digits",
                        )
                        .span(span),
                    );
                    body.push('0');
                }
                (
                    Literal(Lit::BasedInteger(size, signed, base, self.names.intern(&body))),
                    span,
                )
            }

            (CatTokenKind::Digits, sp) if size.is_none() => {
                self.bump();
                let value = self.text_of(sp).to_string();
                span.expand(sp);
                match value.chars().next() {
                    Some('0') if value.len() == 1 => (Literal(Lit::UnbasedUnsized('0')), span),
                    Some('1') if value.len() == 1 => (Literal(Lit::UnbasedUnsized('1')), span),
                    _ => {
                        self.diag.emit(
                            Diagnostic::error(
                                DiagCode::InvalidNumberBase,
                                "unbased unsized literal may only be '0, '1, 'x, or 'z",
                            )
                            .span(span),
                        );
                        (Literal(Lit::UnbasedUnsized('0')), span)
                    }
                }
            }

            (CatTokenKind::Symbol('?'), sp) => {
                self.bump();
                span.expand(sp);
                (Literal(Lit::UnbasedUnsized('z')), span)
            }

            (CatTokenKind::Symbol('{'), _) => {
                // An assignment pattern `'{`; emit the apostrophe alone.
                (Apostrophe, span)
            }

            _ => (Apostrophe, span),
        }
    }

    /// Eats all text, digit, and underscore tokens, accumulating them
    /// (except for the underscores) in a string.
    fn eat_number_body_into(&mut self, into: &mut String, span: &mut Span, allow_alphabetic: bool) {
        loop {
            match self.peek[0] {
                (CatTokenKind::Digits, sp) | (CatTokenKind::Text, sp) => {
                    if self.peek[0].0 == CatTokenKind::Text && !allow_alphabetic {
                        break;
                    }
                    into.push_str(self.text_of(sp));
                    span.expand(sp);
                }
                (CatTokenKind::Symbol('_'), sp) => {
                    span.expand(sp);
                }
                (CatTokenKind::Symbol('?'), sp) if allow_alphabetic => {
                    into.push('?');
                    span.expand(sp);
                }
                _ => break,
            }
            self.bump();
        }
    }

    /// Try to read the next text token as a time unit.
    fn try_time_unit(&mut self) -> Option<TimeUnit> {
        if self.peek[0].0 == CatTokenKind::Text {
            TimeUnit::from_suffix(self.text_of(self.peek[0].1))
        } else {
            None
        }
    }

    /// Match a string literal, decoding escape sequences. Unterminated
    /// strings are reported and closed at the end of the line.
    fn match_string(&mut self, sp: Span) -> (TokenKind, Span) {
        let mut span = sp;
        self.bump();
        let mut s = String::new();
        loop {
            match self.peek[0] {
                (CatTokenKind::Symbol('"'), sp) => {
                    span.expand(sp);
                    self.bump();
                    break;
                }
                (CatTokenKind::Symbol('\\'), sp) => {
                    span.expand(sp);
                    self.bump();
                    match self.peek[0] {
                        (CatTokenKind::Symbol('\\'), sp) => {
                            span.expand(sp);
                            s.push('\\');
                            self.bump();
                        }
                        (CatTokenKind::Symbol('"'), sp) => {
                            span.expand(sp);
                            s.push('"');
                            self.bump();
                        }
                        (CatTokenKind::Newline, sp) => {
                            // A backslash at the end of a line continues the
                            // string on the next line.
                            span.expand(sp);
                            self.bump();
                        }
                        (CatTokenKind::Text, sp) | (CatTokenKind::Digits, sp) => {
                            span.expand(sp);
                            let text = self.text_of(sp).to_string();
                            self.bump();
                            self.decode_escape(&text, &mut s, span);
                        }
                        (_, sp) => {
                            span.expand(sp);
                            self.diag.emit(
                                Diagnostic::warning(
                                    DiagCode::UnknownEscapeSequence,
                                    "unknown escape sequence in string",
                                )
                                .span(sp),
                            );
                            self.bump();
                        }
                    }
                }
                (CatTokenKind::Newline, sp) | (CatTokenKind::Eof, sp) => {
                    self.diag.emit(
                        Diagnostic::error(
                            DiagCode::UnterminatedString,
                            "string literal is missing its closing quote",
                        )
                        .span(sp),
                    );
                    break;
                }
                (_, sp) => {
                    span.expand(sp);
                    s.push_str(self.text_of(sp));
                    self.bump();
                }
            }
        }
        (Literal(Lit::Str(self.names.intern(&s))), span)
    }

    /// Decode a text run following a backslash inside a string. The first
    /// character selects the escape; the rest is plain text.
    fn decode_escape(&self, text: &str, into: &mut String, span: Span) {
        let mut chars = text.chars();
        let first = chars.next().unwrap_or('\0');
        match first {
            'n' => into.push('\n'),
            't' => into.push('\t'),
            'v' => into.push('\x0b'),
            'f' => into.push('\x0c'),
            'a' => into.push('\x07'),
            'x' => {
                let hex: String = chars
                    .clone()
                    .take_while(|c| c.is_ascii_hexdigit())
                    .collect();
                if let Ok(v) = u8::from_str_radix(&hex, 16) {
                    into.push(v as char);
                    for _ in 0..hex.len() {
                        chars.next();
                    }
                } else {
                    self.diag.emit(
                        Diagnostic::warning(
                            DiagCode::UnknownEscapeSequence,
                            "`\\x` escape without hex digits",
                        )
                        .span(span),
                    );
                }
            }
            c if c.is_ascii_digit() => {
                // Octal escape of up to three digits. The categorizer hands
                // digits over as part of the text run.
                let mut oct = String::new();
                oct.push(c);
                while oct.len() < 3 {
                    match chars.clone().next() {
                        Some(d) if ('0'..='7').contains(&d) => {
                            oct.push(d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                if let Ok(v) = u8::from_str_radix(&oct, 8) {
                    into.push(v as char);
                }
            }
            other => {
                self.diag.emit(
                    Diagnostic::warning(
                        DiagCode::UnknownEscapeSequence,
                        format!("unknown escape sequence `\\{}`", other),
                    )
                    .span(span),
                );
                into.push(other);
            }
        }
        into.push_str(chars.as_str());
    }

    /// Compute the decoded value of a literal token.
    fn decode(&self, tok: &Token) -> Option<TokenValue> {
        let lit = match tok.kind {
            Literal(l) => l,
            _ => return None,
        };
        match lit {
            Lit::Str(name) => Some(TokenValue::Str(self.names.get(name).to_string())),
            Lit::Number(value, None) => {
                let text = self.names.get(value);
                BigInt::from_str_radix(&text, 10).ok().map(|v| TokenValue::Int {
                    value: v,
                    signed: true,
                    width: None,
                })
            }
            Lit::Number(value, Some(frac)) => {
                let text = format!("{}.{}", self.names.get(value), self.names.get(frac));
                text.parse::<f64>().ok().map(TokenValue::Real)
            }
            Lit::BasedInteger(size, signed, base, digits) => {
                let radix = match base {
                    'b' => 2,
                    'o' => 8,
                    'd' => 10,
                    'h' => 16,
                    _ => return None,
                };
                let text = self.names.get(digits);
                let width = size.and_then(|s| self.names.get(s).parse::<u32>().ok());
                BigInt::from_str_radix(&text, radix)
                    .ok()
                    .map(|v| TokenValue::Int {
                        value: v,
                        signed,
                        width,
                    })
            }
            Lit::UnbasedUnsized('0') => Some(TokenValue::Int {
                value: BigInt::from(0),
                signed: false,
                width: Some(1),
            }),
            Lit::UnbasedUnsized('1') => Some(TokenValue::Int {
                value: BigInt::from(1),
                signed: false,
                width: Some(1),
            }),
            Lit::UnbasedUnsized(_) => None,
            Lit::Time(value, frac, unit) => {
                let text = match frac {
                    Some(f) => format!("{}.{}", self.names.get(value), self.names.get(f)),
                    None => self.names.get(value).to_string(),
                };
                text.parse::<f64>()
                    .ok()
                    .map(|v| TokenValue::Time(v, unit))
            }
        }
    }
}

/// Convert a slice of tokens into a single string-literal token covering
/// their raw text. Used by macro stringification.
pub fn stringify(tokens: &[Token], sm: &SourceManager, names: &NameTable) -> Token {
    let mut text = String::new();
    let mut span = tokens.first().map(|t| t.span).unwrap_or(shale_common::source::INVALID_SPAN);
    let mut last_end: Option<usize> = None;
    for tok in tokens {
        if let Some(end) = last_end {
            if tok.span.begin > end && tok.span.source == span.source {
                text.push(' ');
            }
        }
        text.push_str(&sm.span_text(tok.span));
        span.expand(tok.span);
        last_end = Some(tok.span.end);
    }
    let mut out = Token::new(Literal(Lit::Str(names.intern(&text))), span);
    out.value = Some(TokenValue::Str(text));
    out
}

/// Concatenate two tokens into one if the result lexes as a single token.
pub fn glue(a: &Token, b: &Token, sm: &SourceManager, names: &NameTable) -> Option<Token> {
    let text = format!("{}{}", sm.span_text(a.span), sm.span_text(b.span));
    let scratch = DiagnosticEngine::new();
    let src = sm.add_anonymous(text);
    let mut lexer = Lexer::new(src, sm.text(src), names, &scratch);
    let first = lexer.next_token();
    let rest = lexer.next_token();
    if first.kind != Eof && rest.kind == Eof && first.trivia.is_empty() {
        Some(first)
    } else {
        None
    }
}

/// Whether two adjacent tokens would require intervening whitespace to keep
/// their meaning when printed next to each other.
pub fn needs_space(a: &Token, b: &Token, sm: &SourceManager, names: &NameTable) -> bool {
    let a_text = sm.span_text(a.span);
    if a_text.is_empty() {
        return false;
    }
    let text = format!("{}{}", a_text, sm.span_text(b.span));
    let scratch = DiagnosticEngine::new();
    let src = sm.add_anonymous(text);
    let mut lexer = Lexer::new(src, sm.text(src), names, &scratch);
    let first = lexer.next_token();
    // If the first token of the joined text is not exactly `a`, the pair
    // merged or re-split and a space is required.
    first.span.len() != a_text.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shale_common::source::SourceManager;

    fn lex_all(input: &str) -> (Vec<Token>, SourceManager, NameTable, DiagnosticEngine) {
        let sm = SourceManager::new();
        let names = NameTable::new();
        let diag = DiagnosticEngine::new();
        let src = sm.add_anonymous(input.to_string());
        let mut lexer = Lexer::new(src, sm.text(src), &names, &diag);
        let mut toks = Vec::new();
        loop {
            let tok = lexer.next_token();
            let eof = tok.is_eof();
            toks.push(tok);
            if eof {
                break;
            }
        }
        (toks, sm, names, diag)
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        let (toks, _, _, _) = lex_all(input);
        toks.into_iter()
            .map(|t| t.kind)
            .filter(|k| *k != Eof)
            .collect()
    }

    #[test]
    fn idents() {
        let (toks, _, names, _) = lex_all("shiftreg_a busa_index _bus3 n$657");
        let texts: Vec<_> = toks
            .iter()
            .filter_map(|t| t.ident_name())
            .map(|n| names.get(n).to_string())
            .collect();
        assert_eq!(texts, vec!["shiftreg_a", "busa_index", "_bus3", "n$657"]);
    }

    #[test]
    fn esc_idents() {
        let (toks, _, names, _) = lex_all("\\busa+index \\-clock");
        let texts: Vec<_> = toks
            .iter()
            .filter_map(|t| t.ident_name())
            .map(|n| names.get(n).to_string())
            .collect();
        assert_eq!(texts, vec!["busa+index", "-clock"]);
    }

    #[test]
    fn keywords_under_profile() {
        assert_eq!(
            kinds("module logic"),
            vec![Keyword(Kw::Module), Keyword(Kw::Logic)]
        );
        let sm = SourceManager::new();
        let names = NameTable::new();
        let diag = DiagnosticEngine::new();
        let src = sm.add_anonymous("logic".to_string());
        let mut lexer = Lexer::new(src, sm.text(src), &names, &diag);
        lexer.set_keyword_version(KeywordVersion::V1364_2005);
        let tok = lexer.next_token();
        assert!(matches!(tok.kind, Ident(_)));
    }

    #[test]
    fn sized_literals() {
        let (toks, _, names, _) = lex_all("4'b1001 5 'D 3 12'hx");
        let lits: Vec<_> = toks
            .iter()
            .filter_map(|t| match t.kind {
                Literal(l) => Some(l),
                _ => None,
            })
            .collect();
        match lits[0] {
            Lit::BasedInteger(Some(size), false, 'b', digits) => {
                assert_eq!(&*names.get(size), "4");
                assert_eq!(&*names.get(digits), "1001");
            }
            ref other => panic!("unexpected literal {:?}", other),
        }
        match lits[1] {
            Lit::BasedInteger(Some(size), false, 'd', digits) => {
                assert_eq!(&*names.get(size), "5");
                assert_eq!(&*names.get(digits), "3");
            }
            ref other => panic!("unexpected literal {:?}", other),
        }
        match lits[2] {
            Lit::BasedInteger(Some(_), false, 'h', digits) => {
                assert_eq!(&*names.get(digits), "x");
            }
            ref other => panic!("unexpected literal {:?}", other),
        }
    }

    #[test]
    fn unbased_unsized() {
        assert_eq!(
            kinds("'0 '1 'x 'Z '?"),
            vec![
                Literal(Lit::UnbasedUnsized('0')),
                Literal(Lit::UnbasedUnsized('1')),
                Literal(Lit::UnbasedUnsized('x')),
                Literal(Lit::UnbasedUnsized('z')),
                Literal(Lit::UnbasedUnsized('z')),
            ]
        );
    }

    #[test]
    fn real_literals() {
        let (toks, _, _, _) = lex_all("4.2 1e9 2.5e-3");
        let vals: Vec<_> = toks
            .iter()
            .filter_map(|t| match &t.value {
                Some(TokenValue::Real(v)) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(vals, vec![4.2, 1e9, 2.5e-3]);
    }

    #[test]
    fn time_literals() {
        let (toks, _, _, _) = lex_all("42s 14.3ms 9ns");
        let units: Vec<_> = toks
            .iter()
            .filter_map(|t| match t.kind {
                Literal(Lit::Time(_, _, u)) => Some(u),
                _ => None,
            })
            .collect();
        assert_eq!(
            units,
            vec![TimeUnit::Second, TimeUnit::MilliSecond, TimeUnit::NanoSecond]
        );
    }

    #[test]
    fn string_escapes() {
        let (toks, _, _, _) = lex_all(r#""a\nb\x41c""#);
        match &toks[0].value {
            Some(TokenValue::Str(s)) => assert_eq!(s, "a\nbAc"),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn trivia_reconstructs_source() {
        let input = "  // hello\nmodule /* gap */ m;\nendmodule\n";
        let (toks, sm, _, diag) = lex_all(input);
        assert!(diag.is_empty());
        let mut rebuilt = String::new();
        for tok in &toks {
            for t in &tok.trivia {
                rebuilt.push_str(&sm.span_text(t.span));
            }
            rebuilt.push_str(&sm.span_text(tok.span));
        }
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn unknown_bytes_become_trivia() {
        let input = "a \u{7f}b";
        let (toks, _, _, diag) = lex_all(input);
        assert_eq!(diag.len(), 1);
        assert_eq!(diag.diagnostics()[0].code, DiagCode::UnknownToken);
        // The stray byte attaches to `b` as skipped trivia.
        let b = &toks[1];
        assert!(b
            .trivia
            .iter()
            .any(|t| t.kind == TriviaKind::SkippedTokens));
    }

    #[test]
    fn unterminated_block_comment() {
        let (_, _, _, diag) = lex_all("module /* never closed");
        assert!(diag
            .diagnostics()
            .iter()
            .any(|d| d.code == DiagCode::UnterminatedBlockComment));
    }

    #[test]
    fn glue_and_needs_space() {
        let (toks, sm, names, _) = lex_all("foo bar < =");
        let glued = glue(&toks[0], &toks[1], &sm, &names).expect("should glue");
        assert!(matches!(glued.kind, Ident(_)));
        assert!(needs_space(&toks[0], &toks[1], &sm, &names));
        // `<` then `=` would merge into `<=`.
        assert!(needs_space(&toks[2], &toks[3], &sm, &names));
    }

    #[test]
    fn stringify_tokens() {
        let (toks, sm, names, _) = lex_all("a + b");
        let lit = stringify(&toks[..3], &sm, &names);
        match &lit.value {
            Some(TokenValue::Str(s)) => assert_eq!(s, "a + b"),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn directives_and_macro_ops() {
        assert_eq!(kinds("`timescale")[0], Directive(Name(0)));
        let (toks, _, _, _) = lex_all("`` `\"");
        assert_eq!(toks[0].kind, MacroPaste);
        assert_eq!(toks[1].kind, MacroQuote);
    }

    use shale_common::name::Name;
}
