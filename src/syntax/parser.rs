//! A recursive-descent parser for SystemVerilog, based on IEEE 1800. The
//! parser consumes the preprocessor's token stream through a small window,
//! builds concrete syntax nodes that retain every token, and never gives up:
//! missing tokens are synthesized as zero-width placeholders, unexpected
//! tokens are pulled into skipped-token trivia, and each high-level
//! production recovers to its follow set. Constructs that need unbounded
//! lookahead run as speculative branches whose diagnostics are buffered and
//! dropped on rollback.

use crate::ast::*;
use crate::preproc::Preprocessor;
use crate::token::*;
use shale_common::diag::{DiagCode, DiagEmitter, Diagnostic, DiagnosticEngine, Severity};
use shale_common::name::NameTable;
use shale_common::source::{Span, INVALID_SPAN};
use std::collections::VecDeque;

/// Return type of productions that have already reported their failure.
type Reported<T> = Result<T, ()>;

/// How `parse_guess` classified a snippet.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Guess {
    SourceText,
    Member,
    Statement,
    Expression,
}

/// An abstraction around concrete parsers, so that productions can run
/// against the real token stream or against a speculative branch.
trait AbstractParser<'a> {
    fn peek(&mut self, offset: usize) -> TokenKind;
    fn peek_span(&mut self, offset: usize) -> Span;
    fn peek_token(&mut self, offset: usize) -> Token;
    fn eat(&mut self) -> Token;
    fn skip(&mut self);
    fn consumed(&self) -> usize;
    fn skipped(&self) -> usize;
    fn last_span(&self) -> Span;
    fn add_diag(&mut self, diag: Diagnostic);
    fn severity(&self) -> Severity;
    fn arena(&self) -> &'a SyntaxArena<'a>;
    fn names(&self) -> &NameTable;
    fn fast_forward(
        &mut self,
        consumed: usize,
        skipped: usize,
        pending: Vec<Trivia>,
        last_span: Span,
    );
    fn pending_trivia(&self) -> Vec<Trivia>;

    fn try_eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek(0) == kind {
            Some(self.eat())
        } else {
            None
        }
    }

    /// Consume a token of the required kind, or synthesize a zero-width
    /// missing token of that kind and report `ExpectedToken`.
    fn expect(&mut self, kind: TokenKind) -> Token {
        if self.peek(0) == kind {
            return self.eat();
        }
        let (found, span) = (self.peek(0), self.peek_span(0));
        self.add_diag(
            Diagnostic::error(
                DiagCode::ExpectedToken,
                format!("expected `{}`, found `{}` instead", kind, found),
            )
            .span(span),
        );
        Token::missing_at(kind, span.begin())
    }

    fn is_ident(&mut self) -> bool {
        matches!(self.peek(0), Ident(_) | EscIdent(_))
    }

    /// Consume an identifier, or synthesize a missing one.
    fn expect_ident(&mut self, what: &str) -> Token {
        if self.is_ident() {
            return self.eat();
        }
        let (found, span) = (self.peek(0), self.peek_span(0));
        self.add_diag(
            Diagnostic::error(
                DiagCode::ExpectedIdentifier,
                format!("expected {} before `{}`", what, found),
            )
            .span(span),
        );
        Token::missing_at(Ident(self.names().intern("")), span.begin())
    }

    fn at_eof(&mut self) -> bool {
        self.peek(0) == Eof
    }

    /// Skip tokens until one of the terminators or a hard synchronization
    /// token is found, keeping delimiters balanced. The terminator itself is
    /// consumed when `eat_terminator` is set.
    fn recover_balanced(&mut self, terminators: &[TokenKind], eat_terminator: bool) {
        let mut stack = Vec::new();
        loop {
            let tkn = self.peek(0);
            if stack.is_empty() {
                for t in terminators {
                    if *t == tkn {
                        if eat_terminator {
                            self.skip();
                        }
                        return;
                    }
                }
                // Hard synchronization points stop any recovery.
                if matches!(
                    tkn,
                    Keyword(Kw::Endmodule)
                        | Keyword(Kw::Endpackage)
                        | Keyword(Kw::Endinterface)
                        | Keyword(Kw::Endprogram)
                        | Keyword(Kw::Endprimitive)
                ) {
                    return;
                }
            }
            match tkn {
                OpenDelim(x) => stack.push(x),
                CloseDelim(x) => {
                    if let Some(open) = stack.pop() {
                        if open != x {
                            return;
                        }
                    } else {
                        return;
                    }
                }
                Eof => return,
                _ => (),
            }
            self.skip();
        }
    }
}

/// The parser over the real preprocessor stream. Maintains a peek queue so
/// that lookahead never pessimizes the preprocessor, and a pending list of
/// skipped-token trivia that attaches to the next accepted token.
struct Parser<'a, 's, 'c> {
    input: &'s mut Preprocessor<'c>,
    queue: VecDeque<Token>,
    pending: Vec<Trivia>,
    diag: &'s DiagnosticEngine,
    arena: &'a SyntaxArena<'a>,
    names: &'s NameTable,
    last_span: Span,
    consumed: usize,
    skipped: usize,
    severity: Severity,
}

impl<'a, 's, 'c> Parser<'a, 's, 'c> {
    fn new(
        input: &'s mut Preprocessor<'c>,
        arena: &'a SyntaxArena<'a>,
        names: &'s NameTable,
        diag: &'s DiagnosticEngine,
    ) -> Parser<'a, 's, 'c> {
        Parser {
            input,
            queue: VecDeque::new(),
            pending: Vec::new(),
            diag,
            arena,
            names,
            last_span: INVALID_SPAN,
            consumed: 0,
            skipped: 0,
            severity: Severity::Note,
        }
    }

    fn fill(&mut self, offset: usize) {
        if let Some(tok) = self.queue.back() {
            if tok.kind == Eof {
                return;
            }
        }
        while self.queue.len() <= offset {
            let tok = self.input.next();
            let eof = tok.kind == Eof;
            self.queue.push_back(tok);
            if eof {
                break;
            }
        }
    }

    fn at(&mut self, offset: usize) -> &Token {
        self.fill(offset);
        let idx = offset.min(self.queue.len() - 1);
        &self.queue[idx]
    }
}

impl<'a, 's, 'c> AbstractParser<'a> for Parser<'a, 's, 'c> {
    fn peek(&mut self, offset: usize) -> TokenKind {
        self.at(offset).kind
    }

    fn peek_span(&mut self, offset: usize) -> Span {
        self.at(offset).span
    }

    fn peek_token(&mut self, offset: usize) -> Token {
        self.at(offset).clone()
    }

    fn eat(&mut self) -> Token {
        self.fill(0);
        if self.queue[0].kind == Eof {
            let mut tok = self.queue[0].clone();
            if !self.pending.is_empty() {
                let mut trivia = std::mem::take(&mut self.pending);
                trivia.extend(tok.trivia);
                tok.trivia = trivia;
                // The real end-of-file token keeps the trivia it just handed
                // out; further eats return a bare one.
                self.queue[0].trivia.clear();
            }
            self.last_span = tok.span;
            return tok;
        }
        let mut tok = self.queue.pop_front().expect("queue filled");
        if !self.pending.is_empty() {
            let mut trivia = std::mem::take(&mut self.pending);
            trivia.extend(tok.trivia);
            tok.trivia = trivia;
        }
        self.last_span = tok.span;
        self.consumed += 1;
        tok
    }

    fn skip(&mut self) {
        self.fill(0);
        if self.queue[0].kind == Eof {
            return;
        }
        let tok = self.queue.pop_front().expect("queue filled");
        self.pending.extend(tok.trivia.iter().copied());
        self.pending
            .push(Trivia::new(TriviaKind::SkippedTokens, tok.span));
        self.last_span = tok.span;
        self.consumed += 1;
        self.skipped += 1;
    }

    fn consumed(&self) -> usize {
        self.consumed
    }

    fn skipped(&self) -> usize {
        self.skipped
    }

    fn last_span(&self) -> Span {
        self.last_span
    }

    fn add_diag(&mut self, diag: Diagnostic) {
        if diag.severity > self.severity {
            self.severity = diag.severity;
        }
        self.diag.emit(diag);
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn arena(&self) -> &'a SyntaxArena<'a> {
        self.arena
    }

    fn names(&self) -> &NameTable {
        self.names
    }

    fn fast_forward(
        &mut self,
        consumed: usize,
        skipped: usize,
        pending: Vec<Trivia>,
        last_span: Span,
    ) {
        for _ in 0..consumed {
            self.fill(0);
            if self.queue[0].kind == Eof {
                break;
            }
            self.queue.pop_front();
        }
        self.consumed += consumed;
        self.skipped += skipped;
        self.pending = pending;
        self.last_span = last_span;
    }

    fn pending_trivia(&self) -> Vec<Trivia> {
        self.pending.clone()
    }
}

/// A speculative parser over a checkpoint of another parser. Consumes
/// nothing from the underlying stream; diagnostics are buffered and only
/// merged into the parent on commit.
struct BranchParser<'p, 'a> {
    parser: &'p mut dyn AbstractParser<'a>,
    consumed: usize,
    skipped: usize,
    pending: Vec<Trivia>,
    diagnostics: Vec<Diagnostic>,
    last_span: Span,
    severity: Severity,
}

impl<'p, 'a> BranchParser<'p, 'a> {
    fn new(parser: &'p mut dyn AbstractParser<'a>) -> BranchParser<'p, 'a> {
        let last = parser.last_span();
        let pending = parser.pending_trivia();
        BranchParser {
            parser,
            consumed: 0,
            skipped: 0,
            pending,
            diagnostics: Vec::new(),
            last_span: last,
            severity: Severity::Note,
        }
    }

    /// Commit the branch: advance the parent past everything this branch
    /// consumed and merge the buffered diagnostics.
    fn commit(self) {
        let BranchParser {
            parser,
            consumed,
            skipped,
            pending,
            diagnostics,
            last_span,
            ..
        } = self;
        parser.fast_forward(consumed, skipped, pending, last_span);
        for d in diagnostics {
            parser.add_diag(d);
        }
    }
}

impl<'p, 'a> AbstractParser<'a> for BranchParser<'p, 'a> {
    fn peek(&mut self, offset: usize) -> TokenKind {
        self.parser.peek(self.consumed + offset)
    }

    fn peek_span(&mut self, offset: usize) -> Span {
        self.parser.peek_span(self.consumed + offset)
    }

    fn peek_token(&mut self, offset: usize) -> Token {
        self.parser.peek_token(self.consumed + offset)
    }

    fn eat(&mut self) -> Token {
        let mut tok = self.parser.peek_token(self.consumed);
        if tok.kind != Eof {
            self.consumed += 1;
        }
        if !self.pending.is_empty() {
            let mut trivia = std::mem::take(&mut self.pending);
            trivia.extend(tok.trivia);
            tok.trivia = trivia;
        }
        self.last_span = tok.span;
        tok
    }

    fn skip(&mut self) {
        let tok = self.parser.peek_token(self.consumed);
        if tok.kind == Eof {
            return;
        }
        self.consumed += 1;
        self.skipped += 1;
        self.pending.extend(tok.trivia.iter().copied());
        self.pending
            .push(Trivia::new(TriviaKind::SkippedTokens, tok.span));
        self.last_span = tok.span;
    }

    fn consumed(&self) -> usize {
        self.consumed
    }

    fn skipped(&self) -> usize {
        self.skipped
    }

    fn last_span(&self) -> Span {
        self.last_span
    }

    fn add_diag(&mut self, diag: Diagnostic) {
        if diag.severity > self.severity {
            self.severity = diag.severity;
        }
        self.diagnostics.push(diag);
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn arena(&self) -> &'a SyntaxArena<'a> {
        self.parser.arena()
    }

    fn names(&self) -> &NameTable {
        self.parser.names()
    }

    fn fast_forward(
        &mut self,
        consumed: usize,
        skipped: usize,
        pending: Vec<Trivia>,
        last_span: Span,
    ) {
        self.consumed += consumed;
        self.skipped += skipped;
        self.pending = pending;
        self.last_span = last_span;
    }

    fn pending_trivia(&self) -> Vec<Trivia> {
        self.pending.clone()
    }
}

/// Tries a set of alternative productions on checkpoints of the same
/// position and commits the one that succeeds. Used for the few places in
/// the grammar that need arbitrary-length lookahead.
struct ParallelParser<'b, 'a, R: Clone> {
    branches: Vec<(
        String,
        Box<dyn FnMut(&mut dyn AbstractParser<'a>) -> Reported<R> + 'b>,
        bool,
    )>,
}

impl<'b, 'a, R: Clone> ParallelParser<'b, 'a, R> {
    fn new() -> Self {
        ParallelParser {
            branches: Vec::new(),
        }
    }

    fn add<F>(&mut self, name: &str, func: F)
    where
        F: FnMut(&mut dyn AbstractParser<'a>) -> Reported<R> + 'b,
    {
        self.branches.push((name.to_owned(), Box::new(func), false));
    }

    /// A greedy branch commits immediately on success without considering
    /// the remaining alternatives.
    fn add_greedy<F>(&mut self, name: &str, func: F)
    where
        F: FnMut(&mut dyn AbstractParser<'a>) -> Reported<R> + 'b,
    {
        self.branches.push((name.to_owned(), Box::new(func), true));
    }

    fn finish(self, p: &mut dyn AbstractParser<'a>, msg: &str) -> Reported<R> {
        let (tkn, q) = (p.peek(0), p.peek_span(0));

        let mut results: Vec<(String, BranchState, R, Span)> = Vec::new();
        let mut failures: Vec<(String, usize, BranchState)> = Vec::new();
        for (name, mut func, greedy) in self.branches {
            let mut bp = BranchParser::new(p);
            match func(&mut bp) {
                // A branch that only survived through error recovery does
                // not count as a successful interpretation.
                Ok(x) if bp.severity() < Severity::Error => {
                    if greedy {
                        bp.commit();
                        return Ok(x);
                    }
                    let span = Span::union(q, bp.last_span());
                    results.push((name, BranchState::capture(bp), x, span));
                }
                _ => {
                    let score = bp.consumed() - bp.skipped();
                    failures.push((name, score, BranchState::capture(bp)));
                }
            }
        }

        if results.len() > 1 {
            let names = results
                .iter()
                .map(|r| r.0.as_str())
                .collect::<Vec<_>>()
                .join(" or ");
            p.add_diag(
                Diagnostic::error(
                    DiagCode::AmbiguousSyntax,
                    format!("ambiguous code, could be {}", names),
                )
                .span(q),
            );
            let (_, state, result, _) = results.into_iter().next().unwrap();
            state.replay(p);
            Ok(result)
        } else if let Some((_, state, result, _)) = results.into_iter().next() {
            state.replay(p);
            Ok(result)
        } else {
            // All branches failed; report the one that got the furthest.
            failures.sort_by(|a, b| b.1.cmp(&a.1));
            let num_best = failures.iter().filter(|f| f.1 == failures[0].1).count();
            if num_best != 1 {
                p.add_diag(
                    Diagnostic::error(
                        DiagCode::ExpectedMember,
                        format!("expected {}, found `{}` instead", msg, tkn),
                    )
                    .span(q),
                );
            }
            if let Some((_, _, state)) = failures.into_iter().next() {
                state.replay(p);
            }
            Err(())
        }
    }
}

/// The captured outcome of a speculative branch, ready to be replayed onto
/// the parent parser.
struct BranchState {
    consumed: usize,
    skipped: usize,
    pending: Vec<Trivia>,
    diagnostics: Vec<Diagnostic>,
    last_span: Span,
}

impl BranchState {
    fn capture(bp: BranchParser) -> BranchState {
        BranchState {
            consumed: bp.consumed,
            skipped: bp.skipped,
            pending: bp.pending,
            diagnostics: bp.diagnostics,
            last_span: bp.last_span,
        }
    }

    fn replay<'a>(self, p: &mut dyn AbstractParser<'a>) {
        p.fast_forward(self.consumed, self.skipped, self.pending, self.last_span);
        for d in self.diagnostics {
            p.add_diag(d);
        }
    }
}

/// A node under construction.
struct NB<'a> {
    kind: SyntaxKind,
    children: Vec<SyntaxElem<'a>>,
}

impl<'a> NB<'a> {
    fn new(kind: SyntaxKind) -> NB<'a> {
        NB {
            kind,
            children: Vec::new(),
        }
    }

    fn tok(&mut self, t: Token) -> &mut Self {
        self.children.push(SyntaxElem::Token(t));
        self
    }

    fn node(&mut self, n: &'a SyntaxNode<'a>) -> &mut Self {
        self.children.push(SyntaxElem::Node(n));
        self
    }

    fn finish(self, p: &mut dyn AbstractParser<'a>) -> &'a SyntaxNode<'a> {
        SyntaxNode::alloc(p.arena(), self.kind, self.children)
    }
}

/// Parses the opening delimiter, calls `inner`, and parses the closing
/// delimiter, recovering to and including the closing delimiter if `inner`
/// fails.
fn flanked<'a, F>(
    p: &mut dyn AbstractParser<'a>,
    nb: &mut NB<'a>,
    delim: DelimKind,
    mut inner: F,
) -> Reported<()>
where
    F: FnMut(&mut dyn AbstractParser<'a>, &mut NB<'a>) -> Reported<()>,
{
    nb.tok(p.expect(OpenDelim(delim)));
    match inner(p, nb) {
        Ok(()) => {
            nb.tok(p.expect(CloseDelim(delim)));
            Ok(())
        }
        Err(()) => {
            p.recover_balanced(&[CloseDelim(delim)], false);
            nb.tok(p.expect(CloseDelim(delim)));
            Err(())
        }
    }
}

/// Parse a comma-separated list of items into a separated-list node, until
/// the terminator is seen. The terminator is not consumed.
fn comma_list<'a, F>(
    p: &mut dyn AbstractParser<'a>,
    term: TokenKind,
    msg: &str,
    mut item: F,
) -> Reported<&'a SyntaxNode<'a>>
where
    F: FnMut(&mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>>,
{
    let mut nb = NB::new(SyntaxKind::SeparatedList);
    while p.peek(0) != Eof && p.peek(0) != term {
        match item(p) {
            Ok(n) => {
                nb.node(n);
            }
            Err(()) => {
                p.recover_balanced(&[Comma, term, Semicolon], false);
                if p.peek(0) == Comma {
                    p.skip();
                    continue;
                }
                break;
            }
        }
        if p.peek(0) == term || p.peek(0) == Eof {
            break;
        } else if let Some(comma) = p.try_eat(Comma) {
            nb.tok(comma);
            if p.peek(0) == term {
                let q = p.last_span();
                p.add_diag(
                    Diagnostic::warning(DiagCode::ExpectedToken, "superfluous trailing comma")
                        .span(q),
                );
                break;
            }
        } else {
            let (tkn, q) = (p.peek(0), p.peek_span(0));
            p.add_diag(
                Diagnostic::error(
                    DiagCode::ExpectedToken,
                    format!("expected `,` or end of {}, found `{}`", msg, tkn),
                )
                .span(q),
            );
            return Err(());
        }
    }
    Ok(nb.finish(p))
}

// ----------------------------------------------------------------------------
// Entry points
// ----------------------------------------------------------------------------

/// Parse a whole compilation unit from a preprocessor.
pub fn parse_source_text<'a, 's, 'c>(
    input: &'s mut Preprocessor<'c>,
    arena: &'a SyntaxArena<'a>,
    names: &'s NameTable,
    diag: &'s DiagnosticEngine,
) -> &'a SyntaxNode<'a> {
    let mut p = Parser::new(input, arena, names, diag);
    let root = source_text(&mut p);
    link(root);
    root
}

/// Parse a lone expression.
pub fn parse_expression<'a, 's, 'c>(
    input: &'s mut Preprocessor<'c>,
    arena: &'a SyntaxArena<'a>,
    names: &'s NameTable,
    diag: &'s DiagnosticEngine,
) -> &'a SyntaxNode<'a> {
    let mut p = Parser::new(input, arena, names, diag);
    let root = expr(&mut p).unwrap_or_else(|()| error_node(&mut p));
    link(root);
    root
}

/// Parse a lone statement.
pub fn parse_statement<'a, 's, 'c>(
    input: &'s mut Preprocessor<'c>,
    arena: &'a SyntaxArena<'a>,
    names: &'s NameTable,
    diag: &'s DiagnosticEngine,
) -> &'a SyntaxNode<'a> {
    let mut p = Parser::new(input, arena, names, diag);
    let root = stmt(&mut p).unwrap_or_else(|()| error_node(&mut p));
    link(root);
    root
}

/// Parse a lone module member.
pub fn parse_member<'a, 's, 'c>(
    input: &'s mut Preprocessor<'c>,
    arena: &'a SyntaxArena<'a>,
    names: &'s NameTable,
    diag: &'s DiagnosticEngine,
) -> &'a SyntaxNode<'a> {
    let mut p = Parser::new(input, arena, names, diag);
    let root = member(&mut p).unwrap_or_else(|()| error_node(&mut p));
    link(root);
    root
}

/// Probe the first few tokens to classify an arbitrary snippet, then parse
/// it with the matching entry point.
pub fn parse_guess<'a, 's, 'c>(
    input: &'s mut Preprocessor<'c>,
    arena: &'a SyntaxArena<'a>,
    names: &'s NameTable,
    diag: &'s DiagnosticEngine,
) -> (Guess, &'a SyntaxNode<'a>) {
    let mut p = Parser::new(input, arena, names, diag);
    let guess = match p.peek(0) {
        Keyword(
            Kw::Module
            | Kw::Macromodule
            | Kw::Interface
            | Kw::Program
            | Kw::Package
            | Kw::Primitive
            | Kw::Timeunit
            | Kw::Timeprecision,
        ) => Guess::SourceText,
        Keyword(
            Kw::Assign
            | Kw::Modport
            | Kw::Clocking
            | Kw::Sequence
            | Kw::Property
            | Kw::Let
            | Kw::Genvar
            | Kw::Nettype
            | Kw::Typedef
            | Kw::Import
            | Kw::Export
            | Kw::Parameter
            | Kw::Localparam
            | Kw::Function
            | Kw::Task
            | Kw::Initial
            | Kw::Always
            | Kw::AlwaysComb
            | Kw::AlwaysFf
            | Kw::AlwaysLatch
            | Kw::Final
            | Kw::Wire
            | Kw::Uwire
            | Kw::Tri
            | Kw::Wand
            | Kw::Wor
            | Kw::Input
            | Kw::Output
            | Kw::Inout,
        ) => Guess::Member,
        Keyword(
            Kw::Begin
            | Kw::If
            | Kw::Case
            | Kw::Casex
            | Kw::Casez
            | Kw::For
            | Kw::Repeat
            | Kw::While
            | Kw::Forever
            | Kw::Return
            | Kw::Randsequence,
        )
        | At
        | Hashtag => Guess::Statement,
        Semicolon => Guess::Statement,
        _ => {
            // An expression followed by `;` or an assignment operator reads
            // as a statement; a bare expression otherwise.
            let mut bp = BranchParser::new(&mut p);
            let is_stmt = match expr(&mut bp) {
                Ok(_) => match bp.peek(0) {
                    Semicolon => true,
                    Operator(op) => op.is_assignment(),
                    _ => false,
                },
                Err(()) => true,
            };
            if is_stmt {
                Guess::Statement
            } else {
                Guess::Expression
            }
        }
    };
    let root = match guess {
        Guess::SourceText => source_text(&mut p),
        Guess::Member => member(&mut p).unwrap_or_else(|()| error_node(&mut p)),
        Guess::Statement => stmt(&mut p).unwrap_or_else(|()| error_node(&mut p)),
        Guess::Expression => expr(&mut p).unwrap_or_else(|()| error_node(&mut p)),
    };
    link(root);
    (guess, root)
}

fn error_node<'a>(p: &mut dyn AbstractParser<'a>) -> &'a SyntaxNode<'a> {
    NB::new(SyntaxKind::ErrorNode).finish(p)
}

// ----------------------------------------------------------------------------
// Top level
// ----------------------------------------------------------------------------

fn source_text<'a>(p: &mut dyn AbstractParser<'a>) -> &'a SyntaxNode<'a> {
    let mut nb = NB::new(SyntaxKind::SourceText);
    while !p.at_eof() {
        let before = p.consumed();
        match item(p) {
            Ok(n) => {
                nb.node(n);
            }
            Err(()) => {
                p.recover_balanced(&[Semicolon], true);
            }
        }
        if p.consumed() == before && !p.at_eof() {
            // No progress; discard one token to avoid spinning.
            p.skip();
        }
    }
    // The end-of-file token holds the trailing trivia of the buffer.
    nb.tok(p.eat());
    nb.finish(p)
}

fn item<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    match p.peek(0) {
        Keyword(Kw::Module) | Keyword(Kw::Macromodule) => {
            design_decl(p, SyntaxKind::ModuleDecl, Kw::Endmodule)
        }
        Keyword(Kw::Interface) => design_decl(p, SyntaxKind::InterfaceDecl, Kw::Endinterface),
        Keyword(Kw::Program) => design_decl(p, SyntaxKind::ProgramDecl, Kw::Endprogram),
        Keyword(Kw::Package) => package_decl(p),
        Keyword(Kw::Primitive) => primitive_decl(p),
        _ => member(p),
    }
}

/// Module, interface, and program declarations share their shape.
fn design_decl<'a>(
    p: &mut dyn AbstractParser<'a>,
    kind: SyntaxKind,
    end_kw: Kw,
) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(kind);
    nb.tok(p.eat());
    if let Some(t) = p
        .try_eat(Keyword(Kw::Static))
        .or_else(|| p.try_eat(Keyword(Kw::Automatic)))
    {
        nb.tok(t);
    }
    nb.tok(p.expect_ident("a design element name"));
    if p.peek(0) == Hashtag && p.peek(1) == OpenDelim(Paren) {
        nb.node(param_port_list(p)?);
    }
    if p.peek(0) == OpenDelim(Paren) {
        nb.node(port_list(p)?);
    }
    nb.tok(p.expect(Semicolon));
    member_list(p, &mut nb, end_kw);
    nb.tok(p.expect(Keyword(end_kw)));
    end_label(p, &mut nb);
    Ok(nb.finish(p))
}

fn package_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::PackageDecl);
    nb.tok(p.eat());
    if let Some(t) = p
        .try_eat(Keyword(Kw::Static))
        .or_else(|| p.try_eat(Keyword(Kw::Automatic)))
    {
        nb.tok(t);
    }
    nb.tok(p.expect_ident("a package name"));
    nb.tok(p.expect(Semicolon));
    member_list(p, &mut nb, Kw::Endpackage);
    nb.tok(p.expect(Keyword(Kw::Endpackage)));
    end_label(p, &mut nb);
    Ok(nb.finish(p))
}

fn end_label<'a>(p: &mut dyn AbstractParser<'a>, nb: &mut NB<'a>) {
    if p.peek(0) == Colon && matches!(p.peek(1), Ident(_) | EscIdent(_)) {
        nb.tok(p.eat());
        nb.tok(p.eat());
    }
}

fn member_list<'a>(p: &mut dyn AbstractParser<'a>, nb: &mut NB<'a>, end_kw: Kw) {
    let mut list = NB::new(SyntaxKind::List);
    loop {
        match p.peek(0) {
            Keyword(kw) if kw == end_kw => break,
            Eof => break,
            _ => {}
        }
        let before = p.consumed();
        match member(p) {
            Ok(n) => {
                list.node(n);
            }
            Err(()) => {
                p.recover_balanced(&[Semicolon, Keyword(end_kw)], false);
                if p.peek(0) == Semicolon {
                    p.skip();
                }
            }
        }
        if p.consumed() == before {
            match p.peek(0) {
                Keyword(kw) if kw == end_kw => break,
                Eof => break,
                _ => p.skip(),
            }
        }
    }
    nb.node(list.finish(p));
}

// ----------------------------------------------------------------------------
// Parameter and port lists
// ----------------------------------------------------------------------------

fn param_port_list<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ParamPortList);
    nb.tok(p.expect(Hashtag));
    flanked(p, &mut nb, Paren, |p, nb| {
        let list = comma_list(p, CloseDelim(Paren), "parameter list", |p| {
            let mut pd = NB::new(SyntaxKind::ParamDecl);
            if let Some(t) = p
                .try_eat(Keyword(Kw::Parameter))
                .or_else(|| p.try_eat(Keyword(Kw::Localparam)))
            {
                pd.tok(t);
            }
            if let Some(t) = p.try_eat(Keyword(Kw::Type)) {
                pd.tok(t);
            } else if let Ok(Some(ty)) = try_data_type_unless_name(p) {
                pd.node(ty);
            }
            pd.node(param_assign(p)?);
            Ok(pd.finish(p))
        })?;
        nb.node(list);
        Ok(())
    })?;
    Ok(nb.finish(p))
}

fn param_assign<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ParamAssign);
    nb.tok(p.expect_ident("a parameter name"));
    dimensions(p, &mut nb)?;
    if let Some(t) = p.try_eat(Operator(Op::Assign)) {
        nb.tok(t);
        nb.node(expr(p)?);
    }
    Ok(nb.finish(p))
}

/// Parse a module header port list, deciding between the ANSI and non-ANSI
/// styles from the first tokens after the parenthesis.
fn port_list<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let ansi = match p.peek(1) {
        CloseDelim(Paren) => true,
        Keyword(
            Kw::Input | Kw::Output | Kw::Inout | Kw::Ref | Kw::Var | Kw::Interface | Kw::Wire
            | Kw::Uwire | Kw::Tri | Kw::Tri0 | Kw::Tri1 | Kw::Wand | Kw::Wor | Kw::Triand
            | Kw::Trior | Kw::Trireg | Kw::Supply0 | Kw::Supply1 | Kw::Logic | Kw::Bit | Kw::Reg
            | Kw::Byte | Kw::Shortint | Kw::Int | Kw::Longint | Kw::Integer | Kw::Time | Kw::Real
            | Kw::Shortreal | Kw::Realtime | Kw::String | Kw::Event | Kw::Signed | Kw::Unsigned,
        ) => true,
        Ident(_) | EscIdent(_) => matches!(p.peek(2), Ident(_) | EscIdent(_) | Period),
        _ => false,
    };
    let kind = if ansi {
        SyntaxKind::PortList
    } else {
        SyntaxKind::NonAnsiPortList
    };
    let mut nb = NB::new(kind);
    flanked(p, &mut nb, Paren, |p, nb| {
        let list = comma_list(p, CloseDelim(Paren), "port list", |p| {
            if ansi {
                ansi_port(p)
            } else {
                non_ansi_port(p)
            }
        })?;
        nb.node(list);
        Ok(())
    })?;
    Ok(nb.finish(p))
}

fn ansi_port<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::AnsiPort);
    if let Some(t) = port_direction(p) {
        nb.tok(t);
    }
    if let Some(t) = p.try_eat(Keyword(Kw::Var)) {
        nb.tok(t);
    } else if let Some(t) = net_type_keyword(p) {
        nb.tok(t);
    }
    if let Ok(Some(ty)) = try_data_type_unless_name(p) {
        nb.node(ty);
    }
    nb.node(declarator(p)?);
    Ok(nb.finish(p))
}

fn non_ansi_port<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::NonAnsiPort);
    if p.peek(0) == Period {
        nb.tok(p.eat());
        nb.tok(p.expect_ident("a port name"));
        flanked(p, &mut nb, Paren, |p, nb| {
            if p.peek(0) != CloseDelim(Paren) {
                nb.node(expr(p)?);
            }
            Ok(())
        })?;
    } else {
        nb.node(expr(p)?);
    }
    Ok(nb.finish(p))
}

fn port_direction<'a>(p: &mut dyn AbstractParser<'a>) -> Option<Token> {
    match p.peek(0) {
        Keyword(Kw::Input) | Keyword(Kw::Output) | Keyword(Kw::Inout) | Keyword(Kw::Ref) => {
            Some(p.eat())
        }
        _ => None,
    }
}

fn net_type_keyword<'a>(p: &mut dyn AbstractParser<'a>) -> Option<Token> {
    match p.peek(0) {
        Keyword(
            Kw::Wire | Kw::Uwire | Kw::Tri | Kw::Tri0 | Kw::Tri1 | Kw::Wand | Kw::Wor
            | Kw::Triand | Kw::Trior | Kw::Trireg | Kw::Supply0 | Kw::Supply1 | Kw::Interconnect,
        ) => Some(p.eat()),
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// Members
// ----------------------------------------------------------------------------

fn member<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    match p.peek(0) {
        Semicolon => {
            let mut nb = NB::new(SyntaxKind::EmptyMember);
            nb.tok(p.eat());
            Ok(nb.finish(p))
        }
        Keyword(Kw::Timeunit) | Keyword(Kw::Timeprecision) => timeunits_decl(p),
        Keyword(Kw::Import) => import_decl(p),
        Keyword(Kw::Export) => export_decl(p),
        Keyword(Kw::Nettype) => nettype_decl(p),
        Keyword(Kw::Typedef) => typedef_decl(p),
        Keyword(Kw::Parameter) | Keyword(Kw::Localparam) => param_decl(p),
        Keyword(Kw::Genvar) => genvar_decl(p),
        Keyword(Kw::Assign) => continuous_assign(p),
        Keyword(Kw::Modport) => modport_decl(p),
        Keyword(Kw::Default) if p.peek(1) == Keyword(Kw::Clocking) => clocking_block(p),
        Keyword(Kw::Global) if p.peek(1) == Keyword(Kw::Clocking) => clocking_block(p),
        Keyword(Kw::Clocking) => clocking_block(p),
        Keyword(Kw::Sequence) => assertion_decl(p, SyntaxKind::SequenceDecl, Kw::Endsequence),
        Keyword(Kw::Property) => assertion_decl(p, SyntaxKind::PropertyDecl, Kw::Endproperty),
        Keyword(Kw::Let) => let_decl(p),
        Keyword(Kw::Function) | Keyword(Kw::Task) => tf_decl(p),
        Keyword(
            Kw::Initial | Kw::Always | Kw::AlwaysComb | Kw::AlwaysFf | Kw::AlwaysLatch | Kw::Final,
        ) => {
            let mut nb = NB::new(SyntaxKind::ProceduralBlock);
            nb.tok(p.eat());
            nb.node(stmt(p)?);
            Ok(nb.finish(p))
        }
        Keyword(Kw::Input) | Keyword(Kw::Output) | Keyword(Kw::Inout) | Keyword(Kw::Ref) => {
            port_decl(p)
        }
        SysIdent(_) => elab_system_task(p),
        Keyword(
            Kw::Wire | Kw::Uwire | Kw::Tri | Kw::Tri0 | Kw::Tri1 | Kw::Wand | Kw::Wor
            | Kw::Triand | Kw::Trior | Kw::Trireg | Kw::Supply0 | Kw::Supply1 | Kw::Interconnect,
        ) => net_decl(p),
        Keyword(
            Kw::Var | Kw::Const | Kw::Static | Kw::Automatic | Kw::Logic | Kw::Bit | Kw::Reg
            | Kw::Byte | Kw::Shortint | Kw::Int | Kw::Longint | Kw::Integer | Kw::Time | Kw::Real
            | Kw::Shortreal | Kw::Realtime | Kw::String | Kw::Chandle | Kw::Event | Kw::Void,
        ) => data_decl(p),
        Ident(_) | EscIdent(_) => {
            // `foo bar;` declares a variable of a named type, while
            // `foo bar(...);` instantiates a definition. Probe both.
            let mut pp = ParallelParser::new();
            pp.add("an instantiation", |p| instantiation(p));
            pp.add("a data declaration", |p| data_decl(p));
            pp.finish(p, "a module member")
        }
        _ => {
            let (tkn, q) = (p.peek(0), p.peek_span(0));
            p.add_diag(
                Diagnostic::error(
                    DiagCode::ExpectedMember,
                    format!("expected a module member, found `{}` instead", tkn),
                )
                .span(q),
            );
            Err(())
        }
    }
}

fn timeunits_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::TimeunitsDecl);
    nb.tok(p.eat());
    nb.node(expr(p)?);
    if let Some(t) = p.try_eat(Operator(Op::Div)) {
        nb.tok(t);
        nb.node(expr(p)?);
    }
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn import_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ImportDecl);
    nb.tok(p.eat());
    let list = comma_list(p, Semicolon, "import list", |p| import_item(p))?;
    nb.node(list);
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn import_item<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ImportItem);
    nb.tok(p.expect_ident("a package name"));
    nb.tok(p.expect(Namespace));
    if let Some(t) = p.try_eat(Operator(Op::Mul)) {
        nb.tok(t);
    } else {
        nb.tok(p.expect_ident("an imported name"));
    }
    Ok(nb.finish(p))
}

fn export_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ExportDecl);
    nb.tok(p.eat());
    if p.peek(0) == Operator(Op::Mul) && p.peek(1) == Namespace {
        // `export *::*;`
        nb.tok(p.eat());
        nb.tok(p.eat());
        nb.tok(p.expect(Operator(Op::Mul)));
    } else {
        let list = comma_list(p, Semicolon, "export list", |p| import_item(p))?;
        nb.node(list);
    }
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn nettype_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::NettypeDecl);
    nb.tok(p.eat());
    nb.node(data_type(p)?);
    nb.tok(p.expect_ident("a net type name"));
    if let Some(t) = p.try_eat(Keyword(Kw::With)) {
        nb.tok(t);
        nb.node(expr(p)?);
    }
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn typedef_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::TypedefDecl);
    nb.tok(p.eat());
    nb.node(data_type(p)?);
    nb.tok(p.expect_ident("a type name"));
    dimensions(p, &mut nb)?;
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn param_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ParamDecl);
    nb.tok(p.eat());
    if let Some(t) = p.try_eat(Keyword(Kw::Type)) {
        nb.tok(t);
    } else if let Ok(Some(ty)) = try_data_type_unless_name(p) {
        nb.node(ty);
    }
    let list = comma_list(p, Semicolon, "parameter list", |p| param_assign(p))?;
    nb.node(list);
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn genvar_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::GenvarDecl);
    nb.tok(p.eat());
    let list = comma_list(p, Semicolon, "genvar list", |p| {
        let mut d = NB::new(SyntaxKind::Declarator);
        d.tok(p.expect_ident("a genvar name"));
        Ok(d.finish(p))
    })?;
    nb.node(list);
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn continuous_assign<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ContinuousAssign);
    nb.tok(p.eat());
    if p.peek(0) == OpenDelim(Paren) && is_strength(p.peek(1)) {
        nb.node(net_strength(p)?);
    }
    if p.peek(0) == Hashtag {
        nb.node(delay_control(p)?);
    }
    let list = comma_list(p, Semicolon, "assignment list", |p| {
        let lhs = expr(p)?;
        let mut a = NB::new(SyntaxKind::BinaryExpr);
        a.node(lhs);
        a.tok(p.expect(Operator(Op::Assign)));
        a.node(expr(p)?);
        Ok(a.finish(p))
    })?;
    nb.node(list);
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn is_strength(kind: TokenKind) -> bool {
    matches!(
        kind,
        Keyword(
            Kw::Supply0
                | Kw::Supply1
                | Kw::Strong0
                | Kw::Strong1
                | Kw::Pull0
                | Kw::Pull1
                | Kw::Weak0
                | Kw::Weak1
                | Kw::Highz0
                | Kw::Highz1
                | Kw::Small
                | Kw::Medium
                | Kw::Large
        )
    )
}

fn net_strength<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::NetStrength);
    flanked(p, &mut nb, Paren, |p, nb| {
        while p.peek(0) != CloseDelim(Paren) && !p.at_eof() {
            if is_strength(p.peek(0)) {
                nb.tok(p.eat());
            } else if p.peek(0) == Comma {
                nb.tok(p.eat());
            } else {
                let (tkn, q) = (p.peek(0), p.peek_span(0));
                p.add_diag(
                    Diagnostic::error(
                        DiagCode::ExpectedToken,
                        format!("expected a strength keyword, found `{}`", tkn),
                    )
                    .span(q),
                );
                return Err(());
            }
        }
        Ok(())
    })?;
    Ok(nb.finish(p))
}

fn delay_control<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::DelayControl);
    nb.tok(p.expect(Hashtag));
    if p.peek(0) == OpenDelim(Paren) {
        flanked(p, &mut nb, Paren, |p, nb| {
            let list = comma_list(p, CloseDelim(Paren), "delay list", |p| expr(p))?;
            nb.node(list);
            Ok(())
        })?;
    } else {
        nb.node(primary_expr(p)?);
    }
    Ok(nb.finish(p))
}

fn port_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::PortDecl);
    nb.tok(p.eat());
    if let Some(t) = p.try_eat(Keyword(Kw::Var)) {
        nb.tok(t);
    } else if let Some(t) = net_type_keyword(p) {
        nb.tok(t);
    }
    if let Ok(Some(ty)) = try_data_type_unless_name(p) {
        nb.node(ty);
    }
    let list = comma_list(p, Semicolon, "port declaration list", |p| declarator(p))?;
    nb.node(list);
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn elab_system_task<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ElabSystemTask);
    nb.tok(p.eat());
    if p.peek(0) == OpenDelim(Paren) {
        nb.node(argument_list(p)?);
    }
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn net_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::NetDecl);
    nb.tok(p.eat());
    if p.peek(0) == OpenDelim(Paren) && is_strength(p.peek(1)) {
        nb.node(net_strength(p)?);
    }
    if let Some(t) = p
        .try_eat(Keyword(Kw::Vectored))
        .or_else(|| p.try_eat(Keyword(Kw::Scalared)))
    {
        nb.tok(t);
    }
    if let Ok(Some(ty)) = try_data_type_unless_name(p) {
        nb.node(ty);
    }
    if p.peek(0) == Hashtag {
        nb.node(delay_control(p)?);
    }
    let list = comma_list(p, Semicolon, "net declaration list", |p| declarator(p))?;
    nb.node(list);
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

/// A data declaration: modifiers, a data type or implicit type, and a list
/// of declarators. Also used as a statement.
fn data_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::DataDecl);
    let mut any_modifier = false;
    loop {
        match p.peek(0) {
            Keyword(Kw::Const) | Keyword(Kw::Var) | Keyword(Kw::Static)
            | Keyword(Kw::Automatic) => {
                nb.tok(p.eat());
                any_modifier = true;
            }
            _ => break,
        }
    }
    let ty = try_data_type_unless_name(p)?;
    let explicit_type = ty.is_some();
    if let Some(ty) = ty {
        nb.node(ty);
    }
    // Without a modifier or an explicit type this is not a declaration;
    // `x = 1;` must stay an assignment.
    if !any_modifier && !explicit_type {
        let (tkn, q) = (p.peek(0), p.peek_span(0));
        p.add_diag(
            Diagnostic::error(
                DiagCode::ExpectedType,
                format!("expected a data type, found `{}`", tkn),
            )
            .span(q),
        );
        return Err(());
    }
    let list = comma_list(p, Semicolon, "declaration list", |p| declarator(p))?;
    // An empty declarator list means this wasn't a declaration at all.
    if list.child_nodes().next().is_none() {
        let q = p.peek_span(0);
        p.add_diag(
            Diagnostic::error(DiagCode::ExpectedIdentifier, "expected a variable name").span(q),
        );
        return Err(());
    }
    nb.node(list);
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn declarator<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::Declarator);
    if !p.is_ident() {
        let (tkn, q) = (p.peek(0), p.peek_span(0));
        p.add_diag(
            Diagnostic::error(
                DiagCode::ExpectedIdentifier,
                format!("expected a name, found `{}`", tkn),
            )
            .span(q),
        );
        return Err(());
    }
    nb.tok(p.eat());
    dimensions(p, &mut nb)?;
    if let Some(t) = p.try_eat(Operator(Op::Assign)) {
        nb.tok(t);
        nb.node(expr(p)?);
    }
    Ok(nb.finish(p))
}

fn dimensions<'a>(p: &mut dyn AbstractParser<'a>, nb: &mut NB<'a>) -> Reported<()> {
    while p.peek(0) == OpenDelim(Brack) {
        nb.node(dimension(p)?);
    }
    Ok(())
}

fn dimension<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::Dimension);
    flanked(p, &mut nb, Brack, |p, nb| {
        match p.peek(0) {
            CloseDelim(Brack) => {}
            Operator(Op::Mul) => {
                nb.tok(p.eat());
            }
            Dollar => {
                nb.tok(p.eat());
                if let Some(t) = p.try_eat(Colon) {
                    nb.tok(t);
                    nb.node(expr(p)?);
                }
            }
            _ => {
                nb.node(expr(p)?);
                if let Some(t) = p.try_eat(Colon) {
                    nb.tok(t);
                    nb.node(expr(p)?);
                }
            }
        }
        Ok(())
    })?;
    Ok(nb.finish(p))
}

// ----------------------------------------------------------------------------
// Types
// ----------------------------------------------------------------------------

/// Parse a data type when one is clearly present. Returns `Ok(None)` when
/// the next tokens cannot begin a type.
fn try_data_type<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<Option<&'a SyntaxNode<'a>>> {
    match p.peek(0) {
        Keyword(
            Kw::Logic | Kw::Bit | Kw::Reg | Kw::Byte | Kw::Shortint | Kw::Int | Kw::Longint
            | Kw::Integer | Kw::Time | Kw::Real | Kw::Shortreal | Kw::Realtime | Kw::String
            | Kw::Chandle | Kw::Event | Kw::Void,
        ) => data_type(p).map(Some),
        Keyword(Kw::Signed) | Keyword(Kw::Unsigned) | OpenDelim(Brack) => {
            implicit_type(p).map(Some)
        }
        Ident(_) | EscIdent(_) => data_type(p).map(Some),
        _ => Ok(None),
    }
}

/// Parse a data type unless the identifier at the cursor is actually the
/// declared name (i.e. not followed by another identifier).
fn try_data_type_unless_name<'a>(
    p: &mut dyn AbstractParser<'a>,
) -> Reported<Option<&'a SyntaxNode<'a>>> {
    if p.is_ident() {
        let takes_type = match p.peek(1) {
            Ident(_) | EscIdent(_) => true,
            Namespace => true,
            // `foo [3:0] bar` names a type only if another identifier
            // follows the dimensions.
            OpenDelim(Brack) => ident_leads_type(p),
            _ => false,
        };
        if !takes_type {
            return Ok(None);
        }
    }
    try_data_type(p)
}

/// Scan past the balanced bracket groups following an identifier to see
/// whether a further identifier makes the first one a type name.
fn ident_leads_type<'a>(p: &mut dyn AbstractParser<'a>) -> bool {
    let mut i = 1;
    while p.peek(i) == OpenDelim(Brack) {
        let mut depth = 0usize;
        loop {
            match p.peek(i) {
                OpenDelim(Brack) => depth += 1,
                CloseDelim(Brack) => {
                    depth -= 1;
                    if depth == 0 {
                        i += 1;
                        break;
                    }
                }
                Eof => return false,
                _ => {}
            }
            i += 1;
        }
    }
    matches!(p.peek(i), Ident(_) | EscIdent(_))
}

fn data_type<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    match p.peek(0) {
        Keyword(
            Kw::Logic | Kw::Bit | Kw::Reg | Kw::Byte | Kw::Shortint | Kw::Int | Kw::Longint
            | Kw::Integer | Kw::Time | Kw::Real | Kw::Shortreal | Kw::Realtime | Kw::String
            | Kw::Chandle | Kw::Event | Kw::Void,
        ) => {
            let mut nb = NB::new(SyntaxKind::DataType);
            nb.tok(p.eat());
            if let Some(t) = p
                .try_eat(Keyword(Kw::Signed))
                .or_else(|| p.try_eat(Keyword(Kw::Unsigned)))
            {
                nb.tok(t);
            }
            dimensions(p, &mut nb)?;
            Ok(nb.finish(p))
        }
        Ident(_) | EscIdent(_) => {
            let mut nb = NB::new(SyntaxKind::NamedType);
            nb.tok(p.eat());
            if let Some(t) = p.try_eat(Namespace) {
                nb.tok(t);
                nb.tok(p.expect_ident("a type name"));
            }
            dimensions(p, &mut nb)?;
            Ok(nb.finish(p))
        }
        Keyword(Kw::Signed) | Keyword(Kw::Unsigned) | OpenDelim(Brack) => implicit_type(p),
        _ => {
            let (tkn, q) = (p.peek(0), p.peek_span(0));
            p.add_diag(
                Diagnostic::error(
                    DiagCode::ExpectedType,
                    format!("expected a data type, found `{}`", tkn),
                )
                .span(q),
            );
            Err(())
        }
    }
}

fn implicit_type<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ImplicitType);
    if let Some(t) = p
        .try_eat(Keyword(Kw::Signed))
        .or_else(|| p.try_eat(Keyword(Kw::Unsigned)))
    {
        nb.tok(t);
    }
    dimensions(p, &mut nb)?;
    Ok(nb.finish(p))
}

// ----------------------------------------------------------------------------
// Modports and clocking blocks
// ----------------------------------------------------------------------------

fn modport_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ModportDecl);
    nb.tok(p.eat());
    let list = comma_list(p, Semicolon, "modport list", |p| modport_item(p))?;
    nb.node(list);
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn modport_item<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ModportItem);
    nb.tok(p.expect_ident("a modport name"));
    flanked(p, &mut nb, Paren, |p, nb| {
        let list = comma_list(p, CloseDelim(Paren), "modport port list", |p| {
            modport_port(p)
        })?;
        nb.node(list);
        Ok(())
    })?;
    Ok(nb.finish(p))
}

fn modport_port<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    match p.peek(0) {
        Keyword(Kw::Input) | Keyword(Kw::Output) | Keyword(Kw::Inout) | Keyword(Kw::Ref) => {
            if p.peek(1) == Period {
                let mut nb = NB::new(SyntaxKind::ModportExplicitPort);
                nb.tok(p.eat());
                nb.tok(p.eat());
                nb.tok(p.expect_ident("a port name"));
                flanked(p, &mut nb, Paren, |p, nb| {
                    if p.peek(0) != CloseDelim(Paren) {
                        nb.node(expr(p)?);
                    }
                    Ok(())
                })?;
                Ok(nb.finish(p))
            } else {
                let mut nb = NB::new(SyntaxKind::ModportSimplePort);
                nb.tok(p.eat());
                nb.tok(p.expect_ident("a port name"));
                Ok(nb.finish(p))
            }
        }
        Period => {
            let mut nb = NB::new(SyntaxKind::ModportExplicitPort);
            nb.tok(p.eat());
            nb.tok(p.expect_ident("a port name"));
            flanked(p, &mut nb, Paren, |p, nb| {
                if p.peek(0) != CloseDelim(Paren) {
                    nb.node(expr(p)?);
                }
                Ok(())
            })?;
            Ok(nb.finish(p))
        }
        Keyword(Kw::Import) | Keyword(Kw::Export) => {
            let mut nb = NB::new(SyntaxKind::ModportSubroutinePort);
            nb.tok(p.eat());
            if matches!(p.peek(0), Keyword(Kw::Task) | Keyword(Kw::Function)) {
                // A full method prototype.
                nb.tok(p.eat());
                if p.peek(0) != OpenDelim(Paren) && !p.is_ident() {
                    nb.node(data_type(p)?);
                } else if matches!(p.peek(1), Ident(_) | EscIdent(_)) {
                    nb.node(data_type(p)?);
                }
                nb.tok(p.expect_ident("a method name"));
                if p.peek(0) == OpenDelim(Paren) {
                    nb.node(tf_port_list(p)?);
                }
            } else {
                nb.tok(p.expect_ident("a method name"));
            }
            Ok(nb.finish(p))
        }
        Keyword(Kw::Clocking) => {
            let mut nb = NB::new(SyntaxKind::ModportClockingPort);
            nb.tok(p.eat());
            nb.tok(p.expect_ident("a clocking block name"));
            Ok(nb.finish(p))
        }
        Ident(_) | EscIdent(_) => {
            // Direction carries over from the previous port.
            let mut nb = NB::new(SyntaxKind::ModportSimplePort);
            nb.tok(p.eat());
            Ok(nb.finish(p))
        }
        _ => {
            let (tkn, q) = (p.peek(0), p.peek_span(0));
            p.add_diag(
                Diagnostic::error(
                    DiagCode::ExpectedMember,
                    format!("expected a modport port, found `{}`", tkn),
                )
                .span(q),
            );
            Err(())
        }
    }
}

fn clocking_block<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ClockingBlock);
    if let Some(t) = p
        .try_eat(Keyword(Kw::Default))
        .or_else(|| p.try_eat(Keyword(Kw::Global)))
    {
        nb.tok(t);
    }
    nb.tok(p.expect(Keyword(Kw::Clocking)));
    if p.is_ident() {
        nb.tok(p.eat());
    }
    if p.peek(0) == At {
        nb.node(event_control(p)?);
    }
    nb.tok(p.expect(Semicolon));
    let mut list = NB::new(SyntaxKind::List);
    while p.peek(0) != Keyword(Kw::Endclocking) && !p.at_eof() {
        let before = p.consumed();
        match clocking_item(p) {
            Ok(n) => {
                list.node(n);
            }
            Err(()) => {
                p.recover_balanced(&[Semicolon, Keyword(Kw::Endclocking)], false);
                if p.peek(0) == Semicolon {
                    p.skip();
                }
            }
        }
        if p.consumed() == before && p.peek(0) != Keyword(Kw::Endclocking) && !p.at_eof() {
            p.skip();
        }
    }
    nb.node(list.finish(p));
    nb.tok(p.expect(Keyword(Kw::Endclocking)));
    end_label(p, &mut nb);
    Ok(nb.finish(p))
}

fn clocking_item<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    match p.peek(0) {
        Keyword(Kw::Default) => {
            let mut nb = NB::new(SyntaxKind::DefaultSkewItem);
            nb.tok(p.eat());
            while matches!(p.peek(0), Keyword(Kw::Input) | Keyword(Kw::Output)) {
                nb.tok(p.eat());
                if let Some(skew) = clocking_skew(p)? {
                    nb.node(skew);
                }
            }
            nb.tok(p.expect(Semicolon));
            Ok(nb.finish(p))
        }
        Keyword(Kw::Input) | Keyword(Kw::Output) | Keyword(Kw::Inout) => {
            let mut nb = NB::new(SyntaxKind::ClockingItem);
            nb.tok(p.eat());
            if let Some(skew) = clocking_skew(p)? {
                nb.node(skew);
            }
            if p.peek(0) == Keyword(Kw::Output) {
                // `input [skew] output [skew]` double direction.
                nb.tok(p.eat());
                if let Some(skew) = clocking_skew(p)? {
                    nb.node(skew);
                }
            }
            let list = comma_list(p, Semicolon, "clocking variable list", |p| {
                let mut a = NB::new(SyntaxKind::ClockingAssign);
                a.tok(p.expect_ident("a clocking variable name"));
                if let Some(t) = p.try_eat(Operator(Op::Assign)) {
                    a.tok(t);
                    a.node(expr(p)?);
                }
                Ok(a.finish(p))
            })?;
            nb.node(list);
            nb.tok(p.expect(Semicolon));
            Ok(nb.finish(p))
        }
        _ => {
            let (tkn, q) = (p.peek(0), p.peek_span(0));
            p.add_diag(
                Diagnostic::error(
                    DiagCode::ExpectedMember,
                    format!("expected a clocking item, found `{}`", tkn),
                )
                .span(q),
            );
            Err(())
        }
    }
}

fn clocking_skew<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<Option<&'a SyntaxNode<'a>>> {
    let mut nb = NB::new(SyntaxKind::ClockingSkew);
    let mut any = false;
    if matches!(
        p.peek(0),
        Keyword(Kw::Posedge) | Keyword(Kw::Negedge) | Keyword(Kw::Edge)
    ) {
        nb.tok(p.eat());
        any = true;
    }
    if p.peek(0) == Hashtag {
        nb.node(delay_control(p)?);
        any = true;
    }
    if any {
        Ok(Some(nb.finish(p)))
    } else {
        Ok(None)
    }
}

fn event_control<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::EventControl);
    nb.tok(p.expect(At));
    if p.peek(0) == OpenDelim(Paren) {
        flanked(p, &mut nb, Paren, |p, nb| {
            if p.peek(0) == Operator(Op::Mul) {
                nb.tok(p.eat());
                return Ok(());
            }
            nb.node(event_expr(p)?);
            Ok(())
        })?;
    } else if p.is_ident() {
        nb.tok(p.eat());
    } else if p.peek(0) == Operator(Op::Mul) {
        nb.tok(p.eat());
    }
    Ok(nb.finish(p))
}

fn event_expr<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::EventExpr);
    loop {
        if matches!(
            p.peek(0),
            Keyword(Kw::Posedge) | Keyword(Kw::Negedge) | Keyword(Kw::Edge)
        ) {
            nb.tok(p.eat());
        }
        nb.node(expr(p)?);
        if let Some(t) = p.try_eat(Keyword(Kw::Iff)) {
            nb.tok(t);
            nb.node(expr(p)?);
        }
        match p.peek(0) {
            Keyword(Kw::Or) => {
                nb.tok(p.eat());
            }
            Comma => {
                nb.tok(p.eat());
            }
            _ => break,
        }
    }
    Ok(nb.finish(p))
}

// ----------------------------------------------------------------------------
// Assertion declarations
// ----------------------------------------------------------------------------

fn assertion_decl<'a>(
    p: &mut dyn AbstractParser<'a>,
    kind: SyntaxKind,
    end_kw: Kw,
) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(kind);
    nb.tok(p.eat());
    nb.tok(p.expect_ident("a declaration name"));
    if p.peek(0) == OpenDelim(Paren) {
        nb.node(assertion_port_list(p)?);
    }
    nb.tok(p.expect(Semicolon));
    nb.node(seq_expr(p)?);
    nb.tok(p.expect(Semicolon));
    nb.tok(p.expect(Keyword(end_kw)));
    end_label(p, &mut nb);
    Ok(nb.finish(p))
}

fn let_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::LetDecl);
    nb.tok(p.eat());
    nb.tok(p.expect_ident("a let name"));
    if p.peek(0) == OpenDelim(Paren) {
        nb.node(assertion_port_list(p)?);
    }
    nb.tok(p.expect(Operator(Op::Assign)));
    nb.node(expr(p)?);
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn assertion_port_list<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::AssertionPortList);
    flanked(p, &mut nb, Paren, |p, nb| {
        let list = comma_list(p, CloseDelim(Paren), "assertion port list", |p| {
            assertion_port(p)
        })?;
        nb.node(list);
        Ok(())
    })?;
    Ok(nb.finish(p))
}

fn assertion_port<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::AssertionPort);
    if let Some(t) = p.try_eat(Keyword(Kw::Local)) {
        nb.tok(t);
        if let Some(dir) = port_direction(p) {
            nb.tok(dir);
        }
    }
    match p.peek(0) {
        Keyword(Kw::Untyped) | Keyword(Kw::Sequence) | Keyword(Kw::Property) => {
            nb.tok(p.eat());
        }
        _ => {
            if let Ok(Some(ty)) = try_data_type_unless_name(p) {
                nb.node(ty);
            }
        }
    }
    nb.tok(p.expect_ident("an assertion port name"));
    dimensions(p, &mut nb)?;
    if let Some(t) = p.try_eat(Operator(Op::Assign)) {
        nb.tok(t);
        nb.node(seq_expr(p)?);
    }
    Ok(nb.finish(p))
}

// ----------------------------------------------------------------------------
// Tasks and functions
// ----------------------------------------------------------------------------

fn tf_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let is_func = p.peek(0) == Keyword(Kw::Function);
    let (kind, end_kw) = if is_func {
        (SyntaxKind::FunctionDecl, Kw::Endfunction)
    } else {
        (SyntaxKind::TaskDecl, Kw::Endtask)
    };
    let mut nb = NB::new(kind);
    nb.tok(p.eat());
    if let Some(t) = p
        .try_eat(Keyword(Kw::Static))
        .or_else(|| p.try_eat(Keyword(Kw::Automatic)))
    {
        nb.tok(t);
    }
    if is_func {
        // Return type, unless the name directly follows.
        if let Ok(Some(ty)) = try_data_type_unless_name(p) {
            nb.node(ty);
        }
    }
    nb.tok(p.expect_ident("a subroutine name"));
    if p.peek(0) == OpenDelim(Paren) {
        nb.node(tf_port_list(p)?);
    }
    nb.tok(p.expect(Semicolon));
    let mut list = NB::new(SyntaxKind::List);
    while p.peek(0) != Keyword(end_kw) && !p.at_eof() {
        let before = p.consumed();
        match stmt(p) {
            Ok(n) => {
                list.node(n);
            }
            Err(()) => {
                p.recover_balanced(&[Semicolon, Keyword(end_kw)], false);
                if p.peek(0) == Semicolon {
                    p.skip();
                }
            }
        }
        if p.consumed() == before && p.peek(0) != Keyword(end_kw) && !p.at_eof() {
            p.skip();
        }
    }
    nb.node(list.finish(p));
    nb.tok(p.expect(Keyword(end_kw)));
    end_label(p, &mut nb);
    Ok(nb.finish(p))
}

fn tf_port_list<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::TfPortList);
    flanked(p, &mut nb, Paren, |p, nb| {
        let list = comma_list(p, CloseDelim(Paren), "subroutine port list", |p| {
            let mut port = NB::new(SyntaxKind::TfPort);
            if let Some(dir) = port_direction(p) {
                port.tok(dir);
            }
            if let Ok(Some(ty)) = try_data_type_unless_name(p) {
                port.node(ty);
            }
            port.tok(p.expect_ident("an argument name"));
            dimensions(p, &mut port)?;
            if let Some(t) = p.try_eat(Operator(Op::Assign)) {
                port.tok(t);
                port.node(expr(p)?);
            }
            Ok(port.finish(p))
        })?;
        nb.node(list);
        Ok(())
    })?;
    Ok(nb.finish(p))
}

// ----------------------------------------------------------------------------
// Instantiations
// ----------------------------------------------------------------------------

fn instantiation<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::Instantiation);
    if !p.is_ident() {
        return Err(());
    }
    nb.tok(p.eat());
    if p.peek(0) == Hashtag {
        nb.node(param_assignments(p)?);
    }
    let list = comma_list(p, Semicolon, "instance list", |p| {
        let mut inst = NB::new(SyntaxKind::HierInstance);
        inst.tok(p.expect_ident("an instance name"));
        dimensions(p, &mut inst)?;
        inst.node(port_connection_list(p)?);
        Ok(inst.finish(p))
    })?;
    // An instantiation requires at least one instance with parentheses.
    if list.child_nodes().next().is_none() {
        return Err(());
    }
    nb.node(list);
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn param_assignments<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ParamAssignments);
    nb.tok(p.expect(Hashtag));
    flanked(p, &mut nb, Paren, |p, nb| {
        let list = comma_list(p, CloseDelim(Paren), "parameter assignments", |p| {
            connection_arg(p)
        })?;
        nb.node(list);
        Ok(())
    })?;
    Ok(nb.finish(p))
}

fn port_connection_list<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::PortConnectionList);
    flanked(p, &mut nb, Paren, |p, nb| {
        let list = comma_list(p, CloseDelim(Paren), "port connections", |p| {
            if p.peek(0) == WildcardConnect {
                let mut c = NB::new(SyntaxKind::PortConnection);
                c.tok(p.eat());
                return Ok(c.finish(p));
            }
            connection_arg(p)
        })?;
        nb.node(list);
        Ok(())
    })?;
    Ok(nb.finish(p))
}

/// A named (`.name(expr)`, `.name`) or ordered (`expr`) argument.
fn connection_arg<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    if p.peek(0) == Period {
        let mut nb = NB::new(SyntaxKind::NamedArg);
        nb.tok(p.eat());
        nb.tok(p.expect_ident("an argument name"));
        if p.peek(0) == OpenDelim(Paren) {
            flanked(p, &mut nb, Paren, |p, nb| {
                if p.peek(0) != CloseDelim(Paren) {
                    nb.node(expr(p)?);
                }
                Ok(())
            })?;
        }
        Ok(nb.finish(p))
    } else {
        let mut nb = NB::new(SyntaxKind::OrderedArg);
        nb.node(expr(p)?);
        Ok(nb.finish(p))
    }
}

// ----------------------------------------------------------------------------
// Primitives
// ----------------------------------------------------------------------------

fn primitive_decl<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::PrimitiveDecl);
    nb.tok(p.eat());
    nb.tok(p.expect_ident("a primitive name"));
    nb.node(udp_port_list(p)?);
    nb.tok(p.expect(Semicolon));
    let mut list = NB::new(SyntaxKind::List);
    loop {
        match p.peek(0) {
            Keyword(Kw::Endprimitive) | Eof => break,
            Keyword(Kw::Output) | Keyword(Kw::Input) | Keyword(Kw::Reg) => {
                let mut d = NB::new(SyntaxKind::UdpPortDecl);
                d.tok(p.eat());
                if p.peek(0) == Keyword(Kw::Reg) {
                    d.tok(p.eat());
                }
                let names = comma_list(p, Semicolon, "port declaration", |p| {
                    let mut n = NB::new(SyntaxKind::Declarator);
                    n.tok(p.expect_ident("a port name"));
                    Ok(n.finish(p))
                })?;
                d.node(names);
                d.tok(p.expect(Semicolon));
                list.node(d.finish(p));
            }
            Keyword(Kw::Initial) => {
                let mut d = NB::new(SyntaxKind::UdpInitial);
                d.tok(p.eat());
                d.tok(p.expect_ident("the output port name"));
                d.tok(p.expect(Operator(Op::Assign)));
                d.node(expr(p)?);
                d.tok(p.expect(Semicolon));
                list.node(d.finish(p));
            }
            Keyword(Kw::Table) => {
                list.node(udp_table(p)?);
            }
            _ => {
                let (tkn, q) = (p.peek(0), p.peek_span(0));
                p.add_diag(
                    Diagnostic::error(
                        DiagCode::ExpectedMember,
                        format!("expected a primitive body item, found `{}`", tkn),
                    )
                    .span(q),
                );
                p.recover_balanced(&[Semicolon, Keyword(Kw::Endprimitive)], false);
                if p.peek(0) == Semicolon {
                    p.skip();
                }
            }
        }
    }
    nb.node(list.finish(p));
    nb.tok(p.expect(Keyword(Kw::Endprimitive)));
    end_label(p, &mut nb);
    Ok(nb.finish(p))
}

fn udp_port_list<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::UdpPortList);
    flanked(p, &mut nb, Paren, |p, nb| {
        if p.peek(0) == WildcardConnect {
            nb.tok(p.eat());
            return Ok(());
        }
        let list = comma_list(p, CloseDelim(Paren), "primitive port list", |p| {
            // ANSI-style declarations carry a direction; non-ANSI lists are
            // bare names.
            let mut port = NB::new(SyntaxKind::UdpPortDecl);
            match p.peek(0) {
                Keyword(Kw::Output) | Keyword(Kw::Input) => {
                    port.tok(p.eat());
                    if p.peek(0) == Keyword(Kw::Reg) {
                        port.tok(p.eat());
                    }
                    port.tok(p.expect_ident("a port name"));
                    if let Some(t) = p.try_eat(Operator(Op::Assign)) {
                        port.tok(t);
                        port.node(expr(p)?);
                    }
                }
                _ => {
                    port.tok(p.expect_ident("a port name"));
                }
            }
            Ok(port.finish(p))
        })?;
        nb.node(list);
        Ok(())
    })?;
    Ok(nb.finish(p))
}

fn udp_table<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::UdpTable);
    nb.tok(p.expect(Keyword(Kw::Table)));
    while p.peek(0) != Keyword(Kw::Endtable) && !p.at_eof() {
        let mut row = NB::new(SyntaxKind::UdpEntry);
        while p.peek(0) != Semicolon && p.peek(0) != Keyword(Kw::Endtable) && !p.at_eof() {
            row.tok(p.eat());
        }
        if p.peek(0) == Semicolon {
            row.tok(p.eat());
        }
        nb.node(row.finish(p));
    }
    nb.tok(p.expect(Keyword(Kw::Endtable)));
    Ok(nb.finish(p))
}

// ----------------------------------------------------------------------------
// Statements
// ----------------------------------------------------------------------------

fn stmt<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    match p.peek(0) {
        Keyword(Kw::Begin) => {
            let mut nb = NB::new(SyntaxKind::BlockStmt);
            nb.tok(p.eat());
            if p.peek(0) == Colon {
                nb.tok(p.eat());
                nb.tok(p.expect_ident("a block name"));
            }
            let mut list = NB::new(SyntaxKind::List);
            while p.peek(0) != Keyword(Kw::End) && !p.at_eof() {
                let before = p.consumed();
                match stmt(p) {
                    Ok(n) => {
                        list.node(n);
                    }
                    Err(()) => {
                        p.recover_balanced(&[Semicolon, Keyword(Kw::End)], false);
                        if p.peek(0) == Semicolon {
                            p.skip();
                        }
                    }
                }
                if p.consumed() == before && p.peek(0) != Keyword(Kw::End) && !p.at_eof() {
                    p.skip();
                }
            }
            nb.node(list.finish(p));
            nb.tok(p.expect(Keyword(Kw::End)));
            end_label(p, &mut nb);
            Ok(nb.finish(p))
        }
        Keyword(Kw::Unique) | Keyword(Kw::Unique0) | Keyword(Kw::Priority) => {
            // Modifier applies to the following if or case.
            let modifier = p.eat();
            let inner = stmt(p)?;
            let mut nb = NB::new(inner.kind);
            nb.tok(modifier);
            nb.node(inner);
            Ok(nb.finish(p))
        }
        Keyword(Kw::If) => {
            let mut nb = NB::new(SyntaxKind::IfStmt);
            nb.tok(p.eat());
            flanked(p, &mut nb, Paren, |p, nb| {
                nb.node(expr(p)?);
                Ok(())
            })?;
            nb.node(stmt(p)?);
            if let Some(t) = p.try_eat(Keyword(Kw::Else)) {
                nb.tok(t);
                nb.node(stmt(p)?);
            }
            Ok(nb.finish(p))
        }
        Keyword(Kw::Case) | Keyword(Kw::Casex) | Keyword(Kw::Casez) => case_stmt(p),
        Keyword(Kw::For) => {
            let mut nb = NB::new(SyntaxKind::ForStmt);
            nb.tok(p.eat());
            flanked(p, &mut nb, Paren, |p, nb| {
                // Initializers: declaration or assignment list.
                if p.peek(0) != Semicolon {
                    let mut pp = ParallelParser::new();
                    pp.add("a declaration", |p| data_decl(p));
                    pp.add("an expression", |p| {
                        let mut s = NB::new(SyntaxKind::ExprStmt);
                        s.node(expr_stmt_body(p)?);
                        s.tok(p.expect(Semicolon));
                        Ok(s.finish(p))
                    });
                    match pp.finish(p, "a for initializer") {
                        Ok(n) => {
                            nb.node(n);
                        }
                        Err(()) => return Err(()),
                    }
                } else {
                    nb.tok(p.eat());
                }
                if p.peek(0) != Semicolon {
                    nb.node(expr(p)?);
                }
                nb.tok(p.expect(Semicolon));
                if p.peek(0) != CloseDelim(Paren) {
                    let list = comma_list(p, CloseDelim(Paren), "step expressions", |p| {
                        expr_stmt_body(p)
                    })?;
                    nb.node(list);
                }
                Ok(())
            })?;
            nb.node(stmt(p)?);
            Ok(nb.finish(p))
        }
        Keyword(Kw::Repeat) | Keyword(Kw::While) => {
            let kind = if p.peek(0) == Keyword(Kw::Repeat) {
                SyntaxKind::RepeatStmt
            } else {
                SyntaxKind::WhileStmt
            };
            let mut nb = NB::new(kind);
            nb.tok(p.eat());
            flanked(p, &mut nb, Paren, |p, nb| {
                nb.node(expr(p)?);
                Ok(())
            })?;
            nb.node(stmt(p)?);
            Ok(nb.finish(p))
        }
        Keyword(Kw::Forever) => {
            let mut nb = NB::new(SyntaxKind::ForeverStmt);
            nb.tok(p.eat());
            nb.node(stmt(p)?);
            Ok(nb.finish(p))
        }
        Keyword(Kw::Return) => {
            let mut nb = NB::new(SyntaxKind::ReturnStmt);
            nb.tok(p.eat());
            if p.peek(0) != Semicolon {
                nb.node(expr(p)?);
            }
            nb.tok(p.expect(Semicolon));
            Ok(nb.finish(p))
        }
        Keyword(Kw::Randsequence) => randsequence_stmt(p),
        Semicolon => {
            let mut nb = NB::new(SyntaxKind::NullStmt);
            nb.tok(p.eat());
            Ok(nb.finish(p))
        }
        At => {
            let mut nb = NB::new(SyntaxKind::TimingStmt);
            nb.node(event_control(p)?);
            nb.node(stmt(p)?);
            Ok(nb.finish(p))
        }
        Hashtag => {
            let mut nb = NB::new(SyntaxKind::TimingStmt);
            nb.node(delay_control(p)?);
            nb.node(stmt(p)?);
            Ok(nb.finish(p))
        }
        Keyword(
            Kw::Var | Kw::Const | Kw::Static | Kw::Automatic | Kw::Logic | Kw::Bit | Kw::Reg
            | Kw::Byte | Kw::Shortint | Kw::Int | Kw::Longint | Kw::Integer | Kw::Time | Kw::Real
            | Kw::Shortreal | Kw::Realtime | Kw::String | Kw::Chandle | Kw::Event,
        ) => data_decl(p),
        Ident(_) | EscIdent(_) => {
            let mut pp = ParallelParser::new();
            pp.add("a declaration", |p| data_decl(p));
            pp.add("an expression statement", |p| expr_stmt(p));
            pp.finish(p, "a statement")
        }
        SysIdent(_) | Literal(_) | OpenDelim(_) | Operator(_) => expr_stmt(p),
        _ => {
            let (tkn, q) = (p.peek(0), p.peek_span(0));
            p.add_diag(
                Diagnostic::error(
                    DiagCode::ExpectedStatement,
                    format!("expected a statement, found `{}` instead", tkn),
                )
                .span(q),
            );
            Err(())
        }
    }
}

fn case_stmt<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::CaseStmt);
    nb.tok(p.eat());
    flanked(p, &mut nb, Paren, |p, nb| {
        nb.node(expr(p)?);
        Ok(())
    })?;
    let mut list = NB::new(SyntaxKind::List);
    while p.peek(0) != Keyword(Kw::Endcase) && !p.at_eof() {
        let before = p.consumed();
        let item = case_item(p);
        match item {
            Ok(n) => {
                list.node(n);
            }
            Err(()) => {
                p.recover_balanced(&[Semicolon, Keyword(Kw::Endcase)], false);
                if p.peek(0) == Semicolon {
                    p.skip();
                }
            }
        }
        if p.consumed() == before && p.peek(0) != Keyword(Kw::Endcase) && !p.at_eof() {
            p.skip();
        }
    }
    nb.node(list.finish(p));
    nb.tok(p.expect(Keyword(Kw::Endcase)));
    Ok(nb.finish(p))
}

fn case_item<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut item = NB::new(SyntaxKind::CaseItem);
    if let Some(t) = p.try_eat(Keyword(Kw::Default)) {
        item.tok(t);
        if let Some(t) = p.try_eat(Colon) {
            item.tok(t);
        }
    } else {
        let exprs = comma_list(p, Colon, "case labels", |p| expr(p))?;
        item.node(exprs);
        item.tok(p.expect(Colon));
    }
    item.node(stmt(p)?);
    Ok(item.finish(p))
}

/// An expression statement body: an expression, optionally the left side of
/// an assignment (including `<=` nonblocking writes).
fn expr_stmt_body<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let lhs = expr(p)?;
    match p.peek(0) {
        Operator(op) if op.is_assignment() => {
            let mut nb = NB::new(SyntaxKind::BinaryExpr);
            nb.node(lhs);
            nb.tok(p.eat());
            nb.node(expr(p)?);
            Ok(nb.finish(p))
        }
        _ => Ok(lhs),
    }
}

fn expr_stmt<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ExprStmt);
    nb.node(expr_stmt_body(p)?);
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

// ----------------------------------------------------------------------------
// Rand-sequence statements
// ----------------------------------------------------------------------------

fn randsequence_stmt<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::RandsequenceStmt);
    nb.tok(p.eat());
    flanked(p, &mut nb, Paren, |p, nb| {
        if p.is_ident() {
            nb.tok(p.eat());
        }
        Ok(())
    })?;
    let mut list = NB::new(SyntaxKind::List);
    while p.peek(0) != Keyword(Kw::Endsequence) && !p.at_eof() {
        let before = p.consumed();
        match rs_production(p) {
            Ok(n) => {
                list.node(n);
            }
            Err(()) => {
                p.recover_balanced(&[Semicolon, Keyword(Kw::Endsequence)], false);
                if p.peek(0) == Semicolon {
                    p.skip();
                }
            }
        }
        if p.consumed() == before && p.peek(0) != Keyword(Kw::Endsequence) && !p.at_eof() {
            p.skip();
        }
    }
    nb.node(list.finish(p));
    nb.tok(p.expect(Keyword(Kw::Endsequence)));
    Ok(nb.finish(p))
}

fn rs_production<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::RsProduction);
    // Optional return type.
    if p.peek(0) == Keyword(Kw::Void) {
        let mut t = NB::new(SyntaxKind::DataType);
        t.tok(p.eat());
        nb.node(t.finish(p));
    } else if let Ok(Some(ty)) = try_data_type_unless_name(p) {
        nb.node(ty);
    }
    nb.tok(p.expect_ident("a production name"));
    if p.peek(0) == OpenDelim(Paren) {
        nb.node(tf_port_list(p)?);
    }
    nb.tok(p.expect(Colon));
    let mut rules = NB::new(SyntaxKind::SeparatedList);
    loop {
        rules.node(rs_rule(p)?);
        if let Some(t) = p.try_eat(Operator(Op::BitOr)) {
            rules.tok(t);
        } else {
            break;
        }
    }
    nb.node(rules.finish(p));
    nb.tok(p.expect(Semicolon));
    Ok(nb.finish(p))
}

fn rs_rule<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::RsRule);
    let mut items = NB::new(SyntaxKind::List);
    loop {
        match p.peek(0) {
            Semicolon | Operator(Op::BitOr) | Keyword(Kw::Endsequence) | ColonEq | Eof => break,
            _ => {
                items.node(rs_prod_item(p)?);
            }
        }
    }
    nb.node(items.finish(p));
    if p.peek(0) == ColonEq {
        let mut w = NB::new(SyntaxKind::RsWeightClause);
        w.tok(p.eat());
        w.node(primary_expr(p)?);
        if p.peek(0) == OpenDelim(Brace) {
            w.node(rs_code_block(p)?);
        }
        nb.node(w.finish(p));
    }
    Ok(nb.finish(p))
}

fn rs_prod_item<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    match p.peek(0) {
        OpenDelim(Brace) => rs_code_block(p),
        Keyword(Kw::If) => {
            let mut nb = NB::new(SyntaxKind::RsIfElse);
            nb.tok(p.eat());
            flanked(p, &mut nb, Paren, |p, nb| {
                nb.node(expr(p)?);
                Ok(())
            })?;
            nb.node(rs_prod_item(p)?);
            if let Some(t) = p.try_eat(Keyword(Kw::Else)) {
                nb.tok(t);
                nb.node(rs_prod_item(p)?);
            }
            Ok(nb.finish(p))
        }
        Keyword(Kw::Repeat) => {
            let mut nb = NB::new(SyntaxKind::RsRepeat);
            nb.tok(p.eat());
            flanked(p, &mut nb, Paren, |p, nb| {
                nb.node(expr(p)?);
                Ok(())
            })?;
            nb.node(rs_prod_item(p)?);
            Ok(nb.finish(p))
        }
        Keyword(Kw::Case) => {
            let mut nb = NB::new(SyntaxKind::RsCase);
            nb.tok(p.eat());
            flanked(p, &mut nb, Paren, |p, nb| {
                nb.node(expr(p)?);
                Ok(())
            })?;
            let mut list = NB::new(SyntaxKind::List);
            while p.peek(0) != Keyword(Kw::Endcase) && !p.at_eof() {
                let mut item = NB::new(SyntaxKind::RsCaseItem);
                if let Some(t) = p.try_eat(Keyword(Kw::Default)) {
                    item.tok(t);
                    if let Some(t) = p.try_eat(Colon) {
                        item.tok(t);
                    }
                } else {
                    let exprs = comma_list(p, Colon, "case labels", |p| expr(p))?;
                    item.node(exprs);
                    item.tok(p.expect(Colon));
                }
                item.node(rs_prod_item(p)?);
                item.tok(p.expect(Semicolon));
                list.node(item.finish(p));
            }
            nb.node(list.finish(p));
            nb.tok(p.expect(Keyword(Kw::Endcase)));
            Ok(nb.finish(p))
        }
        Ident(_) | EscIdent(_) => {
            let mut nb = NB::new(SyntaxKind::RsProdItem);
            nb.tok(p.eat());
            if p.peek(0) == OpenDelim(Paren) {
                nb.node(argument_list(p)?);
            }
            Ok(nb.finish(p))
        }
        _ => {
            let (tkn, q) = (p.peek(0), p.peek_span(0));
            p.add_diag(
                Diagnostic::error(
                    DiagCode::ExpectedMember,
                    format!("expected a production item, found `{}`", tkn),
                )
                .span(q),
            );
            Err(())
        }
    }
}

fn rs_code_block<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::RsCodeBlock);
    flanked(p, &mut nb, Brace, |p, nb| {
        let mut list = NB::new(SyntaxKind::List);
        while p.peek(0) != CloseDelim(Brace) && !p.at_eof() {
            let before = p.consumed();
            match stmt(p) {
                Ok(n) => {
                    list.node(n);
                }
                Err(()) => {
                    p.recover_balanced(&[Semicolon, CloseDelim(Brace)], false);
                    if p.peek(0) == Semicolon {
                        p.skip();
                    }
                }
            }
            if p.consumed() == before && p.peek(0) != CloseDelim(Brace) && !p.at_eof() {
                p.skip();
            }
        }
        nb.node(list.finish(p));
        Ok(())
    })?;
    Ok(nb.finish(p))
}

// ----------------------------------------------------------------------------
// Expressions
// ----------------------------------------------------------------------------

fn expr<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    expr_prec(p, 0)
}

/// The climbing precedence loop over the published operator tables.
fn expr_prec<'a>(
    p: &mut dyn AbstractParser<'a>,
    min_prec: u8,
) -> Reported<&'a SyntaxNode<'a>> {
    let mut lhs = unary_expr(p)?;
    loop {
        match p.peek(0) {
            Operator(op) => {
                let prec = match op.binary_prec() {
                    Some(prec) if prec >= min_prec => prec,
                    _ => break,
                };
                let mut nb = NB::new(SyntaxKind::BinaryExpr);
                nb.node(lhs);
                nb.tok(p.eat());
                let next_min = if op.is_right_assoc() { prec } else { prec + 1 };
                nb.node(expr_prec(p, next_min)?);
                lhs = nb.finish(p);
            }
            // The conditional operator has the lowest precedence and nests
            // to the right.
            Ternary if min_prec == 0 => {
                let mut nb = NB::new(SyntaxKind::CondExpr);
                nb.node(lhs);
                nb.tok(p.eat());
                nb.node(expr(p)?);
                nb.tok(p.expect(Colon));
                nb.node(expr(p)?);
                lhs = nb.finish(p);
            }
            _ => break,
        }
    }
    Ok(lhs)
}

fn unary_expr<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    match p.peek(0) {
        Operator(op) if op.is_unary() => {
            let mut nb = NB::new(SyntaxKind::UnaryExpr);
            nb.tok(p.eat());
            nb.node(unary_expr(p)?);
            Ok(nb.finish(p))
        }
        _ => {
            let prim = primary_expr(p)?;
            postfix_expr(p, prim)
        }
    }
}

fn primary_expr<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    match p.peek(0) {
        Literal(_) => {
            let mut nb = NB::new(SyntaxKind::LiteralExpr);
            nb.tok(p.eat());
            Ok(nb.finish(p))
        }
        Ident(_) | EscIdent(_) | Keyword(Kw::This) | Keyword(Kw::Super) | Keyword(Kw::Null) => {
            let mut nb = NB::new(SyntaxKind::IdentExpr);
            nb.tok(p.eat());
            Ok(nb.finish(p))
        }
        Dollar => {
            let mut nb = NB::new(SyntaxKind::LiteralExpr);
            nb.tok(p.eat());
            Ok(nb.finish(p))
        }
        SysIdent(_) => {
            let mut nb = NB::new(SyntaxKind::SysTfCall);
            nb.tok(p.eat());
            if p.peek(0) == OpenDelim(Paren) {
                nb.node(argument_list(p)?);
            }
            Ok(nb.finish(p))
        }
        OpenDelim(Paren) => {
            let mut nb = NB::new(SyntaxKind::ParenExpr);
            flanked(p, &mut nb, Paren, |p, nb| {
                nb.node(expr(p)?);
                Ok(())
            })?;
            Ok(nb.finish(p))
        }
        OpenDelim(Brace) => concat_expr(p),
        Keyword(
            Kw::Logic | Kw::Bit | Kw::Reg | Kw::Byte | Kw::Shortint | Kw::Int | Kw::Longint
            | Kw::Integer | Kw::Time | Kw::Real | Kw::Shortreal | Kw::Realtime | Kw::String
            | Kw::Signed | Kw::Unsigned | Kw::Void,
        ) => {
            // A keyword type in expression position is a cast target, e.g.
            // `int'(x)`.
            let ty = data_type(p)?;
            let mut nb = NB::new(SyntaxKind::CastExpr);
            nb.node(ty);
            nb.tok(p.expect(Apostrophe));
            flanked(p, &mut nb, Paren, |p, nb| {
                nb.node(expr(p)?);
                Ok(())
            })?;
            Ok(nb.finish(p))
        }
        Keyword(Kw::Posedge) | Keyword(Kw::Negedge) | Keyword(Kw::Edge) => {
            let mut nb = NB::new(SyntaxKind::EventExpr);
            nb.tok(p.eat());
            nb.node(expr(p)?);
            Ok(nb.finish(p))
        }
        _ => {
            let (tkn, q) = (p.peek(0), p.peek_span(0));
            p.add_diag(
                Diagnostic::error(
                    DiagCode::ExpectedExpression,
                    format!("expected an expression, found `{}` instead", tkn),
                )
                .span(q),
            );
            Err(())
        }
    }
}

fn concat_expr<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    // `{a, b}` is a concatenation, `{n{a, b}}` a replication. Decide after
    // the first expression.
    let open = p.expect(OpenDelim(Brace));
    if p.peek(0) == CloseDelim(Brace) {
        let mut nb = NB::new(SyntaxKind::ConcatExpr);
        nb.tok(open);
        nb.tok(p.eat());
        return Ok(nb.finish(p));
    }
    let first = expr(p)?;
    if p.peek(0) == OpenDelim(Brace) {
        let mut nb = NB::new(SyntaxKind::ReplicationExpr);
        nb.tok(open);
        nb.node(first);
        let mut inner = NB::new(SyntaxKind::ConcatExpr);
        flanked(p, &mut inner, Brace, |p, inner| {
            let list = comma_list(p, CloseDelim(Brace), "concatenation", |p| expr(p))?;
            inner.node(list);
            Ok(())
        })?;
        nb.node(inner.finish(p));
        nb.tok(p.expect(CloseDelim(Brace)));
        return Ok(nb.finish(p));
    }
    let mut nb = NB::new(SyntaxKind::ConcatExpr);
    nb.tok(open);
    let mut list = NB::new(SyntaxKind::SeparatedList);
    list.node(first);
    while let Some(comma) = p.try_eat(Comma) {
        list.tok(comma);
        list.node(expr(p)?);
    }
    nb.node(list.finish(p));
    nb.tok(p.expect(CloseDelim(Brace)));
    Ok(nb.finish(p))
}

fn postfix_expr<'a>(
    p: &mut dyn AbstractParser<'a>,
    mut lhs: &'a SyntaxNode<'a>,
) -> Reported<&'a SyntaxNode<'a>> {
    loop {
        match p.peek(0) {
            Namespace => {
                let mut nb = NB::new(SyntaxKind::ScopedName);
                nb.node(lhs);
                nb.tok(p.eat());
                nb.tok(p.expect_ident("a scoped name"));
                lhs = nb.finish(p);
            }
            Period => {
                let mut nb = NB::new(SyntaxKind::MemberExpr);
                nb.node(lhs);
                nb.tok(p.eat());
                nb.tok(p.expect_ident("a member name"));
                lhs = nb.finish(p);
            }
            OpenDelim(Brack) => {
                let mut nb = NB::new(SyntaxKind::SelectExpr);
                nb.node(lhs);
                flanked(p, &mut nb, Brack, |p, nb| {
                    nb.node(expr(p)?);
                    match p.peek(0) {
                        Colon | AddColon | SubColon => {
                            // A part select keeps its own kind for consumers.
                            nb.kind = SyntaxKind::RangeSelectExpr;
                            nb.tok(p.eat());
                            nb.node(expr(p)?);
                        }
                        _ => {}
                    }
                    Ok(())
                })?;
                lhs = nb.finish(p);
            }
            OpenDelim(Paren) => {
                let mut nb = NB::new(SyntaxKind::CallExpr);
                nb.node(lhs);
                nb.node(argument_list(p)?);
                lhs = nb.finish(p);
            }
            Apostrophe if p.peek(1) == OpenDelim(Paren) => {
                let mut nb = NB::new(SyntaxKind::CastExpr);
                nb.node(lhs);
                nb.tok(p.eat());
                flanked(p, &mut nb, Paren, |p, nb| {
                    nb.node(expr(p)?);
                    Ok(())
                })?;
                lhs = nb.finish(p);
            }
            Operator(Op::Inc) | Operator(Op::Dec) => {
                let mut nb = NB::new(SyntaxKind::UnaryExpr);
                nb.node(lhs);
                nb.tok(p.eat());
                lhs = nb.finish(p);
            }
            _ => break,
        }
    }
    Ok(lhs)
}

fn argument_list<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::ArgumentList);
    flanked(p, &mut nb, Paren, |p, nb| {
        if p.peek(0) == CloseDelim(Paren) {
            return Ok(());
        }
        let list = comma_list(p, CloseDelim(Paren), "argument list", |p| {
            connection_arg(p)
        })?;
        nb.node(list);
        Ok(())
    })?;
    Ok(nb.finish(p))
}

/// A sequence or property expression: ordinary expressions joined by cycle
/// delays, implication arrows, and the sequence keywords, optionally led by
/// a clocking event.
fn seq_expr<'a>(p: &mut dyn AbstractParser<'a>) -> Reported<&'a SyntaxNode<'a>> {
    let mut nb = NB::new(SyntaxKind::SequenceExpr);
    if p.peek(0) == At {
        nb.node(event_control(p)?);
    }
    loop {
        if p.peek(0) == DoubleHashtag {
            nb.tok(p.eat());
            nb.node(primary_expr(p)?);
        } else {
            nb.node(expr(p)?);
        }
        match p.peek(0) {
            Operator(Op::SeqImplOl)
            | Operator(Op::SeqImplNol)
            | Operator(Op::SeqFollowOl)
            | Operator(Op::SeqFollowNol) => {
                nb.tok(p.eat());
            }
            Keyword(
                Kw::Throughout | Kw::Within | Kw::Intersect | Kw::Until | Kw::UntilWith
                | Kw::Implies,
            ) => {
                nb.tok(p.eat());
            }
            DoubleHashtag => {}
            _ => break,
        }
    }
    Ok(nb.finish(p))
}
