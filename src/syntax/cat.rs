//! The categorizing lexer. Divides the input text into coarse groups of
//! tokens: newlines, whitespace, digit runs, text runs, and individual
//! symbols. The spans of the emitted tokens can be concatenated to arrive at
//! the original buffer, i.e. no information is lost at this stage.

use shale_common::source::{Source, Span};
use std::rc::Rc;

/// The different categories a character run can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatTokenKind {
    Newline,
    Whitespace,
    Digits,
    Text,
    Symbol(char),
    Eof,
}

pub use self::CatTokenKind::*;

/// The categorizing lexer over one source buffer. Maintains a two-character
/// window so that callers can match digraphs cheaply.
pub struct Cat {
    source: Source,
    text: Rc<String>,
    pos: usize,
}

impl Cat {
    /// Create a new categorizing lexer over a buffer, starting at the given
    /// byte offset.
    pub fn new(source: Source, text: Rc<String>, offset: usize) -> Cat {
        Cat {
            source,
            text,
            pos: offset,
        }
    }

    /// The byte offset of the next character to be categorized.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Restart categorization at the given byte offset.
    pub fn seek(&mut self, offset: usize) {
        self.pos = offset.min(self.text.len());
    }

    /// The buffer this lexer reads.
    pub fn source(&self) -> Source {
        self.source
    }

    /// The full text of the buffer this lexer reads.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn text_rc(&self) -> Rc<String> {
        self.text.clone()
    }

    fn peek_char(&self, at: usize) -> Option<char> {
        self.text[at..].chars().next()
    }

    /// Produce the next coarse token. At the end of the input this keeps
    /// producing zero-width `Eof` tokens.
    pub fn next(&mut self) -> (CatTokenKind, Span) {
        let begin = self.pos;
        let c = match self.peek_char(begin) {
            Some(c) => c,
            None => return (Eof, Span::new(self.source, begin, begin)),
        };
        let kind = match c {
            '\n' => {
                self.pos = begin + 1;
                return (Newline, Span::new(self.source, begin, self.pos));
            }
            '\r' => {
                // Treat `\r\n` as a single newline token so that line
                // endings survive the round trip on any platform.
                self.pos = begin + 1;
                if self.peek_char(self.pos) == Some('\n') {
                    self.pos += 1;
                }
                return (Newline, Span::new(self.source, begin, self.pos));
            }
            c if c.is_whitespace() => {
                self.pos += c.len_utf8();
                while let Some(c) = self.peek_char(self.pos) {
                    if c.is_whitespace() && c != '\n' && c != '\r' {
                        self.pos += c.len_utf8();
                    } else {
                        break;
                    }
                }
                Whitespace
            }
            c if c.is_ascii_digit() => {
                self.pos += 1;
                while let Some(c) = self.peek_char(self.pos) {
                    if c.is_ascii_digit() {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                Digits
            }
            c if c.is_alphabetic() => {
                self.pos += c.len_utf8();
                while let Some(c) = self.peek_char(self.pos) {
                    if c.is_alphanumeric() {
                        self.pos += c.len_utf8();
                    } else {
                        break;
                    }
                }
                Text
            }
            c => {
                self.pos += c.len_utf8();
                return (Symbol(c), Span::new(self.source, begin, self.pos));
            }
        };
        (kind, Span::new(self.source, begin, self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shale_common::source::SourceManager;

    fn tokens(input: &str) -> Vec<(CatTokenKind, String)> {
        let sm = SourceManager::new();
        let src = sm.add_anonymous(input.to_string());
        let mut cat = Cat::new(src, sm.text(src), 0);
        let mut out = Vec::new();
        loop {
            let (kind, span) = cat.next();
            if kind == Eof {
                break;
            }
            out.push((kind, sm.span_text(span)));
        }
        out
    }

    #[test]
    fn categorize_mixed() {
        let toks = tokens("foo 42;\n");
        assert_eq!(
            toks,
            vec![
                (Text, "foo".to_string()),
                (Whitespace, " ".to_string()),
                (Digits, "42".to_string()),
                (Symbol(';'), ";".to_string()),
                (Newline, "\n".to_string()),
            ]
        );
    }

    #[test]
    fn lossless_concat() {
        let input = "Löwe 老虎 Léopard\r\n'b0 $x";
        let sm = SourceManager::new();
        let src = sm.add_anonymous(input.to_string());
        let mut cat = Cat::new(src, sm.text(src), 0);
        let mut rebuilt = String::new();
        loop {
            let (kind, span) = cat.next();
            if kind == Eof {
                break;
            }
            rebuilt.push_str(&sm.span_text(span));
        }
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn crlf_is_one_newline() {
        let toks = tokens("a\r\nb");
        assert_eq!(toks[1], (Newline, "\r\n".to_string()));
    }
}
