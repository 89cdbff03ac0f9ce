//! A source file table that assigns an opaque ID to each processed buffer.
//! This keeps source locations lean and allows for simple querying of
//! information. The manager also tracks how buffers came into existence:
//! regular files, in-memory buffers, files pulled in through `include`
//! directives, and macro-expansion buffers produced by the preprocessor.
//! Locations can be unwound through expansion and include chains back to a
//! position in a real file.

use crate::name::RcStr;
use memmap2::Mmap;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const INVALID_SOURCE: Source = Source(0);
pub const INVALID_LOCATION: Location = Location {
    source: INVALID_SOURCE,
    offset: 0,
};
pub const INVALID_SPAN: Span = Span {
    source: INVALID_SOURCE,
    begin: 0,
    end: 0,
};

/// Default maximum include nesting before `IncludeDepth` is reported.
pub const DEFAULT_INCLUDE_DEPTH: usize = 64;

/// An opaque identifier for a source buffer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Source(pub u32);

impl Source {
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0 > 0 {
            write!(f, "Source({})", self.0)
        } else {
            write!(f, "Source(INVALID)")
        }
    }
}

/// A single location within a source buffer, expressed as a byte offset.
#[derive(Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct Location {
    pub source: Source,
    pub offset: usize,
}

impl Location {
    pub fn new(source: Source, offset: usize) -> Location {
        Location { source, offset }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}:{}", self.source, self.offset)
    }
}

impl From<Location> for Span {
    fn from(l: Location) -> Span {
        Span::new(l.source, l.offset, l.offset)
    }
}

/// A range of locations within a source buffer, expressed as a half-open
/// interval of bytes `[begin,end)`.
#[derive(Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct Span {
    pub source: Source,
    pub begin: usize,
    pub end: usize,
}

impl Span {
    /// Create a new span from two byte offsets.
    pub fn new(source: Source, begin: usize, end: usize) -> Span {
        Span { source, begin, end }
    }

    /// Create a new span that covers two spans, i.e. the smallest possible
    /// span that fully contains both input spans `a` and `b`.
    pub fn union<S: Into<Span>>(a: S, b: S) -> Span {
        use std::cmp::{max, min};
        let sa = a.into();
        let sb = b.into();
        if sa.source != sb.source {
            return sa;
        }
        Span {
            source: sa.source,
            begin: min(sa.begin, sb.begin),
            end: max(sa.end, sb.end),
        }
    }

    /// Modify this span to also cover the entirety of the `other` span. The
    /// `other` span must lie in the same source as `self`.
    pub fn expand<S: Into<Span>>(&mut self, other: S) -> &mut Self {
        use std::cmp::{max, min};
        let o = other.into();
        if self.source == o.source {
            self.begin = min(self.begin, o.begin);
            self.end = max(self.end, o.end);
        }
        self
    }

    /// Return the location just before the first byte in this span.
    pub fn begin(&self) -> Location {
        Location::new(self.source, self.begin)
    }

    /// Return the location just after the last byte in this span.
    pub fn end(&self) -> Location {
        Location::new(self.source, self.end)
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Whether `other` lies fully within this span.
    pub fn contains(&self, other: Span) -> bool {
        self.source == other.source && self.begin <= other.begin && other.end <= self.end
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}:{}-{}", self.source, self.begin, self.end)
    }
}

/// A wrapper that associates a span with a value.
#[derive(PartialOrd, Ord, PartialEq, Eq)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Wrap a given value together with the span it covers.
    pub fn new(value: T, span: Span) -> Spanned<T> {
        Spanned { value, span }
    }

    /// Map the spanned value, preserving the span.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Spanned<U> {
        Spanned::new(f(self.value), self.span)
    }

    pub fn as_ref(&self) -> Spanned<&T> {
        Spanned::new(&self.value, self.span)
    }
}

impl<T: fmt::Debug> fmt::Debug for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: fmt::Display> fmt::Display for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: Copy> Copy for Spanned<T> {}

impl<T: Clone> Clone for Spanned<T> {
    fn clone(&self) -> Self {
        Spanned {
            value: self.value.clone(),
            span: self.span,
        }
    }
}

impl<T: Hash> Hash for Spanned<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

/// Errors produced while resolving paths and includes.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot read `{path}`: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file `{0}` not found")]
    NotFound(PathBuf),
    #[error("include depth exceeds limit of {0}")]
    IncludeDepth(usize),
}

/// How a buffer came into existence.
#[derive(Clone)]
enum BufferKind {
    /// A regular file or in-memory buffer, possibly pulled in via `include`.
    File { included_from: Option<Location> },
    /// A macro-expansion buffer produced by the preprocessor.
    Expansion(ExpansionLink),
}

/// One step of a macro-expansion chain.
#[derive(Clone, Debug)]
pub struct ExpansionLink {
    /// The name of the macro that was expanded.
    pub macro_name: RcStr,
    /// The full span of the invocation, in the invoking buffer.
    pub call_site: Span,
    /// The span of the macro's definition.
    pub def_site: Span,
}

struct BufferInfo {
    path: RcStr,
    content: Rc<String>,
    kind: BufferKind,
    include_depth: usize,
}

/// A location resolved down to a path, line, and column in a real file.
#[derive(Clone, Debug)]
pub struct ResolvedLocation {
    pub path: RcStr,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ResolvedLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.column)
    }
}

/// A manager for source buffers and their assigned IDs. Owned by the
/// compilation; buffers live until the manager is dropped.
pub struct SourceManager {
    map: RefCell<FxHashMap<RcStr, Source>>,
    vect: RefCell<Vec<BufferInfo>>,
    include_depth_limit: usize,
}

impl SourceManager {
    pub fn new() -> SourceManager {
        SourceManager {
            map: RefCell::new(FxHashMap::default()),
            vect: RefCell::new(Vec::new()),
            include_depth_limit: DEFAULT_INCLUDE_DEPTH,
        }
    }

    pub fn with_include_depth(limit: usize) -> SourceManager {
        SourceManager {
            include_depth_limit: limit,
            ..SourceManager::new()
        }
    }

    fn push(&self, info: BufferInfo) -> Source {
        let mut vect = self.vect.borrow_mut();
        vect.push(info);
        Source(vect.len() as u32)
    }

    fn with_info<R>(&self, id: Source, f: impl FnOnce(&BufferInfo) -> R) -> R {
        let vect = self.vect.borrow();
        assert!(id.0 > 0, "invalid source");
        assert!(
            (id.0 as usize - 1) < vect.len(),
            "unknown source buffer: Source({}) >= {}",
            id.0,
            vect.len()
        );
        f(&vect[id.0 as usize - 1])
    }

    /// Open a file on disk, assigning it a buffer ID. Opening the same path
    /// twice yields the same ID.
    pub fn open(&self, path: &Path) -> Result<Source, SourceError> {
        let key = RcStr::new(&path.to_string_lossy());
        if let Some(&id) = self.map.borrow().get(&key) {
            return Ok(id);
        }
        if !path.exists() {
            return Err(SourceError::NotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| SourceError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let text = if file
            .metadata()
            .map_err(|e| SourceError::IoError {
                path: path.to_path_buf(),
                source: e,
            })?
            .len()
            == 0
        {
            String::new()
        } else {
            let map = unsafe { Mmap::map(&file) }.map_err(|e| SourceError::IoError {
                path: path.to_path_buf(),
                source: e,
            })?;
            normalize(&map)
        };
        let id = self.push(BufferInfo {
            path: key.clone(),
            content: Rc::new(text),
            kind: BufferKind::File {
                included_from: None,
            },
            include_depth: 0,
        });
        self.map.borrow_mut().insert(key, id);
        Ok(id)
    }

    /// Create a virtual buffer from the contents of a string. Future calls
    /// to `find()` with the given name will yield this buffer.
    pub fn add(&self, name: &str, content: &str) -> Source {
        let key = RcStr::new(name);
        assert!(
            !self.map.borrow().contains_key(&key),
            "add failed: source \"{}\" already exists",
            name
        );
        let id = self.push(BufferInfo {
            path: key.clone(),
            content: Rc::new(normalize(content.as_bytes())),
            kind: BufferKind::File {
                included_from: None,
            },
            include_depth: 0,
        });
        self.map.borrow_mut().insert(key, id);
        id
    }

    /// Create an anonymous virtual buffer. The buffer can only be used with
    /// the returned ID since there is no name to refer to it by.
    pub fn add_anonymous<S: Into<String>>(&self, content: S) -> Source {
        self.push(BufferInfo {
            path: RcStr::new("<anonymous>"),
            content: Rc::new(normalize(content.into().as_bytes())),
            kind: BufferKind::File {
                included_from: None,
            },
            include_depth: 0,
        })
    }

    /// Register a macro-expansion buffer. The returned source carries the
    /// expansion chain used by `expansion_chain` and location resolution.
    pub fn add_expansion(
        &self,
        macro_name: RcStr,
        text: String,
        call_site: Span,
        def_site: Span,
    ) -> Source {
        let depth = self.with_info(call_site.source, |i| i.include_depth);
        self.push(BufferInfo {
            path: RcStr::new(&format!("<expansion of `{}>", macro_name)),
            content: Rc::new(text),
            kind: BufferKind::Expansion(ExpansionLink {
                macro_name,
                call_site,
                def_site,
            }),
            include_depth: depth,
        })
    }

    /// Open an include file. The literal path is searched relative to the
    /// including file's directory, then in the user directories in order,
    /// then in the system directories. Every include event yields a fresh
    /// buffer ID recording its include site, so that cyclic inclusion is
    /// representable; nesting past the configured limit is refused with
    /// `IncludeDepth`.
    pub fn open_include(
        &self,
        literal: &str,
        from: Location,
        user_dirs: &[PathBuf],
        system_dirs: &[PathBuf],
    ) -> Result<Source, SourceError> {
        let depth = if from.source.is_valid() {
            self.with_info(from.source, |i| i.include_depth) + 1
        } else {
            1
        };
        if depth > self.include_depth_limit {
            return Err(SourceError::IncludeDepth(self.include_depth_limit));
        }

        let literal_path = Path::new(literal);
        let mut candidates = Vec::new();
        if literal_path.is_absolute() {
            candidates.push(literal_path.to_path_buf());
        } else {
            if from.source.is_valid() {
                let from_path = self.path(from.source);
                if let Some(dir) = Path::new(&*from_path).parent() {
                    candidates.push(dir.join(literal_path));
                }
            }
            for dir in user_dirs.iter().chain(system_dirs) {
                candidates.push(dir.join(literal_path));
            }
        }

        for cand in &candidates {
            if cand.exists() {
                let loaded = self.open(cand)?;
                let content = self.text(loaded);
                let path = self.path(loaded);
                return Ok(self.push(BufferInfo {
                    path,
                    content,
                    kind: BufferKind::File {
                        included_from: Some(from),
                    },
                    include_depth: depth,
                }));
            }
        }

        // Virtual buffers registered under the literal name also satisfy an
        // include, which keeps in-memory setups working.
        let virtual_hit = self.map.borrow().get(literal).copied();
        if let Some(id) = virtual_hit {
            let content = self.text(id);
            let path = self.path(id);
            return Ok(self.push(BufferInfo {
                path,
                content,
                kind: BufferKind::File {
                    included_from: Some(from),
                },
                include_depth: depth,
            }));
        }
        Err(SourceError::NotFound(literal_path.to_path_buf()))
    }

    /// Look up a previously added or opened buffer by name.
    pub fn find(&self, name: &str) -> Option<Source> {
        self.map.borrow().get(name).copied()
    }

    /// The path (or synthetic name) of a buffer.
    pub fn path(&self, id: Source) -> RcStr {
        self.with_info(id, |i| i.path.clone())
    }

    /// The full text of a buffer.
    pub fn text(&self, id: Source) -> Rc<String> {
        self.with_info(id, |i| i.content.clone())
    }

    /// Copy the text covered by a span.
    pub fn span_text(&self, span: Span) -> String {
        if !span.source.is_valid() {
            return String::new();
        }
        self.with_info(span.source, |i| {
            i.content[span.begin.min(i.content.len())..span.end.min(i.content.len())].to_string()
        })
    }

    /// The include site of a buffer, if it was pulled in via `include`.
    pub fn included_from(&self, id: Source) -> Option<Location> {
        self.with_info(id, |i| match i.kind {
            BufferKind::File { included_from } => included_from,
            BufferKind::Expansion(_) => None,
        })
    }

    /// The expansion record of a buffer, if it is a macro-expansion buffer.
    pub fn expansion_of(&self, id: Source) -> Option<ExpansionLink> {
        self.with_info(id, |i| match &i.kind {
            BufferKind::Expansion(link) => Some(link.clone()),
            BufferKind::File { .. } => None,
        })
    }

    /// Iterate the expansion chain of a macro-produced location, from the
    /// innermost expansion out to the original invocation site.
    pub fn expansion_chain(&self, mut loc: Location) -> Vec<ExpansionLink> {
        let mut chain = Vec::new();
        while loc.source.is_valid() {
            match self.expansion_of(loc.source) {
                Some(link) => {
                    loc = link.call_site.begin();
                    chain.push(link);
                }
                None => break,
            }
        }
        chain
    }

    /// Iterate the include chain of a location, from the innermost file out
    /// to the file that started the inclusion.
    pub fn include_chain(&self, loc: Location) -> Vec<Location> {
        let mut chain = Vec::new();
        let mut src = loc.source;
        while src.is_valid() {
            match self.included_from(src) {
                Some(site) => {
                    chain.push(site);
                    src = site.source;
                }
                None => break,
            }
        }
        chain
    }

    /// Unwind a location through any expansion buffers down to a position in
    /// a real file buffer.
    pub fn file_location(&self, mut loc: Location) -> Location {
        while loc.source.is_valid() {
            match self.expansion_of(loc.source) {
                Some(link) => loc = link.call_site.begin(),
                None => break,
            }
        }
        loc
    }

    /// Determine the path, line, and column at a location, unwinding macro
    /// expansions first. Lines and columns are 1-based.
    pub fn resolve(&self, loc: Location) -> ResolvedLocation {
        let loc = self.file_location(loc);
        if !loc.source.is_valid() {
            return ResolvedLocation {
                path: RcStr::new("<invalid>"),
                line: 0,
                column: 0,
            };
        }
        let path = self.path(loc.source);
        let text = self.text(loc.source);
        let upto = &text[..loc.offset.min(text.len())];
        let line = upto.bytes().filter(|&b| b == b'\n').count() + 1;
        let line_start = upto.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = upto[line_start..].chars().count() + 1;
        ResolvedLocation { path, line, column }
    }
}

impl Default for SourceManager {
    fn default() -> SourceManager {
        SourceManager::new()
    }
}

/// Decode a raw buffer into UTF-8 text, tolerating a BOM.
fn normalize(bytes: &[u8]) -> String {
    let bytes = match bytes {
        [0xef, 0xbb, 0xbf, rest @ ..] => rest,
        other => other,
    };
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_buffer() {
        let sm = SourceManager::new();
        let id = sm.add("flabberghasted.sv", "Hello\nWorld\n");
        assert_eq!(sm.find("flabberghasted.sv"), Some(id));
        assert_eq!(&*sm.text(id), "Hello\nWorld\n");
    }

    #[test]
    fn inexistent_file() {
        let sm = SourceManager::new();
        assert!(matches!(
            sm.open(Path::new("/this/path/points/nowhere")),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn bom_is_stripped() {
        let sm = SourceManager::new();
        let id = sm.add_anonymous("\u{feff}module m;".to_string());
        assert_eq!(&*sm.text(id), "module m;");
    }

    #[test]
    fn resolve_line_column() {
        let sm = SourceManager::new();
        let id = sm.add("t.sv", "abc\ndef\nghi");
        let r = sm.resolve(Location::new(id, 5));
        assert_eq!((r.line, r.column), (2, 2));
        let r = sm.resolve(Location::new(id, 0));
        assert_eq!((r.line, r.column), (1, 1));
    }

    #[test]
    fn expansion_chain_unwinds() {
        let sm = SourceManager::new();
        let file = sm.add("t.sv", "`FOO\n");
        let call = Span::new(file, 0, 4);
        let def = Span::new(file, 0, 0);
        let exp = sm.add_expansion(RcStr::new("FOO"), "1 + 2".to_string(), call, def);
        let chain = sm.expansion_chain(Location::new(exp, 2));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].call_site, call);
        let resolved = sm.resolve(Location::new(exp, 2));
        assert_eq!((resolved.line, resolved.column), (1, 1));
    }

    #[test]
    fn include_depth_limit() {
        let sm = SourceManager::with_include_depth(2);
        let a = sm.add("a.svh", "x");
        let b = sm
            .open_include("a.svh", Location::new(a, 0), &[], &[])
            .unwrap();
        let c = sm.open_include("a.svh", Location::new(b, 0), &[], &[]);
        // Depth 2 is still permitted, the third level trips the limit.
        let c = c.unwrap();
        assert!(matches!(
            sm.open_include("a.svh", Location::new(c, 0), &[], &[]),
            Err(SourceError::IncludeDepth(2))
        ));
    }
}
