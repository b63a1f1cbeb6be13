//! Token definitions for the spec-file lexer.
//!
//! Every token carries the 1-based line and column where it started so
//! the parser can report `file:line:col` errors.

/// Tag following a `>>>` block opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Bare `>>>`: an assertion block.
    Assertions,
    /// `>>>capture`
    Capture,
    /// `>>>multipart`
    Multipart,
    /// `>>>graphql`
    GraphQl,
    /// `>>>variables` (GraphQL variables JSON)
    Variables,
    /// `>>>form`
    Form,
}

impl BlockKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "" => Some(Self::Assertions),
            "capture" => Some(Self::Capture),
            "multipart" => Some(Self::Multipart),
            "graphql" => Some(Self::GraphQl),
            "variables" => Some(Self::Variables),
            "form" => Some(Self::Form),
            _ => None,
        }
    }
}

/// Lexical token kinds over the spec-file grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// End of line.
    Newline,
    /// `// …` or `# …` comment text (without the marker).
    Comment(String),
    /// `###` with its optional free-text name.
    Separator(Option<String>),
    /// `# @name value` or `@name value`; `hashed` records the `#` prefix
    /// so the parser can tell file variables from request annotations.
    Annotation {
        name: String,
        value: String,
        hashed: bool,
    },
    /// `>>>` with its raw block tag text (empty for assertion blocks).
    /// The parser maps the tag through [`BlockKind::from_tag`] so unknown
    /// tags are reported with their position.
    BlockStart(String),
    /// `<<<`
    BlockEnd,
    /// Symbolic comparison operator: `==`, `!=`, `>`, `>=`, `<`, `<=`.
    Operator(String),
    /// `{{…}}` reference, inner text preserved verbatim.
    VariableRef(String),
    /// Quoted string (single or double quotes), unescaped.
    Str(String),
    /// Numeric literal.
    Number(f64),
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
    LBracket,
    RBracket,
    Comma,
    Dot,
    /// Bare word: identifiers, paths, word operators, method names.
    Word(String),
    /// End of input.
    Eof,
}

/// A token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}
