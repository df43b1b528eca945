use std::{fmt, ops::RangeInclusive, path::Path, sync::Arc};

#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: SourceLocation,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, location: SourceLocation) -> Token {
        Token {
            kind,
            text: text.into(),
            location,
        }
    }

    pub fn null(location: SourceLocation) -> Token {
        Token::new(TokenKind::Null, String::new(), location)
    }

    pub fn is_null(&self) -> bool {
        self.kind == TokenKind::Null
    }

    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {:?}, {})", self.kind, self.text, self.location)
    }
}

/// The position of a token or node in a source file.
///
/// `column` is the column the construct starts at. Tokens spanning multiple
/// lines (strings containing line breaks) cover every line they touch.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: Arc<Path>,
    pub line_range: RangeInclusive<usize>,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: Arc<Path>, line_range: RangeInclusive<usize>, column: usize) -> SourceLocation {
        SourceLocation {
            file,
            line_range,
            column,
        }
    }

    /// The location of the first byte of the given file.
    pub fn start_of(file: Arc<Path>) -> SourceLocation {
        SourceLocation::new(file, 1..=1, 1)
    }

    pub fn line(&self) -> usize {
        *self.line_range.start()
    }

    pub fn last_line(&self) -> usize {
        *self.line_range.end()
    }
}

impl fmt::Debug for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceLocation({}, {self})", self.file.display())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = (self.line(), self.last_line());
        if start == end {
            write!(f, "{start}:{}", self.column)
        } else {
            write!(f, "{start}-{end}:{}", self.column)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Constant,
    /// `@name`
    Attribute,
    Integer,
    Float,
    String,
    Comment,

    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    CurlyOpen,
    CurlyClose,
    Comma,
    Colon,
    ColonColon,
    Dot,
    /// `->`
    Arrow,
    /// `?`, used for optional types.
    Question,
    /// `=`
    Assign,
    /// `!!`
    Throws,
    /// `!(`
    TypeArgsOpen,

    As,
    Def,
    Do,
    Else,
    For,
    Impl,
    Import,
    Lambda,
    Let,
    Local,
    Match,
    Mut,
    Object,
    Return,
    SelfObject,
    Static,
    Throw,
    Trait,
    Try,
    /// `try!`
    TryPanic,
    When,
    Where,

    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    /// `..`
    InclusiveRange,
    /// `...`
    ExclusiveRange,

    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    PowAssign,
    ShlAssign,
    ShrAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,

    Invalid,
    /// End of the input. Returned forever once the input is exhausted.
    Null,
}

impl TokenKind {
    pub fn is_keyword(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            As | Def
                | Do
                | Else
                | For
                | Impl
                | Import
                | Lambda
                | Let
                | Local
                | Match
                | Mut
                | Object
                | Return
                | SelfObject
                | Static
                | Throw
                | Trait
                | Try
                | TryPanic
                | When
                | Where
        )
    }

    pub fn is_binary_operator(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Add | Sub
                | Mul
                | Div
                | Mod
                | Pow
                | Eq
                | Ne
                | Lt
                | Le
                | Gt
                | Ge
                | Shl
                | Shr
                | BitAnd
                | BitOr
                | BitXor
                | And
                | Or
                | InclusiveRange
                | ExclusiveRange
        )
    }

    pub fn is_binary_assign(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            AddAssign
                | SubAssign
                | MulAssign
                | DivAssign
                | ModAssign
                | PowAssign
                | ShlAssign
                | ShrAssign
                | BitAndAssign
                | BitOrAssign
                | BitXorAssign
        )
    }

    /// Tokens the parser skips.
    pub fn is_trivia(self) -> bool {
        self == TokenKind::Comment
    }
}

/// Keyword lengths, used to reject most identifiers before hashing.
pub const KEYWORD_LENGTHS: RangeInclusive<usize> = 2..=6;

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "as" => TokenKind::As,
    "def" => TokenKind::Def,
    "do" => TokenKind::Do,
    "else" => TokenKind::Else,
    "for" => TokenKind::For,
    "impl" => TokenKind::Impl,
    "import" => TokenKind::Import,
    "lambda" => TokenKind::Lambda,
    "let" => TokenKind::Let,
    "local" => TokenKind::Local,
    "match" => TokenKind::Match,
    "mut" => TokenKind::Mut,
    "object" => TokenKind::Object,
    "return" => TokenKind::Return,
    "self" => TokenKind::SelfObject,
    "static" => TokenKind::Static,
    "throw" => TokenKind::Throw,
    "trait" => TokenKind::Trait,
    "try" => TokenKind::Try,
    "when" => TokenKind::When,
    "where" => TokenKind::Where,
};

/// Returns the keyword kind of the given identifier bytes, if any.
pub fn keyword(bytes: &[u8]) -> Option<TokenKind> {
    if !KEYWORD_LENGTHS.contains(&bytes.len()) {
        return None;
    }
    let word = std::str::from_utf8(bytes).ok()?;
    KEYWORDS.get(word).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_keyword_is_found() {
        for (word, kind) in KEYWORDS.entries() {
            assert_eq!(keyword(word.as_bytes()), Some(*kind));
            assert!(kind.is_keyword());
            assert!(KEYWORD_LENGTHS.contains(&word.len()));
        }
    }

    #[test]
    fn non_keywords_are_rejected() {
        for word in ["a", "objects", "lambdas", "Self", "trai", "deff", "", "returned"] {
            assert_eq!(keyword(word.as_bytes()), None, "{word:?}");
        }
    }

    #[test]
    fn location_display() {
        let file: Arc<Path> = Arc::from(Path::new("a.aeon"));
        assert_eq!(SourceLocation::new(file.clone(), 3..=3, 7).to_string(), "3:7");
        assert_eq!(SourceLocation::new(file, 1..=4, 2).to_string(), "1-4:2");
    }
}
