use std::{path::Path, sync::Arc};

use crate::token::{self, SourceLocation, Token, TokenKind};

/// The Aeon lexer.
///
/// Tokens are produced lazily, one per call to [`Lexer::next_token`]. Once the
/// input is exhausted a [`TokenKind::Null`] token is returned forever.
pub struct Lexer<'src> {
    input: &'src [u8],
    file: Arc<Path>,
    position: usize,
    line: usize,
    column: usize,
    finished: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(input: &'src [u8], file: Arc<Path>) -> Lexer<'src> {
        let mut lexer = Lexer {
            input,
            file,
            position: 0,
            line: 1,
            column: 1,
            finished: false,
        };
        lexer.whitespace();
        lexer
    }

    /// Returns true while there is input left to tokenize.
    pub fn has_next(&self) -> bool {
        self.position < self.input.len()
    }

    /// Scans the next token, consuming the whitespace that follows it.
    pub fn next_token(&mut self) -> Token {
        self.whitespace();
        let Some(current) = self.current() else {
            return Token::null(self.location(self.line, self.column));
        };
        let token = self.scan_token(current);
        self.whitespace();
        token
    }

    fn scan_token(&mut self, current: u8) -> Token {
        use TokenKind::*;
        match current {
            b'0'..=b'9' => self.number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.identifier_or_keyword(),
            b'@' => self.attribute(),
            b'#' => self.comment(),
            b'\'' => self.string(b'\'', single_quoted_escape),
            b'"' => self.string(b'"', double_quoted_escape),
            b'(' => self.operator(1, ParenOpen),
            b')' => self.operator(1, ParenClose),
            b'[' => self.operator(1, BracketOpen),
            b']' => self.operator(1, BracketClose),
            b'{' => self.operator(1, CurlyOpen),
            b'}' => self.operator(1, CurlyClose),
            b',' => self.operator(1, Comma),
            b'?' => self.operator(1, Question),
            b':' => match self.peek(1) {
                Some(b':') => self.operator(2, ColonColon),
                _ => self.operator(1, Colon),
            },
            b'.' => match (self.peek(1), self.peek(2)) {
                (Some(b'.'), Some(b'.')) => self.operator(3, ExclusiveRange),
                (Some(b'.'), _) => self.operator(2, InclusiveRange),
                _ => self.operator(1, Dot),
            },
            b'+' => self.operator_or_assign(Add, AddAssign),
            b'-' => match self.peek(1) {
                Some(b'>') => self.operator(2, Arrow),
                _ => self.operator_or_assign(Sub, SubAssign),
            },
            b'*' => match self.peek(1) {
                Some(b'*') => match self.peek(2) {
                    Some(b'=') => self.operator(3, PowAssign),
                    _ => self.operator(2, Pow),
                },
                _ => self.operator_or_assign(Mul, MulAssign),
            },
            b'/' => self.operator_or_assign(Div, DivAssign),
            b'%' => self.operator_or_assign(Mod, ModAssign),
            b'^' => self.operator_or_assign(BitXor, BitXorAssign),
            b'&' => match self.peek(1) {
                Some(b'&') => self.operator(2, And),
                _ => self.operator_or_assign(BitAnd, BitAndAssign),
            },
            b'|' => match self.peek(1) {
                Some(b'|') => self.operator(2, Or),
                _ => self.operator_or_assign(BitOr, BitOrAssign),
            },
            b'=' => match self.peek(1) {
                Some(b'=') => self.operator(2, Eq),
                _ => self.operator(1, Assign),
            },
            b'!' => match self.peek(1) {
                Some(b'=') => self.operator(2, Ne),
                Some(b'!') => self.operator(2, Throws),
                Some(b'(') => self.operator(2, TypeArgsOpen),
                _ => self.invalid(),
            },
            b'<' => match (self.peek(1), self.peek(2)) {
                (Some(b'<'), Some(b'=')) => self.operator(3, ShlAssign),
                (Some(b'<'), _) => self.operator(2, Shl),
                (Some(b'='), _) => self.operator(2, Le),
                _ => self.operator(1, Lt),
            },
            b'>' => match (self.peek(1), self.peek(2)) {
                (Some(b'>'), Some(b'=')) => self.operator(3, ShrAssign),
                (Some(b'>'), _) => self.operator(2, Shr),
                (Some(b'='), _) => self.operator(2, Ge),
                _ => self.operator(1, Gt),
            },
            _ => self.invalid(),
        }
    }

    fn number(&mut self) -> Token {
        let (start, line, column) = self.mark();

        if self.current() == Some(b'0') && matches!(self.peek(1), Some(b'x' | b'X')) {
            self.advance_n(2);
            while self
                .current()
                .is_some_and(|byte| byte.is_ascii_hexdigit() || byte == b'_')
            {
                self.advance();
            }
            return self.produce(TokenKind::Integer, start, line, column);
        }

        let mut kind = TokenKind::Integer;
        self.digits();

        if self.current() == Some(b'.') && self.peek(1).is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
            self.digits();
            kind = TokenKind::Float;
        }

        if matches!(self.current(), Some(b'e' | b'E')) {
            match (self.peek(1), self.peek(2)) {
                (Some(digit), _) if digit.is_ascii_digit() => {
                    self.advance();
                    self.digits();
                    kind = TokenKind::Float;
                }
                (Some(b'+' | b'-'), Some(digit)) if digit.is_ascii_digit() => {
                    self.advance_n(2);
                    self.digits();
                    kind = TokenKind::Float;
                }
                _ => {}
            }
        }

        self.produce(kind, start, line, column)
    }

    /// Underscores may be used to group digits anywhere inside a number.
    fn digits(&mut self) {
        while self
            .current()
            .is_some_and(|byte| byte.is_ascii_digit() || byte == b'_')
        {
            self.advance();
        }
    }

    fn identifier_or_keyword(&mut self) -> Token {
        let (start, line, column) = self.mark();
        self.identifier_body();

        let input = self.input;
        let bytes = &input[start..self.position];
        if let Some(kind) = token::keyword(bytes) {
            if kind == TokenKind::Try
                && self.current() == Some(b'!')
                && !matches!(self.peek(1), Some(b'!' | b'(' | b'='))
            {
                self.advance();
                return self.produce(TokenKind::TryPanic, start, line, column);
            }
            return self.produce(kind, start, line, column);
        }

        // Leading underscores don't decide between identifiers and constants.
        let first = bytes.iter().find(|byte| **byte != b'_');
        let kind = if first.is_some_and(u8::is_ascii_uppercase) {
            TokenKind::Constant
        } else {
            TokenKind::Identifier
        };
        self.produce(kind, start, line, column)
    }

    fn identifier_body(&mut self) {
        while self.current().is_some_and(is_identifier_byte) {
            self.advance();
        }
    }

    fn attribute(&mut self) -> Token {
        match self.peek(1) {
            Some(byte) if byte.is_ascii_alphabetic() || byte == b'_' => {
                let (start, line, column) = self.mark();
                self.advance();
                self.identifier_body();
                self.produce(TokenKind::Attribute, start, line, column)
            }
            _ => self.invalid(),
        }
    }

    fn comment(&mut self) -> Token {
        let (_, line, column) = self.mark();
        self.advance();
        let start = self.position;
        while !matches!(self.current(), Some(b'\n') | None) {
            self.advance();
        }
        let mut text = &self.input[start..self.position];
        if let Some(stripped) = text.strip_suffix(b"\r") {
            text = stripped;
        }
        let token = Token::new(
            TokenKind::Comment,
            String::from_utf8_lossy(text),
            self.location(line, column),
        );
        if self.current() == Some(b'\n') {
            self.advance();
        }
        token
    }

    /// Scans a quoted string, decoding escape sequences with `escape`.
    ///
    /// Unknown escape sequences are kept as is, backslash included.
    fn string(&mut self, quote: u8, escape: fn(u8) -> Option<u8>) -> Token {
        let (_, line, column) = self.mark();
        self.advance();

        let mut buffer = Vec::new();
        loop {
            match self.current() {
                None => {
                    // Unterminated: the opening quote is the offending byte.
                    return Token::new(
                        TokenKind::Invalid,
                        char::from(quote).to_string(),
                        self.location(line, column),
                    );
                }
                Some(b'\\') => match self.peek(1).and_then(escape) {
                    Some(decoded) => {
                        buffer.push(decoded);
                        self.advance_n(2);
                    }
                    None => {
                        buffer.push(b'\\');
                        self.advance();
                    }
                },
                Some(byte) if byte == quote => {
                    self.advance();
                    break;
                }
                Some(byte) => {
                    buffer.push(byte);
                    self.advance();
                }
            }
        }

        // A string spanning lines is located by where it ends on its last line.
        let column = if self.line == line { column } else { self.column };
        Token::new(
            TokenKind::String,
            String::from_utf8_lossy(&buffer),
            SourceLocation::new(self.file.clone(), line..=self.line, column),
        )
    }

    fn operator(&mut self, length: usize, kind: TokenKind) -> Token {
        let (start, line, column) = self.mark();
        self.advance_n(length);
        self.produce(kind, start, line, column)
    }

    fn operator_or_assign(&mut self, operator: TokenKind, assign: TokenKind) -> Token {
        match self.peek(1) {
            Some(b'=') => self.operator(2, assign),
            _ => self.operator(1, operator),
        }
    }

    /// Produces a single invalid token and stops lexing altogether.
    fn invalid(&mut self) -> Token {
        let (start, line, column) = self.mark();
        let byte = self.input[start];
        let text = if byte.is_ascii() {
            char::from(byte).to_string()
        } else {
            format!("\\x{byte:02x}")
        };
        self.position = self.input.len();
        Token::new(TokenKind::Invalid, text, self.location(line, column))
    }

    fn whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\r' | b'\n') = self.current() {
            self.advance();
        }
    }
}

impl Lexer<'_> {
    /// Returns the current cursor state, marking the start of a token.
    fn mark(&self) -> (usize, usize, usize) {
        (self.position, self.line, self.column)
    }

    fn current(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.input.get(self.position + offset).copied()
    }

    /// Advances one byte, keeping track of lines and columns.
    fn advance(&mut self) {
        if let Some(byte) = self.current() {
            self.position += 1;
            if byte == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn advance_n(&mut self, amount: usize) {
        for _ in 0..amount {
            self.advance();
        }
    }

    fn location(&self, line: usize, column: usize) -> SourceLocation {
        SourceLocation::new(self.file.clone(), line..=line, column)
    }

    /// Produces a token whose text is the source between `start` and the
    /// cursor.
    fn produce(&self, kind: TokenKind, start: usize, line: usize, column: usize) -> Token {
        let text = String::from_utf8_lossy(&self.input[start..self.position]);
        Token::new(
            kind,
            text,
            SourceLocation::new(self.file.clone(), line..=self.line, column),
        )
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    /// Yields every token, up to and including the first [`TokenKind::Null`].
    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        self.finished = token.is_null();
        Some(token)
    }
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'?'
}

fn single_quoted_escape(byte: u8) -> Option<u8> {
    match byte {
        b'\\' => Some(b'\\'),
        b'\'' => Some(b'\''),
        _ => None,
    }
}

fn double_quoted_escape(byte: u8) -> Option<u8> {
    match byte {
        b'\\' => Some(b'\\'),
        b'"' => Some(b'"'),
        b'n' => Some(b'\n'),
        b't' => Some(b'\t'),
        b'0' => Some(b'\0'),
        b'e' => Some(0x1b),
        b'r' => Some(b'\r'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input.as_bytes(), Arc::from(Path::new("test.aeon"))).collect()
    }

    fn kinds_and_text(input: &str) -> Vec<(TokenKind, String)> {
        lex(input)
            .into_iter()
            .map(|token| (token.kind, token.text))
            .collect()
    }

    #[test]
    fn numbers_round_trip() {
        let cases = [
            ("10", TokenKind::Integer),
            ("1_000_000", TokenKind::Integer),
            ("0x1F", TokenKind::Integer),
            ("0Xff_ff", TokenKind::Integer),
            ("1.5", TokenKind::Float),
            ("1.2e1", TokenKind::Float),
            ("1e5", TokenKind::Float),
            ("1E+5", TokenKind::Float),
            ("2.5e-3", TokenKind::Float),
            ("1_0.0_1", TokenKind::Float),
        ];
        for (input, kind) in cases {
            let tokens = lex(input);
            assert_eq!(tokens.len(), 2, "{input}");
            assert_eq!(tokens[0].kind, kind, "{input}");
            assert_eq!(tokens[0].text, input);
            assert!(tokens[1].is_null());
        }
    }

    #[test]
    fn numbers_followed_by_dots() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "10.to_string" => [(Integer, "10"), (Dot, "."), (Identifier, "to_string")],
            "1..2" => [(Integer, "1"), (InclusiveRange, ".."), (Integer, "2")],
            "1...2" => [(Integer, "1"), (ExclusiveRange, "..."), (Integer, "2")],
            "1e" => [(Integer, "1"), (Identifier, "e")],
            "1e+" => [(Integer, "1"), (Identifier, "e"), (Add, "+")],
        });
        for (input, expected) in cases {
            assert_eq!(kinds_and_text(input), expected, "{input}");
        }
    }

    #[test]
    fn strings_and_escapes() {
        use TokenKind::*;
        let cases = cases!(match .. {
            r#""a\nb""# => [(String, "a\nb")],
            r#""\t\0\e\r\\\"""# => [(String, "\t\0\x1b\r\\\"")],
            r#""\q""# => [(String, "\\q")],
            r"'a\nb'" => [(String, "a\\nb")],
            r"'it\'s \\'" => [(String, "it's \\")],
            r#"'say "hi"'"# => [(String, "say \"hi\"")],
            "''" => [(String, "")],
        });
        for (input, expected) in cases {
            assert_eq!(kinds_and_text(input), expected, "{input}");
        }
    }

    #[test]
    fn escaped_newline_decodes_to_three_bytes() {
        let tokens = lex("\"a\\nb\"");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text.as_bytes(), b"a\nb");
    }

    #[test]
    fn multi_line_strings_span_lines() {
        let tokens = lex("'a\nbc' x");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].location.line_range, 1..=2);
        assert_eq!(tokens[0].location.column, 4);
        // The column continues after the content on the string's last line.
        assert_eq!(tokens[1].text, "x");
        assert_eq!(tokens[1].location.line_range, 2..=2);
        assert_eq!(tokens[1].location.column, 5);
    }

    #[test]
    fn identifiers_constants_and_keywords() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "foo Bar _baz _Quix __ empty?" => [
                (Identifier, "foo"),
                (Constant, "Bar"),
                (Identifier, "_baz"),
                (Constant, "_Quix"),
                (Identifier, "__"),
                (Identifier, "empty?"),
            ],
            "object trait self objects" => [
                (Object, "object"),
                (Trait, "trait"),
                (SelfObject, "self"),
                (Identifier, "objects"),
            ],
            "try! try!! try!(" => [
                (TryPanic, "try!"),
                (Try, "try"),
                (Throws, "!!"),
                (Try, "try"),
                (TypeArgsOpen, "!("),
            ],
            "@name @_x" => [(Attribute, "@name"), (Attribute, "@_x")],
        });
        for (input, expected) in cases {
            assert_eq!(kinds_and_text(input), expected, "{input}");
        }
    }

    #[test]
    fn keywords_are_flagged() {
        for token in lex("as def do else for impl import lambda let local match mut") {
            if !token.is_null() {
                assert!(token.is_keyword(), "{token:?}");
            }
        }
    }

    #[test]
    fn operators() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "+ += - -= -> * *= ** **=" => [
                (Add, "+"),
                (AddAssign, "+="),
                (Sub, "-"),
                (SubAssign, "-="),
                (Arrow, "->"),
                (Mul, "*"),
                (MulAssign, "*="),
                (Pow, "**"),
                (PowAssign, "**="),
            ],
            "< << <= <<= > >> >= >>=" => [
                (Lt, "<"),
                (Shl, "<<"),
                (Le, "<="),
                (ShlAssign, "<<="),
                (Gt, ">"),
                (Shr, ">>"),
                (Ge, ">="),
                (ShrAssign, ">>="),
            ],
            "= == != !! !( && || & | ^ &= |= ^= % %= / /=" => [
                (Assign, "="),
                (Eq, "=="),
                (Ne, "!="),
                (Throws, "!!"),
                (TypeArgsOpen, "!("),
                (And, "&&"),
                (Or, "||"),
                (BitAnd, "&"),
                (BitOr, "|"),
                (BitXor, "^"),
                (BitAndAssign, "&="),
                (BitOrAssign, "|="),
                (BitXorAssign, "^="),
                (Mod, "%"),
                (ModAssign, "%="),
                (Div, "/"),
                (DivAssign, "/="),
            ],
            "a::B(x)[y]{?}," => [
                (Identifier, "a"),
                (ColonColon, "::"),
                (Constant, "B"),
                (ParenOpen, "("),
                (Identifier, "x"),
                (ParenClose, ")"),
                (BracketOpen, "["),
                (Identifier, "y"),
                (BracketClose, "]"),
                (CurlyOpen, "{"),
                (Question, "?"),
                (CurlyClose, "}"),
                (Comma, ","),
            ],
        });
        for (input, expected) in cases {
            assert_eq!(kinds_and_text(input), expected, "{input}");
        }
    }

    #[test]
    fn comments_are_trimmed_and_skip_the_line_break() {
        let tokens = lex("# hello\r\nfoo");
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].text, " hello");
        assert_eq!(tokens[0].location.line_range, 1..=1);
        assert_eq!(tokens[1].text, "foo");
        assert_eq!(tokens[1].location.line_range, 2..=2);
        assert_eq!(tokens[1].location.column, 1);
    }

    #[test]
    fn locations_track_lines_and_columns() {
        let tokens = lex("let x\n  = 10");
        let positions: Vec<_> = tokens
            .iter()
            .map(|token| (token.location.line(), token.location.column))
            .collect();
        assert_eq!(positions, [(1, 1), (1, 5), (2, 3), (2, 5), (2, 7)]);
    }

    #[test]
    fn invalid_input_stops_lexing() {
        let mut lexer = Lexer::new(b"foo ` bar baz", Arc::from(Path::new("test.aeon")));
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier);
        let invalid = lexer.next_token();
        assert_eq!(invalid.kind, TokenKind::Invalid);
        assert_eq!(invalid.text, "`");
        assert_eq!(invalid.location.column, 5);
        assert!(!lexer.has_next());
        assert!(lexer.next_token().is_null());
        assert!(lexer.next_token().is_null());
    }

    #[test]
    fn single_line_strings_keep_their_start_column() {
        let tokens = lex("x 'abc'");
        assert_eq!(tokens[1].location.line_range, 1..=1);
        assert_eq!(tokens[1].location.column, 3);
    }

    #[test]
    fn non_ascii_invalid_bytes_are_kept_as_one_byte() {
        let mut lexer = Lexer::new(b"a \xff b", Arc::from(Path::new("test.aeon")));
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier);
        let invalid = lexer.next_token();
        assert_eq!(invalid.kind, TokenKind::Invalid);
        assert_eq!(invalid.text, "\\xff");
        assert_eq!(invalid.location.column, 3);
        assert!(lexer.next_token().is_null());
    }

    #[test]
    fn unterminated_strings_are_invalid() {
        use TokenKind::*;
        assert_eq!(kinds_and_text("a 'abc"), cases!(@@tokens [(Identifier, "a"), (Invalid, "'")]));
        assert_eq!(kinds_and_text("! x"), cases!(@@tokens [(Invalid, "!")]));
        assert_eq!(kinds_and_text("@ x"), cases!(@@tokens [(Invalid, "@")]));
    }

    #[test]
    fn whitespace_only_input_has_no_tokens() {
        let lexer = Lexer::new(b" \t\r\n ", Arc::from(Path::new("test.aeon")));
        assert!(!lexer.has_next());
        assert_eq!(lexer.count(), 1);
    }

    /// Expected token lists, terminated by the null token.
    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, $text:expr)),* $(,)?]),* $(,)?
        }) => {{
            vec![$((
                $str,
                cases!(@@tokens [$(($kind, $text)),*]),
            )),*]
        }};
        (@@tokens [$(($kind:expr, $text:expr)),*]) => {{
            let mut tokens: Vec<(TokenKind, std::string::String)> =
                vec![$(($kind, std::string::String::from($text))),*];
            tokens.push((TokenKind::Null, std::string::String::new()));
            tokens
        }};
    }
    use cases;
}
