//! Lexer for the contract-authoring language.

use thiserror::Error;

use crate::span::Span;

/// Kind of a token produced by the lexer.
///
/// Only reserved words get their own kind. Contextual words such as
/// `public`, `readonly`, `constructor` or `of` stay identifiers and are
/// recognised by the parser from their text.
///
/// `>` is always emitted on its own; the expression parser joins adjacent
/// `>` / `=` tokens into `>=`, `>>` and `>>=` so that nested generic types
/// such as `Record<address, Record<address, number>>` close correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Special
    Eof,

    // Identifiers and literals
    Ident,
    Number,
    String,

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Semi,     // ;
    Colon,    // :
    Dot,      // .
    Question, // ?
    At,       // @

    // Operators
    Equal,       // =
    EqEq,        // ==
    EqEqEq,      // ===
    NotEq,       // !=
    NotEqEq,     // !==
    Less,        // <
    LessEq,      // <=
    Greater,     // >
    Plus,        // +
    Minus,       // -
    Star,        // *
    StarStar,    // **
    Slash,       // /
    Percent,     // %
    PlusPlus,    // ++
    MinusMinus,  // --
    PlusEq,      // +=
    MinusEq,     // -=
    StarEq,      // *=
    StarStarEq,  // **=
    SlashEq,     // /=
    PercentEq,   // %=
    AmpAmp,      // &&
    PipePipe,    // ||
    Bang,        // !
    Amp,         // &
    Pipe,        // |
    Caret,       // ^
    Tilde,       // ~
    ShiftLeft,   // <<
    ShiftLeftEq, // <<=
    AmpEq,       // &=
    PipeEq,      // |=
    CaretEq,     // ^=
    FatArrow,    // =>
    QuestionDot, // ?.
    Nullish,     // ??

    // Keywords
    Class,
    Extends,
    Implements,
    Interface,
    Enum,
    Const,
    Let,
    Var,
    Function,
    Return,
    If,
    Else,
    For,
    While,
    Do,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Throw,
    New,
    This,
    Super,
    True,
    False,
    Try,
    Catch,
    Finally,
    Delete,
    Import,
    Export,
}

/// A single token with its kind and span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn text(self, source: &str) -> &str {
        self.span.text(source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("lex error at byte {position}: {message}")]
pub struct LexError {
    pub position: u32,
    pub message: String,
}

/// Lex a source string into tokens, terminated by an `Eof` token.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        chars: source.as_bytes(),
        source,
        index: 0,
    };
    lexer.run()
}

struct Lexer<'src> {
    source: &'src str,
    chars: &'src [u8],
    index: usize,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) {
                self.index += 1;
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'/') {
                self.skip_line_comment();
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'*') {
                self.skip_block_comment()?;
                continue;
            }

            let start = self.index;
            let kind = match ch {
                b'"' | b'\'' => self.lex_string(ch)?,
                b'`' => return Err(self.error(start, "template literals are not supported")),
                b'0'..=b'9' => self.lex_number(),
                _ if is_ident_start(ch) => self.lex_ident_or_keyword(),
                _ => self.lex_punct(ch)?,
            };
            tokens.push(Token {
                kind,
                span: Span::new(start as u32, self.index as u32),
            });
        }

        let end = self.source.len() as u32;
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::new(end, end),
        });
        Ok(tokens)
    }

    fn lex_punct(&mut self, ch: u8) -> Result<TokenKind, LexError> {
        use TokenKind::*;

        let start = self.index;
        // Longest match first.
        let candidates: &[(&str, TokenKind)] = &[
            ("===", EqEqEq),
            ("!==", NotEqEq),
            ("**=", StarStarEq),
            ("<<=", ShiftLeftEq),
            ("==", EqEq),
            ("!=", NotEq),
            ("<=", LessEq),
            ("<<", ShiftLeft),
            ("**", StarStar),
            ("++", PlusPlus),
            ("--", MinusMinus),
            ("+=", PlusEq),
            ("-=", MinusEq),
            ("*=", StarEq),
            ("/=", SlashEq),
            ("%=", PercentEq),
            ("&&", AmpAmp),
            ("||", PipePipe),
            ("&=", AmpEq),
            ("|=", PipeEq),
            ("^=", CaretEq),
            ("=>", FatArrow),
            ("?.", QuestionDot),
            ("??", Nullish),
        ];
        let rest = &self.chars[start..];
        for (text, kind) in candidates {
            if rest.starts_with(text.as_bytes()) {
                self.index += text.len();
                return Ok(*kind);
            }
        }

        let kind = match ch {
            b'(' => LParen,
            b')' => RParen,
            b'{' => LBrace,
            b'}' => RBrace,
            b'[' => LBracket,
            b']' => RBracket,
            b',' => Comma,
            b';' => Semi,
            b':' => Colon,
            b'.' => Dot,
            b'?' => Question,
            b'@' => At,
            b'=' => Equal,
            b'<' => Less,
            b'>' => Greater,
            b'+' => Plus,
            b'-' => Minus,
            b'*' => Star,
            b'/' => Slash,
            b'%' => Percent,
            b'!' => Bang,
            b'&' => Amp,
            b'|' => Pipe,
            b'^' => Caret,
            b'~' => Tilde,
            _ => return Err(self.error(start, "unexpected character")),
        };
        self.index += 1;
        Ok(kind)
    }

    fn lex_string(&mut self, quote: u8) -> Result<TokenKind, LexError> {
        let start = self.index;
        self.index += 1;
        while let Some(ch) = self.peek_char() {
            match ch {
                b'\\' => {
                    // Skip over escape sequence: backslash + next char (if any)
                    self.index += 1;
                    if self.peek_char().is_some() {
                        self.index += 1;
                    }
                }
                b'\n' => break,
                _ if ch == quote => {
                    self.index += 1;
                    return Ok(TokenKind::String);
                }
                _ => self.index += 1,
            }
        }
        Err(self.error(start, "unterminated string literal"))
    }

    fn lex_number(&mut self) -> TokenKind {
        let hex = self.peek_char() == Some(b'0') && matches!(self.peek_next(), Some(b'x' | b'X'));
        if hex {
            self.index += 2;
            self.eat_while(|ch| ch.is_ascii_hexdigit() || ch == b'_');
        } else {
            self.eat_while(|ch| ch.is_ascii_digit() || ch == b'_');
            if self.peek_char() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
                self.index += 1;
                self.eat_while(|ch| ch.is_ascii_digit() || ch == b'_');
            }
            if matches!(self.peek_char(), Some(b'e' | b'E')) {
                let sign = matches!(self.peek_next(), Some(b'+' | b'-'));
                let digit_at = if sign { self.index + 2 } else { self.index + 1 };
                if self.chars.get(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                    self.index = digit_at;
                    self.eat_while(|ch| ch.is_ascii_digit());
                }
            }
        }
        if self.peek_char() == Some(b'n') {
            self.index += 1;
        }
        TokenKind::Number
    }

    fn lex_ident_or_keyword(&mut self) -> TokenKind {
        let start = self.index;
        self.eat_while(is_ident_continue);
        let text = &self.source[start..self.index];

        match text {
            "class" => TokenKind::Class,
            "extends" => TokenKind::Extends,
            "implements" => TokenKind::Implements,
            "interface" => TokenKind::Interface,
            "enum" => TokenKind::Enum,
            "const" => TokenKind::Const,
            "let" => TokenKind::Let,
            "var" => TokenKind::Var,
            "function" => TokenKind::Function,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "switch" => TokenKind::Switch,
            "case" => TokenKind::Case,
            "default" => TokenKind::Default,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "throw" => TokenKind::Throw,
            "new" => TokenKind::New,
            "this" => TokenKind::This,
            "super" => TokenKind::Super,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "finally" => TokenKind::Finally,
            "delete" => TokenKind::Delete,
            "import" => TokenKind::Import,
            "export" => TokenKind::Export,
            _ => TokenKind::Ident,
        }
    }

    fn skip_line_comment(&mut self) {
        self.eat_while(|ch| ch != b'\n');
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start = self.index;
        self.index += 2;
        while self.index < self.chars.len() {
            if self.chars[self.index] == b'*' && self.peek_next() == Some(b'/') {
                self.index += 2;
                return Ok(());
            }
            self.index += 1;
        }
        Err(self.error(start, "unterminated block comment"))
    }

    fn eat_while(&mut self, predicate: impl Fn(u8) -> bool) {
        while let Some(ch) = self.peek_char() {
            if !predicate(ch) {
                break;
            }
            self.index += 1;
        }
    }

    fn error(&self, position: usize, message: &str) -> LexError {
        LexError {
            position: position as u32,
            message: message.to_string(),
        }
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_' || ch == b'$'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_class_header() {
        assert_eq!(
            kinds("export class Token extends Base {"),
            vec![
                TokenKind::Export,
                TokenKind::Class,
                TokenKind::Ident,
                TokenKind::Extends,
                TokenKind::Ident,
                TokenKind::LBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn prefers_longest_operator() {
        assert_eq!(
            kinds("a **= b !== c"),
            vec![
                TokenKind::Ident,
                TokenKind::StarStarEq,
                TokenKind::Ident,
                TokenKind::NotEqEq,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keeps_closing_angles_separate() {
        assert_eq!(
            kinds("Record<a, Record<b, c>>"),
            vec![
                TokenKind::Ident,
                TokenKind::Less,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::Ident,
                TokenKind::Less,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::Ident,
                TokenKind::Greater,
                TokenKind::Greater,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            kinds("// line\n/* block */ x"),
            vec![TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn lexes_number_forms() {
        let source = "1_000 0xff 1e18 25n 1.5e3";
        let tokens = lex(source).expect("lex");
        let texts: Vec<&str> = tokens[..5].iter().map(|t| t.text(source)).collect();
        assert_eq!(texts, vec!["1_000", "0xff", "1e18", "25n", "1.5e3"]);
    }

    #[test]
    fn rejects_template_literals() {
        let err = lex("`hi`").unwrap_err();
        assert_eq!(err.position, 0);
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(lex("'abc").is_err());
    }
}
