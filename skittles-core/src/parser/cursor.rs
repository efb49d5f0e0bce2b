use std::path::Path;

use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};
use crate::span::{Span, line_col};

/// Position in a token stream plus the source it was lexed from.
///
/// The stream always ends with an `Eof` token and the cursor never moves
/// past it.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    source: &'a str,
    tokens: &'a [Token],
    current: usize,
    file: &'a Path,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str, tokens: &'a [Token], file: &'a Path) -> Self {
        Cursor {
            source,
            tokens,
            current: 0,
            file,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn file(&self) -> &'a Path {
        self.file
    }

    pub fn position(&self) -> usize {
        self.current
    }

    pub fn seek(&mut self, position: usize) {
        self.current = position.min(self.tokens.len().saturating_sub(1));
    }

    pub fn peek(&self) -> Token {
        self.peek_nth(0)
    }

    pub fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    /// Token `n` places ahead, or the final `Eof`.
    pub fn peek_nth(&self, n: usize) -> Token {
        let last = self.tokens.len().saturating_sub(1);
        self.tokens
            .get((self.current + n).min(last))
            .copied()
            .unwrap_or(Token {
                kind: TokenKind::Eof,
                span: Span::default(),
            })
    }

    pub fn previous(&self) -> Token {
        match self.current.checked_sub(1) {
            Some(index) => self.tokens[index],
            None => self.peek(),
        }
    }

    pub fn advance(&mut self) -> Token {
        let token = self.peek();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    pub fn is_at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub fn check_nth(&self, n: usize, kind: TokenKind) -> bool {
        self.peek_nth(n).kind == kind
    }

    /// Current token is the contextual word `word`.
    pub fn check_word(&self, word: &str) -> bool {
        self.check_word_nth(0, word)
    }

    pub fn check_word_nth(&self, n: usize, word: &str) -> bool {
        let token = self.peek_nth(n);
        token.kind == TokenKind::Ident && token.text(self.source) == word
    }

    pub fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn match_word(&mut self, word: &str) -> bool {
        if self.check_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    pub fn consume_identifier(&mut self, message: &str) -> Result<String, ParseError> {
        let token = self.consume(TokenKind::Ident, message)?;
        Ok(self.text(token).to_string())
    }

    /// Member names after `.` may be reserved words (`x.delete`).
    pub fn consume_member_name(&mut self) -> Result<String, ParseError> {
        let token = self.peek();
        let text = self.text(token);
        let word_like = text
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_' || b == b'$');
        if matches!(token.kind, TokenKind::Ident) || (word_like && token.kind != TokenKind::Eof) {
            self.advance();
            Ok(text.to_string())
        } else {
            Err(self.error_at_current("expected member name"))
        }
    }

    pub fn text(&self, token: Token) -> &'a str {
        token.span.text(self.source)
    }

    /// Tokens `n - 1` and `n` touch with no whitespace between them.
    pub fn adjacent(&self, n: usize) -> bool {
        n > 0 && self.peek_nth(n - 1).span.end == self.peek_nth(n).span.start
    }

    /// Skip a bracketed region starting at the current opener, including
    /// the matching closer.
    pub fn skip_balanced(&mut self) -> Result<(), ParseError> {
        let start = self.peek();
        let mut depth = 0usize;
        loop {
            let token = self.advance();
            match token.kind {
                TokenKind::LParen | TokenKind::LBrace | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(());
                    }
                }
                TokenKind::Eof => return Err(self.error_at(start.span, "unbalanced brackets")),
                _ => {}
            }
            if depth == 0 {
                return Ok(());
            }
        }
    }

    /// Skip tokens up to and including the next `;` at bracket depth zero,
    /// or up to (not including) a closing `}` of the enclosing block.
    pub fn skip_statement(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek_kind() {
                TokenKind::Semi => {
                    self.advance();
                    return Ok(());
                }
                TokenKind::RBrace | TokenKind::Eof => return Ok(()),
                TokenKind::LParen | TokenKind::LBrace | TokenKind::LBracket => {
                    self.skip_balanced()?;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub fn error_at_current(&self, message: &str) -> ParseError {
        let token = self.peek();
        let message = if token.kind == TokenKind::Eof {
            format!("{message} at end of file")
        } else {
            format!("{message}, found `{}`", self.text(token))
        };
        self.error_at(token.span, &message)
    }

    pub fn error_at(&self, span: Span, message: &str) -> ParseError {
        let (line, column) = line_col(self.source, span.start);
        ParseError {
            file: self.file.to_path_buf(),
            line,
            column,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    #[test]
    fn skips_balanced_regions() {
        let source = "{ a { b } c } d";
        let tokens = lex(source).expect("lex");
        let mut cursor = Cursor::new(source, &tokens, Path::new("a.ts"));
        cursor.skip_balanced().expect("balanced");
        assert_eq!(cursor.text(cursor.peek()), "d");
    }

    #[test]
    fn reports_location_of_current_token() {
        let source = "class\n  42";
        let tokens = lex(source).expect("lex");
        let mut cursor = Cursor::new(source, &tokens, Path::new("a.ts"));
        cursor.advance();
        let err = cursor.error_at_current("expected class name");
        assert_eq!((err.line, err.column), (2, 3));
        assert!(err.message.contains("found `42`"));
    }

    #[test]
    fn detects_adjacent_tokens() {
        let source = "a >> b > > c";
        let tokens = lex(source).expect("lex");
        let mut cursor = Cursor::new(source, &tokens, Path::new("a.ts"));
        cursor.advance();
        assert!(cursor.adjacent(1));
        cursor.seek(4);
        assert!(!cursor.adjacent(1));
    }
}
