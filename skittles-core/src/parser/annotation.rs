//! Type annotations: `number`, `Record<K, V>`, `T[]`, `[A, B]`, `{ a: T }`.

use crate::ast::{ObjectTypeField, TypeExpr};
use crate::error::ParseError;
use crate::lexer::TokenKind;

use super::cursor::Cursor;

pub fn parse_type(cursor: &mut Cursor<'_>) -> Result<TypeExpr, ParseError> {
    let mut ty = parse_primary_type(cursor)?;
    while cursor.check(TokenKind::LBracket) && cursor.check_nth(1, TokenKind::RBracket) {
        cursor.advance();
        cursor.advance();
        ty = TypeExpr::Array(Box::new(ty));
    }
    if cursor.check(TokenKind::Pipe) {
        return Err(cursor.error_at_current("union types are not supported"));
    }
    Ok(ty)
}

fn parse_primary_type(cursor: &mut Cursor<'_>) -> Result<TypeExpr, ParseError> {
    let start = cursor.peek().span;
    match cursor.peek_kind() {
        TokenKind::Ident => {
            let name = cursor.consume_identifier("expected type name")?;
            let mut args = Vec::new();
            if cursor.match_token(TokenKind::Less) {
                loop {
                    args.push(parse_type(cursor)?);
                    if !cursor.match_token(TokenKind::Comma) {
                        break;
                    }
                }
                cursor.consume(TokenKind::Greater, "expected `>` to close type arguments")?;
            }
            Ok(TypeExpr::Named {
                name,
                args,
                span: start.to(cursor.previous().span),
            })
        }
        TokenKind::LBracket => {
            cursor.advance();
            let mut items = Vec::new();
            while !cursor.check(TokenKind::RBracket) {
                items.push(parse_type(cursor)?);
                if !cursor.match_token(TokenKind::Comma) {
                    break;
                }
            }
            cursor.consume(TokenKind::RBracket, "expected `]` to close tuple type")?;
            Ok(TypeExpr::Tuple(items, start.to(cursor.previous().span)))
        }
        TokenKind::LBrace => {
            cursor.advance();
            let fields = parse_object_fields(cursor)?;
            Ok(TypeExpr::Object(fields, start.to(cursor.previous().span)))
        }
        TokenKind::LParen => {
            cursor.advance();
            let inner = parse_type(cursor)?;
            cursor.consume(TokenKind::RParen, "expected `)`")?;
            Ok(inner)
        }
        _ => Err(cursor.error_at_current("expected type")),
    }
}

/// Fields of `{ ... }` after the opening brace, through the closing one.
/// Used for object types and `interface` bodies alike.
pub fn parse_object_fields(cursor: &mut Cursor<'_>) -> Result<Vec<ObjectTypeField>, ParseError> {
    let mut fields = Vec::new();
    while !cursor.check(TokenKind::RBrace) {
        cursor.match_word("readonly");
        let name_token = cursor.peek();
        let name = cursor.consume_member_name()?;
        if cursor.check(TokenKind::Question) {
            return Err(cursor.error_at_current("optional fields are not supported"));
        }
        cursor.consume(TokenKind::Colon, "expected `:` after field name")?;
        let ty = parse_type(cursor)?;
        if fields.iter().any(|f: &ObjectTypeField| f.name == name) {
            return Err(cursor.error_at(name_token.span, &format!("duplicate field `{name}`")));
        }
        fields.push(ObjectTypeField { name, ty });
        if !(cursor.match_token(TokenKind::Semi) || cursor.match_token(TokenKind::Comma))
            && !cursor.check(TokenKind::RBrace)
        {
            return Err(cursor.error_at_current("expected `;` or `}` after field"));
        }
    }
    cursor.consume(TokenKind::RBrace, "expected `}`")?;
    Ok(fields)
}
