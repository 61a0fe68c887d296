use qsp_core::{ErrorKind, QspError};

use crate::ast::{Expr, TextPart};
use crate::lexer::{Lexer, Token};
use crate::ParseLimits;

/// Token cursor over one logical line with a single token of lookahead.
pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<(usize, Token)>,
    pub(crate) limits: ParseLimits,
    pub(crate) line_num: usize,
    pub(crate) depth: usize,
    pub(crate) items: usize,
    pub(crate) brackets: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(text: &'a str, limits: ParseLimits, line_num: usize) -> Self {
        Self {
            lexer: Lexer::new(text),
            peeked: None,
            limits,
            line_num,
            depth: 0,
            items: 0,
            brackets: 0,
        }
    }

    pub(crate) fn line_text(&self) -> &'a str {
        self.lexer.text()
    }

    pub(crate) fn peek(&mut self) -> Result<Option<&Token>, QspError> {
        if self.peeked.is_none() {
            self.lexer.skip_whitespace();
            let start = self.lexer.position();
            if let Some(token) = self.lexer.next_token()? {
                self.peeked = Some((start, token));
            }
        }
        Ok(self.peeked.as_ref().map(|(_, token)| token))
    }

    pub(crate) fn next(&mut self) -> Result<Option<Token>, QspError> {
        self.peek()?;
        Ok(self.peeked.take().map(|(_, token)| token))
    }

    pub(crate) fn position(&mut self) -> usize {
        match &self.peeked {
            Some((start, _)) => *start,
            None => {
                self.lexer.skip_whitespace();
                self.lexer.position()
            }
        }
    }

    pub(crate) fn rewind(&mut self, pos: usize) {
        self.peeked = None;
        self.lexer.set_position(pos);
    }

    pub(crate) fn rest_text(&mut self) -> &'a str {
        let pos = self.position();
        &self.lexer.text()[pos..]
    }

    pub(crate) fn skip_to_end(&mut self) {
        self.peeked = None;
        self.lexer.set_position(usize::MAX);
    }

    pub(crate) fn at_end(&mut self) -> Result<bool, QspError> {
        Ok(self.peek()?.is_none())
    }

    pub(crate) fn peek_keyword(&mut self, word: &str) -> Result<bool, QspError> {
        Ok(matches!(self.peek()?, Some(Token::Ident(name)) if name.eq_ignore_ascii_case(word)))
    }

    pub(crate) fn peek_token(&mut self, expected: &Token) -> Result<bool, QspError> {
        Ok(self.peek()? == Some(expected))
    }

    pub(crate) fn eat(&mut self, expected: &Token) -> Result<bool, QspError> {
        if self.peek_token(expected)? {
            self.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub(crate) fn expect(
        &mut self,
        expected: &Token,
        kind: ErrorKind,
        message: &str,
    ) -> Result<(), QspError> {
        if self.eat(expected)? {
            Ok(())
        } else {
            Err(QspError::new(kind, message))
        }
    }

    pub(crate) fn enter(&mut self) -> Result<(), QspError> {
        self.depth += 1;
        if self.depth > self.limits.max_expression_depth {
            return Err(QspError::new(
                ErrorKind::StackOverflow,
                "Expression nesting is too deep.",
            ));
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn count_item(&mut self) -> Result<(), QspError> {
        self.items += 1;
        if self.items > self.limits.max_expression_items {
            return Err(QspError::new(
                ErrorKind::TooManyItems,
                "Expression has too many operands.",
            ));
        }
        Ok(())
    }
}

/// Compiles a standalone expression; trailing tokens are a syntax error.
pub fn parse_expression(text: &str, limits: &ParseLimits) -> Result<Expr, QspError> {
    let mut parser = Parser::new(text, *limits, 0);
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.peek()? {
        return Err(QspError::new(
            ErrorKind::Syntax,
            format!("Unexpected {:?} after expression.", token),
        ));
    }
    Ok(expr)
}

/// Splits text on `<<expr>>` substitutions, compiling each expression.
pub fn parse_format(text: &str, limits: &ParseLimits) -> Result<Vec<TextPart>, QspError> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("<<") {
        if start > 0 {
            parts.push(TextPart::Literal(rest[..start].to_string()));
        }
        let inner = &rest[start + 2..];
        let Some(end) = find_format_end(inner) else {
            return Err(QspError::new(
                ErrorKind::BracketNotFound,
                "Closing \">>\" not found.",
            ));
        };
        parts.push(TextPart::Subst(parse_expression(&inner[..end], limits)?));
        rest = &inner[end + 2..];
    }
    if !rest.is_empty() {
        parts.push(TextPart::Literal(rest.to_string()));
    }
    Ok(parts)
}

fn find_format_end(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (index, ch) in text.char_indices() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if text[index..].starts_with(">>") => return Some(index),
            None => {}
        }
    }
    None
}
