use qsp_core::{ErrorKind, QspError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Number(i64),
    Str(String),
    Code(String),
    Ident(String),
    At(String),
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    /// `!`: not-equal inside expressions, comment at statement start.
    Bang,
}

const DELIMITERS: &str = "&'\"(){}[],:=<>+-*/!@";

pub fn is_name_char(ch: char) -> bool {
    !ch.is_whitespace() && !DELIMITERS.contains(ch)
}

pub struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.text.len());
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    fn peek_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    pub fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    pub fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.text.len()
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, QspError> {
        self.skip_whitespace();
        let Some(ch) = self.peek_char() else {
            return Ok(None);
        };
        let token = match ch {
            '\'' | '"' => Token::Str(self.read_quoted(ch)?),
            '{' => Token::Code(self.read_code()?),
            '0'..='9' => self.read_number_or_name(),
            '@' => {
                self.bump();
                let name = self.read_name();
                if name.is_empty() {
                    return Err(QspError::new(
                        ErrorKind::Syntax,
                        "Expected a location name after \"@\".",
                    ));
                }
                Token::At(name)
            }
            _ if is_name_char(ch) => Token::Ident(self.read_name()),
            _ => self.read_operator(ch)?,
        };
        Ok(Some(token))
    }

    fn read_operator(&mut self, ch: char) -> Result<Token, QspError> {
        self.bump();
        let next = self.peek_char();
        let (token, extra) = match (ch, next) {
            ('+', Some('=')) => (Token::AddAssign, true),
            ('-', Some('=')) => (Token::SubAssign, true),
            ('*', Some('=')) => (Token::MulAssign, true),
            ('/', Some('=')) => (Token::DivAssign, true),
            ('<', Some('>')) => (Token::Ne, true),
            ('<', Some('=')) => (Token::Le, true),
            ('>', Some('=')) => (Token::Ge, true),
            ('=', Some('<')) => (Token::Le, true),
            ('=', Some('>')) => (Token::Ge, true),
            ('+', _) => (Token::Plus, false),
            ('-', _) => (Token::Minus, false),
            ('*', _) => (Token::Star, false),
            ('/', _) => (Token::Slash, false),
            ('&', _) => (Token::Amp, false),
            (',', _) => (Token::Comma, false),
            (':', _) => (Token::Colon, false),
            ('(', _) => (Token::LParen, false),
            (')', _) => (Token::RParen, false),
            ('[', _) => (Token::LBracket, false),
            (']', _) => (Token::RBracket, false),
            ('=', _) => (Token::Eq, false),
            ('<', _) => (Token::Lt, false),
            ('>', _) => (Token::Gt, false),
            ('!', _) => (Token::Bang, false),
            ('}', _) => {
                return Err(QspError::new(
                    ErrorKind::BracketNotFound,
                    "Unexpected \"}\" without an opening \"{\".",
                ))
            }
            _ => {
                return Err(QspError::new(
                    ErrorKind::Syntax,
                    format!("Unexpected character \"{}\".", ch),
                ))
            }
        };
        if extra {
            self.bump();
        }
        Ok(token)
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self.peek_char().is_some_and(is_name_char) {
            self.bump();
        }
        self.text[start..self.pos].to_string()
    }

    fn read_number_or_name(&mut self) -> Token {
        let name = self.read_name();
        if name.bytes().all(|byte| byte.is_ascii_digit()) {
            let value = name.bytes().fold(0i64, |acc, byte| {
                acc.saturating_mul(10).saturating_add(i64::from(byte - b'0'))
            });
            Token::Number(value)
        } else {
            Token::Ident(name)
        }
    }

    /// Reads a quoted literal; a doubled quote character stands for itself.
    fn read_quoted(&mut self, quote: char) -> Result<String, QspError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(QspError::new(
                        ErrorKind::QuoteNotFound,
                        format!("Closing {} not found.", quote),
                    ))
                }
                Some(ch) if ch == quote => {
                    if self.peek_char() == Some(quote) {
                        self.bump();
                        value.push(quote);
                    } else {
                        return Ok(value);
                    }
                }
                Some(ch) => value.push(ch),
            }
        }
    }

    /// Reads a `{...}` literal verbatim, honouring nested braces and quotes.
    fn read_code(&mut self) -> Result<String, QspError> {
        self.bump();
        let start = self.pos;
        let mut depth = 1usize;
        let mut quote: Option<char> = None;
        while let Some(ch) = self.peek_char() {
            match (quote, ch) {
                (Some(open), _) if ch == open => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(ch),
                (None, '{') => depth += 1,
                (None, '}') => {
                    depth -= 1;
                    if depth == 0 {
                        let value = self.text[start..self.pos].to_string();
                        self.bump();
                        return Ok(value);
                    }
                }
                _ => {}
            }
            self.bump();
        }
        Err(QspError::new(
            ErrorKind::BracketNotFound,
            "Closing \"}\" not found.",
        ))
    }

    /// Peeks whether the text at the cursor is `<word>` followed by a delimiter.
    pub fn next_is_word(&mut self, word: &str) -> bool {
        self.skip_whitespace();
        let rest = &self.text[self.pos..];
        if rest.len() < word.len() || !rest.is_char_boundary(word.len()) {
            return false;
        }
        rest[..word.len()].eq_ignore_ascii_case(word)
            && !rest[word.len()..]
                .chars()
                .next()
                .is_some_and(is_name_char)
    }
}
