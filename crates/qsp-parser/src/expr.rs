use qsp_core::{ErrorKind, QspError};

use crate::ast::{BinaryOp, Expr, TextPart, UnaryOp, VarIndex, VarRef};
use crate::keywords::{normalize_var_name, Builtin};
use crate::lexer::Token;
use crate::parser::{parse_format, Parser};

impl<'a> Parser<'a> {
    pub(crate) fn parse_expression(&mut self) -> Result<Expr, QspError> {
        self.items = 0;
        self.parse_or()
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    fn parse_or(&mut self) -> Result<Expr, QspError> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("OR")? {
            self.next()?;
            let right = self.parse_and()?;
            left = Self::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, QspError> {
        let mut left = self.parse_not()?;
        while self.peek_keyword("AND")? {
            self.next()?;
            let right = self.parse_not()?;
            left = Self::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, QspError> {
        if self.peek_keyword("NO")? {
            self.next()?;
            self.enter()?;
            let operand = self.parse_not()?;
            self.leave();
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, QspError> {
        let mut left = self.parse_loc_obj()?;
        loop {
            let op = match self.peek()? {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) | Some(Token::Bang) => BinaryOp::Ne,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.next()?;
            let right = self.parse_loc_obj()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_loc_obj(&mut self) -> Result<Expr, QspError> {
        let op = if self.peek_keyword("LOC")? {
            UnaryOp::Loc
        } else if self.peek_keyword("OBJ")? {
            UnaryOp::Obj
        } else {
            return self.parse_concat();
        };
        self.next()?;
        self.enter()?;
        let operand = self.parse_loc_obj()?;
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    /// `&` concatenates only inside brackets; at statement level it separates statements.
    fn parse_concat(&mut self) -> Result<Expr, QspError> {
        let mut left = self.parse_additive()?;
        while self.brackets > 0 && self.peek_token(&Token::Amp)? {
            self.next()?;
            let right = self.parse_additive()?;
            left = Self::binary(BinaryOp::Concat, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, QspError> {
        let mut left = self.parse_mod()?;
        loop {
            let op = match self.peek()? {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.next()?;
            let right = self.parse_mod()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_mod(&mut self) -> Result<Expr, QspError> {
        let mut left = self.parse_multiplicative()?;
        while self.peek_keyword("MOD")? {
            self.next()?;
            let right = self.parse_multiplicative()?;
            left = Self::binary(BinaryOp::Mod, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, QspError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek()? {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.next()?;
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, QspError> {
        if self.eat(&Token::Minus)? {
            self.enter()?;
            let operand = self.parse_unary()?;
            self.leave();
            return Ok(match operand {
                Expr::Number(value) => Expr::Number(value.wrapping_neg()),
                other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
            });
        }
        if self.eat(&Token::Plus)? {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, QspError> {
        self.count_item()?;
        let Some(token) = self.next()? else {
            return Err(QspError::new(
                ErrorKind::Syntax,
                "Expression expected.",
            ));
        };
        match token {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::Str(text) => string_literal(text, &self.limits),
            Token::Code(code) => Ok(Expr::Code(code)),
            Token::LParen => {
                self.brackets += 1;
                self.enter()?;
                let inner = self.parse_or()?;
                self.leave();
                self.brackets -= 1;
                self.expect(
                    &Token::RParen,
                    ErrorKind::BracketNotFound,
                    "Closing \")\" not found.",
                )?;
                Ok(inner)
            }
            Token::At(name) => {
                let mut args = vec![Expr::Text(name)];
                if self.eat(&Token::LParen)? {
                    args.extend(self.parse_call_args()?);
                }
                Ok(Expr::Call {
                    func: Builtin::Func,
                    text: false,
                    args,
                })
            }
            Token::Ident(word) => self.parse_name(word),
            other => Err(QspError::new(
                ErrorKind::Syntax,
                format!("Unexpected {:?} in expression.", other),
            )),
        }
    }

    fn parse_name(&mut self, word: String) -> Result<Expr, QspError> {
        let text = word.starts_with('$');
        let upper = word.trim_start_matches('$').to_uppercase();
        if let Some(func) = Builtin::lookup(&upper) {
            return self.parse_call(func, text);
        }
        Ok(Expr::Var(self.parse_var_ref(&word)?))
    }

    fn parse_call(&mut self, func: Builtin, text: bool) -> Result<Expr, QspError> {
        let (min, max) = func.arg_range();
        let args = if self.eat(&Token::LParen)? {
            self.parse_call_args()?
        } else if min == 0 {
            Vec::new()
        } else if min == 1 {
            self.enter()?;
            let arg = self.parse_unary()?;
            self.leave();
            vec![arg]
        } else {
            return Err(QspError::new(
                ErrorKind::BracketsNotFound,
                format!("Function \"{}\" needs bracketed arguments.", func.name()),
            ));
        };
        if args.len() < min || args.len() > max {
            return Err(QspError::new(
                ErrorKind::ArgsCount,
                format!(
                    "Function \"{}\" takes {}..{} arguments, got {}.",
                    func.name(),
                    min,
                    max,
                    args.len()
                ),
            ));
        }
        Ok(Expr::Call { func, text, args })
    }

    /// Arguments after an already consumed `(`.
    pub(crate) fn parse_call_args(&mut self) -> Result<Vec<Expr>, QspError> {
        self.brackets += 1;
        self.enter()?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen)? {
            loop {
                args.push(self.parse_or()?);
                if self.eat(&Token::Comma)? {
                    continue;
                }
                self.expect(
                    &Token::RParen,
                    ErrorKind::BracketNotFound,
                    "Closing \")\" not found.",
                )?;
                break;
            }
        }
        self.leave();
        self.brackets -= 1;
        Ok(args)
    }

    pub(crate) fn parse_var_ref(&mut self, raw: &str) -> Result<VarRef, QspError> {
        let (name, text) = normalize_var_name(raw)?;
        if Builtin::lookup(&name).is_some() {
            return Err(QspError::new(
                ErrorKind::IncorrectName,
                format!("\"{}\" is a function name.", raw),
            ));
        }
        let index = if self.eat(&Token::LBracket)? {
            if self.eat(&Token::RBracket)? {
                VarIndex::Last
            } else {
                self.brackets += 1;
                self.enter()?;
                let index = self.parse_or()?;
                self.leave();
                self.brackets -= 1;
                self.expect(
                    &Token::RBracket,
                    ErrorKind::BracketNotFound,
                    "Closing \"]\" not found.",
                )?;
                VarIndex::At(Box::new(index))
            }
        } else {
            VarIndex::Scalar
        };
        Ok(VarRef { name, text, index })
    }
}

fn string_literal(text: String, limits: &crate::ParseLimits) -> Result<Expr, QspError> {
    if !text.contains("<<") {
        return Ok(Expr::Text(text));
    }
    let parts = parse_format(&text, limits)?;
    if let [TextPart::Literal(only)] = parts.as_slice() {
        return Ok(Expr::Text(only.clone()));
    }
    Ok(Expr::Format(parts))
}

#[cfg(test)]
mod expr_tests {
    use crate::ast::*;
    use crate::keywords::Builtin;
    use crate::{parse_expression, ParseLimits};
    use qsp_core::ErrorKind;

    fn parse(text: &str) -> Expr {
        parse_expression(text, &ParseLimits::default()).expect("expression should parse")
    }

    fn var(name: &str) -> Expr {
        Expr::Var(VarRef {
            name: name.to_string(),
            text: false,
            index: VarIndex::Scalar,
        })
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse("1 + 2 * 3"),
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Number(1)),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Number(2)),
                    Box::new(Expr::Number(3))
                ))
            )
        );
    }

    #[test]
    fn logical_operators_sit_below_comparisons() {
        assert_eq!(
            parse("a = 1 or no b"),
            Expr::Binary(
                BinaryOp::Or,
                Box::new(Expr::Binary(
                    BinaryOp::Eq,
                    Box::new(var("A")),
                    Box::new(Expr::Number(1))
                )),
                Box::new(Expr::Unary(UnaryOp::Not, Box::new(var("B"))))
            )
        );
    }

    #[test]
    fn obj_binds_tighter_than_comparison() {
        assert_eq!(
            parse("obj 'key' = 0"),
            Expr::Binary(
                BinaryOp::Eq,
                Box::new(Expr::Unary(
                    UnaryOp::Obj,
                    Box::new(Expr::Text("key".to_string()))
                )),
                Box::new(Expr::Number(0))
            )
        );
    }

    #[test]
    fn functions_parse_with_and_without_brackets() {
        assert_eq!(
            parse("$mid('abc', 2)"),
            Expr::Call {
                func: Builtin::Mid,
                text: true,
                args: vec![Expr::Text("abc".to_string()), Expr::Number(2)],
            }
        );
        assert_eq!(
            parse("len 'ab' + 1"),
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Call {
                    func: Builtin::Len,
                    text: false,
                    args: vec![Expr::Text("ab".to_string())],
                }),
                Box::new(Expr::Number(1))
            )
        );
        assert_eq!(
            parse("rnd"),
            Expr::Call {
                func: Builtin::Rnd,
                text: false,
                args: vec![],
            }
        );
    }

    #[test]
    fn multi_argument_function_without_brackets_fails() {
        let error = parse_expression("mid 'abc'", &ParseLimits::default()).expect_err("brackets");
        assert_eq!(error.kind, ErrorKind::BracketsNotFound);
        let error = parse_expression("strcomp 'a'", &ParseLimits::default()).expect_err("brackets");
        assert_eq!(error.kind, ErrorKind::BracketsNotFound);
    }

    #[test]
    fn wrong_argument_count_is_reported() {
        let error = parse_expression("iif(1, 2)", &ParseLimits::default()).expect_err("args");
        assert_eq!(error.kind, ErrorKind::ArgsCount);
    }

    #[test]
    fn concat_only_inside_brackets() {
        assert!(matches!(
            parse("('a' & 'b')"),
            Expr::Binary(BinaryOp::Concat, _, _)
        ));
        let error = parse_expression("'a' & 'b'", &ParseLimits::default()).expect_err("amp");
        assert_eq!(error.kind, ErrorKind::Syntax);
    }

    #[test]
    fn array_indices_and_user_calls() {
        assert_eq!(
            parse("$a[]"),
            Expr::Var(VarRef {
                name: "A".to_string(),
                text: true,
                index: VarIndex::Last,
            })
        );
        assert_eq!(
            parse("@foo(1)"),
            Expr::Call {
                func: Builtin::Func,
                text: false,
                args: vec![Expr::Text("foo".to_string()), Expr::Number(1)],
            }
        );
    }

    #[test]
    fn limits_are_enforced() {
        let limits = ParseLimits {
            max_expression_items: 3,
            max_expression_depth: 2,
        };
        let error = parse_expression("1 + 2 + 3 + 4", &limits).expect_err("items");
        assert_eq!(error.kind, ErrorKind::TooManyItems);
        let error = parse_expression("(((1)))", &limits).expect_err("depth");
        assert_eq!(error.kind, ErrorKind::StackOverflow);
    }

    #[test]
    fn missing_closing_bracket_is_reported() {
        let error = parse_expression("(1 + 2", &ParseLimits::default()).expect_err("bracket");
        assert_eq!(error.kind, ErrorKind::BracketNotFound);
    }

    #[test]
    fn bad_variable_names_are_rejected() {
        let error = parse_expression("2x", &ParseLimits::default()).expect_err("name");
        assert_eq!(error.kind, ErrorKind::IncorrectName);
    }
}
