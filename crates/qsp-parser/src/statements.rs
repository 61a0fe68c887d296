use std::rc::Rc;

use qsp_core::{ErrorKind, QspError};

use crate::ast::{ActStatement, AssignOp, CodeBlock, Expr, IfBranch, LoopStatement, Statement, VarRef};
use crate::blocks::compile_code;
use crate::keywords::Command;
use crate::lexer::Token;
use crate::parser::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    Line,
    Else,
    LoopInit,
    LoopStep,
}

impl<'a> Parser<'a> {
    /// Parses one logical line. Block markers are only recognized first.
    pub(crate) fn parse_line_statements(&mut self) -> Vec<Statement> {
        let mut stmts = Vec::new();
        match self.parse_line_marker() {
            Ok(Some(Statement::End)) => return vec![Statement::End],
            Ok(Some(marker)) => {
                stmts.push(marker);
                if let Err(error) = self.eat(&Token::Amp) {
                    stmts.push(Statement::Invalid(error));
                    return stmts;
                }
            }
            Ok(None) => {}
            Err(error) => {
                stmts.push(Statement::Invalid(error));
                return stmts;
            }
        }
        stmts.extend(self.parse_statements(Stop::Line));
        stmts
    }

    fn parse_line_marker(&mut self) -> Result<Option<Statement>, QspError> {
        if self.peek_keyword("END")? {
            self.skip_to_end();
            return Ok(Some(Statement::End));
        }
        if self.peek_keyword("ELSE")? {
            self.next()?;
            return Ok(Some(Statement::Else));
        }
        if self.peek_keyword("ELSEIF")? {
            self.next()?;
            let cond = self.parse_expression()?;
            self.expect_colon()?;
            return Ok(Some(Statement::ElseIf(cond)));
        }
        Ok(None)
    }

    fn at_stop(&mut self, stop: Stop) -> Result<bool, QspError> {
        if self.at_end()? {
            return Ok(true);
        }
        match stop {
            Stop::Line => Ok(false),
            Stop::Else => Ok(self.peek_keyword("ELSE")? || self.peek_keyword("ELSEIF")?),
            Stop::LoopInit => self.peek_keyword("WHILE"),
            Stop::LoopStep => self.peek_token(&Token::Colon),
        }
    }

    pub(crate) fn parse_statements(&mut self, stop: Stop) -> Vec<Statement> {
        let mut stmts = Vec::new();
        loop {
            match self.at_stop(stop) {
                Ok(true) => break,
                Ok(false) => {}
                Err(error) => {
                    stmts.push(Statement::Invalid(error));
                    self.skip_to_end();
                    break;
                }
            }
            if matches!(self.peek(), Ok(Some(Token::Bang))) {
                self.skip_to_end();
                break;
            }
            match self.parse_statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(error) => {
                    stmts.push(Statement::Invalid(error));
                    self.skip_to_end();
                    break;
                }
            }
            match self.peek() {
                Ok(None) => break,
                Ok(Some(Token::Amp)) => {
                    if let Err(error) = self.next() {
                        stmts.push(Statement::Invalid(error));
                        self.skip_to_end();
                        break;
                    }
                }
                Ok(Some(_)) => {
                    if !matches!(self.at_stop(stop), Ok(true)) {
                        let rest = self.rest_text().to_string();
                        stmts.push(Statement::Invalid(QspError::new(
                            ErrorKind::Syntax,
                            format!("Unexpected text \"{}\".", rest),
                        )));
                        self.skip_to_end();
                    }
                    break;
                }
                Err(error) => {
                    stmts.push(Statement::Invalid(error));
                    self.skip_to_end();
                    break;
                }
            }
        }
        stmts
    }

    fn expect_colon(&mut self) -> Result<(), QspError> {
        self.expect(&Token::Colon, ErrorKind::ColonNotFound, "Sign \":\" not found.")
    }

    fn single_line(&self, stmts: Vec<Statement>) -> Rc<CodeBlock> {
        Rc::new(CodeBlock::single_line(self.line_num, self.line_text(), stmts))
    }

    fn parse_statement(&mut self) -> Result<Statement, QspError> {
        self.depth = 0;
        self.brackets = 0;
        let start = self.position();
        match self.peek()?.cloned() {
            Some(Token::Star) => {
                self.next()?;
                if let Some(Token::Ident(word)) = self.peek()?.cloned() {
                    if let Some(command) = Command::lookup_main(&word.to_uppercase()) {
                        self.next()?;
                        return self.parse_command(command);
                    }
                }
                self.rewind(start);
            }
            Some(Token::Ident(word)) => {
                let upper = word.to_uppercase();
                match upper.as_str() {
                    "IF" => return self.parse_if(),
                    "ACT" => return self.parse_act(),
                    "LOOP" => return self.parse_loop(),
                    "SET" | "LET" => {
                        self.next()?;
                        return self.parse_assignment();
                    }
                    "LOCAL" => return self.parse_local(),
                    "ADD" | "DEL" | "CLOSE" => {
                        self.next()?;
                        let command = match self.peek()?.cloned() {
                            Some(Token::Ident(second)) => {
                                match (upper.as_str(), second.to_uppercase().as_str()) {
                                    ("ADD", "OBJ") => Some(Command::AddObj),
                                    ("DEL", "OBJ") => Some(Command::DelObj),
                                    ("DEL", "ACT") => Some(Command::DelAct),
                                    ("CLOSE", "ALL") => Some(Command::CloseAll),
                                    _ => None,
                                }
                            }
                            _ => None,
                        };
                        if let Some(command) = command {
                            self.next()?;
                            return self.parse_command(command);
                        }
                        if upper == "CLOSE" {
                            return self.parse_command(Command::Close);
                        }
                        self.rewind(start);
                    }
                    _ => {
                        if let Some(command) = Command::lookup(&upper) {
                            self.next()?;
                            return self.parse_command(command);
                        }
                    }
                }
            }
            _ => {}
        }
        self.parse_assignment_or_print()
    }

    fn at_statement_end(&mut self) -> Result<bool, QspError> {
        Ok(self.at_end()?
            || self.peek_token(&Token::Amp)?
            || self.peek_token(&Token::Colon)?
            || self.peek_keyword("ELSE")?
            || self.peek_keyword("ELSEIF")?)
    }

    fn parse_command(&mut self, command: Command) -> Result<Statement, QspError> {
        let args = self.parse_command_args()?;
        let (min, max) = command.arg_range();
        if args.len() < min || args.len() > max {
            return Err(QspError::new(
                ErrorKind::ArgsCount,
                format!(
                    "{:?} takes {}..{} arguments, got {}.",
                    command,
                    min,
                    max,
                    args.len()
                ),
            ));
        }
        Ok(Statement::Command { command, args })
    }

    /// Comma-separated arguments, optionally wrapped as `(a, b, ...)`.
    fn parse_command_args(&mut self) -> Result<Vec<Expr>, QspError> {
        if self.at_statement_end()? {
            return Ok(Vec::new());
        }
        if self.peek_token(&Token::LParen)? {
            let start = self.position();
            self.next()?;
            self.brackets += 1;
            let first = self.parse_expression()?;
            self.brackets -= 1;
            if self.peek_token(&Token::Comma)? {
                self.next()?;
                let mut args = vec![first];
                args.extend(self.parse_call_args()?);
                return Ok(args);
            }
            self.rewind(start);
        }
        self.parse_expression_list()
    }

    fn parse_expression_list(&mut self) -> Result<Vec<Expr>, QspError> {
        let mut values = vec![self.parse_expression()?];
        while self.eat(&Token::Comma)? {
            values.push(self.parse_expression()?);
        }
        Ok(values)
    }

    fn parse_targets(&mut self) -> Result<Vec<VarRef>, QspError> {
        let mut targets = Vec::new();
        loop {
            let Some(Token::Ident(raw)) = self.next()? else {
                return Err(QspError::new(
                    ErrorKind::IncorrectName,
                    "Variable name expected.",
                ));
            };
            targets.push(self.parse_var_ref(&raw)?);
            if !self.eat(&Token::Comma)? {
                return Ok(targets);
            }
        }
    }

    fn peek_assign_op(&mut self) -> Result<Option<AssignOp>, QspError> {
        Ok(match self.peek()? {
            Some(Token::Eq) => Some(AssignOp::Set),
            Some(Token::AddAssign) => Some(AssignOp::Add),
            Some(Token::SubAssign) => Some(AssignOp::Sub),
            Some(Token::MulAssign) => Some(AssignOp::Mul),
            Some(Token::DivAssign) => Some(AssignOp::Div),
            _ => None,
        })
    }

    fn parse_assignment(&mut self) -> Result<Statement, QspError> {
        let targets = self.parse_targets()?;
        let Some(op) = self.peek_assign_op()? else {
            return Err(QspError::new(
                ErrorKind::EqualsNotFound,
                "Sign \"=\" not found.",
            ));
        };
        self.finish_assignment(targets, op)
    }

    fn finish_assignment(&mut self, targets: Vec<VarRef>, op: AssignOp) -> Result<Statement, QspError> {
        self.next()?;
        let values = self.parse_expression_list()?;
        if values.len() > targets.len() {
            return Err(QspError::new(
                ErrorKind::ArgsCount,
                "More values than assignment targets.",
            ));
        }
        Ok(Statement::Assign {
            targets,
            op,
            values,
        })
    }

    fn parse_assignment_or_print(&mut self) -> Result<Statement, QspError> {
        let start = self.position();
        if matches!(self.peek()?, Some(Token::Ident(_))) {
            if let Ok(targets) = self.parse_targets() {
                if let Some(op) = self.peek_assign_op()? {
                    return self.finish_assignment(targets, op);
                }
            }
            self.rewind(start);
        }
        Ok(Statement::Print(self.parse_expression()?))
    }

    fn parse_local(&mut self) -> Result<Statement, QspError> {
        self.next()?;
        let targets = self.parse_targets()?;
        let values = if self.eat(&Token::Eq)? {
            self.parse_expression_list()?
        } else {
            Vec::new()
        };
        if values.len() > targets.len() {
            return Err(QspError::new(
                ErrorKind::ArgsCount,
                "More values than local variables.",
            ));
        }
        Ok(Statement::Local { targets, values })
    }

    fn parse_if(&mut self) -> Result<Statement, QspError> {
        self.next()?;
        let cond = self.parse_expression()?;
        self.expect_colon()?;
        if self.at_end()? {
            return Ok(Statement::IfHead(cond));
        }
        let body = self.parse_statements(Stop::Else);
        let mut branches = vec![IfBranch {
            cond: Some(cond),
            body: self.single_line(body),
        }];
        loop {
            if self.peek_keyword("ELSEIF")? {
                self.next()?;
                let cond = self.parse_expression()?;
                self.expect_colon()?;
                let body = self.parse_statements(Stop::Else);
                branches.push(IfBranch {
                    cond: Some(cond),
                    body: self.single_line(body),
                });
            } else if self.peek_keyword("ELSE")? {
                self.next()?;
                let body = self.parse_statements(Stop::Else);
                branches.push(IfBranch {
                    cond: None,
                    body: self.single_line(body),
                });
            } else {
                return Ok(Statement::If(branches));
            }
        }
    }

    fn parse_act(&mut self) -> Result<Statement, QspError> {
        self.next()?;
        let name = self.parse_expression()?;
        let image = if self.eat(&Token::Comma)? {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect_colon()?;
        if self.at_end()? {
            return Ok(Statement::ActHead { name, image });
        }
        let source = self.rest_text().to_string();
        self.skip_to_end();
        let body = compile_code(&source, self.line_num, &self.limits);
        Ok(Statement::Act(Rc::new(ActStatement {
            name,
            image,
            body: Rc::new(body),
            source,
            first_line: self.line_num,
        })))
    }

    fn parse_loop(&mut self) -> Result<Statement, QspError> {
        self.next()?;
        let init = self.parse_statements(Stop::LoopInit);
        if !self.peek_keyword("WHILE")? {
            return Err(QspError::new(
                ErrorKind::LoopWhileNotFound,
                "Keyword \"while\" not found in loop.",
            ));
        }
        self.next()?;
        let cond = self.parse_expression()?;
        let step = if self.peek_keyword("STEP")? {
            self.next()?;
            self.parse_statements(Stop::LoopStep)
        } else {
            Vec::new()
        };
        self.expect_colon()?;
        let init = self.single_line(init);
        let step = self.single_line(step);
        if self.at_end()? {
            return Ok(Statement::LoopHead { init, cond, step });
        }
        let body = self.parse_statements(Stop::Line);
        Ok(Statement::Loop(Rc::new(LoopStatement {
            init,
            cond,
            step,
            body: self.single_line(body),
        })))
    }
}
