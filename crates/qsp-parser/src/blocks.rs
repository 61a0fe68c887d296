use std::collections::VecDeque;
use std::rc::Rc;

use qsp_core::{ErrorKind, QspError};

use crate::ast::{ActStatement, CodeBlock, CodeLine, Expr, IfBranch, LoopStatement, Statement};
use crate::parser::Parser;
use crate::ParseLimits;

/// Logical line assembled from one or more physical lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub line_num: usize,
    pub end_line: usize,
    pub text: String,
}

/// Joins physical lines into logical ones. Quotes and `{}` literals may span
/// lines (kept with `\r\n` inside); a trailing ` _` continues onto the next line.
pub fn split_lines(physical: &str, first_line: usize) -> Vec<SourceLine> {
    let mut out = Vec::new();
    let mut current: Option<SourceLine> = None;
    let mut quote: Option<char> = None;
    let mut braces = 0usize;
    for (offset, raw) in physical.split('\n').enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let line_num = first_line + offset;
        let mut line = match current.take() {
            Some(mut open) => {
                if quote.is_some() || braces > 0 {
                    open.text.push_str("\r\n");
                    open.text.push_str(raw);
                } else {
                    open.text.push_str(raw.trim_start());
                }
                open.end_line = line_num;
                open
            }
            None => {
                let text = raw.trim_start();
                if text.starts_with('!') {
                    out.push(SourceLine {
                        line_num,
                        end_line: line_num,
                        text: text.trim_end().to_string(),
                    });
                    continue;
                }
                SourceLine {
                    line_num,
                    end_line: line_num,
                    text: text.to_string(),
                }
            }
        };
        for ch in raw.chars() {
            match quote {
                Some(open) if ch == open => quote = None,
                Some(_) => {}
                None => match ch {
                    '\'' | '"' => quote = Some(ch),
                    '{' => braces += 1,
                    '}' => braces = braces.saturating_sub(1),
                    _ => {}
                },
            }
        }
        if quote.is_some() || braces > 0 {
            current = Some(line);
            continue;
        }
        let trimmed = line.text.trim_end();
        if let Some(head) = trimmed.strip_suffix(" _") {
            line.text = format!("{} ", head.trim_end());
            current = Some(line);
            continue;
        }
        line.text = trimmed.to_string();
        out.push(line);
    }
    if let Some(mut open) = current {
        open.text = open.text.trim_end().to_string();
        out.push(open);
    }
    out
}

struct ParsedLine {
    line: CodeLine,
    end_line: usize,
}

fn parse_source_line(source: &SourceLine, limits: &ParseLimits) -> Option<ParsedLine> {
    if source.text.is_empty() {
        return None;
    }
    let line = if let Some(label) = source.text.strip_prefix(':') {
        CodeLine {
            line_num: source.line_num,
            label: Some(label.trim().to_uppercase()),
            text: source.text.clone(),
            stmts: Vec::new(),
        }
    } else {
        let stmts = Parser::new(&source.text, *limits, source.line_num).parse_line_statements();
        CodeLine {
            line_num: source.line_num,
            label: None,
            text: source.text.clone(),
            stmts,
        }
    };
    Some(ParsedLine {
        line,
        end_line: source.end_line,
    })
}

enum Terminator {
    Eof,
    End { line_num: usize },
    Else { rest: Option<ParsedLine> },
    ElseIf { cond: Expr, rest: Option<ParsedLine> },
}

struct BlockBuilder<'a> {
    lines: VecDeque<ParsedLine>,
    physical: Vec<&'a str>,
    first_line: usize,
}

fn remainder(parsed: ParsedLine, stmts: Vec<Statement>) -> Option<ParsedLine> {
    if stmts.is_empty() {
        return None;
    }
    Some(ParsedLine {
        line: CodeLine { stmts, ..parsed.line },
        end_line: parsed.end_line,
    })
}

fn unexpected(marker: &Statement) -> Statement {
    let word = match marker {
        Statement::End => "end",
        Statement::Else => "else",
        _ => "elseif",
    };
    Statement::Invalid(QspError::new(
        ErrorKind::Syntax,
        format!("Unexpected \"{}\" outside of a block.", word),
    ))
}

impl<'a> BlockBuilder<'a> {
    fn build(&mut self, nested: bool, allow_else: bool) -> (CodeBlock, Terminator) {
        let mut block = CodeBlock::default();
        while let Some(mut parsed) = self.lines.pop_front() {
            if let Some(first) = parsed.line.stmts.first() {
                if first.is_marker() {
                    let mut stmts = std::mem::take(&mut parsed.line.stmts);
                    let marker = stmts.remove(0);
                    match marker {
                        Statement::End if nested => {
                            return (
                                block,
                                Terminator::End {
                                    line_num: parsed.line.line_num,
                                },
                            )
                        }
                        Statement::Else if allow_else => {
                            return (
                                block,
                                Terminator::Else {
                                    rest: remainder(parsed, stmts),
                                },
                            )
                        }
                        Statement::ElseIf(cond) if allow_else => {
                            return (
                                block,
                                Terminator::ElseIf {
                                    cond,
                                    rest: remainder(parsed, stmts),
                                },
                            )
                        }
                        other => {
                            stmts.insert(0, unexpected(&other));
                            parsed.line.stmts = stmts;
                        }
                    }
                }
            }
            if parsed.line.stmts.last().is_some_and(Statement::is_head) {
                self.complete_head(&mut parsed);
            }
            block.lines.push(parsed.line);
        }
        (block, Terminator::Eof)
    }

    fn push_front(&mut self, rest: Option<ParsedLine>) {
        if let Some(rest) = rest {
            self.lines.push_front(rest);
        }
    }

    fn missing_end() -> Statement {
        Statement::Invalid(QspError::new(
            ErrorKind::EndNotFound,
            "Block is not closed with \"end\".",
        ))
    }

    fn complete_head(&mut self, parsed: &mut ParsedLine) {
        let Some(head) = parsed.line.stmts.pop() else {
            return;
        };
        let stmt = match head {
            Statement::IfHead(cond) => self.complete_if(cond),
            Statement::LoopHead { init, cond, step } => {
                let (body, terminator) = self.build(true, false);
                match terminator {
                    Terminator::End { .. } => Statement::Loop(Rc::new(LoopStatement {
                        init,
                        cond,
                        step,
                        body: Rc::new(body),
                    })),
                    _ => Self::missing_end(),
                }
            }
            Statement::ActHead { name, image } => {
                let body_start = parsed.end_line + 1;
                let (body, terminator) = self.build(true, false);
                match terminator {
                    Terminator::End { line_num } => {
                        let from = body_start.saturating_sub(self.first_line);
                        let to = line_num.saturating_sub(self.first_line).max(from);
                        let source = self.physical[from..to.min(self.physical.len())].join("\n");
                        Statement::Act(Rc::new(ActStatement {
                            name,
                            image,
                            body: Rc::new(body),
                            source,
                            first_line: body_start,
                        }))
                    }
                    _ => Self::missing_end(),
                }
            }
            other => other,
        };
        parsed.line.stmts.push(stmt);
    }

    fn complete_if(&mut self, cond: Expr) -> Statement {
        let mut branches = Vec::new();
        let mut cond = Some(cond);
        let mut allow_else = true;
        loop {
            let (body, terminator) = self.build(true, allow_else);
            branches.push(IfBranch {
                cond: cond.take(),
                body: Rc::new(body),
            });
            match terminator {
                Terminator::End { .. } => return Statement::If(branches),
                Terminator::Eof => return Self::missing_end(),
                Terminator::Else { rest } => {
                    allow_else = false;
                    self.push_front(rest);
                }
                Terminator::ElseIf { cond: next, rest } => {
                    cond = Some(next);
                    self.push_front(rest);
                }
            }
        }
    }
}

/// Compiles a code body whose first physical line is numbered `first_line`.
pub fn compile_code(source: &str, first_line: usize, limits: &ParseLimits) -> CodeBlock {
    let lines = split_lines(source, first_line)
        .iter()
        .filter_map(|line| parse_source_line(line, limits))
        .collect();
    let mut builder = BlockBuilder {
        lines,
        physical: source
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect(),
        first_line,
    };
    builder.build(false, false).0
}
