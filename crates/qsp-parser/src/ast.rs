use std::rc::Rc;

use qsp_core::QspError;

use crate::keywords::{Builtin, Command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Loc,
    Obj,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarIndex {
    Scalar,
    /// `name[]`: last element on read, a new element on write.
    Last,
    At(Box<Expr>),
}

/// Reference to a variable slot. `name` is upper-cased and stripped of the
/// `$` prefix; `text` records whether the text view was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    pub name: String,
    pub text: bool,
    pub index: VarIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPart {
    Literal(String),
    Subst(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(i64),
    Text(String),
    /// Quoted literal containing `<<expr>>` substitutions.
    Format(Vec<TextPart>),
    /// `{...}` literal, kept verbatim.
    Code(String),
    Var(VarRef),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call {
        func: Builtin,
        text: bool,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfBranch {
    pub cond: Option<Expr>,
    pub body: Rc<CodeBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActStatement {
    pub name: Expr,
    pub image: Option<Expr>,
    pub body: Rc<CodeBlock>,
    /// Raw body text; recompiling it from `first_line` yields `body` again.
    pub source: String,
    pub first_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopStatement {
    pub init: Rc<CodeBlock>,
    pub cond: Expr,
    pub step: Rc<CodeBlock>,
    pub body: Rc<CodeBlock>,
}

pub const LOOP_BODY: usize = 0;
pub const LOOP_INIT: usize = 1;
pub const LOOP_STEP: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Assign {
        targets: Vec<VarRef>,
        op: AssignOp,
        values: Vec<Expr>,
    },
    Local {
        targets: Vec<VarRef>,
        values: Vec<Expr>,
    },
    /// Bare expression: its value goes to the main description.
    Print(Expr),
    Command {
        command: Command,
        args: Vec<Expr>,
    },
    If(Vec<IfBranch>),
    Act(Rc<ActStatement>),
    Loop(Rc<LoopStatement>),
    /// Statement that failed to compile; the error is raised when it runs.
    Invalid(QspError),
    IfHead(Expr),
    ElseIf(Expr),
    Else,
    End,
    ActHead {
        name: Expr,
        image: Option<Expr>,
    },
    LoopHead {
        init: Rc<CodeBlock>,
        cond: Expr,
        step: Rc<CodeBlock>,
    },
}

impl Statement {
    /// Nested block entered by the engine for `branch` of this statement.
    pub fn child_block(&self, branch: usize) -> Option<Rc<CodeBlock>> {
        match self {
            Self::If(branches) => branches.get(branch).map(|item| item.body.clone()),
            Self::Loop(spec) => match branch {
                LOOP_BODY => Some(spec.body.clone()),
                LOOP_INIT => Some(spec.init.clone()),
                LOOP_STEP => Some(spec.step.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn is_marker(&self) -> bool {
        matches!(self, Self::ElseIf(_) | Self::Else | Self::End)
    }

    pub(crate) fn is_head(&self) -> bool {
        matches!(
            self,
            Self::IfHead(_) | Self::ActHead { .. } | Self::LoopHead { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    pub line_num: usize,
    pub label: Option<String>,
    pub text: String,
    pub stmts: Vec<Statement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBlock {
    pub lines: Vec<CodeLine>,
}

impl CodeBlock {
    pub fn single_line(line_num: usize, text: &str, stmts: Vec<Statement>) -> Self {
        Self {
            lines: vec![CodeLine {
                line_num,
                label: None,
                text: text.to_string(),
                stmts,
            }],
        }
    }

    /// Labels compare case-insensitively; `label` must already be upper-cased.
    pub fn find_label(&self, label: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.label.as_deref() == Some(label))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
