use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fault taxonomy. Ordinals are part of the public contract and never move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorKind {
    DivByZero = 100,
    TypeMismatch = 101,
    StackOverflow = 102,
    TooManyItems = 103,
    FileNotFound = 104,
    CannotLoadFile = 105,
    GameNotLoaded = 106,
    ColonNotFound = 107,
    CannotIncludeFile = 108,
    CannotAddAction = 109,
    EqualsNotFound = 110,
    LocationNotFound = 111,
    EndNotFound = 112,
    LabelNotFound = 113,
    IncorrectName = 114,
    QuoteNotFound = 115,
    BracketNotFound = 116,
    BracketsNotFound = 117,
    Syntax = 118,
    UnknownAction = 119,
    ArgsCount = 120,
    CannotAddObject = 121,
    CannotAddMenuItem = 122,
    TooManyVars = 123,
    IncorrectRegexp = 124,
    CodeNotFound = 125,
    LoopWhileNotFound = 126,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 27] = [
        Self::DivByZero,
        Self::TypeMismatch,
        Self::StackOverflow,
        Self::TooManyItems,
        Self::FileNotFound,
        Self::CannotLoadFile,
        Self::GameNotLoaded,
        Self::ColonNotFound,
        Self::CannotIncludeFile,
        Self::CannotAddAction,
        Self::EqualsNotFound,
        Self::LocationNotFound,
        Self::EndNotFound,
        Self::LabelNotFound,
        Self::IncorrectName,
        Self::QuoteNotFound,
        Self::BracketNotFound,
        Self::BracketsNotFound,
        Self::Syntax,
        Self::UnknownAction,
        Self::ArgsCount,
        Self::CannotAddObject,
        Self::CannotAddMenuItem,
        Self::TooManyVars,
        Self::IncorrectRegexp,
        Self::CodeNotFound,
        Self::LoopWhileNotFound,
    ];

    pub fn ordinal(self) -> i32 {
        self as i32
    }

    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.ordinal() == ordinal)
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::DivByZero => "DIV_BY_ZERO",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::StackOverflow => "STACK_OVERFLOW",
            Self::TooManyItems => "TOO_MANY_ITEMS",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::CannotLoadFile => "CANNOT_LOAD_FILE",
            Self::GameNotLoaded => "GAME_NOT_LOADED",
            Self::ColonNotFound => "COLON_NOT_FOUND",
            Self::CannotIncludeFile => "CANNOT_INCLUDE_FILE",
            Self::CannotAddAction => "CANNOT_ADD_ACTION",
            Self::EqualsNotFound => "EQUALS_NOT_FOUND",
            Self::LocationNotFound => "LOCATION_NOT_FOUND",
            Self::EndNotFound => "END_NOT_FOUND",
            Self::LabelNotFound => "LABEL_NOT_FOUND",
            Self::IncorrectName => "INCORRECT_NAME",
            Self::QuoteNotFound => "QUOTE_NOT_FOUND",
            Self::BracketNotFound => "BRACKET_NOT_FOUND",
            Self::BracketsNotFound => "BRACKETS_NOT_FOUND",
            Self::Syntax => "SYNTAX",
            Self::UnknownAction => "UNKNOWN_ACTION",
            Self::ArgsCount => "ARGS_COUNT",
            Self::CannotAddObject => "CANNOT_ADD_OBJECT",
            Self::CannotAddMenuItem => "CANNOT_ADD_MENU_ITEM",
            Self::TooManyVars => "TOO_MANY_VARS",
            Self::IncorrectRegexp => "INCORRECT_REGEXP",
            Self::CodeNotFound => "CODE_NOT_FOUND",
            Self::LoopWhileNotFound => "LOOP_WHILE_NOT_FOUND",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::DivByZero => "Division by zero!",
            Self::TypeMismatch => "Type mismatch!",
            Self::StackOverflow => "Stack overflow!",
            Self::TooManyItems => "Too many items in expression!",
            Self::FileNotFound => "File not found!",
            Self::CannotLoadFile => "Can't load file!",
            Self::GameNotLoaded => "Game not loaded!",
            Self::ColonNotFound => "Sign [:] not found!",
            Self::CannotIncludeFile => "Can't add file!",
            Self::CannotAddAction => "Can't add action!",
            Self::EqualsNotFound => "Sign [=] not found!",
            Self::LocationNotFound => "Location not found!",
            Self::EndNotFound => "[end] not found!",
            Self::LabelNotFound => "Label not found!",
            Self::IncorrectName => "Incorrect variable's name!",
            Self::QuoteNotFound => "Quote not found!",
            Self::BracketNotFound => "Bracket not found!",
            Self::BracketsNotFound => "Brackets not found!",
            Self::Syntax => "Syntax error!",
            Self::UnknownAction => "Unknown action!",
            Self::ArgsCount => "Incorrect arguments' count!",
            Self::CannotAddObject => "Can't add object!",
            Self::CannotAddMenuItem => "Can't add menu's item!",
            Self::TooManyVars => "Too many variables!",
            Self::IncorrectRegexp => "Regular expression's error!",
            Self::CodeNotFound => "Code not found!",
            Self::LoopWhileNotFound => "[while] not found!",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

pub fn describe_error(ordinal: i32) -> &'static str {
    ErrorKind::from_ordinal(ordinal)
        .map(ErrorKind::description)
        .unwrap_or("Unknown error!")
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct QspError {
    pub kind: ErrorKind,
    pub message: String,
}

impl QspError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.description())
    }
}

/// Frozen description of the last fault, with the position it happened at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub kind: Option<ErrorKind>,
    pub description: String,
    pub location: Option<String>,
    pub action_index: i64,
    pub top_line: usize,
    pub actual_line: usize,
    pub line_text: String,
}

impl Default for ErrorRecord {
    fn default() -> Self {
        Self {
            kind: None,
            description: String::new(),
            location: None,
            action_index: -1,
            top_line: 0,
            actual_line: 0,
            line_text: String::new(),
        }
    }
}

impl ErrorRecord {
    pub fn is_set(&self) -> bool {
        self.kind.is_some()
    }

    /// Ordinal of the recorded kind, 0 when no fault is recorded.
    pub fn ordinal(&self) -> i32 {
        self.kind.map(ErrorKind::ordinal).unwrap_or(0)
    }
}
