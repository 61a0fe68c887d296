use qsp_core::{ErrorKind, QspError};

use crate::lexer::is_name_char;

/// Built-in functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    ArrItem,
    Min,
    Max,
    Rand,
    Rnd,
    IIf,
    Rgb,
    Len,
    IsNum,
    LCase,
    UCase,
    Input,
    Str,
    Val,
    ArrSize,
    IsPlay,
    Desc,
    Trim,
    GetObj,
    StrComp,
    StrFind,
    StrPos,
    Mid,
    ArrPos,
    ArrComp,
    Instr,
    Replace,
    Func,
    DynEval,
    CountObj,
    MsecsCount,
    QspVer,
    UserText,
    CurLoc,
    SelObj,
    SelAct,
    MainText,
    StatText,
    CurActs,
    CurObjs,
}

const BUILTINS: &[(&str, Builtin)] = &[
    ("ARRITEM", Builtin::ArrItem),
    ("MIN", Builtin::Min),
    ("MAX", Builtin::Max),
    ("RAND", Builtin::Rand),
    ("RND", Builtin::Rnd),
    ("IIF", Builtin::IIf),
    ("RGB", Builtin::Rgb),
    ("LEN", Builtin::Len),
    ("ISNUM", Builtin::IsNum),
    ("LCASE", Builtin::LCase),
    ("UCASE", Builtin::UCase),
    ("INPUT", Builtin::Input),
    ("STR", Builtin::Str),
    ("VAL", Builtin::Val),
    ("ARRSIZE", Builtin::ArrSize),
    ("ISPLAY", Builtin::IsPlay),
    ("DESC", Builtin::Desc),
    ("TRIM", Builtin::Trim),
    ("GETOBJ", Builtin::GetObj),
    ("STRCOMP", Builtin::StrComp),
    ("STRFIND", Builtin::StrFind),
    ("STRPOS", Builtin::StrPos),
    ("MID", Builtin::Mid),
    ("ARRPOS", Builtin::ArrPos),
    ("ARRCOMP", Builtin::ArrComp),
    ("INSTR", Builtin::Instr),
    ("REPLACE", Builtin::Replace),
    ("FUNC", Builtin::Func),
    ("DYNEVAL", Builtin::DynEval),
    ("COUNTOBJ", Builtin::CountObj),
    ("MSECSCOUNT", Builtin::MsecsCount),
    ("QSPVER", Builtin::QspVer),
    ("USER_TEXT", Builtin::UserText),
    ("USRTXT", Builtin::UserText),
    ("CURLOC", Builtin::CurLoc),
    ("SELOBJ", Builtin::SelObj),
    ("SELACT", Builtin::SelAct),
    ("MAINTXT", Builtin::MainText),
    ("STATTXT", Builtin::StatText),
    ("CURACTS", Builtin::CurActs),
    ("CUROBJS", Builtin::CurObjs),
];

const MAX_CALL_ARGS: usize = 20;

impl Builtin {
    /// Looks up an upper-cased name without the `$` prefix.
    pub fn lookup(name: &str) -> Option<Self> {
        BUILTINS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, builtin)| *builtin)
    }

    pub fn name(self) -> &'static str {
        BUILTINS
            .iter()
            .find(|(_, builtin)| *builtin == self)
            .map(|(name, _)| *name)
            .unwrap_or("?")
    }

    pub fn arg_range(self) -> (usize, usize) {
        match self {
            Self::Rnd
            | Self::CountObj
            | Self::MsecsCount
            | Self::UserText
            | Self::CurLoc
            | Self::SelObj
            | Self::SelAct
            | Self::MainText
            | Self::StatText
            | Self::CurActs
            | Self::CurObjs => (0, 0),
            Self::QspVer => (0, 1),
            Self::Len
            | Self::IsNum
            | Self::LCase
            | Self::UCase
            | Self::Input
            | Self::Str
            | Self::Val
            | Self::ArrSize
            | Self::IsPlay
            | Self::Desc
            | Self::Trim
            | Self::GetObj => (1, 1),
            Self::Rand => (1, 2),
            Self::ArrItem | Self::StrComp => (2, 2),
            Self::StrFind
            | Self::StrPos
            | Self::Mid
            | Self::ArrPos
            | Self::ArrComp
            | Self::Instr
            | Self::Replace => (2, 3),
            Self::IIf => (3, 3),
            Self::Rgb => (3, 4),
            Self::Min | Self::Max | Self::Func | Self::DynEval => (1, MAX_CALL_ARGS),
        }
    }
}

/// Statements other than assignment, output and the block forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    AddObj,
    DelObj,
    KillObj,
    Unselect,
    DelAct,
    Cla,
    Cls,
    CmdClear,
    Clear,
    MainClear,
    P,
    Pl,
    Nl,
    MainP,
    MainPl,
    MainNl,
    Msg,
    CopyArr,
    KillVar,
    KillAll,
    Dynamic,
    Exec,
    Exit,
    GoSub,
    GoTo,
    XGoTo,
    Jump,
    Menu,
    OpenGame,
    SaveGame,
    OpenQst,
    IncLib,
    FreeLib,
    Play,
    Close,
    CloseAll,
    View,
    RefInt,
    SetTimer,
    ShowActs,
    ShowObjs,
    ShowStat,
    ShowInput,
    Wait,
}

const COMMANDS: &[(&str, Command)] = &[
    ("ADDOBJ", Command::AddObj),
    ("DELOBJ", Command::DelObj),
    ("KILLOBJ", Command::KillObj),
    ("UNSELECT", Command::Unselect),
    ("UNSEL", Command::Unselect),
    ("DELACT", Command::DelAct),
    ("CLA", Command::Cla),
    ("CLS", Command::Cls),
    ("CMDCLEAR", Command::CmdClear),
    ("CMDCLR", Command::CmdClear),
    ("CLEAR", Command::Clear),
    ("CLR", Command::Clear),
    ("P", Command::P),
    ("PL", Command::Pl),
    ("NL", Command::Nl),
    ("MSG", Command::Msg),
    ("COPYARR", Command::CopyArr),
    ("KILLVAR", Command::KillVar),
    ("KILLALL", Command::KillAll),
    ("DYNAMIC", Command::Dynamic),
    ("EXEC", Command::Exec),
    ("EXIT", Command::Exit),
    ("GOSUB", Command::GoSub),
    ("GS", Command::GoSub),
    ("GOTO", Command::GoTo),
    ("GT", Command::GoTo),
    ("XGOTO", Command::XGoTo),
    ("XGT", Command::XGoTo),
    ("JUMP", Command::Jump),
    ("MENU", Command::Menu),
    ("OPENGAME", Command::OpenGame),
    ("SAVEGAME", Command::SaveGame),
    ("OPENQST", Command::OpenQst),
    ("INCLIB", Command::IncLib),
    ("ADDQST", Command::IncLib),
    ("FREELIB", Command::FreeLib),
    ("KILLQST", Command::FreeLib),
    ("PLAY", Command::Play),
    ("CLOSE", Command::Close),
    ("VIEW", Command::View),
    ("REFINT", Command::RefInt),
    ("SETTIMER", Command::SetTimer),
    ("SHOWACTS", Command::ShowActs),
    ("SHOWOBJS", Command::ShowObjs),
    ("SHOWSTAT", Command::ShowStat),
    ("SHOWINPUT", Command::ShowInput),
    ("WAIT", Command::Wait),
];

/// `*`-prefixed forms writing to the main description.
const MAIN_COMMANDS: &[(&str, Command)] = &[
    ("P", Command::MainP),
    ("PL", Command::MainPl),
    ("NL", Command::MainNl),
    ("CLEAR", Command::MainClear),
    ("CLR", Command::MainClear),
];

impl Command {
    pub fn lookup(name: &str) -> Option<Self> {
        COMMANDS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, command)| *command)
    }

    pub fn lookup_main(name: &str) -> Option<Self> {
        MAIN_COMMANDS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, command)| *command)
    }

    pub fn arg_range(self) -> (usize, usize) {
        match self {
            Self::Unselect
            | Self::Cla
            | Self::Cls
            | Self::CmdClear
            | Self::Clear
            | Self::MainClear
            | Self::KillAll
            | Self::Exit
            | Self::FreeLib
            | Self::CloseAll
            | Self::RefInt => (0, 0),
            Self::KillObj
            | Self::Pl
            | Self::Nl
            | Self::MainPl
            | Self::MainNl
            | Self::OpenGame
            | Self::SaveGame
            | Self::Close
            | Self::View => (0, 1),
            Self::KillVar => (0, 2),
            Self::DelObj
            | Self::DelAct
            | Self::P
            | Self::MainP
            | Self::Msg
            | Self::Exec
            | Self::Jump
            | Self::OpenQst
            | Self::IncLib
            | Self::SetTimer
            | Self::ShowActs
            | Self::ShowObjs
            | Self::ShowStat
            | Self::ShowInput
            | Self::Wait => (1, 1),
            Self::Play => (1, 2),
            Self::AddObj | Self::Menu => (1, 3),
            Self::CopyArr => (2, 4),
            Self::Dynamic | Self::GoSub | Self::GoTo | Self::XGoTo => (1, MAX_CALL_ARGS),
        }
    }
}

/// Words that can never name a variable.
pub fn is_reserved_word(name: &str) -> bool {
    matches!(
        name,
        "AND"
            | "OR"
            | "NO"
            | "MOD"
            | "LOC"
            | "OBJ"
            | "IF"
            | "ELSE"
            | "ELSEIF"
            | "END"
            | "ACT"
            | "LOOP"
            | "WHILE"
            | "STEP"
            | "SET"
            | "LET"
            | "LOCAL"
    )
}

/// Splits `$name` into the upper-cased slot name and whether the text view
/// was requested.
pub fn normalize_var_name(raw: &str) -> Result<(String, bool), QspError> {
    let trimmed = raw.trim();
    let text = trimmed.starts_with('$');
    let name = trimmed.trim_start_matches('$').to_uppercase();
    let valid = name
        .chars()
        .next()
        .is_some_and(|first| !first.is_ascii_digit())
        && name.chars().all(|ch| is_name_char(ch) && ch != '$')
        && !is_reserved_word(&name);
    if !valid {
        return Err(QspError::new(
            ErrorKind::IncorrectName,
            format!("\"{}\" is not a valid variable name.", raw),
        ));
    }
    Ok((name, text))
}

#[cfg(test)]
mod keywords_tests {
    use super::*;

    #[test]
    fn variable_names_are_normalized() {
        assert_eq!(
            normalize_var_name("$Name").expect("name"),
            ("NAME".to_string(), true)
        );
        assert_eq!(
            normalize_var_name("x_1").expect("name"),
            ("X_1".to_string(), false)
        );
        for bad in ["", "$", "1a", "a b", "and", "a$b"] {
            let error = normalize_var_name(bad).expect_err("invalid name");
            assert_eq!(error.kind, ErrorKind::IncorrectName);
        }
    }

    #[test]
    fn lookups_resolve_aliases() {
        assert_eq!(Builtin::lookup("USRTXT"), Some(Builtin::UserText));
        assert_eq!(Command::lookup("GS"), Some(Command::GoSub));
        assert_eq!(Command::lookup("KILLQST"), Some(Command::FreeLib));
        assert_eq!(Command::lookup_main("PL"), Some(Command::MainPl));
        assert_eq!(Command::lookup("NOPE"), None);
    }

    #[test]
    fn builtin_names_round_trip() {
        assert_eq!(Builtin::Mid.name(), "MID");
        assert_eq!(Builtin::lookup(Builtin::StrPos.name()), Some(Builtin::StrPos));
        assert_eq!(Builtin::Rnd.arg_range(), (0, 0));
    }
}
