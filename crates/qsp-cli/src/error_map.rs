use std::fmt::Display;

use qsp_core::{ErrorRecord, QspError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub(crate) struct CliError {
    pub(crate) code: String,
    pub(crate) message: String,
}

impl CliError {
    pub(crate) fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<QspError> for CliError {
    fn from(error: QspError) -> Self {
        Self::new(error.kind.code(), error.message)
    }
}

fn map_error(code: &'static str, error: impl Display) -> CliError {
    CliError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: CliError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!(
        "ERROR_MSG_JSON:{}",
        serde_json::to_string(&error.message).unwrap_or_else(|_| "\"\"".to_string())
    );
    1
}

/// Turns the record of a failed engine call into a CLI error with its position.
pub(crate) fn map_engine_record(record: &ErrorRecord) -> CliError {
    let Some(kind) = record.kind else {
        return CliError::new("ENGINE_UNKNOWN", "Engine call failed without an error record.");
    };
    let mut message = record.description.clone();
    if let Some(location) = &record.location {
        message.push_str(&format!(" [location {}", location));
        if record.actual_line > 0 {
            message.push_str(&format!(", line {}", record.actual_line));
        }
        if !record.line_text.is_empty() {
            message.push_str(&format!(": {}", record.line_text));
        }
        message.push(']');
    }
    CliError::new(kind.code(), message)
}

pub(crate) fn map_line_io(error: std::io::Error) -> CliError {
    map_error("LINE_IO", error)
}

pub(crate) fn map_cli_game_path(error: std::io::Error) -> CliError {
    map_error("CLI_GAME_PATH", error)
}

pub(crate) fn map_cli_game_read(error: std::io::Error) -> CliError {
    map_error("CLI_GAME_READ", error)
}

pub(crate) fn map_cli_state_write(error: std::io::Error) -> CliError {
    map_error("CLI_STATE_WRITE", error)
}

pub(crate) fn map_cli_state_read(error: std::io::Error) -> CliError {
    map_error("CLI_STATE_READ", error)
}

pub(crate) fn map_cli_state_invalid(error: serde_json::Error) -> CliError {
    map_error("CLI_STATE_INVALID", error)
}

#[cfg(test)]
mod error_map_tests {
    use super::*;
    use qsp_core::ErrorKind;

    #[test]
    fn emit_error_returns_non_zero_exit_code() {
        let code = emit_error(CliError::new("ERR", "failed"));
        assert_eq!(code, 1);
    }

    #[test]
    fn engine_errors_keep_their_kind_code() {
        let error = CliError::from(QspError::from_kind(ErrorKind::LocationNotFound));
        assert_eq!(error.code, "LOCATION_NOT_FOUND");

        let record = ErrorRecord {
            kind: Some(ErrorKind::DivByZero),
            description: "Division by zero!".to_string(),
            location: Some("start".to_string()),
            action_index: -1,
            top_line: 2,
            actual_line: 3,
            line_text: "x = 1 / 0".to_string(),
        };
        let error = map_engine_record(&record);
        assert_eq!(error.code, "DIV_BY_ZERO");
        assert_eq!(
            error.message,
            "Division by zero! [location start, line 3: x = 1 / 0]"
        );

        let error = map_engine_record(&ErrorRecord::default());
        assert_eq!(error.code, "ENGINE_UNKNOWN");
    }

    #[test]
    fn mapping_helpers_keep_error_codes() {
        assert_eq!(map_line_io(std::io::Error::other("io")).code, "LINE_IO");
        assert_eq!(
            map_cli_game_path(std::io::Error::other("path")).code,
            "CLI_GAME_PATH"
        );
        assert_eq!(
            map_cli_game_read(std::io::Error::other("read")).code,
            "CLI_GAME_READ"
        );
        assert_eq!(
            map_cli_state_write(std::io::Error::other("write")).code,
            "CLI_STATE_WRITE"
        );
        assert_eq!(
            map_cli_state_read(std::io::Error::other("read")).code,
            "CLI_STATE_READ"
        );

        let invalid = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        assert_eq!(map_cli_state_invalid(invalid).code, "CLI_STATE_INVALID");
    }
}
