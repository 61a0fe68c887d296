use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::{
    collect_boundary, load_session_from_state_for_ref, map_line_io, save_session_state,
    BoundaryEvent, BoundaryResult, CliError, LineCommandAction, LineCommandContext, PlayerSession,
};

const HELP: &str = "commands: :help :save :load :restart :quit (a number runs an action, `obj N` selects an object)";

pub(crate) fn run_line_mode(state_file: &str, player: &mut PlayerSession) -> Result<i32, CliError> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut writer = io::stdout();
    run_line_mode_with_io(state_file, player, &mut reader, &mut writer)
}

pub(crate) fn run_line_mode_with_io(
    state_file: &str,
    player: &mut PlayerSession,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> Result<i32, CliError> {
    writeln!(writer, "QSP player").map_err(map_line_io)?;
    writeln!(writer, "{}", HELP).map_err(map_line_io)?;
    let context = LineCommandContext { state_file };

    loop {
        let boundary = collect_boundary(player);
        render_boundary(&boundary, writer)?;
        if boundary.event == BoundaryEvent::End {
            writeln!(writer, "[END]").map_err(map_line_io)?;
            return Ok(0);
        }

        loop {
            let Some(raw) = prompt_input_from("> ", reader, writer)? else {
                return Ok(0);
            };
            let mut emit = |line: String| {
                let _ = writeln!(writer, "{}", line);
            };
            match handle_line_cmd(raw.as_str(), &context, player, &mut emit)? {
                LineCommandAction::Continue => continue,
                LineCommandAction::RefreshBoundary => break,
                LineCommandAction::Quit => return Ok(0),
                LineCommandAction::NotHandled => {}
            }
            if let Err(error) = apply_player_line(&raw, &boundary, player) {
                writeln!(writer, "error: {}", error).map_err(map_line_io)?;
            }
            break;
        }
    }
}

fn render_boundary(boundary: &BoundaryResult, writer: &mut dyn Write) -> Result<(), CliError> {
    let mut out = String::new();
    out.push('\n');
    if !boundary.main_text.is_empty() {
        out.push_str(&boundary.main_text.replace("\r\n", "\n"));
        out.push('\n');
    }
    if !boundary.vars_text.is_empty() {
        out.push_str("[stats]\n");
        out.push_str(&boundary.vars_text.replace("\r\n", "\n"));
        out.push('\n');
    }
    for message in &boundary.messages {
        out.push_str(&format!("[message] {}\n", message.replace("\r\n", "\n")));
    }
    if !boundary.objects.is_empty() {
        out.push_str("objects:\n");
        for (index, name) in &boundary.objects {
            out.push_str(&format!("  ({}) {}\n", index, name));
        }
    }
    for (index, name) in &boundary.actions {
        out.push_str(&format!("  [{}] {}\n", index, name));
    }
    if let Some(prompt) = &boundary.input_prompt_text {
        out.push_str(prompt);
        out.push('\n');
    }
    write!(writer, "{}", out).map_err(map_line_io)
}

/// Feeds a non-command line to the game: input answer, action, object or user command.
fn apply_player_line(
    raw: &str,
    boundary: &BoundaryResult,
    player: &mut PlayerSession,
) -> Result<(), CliError> {
    if boundary.event == BoundaryEvent::Input {
        player.session.set_input_text(raw);
        let submitted = player.session.submit_input(false);
        return player.check(submitted);
    }
    if let Ok(index) = raw.trim().parse::<usize>() {
        if index >= boundary.actions.len() {
            return Err(CliError::new(
                "LINE_ACTION_INDEX",
                format!("Invalid action index: {}", raw),
            ));
        }
        let selected = player.session.select_action(index, false);
        player.check(selected)?;
        let executed = player.session.execute_selected_action(false);
        return player.check(executed);
    }
    if let Some(rest) = raw.trim().strip_prefix("obj ") {
        let index = rest
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|index| *index < boundary.objects.len())
            .ok_or_else(|| {
                CliError::new("LINE_OBJECT_INDEX", format!("Invalid object index: {}", rest))
            })?;
        let selected = player.session.select_object(index, false);
        return player.check(selected);
    }
    player.session.set_input_text(raw);
    let submitted = player.session.submit_input(false);
    player.check(submitted)
}

pub(crate) fn handle_line_command(
    raw: &str,
    state_file: &str,
    player: &mut PlayerSession,
    emit: &mut dyn FnMut(String),
) -> Result<LineCommandAction, CliError> {
    match raw {
        ":help" => {
            emit(HELP.to_string());
            Ok(LineCommandAction::Continue)
        }
        ":save" => {
            let game_id = player.game_id.clone();
            save_session_state(Path::new(state_file), player, &game_id)?;
            emit(format!("saved: {}", state_file));
            Ok(LineCommandAction::Continue)
        }
        ":load" => {
            let (_, _, resumed) = load_session_from_state_for_ref(Path::new(state_file))?;
            *player = resumed;
            emit(format!("loaded: {}", state_file));
            Ok(LineCommandAction::RefreshBoundary)
        }
        ":restart" => {
            let restarted = player.session.restart();
            player.check(restarted)?;
            emit("restarted".to_string());
            Ok(LineCommandAction::RefreshBoundary)
        }
        ":quit" => {
            emit("bye".to_string());
            Ok(LineCommandAction::Quit)
        }
        _ => Ok(LineCommandAction::NotHandled),
    }
}

pub(crate) fn handle_line_cmd(
    raw: &str,
    context: &LineCommandContext<'_>,
    player: &mut PlayerSession,
    emit: &mut dyn FnMut(String),
) -> Result<LineCommandAction, CliError> {
    handle_line_command(raw, context.state_file, player, emit)
}

/// Reads one line; `None` at end of input.
pub(crate) fn prompt_input_from(
    prefix: &str,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> Result<Option<String>, CliError> {
    write!(writer, "{}", prefix).map_err(map_line_io)?;
    writer.flush().map_err(map_line_io)?;
    let mut input = String::new();
    let read = reader.read_line(&mut input).map_err(map_line_io)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim_end_matches(&['\r', '\n'][..]).to_string()))
}
