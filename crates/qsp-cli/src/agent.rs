use std::path::Path;

use crate::{
    collect_boundary, create_session_for_game, emit_boundary_with_saved_state,
    load_game_by_path, load_session_from_state_for_ref, AgentArgs, AgentCommand, CliError,
    ExecArgs, IndexArgs, InputArgs, PlayerSession, StartArgs, StateArgs,
};

pub(super) fn run_agent(args: AgentArgs) -> Result<i32, CliError> {
    match args.command {
        AgentCommand::Start(args) => run_start(args),
        AgentCommand::Act(args) => run_act(args),
        AgentCommand::Obj(args) => run_obj(args),
        AgentCommand::Input(args) => run_input(args),
        AgentCommand::Exec(args) => run_exec(args),
        AgentCommand::Counter(args) => run_counter(args),
    }
}

pub(super) fn run_start(args: StartArgs) -> Result<i32, CliError> {
    let game = load_game_by_path(&args.game)?;
    let mut player = create_session_for_game(&game)?;

    let boundary = collect_boundary(&mut player);
    emit_boundary_with_saved_state(&mut player, boundary, &args.state_out, &game.id)
}

pub(super) fn run_act(args: IndexArgs) -> Result<i32, CliError> {
    run_state_transition(&args.state_in, &args.state_out, |player| {
        let count = player.session.actions().len();
        if args.index >= count {
            return Err(CliError::new(
                "CLI_ACTION_INDEX",
                format!("Action index {} is out of range (0..{}).", args.index, count),
            ));
        }
        let selected = player.session.select_action(args.index, false);
        player.check(selected)?;
        let executed = player.session.execute_selected_action(false);
        player.check(executed)
    })
}

pub(super) fn run_obj(args: IndexArgs) -> Result<i32, CliError> {
    run_state_transition(&args.state_in, &args.state_out, |player| {
        let count = player.session.objects().len();
        if args.index >= count {
            return Err(CliError::new(
                "CLI_OBJECT_INDEX",
                format!("Object index {} is out of range (0..{}).", args.index, count),
            ));
        }
        let selected = player.session.select_object(args.index, false);
        player.check(selected)
    })
}

/// Answers a pending `input` prompt, or sends a user command when none is pending.
pub(super) fn run_input(args: InputArgs) -> Result<i32, CliError> {
    run_state_transition(&args.state_in, &args.state_out, |player| {
        player.session.set_input_text(&args.text);
        let submitted = player.session.submit_input(false);
        player.check(submitted)
    })
}

pub(super) fn run_exec(args: ExecArgs) -> Result<i32, CliError> {
    run_state_transition(&args.state_in, &args.state_out, |player| {
        let executed = player.session.execute(&args.code, false);
        player.check(executed)
    })
}

pub(super) fn run_counter(args: StateArgs) -> Result<i32, CliError> {
    run_state_transition(&args.state_in, &args.state_out, |player| {
        let counted = player.session.run_counter(false);
        player.check(counted)
    })
}

fn run_state_transition(
    state_in: &str,
    state_out: &str,
    transition: impl FnOnce(&mut PlayerSession) -> Result<(), CliError>,
) -> Result<i32, CliError> {
    let (game, _state, mut player) = load_session_from_state_for_ref(Path::new(state_in))?;
    player.take_messages();
    transition(&mut player)?;
    let boundary = collect_boundary(&mut player);
    emit_boundary_with_saved_state(&mut player, boundary, state_out, &game.id)
}
