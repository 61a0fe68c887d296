use crate::{BoundaryEvent, BoundaryResult, PlayerSession};

/// Reads what the player sees after an operation. Pending input wins; a
/// location without actions or objects ends the game for the player.
pub(crate) fn collect_boundary(player: &mut PlayerSession) -> BoundaryResult {
    let session = &player.session;
    let input_prompt_text = session.pending_input_prompt().map(str::to_string);
    let actions: Vec<(usize, String)> = session
        .actions()
        .into_iter()
        .enumerate()
        .map(|(index, item)| (index, item.name))
        .collect();
    let objects: Vec<(usize, String)> = session
        .objects()
        .into_iter()
        .enumerate()
        .map(|(index, item)| (index, item.name))
        .collect();
    let event = if input_prompt_text.is_some() {
        BoundaryEvent::Input
    } else if actions.is_empty() && objects.is_empty() {
        BoundaryEvent::End
    } else {
        BoundaryEvent::Actions
    };

    BoundaryResult {
        event,
        location: session.current_state().location,
        main_text: session.main_description().to_string(),
        vars_text: session.vars_description().to_string(),
        messages: player.take_messages(),
        actions,
        objects,
        input_prompt_text,
    }
}

fn json(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

pub(crate) fn emit_boundary(boundary: BoundaryResult, state_out: Option<String>) {
    println!("RESULT:OK");
    match boundary.event {
        BoundaryEvent::Actions => println!("EVENT:ACTIONS"),
        BoundaryEvent::Input => println!("EVENT:INPUT"),
        BoundaryEvent::End => println!("EVENT:END"),
    }

    if let Some(location) = boundary.location {
        println!("LOCATION_JSON:{}", json(&location));
    }
    println!("MAIN_JSON:{}", json(&boundary.main_text));
    if !boundary.vars_text.is_empty() {
        println!("VARS_JSON:{}", json(&boundary.vars_text));
    }

    for message in boundary.messages {
        println!("MESSAGE_JSON:{}", json(&message));
    }

    if let Some(prompt) = boundary.input_prompt_text {
        println!("PROMPT_JSON:{}", json(&prompt));
    }

    for (index, name) in boundary.actions {
        println!("ACTION:{}|{}", index, json(&name));
    }

    for (index, name) in boundary.objects {
        println!("OBJECT:{}|{}", index, json(&name));
    }

    println!(
        "STATE_OUT:{}",
        state_out.unwrap_or_else(|| "NONE".to_string())
    );
}

#[cfg(test)]
mod boundary_runner_tests {
    use super::*;
    use crate::cli_test_support::*;
    use crate::{create_session_for_game, load_game_by_path};

    #[test]
    fn collect_boundary_reports_actions_input_and_end() {
        let dir = temp_path("boundary-runner");
        let game_path = write_game(
            &dir,
            "# start\n*p 'Hall'\nmsg 'Welcome'\naddobj 'Lamp'\nact 'Ask': $name = input('Name?')\n--\n",
        );
        let game = load_game_by_path(game_path.to_string_lossy().as_ref()).expect("game");
        let mut player = create_session_for_game(&game).expect("session should start");

        let boundary = collect_boundary(&mut player);
        assert_eq!(boundary.event, BoundaryEvent::Actions);
        assert_eq!(boundary.location.as_deref(), Some("start"));
        assert_eq!(boundary.main_text, "Hall");
        assert_eq!(boundary.messages, vec!["Welcome".to_string()]);
        assert_eq!(boundary.actions, vec![(0, "Ask".to_string())]);
        assert_eq!(boundary.objects, vec![(0, "Lamp".to_string())]);
        assert!(collect_boundary(&mut player).messages.is_empty());

        assert!(player.session.select_action(0, false));
        assert!(player.session.execute_selected_action(false));
        let boundary = collect_boundary(&mut player);
        assert_eq!(boundary.event, BoundaryEvent::Input);
        assert_eq!(boundary.input_prompt_text.as_deref(), Some("Name?"));

        player.session.set_input_text("Ann");
        assert!(player.session.submit_input(false));
        assert_eq!(player.session.text_variable("$name", 0), "Ann");
        assert!(player.session.execute("cla\nkillobj", false));
        assert_eq!(collect_boundary(&mut player).event, BoundaryEvent::End);
    }
}
