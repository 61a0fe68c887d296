use super::*;

use qsp_parser::ast::{ActStatement, AssignOp, Expr, Statement, VarRef, LOOP_INIT};
use qsp_parser::{decode_bundle, normalize_var_name, Command};

fn text_arg(values: &[Variant], index: usize) -> Option<String> {
    values.get(index).map(|value| value.to_text())
}

fn number_arg(values: &[Variant], index: usize) -> Result<Option<i64>, QspError> {
    let Some(value) = values.get(index) else {
        return Ok(None);
    };
    value.try_to_number().map(Some).ok_or_else(|| {
        QspError::new(
            ErrorKind::TypeMismatch,
            format!("Expected a number, got \"{}\".", value),
        )
    })
}

fn first_text(values: &[Variant]) -> String {
    text_arg(values, 0).unwrap_or_default()
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|text| !text.trim().is_empty())
}

impl QspEngine {
    pub(super) fn exec_statement(&mut self, stmt: &Statement) -> Exec<()> {
        match stmt {
            Statement::Assign {
                targets,
                op,
                values,
            } => self.exec_assign(targets, *op, values),
            Statement::Local { targets, values } => self.exec_local(targets, values),
            Statement::Print(expr) => {
                let text = self.eval_text(expr)?;
                self.main_desc.push_str(&text);
                self.main_desc.push_str(LINE_BREAK);
                self.changes.main_desc = true;
                Ok(())
            }
            Statement::Command { command, args } => self.exec_command(*command, args),
            Statement::If(branches) => {
                for (index, branch) in branches.iter().enumerate() {
                    let taken = match &branch.cond {
                        Some(cond) => self.eval_truth(cond)?,
                        None => true,
                    };
                    if taken {
                        self.push_child(FrameKind::Block, index, branch.body.clone());
                        break;
                    }
                }
                Ok(())
            }
            Statement::Act(act) => self.exec_act(act),
            Statement::Loop(spec) => {
                self.push_child(
                    FrameKind::Loop {
                        stmt: spec.clone(),
                        phase: LoopPhase::Init,
                    },
                    LOOP_INIT,
                    spec.init.clone(),
                );
                Ok(())
            }
            Statement::Invalid(error) => Err(error.clone().into()),
            Statement::IfHead(_)
            | Statement::ElseIf(_)
            | Statement::Else
            | Statement::End
            | Statement::ActHead { .. }
            | Statement::LoopHead { .. } => Err(QspError::new(
                ErrorKind::Syntax,
                "Block statement outside of its block.",
            )
            .into()),
        }
    }

    /// Every target slot and value is resolved before the first write, so a
    /// failing index or coercion leaves all targets untouched.
    fn exec_assign(&mut self, targets: &[VarRef], op: AssignOp, values: &[Expr]) -> Exec<()> {
        let values = self.eval_args(values)?;
        let mut writes = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            let value = match (op, values.get(index)) {
                (AssignOp::Set, Some(value)) => value.clone(),
                (AssignOp::Set, None) => Variant::empty(target.text),
                (_, None) => continue,
                (_, Some(value)) => value.clone(),
            };
            let slot = self.resolve_slot(target, true)?;
            let value = match op {
                AssignOp::Set => value,
                AssignOp::Add => self.read_for_update(target, &slot).add(&value),
                AssignOp::Sub => self.read_for_update(target, &slot).sub(&value)?,
                AssignOp::Mul => self.read_for_update(target, &slot).mul(&value)?,
                AssignOp::Div => self.read_for_update(target, &slot).div(&value)?,
            };
            writes.push((target, slot, value.coerce(target.text)?));
        }
        for (target, slot, value) in writes {
            self.write_slot(&target.name, slot, value)?;
        }
        Ok(())
    }

    fn exec_local(&mut self, targets: &[VarRef], values: &[Expr]) -> Exec<()> {
        let values = self.eval_args(values)?;
        for target in targets {
            self.declare_local(&target.name);
        }
        for (target, value) in targets.iter().zip(values) {
            self.write_var(target, value)?;
        }
        Ok(())
    }

    fn exec_act(&mut self, act: &ActStatement) -> Exec<()> {
        let name = self.eval_text(&act.name)?;
        let image = match &act.image {
            Some(image) => non_empty(Some(self.eval_text(image)?)),
            None => None,
        };
        self.add_action(ActionEntry {
            name,
            image,
            code: CodeRef::Source {
                text: act.source.clone(),
                first_line: act.first_line,
            },
            block: act.body.clone(),
            location: self.real.location.clone(),
            action_index: self.real.action_index,
        })
    }

    /// Pushes `code` as a call with `ARGS` set; the frame machine runs it next.
    pub(super) fn push_source_call(
        &mut self,
        code: String,
        args: Vec<Variant>,
        capture_result: bool,
    ) -> Exec<()> {
        let code = CodeRef::Source {
            text: code,
            first_line: 1,
        };
        let block = self.code_block(&code)?;
        self.push_routine(code, block, None, -1, args, capture_result)
    }

    fn exec_command(&mut self, command: Command, args: &[Expr]) -> Exec<()> {
        let values = self.eval_args(args)?;
        match command {
            Command::AddObj => {
                let position = number_arg(&values, 2)?;
                self.add_object(first_text(&values), text_arg(&values, 1), position)?;
            }
            Command::DelObj => {
                if let Some(index) = self.object_position(&first_text(&values)) {
                    self.remove_object(index)?;
                }
            }
            Command::KillObj => match number_arg(&values, 0)? {
                Some(position) => {
                    if let Ok(index) = usize::try_from(position.saturating_sub(1)) {
                        self.remove_object(index)?;
                    }
                }
                None => self.remove_all_objects()?,
            },
            Command::Unselect => self.selected_object = None,
            Command::DelAct => self.remove_action(&first_text(&values)),
            Command::Cla => self.clear_actions(),
            Command::Cls => {
                self.clear_vars_desc();
                self.clear_main_desc();
                self.clear_actions();
                self.input_text.clear();
                self.host.set_input_text("");
            }
            Command::CmdClear => {
                self.input_text.clear();
                self.host.set_input_text("");
            }
            Command::Clear => self.clear_vars_desc(),
            Command::MainClear => self.clear_main_desc(),
            Command::P => self.print_vars(&first_text(&values), false, false),
            Command::Pl => self.print_vars(&first_text(&values), false, true),
            Command::Nl => self.print_vars(&first_text(&values), true, false),
            Command::MainP => self.print_main(&first_text(&values), false, false),
            Command::MainPl => self.print_main(&first_text(&values), false, true),
            Command::MainNl => self.print_main(&first_text(&values), true, false),
            Command::Msg => self.host.show_message(&first_text(&values)),
            Command::CopyArr => {
                let (dest, _) = normalize_var_name(&first_text(&values))?;
                let (source, _) = normalize_var_name(&text_arg(&values, 1).unwrap_or_default())?;
                let start = number_arg(&values, 2)?.unwrap_or(0).max(0) as usize;
                let count = number_arg(&values, 3)?.map(|count| count.max(0) as usize);
                self.vars.copy_array(&dest, &source, start, count)?;
            }
            Command::KillVar => match values.first() {
                None => self.vars.clear(),
                Some(name) => {
                    let (name, _) = normalize_var_name(&name.to_text())?;
                    match values.get(1) {
                        None => self.vars.remove(&name),
                        Some(Variant::Number(index)) => {
                            if let Ok(index) = usize::try_from(*index) {
                                self.vars.remove_item(&name, index);
                            }
                        }
                        Some(Variant::Text(key)) => {
                            if let Some(index) = self.vars.key_position(&name, key) {
                                self.vars.remove_item(&name, index);
                            }
                        }
                    }
                }
            },
            Command::KillAll => {
                self.vars.clear();
                self.remove_all_objects()?;
            }
            Command::Dynamic => {
                let mut values = values.into_iter();
                let code = values.next().map(Variant::into_text).unwrap_or_default();
                self.push_source_call(code, values.collect(), false)?;
            }
            Command::Exec => {
                let command = first_text(&values);
                if !command.trim().is_empty() {
                    self.host.system(&command);
                }
            }
            Command::Exit => self.exit_routine(),
            Command::GoSub | Command::GoTo | Command::XGoTo => {
                let mut values = values.into_iter();
                let name = values.next().map(Variant::into_text).unwrap_or_default();
                let args: Vec<Variant> = values.collect();
                match command {
                    Command::GoSub => {
                        tracing::debug!(location = %name, "gosub");
                        self.enter_location(&name, args, false, false)?;
                    }
                    Command::GoTo => self.navigate(&name, args, true)?,
                    _ => self.navigate(&name, args, false)?,
                }
            }
            Command::Jump => self.jump_to_label(&first_text(&values))?,
            Command::Menu => {
                let start = number_arg(&values, 1)?;
                let count = number_arg(&values, 2)?;
                self.show_menu(&first_text(&values), start, count)?;
            }
            Command::OpenGame => self.open_saved_game(non_empty(text_arg(&values, 0)))?,
            Command::SaveGame => self.save_game(non_empty(text_arg(&values, 0)))?,
            Command::OpenQst => {
                let path = first_text(&values);
                if !path.trim().is_empty() {
                    self.open_quest(&path)?;
                }
            }
            Command::IncLib => self.include_library(&first_text(&values))?,
            Command::FreeLib => self.drop_included_locations(),
            Command::Play => {
                let path = first_text(&values);
                if !path.trim().is_empty() {
                    let volume = number_arg(&values, 1)?.unwrap_or(100).clamp(0, 100);
                    self.host.play_file(&path, volume);
                }
            }
            Command::Close => match non_empty(text_arg(&values, 0)) {
                Some(path) => self.host.close_file(Some(&path)),
                None => self.host.close_file(None),
            },
            Command::CloseAll => self.host.close_file(None),
            Command::View => {
                let path = non_empty(text_arg(&values, 0)).unwrap_or_default();
                self.host.show_image(&path);
            }
            Command::RefInt => self.refresh_host(true),
            Command::SetTimer => {
                let msecs = number_arg(&values, 0)?.unwrap_or(0).max(0);
                self.timer_interval = msecs;
                self.host.set_timer(msecs);
            }
            Command::ShowActs => self.show_window(WindowKind::Actions, &values)?,
            Command::ShowObjs => self.show_window(WindowKind::Objects, &values)?,
            Command::ShowStat => self.show_window(WindowKind::Vars, &values)?,
            Command::ShowInput => self.show_window(WindowKind::Input, &values)?,
            Command::Wait => {
                let msecs = number_arg(&values, 0)?.unwrap_or(0).max(0);
                self.refresh_host(true);
                self.host.sleep(msecs);
            }
        }
        Ok(())
    }

    fn print_vars(&mut self, text: &str, break_before: bool, break_after: bool) {
        if !break_before && !break_after && text.is_empty() {
            return;
        }
        if break_before {
            self.vars_desc.push_str(LINE_BREAK);
        }
        self.vars_desc.push_str(text);
        if break_after {
            self.vars_desc.push_str(LINE_BREAK);
        }
        self.changes.vars_desc = true;
    }

    fn print_main(&mut self, text: &str, break_before: bool, break_after: bool) {
        if !break_before && !break_after && text.is_empty() {
            return;
        }
        if break_before {
            self.main_desc.push_str(LINE_BREAK);
        }
        self.main_desc.push_str(text);
        if break_after {
            self.main_desc.push_str(LINE_BREAK);
        }
        self.changes.main_desc = true;
    }

    fn clear_vars_desc(&mut self) {
        if !self.vars_desc.is_empty() {
            self.vars_desc.clear();
            self.changes.vars_desc = true;
        }
    }

    fn clear_main_desc(&mut self) {
        if !self.main_desc.is_empty() {
            self.main_desc.clear();
            self.changes.main_desc = true;
        }
    }

    fn show_window(&mut self, kind: WindowKind, values: &[Variant]) -> Exec<()> {
        let visible = number_arg(values, 0)?.unwrap_or(0) != 0;
        self.windows.set(kind, visible);
        self.host.show_window(kind, visible);
        Ok(())
    }

    /// `openqst`: swaps the world for another game file and starts it over
    /// without resetting variables.
    fn open_quest(&mut self, path: &str) -> Exec<()> {
        let bytes = self.host.read_game_file(path).ok_or_else(|| {
            QspError::new(
                ErrorKind::FileNotFound,
                format!("Game file \"{}\" not found.", path),
            )
        })?;
        let bundle = decode_bundle(&bytes)?;
        tracing::debug!(path, locations = bundle.locations.len(), "open quest");
        self.install_bundle(bundle);
        self.start_new_game(false)
    }

    /// `inclib`: adds the locations of another game file that are not
    /// already defined.
    fn include_library(&mut self, path: &str) -> Exec<()> {
        let bytes = self.host.read_game_file(path).ok_or_else(|| {
            QspError::new(
                ErrorKind::FileNotFound,
                format!("Library \"{}\" not found.", path),
            )
        })?;
        let bundle = decode_bundle(&bytes).map_err(|error| {
            QspError::new(
                ErrorKind::CannotIncludeFile,
                format!("Cannot include \"{}\": {}", path, error.message),
            )
        })?;
        let mut added = 0;
        for source in bundle.locations {
            if self.install_location(source, true) {
                added += 1;
            }
        }
        tracing::debug!(path, added, "library included");
        Ok(())
    }

    fn open_saved_game(&mut self, path: Option<String>) -> Exec<()> {
        let Some(bytes) = self.host.open_game(path.as_deref()) else {
            return match path {
                Some(path) => Err(QspError::new(
                    ErrorKind::FileNotFound,
                    format!("Saved game \"{}\" not found.", path),
                )
                .into()),
                None => Ok(()),
            };
        };
        self.restore(&bytes)?;
        if self.pending_input.is_none() {
            self.push_hooks("ONGLOAD", Vec::new());
        }
        Ok(())
    }

    fn save_game(&mut self, path: Option<String>) -> Exec<()> {
        self.run_hooks_nested("ONGSAVE", Vec::new())?;
        let bytes = self.snapshot()?;
        if !self.host.save_game(path.as_deref(), &bytes) {
            tracing::warn!(path = ?path, "host did not save the game");
        }
        Ok(())
    }
}
