use super::*;

use qsp_parser::ast::{LOOP_BODY, LOOP_STEP};

impl QspEngine {
    /// Steps until the stack is back to `floor` frames. A goto or restore that
    /// replaces the stack underneath ends the run with [`Interrupt::Restarted`].
    pub(super) fn run_frames(&mut self, floor: usize) -> Exec<()> {
        let epoch = self.epoch;
        while self.frames.len() > floor {
            self.step()?;
            if self.epoch != epoch {
                return Err(Interrupt::Restarted);
            }
        }
        Ok(())
    }

    fn step(&mut self) -> Exec<()> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        if matches!(frame.kind, FrameKind::Hooks { .. }) {
            return self.step_hooks();
        }
        let block = frame.block.clone();
        let Some(line) = block.lines.get(frame.line) else {
            return self.finish_block();
        };
        if frame.stmt >= line.stmts.len() {
            frame.line += 1;
            frame.stmt = 0;
            return Ok(());
        }
        let (line_index, stmt_index) = (frame.line, frame.stmt);
        if stmt_index == 0 && frame.tracks_lines {
            self.real.line = line.line_num;
        }
        if stmt_index == 0 && self.debug {
            tracing::trace!(line = line.line_num, text = %line.text, "exec line");
            self.host.debug(&line.text);
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.exec = Some((line_index, stmt_index));
            frame.stmt += 1;
        }
        let depth = self.frames.len();
        let epoch = self.epoch;
        match self.exec_statement(&line.stmts[stmt_index]) {
            Err(Interrupt::Suspend(prompt)) => {
                if self.epoch == epoch {
                    while self.frames.len() > depth {
                        self.pop_frame();
                    }
                    if let Some(frame) = self.frames.get_mut(depth - 1) {
                        frame.line = line_index;
                        frame.stmt = stmt_index;
                    }
                }
                Err(Interrupt::Suspend(prompt))
            }
            other => other,
        }
    }

    fn step_hooks(&mut self) -> Exec<()> {
        let Some(FrameKind::Hooks { var, args, next }) =
            self.frames.last_mut().map(|frame| &mut frame.kind)
        else {
            return Ok(());
        };
        let index = *next;
        *next += 1;
        let (var, args) = (var.clone(), args.clone());
        if index >= self.vars.count(&var) {
            self.pop_frame();
            return Ok(());
        }
        let name = self.vars.get(&var, index, true).into_text();
        if name.trim().is_empty() {
            return Ok(());
        }
        tracing::debug!(hook = %var, location = %name, "run hook");
        self.enter_location(&name, args, false, false)
    }

    /// Called when the top frame ran past its last line.
    fn finish_block(&mut self) -> Exec<()> {
        let Some(frame) = self.frames.last() else {
            return Ok(());
        };
        let FrameKind::Loop { stmt, phase } = &frame.kind else {
            self.pop_frame();
            return Ok(());
        };
        let stmt = stmt.clone();
        match *phase {
            LoopPhase::Init | LoopPhase::Step => {
                self.set_loop_phase(LoopPhase::Check, Rc::new(CodeBlock::default()), None);
            }
            LoopPhase::Check => {
                if self.eval_truth(&stmt.cond)? {
                    self.set_loop_phase(LoopPhase::Body, stmt.body.clone(), Some(LOOP_BODY));
                } else {
                    self.pop_frame();
                }
            }
            LoopPhase::Body => {
                self.set_loop_phase(LoopPhase::Step, stmt.step.clone(), Some(LOOP_STEP));
            }
        }
        Ok(())
    }

    fn set_loop_phase(&mut self, next: LoopPhase, block: Rc<CodeBlock>, branch: Option<usize>) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if let FrameKind::Loop { phase, .. } = &mut frame.kind {
            *phase = next;
        }
        if let (Some(branch), Some(step)) = (branch, frame.path.last_mut()) {
            step.branch = branch;
        }
        frame.block = block;
        frame.line = 0;
        frame.stmt = 0;
        frame.exec = None;
    }
}
