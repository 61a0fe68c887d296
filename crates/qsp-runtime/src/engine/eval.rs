use super::*;

use qsp_parser::ast::{BinaryOp, Expr, TextPart, UnaryOp, VarIndex, VarRef};
use qsp_parser::parse_format;

/// Resolved array slot: a numeric position or a text key.
#[derive(Debug, Clone)]
pub(super) enum Slot {
    Position(usize),
    Key(String),
    Append,
    /// Negative position: reads yield the default, writes are dropped.
    Outside,
}

impl QspEngine {
    pub(super) fn eval(&mut self, expr: &Expr) -> Exec<Variant> {
        match expr {
            Expr::Number(value) => Ok(Variant::Number(*value)),
            Expr::Text(value) => Ok(Variant::Text(value.clone())),
            Expr::Code(code) => Ok(Variant::Text(code.clone())),
            Expr::Format(parts) => Ok(Variant::Text(self.format_parts(parts)?)),
            Expr::Var(var) => self.read_var(var),
            Expr::Unary(op, operand) => self.eval_unary(*op, operand),
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right),
            Expr::Call { func, text, args } => {
                let value = self.call_builtin(*func, *text, args)?;
                Ok(if *text {
                    Variant::Text(value.into_text())
                } else {
                    value
                })
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr) -> Exec<Variant> {
        match op {
            UnaryOp::Neg => Ok(self.eval(operand)?.negate()?),
            UnaryOp::Not => Ok(Variant::from(!self.eval_truth(operand)?)),
            UnaryOp::Loc => {
                let name = self.eval_text(operand)?;
                Ok(Variant::from(self.find_location(&name).is_some()))
            }
            UnaryOp::Obj => {
                let name = self.eval_text(operand)?;
                Ok(Variant::from(self.object_position(&name).is_some()))
            }
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Exec<Variant> {
        match op {
            BinaryOp::And => {
                let value = self.eval_truth(left)? && self.eval_truth(right)?;
                return Ok(Variant::from(value));
            }
            BinaryOp::Or => {
                let value = self.eval_truth(left)? || self.eval_truth(right)?;
                return Ok(Variant::from(value));
            }
            _ => {}
        }
        let left = self.eval(left)?;
        let right = self.eval(right)?;
        let value = match op {
            BinaryOp::Mul => left.mul(&right)?,
            BinaryOp::Div => left.div(&right)?,
            BinaryOp::Mod => left.modulo(&right)?,
            BinaryOp::Add => left.add(&right),
            BinaryOp::Sub => left.sub(&right)?,
            BinaryOp::Concat => left.concat(&right),
            BinaryOp::Eq => Variant::from(left.compare(&right).is_eq()),
            BinaryOp::Ne => Variant::from(left.compare(&right).is_ne()),
            BinaryOp::Lt => Variant::from(left.compare(&right).is_lt()),
            BinaryOp::Le => Variant::from(left.compare(&right).is_le()),
            BinaryOp::Gt => Variant::from(left.compare(&right).is_gt()),
            BinaryOp::Ge => Variant::from(left.compare(&right).is_ge()),
            BinaryOp::And | BinaryOp::Or => Variant::default(),
        };
        Ok(value)
    }

    pub(super) fn eval_truth(&mut self, expr: &Expr) -> Exec<bool> {
        Ok(self.eval(expr)?.is_truthy()?)
    }

    pub(super) fn eval_text(&mut self, expr: &Expr) -> Exec<String> {
        Ok(self.eval(expr)?.into_text())
    }

    pub(super) fn eval_args(&mut self, args: &[Expr]) -> Exec<Vec<Variant>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    /// Expands `<<expr>>` substitutions of a description or action name.
    pub(super) fn format_text(&mut self, text: &str) -> Exec<String> {
        if !text.contains("<<") {
            return Ok(text.to_string());
        }
        let parts = parse_format(text, &self.parse_limits)?;
        self.format_parts(&parts)
    }

    fn format_parts(&mut self, parts: &[TextPart]) -> Exec<String> {
        let mut out = String::new();
        for part in parts {
            match part {
                TextPart::Literal(text) => out.push_str(text),
                TextPart::Subst(expr) => out.push_str(&self.eval_text(expr)?),
            }
        }
        Ok(out)
    }

    pub(super) fn resolve_slot(&mut self, var: &VarRef, writing: bool) -> Exec<Slot> {
        let index = match &var.index {
            VarIndex::Scalar => return Ok(Slot::Position(0)),
            VarIndex::Last if writing => return Ok(Slot::Append),
            VarIndex::Last => {
                return Ok(Slot::Position(self.vars.count(&var.name).saturating_sub(1)));
            }
            VarIndex::At(index) => self.eval(index)?,
        };
        Ok(slot_for(index))
    }

    pub(super) fn read_var(&mut self, var: &VarRef) -> Exec<Variant> {
        let slot = self.resolve_slot(var, false)?;
        Ok(self.read_slot(&var.name, slot, var.text))
    }

    pub(super) fn read_slot(&self, name: &str, slot: Slot, text: bool) -> Variant {
        let position = match slot {
            Slot::Position(position) => Some(position),
            Slot::Key(key) => self.vars.key_position(name, &key),
            Slot::Append | Slot::Outside => None,
        };
        match position {
            Some(position) => self.vars.get(name, position, text),
            None => Variant::empty(text),
        }
    }

    /// Current value behind a write slot; an append slot reads the last item.
    pub(super) fn read_for_update(&self, var: &VarRef, slot: &Slot) -> Variant {
        let slot = match slot {
            Slot::Append => Slot::Position(self.vars.count(&var.name).saturating_sub(1)),
            other => other.clone(),
        };
        self.read_slot(&var.name, slot, var.text)
    }

    pub(super) fn write_var(&mut self, var: &VarRef, value: Variant) -> Exec<()> {
        let slot = self.resolve_slot(var, true)?;
        self.write_slot(&var.name, slot, value.coerce(var.text)?)
    }

    pub(super) fn write_slot(&mut self, name: &str, slot: Slot, value: Variant) -> Exec<()> {
        match slot {
            Slot::Position(position) => self.vars.set(name, position, value)?,
            Slot::Key(key) => self.vars.set_by_key(name, &key, value)?,
            Slot::Append => self.vars.push(name, value)?,
            Slot::Outside => {}
        }
        Ok(())
    }

    /// Reads `name[index]` for a variable named at run time (`arritem`,
    /// `arrsize` and friends). The `$` prefix selects the text view.
    pub(super) fn read_named(&self, raw: &str, index: Option<Variant>) -> Exec<Variant> {
        let (name, text) = qsp_parser::normalize_var_name(raw)?;
        let slot = index.map(slot_for).unwrap_or(Slot::Position(0));
        Ok(self.read_slot(&name, slot, text))
    }
}

fn slot_for(index: Variant) -> Slot {
    match index {
        Variant::Text(key) => Slot::Key(key),
        Variant::Number(position) => usize::try_from(position)
            .map(Slot::Position)
            .unwrap_or(Slot::Outside),
    }
}
