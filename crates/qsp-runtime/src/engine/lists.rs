use super::*;

fn same_name(left: &str, right: &str) -> bool {
    left.to_uppercase() == right.to_uppercase()
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

impl QspEngine {
    /// Adds an action unless one with the same name is already listed.
    pub(super) fn add_action(&mut self, action: ActionEntry) -> Exec<()> {
        if self
            .actions
            .iter()
            .any(|existing| same_name(&existing.name, &action.name))
        {
            return Ok(());
        }
        if self.actions.len() >= self.limits.max_actions {
            return Err(QspError::new(
                ErrorKind::CannotAddAction,
                format!("Cannot add action \"{}\".", action.name),
            )
            .into());
        }
        self.actions.push(action);
        self.changes.actions = true;
        Ok(())
    }

    pub(super) fn remove_action(&mut self, name: &str) {
        let Some(index) = self
            .actions
            .iter()
            .position(|action| same_name(&action.name, name))
        else {
            return;
        };
        if self.selected_action.is_some_and(|selected| selected >= index) {
            self.selected_action = None;
        }
        self.actions.remove(index);
        self.changes.actions = true;
    }

    pub(super) fn clear_actions(&mut self) {
        if !self.actions.is_empty() {
            self.changes.actions = true;
        }
        self.actions.clear();
        self.selected_action = None;
    }

    pub(super) fn object_position(&self, name: &str) -> Option<usize> {
        self.objects
            .iter()
            .position(|object| same_name(&object.name, name))
    }

    /// `addobj name[, image[, position]]`; `position` is 1-based and may point
    /// one past the end. Out-of-range positions are ignored.
    pub(super) fn add_object(
        &mut self,
        name: String,
        image: Option<String>,
        position: Option<i64>,
    ) -> Exec<()> {
        let index = match position {
            Some(position) => match usize::try_from(position.saturating_sub(1)) {
                Ok(index) if index <= self.objects.len() => index,
                _ => return Ok(()),
            },
            None => self.objects.len(),
        };
        if self.objects.len() >= self.limits.max_objects {
            return Err(QspError::new(
                ErrorKind::CannotAddObject,
                format!("Cannot add object \"{}\".", name),
            )
            .into());
        }
        if self.selected_object.is_some_and(|selected| selected >= index) {
            self.selected_object = None;
        }
        let image = image.filter(|image| !image.trim().is_empty());
        self.objects.insert(
            index,
            ListItem {
                name: name.clone(),
                image: image.clone(),
            },
        );
        self.changes.objects = true;
        let mut args = vec![Variant::Text(name)];
        if let Some(image) = image {
            args.push(Variant::Text(image));
        }
        self.run_hooks_nested("ONOBJADD", args)
    }

    pub(super) fn remove_object(&mut self, index: usize) -> Exec<()> {
        if index >= self.objects.len() {
            return Ok(());
        }
        if self.selected_object.is_some_and(|selected| selected >= index) {
            self.selected_object = None;
        }
        let removed = self.objects.remove(index);
        self.changes.objects = true;
        self.run_hooks_nested("ONOBJDEL", vec![Variant::Text(removed.name)])
    }

    /// Empties the object list, then runs ONOBJDEL once per removed object.
    pub(super) fn remove_all_objects(&mut self) -> Exec<()> {
        if self.objects.is_empty() {
            return Ok(());
        }
        let removed = std::mem::take(&mut self.objects);
        self.selected_object = None;
        self.changes.objects = true;
        for object in removed {
            self.run_hooks_nested("ONOBJDEL", vec![Variant::Text(object.name)])?;
        }
        Ok(())
    }

    /// `menu 'name'[, start[, count]]`: shows the text items of an array as a
    /// menu and runs the location of the chosen item.
    pub(super) fn show_menu(&mut self, var: &str, start: Option<i64>, count: Option<i64>) -> Exec<()> {
        let (name, _) = qsp_parser::normalize_var_name(var)?;
        let mut index = start.unwrap_or(0).max(0) as usize;
        let max_items = count.map(|count| count.max(0) as usize);
        let mut items = Vec::new();
        let mut targets = Vec::new();
        while index < self.vars.count(&name) {
            if max_items.is_some_and(|max| items.len() >= max) {
                break;
            }
            let Some(Variant::Text(entry)) = self.vars.value(&name, index).cloned() else {
                break;
            };
            if entry.trim().is_empty() {
                break;
            }
            let Some(last) = entry.rfind(':') else {
                return Err(QspError::new(
                    ErrorKind::ColonNotFound,
                    format!("Menu item \"{}\" has no location.", entry),
                )
                .into());
            };
            if items.len() >= self.limits.max_menu_items {
                return Err(QspError::new(
                    ErrorKind::CannotAddMenuItem,
                    format!("Menu exceeds {} items.", self.limits.max_menu_items),
                )
                .into());
            }
            let (label, target, image) = match entry[..last].rfind(':') {
                Some(first) => {
                    let image = &entry[last + 1..];
                    (
                        &entry[..first],
                        &entry[first + 1..last],
                        (!image.trim().is_empty()).then(|| image.to_string()),
                    )
                }
                None => (&entry[..last], &entry[last + 1..], None),
            };
            items.push(ListItem {
                name: label.to_string(),
                image,
            });
            targets.push(target.to_string());
            index += 1;
        }
        if items.is_empty() {
            return Ok(());
        }
        let Some(choice) = self.host.show_menu(&items) else {
            return Ok(());
        };
        let Some(target) = targets.get(choice) else {
            return Ok(());
        };
        tracing::debug!(choice, location = %target, "menu choice");
        let target = target.clone();
        self.call_location(&target, vec![Variant::Number(choice as i64 + 1)])?;
        Ok(())
    }

    /// Script that recreates the current actions (`$curacts`).
    pub(super) fn actions_as_code(&self) -> String {
        let mut out = String::new();
        for action in &self.actions {
            out.push_str("ACT ");
            out.push_str(&quote(&action.name));
            if let Some(image) = &action.image {
                out.push_str(", ");
                out.push_str(&quote(image));
            }
            out.push(':');
            let body = match &action.code {
                CodeRef::Source { text, .. } => text.clone(),
                CodeRef::BaseAction { location, index } => self
                    .find_location(location)
                    .and_then(|found| self.locations[found].source.actions.get(*index))
                    .map(|base| base.code.clone())
                    .unwrap_or_default(),
                CodeRef::Location { .. } => String::new(),
            };
            out.push_str(LINE_BREAK);
            if !body.is_empty() {
                out.push_str(&body);
                out.push_str(LINE_BREAK);
            }
            out.push_str("END");
            out.push_str(LINE_BREAK);
        }
        out
    }

    /// Script that recreates the current objects (`$curobjs`).
    pub(super) fn objects_as_code(&self) -> String {
        let mut out = String::new();
        for object in &self.objects {
            out.push_str("ADDOBJ ");
            out.push_str(&quote(&object.name));
            if let Some(image) = &object.image {
                out.push_str(", ");
                out.push_str(&quote(image));
            }
            out.push_str(LINE_BREAK);
        }
        out
    }
}
