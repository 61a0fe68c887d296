use std::collections::BTreeMap;

use qsp_core::{ErrorKind, QspError, VariableData, Variant};

/// Named array variables. Names are stored upper-cased without the `$`
/// prefix; element 0 doubles as the scalar value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableStore {
    vars: BTreeMap<String, VariableData>,
    max_variables: usize,
    max_array_len: usize,
}

impl VariableStore {
    pub fn new(max_variables: usize, max_array_len: usize) -> Self {
        Self {
            vars: BTreeMap::new(),
            max_variables,
            max_array_len,
        }
    }

    /// Lenient name normalization used by host-facing queries.
    pub fn normalize(name: &str) -> String {
        name.trim().trim_start_matches('$').to_uppercase()
    }

    pub fn value(&self, name: &str, index: usize) -> Option<&Variant> {
        self.vars.get(name).and_then(|data| data.values.get(index))
    }

    /// Reads element `index` converted to the requested view. Missing
    /// elements and failed conversions yield the view's default.
    pub fn get(&self, name: &str, index: usize, text: bool) -> Variant {
        match self.value(name, index) {
            Some(Variant::Text(value)) if text => Variant::Text(value.clone()),
            Some(Variant::Number(value)) if !text => Variant::Number(*value),
            Some(other) => other
                .clone()
                .coerce(text)
                .unwrap_or_else(|_| Variant::empty(text)),
            None => Variant::empty(text),
        }
    }

    pub fn count(&self, name: &str) -> usize {
        self.vars.get(name).map(|data| data.values.len()).unwrap_or(0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    fn entry(&mut self, name: &str) -> Result<&mut VariableData, QspError> {
        if !self.vars.contains_key(name) {
            if self.vars.len() >= self.max_variables {
                return Err(QspError::new(
                    ErrorKind::TooManyVars,
                    format!("Cannot create variable \"{}\".", name),
                ));
            }
            self.vars.insert(name.to_string(), VariableData::default());
        }
        self.vars.get_mut(name).ok_or_else(|| {
            QspError::new(
                ErrorKind::TooManyVars,
                format!("Cannot create variable \"{}\".", name),
            )
        })
    }

    fn check_index(&self, name: &str, index: usize) -> Result<(), QspError> {
        if index >= self.max_array_len {
            return Err(QspError::new(
                ErrorKind::TooManyItems,
                format!(
                    "Index {} of \"{}\" exceeds the array limit {}.",
                    index, name, self.max_array_len
                ),
            ));
        }
        Ok(())
    }

    /// Stores `value` at `index`, growing the array with defaults of the same type.
    pub fn set(&mut self, name: &str, index: usize, value: Variant) -> Result<(), QspError> {
        self.check_index(name, index)?;
        let data = self.entry(name)?;
        if index >= data.values.len() {
            let filler = Variant::empty(value.is_text());
            data.values.resize(index + 1, filler);
        }
        data.values[index] = value;
        Ok(())
    }

    pub fn push(&mut self, name: &str, value: Variant) -> Result<(), QspError> {
        let index = self.count(name);
        self.set(name, index, value)
    }

    /// Position bound to a text key, or `None`. Keys compare case-insensitively.
    pub fn key_position(&self, name: &str, key: &str) -> Option<usize> {
        self.vars
            .get(name)
            .and_then(|data| data.indices.get(&key.to_uppercase()).copied())
    }

    /// Host query form of [`Self::key_position`]: `-1` when absent.
    pub fn index_by_text(&self, name: &str, key: &str) -> i64 {
        self.key_position(name, key)
            .map(|index| index as i64)
            .unwrap_or(-1)
    }

    pub fn set_by_key(&mut self, name: &str, key: &str, value: Variant) -> Result<(), QspError> {
        let index = match self.key_position(name, key) {
            Some(index) => index,
            None => {
                let index = self.count(name);
                self.check_index(name, index)?;
                self.entry(name)?.indices.insert(key.to_uppercase(), index);
                index
            }
        };
        self.set(name, index, value)
    }

    /// First element at or after `start` equal to `value`, compared in the
    /// value's own view; `-1` when none matches.
    pub fn index_of(&self, name: &str, value: &Variant, start: usize) -> i64 {
        let text = value.is_text();
        (start..self.count(name))
            .find(|index| self.get(name, *index, text) == *value)
            .map(|index| index as i64)
            .unwrap_or(-1)
    }

    pub fn remove(&mut self, name: &str) {
        self.vars.remove(name);
    }

    /// Removes one element, shifting later elements and their keys down.
    pub fn remove_item(&mut self, name: &str, index: usize) {
        let Some(data) = self.vars.get_mut(name) else {
            return;
        };
        if index >= data.values.len() {
            return;
        }
        data.values.remove(index);
        data.indices.retain(|_, position| *position != index);
        for position in data.indices.values_mut() {
            if *position > index {
                *position -= 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Replaces `dest` with `count` elements of `source` starting at `start`.
    pub fn copy_array(
        &mut self,
        dest: &str,
        source: &str,
        start: usize,
        count: Option<usize>,
    ) -> Result<(), QspError> {
        if dest == source {
            return Ok(());
        }
        let Some(data) = self.vars.get(source).cloned() else {
            self.remove(dest);
            return Ok(());
        };
        let end = count
            .map(|count| start.saturating_add(count))
            .unwrap_or(data.values.len())
            .min(data.values.len());
        let values: Vec<Variant> = data
            .values
            .get(start..end)
            .map(<[Variant]>::to_vec)
            .unwrap_or_default();
        let indices = data
            .indices
            .into_iter()
            .filter(|(_, position)| (start..end).contains(position))
            .map(|(key, position)| (key, position - start))
            .collect();
        self.entry(dest)?;
        self.vars
            .insert(dest.to_string(), VariableData { values, indices });
        Ok(())
    }

    /// Replaces the whole array, dropping text keys.
    pub fn set_array(&mut self, name: &str, values: Vec<Variant>) -> Result<(), QspError> {
        if let Some(last) = values.len().checked_sub(1) {
            self.check_index(name, last)?;
        }
        self.entry(name)?;
        self.vars.insert(
            name.to_string(),
            VariableData {
                values,
                indices: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Detaches a variable so it can be put back later by [`Self::restore`].
    pub fn take(&mut self, name: &str) -> Option<VariableData> {
        self.vars.remove(name)
    }

    /// Puts back what [`Self::take`] returned; restoring bypasses the variable limit.
    pub fn restore(&mut self, name: &str, data: Option<VariableData>) {
        match data {
            Some(data) => {
                self.vars.insert(name.to_string(), data);
            }
            None => {
                self.vars.remove(name);
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }

    pub fn data(&self) -> &BTreeMap<String, VariableData> {
        &self.vars
    }

    pub fn replace_data(&mut self, vars: BTreeMap<String, VariableData>) {
        self.vars = vars;
    }
}
