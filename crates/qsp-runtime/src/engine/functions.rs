use super::*;

use qsp_core::is_numeric_text;
use qsp_parser::ast::Expr;
use qsp_parser::{normalize_var_name, Builtin};

fn text_at(values: &[Variant], index: usize) -> String {
    values.get(index).map(Variant::to_text).unwrap_or_default()
}

fn number_at(values: &[Variant], index: usize) -> Result<Option<i64>, QspError> {
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

/// Converts a byte offset of `text` into a 1-based character position.
fn char_position(text: &str, byte: usize) -> i64 {
    text[..byte].chars().count() as i64 + 1
}

/// Byte offset of the `index`-th character, or `None` past the end.
fn byte_offset(text: &str, index: usize) -> Option<usize> {
    text.char_indices().map(|(offset, _)| offset).nth(index)
}

fn rgb(values: &[i64]) -> i64 {
    let channel = |index: usize, default: i64| {
        values.get(index).copied().unwrap_or(default).clamp(0, 255) as u32
    };
    let packed = (channel(3, 255) << 24) | (channel(2, 0) << 16) | (channel(1, 0) << 8) | channel(0, 0);
    i64::from(packed as i32)
}

impl QspEngine {
    pub(super) fn call_builtin(&mut self, func: Builtin, text: bool, args: &[Expr]) -> Exec<Variant> {
        if func == Builtin::IIf {
            let Some(cond) = args.first() else {
                return Ok(Variant::empty(text));
            };
            let branch = if self.eval_truth(cond)? { 1 } else { 2 };
            return match args.get(branch) {
                Some(expr) => self.eval(expr),
                None => Ok(Variant::empty(text)),
            };
        }
        let values = self.eval_args(args)?;
        let value = match func {
            Builtin::IIf => Variant::empty(text),
            Builtin::ArrItem => {
                let index = values.get(1).cloned();
                self.read_named(&text_at(&values, 0), index)?
            }
            Builtin::ArrSize => {
                let (name, _) = normalize_var_name(&text_at(&values, 0))?;
                Variant::Number(self.vars.count(&name) as i64)
            }
            Builtin::ArrPos => {
                let start = number_at(&values, 2)?.unwrap_or(0);
                let needle = values.get(1).cloned().unwrap_or_default();
                Variant::Number(self.array_position(&text_at(&values, 0), &needle, start)?)
            }
            Builtin::ArrComp => {
                let start = number_at(&values, 2)?.unwrap_or(0);
                let pattern = text_at(&values, 1);
                Variant::Number(self.array_match(&text_at(&values, 0), &pattern, start)?)
            }
            Builtin::Min | Builtin::Max => {
                let want = if func == Builtin::Min {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                };
                if values.len() == 1 {
                    self.array_extreme(&text_at(&values, 0), want)?
                } else {
                    let mut best = values.first().cloned().unwrap_or_default();
                    for value in values.iter().skip(1) {
                        if value.compare(&best) == want {
                            best = value.clone();
                        }
                    }
                    best
                }
            }
            Builtin::Rand => {
                let min = number_at(&values, 0)?.unwrap_or(0);
                let max = number_at(&values, 1)?.unwrap_or(1);
                Variant::Number(self.random_range(min, max))
            }
            Builtin::Rnd => Variant::Number(self.random_range(1, 1000)),
            Builtin::Rgb => {
                let mut channels = Vec::with_capacity(values.len());
                for index in 0..values.len() {
                    channels.push(number_at(&values, index)?.unwrap_or(0));
                }
                Variant::Number(rgb(&channels))
            }
            Builtin::Len => Variant::Number(text_at(&values, 0).chars().count() as i64),
            Builtin::IsNum => Variant::from(match values.first() {
                Some(Variant::Number(_)) => true,
                Some(Variant::Text(value)) => is_numeric_text(value),
                None => false,
            }),
            Builtin::LCase => Variant::Text(text_at(&values, 0).to_lowercase()),
            Builtin::UCase => Variant::Text(text_at(&values, 0).to_uppercase()),
            Builtin::Trim => Variant::Text(text_at(&values, 0).trim().to_string()),
            Builtin::Str => Variant::Text(text_at(&values, 0)),
            Builtin::Val => Variant::Number(
                values
                    .first()
                    .and_then(Variant::try_to_number)
                    .unwrap_or(0),
            ),
            Builtin::Input => Variant::Text(self.input(&text_at(&values, 0))?),
            Builtin::IsPlay => {
                let path = text_at(&values, 0);
                Variant::from(!path.trim().is_empty() && self.host.is_playing(&path))
            }
            Builtin::Desc => {
                let name = text_at(&values, 0);
                let index = self.find_location(&name).ok_or_else(|| {
                    QspError::new(
                        ErrorKind::LocationNotFound,
                        format!("Location \"{}\" not found.", name),
                    )
                })?;
                let desc = self.locations[index].source.desc.clone();
                Variant::Text(self.nested(|engine| engine.format_text(&desc))?)
            }
            Builtin::GetObj => {
                let position = number_at(&values, 0)?.unwrap_or(0);
                let name = usize::try_from(position.saturating_sub(1))
                    .ok()
                    .and_then(|index| self.objects.get(index))
                    .map(|object| object.name.clone())
                    .unwrap_or_default();
                Variant::Text(name)
            }
            Builtin::StrComp => {
                let regex = self.full_regex(&text_at(&values, 1))?;
                Variant::from(regex.is_match(&text_at(&values, 0)))
            }
            Builtin::StrFind => {
                let regex = self.regex(&text_at(&values, 1))?;
                let group = number_at(&values, 2)?.unwrap_or(0).max(0) as usize;
                let subject = text_at(&values, 0);
                let found = regex
                    .captures(&subject)
                    .and_then(|captures| captures.get(group))
                    .map(|matched| matched.as_str().to_string())
                    .unwrap_or_default();
                Variant::Text(found)
            }
            Builtin::StrPos => {
                let regex = self.regex(&text_at(&values, 1))?;
                let group = number_at(&values, 2)?.unwrap_or(0).max(0) as usize;
                let subject = text_at(&values, 0);
                let position = regex
                    .captures(&subject)
                    .and_then(|captures| captures.get(group))
                    .map(|matched| char_position(&subject, matched.start()))
                    .unwrap_or(0);
                Variant::Number(position)
            }
            Builtin::Mid => {
                let subject = text_at(&values, 0);
                let start = number_at(&values, 1)?.unwrap_or(1).saturating_sub(1).max(0) as usize;
                let len = number_at(&values, 2)?.map(|len| len.max(0) as usize);
                let chars = subject.chars().skip(start);
                Variant::Text(match len {
                    Some(len) => chars.take(len).collect(),
                    None => chars.collect(),
                })
            }
            Builtin::Instr => {
                let subject = text_at(&values, 0);
                let search = text_at(&values, 1);
                let start = number_at(&values, 2)?.unwrap_or(1).saturating_sub(1).max(0) as usize;
                let position = byte_offset(&subject, start)
                    .and_then(|offset| {
                        subject[offset..]
                            .find(&search)
                            .map(|found| char_position(&subject, offset + found))
                    })
                    .unwrap_or(0);
                Variant::Number(position)
            }
            Builtin::Replace => {
                let subject = text_at(&values, 0);
                let search = text_at(&values, 1);
                if search.is_empty() {
                    Variant::Text(subject)
                } else {
                    Variant::Text(subject.replace(&search, &text_at(&values, 2)))
                }
            }
            Builtin::Func => {
                let mut values = values.into_iter();
                let name = values.next().map(Variant::into_text).unwrap_or_default();
                self.call_location(&name, values.collect())?
                    .unwrap_or_else(|| Variant::empty(text))
            }
            Builtin::DynEval => {
                let mut values = values.into_iter();
                let code = values.next().map(Variant::into_text).unwrap_or_default();
                self.eval_code(code, values.collect())?
                    .unwrap_or_else(|| Variant::empty(text))
            }
            Builtin::CountObj => Variant::Number(self.objects.len() as i64),
            Builtin::MsecsCount => {
                let elapsed = self.started.elapsed().as_millis() as i64;
                Variant::Number(self.host.msecs_count().unwrap_or(elapsed))
            }
            Builtin::QspVer => {
                let param = text_at(&values, 0);
                let version = self
                    .host
                    .version(&param)
                    .unwrap_or_else(|| self.engine_version.clone());
                Variant::Text(version)
            }
            Builtin::UserText => Variant::Text(self.input_text.clone()),
            Builtin::CurLoc => Variant::Text(self.current_location.clone().unwrap_or_default()),
            Builtin::SelObj => Variant::Text(
                self.selected_object
                    .and_then(|index| self.objects.get(index))
                    .map(|object| object.name.clone())
                    .unwrap_or_default(),
            ),
            Builtin::SelAct => Variant::Text(
                self.selected_action
                    .and_then(|index| self.actions.get(index))
                    .map(|action| action.name.clone())
                    .unwrap_or_default(),
            ),
            Builtin::MainText => Variant::Text(self.main_desc.clone()),
            Builtin::StatText => Variant::Text(self.vars_desc.clone()),
            Builtin::CurActs => Variant::Text(self.actions_as_code()),
            Builtin::CurObjs => Variant::Text(self.objects_as_code()),
        };
        Ok(value)
    }

    /// `dyneval`: runs code text to completion as a nested call.
    fn eval_code(&mut self, code: String, args: Vec<Variant>) -> Exec<Option<Variant>> {
        if code.trim().is_empty() {
            return Ok(None);
        }
        self.nested(|engine| {
            let floor = engine.frames.len();
            engine.last_result = None;
            engine.push_source_call(code, args, true)?;
            engine.run_frames(floor)?;
            Ok(engine.last_result.take())
        })
    }

    /// Answer for an `input` call. At the top level a missing answer suspends
    /// the operation until the host submits one.
    pub(super) fn input(&mut self, prompt: &str) -> Exec<String> {
        if let Some(answer) = self.resume_input.take() {
            return Ok(answer);
        }
        match self.host.input_box(prompt) {
            Some(answer) => Ok(answer),
            None if self.nesting == 0 => {
                tracing::debug!(prompt, "waiting for input");
                Err(Interrupt::Suspend(prompt.to_string()))
            }
            None => Ok(String::new()),
        }
    }

    fn regex(&mut self, pattern: &str) -> Result<Regex, QspError> {
        if let Some(position) = self
            .regex_cache
            .iter()
            .position(|(cached, _)| cached == pattern)
        {
            let entry = self.regex_cache.remove(position);
            let regex = entry.1.clone();
            self.regex_cache.insert(0, entry);
            return Ok(regex);
        }
        let regex = Regex::new(pattern).map_err(|error| {
            QspError::new(
                ErrorKind::IncorrectRegexp,
                format!("Incorrect regular expression \"{}\": {}", pattern, error),
            )
        })?;
        if self.regex_cache.len() >= REGEX_CACHE_SIZE {
            self.regex_cache.pop();
        }
        self.regex_cache.insert(0, (pattern.to_string(), regex.clone()));
        Ok(regex)
    }

    /// Regex that must match the whole subject.
    fn full_regex(&mut self, pattern: &str) -> Result<Regex, QspError> {
        self.regex(pattern)?;
        self.regex(&format!(r"\A(?:{})\z", pattern))
    }

    fn array_position(&self, raw: &str, needle: &Variant, start: i64) -> Exec<i64> {
        let (name, text) = normalize_var_name(raw)?;
        let Ok(needle) = needle.clone().coerce(text) else {
            return Ok(-1);
        };
        Ok(self.vars.index_of(&name, &needle, start.max(0) as usize))
    }

    fn array_match(&mut self, raw: &str, pattern: &str, start: i64) -> Exec<i64> {
        let (name, _) = normalize_var_name(raw)?;
        let regex = self.full_regex(pattern)?;
        let found = (start.max(0) as usize..self.vars.count(&name))
            .find(|index| regex.is_match(&self.vars.get(&name, *index, true).into_text()))
            .map(|index| index as i64)
            .unwrap_or(-1);
        Ok(found)
    }

    /// Smallest or largest item of an array; text arrays skip empty items.
    fn array_extreme(&self, raw: &str, want: std::cmp::Ordering) -> Exec<Variant> {
        let (name, text) = normalize_var_name(raw)?;
        let mut best: Option<Variant> = None;
        for index in 0..self.vars.count(&name) {
            let value = self.vars.get(&name, index, text);
            if text && value.as_text().is_some_and(str::is_empty) {
                continue;
            }
            if best.as_ref().map_or(true, |current| value.compare(current) == want) {
                best = Some(value);
            }
        }
        Ok(best.unwrap_or_else(|| Variant::empty(text)))
    }
}

#[cfg(test)]
mod functions_tests {
    use super::runtime_test_support::*;
    use super::*;

    fn numeric(engine: &mut QspEngine, expr: &str) -> i64 {
        engine.evaluate_numeric(expr).expect("numeric expression")
    }

    fn textual(engine: &mut QspEngine, expr: &str) -> String {
        engine.evaluate_text(expr).expect("text expression")
    }

    #[test]
    fn string_functions() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        assert_eq!(numeric(&mut engine, "len('héllo')"), 5);
        assert_eq!(textual(&mut engine, "$mid('abcdef', 2, 3)"), "bcd");
        assert_eq!(textual(&mut engine, "$mid('abcdef', 4)"), "def");
        assert_eq!(textual(&mut engine, "$mid('abc', 9)"), "");
        assert_eq!(numeric(&mut engine, "instr('abcabc', 'c')"), 3);
        assert_eq!(numeric(&mut engine, "instr('abcabc', 'c', 4)"), 6);
        assert_eq!(numeric(&mut engine, "instr('abc', 'z')"), 0);
        assert_eq!(textual(&mut engine, "$replace('a-b-c', '-', '+')"), "a+b+c");
        assert_eq!(textual(&mut engine, "$replace('a-b', '-')"), "ab");
        assert_eq!(textual(&mut engine, "$replace('ab', '')"), "ab");
        assert_eq!(textual(&mut engine, "$ucase('aB') + $lcase('Cd')"), "ABcd");
        assert_eq!(textual(&mut engine, "$trim('  x  ')"), "x");
        assert_eq!(textual(&mut engine, "$str(12)"), "12");
        assert_eq!(numeric(&mut engine, "val('42') + val('x')"), 42);
        assert_eq!(numeric(&mut engine, "isnum(' -3 ')"), -1);
        assert_eq!(numeric(&mut engine, "isnum('3a')"), 0);
    }

    #[test]
    fn extreme_positions_do_not_overflow() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        run_code(&mut engine, "m = -9223372036854775807 - 1 & addobj 'Key'");
        assert_eq!(textual(&mut engine, "$mid('abc', m)"), "abc");
        assert_eq!(textual(&mut engine, "$mid('abc', 2, m)"), "");
        assert_eq!(numeric(&mut engine, "instr('abc', 'b', m)"), 2);
        assert_eq!(textual(&mut engine, "$getobj(m)"), "");
        run_code(&mut engine, "killobj m & addobj 'Lamp', '', m");
        assert_eq!(numeric(&mut engine, "countobj"), 1);
    }

    #[test]
    fn regex_functions() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        assert_eq!(numeric(&mut engine, "strcomp('abc', 'a.c')"), -1);
        assert_eq!(numeric(&mut engine, "strcomp('abcd', 'a.c')"), 0);
        assert_eq!(textual(&mut engine, "$strfind('id: 42', '(\\d+)', 1)"), "42");
        assert_eq!(textual(&mut engine, "$strfind('none', '\\d+')"), "");
        assert_eq!(numeric(&mut engine, "strpos('ab12', '\\d')"), 3);
        assert_eq!(numeric(&mut engine, "strpos('ab', '\\d')"), 0);
        let error = engine.evaluate_numeric("strcomp('a', '(')").expect_err("bad regex");
        assert_eq!(error.kind, ErrorKind::IncorrectRegexp);
    }

    #[test]
    fn regex_cache_stays_bounded() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        for index in 0..(REGEX_CACHE_SIZE + 5) {
            numeric(&mut engine, &format!("strpos('x', 'a{}')", index));
        }
        assert_eq!(engine.regex_cache.len(), REGEX_CACHE_SIZE);
    }

    #[test]
    fn array_functions() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        run_code(
            &mut engine,
            "n[0] = 5 & n[1] = 2 & n[2] = 9 & $t[0] = 'pear' & $t[1] = '' & $t[2] = 'apple'",
        );
        assert_eq!(numeric(&mut engine, "arrsize('n')"), 3);
        assert_eq!(numeric(&mut engine, "arritem('n', 2)"), 9);
        assert_eq!(textual(&mut engine, "$arritem('$t', 2)"), "apple");
        assert_eq!(numeric(&mut engine, "arrpos('n', 9)"), 2);
        assert_eq!(numeric(&mut engine, "arrpos('n', 5, 1)"), -1);
        assert_eq!(numeric(&mut engine, "arrpos('$t', 'apple')"), 2);
        assert_eq!(numeric(&mut engine, "arrcomp('$t', 'p.*')"), 0);
        assert_eq!(numeric(&mut engine, "arrcomp('$t', 'a.*')"), 2);
        assert_eq!(numeric(&mut engine, "max('n')"), 9);
        assert_eq!(numeric(&mut engine, "min('n')"), 2);
        assert_eq!(textual(&mut engine, "$min('$t')"), "apple");
        assert_eq!(numeric(&mut engine, "max(3, 11, 7)"), 11);
        assert_eq!(textual(&mut engine, "$min('b', 'a', 'c')"), "a");
    }

    #[test]
    fn rand_and_rgb() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        for _ in 0..20 {
            let value = numeric(&mut engine, "rand(5, 3)");
            assert!((3..=5).contains(&value));
            let value = numeric(&mut engine, "rand(0)");
            assert!((0..=1).contains(&value));
            let value = numeric(&mut engine, "rnd");
            assert!((1..=1000).contains(&value));
        }
        assert_eq!(numeric(&mut engine, "rgb(255, 0, 0, 0)"), 255);
        assert_eq!(numeric(&mut engine, "rgb(0, 300, -5, 0)"), 255 << 8);
        assert_eq!(numeric(&mut engine, "rgb(0, 0, 0)"), i64::from(0xFF00_0000_u32 as i32));
    }

    #[test]
    fn iif_only_evaluates_the_chosen_branch() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        assert_eq!(numeric(&mut engine, "iif(1, 7, 1 / 0)"), 7);
        assert_eq!(textual(&mut engine, "$iif(0, 1 / 0, 'no')"), "no");
    }

    #[test]
    fn func_and_dyneval_return_result() {
        let mut engine = engine_from_locations(vec![
            location("start", ""),
            location("double", "result = args[0] * 2"),
            location("silent", "x = 1"),
        ]);
        assert_eq!(numeric(&mut engine, "func('double', 21)"), 42);
        assert_eq!(textual(&mut engine, "$func('silent')"), "");
        assert_eq!(numeric(&mut engine, "dyneval('result = args[0] + args[1]', 2, 3)"), 5);
        assert_eq!(textual(&mut engine, "$dyneval('')"), "");
        let error = engine.evaluate_numeric("func('nowhere')").expect_err("missing");
        assert_eq!(error.kind, ErrorKind::LocationNotFound);
    }

    #[test]
    fn state_queries() {
        let mut engine = engine_from_locations(vec![location_with_actions(
            "start",
            "Room <<1 + 1>>",
            "",
            &[],
        )]);
        engine.restart().expect("restart");
        engine.set_input_text("typed");
        run_code(&mut engine, "p 'stats' & addobj 'Key' & act 'Go': x = 1");
        assert_eq!(textual(&mut engine, "$curloc"), "start");
        assert_eq!(textual(&mut engine, "$user_text"), "typed");
        assert_eq!(textual(&mut engine, "$maintxt"), "Room 2");
        assert_eq!(textual(&mut engine, "$stattxt"), "stats");
        assert_eq!(textual(&mut engine, "$desc('start')"), "Room 2");
        assert_eq!(textual(&mut engine, "$selact"), "");
        assert!(engine.select_action(0).expect("select"));
        assert_eq!(textual(&mut engine, "$selact"), "Go");
        assert_eq!(textual(&mut engine, "$qspver"), engine.engine_version().to_string());
        assert!(numeric(&mut engine, "msecscount") >= 0);
        assert_eq!(numeric(&mut engine, "isplay('')"), 0);
        let error = engine.evaluate_text("$desc('nowhere')").expect_err("missing");
        assert_eq!(error.kind, ErrorKind::LocationNotFound);
    }

    #[test]
    fn nested_input_without_answer_is_empty() {
        let mut host = RecordingHost::default();
        host.inputs.push_back(Some("Ann".to_string()));
        let log = host.log.clone();
        let mut engine = engine_with_host(
            vec![location("start", ""), location("ask", "$result = $input('Again?')")],
            host,
        );
        run_code(&mut engine, "$name = $input('Name?') & $again = $func('ask')");
        assert_eq!(text(&engine, "name"), "Ann");
        assert_eq!(text(&engine, "again"), "");
        assert!(log.borrow().contains(&"input:Again?".to_string()));
    }
}
