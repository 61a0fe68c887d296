use qsp_core::{CurrentState, EngineState, ErrorRecord, GameBundle, ListItem, QspError};
use qsp_parser::decode_bundle;
use qsp_runtime::{EngineLimits, HostCallbacks, QspEngine, QspEngineOptions};

pub use qsp_core::describe_error;
pub use qsp_runtime::build_timestamp;

pub struct CreateSessionOptions {
    pub game: Vec<u8>,
    pub host: Option<Box<dyn HostCallbacks>>,
    pub limits: EngineLimits,
    pub random_seed: Option<u32>,
}

pub struct ResumeSessionOptions {
    pub game: Vec<u8>,
    pub state: Vec<u8>,
    pub host: Option<Box<dyn HostCallbacks>>,
    pub limits: EngineLimits,
}

pub fn decode_game(bytes: &[u8]) -> Result<GameBundle, QspError> {
    decode_bundle(bytes)
}

/// Loads `game` and runs its first location.
pub fn create_session(options: CreateSessionOptions) -> Result<QspSession, QspError> {
    let mut engine = QspEngine::new(QspEngineOptions {
        host: options.host,
        limits: options.limits,
        random_seed: options.random_seed,
        engine_version: None,
    });
    engine.load_bundle(&options.game, true)?;
    Ok(QspSession { engine })
}

/// Loads `game` without starting it, then restores `state` on top.
pub fn resume_session(options: ResumeSessionOptions) -> Result<QspSession, QspError> {
    let mut engine = QspEngine::new(QspEngineOptions {
        host: options.host,
        limits: options.limits,
        random_seed: None,
        engine_version: None,
    });
    engine.load_bundle(&options.game, false)?;
    engine.load_state(&options.state)?;
    Ok(QspSession { engine })
}

/// The embedding surface: every mutating call reports success as a bool and
/// leaves the details in [`QspSession::last_error`].
pub struct QspSession {
    engine: QspEngine,
}

impl Default for QspSession {
    fn default() -> Self {
        Self::initialize(QspEngineOptions::default())
    }
}

impl QspSession {
    pub fn initialize(options: QspEngineOptions) -> Self {
        Self {
            engine: QspEngine::new(options),
        }
    }

    pub fn engine(&self) -> &QspEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut QspEngine {
        &mut self.engine
    }

    pub fn terminate(&mut self) {
        self.engine.terminate();
    }

    pub fn load_bundle(&mut self, bytes: &[u8], is_new_game: bool) -> bool {
        let outcome = self.engine.load_bundle(bytes, is_new_game);
        self.finish("load_bundle", outcome, false)
    }

    pub fn restart(&mut self) -> bool {
        let outcome = self.engine.restart();
        self.finish("restart", outcome, false)
    }

    pub fn current_state(&self) -> CurrentState {
        self.engine.current_state()
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.engine_state()
    }

    pub fn main_description(&self) -> &str {
        self.engine.main_description()
    }

    pub fn vars_description(&self) -> &str {
        self.engine.vars_description()
    }

    pub fn actions(&self) -> Vec<ListItem> {
        self.engine.actions()
    }

    pub fn objects(&self) -> Vec<ListItem> {
        self.engine.objects()
    }

    pub fn variable_value_count(&self, name: &str) -> usize {
        self.engine.variable_value_count(name)
    }

    pub fn variable_index_by_text(&self, name: &str, key: &str) -> i64 {
        self.engine.variable_index_by_text(name, key)
    }

    pub fn numeric_variable(&self, name: &str, index: usize) -> i64 {
        self.engine.numeric_variable(name, index)
    }

    pub fn text_variable(&self, name: &str, index: usize) -> String {
        self.engine.text_variable(name, index)
    }

    pub fn pending_input_prompt(&self) -> Option<&str> {
        self.engine.pending_input_prompt()
    }

    pub fn version(&self) -> &str {
        self.engine.engine_version()
    }

    pub fn build_timestamp(&self) -> &'static str {
        build_timestamp()
    }

    pub fn set_input_text(&mut self, text: &str) {
        self.engine.set_input_text(text);
    }

    pub fn select_action(&mut self, index: usize, refresh: bool) -> bool {
        let outcome = self.engine.select_action(index);
        self.finish_selection("select_action", outcome, refresh)
    }

    pub fn execute_selected_action(&mut self, refresh: bool) -> bool {
        let outcome = self.engine.execute_selected_action();
        self.finish_selection("execute_selected_action", outcome, refresh)
    }

    pub fn select_object(&mut self, index: usize, refresh: bool) -> bool {
        let outcome = self.engine.select_object(index);
        self.finish_selection("select_object", outcome, refresh)
    }

    pub fn execute(&mut self, code: &str, refresh: bool) -> bool {
        let outcome = self.engine.execute_code(code);
        self.finish("execute", outcome, refresh)
    }

    /// Returns `None` when evaluation failed.
    pub fn evaluate_text(&mut self, expr: &str, refresh: bool) -> Option<String> {
        let outcome = self.engine.evaluate_text(expr);
        self.finish_value("evaluate_text", outcome, refresh)
    }

    pub fn evaluate_numeric(&mut self, expr: &str, refresh: bool) -> Option<i64> {
        let outcome = self.engine.evaluate_numeric(expr);
        self.finish_value("evaluate_numeric", outcome, refresh)
    }

    pub fn execute_location(&mut self, name: &str, refresh: bool) -> bool {
        let outcome = self.engine.execute_location(name);
        self.finish("execute_location", outcome, refresh)
    }

    pub fn run_counter(&mut self, refresh: bool) -> bool {
        let outcome = self.engine.run_counter();
        self.finish("run_counter", outcome, refresh)
    }

    pub fn submit_input(&mut self, refresh: bool) -> bool {
        let outcome = self.engine.submit_input();
        self.finish("submit_input", outcome, refresh)
    }

    pub fn last_error(&self) -> &ErrorRecord {
        self.engine.last_error()
    }

    pub fn describe_error(&self, ordinal: i32) -> &'static str {
        describe_error(ordinal)
    }

    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.engine.set_debug_mode(enabled);
    }

    pub fn save_state(&mut self, refresh: bool) -> Option<Vec<u8>> {
        let outcome = self.engine.save_state();
        self.finish_value("save_state", outcome, refresh)
    }

    pub fn load_state(&mut self, bytes: &[u8], refresh: bool) -> bool {
        let outcome = self.engine.load_state(bytes);
        self.finish("load_state", outcome, refresh)
    }

    fn finish(&mut self, operation: &str, outcome: Result<(), QspError>, refresh: bool) -> bool {
        self.finish_value(operation, outcome, refresh).is_some()
    }

    fn finish_selection(
        &mut self,
        operation: &str,
        outcome: Result<bool, QspError>,
        refresh: bool,
    ) -> bool {
        self.finish_value(operation, outcome, refresh)
            .unwrap_or(false)
    }

    fn finish_value<T>(
        &mut self,
        operation: &str,
        outcome: Result<T, QspError>,
        refresh: bool,
    ) -> Option<T> {
        match outcome {
            Ok(value) => {
                if refresh {
                    self.engine.refresh_host(false);
                }
                Some(value)
            }
            Err(error) => {
                tracing::debug!(operation, kind = error.kind.code(), "session call failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qsp_core::{ErrorKind, LocationSource};
    use qsp_parser::encode_game_file;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct RefreshCounter {
        refreshes: Rc<RefCell<Vec<(bool, bool)>>>,
    }

    impl HostCallbacks for RefreshCounter {
        fn refresh(&mut self, forced: bool, desc_changed: bool) {
            self.refreshes.borrow_mut().push((forced, desc_changed));
        }
    }

    fn game(locations: &[(&str, &str, &str)]) -> Vec<u8> {
        let bundle = GameBundle {
            locations: locations
                .iter()
                .map(|(name, desc, code)| LocationSource {
                    name: (*name).to_string(),
                    desc: (*desc).to_string(),
                    code: (*code).to_string(),
                    ..LocationSource::default()
                })
                .collect(),
        };
        encode_game_file(&bundle, false)
    }

    fn session(locations: &[(&str, &str, &str)]) -> QspSession {
        create_session(CreateSessionOptions {
            game: game(locations),
            host: None,
            limits: EngineLimits::default(),
            random_seed: Some(3),
        })
        .expect("session should start")
    }

    #[test]
    fn decode_game_reads_native_files() {
        let bundle = decode_game(&game(&[("start", "Hi", "x = 1")])).expect("game should decode");
        assert_eq!(bundle.locations.len(), 1);
        assert_eq!(bundle.locations[0].name, "start");
    }

    #[test]
    fn create_session_runs_the_first_location() {
        let session = session(&[("start", "Welcome", "x = 1 + 2\nact 'Wait': x += 1")]);
        assert_eq!(session.main_description(), "Welcome");
        assert_eq!(session.numeric_variable("x", 0), 3);
        assert_eq!(session.actions().len(), 1);
        assert_eq!(session.current_state().location.as_deref(), Some("start"));
    }

    #[test]
    fn create_session_rejects_garbage() {
        let error = match create_session(CreateSessionOptions {
            game: b"not a game".to_vec(),
            host: None,
            limits: EngineLimits::default(),
            random_seed: None,
        }) {
            Ok(_) => panic!("garbage should not load"),
            Err(error) => error,
        };
        assert_eq!(error.kind, ErrorKind::CannotLoadFile);
    }

    #[test]
    fn mutating_calls_report_success_as_bool() {
        let mut session = session(&[("start", "", "act 'Wait': waited = 1")]);
        assert!(session.execute("y = 5", false));
        assert_eq!(session.numeric_variable("y", 0), 5);

        assert!(!session.execute("y = 5 / 0", false));
        assert_eq!(session.last_error().kind, Some(ErrorKind::DivByZero));
        assert_eq!(
            session.describe_error(ErrorKind::DivByZero.ordinal()),
            "Division by zero!"
        );

        assert!(!session.select_action(3, false));
        assert!(session.select_action(0, false));
        assert!(session.execute_selected_action(false));
        assert_eq!(session.numeric_variable("waited", 0), 1);
    }

    #[test]
    fn evaluation_returns_values_or_none() {
        let mut session = session(&[("start", "", "$name = 'Ann'")]);
        assert_eq!(
            session.evaluate_text("$name + '!'", false).as_deref(),
            Some("Ann!")
        );
        assert_eq!(session.evaluate_numeric("len($name) * 2", false), Some(6));
        assert_eq!(session.evaluate_numeric("$name", false), Some(0));
        assert_eq!(session.evaluate_numeric("1 / 0", false), None);
        assert_eq!(session.last_error().kind, Some(ErrorKind::DivByZero));
    }

    #[test]
    fn refresh_flag_notifies_the_host() {
        let counter = RefreshCounter::default();
        let refreshes = counter.refreshes.clone();
        let mut session = create_session(CreateSessionOptions {
            game: game(&[("start", "", "")]),
            host: Some(Box::new(counter)),
            limits: EngineLimits::default(),
            random_seed: None,
        })
        .expect("session should start");

        assert!(session.execute("x = 1", false));
        assert!(refreshes.borrow().is_empty());
        assert!(session.execute("*p 'hello'", true));
        assert_eq!(refreshes.borrow().as_slice(), &[(false, true)]);

        assert!(!session.execute("*p 'again' & x = 1 / 0", true));
        assert_eq!(refreshes.borrow().len(), 1);
    }

    #[test]
    fn saved_state_resumes_in_a_fresh_session() {
        let locations = [("start", "", "gold = 10"), ("shop", "Shop", "")];
        let mut first = session(&locations);
        assert!(first.execute("gold -= 3\ngoto 'shop'", false));
        let state = first.save_state(false).expect("state should save");

        let resumed = resume_session(ResumeSessionOptions {
            game: game(&locations),
            state,
            host: None,
            limits: EngineLimits::default(),
        })
        .expect("state should resume");
        assert_eq!(resumed.numeric_variable("gold", 0), 7);
        assert_eq!(resumed.main_description(), "Shop");
        assert_eq!(resumed.current_state().location.as_deref(), Some("shop"));
    }

    #[test]
    fn load_state_failure_keeps_the_session() {
        let mut session = session(&[("start", "", "x = 4")]);
        assert!(!session.load_state(b"broken", false));
        assert_eq!(session.last_error().kind, Some(ErrorKind::CannotLoadFile));
        assert_eq!(session.numeric_variable("x", 0), 4);
        assert_eq!(session.engine_state(), EngineState::Idle);
    }

    #[test]
    fn version_and_timestamp_are_exposed() {
        let session = QspSession::default();
        assert!(!session.version().is_empty());
        assert!(!session.build_timestamp().is_empty());
        assert_eq!(session.engine_state(), EngineState::Idle);
    }
}
