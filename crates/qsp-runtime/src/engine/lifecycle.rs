use super::*;

use qsp_parser::{compile_code, decode_bundle};

pub const DEFAULT_ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn build_timestamp() -> &'static str {
    option_env!("QSP_BUILD_TIMESTAMP").unwrap_or("unknown")
}

/// Notifications and questions the engine sends to its embedder. Every method
/// has a do-nothing default so hosts implement only what they display.
pub trait HostCallbacks {
    fn debug(&mut self, _text: &str) {}

    fn play_file(&mut self, _path: &str, _volume: i64) {}

    fn is_playing(&mut self, _path: &str) -> bool {
        false
    }

    /// `None` closes every playing file.
    fn close_file(&mut self, _path: Option<&str>) {}

    /// Empty `path` hides the picture.
    fn show_image(&mut self, _path: &str) {}

    fn show_window(&mut self, _kind: WindowKind, _visible: bool) {}

    /// Returns the chosen item, `None` when the menu was dismissed.
    fn show_menu(&mut self, _items: &[ListItem]) -> Option<usize> {
        None
    }

    fn show_message(&mut self, _text: &str) {}

    fn refresh(&mut self, _forced: bool, _desc_changed: bool) {}

    fn set_timer(&mut self, _msecs: i64) {}

    fn set_input_text(&mut self, _text: &str) {}

    fn system(&mut self, _command: &str) {}

    /// Bytes of a game file for `openqst` and `inclib`.
    fn read_game_file(&mut self, _path: &str) -> Option<Vec<u8>> {
        None
    }

    /// Saved state for `opengame`; `None` path lets the host pick one.
    fn open_game(&mut self, _path: Option<&str>) -> Option<Vec<u8>> {
        None
    }

    fn save_game(&mut self, _path: Option<&str>, _state: &[u8]) -> bool {
        false
    }

    fn sleep(&mut self, _msecs: i64) {}

    /// Overrides the engine's own millisecond clock.
    fn msecs_count(&mut self) -> Option<i64> {
        None
    }

    /// `None` means no answer yet; at a resumable point the engine then waits
    /// for `submit_input`.
    fn input_box(&mut self, _prompt: &str) -> Option<String> {
        None
    }

    fn version(&mut self, _param: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Default)]
pub struct NullHost;

impl HostCallbacks for NullHost {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    pub max_variables: usize,
    pub max_array_len: usize,
    pub max_call_depth: usize,
    /// Depth of `func`, `dyneval` and hook calls made from inside an expression
    /// or statement. Each level runs on the native stack.
    pub max_nested_calls: usize,
    pub max_actions: usize,
    pub max_objects: usize,
    pub max_menu_items: usize,
    pub max_expression_items: usize,
    pub max_expression_depth: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_variables: 16384,
            max_array_len: 65536,
            max_call_depth: 256,
            max_nested_calls: 16,
            max_actions: 50,
            max_objects: 1000,
            max_menu_items: 100,
            max_expression_items: 200,
            max_expression_depth: 30,
        }
    }
}

#[derive(Default)]
pub struct QspEngineOptions {
    pub host: Option<Box<dyn HostCallbacks>>,
    pub limits: EngineLimits,
    pub random_seed: Option<u32>,
    pub engine_version: Option<String>,
}

impl QspEngine {
    pub fn new(options: QspEngineOptions) -> Self {
        let limits = options.limits;
        let initial_random_seed = options.random_seed.unwrap_or(1);
        Self {
            host: options.host.unwrap_or_else(|| Box::new(NullHost)),
            limits,
            parse_limits: ParseLimits {
                max_expression_items: limits.max_expression_items,
                max_expression_depth: limits.max_expression_depth,
            },
            engine_version: options
                .engine_version
                .unwrap_or_else(|| DEFAULT_ENGINE_VERSION.to_string()),
            initial_random_seed,
            loaded: false,
            game_id: 0,
            locations: Vec::new(),
            location_index: HashMap::new(),
            included: Vec::new(),
            state: EngineState::Idle,
            vars: VariableStore::new(limits.max_variables, limits.max_array_len),
            frames: Vec::new(),
            actions: Vec::new(),
            objects: Vec::new(),
            selected_action: None,
            selected_object: None,
            current_location: None,
            real: CurrentState::default(),
            main_desc: String::new(),
            vars_desc: String::new(),
            input_text: String::new(),
            windows: WindowFlags::default(),
            timer_interval: DEFAULT_TIMER_INTERVAL,
            rng_state: initial_random_seed,
            pending_input: None,
            resume_input: None,
            last_result: None,
            last_error: ErrorRecord::default(),
            debug: false,
            epoch: 0,
            nesting: 0,
            changes: ChangeFlags::default(),
            full_refresh_count: 0,
            regex_cache: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Decodes and installs a game. With `is_new_game` the whole state is reset
    /// and the first location runs; otherwise only the world is swapped.
    pub fn load_bundle(&mut self, bytes: &[u8], is_new_game: bool) -> Result<(), QspError> {
        match decode_bundle(bytes) {
            Ok(bundle) => self.load_game_bundle(bundle, is_new_game),
            Err(error) => {
                self.unload();
                self.record_error(&error);
                Err(error)
            }
        }
    }

    pub fn load_game_bundle(
        &mut self,
        bundle: GameBundle,
        is_new_game: bool,
    ) -> Result<(), QspError> {
        if bundle.locations.is_empty() {
            let error = QspError::new(ErrorKind::CannotLoadFile, "Game has no locations.");
            self.unload();
            self.record_error(&error);
            return Err(error);
        }
        self.install_bundle(bundle);
        self.loaded = true;
        self.state = EngineState::Idle;
        tracing::debug!(
            locations = self.locations.len(),
            game_id = self.game_id,
            "game loaded"
        );
        if is_new_game {
            return self.new_game(true);
        }
        Ok(())
    }

    /// Replaces the world. Game state is left alone.
    pub(super) fn install_bundle(&mut self, bundle: GameBundle) {
        self.game_id = snapshot::fnv1a(&serde_json::to_vec(&bundle).unwrap_or_default());
        self.locations.clear();
        self.location_index.clear();
        self.included.clear();
        for source in bundle.locations {
            self.install_location(source, false);
        }
    }

    /// Compiles and registers a location unless one with the same name exists.
    pub(super) fn install_location(&mut self, source: LocationSource, included: bool) -> bool {
        if self.find_location(&source.name).is_some() {
            return false;
        }
        let location = self.compile_location(source, included);
        self.register_location(location)
    }

    pub(super) fn compile_location(&self, source: LocationSource, included: bool) -> Location {
        let code = Rc::new(compile_code(&source.code, 1, &self.parse_limits));
        let actions = source
            .actions
            .iter()
            .map(|action| Rc::new(compile_code(&action.code, 1, &self.parse_limits)))
            .collect();
        Location {
            source,
            code,
            actions,
            included,
        }
    }

    pub(super) fn register_location(&mut self, location: Location) -> bool {
        let key = location.source.name.trim().to_uppercase();
        if self.location_index.contains_key(&key) {
            return false;
        }
        self.location_index.insert(key, self.locations.len());
        if location.included {
            self.included.push(location.source.clone());
        }
        self.locations.push(location);
        true
    }

    pub(super) fn drop_included_locations(&mut self) {
        self.locations.retain(|location| !location.included);
        self.included.clear();
        self.location_index = self
            .locations
            .iter()
            .enumerate()
            .map(|(index, location)| (location.source.name.trim().to_uppercase(), index))
            .collect();
        if let Some(current) = &self.current_location {
            if self.find_location(current).is_none() {
                self.current_location = None;
            }
        }
    }

    pub(super) fn find_location(&self, name: &str) -> Option<usize> {
        self.location_index.get(&name.trim().to_uppercase()).copied()
    }

    pub fn restart(&mut self) -> Result<(), QspError> {
        self.new_game(true)
    }

    pub(super) fn new_game(&mut self, reset: bool) -> Result<(), QspError> {
        self.run_operation(|engine| {
            engine.start_new_game(reset)?;
            Ok(())
        })
    }

    /// Resets the session (when asked) and moves to the first location.
    pub(super) fn start_new_game(&mut self, reset: bool) -> Exec<()> {
        let Some(first) = self.locations.first() else {
            return Err(QspError::new(ErrorKind::GameNotLoaded, "No game is loaded.").into());
        };
        let first = first.source.name.clone();
        if reset {
            self.reset_session();
            for kind in [
                WindowKind::Actions,
                WindowKind::Objects,
                WindowKind::Vars,
                WindowKind::Input,
            ] {
                self.host.show_window(kind, true);
            }
            self.host.set_input_text("");
            self.host.show_image("");
            self.host.close_file(None);
            self.host.set_timer(DEFAULT_TIMER_INTERVAL);
        }
        self.navigate(&first, Vec::new(), true)
    }

    fn reset_session(&mut self) {
        self.unwind_frames();
        self.vars.clear();
        self.actions.clear();
        self.objects.clear();
        self.selected_action = None;
        self.selected_object = None;
        self.current_location = None;
        self.main_desc.clear();
        self.vars_desc.clear();
        self.input_text.clear();
        self.windows = WindowFlags::default();
        self.timer_interval = DEFAULT_TIMER_INTERVAL;
        self.rng_state = self.initial_random_seed;
        self.pending_input = None;
        self.resume_input = None;
        self.started = Instant::now();
        self.changes = ChangeFlags {
            main_desc: true,
            vars_desc: true,
            actions: true,
            objects: true,
        };
    }

    fn unload(&mut self) {
        self.unwind_frames();
        self.loaded = false;
        self.locations.clear();
        self.location_index.clear();
        self.included.clear();
        self.state = EngineState::Terminated;
    }

    /// Ends the session. In-flight frames are dropped without running any hook.
    pub fn terminate(&mut self) {
        self.frames.clear();
        self.nesting = 0;
        self.vars.clear();
        self.actions.clear();
        self.objects.clear();
        self.selected_action = None;
        self.selected_object = None;
        self.pending_input = None;
        self.resume_input = None;
        self.loaded = false;
        self.locations.clear();
        self.location_index.clear();
        self.included.clear();
        self.state = EngineState::Terminated;
        tracing::debug!("engine terminated");
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn engine_state(&self) -> EngineState {
        self.state
    }

    pub fn engine_version(&self) -> &str {
        &self.engine_version
    }

    pub fn current_state(&self) -> CurrentState {
        self.real.clone()
    }

    pub fn current_location(&self) -> Option<&str> {
        self.current_location.as_deref()
    }

    pub fn main_description(&self) -> &str {
        &self.main_desc
    }

    pub fn vars_description(&self) -> &str {
        &self.vars_desc
    }

    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    pub fn set_input_text(&mut self, text: &str) {
        self.input_text = text.to_string();
    }

    pub fn actions(&self) -> Vec<ListItem> {
        self.actions
            .iter()
            .map(|action| ListItem {
                name: action.name.clone(),
                image: action.image.clone(),
            })
            .collect()
    }

    pub fn objects(&self) -> Vec<ListItem> {
        self.objects.clone()
    }

    pub fn selected_action_index(&self) -> Option<usize> {
        self.selected_action
    }

    pub fn selected_object_index(&self) -> Option<usize> {
        self.selected_object
    }

    pub fn variable_value_count(&self, name: &str) -> usize {
        self.vars.count(&VariableStore::normalize(name))
    }

    pub fn variable_index_by_text(&self, name: &str, key: &str) -> i64 {
        self.vars.index_by_text(&VariableStore::normalize(name), key)
    }

    pub fn numeric_variable(&self, name: &str, index: usize) -> i64 {
        self.vars
            .get(&VariableStore::normalize(name), index, false)
            .to_number()
    }

    pub fn text_variable(&self, name: &str, index: usize) -> String {
        self.vars
            .get(&VariableStore::normalize(name), index, true)
            .into_text()
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.vars.names()
    }

    pub fn window_visible(&self, kind: WindowKind) -> bool {
        self.windows.get(kind)
    }

    pub fn timer_interval(&self) -> i64 {
        self.timer_interval
    }

    pub fn full_refresh_count(&self) -> u64 {
        self.full_refresh_count
    }

    pub fn is_main_desc_changed(&self) -> bool {
        self.changes.main_desc
    }

    pub fn is_vars_desc_changed(&self) -> bool {
        self.changes.vars_desc
    }

    pub fn is_actions_changed(&self) -> bool {
        self.changes.actions
    }

    pub fn is_objects_changed(&self) -> bool {
        self.changes.objects
    }

    pub fn pending_input_prompt(&self) -> Option<&str> {
        self.pending_input.as_deref()
    }

    pub fn last_error(&self) -> &ErrorRecord {
        &self.last_error
    }

    pub fn clear_error(&mut self) {
        self.last_error = ErrorRecord::default();
    }

    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    pub fn is_debug_mode(&self) -> bool {
        self.debug
    }

    /// Asks the host to redraw, passing whether the main description changed.
    pub fn refresh_host(&mut self, forced: bool) {
        let desc_changed = self.changes.main_desc;
        self.host.refresh(forced, desc_changed);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::runtime_test_support::*;
    use super::*;

    #[test]
    fn new_engine_is_idle_and_unloaded() {
        let engine = QspEngine::new(QspEngineOptions::default());
        assert!(!engine.is_loaded());
        assert_eq!(engine.engine_state(), EngineState::Idle);
        assert_eq!(engine.engine_version(), DEFAULT_ENGINE_VERSION);
        assert_eq!(engine.current_state(), CurrentState::default());
    }

    #[test]
    fn operations_need_a_loaded_game() {
        let mut engine = QspEngine::new(QspEngineOptions::default());
        let error = engine.execute_code("x = 1").expect_err("not loaded");
        assert_eq!(error.kind, ErrorKind::GameNotLoaded);
        assert_eq!(engine.last_error().kind, Some(ErrorKind::GameNotLoaded));
        let error = engine.restart().expect_err("not loaded");
        assert_eq!(error.kind, ErrorKind::GameNotLoaded);
    }

    #[test]
    fn broken_bundle_leaves_engine_unloaded() {
        let mut engine = engine_from_locations(vec![location("start", "x = 1")]);
        let error = engine.load_bundle(b"garbage", true).expect_err("bad bundle");
        assert_eq!(error.kind, ErrorKind::CannotLoadFile);
        assert!(!engine.is_loaded());
        assert_eq!(engine.engine_state(), EngineState::Terminated);
        let error = engine.execute_code("x = 1").expect_err("unloaded");
        assert_eq!(error.kind, ErrorKind::GameNotLoaded);
    }

    #[test]
    fn new_game_runs_the_first_location_and_notifies_host() {
        let host = RecordingHost::default();
        let log = host.log.clone();
        let mut engine = engine_with_host(
            vec![
                location_with_actions("start", "Welcome", "x = 1", &[("Look", "y = 2")]),
                location("other", "x = 99"),
            ],
            host,
        );
        engine.restart().expect("restart");
        assert_eq!(number(&engine, "x"), 1);
        assert_eq!(engine.current_location(), Some("start"));
        assert_eq!(engine.main_description(), "Welcome");
        assert_eq!(engine.actions()[0].name, "Look");
        assert_eq!(engine.full_refresh_count(), 1);
        let log = log.borrow();
        assert!(log.contains(&"window:Actions:true".to_string()));
        assert!(log.contains(&"timer:500".to_string()));
    }

    #[test]
    fn restart_clears_previous_state() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        run_code(&mut engine, "gold = 5 & addobj 'key' & showacts 0");
        engine.restart().expect("restart");
        assert_eq!(number(&engine, "gold"), 0);
        assert!(engine.objects().is_empty());
        assert!(engine.window_visible(WindowKind::Actions));
    }

    #[test]
    fn loading_without_new_game_keeps_state() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        run_code(&mut engine, "gold = 5");
        engine
            .load_game_bundle(bundle_from_locations(vec![location("next", "")]), false)
            .expect("swap world");
        assert_eq!(number(&engine, "gold"), 5);
        assert!(engine.find_location("start").is_none());
        assert!(engine.find_location("NEXT").is_some());
    }

    #[test]
    fn terminate_requires_a_fresh_load() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        engine.terminate();
        assert_eq!(engine.engine_state(), EngineState::Terminated);
        let error = engine.execute_code("x = 1").expect_err("terminated");
        assert_eq!(error.kind, ErrorKind::GameNotLoaded);
        engine
            .load_game_bundle(bundle_from_locations(vec![location("start", "x = 4")]), true)
            .expect("reload");
        assert_eq!(number(&engine, "x"), 4);
    }

    #[test]
    fn variable_queries_are_lenient_about_names() {
        let mut engine = engine_from_locations(vec![location("start", "")]);
        run_code(&mut engine, "$name['k'] = 'Ann' & n = 3");
        assert_eq!(engine.text_variable("$Name", 0), "Ann");
        assert_eq!(engine.variable_index_by_text("name", "K"), 0);
        assert_eq!(engine.variable_value_count(" name "), 1);
        assert_eq!(engine.numeric_variable("N", 0), 3);
        assert_eq!(engine.text_variable("missing", 0), "");
        assert_eq!(engine.variable_names(), vec!["N".to_string(), "NAME".to_string()]);
    }
}
