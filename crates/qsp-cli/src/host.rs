use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use qsp_core::ListItem;
use qsp_runtime::HostCallbacks;

pub(crate) const DEFAULT_SAVE_FILE: &str = "qsp-save.sav";

/// Messages and menus the game showed during one boundary.
pub(crate) type HostLog = Rc<RefCell<Vec<String>>>;

/// Host for the player: files resolve against the game directory, `input`
/// and `menu` never answer synchronously, so prompts surface as boundaries.
pub(crate) struct CliHost {
    base_dir: PathBuf,
    log: HostLog,
}

impl CliHost {
    pub(crate) fn new(base_dir: PathBuf, log: HostLog) -> Self {
        Self { base_dir, log }
    }

    fn resolve(&self, path: Option<&str>) -> PathBuf {
        self.base_dir.join(path.unwrap_or(DEFAULT_SAVE_FILE))
    }
}

impl HostCallbacks for CliHost {
    fn debug(&mut self, text: &str) {
        tracing::debug!(target: "qsp::script", "{}", text);
    }

    fn show_message(&mut self, text: &str) {
        self.log.borrow_mut().push(text.to_string());
    }

    fn show_menu(&mut self, items: &[ListItem]) -> Option<usize> {
        let names: Vec<&str> = items.iter().map(|item| item.name.as_str()).collect();
        tracing::info!(items = names.len(), "menu shown without a chooser");
        self.log
            .borrow_mut()
            .push(format!("[menu] {}", names.join(" | ")));
        None
    }

    fn read_game_file(&mut self, path: &str) -> Option<Vec<u8>> {
        fs::read(self.base_dir.join(path)).ok()
    }

    fn open_game(&mut self, path: Option<&str>) -> Option<Vec<u8>> {
        fs::read(self.resolve(path)).ok()
    }

    fn save_game(&mut self, path: Option<&str>, state: &[u8]) -> bool {
        match fs::write(self.resolve(path), state) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "savegame failed");
                false
            }
        }
    }

    fn system(&mut self, command: &str) {
        tracing::info!(command, "system command ignored");
    }
}
