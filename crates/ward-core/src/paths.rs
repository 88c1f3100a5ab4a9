/// Path constants and utilities for the ward service
use once_cell::sync::OnceCell;
use std::path::PathBuf;

// Static storage for configurable data root
static DATA_ROOT: OnceCell<String> = OnceCell::new();

// Static storage for configurable backups root
static BACKUPS_ROOT: OnceCell<String> = OnceCell::new();

// Default root constants
const DEFAULT_DATA_ROOT: &str = "/data/ward";
const DEFAULT_BACKUPS_ROOT: &str = "/data/backups";
pub const APP_ROOT: &str = "/app";

/// Initialize the data root directory. Can only be called once.
/// If not called, the default `/data/ward` will be used.
pub fn init_data_root(path: String) -> Result<(), String> {
    DATA_ROOT
        .set(path)
        .map_err(|_| "Data root already initialized".to_string())
}

/// Initialize the backups root directory. Can only be called once.
pub fn init_backups_root(path: String) -> Result<(), String> {
    BACKUPS_ROOT
        .set(path)
        .map_err(|_| "Backups root already initialized".to_string())
}

fn get_data_root() -> &'static str {
    DATA_ROOT.get().map(|s| s.as_str()).unwrap_or(DEFAULT_DATA_ROOT)
}

fn get_backups_root() -> &'static str {
    BACKUPS_ROOT
        .get()
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_BACKUPS_ROOT)
}

// Directory names (relative to roots)
pub const LETTERS_DIR_NAME: &str = "letters";
pub const SEQUENCE_DIR_NAME: &str = "sequence";
pub const GENERATED_DIR_NAME: &str = "generated_letters";
pub const DIRECTORY_FILE_NAME: &str = "directory.json";
pub const CONFIG_DIR_NAME: &str = "config";
pub const CONFIG_FILE_NAME: &str = "ward.json";

pub fn data_root() -> PathBuf {
    PathBuf::from(get_data_root())
}

/// Root of the file-backed letter request store
pub fn letters_dir() -> PathBuf {
    data_root().join(LETTERS_DIR_NAME)
}

pub fn generated_letters_dir() -> PathBuf {
    data_root().join(GENERATED_DIR_NAME)
}

/// Seed file holding residents, households and letter types
pub fn directory_path() -> PathBuf {
    data_root().join(DIRECTORY_FILE_NAME)
}

pub fn backups_dir() -> PathBuf {
    PathBuf::from(get_backups_root())
}

pub fn app_root() -> PathBuf {
    PathBuf::from(APP_ROOT)
}

pub fn config_dir() -> PathBuf {
    app_root().join(CONFIG_DIR_NAME)
}

pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get all directories that should be created at startup
pub fn all_data_directories() -> Vec<PathBuf> {
    vec![data_root(), letters_dir(), generated_letters_dir()]
}
