use std::path::PathBuf;
use std::sync::LazyLock;

const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

/// Path to the user config file: `$HOME/.config/hydrus-review.toml`
///
/// Returns `None` if the home directory cannot be determined.
pub static CONFIG_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let home_dir = dirs::home_dir()?;
    Some(home_dir.join(".config").join(format!("{PROJECT_NAME}.toml")))
});

/// Directory for session log files: `$HOME/logs/hydrus-review`
///
/// Returns `None` if the home directory cannot be determined.
pub static LOG_DIR: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let home_dir = dirs::home_dir()?;
    Some(home_dir.join("logs").join(PROJECT_NAME))
});
