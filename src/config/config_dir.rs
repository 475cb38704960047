use std::path::PathBuf;

use tracing::debug;

use super::error::{ConfigError, ConfigResult};

/// Environment variable that points to an explicit config file.
pub static CONFIG_ENV: &str = "ACADEMY_CONFIG";

fn user_config_dir() -> Option<PathBuf> {
    #[cfg(unix)]
    let base = std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"));
    #[cfg(windows)]
    let base = std::env::var_os("APPDATA").map(PathBuf::from);
    #[cfg(not(any(unix, windows)))]
    let base: Option<PathBuf> = None;

    base.map(|dir| dir.join(crate::APPLICATION_NAME))
}

/// Resolves the config location: `$ACADEMY_CONFIG`, then `./config.toml` for local runs,
/// then the per-user config directory, falling back to `./config.toml`.
pub fn find_config_file(use_local: bool) -> PathBuf {
    if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(explicit);
    }

    let local = PathBuf::from("./config.toml");
    if use_local {
        return local;
    }

    user_config_dir()
        .map(|dir| dir.join("config.toml"))
        .filter(|path| path.exists())
        .unwrap_or(local)
}

pub fn read_config(use_local: bool) -> ConfigResult<Vec<u8>> {
    read_config_at(find_config_file(use_local))
}

fn read_config_at(filename: PathBuf) -> ConfigResult<Vec<u8>> {
    tracing::trace!("looking for config at: {}", filename.display());
    if !filename.exists() {
        return Err(ConfigError::ConfigNotFound);
    }

    let filename = filename.canonicalize()?;
    debug!("using {} as configuration file", filename.display());

    Ok(std::fs::read(filename)?)
}
