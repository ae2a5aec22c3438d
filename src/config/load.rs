use super::{default_global_config_path, ConfigError, Settings};
use std::path::Path;

/// Loads settings from `explicit`, or from `~/.pdpflow/config.yaml` when it
/// exists, then applies environment overrides and validates.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    load_settings_with(explicit, |name| std::env::var(name).ok())
}

pub fn load_settings_with<F>(explicit: Option<&Path>, lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let settings = read_settings_with(explicit, lookup)?;
    settings.validate()?;
    Ok(settings)
}

/// Same layering as [`load_settings_with`] without validation. Commands that
/// only inspect local state do not need the service fields.
pub fn read_settings_with<F>(explicit: Option<&Path>, lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = match explicit {
        Some(path) => Settings::from_path(path)?,
        None => match default_global_config_path() {
            Ok(path) if path.is_file() => Settings::from_path(&path)?,
            _ => Settings::default(),
        },
    };
    settings.apply_env_overrides(lookup);
    Ok(settings)
}
