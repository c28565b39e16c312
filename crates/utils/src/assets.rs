use std::path::PathBuf;

use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");

fn expand_tilde(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

pub fn asset_dir() -> PathBuf {
    let path = if cfg!(debug_assertions) {
        PathBuf::from(PROJECT_ROOT).join("../../dev_assets")
    } else {
        ProjectDirs::from("dev", "orbit", "orbit")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".orbit"))
    };

    if !path.exists() {
        // The caller surfaces the failure when it tries to use the directory.
        let _ = std::fs::create_dir_all(&path);
    }

    path
}

/// Get the configuration directory path.
///
/// Respects the `ORBIT_CONFIG_DIR` environment variable. Supports tilde expansion.
///
/// Default: `{asset_dir}`
pub fn config_dir() -> PathBuf {
    if let Ok(path) = std::env::var("ORBIT_CONFIG_DIR") {
        return expand_tilde(&path);
    }
    asset_dir()
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Get the database file path.
///
/// Respects the `ORBIT_DATABASE_PATH` environment variable. Supports tilde expansion
/// (e.g., `~/orbit/db.sqlite`).
///
/// Default: `{asset_dir}/db.sqlite`
pub fn database_path() -> PathBuf {
    if let Ok(path) = std::env::var("ORBIT_DATABASE_PATH") {
        return expand_tilde(&path);
    }
    asset_dir().join("db.sqlite")
}

/// Default directory for rotating log files.
pub fn log_dir() -> PathBuf {
    if let Ok(path) = std::env::var("ORBIT_LOG_DIR") {
        return expand_tilde(&path);
    }
    asset_dir().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_database_path_default() {
        // SAFETY: Tests run serially via #[serial] attribute
        unsafe { env::remove_var("ORBIT_DATABASE_PATH") };
        let path = database_path();
        assert!(path.ends_with("db.sqlite"));
    }

    #[test]
    #[serial]
    fn test_database_path_env_override() {
        // SAFETY: Tests run serially via #[serial] attribute
        unsafe { env::set_var("ORBIT_DATABASE_PATH", "/custom/path/test.db") };
        let path = database_path();
        unsafe { env::remove_var("ORBIT_DATABASE_PATH") };
        assert_eq!(path, PathBuf::from("/custom/path/test.db"));
    }

    #[test]
    #[serial]
    fn test_database_path_tilde_expansion() {
        // SAFETY: Tests run serially via #[serial] attribute
        unsafe { env::set_var("ORBIT_DATABASE_PATH", "~/orbit/db.sqlite") };
        let path = database_path();
        unsafe { env::remove_var("ORBIT_DATABASE_PATH") };
        assert!(!path.to_string_lossy().contains('~'));
    }

    #[test]
    #[serial]
    fn test_config_path_uses_config_dir() {
        // SAFETY: Tests run serially via #[serial] attribute
        unsafe { env::set_var("ORBIT_CONFIG_DIR", "/etc/orbit") };
        let path = config_path();
        unsafe { env::remove_var("ORBIT_CONFIG_DIR") };
        assert_eq!(path, PathBuf::from("/etc/orbit/config.json"));
    }
}
