//! Where the tool keeps its files
//!
//! Configuration follows the platform config directory (XDG on Linux), and
//! stored reports default to a directory under the platform data directory.

use std::path::PathBuf;

/// The application directory name used on all platforms
pub const APP_DIR: &str = "discover-check";

const REPORTS_SUBDIR: &str = "reports";

const CONFIG_FILE: &str = "config.toml";

/// `~/.local/share/discover-check` on Linux, `.discover-check` when unknown
pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{APP_DIR}")))
}

/// Default destination of validation reports
pub fn get_reports_dir() -> PathBuf {
    get_data_dir().join(REPORTS_SUBDIR)
}

/// Configuration directory
///
/// `XDG_CONFIG_HOME` wins on Unix-like systems, then the platform default.
pub fn get_config_dir() -> PathBuf {
    #[cfg(not(target_os = "windows"))]
    if let Some(xdg_config) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg_config).join(APP_DIR);
    }

    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{APP_DIR}")))
}

pub fn get_config_path() -> PathBuf {
    get_config_dir().join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_dir_is_under_data_dir() {
        let reports = get_reports_dir();
        assert!(reports.starts_with(get_data_dir()));
        assert_eq!(
            reports.file_name().and_then(|n| n.to_str()),
            Some(REPORTS_SUBDIR)
        );
    }

    #[test]
    fn test_config_path_is_in_config_dir() {
        let config_path = get_config_path();
        assert!(config_path.starts_with(get_config_dir()));
        assert_eq!(
            config_path.file_name().and_then(|n| n.to_str()),
            Some(CONFIG_FILE)
        );
    }

    #[test]
    fn test_all_paths_name_the_app() {
        for path in [get_data_dir(), get_reports_dir(), get_config_dir()] {
            assert!(
                path.to_string_lossy().contains(APP_DIR),
                "{} should contain '{APP_DIR}'",
                path.display()
            );
        }
    }
}
