use crate::drive::DriveError;
use colored::*;
use std::error::Error as StdError;
use std::fmt;

/// CLI-specific error type with semantic exit codes
#[derive(Debug)]
pub struct CliError {
    message: String,

    category: ErrorCategory,

    context: Vec<(String, String)>,

    pub suggestions: Vec<String>,

    source: Option<Box<dyn StdError + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorCategory {
    /// The run itself failed or the drive must not ship
    General,
    /// Bad arguments or configuration; nothing was validated
    Misuse,
}

/// Exit codes of the `discover-check` binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Drive is shippable and its report was stored
    Success = 0,
    Failure = 1,
    Misuse = 2,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// Extension trait for adding context to errors
pub trait ErrorContext {
    fn with_context(self, key: &str, value: &str) -> Self;
    fn with_suggestion(self, suggestion: &str) -> Self;
    fn with_source(self, source: Box<dyn StdError + Send + Sync>) -> Self;
}

impl CliError {
    pub fn general(message: &str) -> Self {
        Self {
            message: message.to_string(),
            category: ErrorCategory::General,
            context: Vec::new(),
            suggestions: Vec::new(),
            source: None,
        }
    }

    /// Arguments or configuration that make the run impossible
    pub fn misuse(message: &str) -> Self {
        Self {
            message: message.to_string(),
            category: ErrorCategory::Misuse,
            context: Vec::new(),
            suggestions: vec!["Run 'discover-check --help' for usage information".to_string()],
            source: None,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.category {
            ErrorCategory::General => ExitCode::Failure,
            ErrorCategory::Misuse => ExitCode::Misuse,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Format the error for user display
    pub fn format_for_user(&self, debug: bool) -> String {
        let mut output = String::new();

        let prefix = match self.category {
            ErrorCategory::General => "Error".red(),
            ErrorCategory::Misuse => "Usage Error".yellow(),
        };
        output.push_str(&format!("{}: {}\n", prefix, self.message));

        if !self.context.is_empty() {
            output.push_str("\nContext:\n");
            for (key, value) in &self.context {
                output.push_str(&format!("  {}: {}\n", key.bold(), value));
            }
        }

        if debug && let Some(source) = &self.source {
            output.push_str("\nCaused by:\n");
            let mut current: Option<&dyn StdError> = Some(source.as_ref());
            let mut level = 1;

            while let Some(err) = current {
                output.push_str(&format!("  {level}: {err}\n"));
                current = err.source();
                level += 1;
            }
        }

        if !self.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in &self.suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        output
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.category {
            ErrorCategory::General => "Error",
            ErrorCategory::Misuse => "Usage Error",
        };
        write!(f, "{label}: {}", self.message)?;

        for (key, value) in &self.context {
            write!(f, " ({key}: {value})")?;
        }

        Ok(())
    }
}

impl StdError for CliError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl ErrorContext for CliError {
    fn with_context(mut self, key: &str, value: &str) -> Self {
        self.context.push((key.to_string(), value.to_string()));
        self
    }

    fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.suggestions.push(suggestion.to_string());
        self
    }

    fn with_source(mut self, source: Box<dyn StdError + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }
}

/// Configuration problems anywhere in the chain make the error a misuse
impl From<anyhow::Error> for CliError {
    fn from(error: anyhow::Error) -> Self {
        let error = match error.downcast::<CliError>() {
            Ok(cli_error) => return cli_error,
            Err(error) => error,
        };

        let misuse = error.chain().any(|cause| {
            cause.is::<figment::Error>()
                || cause.is::<DriveError>()
                || cause
                    .downcast_ref::<discover_check_core::Error>()
                    .is_some_and(discover_check_core::Error::is_fatal)
        });

        let message = format!("{error:#}");
        let cli_error = if misuse {
            Self::misuse(&message)
        } else {
            Self::general(&message)
        };
        cli_error.with_source(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use discover_check_core::error::ConfigError;
    use std::path::PathBuf;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::general("x").exit_code().code(), 1);
        assert_eq!(CliError::misuse("x").exit_code().code(), 2);
        assert_eq!(ExitCode::Success.code(), 0);
    }

    #[test]
    fn test_core_config_error_is_misuse() {
        let core = discover_check_core::Error::Config(ConfigError::invalid_configuration(
            "unknown collector 'nope'",
        ));
        let error: CliError = anyhow::Error::new(core)
            .context("Failed to prepare validator")
            .into();
        assert_eq!(error.exit_code(), ExitCode::Misuse);
        assert!(error.message().starts_with("Failed to prepare validator"));
    }

    #[test]
    fn test_drive_error_is_misuse() {
        let error: CliError =
            anyhow::Error::new(DriveError::NotADirectory(PathBuf::from("/x"))).into();
        assert_eq!(error.exit_code(), ExitCode::Misuse);
    }

    #[test]
    fn test_other_errors_are_general() {
        let io = std::io::Error::other("disk on fire");
        let error: CliError = Err::<(), _>(io).context("walk failed").unwrap_err().into();
        assert_eq!(error.exit_code(), ExitCode::Failure);
        let shown = error.format_for_user(true);
        assert!(shown.contains("walk failed"));
        assert!(shown.contains("Caused by:"));
    }

    #[test]
    fn test_cli_error_roundtrips_through_anyhow() {
        let original = CliError::misuse("no catalog").with_context("key", "catalog.path");
        let back: CliError = anyhow::Error::new(original).into();
        assert_eq!(back.exit_code(), ExitCode::Misuse);
        assert_eq!(back.to_string(), "Usage Error: no catalog (key: catalog.path)");
    }
}
