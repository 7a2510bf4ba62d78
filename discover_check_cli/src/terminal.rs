//! Terminal capability checks deciding whether progress bars are drawn

use is_terminal::IsTerminal;
use std::env;
use std::io::{stderr, stdout};

/// Variables set by common CI runners
const CI_VARS: &[&str] = &[
    "CI",
    "CONTINUOUS_INTEGRATION",
    "JENKINS_URL",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "TF_BUILD",
];

/// Progress goes to stderr, so that is the stream that must be a terminal
pub fn stderr_is_terminal() -> bool {
    stderr().is_terminal()
}

/// Color is only worth emitting when a person reads stdout
pub fn stdout_is_terminal() -> bool {
    stdout().is_terminal()
}

fn is_ci_environment() -> bool {
    CI_VARS.iter().any(|var| env::var_os(var).is_some())
}

/// Whether ANSI cursor movement can be used at all
pub fn supports_ansi() -> bool {
    match env::var("TERM") {
        Ok(term) => !term.is_empty() && term != "dumb",
        Err(_) => cfg!(windows),
    }
}

/// Progress bars only make sense for a person watching an ANSI terminal
pub fn should_show_progress_by_default() -> bool {
    stderr_is_terminal() && !is_ci_environment() && supports_ansi()
}
