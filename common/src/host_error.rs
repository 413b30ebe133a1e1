//! Diagnostics embedded by FlexLogger in failed remote calls.
//!
//! When a call fails inside the host, the status detail string carries the
//! host's own error text, with the numeric error code tagged in brackets:
//!
//! ```text
//! [-2147220978] The project could not be opened.
//! ```

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

const ERROR_CODE_PATTERN: &str = r"\[([0-9+-]+)\] ";

static ERROR_CODE_REGEX: OnceLock<Regex> = OnceLock::new();

fn error_code_regex() -> &'static Regex {
    ERROR_CODE_REGEX.get_or_init(|| Regex::new(ERROR_CODE_PATTERN).expect("valid regex pattern"))
}

/// Error text and code extracted from a remote call's detail string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostErrorDetails {
    message: String,
    error_code: i32,
}

impl HostErrorDetails {
    /// Parse a detail string.
    ///
    /// The error code is taken from the first `[<code>] ` tag; every tag is
    /// stripped from the message. A missing or unparsable code reads as `0`.
    pub fn parse(details: &str) -> Self {
        let re = error_code_regex();

        let error_code = re
            .captures(details)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .unwrap_or(0);

        let message = re.replace_all(details, "").into_owned();

        Self {
            message,
            error_code,
        }
    }

    /// Host diagnostic text with the code tags removed.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Numeric host error code, `0` when the host supplied none.
    pub fn error_code(&self) -> i32 {
        self.error_code
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }
}

impl fmt::Display for HostErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
