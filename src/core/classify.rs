//! Failure classification.
//!
//! A failure is matched against an ordered rule table. Each rule tests the
//! failure's declared type name (case-sensitive substring) and its message
//! (case-insensitive substring); the first matching rule decides the category
//! and default severity. Unmatched failures are `Unknown`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::Failure;

/// Category assigned to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connectivity problems.
    Network,
    /// Browser or driver crashes.
    Browser,
    /// Missing or invisible page elements.
    Element,
    /// Login and credential problems.
    Auth,
    /// Operating system and I/O errors.
    System,
    /// Deadlines exceeded.
    Timeout,
    /// Memory or other resource exhaustion.
    Resource,
    /// Access denied. Only assigned through a caller hint.
    Permission,
    /// Expired sessions and cookies.
    Session,
    /// Elements present but not interactable.
    Interaction,
    /// Anything else.
    Unknown,
}

impl ErrorCategory {
    /// Every category in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Network,
        Self::Browser,
        Self::Element,
        Self::Auth,
        Self::System,
        Self::Timeout,
        Self::Resource,
        Self::Permission,
        Self::Session,
        Self::Interaction,
        Self::Unknown,
    ];

    /// Lowercase name, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Browser => "browser",
            Self::Element => "element",
            Self::Auth => "auth",
            Self::System => "system",
            Self::Timeout => "timeout",
            Self::Resource => "resource",
            Self::Permission => "permission",
            Self::Session => "session",
            Self::Interaction => "interaction",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious a failure is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic.
    Low,
    /// Recoverable by retrying.
    Medium,
    /// Likely to need more than a retry.
    High,
    /// Unrecoverable.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}

struct Rule {
    category: ErrorCategory,
    severity: Severity,
    kinds: &'static [&'static str],
    markers: &'static [&'static str],
}

impl Rule {
    fn matches(&self, kind: &str, message: &str) -> bool {
        self.kinds.iter().any(|k| kind.contains(k)) || self.markers.iter().any(|m| message.contains(m))
    }
}

const RULES: &[Rule] = &[
    Rule {
        category: ErrorCategory::Timeout,
        severity: Severity::Medium,
        kinds: &["TimeoutException"],
        markers: &["timeout"],
    },
    Rule {
        category: ErrorCategory::Network,
        severity: Severity::Medium,
        kinds: &["ConnectionError", "TimeoutError", "ConnectionRefusedError"],
        markers: &["network", "connection", "refused"],
    },
    Rule {
        category: ErrorCategory::Session,
        severity: Severity::Medium,
        kinds: &[],
        markers: &["session", "cookie", "expired"],
    },
    Rule {
        category: ErrorCategory::Interaction,
        severity: Severity::Medium,
        kinds: &["ElementNotInteractableException", "ElementClickInterceptedException"],
        markers: &["not clickable", "not interactable"],
    },
    Rule {
        category: ErrorCategory::Browser,
        severity: Severity::High,
        kinds: &["WebDriverException"],
        markers: &["chrome", "browser", "driver", "selenium"],
    },
    Rule {
        category: ErrorCategory::Element,
        severity: Severity::Medium,
        kinds: &["ElementNotVisibleException", "NoSuchElementException"],
        markers: &["element", "input", "form"],
    },
    Rule {
        category: ErrorCategory::Auth,
        severity: Severity::High,
        kinds: &[],
        markers: &["auth", "login", "password", "credentials"],
    },
    Rule {
        category: ErrorCategory::System,
        severity: Severity::High,
        kinds: &["OSError", "IOError", "PermissionError"],
        markers: &[],
    },
    Rule {
        category: ErrorCategory::Resource,
        severity: Severity::High,
        kinds: &[],
        markers: &["memory", "resource", "out of"],
    },
];

/// Stateless classifier over the fixed rule table.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureClassifier;

impl FailureClassifier {
    /// Create a classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Category and severity for a failure.
    #[must_use]
    pub fn classify(&self, failure: &Failure) -> (ErrorCategory, Severity) {
        let message = failure.message.to_lowercase();
        RULES
            .iter()
            .find(|rule| rule.matches(&failure.kind, &message))
            .map_or((ErrorCategory::Unknown, Severity::Medium), |rule| {
                (rule.category, rule.severity)
            })
    }

    /// Default severity for a category, used when the caller supplies a hint.
    #[must_use]
    pub fn default_severity(category: ErrorCategory) -> Severity {
        RULES
            .iter()
            .find(|rule| rule.category == category)
            .map_or(Severity::Medium, |rule| rule.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(kind: &str, message: &str) -> (ErrorCategory, Severity) {
        FailureClassifier::new().classify(&Failure::new(kind, message))
    }

    #[test]
    fn timeout_beats_connection() {
        assert_eq!(
            classify("Exception", "Connection timeout while loading").0,
            ErrorCategory::Timeout
        );
    }

    #[test]
    fn type_names_are_case_sensitive() {
        assert_eq!(classify("ConnectionError", "boom").0, ErrorCategory::Network);
        assert_eq!(classify("connectionerror", "boom").0, ErrorCategory::Unknown);
    }

    #[test]
    fn messages_are_case_insensitive() {
        assert_eq!(classify("Exception", "Chrome crashed"), (ErrorCategory::Browser, Severity::High));
        assert_eq!(classify("Exception", "COOKIE rejected").0, ErrorCategory::Session);
    }

    #[test]
    fn rule_order_is_respected() {
        // "element" would match Element, but Interaction is earlier.
        assert_eq!(classify("Exception", "element not clickable").0, ErrorCategory::Interaction);
        // "login form" hits Element before Auth.
        assert_eq!(classify("Exception", "login form missing").0, ErrorCategory::Element);
        assert_eq!(classify("Exception", "invalid password").0, ErrorCategory::Auth);
    }

    #[test]
    fn system_and_resource() {
        assert_eq!(classify("OSError", "disk"), (ErrorCategory::System, Severity::High));
        assert_eq!(classify("Exception", "out of memory"), (ErrorCategory::Resource, Severity::High));
    }

    #[test]
    fn unknown_fallback() {
        assert_eq!(classify("Exception", "weird"), (ErrorCategory::Unknown, Severity::Medium));
    }

    #[test]
    fn default_severity_for_hints() {
        assert_eq!(FailureClassifier::default_severity(ErrorCategory::Auth), Severity::High);
        assert_eq!(FailureClassifier::default_severity(ErrorCategory::Permission), Severity::Medium);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }
}
