//! Error types for container operations.
//!
//! Every failure carries a discriminated kind, a human message, and where
//! useful the offending value. Nothing is retried or recovered internally;
//! the single designed soft failure (a preparator returning a wrong-typed
//! replacement) never surfaces here at all.

use std::fmt;

use crate::key::ServiceKey;

/// Main error type for all container operations.
#[derive(Debug, thiserror::Error)]
pub enum HorreumError {
    /// Malformed input to a registration call: an un-convertible binding
    /// target, or an alias containing a reserved separator.
    #[error("{}", .0)]
    InvalidArgument(InvalidArgumentError),

    /// Lookup failure: no binding, no alias, no provider, no fallback.
    #[error("{}", .0)]
    NotFound(NotFoundError),

    /// Internal consistency violation: alias collision across types, an
    /// unresolved required parameter, or an instance failing its declared
    /// contract.
    #[error("{}", .0)]
    Logic(LogicError),

    /// A collaborator broke its contract, e.g. a provider that never
    /// registered a service it promised.
    #[error("{}", .0)]
    Implementation(ImplementationError),

    /// Operational failure with no other category, e.g. an empty group
    /// asked for an instance.
    #[error("{}", .0)]
    Runtime(RuntimeError),
}

/// Discriminant of a [`HorreumError`], mostly useful in assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Logic,
    Implementation,
    Runtime,
}

impl HorreumError {
    /// Returns the kind discriminant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Logic(_) => ErrorKind::Logic,
            Self::Implementation(_) => ErrorKind::Implementation,
            Self::Runtime(_) => ErrorKind::Runtime,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(InvalidArgumentError {
            message: message.into(),
            offender: None,
        })
    }

    pub fn invalid_argument_with(
        message: impl Into<String>,
        offender: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument(InvalidArgumentError {
            message: message.into(),
            offender: Some(offender.into()),
        })
    }

    pub fn not_found(subject: impl Into<String>) -> Self {
        Self::NotFound(NotFoundError {
            subject: subject.into(),
            required_by: None,
            suggestions: Vec::new(),
        })
    }

    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic(LogicError {
            message: message.into(),
            offender: None,
        })
    }

    pub fn logic_with(message: impl Into<String>, offender: impl Into<String>) -> Self {
        Self::Logic(LogicError {
            message: message.into(),
            offender: Some(offender.into()),
        })
    }

    pub fn implementation(message: impl Into<String>) -> Self {
        Self::Implementation(ImplementationError {
            message: message.into(),
        })
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(RuntimeError {
            message: message.into(),
        })
    }
}

/// Error payload for malformed registration input.
#[derive(Debug)]
pub struct InvalidArgumentError {
    /// What was wrong.
    pub message: String,
    /// The offending value, rendered, when one exists.
    pub offender: Option<String>,
}

impl fmt::Display for InvalidArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref offender) = self.offender {
            write!(f, "\n  Offending value: {offender}")?;
        }

        Ok(())
    }
}

/// Error payload for a failed lookup.
#[derive(Debug)]
pub struct NotFoundError {
    /// The requested type or alias.
    pub subject: String,
    /// The service whose resolution required this one, when known.
    pub required_by: Option<ServiceKey>,
    /// Registered names that look like what the caller meant.
    pub suggestions: Vec<String>,
}

impl NotFoundError {
    pub(crate) fn for_key(key: &ServiceKey) -> Self {
        Self {
            subject: key.type_name().to_string(),
            required_by: None,
            suggestions: Vec::new(),
        }
    }

    pub(crate) fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} has not been bound", self.subject)?;

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        Ok(())
    }
}

/// Error payload for an internal consistency violation.
#[derive(Debug)]
pub struct LogicError {
    pub message: String,
    pub offender: Option<String>,
}

impl fmt::Display for LogicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref offender) = self.offender {
            write!(f, "\n  Offending value: {offender}")?;
        }

        Ok(())
    }
}

/// Error payload for a collaborator contract violation.
#[derive(Debug)]
pub struct ImplementationError {
    pub message: String,
}

impl fmt::Display for ImplementationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Error payload for an uncategorized operational failure.
#[derive(Debug)]
pub struct RuntimeError {
    pub message: String,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Convenient Result alias for container operations.
pub type Result<T> = std::result::Result<T, HorreumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_with_suggestions() {
        let err = HorreumError::NotFound(
            NotFoundError::for_key(&ServiceKey::of::<String>())
                .with_suggestions(vec!["my_app::StringPool".into()]),
        );

        let msg = format!("{err}");
        assert!(msg.contains("has not been bound"));
        assert!(msg.contains("String"));
        assert!(msg.contains("Did you mean"));
        assert!(msg.contains("StringPool"));
    }

    #[test]
    fn not_found_display_with_parent() {
        let mut inner = NotFoundError::for_key(&ServiceKey::of::<i32>());
        inner.required_by = Some(ServiceKey::of::<String>());
        let msg = format!("{}", HorreumError::NotFound(inner));
        assert!(msg.contains("Required by"));
        assert!(msg.contains("String"));
    }

    #[test]
    fn kinds_match_variants() {
        assert_eq!(
            HorreumError::invalid_argument("x").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(HorreumError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(HorreumError::logic("x").kind(), ErrorKind::Logic);
        assert_eq!(
            HorreumError::implementation("x").kind(),
            ErrorKind::Implementation
        );
        assert_eq!(HorreumError::runtime("x").kind(), ErrorKind::Runtime);
    }

    #[test]
    fn offender_rendered() {
        let err = HorreumError::invalid_argument_with("aliases must not contain ::", "a::b");
        let msg = format!("{err}");
        assert!(msg.contains("Offending value: a::b"));
    }
}
