//! Configuration errors raised while registering a table's columns.

use std::fmt;

/// An invalid column or relation declaration.
///
/// Raised only by [`ColumnRegistry::register`](crate::ColumnRegistry::register);
/// never produced at request time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("column key must not be empty")]
    EmptyKey,
    #[error("duplicate column key: {key}")]
    DuplicateKey { key: String },
    #[error("relation path {key:?} has more than one hop")]
    MultiHopRelation { key: String },
    #[error("column {key:?} declares unrecognized value type {value_type:?}")]
    UnknownValueType { key: String, value_type: String },
    #[error("{context} {identifier:?} is not a valid identifier")]
    InvalidIdentifier {
        context: &'static str,
        identifier: String,
    },
    #[error("column {key:?} references undeclared relation {relation:?}")]
    UnknownRelation { key: String, relation: String },
    #[error("duplicate relation name: {name}")]
    DuplicateRelation { name: String },
    #[error("date column {key:?} is not a registered column")]
    UnknownDateColumn { key: String },
    #[error("default sort column {key:?} is not a registered sortable column")]
    UnknownDefaultSort { key: String },
}

/// A filter or sort key that did not survive query assembly.
///
/// Fail-soft: the condition is dropped and the query proceeds. Usually the
/// result of stale client state (a column removed from configuration while a
/// session still references it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKeyWarning {
    /// Which part of the state referenced the key.
    pub origin: KeyOrigin,
    /// The offending key as supplied by the client.
    pub key: String,
    /// Why the key was dropped.
    pub reason: &'static str,
}

/// The interaction-state field an [`UnknownKeyWarning`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    Filter,
    Sort,
    DateRange,
}

impl fmt::Display for UnknownKeyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match self.origin {
            KeyOrigin::Filter => "filter",
            KeyOrigin::Sort => "sort",
            KeyOrigin::DateRange => "date range",
        };
        write!(f, "{origin} key {:?} dropped: {}", self.key, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_messages() {
        let err = ConfigurationError::MultiHopRelation {
            key: "a:b:c".to_string(),
        };
        assert_eq!(err.to_string(), "relation path \"a:b:c\" has more than one hop");

        let err = ConfigurationError::DuplicateKey {
            key: "name".to_string(),
        };
        assert_eq!(err.to_string(), "duplicate column key: name");
    }

    #[test]
    fn warning_display_names_origin() {
        let w = UnknownKeyWarning {
            origin: KeyOrigin::Sort,
            key: "ghost".to_string(),
            reason: "not registered",
        };
        assert_eq!(w.to_string(), "sort key \"ghost\" dropped: not registered");
    }
}
