//! Result and error types for Fluentum.

use thiserror::Error;

/// Result type for Fluentum operations
pub type FluentResult<T> = Result<T, FluentError>;

/// Errors that can occur while resolving, wrapping or operating on elements
#[derive(Debug, Error)]
pub enum FluentError {
    /// A single-element resolution matched nothing
    #[error("Element not found: {selector}")]
    NotFound {
        /// Selector that was searched
        selector: String,
    },

    /// A single-element resolution matched more than one element under the strict policy
    #[error("Ambiguous element: {selector} matched {count} elements, expected exactly one")]
    AmbiguousElement {
        /// Selector that was searched
        selector: String,
        /// Number of matches
        count: usize,
    },

    /// A resolved handle no longer refers to a live node
    #[error("Stale element: {element} is no longer attached to the page")]
    StaleElement {
        /// Description of the stale element
        element: String,
    },

    /// A list operation was called on a list with no members
    #[error("Element not found: {operation} called on an empty list")]
    EmptyCollection {
        /// Operation that required members
        operation: String,
    },

    /// A positional access was beyond the end of a list
    #[error("No such element with position: {index}. Number of elements available: {available}.{}", selector_suffix(.selector))]
    OutOfRange {
        /// Requested position
        index: usize,
        /// Number of elements available
        available: usize,
        /// Selector used for the search, if any
        selector: Option<String>,
    },

    /// No member of a list was eligible for the operation
    #[error("No element is displayed and enabled. Can't {operation}.")]
    NoEligibleElement {
        /// Operation that found no eligible member
        operation: String,
    },

    /// A component type cannot be built from a handle
    #[error("{type_name} is not a valid component type. No valid constructor found (handle) or (handle, context): {reason}")]
    InvalidComponentType {
        /// Name of the offending type
        type_name: String,
        /// Why construction was refused or failed
        reason: String,
    },

    /// The driver cannot evaluate a selector
    #[error("Invalid selector {selector}: {message}")]
    InvalidSelector {
        /// Selector text
        selector: String,
        /// Error message
        message: String,
    },

    /// Any other failure reported by the driver
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Invalid state error (operation called in wrong state)
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn selector_suffix(selector: &Option<String>) -> String {
    selector
        .as_ref()
        .map(|s| format!(" Selector: {s}."))
        .unwrap_or_default()
}

impl FluentError {
    /// Create a not-found error for a selector
    pub fn not_found(selector: impl Into<String>) -> Self {
        Self::NotFound {
            selector: selector.into(),
        }
    }

    /// Create a stale-element error
    pub fn stale(element: impl Into<String>) -> Self {
        Self::StaleElement {
            element: element.into(),
        }
    }

    /// Create an empty-collection error
    pub fn empty(operation: impl Into<String>) -> Self {
        Self::EmptyCollection {
            operation: operation.into(),
        }
    }

    /// Create a driver error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create an invalid-component-type error
    pub fn invalid_component(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidComponentType {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the error reports a detached element
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleElement { .. })
    }

    /// Whether the error reports a search that matched nothing
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::EmptyCollection { .. })
    }
}
