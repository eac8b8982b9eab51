//! Result and error types for Esperar.

use thiserror::Error;

/// Result type for Esperar operations
pub type EsperarResult<T> = Result<T, EsperarError>;

/// Errors that can occur while locating or interacting with elements.
///
/// The wait engine distinguishes retryable failures (the DOM may simply not
/// be ready yet) from fatal ones (a defect in the page object itself). See
/// [`EsperarError::is_retryable`].
#[derive(Debug, Error)]
pub enum EsperarError {
    /// No element matched a locator; retryable inside a wait envelope
    #[error("{description}")]
    NotFound {
        /// What was being looked for
        description: String,
    },

    /// More than one element matched a single-element locator.
    ///
    /// This signals a locator-specificity defect and is never retried.
    #[error("{description} ({matches} matches)")]
    Ambiguous {
        /// What was being looked for
        description: String,
        /// Number of elements that matched
        matches: usize,
    },

    /// A wait exceeded its allotted time
    #[error("{description}")]
    Timeout {
        /// What was being waited for, including the last observed state
        /// where available
        description: String,
    },

    /// An interaction failed after exhausting its retry envelope
    #[error("{action} failed on {description}{}", precondition.as_ref().map(|p| format!(": element is not currently {p}")).unwrap_or_default())]
    ActionFailed {
        /// The action that was attempted (click, send_keys, ...)
        action: String,
        /// The target element description
        description: String,
        /// Which precondition was violated (present/displayed/enabled),
        /// if one could be determined
        precondition: Option<String>,
    },

    /// A detached node was resolved without a native element reference.
    ///
    /// Programming error in page-object construction; never retried.
    #[error("{description}")]
    Binding {
        /// What went wrong
        description: String,
    },

    /// A low-level driver or query failure (staleness, lost connection)
    #[error("driver error: {message}")]
    Driver {
        /// Error message from the driver
        message: String,
    },

    /// Script execution failed
    #[error("script execution failed: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// An HTTP check failed (link auditing)
    #[error("http check failed: {message}")]
    Http {
        /// Error message
        message: String,
    },
}

impl EsperarError {
    /// Whether a wait loop may poll through this failure.
    ///
    /// `Ambiguous` and `Binding` are defects in the page object itself
    /// and abort the wait immediately; everything transient keeps polling
    /// until the timeout elapses.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Timeout { .. } | Self::Driver { .. } | Self::Script { .. }
        )
    }
}
