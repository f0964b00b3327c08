//! Engine configuration.

use stepvault_codec::MAX_OBJECT_DEPTH;

/// Configuration for a [`crate::Factory`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deepest map nesting accepted in a stored record, counting the root.
    ///
    /// The engine itself stores anything; wrapper layers read this to
    /// validate values at their boundary.
    pub max_object_depth: usize,

    /// Whether a failed request (duplicate add, unencodable record) aborts
    /// its transaction when the transaction finishes.
    pub abort_on_request_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_object_depth: MAX_OBJECT_DEPTH,
            abort_on_request_error: true,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deepest accepted record nesting.
    #[must_use]
    pub const fn max_object_depth(mut self, depth: usize) -> Self {
        self.max_object_depth = depth;
        self
    }

    /// Sets whether failed requests abort their transaction.
    #[must_use]
    pub const fn abort_on_request_error(mut self, value: bool) -> Self {
        self.abort_on_request_error = value;
        self
    }
}
