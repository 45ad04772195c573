//! Client configuration

use std::time::Duration;

/// Configuration for a [`crate::session::controller::CallSessionController`].
#[derive(Debug, Clone)]
pub struct CallClientConfig {
    /// Display name shown to remote parties.
    pub display_name: String,
    /// Upper bound for each setup step during connect.
    pub setup_timeout: Duration,
    /// Capacity of the session event channel.
    pub event_buffer: usize,
}

impl Default for CallClientConfig {
    fn default() -> Self {
        Self {
            display_name: "vcall user".to_string(),
            setup_timeout: Duration::from_secs(10),
            event_buffer: 256,
        }
    }
}

impl CallClientConfig {
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }
}
