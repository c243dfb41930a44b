//! Shared non-fatal error channel.
//!
//! Operation failures and validation messages are reported here instead of
//! being raised, so a request can finish and surface everything at once.
//! Groups scope accumulation: validation opens a group per save and inspects
//! only the messages recorded inside it.

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct ErrorChannel {
    entries: Mutex<Vec<String>>,
    group_starts: Mutex<Vec<usize>>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a non-fatal error message
    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(error = %message, "operation failure reported");
        self.entries.lock().push(message);
    }

    /// Open a scoped group; groups nest
    pub fn start_group(&self) {
        self.group_starts.lock().push(self.entries.lock().len());
    }

    /// Close the innermost group, returning the messages recorded inside it.
    /// The messages stay in the channel.
    pub fn end_group(&self) -> Vec<String> {
        let start = self.group_starts.lock().pop().unwrap_or(0);
        self.entries.lock()[start..].to_vec()
    }

    /// All messages recorded so far
    pub fn errors(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        self.group_starts.lock().clear();
    }
}
