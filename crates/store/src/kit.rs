use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Per-request context: a request id for logging and a cancellation signal.
///
/// Every statement checks the kit before it is issued. A cancelled kit fails
/// with [`Error::Canceled`] without touching the database.
#[derive(Debug, Clone, Default)]
pub struct Kit {
    /// Request id attached to log lines.
    pub rid: String,
    cancel: CancellationToken,
}

impl Kit {
    /// A kit for request `rid`.
    #[must_use]
    pub fn new(rid: impl Into<String>) -> Self {
        Self {
            rid: rid.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` as the kit's cancellation signal.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A handle that cancels this kit.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the kit has been cancelled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails if the kit has been cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Canceled`].
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(Error::Canceled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_shared() {
        let kit = Kit::new("rid-1");
        kit.check().unwrap();

        let child = kit.clone();
        kit.cancellation().cancel();
        assert!(child.is_canceled());
        assert_eq!(child.check(), Err(Error::Canceled));
    }

    #[test]
    fn parent_token_cancels_kit() {
        let parent = CancellationToken::new();
        let kit = Kit::new("rid-2").with_cancellation(parent.child_token());
        parent.cancel();
        assert!(kit.is_canceled());
    }
}
