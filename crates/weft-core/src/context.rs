use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

/// Runtime context for a single generate call
///
/// Owned by the caller and passed by reference into the provider. Cancelling
/// the token stops inbound event consumption and surfaces as an error.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Caller-provided API key that overrides the configured key
    pub api_key: Option<SecretString>,
    /// Cancellation scope for the whole call
    pub cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a context with no key override and a fresh cancellation token
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a context bound to an existing cancellation token
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            api_key: None,
            cancellation,
        }
    }

    /// Whether the caller has cancelled this call
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_has_no_key_and_is_live() {
        let ctx = RequestContext::empty();
        assert!(ctx.api_key.is_none());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn cancellation_is_shared_with_the_parent_token() {
        let token = CancellationToken::new();
        let ctx = RequestContext::with_cancellation(token.child_token());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
