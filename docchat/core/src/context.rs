//! Session Context
//!
//! Identity and credential for the signed-in user. The auth layer owns how
//! these are obtained and stored; this crate only carries them into each
//! outbound request.

/// Who is asking, and with what credential
#[derive(Clone)]
pub struct SessionContext {
    identity: String,
    credential: Option<String>,
}

impl SessionContext {
    /// Create a context for `identity` with no credential
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            credential: None,
        }
    }

    /// Attach a bearer credential
    #[must_use]
    pub fn with_credential(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.credential = (!token.is_empty()).then_some(token);
        self
    }

    /// User identity sent with every query
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Bearer token, if any
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("identity", &self.identity)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
