use crate::types::Principal;

/// Per-call context carrying identity and correlation information.
///
/// Threaded through the dispatch path so authorization rules can inspect the
/// caller and so local and remote log lines for one call can be joined.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Identifier of the node handling this call.
    pub node_id: String,
    /// Authenticated principal, if the caller is authenticated.
    pub principal: Option<Principal>,
    /// Correlation id shared by both ends of a remote call.
    pub correlation_id: Option<String>,
}

impl RequestContext {
    #[must_use]
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Roles of the current principal; empty for anonymous callers.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        match &self.principal {
            Some(principal) => &principal.roles,
            None => &[],
        }
    }
}
