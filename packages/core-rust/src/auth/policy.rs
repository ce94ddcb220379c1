use async_trait::async_trait;

use super::{AuthRequest, AuthorizeOperation, Authorization};

/// Platform-level rule source, evaluated after every type-specific rule.
#[async_trait]
pub trait PolicySource: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, request: &AuthRequest<'_>) -> Authorization;
}

/// Roles required for a set of operation kinds.
#[derive(Debug, Clone)]
pub struct RoleRequirement {
    /// Restricts the requirement to one target type; `None` applies to all.
    pub target_type: Option<&'static str>,
    pub kinds: AuthorizeOperation,
    /// The principal needs at least one of these roles.
    pub roles: Vec<String>,
}

/// Role checks against the principal in the request context.
///
/// Anonymous callers fail every requirement that applies to them.
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    requirements: Vec<RoleRequirement>,
}

impl RolePolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn require<I, S>(mut self, target_type: Option<&'static str>, kinds: AuthorizeOperation, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements.push(RoleRequirement {
            target_type,
            kinds,
            roles: roles.into_iter().map(Into::into).collect(),
        });
        self
    }
}

#[async_trait]
impl PolicySource for RolePolicy {
    fn name(&self) -> &str {
        "role-policy"
    }

    async fn evaluate(&self, request: &AuthRequest<'_>) -> Authorization {
        let kind = AuthorizeOperation::from(request.descriptor.kind);
        let held = request.context.roles();
        for requirement in &self.requirements {
            if !requirement.kinds.contains(kind) {
                continue;
            }
            if requirement
                .target_type
                .is_some_and(|ty| ty != request.descriptor.target_type)
            {
                continue;
            }
            if !requirement.roles.iter().any(|role| held.contains(role)) {
                return Authorization::deny(format!(
                    "{} on {} requires one of the roles [{}]",
                    request.descriptor.kind,
                    request.descriptor.target_type,
                    requirement.roles.join(", ")
                ));
            }
        }
        Authorization::Allowed
    }
}
