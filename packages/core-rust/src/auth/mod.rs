//! Authorization gate: layered predicates evaluated before an operation runs.
//!
//! For one operation the gate evaluates, in order:
//!
//! 1. class-level rules registered for the target type,
//! 2. operation-level rules for the target type (optionally bound to one key),
//! 3. platform [`PolicySource`]s.
//!
//! Only rules whose [`AuthorizeOperation`] flags include the operation's kind
//! take part. The first denial wins and later predicates are never invoked.

mod policy;
mod rule;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::context::RequestContext;
use crate::descriptor::{OperationDescriptor, OperationKind};
use crate::error::OperationError;

pub use policy::{PolicySource, RolePolicy, RoleRequirement};
pub use rule::{AuthRequest, AuthorizationRule, FnRule};

bitflags::bitflags! {
    /// Operation kinds a rule is bound to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AuthorizeOperation: u8 {
        const CREATE = 1 << 0;
        const FETCH = 1 << 1;
        const INSERT = 1 << 2;
        const UPDATE = 1 << 3;
        const DELETE = 1 << 4;
        const EXECUTE = 1 << 5;
        const EVENT = 1 << 6;
        const READ = Self::CREATE.bits() | Self::FETCH.bits();
        const WRITE = Self::INSERT.bits() | Self::UPDATE.bits() | Self::DELETE.bits();
        const ALL = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits() | Self::EVENT.bits();
    }
}

impl From<OperationKind> for AuthorizeOperation {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Create => Self::CREATE,
            OperationKind::Fetch => Self::FETCH,
            OperationKind::Insert => Self::INSERT,
            OperationKind::Update => Self::UPDATE,
            OperationKind::Delete => Self::DELETE,
            OperationKind::Execute => Self::EXECUTE,
            OperationKind::Event => Self::EVENT,
        }
    }
}

/// Result of evaluating a rule or the whole gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allowed,
    Denied { reason: String },
}

impl Authorization {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

struct OperationRule {
    key: Option<String>,
    rule: Arc<dyn AuthorizationRule>,
}

#[derive(Default)]
struct TypeRules {
    class: Vec<Arc<dyn AuthorizationRule>>,
    operation: Vec<OperationRule>,
}

/// Evaluates every rule bound to an operation, short-circuiting on denial.
#[derive(Default)]
pub struct AuthorizationGate {
    types: HashMap<&'static str, TypeRules>,
    policies: Vec<Arc<dyn PolicySource>>,
}

impl AuthorizationGate {
    /// A gate with no rules; everything is allowed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule that applies to every operation of `target_type`.
    #[must_use]
    pub fn class_rule(mut self, target_type: &'static str, rule: impl AuthorizationRule + 'static) -> Self {
        self.types
            .entry(target_type)
            .or_default()
            .class
            .push(Arc::new(rule));
        self
    }

    /// Adds an operation-level rule, evaluated after all class-level rules.
    ///
    /// With `key` set, the rule only applies to that operation.
    #[must_use]
    pub fn operation_rule(
        mut self,
        target_type: &'static str,
        key: Option<&str>,
        rule: impl AuthorizationRule + 'static,
    ) -> Self {
        self.types
            .entry(target_type)
            .or_default()
            .operation
            .push(OperationRule {
                key: key.map(str::to_string),
                rule: Arc::new(rule),
            });
        self
    }

    /// Adds a platform policy, evaluated after all type-specific rules.
    #[must_use]
    pub fn policy(mut self, policy: impl PolicySource + 'static) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Evaluates the gate for one operation.
    pub async fn evaluate(
        &self,
        descriptor: &OperationDescriptor,
        target: Option<&(dyn Any + Send + Sync)>,
        context: &RequestContext,
    ) -> Authorization {
        let request = AuthRequest {
            descriptor,
            target,
            context,
        };
        let kind = AuthorizeOperation::from(descriptor.kind);

        if let Some(rules) = self.types.get(descriptor.target_type) {
            let class = rules.class.iter();
            let operation = rules
                .operation
                .iter()
                .filter(|r| r.key.as_deref().is_none_or(|key| key == descriptor.key))
                .map(|r| &r.rule);
            for rule in class.chain(operation) {
                if !rule.kinds().intersects(kind) {
                    continue;
                }
                if let Authorization::Denied { reason } = rule.evaluate(&request).await {
                    debug!(
                        rule = rule.name(),
                        operation = %descriptor.key,
                        %reason,
                        "authorization denied"
                    );
                    return Authorization::Denied { reason };
                }
            }
        }

        for policy in &self.policies {
            if let Authorization::Denied { reason } = policy.evaluate(&request).await {
                debug!(
                    rule = policy.name(),
                    operation = %descriptor.key,
                    %reason,
                    "authorization denied by policy"
                );
                return Authorization::Denied { reason };
            }
        }

        Authorization::Allowed
    }

    /// "Can I do this" query: same predicates as [`evaluate`](Self::evaluate),
    /// nothing is executed.
    pub async fn can(
        &self,
        descriptor: &OperationDescriptor,
        target: Option<&(dyn Any + Send + Sync)>,
        context: &RequestContext,
    ) -> bool {
        self.evaluate(descriptor, target, context).await.is_allowed()
    }

    /// Evaluates the gate and converts a denial into an error.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::NotAuthorized`] with the denying rule's reason.
    pub async fn check(
        &self,
        descriptor: &OperationDescriptor,
        target: Option<&(dyn Any + Send + Sync)>,
        context: &RequestContext,
    ) -> Result<(), OperationError> {
        match self.evaluate(descriptor, target, context).await {
            Authorization::Allowed => Ok(()),
            Authorization::Denied { reason } => Err(OperationError::NotAuthorized { reason }),
        }
    }
}

impl std::fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("target_types", &self.types.keys().collect::<Vec<_>>())
            .field("policies", &self.policies.len())
            .finish()
    }
}
