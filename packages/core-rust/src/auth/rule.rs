use std::any::Any;
use std::borrow::Cow;

use async_trait::async_trait;

use super::{AuthorizeOperation, Authorization};
use crate::context::RequestContext;
use crate::descriptor::OperationDescriptor;

/// Everything a rule may inspect when deciding.
#[derive(Clone, Copy)]
pub struct AuthRequest<'a> {
    pub descriptor: &'a OperationDescriptor,
    /// Target instance, present for operations that act on an entity.
    pub target: Option<&'a (dyn Any + Send + Sync)>,
    pub context: &'a RequestContext,
}

impl<'a> AuthRequest<'a> {
    #[must_use]
    pub fn new(descriptor: &'a OperationDescriptor, context: &'a RequestContext) -> Self {
        Self {
            descriptor,
            target: None,
            context,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: &'a (dyn Any + Send + Sync)) -> Self {
        self.target = Some(target);
        self
    }

    /// Target downcast to its concrete type.
    #[must_use]
    pub fn target_as<T: 'static>(&self) -> Option<&'a T> {
        self.target.and_then(|target| target.downcast_ref::<T>())
    }
}

/// A named predicate bound to one or more operation kinds.
#[async_trait]
pub trait AuthorizationRule: Send + Sync {
    fn name(&self) -> &str;

    /// Kinds the rule applies to.
    fn kinds(&self) -> AuthorizeOperation;

    async fn evaluate(&self, request: &AuthRequest<'_>) -> Authorization;
}

type Predicate = dyn Fn(&AuthRequest<'_>) -> Authorization + Send + Sync;

/// Rule backed by a synchronous closure.
pub struct FnRule {
    name: Cow<'static, str>,
    kinds: AuthorizeOperation,
    predicate: Box<Predicate>,
}

impl FnRule {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, kinds: AuthorizeOperation, predicate: F) -> Self
    where
        F: Fn(&AuthRequest<'_>) -> Authorization + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kinds,
            predicate: Box::new(predicate),
        }
    }
}

#[async_trait]
impl AuthorizationRule for FnRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn kinds(&self) -> AuthorizeOperation {
        self.kinds
    }

    async fn evaluate(&self, request: &AuthRequest<'_>) -> Authorization {
        (self.predicate)(request)
    }
}
