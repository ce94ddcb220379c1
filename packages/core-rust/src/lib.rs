//! Tandem core: ordinal codec, operation descriptors, save routing, and the
//! authorization gate.
//!
//! Everything here is runtime-agnostic; the Tokio dispatch runtime lives in
//! `tandem-runtime`.

pub mod auth;
pub mod codec;
pub mod context;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod lifecycle;
pub mod mapping;
pub mod save;
pub mod types;

pub use auth::{
    AuthRequest, Authorization, AuthorizationGate, AuthorizationRule, AuthorizeOperation, FnRule,
    PolicySource, RolePolicy,
};
pub use codec::{
    shared, Args, Binary, Codec, CodecError, Decoder, Encoder, MappingError, PayloadFormat, Shared,
    TypeShape, Wire,
};
pub use context::RequestContext;
pub use descriptor::{
    DescriptorError, Entity, OperationDescriptor, OperationKind, OperationTable, ParamDescriptor,
    ParamKind,
};
pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use error::{OperationError, WireError, WireErrorKind};
pub use lifecycle::Lifecycle;
pub use save::{route_save, SaveMeta, SaveRoute};
pub use types::Principal;
