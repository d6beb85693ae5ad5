//! permit: runtime permission negotiation
//!
//! Works out which requested capabilities are still denied, asks the host to
//! grant them, interprets the host's asynchronous answer and routes it to
//! exactly one of four outcome handlers declared on the owner type.
//!
//! See [`negotiation`] for the flow and a quick start.

pub mod audit;
pub mod capability;
pub mod error;
pub mod negotiation;
pub mod owner;
pub mod registry;
#[cfg(feature = "subscriber")]
pub mod tracing_support;

pub use permit_macros::outcome_handlers;

pub use capability::{well_known, Capability, GrantResult, RequestId};
pub use error::{ConfigError, NegotiationError};
pub use negotiation::{
    classify, CapabilityOracle, Classification, Delivery, DenialState, LegacyPlatformOracle,
    MemoryCapabilityOracle, Negotiation, Negotiator, NegotiatorBuilder, NegotiatorPresets,
    RequestBuilder, RequestConfig,
};
pub use owner::{FreeContext, Owner, OwnerContext, OwnerKind};
pub use registry::{
    DispatchReport, HandlerFailure, HandlerTable, IntoHandlerResult, OutcomeEvent, OutcomeKind,
    OutcomeRegistry,
};
