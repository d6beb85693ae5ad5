//! Runtime permission negotiation
//!
//! # Architecture
//!
//! ```text
//!  RequestBuilder ──negotiate──────▶ ┌──────────────────────────────────┐
//!                                    │            Negotiator            │
//!  Host ──────────deliver_result───▶ │  Oracle    Registry    Audit     │
//!   ▲                                │  - Memory  (owner,     - File    │
//!   │                                │  - Legacy   id, kind)  - Memory  │
//!   └──────request_capabilities───── │  - custom              - Null    │
//!                                    └──────────────────────────────────┘
//! ```
//!
//! # Flow
//!
//! 1. Legacy platform: dispatch `Granted`.
//! 2. Nothing denied: dispatch `Granted`.
//! 3. `explain_before_asking` and the host suggests explaining a denied
//!    capability: dispatch `Explain` and stop. The explain handler is expected
//!    to negotiate again with [`RequestConfig::without_explanation`].
//! 4. Otherwise ask the host for the denied subset.
//!
//! When the host answers, [`classify`] turns the grant vector into `Granted`,
//! `Denied` (preceded by `Explain`) or `PermanentlyBlocked`.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use permit::{outcome_handlers, well_known, Negotiator, OutcomeEvent};
//!
//! #[outcome_handlers]
//! impl CameraScreen {
//!     #[permit(request = 7, outcome = granted)]
//!     fn open_camera(&mut self) { /* ... */ }
//!
//!     #[permit(request = 7, outcome = permanently_blocked)]
//!     fn point_to_settings(&mut self, event: &OutcomeEvent) { /* ... */ }
//! }
//!
//! let negotiator = Negotiator::builder()
//!     .oracle(host_oracle)
//!     .handlers::<CameraScreen>()
//!     .build()?;
//!
//! negotiator
//!     .with_owner(&mut screen)
//!     .request_id(7)
//!     .capabilities([well_known::CAMERA])
//!     .request()?;
//!
//! // Later, from the host's result callback:
//! negotiator.deliver_codes(&mut screen, 7, &[well_known::CAMERA], &[0])?;
//! ```

pub mod classifier;
pub mod negotiator;
pub mod oracle;
pub mod presets;
pub mod request;

pub use classifier::{classify, Classification};
pub use negotiator::{Delivery, Negotiation, Negotiator};
pub use oracle::{CapabilityOracle, DenialState, LegacyPlatformOracle, MemoryCapabilityOracle};
pub use presets::{NegotiatorBuilder, NegotiatorPresets};
pub use request::{RequestBuilder, RequestConfig};
