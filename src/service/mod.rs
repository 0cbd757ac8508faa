// service/mod.rs - Registration Service

//! The front door of the subsystem: admission, discovery, and expiry.
//!
//! # Features
//!
//! - **Admission pipeline**: preconditions, certificate validation, policy
//!   evaluation, then an atomic commit to registry and index
//! - **Discovery**: capability queries ranked by trust score
//! - **Expiry**: on-demand cleanup plus a background sweep loop
//!
//! # Example
//!
//! ```ignore
//! use poid::prelude::*;
//!
//! let service = Arc::new(RegistrationService::new(config, verifier, store));
//!
//! let info = service
//!     .register(
//!         RegistrationRequest::new("FinanceBot")
//!             .with_capability("finance")
//!             .with_certificate(certificate),
//!     )
//!     .await?;
//!
//! let agents = service.discover("finance", 95, 10);
//!
//! let mut sweeper = ExpirySweeper::new(Arc::clone(&service));
//! sweeper.start();
//! ```

mod registration;
mod sweeper;

pub use registration::{
    RegistrationError, RegistrationRequest, RegistrationService, RequestState, ServiceStats,
};
pub use sweeper::ExpirySweeper;
