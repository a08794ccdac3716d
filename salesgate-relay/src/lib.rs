//! SalesGate relay
//!
//! Ingests sales and geography datasets submitted as two-entry containers,
//! normalizes them to the canonical record shapes, resolves drug and address
//! identities against the shared registry and relays the result from the
//! inbound bucket to the outbound bucket.

pub mod audit;
pub mod codec;
pub mod error;
pub mod model;
pub mod normalizer;
pub mod relay;
pub mod resolver;

pub use error::{ErrorKind, Stage, StageError};
pub use relay::{EnvelopeRef, Outcome, Relay, RelayContext};
