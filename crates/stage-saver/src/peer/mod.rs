//! Peer connection negotiation and media setup

pub mod negotiator;
pub mod readiness;
pub mod setup;

pub use negotiator::{NegotiationState, SessionNegotiator};
pub use readiness::{ReadinessSignal, ReadinessTrigger};
pub use setup::{MediaSetup, StageMediaSetup};
