//! Capture Mode Negotiation
//!
//! Turns a client request (region of interest, layer count, bit depth,
//! conversion policy, target rate) into a concrete camera operating mode.
//! Fixed-table modes and continuous (Format 7) modes are searched in an
//! order that depends on the request; continuous modes additionally get an
//! isochronous packet size that approximates the requested rate.

mod compat;
mod continuous;
mod discrete;
mod error;
mod negotiate;
mod packet;
mod request;

pub use compat::{accepts, native_layers};
pub use continuous::search_continuous;
pub use discrete::{pick_framerate, search_discrete};
pub use error::NegotiationError;
pub use negotiate::{discrete_only, effective_iso_speed, negotiate, reconcile_layers};
pub use packet::{compute_packet_size, PacketPlan};
pub use request::{DataConversion, FrameRate, NegotiatedMode, NegotiationRequest, Roi};
