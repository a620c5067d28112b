//! Taxonomy events module.
//!
//! Provides the closed set of taxonomy events, the envelope that positions
//! them in a stream, and the sink trait used to fan committed events out to
//! the read projection.

mod domain_event;
mod sink;

pub use domain_event::*;
pub use sink::*;
