//! # keelmcp-client
//!
//! The client half of keelmcp: connects over any transport, performs
//! the `initialize` handshake, correlates responses by id, answers
//! server-initiated requests (sampling, elicitation, roots) through
//! registered handlers, and forwards notifications to callbacks.

mod client;
mod error;
mod handlers;

pub use client::{Client, ClientBuilder};
pub use error::{ClientError, ClientResult};
pub use handlers::{
    ElicitationHandler, NotificationCallback, RootsProvider, SamplingHandler, StaticRoots,
};
