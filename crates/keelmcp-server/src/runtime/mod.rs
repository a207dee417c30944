//! Transport runtimes: the loops that marry a [`crate::Dispatcher`] to
//! a framing.

pub mod http;
pub mod sse;
pub mod stdio;
