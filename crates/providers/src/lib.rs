//! Round operation implementations for Roundgate.
//!
//! All operations implement the `roundgate_core::RoundOperation` trait.
//! The gateway is handed one at startup.

pub mod http;

pub use http::HttpRoundOperation;
