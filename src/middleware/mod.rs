//! Middleware built on the router's handler contract.

pub mod csrf;

pub use csrf::{CsrfConfig, CsrfMiddleware};
