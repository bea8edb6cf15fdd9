//! media-proxy-core: a range-aware slice cache and HLS manifest rewriter for
//! a synchronized-viewing media proxy. See `crate::proxy` for the nine core
//! components (C1–C9) and `crate::web` for the two HTTP handlers built on
//! top of them.

pub mod config;
pub mod errors;
pub mod proxy;
pub mod web;
