//! `imagen-engine` -- the generation engine contract and its HTTP client.
//!
//! The engine is an external, stateful inference server holding one base
//! model and a set of LoRA adapters on a single accelerator.  This crate
//! defines the narrow [`contract::GenerationEngine`] seam the worker calls,
//! a [`cache::ModelCache`] that tracks what the server currently has
//! loaded, and [`http::HttpEngine`] which speaks JSON over HTTP.

pub mod api;
pub mod cache;
pub mod contract;
pub mod http;
pub mod readiness;

pub use contract::{EngineError, EngineReference, EngineRequest, GenerationEngine};
pub use http::HttpEngine;
