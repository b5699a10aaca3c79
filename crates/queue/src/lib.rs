//! `imagen-queue` -- in-process job broker, result backend and the
//! submission/read sides built on them.
//!
//! - [`broker::Broker`] holds one single-slot queue per [`job::QueueName`].
//! - [`backend::ResultBackend`] stores each job's append-only state history
//!   and expires settled jobs after the retention window.
//! - [`submit::Submitter`] gates generation jobs through the
//!   [`submit::AdmissionController`].
//! - [`client::LifecycleClient`] maps job ids to caller-facing status.

pub mod backend;
pub mod broker;
pub mod client;
pub mod job;
pub mod state;
pub mod submit;
