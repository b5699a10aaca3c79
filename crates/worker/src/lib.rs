//! `imagen-worker` -- single-slot job runners and the command console.
//!
//! One [`runner::WorkerRunner`] per queue pulls jobs from the broker, runs
//! them through a [`handler::TaskHandler`], and applies the queue's retry
//! policy to failures.  The binary wires both runners, the result sweeper
//! and a JSON-lines [`commands::Console`] on stdin.

pub mod commands;
pub mod config;
pub mod generation;
pub mod handler;
pub mod runner;
pub mod validation;
