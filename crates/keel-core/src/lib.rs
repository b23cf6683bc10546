//! Response envelope and failure classification for Keel servers
//!
//! Everything in this crate is transport-agnostic: a raised error goes in,
//! a [`Classification`] (envelope plus log action) comes out. The server
//! crate is responsible for putting the result on the wire.

#![allow(clippy::must_use_candidate)]

mod classify;
mod envelope;
mod failure;
mod unwrap;

pub use classify::{Classification, LogAction, Outcome, Registry, Rule, original_message};
pub use envelope::Message;
pub use failure::{BoxError, Failure, FailureKind};
pub use unwrap::{deepest_cause, render_chain};
