//! Asynchronous event processing
//!
//! A single worker thread owns a state machine and applies events that
//! are posted by arbitrary producer threads. Events are queued in FIFO
//! order, detached from the queue in batches, and applied sequentially
//! while producers remain unblocked. The latest state is published as
//! an immutable snapshot that can be read from any thread.
//!
//! See [`Controller`] for the public facade.

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![warn(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::explicit_deref_methods)]
#![warn(clippy::explicit_into_iter_loop)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::must_use_candidate)]
#![warn(rustdoc::broken_intra_doc_links)]
#![cfg_attr(not(test), deny(clippy::panic_in_result_fn))]

pub mod config;
pub mod controller;
pub mod event;
pub mod machine;
pub mod queue;
pub mod sync;
pub mod worker;

pub use self::{
    config::{default_config, WorkerConfig},
    controller::{ControlError, Controller, EventSender, Result},
    event::{Event, Transition},
    machine::{ApplyError, Context, StateMachine},
    queue::{EnqueueError, EventQueue},
    worker::{
        thread::{JoinedThread, RecoverableParams, TerminatedThread},
        Lifecycle, Notifications, NotificationsBoxed, Statistics,
    },
};

#[cfg(test)]
mod testing;
