#![cfg_attr(not(test), deny(clippy::panic_in_result_fn))]
#![cfg_attr(not(debug_assertions), deny(clippy::used_underscore_binding))]

pub use evloop_core as core;

pub use evloop_core::{
    ApplyError, Context, ControlError, Controller, Event, EventSender, JoinedThread, Lifecycle,
    Notifications, StateMachine, Statistics, TerminatedThread, Transition, WorkerConfig,
};
