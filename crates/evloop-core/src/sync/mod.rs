pub mod atomic;

pub(crate) use std::sync::Arc;

pub(crate) use parking_lot::{const_mutex, Condvar, Mutex};
