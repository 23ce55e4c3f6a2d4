//! Platform-specific functionality.

mod realtime;

pub(crate) use realtime::boost_current_thread;
