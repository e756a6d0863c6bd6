//! Infrastructure shared by the harness components

pub mod log_messages;
