//! Test suites for the quill daemon.

mod support;
mod unit;
