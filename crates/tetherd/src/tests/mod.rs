//! Test suites for the Tether daemon.

pub(crate) mod support;
