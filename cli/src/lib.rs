//! taleforge command line front end, exposed as a library for tests.

pub mod app;
pub mod commands;
pub mod http;
