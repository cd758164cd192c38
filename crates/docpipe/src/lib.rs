//! Library surface behind the `docpipe` binary, exposed so integration
//! tests can drive the HTTP router and CLI helpers in-process.

pub mod cli;
pub mod http;
pub mod providers;
pub mod tenant;
