#[macro_use]
extern crate log;
extern crate iobridge_sys;
extern crate snafu;

pub mod config;
pub mod core;
pub mod logger;
