#![forbid(unsafe_code)]

pub mod assets;
pub mod cancel;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod fetch;
pub mod formats;
pub mod ledger;
pub mod logging;
pub mod range;
pub mod sequence;
pub mod transport;
