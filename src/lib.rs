#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod config;
pub mod error;
pub mod fs;
pub mod params;
pub mod registry;
pub mod session;
pub mod stream;
pub mod transport;
pub mod utils;
