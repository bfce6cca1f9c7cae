#[macro_use]
extern crate log;

mod analyzer;
mod cancel;
mod capture;
mod config;
mod context;
mod engine;
mod error;
mod five_tuple;
mod input;
mod timestamp;
mod writer;

pub use analyzer::*;
pub use cancel::CancelToken;
pub use capture::*;
pub use config::Config;
pub use context::*;
pub use engine::*;
pub use error::*;
pub use five_tuple::*;
pub use input::read_capture_file;
pub use timestamp::{Timestamp, MICROS_PER_SEC};
pub use writer::*;
