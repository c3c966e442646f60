#![forbid(unsafe_code)]

pub mod assembly;
pub mod config;
pub mod error;
pub mod graph;
pub mod mastery;
pub mod model;
pub mod progression;
pub mod scheduler;
pub mod stability;
pub mod time;

pub use error::Error;
pub use time::Clock;
