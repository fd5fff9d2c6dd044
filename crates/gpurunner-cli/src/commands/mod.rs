//! CLI commands implementation

mod run;
mod worker;

pub use run::{run, RunArgs};
pub use worker::worker;
