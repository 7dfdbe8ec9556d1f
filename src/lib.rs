pub mod augment;
pub mod cli;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod history;
pub mod logging;
pub mod model;
pub mod split;
pub mod training;

pub use error::{Error, Result};
