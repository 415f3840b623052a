pub mod data;
pub mod error;
pub mod integration;
pub mod speech;
pub mod state;
pub mod utils;

pub use error::{KusiError, Result};
