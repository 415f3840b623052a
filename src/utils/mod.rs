pub mod timer;

pub use timer::{TimerId, TimerQueue};
