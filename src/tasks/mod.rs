pub mod featured;
pub mod poll_closer;
