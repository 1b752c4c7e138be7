//! Process wiring

pub mod run;
pub mod state;
