//! Background workers

pub mod executor;
