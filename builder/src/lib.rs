//! Build-and-deploy task engine
//!
//! Executes build tasks handed over by the control plane: fetch the
//! deployable artifact, record the delivered version and ask the deployment
//! subsystem to roll the service.

pub mod api;
pub mod app;
pub mod db;
pub mod errors;
pub mod event;
pub mod exector;
pub mod filesys;
pub mod logs;
pub mod sources;
pub mod storage;
pub mod utils;
pub mod workers;
