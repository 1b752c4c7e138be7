//! Unit tests for the builder engine
//!
//! Task runs, dispatch and the worker loop, with every collaborator
//! replaced by an in-process mock.

#![cfg(unix)]

mod test_dispatcher;
mod test_market_slug;
