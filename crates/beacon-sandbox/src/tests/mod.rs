//! Unit and behavioural tests for the sandbox crate.

mod unit;
