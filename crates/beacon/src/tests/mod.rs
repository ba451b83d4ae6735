//! Crate-level unit and behaviour tests.

mod support;

pub(crate) use support::{GREETER, Greeter, SharedOutput, Workspace, terminal, workspace};
