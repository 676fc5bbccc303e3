//! Core reconciliation engine for Fibra: a fiber-style declarative UI
//! renderer with an interruptible render phase and a cooperative scheduler.

mod begin_work;
mod child_reconciler;
pub mod collections;
mod commit_work;
mod complete_work;
pub mod element;
pub mod error;
pub mod hooks;
pub mod host;
mod host_props;
pub mod memory_host;
pub mod platform;
mod root;
pub mod scheduler;
mod work_loop;
mod work_node;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use element::{
    ClassComponent, ClassInstance, Content, Element, ElementKind, FunctionComponent, Key,
    PropValue, Props, RenderResult, Style,
};
pub use error::{HookError, HostError, RenderError, RootError};
pub use hooks::{
    is_rendering, use_reducer, use_reducer_with_init, use_state, use_state_with, Dispatch,
    SetState,
};
pub use host::{Event, EventHandler, Host, HostNodeId};
pub use memory_host::{HostOp, MemoryHost, MemoryNodeKind};
pub use platform::{Clock, HostScheduler, Time};
pub use root::Root;
pub use scheduler::{PriorityLevel, Scheduler, SchedulerConfig, TaskCallback, TaskHandle};
pub use work_node::WorkNodeId;

#[cfg(test)]
#[path = "tests/root_tests.rs"]
mod root_tests;

#[cfg(test)]
#[path = "tests/hooks_render_tests.rs"]
mod hooks_render_tests;
