//! Host-node capability interface.
//!
//! The reconciler never touches a platform tree directly. Complete and Commit
//! go through a [`Host`], which owns the real nodes and hands out
//! [`HostNodeId`]s for them.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::element::PropValue;
use crate::error::HostError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostNodeId(pub usize);

impl fmt::Display for HostNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Event delivered to a handler attached with [`Host::add_event_listener`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub name: Rc<str>,
    pub target: HostNodeId,
}

/// An event handler prop. Two handlers are equal only if they are the same
/// closure allocation.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);

impl EventHandler {
    pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Platform mutation primitives consumed by Complete and Commit.
pub trait Host: Any {
    fn create_element(&mut self, tag: &str) -> HostNodeId;

    fn create_text_node(&mut self, text: &str) -> HostNodeId;

    /// Plain property assignment. Style and event props never reach this.
    fn set_property(
        &mut self,
        node: HostNodeId,
        key: &str,
        value: &PropValue,
    ) -> Result<(), HostError>;

    fn remove_property(&mut self, node: HostNodeId, key: &str) -> Result<(), HostError>;

    /// Sets one style entry; `None` clears it.
    fn set_style(
        &mut self,
        node: HostNodeId,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), HostError>;

    fn add_event_listener(
        &mut self,
        node: HostNodeId,
        event: &str,
        handler: EventHandler,
    ) -> Result<(), HostError>;

    fn remove_event_listener(
        &mut self,
        node: HostNodeId,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError>;

    fn append_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError>;

    fn insert_before(
        &mut self,
        parent: HostNodeId,
        child: HostNodeId,
        reference: HostNodeId,
    ) -> Result<(), HostError>;

    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError>;

    fn set_text_content(&mut self, node: HostNodeId, text: &str) -> Result<(), HostError>;

    /// Whether `node` may host a mounted tree.
    fn is_container(&self, node: HostNodeId) -> bool;
}
