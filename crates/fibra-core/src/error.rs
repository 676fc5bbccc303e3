use std::fmt;

use crate::host::HostNodeId;
use crate::work_node::WorkNodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Missing { id: HostNodeId },
    NotAChild { parent: HostNodeId, child: HostNodeId },
    NotAnElement { id: HostNodeId },
    NotAContainer { id: HostNodeId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { id } => write!(f, "host node {id} missing"),
            HostError::NotAChild { parent, child } => {
                write!(f, "host node {child} is not a child of {parent}")
            }
            HostError::NotAnElement { id } => write!(f, "host node {id} is not an element"),
            HostError::NotAContainer { id } => {
                write!(f, "host node {id} cannot contain children")
            }
        }
    }
}

impl std::error::Error for HostError {}

/// Fatal misuse of the hook runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// A hook ran outside a function component body.
    InvalidHookCall,
    /// More hooks ran than during the previous render of the same component.
    RenderedMoreHooks { previous: usize },
    /// Fewer hooks ran than during the previous render of the same component.
    RenderedFewerHooks { previous: usize, rendered: usize },
    /// The hook at `index` holds state of a different type than requested.
    StateTypeMismatch { index: usize },
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::InvalidHookCall => f.write_str(
                "invalid hook call: hooks can only be called inside a function component body",
            ),
            HookError::RenderedMoreHooks { previous } => write!(
                f,
                "rendered more hooks than during the previous render ({previous})"
            ),
            HookError::RenderedFewerHooks { previous, rendered } => write!(
                f,
                "rendered fewer hooks than expected ({rendered} of {previous}); \
                 this may be caused by an accidental early return"
            ),
            HookError::StateTypeMismatch { index } => {
                write!(f, "hook {index} changed its state type between renders")
            }
        }
    }
}

impl std::error::Error for HookError {}

/// Failure that aborts an in-progress render. The committed tree is untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    Hook(HookError),
    Host(HostError),
    /// A host-bearing node has no host-bearing ancestor.
    MissingHostParent { node: WorkNodeId },
    /// A host node was expected on a completed work node.
    MissingHostNode { node: WorkNodeId },
    /// Components kept scheduling updates while rendering.
    TooManyRenderPhaseUpdates { limit: u32 },
    /// Raised by component code.
    Component { name: String, message: String },
}

impl RenderError {
    pub fn component(name: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Component {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Hook(err) => write!(f, "{err}"),
            RenderError::Host(err) => write!(f, "host mutation failed: {err}"),
            RenderError::MissingHostParent { node } => {
                write!(f, "work node {node} has no host parent")
            }
            RenderError::MissingHostNode { node } => {
                write!(f, "work node {node} was committed without a host node")
            }
            RenderError::TooManyRenderPhaseUpdates { limit } => write!(
                f,
                "too many re-renders: more than {limit} updates were scheduled during render"
            ),
            RenderError::Component { name, message } => {
                write!(f, "component {name} failed: {message}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Hook(err) => Some(err),
            RenderError::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HookError> for RenderError {
    fn from(err: HookError) -> Self {
        RenderError::Hook(err)
    }
}

impl From<HostError> for RenderError {
    fn from(err: HostError) -> Self {
        RenderError::Host(err)
    }
}

/// Misuse of the root entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootError {
    Unmounted,
    UnsupportedContainer { id: HostNodeId },
}

impl fmt::Display for RootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootError::Unmounted => f.write_str("cannot update an unmounted root"),
            RootError::UnsupportedContainer { id } => {
                write!(f, "target container {id} is not a supported host container")
            }
        }
    }
}

impl std::error::Error for RootError {}
