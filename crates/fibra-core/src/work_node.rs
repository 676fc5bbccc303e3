//! Double-buffered work-node tree.
//!
//! Every position in the rendered tree is represented by at most two
//! [`WorkNode`]s, the committed one and the one being built, linked through
//! `alternate`. Nodes live in a [`WorkArena`] and refer to each other by
//! [`WorkNodeId`], so the `alternate` 2-cycle and the upward `return_` edges are
//! plain indices rather than owning pointers.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::rc::Rc;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::collections::map::HashSet;
use crate::element::{ClassInstance, Content, Element, ElementKind, Key, PropValue, Props};
use crate::hooks::HookRecord;
use crate::host::HostNodeId;

/// Generational handle into a [`WorkArena`]. A handle to a released node never
/// resolves again, even after its slot is reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkNodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for WorkNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WorkTag {
    Root,
    HostElement,
    HostText,
    FunctionComponent,
    ClassComponent,
    Fragment,
}

impl WorkTag {
    pub fn is_host(self) -> bool {
        matches!(self, WorkTag::HostElement | WorkTag::HostText)
    }
}

bitflags! {
    /// Pending effects, consumed and cleared by commit.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Flags: u8 {
        const PLACEMENT = 1 << 0;
        const UPDATE = 1 << 1;
        const DELETION = 1 << 2;
        const CHILD_DELETION = 1 << 3;
        /// Clear text content before children are inserted.
        const CONTENT_RESET = 1 << 4;
    }
}

/// Resource owned by a work node.
#[derive(Clone, Default)]
pub enum StateNode {
    #[default]
    None,
    Host(HostNodeId),
    Instance(Rc<RefCell<Box<dyn ClassInstance>>>),
    /// The root record lives outside the arena; the tag is enough to find it.
    Root,
}

impl StateNode {
    pub fn host(&self) -> Option<HostNodeId> {
        match self {
            StateNode::Host(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateNode::None => f.write_str("None"),
            StateNode::Host(id) => write!(f, "Host({id})"),
            StateNode::Instance(_) => f.write_str("Instance(..)"),
            StateNode::Root => f.write_str("Root"),
        }
    }
}

/// Props as seen by a work node: element props, or the string of a text node.
#[derive(Clone, Default)]
pub enum NodeProps {
    #[default]
    Empty,
    Props(Rc<Props>),
    Text(Rc<str>),
}

impl NodeProps {
    pub fn props(&self) -> Option<&Rc<Props>> {
        match self {
            NodeProps::Props(props) => Some(props),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&Rc<str>> {
        match self {
            NodeProps::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn same(&self, other: &NodeProps) -> bool {
        match (self, other) {
            (NodeProps::Empty, NodeProps::Empty) => true,
            (NodeProps::Props(a), NodeProps::Props(b)) => Rc::ptr_eq(a, b),
            (NodeProps::Text(a), NodeProps::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for NodeProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeProps::Empty => f.write_str("Empty"),
            NodeProps::Props(props) => props.fmt(f),
            NodeProps::Text(text) => write!(f, "{text:?}"),
        }
    }
}

#[derive(Clone, Default)]
pub enum MemoizedState {
    #[default]
    None,
    /// The declarative tree installed on a root.
    Root(Rc<Content>),
    Hooks(Vec<HookRecord>),
}

impl MemoizedState {
    pub(crate) fn hooks(&self) -> Option<&[HookRecord]> {
        match self {
            MemoizedState::Hooks(hooks) => Some(hooks),
            _ => None,
        }
    }
}

/// Prop changes computed during complete and applied during commit.
#[derive(Clone, Debug, PartialEq)]
pub enum PropChange {
    /// New text content, for text nodes and text-only elements.
    Text(Rc<str>),
    Set {
        key: Rc<str>,
        value: PropValue,
        previous: Option<PropValue>,
    },
    Remove {
        key: Rc<str>,
        previous: PropValue,
    },
}

#[derive(Clone)]
pub struct WorkNode {
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub kind: Option<ElementKind>,
    pub state_node: StateNode,
    pub return_: Option<WorkNodeId>,
    pub child: Option<WorkNodeId>,
    pub sibling: Option<WorkNodeId>,
    pub index: usize,
    pub pending_props: NodeProps,
    pub memoized_props: NodeProps,
    pub memoized_state: MemoizedState,
    pub flags: Flags,
    pub deletions: SmallVec<[WorkNodeId; 4]>,
    pub alternate: Option<WorkNodeId>,
    pub update_payload: Vec<PropChange>,
}

impl WorkNode {
    pub fn new(tag: WorkTag, pending_props: NodeProps, key: Option<Key>) -> Self {
        Self {
            tag,
            key,
            kind: None,
            state_node: StateNode::None,
            return_: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props,
            memoized_props: NodeProps::Empty,
            memoized_state: MemoizedState::None,
            flags: Flags::empty(),
            deletions: SmallVec::new(),
            alternate: None,
            update_payload: Vec::new(),
        }
    }

    pub fn host_tag(&self) -> Option<&str> {
        match &self.kind {
            Some(ElementKind::Host(tag)) => Some(tag),
            _ => None,
        }
    }
}

impl fmt::Debug for WorkNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkNode")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("state_node", &self.state_node)
            .field("index", &self.index)
            .field("flags", &self.flags)
            .field("alternate", &self.alternate)
            .finish_non_exhaustive()
    }
}

struct Slot {
    generation: u32,
    node: Option<WorkNode>,
}

/// Storage for both buffers of the work-node tree.
#[derive(Default)]
pub struct WorkArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl WorkArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn alloc(&mut self, node: WorkNode) -> WorkNodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return WorkNodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        WorkNodeId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: WorkNodeId) -> Option<&WorkNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: WorkNodeId) -> Option<&mut WorkNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: WorkNodeId) -> bool {
        self.get(id).is_some()
    }

    fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        if slot.node.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index);
            self.len -= 1;
        }
    }

    /// Children of `id` in sibling order.
    pub fn children(&self, id: WorkNodeId) -> ChildIter<'_> {
        ChildIter {
            arena: self,
            next: self.get(id).and_then(|node| node.child),
        }
    }

    /// Releases every node that is neither in the tree under `root` nor the
    /// alternate of a node in it. Returns the number of released nodes.
    pub fn retain_reachable(&mut self, root: WorkNodeId) -> usize {
        let mut live: HashSet<u32> = HashSet::default();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            if !live.insert(id.index) {
                continue;
            }
            if let Some(alternate) = node.alternate {
                if self.contains(alternate) {
                    live.insert(alternate.index);
                }
            }
            stack.extend(node.sibling);
            stack.extend(node.child);
        }

        let mut released = 0;
        for index in 0..self.slots.len() as u32 {
            if self.slots[index as usize].node.is_some() && !live.contains(&index) {
                self.release(index);
                released += 1;
            }
        }
        if released > 0 {
            log::trace!("released {released} unreachable work nodes");
        }
        released
    }
}

impl Index<WorkNodeId> for WorkArena {
    type Output = WorkNode;

    fn index(&self, id: WorkNodeId) -> &WorkNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale work node {id}"),
        }
    }
}

impl IndexMut<WorkNodeId> for WorkArena {
    fn index_mut(&mut self, id: WorkNodeId) -> &mut WorkNode {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale work node {id}"),
        }
    }
}

pub struct ChildIter<'a> {
    arena: &'a WorkArena,
    next: Option<WorkNodeId>,
}

impl Iterator for ChildIter<'_> {
    type Item = WorkNodeId;

    fn next(&mut self) -> Option<WorkNodeId> {
        let id = self.next?;
        self.next = self.arena.get(id).and_then(|node| node.sibling);
        Some(id)
    }
}

pub fn create_work_node(
    arena: &mut WorkArena,
    tag: WorkTag,
    pending_props: NodeProps,
    key: Option<Key>,
) -> WorkNodeId {
    arena.alloc(WorkNode::new(tag, pending_props, key))
}

/// Returns the work-in-progress twin of `current`, recycling its alternate
/// when one exists.
pub fn create_work_in_progress(
    arena: &mut WorkArena,
    current: WorkNodeId,
    pending_props: NodeProps,
) -> WorkNodeId {
    let source = arena[current].clone();
    let wip = match source.alternate.filter(|id| arena.contains(*id)) {
        Some(alternate) => alternate,
        None => {
            let mut node = WorkNode::new(source.tag, NodeProps::Empty, source.key.clone());
            node.alternate = Some(current);
            let id = arena.alloc(node);
            arena[current].alternate = Some(id);
            id
        }
    };

    let node = &mut arena[wip];
    node.pending_props = pending_props;
    node.kind = source.kind;
    node.state_node = source.state_node;
    node.child = source.child;
    node.memoized_state = source.memoized_state;
    node.memoized_props = source.memoized_props;
    node.sibling = source.sibling;
    node.index = source.index;
    node.flags = source.flags;
    node.return_ = source.return_;
    node.deletions.clear();
    node.update_payload.clear();
    wip
}

/// Fresh node for `element`, with no alternate.
pub fn create_node_from_element(arena: &mut WorkArena, element: &Element) -> WorkNodeId {
    let tag = match &element.kind {
        ElementKind::Host(_) => WorkTag::HostElement,
        ElementKind::Function(_) => WorkTag::FunctionComponent,
        ElementKind::Class(_) => WorkTag::ClassComponent,
        ElementKind::Fragment => WorkTag::Fragment,
    };
    let mut node = WorkNode::new(
        tag,
        NodeProps::Props(Rc::clone(&element.props)),
        element.key.clone(),
    );
    node.kind = Some(element.kind.clone());
    arena.alloc(node)
}

pub fn create_node_from_text(arena: &mut WorkArena, text: &Rc<str>) -> WorkNodeId {
    create_work_node(arena, WorkTag::HostText, NodeProps::Text(Rc::clone(text)), None)
}

/// Implicit fragment wrapping a nested child list.
pub fn create_node_from_list(
    arena: &mut WorkArena,
    items: &[Content],
    key: Option<Key>,
) -> WorkNodeId {
    let props = Props::with_children(Content::List(items.to_vec()));
    let mut node = WorkNode::new(WorkTag::Fragment, NodeProps::Props(Rc::new(props)), key);
    node.kind = Some(ElementKind::Fragment);
    arena.alloc(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(tag: &str) -> Element {
        Element::host(tag)
    }

    #[test]
    fn work_in_progress_is_recycled_between_buffers() {
        let mut arena = WorkArena::new();
        let current = create_node_from_element(&mut arena, &host("div"));
        let first = create_work_in_progress(&mut arena, current, NodeProps::Empty);
        assert_ne!(first, current);
        assert_eq!(arena[current].alternate, Some(first));
        assert_eq!(arena[first].alternate, Some(current));

        let second = create_work_in_progress(&mut arena, current, NodeProps::Empty);
        assert_eq!(first, second);
        assert_eq!(arena.len(), 2);

        // Swapping roles still only ever uses the same two nodes.
        let third = create_work_in_progress(&mut arena, first, NodeProps::Empty);
        assert_eq!(third, current);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn work_in_progress_copies_fields_and_resets_effects() {
        let mut arena = WorkArena::new();
        let current = create_node_from_element(&mut arena, &host("p").key("k"));
        arena[current].index = 3;
        arena[current].flags = Flags::UPDATE;
        let stray = create_work_node(&mut arena, WorkTag::HostText, NodeProps::Empty, None);
        let wip = create_work_in_progress(&mut arena, current, NodeProps::Empty);
        arena[wip].deletions.push(stray);

        let wip = create_work_in_progress(&mut arena, current, NodeProps::Text("t".into()));
        let node = &arena[wip];
        assert_eq!(node.index, 3);
        assert_eq!(node.flags, Flags::UPDATE);
        assert_eq!(node.key.as_deref(), Some("k"));
        assert_eq!(node.host_tag(), Some("p"));
        assert!(node.deletions.is_empty());
        assert_eq!(node.pending_props.text().map(|t| &**t), Some("t"));
    }

    #[test]
    fn element_kinds_map_to_tags() {
        let mut arena = WorkArena::new();
        let fragment = create_node_from_element(&mut arena, &Element::fragment(()));
        assert_eq!(arena[fragment].tag, WorkTag::Fragment);
        let component = crate::element::FunctionComponent::new("C", |_| Ok(Content::Empty));
        let function = create_node_from_element(&mut arena, &Element::component(&component));
        assert_eq!(arena[function].tag, WorkTag::FunctionComponent);
        assert!(arena[function].alternate.is_none());
    }

    #[test]
    fn released_ids_do_not_resolve_after_slot_reuse() {
        let mut arena = WorkArena::new();
        let root = create_work_node(&mut arena, WorkTag::Root, NodeProps::Empty, None);
        let orphan = create_work_node(&mut arena, WorkTag::HostText, NodeProps::Empty, None);
        assert_eq!(arena.retain_reachable(root), 1);
        assert!(!arena.contains(orphan));

        let reused = create_work_node(&mut arena, WorkTag::HostText, NodeProps::Empty, None);
        assert!(arena.contains(reused));
        assert!(!arena.contains(orphan));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn retain_keeps_alternates_of_reachable_nodes() {
        let mut arena = WorkArena::new();
        let root = create_work_node(&mut arena, WorkTag::Root, NodeProps::Empty, None);
        let child = create_node_from_element(&mut arena, &host("a"));
        arena[root].child = Some(child);
        arena[child].return_ = Some(root);
        let twin = create_work_in_progress(&mut arena, child, NodeProps::Empty);

        arena.retain_reachable(root);
        assert!(arena.contains(twin));
        assert_eq!(arena.children(root).collect::<Vec<_>>(), vec![child]);
    }
}
