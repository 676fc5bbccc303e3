//! Child reconciliation: maps a parent's new [`Content`] onto its previous
//! child chain, reusing nodes whose key and kind match and recording
//! placements and deletions as flags. No host node is touched here, so an
//! abandoned render leaves nothing to undo.

use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::element::{Content, Element, ElementKind, Key, Props};
use crate::work_node::{
    create_node_from_element, create_node_from_list, create_node_from_text,
    create_work_in_progress, Flags, NodeProps, WorkArena, WorkNodeId, WorkTag,
};

/// Lookup key for the leftover children of an array diff: explicit key, or
/// position for unkeyed children.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum MapKey {
    Key(Key),
    Index(usize),
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct ChildReconciler {
    track_side_effects: bool,
}

/// Reconciler for a parent that already has committed children.
pub(crate) const UPDATE: ChildReconciler = ChildReconciler {
    track_side_effects: true,
};

/// Reconciler for a parent mounting for the first time. Placement is recorded
/// once on the subtree root by its ancestor, never on the nodes below it.
pub(crate) const MOUNT: ChildReconciler = ChildReconciler {
    track_side_effects: false,
};

impl ChildReconciler {
    /// Returns the new first child of `parent`.
    pub(crate) fn reconcile_child_nodes(
        self,
        arena: &mut WorkArena,
        parent: WorkNodeId,
        current_first_child: Option<WorkNodeId>,
        new_child: &Content,
    ) -> Option<WorkNodeId> {
        let new_child = match new_child {
            Content::Element(element)
                if element.kind == ElementKind::Fragment && element.key.is_none() =>
            {
                element.props.children()
            }
            other => other,
        };

        match new_child {
            Content::Element(element) => {
                let child =
                    self.reconcile_single_element(arena, parent, current_first_child, element);
                Some(self.place_single_child(arena, child))
            }
            Content::Text(text) => {
                let child =
                    self.reconcile_single_text_node(arena, parent, current_first_child, text);
                Some(self.place_single_child(arena, child))
            }
            Content::List(items) => {
                self.reconcile_children_array(arena, parent, current_first_child, items)
            }
            Content::Empty => {
                self.delete_remaining_children(arena, parent, current_first_child);
                None
            }
        }
    }

    fn delete_child(self, arena: &mut WorkArena, parent: WorkNodeId, child: WorkNodeId) {
        if !self.track_side_effects {
            return;
        }
        arena[child].flags.insert(Flags::DELETION);
        let parent = &mut arena[parent];
        parent.deletions.push(child);
        parent.flags.insert(Flags::CHILD_DELETION);
    }

    fn delete_remaining_children(
        self,
        arena: &mut WorkArena,
        parent: WorkNodeId,
        first: Option<WorkNodeId>,
    ) {
        if !self.track_side_effects {
            return;
        }
        let mut child = first;
        while let Some(id) = child {
            self.delete_child(arena, parent, id);
            child = arena[id].sibling;
        }
    }

    fn use_node(arena: &mut WorkArena, node: WorkNodeId, props: NodeProps) -> WorkNodeId {
        let clone = create_work_in_progress(arena, node, props);
        let clone_node = &mut arena[clone];
        clone_node.index = 0;
        clone_node.sibling = None;
        clone
    }

    /// Records `new_index` and decides whether the node moved. Returns the new
    /// last-placed index.
    fn place_child(
        self,
        arena: &mut WorkArena,
        new_node: WorkNodeId,
        last_placed_index: usize,
        new_index: usize,
    ) -> usize {
        arena[new_node].index = new_index;
        if !self.track_side_effects {
            return last_placed_index;
        }
        let old_index = arena[new_node]
            .alternate
            .and_then(|current| arena.get(current))
            .map(|current| current.index);
        match old_index {
            Some(old_index) if old_index < last_placed_index => {
                arena[new_node].flags.insert(Flags::PLACEMENT);
                last_placed_index
            }
            Some(old_index) => old_index,
            None => {
                arena[new_node].flags.insert(Flags::PLACEMENT);
                last_placed_index
            }
        }
    }

    /// Placement for the children resolved through the key map. Reused nodes
    /// on the longest run of increasing old indices stay put; every other node
    /// is flagged. Old indices below `last_placed_index` sit before a node the
    /// paired walk already kept, so they always move.
    fn place_remaining(
        self,
        arena: &mut WorkArena,
        nodes: &[WorkNodeId],
        last_placed_index: usize,
    ) {
        if !self.track_side_effects {
            return;
        }
        let old_indices: Vec<Option<usize>> = nodes
            .iter()
            .map(|id| {
                arena[*id]
                    .alternate
                    .and_then(|current| arena.get(current))
                    .map(|current| current.index)
                    .filter(|index| *index >= last_placed_index)
            })
            .collect();
        let stays = longest_increasing_run(&old_indices);
        for (id, stays) in nodes.iter().zip(stays) {
            if !stays {
                arena[*id].flags.insert(Flags::PLACEMENT);
            }
        }
    }

    fn place_single_child(self, arena: &mut WorkArena, new_node: WorkNodeId) -> WorkNodeId {
        if self.track_side_effects && arena[new_node].alternate.is_none() {
            arena[new_node].flags.insert(Flags::PLACEMENT);
        }
        new_node
    }

    fn reconcile_single_element(
        self,
        arena: &mut WorkArena,
        parent: WorkNodeId,
        current_first_child: Option<WorkNodeId>,
        element: &Element,
    ) -> WorkNodeId {
        let mut child = current_first_child;
        while let Some(id) = child {
            if arena[id].key == element.key {
                if arena[id].kind.as_ref() == Some(&element.kind) {
                    let rest = arena[id].sibling;
                    self.delete_remaining_children(arena, parent, rest);
                    let existing =
                        Self::use_node(arena, id, NodeProps::Props(Rc::clone(&element.props)));
                    arena[existing].return_ = Some(parent);
                    return existing;
                }
                // Same key, different kind: nothing below this point can match.
                self.delete_remaining_children(arena, parent, Some(id));
                break;
            }
            self.delete_child(arena, parent, id);
            child = arena[id].sibling;
        }

        let created = create_node_from_element(arena, element);
        arena[created].return_ = Some(parent);
        created
    }

    fn reconcile_single_text_node(
        self,
        arena: &mut WorkArena,
        parent: WorkNodeId,
        current_first_child: Option<WorkNodeId>,
        text: &Rc<str>,
    ) -> WorkNodeId {
        if let Some(id) = current_first_child.filter(|id| arena[*id].tag == WorkTag::HostText) {
            let rest = arena[id].sibling;
            self.delete_remaining_children(arena, parent, rest);
            let existing = Self::use_node(arena, id, NodeProps::Text(Rc::clone(text)));
            arena[existing].return_ = Some(parent);
            return existing;
        }
        self.delete_remaining_children(arena, parent, current_first_child);
        let created = create_node_from_text(arena, text);
        arena[created].return_ = Some(parent);
        created
    }

    fn update_text_node(
        arena: &mut WorkArena,
        parent: WorkNodeId,
        current: Option<WorkNodeId>,
        text: &Rc<str>,
    ) -> WorkNodeId {
        let node = match current.filter(|id| arena[*id].tag == WorkTag::HostText) {
            Some(id) => Self::use_node(arena, id, NodeProps::Text(Rc::clone(text))),
            None => create_node_from_text(arena, text),
        };
        arena[node].return_ = Some(parent);
        node
    }

    fn update_element(
        arena: &mut WorkArena,
        parent: WorkNodeId,
        current: Option<WorkNodeId>,
        element: &Element,
    ) -> WorkNodeId {
        let reusable = current.filter(|id| arena[*id].kind.as_ref() == Some(&element.kind));
        let node = match reusable {
            Some(id) => Self::use_node(arena, id, NodeProps::Props(Rc::clone(&element.props))),
            None => create_node_from_element(arena, element),
        };
        arena[node].return_ = Some(parent);
        node
    }

    fn update_fragment(
        arena: &mut WorkArena,
        parent: WorkNodeId,
        current: Option<WorkNodeId>,
        items: &[Content],
    ) -> WorkNodeId {
        let node = match current.filter(|id| arena[*id].tag == WorkTag::Fragment) {
            Some(id) => {
                let props = Props::with_children(Content::List(items.to_vec()));
                Self::use_node(arena, id, NodeProps::Props(Rc::new(props)))
            }
            None => create_node_from_list(arena, items, None),
        };
        arena[node].return_ = Some(parent);
        node
    }

    fn create_child(
        arena: &mut WorkArena,
        parent: WorkNodeId,
        new_child: &Content,
    ) -> Option<WorkNodeId> {
        let node = match new_child {
            Content::Text(text) => create_node_from_text(arena, text),
            Content::Element(element) => create_node_from_element(arena, element),
            Content::List(items) => create_node_from_list(arena, items, None),
            Content::Empty => return None,
        };
        arena[node].return_ = Some(parent);
        Some(node)
    }

    /// Pairs `new_child` with `old` when their keys agree. `None` means the
    /// slot does not match and the paired walk must stop.
    fn update_slot(
        arena: &mut WorkArena,
        parent: WorkNodeId,
        old: Option<WorkNodeId>,
        new_child: &Content,
    ) -> Option<WorkNodeId> {
        let key = old.and_then(|id| arena[id].key.clone());
        match new_child {
            // Text has no key, so it never pairs with a keyed node.
            Content::Text(text) if key.is_none() => {
                Some(Self::update_text_node(arena, parent, old, text))
            }
            Content::Element(element) if element.key == key => {
                Some(Self::update_element(arena, parent, old, element))
            }
            Content::List(items) if key.is_none() => {
                Some(Self::update_fragment(arena, parent, old, items))
            }
            _ => None,
        }
    }

    fn update_from_map(
        arena: &mut WorkArena,
        existing: &HashMap<MapKey, WorkNodeId>,
        parent: WorkNodeId,
        new_index: usize,
        new_child: &Content,
    ) -> Option<WorkNodeId> {
        match new_child {
            Content::Text(text) => {
                let matched = existing.get(&MapKey::Index(new_index)).copied();
                Some(Self::update_text_node(arena, parent, matched, text))
            }
            Content::Element(element) => {
                let key = match &element.key {
                    Some(key) => MapKey::Key(Rc::clone(key)),
                    None => MapKey::Index(new_index),
                };
                let matched = existing.get(&key).copied();
                Some(Self::update_element(arena, parent, matched, element))
            }
            Content::List(items) => {
                let matched = existing.get(&MapKey::Index(new_index)).copied();
                Some(Self::update_fragment(arena, parent, matched, items))
            }
            Content::Empty => None,
        }
    }

    fn map_key(arena: &WorkArena, id: WorkNodeId) -> MapKey {
        let node = &arena[id];
        match &node.key {
            Some(key) => MapKey::Key(Rc::clone(key)),
            None => MapKey::Index(node.index),
        }
    }

    /// Indexes the leftover old children. The first child with a given key
    /// wins; later duplicates are deleted on the spot. Returns the map and the
    /// indexed children in sibling order.
    fn map_remaining_children(
        self,
        arena: &mut WorkArena,
        parent: WorkNodeId,
        first: Option<WorkNodeId>,
    ) -> (HashMap<MapKey, WorkNodeId>, Vec<WorkNodeId>) {
        let mut existing = HashMap::default();
        let mut order = Vec::new();
        let mut child = first;
        while let Some(id) = child {
            let key = Self::map_key(arena, id);
            if existing.contains_key(&key) {
                log::warn!(
                    "duplicate child key {key:?} under work node {parent}; keeping the first"
                );
                self.delete_child(arena, parent, id);
            } else {
                existing.insert(key, id);
                order.push(id);
            }
            child = arena[id].sibling;
        }
        (existing, order)
    }

    fn reconcile_children_array(
        self,
        arena: &mut WorkArena,
        parent: WorkNodeId,
        current_first_child: Option<WorkNodeId>,
        new_children: &[Content],
    ) -> Option<WorkNodeId> {
        let mut result_first: Option<WorkNodeId> = None;
        let mut previous_new: Option<WorkNodeId> = None;
        let mut link = |arena: &mut WorkArena, node: WorkNodeId| {
            match previous_new {
                Some(previous) => arena[previous].sibling = Some(node),
                None => result_first = Some(node),
            }
            previous_new = Some(node);
        };

        let mut old = current_first_child;
        let mut last_placed_index = 0;
        let mut new_index = 0;

        // Pass 1: walk both lists in lockstep until a slot does not match.
        while let Some(old_id) = old {
            if new_index >= new_children.len() {
                break;
            }
            // A gap in the old indices means an earlier old child rendered
            // nothing; pair the new child with nothing and retry `old_id` next.
            let (slot_old, next_old) = if arena[old_id].index > new_index {
                (None, Some(old_id))
            } else {
                (Some(old_id), arena[old_id].sibling)
            };
            let Some(new_node) =
                Self::update_slot(arena, parent, slot_old, &new_children[new_index])
            else {
                break;
            };
            if let Some(slot_old) = slot_old {
                if arena[new_node].alternate.is_none() {
                    // Matched the slot but could not reuse the node.
                    self.delete_child(arena, parent, slot_old);
                }
            }
            last_placed_index = self.place_child(arena, new_node, last_placed_index, new_index);
            link(arena, new_node);
            old = next_old;
            new_index += 1;
        }

        if new_index == new_children.len() {
            self.delete_remaining_children(arena, parent, old);
            return result_first;
        }

        if old.is_none() {
            for (index, new_child) in new_children.iter().enumerate().skip(new_index) {
                let Some(new_node) = Self::create_child(arena, parent, new_child) else {
                    continue;
                };
                last_placed_index = self.place_child(arena, new_node, last_placed_index, index);
                link(arena, new_node);
            }
            return result_first;
        }

        // Pass 2: resolve the rest through a key map.
        let (mut existing, order) = self.map_remaining_children(arena, parent, old);
        let mut produced = Vec::with_capacity(new_children.len() - new_index);
        for (index, new_child) in new_children.iter().enumerate().skip(new_index) {
            let Some(new_node) =
                Self::update_from_map(arena, &existing, parent, index, new_child)
            else {
                continue;
            };
            if self.track_side_effects && arena[new_node].alternate.is_some() {
                let claimed = match &arena[new_node].key {
                    Some(key) => MapKey::Key(Rc::clone(key)),
                    None => MapKey::Index(index),
                };
                existing.remove(&claimed);
            }
            arena[new_node].index = index;
            link(arena, new_node);
            produced.push(new_node);
        }
        self.place_remaining(arena, &produced, last_placed_index);

        if self.track_side_effects {
            for id in order {
                let key = Self::map_key(arena, id);
                if existing.get(&key) == Some(&id) {
                    self.delete_child(arena, parent, id);
                }
            }
        }
        result_first
    }
}

/// Marks the members of one longest strictly increasing subsequence of the
/// `Some` values. `None` entries never belong to it.
fn longest_increasing_run(values: &[Option<usize>]) -> Vec<bool> {
    // tails[k]: position of the smallest tail of an increasing run of length k + 1.
    let mut tails: Vec<usize> = Vec::new();
    let mut predecessor: Vec<Option<usize>> = vec![None; values.len()];
    for (position, value) in values.iter().enumerate() {
        let Some(value) = *value else { continue };
        let rank = tails.partition_point(|&tail| values[tail].is_some_and(|t| t < value));
        predecessor[position] = rank.checked_sub(1).map(|r| tails[r]);
        if rank == tails.len() {
            tails.push(position);
        } else {
            tails[rank] = position;
        }
    }

    let mut member = vec![false; values.len()];
    let mut cursor = tails.last().copied();
    while let Some(position) = cursor {
        member[position] = true;
        cursor = predecessor[position];
    }
    member
}

#[cfg(test)]
#[path = "tests/child_reconciler_tests.rs"]
mod tests;
