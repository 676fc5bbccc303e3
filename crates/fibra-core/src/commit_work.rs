//! Commit: applies the effects recorded on a finished work-in-progress tree to
//! the host tree.
//!
//! The walk is post-order. A node's children are committed before its own
//! placement, deletion and update effects run, except for a content reset,
//! which must clear stale text before any child is inserted. Flags are
//! cleared as each node finishes, so no node is committed twice.

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::element::ClassInstance;
use crate::error::RenderError;
use crate::host::{Host, HostNodeId};
use crate::host_props::commit_update;
use crate::work_node::{Flags, StateNode, WorkArena, WorkNodeId, WorkTag};

/// Class instances whose subtrees were deleted; they get `will_unmount` once
/// the host tree is settled.
pub(crate) type Unmounted = Vec<Rc<RefCell<Box<dyn ClassInstance>>>>;

pub(crate) struct CommitContext<'a, H: Host + ?Sized> {
    pub(crate) arena: &'a mut WorkArena,
    pub(crate) host: &'a mut H,
    pub(crate) container: HostNodeId,
}

impl<H: Host + ?Sized> CommitContext<'_, H> {
    pub(crate) fn commit_mutation_effects(
        &mut self,
        finished_work: WorkNodeId,
    ) -> Result<Unmounted, RenderError> {
        let mut unmounted = Vec::new();
        let mut stack: Vec<(WorkNodeId, bool)> = vec![(finished_work, false)];
        while let Some((id, children_done)) = stack.pop() {
            if children_done {
                self.commit_own_effects(id, &mut unmounted)?;
                continue;
            }
            if self.arena[id].flags.contains(Flags::CONTENT_RESET) {
                if let Some(instance) = self.arena[id].state_node.host() {
                    self.host.set_text_content(instance, "")?;
                }
            }
            stack.push((id, true));
            let children: SmallVec<[WorkNodeId; 8]> = self.arena.children(id).collect();
            stack.extend(children.into_iter().rev().map(|child| (child, false)));
        }
        Ok(unmounted)
    }

    fn commit_own_effects(
        &mut self,
        id: WorkNodeId,
        unmounted: &mut Unmounted,
    ) -> Result<(), RenderError> {
        let flags = self.arena[id].flags;
        if flags.contains(Flags::CHILD_DELETION) {
            let deletions = std::mem::take(&mut self.arena[id].deletions);
            let parent = self.deletion_host_parent(id)?;
            for deleted in deletions {
                self.commit_deletion(deleted, parent, unmounted)?;
            }
        }
        if flags.contains(Flags::PLACEMENT) {
            self.commit_placement(id)?;
        }
        if flags.contains(Flags::UPDATE) {
            let payload = std::mem::take(&mut self.arena[id].update_payload);
            let instance = self.host_instance(id)?;
            commit_update(self.host, instance, &payload)?;
        }

        let node = &mut self.arena[id];
        node.flags = Flags::empty();
        node.deletions.clear();
        node.update_payload.clear();
        Ok(())
    }

    fn host_instance(&self, id: WorkNodeId) -> Result<HostNodeId, RenderError> {
        self.arena[id]
            .state_node
            .host()
            .ok_or(RenderError::MissingHostNode { node: id })
    }

    fn is_host_parent(&self, id: WorkNodeId) -> bool {
        matches!(self.arena[id].tag, WorkTag::HostElement | WorkTag::Root)
    }

    /// The host node that children of `parent` are attached to.
    fn host_parent_instance(&self, parent: WorkNodeId) -> Result<HostNodeId, RenderError> {
        match self.arena[parent].tag {
            WorkTag::Root => Ok(self.container),
            _ => self.host_instance(parent),
        }
    }

    fn get_host_parent_node(&self, id: WorkNodeId) -> Result<WorkNodeId, RenderError> {
        let mut parent = self.arena[id].return_;
        while let Some(candidate) = parent {
            if self.is_host_parent(candidate) {
                return Ok(candidate);
            }
            parent = self.arena[candidate].return_;
        }
        Err(RenderError::MissingHostParent { node: id })
    }

    fn deletion_host_parent(&self, id: WorkNodeId) -> Result<HostNodeId, RenderError> {
        if self.is_host_parent(id) {
            return self.host_parent_instance(id);
        }
        let parent = self.get_host_parent_node(id)?;
        self.host_parent_instance(parent)
    }

    /// The host node that `id`'s host nodes must be inserted before: the first
    /// host node after `id` in tree order that is not itself being placed.
    fn get_host_sibling(&self, id: WorkNodeId) -> Option<HostNodeId> {
        let mut node = id;
        'siblings: loop {
            while self.arena[node].sibling.is_none() {
                match self.arena[node].return_ {
                    Some(parent) if !self.is_host_parent(parent) => node = parent,
                    _ => return None,
                }
            }
            node = self.arena[node].sibling?;

            while !self.arena[node].tag.is_host() {
                if self.arena[node].flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                match self.arena[node].child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }
            if !self.arena[node].flags.contains(Flags::PLACEMENT) {
                if let Some(instance) = self.arena[node].state_node.host() {
                    return Some(instance);
                }
            }
        }
    }

    fn commit_placement(&mut self, id: WorkNodeId) -> Result<(), RenderError> {
        let parent = if self.arena[id].tag == WorkTag::Root {
            self.container
        } else {
            let parent = self.get_host_parent_node(id)?;
            self.host_parent_instance(parent)?
        };
        let before = match self.arena[id].tag {
            WorkTag::Root => None,
            _ => self.get_host_sibling(id),
        };
        log::trace!("placing work node {id} into {parent}");
        self.insert_or_append_placement_node(id, before, parent)
    }

    fn insert_or_append_placement_node(
        &mut self,
        id: WorkNodeId,
        before: Option<HostNodeId>,
        parent: HostNodeId,
    ) -> Result<(), RenderError> {
        if self.arena[id].tag.is_host() {
            let instance = self.host_instance(id)?;
            match before {
                Some(reference) => self.host.insert_before(parent, instance, reference)?,
                None => self.host.append_child(parent, instance)?,
            }
            return Ok(());
        }
        let mut child = self.arena[id].child;
        while let Some(next) = child {
            self.insert_or_append_placement_node(next, before, parent)?;
            child = self.arena[next].sibling;
        }
        Ok(())
    }

    fn commit_deletion(
        &mut self,
        deleted: WorkNodeId,
        parent: HostNodeId,
        unmounted: &mut Unmounted,
    ) -> Result<(), RenderError> {
        self.collect_instances(deleted, unmounted);
        self.remove_host_children(deleted, parent)
    }

    /// Removes every top-level host node of the deleted subtree.
    fn remove_host_children(
        &mut self,
        deleted: WorkNodeId,
        parent: HostNodeId,
    ) -> Result<(), RenderError> {
        if self.arena[deleted].tag.is_host() {
            let instance = self.host_instance(deleted)?;
            self.host.remove_child(parent, instance)?;
            return Ok(());
        }
        let mut child = self.arena[deleted].child;
        while let Some(next) = child {
            self.remove_host_children(next, parent)?;
            child = self.arena[next].sibling;
        }
        Ok(())
    }

    fn collect_instances(&self, deleted: WorkNodeId, unmounted: &mut Unmounted) {
        let mut stack = vec![deleted];
        while let Some(id) = stack.pop() {
            let node = &self.arena[id];
            if let StateNode::Instance(instance) = &node.state_node {
                unmounted.push(Rc::clone(instance));
            }
            stack.extend(self.arena.children(id));
        }
    }
}
