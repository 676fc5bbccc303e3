use crate::error::{HostError, RenderError};
use crate::host::{Host, HostNodeId};
use crate::host_props::{diff_properties, set_initial_properties};
use crate::work_node::{Flags, NodeProps, PropChange, StateNode, WorkArena, WorkNodeId, WorkTag};

/// Bottom-up half of a unit of work. Creates host nodes for new host work
/// nodes, fully populated with their host descendants, and queues prop
/// changes for existing ones. Nothing attached to the container is touched.
pub(crate) fn complete_work<H: Host + ?Sized>(
    arena: &mut WorkArena,
    host: &mut H,
    wip: WorkNodeId,
) -> Result<(), RenderError> {
    let node = &arena[wip];
    let current = node.alternate;
    let existing = node.state_node.host();

    match node.tag {
        WorkTag::HostElement => match (current, existing) {
            (Some(current), Some(_)) => {
                let old = arena[current].memoized_props.clone();
                let new = arena[wip].pending_props.clone();
                if old.same(&new) {
                    return Ok(());
                }
                let (Some(old), Some(new)) = (old.props(), new.props()) else {
                    return Ok(());
                };
                let payload = diff_properties(old, new);
                if !payload.is_empty() {
                    let node = &mut arena[wip];
                    node.update_payload = payload;
                    node.flags.insert(Flags::UPDATE);
                }
                Ok(())
            }
            _ => {
                let tag = node.host_tag().unwrap_or("div").to_owned();
                let props = node.pending_props.props().cloned().unwrap_or_default();
                let instance = host.create_element(&tag);
                append_all_children(arena, host, instance, wip)?;
                set_initial_properties(host, instance, &props)?;
                arena[wip].state_node = StateNode::Host(instance);
                Ok(())
            }
        },
        WorkTag::HostText => {
            let text = match &node.pending_props {
                NodeProps::Text(text) => text.clone(),
                _ => "".into(),
            };
            match (current, existing) {
                (Some(current), Some(_)) => {
                    let changed = arena[current].memoized_props.text() != Some(&text);
                    if changed {
                        let node = &mut arena[wip];
                        node.update_payload = vec![PropChange::Text(text)];
                        node.flags.insert(Flags::UPDATE);
                    }
                }
                _ => {
                    let instance = host.create_text_node(&text);
                    arena[wip].state_node = StateNode::Host(instance);
                }
            }
            Ok(())
        }
        WorkTag::Root
        | WorkTag::FunctionComponent
        | WorkTag::ClassComponent
        | WorkTag::Fragment => Ok(()),
    }
}

/// Appends the top-level host nodes under `wip` to `parent`, looking through
/// components and fragments.
fn append_all_children<H: Host + ?Sized>(
    arena: &WorkArena,
    host: &mut H,
    parent: HostNodeId,
    wip: WorkNodeId,
) -> Result<(), HostError> {
    let mut next = arena[wip].child;
    while let Some(id) = next {
        let node = &arena[id];
        if node.tag.is_host() {
            if let Some(child) = node.state_node.host() {
                host.append_child(parent, child)?;
            }
        } else if let Some(child) = node.child {
            next = Some(child);
            continue;
        }

        let mut cursor = id;
        next = loop {
            if let Some(sibling) = arena[cursor].sibling {
                break Some(sibling);
            }
            match arena[cursor].return_ {
                Some(parent) if parent != wip => cursor = parent,
                _ => break None,
            }
        };
    }
    Ok(())
}
