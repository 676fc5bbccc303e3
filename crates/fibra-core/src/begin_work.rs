use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::child_reconciler::{MOUNT, UPDATE};
use crate::element::{Content, ElementKind, Props};
use crate::error::RenderError;
use crate::hooks;
use crate::host_props::should_set_text_content;
use crate::work_loop::UpdateScheduler;
use crate::work_node::{
    Flags, MemoizedState, NodeProps, StateNode, WorkArena, WorkNodeId, WorkTag,
};

/// Top-down half of a unit of work: produces the children of `wip` and
/// returns the first one, or `None` when the subtree bottoms out.
///
/// Component code runs while no arena borrow is held, so it may dispatch
/// updates freely.
pub(crate) fn begin_work(
    arena: &RefCell<WorkArena>,
    updater: &Weak<dyn UpdateScheduler>,
    current: Option<WorkNodeId>,
    wip: WorkNodeId,
) -> Result<Option<WorkNodeId>, RenderError> {
    let tag = arena.borrow()[wip].tag;
    match tag {
        WorkTag::Root => Ok(update_host_root(&mut arena.borrow_mut(), current, wip)),
        WorkTag::HostElement => Ok(update_host_element(&mut arena.borrow_mut(), current, wip)),
        WorkTag::HostText => Ok(None),
        WorkTag::FunctionComponent => update_function_component(arena, updater, current, wip),
        WorkTag::ClassComponent => update_class_component(arena, current, wip),
        WorkTag::Fragment => {
            let mut arena = arena.borrow_mut();
            let props = pending_props(&arena, wip);
            Ok(reconcile_children(&mut arena, current, wip, props.children()))
        }
    }
}

fn pending_props(arena: &WorkArena, wip: WorkNodeId) -> Rc<Props> {
    arena[wip].pending_props.props().cloned().unwrap_or_default()
}

fn reconcile_children(
    arena: &mut WorkArena,
    current: Option<WorkNodeId>,
    wip: WorkNodeId,
    next_children: &Content,
) -> Option<WorkNodeId> {
    let child = match current {
        None => MOUNT.reconcile_child_nodes(arena, wip, None, next_children),
        Some(current) => {
            let current_first_child = arena[current].child;
            UPDATE.reconcile_child_nodes(arena, wip, current_first_child, next_children)
        }
    };
    arena[wip].child = child;
    child
}

fn update_host_root(
    arena: &mut WorkArena,
    current: Option<WorkNodeId>,
    wip: WorkNodeId,
) -> Option<WorkNodeId> {
    let content = match &arena[wip].memoized_state {
        MemoizedState::Root(content) => Rc::clone(content),
        _ => Rc::new(Content::Empty),
    };
    reconcile_children(arena, current, wip, &content)
}

fn update_host_element(
    arena: &mut WorkArena,
    current: Option<WorkNodeId>,
    wip: WorkNodeId,
) -> Option<WorkNodeId> {
    let tag = arena[wip].host_tag().map(str::to_owned).unwrap_or_default();
    let next_props = pending_props(arena, wip);
    let text_only = should_set_text_content(&tag, &next_props);

    if let Some(current) = current {
        let was_text_only = arena[current]
            .memoized_props
            .props()
            .is_some_and(|previous| should_set_text_content(&tag, previous));
        if was_text_only && !text_only {
            arena[wip].flags.insert(Flags::CONTENT_RESET);
        }
    }

    if text_only {
        // The text lives on the host node itself; any child nodes go away.
        reconcile_children(arena, current, wip, &Content::Empty)
    } else {
        reconcile_children(arena, current, wip, next_props.children())
    }
}

fn update_function_component(
    arena: &RefCell<WorkArena>,
    updater: &Weak<dyn UpdateScheduler>,
    current: Option<WorkNodeId>,
    wip: WorkNodeId,
) -> Result<Option<WorkNodeId>, RenderError> {
    let (component, props, previous_hooks) = {
        let arena = arena.borrow();
        let node = &arena[wip];
        let Some(ElementKind::Function(component)) = node.kind.clone() else {
            panic!("function component node {wip} carries no component");
        };
        let previous_hooks = current.map(|current| {
            arena[current]
                .memoized_state
                .hooks()
                .map(<[_]>::to_vec)
                .unwrap_or_default()
        });
        (component, pending_props(&arena, wip), previous_hooks)
    };

    log::trace!("rendering <{}> at {wip}", component.name());
    let (children, hooks) = hooks::render_with_hooks(wip, previous_hooks, updater.clone(), || {
        component.render(&props)
    })?;

    let mut arena = arena.borrow_mut();
    arena[wip].memoized_state = MemoizedState::Hooks(hooks);
    Ok(reconcile_children(&mut arena, current, wip, &children))
}

fn update_class_component(
    arena: &RefCell<WorkArena>,
    current: Option<WorkNodeId>,
    wip: WorkNodeId,
) -> Result<Option<WorkNodeId>, RenderError> {
    let (component, props, instance) = {
        let arena = arena.borrow();
        let node = &arena[wip];
        let Some(ElementKind::Class(component)) = node.kind.clone() else {
            panic!("class component node {wip} carries no class");
        };
        let instance = match &node.state_node {
            StateNode::Instance(instance) => Some(Rc::clone(instance)),
            _ => None,
        };
        (component, pending_props(&arena, wip), instance)
    };

    let instance = match instance {
        Some(instance) => instance,
        None => {
            log::trace!("constructing <{}> at {wip}", component.name());
            Rc::new(RefCell::new(component.construct(&props)))
        }
    };
    let children = instance.borrow_mut().render(&props)?;

    let mut arena = arena.borrow_mut();
    arena[wip].state_node = StateNode::Instance(instance);
    Ok(reconcile_children(&mut arena, current, wip, &children))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::work_node::{create_work_in_progress, create_work_node};

    struct NoopUpdater;

    impl UpdateScheduler for NoopUpdater {
        fn schedule_update_on_node(&self, _node: WorkNodeId) {}
    }

    #[test]
    fn switching_from_text_to_children_resets_content() {
        let arena = RefCell::new(WorkArena::new());
        let updater: Rc<dyn UpdateScheduler> = Rc::new(NoopUpdater);
        let updater = Rc::downgrade(&updater);

        let text_props = Element::host("p").child("text").props().clone();
        let current = {
            let mut arena = arena.borrow_mut();
            let id = create_work_node(&mut arena, WorkTag::HostElement, NodeProps::Empty, None);
            arena[id].kind = Some(ElementKind::Host("p".into()));
            arena[id].memoized_props = NodeProps::Props(text_props);
            id
        };

        let list_props = Element::host("p")
            .child(Element::host("b"))
            .child(Element::host("i"))
            .props()
            .clone();
        let wip = create_work_in_progress(
            &mut arena.borrow_mut(),
            current,
            NodeProps::Props(list_props),
        );
        let first = begin_work(&arena, &updater, Some(current), wip).unwrap();

        let arena = arena.borrow();
        assert!(arena[wip].flags.contains(Flags::CONTENT_RESET));
        assert_eq!(arena.children(wip).count(), 2);
        assert_eq!(first, arena[wip].child);
    }

    #[test]
    fn text_only_element_has_no_child_nodes() {
        let arena = RefCell::new(WorkArena::new());
        let updater: Rc<dyn UpdateScheduler> = Rc::new(NoopUpdater);
        let wip = {
            let mut arena = arena.borrow_mut();
            crate::work_node::create_node_from_element(&mut arena, &Element::host("span").child(7))
        };
        let next = begin_work(&arena, &Rc::downgrade(&updater), None, wip).unwrap();
        assert!(next.is_none());
    }
}
