use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::element::{Content, Element, FunctionComponent, Props};
use crate::error::{HookError, RenderError};
use crate::hooks::{
    is_rendering, use_reducer, use_reducer_with_init, use_state, Dispatch, SetState,
};
use crate::memory_host::MemoryHost;
use crate::root::Root;
use crate::testing::TestScheduler;
use crate::RenderResult;

fn mount() -> (TestScheduler, Root<MemoryHost>) {
    let sched = TestScheduler::new();
    let mut host = MemoryHost::new();
    let container = host.create_container();
    let root = Root::mount(host, container, sched.scheduler.clone()).unwrap();
    (sched, root)
}

fn html(root: &Root<MemoryHost>) -> String {
    root.with_host(|host| host.inner_html(root.container()))
}

#[test]
fn hooks_fail_outside_a_component() {
    assert!(!is_rendering());
    assert_eq!(use_state(1).unwrap_err(), HookError::InvalidHookCall);
}

#[test]
fn reducer_state_survives_rerenders() {
    let (sched, root) = mount();
    let slot: Rc<RefCell<Option<Dispatch<&'static str>>>> = Rc::default();
    let list = {
        let slot = slot.clone();
        FunctionComponent::new("Todos", move |_: &Props| -> RenderResult {
            let (items, dispatch) = use_reducer(
                |items: &Vec<String>, item: &'static str| {
                    let mut next = items.clone();
                    next.push(item.to_owned());
                    next
                },
                Vec::new(),
            )?;
            *slot.borrow_mut() = Some(dispatch);
            Ok(Content::list(
                items.into_iter().map(|item| Element::host("li").key(item.clone()).child(item)),
            ))
        })
    };

    root.render(Element::component(&list)).unwrap();
    sched.flush();
    let dispatch = slot.borrow().clone().unwrap();
    dispatch.dispatch("milk");
    dispatch.dispatch("eggs");
    sched.flush();
    assert_eq!(html(&root), "<li>milk</li><li>eggs</li>");

    let again = slot.borrow().clone().unwrap();
    assert!(dispatch.same_hook(&again));
}

#[test]
fn lazy_initializer_runs_once() {
    let (sched, root) = mount();
    let inits = Rc::new(Cell::new(0));
    let counter = {
        let inits = inits.clone();
        FunctionComponent::new("Counter", move |props: &Props| -> RenderResult {
            let inits = inits.clone();
            let start = props.number("start").unwrap_or(0.0) as i64;
            let (count, _) = use_reducer_with_init(
                |count: &i64, delta: i64| count + delta,
                start,
                move |start| {
                    inits.set(inits.get() + 1);
                    start * 10
                },
            )?;
            Ok(Content::from(count))
        })
    };

    root.render(Element::component(&counter).attr("start", 4)).unwrap();
    sched.flush();
    root.render(Element::component(&counter).attr("start", 9)).unwrap();
    sched.flush();
    assert_eq!(inits.get(), 1);
    assert_eq!(html(&root), "40");
}

#[test]
fn conditional_hook_fails_the_render() {
    let (sched, root) = mount();
    let component = FunctionComponent::new("Conditional", |props: &Props| -> RenderResult {
        let (a, _) = use_state(1)?;
        if props.bool("extra") == Some(true) {
            let (b, _) = use_state(2)?;
            return Ok(Content::from(a + b));
        }
        Ok(Content::from(a))
    });

    root.render(Element::component(&component).attr("extra", true)).unwrap();
    sched.flush();
    assert_eq!(html(&root), "3");

    root.render(Element::component(&component).attr("extra", false)).unwrap();
    sched.flush();
    assert_eq!(
        root.take_render_error(),
        Some(RenderError::Hook(HookError::RenderedFewerHooks {
            previous: 2,
            rendered: 1,
        }))
    );
    assert_eq!(html(&root), "3");
}

#[test]
fn extra_hook_on_update_fails_the_render() {
    let (sched, root) = mount();
    let component = FunctionComponent::new("Growing", |props: &Props| -> RenderResult {
        let (a, _) = use_state(1)?;
        if props.bool("extra") == Some(true) {
            use_state(2)?;
        }
        Ok(Content::from(a))
    });

    root.render(Element::component(&component)).unwrap();
    sched.flush();
    root.render(Element::component(&component).attr("extra", true)).unwrap();
    sched.flush();
    assert_eq!(
        root.take_render_error(),
        Some(RenderError::Hook(HookError::RenderedMoreHooks { previous: 1 }))
    );
}

#[test]
fn changing_state_type_is_reported() {
    let (sched, root) = mount();
    let component = FunctionComponent::new("Shifty", |props: &Props| -> RenderResult {
        if props.bool("text") == Some(true) {
            let (value, _) = use_state(String::from("x"))?;
            return Ok(Content::from(value));
        }
        let (value, _) = use_state(0_i32)?;
        Ok(Content::from(value))
    });

    root.render(Element::component(&component)).unwrap();
    sched.flush();
    root.render(Element::component(&component).attr("text", true)).unwrap();
    sched.flush();
    assert_eq!(
        root.take_render_error(),
        Some(RenderError::Hook(HookError::StateTypeMismatch { index: 0 }))
    );
    assert_eq!(html(&root), "0");
}

#[test]
fn hook_context_is_cleared_after_a_failed_render() {
    let (sched, root) = mount();
    let failing = FunctionComponent::new("Failing", |_: &Props| -> RenderResult {
        use_state(0)?;
        Err(RenderError::component("Failing", "no"))
    });
    root.render(Element::component(&failing)).unwrap();
    sched.flush();
    assert!(root.take_render_error().is_some());
    assert!(!is_rendering());
}

#[test]
fn sibling_components_keep_separate_state() {
    let (sched, root) = mount();
    let slots: Rc<RefCell<Vec<Dispatch<SetState<i32>>>>> = Rc::default();
    let counter = {
        let slots = slots.clone();
        FunctionComponent::new("Counter", move |_: &Props| -> RenderResult {
            let (count, set_count) = use_state(0)?;
            slots.borrow_mut().push(set_count);
            Ok(Element::host("b").child(count).into())
        })
    };

    root.render(Content::list(vec![
        Element::component(&counter).key("left"),
        Element::component(&counter).key("right"),
    ]))
    .unwrap();
    sched.flush();

    let right = slots.borrow()[1].clone();
    right.set(7);
    sched.flush();
    assert_eq!(html(&root), "<b>0</b><b>7</b>");
}

#[test]
fn state_updaters_see_earlier_updates() {
    let (sched, root) = mount();
    let slot: Rc<RefCell<Option<Dispatch<SetState<i32>>>>> = Rc::default();
    let counter = {
        let slot = slot.clone();
        FunctionComponent::new("Counter", move |_: &Props| -> RenderResult {
            let (count, set_count) = use_state(0)?;
            *slot.borrow_mut() = Some(set_count);
            Ok(Content::from(count))
        })
    };
    root.render(Element::component(&counter)).unwrap();
    sched.flush();

    let set_count = slot.borrow().clone().unwrap();
    set_count.update(|count| count + 1);
    set_count.update(|count| count + 1);
    sched.flush();
    assert_eq!(html(&root), "2");

    set_count.set(10);
    set_count.update(|count| count * 3);
    sched.flush();
    assert_eq!(html(&root), "30");
}
