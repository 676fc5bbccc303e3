use super::StdRuntime;
use fibra_core::{
    use_state, Clock, Content, Element, FunctionComponent, MemoryHost, PriorityLevel, Props,
    RenderResult, Root,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn run_until_idle_drains_ready_tasks() {
    let runtime = StdRuntime::new();
    let ran = Rc::new(RefCell::new(Vec::new()));
    for name in ["first", "second"] {
        let ran = ran.clone();
        runtime
            .scheduler()
            .schedule_callback(PriorityLevel::Normal, move |_| {
                ran.borrow_mut().push(name);
                None
            });
    }

    assert!(runtime.run_until_idle() >= 1);
    assert_eq!(*ran.borrow(), ["first", "second"]);
    assert!(!runtime.scheduler().has_pending_work());
}

#[test]
fn delayed_task_runs_after_its_delay() {
    let runtime = StdRuntime::new();
    let clock = runtime.clock();
    let ran_at = Rc::new(Cell::new(None));
    let slot = ran_at.clone();
    let scheduled_at = clock.now();
    runtime
        .scheduler()
        .schedule_delayed_callback(PriorityLevel::Normal, 5, move |_| {
            slot.set(Some(clock.now()));
            None
        });
    assert!(runtime.host_scheduler().timer_deadline().is_some());

    runtime.run_until_idle();
    let ran_at = ran_at.get().expect("delayed task ran");
    assert!(ran_at - scheduled_at >= 5);
}

#[test]
fn waker_fires_when_work_is_scheduled() {
    let runtime = StdRuntime::new();
    let wakes = Rc::new(Cell::new(0));
    let counter = wakes.clone();
    runtime
        .host_scheduler()
        .set_waker(move || counter.set(counter.get() + 1));

    runtime
        .scheduler()
        .schedule_callback(PriorityLevel::UserBlocking, |_| None);
    assert_eq!(wakes.get(), 1);

    runtime.host_scheduler().clear_waker();
    runtime.run_until_idle();
    runtime
        .scheduler()
        .schedule_callback(PriorityLevel::UserBlocking, |_| None);
    assert_eq!(wakes.get(), 1);
}

#[test]
fn root_renders_through_the_std_runtime() {
    let runtime = StdRuntime::new();
    let mut host = MemoryHost::new();
    let container = host.create_container();
    let root = Root::mount(host, container, runtime.scheduler()).expect("mount");

    let counter = FunctionComponent::new("Counter", |_: &Props| -> RenderResult {
        let (count, set_count) = use_state(0)?;
        Ok(Element::host("button")
            .on("click", move |_| set_count.set(count + 1))
            .child(count)
            .into())
    });
    root.render(Content::from(Element::component(&counter)))
        .expect("render");
    runtime.run_until_idle();

    let button = root.with_host(|host| host.find_by_tag(container, "button")[0]);
    root.with_host(|host| host.dispatch_event(button, "click"));
    runtime.run_until_idle();
    assert_eq!(
        root.with_host(|host| host.inner_html(container)),
        "<button>1</button>"
    );
}
