//! Components for the Fibra demo app.

use std::rc::Rc;

use fibra_core::{
    use_reducer, use_state, Content, Element, FunctionComponent, MemoryHost, Props,
    RenderResult, Root,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Todo {
    pub id: u32,
    pub title: Rc<str>,
}

#[derive(Debug)]
pub enum TodoAction {
    Add(Rc<str>),
    Remove(u32),
    Reverse,
}

#[allow(clippy::ptr_arg)]
pub fn reduce_todos(todos: &Vec<Todo>, action: TodoAction) -> Vec<Todo> {
    let mut next = todos.clone();
    match action {
        TodoAction::Add(title) => {
            let id = todos.iter().map(|todo| todo.id).max().map_or(1, |max| max + 1);
            next.push(Todo { id, title });
        }
        TodoAction::Remove(id) => next.retain(|todo| todo.id != id),
        TodoAction::Reverse => next.reverse(),
    }
    next
}

const SUGGESTIONS: [&str; 4] = ["write docs", "fix bug", "review", "ship"];

pub fn counter() -> FunctionComponent {
    FunctionComponent::new("Counter", |props: &Props| -> RenderResult {
        let step = props.number("step").unwrap_or(1.0) as i64;
        let (count, set_count) = use_state(0_i64)?;
        Ok(Element::host("div")
            .attr("class", "counter")
            .child(Element::host("span").child(format!("Clicked {count} times")))
            .child(
                Element::host("button")
                    .attr("id", "increment")
                    .on("click", move |_| set_count.update(move |count| count + step))
                    .child("+"),
            )
            .into())
    })
}

pub fn todo_list() -> FunctionComponent {
    FunctionComponent::new("TodoList", |_: &Props| -> RenderResult {
        let (todos, dispatch) = use_reducer(reduce_todos, Vec::new())?;

        let add = {
            let dispatch = dispatch.clone();
            let title = SUGGESTIONS[todos.len() % SUGGESTIONS.len()];
            move |_: &fibra_core::Event| dispatch.dispatch(TodoAction::Add(title.into()))
        };
        let reverse = {
            let dispatch = dispatch.clone();
            move |_: &fibra_core::Event| dispatch.dispatch(TodoAction::Reverse)
        };

        let items: Content = todos
            .iter()
            .map(|todo| {
                let dispatch = dispatch.clone();
                let id = todo.id;
                Element::host("li")
                    .key(id.to_string())
                    .child(Element::host("span").child(Rc::clone(&todo.title)))
                    .child(
                        Element::host("button")
                            .attr("id", format!("remove-{id}"))
                            .on("click", move |_| dispatch.dispatch(TodoAction::Remove(id)))
                            .child("x"),
                    )
            })
            .collect();

        Ok(Element::host("section")
            .child(Element::host("button").attr("id", "add").on("click", add).child("add"))
            .child(
                Element::host("button")
                    .attr("id", "reverse")
                    .on("click", reverse)
                    .child("reverse"),
            )
            .child(Element::host("ul").children(items))
            .into())
    })
}

/// The whole demo tree. Build it once; component identity is per call.
pub fn app() -> FunctionComponent {
    let counter = counter();
    let todo_list = todo_list();
    FunctionComponent::new("App", move |_: &Props| -> RenderResult {
        Ok(Element::host("main")
            .child(Element::host("h1").child("Fibra"))
            .child(Element::component(&counter).attr("step", 1))
            .child(Element::component(&todo_list))
            .into())
    })
}

/// Fires a click on the element with the given `id`. Returns `false` when no
/// such element is mounted.
pub fn click(root: &Root<MemoryHost>, id: &str) -> bool {
    root.with_host(|host| match host.find_by_id(root.container(), id) {
        Some(node) => host.dispatch_event(node, "click") > 0,
        None => false,
    })
}

pub fn html(root: &Root<MemoryHost>) -> String {
    root.with_host(|host| host.inner_html(root.container()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fibra_core::testing::TestScheduler;
    use fibra_core::HostOp;

    fn mount() -> (TestScheduler, Root<MemoryHost>) {
        let sched = TestScheduler::new();
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let root = Root::mount(host, container, sched.scheduler.clone()).expect("mount");
        root.render(Element::component(&app())).expect("render");
        sched.flush();
        (sched, root)
    }

    #[test]
    fn reducer_assigns_increasing_ids() {
        let todos = reduce_todos(&Vec::new(), TodoAction::Add("a".into()));
        let todos = reduce_todos(&todos, TodoAction::Add("b".into()));
        let todos = reduce_todos(&todos, TodoAction::Remove(1));
        let todos = reduce_todos(&todos, TodoAction::Add("c".into()));
        let ids: Vec<_> = todos.iter().map(|todo| todo.id).collect();
        assert_eq!(ids, [2, 3]);
    }

    #[test]
    fn counter_button_increments() {
        let (sched, root) = mount();
        assert!(click(&root, "increment"));
        sched.flush();
        assert!(click(&root, "increment"));
        sched.flush();
        assert!(html(&root).contains("<span>Clicked 2 times</span>"));
    }

    #[test]
    fn clicks_before_a_render_all_count() {
        let (sched, root) = mount();
        for _ in 0..3 {
            assert!(click(&root, "increment"));
        }
        sched.flush();
        assert!(html(&root).contains("<span>Clicked 3 times</span>"));
    }

    #[test]
    fn reversing_moves_items_without_recreating_them() {
        let (sched, root) = mount();
        for _ in 0..3 {
            click(&root, "add");
            sched.flush();
        }
        root.with_host_mut(MemoryHost::clear_ops);

        click(&root, "reverse");
        sched.flush();
        let ops = root.with_host_mut(MemoryHost::take_ops);
        assert!(!ops
            .iter()
            .any(|op| matches!(op, HostOp::CreateElement { tag, .. } if &**tag == "li")));
        assert!(html(&root).contains("<li><span>review</span>"));
    }

    #[test]
    fn remove_button_deletes_its_item() {
        let (sched, root) = mount();
        click(&root, "add");
        sched.flush();
        click(&root, "add");
        sched.flush();
        assert!(click(&root, "remove-1"));
        sched.flush();
        let html = html(&root);
        assert!(!html.contains("write docs"));
        assert!(html.contains("fix bug"));
        assert!(!click(&root, "remove-1"));
    }
}
