//! Component-local state.
//!
//! While Begin invokes a function component, a [`HookContext`] for that work
//! node is installed in a thread-local slot and removed again as soon as the
//! component returns, whether it succeeded or not. Hooks called outside that
//! window fail with [`HookError::InvalidHookCall`].
//!
//! Each hook call claims the next record in call order. On the first render the
//! record and its state storage are created; on later renders the record at the
//! same position of the previous render's list is paired up and its storage
//! shared, so the state survives across renders without being reallocated.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{HookError, RenderError};
use crate::work_loop::UpdateScheduler;
use crate::work_node::WorkNodeId;

/// One hook slot in a work node's hook list.
#[derive(Clone)]
pub struct HookRecord {
    state: Rc<dyn Any>,
}

impl HookRecord {
    pub(crate) fn shares_storage(&self, other: &HookRecord) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for HookRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HookRecord({:p})", Rc::as_ptr(&self.state) as *const ())
    }
}

struct HookContext {
    node: WorkNodeId,
    updater: Weak<dyn UpdateScheduler>,
    /// Hooks of the previous render; `None` on the first render.
    previous: Option<Vec<HookRecord>>,
    hooks: Vec<HookRecord>,
}

thread_local! {
    static CURRENTLY_RENDERING: RefCell<Option<HookContext>> = const { RefCell::new(None) };
}

/// Restores the enclosing context (normally none) on drop.
#[must_use = "HookScopeGuard clears the rendering context on drop"]
struct HookScopeGuard {
    outer: Option<HookContext>,
}

impl HookScopeGuard {
    fn enter(context: HookContext) -> Self {
        let outer = CURRENTLY_RENDERING.with(|slot| slot.borrow_mut().replace(context));
        Self { outer }
    }

    fn finish(self) -> Option<HookContext> {
        CURRENTLY_RENDERING.with(|slot| slot.borrow_mut().take())
    }
}

impl Drop for HookScopeGuard {
    fn drop(&mut self) {
        let outer = self.outer.take();
        CURRENTLY_RENDERING.with(|slot| *slot.borrow_mut() = outer);
    }
}

/// Runs `render` as the body of the function component at `node`. Returns its
/// output together with the hook list it built.
pub(crate) fn render_with_hooks<R>(
    node: WorkNodeId,
    previous: Option<Vec<HookRecord>>,
    updater: Weak<dyn UpdateScheduler>,
    render: impl FnOnce() -> Result<R, RenderError>,
) -> Result<(R, Vec<HookRecord>), RenderError> {
    let guard = HookScopeGuard::enter(HookContext {
        node,
        updater,
        previous,
        hooks: Vec::new(),
    });
    let output = render();
    let context = guard.finish().ok_or(HookError::InvalidHookCall)?;
    let output = output?;

    if let Some(previous) = &context.previous {
        if context.hooks.len() < previous.len() {
            return Err(HookError::RenderedFewerHooks {
                previous: previous.len(),
                rendered: context.hooks.len(),
            }
            .into());
        }
    }
    Ok((output, context.hooks))
}

/// `true` while a function component body is running on this thread.
pub fn is_rendering() -> bool {
    CURRENTLY_RENDERING.with(|slot| slot.borrow().is_some())
}

enum HookCursor {
    Mount {
        node: WorkNodeId,
        updater: Weak<dyn UpdateScheduler>,
    },
    Update {
        index: usize,
        record: HookRecord,
    },
}

fn next_hook() -> Result<HookCursor, HookError> {
    CURRENTLY_RENDERING.with(|slot| {
        let slot = slot.borrow();
        let context = slot.as_ref().ok_or(HookError::InvalidHookCall)?;
        let index = context.hooks.len();
        match &context.previous {
            None => Ok(HookCursor::Mount {
                node: context.node,
                updater: context.updater.clone(),
            }),
            Some(previous) => previous
                .get(index)
                .cloned()
                .map(|record| HookCursor::Update { index, record })
                .ok_or(HookError::RenderedMoreHooks {
                    previous: previous.len(),
                }),
        }
    })
}

fn push_hook(record: HookRecord) -> Result<(), HookError> {
    CURRENTLY_RENDERING.with(|slot| {
        let mut slot = slot.borrow_mut();
        let context = slot.as_mut().ok_or(HookError::InvalidHookCall)?;
        context.hooks.push(record);
        Ok(())
    })
}

type Reducer<S, A> = Rc<dyn Fn(&S, A) -> S>;

/// Action sent through a [`use_state`] handle.
pub enum SetState<S> {
    /// Replace the state.
    Value(S),
    /// Compute the next state from the latest one, including updates
    /// dispatched since the component last rendered.
    Update(Box<dyn FnOnce(&S) -> S>),
}

impl<S: fmt::Debug> fmt::Debug for SetState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetState::Value(value) => f.debug_tuple("Value").field(value).finish(),
            SetState::Update(_) => f.write_str("Update(..)"),
        }
    }
}

fn basic_state_reducer<S>(state: &S, action: SetState<S>) -> S {
    match action {
        SetState::Value(value) => value,
        SetState::Update(update) => update(state),
    }
}

struct ReducerHook<S, A> {
    memoized_state: RefCell<S>,
    /// Refreshed every render so dispatch always uses the latest reducer.
    reducer: RefCell<Reducer<S, A>>,
    node: WorkNodeId,
    updater: Weak<dyn UpdateScheduler>,
}

trait DispatchTarget<A> {
    fn dispatch(&self, action: A);
}

impl<S: Clone + 'static, A: 'static> DispatchTarget<A> for ReducerHook<S, A> {
    fn dispatch(&self, action: A) {
        let reducer = self.reducer.borrow().clone();
        let state = self.memoized_state.borrow().clone();
        *self.memoized_state.borrow_mut() = reducer(&state, action);

        match self.updater.upgrade() {
            Some(updater) => updater.schedule_update_on_node(self.node),
            None => log::warn!("state update after the root was dropped; ignoring"),
        }
    }
}

/// Sends actions to the hook that created it. Stable across renders: every
/// render of the same hook hands out a handle to the same storage.
pub struct Dispatch<A> {
    target: Rc<dyn DispatchTarget<A>>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            target: Rc::clone(&self.target),
        }
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dispatch({:p})", Rc::as_ptr(&self.target) as *const ())
    }
}

impl<A> Dispatch<A> {
    /// Applies the reducer to the hook state now and schedules a render of the
    /// owning root. The new state shows up on screen once that render commits.
    pub fn dispatch(&self, action: A) {
        self.target.dispatch(action);
    }

    /// `true` if both handles update the same hook.
    pub fn same_hook(&self, other: &Dispatch<A>) -> bool {
        Rc::ptr_eq(&self.target, &other.target)
    }
}

impl<S: 'static> Dispatch<SetState<S>> {
    pub fn set(&self, value: S) {
        self.dispatch(SetState::Value(value));
    }

    /// Schedules `update` against the latest state. Several updates dispatched
    /// before the next render compose in order.
    pub fn update(&self, update: impl FnOnce(&S) -> S + 'static) {
        self.dispatch(SetState::Update(Box::new(update)));
    }
}

fn use_reducer_impl<S, A>(
    reducer: Reducer<S, A>,
    init: impl FnOnce() -> S,
) -> Result<(S, Dispatch<A>), HookError>
where
    S: Clone + 'static,
    A: 'static,
{
    let hook: Rc<ReducerHook<S, A>> = match next_hook()? {
        HookCursor::Mount { node, updater } => Rc::new(ReducerHook {
            memoized_state: RefCell::new(init()),
            reducer: RefCell::new(reducer),
            node,
            updater,
        }),
        HookCursor::Update { index, record } => {
            let hook = record
                .state
                .downcast::<ReducerHook<S, A>>()
                .map_err(|_| HookError::StateTypeMismatch { index })?;
            *hook.reducer.borrow_mut() = reducer;
            hook
        }
    };

    push_hook(HookRecord {
        state: Rc::clone(&hook) as Rc<dyn Any>,
    })?;
    let state = hook.memoized_state.borrow().clone();
    Ok((state, Dispatch { target: hook }))
}

/// State driven by `reducer`, starting at `initial`.
pub fn use_reducer<S, A>(
    reducer: impl Fn(&S, A) -> S + 'static,
    initial: S,
) -> Result<(S, Dispatch<A>), HookError>
where
    S: Clone + 'static,
    A: 'static,
{
    let reducer: Reducer<S, A> = Rc::new(reducer);
    use_reducer_impl(reducer, || initial)
}

/// Like [`use_reducer`], computing the initial state as `init(arg)` on the
/// first render only.
pub fn use_reducer_with_init<S, A, I>(
    reducer: impl Fn(&S, A) -> S + 'static,
    arg: I,
    init: impl FnOnce(I) -> S,
) -> Result<(S, Dispatch<A>), HookError>
where
    S: Clone + 'static,
    A: 'static,
{
    let reducer: Reducer<S, A> = Rc::new(reducer);
    use_reducer_impl(reducer, || init(arg))
}

/// State set through [`Dispatch::set`] or [`Dispatch::update`].
pub fn use_state<S>(initial: S) -> Result<(S, Dispatch<SetState<S>>), HookError>
where
    S: Clone + 'static,
{
    let reducer: Reducer<S, SetState<S>> = Rc::new(basic_state_reducer::<S>);
    use_reducer_impl(reducer, || initial)
}

/// Like [`use_state`], with a lazily computed initial value.
pub fn use_state_with<S>(
    init: impl FnOnce() -> S,
) -> Result<(S, Dispatch<SetState<S>>), HookError>
where
    S: Clone + 'static,
{
    let reducer: Reducer<S, SetState<S>> = Rc::new(basic_state_reducer::<S>);
    use_reducer_impl(reducer, init)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopUpdater;

    impl UpdateScheduler for NoopUpdater {
        fn schedule_update_on_node(&self, _node: WorkNodeId) {}
    }

    fn node_id() -> WorkNodeId {
        let mut arena = crate::work_node::WorkArena::new();
        crate::work_node::create_work_node(
            &mut arena,
            crate::work_node::WorkTag::FunctionComponent,
            crate::work_node::NodeProps::Empty,
            None,
        )
    }

    #[test]
    fn hook_outside_component_is_invalid() {
        assert!(!is_rendering());
        assert_eq!(use_state(0).err(), Some(HookError::InvalidHookCall));
    }

    #[test]
    fn context_is_cleared_after_a_failed_render() {
        let updater: Rc<dyn UpdateScheduler> = Rc::new(NoopUpdater);
        let result: Result<((), _), _> =
            render_with_hooks(node_id(), None, Rc::downgrade(&updater), || {
                assert!(is_rendering());
                Err(RenderError::component("Broken", "boom"))
            });
        assert!(result.is_err());
        assert!(!is_rendering());
    }

    #[test]
    fn update_render_shares_storage_with_mount_render() {
        let updater: Rc<dyn UpdateScheduler> = Rc::new(NoopUpdater);
        let node = node_id();
        let ((first_dispatch, _), mounted) =
            render_with_hooks(node, None, Rc::downgrade(&updater), || {
                let (_, dispatch) = use_state(1)?;
                let (label, _) = use_state_with(|| String::from("a"))?;
                Ok((dispatch, label))
            })
            .unwrap();
        first_dispatch.set(5);

        let ((value, second_dispatch), updated) =
            render_with_hooks(node, Some(mounted.clone()), Rc::downgrade(&updater), || {
                let (value, dispatch) = use_state(1)?;
                use_state_with(|| String::from("ignored"))?;
                Ok((value, dispatch))
            })
            .unwrap();

        assert_eq!(value, 5);
        assert!(first_dispatch.same_hook(&second_dispatch));
        assert!(mounted
            .iter()
            .zip(&updated)
            .all(|(old, new)| old.shares_storage(new)));
    }

    #[test]
    fn changing_hook_count_is_fatal() {
        let updater: Rc<dyn UpdateScheduler> = Rc::new(NoopUpdater);
        let node = node_id();
        let (_, mounted) = render_with_hooks(node, None, Rc::downgrade(&updater), || {
            use_state(0)?;
            Ok(())
        })
        .unwrap();

        let more = render_with_hooks(node, Some(mounted.clone()), Rc::downgrade(&updater), || {
            use_state(0)?;
            use_state(0)?;
            Ok(())
        });
        assert_eq!(
            more.err(),
            Some(RenderError::Hook(HookError::RenderedMoreHooks { previous: 1 }))
        );

        let fewer = render_with_hooks(node, Some(mounted), Rc::downgrade(&updater), || Ok(()));
        assert_eq!(
            fewer.err(),
            Some(RenderError::Hook(HookError::RenderedFewerHooks {
                previous: 1,
                rendered: 0
            }))
        );
    }

    #[test]
    fn reducer_applies_immediately() {
        let updater: Rc<dyn UpdateScheduler> = Rc::new(NoopUpdater);
        let node = node_id();
        let ((count, dispatch), mounted) =
            render_with_hooks(node, None, Rc::downgrade(&updater), || {
                Ok(use_reducer(|count: &i32, delta: i32| count + delta, 10)?)
            })
            .unwrap();
        assert_eq!(count, 10);
        dispatch.dispatch(3);
        dispatch.dispatch(-1);

        let ((count, _), _) = render_with_hooks(node, Some(mounted), Rc::downgrade(&updater), || {
            Ok(use_reducer(|count: &i32, delta: i32| count + delta, 10)?)
        })
        .unwrap();
        assert_eq!(count, 12);
    }

    #[test]
    fn changing_state_type_is_reported() {
        let updater: Rc<dyn UpdateScheduler> = Rc::new(NoopUpdater);
        let node = node_id();
        let (_, mounted) = render_with_hooks(node, None, Rc::downgrade(&updater), || {
            use_state(0_i32)?;
            Ok(())
        })
        .unwrap();
        let result = render_with_hooks(node, Some(mounted), Rc::downgrade(&updater), || {
            use_state(String::new())?;
            Ok(())
        });
        assert_eq!(
            result.err(),
            Some(RenderError::Hook(HookError::StateTypeMismatch { index: 0 }))
        );
    }
}
