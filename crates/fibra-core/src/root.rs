//! Root record and the render task that drives a root through render and
//! commit.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;

use crate::commit_work::CommitContext;
use crate::element::Content;
use crate::error::{RenderError, RootError};
use crate::host::{Host, HostNodeId};
use crate::scheduler::{Scheduler, TaskCallback, TaskHandle};
use crate::work_loop::{UpdateScheduler, WorkLoop};
use crate::work_node::{
    create_work_in_progress, create_work_node, MemoizedState, NodeProps, StateNode, WorkArena,
    WorkNodeId, WorkTag,
};

/// Updates scheduled by components while they render, per render, before the
/// render is abandoned.
const RENDER_PHASE_UPDATE_LIMIT: u32 = 50;

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    struct ExecutionContext: u8 {
        const RENDER = 1 << 0;
        const COMMIT = 1 << 1;
    }
}

/// A mounted tree: owns the host, the work-node buffers, and the render task.
pub struct Root<H: Host> {
    inner: Rc<RootInner<H>>,
}

impl<H: Host> Clone for Root<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct RootInner<H: Host> {
    this: Weak<RootInner<H>>,
    updater: Weak<dyn UpdateScheduler>,
    host: RefCell<H>,
    container: HostNodeId,
    scheduler: Scheduler,
    arena: RefCell<WorkArena>,
    current: Cell<WorkNodeId>,
    finished_work: Cell<Option<WorkNodeId>>,
    wip_root: Cell<Option<WorkNodeId>>,
    work_in_progress: Cell<Option<WorkNodeId>>,
    callback_task: RefCell<Option<TaskHandle>>,
    needs_restart: Cell<bool>,
    render_phase_updates: Cell<u32>,
    execution_context: Cell<ExecutionContext>,
    last_error: RefCell<Option<RenderError>>,
    unmounted: Cell<bool>,
    commit_count: Cell<u64>,
}

impl<H: Host> Root<H> {
    /// Creates a root rendering into `container`, which must be a node the
    /// host accepts as a container.
    pub fn mount(host: H, container: HostNodeId, scheduler: Scheduler) -> Result<Self, RootError> {
        if !host.is_container(container) {
            return Err(RootError::UnsupportedContainer { id: container });
        }

        let mut arena = WorkArena::new();
        let current = create_work_node(&mut arena, WorkTag::Root, NodeProps::Empty, None);
        arena[current].state_node = StateNode::Root;
        arena[current].memoized_state = MemoizedState::Root(Rc::new(Content::Empty));

        let inner = Rc::new_cyclic(|this: &Weak<RootInner<H>>| {
            let updater: Weak<dyn UpdateScheduler> = this.clone();
            RootInner {
                this: this.clone(),
                updater,
                host: RefCell::new(host),
                container,
                scheduler,
                arena: RefCell::new(arena),
                current: Cell::new(current),
                finished_work: Cell::new(None),
                wip_root: Cell::new(None),
                work_in_progress: Cell::new(None),
                callback_task: RefCell::new(None),
                needs_restart: Cell::new(false),
                render_phase_updates: Cell::new(0),
                execution_context: Cell::new(ExecutionContext::empty()),
                last_error: RefCell::new(None),
                unmounted: Cell::new(false),
                commit_count: Cell::new(0),
            }
        });
        log::debug!("mounted root into container {container}");
        Ok(Self { inner })
    }

    /// Makes `content` what the root should show and schedules a render. The
    /// host tree changes once the scheduler has run that render.
    pub fn render(&self, content: impl Into<Content>) -> Result<(), RootError> {
        if self.inner.unmounted.get() {
            return Err(RootError::Unmounted);
        }
        self.inner.update_container(Rc::new(content.into()));
        Ok(())
    }

    /// Schedules removal of everything the root rendered. Later calls to
    /// [`Root::render`] fail.
    pub fn unmount(&self) -> Result<(), RootError> {
        if self.inner.unmounted.replace(true) {
            return Err(RootError::Unmounted);
        }
        self.inner.update_container(Rc::new(Content::Empty));
        Ok(())
    }

    pub fn container(&self) -> HostNodeId {
        self.inner.container
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.inner.host.borrow())
    }

    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.inner.host.borrow_mut())
    }

    /// The error that aborted the most recent failed render or commit.
    pub fn take_render_error(&self) -> Option<RenderError> {
        self.inner.last_error.borrow_mut().take()
    }

    /// `true` while a render is scheduled or partially done.
    pub fn has_pending_work(&self) -> bool {
        self.inner.has_scheduled_task() || self.inner.wip_root.get().is_some()
    }

    /// `true` between the first and last slice of a render.
    pub fn is_rendering(&self) -> bool {
        self.inner.wip_root.get().is_some()
    }

    pub fn commit_count(&self) -> u64 {
        self.inner.commit_count.get()
    }

    /// Work nodes currently held by both buffers.
    pub fn live_work_nodes(&self) -> usize {
        self.inner.arena.borrow().len()
    }
}

impl<H: Host> fmt::Debug for Root<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("container", &self.inner.container)
            .field("current", &self.inner.current.get())
            .field("rendering", &self.inner.wip_root.get().is_some())
            .field("commits", &self.inner.commit_count.get())
            .finish()
    }
}

impl<H: Host> UpdateScheduler for RootInner<H> {
    fn schedule_update_on_node(&self, node: WorkNodeId) {
        let mounted = match self.arena.try_borrow() {
            Ok(arena) => reaches_root(&arena, node),
            Err(_) => true,
        };
        if !mounted {
            log::warn!("state update on unmounted work node {node}; ignoring");
            return;
        }

        if self.wip_root.get().is_some() {
            self.needs_restart.set(true);
            if self.execution_context.get().contains(ExecutionContext::RENDER) {
                self.render_phase_updates
                    .set(self.render_phase_updates.get() + 1);
            }
        }
        self.ensure_root_is_scheduled();
    }
}

fn reaches_root(arena: &WorkArena, node: WorkNodeId) -> bool {
    let mut cursor = Some(node);
    while let Some(id) = cursor {
        match arena.get(id) {
            Some(node) if node.tag == WorkTag::Root => return true,
            Some(node) => cursor = node.return_,
            None => return false,
        }
    }
    false
}

fn perform_work_on_root<H: Host>(
    root: Weak<RootInner<H>>,
    did_timeout: bool,
) -> Option<TaskCallback> {
    let inner = root.upgrade()?;
    if inner.perform_concurrent_work(did_timeout) {
        Some(TaskCallback::new(move |did_timeout| {
            perform_work_on_root(root, did_timeout)
        }))
    } else {
        None
    }
}

impl<H: Host> RootInner<H> {
    fn update_container(&self, content: Rc<Content>) {
        let current = self.current.get();
        self.arena.borrow_mut()[current].memoized_state = MemoizedState::Root(content);
        self.schedule_update_on_node(current);
    }

    fn has_scheduled_task(&self) -> bool {
        self.callback_task
            .borrow()
            .as_ref()
            .is_some_and(|task| !task.is_cancelled())
    }

    /// At most one render task per root; it runs at the priority current when
    /// the first update asked for it.
    fn ensure_root_is_scheduled(&self) {
        if self.has_scheduled_task() {
            return;
        }
        let priority = self.scheduler.current_priority_level();
        let this = self.this.clone();
        let task = self
            .scheduler
            .schedule_callback(priority, move |did_timeout| {
                perform_work_on_root(this, did_timeout)
            });
        log::debug!("scheduled render task {} at {priority:?}", task.id());
        *self.callback_task.borrow_mut() = Some(task);
    }

    fn enter<R>(&self, context: ExecutionContext, f: impl FnOnce() -> R) -> R {
        let previous = self.execution_context.get();
        self.execution_context.set(previous | context);
        let result = f();
        self.execution_context.set(previous);
        result
    }

    fn prepare_fresh_stack(&self) {
        let mut arena = self.arena.borrow_mut();
        let current = self.current.get();
        if self.wip_root.get().is_some() {
            log::debug!("discarding in-progress render");
            arena.retain_reachable(current);
        }
        let wip = create_work_in_progress(&mut arena, current, NodeProps::Empty);
        self.wip_root.set(Some(wip));
        self.work_in_progress.set(Some(wip));
    }

    /// One slice of the render task. Returns `true` when the task must run
    /// again: the render was interrupted, or it must restart.
    fn perform_concurrent_work(&self, did_timeout: bool) -> bool {
        if self.needs_restart.replace(false) || self.wip_root.get().is_none() {
            self.prepare_fresh_stack();
        }

        let result = self.enter(ExecutionContext::RENDER, || {
            let work = WorkLoop {
                arena: &self.arena,
                host: &self.host,
                updater: &self.updater,
            };
            let next = self.work_in_progress.get();
            if did_timeout {
                // Overdue: finish the whole tree without yielding.
                work.run(next, || false)
            } else {
                work.run(next, || self.scheduler.should_yield_to_host())
            }
        });

        match result {
            Ok(next) => self.work_in_progress.set(next),
            Err(err) => {
                self.abort_render(err);
                return false;
            }
        }
        if self.render_phase_updates.get() > RENDER_PHASE_UPDATE_LIMIT {
            self.abort_render(RenderError::TooManyRenderPhaseUpdates {
                limit: RENDER_PHASE_UPDATE_LIMIT,
            });
            return false;
        }
        if self.work_in_progress.get().is_some() {
            return true;
        }
        if self.needs_restart.get() {
            log::debug!("update arrived during render; restarting");
            return true;
        }

        self.finished_work.set(self.wip_root.take());
        self.commit_root();
        false
    }

    fn abort_render(&self, err: RenderError) {
        log::error!("render aborted, keeping the committed tree: {err}");
        self.wip_root.set(None);
        self.work_in_progress.set(None);
        self.needs_restart.set(false);
        self.render_phase_updates.set(0);
        self.arena.borrow_mut().retain_reachable(self.current.get());
        self.callback_task.borrow_mut().take();
        *self.last_error.borrow_mut() = Some(err);
    }

    fn commit_root(&self) {
        let Some(finished) = self.finished_work.take() else {
            return;
        };
        let result = self.enter(ExecutionContext::COMMIT, || {
            let mut arena = self.arena.borrow_mut();
            let mut host = self.host.borrow_mut();
            CommitContext {
                arena: &mut *arena,
                host: &mut *host,
                container: self.container,
            }
            .commit_mutation_effects(finished)
        });
        self.render_phase_updates.set(0);
        self.callback_task.borrow_mut().take();

        match result {
            Ok(unmounted) => {
                self.current.set(finished);
                let released = self.arena.borrow_mut().retain_reachable(finished);
                let commits = self.commit_count.get() + 1;
                self.commit_count.set(commits);
                log::debug!("commit #{commits} done, released {released} work nodes");
                for instance in unmounted {
                    instance.borrow_mut().will_unmount();
                }
            }
            Err(err) => {
                log::error!("commit failed, host tree may be partially updated: {err}");
                self.arena.borrow_mut().retain_reachable(self.current.get());
                *self.last_error.borrow_mut() = Some(err);
            }
        }
    }
}
