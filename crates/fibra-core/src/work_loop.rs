//! The render phase as a flat loop over one "next unit of work" pointer.
//!
//! Each unit runs Begin on a node; when Begin yields no child the loop
//! completes that node and walks up and across until it finds a sibling to
//! begin next. Because the state between units is only that pointer, the
//! loop can stop after any unit and resume later.

use std::cell::RefCell;
use std::rc::Weak;

use crate::begin_work::begin_work;
use crate::complete_work::complete_work;
use crate::error::RenderError;
use crate::host::Host;
use crate::work_node::{WorkArena, WorkNodeId};

/// Receives state updates raised by hooks on a work node.
pub(crate) trait UpdateScheduler {
    fn schedule_update_on_node(&self, node: WorkNodeId);
}

pub(crate) struct WorkLoop<'a, H: Host> {
    pub(crate) arena: &'a RefCell<WorkArena>,
    pub(crate) host: &'a RefCell<H>,
    pub(crate) updater: &'a Weak<dyn UpdateScheduler>,
}

impl<H: Host> WorkLoop<'_, H> {
    /// Runs units until the tree is done or `should_yield` says stop. Returns
    /// the next unit when interrupted.
    pub(crate) fn run(
        &self,
        mut next: Option<WorkNodeId>,
        mut should_yield: impl FnMut() -> bool,
    ) -> Result<Option<WorkNodeId>, RenderError> {
        while let Some(unit) = next {
            if should_yield() {
                log::trace!("yielding before work node {unit}");
                return Ok(Some(unit));
            }
            next = self.perform_unit_of_work(unit)?;
        }
        Ok(None)
    }

    pub(crate) fn perform_unit_of_work(
        &self,
        unit: WorkNodeId,
    ) -> Result<Option<WorkNodeId>, RenderError> {
        let current = self.arena.borrow()[unit].alternate;
        log::trace!("begin {unit}");
        let next = begin_work(self.arena, self.updater, current, unit)?;
        {
            let mut arena = self.arena.borrow_mut();
            let node = &mut arena[unit];
            node.memoized_props = node.pending_props.clone();
        }
        match next {
            Some(child) => Ok(Some(child)),
            None => self.complete_unit_of_work(unit),
        }
    }

    fn complete_unit_of_work(&self, unit: WorkNodeId) -> Result<Option<WorkNodeId>, RenderError> {
        let mut arena = self.arena.borrow_mut();
        let mut host = self.host.borrow_mut();
        let mut completed = unit;
        loop {
            log::trace!("complete {completed}");
            complete_work(&mut arena, &mut *host, completed)?;
            if let Some(sibling) = arena[completed].sibling {
                return Ok(Some(sibling));
            }
            match arena[completed].return_ {
                Some(parent) => completed = parent,
                None => return Ok(None),
            }
        }
    }
}
