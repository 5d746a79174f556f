use core::{cell::RefCell, fmt::Debug};
use std::rc::Rc;

use crate::{
    command::FunctionalCommand, run, run_end, run_once, start_end, CommandResult, SubsystemRef,
};

/// A collection of robot parts and other hardware that act together as a
/// whole, owned by at most one command at a time.
///
/// A subsystem is a capability token: it carries no scheduling logic of its
/// own. Exclusive access is arbitrated by the
/// [`Scheduler`](crate::Scheduler), which also calls [`periodic`] once per
/// tick for housekeeping that must happen regardless of which command is
/// running.
///
/// [`periodic`]: Subsystem::periodic
pub trait Subsystem: Debug {
    fn name(&self) -> &str;

    /// Called once per scheduler tick, before any command is stepped.
    fn periodic(&mut self) {}
}

/// Shorthand constructors for commands that require a single subsystem.
pub trait SubsystemRefExt {
    fn run_once(&self, action: impl FnMut() -> CommandResult + 'static) -> FunctionalCommand;
    fn run(&self, action: impl FnMut() -> CommandResult + 'static) -> FunctionalCommand;
    fn start_end(
        &self,
        start: impl FnMut() -> CommandResult + 'static,
        end: impl FnMut() -> CommandResult + 'static,
    ) -> FunctionalCommand;
    fn run_end(
        &self,
        run: impl FnMut() -> CommandResult + 'static,
        end: impl FnMut() -> CommandResult + 'static,
    ) -> FunctionalCommand;
}

impl<T> SubsystemRefExt for Rc<RefCell<T>>
where
    T: Subsystem + 'static,
{
    fn run_once(&self, mut action: impl FnMut() -> CommandResult + 'static) -> FunctionalCommand {
        run_once!({ action() }, SubsystemRef(self.clone()))
    }
    fn run(&self, mut action: impl FnMut() -> CommandResult + 'static) -> FunctionalCommand {
        run!({ action() }, SubsystemRef(self.clone()))
    }
    fn start_end(
        &self,
        mut start: impl FnMut() -> CommandResult + 'static,
        mut end: impl FnMut() -> CommandResult + 'static,
    ) -> FunctionalCommand {
        start_end!({ start() }, { end() }, SubsystemRef(self.clone()))
    }
    fn run_end(
        &self,
        mut run: impl FnMut() -> CommandResult + 'static,
        mut end: impl FnMut() -> CommandResult + 'static,
    ) -> FunctionalCommand {
        run_end!({ run() }, { end() }, SubsystemRef(self.clone()))
    }
}

impl SubsystemRefExt for SubsystemRef {
    fn run_once(&self, mut action: impl FnMut() -> CommandResult + 'static) -> FunctionalCommand {
        run_once!({ action() }, self.clone())
    }
    fn run(&self, mut action: impl FnMut() -> CommandResult + 'static) -> FunctionalCommand {
        run!({ action() }, self.clone())
    }
    fn start_end(
        &self,
        mut start: impl FnMut() -> CommandResult + 'static,
        mut end: impl FnMut() -> CommandResult + 'static,
    ) -> FunctionalCommand {
        start_end!({ start() }, { end() }, self.clone())
    }
    fn run_end(
        &self,
        mut run: impl FnMut() -> CommandResult + 'static,
        mut end: impl FnMut() -> CommandResult + 'static,
    ) -> FunctionalCommand {
        run_end!({ run() }, { end() }, self.clone())
    }
}
