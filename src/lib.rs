//! A cooperative command/subsystem scheduler for fixed-period robot control
//! loops.
//!
//! Hardware capabilities are modeled as [`Subsystem`](subsystem::Subsystem)s,
//! behaviors as [`Command`]s that declare which subsystems they need, and a
//! [`Scheduler`] arbitrates exclusive subsystem ownership while advancing
//! every running command once per tick. A [`RobotContext`] ties the pieces
//! together behind a single `periodic()` entry point driven by an external
//! fixed-period loop.

use core::{cell::RefCell, fmt, hash::Hash, ops::Deref};
use std::rc::Rc;

use command::Command;
use subsystem::Subsystem;

pub mod command;
pub mod event;
pub mod robot;
pub mod scheduler;
pub mod subsystem;

pub use robot::RobotContext;
pub use scheduler::{Scheduler, SchedulerError};

/// Errors produced inside command bodies. Commands are application code, so
/// the scheduler does not constrain their error type.
pub type BoxError = Box<dyn std::error::Error>;

/// Result of a command lifecycle callback.
pub type CommandResult<T = ()> = Result<T, BoxError>;

/// A shared handle to a subsystem. Equality and hashing are pointer identity:
/// two handles are the same subsystem only if they share the same allocation.
#[derive(Clone)]
pub struct SubsystemRef(pub Rc<RefCell<dyn Subsystem>>);

impl SubsystemRef {
    pub fn name(&self) -> String {
        self.0.borrow().name().to_owned()
    }
}

impl PartialEq for SubsystemRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for SubsystemRef {}

impl Hash for SubsystemRef {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        // Hash the data pointer only, to stay consistent with `Rc::ptr_eq`,
        // which ignores vtable metadata.
        (Rc::as_ptr(&self.0) as *const ()).hash(state);
    }
}

impl fmt::Debug for SubsystemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SubsystemRef").field(&self.name()).finish()
    }
}

impl From<Rc<RefCell<dyn Subsystem>>> for SubsystemRef {
    fn from(subsystem: Rc<RefCell<dyn Subsystem>>) -> Self {
        Self(subsystem)
    }
}

impl<T: Subsystem + 'static> From<T> for SubsystemRef {
    fn from(subsystem: T) -> Self {
        Self(Rc::new(RefCell::new(subsystem)))
    }
}

impl<T: Subsystem + 'static> From<Rc<RefCell<T>>> for SubsystemRef {
    fn from(subsystem: Rc<RefCell<T>>) -> Self {
        Self(subsystem)
    }
}

impl Deref for SubsystemRef {
    type Target = Rc<RefCell<dyn Subsystem>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A shared handle to a command, with the same pointer-identity semantics as
/// [`SubsystemRef`].
#[derive(Clone)]
pub struct CommandRef(pub Rc<RefCell<dyn Command>>);

impl CommandRef {
    pub fn name(&self) -> String {
        self.0.borrow().name().to_owned()
    }
}

impl PartialEq for CommandRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for CommandRef {}

impl Hash for CommandRef {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        // Hash the data pointer only, to stay consistent with `Rc::ptr_eq`,
        // which ignores vtable metadata.
        (Rc::as_ptr(&self.0) as *const ()).hash(state);
    }
}

impl fmt::Debug for CommandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandRef").field(&self.name()).finish()
    }
}

impl From<Rc<RefCell<dyn Command>>> for CommandRef {
    fn from(command: Rc<RefCell<dyn Command>>) -> Self {
        Self(command)
    }
}

impl<T: Command + 'static> From<T> for CommandRef {
    fn from(command: T) -> Self {
        Self(Rc::new(RefCell::new(command)))
    }
}

impl<T: Command + 'static> From<Rc<RefCell<T>>> for CommandRef {
    fn from(command: Rc<RefCell<T>>) -> Self {
        Self(command)
    }
}

impl Deref for CommandRef {
    type Target = Rc<RefCell<dyn Command>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
