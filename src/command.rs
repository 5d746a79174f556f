use crate::{CommandResult, SubsystemRef};

pub mod builtin;
pub mod group;
pub mod trigger;

/// An action the robot can perform. Runs when submitted to the scheduler,
/// until it is interrupted or it finishes.
///
/// The lifecycle is `initialize` (once, after the scheduler grants ownership
/// of every required subsystem), then `step` once per tick until it returns
/// `Ok(true)`, then `end` exactly once. `end(true)` means the command was
/// preempted or cancelled rather than finishing on its own. Subsystem
/// ownership is released by the scheduler, never by the command itself.
pub trait Command {
    fn name(&self) -> &str {
        "Command"
    }

    /// The subsystems this command needs exclusive ownership of. Fixed at
    /// construction; the scheduler snapshots this set at admission.
    fn get_requirements(&self) -> &[SubsystemRef];

    /// The initial subroutine of a command. Called once when the command is
    /// admitted.
    fn initialize(&mut self) -> CommandResult {
        Ok(())
    }

    /// Advance one tick. Return `Ok(true)` to finish normally this tick,
    /// `Ok(false)` to be stepped again next tick. Must not block.
    fn step(&mut self) -> CommandResult<bool>;

    #[allow(unused_variables)]
    fn end(&mut self, interrupted: bool) -> CommandResult {
        Ok(())
    }

    /// Whether a conflicting submission may preempt this command. Commands
    /// are interruptible unless they say otherwise.
    fn is_interruptible(&self) -> bool {
        true
    }
}

/// A command assembled from closures.
pub struct FunctionalCommand {
    name: String,
    on_init: Box<dyn FnMut() -> CommandResult>,
    on_step: Box<dyn FnMut() -> CommandResult<bool>>,
    on_end: Box<dyn FnMut(bool) -> CommandResult>,
    requirements: Vec<SubsystemRef>,
    interruptible: bool,
}

impl FunctionalCommand {
    pub fn new(
        on_init: impl FnMut() -> CommandResult + 'static,
        on_step: impl FnMut() -> CommandResult<bool> + 'static,
        on_end: impl FnMut(bool) -> CommandResult + 'static,
        requirements: Vec<SubsystemRef>,
    ) -> Self {
        Self {
            name: String::from("FunctionalCommand"),
            on_init: Box::new(on_init),
            on_step: Box::new(on_step),
            on_end: Box::new(on_end),
            requirements,
            interruptible: true,
        }
    }

    /// A command that runs `action` once and finishes on the same tick.
    pub fn instant(
        action: impl FnMut() -> CommandResult + 'static,
        requirements: Vec<SubsystemRef>,
    ) -> Self {
        Self::new(action, || Ok(true), |_| Ok(()), requirements)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn non_interruptible(mut self) -> Self {
        self.interruptible = false;
        self
    }
}

impl Command for FunctionalCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn initialize(&mut self) -> CommandResult {
        (self.on_init)()
    }

    fn step(&mut self) -> CommandResult<bool> {
        (self.on_step)()
    }

    fn end(&mut self, interrupted: bool) -> CommandResult {
        (self.on_end)(interrupted)
    }

    fn is_interruptible(&self) -> bool {
        self.interruptible
    }
}

#[macro_export]
macro_rules! run_once {
    ($on_init:block) => {
        $crate::command::FunctionalCommand::new(move || $on_init, || Ok(true), |_| Ok(()), vec![])
    };
    ($on_init:block, $($requirement:expr),+ $(,)?) => {
        $crate::command::FunctionalCommand::new(
            move || $on_init,
            || Ok(true),
            |_| Ok(()),
            vec![$($requirement),+],
        )
    };
}

#[macro_export]
macro_rules! run {
    ($on_step:block) => {
        $crate::command::FunctionalCommand::new(
            || Ok(()),
            move || match $on_step {
                Ok(()) => Ok(false),
                Err(e) => Err(e),
            },
            |_| Ok(()),
            vec![],
        )
    };
    ($on_step:block, $($requirement:expr),+ $(,)?) => {
        $crate::command::FunctionalCommand::new(
            || Ok(()),
            move || match $on_step {
                Ok(()) => Ok(false),
                Err(e) => Err(e),
            },
            |_| Ok(()),
            vec![$($requirement),+],
        )
    };
}

#[macro_export]
macro_rules! start_end {
    ($start:block, $end:block) => {
        $crate::command::FunctionalCommand::new(
            move || $start,
            || Ok(false),
            move |_| $end,
            vec![],
        )
    };
    ($start:block, $end:block, $($requirement:expr),+ $(,)?) => {
        $crate::command::FunctionalCommand::new(
            move || $start,
            || Ok(false),
            move |_| $end,
            vec![$($requirement),+],
        )
    };
}

#[macro_export]
macro_rules! run_end {
    ($step:block, $end:block) => {
        $crate::command::FunctionalCommand::new(
            || Ok(()),
            move || match $step {
                Ok(()) => Ok(false),
                Err(e) => Err(e),
            },
            move |_| $end,
            vec![],
        )
    };
    ($step:block, $end:block, $($requirement:expr),+ $(,)?) => {
        $crate::command::FunctionalCommand::new(
            || Ok(()),
            move || match $step {
                Ok(()) => Ok(false),
                Err(e) => Err(e),
            },
            move |_| $end,
            vec![$($requirement),+],
        )
    };
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn instant_command_finishes_first_step() {
        let ran = Rc::new(Cell::new(false));
        let mut command = FunctionalCommand::instant(
            {
                let ran = ran.clone();
                move || {
                    ran.set(true);
                    Ok(())
                }
            },
            vec![],
        );
        command.initialize().unwrap();
        assert!(ran.get());
        assert!(command.step().unwrap());
    }

    #[test]
    fn run_macro_never_finishes() {
        let count = Rc::new(Cell::new(0u32));
        let mut command = {
            let count = count.clone();
            run!({
                count.set(count.get() + 1);
                Ok(())
            })
        };
        command.initialize().unwrap();
        assert!(!command.step().unwrap());
        assert!(!command.step().unwrap());
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn start_end_runs_closures_at_edges() {
        let started = Rc::new(Cell::new(false));
        let ended = Rc::new(Cell::new(false));
        let mut command = {
            let started = started.clone();
            let ended = ended.clone();
            start_end!(
                {
                    started.set(true);
                    Ok(())
                },
                {
                    ended.set(true);
                    Ok(())
                }
            )
        };
        command.initialize().unwrap();
        assert!(started.get());
        assert!(!command.step().unwrap());
        command.end(true).unwrap();
        assert!(ended.get());
    }

    #[test]
    fn named_non_interruptible_builder() {
        let command = FunctionalCommand::instant(|| Ok(()), vec![])
            .with_name("Arm")
            .non_interruptible();
        assert_eq!(command.name(), "Arm");
        assert!(!command.is_interruptible());
    }
}
