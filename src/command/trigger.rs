use core::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

use crate::event::EventLoop;
use crate::{CommandRef, Scheduler};

/// Binds commands to a polled boolean condition, e.g. an operator button.
///
/// Bindings run when the owning [`EventLoop`] is polled, which happens before
/// the scheduler tick, so a command scheduled by a trigger is stepped on the
/// same tick. A rejected admission is logged and otherwise ignored; triggers
/// retry naturally on the next matching edge.
pub struct Trigger {
    event_loop: Rc<RefCell<EventLoop>>,
    condition: Rc<dyn Fn() -> bool>,
}

impl Trigger {
    pub fn new_with_loop(
        event_loop: Rc<RefCell<EventLoop>>,
        condition: impl Fn() -> bool + 'static,
    ) -> Self {
        Self {
            event_loop,
            condition: Rc::new(condition),
        }
    }

    fn submit(scheduler: &mut Scheduler, command: &CommandRef) {
        if let Err(e) = scheduler.submit(command.clone()) {
            warn!(error = %e, "trigger could not schedule command");
        }
    }

    fn cancel(scheduler: &mut Scheduler, command: &CommandRef) {
        if let Err(e) = scheduler.cancel(command) {
            warn!(error = %e, "trigger could not cancel command");
        }
    }

    /// Schedule the command on the rising edge of the condition.
    pub fn on_true(self, command: impl Into<CommandRef>) -> Self {
        let command = command.into();
        let condition = self.condition.clone();
        let mut pressed_last = condition();
        self.event_loop.borrow_mut().bind(move |scheduler| {
            let pressed = condition();
            if !pressed_last && pressed {
                Self::submit(scheduler, &command);
            }
            pressed_last = pressed;
        });
        self
    }

    /// Schedule the command on the falling edge of the condition.
    pub fn on_false(self, command: impl Into<CommandRef>) -> Self {
        let command = command.into();
        let condition = self.condition.clone();
        let mut pressed_last = condition();
        self.event_loop.borrow_mut().bind(move |scheduler| {
            let pressed = condition();
            if pressed_last && !pressed {
                Self::submit(scheduler, &command);
            }
            pressed_last = pressed;
        });
        self
    }

    /// Schedule the command while the condition holds; cancel it when the
    /// condition drops.
    pub fn while_true(self, command: impl Into<CommandRef>) -> Self {
        let command = command.into();
        let condition = self.condition.clone();
        let mut pressed_last = condition();

        self.event_loop.borrow_mut().bind(move |scheduler| {
            let pressed = condition();
            if !pressed_last && pressed {
                Self::submit(scheduler, &command);
            } else if pressed_last && !pressed {
                Self::cancel(scheduler, &command);
            }
            pressed_last = pressed;
        });
        self
    }

    pub fn while_false(self, command: impl Into<CommandRef>) -> Self {
        let command = command.into();
        let condition = self.condition.clone();
        let mut pressed_last = condition();

        self.event_loop.borrow_mut().bind(move |scheduler| {
            let pressed = condition();
            if pressed_last && !pressed {
                Self::submit(scheduler, &command);
            } else if !pressed_last && pressed {
                Self::cancel(scheduler, &command);
            }
            pressed_last = pressed;
        });
        self
    }

    /// Alternate between scheduling and cancelling on each rising edge.
    pub fn toggle_on_true(self, command: impl Into<CommandRef>) -> Self {
        let command = command.into();
        let condition = self.condition.clone();
        let mut pressed_last = condition();

        self.event_loop.borrow_mut().bind(move |scheduler| {
            let pressed = condition();
            if !pressed_last && pressed {
                if scheduler.is_running(&command) {
                    Self::cancel(scheduler, &command);
                } else {
                    Self::submit(scheduler, &command);
                }
            }
            pressed_last = pressed;
        });
        self
    }

    pub fn is_active(&self) -> bool {
        (self.condition)()
    }

    pub fn and(&self, other: &Self) -> Self {
        let condition = self.condition.clone();
        let other_condition = other.condition.clone();
        Self::new_with_loop(self.event_loop.clone(), move || {
            condition() && other_condition()
        })
    }

    pub fn or(&self, other: &Self) -> Self {
        let condition = self.condition.clone();
        let other_condition = other.condition.clone();
        Self::new_with_loop(self.event_loop.clone(), move || {
            condition() || other_condition()
        })
    }

    pub fn negate(&self) -> Self {
        let condition = self.condition.clone();
        Self::new_with_loop(self.event_loop.clone(), move || !condition())
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::command::FunctionalCommand;
    use crate::subsystem::Subsystem;
    use crate::SubsystemRef;

    #[derive(Debug)]
    struct Claw;

    impl Subsystem for Claw {
        fn name(&self) -> &str {
            "claw"
        }
    }

    fn harness() -> (Rc<RefCell<EventLoop>>, Scheduler, Rc<Cell<bool>>) {
        (
            Rc::new(RefCell::new(EventLoop::default())),
            Scheduler::new(),
            Rc::new(Cell::new(false)),
        )
    }

    #[test]
    fn on_true_schedules_on_rising_edge_only() {
        let (event_loop, mut scheduler, pressed) = harness();
        let runs = Rc::new(Cell::new(0u32));

        let command = {
            let runs = runs.clone();
            FunctionalCommand::instant(
                move || {
                    runs.set(runs.get() + 1);
                    Ok(())
                },
                vec![],
            )
        };
        Trigger::new_with_loop(event_loop.clone(), {
            let pressed = pressed.clone();
            move || pressed.get()
        })
        .on_true(command);

        event_loop.borrow_mut().poll(&mut scheduler);
        assert_eq!(runs.get(), 0);

        pressed.set(true);
        event_loop.borrow_mut().poll(&mut scheduler);
        event_loop.borrow_mut().poll(&mut scheduler);
        assert_eq!(runs.get(), 1);

        pressed.set(false);
        event_loop.borrow_mut().poll(&mut scheduler);
        pressed.set(true);
        event_loop.borrow_mut().poll(&mut scheduler);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn while_true_holds_command_then_cancels() {
        let (event_loop, mut scheduler, pressed) = harness();
        let claw = SubsystemRef::from(scheduler.register(Claw));

        let command = CommandRef::from(FunctionalCommand::new(
            || Ok(()),
            || Ok(false),
            |_| Ok(()),
            vec![claw.clone()],
        ));
        Trigger::new_with_loop(event_loop.clone(), {
            let pressed = pressed.clone();
            move || pressed.get()
        })
        .while_true(command.clone());

        pressed.set(true);
        event_loop.borrow_mut().poll(&mut scheduler);
        assert!(scheduler.is_running(&command));
        assert_eq!(scheduler.owner_of(&claw), Some(command.clone()));

        pressed.set(false);
        event_loop.borrow_mut().poll(&mut scheduler);
        assert!(!scheduler.is_running(&command));
        assert_eq!(scheduler.owner_of(&claw), None);
    }

    #[test]
    fn toggle_on_true_alternates() {
        let (event_loop, mut scheduler, pressed) = harness();

        let command = CommandRef::from(FunctionalCommand::new(
            || Ok(()),
            || Ok(false),
            |_| Ok(()),
            vec![],
        ));
        Trigger::new_with_loop(event_loop.clone(), {
            let pressed = pressed.clone();
            move || pressed.get()
        })
        .toggle_on_true(command.clone());

        pressed.set(true);
        event_loop.borrow_mut().poll(&mut scheduler);
        assert!(scheduler.is_running(&command));

        pressed.set(false);
        event_loop.borrow_mut().poll(&mut scheduler);
        pressed.set(true);
        event_loop.borrow_mut().poll(&mut scheduler);
        assert!(!scheduler.is_running(&command));
    }
}
