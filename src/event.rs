use core::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::command::trigger::Trigger;
use crate::Scheduler;

/// A set of callbacks polled once per control-loop iteration, before the
/// scheduler tick. Callbacks get the scheduler so they can submit or cancel
/// commands in response to input.
#[derive(Default)]
pub struct EventLoop {
    events: Vec<Box<dyn FnMut(&mut Scheduler)>>,
}

impl EventLoop {
    /// Add an event to run when the loop is polled.
    pub fn bind(&mut self, action: impl FnMut(&mut Scheduler) + 'static) {
        self.events.push(Box::new(action));
    }

    pub fn poll(&mut self, scheduler: &mut Scheduler) {
        for event in self.events.iter_mut() {
            event(scheduler);
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// A boolean signal sampled every poll, with edge and combinator helpers.
pub struct BooleanEvent {
    event_loop: Rc<RefCell<EventLoop>>,
    state: Rc<Cell<bool>>,
}

impl BooleanEvent {
    pub fn new(
        event_loop: Rc<RefCell<EventLoop>>,
        mut signal: impl FnMut() -> bool + 'static,
    ) -> Self {
        let state = Rc::new(Cell::new(signal()));
        event_loop.borrow_mut().bind({
            let state = state.clone();
            move |_| {
                state.set(signal());
            }
        });
        Self { event_loop, state }
    }

    pub fn current_state(&self) -> bool {
        self.state.get()
    }

    pub fn if_high(&self, mut action: impl FnMut(&mut Scheduler) + 'static) {
        let state = self.state.clone();
        self.event_loop.borrow_mut().bind(move |scheduler| {
            if state.get() {
                action(scheduler);
            }
        });
    }

    pub fn rising(&self) -> Self {
        let mut previous = self.state.get();
        let state = self.state.clone();

        Self::new(self.event_loop.clone(), move || {
            let present = state.get();
            let is_rising = !previous && present;
            previous = present;
            is_rising
        })
    }

    pub fn falling(&self) -> Self {
        let mut previous = self.state.get();
        let state = self.state.clone();

        Self::new(self.event_loop.clone(), move || {
            let present = state.get();
            let is_falling = previous && !present;
            previous = present;
            is_falling
        })
    }

    pub fn negate(&self) -> Self {
        let state = self.state.clone();
        Self::new(self.event_loop.clone(), move || !state.get())
    }

    pub fn and(&self, other: &Self) -> Self {
        let state = self.state.clone();
        let other_state = other.state.clone();
        Self::new(self.event_loop.clone(), move || {
            state.get() && other_state.get()
        })
    }

    pub fn or(&self, other: &Self) -> Self {
        let state = self.state.clone();
        let other_state = other.state.clone();
        Self::new(self.event_loop.clone(), move || {
            state.get() || other_state.get()
        })
    }

    pub fn as_trigger(&self) -> Trigger {
        let state = self.state.clone();
        Trigger::new_with_loop(self.event_loop.clone(), move || state.get())
    }
}

impl From<BooleanEvent> for Trigger {
    fn from(event: BooleanEvent) -> Self {
        Self::new_with_loop(event.event_loop, move || event.state.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_edge_fires_once_per_transition() {
        let event_loop = Rc::new(RefCell::new(EventLoop::default()));
        let mut scheduler = Scheduler::new();
        let signal = Rc::new(Cell::new(false));

        let event = BooleanEvent::new(event_loop.clone(), {
            let signal = signal.clone();
            move || signal.get()
        });
        let fired = Rc::new(Cell::new(0u32));
        event.rising().if_high({
            let fired = fired.clone();
            move |_| fired.set(fired.get() + 1)
        });

        event_loop.borrow_mut().poll(&mut scheduler);
        assert_eq!(fired.get(), 0);
        signal.set(true);
        event_loop.borrow_mut().poll(&mut scheduler);
        event_loop.borrow_mut().poll(&mut scheduler);
        assert_eq!(fired.get(), 1);
        signal.set(false);
        signal.set(true);
        event_loop.borrow_mut().poll(&mut scheduler);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn combinators_track_both_signals() {
        let event_loop = Rc::new(RefCell::new(EventLoop::default()));
        let mut scheduler = Scheduler::new();
        let left = Rc::new(Cell::new(true));
        let right = Rc::new(Cell::new(false));

        let left_event = BooleanEvent::new(event_loop.clone(), {
            let left = left.clone();
            move || left.get()
        });
        let right_event = BooleanEvent::new(event_loop.clone(), {
            let right = right.clone();
            move || right.get()
        });
        let both = left_event.and(&right_event);
        let either = left_event.or(&right_event);

        event_loop.borrow_mut().poll(&mut scheduler);
        assert!(!both.current_state());
        assert!(either.current_state());

        right.set(true);
        event_loop.borrow_mut().poll(&mut scheduler);
        assert!(both.current_state());
        assert!(!left_event.negate().current_state());
    }
}
