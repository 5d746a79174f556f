use core::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, warn};

use crate::event::EventLoop;
use crate::{BoxError, CommandResult, Scheduler, SchedulerError};

/// Period of the fixed control loop driven by [`start_robot`].
pub const ITERATION_PERIOD: Duration = Duration::from_millis(20);

/// What the robot is currently allowed to do, as told by the field or the
/// operator station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RobotMode {
    /// Nothing may move. The scheduler is not ticked and running commands
    /// are cancelled on entry.
    #[default]
    Disabled,
    Autonomous,
    Teleop,
}

/// Aggregates the scheduler (and through it the subsystem set) with the
/// input trigger loop, behind a single periodic entry point.
///
/// Constructed explicitly at startup and torn down with
/// [`shutdown`](RobotContext::shutdown); there is no global instance.
pub struct RobotContext {
    scheduler: Scheduler,
    triggers: Rc<RefCell<EventLoop>>,
}

impl RobotContext {
    pub fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            triggers: Rc::default(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Handle to the trigger loop, for building
    /// [`Trigger`](crate::command::trigger::Trigger) bindings.
    pub fn triggers(&self) -> Rc<RefCell<EventLoop>> {
        self.triggers.clone()
    }

    /// Poll input triggers. Called by the driver loop before
    /// [`periodic`](RobotContext::periodic), not from inside it.
    pub fn poll_triggers(&mut self) {
        let triggers = self.triggers.clone();
        triggers.borrow_mut().poll(&mut self.scheduler);
    }

    /// One control-loop tick: exactly one scheduler run.
    pub fn periodic(&mut self) -> Result<(), SchedulerError> {
        self.scheduler.run()
    }

    /// Cancel every running command and drop all trigger bindings.
    pub fn shutdown(&mut self) -> Result<(), SchedulerError> {
        self.triggers.borrow_mut().clear();
        self.scheduler.cancel_all()
    }
}

impl Default for RobotContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A robot program driven by [`start_robot`]. Only
/// [`context`](ScheduledRobot::context) is mandatory; the mode hooks default
/// to doing nothing.
pub trait ScheduledRobot {
    fn context(&mut self) -> &mut RobotContext;

    /// Current mode, polled once per iteration. Typically read from a field
    /// management system or competition switch.
    fn mode(&self) -> RobotMode {
        RobotMode::Teleop
    }

    /// Return false to leave the control loop and shut the context down.
    fn should_run(&self) -> bool {
        true
    }

    /// Called every iteration regardless of mode, after the scheduler tick.
    fn periodic(&mut self) -> CommandResult {
        Ok(())
    }

    fn disabled_init(&mut self) -> CommandResult {
        Ok(())
    }
    fn disabled_periodic(&mut self) -> CommandResult {
        Ok(())
    }
    fn autonomous_init(&mut self) -> CommandResult {
        Ok(())
    }
    fn autonomous_periodic(&mut self) -> CommandResult {
        Ok(())
    }
    fn teleop_init(&mut self) -> CommandResult {
        Ok(())
    }
    fn teleop_periodic(&mut self) -> CommandResult {
        Ok(())
    }
}

/// Fixed-period pacing for the control loop. Sleeps until the next deadline
/// rather than a flat amount, so tick work does not stretch the period.
pub struct Interval {
    deadline: Instant,
}

impl Interval {
    pub fn start() -> Self {
        Self {
            deadline: Instant::now(),
        }
    }

    pub fn delay(&mut self, period: Duration) {
        self.deadline += period;
        let now = Instant::now();
        if self.deadline > now {
            thread::sleep(self.deadline - now);
        } else {
            // Fell behind; rebase instead of sprinting to catch up.
            self.deadline = now;
        }
    }
}

/// Drive a robot program at [`ITERATION_PERIOD`] until
/// [`should_run`](ScheduledRobot::should_run) returns false.
///
/// Recoverable scheduler errors (admission conflicts surfaced through
/// defaults, command step faults) are logged and the loop continues; a
/// [`SchedulerError::FatalInvariantViolation`] stops the loop. Entering
/// [`RobotMode::Disabled`] cancels every running command.
pub fn start_robot(mut robot: impl ScheduledRobot) -> Result<(), BoxError> {
    let mut previous_mode = None;
    let mut interval = Interval::start();

    while robot.should_run() {
        let current_mode = robot.mode();
        if previous_mode != Some(current_mode) {
            match current_mode {
                RobotMode::Disabled => {
                    if let Err(e) = robot.context().scheduler_mut().cancel_all() {
                        if e.is_fatal() {
                            return Err(e.into());
                        }
                        warn!(error = %e, "command faulted while disabling");
                    }
                    robot.disabled_init()?;
                }
                RobotMode::Autonomous => robot.autonomous_init()?,
                RobotMode::Teleop => robot.teleop_init()?,
            }
        }
        previous_mode = Some(current_mode);

        match current_mode {
            RobotMode::Disabled => robot.disabled_periodic()?,
            RobotMode::Autonomous | RobotMode::Teleop => {
                robot.context().poll_triggers();
                match robot.context().periodic() {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "scheduler halted");
                        return Err(e.into());
                    }
                    Err(e) => warn!(error = %e, "recoverable scheduler error"),
                }
                match current_mode {
                    RobotMode::Autonomous => robot.autonomous_periodic()?,
                    _ => robot.teleop_periodic()?,
                }
            }
        }
        robot.periodic()?;

        interval.delay(ITERATION_PERIOD);
    }

    robot.context().shutdown()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::command::FunctionalCommand;
    use crate::subsystem::Subsystem;
    use crate::{CommandRef, SubsystemRef};

    #[derive(Debug)]
    struct Drive;

    impl Subsystem for Drive {
        fn name(&self) -> &str {
            "drive"
        }
    }

    #[test]
    fn periodic_ticks_running_commands() {
        let mut context = RobotContext::new();
        let drive = SubsystemRef::from(context.scheduler_mut().register(Drive));

        let steps = Rc::new(Cell::new(0u32));
        let command = CommandRef::from(FunctionalCommand::new(
            || Ok(()),
            {
                let steps = steps.clone();
                move || {
                    steps.set(steps.get() + 1);
                    Ok(false)
                }
            },
            |_| Ok(()),
            vec![drive],
        ));
        context.scheduler_mut().submit(command).unwrap();

        context.periodic().unwrap();
        context.periodic().unwrap();
        assert_eq!(steps.get(), 2);
    }

    #[test]
    fn shutdown_interrupts_and_clears_triggers() {
        let mut context = RobotContext::new();
        let ended_interrupted = Rc::new(Cell::new(false));
        let command = CommandRef::from(FunctionalCommand::new(
            || Ok(()),
            || Ok(false),
            {
                let ended = ended_interrupted.clone();
                move |interrupted| {
                    ended.set(interrupted);
                    Ok(())
                }
            },
            vec![],
        ));
        context.scheduler_mut().submit(command.clone()).unwrap();
        context.triggers().borrow_mut().bind(|_| {});

        context.shutdown().unwrap();
        assert!(ended_interrupted.get());
        assert!(!context.scheduler().is_running(&command));
    }

    struct LoopRobot {
        context: RobotContext,
        iterations: Cell<u32>,
        limit: u32,
        disable_after: Option<u32>,
        teleop_inits: Rc<Cell<u32>>,
    }

    impl LoopRobot {
        fn new(limit: u32) -> Self {
            Self {
                context: RobotContext::new(),
                iterations: Cell::new(0),
                limit,
                disable_after: None,
                teleop_inits: Rc::default(),
            }
        }
    }

    impl ScheduledRobot for LoopRobot {
        fn context(&mut self) -> &mut RobotContext {
            &mut self.context
        }

        fn mode(&self) -> RobotMode {
            match self.disable_after {
                Some(n) if self.iterations.get() >= n => RobotMode::Disabled,
                _ => RobotMode::Teleop,
            }
        }

        fn should_run(&self) -> bool {
            self.iterations.get() < self.limit
        }

        fn periodic(&mut self) -> CommandResult {
            self.iterations.set(self.iterations.get() + 1);
            Ok(())
        }

        fn teleop_init(&mut self) -> CommandResult {
            self.teleop_inits.set(self.teleop_inits.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn start_robot_runs_fixed_number_of_iterations() {
        let steps = Rc::new(Cell::new(0u32));
        let mut robot = LoopRobot::new(3);
        let command = CommandRef::from(FunctionalCommand::new(
            || Ok(()),
            {
                let steps = steps.clone();
                move || {
                    steps.set(steps.get() + 1);
                    Ok(false)
                }
            },
            |_| Ok(()),
            vec![],
        ));
        robot.context().scheduler_mut().submit(command).unwrap();

        start_robot(robot).unwrap();
        assert_eq!(steps.get(), 3);
    }

    #[test]
    fn teleop_init_fires_once_across_iterations() {
        let mut robot = LoopRobot::new(4);
        let inits = robot.teleop_inits.clone();
        robot.disable_after = None;
        start_robot(robot).unwrap();
        assert_eq!(inits.get(), 1);
    }

    #[test]
    fn entering_disabled_cancels_commands() {
        let ended_interrupted = Rc::new(Cell::new(false));
        let mut robot = LoopRobot::new(4);
        robot.disable_after = Some(2);
        let command = CommandRef::from(FunctionalCommand::new(
            || Ok(()),
            || Ok(false),
            {
                let ended = ended_interrupted.clone();
                move |interrupted| {
                    ended.set(interrupted);
                    Ok(())
                }
            },
            vec![],
        ));
        robot.context().scheduler_mut().submit(command).unwrap();

        start_robot(robot).unwrap();
        assert!(ended_interrupted.get());
    }
}
