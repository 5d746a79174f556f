use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use robot_command::command::builtin::{LogCommand, WaitCommand};
use robot_command::command::group::SequentialCommand;
use robot_command::command::Command;
use robot_command::sequence;
use robot_command::subsystem::SubsystemRefExt;
use robot_command::{CommandResult, SubsystemRef};

use crate::robot::OperatorInput;
use crate::subsystems::drivetrain::Drivetrain;

/// Default drivetrain behavior: follow the joystick, with a deadband so the
/// drive doesn't creep on a slightly off-center stick.
pub struct DriveWithJoystickCommand {
    drivetrain: Rc<RefCell<Drivetrain>>,
    input: Rc<OperatorInput>,
    requirements: Vec<SubsystemRef>,
}

impl DriveWithJoystickCommand {
    pub fn new(drivetrain: Rc<RefCell<Drivetrain>>, input: Rc<OperatorInput>) -> Self {
        Self {
            requirements: vec![SubsystemRef::from(drivetrain.clone())],
            drivetrain,
            input,
        }
    }
}

impl Command for DriveWithJoystickCommand {
    fn name(&self) -> &str {
        "DriveWithJoystick"
    }

    fn get_requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn step(&mut self) -> CommandResult<bool> {
        let raw = self.input.axis.get();
        let deadband = self.drivetrain.borrow().deadband();
        let demand = if raw.abs() < deadband { 0.0 } else { raw };
        self.drivetrain.borrow_mut().drive(demand);
        Ok(false)
    }

    fn end(&mut self, _interrupted: bool) -> CommandResult {
        self.drivetrain.borrow_mut().stop();
        Ok(())
    }
}

/// Brake routine bound to the operator's A button: stop the drive and hold it
/// for a moment before the joystick default takes back over.
pub fn brake_routine(drivetrain: &Rc<RefCell<Drivetrain>>) -> SequentialCommand {
    let stop = drivetrain
        .run_once({
            let drivetrain = drivetrain.clone();
            move || {
                drivetrain.borrow_mut().stop();
                Ok(())
            }
        })
        .with_name("Brake");
    sequence![
        LogCommand::new("operator brake engaged"),
        stop,
        WaitCommand::new(Duration::from_millis(200)),
    ]
    .with_name("BrakeRoutine")
}
