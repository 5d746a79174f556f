use core::cell::{Cell, RefCell};
use std::error::Error;
use std::rc::Rc;

use robot_command::command::trigger::Trigger;
use robot_command::robot::{RobotContext, ScheduledRobot};
use robot_command::CommandResult;
use serde::Deserialize;
use tracing::info;

use crate::commands::{self, DriveWithJoystickCommand};
use crate::subsystems::drivetrain::{Drivetrain, DrivetrainConfig};

#[derive(Debug, Deserialize)]
pub struct RobotConfig {
    pub drivetrain: DrivetrainConfig,
}

/// Simulated operator station: one joystick axis and one button, written by
/// the robot's periodic hook in place of real controller polling.
#[derive(Debug, Default)]
pub struct OperatorInput {
    pub axis: Cell<f64>,
    pub button_a: Cell<bool>,
}

pub struct Robot {
    context: RobotContext,
    drivetrain: Rc<RefCell<Drivetrain>>,
    input: Rc<OperatorInput>,
    tick: u32,
    limit: u32,
}

impl Robot {
    pub fn new(config: RobotConfig) -> Result<Self, Box<dyn Error>> {
        let mut context = RobotContext::new();
        let drivetrain = context
            .scheduler_mut()
            .register(Drivetrain::new(config.drivetrain));
        let mut robot = Self {
            context,
            drivetrain,
            input: Rc::new(OperatorInput::default()),
            tick: 0,
            limit: 150,
        };
        robot.configure_bindings()?;
        Ok(robot)
    }

    fn configure_bindings(&mut self) -> Result<(), Box<dyn Error>> {
        self.context.scheduler_mut().set_default_command(
            self.drivetrain.clone(),
            DriveWithJoystickCommand::new(self.drivetrain.clone(), self.input.clone()),
        )?;

        Trigger::new_with_loop(self.context.triggers(), {
            let input = self.input.clone();
            move || input.button_a.get()
        })
        .on_true(commands::brake_routine(&self.drivetrain));

        Ok(())
    }
}

impl ScheduledRobot for Robot {
    fn context(&mut self) -> &mut RobotContext {
        &mut self.context
    }

    fn should_run(&self) -> bool {
        self.tick < self.limit
    }

    fn periodic(&mut self) -> CommandResult {
        self.tick += 1;
        // Simulated operator: a slow sine sweep on the stick, with the brake
        // button held for a stretch in the middle of the run.
        self.input.axis.set((f64::from(self.tick) * 0.08).sin());
        self.input.button_a.set((60..70).contains(&self.tick));

        if self.tick == self.limit {
            info!(
                distance = self.drivetrain.borrow().distance(),
                "demo finished"
            );
        }
        Ok(())
    }
}
