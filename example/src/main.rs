use std::error::Error;

use robot::{Robot, RobotConfig};
use robot_command::robot::start_robot;

mod commands;
mod robot;
mod subsystems;

static CONFIG: &str = include_str!("../robot.toml");

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config: RobotConfig = toml::from_str(CONFIG)?;
    let robot = Robot::new(config)?;
    start_robot(robot)
}
