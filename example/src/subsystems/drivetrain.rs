use robot_command::subsystem::Subsystem;
use serde::Deserialize;
use tracing::trace;

#[derive(Debug, Clone, Deserialize)]
pub struct DrivetrainConfig {
    pub max_speed: f64,
    pub deadband: f64,
}

/// A simulated tank drivetrain. Real hardware would live behind the same
/// surface: `drive` sets the demand, `periodic` pushes it to the outputs.
#[derive(Debug)]
pub struct Drivetrain {
    config: DrivetrainConfig,
    speed: f64,
    distance: f64,
}

impl Drivetrain {
    pub fn new(config: DrivetrainConfig) -> Self {
        Self {
            config,
            speed: 0.0,
            distance: 0.0,
        }
    }

    pub fn drive(&mut self, speed: f64) {
        self.speed = speed.clamp(-self.config.max_speed, self.config.max_speed);
    }

    pub fn stop(&mut self) {
        self.speed = 0.0;
    }

    pub fn deadband(&self) -> f64 {
        self.config.deadband
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }
}

impl Subsystem for Drivetrain {
    fn name(&self) -> &str {
        "drivetrain"
    }

    fn periodic(&mut self) {
        self.distance += self.speed;
        trace!(speed = self.speed, distance = self.distance, "drivetrain output");
    }
}
