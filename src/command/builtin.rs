use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::command::Command;
use crate::{CommandResult, SubsystemRef};

/// Does nothing for a fixed period, then finishes. Useful as a spacer inside
/// a [`SequentialCommand`](crate::command::group::SequentialCommand).
pub struct WaitCommand {
    period: Duration,
    started_at: Option<Instant>,
}

impl WaitCommand {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            started_at: None,
        }
    }
}

impl Command for WaitCommand {
    fn name(&self) -> &str {
        "WaitCommand"
    }

    fn get_requirements(&self) -> &[SubsystemRef] {
        &[]
    }

    fn initialize(&mut self) -> CommandResult {
        debug!(period_ms = self.period.as_millis() as u64, "waiting");
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn step(&mut self) -> CommandResult<bool> {
        let started_at = self
            .started_at
            .ok_or("wait command stepped before initialize")?;
        Ok(started_at.elapsed() >= self.period)
    }

    fn end(&mut self, _interrupted: bool) -> CommandResult {
        self.started_at = None;
        Ok(())
    }
}

/// Emits a log line and finishes on its first step. Handy for tracing through
/// autonomous sequences.
pub struct LogCommand {
    message: String,
}

impl LogCommand {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Command for LogCommand {
    fn name(&self) -> &str {
        "LogCommand"
    }

    fn get_requirements(&self) -> &[SubsystemRef] {
        &[]
    }

    fn step(&mut self) -> CommandResult<bool> {
        info!("{}", self.message);
        Ok(true)
    }
}
