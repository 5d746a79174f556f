use core::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use snafu::Snafu;
use tracing::{debug, error, trace, warn};

use crate::{subsystem::Subsystem, BoxError, CommandRef, SubsystemRef};

#[derive(Debug, Snafu)]
pub enum SchedulerError {
    /// A submission was rejected because a required subsystem is held by a
    /// command that refuses interruption. The submitted command was never
    /// initialized.
    #[snafu(display(
        "cannot admit '{command}': subsystem '{subsystem}' is held by non-interruptible command '{owner}'"
    ))]
    AdmissionConflict {
        command: String,
        subsystem: String,
        owner: String,
    },

    /// A requirement or default-command registration that can never be
    /// honored. The offending registration is rejected; nothing else changes.
    #[snafu(display("invalid requirement for '{command}': {reason}"))]
    InvalidRequirement { command: String, reason: String },

    /// A command failed inside one of its lifecycle callbacks. The command is
    /// treated as interrupted and its subsystems are released.
    #[snafu(display("command '{command}' faulted: {fault}"))]
    StepFault { command: String, fault: BoxError },

    /// The ownership index and the admission snapshots disagree, or the
    /// scheduler was driven after such a disagreement was detected. This is a
    /// scheduler bug; the scheduler halts rather than continue with corrupted
    /// state.
    #[snafu(display("scheduler invariant violated: {details}"))]
    FatalInvariantViolation { details: String },
}

impl SchedulerError {
    /// Whether the caller must stop driving the scheduler.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SchedulerError::FatalInvariantViolation { .. })
    }
}

struct SubsystemSlot {
    subsystem: SubsystemRef,
    default_command: Option<CommandRef>,
}

struct RunningCommand {
    command: CommandRef,
    /// Requirement snapshot taken at admission, sorted by subsystem
    /// registration order. Later mutation of the command's live requirement
    /// set has no effect on arbitration.
    requirements: Vec<SubsystemRef>,
}

/// The single authority over which command owns which subsystem.
///
/// Single-threaded and tick-driven: one [`run`](Scheduler::run) per control
/// loop iteration advances every running command once. Submissions and
/// cancellations are synchronous; command callbacks receive no scheduler
/// handle, so the ownership index cannot be mutated reentrantly from inside
/// a tick.
#[derive(Default)]
pub struct Scheduler {
    /// Subsystem registry in registration order. Registration order is the
    /// tie-breaking order for conflict resolution and default admission.
    slots: Vec<SubsystemSlot>,
    registration: HashMap<SubsystemRef, usize>,
    /// Reverse index: subsystem -> the command currently owning it.
    owners: HashMap<SubsystemRef, CommandRef>,
    /// Running set in admission order.
    running: Vec<RunningCommand>,
    halted: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subsystem with the scheduler. Subsystems live for the rest
    /// of the process; there is no unregister.
    pub fn register<S: Subsystem + 'static>(&mut self, subsystem: S) -> Rc<RefCell<S>> {
        let subsystem = Rc::new(RefCell::new(subsystem));
        let subsystem_ref = SubsystemRef(subsystem.clone());
        debug!(subsystem = %subsystem_ref.name(), "registered subsystem");
        self.registration
            .insert(subsystem_ref.clone(), self.slots.len());
        self.slots.push(SubsystemSlot {
            subsystem: subsystem_ref,
            default_command: None,
        });
        subsystem
    }

    /// Install a command to run automatically whenever `subsystem` is
    /// unowned. The command must require `subsystem`; a pair of default
    /// commands that mutually require each other's subsystems is a
    /// configuration error and the registration is refused.
    pub fn set_default_command(
        &mut self,
        subsystem: impl Into<SubsystemRef>,
        command: impl Into<CommandRef>,
    ) -> Result<(), SchedulerError> {
        let subsystem = subsystem.into();
        let command = command.into();
        let name = command.name();

        let Some(&slot) = self.registration.get(&subsystem) else {
            return Err(SchedulerError::InvalidRequirement {
                command: name,
                reason: format!("subsystem '{}' is not registered", subsystem.name()),
            });
        };
        let requirements = command.0.borrow().get_requirements().to_vec();
        if !requirements.contains(&subsystem) {
            return Err(SchedulerError::InvalidRequirement {
                command: name,
                reason: format!(
                    "default command must require its subsystem '{}'",
                    subsystem.name()
                ),
            });
        }
        for requirement in &requirements {
            if !self.registration.contains_key(requirement) {
                return Err(SchedulerError::InvalidRequirement {
                    command: name,
                    reason: format!(
                        "requires unregistered subsystem '{}'",
                        requirement.name()
                    ),
                });
            }
            if *requirement == subsystem {
                continue;
            }
            let other = &self.slots[self.registration[requirement]];
            if let Some(other_default) = &other.default_command {
                if other_default.0.borrow().get_requirements().contains(&subsystem) {
                    warn!(
                        command = %name,
                        subsystem = %subsystem.name(),
                        other = %requirement.name(),
                        "cyclic default command requirement; subsystem will run with no default"
                    );
                    return Err(SchedulerError::InvalidRequirement {
                        command: name,
                        reason: format!(
                            "cyclic default requirement between '{}' and '{}'",
                            subsystem.name(),
                            requirement.name()
                        ),
                    });
                }
            }
        }

        self.slots[slot].default_command = Some(command);
        Ok(())
    }

    pub fn remove_default_command(
        &mut self,
        subsystem: &SubsystemRef,
    ) -> Option<CommandRef> {
        let slot = *self.registration.get(subsystem)?;
        self.slots[slot].default_command.take()
    }

    /// Admit a command: resolve subsystem conflicts, grant ownership of every
    /// required subsystem, initialize the command and add it to the running
    /// set.
    ///
    /// If any required subsystem is held by a non-interruptible command, the
    /// submission fails with [`SchedulerError::AdmissionConflict`] and the
    /// command is discarded without being initialized. Otherwise every
    /// conflicting owner is interrupted first, in ascending subsystem
    /// registration order. Submitting a command that is already running is a
    /// no-op.
    pub fn submit(&mut self, command: impl Into<CommandRef>) -> Result<(), SchedulerError> {
        self.ensure_live()?;
        let command = command.into();
        if self.is_running(&command) {
            trace!(command = %command.name(), "command already running");
            return Ok(());
        }
        let name = command.name();

        let mut requirements = command.0.borrow().get_requirements().to_vec();
        for requirement in &requirements {
            if !self.registration.contains_key(requirement) {
                return Err(SchedulerError::InvalidRequirement {
                    command: name,
                    reason: format!(
                        "requires unregistered subsystem '{}'",
                        requirement.name()
                    ),
                });
            }
        }
        requirements.sort_by_key(|r| self.registration[r]);
        requirements.dedup();

        let mut displaced: Vec<CommandRef> = Vec::new();
        for requirement in &requirements {
            if let Some(owner) = self.owners.get(requirement) {
                if !owner.0.borrow().is_interruptible() {
                    return Err(SchedulerError::AdmissionConflict {
                        command: name,
                        subsystem: requirement.name(),
                        owner: owner.name(),
                    });
                }
                if !displaced.contains(owner) {
                    displaced.push(owner.clone());
                }
            }
        }

        for owner in displaced {
            debug!(command = %owner.name(), displaced_by = %name, "interrupting command");
            if let Err(fault) = self.finish(&owner, true) {
                error!(error = %fault, "displaced command faulted during end");
            }
        }

        self.grant(command, requirements)
    }

    /// Forcibly interrupt a running command, regardless of its interruptible
    /// flag. Cancelling a command that is not running is a no-op.
    pub fn cancel(&mut self, command: &CommandRef) -> Result<(), SchedulerError> {
        if !self.is_running(command) {
            debug!(command = %command.name(), "attempted to cancel a command that is not running");
            return Ok(());
        }
        self.finish(command, true)
    }

    pub fn cancel_all(&mut self) -> Result<(), SchedulerError> {
        let commands: Vec<CommandRef> =
            self.running.iter().map(|run| run.command.clone()).collect();
        let mut first_fault = None;
        for command in commands {
            if let Err(fault) = self.cancel(&command) {
                error!(error = %fault, "command faulted while cancelling all");
                first_fault.get_or_insert(fault);
            }
        }
        first_fault.map_or(Ok(()), Err)
    }

    /// One scheduler tick.
    ///
    /// Order within a tick: subsystem `periodic` hooks, then default-command
    /// admission for unowned subsystems, then one `step` for every command
    /// that was running when the stepping phase began. Commands admitted
    /// after that snapshot are not stepped until the next tick. Defaults are
    /// admitted before the snapshot, so a freshly admitted default is
    /// stepped on the same tick.
    ///
    /// A command whose `step` fails is treated as interrupted: its subsystems
    /// are released and the fault is returned once the remaining snapshotted
    /// commands have been stepped. The caller decides whether to keep
    /// driving the loop; only [`SchedulerError::FatalInvariantViolation`]
    /// requires stopping.
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        self.ensure_live()?;

        for slot in &self.slots {
            slot.subsystem.0.borrow_mut().periodic();
        }

        let defaults: Vec<CommandRef> = self
            .slots
            .iter()
            .filter(|slot| !self.owners.contains_key(&slot.subsystem))
            .filter_map(|slot| slot.default_command.clone())
            .collect();
        for default in defaults {
            if self.is_running(&default) {
                continue;
            }
            // A default only starts when everything it requires is free, so
            // defaults never preempt live commands on other subsystems.
            if !self.requirements_free(&default) {
                trace!(command = %default.name(), "default command requirements not free");
                continue;
            }
            match self.submit(default) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(error = %e, "default command admission failed"),
            }
        }

        let snapshot: Vec<CommandRef> =
            self.running.iter().map(|run| run.command.clone()).collect();
        let mut first_fault = None;
        for command in snapshot {
            if !self.is_running(&command) {
                continue;
            }
            let stepped = command.0.borrow_mut().step();
            match stepped {
                Ok(false) => {}
                Ok(true) => {
                    if let Err(fault) = self.finish(&command, false) {
                        error!(error = %fault, "command faulted during end");
                        first_fault.get_or_insert(fault);
                    }
                }
                Err(fault) => {
                    let name = command.name();
                    error!(command = %name, error = %fault, "command faulted during step");
                    if let Err(end_fault) = self.finish(&command, true) {
                        error!(error = %end_fault, "faulted command also faulted during end");
                    }
                    first_fault.get_or_insert(SchedulerError::StepFault {
                        command: name,
                        fault,
                    });
                }
            }
        }

        if let Err(violation) = self.check_invariants() {
            self.halted = true;
            return Err(violation);
        }
        first_fault.map_or(Ok(()), Err)
    }

    /// Verify that the ownership index and the running set agree: every owned
    /// subsystem is owned by a running command whose admission snapshot
    /// contains it, and every running command owns everything in its
    /// snapshot.
    pub fn check_invariants(&self) -> Result<(), SchedulerError> {
        for (subsystem, owner) in &self.owners {
            let Some(run) = self.running.iter().find(|run| run.command == *owner) else {
                return Err(SchedulerError::FatalInvariantViolation {
                    details: format!(
                        "subsystem '{}' is owned by '{}', which is not running",
                        subsystem.name(),
                        owner.name()
                    ),
                });
            };
            if !run.requirements.contains(subsystem) {
                return Err(SchedulerError::FatalInvariantViolation {
                    details: format!(
                        "'{}' owns subsystem '{}' outside its requirement set",
                        owner.name(),
                        subsystem.name()
                    ),
                });
            }
        }
        for run in &self.running {
            for requirement in &run.requirements {
                if self.owners.get(requirement) != Some(&run.command) {
                    return Err(SchedulerError::FatalInvariantViolation {
                        details: format!(
                            "running command '{}' does not own required subsystem '{}'",
                            run.command.name(),
                            requirement.name()
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn is_running(&self, command: &CommandRef) -> bool {
        self.running.iter().any(|run| run.command == *command)
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The command currently owning `subsystem`, for telemetry display.
    pub fn owner_of(&self, subsystem: &SubsystemRef) -> Option<CommandRef> {
        self.owners.get(subsystem).cloned()
    }

    /// Running commands in admission order, for telemetry display.
    pub fn running_commands(&self) -> impl Iterator<Item = &CommandRef> {
        self.running.iter().map(|run| &run.command)
    }

    /// Registered subsystems in registration order.
    pub fn subsystems(&self) -> impl Iterator<Item = &SubsystemRef> {
        self.slots.iter().map(|slot| &slot.subsystem)
    }

    fn ensure_live(&self) -> Result<(), SchedulerError> {
        if self.halted {
            return Err(SchedulerError::FatalInvariantViolation {
                details: "scheduler is halted after an invariant violation".into(),
            });
        }
        Ok(())
    }

    fn requirements_free(&self, command: &CommandRef) -> bool {
        command
            .0
            .borrow()
            .get_requirements()
            .iter()
            .all(|requirement| !self.owners.contains_key(requirement))
    }

    /// Call `end(interrupted)` and remove the command and all its ownership
    /// entries. State is cleaned up even when `end` faults.
    fn finish(&mut self, command: &CommandRef, interrupted: bool) -> Result<(), SchedulerError> {
        let result = command.0.borrow_mut().end(interrupted);
        self.owners.retain(|_, owner| *owner != *command);
        self.running.retain(|run| run.command != *command);
        result.map_err(|fault| SchedulerError::StepFault {
            command: command.name(),
            fault,
        })
    }

    fn grant(
        &mut self,
        command: CommandRef,
        requirements: Vec<SubsystemRef>,
    ) -> Result<(), SchedulerError> {
        for requirement in &requirements {
            self.owners.insert(requirement.clone(), command.clone());
        }
        if let Err(fault) = command.0.borrow_mut().initialize() {
            let name = command.name();
            error!(command = %name, error = %fault, "command faulted during initialize");
            self.owners.retain(|_, owner| *owner != command);
            return Err(SchedulerError::StepFault {
                command: name,
                fault,
            });
        }
        trace!(command = %command.name(), "admitted command");
        self.running.push(RunningCommand {
            command,
            requirements,
        });
        Ok(())
    }
}
