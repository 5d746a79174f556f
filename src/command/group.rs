use crate::command::Command;
use crate::{CommandResult, SubsystemRef};

/// Runs a list of commands one after another within a single admission.
///
/// The group requires the union of its children's requirements, so it holds
/// every subsystem any child will touch for its whole duration. Children that
/// finish instantly are skipped through within one tick, like the scheduler
/// would never see them. Interrupting the group interrupts whichever child is
/// active.
pub struct SequentialCommand {
    name: String,
    sequence: Vec<Box<dyn Command>>,
    requirements: Vec<SubsystemRef>,
    position: usize,
    child_initialized: bool,
}

impl SequentialCommand {
    pub fn new(sequence: Vec<Box<dyn Command>>) -> Self {
        let mut requirements: Vec<SubsystemRef> = Vec::new();
        for child in &sequence {
            for requirement in child.get_requirements() {
                if !requirements.contains(requirement) {
                    requirements.push(requirement.clone());
                }
            }
        }
        Self {
            name: String::from("SequentialCommand"),
            sequence,
            requirements,
            position: 0,
            child_initialized: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a command to the sequence.
    pub fn then(mut self, command: impl Command + 'static) -> Self {
        for requirement in command.get_requirements() {
            if !self.requirements.contains(requirement) {
                self.requirements.push(requirement.clone());
            }
        }
        self.sequence.push(Box::new(command));
        self
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Index of the child currently running (or about to run).
    pub fn current_position(&self) -> usize {
        self.position
    }
}

impl Default for SequentialCommand {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Command for SequentialCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_requirements(&self) -> &[SubsystemRef] {
        &self.requirements
    }

    fn initialize(&mut self) -> CommandResult {
        self.position = 0;
        self.child_initialized = false;
        Ok(())
    }

    fn step(&mut self) -> CommandResult<bool> {
        loop {
            let Some(child) = self.sequence.get_mut(self.position) else {
                return Ok(true);
            };
            if !self.child_initialized {
                child.initialize()?;
                self.child_initialized = true;
            }
            if !child.step()? {
                return Ok(false);
            }
            self.child_initialized = false;
            child.end(false)?;
            self.position += 1;
        }
    }

    fn end(&mut self, interrupted: bool) -> CommandResult {
        if interrupted && self.child_initialized {
            self.child_initialized = false;
            if let Some(child) = self.sequence.get_mut(self.position) {
                child.end(true)?;
            }
        }
        Ok(())
    }
}

/// Builds a [`SequentialCommand`] from a list of command expressions.
#[macro_export]
macro_rules! sequence {
    ($($command:expr),* $(,)?) => {
        $crate::command::group::SequentialCommand::new(vec![$(Box::new($command) as Box<dyn $crate::command::Command>),*])
    };
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::command::FunctionalCommand;
    use crate::subsystem::Subsystem;
    use crate::{Scheduler, SubsystemRef};

    #[derive(Debug)]
    struct Drive;

    impl Subsystem for Drive {
        fn name(&self) -> &str {
            "drive"
        }
    }

    fn counted_instant(log: &Rc<Cell<u32>>) -> FunctionalCommand {
        let log = log.clone();
        FunctionalCommand::instant(
            move || {
                log.set(log.get() + 1);
                Ok(())
            },
            vec![],
        )
    }

    #[test]
    fn instant_children_collapse_into_one_tick() {
        let count = Rc::new(Cell::new(0u32));
        let mut group = sequence![counted_instant(&count), counted_instant(&count)];

        group.initialize().unwrap();
        assert!(group.step().unwrap());
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn multi_tick_child_pauses_the_sequence() {
        let after = Rc::new(Cell::new(0u32));
        let steps_left = Rc::new(Cell::new(2u32));
        let mut group = SequentialCommand::default()
            .then({
                let steps_left = steps_left.clone();
                FunctionalCommand::new(
                    || Ok(()),
                    move || {
                        steps_left.set(steps_left.get() - 1);
                        Ok(steps_left.get() == 0)
                    },
                    |_| Ok(()),
                    vec![],
                )
            })
            .then(counted_instant(&after));

        group.initialize().unwrap();
        assert!(!group.step().unwrap());
        assert_eq!(after.get(), 0);
        assert!(group.step().unwrap());
        assert_eq!(after.get(), 1);
    }

    #[test]
    fn group_requires_union_of_children() {
        let mut scheduler = Scheduler::new();
        let drive = SubsystemRef::from(scheduler.register(Drive));

        let group = SequentialCommand::default().then(FunctionalCommand::new(
            || Ok(()),
            || Ok(false),
            |_| Ok(()),
            vec![drive.clone()],
        ));
        assert_eq!(group.get_requirements().to_vec(), vec![drive.clone()]);

        let group_ref = crate::CommandRef::from(group);
        scheduler.submit(group_ref.clone()).unwrap();
        assert_eq!(scheduler.owner_of(&drive), Some(group_ref));
    }

    #[test]
    fn interruption_ends_active_child() {
        let ended_interrupted = Rc::new(Cell::new(false));
        let mut group = SequentialCommand::default().then({
            let ended = ended_interrupted.clone();
            FunctionalCommand::new(
                || Ok(()),
                || Ok(false),
                move |interrupted| {
                    ended.set(interrupted);
                    Ok(())
                },
                vec![],
            )
        });

        group.initialize().unwrap();
        assert!(!group.step().unwrap());
        group.end(true).unwrap();
        assert!(ended_interrupted.get());
    }

    #[test]
    fn empty_sequence_finishes_immediately() {
        let mut group = SequentialCommand::default();
        group.initialize().unwrap();
        assert!(group.step().unwrap());
    }
}
