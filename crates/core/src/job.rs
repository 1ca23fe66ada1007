//! Job vocabulary shared by the HTTP surface and every background worker.
//!
//! Each worker walks an ordered schedule of named [`Checkpoint`]s. The
//! percentages are illustrative milestones, not measured work; what matters is
//! that progress is visible mid-run and monotone within a schedule, so tests
//! assert checkpoint coverage instead of exact numbers.

use serde::{Deserialize, Serialize};

/// The kind of work a background job performs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Merge,
    EmailValidation,
    Research,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Merge => "merge",
            JobType::EmailValidation => "email_validation",
            JobType::Research => "research",
        }
    }
}

/// Job execution status.
///
/// One unified vocabulary: `processing` while a worker owns the record, then
/// exactly one of the two terminal states.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// A worker owns the record and is still pushing updates.
    Processing,
    /// Terminal: the worker finished and attached its result payload.
    Completed,
    /// Terminal: the worker aborted; `message` carries the error text.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A named point in a worker's execution at which progress is reported.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub name: &'static str,
    pub progress: u8,
}

/// Checkpoint schedule for the tabular merge worker.
pub const MERGE_CHECKPOINTS: &[Checkpoint] = &[
    Checkpoint { name: "loading", progress: 10 },
    Checkpoint { name: "reading_left", progress: 20 },
    Checkpoint { name: "reading_right", progress: 35 },
    Checkpoint { name: "joining", progress: 50 },
    Checkpoint { name: "statistics", progress: 70 },
    Checkpoint { name: "writing", progress: 80 },
    Checkpoint { name: "preview", progress: 90 },
    Checkpoint { name: "done", progress: 100 },
];

/// Checkpoint schedule for the email-validation worker.
pub const EMAIL_VALIDATION_CHECKPOINTS: &[Checkpoint] = &[
    Checkpoint { name: "fetching", progress: 5 },
    Checkpoint { name: "reading", progress: 10 },
    Checkpoint { name: "extracting", progress: 15 },
    Checkpoint { name: "resolving", progress: 25 },
    Checkpoint { name: "applying", progress: 85 },
    Checkpoint { name: "persisting", progress: 95 },
    Checkpoint { name: "done", progress: 100 },
];

/// Checkpoint schedule for the research worker.
///
/// The worker interpolates between `dispatching` and `persisting` as batches
/// complete, so this schedule only pins the fixed milestones.
pub const RESEARCH_CHECKPOINTS: &[Checkpoint] = &[
    Checkpoint { name: "preparing", progress: 5 },
    Checkpoint { name: "dispatching", progress: 10 },
    Checkpoint { name: "persisting", progress: 95 },
    Checkpoint { name: "done", progress: 100 },
];

impl JobType {
    /// The checkpoint schedule a worker of this type walks.
    pub fn checkpoints(&self) -> &'static [Checkpoint] {
        match self {
            JobType::Merge => MERGE_CHECKPOINTS,
            JobType::EmailValidation => EMAIL_VALIDATION_CHECKPOINTS,
            JobType::Research => RESEARCH_CHECKPOINTS,
        }
    }
}

/// Look up a checkpoint by name within a schedule.
///
/// Panics on an unknown name: a worker referencing a checkpoint outside its
/// schedule is a programming error, caught by the schedule tests below.
pub fn checkpoint(schedule: &'static [Checkpoint], name: &str) -> Checkpoint {
    schedule
        .iter()
        .find(|c| c.name == name)
        .copied()
        .unwrap_or_else(|| panic!("unknown checkpoint: {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_schedule_well_formed(schedule: &'static [Checkpoint]) {
        assert!(!schedule.is_empty());
        for pair in schedule.windows(2) {
            assert!(
                pair[0].progress < pair[1].progress,
                "checkpoints must be strictly increasing: {} then {}",
                pair[0].name,
                pair[1].name
            );
        }
        assert_eq!(schedule.last().unwrap().progress, 100);
        assert_eq!(schedule.last().unwrap().name, "done");
    }

    #[test]
    fn all_schedules_are_monotone_and_end_at_100() {
        assert_schedule_well_formed(MERGE_CHECKPOINTS);
        assert_schedule_well_formed(EMAIL_VALIDATION_CHECKPOINTS);
        assert_schedule_well_formed(RESEARCH_CHECKPOINTS);
    }

    #[test]
    fn checkpoint_lookup_finds_named_milestones() {
        let cp = checkpoint(MERGE_CHECKPOINTS, "joining");
        assert_eq!(cp.progress, 50);
    }

    #[test]
    #[should_panic(expected = "unknown checkpoint")]
    fn checkpoint_lookup_panics_on_unknown_name() {
        checkpoint(MERGE_CHECKPOINTS, "no-such-step");
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn job_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobType::EmailValidation).unwrap(),
            "\"email_validation\""
        );
    }
}
