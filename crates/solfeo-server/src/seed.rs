use crate::config::DirectorySeedFile;
use solfeo_storage::{SqliteDirectory, StudentDirectory};

/// Counts reported by `init-directory`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub students: u32,
    pub actors: u32,
    pub classes: u32,
    pub failed: u32,
}

/// Upserts every seed entry into the directory store.
///
/// Entries are independent: a failing one is logged and counted, the rest
/// are still written. Students go first so rosters can be checked against
/// them.
pub fn apply_directory_seed(directory: &SqliteDirectory, seed: &DirectorySeedFile) -> SeedSummary {
    let mut summary = SeedSummary::default();

    for student in &seed.students {
        match directory.upsert_student(student) {
            Ok(()) => summary.students += 1,
            Err(e) => {
                tracing::error!(student_id = %student.id, error = %e, "Failed to write student");
                summary.failed += 1;
            }
        }
    }

    for actor in &seed.actors {
        match directory.upsert_actor(actor) {
            Ok(()) => summary.actors += 1,
            Err(e) => {
                tracing::error!(actor_id = %actor.id, error = %e, "Failed to write actor");
                summary.failed += 1;
            }
        }
    }

    for class in &seed.classes {
        for member in &class.roster {
            if matches!(directory.find_student(&member.student_id), Ok(None)) {
                tracing::warn!(
                    class_id = %class.id,
                    student_id = %member.student_id,
                    "Roster entry references an unknown student"
                );
            }
        }
        match directory.upsert_class(class) {
            Ok(()) => {
                tracing::info!(class_id = %class.id, roster = class.roster.len(), "Class written");
                summary.classes += 1;
            }
            Err(e) => {
                tracing::error!(class_id = %class.id, error = %e, "Failed to write class");
                summary.failed += 1;
            }
        }
    }

    summary
}
