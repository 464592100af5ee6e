use crate::error::{NotifyError, Result};
use solfeo_common::types::{ClassDetail, Recipient, RecipientRule};
use solfeo_storage::{ClassDirectory, StudentDirectory};
use std::sync::Arc;

/// Expands a [`RecipientRule`] into concrete recipients at send time.
pub struct RecipientResolver {
    students: Arc<dyn StudentDirectory>,
    classes: Arc<dyn ClassDirectory>,
}

impl RecipientResolver {
    pub fn new(students: Arc<dyn StudentDirectory>, classes: Arc<dyn ClassDirectory>) -> Self {
        Self { students, classes }
    }

    /// Resolves `rule`.
    ///
    /// An unknown student yields an empty list. Lookup failures and unknown
    /// classes are [`NotifyError::Resolution`].
    pub fn resolve(&self, rule: &RecipientRule) -> Result<Vec<Recipient>> {
        let recipients = match rule {
            RecipientRule::SpecificStudent { student_id } => self
                .students
                .find_student(student_id)
                .map_err(|e| NotifyError::Resolution(e.to_string()))?
                .into_iter()
                .collect(),
            RecipientRule::AllStudents { filters } => self
                .students
                .find_active_students(filters.as_ref())
                .map_err(|e| NotifyError::Resolution(e.to_string()))?,
            RecipientRule::SpecificClass { class_id } => {
                self.load_class(class_id)?.active_students().cloned().collect()
            }
        };
        tracing::debug!(rule = rule.kind(), count = recipients.len(), "Resolved recipients");
        Ok(recipients)
    }

    pub fn find_student(&self, student_id: &str) -> Result<Option<Recipient>> {
        Ok(self.students.find_student(student_id)?)
    }

    /// Loads a class with its roster.
    pub fn load_class(&self, class_id: &str) -> Result<ClassDetail> {
        self.classes
            .find_class_with_roster(class_id)
            .map_err(|e| NotifyError::Resolution(e.to_string()))?
            .ok_or_else(|| NotifyError::Resolution(format!("class {class_id} not found")))
    }
}
