use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// §3 Job.currentState — the wizard's required/optional intake state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Draft,
    RequiredInProgress,
    RequiredComplete,
    OptionalInProgress,
    OptionalComplete,
}

impl JobState {
    /// `status` is a pure projection of `currentState` (§3 invariant).
    pub fn as_status(self) -> &'static str {
        match self {
            JobState::Draft => "draft",
            JobState::RequiredInProgress => "in_progress",
            JobState::RequiredComplete => "required_complete",
            JobState::OptionalInProgress => "optional_in_progress",
            JobState::OptionalComplete => "complete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: JobState,
    pub to: JobState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStateMachine {
    pub current_state: JobState,
    #[serde(default)]
    pub transition_history: Vec<StateTransition>,
    pub required_complete: bool,
    pub optional_complete: bool,
}

impl Default for JobStateMachine {
    fn default() -> Self {
        Self {
            current_state: JobState::Draft,
            transition_history: Vec::new(),
            required_complete: false,
            optional_complete: false,
        }
    }
}

impl JobStateMachine {
    /// Moves to `to` and appends a transition record, unless already there.
    pub fn transition(&mut self, to: JobState, at: DateTime<Utc>) {
        if self.current_state == to {
            return;
        }
        self.transition_history.push(StateTransition {
            from: self.current_state,
            to,
            at,
        });
        self.current_state = to;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeniorityLevel {
    Intern,
    Junior,
    Mid,
    Senior,
    Lead,
    Principal,
    Executive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Temporary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkModel {
    OnSite,
    Hybrid,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SalaryFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Editable intake fields (§3 Job). The six `required_fields()` drive
/// `requiredComplete` (§3 invariant, §8 "whitespace-only treated as empty").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobIntake {
    #[serde(default)]
    pub role_title: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seniority_level: Option<SeniorityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment_type: Option<EmploymentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_model: Option<WorkModel>,
    #[serde(default)]
    pub job_description: String,
    #[serde(default)]
    pub core_duties: Vec<String>,
    #[serde(default)]
    pub must_haves: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub salary: SalaryFields,
}

/// A field is "provided" only if it trims to something non-empty (§8 boundary).
pub fn value_provided(value: &str) -> bool {
    !value.trim().is_empty()
}

impl JobIntake {
    /// The 6 required fields gating `requiredComplete` (§3).
    pub fn required_fields_filled(&self) -> bool {
        value_provided(&self.role_title)
            && value_provided(&self.company_name)
            && value_provided(&self.location)
            && self.seniority_level.is_some()
            && self.employment_type.is_some()
            && value_provided(&self.job_description)
    }

    /// Merge non-empty incoming delta fields over `self`, leaving unset fields untouched.
    pub fn merge_delta(&mut self, delta: JobIntakeDelta) {
        if let Some(v) = delta.role_title {
            self.role_title = v;
        }
        if let Some(v) = delta.company_name {
            self.company_name = v;
        }
        if let Some(v) = delta.location {
            self.location = v;
        }
        if let Some(v) = delta.seniority_level {
            self.seniority_level = Some(v);
        }
        if let Some(v) = delta.employment_type {
            self.employment_type = Some(v);
        }
        if let Some(v) = delta.work_model {
            self.work_model = Some(v);
        }
        if let Some(v) = delta.job_description {
            self.job_description = v;
        }
        if let Some(v) = delta.core_duties {
            self.core_duties = v;
        }
        if let Some(v) = delta.must_haves {
            self.must_haves = v;
        }
        if let Some(v) = delta.benefits {
            self.benefits = v;
        }
        if let Some(v) = delta.salary {
            self.salary = v;
        }
    }
}

/// A partial patch to `JobIntake`, as sent by wizard saves and copilot tools.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobIntakeDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seniority_level: Option<SeniorityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment_type: Option<EmploymentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_model: Option<WorkModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_duties: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_haves: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benefits: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<SalaryFields>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub owner_user_id: String,
    #[serde(flatten)]
    pub intake: JobIntake,
    pub state_machine: JobStateMachine,
    #[serde(default)]
    pub archived: bool,
    pub schema_version: String,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, owner_user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            owner_user_id: owner_user_id.into(),
            intake: JobIntake::default(),
            state_machine: JobStateMachine::default(),
            archived: false,
            schema_version: "1".to_string(),
            updated_at: now,
        }
    }

    /// Re-derives `requiredComplete`/`currentState` from the intake snapshot
    /// and stamps `updatedAt` (monotone non-decreasing, §8).
    pub fn recompute_state(&mut self, now: DateTime<Utc>) {
        let required_complete = self.intake.required_fields_filled();
        self.state_machine.required_complete = required_complete;

        let target = match (required_complete, self.state_machine.optional_complete) {
            (false, _) if self.state_machine.current_state == JobState::Draft => JobState::Draft,
            (false, _) => JobState::RequiredInProgress,
            (true, true) => JobState::OptionalComplete,
            (true, false)
                if self.state_machine.current_state == JobState::OptionalInProgress =>
            {
                JobState::OptionalInProgress
            }
            (true, false) => JobState::RequiredComplete,
        };
        self.state_machine.transition(target, now);

        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn whitespace_only_required_field_is_not_provided() {
        let mut intake = JobIntake::default();
        intake.role_title = "   ".to_string();
        assert!(!value_provided(&intake.role_title));
        assert!(!intake.required_fields_filled());
    }

    #[test]
    fn required_complete_iff_all_six_fields_present() {
        let mut job = Job::new("j1", "u1", now());
        job.intake.role_title = "Senior Backend Engineer".to_string();
        job.intake.company_name = "Acme".to_string();
        job.intake.location = "Berlin".to_string();
        job.intake.seniority_level = Some(SeniorityLevel::Senior);
        job.intake.employment_type = Some(EmploymentType::FullTime);
        job.recompute_state(now());
        assert!(!job.state_machine.required_complete);

        job.intake.job_description = "Own our ingestion pipeline.".to_string();
        job.recompute_state(now());
        assert!(job.state_machine.required_complete);
        assert_eq!(job.state_machine.current_state, JobState::RequiredComplete);
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let mut job = Job::new("j1", "u1", now());
        let later = now() + chrono::Duration::hours(1);
        job.recompute_state(later);
        assert_eq!(job.updated_at, later);
        job.recompute_state(now());
        assert_eq!(job.updated_at, later);
    }
}
