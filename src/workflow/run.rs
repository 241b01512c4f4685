use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::{
    error::{Error, Result},
    value::{AgentOutput, PatientRecord, ReportType, Stage},
};

/// Lifecycle of a [`WorkflowRun`].
///
/// `Running(i)` means stage `i` of the report type's stage list is next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running(usize),
    Completed,
    PartialFailure,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::PartialFailure | RunState::Failed
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueKind {
    LowConfidence,
    GenerationUnavailable,
    IndexUnavailable,
    Cancelled,
    Internal,
}

/// A human-readable problem attached to a run, optionally tied to a stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub kind: IssueKind,
    pub message: String,
}

impl StageIssue {
    pub fn new(stage: Option<Stage>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    /// Maps an error raised while working on `stage` to an issue.
    pub fn from_error(stage: Option<Stage>, error: &Error) -> Self {
        let kind = match error {
            Error::GenerationUnavailable { .. } => IssueKind::GenerationUnavailable,
            Error::IndexUnavailable(_) => IssueKind::IndexUnavailable,
            Error::Cancelled => IssueKind::Cancelled,
            _ => IssueKind::Internal,
        };
        Self::new(stage, kind, error.to_string())
    }
}

impl std::fmt::Display for StageIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "[{}] {}: {}", self.kind, stage, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// One execution of the stage list of a report type for one patient.
///
/// Outputs are append-only and always follow the stage list. Once a terminal
/// state is reached the run rejects every further mutation.
#[derive(Clone, Debug)]
pub struct WorkflowRun {
    id: String,
    report_type: ReportType,
    patient: Arc<PatientRecord>,
    outputs: Vec<AgentOutput>,
    state: RunState,
    flags: Vec<StageIssue>,
    failure: Option<StageIssue>,
}

impl WorkflowRun {
    pub fn new(report_type: ReportType, patient: Arc<PatientRecord>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            report_type,
            patient,
            outputs: Vec::new(),
            state: RunState::Pending,
            flags: Vec::new(),
            failure: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn report_type(&self) -> ReportType {
        self.report_type
    }

    pub fn patient(&self) -> &Arc<PatientRecord> {
        &self.patient
    }

    pub fn outputs(&self) -> &[AgentOutput] {
        &self.outputs
    }

    pub fn output(&self, stage: Stage) -> Option<&AgentOutput> {
        self.outputs.iter().find(|o| o.stage == stage)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Stages flagged as unreliable, in the order they were flagged.
    pub fn flags(&self) -> &[StageIssue] {
        &self.flags
    }

    pub fn is_flagged(&self, stage: Stage) -> bool {
        self.flags.iter().any(|f| f.stage == Some(stage))
    }

    pub fn failure(&self) -> Option<&StageIssue> {
        self.failure.as_ref()
    }

    /// Flags followed by the failure, if any.
    pub fn issues(&self) -> Vec<StageIssue> {
        self.flags.iter().chain(self.failure.iter()).cloned().collect()
    }

    /// The stage the run is waiting on, if it is running.
    pub fn next_stage(&self) -> Option<Stage> {
        match self.state {
            RunState::Running(i) => self.report_type.stages().get(i).copied(),
            _ => None,
        }
    }

    fn guard(&self, action: &str) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::InvalidTransition(format!(
                "cannot {} run {} in state {:?}",
                action, self.id, self.state
            )));
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state != RunState::Pending {
            return Err(Error::InvalidTransition(format!(
                "run {} already started ({:?})",
                self.id, self.state
            )));
        }
        self.state = RunState::Running(0);
        Ok(())
    }

    /// Appends the output of the next required stage.
    pub fn append(&mut self, output: AgentOutput) -> Result<()> {
        self.guard("append to")?;
        let RunState::Running(i) = self.state else {
            return Err(Error::InvalidTransition(format!(
                "run {} is not running",
                self.id
            )));
        };
        let stages = self.report_type.stages();
        match stages.get(i) {
            Some(expected) if *expected == output.stage && self.outputs.len() == i => {}
            expected => {
                return Err(Error::InvalidTransition(format!(
                    "run {} expects {:?}, got {}",
                    self.id, expected, output.stage
                )));
            }
        }
        self.outputs.push(output);
        self.state = RunState::Running(i + 1);
        Ok(())
    }

    pub fn flag(&mut self, issue: StageIssue) -> Result<()> {
        self.guard("flag")?;
        self.flags.push(issue);
        Ok(())
    }

    /// Ends a run whose every stage produced an output.
    pub fn finish(&mut self) -> Result<RunState> {
        self.guard("finish")?;
        if self.outputs.len() != self.report_type.stages().len() {
            return Err(Error::InvalidTransition(format!(
                "run {} has {} of {} stage outputs",
                self.id,
                self.outputs.len(),
                self.report_type.stages().len()
            )));
        }
        self.state = if self.flags.is_empty() {
            RunState::Completed
        } else {
            RunState::PartialFailure
        };
        Ok(self.state)
    }

    pub fn fail(&mut self, issue: StageIssue) -> Result<()> {
        self.guard("fail")?;
        self.failure = Some(issue);
        self.state = RunState::Failed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn output(stage: Stage) -> AgentOutput {
        AgentOutput {
            stage,
            text: String::new(),
            fields: IndexMap::new(),
            confidence: 1.0,
            missing_fields: vec![],
            attempts: 1,
        }
    }

    fn run() -> WorkflowRun {
        WorkflowRun::new(ReportType::OperativeNote, Arc::new(PatientRecord::new()))
    }

    #[test]
    fn appends_in_stage_order_then_completes() {
        let mut run = run();
        run.start().unwrap();
        for stage in ReportType::OperativeNote.stages() {
            assert_eq!(run.next_stage(), Some(*stage));
            run.append(output(*stage)).unwrap();
        }
        assert_eq!(run.next_stage(), None);
        assert_eq!(run.finish().unwrap(), RunState::Completed);
        let stages = run.outputs().iter().map(|o| o.stage).collect::<Vec<_>>();
        assert_eq!(stages, ReportType::OperativeNote.stages());
    }

    #[test]
    fn rejects_out_of_order_and_duplicate_stages() {
        let mut run = run();
        assert!(run.append(output(Stage::DiagnosisAdvisor)).is_err());
        run.start().unwrap();
        assert!(run.append(output(Stage::ReportComposer)).is_err());
        run.append(output(Stage::DiagnosisAdvisor)).unwrap();
        assert!(matches!(
            run.append(output(Stage::DiagnosisAdvisor)),
            Err(Error::InvalidTransition(_))
        ));
        assert_eq!(run.outputs().len(), 1);
    }

    #[test]
    fn flagged_run_ends_partial() {
        let mut run = run();
        run.start().unwrap();
        for stage in ReportType::OperativeNote.stages() {
            if *stage == Stage::ReportComposer {
                run.flag(StageIssue::new(Some(*stage), IssueKind::LowConfidence, "low"))
                    .unwrap();
            }
            run.append(output(*stage)).unwrap();
        }
        assert_eq!(run.finish().unwrap(), RunState::PartialFailure);
        assert!(run.is_flagged(Stage::ReportComposer));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut run = run();
        run.start().unwrap();
        run.fail(StageIssue::new(None, IssueKind::Cancelled, "cancelled"))
            .unwrap();
        assert_eq!(run.state(), RunState::Failed);
        assert!(run.append(output(Stage::DiagnosisAdvisor)).is_err());
        assert!(run.finish().is_err());
        assert!(run.fail(StageIssue::new(None, IssueKind::Internal, "again")).is_err());
        assert!(run.start().is_err());
        assert_eq!(run.issues().len(), 1);
    }

    #[test]
    fn cannot_finish_early() {
        let mut run = run();
        run.start().unwrap();
        run.append(output(Stage::DiagnosisAdvisor)).unwrap();
        assert!(run.finish().is_err());
        assert_eq!(run.state(), RunState::Running(1));
    }
}
