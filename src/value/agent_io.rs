use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{PatientRecord, ReportType, RetrievalResult, Stage};

/// Field keys produced by the stage agents.
pub mod slots {
    pub const FINDINGS: &str = "findings";
    pub const RISK_LEVEL: &str = "risk_level";
    pub const FLAGS: &str = "flags";

    pub const DIAGNOSIS: &str = "diagnosis";
    pub const DIFFERENTIAL: &str = "differential";
    pub const RATIONALE: &str = "rationale";

    pub const PLAN: &str = "plan";
    pub const MEDICATIONS: &str = "medications";
    pub const FOLLOW_UP: &str = "follow_up";
    pub const PRECAUTIONS: &str = "precautions";

    pub const SUMMARY: &str = "summary";
    pub const PRESENT_ILLNESS: &str = "present_illness";
    pub const PHYSICAL_EXAM: &str = "physical_exam";
    pub const AUXILIARY_EXAM: &str = "auxiliary_exam";
    pub const PREOPERATIVE_DIAGNOSIS: &str = "preoperative_diagnosis";
    pub const OPERATION_PROCESS: &str = "operation_process";
    pub const OPERATION_RESULT: &str = "operation_result";
    pub const POSTOPERATIVE_DIAGNOSIS: &str = "postoperative_diagnosis";
}

/// Everything an agent sees for one stage invocation.
#[derive(Clone, Debug)]
pub struct AgentInput {
    pub report_type: ReportType,
    pub patient: Arc<PatientRecord>,
    pub context: RetrievalResult,
    /// Outputs of earlier stages, in stage order.
    pub upstream: Vec<AgentOutput>,
}

impl AgentInput {
    pub fn upstream_output(&self, stage: Stage) -> Option<&AgentOutput> {
        self.upstream.iter().find(|o| o.stage == stage)
    }

    pub fn upstream_field(&self, stage: Stage, key: &str) -> Option<&str> {
        self.upstream_output(stage).and_then(|o| o.field(key))
    }
}

/// Typed partial result produced by one stage's agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub stage: Stage,
    /// Raw generation text the fields were parsed from.
    pub text: String,
    pub fields: IndexMap<String, String>,
    /// In `[0, 1]`; below the configured threshold the output is unreliable.
    pub confidence: f32,
    /// Required fields the parser could not extract.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    /// Number of invocations it took to produce this output.
    pub attempts: u32,
}

impl AgentOutput {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn is_malformed(&self) -> bool {
        !self.missing_fields.is_empty()
    }
}
