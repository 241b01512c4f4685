use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::{
    value::PatientRecord,
    workflow::{ReportRequest, ReportResponse, ResponseStatus},
};

/// One instruction-tuning example derived from a finished report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub instruction: String,
    pub input: String,
    pub output: String,
}

impl TrainingExample {
    /// Only fully successful reports are worth learning from; partial and
    /// failed responses yield `None`.
    pub fn from_response(request: &ReportRequest, response: &ReportResponse) -> Option<Self> {
        if response.status != ResponseStatus::Ok || response.report_type != request.report_type {
            return None;
        }
        let report = response.report.as_ref()?;
        Some(Self {
            instruction: format!(
                "Write a {} for the patient described below.",
                request.report_type.title()
            ),
            input: patient_input(&request.patient),
            output: report.clone(),
        })
    }
}

fn patient_input(patient: &PatientRecord) -> String {
    let vitals = patient.vitals();
    if vitals.is_empty() {
        patient.summary()
    } else {
        format!("{}\nvital signs: {}", patient.summary(), vitals.describe())
    }
}

pub fn to_jsonl(examples: &[TrainingExample]) -> anyhow::Result<String> {
    let mut out = String::new();
    for example in examples {
        out.push_str(&serde_json::to_string(example)?);
        out.push('\n');
    }
    Ok(out)
}

/// Writes one JSON object per line, replacing the file.
pub async fn write_jsonl(path: impl AsRef<Path>, examples: &[TrainingExample]) -> anyhow::Result<()> {
    let path = path.as_ref();
    let content = to_jsonl(examples)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("tokio::fs::write {} failed", path.display()))?;
    log::info!("wrote {} training examples to {}", examples.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        boxed,
        model::{AdapterHandle, AdapterTrainer as _, CustomFitFunc},
        value::{ReportType, fields},
    };

    fn request() -> ReportRequest {
        ReportRequest::new(
            PatientRecord::new()
                .with_field(fields::CHIEF_COMPLAINT, "cough")
                .with_field(fields::TEMPERATURE, 38.5),
            ReportType::PreliminaryDiagnosis,
        )
    }

    fn response(status: ResponseStatus) -> ReportResponse {
        ReportResponse {
            run_id: "run-1".into(),
            report_type: ReportType::PreliminaryDiagnosis,
            status,
            report: Some("# Preliminary Diagnosis Report".into()),
            issues: vec![],
            evaluation: None,
        }
    }

    #[test]
    fn only_ok_responses_become_examples() {
        let example = TrainingExample::from_response(&request(), &response(ResponseStatus::Ok)).unwrap();
        assert_eq!(
            example.instruction,
            "Write a Preliminary Diagnosis Report for the patient described below."
        );
        assert_eq!(example.input, "chief_complaint: cough\nvital signs: T 38.5 °C");
        assert_eq!(example.output, "# Preliminary Diagnosis Report");
        assert!(TrainingExample::from_response(&request(), &response(ResponseStatus::Partial)).is_none());
    }

    #[tokio::test]
    async fn writes_one_example_per_line() {
        let example = TrainingExample::from_response(&request(), &response(ResponseStatus::Ok)).unwrap();
        let path = std::env::temp_dir().join(format!("medreport-train-{}.jsonl", uuid::Uuid::new_v4()));
        write_jsonl(&path, &[example.clone(), example.clone()]).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(serde_json::from_str::<TrainingExample>(lines[1]).unwrap(), example);
    }

    #[tokio::test]
    async fn custom_trainer_rejects_empty_batches() {
        let trainer: Arc<CustomFitFunc> = Arc::new(|examples: Vec<TrainingExample>| {
            boxed!(async move {
                anyhow::Ok(AdapterHandle {
                    id: "adapter-1".into(),
                    base_model: "clinical-base".into(),
                    num_examples: examples.len(),
                })
            })
        });
        assert!(trainer.fit(vec![]).await.is_err());
        let example = TrainingExample::from_response(&request(), &response(ResponseStatus::Ok)).unwrap();
        assert_eq!(trainer.fit(vec![example]).await.unwrap().num_examples, 1);
    }
}
