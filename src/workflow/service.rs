use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tokio::task::JoinHandle;

use super::{
    CancelHandle, CancelToken, IssueKind, Orchestrator, RunState, StageIssue, WorkerPool,
    WorkflowRun, cancel_pair, validate,
};
use crate::{
    error::{Error, Result},
    report::{ReportAssembler, ReportEvaluation},
    value::{PatientRecord, ReportType},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub patient: PatientRecord,
    pub report_type: ReportType,
}

impl ReportRequest {
    pub fn new(patient: PatientRecord, report_type: ReportType) -> Self {
        Self {
            patient,
            report_type,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Partial,
    Failed,
}

impl From<RunState> for ResponseStatus {
    fn from(state: RunState) -> Self {
        match state {
            RunState::Completed => ResponseStatus::Ok,
            RunState::PartialFailure => ResponseStatus::Partial,
            _ => ResponseStatus::Failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub run_id: String,
    pub report_type: ReportType,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    pub issues: Vec<StageIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<ReportEvaluation>,
}

impl ReportResponse {
    fn failed(run_id: String, report_type: ReportType, issues: Vec<StageIssue>) -> Self {
        Self {
            run_id,
            report_type,
            status: ResponseStatus::Failed,
            report: None,
            issues,
            evaluation: None,
        }
    }
}

/// A report run executing in the background.
pub struct RunHandle {
    run_id: String,
    report_type: ReportType,
    cancel: CancelHandle,
    join: JoinHandle<ReportResponse>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Requests cancellation. The run stops at its next transition and any
    /// in-flight generation result is discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> ReportResponse {
        match self.join.await {
            Ok(response) => response,
            Err(e) => {
                log::error!("run {} task failed: {}", self.run_id, e);
                ReportResponse::failed(
                    self.run_id,
                    self.report_type,
                    vec![StageIssue::new(None, IssueKind::Internal, e.to_string())],
                )
            }
        }
    }
}

/// Inbound interface: validates requests, bounds concurrent runs, drives the
/// orchestrator and assembles the result.
#[derive(Clone, Debug)]
pub struct ReportService {
    orchestrator: Arc<Orchestrator>,
    assembler: Arc<ReportAssembler>,
    pool: WorkerPool,
}

impl ReportService {
    pub fn new(orchestrator: Orchestrator, assembler: ReportAssembler) -> Self {
        let pool = WorkerPool::new(orchestrator.config().max_concurrent_runs);
        Self {
            orchestrator: Arc::new(orchestrator),
            assembler: Arc::new(assembler),
            pool,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    fn prepare(&self, request: ReportRequest) -> Result<WorkflowRun> {
        validate(&request.patient, request.report_type)?;
        Ok(WorkflowRun::new(request.report_type, Arc::new(request.patient)))
    }

    /// Runs one report to completion.
    ///
    /// Only a rejected patient record is an `Err`; every other problem is
    /// reported through the response status and issues.
    pub async fn submit(&self, request: ReportRequest) -> Result<ReportResponse> {
        let run = self.prepare(request)?;
        Ok(self.execute(run, CancelToken::never()).await)
    }

    /// Starts a report in the background and returns a cancellable handle.
    pub fn spawn(&self, request: ReportRequest) -> Result<RunHandle> {
        let run = self.prepare(request)?;
        let run_id = run.id().to_owned();
        let report_type = run.report_type();
        let (cancel, token) = cancel_pair();
        let service = self.clone();
        let join = tokio::spawn(async move { service.execute(run, token).await });
        Ok(RunHandle {
            run_id,
            report_type,
            cancel,
            join,
        })
    }

    /// Submits every request concurrently; the worker pool bounds how many run
    /// at once. Results keep the request order.
    pub async fn submit_batch(&self, requests: Vec<ReportRequest>) -> Vec<Result<ReportResponse>> {
        join_all(requests.into_iter().map(|request| self.submit(request))).await
    }

    async fn execute(&self, mut run: WorkflowRun, cancel: CancelToken) -> ReportResponse {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            permit = self.pool.acquire() => permit,
        };
        let _permit = match permit {
            Ok(permit) => permit,
            Err(e) => {
                log::warn!("run {} not started: {}", run.id(), e);
                return ReportResponse::failed(
                    run.id().to_owned(),
                    run.report_type(),
                    vec![StageIssue::from_error(None, &e)],
                );
            }
        };

        if let Err(e) = self.orchestrator.execute(&mut run, &cancel).await {
            log::error!("run {}: {}", run.id(), e);
            let issue = StageIssue::from_error(run.next_stage(), &e);
            if run.fail(issue.clone()).is_err() {
                let mut issues = run.issues();
                issues.push(issue);
                return ReportResponse::failed(run.id().to_owned(), run.report_type(), issues);
            }
        }
        self.respond(&run)
    }

    fn respond(&self, run: &WorkflowRun) -> ReportResponse {
        let status = ResponseStatus::from(run.state());
        if status == ResponseStatus::Failed {
            return ReportResponse::failed(run.id().to_owned(), run.report_type(), run.issues());
        }
        match self.assembler.assemble(run) {
            Ok(report) => {
                let evaluation = ReportEvaluation::evaluate(&report, run.report_type());
                log::info!(
                    "run {}: {} report assembled ({:.0}% complete)",
                    run.id(),
                    status,
                    evaluation.completeness
                );
                ReportResponse {
                    run_id: run.id().to_owned(),
                    report_type: run.report_type(),
                    status,
                    report: Some(report),
                    issues: run.issues(),
                    evaluation: Some(evaluation),
                }
            }
            Err(e) => {
                log::error!("run {}: assembly failed: {}", run.id(), e);
                let mut issues = run.issues();
                issues.push(StageIssue::from_error(None, &e));
                ReportResponse::failed(run.id().to_owned(), run.report_type(), issues)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use crate::{
        boxed,
        config::OrchestratorConfig,
        knowledge::KnowledgeBase,
        model::{EmbeddingModel, GenerationRequest, LangModel},
        report::DISCLAIMER_MARKER,
        utils::test::{
            ScriptedLangModel, chest_pain_patient, complete_reply, fast_knowledge_config,
            fast_orchestrator_config, hypertension_knowledge, init_logger, orchestrator,
            stage_of_prompt,
        },
        value::{Embedding, Stage, fields},
    };

    async fn service(lm: LangModel) -> ReportService {
        service_with(lm, fast_orchestrator_config()).await
    }

    async fn service_with(lm: LangModel, config: OrchestratorConfig) -> ReportService {
        let kb = hypertension_knowledge().await;
        ReportService::new(orchestrator(kb, lm, config), ReportAssembler::new().unwrap())
    }

    fn chest_pain() -> ReportRequest {
        ReportRequest::new(chest_pain_patient(), ReportType::PreliminaryDiagnosis)
    }

    #[tokio::test]
    async fn chest_pain_preliminary_report_is_ok() {
        init_logger();
        let lm = ScriptedLangModel::new();
        let response = service(lm.model()).await.submit(chest_pain()).await.unwrap();

        assert_eq!(response.status, ResponseStatus::Ok);
        assert!(response.issues.is_empty());
        let report = response.report.unwrap();
        assert_eq!(report.matches("\n## ").count(), 3);
        assert!(report.contains("## Symptom Analysis"));
        assert!(report.contains("**Flags**: possible hypertensive crisis"));
        assert!(report.contains("**Diagnosis**: Stage 2 Hypertension, rule out crisis"));
        assert!(!report.contains(DISCLAIMER_MARKER));
        assert_eq!(response.evaluation.unwrap().completeness, 100.0);
        let diagnosis_prompt = lm.prompt(Stage::DiagnosisAdvisor).unwrap();
        assert!(diagnosis_prompt.contains("<document source=\"guideline/hypertension\">"));
        assert!(diagnosis_prompt.contains("Flags: possible hypertensive crisis"));
        assert_eq!(
            lm.calls(),
            [
                Stage::SymptomAnalyzer,
                Stage::DiagnosisAdvisor,
                Stage::TreatmentRecommender
            ]
        );
    }

    #[tokio::test]
    async fn malformed_diagnosis_twice_is_partial() {
        init_logger();
        let lm = ScriptedLangModel::new()
            .reply(Stage::DiagnosisAdvisor, "I am not sure what this is.")
            .reply(Stage::DiagnosisAdvisor, "More tests are needed");
        let response = service(lm.model()).await.submit(chest_pain()).await.unwrap();

        assert_eq!(response.status, ResponseStatus::Partial);
        assert_eq!(response.issues.len(), 1);
        let issue = &response.issues[0];
        assert_eq!(issue.stage, Some(Stage::DiagnosisAdvisor));
        assert_eq!(issue.kind, IssueKind::LowConfidence);
        assert!(issue.message.contains("missing diagnosis"));

        let report = response.report.unwrap();
        assert!(report.contains("**Diagnosis**: Not documented"));
        assert!(report.contains(DISCLAIMER_MARKER));
        assert!(report.contains("before use: Diagnosis."));
        assert_eq!(
            lm.calls(),
            [
                Stage::SymptomAnalyzer,
                Stage::DiagnosisAdvisor,
                Stage::DiagnosisAdvisor,
                Stage::TreatmentRecommender
            ]
        );
    }

    #[tokio::test]
    async fn low_confidence_recovers_on_retry() {
        let lm = ScriptedLangModel::new().reply(Stage::SymptomAnalyzer, "Findings: unclear");
        let response = service(lm.model()).await.submit(chest_pain()).await.unwrap();
        assert_eq!(response.status, ResponseStatus::Ok);
        assert!(response.issues.is_empty());
        assert_eq!(lm.calls().len(), 4);
    }

    #[tokio::test]
    async fn generation_outage_fails_after_retries() {
        init_logger();
        let lm = ScriptedLangModel::new()
            .fail(Stage::SymptomAnalyzer, "connection refused")
            .fail(Stage::SymptomAnalyzer, "connection refused")
            .fail(Stage::SymptomAnalyzer, "connection refused");
        let response = service(lm.model()).await.submit(chest_pain()).await.unwrap();

        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.report, None);
        assert_eq!(response.evaluation, None);
        assert_eq!(response.issues.len(), 1);
        assert_eq!(response.issues[0].kind, IssueKind::GenerationUnavailable);
        assert_eq!(response.issues[0].stage, Some(Stage::SymptomAnalyzer));
        assert_eq!(lm.calls().len(), 3);
    }

    #[tokio::test]
    async fn transient_generation_failure_is_retried() {
        let lm = ScriptedLangModel::new().fail(Stage::TreatmentRecommender, "503");
        let response = service(lm.model()).await.submit(chest_pain()).await.unwrap();
        assert_eq!(response.status, ResponseStatus::Ok);
        assert_eq!(lm.calls().len(), 4);
    }

    #[tokio::test]
    async fn index_outage_fails_the_run() {
        init_logger();
        let embedding_model = EmbeddingModel::new_custom(
            64,
            Arc::new(|_text: String| {
                boxed!(async { Err::<Embedding, _>(anyhow::anyhow!("index offline")) })
            }),
        );
        let kb = Arc::new(KnowledgeBase::new(fast_knowledge_config(), embedding_model));
        let lm = ScriptedLangModel::new();
        let service = ReportService::new(
            orchestrator(kb, lm.model(), fast_orchestrator_config()),
            ReportAssembler::new().unwrap(),
        );
        let response = service.submit(chest_pain()).await.unwrap();

        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.issues[0].kind, IssueKind::IndexUnavailable);
        assert!(lm.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_patient_is_rejected_before_any_run() {
        let lm = ScriptedLangModel::new();
        let service = service(lm.model()).await;
        let err = service
            .submit(ReportRequest::new(PatientRecord::new(), ReportType::AdmissionRecord))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref v) if v.len() == 4));
        assert!(service.spawn(ReportRequest::new(PatientRecord::new(), ReportType::OperativeNote)).is_err());
        assert!(lm.calls().is_empty());
    }

    #[tokio::test]
    async fn operative_note_runs_its_own_stage_list() {
        let patient = PatientRecord::new()
            .with_field(fields::OPERATION_NAME, "laparoscopic appendectomy")
            .with_field(fields::OPERATION_DATE, "2025-03-14")
            .with_field(fields::SURGEON, "Dr. Kim")
            .with_field(fields::ANESTHESIA, "general");
        let lm = ScriptedLangModel::new();
        let response = service(lm.model())
            .await
            .submit(ReportRequest::new(patient, ReportType::OperativeNote))
            .await
            .unwrap();
        assert_eq!(response.status, ResponseStatus::Ok);
        let report = response.report.unwrap();
        let diagnosis = report.find("## Diagnosis").unwrap();
        let record = report.find("## Operation Record").unwrap();
        let treatment = report.find("## Treatment Plan").unwrap();
        assert!(diagnosis < record && record < treatment);
        assert!(report.contains("**Surgeon**: Dr. Kim"));
    }

    #[tokio::test]
    async fn cancelled_run_discards_in_flight_generation() {
        init_logger();
        let started = Arc::new(Notify::new());
        let lm = LangModel::new_custom(Arc::new({
            let started = started.clone();
            move |req: GenerationRequest| {
                let started = started.clone();
                boxed!(async move {
                    let stage = stage_of_prompt(&req.prompt).unwrap();
                    if stage == Stage::DiagnosisAdvisor {
                        started.notify_one();
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    }
                    anyhow::Ok(complete_reply(stage, ReportType::PreliminaryDiagnosis))
                })
            }
        }));
        let handle = service(lm).await.spawn(chest_pain()).unwrap();
        assert!(!handle.run_id().is_empty());
        started.notified().await;
        handle.cancel();
        let response = tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .unwrap();

        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.issues.len(), 1);
        assert_eq!(response.issues[0].kind, IssueKind::Cancelled);
        assert_eq!(response.issues[0].stage, Some(Stage::DiagnosisAdvisor));
    }

    #[tokio::test]
    async fn batch_keeps_request_order_with_one_worker() {
        let lm = ScriptedLangModel::new();
        let config = OrchestratorConfig {
            max_concurrent_runs: 1,
            ..fast_orchestrator_config()
        };
        let service = service_with(lm.model(), config).await;
        let results = service
            .submit_batch(vec![
                chest_pain(),
                ReportRequest::new(PatientRecord::new(), ReportType::PreliminaryDiagnosis),
                chest_pain(),
            ])
            .await;

        assert_eq!(results.len(), 3);
        let first = results[0].as_ref().unwrap();
        let third = results[2].as_ref().unwrap();
        assert!(results[1].is_err());
        assert_eq!(first.status, ResponseStatus::Ok);
        assert_eq!(third.status, ResponseStatus::Ok);
        assert_ne!(first.run_id, third.run_id);
        assert_eq!(service.pool().available(), 1);
    }

    #[test]
    fn response_serializes_status_in_lowercase() {
        let response = ReportResponse::failed(
            "run-1".into(),
            ReportType::OperativeNote,
            vec![StageIssue::new(None, IssueKind::Cancelled, "run cancelled")],
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reportType"], "operative_note");
        assert_eq!(json["issues"][0]["kind"], "cancelled");
        assert!(json.get("report").is_none());
    }
}
