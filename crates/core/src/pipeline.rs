use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use secrecy::SecretString;
use tracing::info;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::budget::BudgetAdvisor;
use crate::completion::CompletionService;
use crate::config::AppConfig;
use crate::domain::state::{PipelineState, StateUpdate};
use crate::errors::{PipelineError, StageError, StageName};
use crate::financials::{FileRecordSource, FinancialRecordSource};
use crate::notify::NotificationDispatcher;
use crate::search::{
    CyclePacer, HostBlocklist, ProductSearchLoop, SearchRequest, SearchSettings, TokioPacer,
};
use crate::timeframe::cycles_until;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineRequest {
    pub product: String,
    pub timeframe: String,
    pub financials_path: Option<String>,
    /// Day the search window starts counting from.
    pub started_on: NaiveDate,
    pub contact: Option<String>,
    pub prefer_email: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PipelineSettings {
    pub budget_model: Option<String>,
    pub search: SearchSettings,
    pub blocklist: HostBlocklist,
    /// Secret the orchestrator presents when authorizing its own notification.
    pub notify_secret: Option<SecretString>,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            budget_model: Some(config.llm.model.clone()),
            search: SearchSettings {
                model: Some(config.llm.search_model.clone()),
                cycle_interval: Duration::from_secs(config.search.cycle_interval_secs),
                max_tokens: config.search.max_tokens,
                temperature: config.search.temperature,
            },
            blocklist: HostBlocklist::new(&config.search.blocked_hosts),
            notify_secret: config.notify.shared_secret.clone(),
        }
    }
}

/// Runs budget, search and notification over one accumulating state.
pub struct PipelineOrchestrator {
    completions: Arc<dyn CompletionService>,
    records: Arc<dyn FinancialRecordSource>,
    pacer: Arc<dyn CyclePacer>,
    dispatcher: NotificationDispatcher,
    audit: Arc<dyn AuditSink>,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        completions: Arc<dyn CompletionService>,
        dispatcher: NotificationDispatcher,
        audit: Arc<dyn AuditSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            completions,
            records: Arc::new(FileRecordSource),
            pacer: Arc::new(TokioPacer),
            dispatcher,
            audit,
            settings,
        }
    }

    pub fn with_records(mut self, records: Arc<dyn FinancialRecordSource>) -> Self {
        self.records = records;
        self
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn CyclePacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub async fn run(
        &self,
        request: &PipelineRequest,
        context: &AuditContext,
    ) -> Result<PipelineState, PipelineError> {
        let state = PipelineState::new(
            request.product.trim(),
            request.timeframe.trim(),
            request.financials_path.clone(),
        );

        self.stage_started(context, StageName::Preflight);
        state
            .validate_intake()
            .map_err(|source| PipelineError::State { stage: StageName::Preflight, source })
            .map_err(|error| self.stage_failed(context, error))?;
        if !self.completions.has_credential() {
            let error = PipelineError::stage(
                StageName::Preflight,
                StageError::Configuration(
                    "no completion service credential is configured".to_owned(),
                ),
            );
            return Err(self.stage_failed(context, error));
        }
        self.stage_completed(context, StageName::Preflight, Vec::new());

        self.stage_started(context, StageName::BudgetAdvisor);
        let budget = self.suggest_budget(&state).await.map_err(|source| {
            self.stage_failed(context, PipelineError::stage(StageName::BudgetAdvisor, source))
        })?;
        let state =
            self.merge(context, StageName::BudgetAdvisor, state, StateUpdate::budget(budget))?;
        self.stage_completed(
            context,
            StageName::BudgetAdvisor,
            vec![("suggested_budget", budget.to_string())],
        );

        self.stage_started(context, StageName::ProductSearch);
        let search_request = SearchRequest {
            product_name: state.product.clone(),
            price_cap: budget,
            max_cycles: cycles_until(&state.timeframe, request.started_on),
        };
        let mut search = ProductSearchLoop::new(
            Arc::clone(&self.completions),
            Arc::clone(&self.pacer),
            self.settings.blocklist.clone(),
            self.settings.search.clone(),
        );
        let outcome = search.run(&search_request).await;
        let result_label = outcome.result.label();
        let state = self.merge(
            context,
            StageName::ProductSearch,
            state,
            StateUpdate::search(outcome.result),
        )?;
        self.stage_completed(
            context,
            StageName::ProductSearch,
            vec![
                ("result", result_label.to_owned()),
                ("attempts", outcome.attempts.to_string()),
                ("max_cycles", search_request.max_cycles.to_string()),
            ],
        );

        self.stage_started(context, StageName::Notification);
        let sent = self
            .dispatcher
            .notify_state(
                &state,
                request.contact.clone(),
                self.settings.notify_secret.clone(),
                request.prefer_email,
            )
            .await;
        let state =
            self.merge(context, StageName::Notification, state, StateUpdate::notification(sent))?;
        self.stage_completed(
            context,
            StageName::Notification,
            vec![("notification_sent", sent.to_string())],
        );

        info!(
            event_name = "pipeline.completed",
            correlation_id = %context.correlation_id,
            product = %state.product,
            notification_sent = sent,
            "pipeline run completed"
        );
        Ok(state)
    }

    async fn suggest_budget(&self, state: &PipelineState) -> Result<Decimal, StageError> {
        let records = match state.financials_path.as_deref() {
            Some(path) => self.records.load(Path::new(path))?,
            None => Vec::new(),
        };
        let mut advisor = BudgetAdvisor::new(Arc::clone(&self.completions));
        if let Some(model) = &self.settings.budget_model {
            advisor = advisor.with_model(model.clone());
        }
        advisor.suggest_budget(&state.product, &state.timeframe, &records).await
    }

    fn merge(
        &self,
        context: &AuditContext,
        stage: StageName,
        state: PipelineState,
        update: StateUpdate,
    ) -> Result<PipelineState, PipelineError> {
        state
            .merge(update)
            .map_err(|source| self.stage_failed(context, PipelineError::State { stage, source }))
    }

    fn stage_started(&self, context: &AuditContext, stage: StageName) {
        let event = AuditEvent::new(
            context,
            "pipeline.stage_started",
            category(stage),
            AuditOutcome::Success,
        );
        self.audit.emit(event.with_metadata("stage", stage.as_str()));
    }

    fn stage_completed(
        &self,
        context: &AuditContext,
        stage: StageName,
        metadata: Vec<(&'static str, String)>,
    ) {
        let event = metadata.into_iter().fold(
            AuditEvent::new(
                context,
                "pipeline.stage_completed",
                category(stage),
                AuditOutcome::Success,
            )
            .with_metadata("stage", stage.as_str()),
            |event, (key, value)| event.with_metadata(key, value),
        );
        self.audit.emit(event);
    }

    /// Records the failure and hands the error back for propagation.
    fn stage_failed(&self, context: &AuditContext, error: PipelineError) -> PipelineError {
        let stage = error.stage_name();
        let event =
            AuditEvent::new(context, "pipeline.stage_failed", category(stage), AuditOutcome::Failed);
        self.audit.emit(
            event
                .with_metadata("stage", stage.as_str())
                .with_metadata("error_class", error.error_class())
                .with_metadata("detail", error.to_string()),
        );
        error
    }
}

fn category(stage: StageName) -> AuditCategory {
    match stage {
        StageName::Preflight => AuditCategory::Intake,
        StageName::BudgetAdvisor => AuditCategory::Budget,
        StageName::ProductSearch => AuditCategory::Search,
        StageName::Notification => AuditCategory::Notification,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use serde_json::json;

    use super::{PipelineOrchestrator, PipelineRequest, PipelineSettings};
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::completion::{Completion, ScriptedCompletionService};
    use crate::domain::search::SearchResult;
    use crate::domain::state::PipelineState;
    use crate::errors::{ErrorKind, PipelineError, StageError, StageName};
    use crate::notify::{MemoryOutlet, NotificationDispatcher};
    use crate::search::RecordingPacer;

    struct Harness {
        service: ScriptedCompletionService,
        outlet: MemoryOutlet,
        audit: InMemoryAuditSink,
        pacer: RecordingPacer,
        orchestrator: PipelineOrchestrator,
    }

    fn harness(service: ScriptedCompletionService) -> Harness {
        let outlet = MemoryOutlet::default();
        let audit = InMemoryAuditSink::default();
        let pacer = RecordingPacer::default();
        let secret = Some(SecretString::from("s3cret".to_owned()));
        let settings =
            PipelineSettings { notify_secret: secret.clone(), ..PipelineSettings::default() };
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(service.clone()),
            NotificationDispatcher::new(secret, Arc::new(outlet.clone())),
            Arc::new(audit.clone()),
            settings,
        )
        .with_pacer(Arc::new(pacer.clone()));
        Harness { service, outlet, audit, pacer, orchestrator }
    }

    fn request(timeframe: &str, financials_path: Option<&str>) -> PipelineRequest {
        PipelineRequest {
            product: "iPhone 15".to_owned(),
            timeframe: timeframe.to_owned(),
            financials_path: financials_path.map(str::to_owned),
            started_on: NaiveDate::from_ymd_opt(2025, 7, 1).expect("valid date"),
            contact: None,
            prefer_email: true,
        }
    }

    fn stage_failure(result: Result<PipelineState, PipelineError>) -> (StageName, ErrorKind) {
        match result {
            Err(PipelineError::Stage { stage, source }) => (stage, source.kind()),
            other => panic!("expected stage failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_run_threads_state_through_every_stage() {
        let h = harness(ScriptedCompletionService::new(vec![
            Ok(Completion::text("800")),
            Ok(Completion::text("$950")),
            Ok(Completion::invocation(
                "call_1",
                "record_product_found",
                r#"{"product_name":"iPhone 15 128GB","price":749.0,"url":"https://www.apple.com/shop/buy-iphone"}"#,
            )),
        ]));
        let context = AuditContext::new("run-1", "test");

        let state =
            h.orchestrator.run(&request("2025-07-04", None), &context).await.expect("run succeeds");

        assert_eq!(state.suggested_budget, Some(Decimal::new(80000, 2)));
        assert!(matches!(state.search_result, Some(SearchResult::Found { price: Some(_), .. })));
        assert_eq!(state.notification_sent, Some(true));
        assert_eq!(h.service.call_count(), 3);
        assert!(h.pacer.waits().is_empty());
        assert!(h.outlet.emitted()[0].contains("Suggested Product: iPhone 15 128GB"));

        let value = serde_json::to_value(&state).expect("state serializes");
        assert_eq!(value["suggested_budget"], json!(800.0));
        assert_eq!(value["search_result"]["kind"], json!("found"));
        assert_eq!(value["search_result"]["price"], json!(749.0));

        let events = h.audit.event_types();
        assert_eq!(events.iter().filter(|event| *event == "pipeline.stage_started").count(), 4);
        assert_eq!(events.iter().filter(|event| *event == "pipeline.stage_completed").count(), 4);
        assert!(h.audit.events().iter().all(|event| event.correlation_id == "run-1"));
    }

    #[tokio::test]
    async fn budget_failure_aborts_before_search() {
        let h = harness(ScriptedCompletionService::new(vec![
            Ok(Completion::text("900")),
            Ok(Completion::text("about a grand")),
        ]));

        let context = AuditContext::generate("test");
        let result = h.orchestrator.run(&request("2025-07-04", None), &context).await;

        assert_eq!(stage_failure(result), (StageName::BudgetAdvisor, ErrorKind::UpstreamParse));
        assert_eq!(h.service.call_count(), 2);
        assert!(h.outlet.emitted().is_empty());
        assert_eq!(h.audit.event_types().last().map(String::as_str), Some("pipeline.stage_failed"));
    }

    #[tokio::test]
    async fn missing_credential_fails_preflight_without_calls() {
        let h = harness(ScriptedCompletionService::without_credential());

        let context = AuditContext::generate("test");
        let result = h.orchestrator.run(&request("2025-07-04", None), &context).await;

        assert_eq!(stage_failure(result), (StageName::Preflight, ErrorKind::Configuration));
        assert_eq!(h.service.call_count(), 0);
    }

    #[tokio::test]
    async fn stage_failure_is_reported_once_through_the_audit_sink() {
        let h = harness(ScriptedCompletionService::without_credential());

        let result =
            h.orchestrator.run(&request("2025-07-04", None), &AuditContext::generate("test")).await;
        assert!(result.is_err());

        let failures: Vec<_> = h
            .audit
            .events()
            .into_iter()
            .filter(|event| event.event_type == "pipeline.stage_failed")
            .collect();
        assert_eq!(failures.len(), 1);
        let metadata = &failures[0].metadata;
        assert_eq!(metadata.get("stage").map(String::as_str), Some("preflight"));
        assert_eq!(metadata.get("error_class").map(String::as_str), Some("configuration_error"));
        assert!(metadata.get("detail").is_some_and(|detail| !detail.is_empty()));
    }

    #[tokio::test]
    async fn unreadable_financials_are_a_budget_data_error() {
        let h = harness(ScriptedCompletionService::default());

        let result = h
            .orchestrator
            .run(&request("2025-07-04", Some("finances.xlsx")), &AuditContext::generate("test"))
            .await;

        assert_eq!(stage_failure(result), (StageName::BudgetAdvisor, ErrorKind::Data));
        assert_eq!(h.service.call_count(), 0);
    }

    #[tokio::test]
    async fn search_failure_still_notifies() {
        let h = harness(ScriptedCompletionService::new(vec![
            Ok(Completion::text("800")),
            Ok(Completion::text("$700")),
            Err(StageError::Upstream("connection reset".to_owned())),
        ]));

        let state = h
            .orchestrator
            .run(&request("whenever", None), &AuditContext::generate("test"))
            .await
            .expect("search errors are not fatal");

        assert!(matches!(state.search_result, Some(SearchResult::Error { .. })));
        assert_eq!(state.notification_sent, Some(true));
        let emitted = h.outlet.emitted();
        assert!(emitted[0].contains("Suggested Product: iPhone 15"));
        assert!(emitted[0].contains("Price: $700.00"));
    }

    #[tokio::test]
    async fn unauthorized_notification_is_recorded_not_raised() {
        let service = ScriptedCompletionService::new(vec![
            Ok(Completion::text("800")),
            Ok(Completion::text("$700")),
            Ok(Completion::text("Nothing today.")),
        ]);
        let outlet = MemoryOutlet::default();
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(service),
            NotificationDispatcher::new(
                Some(SecretString::from("expected".to_owned())),
                Arc::new(outlet.clone()),
            ),
            Arc::new(InMemoryAuditSink::default()),
            PipelineSettings::default(),
        )
        .with_pacer(Arc::new(RecordingPacer::default()));

        let state = orchestrator
            .run(&request("whenever", None), &AuditContext::generate("test"))
            .await
            .expect("notification failure is not fatal");

        assert_eq!(state.notification_sent, Some(false));
        assert!(outlet.emitted().is_empty());
    }
}
