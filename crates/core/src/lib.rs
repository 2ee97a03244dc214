pub mod audit;
pub mod budget;
pub mod completion;
pub mod config;
pub mod domain;
pub mod errors;
pub mod financials;
pub mod intake;
pub mod notify;
pub mod pipeline;
pub mod search;
pub mod timeframe;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use budget::BudgetAdvisor;
pub use completion::{
    CapabilityChoice, CapabilityInvocation, CapabilitySpec, ChatMessage, Completion,
    CompletionRequest, CompletionService, Role, ScriptedCompletionService,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::intent::PurchaseIntent;
pub use domain::search::SearchResult;
pub use domain::state::{PipelineState, StateUpdate};
pub use errors::{DomainError, ErrorKind, PipelineError, StageError, StageName};
pub use financials::{FileRecordSource, FinancialRecord, FinancialRecordSource};
pub use intake::IntentExtractionService;
pub use notify::{
    EmailMessage, FallbackOutlet, MemoryOutlet, NotificationChannel, NotificationDispatcher,
    NotificationRequest, StderrOutlet, StdoutOutlet,
};
pub use pipeline::{PipelineOrchestrator, PipelineRequest, PipelineSettings};
pub use search::{
    CyclePacer, HostBlocklist, ProductSearchLoop, RecordingPacer, SearchOutcome, SearchRequest,
    SearchSettings, SearchState, TokioPacer,
};
