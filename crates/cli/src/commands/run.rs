use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::Args;
use dealwatch_agent::LlmIntentExtractor;
use dealwatch_core::audit::{AuditContext, TracingAuditSink};
use dealwatch_core::config::{AppConfig, LoadOptions};
use dealwatch_core::intake::IntentExtractionService;
use dealwatch_core::notify::{FallbackOutlet, StderrOutlet};
use dealwatch_core::pipeline::{PipelineOrchestrator, PipelineRequest, PipelineSettings};
use dealwatch_core::timeframe::resolve_timeframe;
use tracing::info;

use super::{
    block_on, completion_service, dispatcher, load_config, CommandResult, EXIT_RUNTIME,
};

const COMMAND: &str = "run";

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[arg(short, long, help = "Purchase goal in plain language")]
    pub goal: Option<String>,
    #[arg(short, long, help = "Product to buy; overrides the goal's product")]
    pub product: Option<String>,
    #[arg(short, long, help = "When to buy; overrides the goal's timeframe")]
    pub timeframe: Option<String>,
    #[arg(short, long, help = "Financial records export (.json or .csv)")]
    pub financials: Option<PathBuf>,
    #[arg(short, long, help = "Notification recipient")]
    pub contact: Option<String>,
    #[arg(long, help = "Print the notification even if email is configured")]
    pub no_email: bool,
}

/// Runs the full pipeline and prints the final state as JSON.
///
/// The text notification goes to stderr so stdout stays parseable.
pub fn run(args: &RunArgs, options: LoadOptions) -> CommandResult {
    run_with_outlet(args, options, Arc::new(StderrOutlet))
}

pub fn run_with_outlet(
    args: &RunArgs,
    options: LoadOptions,
    outlet: Arc<dyn FallbackOutlet>,
) -> CommandResult {
    if args.goal.is_none() && (args.product.is_none() || args.timeframe.is_none()) {
        let message = "provide --goal, or both --product and --timeframe";
        return CommandResult::usage(COMMAND, message);
    }

    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let completions = match completion_service(COMMAND, &config) {
        Ok(completions) => completions,
        Err(result) => return result,
    };

    let dispatcher = match dispatcher(COMMAND, &config, args.no_email, outlet) {
        Ok(dispatcher) => dispatcher,
        Err(result) => return result,
    };

    let orchestrator = PipelineOrchestrator::new(
        completions.clone(),
        dispatcher,
        Arc::new(TracingAuditSink),
        PipelineSettings::from_config(&config),
    );
    let extractor = LlmIntentExtractor::new(completions).with_model(config.llm.model.clone());
    let context = AuditContext::generate("cli");

    let outcome = block_on(COMMAND, async {
        let request = match build_request(args, &config, &extractor).await {
            Ok(request) => request,
            Err(result) => return Err(result),
        };
        orchestrator
            .run(&request, &context)
            .await
            .map_err(|error| CommandResult::pipeline_failure(COMMAND, &error))
    });

    let state = match outcome {
        Ok(Ok(state)) => state,
        Ok(Err(result)) | Err(result) => return result,
    };
    match state.to_json_pretty() {
        Ok(json) => CommandResult::data(json),
        Err(error) => CommandResult::failure(
            COMMAND,
            "serialization",
            format!("failed to encode pipeline state: {error}"),
            EXIT_RUNTIME,
        ),
    }
}

async fn build_request(
    args: &RunArgs,
    config: &AppConfig,
    extractor: &dyn IntentExtractionService,
) -> Result<PipelineRequest, CommandResult> {
    let mut product = args.product.clone();
    let mut timeframe = args.timeframe.clone();

    if let Some(goal) = args.goal.as_deref().filter(|_| product.is_none() || timeframe.is_none()) {
        let intent = extractor
            .extract(goal)
            .await
            .map_err(|error| CommandResult::stage_failure(COMMAND, &error))?;
        let missing = intent.missing_fields();
        info!(
            event_name = "intent.parsed",
            product = %intent.product,
            timeframe = %intent.timeframe,
            "goal parsed"
        );
        if product.is_none() && !missing.contains(&"product") {
            product = Some(intent.product);
        }
        if timeframe.is_none() && !missing.contains(&"timeframe") {
            timeframe = Some(intent.timeframe);
        }
        if intent.provide_financials && args.financials.is_none() {
            info!(
                event_name = "intent.financials_not_supplied",
                "goal mentions financial records but --financials was not given"
            );
        }
    }

    let (Some(product), Some(timeframe)) = (product, timeframe) else {
        return Err(CommandResult::usage(
            COMMAND,
            "could not determine both product and timeframe; pass --product and --timeframe",
        ));
    };

    let today = Local::now().date_naive();
    Ok(PipelineRequest {
        product,
        timeframe: resolve_timeframe(&timeframe, today),
        financials_path: args.financials.as_ref().map(|path| path.display().to_string()),
        started_on: today,
        contact: args.contact.clone().or_else(|| config.notify.contact.clone()),
        prefer_email: !args.no_email && config.notify.prefer_email,
    })
}
