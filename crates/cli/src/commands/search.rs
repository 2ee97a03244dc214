use std::sync::Arc;

use clap::Args;
use dealwatch_core::completion::CompletionService;
use dealwatch_core::config::LoadOptions;
use dealwatch_core::errors::StageError;
use dealwatch_core::pipeline::PipelineSettings;
use dealwatch_core::search::{ProductSearchLoop, SearchRequest, TokioPacer};
use rust_decimal::Decimal;

use super::{block_on, completion_service, load_config, CommandResult, EXIT_RUNTIME};

const COMMAND: &str = "search";

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    #[arg(short, long, help = "Product to look for")]
    pub product: String,
    #[arg(short, long, help = "Highest acceptable price in USD, inclusive")]
    pub cap: Decimal,
    #[arg(short, long, default_value_t = 7, help = "Number of daily search cycles")]
    pub days: u32,
    #[arg(long, help = "Run a single cycle without waiting")]
    pub once: bool,
}

/// Runs one bounded search and prints its outcome as JSON.
pub fn run(args: &SearchArgs, options: LoadOptions) -> CommandResult {
    if args.cap <= Decimal::ZERO {
        return CommandResult::usage(COMMAND, "--cap must be a positive amount");
    }

    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let completions = match completion_service(COMMAND, &config) {
        Ok(completions) => completions,
        Err(result) => return result,
    };
    if !completions.has_credential() {
        let error =
            StageError::Configuration("no completion service credential is configured".to_owned());
        return CommandResult::stage_failure(COMMAND, &error);
    }

    let settings = PipelineSettings::from_config(&config);
    let mut search = ProductSearchLoop::new(
        completions,
        Arc::new(TokioPacer),
        settings.blocklist,
        settings.search,
    );
    let request = SearchRequest {
        product_name: args.product.trim().to_owned(),
        price_cap: args.cap,
        max_cycles: if args.once { 1 } else { args.days.max(1) },
    };

    let outcome = match block_on(COMMAND, search.run(&request)) {
        Ok(outcome) => outcome,
        Err(result) => return result,
    };
    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => CommandResult::data(json),
        Err(error) => CommandResult::failure(
            COMMAND,
            "serialization",
            format!("failed to encode search outcome: {error}"),
            EXIT_RUNTIME,
        ),
    }
}
