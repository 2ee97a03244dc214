use std::path::PathBuf;

use chrono::Local;
use clap::Args;
use dealwatch_core::budget::{format_usd, BudgetAdvisor};
use dealwatch_core::config::LoadOptions;
use dealwatch_core::financials::{FileRecordSource, FinancialRecordSource};
use dealwatch_core::timeframe::resolve_timeframe;

use super::{block_on, completion_service, load_config, CommandResult};

const COMMAND: &str = "budget";

#[derive(Debug, Clone, Args)]
pub struct BudgetArgs {
    #[arg(short, long, help = "Product to budget for")]
    pub product: String,
    #[arg(short, long, help = "When the purchase should happen, e.g. `in 3 months`")]
    pub timeframe: String,
    #[arg(short, long, help = "Financial records export (.json or .csv)")]
    pub financials: Option<PathBuf>,
}

/// Prints the suggested budget as `$x,xxx.xx`.
pub fn run(args: &BudgetArgs, options: LoadOptions) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let records = match &args.financials {
        Some(path) => match FileRecordSource.load(path) {
            Ok(records) => records,
            Err(error) => return CommandResult::stage_failure(COMMAND, &error),
        },
        None => Vec::new(),
    };

    let completions = match completion_service(COMMAND, &config) {
        Ok(completions) => completions,
        Err(result) => return result,
    };
    let advisor = BudgetAdvisor::new(completions).with_model(config.llm.model.clone());
    let timeframe = resolve_timeframe(&args.timeframe, Local::now().date_naive());

    let outcome = block_on(COMMAND, advisor.suggest_budget(&args.product, &timeframe, &records));
    match outcome {
        Ok(Ok(budget)) => CommandResult::data(format!("${}", format_usd(budget))),
        Ok(Err(error)) => CommandResult::stage_failure(COMMAND, &error),
        Err(result) => result,
    }
}
