use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use crate::budget::format_usd;
use crate::completion::{
    CapabilityChoice, CapabilityInvocation, ChatMessage, Completion, CompletionRequest,
    CompletionService,
};
use crate::domain::search::SearchResult;
use crate::search::blocklist::{listing_host, HostBlocklist};
use crate::search::pacer::CyclePacer;
use crate::search::states::{
    ProductFoundArgs, SearchCapability, SearchOutcome, SearchRequest, SearchState,
};

#[derive(Clone, Debug, PartialEq)]
pub struct SearchSettings {
    pub model: Option<String>,
    pub cycle_interval: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            model: None,
            cycle_interval: Duration::from_secs(24 * 60 * 60),
            max_tokens: 250,
            temperature: 0.7,
        }
    }
}

/// Bounded polling search for one product.
///
/// The transcript and state belong to this instance, so independent searches
/// never share conversation memory. Each cycle asks the completion service for
/// a listing at or below the cap; the first priced, allowed listing ends the
/// search. Otherwise the loop waits one interval and retries until
/// `max_cycles` attempts have been made.
pub struct ProductSearchLoop {
    completions: Arc<dyn CompletionService>,
    pacer: Arc<dyn CyclePacer>,
    blocklist: HostBlocklist,
    settings: SearchSettings,
    transcript: Vec<ChatMessage>,
    state: SearchState,
}

/// What one cycle decided, plus the transcript entries it produced.
struct CycleDecision {
    result: SearchResult,
    reply: ChatMessage,
    tool_outcome: Option<ChatMessage>,
}

impl ProductSearchLoop {
    pub fn new(
        completions: Arc<dyn CompletionService>,
        pacer: Arc<dyn CyclePacer>,
        blocklist: HostBlocklist,
        settings: SearchSettings,
    ) -> Self {
        Self {
            completions,
            pacer,
            blocklist,
            settings,
            transcript: Vec::new(),
            state: SearchState::Idle,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub async fn run(&mut self, request: &SearchRequest) -> SearchOutcome {
        let max_cycles = request.max_cycles.max(1);
        info!(
            event_name = "search.started",
            product = %request.product_name,
            price_cap = %request.price_cap,
            max_cycles,
            "product search started"
        );

        let mut history = Vec::new();
        let mut unpriced_candidate = None;

        for cycle in 1..=max_cycles {
            self.state = SearchState::Searching { cycle, max_cycles };
            let result = self.run_cycle(request).await;
            info!(
                event_name = "search.cycle_completed",
                cycle,
                max_cycles,
                result = result.label(),
                "{}",
                result.summary()
            );
            history.push(result.clone());

            if result.is_verified_match() {
                self.state = SearchState::Found;
                info!(event_name = "search.found", attempts = cycle, "search matched");
                return SearchOutcome { state: self.state, attempts: cycle, result, history };
            }
            if result.is_unpriced_candidate() {
                unpriced_candidate = Some(result);
            }

            if cycle < max_cycles {
                info!(
                    event_name = "search.waiting",
                    remaining = max_cycles - cycle,
                    interval_secs = self.settings.cycle_interval.as_secs(),
                    "waiting before next search cycle"
                );
                self.pacer.wait(self.settings.cycle_interval).await;
            }
        }

        self.state = SearchState::Exhausted;
        let result = unpriced_candidate.or_else(|| history.last().cloned()).unwrap_or_else(|| {
            SearchResult::PlainMessage { text: "no search cycle ran".to_owned() }
        });
        info!(event_name = "search.exhausted", attempts = max_cycles, "search window exhausted");
        SearchOutcome { state: self.state, attempts: max_cycles, result, history }
    }

    async fn run_cycle(&mut self, request: &SearchRequest) -> SearchResult {
        let prompt = ChatMessage::user(format!(
            "Please search the web for a product listing that matches '{}' at or below ${}.",
            request.product_name,
            format_usd(request.price_cap)
        ));

        let mut messages = Vec::with_capacity(self.transcript.len() + 2);
        messages.push(ChatMessage::system(guidance(request)));
        messages.extend(self.transcript.iter().cloned());
        messages.push(prompt.clone());

        let mut completion_request = CompletionRequest::new(messages)
            .with_capabilities(SearchCapability::ALL.iter().map(SearchCapability::spec).collect())
            .with_choice(CapabilityChoice::Auto)
            .with_sampling(self.settings.max_tokens, self.settings.temperature);
        if let Some(model) = &self.settings.model {
            completion_request = completion_request.with_model(model.clone());
        }

        let reply = self.completions.complete(completion_request).await;
        self.transcript.push(prompt);

        let completion = match reply {
            Ok(completion) => completion,
            Err(error) => {
                warn!(
                    event_name = "search.cycle_failed",
                    error_class = error.kind().as_str(),
                    detail = error.detail(),
                    "search attempt failed"
                );
                return SearchResult::Error { detail: error.to_string() };
            }
        };

        let decision = self.decide(request, completion);
        self.transcript.push(decision.reply);
        if let Some(outcome) = decision.tool_outcome {
            self.transcript.push(outcome);
        }
        decision.result
    }

    fn decide(&self, request: &SearchRequest, completion: Completion) -> CycleDecision {
        match completion.invocation {
            Some(invocation) => {
                let result = self.evaluate_invocation(request, &invocation);
                let tool_outcome =
                    ChatMessage::tool_outcome(invocation.id.clone(), outcome_note(&result));
                CycleDecision {
                    result,
                    reply: ChatMessage::assistant_invocation(completion.text, invocation),
                    tool_outcome: Some(tool_outcome),
                }
            }
            None => {
                let text = completion.text.unwrap_or_default();
                CycleDecision {
                    result: self.evaluate_text(request, &text),
                    reply: ChatMessage::assistant(text),
                    tool_outcome: None,
                }
            }
        }
    }

    fn evaluate_invocation(
        &self,
        request: &SearchRequest,
        invocation: &CapabilityInvocation,
    ) -> SearchResult {
        let Some(capability) = SearchCapability::from_name(&invocation.name) else {
            warn!(
                event_name = "search.unknown_capability",
                capability = %invocation.name,
                "model requested an unknown capability"
            );
            return SearchResult::PlainMessage {
                text: format!("model requested an unknown capability `{}`", invocation.name),
            };
        };

        match capability {
            SearchCapability::RecordProductFound => {
                match serde_json::from_str::<ProductFoundArgs>(&invocation.arguments) {
                    Ok(args) => self.judge_listing(request, args),
                    Err(error) => {
                        warn!(
                            event_name = "search.malformed_arguments",
                            capability = capability.name(),
                            %error,
                            "capability arguments were malformed"
                        );
                        SearchResult::PlainMessage {
                            text: format!("capability arguments were malformed: {error}"),
                        }
                    }
                }
            }
        }
    }

    fn judge_listing(&self, request: &SearchRequest, args: ProductFoundArgs) -> SearchResult {
        let product_name = args
            .product_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| request.product_name.clone());
        let url = args.url.filter(|url| listing_host(url).is_some());

        let Some(url) = url.filter(|_| args.price <= request.price_cap) else {
            warn!(
                event_name = "search.candidate_rejected",
                reason = "above_cap_or_missing_url",
                product = %product_name,
                price = %args.price,
                cap = %request.price_cap,
                "candidate rejected"
            );
            return SearchResult::AboveCap {
                product_name,
                price: args.price,
                cap: request.price_cap,
            };
        };

        if self.blocklist.is_blocked_url(&url) {
            warn!(
                event_name = "search.candidate_rejected",
                reason = "blocked_host",
                product = %product_name,
                url = %url,
                "candidate rejected"
            );
            return SearchResult::Blocked { product_name, price: args.price, url };
        }

        let message =
            format!("Price match recorded: {product_name} for ${}.", format_usd(args.price));
        SearchResult::Found { product_name, price: Some(args.price), url, message }
    }

    fn evaluate_text(&self, request: &SearchRequest, text: &str) -> SearchResult {
        match first_url(text) {
            Some(url) if self.blocklist.is_blocked_url(&url) => {
                warn!(event_name = "search.fallback_blocked", url = %url, "fallback link blocked");
                SearchResult::PlainMessage { text: format!("Found a link, but it is blocked: {url}") }
            }
            Some(url) => SearchResult::Found {
                product_name: request.product_name.clone(),
                price: None,
                url,
                message: text.to_owned(),
            },
            None => SearchResult::PlainMessage { text: text.to_owned() },
        }
    }
}

fn guidance(request: &SearchRequest) -> String {
    format!(
        "The user is searching for '{}' at or below ${}. If you find any product listing that \
         matches the criteria, you MUST use the '{}' tool with the exact product name, its price, \
         and the URL. The URL should be a plausible product listing from a well-known retailer. \
         Do not invent random or obviously fake links. If you cannot find any product at or \
         below the price cap, only then respond in natural language.",
        request.product_name,
        format_usd(request.price_cap),
        SearchCapability::RecordProductFound.name()
    )
}

fn outcome_note(result: &SearchResult) -> String {
    match result {
        SearchResult::Found { .. } => "Price match recorded. Stop searching.".to_owned(),
        SearchResult::AboveCap { product_name, price, cap } => format!(
            "Product '{product_name}' found at ${}, but it is above the cap of ${} or has no \
             valid URL. Continuing search.",
            format_usd(*price),
            format_usd(*cap)
        ),
        SearchResult::Blocked { product_name, url, .. } => {
            format!("Product '{product_name}' was found at a blocked URL ({url}). Skipping.")
        }
        SearchResult::PlainMessage { text } => text.clone(),
        SearchResult::Error { detail } => detail.clone(),
    }
}

/// First http(s) URL in free text, without trailing punctuation.
pub fn first_url(text: &str) -> Option<String> {
    static URL: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = URL.get_or_init(|| Regex::new(r#"https?://[^\s<>"'\]\)]+"#).ok()).as_ref()?;
    pattern
        .find_iter(text)
        .map(|found| found.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']).to_owned())
        .find(|candidate| listing_host(candidate).is_some())
}
