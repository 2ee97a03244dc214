use std::env;
use std::fs;
use std::sync::{Arc, Mutex, OnceLock};

use dealwatch_cli::commands::budget::BudgetArgs;
use dealwatch_cli::commands::notify::NotifyArgs;
use dealwatch_cli::commands::run::RunArgs;
use dealwatch_cli::commands::search::SearchArgs;
use dealwatch_cli::commands::{budget, config, doctor, notify, run, search};
use dealwatch_core::config::LoadOptions;
use dealwatch_core::notify::MemoryOutlet;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn run_without_goal_or_product_is_usage_error() {
    with_env(&[], || {
        let args = RunArgs {
            goal: None,
            product: Some("laptop".to_owned()),
            timeframe: None,
            financials: None,
            contact: None,
            no_email: true,
        };
        let result = run::run(&args, LoadOptions::default());
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "run");
        assert_eq!(payload["error_class"], "usage");
    });
}

#[test]
fn run_without_credential_stops_at_preflight() {
    with_env(&[("DEALWATCH_NOTIFY_SHARED_SECRET", "s3cret")], || {
        let args = RunArgs {
            goal: None,
            product: Some("laptop".to_owned()),
            timeframe: Some("in 2 weeks".to_owned()),
            financials: None,
            contact: None,
            no_email: true,
        };
        let result = run::run(&args, LoadOptions::default());
        assert_eq!(result.exit_code, 2, "missing credential is a configuration failure");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "configuration_error");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("preflight failed"), "unexpected message: {message}");
    });
}

#[test]
fn run_keeps_fallback_text_out_of_state_json() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("average retail price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("899")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("My goal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("$800")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("search the web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_reply(
                "record_product_found",
                r#"{"product_name":"Laptop X","price":750,"url":"https://shop.example/laptop-x"}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;
        server
    });

    let base_url = server.uri();
    let vars = [
        ("DEALWATCH_LLM_API_KEY", "sk-test"),
        ("DEALWATCH_LLM_BASE_URL", base_url.as_str()),
        ("DEALWATCH_NOTIFY_SHARED_SECRET", "s3cret"),
    ];
    with_env(&vars, || {
        let args = RunArgs {
            goal: None,
            product: Some("laptop".to_owned()),
            timeframe: Some("someday".to_owned()),
            financials: None,
            contact: None,
            no_email: true,
        };
        let outlet = MemoryOutlet::default();
        let result = run::run_with_outlet(&args, LoadOptions::default(), Arc::new(outlet.clone()));
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let state = parse_payload(&result.output);
        assert_eq!(state["notification_sent"], true);
        assert_eq!(state["suggested_budget"], 800.0);

        let emitted = outlet.emitted();
        assert_eq!(emitted.len(), 1);
        assert!(emitted[0].contains("https://shop.example/laptop-x"));
        assert!(!result.output.contains("Where to buy:"));
    });
}

#[test]
fn budget_is_clamped_to_reference_price() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("average retail price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("About $899.00")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("My goal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("$1,200.00")))
            .expect(1)
            .mount(&server)
            .await;
        server
    });

    let base_url = server.uri();
    with_env(&[("DEALWATCH_LLM_API_KEY", "sk-test"), ("DEALWATCH_LLM_BASE_URL", &base_url)], || {
        let args = BudgetArgs {
            product: "laptop".to_owned(),
            timeframe: "2030-01-01".to_owned(),
            financials: None,
        };
        let result = budget::run(&args, LoadOptions::default());
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        assert_eq!(result.output, "$899.00");
    });
}

#[test]
fn budget_rejects_spreadsheet_financials() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("finances.xlsx");
    fs::write(&path, b"not really a spreadsheet").expect("write");

    with_env(&[("DEALWATCH_LLM_API_KEY", "sk-test")], || {
        let args = BudgetArgs {
            product: "laptop".to_owned(),
            timeframe: "in 1 month".to_owned(),
            financials: Some(path.clone()),
        };
        let result = budget::run(&args, LoadOptions::default());
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "data_error");
        assert!(payload["message"].as_str().unwrap_or_default().contains("CSV"));
    });
}

#[test]
fn search_rejects_non_positive_cap() {
    with_env(&[], || {
        let args = SearchArgs {
            product: "laptop".to_owned(),
            cap: Decimal::ZERO,
            days: 3,
            once: true,
        };
        let result = search::run(&args, LoadOptions::default());
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "usage");
    });
}

#[test]
fn notify_with_matching_secret_succeeds() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("payload.json");
    let payload = json!({
        "product": "Laptop",
        "price": 950.0,
        "links": ["https://shop.example/laptop"],
        "user_contact": "buyer@example.com",
        "api_key": "s3cret"
    });
    fs::write(&input, payload.to_string()).expect("write payload");

    with_env(&[("DEALWATCH_NOTIFY_SHARED_SECRET", "s3cret")], || {
        let args = NotifyArgs { input: Some(input.clone()), contact: None, no_email: true };
        let result = notify::run(&args, LoadOptions::default());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "notify");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn notify_with_wrong_secret_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("payload.json");
    let payload = json!({"product": "Laptop", "price": 950.0, "links": "x", "api_key": "nope"});
    fs::write(&input, payload.to_string()).expect("write payload");

    with_env(&[("DEALWATCH_NOTIFY_SHARED_SECRET", "s3cret")], || {
        let args = NotifyArgs { input: Some(input.clone()), contact: None, no_email: true };
        let result = notify::run(&args, LoadOptions::default());
        assert_eq!(result.exit_code, 1);
        assert_eq!(parse_payload(&result.output)["error_class"], "authorization");
    });
}

#[test]
fn config_redacts_secrets_and_attributes_sources() {
    with_env(&[("DEALWATCH_LLM_API_KEY", "sk-live-abcdef"), ("DEALWATCH_LLM_MODEL", "m-1")], || {
        let output = config::run(LoadOptions::default());

        assert!(!output.contains("abcdef"), "secret leaked: {output}");
        assert!(output.contains("- llm.api_key = sk-*** (source: env (DEALWATCH_LLM_API_KEY))"));
        assert!(output.contains("- llm.model = m-1 (source: env (DEALWATCH_LLM_MODEL))"));
        assert!(output.contains("- search.cycle_interval_secs = 86400 (source: default)"));
    });
}

#[test]
fn config_reads_values_from_explicit_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("dealwatch.toml");
    fs::write(&file, "[search]\nblocked_hosts = [\"ebay.com\"]\n").expect("write config");

    with_env(&[], || {
        let options = LoadOptions { config_path: Some(file.clone()), ..LoadOptions::default() };
        let output = config::run(options);
        let expected =
            format!("- search.blocked_hosts = [ebay.com] (source: file ({}))", file.display());
        assert!(output.contains(&expected), "unexpected output: {output}");
    });
}

#[test]
fn doctor_reports_missing_credential_and_secret() {
    with_env(&[], || {
        let report: Value =
            serde_json::from_str(&doctor::run(true, LoadOptions::default())).expect("json report");

        assert_eq!(report["overall_status"], "fail");
        let checks = report["checks"].as_array().cloned().unwrap_or_default();
        let status_of = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status_of("config_validation"), "pass");
        assert_eq!(status_of("llm_credential"), "fail");
        assert_eq!(status_of("notify_shared_secret"), "fail");
        assert_eq!(status_of("email_channel"), "skipped");
    });
}

#[test]
fn doctor_passes_when_credentials_are_present() {
    with_env(
        &[("DEALWATCH_LLM_API_KEY", "sk-test"), ("DEALWATCH_NOTIFY_SHARED_SECRET", "s3cret")],
        || {
            let output = doctor::run(false, LoadOptions::default());
            assert!(output.starts_with("doctor: all readiness checks passed"), "{output}");
            assert!(output.contains("- [skip] email_channel"));
        },
    );
}

fn reply(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
}

fn tool_reply(name: &str, arguments: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": name, "arguments": arguments}
                }]
            }
        }]
    })
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "DEALWATCH_LLM_API_KEY",
        "OPENAI_API_KEY",
        "DEALWATCH_LLM_BASE_URL",
        "DEALWATCH_LLM_MODEL",
        "DEALWATCH_LLM_SEARCH_MODEL",
        "DEALWATCH_LLM_TIMEOUT_SECS",
        "DEALWATCH_NOTIFY_SHARED_SECRET",
        "DEALWATCH_NOTIFY_RESEND_API_KEY",
        "RESEND_API_KEY",
        "DEALWATCH_NOTIFY_FROM_ADDRESS",
        "RESEND_FROM_EMAIL",
        "DEALWATCH_NOTIFY_PREFER_EMAIL",
        "DEALWATCH_NOTIFY_CONTACT",
        "DEALWATCH_SEARCH_BLOCKED_HOSTS",
        "DEALWATCH_SEARCH_CYCLE_INTERVAL_SECS",
        "DEALWATCH_SEARCH_MAX_TOKENS",
        "DEALWATCH_SEARCH_TEMPERATURE",
        "DEALWATCH_LOGGING_LEVEL",
        "DEALWATCH_LOGGING_FORMAT",
        "DEALWATCH_LOG_LEVEL",
        "DEALWATCH_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
