use dealwatch_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool, options: LoadOptions) -> String {
    let report = build_report(options);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_credential(&config));
            checks.push(check_notify_secret(&config));
            checks.push(check_email_channel(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_credential", "notify_shared_secret", "email_channel"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_credential(config: &AppConfig) -> DoctorCheck {
    match config.llm_credential() {
        Some(_) => DoctorCheck {
            name: "llm_credential",
            status: CheckStatus::Pass,
            details: format!("credential present for `{}`", config.llm.base_url),
        },
        None => DoctorCheck {
            name: "llm_credential",
            status: CheckStatus::Fail,
            details: "set DEALWATCH_LLM_API_KEY or OPENAI_API_KEY; runs stop at preflight"
                .to_string(),
        },
    }
}

fn check_notify_secret(config: &AppConfig) -> DoctorCheck {
    let configured = config
        .notify
        .shared_secret
        .as_ref()
        .map(|secret| !secret.expose_secret().trim().is_empty())
        .unwrap_or(false);
    if configured {
        DoctorCheck {
            name: "notify_shared_secret",
            status: CheckStatus::Pass,
            details: "notifications can be authorized".to_string(),
        }
    } else {
        DoctorCheck {
            name: "notify_shared_secret",
            status: CheckStatus::Fail,
            details: "set DEALWATCH_NOTIFY_SHARED_SECRET; every notification will be refused"
                .to_string(),
        }
    }
}

fn check_email_channel(config: &AppConfig) -> DoctorCheck {
    if !config.email_configured() {
        return DoctorCheck {
            name: "email_channel",
            status: CheckStatus::Skipped,
            details: "no email provider key; notifications print as text".to_string(),
        };
    }
    DoctorCheck {
        name: "email_channel",
        status: CheckStatus::Pass,
        details: format!("sending as `{}`", config.notify.from_address),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
