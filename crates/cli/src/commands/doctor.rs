use insight_agent::OpenAiCompatibleClient;
use insight_core::config::{AppConfig, LoadOptions};
use insight_db::{connect, migrations, HrSeedDataset};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(async {
                    checks.extend(check_database(&config).await);
                    checks.push(check_llm_endpoint(&config).await);
                }),
                Err(error) => checks.push(DoctorCheck {
                    name: "runtime_init",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                }),
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            let reason = "configuration did not load";
            checks.push(DoctorCheck::skipped("database_connectivity", reason));
            checks.push(DoctorCheck::skipped("dataset_rows", reason));
            checks.push(DoctorCheck::skipped("llm_endpoint", reason));
        }
    }

    let overall_status = overall(&checks);
    let summary = match overall_status {
        CheckStatus::Pass => "doctor: all readiness checks passed",
        CheckStatus::Warn => "doctor: ready with warnings",
        _ => "doctor: one or more readiness checks failed",
    }
    .to_string();

    DoctorReport { overall_status, summary, checks }
}

fn overall(checks: &[DoctorCheck]) -> CheckStatus {
    if checks.iter().any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped)) {
        CheckStatus::Fail
    } else if checks.iter().any(|check| check.status == CheckStatus::Warn) {
        CheckStatus::Warn
    } else {
        CheckStatus::Pass
    }
}

async fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let pool = match connect(&config.database).await {
        Ok(pool) => pool,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to connect to database: {error}"),
                },
                DoctorCheck::skipped("dataset_rows", "the database is unreachable"),
            ];
        }
    };

    let mut checks = vec![DoctorCheck {
        name: "database_connectivity",
        status: CheckStatus::Pass,
        details: format!("connected using `{}`", config.database.url),
    }];

    let dataset = match migrations::run_pending(&pool).await {
        Ok(()) => match HrSeedDataset::verify(&pool).await {
            Ok(verification) if verification.employee_count > 0 => DoctorCheck {
                name: "dataset_rows",
                status: CheckStatus::Pass,
                details: format!(
                    "{} employees across {} departments",
                    verification.employee_count, verification.department_count
                ),
            },
            Ok(_) => DoctorCheck {
                name: "dataset_rows",
                status: CheckStatus::Warn,
                details: "hr_employee_attrition is empty; run `insight seed`".to_string(),
            },
            Err(error) => DoctorCheck {
                name: "dataset_rows",
                status: CheckStatus::Fail,
                details: format!("failed to read dataset: {error}"),
            },
        },
        Err(error) => DoctorCheck {
            name: "dataset_rows",
            status: CheckStatus::Fail,
            details: format!("failed to apply migrations: {error}"),
        },
    };
    checks.push(dataset);

    pool.close().await;
    checks
}

async fn check_llm_endpoint(config: &AppConfig) -> DoctorCheck {
    let client = match OpenAiCompatibleClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            return DoctorCheck { name: "llm_endpoint", status: CheckStatus::Fail, details: error.to_string() };
        }
    };

    match client.ping().await {
        Ok(()) => DoctorCheck {
            name: "llm_endpoint",
            status: CheckStatus::Pass,
            details: format!("{} reachable (model `{}`)", config.llm.base_url, client.model()),
        },
        Err(error) => DoctorCheck {
            name: "llm_endpoint",
            status: CheckStatus::Fail,
            details: format!("{} ({})", error, config.llm.provider.as_str()),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
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
