use bookworm_core::config::{AppConfig, LlmProvider};
use bookworm_db::{connect_with_config, migrations};
use serde::Serialize;

use crate::commands::{block_on, load_config, CommandFailure, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Verdict {
    Pass,
    Fail,
    Skipped,
}

impl Verdict {
    fn marker(self) -> &'static str {
        match self {
            Self::Pass => "ok",
            Self::Fail => "fail",
            Self::Skipped => "skip",
        }
    }
}

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    status: Verdict,
    details: String,
}

fn check(name: &'static str, status: Verdict, details: impl Into<String>) -> Check {
    Check { name, status, details: details.into() }
}

#[derive(Debug, Serialize)]
struct Report {
    overall_status: Verdict,
    summary: &'static str,
    checks: Vec<Check>,
}

impl Report {
    fn from_checks(checks: Vec<Check>) -> Self {
        let healthy = checks.iter().all(|check| check.status == Verdict::Pass);
        Self {
            overall_status: if healthy { Verdict::Pass } else { Verdict::Fail },
            summary: if healthy {
                "doctor: all readiness checks passed"
            } else {
                "doctor: one or more readiness checks failed"
            },
            checks,
        }
    }

    fn render_text(&self) -> String {
        std::iter::once(self.summary.to_string())
            .chain(self.checks.iter().map(|check| {
                format!("- [{}] {}: {}", check.status.marker(), check.name, check.details)
            }))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Readiness probe for operators. Exits 1 when any check does not pass.
pub fn run(json_output: bool) -> CommandResult {
    let report = Report::from_checks(collect_checks());
    let exit_code = u8::from(report.overall_status != Verdict::Pass);

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            serde_json::json!({ "overall_status": "fail", "summary": error.to_string() }).to_string()
        })
    } else {
        report.render_text()
    };

    CommandResult { exit_code, output }
}

fn collect_checks() -> Vec<Check> {
    let config = match load_config() {
        Ok(config) => config,
        Err(failure) => {
            let reason = "skipped because configuration did not load";
            return vec![
                check("config_validation", Verdict::Fail, failure.message),
                check("oracle_settings", Verdict::Skipped, reason),
                check("database_connectivity", Verdict::Skipped, reason),
                check("database_schema", Verdict::Skipped, reason),
            ];
        }
    };

    let mut checks = vec![
        check("config_validation", Verdict::Pass, "configuration loaded and validated"),
        oracle_settings(&config),
    ];
    checks.extend(database_checks(&config));
    checks
}

/// Reports what the server would call. Nothing is sent to the oracle.
fn oracle_settings(config: &AppConfig) -> Check {
    let endpoint = config.llm.base_url.as_deref().unwrap_or("https://api.openai.com");
    let credentials = match config.llm.provider {
        LlmProvider::OpenAi => "bearer key configured",
        LlmProvider::Ollama => "no key required",
    };
    check(
        "oracle_settings",
        Verdict::Pass,
        format!("{:?} model `{}` at {endpoint} ({credentials})", config.llm.provider, config.llm.model),
    )
}

fn database_checks(config: &AppConfig) -> [Check; 2] {
    let probed = block_on(async {
        let pool = connect_with_config(&config.database).await.map_err(|error| {
            CommandFailure::new("db_connectivity", format!("failed to connect to database: {error}"), 1)
        })?;
        let schema = migrations::schema_ready(&pool).await;
        pool.close().await;
        Ok(schema)
    });

    match probed {
        Ok(schema) => [
            check(
                "database_connectivity",
                Verdict::Pass,
                format!("connected using `{}`", config.database.url),
            ),
            match schema {
                Ok(true) => check("database_schema", Verdict::Pass, "book_order table present"),
                Ok(false) => check(
                    "database_schema",
                    Verdict::Fail,
                    "book_order table missing; run `bookworm migrate`",
                ),
                Err(error) => {
                    check("database_schema", Verdict::Fail, format!("schema lookup failed: {error}"))
                }
            },
        ],
        Err(failure) => [
            check("database_connectivity", Verdict::Fail, failure.message),
            check("database_schema", Verdict::Skipped, "skipped because the database is unreachable"),
        ],
    }
}
