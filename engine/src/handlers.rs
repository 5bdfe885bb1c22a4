//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Process a request end to end and print the report
//! - plan: Analyze a request and print the plan only
//! - config show: Print the effective configuration
//! - config set-key: Store the NLU API key in the OS keychain

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use zeroize::Zeroize;

use crate::cache::IntentCache;
use crate::config::Config;
use crate::dispatch::StepDispatcher;
use crate::nlu::{NluClient, RetryingClient};
use crate::orchestrator::{prompt, Orchestrator};
use crate::providers;
use crate::report::{ExecutionReport, ReportStatus};
use crate::secrets::{CredentialStore, SecretString, NLU_API_KEY};
use crate::validation::{PostConditionGate, ProviderPostCondition};

/// Keychain service holding the NLU credential
pub const KEYCHAIN_SERVICE: &str = "taskpilot";

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Assemble the orchestrator from configuration.
///
/// Resolves the credential, builds the retrying client, the NLU-backed
/// provider registry and the post-condition gate, and takes the shared
/// intent cache by construction.
pub fn build_orchestrator(
    config: &Config,
    cache: Arc<IntentCache<crate::orchestrator::Analysis>>,
) -> Result<Orchestrator> {
    let api_key = CredentialStore::new(KEYCHAIN_SERVICE)
        .resolve(&config.nlu.api_key_env, NLU_API_KEY)
        .context("Failed to resolve NLU credential")?;

    let client = RetryingClient::new(&config.nlu, api_key).context("Failed to create NLU client")?;
    let registry = providers::default_registry(&client);
    let analyzer: Arc<dyn NluClient> =
        Arc::new(client.with_system_prompt(prompt::ANALYSIS_SYSTEM_PROMPT));

    let gate = registry.get(&config.validation.provider).map(|provider| {
        PostConditionGate::new(
            config.validation.intents.clone(),
            Arc::new(ProviderPostCondition::new(
                provider,
                config.validation.operation.clone(),
            )),
        )
    });
    if gate.is_none() {
        tracing::warn!(
            "Validation provider {} is not registered; post-conditions disabled",
            config.validation.provider
        );
    }

    let orchestrator = Orchestrator::new(analyzer, cache, StepDispatcher::new(registry));
    Ok(match gate {
        Some(gate) => orchestrator.with_post_condition(gate),
        None => orchestrator,
    })
}

/// Process a request and print the report
pub async fn handle_run(
    utterance: String,
    workspace_id: i64,
    user_id: Option<i64>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let cache = Arc::new(IntentCache::new(config.cache.ttl()));
    let orchestrator = build_orchestrator(config, Arc::clone(&cache))?;

    let report = orchestrator
        .process_request(&utterance, workspace_id, user_id)
        .await;

    match format {
        OutputFormat::Text => println!("{}", render_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    cache.clear();
    Ok(())
}

/// Analyze a request and print the interpreted plan
pub async fn handle_plan(utterance: String, config: &Config, format: OutputFormat) -> Result<()> {
    let cache = Arc::new(IntentCache::new(config.cache.ttl()));
    let orchestrator = build_orchestrator(config, Arc::clone(&cache))?;

    let analysis = orchestrator
        .analyze(&utterance)
        .await
        .context("Failed to analyze request")?;
    cache.clear();

    match format {
        OutputFormat::Text => {
            let plan = &analysis.plan;
            if plan.is_empty() {
                println!("[error] {}", crate::report::EMPTY_PLAN_MESSAGE);
                return Ok(());
            }
            println!("Intent: {}", plan.intent);
            if !plan.entities.is_empty() {
                println!("Entities: {}", Value::Object(plan.entities.clone()));
            }
            println!("Steps:");
            for (i, step) in plan.steps.iter().enumerate() {
                println!(
                    "  {}. {}.{} {}",
                    i + 1,
                    step.provider,
                    step.operation,
                    Value::Object(step.params.clone())
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "plan": analysis.plan,
                "raw_response": analysis.raw,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Print the effective configuration (file values plus overrides)
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let text = toml::to_string_pretty(config).context("Failed to serialize config")?;
            println!("{}", text);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

/// Read the NLU API key from stdin and store it in the OS keychain
pub fn handle_config_set_key(format: OutputFormat) -> Result<()> {
    if matches!(format, OutputFormat::Text) {
        print!("NLU API key: ");
        io::stdout().flush()?;
    }

    let stdin = io::stdin();
    let Some(key) = read_key_line(stdin.lock())? else {
        match format {
            OutputFormat::Text => println!("No key entered; nothing stored."),
            OutputFormat::Json => println!("{}", json!({"stored": false})),
        }
        return Ok(());
    };

    CredentialStore::new(KEYCHAIN_SERVICE)
        .set_secret(NLU_API_KEY, key.unsecure())
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    match format {
        OutputFormat::Text => println!("Stored in keychain."),
        OutputFormat::Json => println!(
            "{}",
            json!({"stored": true, "service": KEYCHAIN_SERVICE, "key": NLU_API_KEY})
        ),
    }
    Ok(())
}

/// First line of `reader`, trimmed. `None` when it is blank.
fn read_key_line<R: BufRead>(mut reader: R) -> Result<Option<SecretString>> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("Failed to read key from stdin")?;
    let key = SecretString::new(line.trim());
    line.zeroize();
    Ok((!key.unsecure().is_empty()).then_some(key))
}

/// Render a report for a human reader.
///
/// Status-prefixed message, then what the surfaced data says, then any
/// validation and report warnings as bullets.
pub fn render_text(report: &ExecutionReport) -> String {
    let prefix = match report.status {
        ReportStatus::Success => "[ok]",
        ReportStatus::PartialSuccess => "[partial]",
        ReportStatus::Error => "[error]",
    };
    let mut out = format!("{} {}", prefix, report.message);

    if let Some(Value::Object(data)) = &report.data {
        let personal = list_len(data.get("personal_tasks_created"));
        let work = list_len(data.get("work_tasks_created"));

        if personal.is_some() || work.is_some() {
            let (personal, work) = (personal.unwrap_or(0), work.unwrap_or(0));
            if personal > 0 || work > 0 {
                out.push_str("\n\nTasks created:");
                if personal > 0 {
                    out.push_str(&format!("\n- Personal: {}", personal));
                }
                if work > 0 {
                    out.push_str(&format!("\n- Work: {}", work));
                }
            }
            if let Some(Value::Array(errors)) = data.get("errors") {
                if !errors.is_empty() {
                    out.push_str(&format!("\n\nErrors ({}):", errors.len()));
                    for error in errors.iter().take(5) {
                        out.push_str(&format!("\n- {}", display_value(error)));
                    }
                }
            }
        } else if let Some(id) = data.get("id") {
            out.push_str(&format!("\n\nID: {}", display_value(id)));
        } else if let Some(name) = data.get("name") {
            out.push_str(&format!("\nName: {}", display_value(name)));
        }
    }

    let warnings: Vec<&String> = report
        .validation
        .iter()
        .flat_map(|v| v.warnings.iter())
        .chain(report.warnings.iter())
        .collect();
    if !warnings.is_empty() {
        out.push_str("\n\nWarnings:");
        for warning in warnings {
            out.push_str(&format!("\n- {}", warning));
        }
    }

    out
}

fn list_len(value: Option<&Value>) -> Option<usize> {
    value.and_then(Value::as_array).map(Vec::len)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
