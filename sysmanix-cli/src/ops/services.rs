//! Service operations: list, status, start, stop, logs.

use super::output::{print_json, OutputFormat};
use super::ui::{
    finish_progress_error, finish_progress_success, format_level, format_state, print_empty,
    print_error, print_header, print_hint, print_kv, print_progress, print_section,
    print_success, print_table_header, format_uptime, truncate,
};
use crate::client::{read_envelope, Envelope};
use crossterm::style::Stylize;
use serde::{Deserialize, Serialize};
use sysmanix_core::{ActionOutcome, LogEntry, ServiceAction, ServiceInfo, ServiceStatus};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    version: String,
    uptime_secs: u64,
    started_at: String,
    platform: String,
}

/// 服务端存活检查（无需 token）
pub async fn health(client: &reqwest::Client, base: &str, output: OutputFormat) -> anyhow::Result<()> {
    let resp = client.get(format!("{}/health", base)).send().await?;
    let health: Health = read_envelope(resp).await?.into_data()?;

    match output {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            print_success(&format!("{} is healthy", base));
            print_kv("Version", &health.version);
            print_kv("Platform", &health.platform);
            print_kv("Uptime", &format_uptime(health.uptime_secs));
            print_kv("Started", &health.started_at);
        }
    }
    Ok(())
}

/// List services.
pub async fn list_services(
    client: &reqwest::Client,
    base: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let resp = client.get(format!("{}/services", base)).send().await?;
    let services: Vec<ServiceInfo> = read_envelope(resp).await?.into_data()?;

    match output {
        OutputFormat::Json => print_json(&services)?,
        OutputFormat::Table => {
            print_header("📋 SERVICE LIST");

            if services.is_empty() {
                print_empty("No services reported by the platform.");
                return Ok(());
            }

            let active = services.iter().filter(|s| s.is_active).count();
            println!(
                "  Total: {}  |  {} Active  |  {} Inactive",
                services.len().to_string().white().bold(),
                active.to_string().green(),
                (services.len() - active).to_string().dark_grey()
            );
            println!();

            print_table_header(&[("NAME", 32), ("STATUS", 14), ("DESCRIPTION", 40)]);
            for svc in &services {
                println!(
                    "  {:<32} {:<14} {}",
                    truncate(&svc.name, 32).cyan(),
                    format_state(&svc.status, svc.is_active),
                    truncate(&svc.display_name, 40)
                );
            }
            println!();
            print_hint("Use 'status <name>' to see a single service");
        }
    }
    Ok(())
}

/// Show status for one service.
pub async fn status_service(
    client: &reqwest::Client,
    base: &str,
    name: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let resp = client
        .get(format!("{}/services/status/{}", base, name))
        .send()
        .await?;
    let status: ServiceStatus = read_envelope(resp).await?.into_data()?;

    match output {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            print_header(&format!("📦 SERVICE: {}", name));
            print_kv("Name", &status.name);
            print_kv("Status", &format_state(&status.status, status.is_active));
            print_kv("Updated", &status.updated_at.to_rfc3339());
            println!();
        }
    }
    Ok(())
}

pub async fn start_service(
    client: &reqwest::Client,
    base: &str,
    name: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    transition(client, base, name, ServiceAction::Start, output).await
}

pub async fn stop_service(
    client: &reqwest::Client,
    base: &str,
    name: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    transition(client, base, name, ServiceAction::Stop, output).await
}

async fn transition(
    client: &reqwest::Client,
    base: &str,
    name: &str,
    action: ServiceAction,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let url = format!("{}/services/{}/{}", base, action.as_str(), name);

    if output == OutputFormat::Json {
        let resp = client.post(url).send().await?;
        let outcome: ActionOutcome = read_envelope(resp).await?.into_data()?;
        return print_json(&outcome);
    }

    let (title, verb) = match action {
        ServiceAction::Start => ("▶️  START SERVICE", "Starting"),
        ServiceAction::Stop => ("⏹️  STOP SERVICE", "Stopping"),
    };
    print_header(&format!("{}: {}", title, name));
    print_progress(&format!("{} service", verb));

    // 服务端会轮询确认状态，可能需要数秒
    let result: anyhow::Result<Envelope<ActionOutcome>> = async {
        let resp = client.post(url).send().await?;
        read_envelope(resp).await
    }
    .await;

    match result {
        Ok(envelope) => {
            finish_progress_success(&envelope.message);
            let outcome = envelope.into_data()?;
            println!();
            print_kv("Status", &format_state(&outcome.status, is_active_state(&outcome.status)));
            if !outcome.changed {
                print_hint("Service was already in the requested state; nothing was sent");
            }
            println!();
            Ok(())
        }
        Err(e) => {
            finish_progress_error(&format!("Failed to {}", action.as_str()));
            println!();
            print_error(&format!("{}", e));
            Err(e)
        }
    }
}

/// Show recent log lines.
pub async fn logs_service(
    client: &reqwest::Client,
    base: &str,
    name: &str,
    lines: Option<usize>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let mut request = client.get(format!("{}/services/logs/{}", base, name));
    if let Some(n) = lines {
        request = request.query(&[("lines", n)]);
    }
    let logs: Vec<LogEntry> = read_envelope(request.send().await?).await?.into_data()?;

    match output {
        OutputFormat::Json => print_json(&logs)?,
        OutputFormat::Table => {
            print_section(&format!("Logs: {} ({} entries)", name, logs.len()));
            if logs.is_empty() {
                print_empty("No log entries.");
                return Ok(());
            }
            for entry in &logs {
                println!(
                    "  {} {} {}",
                    entry.time.as_str().dark_grey(),
                    format_level(&entry.level),
                    entry.message
                );
            }
            println!();
            print_success(&format!("{} entries", logs.len()));
        }
    }
    Ok(())
}

/// systemd 的 active 或 Windows 的 Running
fn is_active_state(status: &str) -> bool {
    status.eq_ignore_ascii_case("active") || status.eq_ignore_ascii_case("running")
}
