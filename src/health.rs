//! Backend health sweep.
//!
//! Probes every target's health endpoint concurrently and prints a summary
//! table, or JSON with `--json`. Used by `acon status` to check that the
//! agents are reachable before starting a conversation.

use anyhow::Result;
use serde::Serialize;
use std::time::Instant;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::dispatch::error_chain;
use crate::target::Target;

/// Result of probing one target.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub target: Target,
    pub url: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    /// Percentage of healthy targets, 0 to 100.
    pub health_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub summary: HealthSummary,
    pub agents: Vec<ProbeResult>,
}

impl HealthReport {
    fn new(mut agents: Vec<ProbeResult>) -> Self {
        agents.sort_by_key(|p| Target::ALL.iter().position(|t| *t == p.target));
        let total = agents.len();
        let healthy = agents.iter().filter(|p| p.healthy).count();
        let health_rate = if total > 0 {
            healthy as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        Self {
            summary: HealthSummary {
                total,
                healthy,
                unhealthy: total - healthy,
                health_rate,
            },
            agents,
        }
    }

    pub fn all_healthy(&self) -> bool {
        self.summary.unhealthy == 0
    }
}

/// Probe all targets concurrently.
pub async fn probe_all(config: &Config) -> Result<HealthReport> {
    let client = reqwest::Client::builder()
        .timeout(config.dispatch.timeout())
        .build()?;

    let mut set = JoinSet::new();
    for target in Target::ALL {
        let url = format!(
            "{}{}",
            config.targets.base_url(target),
            target.info().health_path
        );
        let client = client.clone();
        set.spawn(async move { probe(&client, target, url).await });
    }

    let mut results = Vec::with_capacity(Target::ALL.len());
    while let Some(joined) = set.join_next().await {
        results.push(joined?);
    }
    Ok(HealthReport::new(results))
}

async fn probe(client: &reqwest::Client, target: Target, url: String) -> ProbeResult {
    let started = Instant::now();
    let outcome = client.get(&url).send().await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(response) => {
            let status = response.status();
            tracing::debug!(agent = %target, %status, latency_ms, "probe finished");
            ProbeResult {
                target,
                url,
                healthy: status.is_success(),
                status: Some(status.as_u16()),
                latency_ms,
                error: None,
            }
        }
        Err(e) => {
            tracing::debug!(agent = %target, error = %e, "probe failed");
            let error = if e.is_timeout() {
                "timed out".to_string()
            } else {
                error_chain(&e)
            };
            ProbeResult {
                target,
                url,
                healthy: false,
                status: None,
                latency_ms,
                error: Some(error),
            }
        }
    }
}

/// Run the status command. Returns whether every agent is healthy.
pub async fn run_status(config: &Config, json: bool) -> Result<bool> {
    let report = probe_all(config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.all_healthy());
    }

    println!("Agent Status");
    println!("============");
    println!();
    println!(
        "  {:<18} {:<8} {:>7} {:>9}   {}",
        "AGENT", "STATE", "HTTP", "LATENCY", "URL"
    );
    println!("  {}", "-".repeat(76));
    for p in &report.agents {
        let state = if p.healthy { "up" } else { "down" };
        let http = p
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<18} {:<8} {:>7} {:>7}ms   {}",
            p.target.display_name(),
            state,
            http,
            p.latency_ms,
            p.url
        );
        if let Some(err) = &p.error {
            println!("  {:<18} {}", "", err);
        }
    }
    println!();
    println!(
        "  {} of {} agents healthy ({:.0}%)",
        report.summary.healthy, report.summary.total, report.summary.health_rate
    );
    println!();

    Ok(report.all_healthy())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(target: Target, healthy: bool) -> ProbeResult {
        ProbeResult {
            target,
            url: String::new(),
            healthy,
            status: healthy.then_some(200),
            latency_ms: 1,
            error: None,
        }
    }

    #[test]
    fn test_summary_counts_and_rate() {
        let report = HealthReport::new(vec![
            result(Target::Orchestrator, true),
            result(Target::Collector, false),
            result(Target::Database, true),
            result(Target::Knowledge, true),
        ]);
        assert_eq!(report.summary.total, 4);
        assert_eq!(report.summary.healthy, 3);
        assert_eq!(report.summary.unhealthy, 1);
        assert_eq!(report.summary.health_rate, 75.0);
        assert!(!report.all_healthy());
        assert_eq!(report.agents[0].target, Target::Collector);
        assert_eq!(report.agents[3].target, Target::Orchestrator);
    }

    #[test]
    fn test_empty_report() {
        let report = HealthReport::new(vec![]);
        assert_eq!(report.summary.health_rate, 0.0);
        assert!(report.all_healthy());
    }

    #[tokio::test]
    async fn test_unreachable_targets_are_unhealthy() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = Config::default();
        config.targets = crate::config::TargetsConfig::all(&format!("http://127.0.0.1:{}", port));
        let report = probe_all(&config).await.unwrap();
        assert_eq!(report.summary.total, 5);
        assert_eq!(report.summary.healthy, 0);
        for probe in &report.agents {
            let error = probe.error.as_deref().unwrap();
            assert!(error.contains("error sending request"), "{}", error);
            assert!(error.to_lowercase().contains("refused"), "{}", error);
        }
    }
}
