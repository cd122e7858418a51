//! Fleet strategies: the same plan/apply pipeline across many hosts
//!
//! Hosts share nothing but the cancellation token, so parallel fan-out only
//! has to collect results.

use crate::context::CancelToken;
use crate::types::ApplySummary;
use anyhow::Result;
use rayon::prelude::*;
use std::fmt;

/// A machine the pipeline can run against
pub trait Host: Send + Sync {
    fn name(&self) -> &str;

    /// Plan and apply on this host
    fn apply(&self, cancel: &CancelToken) -> Result<ApplySummary>;
}

/// How hosts are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Up to `jobs` hosts at once
    Parallel { jobs: usize },
    /// One host at a time
    Rolling { abort_on_failure: bool },
    /// `size` hosts first, the rest with `jobs` workers only if all of them succeed
    Canary { size: usize, jobs: usize },
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel { jobs } => write!(f, "parallel ({jobs} jobs)"),
            Self::Rolling { .. } => f.write_str("rolling"),
            Self::Canary { size, .. } => write!(f, "canary ({size} first)"),
        }
    }
}

/// Outcome on one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostStatus {
    Succeeded(ApplySummary),
    Failed(String),
    /// Never started: aborted, cancelled or canary failed
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutcome {
    pub host: String,
    pub status: HostStatus,
}

/// Per-host outcomes, in host order
#[derive(Debug, Clone, Default)]
pub struct FleetReport {
    pub outcomes: Vec<HostOutcome>,
}

impl FleetReport {
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, HostStatus::Succeeded(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, HostStatus::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, HostStatus::Skipped))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.skipped() == 0
    }

    fn count(&self, pred: impl Fn(&HostStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Run the pipeline on every host under `strategy`
pub fn run<H: Host>(hosts: &[H], strategy: Strategy, cancel: &CancelToken) -> Result<FleetReport> {
    log::info!("Applying to {} hosts, {}", hosts.len(), strategy);

    let outcomes = match strategy {
        Strategy::Parallel { jobs } => run_parallel(hosts, jobs, cancel)?,
        Strategy::Rolling { abort_on_failure } => {
            let mut outcomes = Vec::with_capacity(hosts.len());
            let mut abort = false;
            for host in hosts {
                if abort {
                    outcomes.push(skipped(host));
                    continue;
                }
                let outcome = apply_host(host, cancel);
                abort = abort_on_failure && matches!(outcome.status, HostStatus::Failed(_));
                outcomes.push(outcome);
            }
            outcomes
        }
        Strategy::Canary { size, jobs } => {
            let (canary, rest) = hosts.split_at(size.min(hosts.len()));
            let mut outcomes = run_parallel(canary, size.max(1), cancel)?;
            if outcomes
                .iter()
                .all(|o| matches!(o.status, HostStatus::Succeeded(_)))
            {
                outcomes.extend(run_parallel(rest, jobs, cancel)?);
            } else {
                log::warn!("Canary failed, skipping {} hosts", rest.len());
                outcomes.extend(rest.iter().map(skipped));
            }
            outcomes
        }
    };

    Ok(FleetReport { outcomes })
}

/// Fan out on a bounded pool
fn run_parallel<H: Host>(hosts: &[H], jobs: usize, cancel: &CancelToken) -> Result<Vec<HostOutcome>> {
    if hosts.is_empty() {
        return Ok(Vec::new());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    Ok(pool.install(|| hosts.par_iter().map(|h| apply_host(h, cancel)).collect()))
}

fn apply_host<H: Host>(host: &H, cancel: &CancelToken) -> HostOutcome {
    if cancel.is_cancelled() {
        return skipped(host);
    }
    let status = match host.apply(cancel) {
        Ok(summary) => HostStatus::Succeeded(summary),
        Err(e) => {
            log::warn!("{}: {:#}", host.name(), e);
            HostStatus::Failed(format!("{e:#}"))
        }
    };
    HostOutcome {
        host: host.name().to_string(),
        status,
    }
}

fn skipped<H: Host>(host: &H) -> HostOutcome {
    HostOutcome {
        host: host.name().to_string(),
        status: HostStatus::Skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeHost {
        name: String,
        fail: bool,
        calls: AtomicUsize,
    }

    fn host(name: &str, fail: bool) -> FakeHost {
        FakeHost {
            name: name.to_string(),
            fail,
            calls: AtomicUsize::new(0),
        }
    }

    impl Host for FakeHost {
        fn name(&self) -> &str {
            &self.name
        }

        fn apply(&self, _cancel: &CancelToken) -> Result<ApplySummary> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("ssh: connection refused");
            }
            Ok(ApplySummary {
                created: 1,
                ..ApplySummary::default()
            })
        }
    }

    fn statuses(report: &FleetReport) -> Vec<&'static str> {
        report
            .outcomes
            .iter()
            .map(|o| match o.status {
                HostStatus::Succeeded(_) => "ok",
                HostStatus::Failed(_) => "failed",
                HostStatus::Skipped => "skipped",
            })
            .collect()
    }

    #[test]
    fn test_parallel_runs_every_host_in_order() {
        let hosts = vec![host("a", false), host("b", true), host("c", false)];
        let report = run(&hosts, Strategy::Parallel { jobs: 2 }, &CancelToken::new()).unwrap();

        assert_eq!(statuses(&report), vec!["ok", "failed", "ok"]);
        assert_eq!(report.outcomes[1].host, "b");
        assert!(!report.is_success());
    }

    #[test]
    fn test_rolling_aborts_after_first_failure() {
        let hosts = vec![host("a", false), host("b", true), host("c", false)];
        let report = run(
            &hosts,
            Strategy::Rolling {
                abort_on_failure: true,
            },
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(statuses(&report), vec!["ok", "failed", "skipped"]);
        assert_eq!(hosts[2].calls.load(Ordering::SeqCst), 0);

        let report = run(
            &hosts,
            Strategy::Rolling {
                abort_on_failure: false,
            },
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(statuses(&report), vec!["ok", "failed", "ok"]);
    }

    #[test]
    fn test_canary_gates_the_rest() {
        let hosts = vec![host("a", true), host("b", false), host("c", false)];
        let report = run(&hosts, Strategy::Canary { size: 1, jobs: 4 }, &CancelToken::new()).unwrap();
        assert_eq!(statuses(&report), vec!["failed", "skipped", "skipped"]);

        let hosts = vec![host("a", false), host("b", false), host("c", true)];
        let report = run(&hosts, Strategy::Canary { size: 2, jobs: 4 }, &CancelToken::new()).unwrap();
        assert_eq!(statuses(&report), vec!["ok", "ok", "failed"]);
        assert_eq!(report.succeeded(), 2);
    }

    #[test]
    fn test_cancelled_hosts_are_skipped() {
        let hosts = vec![host("a", false), host("b", false)];
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = run(&hosts, Strategy::Parallel { jobs: 2 }, &cancel).unwrap();
        assert_eq!(report.skipped(), 2);
        assert_eq!(hosts[0].calls.load(Ordering::SeqCst), 0);
    }
}
