//! Outbound notifications.
//!
//! The control loop hands finalized [`Report`]s to a [`Notifier`]. The
//! production notifier is a [`NotificationWorker`]: a single background
//! thread that renders each report and delivers it to a [`ReportSink`], so
//! slow delivery never stalls the next tick.

use std::process::Command;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use tracing::{debug, info, warn};

use crate::core::types::Report;
use crate::io::config::{NotifyConfig, SinkKind};
use crate::io::process::run_with_input;

const REPORT_TEMPLATE: &str = include_str!("report.txt.j2");
const STDERR_LIMIT_BYTES: usize = 16 * 1024;

/// Accepts finalized reports. Must not block on delivery.
pub trait Notifier {
    fn send(&self, report: Report);
}

/// Delivery backend run on the worker thread.
pub trait ReportSink: Send {
    fn deliver(&mut self, report: &Report, rendered: &str) -> Result<()>;
}

/// Template engine wrapper around minijinja.
pub struct ReportRenderer {
    env: Environment<'static>,
}

impl ReportRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("report", REPORT_TEMPLATE)
            .context("load report template")?;
        Ok(Self { env })
    }

    pub fn render(&self, report: &Report) -> Result<String> {
        let template = self.env.get_template("report")?;
        let rendered = template
            .render(context! { report => report })
            .context("render report")?;
        Ok(rendered.trim().to_string())
    }
}

/// Writes rendered reports to the tracing log.
pub struct LogSink;

impl ReportSink for LogSink {
    fn deliver(&mut self, report: &Report, rendered: &str) -> Result<()> {
        match report {
            Report::Completed(_) => info!(station = report.station(), "{rendered}"),
            _ => warn!(station = report.station(), kind = report.kind(), "{rendered}"),
        }
        Ok(())
    }
}

/// Pipes the JSON report into a configured command.
///
/// The rendered text is exported as `GACHABOT_MESSAGE`.
pub struct CommandSink {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandSink {
    pub fn new(command: Vec<String>, timeout: Duration) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(anyhow!("notify command must be a non-empty array"));
        }
        Ok(Self { command, timeout })
    }
}

impl ReportSink for CommandSink {
    fn deliver(&mut self, report: &Report, rendered: &str) -> Result<()> {
        let payload = serde_json::to_vec(report).context("serialize report")?;
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .env("GACHABOT_MESSAGE", rendered)
            .env("GACHABOT_KIND", report.kind());
        let output = run_with_input(cmd, &payload, self.timeout, STDERR_LIMIT_BYTES)
            .with_context(|| format!("run notify command {}", self.command[0]))?;
        if output.timed_out {
            return Err(anyhow!("notify command timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "notify command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy()
            ));
        }
        Ok(())
    }
}

/// Build the sink named by the config.
pub fn sink_from_config(cfg: &NotifyConfig) -> Result<Box<dyn ReportSink>> {
    match cfg.sink {
        SinkKind::Log => Ok(Box::new(LogSink)),
        SinkKind::Command => Ok(Box::new(CommandSink::new(
            cfg.command.clone(),
            Duration::from_secs(cfg.timeout_secs),
        )?)),
    }
}

/// Background delivery thread fed through a channel.
///
/// Dropping the worker closes the channel and waits for queued reports to
/// be delivered.
pub struct NotificationWorker {
    tx: Option<Sender<Report>>,
    handle: Option<JoinHandle<()>>,
    completions: bool,
}

impl NotificationWorker {
    pub fn spawn(sink: Box<dyn ReportSink>, completions: bool) -> Result<Self> {
        let renderer = ReportRenderer::new()?;
        let (tx, rx) = mpsc::channel::<Report>();
        let handle = thread::Builder::new()
            .name("notify".to_string())
            .spawn(move || {
                let mut sink = sink;
                for report in rx {
                    let rendered = match renderer.render(&report) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(err = %format!("{err:#}"), "render report failed, sending kind only");
                            report.kind().to_string()
                        }
                    };
                    if let Err(err) = sink.deliver(&report, &rendered) {
                        warn!(err = %format!("{err:#}"), kind = report.kind(), "report delivery failed");
                    }
                }
                debug!("notification channel closed");
            })
            .context("spawn notification worker")?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            completions,
        })
    }

    /// Close the channel and wait for pending deliveries.
    pub fn finish(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("notification worker panicked");
        }
    }
}

impl Notifier for NotificationWorker {
    fn send(&self, report: Report) {
        if !self.completions && matches!(report, Report::Completed(_)) {
            return;
        }
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(report).is_err() {
            warn!("notification worker is gone, dropping report");
        }
    }
}

impl Drop for NotificationWorker {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use chrono::{TimeZone, Utc};

    use crate::core::health::Health;
    use crate::core::types::{RecoveryOutcome, RunStatistics, Snapshot};

    struct CollectingSink {
        seen: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl ReportSink for CollectingSink {
        fn deliver(&mut self, report: &Report, rendered: &str) -> Result<()> {
            self.seen
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .push((report.kind().to_string(), rendered.to_string()));
            Ok(())
        }
    }

    fn completed() -> Report {
        Report::Completed(RunStatistics {
            station: "crystal".to_string(),
            phase: None,
            time_taken: Duration::from_secs(95),
            resources_gained: BTreeMap::from([("dust".to_string(), 12_000)]),
            is_special_lap: true,
            finished_at: Utc.timestamp_opt(1_700_000_000, 0).single().expect("ts"),
            substitutions: vec!["dust".to_string()],
            health: Health::Nominal,
        })
    }

    fn failure() -> Report {
        Report::Failure {
            station: "grinder".to_string(),
            error: "capture failed".to_string(),
            viewpoint: "Grinder".to_string(),
            snapshot: Some(Snapshot {
                frame_id: 7,
                path: Some("frames/7.png".to_string()),
            }),
            recovery: RecoveryOutcome::Recovered { actions_taken: 2 },
        }
    }

    #[test]
    fn renders_completion() {
        let text = ReportRenderer::new()
            .expect("renderer")
            .render(&completed())
            .expect("render");
        assert!(text.contains("crystal completed"), "{text}");
        assert!(text.contains("dust: 12000 (estimated)"), "{text}");
        assert!(text.contains("refill lap"), "{text}");
        assert!(text.contains("health: ok"), "{text}");
    }

    #[test]
    fn renders_phase_and_health_issues() {
        let Report::Completed(mut stats) = completed() else {
            unreachable!()
        };
        stats.phase = Some("grind".to_string());
        stats.health = Health::Degraded {
            issues: vec!["took 120s, expected at most 100s".to_string()],
        };
        let text = ReportRenderer::new()
            .expect("renderer")
            .render(&Report::Completed(stats))
            .expect("render");
        assert!(text.contains("crystal (grind) completed"), "{text}");
        assert!(text.contains("health: took 120s, expected at most 100s"), "{text}");
    }

    #[test]
    fn renders_failure_with_snapshot() {
        let text = ReportRenderer::new()
            .expect("renderer")
            .render(&failure())
            .expect("render");
        assert!(text.contains("grinder failed: capture failed"), "{text}");
        assert!(text.contains("frames/7.png"), "{text}");
        assert!(text.contains("recovered after 2 action(s)"), "{text}");
    }

    #[test]
    fn worker_delivers_in_order_and_drains_on_finish() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = NotificationWorker::spawn(
            Box::new(CollectingSink {
                seen: Arc::clone(&seen),
            }),
            true,
        )
        .expect("spawn");
        worker.send(completed());
        worker.send(failure());
        worker.finish();

        let seen = seen.lock().expect("lock");
        let kinds: Vec<&str> = seen.iter().map(|(kind, _)| kind.as_str()).collect();
        assert_eq!(kinds, vec!["completed", "failure"]);
    }

    #[test]
    fn completions_can_be_muted() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = NotificationWorker::spawn(
            Box::new(CollectingSink {
                seen: Arc::clone(&seen),
            }),
            false,
        )
        .expect("spawn");
        worker.send(completed());
        worker.send(failure());
        drop(worker);
        assert_eq!(seen.lock().expect("lock").len(), 1);
    }

    #[test]
    fn command_sink_requires_a_program() {
        assert!(CommandSink::new(Vec::new(), Duration::from_secs(1)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn command_sink_receives_json_on_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("report.json");
        let mut sink = CommandSink::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("cat > '{}'", out.display()),
            ],
            Duration::from_secs(5),
        )
        .expect("sink");
        sink.deliver(&failure(), "text").expect("deliver");
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).expect("read")).expect("json");
        assert_eq!(written["kind"], "failure");
        assert_eq!(written["station"], "grinder");
    }
}
