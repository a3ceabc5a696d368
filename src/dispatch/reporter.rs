//! Audit trail of state machine transitions.
//!
//! Atomic reports are collected into a full report and handed to a
//! [`ReportSink`] on a timer or once enough are pending. Reports the sink
//! refuses stay buffered for the next flush.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::actuator::ActuatorCommand;
use crate::config::ReporterConfig;
use crate::domain::{ActuatorAction, UnixMs, Versioned};
use crate::mailbox::MailboxClosed;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReportError {
    #[error("Report sink unavailable: {0}")]
    Unavailable(String),
    #[error("Report encoding failed: {0}")]
    Encoding(String),
}

/// One transition of one machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsmAtomicReport {
    pub machine: String,
    pub from_state: String,
    pub event: String,
    pub to_state: String,
    pub actions: Vec<ActuatorAction>,
    pub trigger_ids: Vec<u64>,
    pub timestamp_ms: UnixMs,
}

impl FsmAtomicReport {
    pub fn new(
        machine: impl Into<String>,
        from_state: impl ToString,
        event: impl ToString,
        to_state: impl ToString,
        commands: &[ActuatorCommand],
    ) -> Self {
        Self {
            machine: machine.into(),
            from_state: from_state.to_string(),
            event: event.to_string(),
            to_state: to_state.to_string(),
            actions: commands.iter().map(|c| c.action).collect(),
            trigger_ids: commands.iter().map(|c| c.trigger_id).collect(),
            timestamp_ms: UnixMs::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsmFullReport {
    pub from_name: String,
    pub trigger_id: Uuid,
    pub atomic_list: Vec<FsmAtomicReport>,
}

impl Versioned for FsmFullReport {
    const TYPE_NAME: &'static str = "fsm.full.report";
    const VERSION: &'static str = "000";
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, report: FsmFullReport) -> Result<(), ReportError>;
}

/// Writes every report to the log as JSON
#[derive(Debug, Default)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    async fn publish(&self, report: FsmFullReport) -> Result<(), ReportError> {
        let entries = report.atomic_list.len();
        let json = crate::domain::Envelope::seal(report)
            .to_json()
            .map_err(|e| ReportError::Encoding(e.to_string()))?;
        info!(entries, report = %json, "fsm report");
        Ok(())
    }
}

pub enum ReporterMessage {
    Record(FsmAtomicReport),
    Flush(oneshot::Sender<usize>),
    Shutdown,
}

#[derive(Clone)]
pub struct ReporterHandle {
    tx: mpsc::Sender<ReporterMessage>,
}

impl std::fmt::Debug for ReporterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReporterHandle").finish_non_exhaustive()
    }
}

impl ReporterHandle {
    pub async fn record(&self, report: FsmAtomicReport) -> Result<(), MailboxClosed> {
        self.tx
            .send(ReporterMessage::Record(report))
            .await
            .map_err(|_| MailboxClosed("reporter"))
    }

    /// Flush now; resolves to the number of full reports still buffered
    pub async fn flush(&self) -> Result<usize, MailboxClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ReporterMessage::Flush(reply))
            .await
            .map_err(|_| MailboxClosed("reporter"))?;
        rx.await.map_err(|_| MailboxClosed("reporter"))
    }

    pub async fn shutdown(&self) {
        if self.tx.send(ReporterMessage::Shutdown).await.is_err() {
            warn!("reporter already stopped");
        }
    }
}

pub struct Reporter {
    config: ReporterConfig,
    from_name: String,
    sink: Arc<dyn ReportSink>,
    mailbox: mpsc::Receiver<ReporterMessage>,
    pending: Vec<FsmAtomicReport>,
    unsent: VecDeque<FsmFullReport>,
}

impl Reporter {
    pub fn new(config: ReporterConfig, from_name: impl Into<String>, sink: Arc<dyn ReportSink>) -> (Self, ReporterHandle) {
        let (tx, mailbox) = mpsc::channel(config.mailbox_capacity);
        let reporter = Self {
            config,
            from_name: from_name.into(),
            sink,
            mailbox,
            pending: Vec::new(),
            unsent: VecDeque::new(),
        };
        (reporter, ReporterHandle { tx })
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.config.flush_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        info!(from = %self.from_name, "reporter started");

        loop {
            tokio::select! {
                message = self.mailbox.recv() => match message {
                    Some(ReporterMessage::Record(report)) => {
                        self.pending.push(report);
                        if self.pending.len() >= self.config.flush_threshold {
                            self.flush().await;
                        }
                    }
                    Some(ReporterMessage::Flush(reply)) => {
                        self.flush().await;
                        let _ = reply.send(self.unsent.len());
                    }
                    Some(ReporterMessage::Shutdown) | None => break,
                },
                _ = ticker.tick() => self.flush().await,
            }
        }

        self.flush().await;
        if !self.unsent.is_empty() {
            error!(lost = self.unsent.len(), "reporter stopped with unsent reports");
        }
        info!("reporter stopped");
    }

    async fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.unsent.push_back(FsmFullReport {
                from_name: self.from_name.clone(),
                trigger_id: Uuid::new_v4(),
                atomic_list: std::mem::take(&mut self.pending),
            });
            while self.unsent.len() > self.config.max_buffered_reports {
                if let Some(dropped) = self.unsent.pop_front() {
                    error!(
                        trigger_id = %dropped.trigger_id,
                        entries = dropped.atomic_list.len(),
                        "report buffer full, dropping oldest report"
                    );
                }
            }
        }

        while let Some(report) = self.unsent.front() {
            match self.sink.publish(report.clone()).await {
                Ok(()) => {
                    debug!(trigger_id = %report.trigger_id, entries = report.atomic_list.len(), "report flushed");
                    self.unsent.pop_front();
                }
                Err(e) => {
                    warn!(error = %e, buffered = self.unsent.len(), "report flush failed, keeping for retry");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::test_config;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn atomic(event: &str) -> FsmAtomicReport {
        FsmAtomicReport::new("test-machine", "HpOff", event, "HpOn", &[])
    }

    #[tokio::test]
    async fn test_threshold_triggers_flush() {
        let mut config = test_config().reporter;
        config.flush_threshold = 2;
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink_log = published.clone();
        let mut sink = MockReportSink::new();
        sink.expect_publish().returning(move |r| {
            sink_log.lock().unwrap().push(r);
            Ok(())
        });

        let (reporter, handle) = Reporter::new(config, "test.scada", Arc::new(sink));
        let task = tokio::spawn(reporter.run());
        handle.record(atomic("ChargeBuffer")).await.unwrap();
        handle.record(atomic("BufferFull")).await.unwrap();
        assert_eq!(handle.flush().await.unwrap(), 0);

        let published = published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].from_name, "test.scada");
        let events: Vec<_> = published[0].atomic_list.iter().map(|a| a.event.as_str()).collect();
        assert_eq!(events, vec!["ChargeBuffer", "BufferFull"]);

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_flush_is_buffered_and_retried() {
        let config = test_config().reporter;
        let healthy = Arc::new(AtomicBool::new(false));
        let flag = healthy.clone();
        let mut sink = MockReportSink::new();
        sink.expect_publish().returning(move |_| {
            if flag.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ReportError::Unavailable("broker down".to_string()))
            }
        });

        let (reporter, handle) = Reporter::new(config, "test.scada", Arc::new(sink));
        let task = tokio::spawn(reporter.run());
        handle.record(atomic("ChargeBuffer")).await.unwrap();
        assert_eq!(handle.flush().await.unwrap(), 1);
        handle.record(atomic("BufferFull")).await.unwrap();
        assert_eq!(handle.flush().await.unwrap(), 2);

        healthy.store(true, Ordering::SeqCst);
        assert_eq!(handle.flush().await.unwrap(), 0);

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_buffer_bound_drops_oldest() {
        let mut config = test_config().reporter;
        config.max_buffered_reports = 2;
        let mut sink = MockReportSink::new();
        sink.expect_publish()
            .returning(|_| Err(ReportError::Unavailable("down".to_string())));

        let (reporter, handle) = Reporter::new(config, "test.scada", Arc::new(sink));
        let task = tokio::spawn(reporter.run());
        for event in ["a", "b", "c"] {
            handle.record(atomic(event)).await.unwrap();
            handle.flush().await.unwrap();
        }
        assert_eq!(handle.flush().await.unwrap(), 2);

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_flush() {
        let config = test_config().reporter;
        let interval = config.flush_interval();
        let published = Arc::new(Mutex::new(0usize));
        let count = published.clone();
        let mut sink = MockReportSink::new();
        sink.expect_publish().returning(move |_| {
            *count.lock().unwrap() += 1;
            Ok(())
        });

        let (reporter, handle) = Reporter::new(config, "test.scada", Arc::new(sink));
        let task = tokio::spawn(reporter.run());
        handle.record(atomic("ChargeBuffer")).await.unwrap();
        tokio::time::sleep(interval + std::time::Duration::from_millis(10)).await;
        assert_eq!(*published.lock().unwrap(), 1);

        handle.shutdown().await;
        task.await.unwrap();
    }
}
