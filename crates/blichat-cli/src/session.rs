//! Relay sessions over the in-memory endpoints
//!
//! A session drives a real relay with scripted input: live-room events on one
//! side, operator messages on the other. `simulate` feeds it a scenario file,
//! `run` feeds it JSON lines from stdin. When the input ends the feeds are
//! closed, the relay drains and the recorded traffic becomes a `Report`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use blichat_core::{EndpointError, EventKind, MessageId, RawEvent, RelayConfig, UserId};
use blichat_harness::{MemoryMessaging, MemoryStream};
use blichat_runtime::{RelayBuilder, RelayHandle, RelaySummary};

use crate::error::{CliError, Result};

/// How long an operator reply waits for the comment it refers to
const REPLY_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

// ----------------------------------------------------------------------------
// Scenario
// ----------------------------------------------------------------------------

/// One step of scripted input
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Audience comment in the live room
    Comment { uid: u64, uname: String, msg: String },
    /// Any raw live-stream event
    Event(RawEvent),
    /// Operator message; `reply_to` is the 1-based position of a relayed comment
    Operator {
        text: String,
        #[serde(default)]
        reply_to: Option<usize>,
    },
    /// Make the next live-room sends fail with a network error
    FailLiveSends { count: usize },
    /// Pause before the next step
    Wait { ms: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

pub struct Session {
    stream: Arc<MemoryStream>,
    messaging: Arc<MemoryMessaging>,
    handle: RelayHandle,
    steps: usize,
}

impl Session {
    pub async fn start(config: RelayConfig) -> Result<Self> {
        let stream = Arc::new(MemoryStream::new());
        // The console speaks as the first allowed operator
        let operator = config
            .allowed_operator_ids
            .first()
            .copied()
            .unwrap_or(UserId(config.chat_id.0));
        let messaging = Arc::new(MemoryMessaging::with_operator(config.chat_id, operator));
        let handle = RelayBuilder::new(config)
            .with_stream(stream.clone())
            .with_messaging(messaging.clone())
            .build_and_start()
            .await?;
        Ok(Self {
            stream,
            messaging,
            handle,
            steps: 0,
        })
    }

    /// Feed one step into the relay
    pub async fn apply(&mut self, step: Step) -> Result<()> {
        self.steps += 1;
        let index = self.steps;
        debug!("Applying step {}: {:?}", index, step);

        match step {
            Step::Comment { uid, uname, msg } => {
                let payload = json!({ "uid": uid, "uname": uname, "msg": msg });
                self.stream
                    .push(RawEvent::new(EventKind::Comment, payload))
                    .await?;
            }
            Step::Event(event) => self.stream.push(event).await?,
            Step::Operator { text, reply_to } => {
                let message = match reply_to {
                    Some(position) => {
                        let relayed = self.relayed(index, position).await?;
                        self.messaging.operator_replies(relayed, &text)
                    }
                    None => self.messaging.operator_says(&text),
                };
                self.messaging.push(message).await?;
            }
            Step::FailLiveSends { count } => {
                self.stream.faults().fail_next_n(
                    count,
                    EndpointError::Network {
                        reason: "scripted failure".into(),
                    },
                );
            }
            Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
        Ok(())
    }

    pub async fn run_scenario(&mut self, scenario: Scenario) -> Result<()> {
        for step in scenario.steps {
            self.apply(step).await?;
        }
        Ok(())
    }

    /// Message id of the relayed comment at a 1-based position
    async fn relayed(&self, step: usize, position: usize) -> Result<MessageId> {
        if position == 0 {
            return Err(CliError::Script {
                step,
                reason: "reply_to positions start at 1".into(),
            });
        }
        let relayed = self
            .messaging
            .wait_for_messages(position, REPLY_RESOLVE_TIMEOUT)
            .await
            .ok_or_else(|| CliError::Script {
                step,
                reason: format!("relayed comment #{position} never arrived"),
            })?;
        Ok(relayed[position - 1].message_id)
    }

    /// End both feeds, let the relay drain and collect the traffic
    pub async fn finish(self) -> Report {
        self.stream.close();
        self.messaging.close();
        let summary = self.handle.wait().await;

        Report {
            relayed: self
                .messaging
                .sent_messages()
                .into_iter()
                .map(|m| m.text)
                .collect(),
            live_room: self.stream.sent_texts(),
            notices: self
                .messaging
                .notices()
                .into_iter()
                .map(|n| n.text)
                .collect(),
            stats: ReportStats::from(&summary),
        }
    }
}

// ----------------------------------------------------------------------------
// Report
// ----------------------------------------------------------------------------

/// Traffic recorded during a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Comments posted to the messaging channel
    pub relayed: Vec<String>,
    /// Texts posted into the live room
    pub live_room: Vec<String>,
    /// Notices sent to the operator
    pub notices: Vec<String>,
    pub stats: ReportStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportStats {
    pub events_received: u64,
    pub events_discarded: u64,
    pub operator_messages: u64,
    pub live_sent: u64,
    pub live_failed: u64,
    pub live_retries: u64,
    pub backpressured: u64,
    pub correlations: usize,
    pub drained: bool,
}

impl From<&RelaySummary> for ReportStats {
    fn from(summary: &RelaySummary) -> Self {
        Self {
            events_received: summary.forward.received,
            events_discarded: summary.forward.discarded,
            operator_messages: summary.reverse.received,
            live_sent: summary.gate.sent,
            live_failed: summary.gate.failed,
            live_retries: summary.gate.retries,
            backpressured: summary.gate.rejected_backpressure,
            correlations: summary.correlation.entries,
            drained: summary.drained,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== messaging channel ==")?;
        for (i, text) in self.relayed.iter().enumerate() {
            writeln!(f, "#{} {}", i + 1, text)?;
        }
        writeln!(f, "== live room ==")?;
        for text in &self.live_room {
            writeln!(f, "{text}")?;
        }
        if !self.notices.is_empty() {
            writeln!(f, "== operator notices ==")?;
            for text in &self.notices {
                writeln!(f, "{text}")?;
            }
        }
        let s = &self.stats;
        writeln!(f, "== summary ==")?;
        writeln!(
            f,
            "events: {} received, {} discarded",
            s.events_received, s.events_discarded
        )?;
        writeln!(
            f,
            "live room: {} sent, {} failed, {} retries, {} backpressured",
            s.live_sent, s.live_failed, s.live_retries, s.backpressured
        )?;
        write!(
            f,
            "operator messages: {}, correlations held: {}",
            s.operator_messages, s.correlations
        )
    }
}
