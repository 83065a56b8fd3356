use crate::domain::category::ResourceCategory;
use crate::domain::ports::{PaymentVerifier, StatusFetcher};
use crate::domain::status::StatusReport;
use crate::domain::verification::{PaymentVerdict, VerifyResponse};
use crate::error::{Result, WatchError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// One scripted backend reply. A leading `!` marks a transport failure, the
/// rest of the token becomes the error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedStep {
    Reply(String),
    Fail(String),
}

impl ScriptedStep {
    pub fn parse(token: &str) -> Self {
        match token.trim().strip_prefix('!') {
            Some(message) => ScriptedStep::Fail(message.to_string()),
            None => ScriptedStep::Reply(token.trim().to_string()),
        }
    }
}

/// Replies for one reference, consumed in order. The last reply repeats once
/// the queue runs dry.
#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<ScriptedStep>,
    calls: u32,
}

impl Script {
    fn next(&mut self) -> Option<ScriptedStep> {
        self.calls += 1;
        if self.steps.len() > 1 {
            self.steps.pop_front()
        } else {
            self.steps.front().cloned()
        }
    }
}

#[derive(Debug, Default)]
struct Scripts(RwLock<HashMap<String, Script>>);

impl Scripts {
    fn insert<I, S>(&mut self, reference: String, steps: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let steps = steps
            .into_iter()
            .map(|step| ScriptedStep::parse(step.as_ref()))
            .collect();
        self.0
            .get_mut()
            .insert(reference, Script { steps, calls: 0 });
    }

    async fn next(&self, reference: &str) -> Result<String> {
        let mut scripts = self.0.write().await;
        let step = scripts
            .get_mut(reference)
            .and_then(Script::next)
            .ok_or_else(|| WatchError::transport(format!("no scripted reply for {reference}")))?;
        match step {
            ScriptedStep::Reply(token) => Ok(token),
            ScriptedStep::Fail(message) => Err(WatchError::Transport(message)),
        }
    }

    async fn calls(&self, reference: &str) -> u32 {
        let scripts = self.0.read().await;
        scripts.get(reference).map_or(0, |script| script.calls)
    }
}

/// A [`StatusFetcher`] that replays scripted status tokens per reference.
///
/// Useful for demos and tests where no real backend is reachable.
#[derive(Debug, Default)]
pub struct ScriptedStatusFetcher {
    scripts: Scripts,
}

impl ScriptedStatusFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script<I, S>(mut self, reference: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.scripts.insert(reference.into(), steps);
        self
    }

    /// How many times `reference` has been fetched.
    pub async fn calls(&self, reference: &str) -> u32 {
        self.scripts.calls(reference).await
    }
}

#[async_trait]
impl StatusFetcher for ScriptedStatusFetcher {
    async fn fetch_status(&self, reference: &str) -> Result<StatusReport> {
        self.scripts.next(reference).await.map(StatusReport::new)
    }
}

/// A [`PaymentVerifier`] that replays scripted gateway replies per reference.
///
/// Reply tokens map onto the raw gateway shapes: `success` and `verified`
/// confirm, `pending`/`processing` keep waiting, anything else is a decline
/// carrying the token as its message.
#[derive(Debug, Default)]
pub struct ScriptedVerifier {
    scripts: Scripts,
}

impl ScriptedVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script<I, S>(mut self, reference: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.scripts.insert(reference.into(), steps);
        self
    }

    pub async fn calls(&self, reference: &str) -> u32 {
        self.scripts.calls(reference).await
    }
}

fn gateway_response(token: &str) -> VerifyResponse {
    match token.to_ascii_lowercase().as_str() {
        "success" => VerifyResponse {
            success: Some(true),
            ..VerifyResponse::default()
        },
        "verified" => VerifyResponse {
            verified: Some(true),
            ..VerifyResponse::default()
        },
        "pending" | "processing" => VerifyResponse {
            status: Some(token.to_string()),
            ..VerifyResponse::default()
        },
        _ => VerifyResponse {
            success: Some(false),
            message: Some(token.to_string()),
            ..VerifyResponse::default()
        },
    }
}

#[async_trait]
impl PaymentVerifier for ScriptedVerifier {
    async fn verify(
        &self,
        _category: ResourceCategory,
        reference: &str,
        _resource_id: Option<&str>,
    ) -> Result<PaymentVerdict> {
        let token = self.scripts.next(reference).await?;
        Ok(gateway_response(&token).into())
    }
}
