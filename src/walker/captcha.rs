//! Captcha recovery.
//!
//! Bulk profile crawling makes the board invalidate the session and serve a
//! captcha wall. Recovery needs an operator: retry with the same cookie,
//! retry with a new one, or abort the walk. [`CaptchaRecovery`] holds the
//! protocol state so the decision can come from a console, a script or any
//! other [`OperatorDecisionSource`].

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{debug, info, warn};

use crate::config::is_plausible_cookie;
use crate::fetch::{FetchOutcome, Fetcher, SessionCredential};

/// What the operator wants done about a captcha wall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Fetch again with the current credential.
    Retry,
    /// Swap in a new session token, then fetch again.
    NewCredential(String),
    /// Stop the walk and keep what was collected.
    Abort,
}

/// Source of operator decisions.
#[async_trait]
pub trait OperatorDecisionSource: Send {
    /// Called each time `url` is (still) behind a captcha wall.
    async fn decide(&mut self, url: &str) -> RecoveryDecision;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryState {
    AwaitingOperator,
    Refetching,
    Cleared(String),
    Aborted,
}

/// Next action a driver of [`CaptchaRecovery`] has to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    AskOperator,
    Refetch,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The page came back without a captcha; carries its body.
    Cleared(String),
    Aborted,
}

/// State of one captcha recovery for one URL.
#[derive(Debug)]
pub struct CaptchaRecovery {
    url: String,
    state: RecoveryState,
    attempts: u32,
}

impl CaptchaRecovery {
    /// Start recovery for a page that just returned a captcha wall.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: RecoveryState::AwaitingOperator,
            attempts: 0,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn state(&self) -> &RecoveryState {
        &self.state
    }

    /// Number of re-fetches made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn next_step(&self) -> RecoveryStep {
        match self.state {
            RecoveryState::AwaitingOperator => RecoveryStep::AskOperator,
            RecoveryState::Refetching => RecoveryStep::Refetch,
            RecoveryState::Cleared(_) | RecoveryState::Aborted => RecoveryStep::Done,
        }
    }

    /// Apply an operator decision. Ignored unless awaiting the operator.
    pub fn apply_decision(&mut self, decision: RecoveryDecision, credential: &mut SessionCredential) {
        if self.state != RecoveryState::AwaitingOperator {
            warn!(url = %self.url, "Operator decision received while not awaiting one");
            return;
        }
        self.state = match decision {
            RecoveryDecision::Retry => {
                debug!(url = %self.url, "Retrying with the current session cookie");
                RecoveryState::Refetching
            }
            RecoveryDecision::NewCredential(token) => {
                debug!(url = %self.url, "Retrying with a new session cookie");
                *credential = credential.replaced(token);
                RecoveryState::Refetching
            }
            RecoveryDecision::Abort => {
                info!(url = %self.url, "Operator aborted the walk at a captcha wall");
                RecoveryState::Aborted
            }
        };
    }

    /// Apply the result of a re-fetch. Ignored unless re-fetching.
    pub fn apply_fetch(&mut self, outcome: FetchOutcome) {
        if self.state != RecoveryState::Refetching {
            warn!(url = %self.url, "Fetch result received while not re-fetching");
            return;
        }
        self.attempts += 1;
        self.state = match outcome {
            FetchOutcome::Success(body) => {
                info!(url = %self.url, attempts = self.attempts, "Captcha cleared");
                RecoveryState::Cleared(body)
            }
            FetchOutcome::CaptchaWall(_) => RecoveryState::AwaitingOperator,
            other => {
                warn!(url = %self.url, outcome = other.label(), "Re-fetch did not return the page");
                RecoveryState::AwaitingOperator
            }
        };
    }

    /// Final outcome, once [`Self::next_step`] is [`RecoveryStep::Done`].
    #[must_use]
    pub fn into_outcome(self) -> Option<RecoveryOutcome> {
        match self.state {
            RecoveryState::Cleared(body) => Some(RecoveryOutcome::Cleared(body)),
            RecoveryState::Aborted => Some(RecoveryOutcome::Aborted),
            RecoveryState::AwaitingOperator | RecoveryState::Refetching => None,
        }
    }
}

/// Drive a recovery for `url` until the captcha clears or the operator aborts.
///
/// A new credential chosen by the operator is written back to `credential`.
pub async fn resolve_captcha(
    fetcher: &Fetcher,
    credential: &mut SessionCredential,
    operator: &mut dyn OperatorDecisionSource,
    url: &str,
) -> RecoveryOutcome {
    let mut recovery = CaptchaRecovery::new(url);
    loop {
        match recovery.next_step() {
            RecoveryStep::AskOperator => {
                let decision = operator.decide(url).await;
                recovery.apply_decision(decision, credential);
            }
            RecoveryStep::Refetch => {
                let outcome = fetcher.fetch(url, credential).await;
                recovery.apply_fetch(outcome);
            }
            RecoveryStep::Done => break,
        }
    }
    recovery.into_outcome().unwrap_or(RecoveryOutcome::Aborted)
}

/// Parse an operator's answer: `continue`, `cookie:<token>` or `save`.
#[must_use]
pub fn parse_decision(input: &str) -> Option<RecoveryDecision> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("continue") {
        return Some(RecoveryDecision::Retry);
    }
    if input.eq_ignore_ascii_case("save") {
        return Some(RecoveryDecision::Abort);
    }
    let (prefix, token) = input.split_once(':')?;
    if prefix.trim().eq_ignore_ascii_case("cookie") && is_plausible_cookie(token) {
        return Some(RecoveryDecision::NewCredential(token.trim().to_string()));
    }
    None
}

const PROMPT: &str = "Captcha detected! Options:\n  continue       retry with the current cookie\n  cookie:<VALUE> retry with a new session cookie\n  save           stop and keep the users crawled so far\n> ";

/// Line reader over the operator's console.
pub type ConsoleLines<R = Stdin> = Lines<BufReader<R>>;

/// The process-wide stdin line reader.
///
/// Create it once: a second reader over stdin would lose whatever the first
/// one had already buffered.
#[must_use]
pub fn stdin_lines() -> ConsoleLines {
    BufReader::new(tokio::io::stdin()).lines()
}

async fn write_prompt(prompt: &str) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await
}

/// Ask for a session cookie until a plausible one is entered.
///
/// Returns `None` when the input ends first.
///
/// # Errors
///
/// Returns an error if the console cannot be read or written.
pub async fn prompt_session_cookie<R: AsyncRead + Unpin>(
    lines: &mut ConsoleLines<R>,
    cookie_name: &str,
) -> std::io::Result<Option<String>> {
    loop {
        write_prompt(&format!("Session cookie ({cookie_name}): ")).await?;
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        let token = line.trim();
        if is_plausible_cookie(token) {
            return Ok(Some(token.to_string()));
        }
        warn!("Session cookie must be at least 5 characters");
    }
}

/// Asks the operator on the console.
pub struct ConsoleOperator<R = Stdin> {
    lines: ConsoleLines<R>,
}

impl<R> ConsoleOperator<R> {
    /// Operator reading from `lines`, usually [`stdin_lines`] after any
    /// earlier prompt has used it.
    #[must_use]
    pub fn from_lines(lines: ConsoleLines<R>) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> OperatorDecisionSource for ConsoleOperator<R> {
    async fn decide(&mut self, url: &str) -> RecoveryDecision {
        loop {
            if write_prompt(&format!("\n{url}\n{PROMPT}")).await.is_err() {
                warn!("Cannot write operator prompt, aborting");
                return RecoveryDecision::Abort;
            }
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(input = %line, "Operator input");
                    if let Some(decision) = parse_decision(&line) {
                        return decision;
                    }
                    warn!("Invalid input, expected 'continue', 'cookie:<VALUE>' or 'save'");
                }
                Ok(None) | Err(_) => {
                    warn!("Operator input closed, aborting");
                    return RecoveryDecision::Abort;
                }
            }
        }
    }
}

/// Replays a fixed list of decisions, then aborts.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    decisions: VecDeque<RecoveryDecision>,
    asked: Vec<String>,
}

impl ScriptedOperator {
    #[must_use]
    pub fn new(decisions: impl IntoIterator<Item = RecoveryDecision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// URLs the operator was asked about, in order.
    #[must_use]
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

#[async_trait]
impl OperatorDecisionSource for ScriptedOperator {
    async fn decide(&mut self, url: &str) -> RecoveryDecision {
        self.asked.push(url.to_string());
        self.decisions.pop_front().unwrap_or(RecoveryDecision::Abort)
    }
}
