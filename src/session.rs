//! Session state machine.
//!
//! [`Session`] owns everything a front end renders: the prompt, the
//! reference image, the quality tier, the generation status, the result
//! history and the two prompt-improvement flags. Every user action maps to a
//! synchronous transition. Calls to the generation client are split into a
//! `begin_*` transition that hands out a ticket and a `finish_*` transition
//! that consumes it, so a host event loop can keep a generation and a prompt
//! improvement in flight at the same time. The async drivers
//! ([`Session::generate`], [`Session::improve_prompt`],
//! [`Session::confirm_and_improve`]) chain the two for sequential callers.

use crate::client::ForgeClient;
use crate::credentials::{CredentialHook, KeySelection, KeySelector};
use crate::error::{ForgeError, Result};
use crate::types::{GeneratedResult, GenerationStatus, QualityTier, ReferenceImage};
use std::sync::Arc;

/// Inputs of a generation call, captured when it started.
#[derive(Debug, Clone)]
#[must_use = "a started generation must be finished"]
pub struct GenerationTicket {
    prompt: String,
    reference: ReferenceImage,
    tier: QualityTier,
}

impl GenerationTicket {
    /// Prompt the call was started with.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Reference image the call was started with.
    pub fn reference(&self) -> &ReferenceImage {
        &self.reference
    }

    /// Quality tier the call was started with.
    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    /// Runs the transformation call for this ticket.
    pub async fn run(&self, client: &dyn ForgeClient) -> Result<String> {
        client
            .request_image_transformation(&self.prompt, &self.reference, self.tier)
            .await
    }
}

/// Input of a prompt improvement call.
#[derive(Debug, Clone)]
#[must_use = "a started improvement must be finished"]
pub struct ImprovementTicket {
    prompt: String,
}

impl ImprovementTicket {
    /// Prompt to improve; empty when the user asked for a random one.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Runs the improvement call for this ticket.
    pub async fn run(&self, client: &dyn ForgeClient) -> String {
        client.request_prompt_improvement(&self.prompt).await
    }
}

/// Result of asking for a prompt improvement.
#[derive(Debug)]
pub enum ImprovementStep {
    /// The prompt is empty; the user must confirm a random prompt first.
    AwaitingConfirmation,
    /// An improvement is already running, or a generation is running with an
    /// empty prompt.
    Busy,
    /// The improvement call may start.
    Started(ImprovementTicket),
}

/// Result of the improvement drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImprovementOutcome {
    /// Waiting for the user to confirm a random prompt.
    AwaitingConfirmation,
    /// Nothing was started.
    Busy,
    /// The prompt was replaced with this text.
    Replaced(String),
}

/// Result of a generation attempt.
#[derive(Debug)]
pub enum GenerationOutcome {
    /// Preconditions were not met; nothing changed.
    Skipped,
    /// A new result was added to the front of the history.
    Succeeded(GeneratedResult),
    /// The call failed and the status is now `Error`.
    Failed {
        /// Classified failure.
        error: ForgeError,
        /// Key selection nudge spawned for credential failures. Dropping the
        /// handle does not cancel it.
        recovery: Option<tokio::task::JoinHandle<()>>,
    },
}

impl GenerationOutcome {
    /// Returns true if a result was produced.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// UI-facing state of one forging session.
#[derive(Debug, Default)]
pub struct Session {
    prompt: String,
    reference: Option<ReferenceImage>,
    quality_tier: QualityTier,
    status: GenerationStatus,
    history: Vec<GeneratedResult>,
    improving_prompt: bool,
    confirming_empty_prompt: bool,
    last_error: Option<String>,
    keys: KeySelector,
}

impl Session {
    /// Creates an empty session without host key selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty session that uses the host's key selection.
    pub fn with_credential_hook(hook: Arc<dyn CredentialHook>) -> Self {
        Self {
            keys: KeySelector::new(hook),
            ..Self::default()
        }
    }

    /// Current prompt text.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Uploaded reference image, if any.
    pub fn reference(&self) -> Option<&ReferenceImage> {
        self.reference.as_ref()
    }

    /// Selected quality tier.
    pub fn quality_tier(&self) -> QualityTier {
        self.quality_tier
    }

    /// Generation status.
    pub fn status(&self) -> GenerationStatus {
        self.status
    }

    /// Past results, most recent first.
    pub fn history(&self) -> &[GeneratedResult] {
        &self.history
    }

    /// Looks up a history entry by id.
    pub fn result(&self, id: &str) -> Option<&GeneratedResult> {
        self.history.iter().find(|r| r.id == id)
    }

    /// True while a prompt improvement is in flight.
    pub fn is_improving_prompt(&self) -> bool {
        self.improving_prompt
    }

    /// True while the random-prompt confirmation is pending.
    pub fn is_confirming_empty_prompt(&self) -> bool {
        self.confirming_empty_prompt
    }

    /// Message of the last failed generation, cleared on success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Replaces the prompt text.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Selects the quality tier for the next generation.
    pub fn set_quality_tier(&mut self, tier: QualityTier) {
        self.quality_tier = tier;
    }

    /// Replaces the reference image. The status is left alone.
    pub fn set_reference(&mut self, reference: ReferenceImage) {
        self.reference = Some(reference);
    }

    /// Removes the reference image.
    pub fn clear_reference(&mut self) {
        self.reference = None;
    }

    /// Opens the host key picker from the settings screen.
    pub async fn open_key_selection(&self) -> KeySelection {
        self.keys.open().await
    }

    /// Loads a history entry back as reference and prompt.
    pub fn use_as_reference(&mut self, id: &str) -> Result<()> {
        let entry = self
            .result(id)
            .ok_or_else(|| ForgeError::InvalidRequest(format!("no result with id {}", id)))?;
        let reference = entry.to_reference()?;
        let prompt = entry.prompt_text.clone();

        self.reference = Some(reference);
        self.prompt = prompt;
        Ok(())
    }

    // Prompt improvement

    /// Handles the "improve my prompt" action.
    pub fn request_improvement(&mut self) -> ImprovementStep {
        if self.improving_prompt {
            return ImprovementStep::Busy;
        }
        if self.prompt.trim().is_empty() {
            if self.status == GenerationStatus::Loading {
                return ImprovementStep::Busy;
            }
            self.confirming_empty_prompt = true;
            return ImprovementStep::AwaitingConfirmation;
        }
        ImprovementStep::Started(self.start_improvement())
    }

    /// The user agreed to a random prompt.
    pub fn confirm_empty_prompt(&mut self) -> Option<ImprovementTicket> {
        if !self.confirming_empty_prompt {
            return None;
        }
        self.confirming_empty_prompt = false;
        if self.improving_prompt {
            return None;
        }
        Some(self.start_improvement())
    }

    /// The user declined a random prompt.
    pub fn decline_empty_prompt(&mut self) {
        self.confirming_empty_prompt = false;
    }

    /// Applies the improved text. Fallback text is applied the same way.
    pub fn finish_improvement(&mut self, _ticket: ImprovementTicket, text: String) {
        self.prompt = text;
        self.improving_prompt = false;
    }

    fn start_improvement(&mut self) -> ImprovementTicket {
        self.improving_prompt = true;
        ImprovementTicket {
            prompt: self.prompt.clone(),
        }
    }

    /// Runs "improve my prompt" to completion.
    pub async fn improve_prompt(&mut self, client: &dyn ForgeClient) -> ImprovementOutcome {
        match self.request_improvement() {
            ImprovementStep::AwaitingConfirmation => ImprovementOutcome::AwaitingConfirmation,
            ImprovementStep::Busy => ImprovementOutcome::Busy,
            ImprovementStep::Started(ticket) => self.complete_improvement(client, ticket).await,
        }
    }

    /// Confirms a random prompt and runs the improvement to completion.
    pub async fn confirm_and_improve(&mut self, client: &dyn ForgeClient) -> ImprovementOutcome {
        match self.confirm_empty_prompt() {
            Some(ticket) => self.complete_improvement(client, ticket).await,
            None => ImprovementOutcome::Busy,
        }
    }

    async fn complete_improvement(
        &mut self,
        client: &dyn ForgeClient,
        ticket: ImprovementTicket,
    ) -> ImprovementOutcome {
        let text = ticket.run(client).await;
        self.finish_improvement(ticket, text.clone());
        ImprovementOutcome::Replaced(text)
    }

    // Generation

    /// Returns true if a generation may start now.
    pub fn can_generate(&self) -> bool {
        !self.prompt.trim().is_empty()
            && self.reference.is_some()
            && self.status != GenerationStatus::Loading
    }

    /// Moves to `Loading` and captures the call inputs.
    pub fn begin_generation(&mut self) -> Option<GenerationTicket> {
        if !self.can_generate() {
            return None;
        }
        let reference = self.reference.clone()?;
        self.status = GenerationStatus::Loading;
        Some(GenerationTicket {
            prompt: self.prompt.clone(),
            reference,
            tier: self.quality_tier,
        })
    }

    /// Records the outcome of a generation call.
    ///
    /// Credential failures also nudge the host key picker without waiting
    /// for it.
    pub fn finish_generation(
        &mut self,
        ticket: GenerationTicket,
        result: Result<String>,
    ) -> GenerationOutcome {
        match result {
            Ok(source_url) => {
                let entry = GeneratedResult::new(source_url, ticket.prompt);
                tracing::info!(id = %entry.id, tier = %ticket.tier, "generation succeeded");
                self.history.insert(0, entry.clone());
                self.status = GenerationStatus::Success;
                self.last_error = None;
                GenerationOutcome::Succeeded(entry)
            }
            Err(error) => {
                self.status = GenerationStatus::Error;
                self.last_error = Some(error.to_string());
                let recovery = if error.is_credential_missing() {
                    self.keys.nudge()
                } else {
                    None
                };
                GenerationOutcome::Failed { error, recovery }
            }
        }
    }

    /// Runs "generate" to completion.
    ///
    /// Does nothing unless a prompt and a reference are present and no
    /// generation is running. For the high tier the host is first asked to
    /// make sure a key is selected.
    pub async fn generate(&mut self, client: &dyn ForgeClient) -> GenerationOutcome {
        if !self.can_generate() {
            return GenerationOutcome::Skipped;
        }
        if self.quality_tier == QualityTier::High {
            self.keys.ensure_selected().await;
        }
        let Some(ticket) = self.begin_generation() else {
            return GenerationOutcome::Skipped;
        };
        let result = ticket.run(client).await;
        self.finish_generation(ticket, result)
    }
}
