//! Pipeline orchestrator.
//!
//! Flow per input:
//! 1. Assign a conversation id
//! 2. Extract the text of a binary PDF, once, for the classifier and agent
//! 3. Classify (format, intent)
//! 4. Run the one agent registered for the format, or synthesize an
//!    `Unclassified` record when there is none
//! 5. Route to an action
//! 6. Write the context to the store, once
//!
//! Agent errors and panics are downgraded to an `Unclassified` record; only a
//! store failure fails the run.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agents::compliance::ComplianceMatcher;
use crate::agents::{AgentRegistry, ExtractionAgent};
use crate::config::IntakeConfig;
use crate::error::{PipelineError, StoreError};
use crate::extract::{TextExtractor, panic_message};
use crate::pipeline::classifier::Classifier;
use crate::pipeline::router::ActionRouter;
use crate::pipeline::state::{PipelineStage, RunState};
use crate::pipeline::types::{
    ClassificationResult, ConversationContext, ExtractionRecord, PipelineResponse, RawInput,
};
use crate::store::ContextStore;

/// Sequences classifier → agent → router → store for each input.
pub struct IntakePipeline {
    extractor: Arc<dyn TextExtractor>,
    classifier: Classifier,
    agents: AgentRegistry,
    router: ActionRouter,
    store: Arc<dyn ContextStore>,
}

impl IntakePipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        classifier: Classifier,
        agents: AgentRegistry,
        router: ActionRouter,
        store: Arc<dyn ContextStore>,
    ) -> Self {
        Self {
            extractor,
            classifier,
            agents,
            router,
            store,
        }
    }

    /// Wire the standard classifier, agents and rule table from configuration.
    pub fn from_config(
        config: &IntakeConfig,
        extractor: Arc<dyn TextExtractor>,
        store: Arc<dyn ContextStore>,
    ) -> Result<Self, regex::Error> {
        let compliance = Arc::new(ComplianceMatcher::new(
            config.regulatory_keywords.as_slice(),
        )?);
        Ok(Self::new(
            Arc::clone(&extractor),
            Classifier::new(Arc::clone(&compliance)),
            AgentRegistry::with_defaults(
                compliance,
                extractor,
                config.summary_lines,
                config.summary_max_chars,
            ),
            ActionRouter::default_rules(config.high_value_threshold),
            store,
        ))
    }

    /// Run one input through the pipeline.
    pub async fn run(&self, input: RawInput) -> Result<PipelineResponse, PipelineError> {
        let mut run = RunState::received();
        let conversation_id = run.conversation_id;
        let raw_input_ref = input.to_ref();
        info!(
            conversation_id = %conversation_id,
            source = ?raw_input_ref.source,
            filename = raw_input_ref.filename.as_deref().unwrap_or("-"),
            bytes = raw_input_ref.byte_len,
            "Processing input"
        );

        let input = self.decode(conversation_id, input).await;
        let classification = self.classifier.classify(&input);
        advance(&mut run, PipelineStage::Classified);

        let extraction = self.extract(conversation_id, input, &classification).await;
        advance(&mut run, PipelineStage::Extracted);

        let action = self.router.route(&classification, &extraction);
        advance(&mut run, PipelineStage::Routed);
        info!(
            conversation_id = %conversation_id,
            format = %classification.format,
            intent = %classification.intent,
            record = extraction.label(),
            action = action.action_type.label(),
            status = action.status.label(),
            "Action decided"
        );

        let context = ConversationContext {
            id: conversation_id,
            raw_input_ref,
            classification,
            extraction,
            action,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.put(conversation_id, &context).await {
            advance(&mut run, PipelineStage::Failed);
            error!(
                conversation_id = %conversation_id,
                error = %e,
                "Context store write failed"
            );
            return Err(PipelineError::StoreUnavailable {
                conversation_id,
                source: e,
            });
        }
        advance(&mut run, PipelineStage::Persisted);

        let response = PipelineResponse::from(context);
        advance(&mut run, PipelineStage::Responded);
        Ok(response)
    }

    /// Run independent inputs concurrently. Results are in input order.
    pub async fn run_batch(
        &self,
        inputs: Vec<RawInput>,
    ) -> Vec<Result<PipelineResponse, PipelineError>> {
        let count = inputs.len();
        info!(count, "Processing input batch");

        let results = join_all(inputs.into_iter().map(|input| self.run(input))).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total = count, "Some inputs in batch failed");
        }
        info!(processed = count - failed, total = count, "Batch processing complete");
        results
    }

    /// Read a stored conversation back.
    pub async fn conversation(&self, id: Uuid) -> Result<Option<ConversationContext>, StoreError> {
        self.store.get(id).await
    }

    /// Swap a binary PDF payload for its text. An unreadable PDF becomes
    /// empty text.
    async fn decode(&self, conversation_id: Uuid, input: RawInput) -> RawInput {
        if !input.is_pdf_binary() {
            return input;
        }

        let extractor = Arc::clone(&self.extractor);
        let payload = input.payload().to_vec();
        let text = match tokio::task::spawn_blocking(move || extractor.extract_text(&payload)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "PDF text extraction failed; continuing with empty text"
                );
                String::new()
            }
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "PDF text extraction did not complete; continuing with empty text"
                );
                String::new()
            }
        };
        debug!(
            conversation_id = %conversation_id,
            chars = text.chars().count(),
            "PDF text extracted"
        );
        input.into_extracted_pdf(text)
    }

    async fn extract(
        &self,
        conversation_id: Uuid,
        input: RawInput,
        classification: &ClassificationResult,
    ) -> ExtractionRecord {
        let Some(agent) = self.agents.for_format(classification.format) else {
            return ExtractionRecord::not_applicable(classification);
        };

        match run_agent(Arc::clone(&agent), input, classification.clone()).await {
            Ok(record) => record,
            Err(fault) => {
                warn!(
                    conversation_id = %conversation_id,
                    agent = agent.name(),
                    fault = %fault,
                    "Extraction agent faulted; downgrading to Unclassified"
                );
                ExtractionRecord::agent_fault(classification, fault)
            }
        }
    }
}

/// Run an agent off the async runtime, folding errors and panics into one
/// fault message.
async fn run_agent(
    agent: Arc<dyn ExtractionAgent>,
    input: RawInput,
    classification: ClassificationResult,
) -> Result<ExtractionRecord, String> {
    let name = agent.name().to_string();
    let handle =
        tokio::task::spawn_blocking(move || agent.process(&input, &classification));
    match handle.await {
        Ok(Ok(record)) => Ok(record),
        Ok(Err(fault)) => Err(fault.to_string()),
        Err(e) if e.is_panic() => Err(format!(
            "agent {name} panicked: {}",
            panic_message(e.into_panic().as_ref())
        )),
        Err(e) => Err(format!("agent {name} did not complete: {e}")),
    }
}

fn advance(run: &mut RunState, next: PipelineStage) {
    match run.transition_to(next) {
        Ok(()) => debug!(conversation_id = %run.conversation_id, stage = %next, "Pipeline stage"),
        Err(e) => {
            error!(conversation_id = %run.conversation_id, error = %e, "Invalid pipeline transition")
        }
    }
}
