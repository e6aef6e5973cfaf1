use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use ragchat_llm::{
    build_history, ChatClient, ChatOptions, ChatRequest, HistoryEntry, Message, StreamEvent,
};
use ragchat_persist::{AssistantStore, MessageStore, ThreadStore};
use ragchat_types::{
    Assistant, CallerIdentity, ChatMessage, ChatThread, Citation, GenerationDefaults,
    MessageOptions, StreamFrame, TurnSettings,
};
use tokio_util::sync::CancellationToken;

use crate::citations::CitationSet;
use crate::error::{PersistStage, TurnError};
use crate::retrieval::{GroundingTarget, Retriever};
use crate::retry::RetryPolicy;
use crate::sink::OutputSink;
use crate::template::{render_grounding_prompt, DEFAULT_GROUNDING_TEMPLATE};
use crate::title::truncate_title;

#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub thread_id: String,
    pub prompt: String,
}

impl TurnRequest {
    pub fn new(thread_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
    pub citations: Vec<Citation>,
    pub thread: ChatThread,
    pub cancelled: bool,
    pub title_changed: bool,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Chat deployment used for every completion
    pub deployment: String,
    pub defaults: GenerationDefaults,
    pub retry: RetryPolicy,
    pub grounding_template: String,
    /// Longest a single frame may wait on a caller that stopped reading
    pub sink_write_timeout: Duration,
}

pub const DEFAULT_SINK_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

impl OrchestratorConfig {
    pub fn new(deployment: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            defaults: GenerationDefaults::default(),
            retry: RetryPolicy::default(),
            grounding_template: DEFAULT_GROUNDING_TEMPLATE.to_string(),
            sink_write_timeout: DEFAULT_SINK_WRITE_TIMEOUT,
        }
    }
}

/// A validated and authorized turn, ready to run
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    prompt: String,
    caller: CallerIdentity,
    thread: ChatThread,
    started_at: DateTime<Utc>,
}

impl PreparedTurn {
    pub fn thread(&self) -> &ChatThread {
        &self.thread
    }
}

/// What the completion stream produced
struct Generated {
    text: String,
    engine_citations: Vec<Citation>,
    finish_reason: Option<String>,
    cancelled: bool,
    failure: Option<anyhow::Error>,
}

/// Forwards frames until the caller goes away, then swallows them
///
/// A write never outlives the turn's cancellation or the write timeout, so a
/// caller that stops reading cannot hold up generation or persistence.
struct Output<'a> {
    sink: &'a mut dyn OutputSink,
    cancel: CancellationToken,
    write_timeout: Duration,
    connected: bool,
}

impl<'a> Output<'a> {
    fn new(sink: &'a mut dyn OutputSink, cancel: CancellationToken, write_timeout: Duration) -> Self {
        Self {
            sink,
            cancel,
            write_timeout,
            connected: true,
        }
    }

    async fn send(&mut self, frame: StreamFrame) {
        if !self.connected {
            return;
        }

        let write = tokio::time::timeout(self.write_timeout, self.sink.send(frame));
        let result = if self.cancel.is_cancelled() {
            write.await
        } else {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    tracing::debug!("Dropped pending frame on cancellation");
                    return;
                }
                result = write => result,
            }
        };

        match result {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                tracing::warn!("Caller disconnected; finishing turn without streaming");
                self.connected = false;
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "Caller stopped reading; finishing turn without streaming"
                );
                self.connected = false;
            }
        }
    }
}

/// Runs one retrieval-augmented chat turn from prompt to persisted messages
pub struct Orchestrator {
    threads: Arc<dyn ThreadStore>,
    messages: Arc<dyn MessageStore>,
    assistants: Arc<dyn AssistantStore>,
    chat: Arc<dyn ChatClient>,
    retriever: Retriever,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub(crate) fn new(
        threads: Arc<dyn ThreadStore>,
        messages: Arc<dyn MessageStore>,
        assistants: Arc<dyn AssistantStore>,
        chat: Arc<dyn ChatClient>,
        retriever: Retriever,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            threads,
            messages,
            assistants,
            chat,
            retriever,
            config,
        }
    }

    pub fn builder() -> crate::builder::OrchestratorBuilder {
        crate::builder::OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validate, prepare and run a turn
    pub async fn handle_turn(
        &self,
        request: TurnRequest,
        caller: &CallerIdentity,
        sink: &mut dyn OutputSink,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let turn = self.prepare(request, caller).await?;
        self.run(turn, sink, cancel).await
    }

    /// Validate the request, load the thread and check ownership
    ///
    /// Nothing beyond the thread lookup touches a collaborator, so failures
    /// here leave no trace.
    pub async fn prepare(
        &self,
        request: TurnRequest,
        caller: &CallerIdentity,
    ) -> Result<PreparedTurn, TurnError> {
        let started_at = Utc::now();

        if request.thread_id.trim().is_empty() {
            return Err(TurnError::Validation("Thread id is required".to_string()));
        }
        if request.prompt.trim().is_empty() {
            return Err(TurnError::Validation("Prompt must not be empty".to_string()));
        }

        let thread = self
            .threads
            .get_by_id(&request.thread_id)
            .await?
            .filter(|t| !t.is_deleted)
            .ok_or_else(|| TurnError::NotFound(request.thread_id.clone()))?;

        if !thread.is_owned_by(&caller.user_id) {
            tracing::warn!(thread_id = %thread.id, "Rejected turn from non-owner");
            return Err(TurnError::Forbidden);
        }

        Ok(PreparedTurn {
            prompt: request.prompt,
            caller: caller.clone(),
            thread,
            started_at,
        })
    }

    /// Run a prepared turn, streaming frames to `sink`
    ///
    /// Every error returned from here has also been reported to the sink as an
    /// error frame.
    pub async fn run(
        &self,
        turn: PreparedTurn,
        sink: &mut dyn OutputSink,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let mut out = Output::new(sink, cancel.clone(), self.config.sink_write_timeout);
        let thread_id = turn.thread.id.clone();

        match self.execute(turn, &mut out, cancel).await {
            Ok(outcome) => {
                out.send(StreamFrame::Done {
                    thread_id,
                    message_id: Some(outcome.assistant_message.id.clone()),
                    title: outcome.title_changed.then(|| outcome.thread.name.clone()),
                    cancelled: outcome.cancelled,
                })
                .await;
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(thread_id = %thread_id, error = %e, "Turn failed");
                out.send(StreamFrame::error(e.client_message())).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        turn: PreparedTurn,
        out: &mut Output<'_>,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let start = Instant::now();
        let PreparedTurn {
            prompt,
            caller,
            thread,
            started_at,
        } = turn;

        let prior: Vec<ChatMessage> = self
            .messages
            .get_all_by_thread_id(&thread.id)
            .await?
            .into_iter()
            .filter(|m| !m.is_deleted)
            .collect();
        let assistant = self.load_assistant(&thread).await;
        let settings = TurnSettings::resolve(
            &thread.prompt_options,
            assistant.as_ref(),
            &self.config.defaults,
        );
        let target = GroundingTarget::decide(&thread, assistant.as_ref());

        tracing::info!(
            thread_id = %thread.id,
            grounded = target.is_some(),
            prior_messages = prior.len(),
            "Starting turn"
        );

        let mut citations = CitationSet::new();
        if let Some(target) = &target {
            let retrieved = self
                .retriever
                .retrieve_grounding_documents(&prompt, target)
                .await
                .map_err(TurnError::Retrieval)?;
            citations.extend(retrieved);
        }
        let retrieved_count = citations.len();

        let messages = self.assemble_messages(
            &prompt,
            &prior,
            assistant.as_ref(),
            target.is_some(),
            citations.as_slice(),
            &settings,
        );
        let generated = self.generate(messages, &settings, out, &cancel).await;

        if target.is_some() {
            citations.extend(generated.engine_citations.iter().cloned());
        }
        if target.is_some() && !citations.is_empty() && !generated.cancelled {
            out.send(StreamFrame::Citations {
                citations: citations.as_slice().to_vec(),
            })
            .await;
        }

        let user_message =
            ChatMessage::user(&thread.id, &caller.user_id, &prompt).with_created_at(started_at);
        let assistant_message = self.build_assistant_message(
            &thread,
            &caller,
            &prompt,
            &generated,
            target.as_ref(),
            retrieved_count,
            &citations,
        );

        if let Some(failure) = generated.failure {
            return Err(self
                .persist_partial(
                    thread,
                    prior.len(),
                    &prompt,
                    &user_message,
                    &assistant_message,
                    failure,
                )
                .await);
        }

        let (thread, title_changed) = self
            .persist_turn(thread, prior.len(), &prompt, &user_message, &assistant_message)
            .await?;

        tracing::info!(
            thread_id = %thread.id,
            grounded = target.is_some(),
            citations = citations.len(),
            cancelled = generated.cancelled,
            duration_ms = start.elapsed().as_millis() as u64,
            "Turn completed"
        );

        Ok(TurnOutcome {
            user_message,
            assistant_message,
            citations: citations.into_vec(),
            thread,
            cancelled: generated.cancelled,
            title_changed,
        })
    }

    /// A missing or unreadable assistant degrades the turn to ungrounded
    async fn load_assistant(&self, thread: &ChatThread) -> Option<Assistant> {
        let assistant_id = thread.assistant_id.as_deref()?;
        match self.assistants.get_by_id(assistant_id).await {
            Ok(Some(assistant)) => Some(assistant),
            Ok(None) => {
                tracing::warn!(thread_id = %thread.id, assistant_id, "Assistant not found");
                None
            }
            Err(e) => {
                tracing::warn!(thread_id = %thread.id, assistant_id, error = %e, "Failed to load assistant");
                None
            }
        }
    }

    fn assemble_messages(
        &self,
        prompt: &str,
        prior: &[ChatMessage],
        assistant: Option<&Assistant>,
        grounded: bool,
        citations: &[Citation],
        settings: &TurnSettings,
    ) -> Vec<Message> {
        let history = build_history(prior.iter().map(HistoryEntry::from), prompt)
            .window(settings.past_messages as usize);

        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = assistant
            .map(|a| a.system_message.trim())
            .filter(|s| !s.is_empty())
        {
            messages.push(Message::system(system));
        }

        if grounded {
            let rendered = render_grounding_prompt(
                &self.config.grounding_template,
                citations,
                &history.flatten_prior(),
                prompt,
            );
            messages.push(Message::human(rendered));
        } else {
            messages.extend(history.messages());
        }
        messages
    }

    /// Stream the completion, forwarding each delta as it arrives
    async fn generate(
        &self,
        messages: Vec<Message>,
        settings: &TurnSettings,
        out: &mut Output<'_>,
        cancel: &CancellationToken,
    ) -> Generated {
        let mut generated = Generated {
            text: String::new(),
            engine_citations: Vec::new(),
            finish_reason: None,
            cancelled: false,
            failure: None,
        };

        if cancel.is_cancelled() {
            generated.cancelled = true;
            return generated;
        }

        let options = ChatOptions::new()
            .temperature(settings.temperature)
            .top_p(settings.top_p)
            .max_tokens(settings.max_tokens);
        let request = ChatRequest::new(self.config.deployment.clone(), messages).with_options(options);

        let mut stream = match self.chat.chat_stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                generated.failure = Some(e);
                return generated;
            }
        };

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!(chars = generated.text.len(), "Turn cancelled during streaming");
                    generated.cancelled = true;
                    break;
                }

                next = stream.next() => match next {
                    Some(Ok(StreamEvent::Message { content })) => {
                        generated.text.push_str(&content);
                        out.send(StreamFrame::TextDelta { content }).await;
                    }
                    Some(Ok(StreamEvent::Context { citations })) => {
                        generated
                            .engine_citations
                            .extend(citations.into_iter().map(Citation::from));
                    }
                    Some(Ok(StreamEvent::Done { finish_reason })) => {
                        generated.finish_reason = finish_reason;
                    }
                    Some(Err(e)) => {
                        generated.failure = Some(e);
                        break;
                    }
                    None => break,
                },
            }
        }

        generated
    }

    #[allow(clippy::too_many_arguments)]
    fn build_assistant_message(
        &self,
        thread: &ChatThread,
        caller: &CallerIdentity,
        prompt: &str,
        generated: &Generated,
        target: Option<&GroundingTarget>,
        retrieved_count: usize,
        citations: &CitationSet,
    ) -> ChatMessage {
        let mut message = ChatMessage::assistant(&thread.id, &caller.user_id, &generated.text);

        if let Some(target) = target {
            message = message.with_option(MessageOptions::SearchProcess {
                index_name: target.index_name.clone(),
                query: prompt.to_string(),
                strictness: target.strictness,
                document_limit: target.document_limit,
                result_count: retrieved_count,
            });
            if !citations.is_empty() {
                message = message.with_option(MessageOptions::Citations {
                    citations: citations.as_slice().to_vec(),
                });
            }
        }

        message.with_option(MessageOptions::Generation {
            finish_reason: generated.finish_reason.clone(),
            truncated: generated.cancelled || generated.failure.is_some(),
        })
    }

    /// Save user message, assistant message and thread, in that order
    async fn persist_turn(
        &self,
        mut thread: ChatThread,
        prior_count: usize,
        prompt: &str,
        user_message: &ChatMessage,
        assistant_message: &ChatMessage,
    ) -> Result<(ChatThread, bool), TurnError> {
        let retry = &self.config.retry;

        retry
            .run("add user message", || self.messages.add(user_message))
            .await
            .map_err(|source| TurnError::Persistence {
                stage: PersistStage::UserMessage,
                source,
            })?;

        retry
            .run("add assistant message", || self.messages.add(assistant_message))
            .await
            .map_err(|source| TurnError::Persistence {
                stage: PersistStage::AssistantMessage,
                source,
            })?;

        let title_changed = prior_count <= 1 && thread.has_default_name();
        if title_changed {
            thread.name = truncate_title(prompt);
        }
        thread.last_modified_at = Utc::now();

        retry
            .run("update thread", || self.threads.update(&thread))
            .await
            .map_err(|source| TurnError::Persistence {
                stage: PersistStage::ThreadUpdate,
                source,
            })?;

        Ok((thread, title_changed))
    }

    /// Keep whatever was generated before a model failure, then report it
    async fn persist_partial(
        &self,
        thread: ChatThread,
        prior_count: usize,
        prompt: &str,
        user_message: &ChatMessage,
        assistant_message: &ChatMessage,
        failure: anyhow::Error,
    ) -> TurnError {
        tracing::warn!(
            thread_id = %thread.id,
            chars = assistant_message.content.len(),
            error = %failure,
            "Completion stream failed"
        );

        // A turn is a user/assistant pair; with no text there is no pair to save
        let partial_persisted = if assistant_message.content.is_empty() {
            false
        } else {
            match self
                .persist_turn(thread, prior_count, prompt, user_message, assistant_message)
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to save partial answer");
                    false
                }
            }
        };

        TurnError::Generation {
            message: format!("{:#}", failure),
            partial_persisted,
        }
    }
}
