use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use ragchat_llm::{
    ChatClient, ChatRequest, ContextCitation, EmbeddingClient, EventStream, StreamEvent,
};
use ragchat_orchestrator::{
    CancellationToken, ChannelSink, Orchestrator, OrchestratorConfig, OutputSink, PersistStage,
    RetryPolicy, SinkClosed, TurnError, TurnRequest, DEFAULT_SINK_WRITE_TIMEOUT,
};
use ragchat_persist::{AssistantStore, MessageStore, PersistError, ThreadStore};
use ragchat_search::{RetrievalClient, RetrievalQuery, SearchHit};
use ragchat_types::{
    Assistant, CallerIdentity, ChatMessage, ChatThread, Citation, MessageOptions, MessageRole,
    StreamFrame, DEFAULT_THREAD_NAME,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeThreads {
    threads: Mutex<HashMap<String, ChatThread>>,
    reads: AtomicUsize,
    updates: Mutex<Vec<ChatThread>>,
}

#[async_trait]
impl ThreadStore for FakeThreads {
    async fn get_by_id(&self, thread_id: &str) -> ragchat_persist::Result<Option<ChatThread>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.threads.lock().unwrap().get(thread_id).cloned())
    }

    async fn update(&self, thread: &ChatThread) -> ragchat_persist::Result<()> {
        self.updates.lock().unwrap().push(thread.clone());
        self.threads
            .lock()
            .unwrap()
            .insert(thread.id.clone(), thread.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeMessages {
    stored: Mutex<Vec<ChatMessage>>,
    add_attempts: AtomicUsize,
    /// Errors returned by the next `add` calls, in order
    add_failures: Mutex<VecDeque<PersistError>>,
    /// Fail every `add` of this role with a terminal error
    reject_role: Mutex<Option<MessageRole>>,
}

impl FakeMessages {
    fn stored(&self) -> Vec<ChatMessage> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageStore for FakeMessages {
    async fn get_all_by_thread_id(&self, thread_id: &str) -> ragchat_persist::Result<Vec<ChatMessage>> {
        Ok(self
            .stored
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect())
    }

    async fn add(&self, message: &ChatMessage) -> ragchat_persist::Result<()> {
        self.add_attempts.fetch_add(1, Ordering::SeqCst);
        if *self.reject_role.lock().unwrap() == Some(message.role) {
            return Err(PersistError::Internal("document too large".to_string()));
        }
        if let Some(err) = self.add_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.stored.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeAssistants {
    assistants: HashMap<String, Assistant>,
    fail: bool,
    reads: AtomicUsize,
}

#[async_trait]
impl AssistantStore for FakeAssistants {
    async fn get_by_id(&self, assistant_id: &str) -> ragchat_persist::Result<Option<Assistant>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PersistError::Unavailable("throttled".to_string()));
        }
        Ok(self.assistants.get(assistant_id).cloned())
    }
}

#[derive(Default)]
struct FakeEmbeddings {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl EmbeddingClient for FakeEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("embedding deployment unavailable");
        }
        Ok(vec![0.1, 0.2, 0.3])
    }
}

#[derive(Default)]
struct FakeSearch {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<RetrievalQuery>>,
}

impl FakeSearch {
    fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl RetrievalClient for FakeSearch {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.hits.clone())
    }
}

/// How the fake engine answers
#[derive(Clone)]
enum Script {
    /// Emit these events, then end
    Events(Vec<StreamEvent>),
    /// Emit these events, then fail mid-stream
    FailAfter(Vec<StreamEvent>),
    /// Emit these events, then never finish
    HangAfter(Vec<StreamEvent>),
    /// Refuse to open the stream
    Refuse,
}

struct FakeChat {
    script: Script,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeChat {
    fn new(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ChatRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream> {
        self.requests.lock().unwrap().push(request);
        let ok = |events: Vec<StreamEvent>| futures::stream::iter(events.into_iter().map(Ok::<_, anyhow::Error>));

        let stream: EventStream = match self.script.clone() {
            Script::Events(events) => Box::pin(ok(events)),
            Script::FailAfter(events) => Box::pin(ok(events).chain(futures::stream::once(async {
                Err(anyhow::anyhow!("connection reset by model"))
            }))),
            Script::HangAfter(events) => Box::pin(ok(events).chain(futures::stream::pending())),
            Script::Refuse => anyhow::bail!("Azure OpenAI API error (429): rate limited"),
        };
        Ok(stream)
    }
}

/// Records frames and cancels the turn after `after_text` text frames
struct CancelAfterSink {
    frames: Vec<StreamFrame>,
    token: CancellationToken,
    after_text: usize,
}

#[async_trait]
impl OutputSink for CancelAfterSink {
    async fn send(&mut self, frame: StreamFrame) -> std::result::Result<(), SinkClosed> {
        self.frames.push(frame);
        let texts = self
            .frames
            .iter()
            .filter(|f| matches!(f, StreamFrame::TextDelta { .. }))
            .count();
        if texts >= self.after_text {
            self.token.cancel();
        }
        Ok(())
    }
}

/// A caller that has already gone away
#[derive(Default)]
struct ClosedSink {
    attempts: usize,
}

#[async_trait]
impl OutputSink for ClosedSink {
    async fn send(&mut self, _frame: StreamFrame) -> std::result::Result<(), SinkClosed> {
        self.attempts += 1;
        Err(SinkClosed)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

const OWNER: &str = "alice@contoso.com";

struct Harness {
    threads: Arc<FakeThreads>,
    messages: Arc<FakeMessages>,
    assistants: Arc<FakeAssistants>,
    embeddings: Arc<FakeEmbeddings>,
    search: Arc<FakeSearch>,
    chat: Arc<FakeChat>,
    orchestrator: Orchestrator,
}

struct Setup {
    thread: ChatThread,
    prior: Vec<ChatMessage>,
    assistant: Option<Assistant>,
    assistant_store_fails: bool,
    hits: Vec<SearchHit>,
    embed_fails: bool,
    script: Script,
    sink_write_timeout: Duration,
}

impl Setup {
    fn new(thread: ChatThread, script: Script) -> Self {
        Self {
            thread,
            prior: Vec::new(),
            assistant: None,
            assistant_store_fails: false,
            hits: Vec::new(),
            embed_fails: false,
            script,
            sink_write_timeout: DEFAULT_SINK_WRITE_TIMEOUT,
        }
    }

    fn build(self) -> Harness {
        let threads = Arc::new(FakeThreads::default());
        threads
            .threads
            .lock()
            .unwrap()
            .insert(self.thread.id.clone(), self.thread);

        let messages = Arc::new(FakeMessages::default());
        *messages.stored.lock().unwrap() = self.prior;

        let assistants = Arc::new(FakeAssistants {
            assistants: self
                .assistant
                .into_iter()
                .map(|a| (a.id.clone(), a))
                .collect(),
            fail: self.assistant_store_fails,
            reads: AtomicUsize::new(0),
        });
        let embeddings = Arc::new(FakeEmbeddings {
            calls: AtomicUsize::new(0),
            fail: self.embed_fails,
        });
        let search = Arc::new(FakeSearch {
            hits: self.hits,
            queries: Mutex::new(Vec::new()),
        });
        let chat = Arc::new(FakeChat::new(self.script));

        let mut config = OrchestratorConfig::new("gpt-4o");
        config.retry = RetryPolicy::new(3, Duration::from_millis(1));
        config.sink_write_timeout = self.sink_write_timeout;

        let orchestrator = Orchestrator::builder()
            .thread_store(threads.clone())
            .message_store(messages.clone())
            .assistant_store(assistants.clone())
            .chat_client(chat.clone())
            .embedding_client(embeddings.clone())
            .retrieval_client(search.clone())
            .config(config)
            .build()
            .unwrap();

        Harness {
            threads,
            messages,
            assistants,
            embeddings,
            search,
            chat,
            orchestrator,
        }
    }
}

impl Harness {
    async fn turn(
        &self,
        thread_id: &str,
        prompt: &str,
    ) -> (Result<ragchat_orchestrator::TurnOutcome, TurnError>, Vec<StreamFrame>) {
        self.turn_as(OWNER, thread_id, prompt).await
    }

    async fn turn_as(
        &self,
        caller: &str,
        thread_id: &str,
        prompt: &str,
    ) -> (Result<ragchat_orchestrator::TurnOutcome, TurnError>, Vec<StreamFrame>) {
        let mut frames: Vec<StreamFrame> = Vec::new();
        let result = self
            .orchestrator
            .handle_turn(
                TurnRequest::new(thread_id, prompt),
                &CallerIdentity::new(caller),
                &mut frames,
                CancellationToken::new(),
            )
            .await;
        (result, frames)
    }

    fn thread(&self, id: &str) -> ChatThread {
        self.threads.threads.lock().unwrap().get(id).cloned().unwrap()
    }
}

fn thread(id: &str) -> ChatThread {
    ChatThread::new(OWNER).with_id(id).with_assistant("a1")
}

fn plain_assistant() -> Assistant {
    Assistant {
        id: "a1".to_string(),
        name: "General".to_string(),
        system_message: "You are a helpful assistant.".to_string(),
        ..Default::default()
    }
}

fn grounded_assistant() -> Assistant {
    Assistant {
        id: "a1".to_string(),
        name: "HR".to_string(),
        system_message: "You answer HR questions.".to_string(),
        index_name: Some("handbook".to_string()),
        ..Default::default()
    }
}

fn text(content: &str) -> StreamEvent {
    StreamEvent::Message {
        content: content.to_string(),
    }
}

fn hit(name: &str, url: &str, content: &str) -> SearchHit {
    SearchHit {
        content: content.to_string(),
        url: url.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

/// Four alternating prior messages, oldest first
fn prior_messages(thread_id: &str) -> Vec<ChatMessage> {
    let base = Utc::now() - chrono::Duration::minutes(10);
    ["q1", "a1", "q2", "a2"]
        .iter()
        .enumerate()
        .map(|(i, content)| {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            ChatMessage::new(thread_id, OWNER, role, *content)
                .with_created_at(base + chrono::Duration::seconds(i as i64))
        })
        .collect()
}

fn texts(frames: &[StreamFrame]) -> String {
    frames
        .iter()
        .filter_map(|f| match f {
            StreamFrame::TextDelta { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

fn citation_frames(frames: &[StreamFrame]) -> Vec<&Vec<Citation>> {
    frames
        .iter()
        .filter_map(|f| match f {
            StreamFrame::Citations { citations } => Some(citations),
            _ => None,
        })
        .collect()
}

fn generation_option(message: &ChatMessage) -> Option<(Option<String>, bool)> {
    message.options.iter().find_map(|o| match o {
        MessageOptions::Generation {
            finish_reason,
            truncated,
        } => Some((finish_reason.clone(), *truncated)),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_thread_ungrounded_turn_is_titled_and_persisted() {
    let mut setup = Setup::new(
        thread("t1"),
        Script::Events(vec![
            text("Hello"),
            text("! How can I help?"),
            StreamEvent::Done {
                finish_reason: Some("stop".to_string()),
            },
        ]),
    );
    setup.assistant = Some(plain_assistant());
    let h = setup.build();

    let (result, frames) = h.turn("t1", "Hi there").await;
    let outcome = result.unwrap();

    let stored = h.messages.stored();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].role, MessageRole::User);
    assert_eq!(stored[0].content, "Hi there");
    assert_eq!(stored[1].role, MessageRole::Assistant);
    assert_eq!(stored[1].content, "Hello! How can I help?");
    assert_eq!(
        generation_option(&stored[1]),
        Some((Some("stop".to_string()), false))
    );

    assert_eq!(h.thread("t1").name, "Hi there");
    assert!(outcome.title_changed);
    assert!(!outcome.cancelled);

    assert_eq!(texts(&frames), "Hello! How can I help?");
    assert!(citation_frames(&frames).is_empty());
    assert!(matches!(
        frames.last(),
        Some(StreamFrame::Done { title: Some(title), cancelled: false, .. }) if title == "Hi there"
    ));

    assert_eq!(h.embeddings.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.search.calls(), 0);
}

#[tokio::test]
async fn grounded_turn_with_history_emits_citations_after_text() {
    let mut t = thread("t2");
    t.filter_options.strictness = 4;
    t.filter_options.document_limit = 2;
    let before = t.last_modified_at;

    let mut setup = Setup::new(
        t,
        Script::Events(vec![text("You get "), text("25 days [doc1].")]),
    );
    setup.prior = prior_messages("t2");
    setup.assistant = Some(grounded_assistant());
    setup.hits = vec![
        hit("Handbook", "https://hr/handbook.pdf", "Employees get 25 vacation days."),
        hit("Policy", "https://hr/policy.pdf", "Up to 5 days carry over."),
    ];
    let h = setup.build();

    let (result, frames) = h.turn("t2", "How many vacation days do I get?").await;
    let outcome = result.unwrap();

    // Retrieval ran once with the thread's settings
    let queries = h.search.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].index_name, "handbook");
    assert_eq!(queries[0].query, "How many vacation days do I get?");
    assert_eq!(queries[0].strictness, 4);
    assert_eq!(queries[0].document_limit, 2);
    assert_eq!(queries[0].vector, vec![0.1, 0.2, 0.3]);

    // The model saw the rendered grounding prompt, not the raw history
    let request = h.chat.last_request();
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role(), "system");
    let grounded = request.messages[1].content().to_plain_text();
    assert!(grounded.contains("Employees get 25 vacation days."));
    assert!(grounded.contains("Up to 5 days carry over."));
    assert!(grounded.contains("user: q1\nassistant: a1\nuser: q2\nassistant: a2"));
    assert!(grounded.contains("How many vacation days do I get?"));

    // Exactly one citations frame, after every text frame, before done
    let cites = citation_frames(&frames);
    assert_eq!(cites.len(), 1);
    assert_eq!(cites[0].len(), 2);
    let citations_at = frames
        .iter()
        .position(|f| matches!(f, StreamFrame::Citations { .. }))
        .unwrap();
    let last_text_at = frames
        .iter()
        .rposition(|f| matches!(f, StreamFrame::TextDelta { .. }))
        .unwrap();
    assert!(citations_at > last_text_at);
    assert!(matches!(frames.last(), Some(StreamFrame::Done { .. })));

    // Name untouched with 4 prior messages; last-modified still moves
    let updated = h.thread("t2");
    assert_eq!(updated.name, DEFAULT_THREAD_NAME);
    assert!(!outcome.title_changed);
    assert!(updated.last_modified_at >= before);
    assert_eq!(h.threads.updates.lock().unwrap().len(), 1);

    let assistant_message = &h.messages.stored()[5];
    assert_eq!(assistant_message.content, "You get 25 days [doc1].");
    assert_eq!(assistant_message.citations().len(), 2);
    assert!(assistant_message.options.iter().any(|o| matches!(
        o,
        MessageOptions::SearchProcess { index_name, result_count: 2, .. } if index_name == "handbook"
    )));
}

#[tokio::test]
async fn non_owner_is_forbidden_without_side_effects() {
    let mut setup = Setup::new(thread("t3"), Script::Events(vec![text("secret")]));
    setup.assistant = Some(grounded_assistant());
    setup.hits = vec![hit("Doc", "https://x", "confidential")];
    let h = setup.build();

    let (result, frames) = h.turn_as("mallory@contoso.com", "t3", "show me").await;

    assert!(matches!(result, Err(TurnError::Forbidden)));
    assert!(frames.is_empty());
    assert_eq!(h.messages.add_attempts.load(Ordering::SeqCst), 0);
    assert!(h.threads.updates.lock().unwrap().is_empty());
    assert_eq!(h.assistants.reads.load(Ordering::SeqCst), 0);
    assert_eq!(h.embeddings.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.search.calls(), 0);
    assert_eq!(h.chat.calls(), 0);
}

#[tokio::test]
async fn owner_match_ignores_case() {
    let h = Setup::new(thread("t4"), Script::Events(vec![text("ok")])).build();
    let (result, _) = h.turn_as("ALICE@contoso.COM", "t4", "hello").await;
    assert!(result.is_ok());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn user_message_is_persisted_before_assistant_message() {
    let h = Setup::new(thread("t5"), Script::Events(vec![text("a"), text("b")])).build();

    let (result, _) = h.turn("t5", "question").await;
    let outcome = result.unwrap();

    let stored = h.messages.stored();
    let roles: Vec<MessageRole> = stored.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);
    assert!(stored[0].created_at <= stored[1].created_at);
    assert_eq!(outcome.user_message.id, stored[0].id);
    assert_eq!(outcome.assistant_message.id, stored[1].id);
}

#[tokio::test]
async fn title_is_set_only_on_first_exchange() {
    let h = Setup::new(thread("t6"), Script::Events(vec![text("sure")])).build();

    let (first, _) = h.turn("t6", "Plan a trip").await;
    assert!(first.unwrap().title_changed);
    assert_eq!(h.thread("t6").name, "Plan a trip");

    let (second, _) = h.turn("t6", "Make it cheaper").await;
    assert!(!second.unwrap().title_changed);
    assert_eq!(h.thread("t6").name, "Plan a trip");
    assert_eq!(h.threads.updates.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn single_prior_message_still_titles_thread() {
    let mut setup = Setup::new(thread("t7"), Script::Events(vec![text("hi")]));
    setup.prior = vec![ChatMessage::assistant("t7", OWNER, "Welcome! Ask me anything.")
        .with_created_at(Utc::now() - chrono::Duration::minutes(1))];
    let h = setup.build();

    let (result, _) = h.turn("t7", "Tell me about the water cycle in detail please").await;
    assert!(result.unwrap().title_changed);
    assert_eq!(h.thread("t7").name, "Tell me about the water cycle in detail...");
}

#[tokio::test]
async fn renamed_thread_keeps_its_name() {
    let h = Setup::new(
        thread("t8").with_name("My notes"),
        Script::Events(vec![text("ok")]),
    )
    .build();

    let (result, _) = h.turn("t8", "first question").await;
    assert!(!result.unwrap().title_changed);
    assert_eq!(h.thread("t8").name, "My notes");
}

#[tokio::test]
async fn citations_are_deduplicated_across_sources() {
    let mut setup = Setup::new(
        thread("t9"),
        Script::Events(vec![
            StreamEvent::Context {
                citations: vec![
                    ContextCitation {
                        content: "engine copy".to_string(),
                        title: Some("A".to_string()),
                        url: Some("https://a".to_string()),
                        ..Default::default()
                    },
                    ContextCitation {
                        content: "only from engine".to_string(),
                        title: Some("C".to_string()),
                        url: Some("https://c".to_string()),
                        ..Default::default()
                    },
                ],
            },
            text("answer"),
        ]),
    );
    setup.assistant = Some(grounded_assistant());
    setup.hits = vec![
        hit("A", "https://a", "first"),
        hit("B", "https://b", "second"),
        hit("A", "https://a", "duplicate"),
    ];
    let h = setup.build();

    let (result, frames) = h.turn("t9", "q").await;
    let outcome = result.unwrap();

    let cites = citation_frames(&frames);
    assert_eq!(cites.len(), 1);
    let names: Vec<&str> = cites[0].iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    assert_eq!(cites[0][0].content, "first");
    assert_eq!(outcome.citations.len(), 3);
}

#[tokio::test]
async fn ungrounded_turn_never_retrieves_or_cites() {
    let mut setup = Setup::new(
        thread("t10"),
        Script::Events(vec![
            StreamEvent::Context {
                citations: vec![ContextCitation {
                    content: "ignored".to_string(),
                    url: Some("https://x".to_string()),
                    ..Default::default()
                }],
            },
            text("plain answer"),
        ]),
    );
    setup.assistant = Some(plain_assistant());
    setup.hits = vec![hit("A", "https://a", "never used")];
    let h = setup.build();

    let (result, frames) = h.turn("t10", "q").await;
    let outcome = result.unwrap();

    assert_eq!(h.embeddings.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.search.calls(), 0);
    assert!(citation_frames(&frames).is_empty());
    assert!(outcome.citations.is_empty());
    assert!(outcome.assistant_message.citations().is_empty());

    // Structured history goes to the model as-is
    let request = h.chat.last_request();
    let roles: Vec<&str> = request.messages.iter().map(|m| m.role()).collect();
    assert_eq!(roles, vec!["system", "user"]);
    assert_eq!(request.messages[1].content().to_plain_text(), "q");
}

#[tokio::test]
async fn thread_without_assistant_is_ungrounded_even_with_index_override() {
    let mut t = ChatThread::new(OWNER).with_id("t11");
    t.filter_options.index_name = Some("handbook".to_string());
    let h = Setup::new(t, Script::Events(vec![text("ok")])).build();

    let (result, _) = h.turn("t11", "q").await;
    assert!(result.is_ok());
    assert_eq!(h.search.calls(), 0);
    assert_eq!(h.chat.last_request().messages.len(), 1);
}

#[tokio::test]
async fn cancellation_persists_partial_answer() {
    let h = Setup::new(
        thread("t12"),
        Script::HangAfter(vec![text("Hel"), text("lo")]),
    )
    .build();

    let token = CancellationToken::new();
    let mut sink = CancelAfterSink {
        frames: Vec::new(),
        token: token.clone(),
        after_text: 2,
    };

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        h.orchestrator.handle_turn(
            TurnRequest::new("t12", "Say hello"),
            &CallerIdentity::new(OWNER),
            &mut sink,
            token,
        ),
    )
    .await
    .expect("turn did not stop on cancellation")
    .unwrap();

    assert!(outcome.cancelled);
    let stored = h.messages.stored();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].content, "Hello");
    assert_eq!(generation_option(&stored[1]), Some((None, true)));
    assert!(matches!(
        sink.frames.last(),
        Some(StreamFrame::Done { cancelled: true, .. })
    ));
    assert!(!sink.frames.iter().any(|f| matches!(f, StreamFrame::Error { .. })));
}

#[tokio::test]
async fn cancellation_reaches_turn_blocked_on_stalled_caller() {
    let mut setup = Setup::new(
        thread("t30"),
        Script::HangAfter(vec![text("Hel"), text("lo"), text("!")]),
    );
    setup.sink_write_timeout = Duration::from_millis(300);
    let h = setup.build();

    // Connected but never read: the second delta blocks on the full channel
    let (mut sink, _rx) = ChannelSink::channel(1);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        h.orchestrator.handle_turn(
            TurnRequest::new("t30", "Say hello"),
            &CallerIdentity::new(OWNER),
            &mut sink,
            token,
        ),
    )
    .await
    .expect("turn stayed blocked on a stalled caller after cancellation")
    .unwrap();

    assert!(outcome.cancelled);
    let stored = h.messages.stored();
    assert_eq!(stored.len(), 2);
    // Stops at the cancelled write instead of draining the stream
    assert_eq!(stored[1].content, "Hello");
    assert_eq!(generation_option(&stored[1]), Some((None, true)));
}

#[tokio::test]
async fn stalled_caller_does_not_block_completion() {
    let mut setup = Setup::new(
        thread("t31"),
        Script::Events(vec![
            text("Hel"),
            text("lo"),
            StreamEvent::Done {
                finish_reason: Some("stop".to_string()),
            },
        ]),
    );
    setup.sink_write_timeout = Duration::from_millis(50);
    let h = setup.build();

    let (mut sink, mut rx) = ChannelSink::channel(1);

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        h.orchestrator.handle_turn(
            TurnRequest::new("t31", "Say hello"),
            &CallerIdentity::new(OWNER),
            &mut sink,
            CancellationToken::new(),
        ),
    )
    .await
    .expect("turn stayed blocked on a stalled caller")
    .unwrap();

    assert!(!outcome.cancelled);
    assert_eq!(outcome.assistant_message.content, "Hello");
    assert_eq!(h.messages.stored().len(), 2);

    // Only the frame that fit in the channel was delivered
    assert_eq!(rx.recv().await, Some(StreamFrame::text("Hel")));
    drop(sink);
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn cancelled_before_start_skips_generation() {
    let h = Setup::new(thread("t13"), Script::Events(vec![text("never")])).build();
    let token = CancellationToken::new();
    token.cancel();

    let mut frames: Vec<StreamFrame> = Vec::new();
    let outcome = h
        .orchestrator
        .handle_turn(
            TurnRequest::new("t13", "hi"),
            &CallerIdentity::new(OWNER),
            &mut frames,
            token,
        )
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(h.chat.calls(), 0);
    assert_eq!(outcome.assistant_message.content, "");
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_prompt_fails_before_any_call() {
    let h = Setup::new(thread("t14"), Script::Events(vec![])).build();

    let (result, frames) = h.turn("t14", "   \n").await;

    assert!(matches!(result, Err(TurnError::Validation(_))));
    assert!(frames.is_empty());
    assert_eq!(h.threads.reads.load(Ordering::SeqCst), 0);
    assert_eq!(h.chat.calls(), 0);
}

#[tokio::test]
async fn missing_and_deleted_threads_are_not_found() {
    let mut deleted = thread("t15");
    deleted.is_deleted = true;
    let h = Setup::new(deleted, Script::Events(vec![text("x")])).build();

    let (missing, _) = h.turn("nope", "hi").await;
    assert!(matches!(missing, Err(TurnError::NotFound(id)) if id == "nope"));

    let (soft_deleted, _) = h.turn("t15", "hi").await;
    assert!(matches!(soft_deleted, Err(TurnError::NotFound(_))));
    assert_eq!(h.messages.add_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn assistant_lookup_failure_degrades_to_ungrounded() {
    let mut setup = Setup::new(thread("t16"), Script::Events(vec![text("fine")]));
    setup.assistant = Some(grounded_assistant());
    setup.assistant_store_fails = true;
    let h = setup.build();

    let (result, _) = h.turn("t16", "q").await;

    assert!(result.is_ok());
    assert_eq!(h.search.calls(), 0);
    // No assistant, so no system message either
    assert_eq!(h.chat.last_request().messages.len(), 1);
}

#[tokio::test]
async fn retrieval_failure_aborts_turn_without_persisting() {
    let mut setup = Setup::new(thread("t17"), Script::Events(vec![text("x")]));
    setup.assistant = Some(grounded_assistant());
    setup.embed_fails = true;
    let h = setup.build();

    let (result, frames) = h.turn("t17", "q").await;

    assert!(matches!(result, Err(TurnError::Retrieval(_))));
    assert_eq!(h.chat.calls(), 0);
    assert_eq!(h.messages.add_attempts.load(Ordering::SeqCst), 0);
    assert!(h.threads.updates.lock().unwrap().is_empty());
    assert!(matches!(frames.as_slice(), [StreamFrame::Error { .. }]));
}

#[tokio::test]
async fn generation_failure_mid_stream_keeps_partial_answer() {
    let h = Setup::new(
        thread("t18"),
        Script::FailAfter(vec![text("Par"), text("tial")]),
    )
    .build();

    let (result, frames) = h.turn("t18", "q").await;

    match result {
        Err(TurnError::Generation {
            partial_persisted,
            message,
        }) => {
            assert!(partial_persisted);
            assert!(message.contains("connection reset"));
        }
        other => panic!("unexpected result: {:?}", other.map(|o| o.assistant_message)),
    }

    let stored = h.messages.stored();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].content, "Partial");
    assert_eq!(generation_option(&stored[1]), Some((None, true)));
    assert_eq!(texts(&frames), "Partial");
    assert!(matches!(frames.last(), Some(StreamFrame::Error { .. })));
}

#[tokio::test]
async fn generation_refused_saves_nothing() {
    let h = Setup::new(thread("t19"), Script::Refuse).build();

    let (result, frames) = h.turn("t19", "q").await;

    assert!(matches!(
        result,
        Err(TurnError::Generation {
            partial_persisted: false,
            ..
        })
    ));
    assert_eq!(h.messages.add_attempts.load(Ordering::SeqCst), 0);
    assert!(matches!(frames.as_slice(), [StreamFrame::Error { .. }]));
}

#[tokio::test]
async fn transient_write_failure_is_retried() {
    let h = Setup::new(thread("t20"), Script::Events(vec![text("answer")])).build();
    h.messages
        .add_failures
        .lock()
        .unwrap()
        .push_back(PersistError::Unavailable("request rate is large".to_string()));

    let (result, _) = h.turn("t20", "q").await;

    assert!(result.is_ok());
    assert_eq!(h.messages.add_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(h.messages.stored().len(), 2);
}

#[tokio::test]
async fn assistant_write_failure_is_reported_to_caller() {
    let h = Setup::new(thread("t21"), Script::Events(vec![text("answer")])).build();
    *h.messages.reject_role.lock().unwrap() = Some(MessageRole::Assistant);

    let (result, frames) = h.turn("t21", "q").await;

    assert!(matches!(
        result,
        Err(TurnError::Persistence {
            stage: PersistStage::AssistantMessage,
            ..
        })
    ));
    // The user message made it; the thread was not touched
    assert_eq!(h.messages.stored().len(), 1);
    assert!(h.threads.updates.lock().unwrap().is_empty());
    match frames.last() {
        Some(StreamFrame::Error { message }) => assert!(message.contains("may not survive a refresh")),
        other => panic!("expected error frame, got {:?}", other),
    }
}

#[tokio::test]
async fn disconnected_caller_does_not_lose_the_answer() {
    let h = Setup::new(
        thread("t22"),
        Script::Events(vec![text("one "), text("two "), text("three")]),
    )
    .build();
    let mut sink = ClosedSink::default();

    let outcome = h
        .orchestrator
        .handle_turn(
            TurnRequest::new("t22", "count"),
            &CallerIdentity::new(OWNER),
            &mut sink,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(sink.attempts, 1);
    assert_eq!(outcome.assistant_message.content, "one two three");
    assert_eq!(h.messages.stored()[1].content, "one two three");
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_window_and_thread_settings_reach_the_engine() {
    let mut t = thread("t23");
    t.prompt_options.past_messages = Some(2);
    t.prompt_options.temperature = Some(0.1);

    let mut setup = Setup::new(t, Script::Events(vec![text("ok")]));
    setup.prior = prior_messages("t23");
    setup.assistant = Some(Assistant {
        temperature: Some(0.9),
        max_tokens: Some(256),
        ..plain_assistant()
    });
    let h = setup.build();

    let (result, _) = h.turn("t23", "q3").await;
    assert!(result.is_ok());

    let request = h.chat.last_request();
    assert_eq!(request.model, "gpt-4o");
    let contents: Vec<String> = request
        .messages
        .iter()
        .map(|m| m.content().to_plain_text())
        .collect();
    assert_eq!(
        contents,
        vec!["You are a helpful assistant.", "q2", "a2", "q3"]
    );
    assert_eq!(request.options.temperature, Some(0.1));
    assert_eq!(request.options.max_tokens, Some(256));
}

#[tokio::test]
async fn soft_deleted_messages_are_left_out_of_history() {
    let mut prior = prior_messages("t24");
    prior[2].is_deleted = true;
    prior[3].is_deleted = true;

    let mut setup = Setup::new(thread("t24"), Script::Events(vec![text("ok")]));
    setup.prior = prior;
    let h = setup.build();

    let (result, _) = h.turn("t24", "q3").await;
    // Two live prior messages: not a first exchange
    assert!(!result.unwrap().title_changed);

    let contents: Vec<String> = h
        .chat
        .last_request()
        .messages
        .iter()
        .map(|m| m.content().to_plain_text())
        .collect();
    assert_eq!(contents, vec!["q1", "a1", "q3"]);
}
