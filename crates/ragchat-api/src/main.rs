use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ragchat_api::{config::Config, router::build_router, state::AppState};
use ragchat_llm::config::ClientFactory;
use ragchat_orchestrator::Orchestrator;
use ragchat_persist::{AssistantStore, InMemoryStore, MessageStore, MongoStore, ThreadStore};
use ragchat_search::{AzureSearchClient, RetrievalClient};

struct Stores {
    threads: Arc<dyn ThreadStore>,
    messages: Arc<dyn MessageStore>,
    assistants: Arc<dyn AssistantStore>,
    kind: &'static str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config);

    tracing::info!("Starting ragchat API server");
    tracing::info!("Config loaded: {}:{}", config.server.host, config.server.port);

    tracing::info!("Initializing Azure OpenAI clients");
    let (chat_client, embedding_client) = ClientFactory::create_clients(config.azure_openai())?;

    tracing::info!("Initializing Azure AI Search client");
    let retrieval_client: Arc<dyn RetrievalClient> =
        Arc::new(AzureSearchClient::from_config(config.azure_search())?);

    let stores = connect_stores(&config).await?;

    let orchestrator = Orchestrator::builder()
        .thread_store(stores.threads.clone())
        .message_store(stores.messages.clone())
        .assistant_store(stores.assistants)
        .chat_client(chat_client)
        .embedding_client(embedding_client)
        .retrieval_client(retrieval_client)
        .config(config.orchestrator())
        .build()?;

    let state = Arc::new(AppState::new(
        config.clone(),
        orchestrator,
        stores.threads,
        stores.messages,
        stores.kind,
    ));

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn connect_stores(config: &Config) -> anyhow::Result<Stores> {
    match &config.mongodb_uri {
        Some(uri) => {
            tracing::info!("Connecting to MongoDB");
            let store = Arc::new(MongoStore::connect(uri, &config.mongodb.database).await?);
            tracing::info!("MongoDB connected");
            Ok(Stores {
                threads: store.clone(),
                messages: store.clone(),
                assistants: store,
                kind: "mongodb",
            })
        }
        None => {
            tracing::warn!("MONGODB_URI is not set; conversations are kept in memory only");
            let store = Arc::new(InMemoryStore::new());
            Ok(Stores {
                threads: store.clone(),
                messages: store.clone(),
                assistants: store,
                kind: "memory",
            })
        }
    }
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
