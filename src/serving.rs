use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use async_openai::{Client, config::OpenAIConfig};
use axum::extract::Query;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::http::method::Method;
use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use http::HeaderValue;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::cors::{Any, CorsLayer};
use tracing::{Level, debug, error, info, instrument, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::answering::{
    ARBITRATION_THRESHOLD, DEFAULT_SYSTEM_PROMPT, ReconcileMode, grounded_answer, is_non_answer,
    similarity, summarize_answers, transcript_completion,
};
use crate::caching::QueryCache;
use crate::chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, chunk_text};
use crate::costing::tokens_info;
use crate::embedding::{DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_MODEL, embed_chunks, embed_text};
use crate::parsing::fetch_webpage;
use crate::roles::RoleStore;
use crate::transcript::Transcript;
use crate::vectordb::VectorDB;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_RATE_LIMIT: u32 = 100;
const DEFAULT_SEARCH_LIMIT: u64 = 4;
const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1";

const COMPLETION_ERROR_MESSAGE: &str = "OpenAI API Error: ChatCompletion";
const SUMMARIZATION_ERROR_MESSAGE: &str = "OpenAI API Error: Summarization";
const REDIS_ERROR_MESSAGE: &str = "Redis server not available";

pub struct ServerOptions {
    pub qdrant_url: String,
    pub collection_name: String,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_dim: Option<u64>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub cache_dir: Option<String>,
    pub redis_url: Option<String>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub rate_limit_per_minute: Option<u32>,
    pub cors: Option<String>,
    pub log_level: Option<String>,
    pub log_json: bool,
}

pub struct RagServer {
    qdrant_url: String,
    openai_api_key: String,
    pub collection_name: String,
    pub openai_model: String,
    pub embedding_model: String,
    pub embedding_dim: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub cache_dir: Option<String>,
    pub redis_url: Option<String>,
    pub port: u16,
    pub host: IpAddr,
    pub rate_limit_per_minute: u32,
    pub cors: Option<String>,
    pub log_level: Level,
    pub log_json: bool,
}

#[derive(Deserialize, Serialize, Debug)]
struct ChatRequest {
    input: String,
    role: Option<String>,
    mode: Option<ReconcileMode>,
    limit: Option<u64>,
    openai_model: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
struct ChatResponse {
    response: String,
    token_info: String,
}

#[derive(Deserialize, Serialize, Debug)]
struct WebpageRequest {
    webpage: String,
}

#[derive(Deserialize, Serialize, Debug)]
struct StatusMessage {
    status: String,
    message: String,
}

#[derive(Deserialize, Serialize, Debug)]
struct RoleRequest {
    name: String,
    content: String,
}

#[derive(Deserialize, Serialize, Debug)]
struct RoleName {
    name: String,
}

#[derive(Deserialize, Debug)]
struct RolesQuery {
    name: Option<String>,
}

#[derive(Clone)]
struct AppState {
    vectordb: VectorDB,
    openai_client: Client<OpenAIConfig>,
    cache: Arc<Mutex<QueryCache>>,
    transcript: Arc<Mutex<Transcript>>,
    roles: Option<RoleStore>,
    openai_model: String,
    embedding_model: String,
    chunk_size: usize,
    chunk_overlap: usize,
}

#[derive(Deserialize, Serialize)]
struct RagError {
    status_code: usize,
    detail: String,
}

impl RagError {
    fn new(status_code: usize, detail: impl Into<String>) -> Self {
        Self {
            status_code,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code as u16)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl RagServer {
    pub fn new(options: ServerOptions) -> Self {
        let app_log_level = match options.log_level {
            Some(s) => Level::from_str(&s).expect("Log level not supported"),
            None => Level::INFO,
        };
        let server_port = match options.port {
            Some(n) => n,
            None => DEFAULT_PORT,
        };
        let server_host = match options.host {
            Some(h) => {
                IpAddr::V4(Ipv4Addr::from_str(&h).expect("You should provide a valid IPv4 address"))
            }
            None => IpAddr::V4(
                Ipv4Addr::from_str(DEFAULT_HOST).expect("You should provide a valid IPv4 address"),
            ),
        };
        let server_rate_limit = match options.rate_limit_per_minute {
            Some(r) => r,
            None => DEFAULT_RATE_LIMIT,
        };
        let api_key = match options.openai_api_key {
            Some(a) => a,
            None => {
                std::env::var("OPENAI_API_KEY").expect("If OpenAI API key is not provided as an argument, it should be set in the environment")
            }
        };
        let openai_model = match options.openai_model {
            Some(m) => m,
            None => match std::env::var("OPENAI_MODEL_NAME") {
                Ok(m) => m,
                Err(_) => DEFAULT_OPENAI_MODEL.to_string(),
            },
        };
        let redis_url = match options.redis_url {
            Some(u) => Some(u),
            None => std::env::var("REDIS_URL").ok(),
        };
        Self {
            qdrant_url: options.qdrant_url,
            collection_name: options.collection_name,
            openai_model,
            embedding_model: options
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dim: options.embedding_dim.unwrap_or(DEFAULT_EMBEDDING_DIM),
            chunk_size: options.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: options.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
            cache_dir: options.cache_dir,
            redis_url,
            host: server_host,
            port: server_port,
            cors: options.cors,
            rate_limit_per_minute: server_rate_limit,
            openai_api_key: api_key,
            log_level: app_log_level,
            log_json: options.log_json,
        }
    }

    pub async fn serve(&self) -> anyhow::Result<()> {
        let vectordb = VectorDB::new(
            self.qdrant_url.clone(),
            self.collection_name.clone(),
            self.embedding_dim,
        );
        let coll_loaded = vectordb.check_collection_ready().await?;
        if !coll_loaded {
            return Err(anyhow::anyhow!(
                "Vector database does not contain any vectors"
            ));
        }
        let roles = match &self.redis_url {
            Some(url) => match RoleStore::connect(url) {
                Ok(store) => Some(store),
                Err(e) => {
                    eprintln!("Could not connect to the role store: {}", e);
                    None
                }
            },
            None => None,
        };
        let state = AppState {
            vectordb,
            openai_client: Client::with_config(
                OpenAIConfig::new().with_api_key(&self.openai_api_key),
            ),
            cache: Arc::new(Mutex::new(QueryCache::open(self.cache_dir.clone()).await)),
            transcript: Arc::new(Mutex::new(Transcript::new())),
            roles,
            openai_model: self.openai_model.clone(),
            embedding_model: self.embedding_model.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        };
        let cors_layer = if self.cors.is_some()
            && let Some(cors) = &self.cors
        {
            CorsLayer::new()
                .allow_origin(
                    cors.parse::<HeaderValue>()
                        .expect("Should be able to parse URL into a header value."),
                )
                .allow_methods(vec![Method::GET, Method::POST, Method::DELETE])
                .allow_headers(vec![CONTENT_TYPE])
        } else {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(vec![Method::GET, Method::POST, Method::DELETE])
                .allow_headers(vec![CONTENT_TYPE])
        };
        let governor_conf = Box::new(
            GovernorConfigBuilder::default()
                .per_second(60)
                .burst_size(self.rate_limit_per_minute)
                .finish()
                .expect("Should be able to create a tower-governor config."),
        );
        let governor_limiter = governor_conf.limiter().clone();
        let interval = tokio::time::Duration::from_secs(60);
        // a separate background task to clean up
        std::thread::spawn(move || {
            loop {
                std::thread::sleep(interval);
                if !governor_limiter.is_empty() {
                    debug!("rate limiting storage size: {}", governor_limiter.len());
                }
                governor_limiter.retain_recent();
            }
        });
        let governor_layer = GovernorLayer::new(governor_conf);
        let app = Router::new()
            .route("/chat", post(chat))
            .route("/webpage", post(webpage))
            .route("/roles", post(create_role).get(get_roles).delete(delete_role))
            .layer(governor_layer)
            .layer(cors_layer)
            .with_state(state);
        let addr = SocketAddr::from((self.host, self.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let level_filter = LevelFilter::from_level(self.log_level);
        let subscriber = tracing_subscriber::registry()
            .with(level_filter)
            .with((!self.log_json).then(|| fmt::layer().compact()))
            .with((self.log_json).then(|| fmt::layer().json()));
        subscriber.init();
        info!("Server listening on {}", addr.to_string());
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }
}

#[instrument(skip_all, fields(query = %payload.input))]
async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, RagError> {
    if payload.input.trim().is_empty() {
        return Err(RagError::new(400, "Input is required"));
    }
    let query = payload.input.clone();
    let search_limit = match payload.limit {
        Some(l) => l,
        None => DEFAULT_SEARCH_LIMIT,
    };
    let openai_model = match payload.openai_model {
        Some(m) => m,
        None => state.openai_model.clone(),
    };
    let mode = payload.mode.unwrap_or_default();
    let system_prompt = resolve_system_prompt(&state, payload.role.as_deref()).await;

    info!(event = "RagSearchStart", "Starting retrieval");
    let now = tokio::time::Instant::now();
    let passages = retrieve_passages(&state, &query, search_limit).await?;
    let elapsed = now.elapsed().as_millis();
    debug!(
        event = "SearchResultsReport",
        "Total retrieved results: {}/{}",
        passages.len(),
        search_limit
    );
    info!(event = "RagSearchEnd", "Ended retrieval in {} ms", elapsed);

    info!(event = "GroundedAnswerStart", "Starting grounded answer generation");
    let now_resp = tokio::time::Instant::now();
    let grounded = match grounded_answer(&state.openai_client, &openai_model, &passages, &query)
        .await
    {
        Ok(answer) => answer,
        Err(e) => {
            return Err(RagError::new(
                500,
                format!("Could not generate an answer because of {}", e),
            ));
        }
    };
    let elapsed_resp = now_resp.elapsed().as_millis();
    info!(
        event = "GroundedAnswerEnd",
        "Finished grounded answer generation in {} ms", elapsed_resp
    );

    let mut transcript = state.transcript.lock().await;
    transcript.push_user(query);
    let answer = match mode {
        ReconcileMode::Fallback => {
            if is_non_answer(&grounded) {
                info!(
                    event = "FallbackTriggered",
                    "Grounded answer was a non-answer, retrying with the transcript"
                );
                match transcript_completion(
                    &state.openai_client,
                    &openai_model,
                    &system_prompt,
                    transcript.turns(),
                    true,
                )
                .await
                {
                    Ok(completion) => completion,
                    Err(e) => {
                        error!("Chat completion failed: {}", e);
                        COMPLETION_ERROR_MESSAGE.to_string()
                    }
                }
            } else {
                grounded
            }
        }
        ReconcileMode::Arbitrate => {
            match transcript_completion(
                &state.openai_client,
                &openai_model,
                &system_prompt,
                transcript.turns(),
                false,
            )
            .await
            {
                Ok(completion) => {
                    let score = similarity(&completion, &grounded);
                    debug!(event = "ArbitrationReport", "Answer similarity: {}", score);
                    if score > ARBITRATION_THRESHOLD {
                        completion
                    } else {
                        grounded
                    }
                }
                Err(e) => {
                    error!("Chat completion failed: {}", e);
                    COMPLETION_ERROR_MESSAGE.to_string()
                }
            }
        }
        ReconcileMode::Summarize => {
            match transcript_completion(
                &state.openai_client,
                &openai_model,
                &system_prompt,
                transcript.turns(),
                false,
            )
            .await
            {
                Ok(completion) => {
                    match summarize_answers(
                        &state.openai_client,
                        &openai_model,
                        &system_prompt,
                        transcript.turns(),
                        &grounded,
                        &completion,
                    )
                    .await
                    {
                        Ok(summary) => summary,
                        Err(e) => {
                            error!("Summarization failed: {}", e);
                            SUMMARIZATION_ERROR_MESSAGE.to_string()
                        }
                    }
                }
                Err(e) => {
                    error!("Chat completion failed: {}", e);
                    COMPLETION_ERROR_MESSAGE.to_string()
                }
            }
        }
    };
    transcript.push_assistant(answer.clone());
    let token_info = match tokens_info(&transcript.joined()) {
        Ok(info) => info,
        Err(e) => {
            return Err(RagError::new(
                500,
                format!("Could not compute the token usage because of {}", e),
            ));
        }
    };

    Ok(Json(ChatResponse {
        response: answer,
        token_info,
    }))
}

async fn retrieve_passages(
    state: &AppState,
    query: &str,
    search_limit: u64,
) -> Result<Vec<String>, RagError> {
    let mut cache = state.cache.lock().await;
    if let Some(hit) = cache.get(query) {
        debug!(event = "QueryCacheHit", "Serving retrieval results from the cache");
        return Ok(hit.clone());
    }
    let embedding = match embed_text(&state.openai_client, &state.embedding_model, query).await {
        Ok(e) => e,
        Err(e) => {
            return Err(RagError::new(
                500,
                format!("Could not embed the query because of {}", e),
            ));
        }
    };
    let results = match state.vectordb.search(embedding, search_limit).await {
        Ok(v) => v,
        Err(e) => {
            return Err(RagError::new(
                500,
                format!("Could not retrieve results because of {}", e),
            ));
        }
    };
    if let Err(e) = cache.insert(query.to_string(), results.clone()).await {
        warn!("Could not persist the query cache: {}", e);
    }
    Ok(results)
}

async fn resolve_system_prompt(state: &AppState, role: Option<&str>) -> String {
    let role_name = match role {
        Some(r) => r,
        None => return DEFAULT_SYSTEM_PROMPT.to_string(),
    };
    let store = match &state.roles {
        Some(s) => s,
        None => {
            warn!("No role store configured, using the default prompt");
            return DEFAULT_SYSTEM_PROMPT.to_string();
        }
    };
    match store.get(role_name).await {
        Ok(Some(content)) => content,
        Ok(None) => {
            warn!("Role {} not found, using the default prompt", role_name);
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            warn!("Could not reach the role store: {}", e);
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

#[instrument(skip_all, fields(webpage = %payload.webpage))]
async fn webpage(
    State(state): State<AppState>,
    Json(payload): Json<WebpageRequest>,
) -> Result<Json<StatusMessage>, RagError> {
    let text = match fetch_webpage(&payload.webpage).await {
        Ok(t) => t,
        Err(e) => {
            return Err(RagError::new(
                400,
                format!("An error occurred while processing the webpage: {}", e),
            ));
        }
    };
    let chunks = chunk_text(&text, state.chunk_size, state.chunk_overlap);
    let chunks = match embed_chunks(&state.openai_client, &state.embedding_model, chunks).await {
        Ok(c) => c,
        Err(e) => {
            return Err(RagError::new(
                500,
                format!("Could not embed the webpage because of {}", e),
            ));
        }
    };
    if let Err(e) = state.vectordb.upload_embeddings(chunks).await {
        return Err(RagError::new(
            500,
            format!("Could not index the webpage because of {}", e),
        ));
    }
    info!(event = "WebpageIngested", "Webpage added to the index");
    Ok(Json(StatusMessage {
        status: "success".to_string(),
        message: "New URL submitted successfully to your embeddings.".to_string(),
    }))
}

fn role_store(state: &AppState) -> Result<&RoleStore, RagError> {
    match &state.roles {
        Some(store) => Ok(store),
        None => Err(RagError::new(500, REDIS_ERROR_MESSAGE)),
    }
}

async fn create_role(
    State(state): State<AppState>,
    Json(payload): Json<RoleRequest>,
) -> Result<(StatusCode, &'static str), RagError> {
    if payload.name.trim().is_empty() {
        return Err(RagError::new(400, "Role name is required"));
    }
    let store = role_store(&state)?;
    match store.create(&payload.name, &payload.content).await {
        Ok(true) => Ok((StatusCode::CREATED, "Role created")),
        Ok(false) => Err(RagError::new(400, "Role with this name already exists")),
        Err(e) => {
            error!("Role store error: {}", e);
            Err(RagError::new(500, REDIS_ERROR_MESSAGE))
        }
    }
}

async fn get_roles(
    State(state): State<AppState>,
    Query(params): Query<RolesQuery>,
) -> Result<Json<HashMap<String, String>>, RagError> {
    let store = role_store(&state)?;
    match params.name {
        Some(name) => match store.get(&name).await {
            Ok(Some(content)) => Ok(Json(HashMap::from([(name, content)]))),
            Ok(None) => Err(RagError::new(404, "Role not found")),
            Err(e) => {
                error!("Role store error: {}", e);
                Err(RagError::new(500, REDIS_ERROR_MESSAGE))
            }
        },
        None => match store.all().await {
            Ok(roles) => Ok(Json(roles)),
            Err(e) => {
                error!("Role store error: {}", e);
                Err(RagError::new(500, REDIS_ERROR_MESSAGE))
            }
        },
    }
}

async fn delete_role(
    State(state): State<AppState>,
    Json(payload): Json<RoleName>,
) -> Result<(StatusCode, &'static str), RagError> {
    let store = role_store(&state)?;
    match store.delete(&payload.name).await {
        Ok(true) => Ok((StatusCode::OK, "Role deleted")),
        Ok(false) => Err(RagError::new(404, "Role not found")),
        Err(e) => {
            error!("Role store error: {}", e);
            Err(RagError::new(500, REDIS_ERROR_MESSAGE))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::pipeline::Pipeline;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::Service;

    #[test]
    fn test_chat_request_minimal_payload() {
        let request: ChatRequest = serde_json::from_str("{\"input\": \"hello\"}").unwrap();
        assert_eq!(request.input, "hello");
        assert!(request.role.is_none());
        assert!(request.mode.is_none());
        assert!(request.limit.is_none());
    }

    #[test]
    fn test_chat_request_with_mode_and_role() {
        let request: ChatRequest = serde_json::from_str(
            "{\"input\": \"hello\", \"mode\": \"summarize\", \"role\": \"lawyer\"}",
        )
        .unwrap();
        assert_eq!(request.mode, Some(ReconcileMode::Summarize));
        assert_eq!(request.role.as_deref(), Some("lawyer"));
    }

    #[test]
    fn test_rag_error_carries_status_code() {
        let response = RagError::new(404, "Role not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chat_endpoint() {
        let qdrant_url = match std::env::var("QDRANT_URL") {
            Ok(s) => s,
            Err(_) => {
                println!("Skipping test because Qdrant is not available");
                return;
            }
        };
        let openai_api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(s) => s,
            Err(_) => {
                println!("Skipping test because OpenAI API key is not available");
                return;
            }
        };
        let pipeline = Pipeline::new(
            "testfiles/".to_string(),
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHUNK_OVERLAP,
            DEFAULT_EMBEDDING_MODEL.to_string(),
            qdrant_url.clone(),
            "test-serving-collection".to_string(),
            DEFAULT_EMBEDDING_DIM,
        );
        let result = pipeline.run().await;
        assert!(result.is_ok());
        let vectordb = VectorDB::new(
            qdrant_url,
            "test-serving-collection".to_string(),
            DEFAULT_EMBEDDING_DIM,
        );
        let cache_dir = std::env::temp_dir()
            .join(format!("ophelia-serving-test-{}", std::process::id()))
            .to_string_lossy()
            .to_string();
        let state = AppState {
            vectordb,
            openai_client: Client::with_config(OpenAIConfig::new().with_api_key(openai_api_key)),
            cache: Arc::new(Mutex::new(QueryCache::open(Some(cache_dir)).await)),
            transcript: Arc::new(Mutex::new(Transcript::new())),
            roles: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        };
        let mut app = Router::new().route("/chat", post(chat)).with_state(state);
        let request_body = serde_json::to_string(&ChatRequest {
            input: "Is this a test?".to_string(),
            role: None,
            mode: None,
            limit: Some(1_u64),
            openai_model: None,
        })
        .unwrap();
        let response = app
            .call(
                Request::builder()
                    .uri("/chat")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(request_body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
