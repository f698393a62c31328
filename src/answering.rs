use std::collections::HashMap;

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use bm25::{Embedder, EmbedderBuilder, LanguageMode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::transcript::{Speaker, Turn};

pub const DEFAULT_SYSTEM_PROMPT: &str = "Act as a professional and knowledgeable person";

const DEFAULT_AVGDL: f32 = 5.75;

const GROUNDED_TEMPERATURE: f32 = 0.0;
const GROUNDED_MAX_TOKENS: u32 = 256;
const FALLBACK_TEMPERATURE: f32 = 0.9;
const COMPLETION_TEMPERATURE: f32 = 0.0;
const COMPLETION_MAX_TOKENS: u32 = 1500;
const SUMMARY_TEMPERATURE: f32 = 0.5;
const SUMMARY_MAX_TOKENS: u32 = 2000;

pub const ARBITRATION_THRESHOLD: f32 = 0.2;

const NON_ANSWER_PHRASES: [&str; 11] = [
    "I am sorry",
    "I don't know",
    "I don't understand",
    "Sorry, I cannot suggest",
    "Sorry,",
    "I'm sorry,",
    "I cannot provide an answer",
    "I don't have enough information",
    "There is no information",
    "No, there is no information",
    "The given context does not provide",
];

static NON_ANSWER: Lazy<Regex> = Lazy::new(|| {
    let pattern = NON_ANSWER_PHRASES
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&pattern).expect("Should be able to compile the non-answer pattern")
});

/// How the grounded answer and the transcript completion are reconciled into
/// the one answer the client receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// Keep the grounded answer unless it is a non-answer, then retry with a
    /// more creative transcript completion.
    #[default]
    Fallback,
    /// Always make both calls and keep the completion when the two answers
    /// are similar enough, the grounded answer otherwise.
    Arbitrate,
    /// Always make both calls and merge them with a summarization call.
    Summarize,
}

pub fn is_non_answer(text: &str) -> bool {
    NON_ANSWER.is_match(text)
}

pub fn compose_grounded_prompt(passages: &[String], query: &str) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, don't try \
         to make up an answer.\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        passages.join("\n\n"),
        query
    )
}

/// Single low-temperature completion over the retrieved passages.
pub async fn grounded_answer(
    client: &Client<OpenAIConfig>,
    model: &str,
    passages: &[String],
    query: &str,
) -> anyhow::Result<String> {
    let messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestUserMessageArgs::default()
            .content(compose_grounded_prompt(passages, query))
            .build()?
            .into(),
    ];
    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(messages)
        .temperature(GROUNDED_TEMPERATURE)
        .max_tokens(GROUNDED_MAX_TOKENS)
        .n(1)
        .build()?;
    let response = client.chat().create(request).await?;
    extract_answer(response.choices.into_iter().next().and_then(|c| c.message.content))
        .map(|s| s.trim().to_string())
}

pub fn build_chat_messages(
    system_prompt: &str,
    turns: &[Turn],
) -> anyhow::Result<Vec<ChatCompletionRequestMessage>> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(turns.len() + 1);
    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()?
            .into(),
    );
    for turn in turns {
        let message = match turn.speaker {
            Speaker::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.as_str())
                .build()?
                .into(),
            Speaker::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.as_str())
                .build()?
                .into(),
        };
        messages.push(message);
    }
    Ok(messages)
}

async fn chat_completion(
    client: &Client<OpenAIConfig>,
    model: &str,
    messages: Vec<ChatCompletionRequestMessage>,
    temperature: f32,
    max_tokens: u32,
) -> anyhow::Result<String> {
    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(messages)
        .temperature(temperature)
        .max_tokens(max_tokens)
        .n(1)
        .build()?;
    let response = client.chat().create(request).await?;
    extract_answer(response.choices.into_iter().next().and_then(|c| c.message.content))
}

/// Replay the full transcript and complete it, keeping the grounded answer's
/// temperature for arbitration and a more creative one for the fallback path.
pub async fn transcript_completion(
    client: &Client<OpenAIConfig>,
    model: &str,
    system_prompt: &str,
    turns: &[Turn],
    creative: bool,
) -> anyhow::Result<String> {
    let messages = build_chat_messages(system_prompt, turns)?;
    let temperature = if creative {
        FALLBACK_TEMPERATURE
    } else {
        COMPLETION_TEMPERATURE
    };
    chat_completion(client, model, messages, temperature, COMPLETION_MAX_TOKENS).await
}

/// Merge the two candidate answers with one summarization call made over the
/// replayed transcript.
pub async fn summarize_answers(
    client: &Client<OpenAIConfig>,
    model: &str,
    system_prompt: &str,
    turns: &[Turn],
    first: &str,
    second: &str,
) -> anyhow::Result<String> {
    let mut messages = build_chat_messages(system_prompt, turns)?;
    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(format!(
                "Summarize the following two answers into a single reply:\n\n{} {}",
                first, second
            ))
            .build()?
            .into(),
    );
    chat_completion(client, model, messages, SUMMARY_TEMPERATURE, SUMMARY_MAX_TOKENS).await
}

fn extract_answer(content: Option<String>) -> anyhow::Result<String> {
    match content {
        Some(s) => Ok(s),
        None => Err(anyhow::anyhow!("No response was generated")),
    }
}

/// Cosine similarity between the sparse term vectors of two answers.
pub fn similarity(a: &str, b: &str) -> f32 {
    let embedder: Embedder = EmbedderBuilder::with_avgdl(DEFAULT_AVGDL)
        .language_mode(LanguageMode::Detect)
        .build();
    let vec_a = sparse_map(&embedder, a);
    let vec_b = sparse_map(&embedder, b);
    let dot: f32 = vec_a
        .iter()
        .filter_map(|(index, value)| vec_b.get(index).map(|other| value * other))
        .sum();
    let norm_a: f32 = vec_a.values().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = vec_b.values().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn sparse_map(embedder: &Embedder, text: &str) -> HashMap<u32, f32> {
    let mut map: HashMap<u32, f32> = HashMap::new();
    for token in &embedder.embed(text).0 {
        *map.entry(token.index).or_insert(0.0) += token.value;
    }
    map
}
