use crate::error::{Error, Result};
use crate::model::{ChatModel, FragmentStream};
use crate::session::Message;
use futures::{stream, Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Streaming client for an Ollama server's `/api/chat` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaModel {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

impl ChatModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn stream_chat(&self, messages: Vec<Message>) -> FragmentStream {
        let request = self.client.post(self.chat_url()).json(&ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
        });
        debug!(model = %self.model, messages = messages.len(), "starting chat stream");

        let response = async move {
            let response = request.send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorResponse>(&body)
                    .map(|err| err.error)
                    .unwrap_or(body);
                return Err(Error::Model(format!("{status}: {message}")));
            }
            Ok(decode_fragments(response.bytes_stream()))
        };

        stream::once(response).try_flatten().boxed()
    }
}

struct Decoding<S> {
    bytes: Pin<Box<S>>,
    decoder: NdjsonDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

fn decode_fragments<S, B>(bytes: S) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = Decoding {
        bytes: Box::pin(bytes),
        decoder: NdjsonDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };
    stream::try_unfold(state, next_fragment)
}

async fn next_fragment<S, B>(mut state: Decoding<S>) -> Result<Option<(String, Decoding<S>)>>
where
    S: Stream<Item = reqwest::Result<B>>,
    B: AsRef<[u8]> + Send,
{
    loop {
        if let Some(fragment) = state.pending.pop_front() {
            return Ok(Some((fragment, state)));
        }
        if state.finished {
            return Ok(None);
        }
        let decoded = match state.bytes.next().await {
            Some(chunk) => state.decoder.push(chunk?.as_ref())?,
            None => {
                state.finished = true;
                state.decoder.finish()?
            }
        };
        state.finished |= decoded.done;
        state.pending.extend(decoded.fragments);
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    pub fragments: Vec<String>,
    /// The server sent its final `done` object.
    pub done: bool,
}

/// Splits a newline-delimited JSON body into reply fragments.
///
/// Chunk boundaries may fall anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl NdjsonDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Result<Decoded> {
        self.buffer.extend_from_slice(chunk);
        let mut decoded = Decoded::default();

        while !self.done {
            let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.decode_line(&line, &mut decoded)?;
        }

        decoded.done = self.done;
        Ok(decoded)
    }

    /// Flushes a trailing line that had no newline.
    pub fn finish(&mut self) -> Result<Decoded> {
        let mut decoded = Decoded::default();
        if !self.done {
            let line = std::mem::take(&mut self.buffer);
            self.decode_line(&line, &mut decoded)?;
        }
        decoded.done = self.done;
        Ok(decoded)
    }

    fn decode_line(&mut self, line: &[u8], decoded: &mut Decoded) -> Result<()> {
        let line = trim_ascii(line);
        if line.is_empty() {
            return Ok(());
        }

        let chunk: ChatChunk = serde_json::from_slice(line)?;
        if let Some(error) = chunk.error {
            return Err(Error::Model(error));
        }
        if let Some(message) = chunk.message {
            if !message.content.is_empty() {
                decoded.fragments.push(message.content);
            }
        }
        if chunk.done {
            self.done = true;
        }
        Ok(())
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
