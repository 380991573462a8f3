use crate::error::Result;
use crate::session::Message;
use futures::stream::BoxStream;

pub mod ollama;

pub use ollama::OllamaModel;

/// Incremental reply text, in the order the server produced it.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// A chat-completion backend that streams its answer.
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Starts a completion for `messages`. Errors may surface at any point in the stream.
    fn stream_chat(&self, messages: Vec<Message>) -> FragmentStream;
}
