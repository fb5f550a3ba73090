//! Grounded question-answering engine: hybrid retrieval, cited answer
//! generation, and bounding-box evidence re-derivation with confidence
//! gates at every stage (C3-C8).

pub mod answer;
pub mod ask;
pub mod embedding;
pub mod error;
pub mod evidence;
pub mod openai_client;
pub mod retrieval;

pub use answer::{ChatClient, ChatCompletionRequest, ChatMessage, ProviderCallError, ProviderOutcome, ResponsesRequest};
pub use ask::ask_question;
pub use embedding::EmbeddingClient;
pub use error::{QaError, Result};
pub use openai_client::OpenAiClient;
pub use retrieval::RetrievedChunk;
