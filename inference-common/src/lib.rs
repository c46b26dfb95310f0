//! Inference Common Types
//!
//! OpenAI-compatible wire types shared by the inference server and its clients.

pub mod chat;
pub mod completion;
pub mod error;
pub mod sampling;
pub mod tool;
pub mod usage;

pub use chat::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, FunctionCall,
    FunctionSpec,
};
pub use completion::{CompletionRequest, CompletionResponse, TextChoice};
pub use error::{ErrorBody, ErrorDetail};
pub use sampling::{FinishReason, OneOrMany, SamplingParams};
pub use tool::ToolResponse;
pub use usage::Usage;
