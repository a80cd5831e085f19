//! um-llm: completion service integration
//!
//! | Provider | Base URL | Auth Method |
//! |----------|----------|-------------|
//! | Gemini | `https://generativelanguage.googleapis.com/v1beta` | `?key={API_KEY}` |
//!
//! ## Environment Variables
//!
//! ```bash
//! GEMINI_API_KEY=xxx           # or GOOGLE_API_KEY
//! UM_GEMINI_MODEL=gemini-1.5-flash
//! ```

pub mod error;
pub mod gemini;
pub mod provider;

pub use error::CompletionError;
pub use gemini::GeminiClient;
pub use provider::{CompletionRequest, CompletionResponse, CompletionService};
