pub mod gemini;

pub use gemini::{GeminiEmbeddingProvider, GeminiGenerativeModel};
