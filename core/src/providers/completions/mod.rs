pub(crate) mod ollama;

pub use ollama::OllamaCompletionModel as Ollama;
