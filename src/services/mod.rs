pub mod ai_service; // VisionModel trait + image payload
pub mod gemini; // Google Gemini vision API
pub mod nutrition;
pub mod prompt;

pub use ai_service::{ImagePayload, VisionModel};
pub use gemini::GeminiService;
