// Generative-text collaborator used to name discovered themes.
//
// The GenerativeText trait is the seam; GeminiClient talks to Google's
// Gemini REST API. Calls are paced by a shared RateLimiter.

pub mod gemini;
pub mod rate_limiter;
pub mod traits;
