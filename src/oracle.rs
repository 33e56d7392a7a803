//! Optional AI oracle boundary.
//!
//! The pipeline consumes two capabilities: naming chapter starts from
//! sampled text, and describing an image for alt text. Both are
//! best-effort; every call site catches failures and continues without
//! the oracle's answer.

use crate::error::Result;

/// External text/vision analysis capability.
pub trait Oracle: Send + Sync {
    /// Answer a text prompt.
    fn describe_text(&self, prompt: &str) -> Result<String>;

    /// Describe an image given its encoded bytes and a prompt.
    fn describe_image(&self, image: &[u8], prompt: &str) -> Result<String>;
}

/// Oracle that answers nothing, used when no collaborator is configured.
#[derive(Debug, Default)]
pub struct NoopOracle;

impl Oracle for NoopOracle {
    fn describe_text(&self, _prompt: &str) -> Result<String> {
        Ok(String::new())
    }

    fn describe_image(&self, _image: &[u8], _prompt: &str) -> Result<String> {
        Ok(String::new())
    }
}
