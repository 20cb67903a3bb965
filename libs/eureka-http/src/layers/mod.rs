//! Tower layers for the HTTP client middleware stack
//!
//! - [`UserAgentLayer`] - Adds User-Agent header to all requests
//! - [`RetryLayer`] - Re-sends failed attempts according to a [`crate::RetryConfig`]

mod retry;
mod user_agent;

pub use retry::{RETRY_ATTEMPT_HEADER, RetryLayer, RetryService, RetryTrigger};
pub use user_agent::{UserAgentLayer, UserAgentService};
