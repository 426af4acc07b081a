//! The page-control capability the crawler consumes.
//!
//! The crawler never drives a browser itself. The calling environment owns a
//! live page (a headless Chrome tab in the CLI, an in-memory double in tests)
//! and hands it to an adapter through [`PageController`].

use std::future::Future;
use std::time::{Duration, Instant};

use serde_json::Value;

use tocscraper_shared::{Result, ScraperError};

/// Query and drive a single live page.
///
/// Every wait takes an explicit timeout; there is no unbounded wait anywhere
/// in the engine.
pub trait PageController: Send + Sync + 'static {
    /// Navigate the page to `url` and wait for the load to finish.
    fn navigate(&self, url: &str) -> impl Future<Output = Result<()>> + Send;

    /// Evaluate a standalone script and return its result value.
    fn evaluate(&self, script: &str) -> impl Future<Output = Result<Value>> + Send;

    /// Click the first element matching `selector`.
    fn click(&self, selector: &str) -> impl Future<Output = Result<()>> + Send;

    /// Wait until an element matching `selector` exists, failing with
    /// [`ScraperError::Timeout`] after `timeout`.
    fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// The URL the page is currently showing.
    fn current_url(&self) -> impl Future<Output = Result<String>> + Send;
}

/// Unwrap a script result that was returned as `JSON.stringify(...)`.
///
/// Scripts stringify their results so that objects survive controllers that
/// only return primitives by value. Plain non-JSON strings pass through.
pub fn decode_json(value: Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}

/// JavaScript truthiness of a decoded script result.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Poll `script` until it evaluates truthy, or fail after `timeout`.
pub async fn wait_until<P: PageController>(
    page: &P,
    script: &str,
    what: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<()> {
    let started = Instant::now();
    loop {
        if is_truthy(&decode_json(page.evaluate(script).await?)) {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(ScraperError::timeout(what, timeout));
        }
        tokio::time::sleep(poll).await;
    }
}
