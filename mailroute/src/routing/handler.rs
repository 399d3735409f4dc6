//! The capability every message handler provides.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use super::matcher::Captures;
use crate::mail::MailRequest;

/// Application code that processes a routed message.
///
/// `handle` returns the conversation's next state, or `None` to stay in the
/// current one. An `Err` leaves the state untouched and is returned to the
/// caller of `deliver` as-is.
pub trait Handler: Send + Sync {
    /// Name used in route listings, e.g. `app::confirm`.
    fn name(&self) -> &str;

    fn handle(&self, message: &MailRequest, captures: &Captures) -> Result<Option<String>>;
}

impl fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.name()).finish()
    }
}

/// A handler backed by a closure.
pub struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&MailRequest, &Captures) -> Result<Option<String>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, message: &MailRequest, captures: &Captures) -> Result<Option<String>> {
        (self.func)(message, captures)
    }
}

/// Wrap a closure as a shareable handler.
pub fn handler_fn<F>(name: impl Into<String>, func: F) -> Arc<dyn Handler>
where
    F: Fn(&MailRequest, &Captures) -> Result<Option<String>> + Send + Sync + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        func,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_fn() {
        let handler = handler_fn("app::echo", |message, captures| {
            Ok(Some(format!("{}:{}", message.recipient, captures.len())))
        });

        let message = MailRequest::new("a@example.com", "b@example.com", "");
        let next = handler.handle(&message, &Captures::new()).unwrap();

        assert_eq!(handler.name(), "app::echo");
        assert_eq!(next, Some("b@example.com:0".to_string()));
        assert_eq!(format!("{:?}", handler), "Handler(\"app::echo\")");
    }
}
