//! Primary+fallback model call wrapping (§4.L).

use crate::model::ModelString;
use std::future::Future;

/// Run `call` against `primary`; on error, make exactly one attempt against
/// `fallback` if present, logging `fallback_triggered` with the fields
/// named in §4.L. Returns the fallback's result (success or error)
/// verbatim; if there's no fallback, the primary's error is returned.
pub async fn call_with_fallback<T, E, F, Fut>(
    primary: &ModelString,
    fallback: Option<&ModelString>,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut(ModelString) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match call(primary.clone()).await {
        Ok(value) => Ok(value),
        Err(primary_error) => match fallback {
            Some(fallback_model) => {
                tracing::warn!(
                    fallback_triggered = true,
                    primary_model = %primary,
                    fallback_model = %fallback_model,
                    primary_error = %primary_error,
                    error_type = std::any::type_name::<E>(),
                    "primary model failed, attempting fallback"
                );
                call(fallback_model.clone()).await
            }
            None => Err(primary_error),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn succeeds_on_primary_without_touching_fallback() {
        let primary = ModelString::parse("openai:gpt-4o").unwrap();
        let calls = AtomicUsize::new(0);
        let result: Result<&str, &str> = call_with_fallback(&primary, None, |_model| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("ok") }
        })
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_back_exactly_once_on_primary_error() {
        let primary = ModelString::parse("openai:gpt-4o").unwrap();
        let fallback = ModelString::parse("anthropic:claude-3.5-sonnet").unwrap();
        let calls = AtomicUsize::new(0);
        let result: Result<&str, &str> =
            call_with_fallback(&primary, Some(&fallback), |model| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if model.provider() == "openai" {
                        Err("primary down")
                    } else {
                        let _ = n;
                        Ok("fallback ok")
                    }
                }
            })
            .await;
        assert_eq!(result, Ok("fallback ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn without_fallback_primary_error_propagates() {
        let primary = ModelString::parse("openai:gpt-4o").unwrap();
        let result: Result<&str, &str> =
            call_with_fallback(&primary, None, |_| async { Err("down") }).await;
        assert_eq!(result, Err("down"));
    }
}
