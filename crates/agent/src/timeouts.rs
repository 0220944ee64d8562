use std::future::Future;
use std::time::Duration;

use insight_core::config::AppConfig;
use insight_core::CapabilityError;

/// Per-collaborator deadlines applied around every external call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub llm: Duration,
    pub query: Duration,
    pub stat_test: Duration,
}

impl Timeouts {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            llm: Duration::from_secs(config.llm.timeout_secs),
            query: Duration::from_secs(config.analysis.query_timeout_secs),
            stat_test: Duration::from_secs(config.analysis.stat_test_timeout_secs),
        }
    }

    pub fn uniform(limit: Duration) -> Self {
        Self { llm: limit, query: limit, stat_test: limit }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Runs `call`, reporting an elapsed deadline as [`CapabilityError::Timeout`].
pub async fn bounded<T, F>(
    capability: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout {
            capability,
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use insight_core::CapabilityError;

    use super::bounded;

    #[tokio::test]
    async fn elapsed_deadline_becomes_timeout_error() {
        let result: Result<(), CapabilityError> = bounded("data_source", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        assert_eq!(
            result,
            Err(CapabilityError::Timeout { capability: "data_source", after_ms: 10 })
        );
    }

    #[tokio::test]
    async fn completed_call_passes_through() {
        let result = bounded("llm", Duration::from_secs(1), async { Ok::<_, CapabilityError>(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
