//! Fan-out/fan-in aggregation across all registered sources.
//!
//! One aggregation run snapshots the registry, fetches every source
//! concurrently with its own timeout, waits for all of them, and folds the
//! successes into one [`CompositeResult`]. Failures are logged and reported
//! but never fail the run.

use crate::aggregate::builder::CompositeBuilder;
use crate::error::FetchError;
use crate::fetch::{Fetcher, DEFAULT_TIMEOUT};
use crate::mapper::map_request;
use crate::models::{CompositeResult, FetchOutcome, RequestContext};
use crate::registry::SourceRegistry;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Everything one aggregation run produced.
#[derive(Debug)]
pub struct AggregationReport {
    pub composite: CompositeResult,
    /// One outcome per snapshotted source; order is not significant.
    pub outcomes: Vec<FetchOutcome>,
    pub elapsed: Duration,
}

impl AggregationReport {
    pub fn successes(&self) -> impl Iterator<Item = &FetchOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &FetchError)> {
        self.outcomes.iter().filter_map(|o| match o {
            FetchOutcome::Failure { source, cause } => Some((source.as_str(), cause)),
            FetchOutcome::Success { .. } => None,
        })
    }
}

/// Runs aggregations against a shared registry.
#[derive(Debug, Clone)]
pub struct Aggregator {
    registry: Arc<SourceRegistry>,
    fetcher: Fetcher,
    timeout: Duration,
    /// Cap on concurrent fetches; `None` fetches every source at once.
    max_in_flight: Option<usize>,
}

impl Aggregator {
    pub fn new(registry: Arc<SourceRegistry>, fetcher: Fetcher) -> Self {
        Self {
            registry,
            fetcher,
            timeout: DEFAULT_TIMEOUT,
            max_in_flight: None,
        }
    }

    /// Per-source timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: Option<usize>) -> Self {
        self.max_in_flight = max_in_flight.map(|n| n.max(1));
        self
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Aggregate all sources and return the composite.
    pub async fn aggregate(&self, ctx: &RequestContext) -> CompositeResult {
        self.run(ctx).await.composite
    }

    /// Aggregate all sources and return the composite with every outcome.
    ///
    /// Returns only after every fetch has resolved. Dropping the returned
    /// future cancels all in-flight fetches.
    pub async fn run(&self, ctx: &RequestContext) -> AggregationReport {
        let start = Instant::now();
        let snapshot = self.registry.snapshot();

        if snapshot.is_empty() {
            debug!("No sources registered, returning empty composite");
            return AggregationReport {
                composite: CompositeResult::default(),
                outcomes: Vec::new(),
                elapsed: start.elapsed(),
            };
        }

        debug!("Fanning out to {} sources", snapshot.len());

        let fetcher = &self.fetcher;
        let caller = ctx.caller.as_str();
        let timeout = self.timeout;
        let tasks = snapshot.into_iter().map(|(name, config)| {
            let params = map_request(&ctx.params, &config);
            async move {
                fetcher
                    .fetch(&name, &config, &params, caller, timeout)
                    .await
            }
        });

        let outcomes: Vec<FetchOutcome> = match self.max_in_flight {
            Some(limit) => stream::iter(tasks).buffer_unordered(limit).collect().await,
            None => futures::future::join_all(tasks).await,
        };

        let composite = fold_outcomes(&outcomes);
        let elapsed = start.elapsed();
        let ok = outcomes.iter().filter(|o| o.is_success()).count();

        info!(
            "Aggregated {} sources in {}ms: {} succeeded, {} failed",
            outcomes.len(),
            elapsed.as_millis(),
            ok,
            outcomes.len() - ok
        );

        AggregationReport {
            composite,
            outcomes,
            elapsed,
        }
    }
}

/// Fold every successful payload into a composite.
pub fn fold_outcomes(outcomes: &[FetchOutcome]) -> CompositeResult {
    let mut builder = CompositeBuilder::new();

    for outcome in outcomes {
        if let FetchOutcome::Success { payload, .. } = outcome {
            if let Some(tags) = &payload.tags {
                builder.add_tags(tags.iter().cloned());
            }
            if let Some(score) = &payload.score {
                builder.add_score(score.clone());
            }
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::DEFAULT_CALLER_HEADER;
    use crate::models::{Params, SourceConfig, Tag};
    use httpmock::prelude::*;
    use serde_json::json;

    fn aggregator(registry: Arc<SourceRegistry>) -> Aggregator {
        Aggregator::new(registry, Fetcher::new(DEFAULT_CALLER_HEADER).unwrap())
    }

    fn ctx(pairs: &[(&str, &str)]) -> RequestContext {
        let params: Params = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RequestContext::new(params, "overlay/2.1")
    }

    #[tokio::test]
    async fn test_empty_registry_returns_empty_composite() {
        let engine = aggregator(Arc::new(SourceRegistry::in_memory()));

        let report = engine.run(&ctx(&[("id", "1")])).await;
        assert!(report.outcomes.is_empty());
        assert!(report.composite.is_empty());
    }

    #[tokio::test]
    async fn test_one_success_one_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/a");
                then.status(200)
                    .json_body(json!({"tags": [{"icon": "x"}], "score": {"value": 5.0}}))
                    .delay(Duration::from_millis(10));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/b");
                then.status(200)
                    .json_body(json!({"tags": [{"icon": "y"}]}))
                    .delay(Duration::from_secs(3));
            })
            .await;

        let registry = Arc::new(SourceRegistry::in_memory());
        registry.add("a", SourceConfig::new(server.url("/a"))).unwrap();
        registry.add("b", SourceConfig::new(server.url("/b"))).unwrap();

        let timeout = Duration::from_millis(300);
        let engine = aggregator(registry).with_timeout(timeout);
        let report = engine.run(&ctx(&[])).await;

        assert_eq!(report.composite.tags, vec![Tag::icon("x")]);
        assert_eq!(report.composite.score.as_ref().map(|s| s.value), Some(5.0));

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "b");
        assert!(matches!(failures[0].1, FetchError::Timeout(_)));

        // the join waited for the timed-out source
        assert!(report.elapsed >= timeout);
    }

    #[tokio::test]
    async fn test_union_of_exactly_the_successes() {
        let server = MockServer::start_async().await;
        let ok1 = server
            .mock_async(|when, then| {
                when.method(GET).path("/ok1");
                then.status(200)
                    .json_body(json!({"tags": [{"icon": "a"}, {"icon": "b"}], "score": {"value": 1.5}}));
            })
            .await;
        let ok2 = server
            .mock_async(|when, then| {
                when.method(GET).path("/ok2");
                then.status(200)
                    .json_body(json!({"tags": [{"icon": "b"}, {"icon": "c"}], "score": {"value": 2.0}}));
            })
            .await;
        let broken = server
            .mock_async(|when, then| {
                when.method(GET).path("/broken");
                then.status(500)
                    .json_body(json!({"tags": [{"icon": "never"}]}));
            })
            .await;
        let garbage = server
            .mock_async(|when, then| {
                when.method(GET).path("/garbage");
                then.status(200).body("not json");
            })
            .await;

        let registry = Arc::new(SourceRegistry::in_memory());
        for name in ["ok1", "ok2", "broken", "garbage"] {
            registry
                .add(name, SourceConfig::new(server.url(format!("/{}", name))))
                .unwrap();
        }

        let report = aggregator(registry).run(&ctx(&[("id", "7")])).await;

        for mock in [&ok1, &ok2, &broken, &garbage] {
            mock.assert_hits_async(1).await;
        }
        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.successes().count(), 2);
        assert_eq!(report.failures().count(), 2);

        let mut icons: Vec<_> = report
            .composite
            .tags
            .iter()
            .map(|t| t.icon.as_str())
            .collect();
        icons.sort();
        assert_eq!(icons, vec!["a", "b", "c"]);
        assert_eq!(report.composite.score.map(|s| s.value), Some(3.5));
    }

    #[tokio::test]
    async fn test_all_failing_returns_empty_composite() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(404);
            })
            .await;

        let registry = Arc::new(SourceRegistry::in_memory());
        registry.add("x", SourceConfig::new(server.url("/x"))).unwrap();
        registry.add("y", SourceConfig::new(server.url("/y"))).unwrap();

        let composite = aggregator(registry).aggregate(&ctx(&[])).await;
        assert!(composite.is_empty());
    }

    #[tokio::test]
    async fn test_each_source_gets_its_own_mapping() {
        let server = MockServer::start_async().await;
        let remapped = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/remapped")
                    .query_param("uuid", "42")
                    .query_param("key", "k1");
                then.status(200).json_body(json!({}));
            })
            .await;
        let passthrough = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/passthrough")
                    .query_param("id", "42")
                    .query_param("name", "steve")
                    .header("user-agent", "overlay/2.1");
                then.status(200).json_body(json!({}));
            })
            .await;

        let registry = Arc::new(SourceRegistry::in_memory());
        registry
            .add(
                "remapped",
                SourceConfig::new(server.url("/remapped"))
                    .with_static_param("key", crate::models::ParamValue::Scalar("k1".into()))
                    .with_remap("id", "uuid"),
            )
            .unwrap();
        registry
            .add("passthrough", SourceConfig::new(server.url("/passthrough")))
            .unwrap();

        let report = aggregator(registry)
            .run(&ctx(&[("id", "42"), ("name", "steve")]))
            .await;

        remapped.assert_async().await;
        passthrough.assert_async().await;
        assert_eq!(report.successes().count(), 2);
    }

    #[tokio::test]
    async fn test_run_is_isolated_from_concurrent_mutation() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow");
                then.status(200)
                    .json_body(json!({"tags": [{"icon": "slow"}]}))
                    .delay(Duration::from_millis(300));
            })
            .await;

        let registry = Arc::new(SourceRegistry::in_memory());
        registry
            .add("slow", SourceConfig::new(server.url("/slow")))
            .unwrap();
        let engine = aggregator(Arc::clone(&registry));

        let request = ctx(&[]);
        let (report, _) = tokio::join!(engine.run(&request), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            registry.delete("slow").unwrap();
            registry
                .add("late", SourceConfig::new(server.url("/late")))
                .unwrap();
        });

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].source(), "slow");
        assert_eq!(report.composite.tags, vec![Tag::icon("slow")]);
        assert_eq!(registry.list(), vec!["late"]);
    }

    #[tokio::test]
    async fn test_bounded_fan_out_still_joins_everything() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200).json_body(json!({"score": {"value": 1.0}}));
            })
            .await;

        let registry = Arc::new(SourceRegistry::in_memory());
        for i in 0..5 {
            registry
                .add(&format!("s{}", i), SourceConfig::new(server.url(format!("/s{}", i))))
                .unwrap();
        }

        let report = aggregator(registry)
            .with_max_in_flight(Some(2))
            .run(&ctx(&[]))
            .await;

        assert_eq!(report.successes().count(), 5);
        assert_eq!(report.composite.score.map(|s| s.value), Some(5.0));
    }

    #[test]
    fn test_fold_ignores_failures() {
        let outcomes = vec![
            FetchOutcome::Failure {
                source: "bad".to_string(),
                cause: FetchError::UnexpectedStatus(500),
            },
            FetchOutcome::Success {
                source: "good".to_string(),
                elapsed: Duration::from_millis(3),
                payload: crate::models::Payload {
                    tags: Some(vec![Tag::icon("z")]),
                    score: None,
                },
            },
        ];

        let composite = fold_outcomes(&outcomes);
        assert_eq!(composite.tags, vec![Tag::icon("z")]);
        assert!(composite.score.is_none());
    }
}
