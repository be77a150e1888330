//! Specialized checks built on the case runner and the batch scheduler:
//! the realtime channel round-trip, load and rate-limit bursts, latency
//! sampling, page rendering, adversarial payloads and store reachability.

use super::case::{interruptible, CaseRunner};
use super::context::RunContext;
use super::executor::join_url;
use super::scheduler::{BatchScheduler, Invocation};
use super::state::{Category, FailureKind, Outcome, TestResult, TestStatus};
use crate::driver::traits::{ChannelConnector, PageRenderer, RealtimeChannel, ReachabilityProbe};
use crate::parser::types::{
    InjectionSpec, LoadSpec, PageSpec, RateLimitSpec, RealtimeSpec, TestCase, TimedEndpoint,
};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const CONNECTION_TEST: &str = "WebSocket Connection";
pub const EXCHANGE_TEST: &str = "WebSocket Message Exchange";

/// Channel URL for the probe, with the user token as a query parameter when held
pub fn channel_url(ctx: &RunContext, spec: &RealtimeSpec) -> Result<reqwest::Url> {
    let raw = join_url(ctx.config().realtime_base_url(), &spec.path);
    let mut url = reqwest::Url::parse(&raw)
        .with_context(|| format!("Invalid realtime URL: {}", raw))?;
    if let Some(token) = ctx.auth_token() {
        url.query_pairs_mut().append_pair(&spec.token_param, &token);
    }
    Ok(url)
}

/// Open one channel, record the connection row, then one round-trip row.
///
/// A failed open records a single ERROR row. A reply within the wait is
/// PASS, an elapsed wait is FAIL. The channel is closed on every path once
/// it has been opened.
pub async fn realtime_probe(
    ctx: &RunContext,
    connector: &dyn ChannelConnector,
    spec: &RealtimeSpec,
) -> Result<()> {
    let url = channel_url(ctx, spec)?;
    // Rows never carry the token
    let target = join_url(ctx.config().realtime_base_url(), &spec.path);
    let cancel = ctx.cancel_token().clone();
    let started = Instant::now();

    let opened = tokio::select! {
        biased;
        opened = connector.open(url.as_str()) => Some(opened),
        _ = cancel.cancelled() => None,
    };

    let mut channel = match opened {
        None => {
            ctx.recorder().record(
                TestResult::new(CONNECTION_TEST, Category::Realtime, started.elapsed(), Outcome::interrupted())
                    .with_target(&target),
            );
            return Ok(());
        }
        Some(Err(e)) => {
            ctx.recorder().record(
                TestResult::new(
                    CONNECTION_TEST,
                    Category::Realtime,
                    started.elapsed(),
                    Outcome::error(
                        FailureKind::TransportFailure,
                        format!("WebSocket test failed: {:#}", e),
                        format!("{:#}", e),
                    ),
                )
                .with_target(&target),
            );
            return Ok(());
        }
        Some(Ok(channel)) => channel,
    };

    ctx.recorder().record(
        TestResult::new(
            CONNECTION_TEST,
            Category::Realtime,
            started.elapsed(),
            Outcome::pass("WebSocket connection established"),
        )
        .with_target(&target),
    );

    let message = match &spec.message {
        Value::String(s) => s.clone(),
        other => ctx.substitute_value(other).to_string(),
    };
    let wait = Duration::from_millis(spec.reply_wait_ms);

    let outcome = tokio::select! {
        biased;
        outcome = exchange(channel.as_mut(), &message, wait) => outcome,
        _ = cancel.cancelled() => Outcome::interrupted(),
    };

    if let Err(e) = channel.close().await {
        log::debug!("Closing realtime channel failed: {:#}", e);
    }

    ctx.recorder().record(
        TestResult::new(EXCHANGE_TEST, Category::Realtime, started.elapsed(), outcome)
            .with_target(&target),
    );
    Ok(())
}

async fn exchange(channel: &mut dyn RealtimeChannel, message: &str, wait: Duration) -> Outcome {
    if let Err(e) = channel.send(message).await {
        return Outcome::error(
            FailureKind::TransportFailure,
            "Failed to send probe message",
            format!("{:#}", e),
        );
    }

    match channel.receive(wait).await {
        Ok(Some(reply)) => {
            let kind = serde_json::from_str::<Value>(&reply)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string());
            Outcome::pass(format!("Message exchange successful: {}", kind))
        }
        Ok(None) => Outcome::fail(
            FailureKind::ProtocolTimeout,
            format!("No response received within {}ms", wait.as_millis()),
        ),
        Err(e) => Outcome::error(
            FailureKind::TransportFailure,
            "Channel failed while waiting for a reply",
            format!("{:#}", e),
        ),
    }
}

/// Fire `calls` identical requests through the scheduler and collect the statuses
async fn burst(runner: &CaseRunner, scheduler: &BatchScheduler, case: &TestCase, calls: usize) -> Vec<u16> {
    let tasks: Vec<_> = (0..calls)
        .map(|_| {
            let executor = runner.executor().clone();
            let case = case.clone();
            async move {
                match executor.execute(&case).await {
                    Ok(res) => res.status,
                    Err(_) => crate::driver::traits::SENTINEL_STATUS,
                }
            }
        })
        .collect();
    scheduler.fan_out(tasks).await
}

/// Load probe: at least `min_success_ratio` of the calls must return the expected status
pub async fn load_probe(runner: &CaseRunner, scheduler: &BatchScheduler, spec: &LoadSpec) -> TestResult {
    let name = "Concurrent Load Test";
    let started = Instant::now();
    let case = TestCase::get(name, &spec.path);
    let statuses = burst(runner, scheduler, &case, spec.calls).await;
    let elapsed = started.elapsed();

    let successful = statuses.iter().filter(|s| **s == spec.status).count();
    let reached = statuses.iter().filter(|s| **s != 0).count();
    let required = (spec.calls as f64 * spec.min_success_ratio).ceil() as usize;

    let outcome = if reached == 0 {
        Outcome::error(
            FailureKind::TransportFailure,
            format!("Load test failed: none of {} requests reached the service", spec.calls),
            "service unreachable",
        )
    } else if successful >= required {
        Outcome::pass(format!(
            "{}/{} requests successful in {:.3}s",
            successful,
            spec.calls,
            elapsed.as_secs_f64()
        ))
    } else {
        Outcome::mismatch(
            format!("Only {}/{} requests successful", successful, spec.calls),
            json!({ "minSuccessful": required }),
            json!({ "successful": successful }),
        )
    };

    TestResult::new(name, Category::Performance, elapsed, outcome).with_target(&spec.path)
}

/// Rate-limit probe: PASS once at least `min_throttled` calls of the burst were throttled
pub async fn rate_limit_probe(
    runner: &CaseRunner,
    scheduler: &BatchScheduler,
    spec: &RateLimitSpec,
    burst_override: Option<usize>,
) -> TestResult {
    let name = "Rate Limiting Test";
    let calls = burst_override.unwrap_or(spec.burst);
    let started = Instant::now();
    let case = TestCase::get(name, &spec.path);
    let statuses = burst(runner, scheduler, &case, calls).await;
    let elapsed = started.elapsed();

    let throttled = statuses
        .iter()
        .filter(|s| **s == spec.throttled_status)
        .count();
    let reached = statuses.iter().filter(|s| **s != 0).count();

    let outcome = if throttled >= spec.min_throttled {
        Outcome::pass(format!(
            "Rate limiting working - {} requests blocked",
            throttled
        ))
    } else if reached == 0 {
        Outcome::error(
            FailureKind::TransportFailure,
            format!("Rate limiting test failed: none of {} requests reached the service", calls),
            "service unreachable",
        )
    } else {
        Outcome::mismatch(
            format!(
                "No rate limiting detected across {} requests - potential security issue",
                calls
            ),
            json!({ "minThrottled": spec.min_throttled }),
            json!({ "throttled": throttled }),
        )
    };

    TestResult::new(name, Category::Security, elapsed, outcome).with_target(&spec.path)
}

/// Sequential latency samples against one endpoint
pub async fn timed_probe(runner: &CaseRunner, spec: &TimedEndpoint) -> TestResult {
    let name = format!("Performance: {}", spec.path);
    let case = TestCase::get(&name, &spec.path);
    let mut times = Vec::with_capacity(spec.samples);
    let mut last_status = None;

    for _ in 0..spec.samples {
        let started = Instant::now();
        let status = match runner.executor().execute(&case).await {
            Ok(res) => res.status,
            Err(_) => 0,
        };
        let elapsed = started.elapsed();
        if status != 0 {
            last_status = Some(status);
        }
        if status == 200 {
            times.push(elapsed);
        }
    }

    if times.is_empty() {
        let outcome = match last_status {
            None => Outcome::error(
                FailureKind::TransportFailure,
                format!("No sample of {} reached the service", spec.path),
                "service unreachable",
            ),
            Some(status) => Outcome::mismatch(
                format!("No successful sample, last status {}", status),
                200,
                status,
            ),
        };
        return TestResult::new(&name, Category::Performance, Duration::ZERO, outcome)
            .with_target(&spec.path);
    }

    let total: Duration = times.iter().sum();
    let avg = total / times.len() as u32;
    let peak = times.iter().copied().max().unwrap_or_default();
    let max_avg = Duration::from_millis(spec.max_avg_ms);
    let max_peak = Duration::from_millis(spec.max_peak_ms);

    let figures = format!(
        "Avg: {:.3}s, Max: {:.3}s",
        avg.as_secs_f64(),
        peak.as_secs_f64()
    );
    let outcome = if avg < max_avg && peak < max_peak {
        Outcome::pass(figures)
    } else {
        Outcome::mismatch(
            format!("Slow response - {}", figures),
            json!({ "maxAvgMs": spec.max_avg_ms, "maxPeakMs": spec.max_peak_ms }),
            json!({ "avgMs": avg.as_millis() as u64, "peakMs": peak.as_millis() as u64 }),
        )
    };

    TestResult::new(&name, Category::Performance, avg, outcome).with_target(&spec.path)
}

/// Render one frontend route and judge size, status and framework markers
pub async fn page_check(
    renderer: &dyn PageRenderer,
    frontend_base: &str,
    route: &str,
    spec: &PageSpec,
) -> TestResult {
    let name = format!("Frontend Route: {}", route);
    let url = join_url(frontend_base, route);
    let started = Instant::now();

    let outcome = match renderer.render(&url).await {
        Err(e) => Outcome::error(
            FailureKind::TransportFailure,
            format!("Request failed: {:#}", e),
            format!("{:#}", e),
        ),
        Ok(page) if page.status != 200 => Outcome::mismatch(
            format!("HTTP {} - {}", page.status, route),
            200,
            page.status,
        ),
        Ok(page) => {
            let lower = page.content.to_lowercase();
            let has_marker = spec.markers.is_empty()
                || spec
                    .markers
                    .iter()
                    .any(|m| page.content.contains(m.as_str()) || lower.contains(&m.to_lowercase()));
            let has_content = page.content.len() >= spec.min_bytes;

            if has_marker && has_content {
                Outcome::pass(format!(
                    "Page loaded successfully ({} bytes)",
                    page.content.len()
                ))
            } else {
                Outcome::mismatch(
                    "Page content seems incomplete or missing framework markers",
                    json!({ "minBytes": spec.min_bytes, "markers": spec.markers }),
                    json!({ "bytes": page.content.len(), "markerFound": has_marker }),
                )
            }
        }
    };

    TestResult::new(&name, Category::Frontend, started.elapsed(), outcome).with_target(url)
}

/// One scheduler invocation per route
pub fn page_invocations(
    renderer: &Arc<dyn PageRenderer>,
    frontend_base: &str,
    spec: &PageSpec,
) -> Vec<Invocation> {
    spec.routes
        .iter()
        .map(|route| {
            let renderer = renderer.clone();
            let base = frontend_base.to_string();
            let route = route.clone();
            let spec = spec.clone();
            Invocation::new(&format!("Frontend Route: {}", route), Category::Frontend, async move {
                page_check(renderer.as_ref(), &base, &route, &spec).await
            })
        })
        .collect()
}

/// One independent row per malicious payload, each placed in the query parameter
pub fn injection_invocations(runner: &CaseRunner, spec: &InjectionSpec) -> Vec<Invocation> {
    let sql = spec
        .sql
        .iter()
        .map(|p| ("SQL Injection Test", "SQL injection payload handled safely", p));
    let xss = spec
        .xss
        .iter()
        .map(|p| ("XSS Test", "XSS payload handled safely", p));

    sql.chain(xss)
        .map(|(label, safe, payload)| {
            let short: String = payload.chars().take(20).collect();
            let name = format!("{}: {}...", label, short);
            let case = TestCase::get(&name, &spec.path)
                .with_query(&spec.param, payload)
                .expect(spec.status)
                .with_category(Category::Security);
            let runner = runner.clone();
            let safe = safe.to_string();

            Invocation::new(&name, Category::Security, async move {
                let result = runner.execute(&case, Category::Security).await.result;
                if result.status() == TestStatus::Pass {
                    result.with_details(safe)
                } else {
                    result
                }
            })
        })
        .collect()
}

/// Protected path without a token and with an invalid one, both expecting 401.
///
/// Each probe swaps the session token under the exclusive auth gate, so it
/// must run outside any batch.
pub async fn negative_auth_probes(runner: &CaseRunner, protected_path: &str, invalid_token: &str) {
    let ctx = runner.context();

    let anonymous = TestCase::get("Unauthenticated Access Test", protected_path).expect(401);
    ctx.with_token(None, runner.run(&anonymous, Category::Security))
        .await;

    let invalid = TestCase::get("Invalid Token Test", protected_path).expect(401);
    ctx.with_token(
        Some(invalid_token.to_string()),
        runner.run(&invalid, Category::Security),
    )
    .await;
}

/// Binary reachability row for a backing store
pub async fn store_check(probe: &dyn ReachabilityProbe) -> TestResult {
    let name = format!("{} Reachability", probe.name());
    let started = Instant::now();

    let outcome = match probe.ping().await {
        Ok(()) => Outcome::pass(format!("{} reachable at {}", probe.name(), probe.target())),
        Err(e) => Outcome::error(
            FailureKind::TransportFailure,
            format!("{} unreachable at {}", probe.name(), probe.target()),
            format!("{:#}", e),
        ),
    };

    TestResult::new(&name, Category::Infrastructure, started.elapsed(), outcome)
        .with_target(probe.target())
}

pub fn store_invocations(probes: &[Arc<dyn ReachabilityProbe>]) -> Vec<Invocation> {
    probes
        .iter()
        .map(|probe| {
            let probe = probe.clone();
            Invocation::new(
                &format!("{} Reachability", probe.name()),
                Category::Infrastructure,
                async move { store_check(probe.as_ref()).await },
            )
        })
        .collect()
}

/// Run a sequential probe under cancellation and record its row
pub async fn record_interruptible<F>(ctx: &RunContext, name: &str, category: Category, fut: F)
where
    F: std::future::Future<Output = TestResult>,
{
    let result = interruptible(ctx.cancel_token(), name, category, fut).await;
    ctx.recorder().record(result);
}
