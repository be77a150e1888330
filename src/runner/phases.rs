use super::case::CaseRunner;
use super::context::RunContext;
use super::orchestrator::Phase;
use super::probes;
use super::scheduler::{BatchScheduler, Invocation};
use super::state::Category;
use super::workflow::WorkflowRunner;
use super::Collaborators;
use crate::parser::types::{SuiteDefinition, TestCase};
use anyhow::Result;
use std::sync::Arc;

/// Everything a phase body needs, borrowed for the length of the run
pub struct PhaseEnv<'a> {
    ctx: Arc<RunContext>,
    suite: &'a SuiteDefinition,
    collaborators: &'a Collaborators,
    runner: CaseRunner,
    scheduler: BatchScheduler,
    workflows: WorkflowRunner,
}

impl<'a> PhaseEnv<'a> {
    pub fn new(
        ctx: Arc<RunContext>,
        suite: &'a SuiteDefinition,
        collaborators: &'a Collaborators,
    ) -> Self {
        let executor =
            super::executor::RequestExecutor::new(collaborators.transport.clone(), ctx.clone());
        let runner = CaseRunner::new(executor);
        Self {
            scheduler: BatchScheduler::new(ctx.clone()),
            workflows: WorkflowRunner::new(runner.clone()),
            runner,
            ctx,
            suite,
            collaborators,
        }
    }

    pub async fn run(&self, phase: Phase) -> Result<()> {
        match phase {
            Phase::Authentication => self.authentication().await,
            Phase::EndpointSweep => self.endpoint_sweep().await,
            Phase::Workflows => self.dependency_workflows().await,
            Phase::Realtime => self.realtime().await,
            Phase::Frontend => self.frontend().await,
            Phase::Performance => self.performance().await,
            Phase::Security => self.security().await,
            Phase::DataIntegrity => self.data_integrity().await,
        }
    }

    fn case_invocations(&self, cases: &[TestCase], default: Category) -> Vec<Invocation> {
        cases
            .iter()
            .map(|case| {
                let runner = self.runner.clone();
                let case = case.clone();
                let name = case.name.clone();
                let category = case.category_or(default.clone());
                Invocation::new(&name, category.clone(), async move {
                    runner.execute(&case, category).await.result
                })
            })
            .collect()
    }

    async fn authentication(&self) -> Result<()> {
        let Some(auth) = &self.suite.auth else {
            log::warn!("Suite has no authentication workflow; running anonymously");
            return Ok(());
        };

        self.workflows.run(auth).await;

        if self.ctx.auth_token().is_none() {
            log::warn!("No auth token obtained; authenticated workflows will be skipped");
        }
        if self.ctx.admin_token().is_none() {
            log::debug!("No admin token obtained");
        }
        Ok(())
    }

    async fn endpoint_sweep(&self) -> Result<()> {
        let invocations = self.case_invocations(&self.suite.endpoints, Category::Api);
        let summary = self.scheduler.run(invocations).await;
        log::info!(
            "Endpoint sweep: {} rows in {} batches",
            summary.recorded,
            summary.batch_sizes.len()
        );
        Ok(())
    }

    async fn dependency_workflows(&self) -> Result<()> {
        for workflow in &self.suite.workflows {
            if self.ctx.is_cancelled() {
                break;
            }
            let summary = self.workflows.run(workflow).await;
            log::info!(
                "Workflow '{}': {}/{} passed, {} skipped",
                workflow.name,
                summary.passed,
                summary.executed,
                summary.skipped
            );
        }
        Ok(())
    }

    async fn realtime(&self) -> Result<()> {
        let Some(spec) = &self.suite.realtime else {
            return Ok(());
        };
        probes::realtime_probe(&self.ctx, self.collaborators.channels.as_ref(), spec).await
    }

    async fn frontend(&self) -> Result<()> {
        let Some(spec) = &self.suite.pages else {
            return Ok(());
        };
        let invocations = probes::page_invocations(
            &self.collaborators.pages,
            self.ctx.config().frontend_base_url(),
            spec,
        );
        self.scheduler.run(invocations).await;
        Ok(())
    }

    async fn performance(&self) -> Result<()> {
        let Some(spec) = &self.suite.performance else {
            return Ok(());
        };

        for timed in &spec.timed {
            if self.ctx.is_cancelled() {
                return Ok(());
            }
            let name = format!("Performance: {}", timed.path);
            probes::record_interruptible(
                &self.ctx,
                &name,
                Category::Performance,
                probes::timed_probe(&self.runner, timed),
            )
            .await;
        }

        if let Some(load) = &spec.load {
            if self.ctx.is_cancelled() {
                return Ok(());
            }
            probes::record_interruptible(
                &self.ctx,
                "Concurrent Load Test",
                Category::Performance,
                probes::load_probe(&self.runner, &self.scheduler, load),
            )
            .await;
        }
        Ok(())
    }

    async fn security(&self) -> Result<()> {
        let Some(spec) = &self.suite.security else {
            return Ok(());
        };

        if let Some(injection) = &spec.injection {
            let invocations = probes::injection_invocations(&self.runner, injection);
            self.scheduler.run(invocations).await;
        }

        // Token swaps take the exclusive auth gate; never inside a batch
        if let Some(path) = &spec.protected_path {
            if !self.ctx.is_cancelled() {
                probes::negative_auth_probes(&self.runner, path, &spec.invalid_token).await;
            }
        }

        if let Some(rate_limit) = &spec.rate_limit {
            if self.ctx.is_cancelled() {
                return Ok(());
            }
            let burst = self.ctx.config().rate_limit_burst();
            probes::record_interruptible(
                &self.ctx,
                "Rate Limiting Test",
                Category::Security,
                probes::rate_limit_probe(&self.runner, &self.scheduler, rate_limit, burst),
            )
            .await;
        }
        Ok(())
    }

    async fn data_integrity(&self) -> Result<()> {
        if let Some(spec) = &self.suite.integrity {
            let invocations = self.case_invocations(&spec.invalid_inputs, Category::DataIntegrity);
            self.scheduler.run(invocations).await;

            if let Some(consistency) = &spec.consistency {
                if !self.ctx.is_cancelled() {
                    self.workflows.run(consistency).await;
                }
            }
        }

        if !self.collaborators.stores.is_empty() {
            let invocations = probes::store_invocations(&self.collaborators.stores);
            self.scheduler.run(invocations).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::{
        LoadSpec, PerformanceSpec, RateLimitSpec, RealtimeSpec, SecuritySpec, TimedEndpoint, WorkflowSpec,
        WorkflowStep,
    };
    use crate::runner::state::TestStatus;
    use crate::runner::testing::{
        test_context, ChannelBehavior, MemorySink, MockTransport, ScriptedConnector,
        StaticPageRenderer, StaticProbe,
    };
    use serde_json::json;
    use std::collections::BTreeMap;

    fn collaborators(transport: MockTransport) -> Collaborators {
        Collaborators {
            transport: Arc::new(transport),
            channels: Arc::new(ScriptedConnector::new(ChannelBehavior::Refuse)),
            pages: Arc::new(StaticPageRenderer::new()),
            stores: vec![
                Arc::new(StaticProbe::new("Document Store", true)),
                Arc::new(StaticProbe::new("Cache Store", false)),
            ],
            sink: Arc::new(MemorySink::new()),
        }
    }

    #[tokio::test]
    async fn test_authentication_sets_token_for_later_phases() {
        let transport = MockTransport::new()
            .route("POST", "/login", 200, json!({"token": "t-1"}))
            .route("GET", "/api/v1/me", 200, json!({}));
        let collab = collaborators(transport);
        let suite = SuiteDefinition {
            auth: Some(WorkflowSpec {
                name: "Auth".to_string(),
                category: Some(Category::Authentication),
                requires_auth: false,
                vars: BTreeMap::new(),
                steps: vec![WorkflowStep::new(TestCase::new("Login", "POST", "/login"))
                    .capture("auth_token", &["/token"])],
            }),
            endpoints: vec![TestCase::get("Me", "/api/v1/me")],
            ..Default::default()
        };
        let ctx = test_context();
        let env = PhaseEnv::new(ctx.clone(), &suite, &collab);

        env.run(Phase::Authentication).await.unwrap();
        env.run(Phase::EndpointSweep).await.unwrap();

        assert_eq!(ctx.auth_token().as_deref(), Some("t-1"));
        let rows = ctx.recorder().snapshot().results;
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status() == TestStatus::Pass));
    }

    #[tokio::test]
    async fn test_security_phase_records_every_probe() {
        let transport = MockTransport::new()
            .route("GET", "/api/v1/analytics/dashboard", 401, json!({}))
            .route("GET", "/api/health", 429, json!({}));
        let collab = collaborators(transport);
        let suite = SuiteDefinition {
            security: Some(SecuritySpec {
                injection: None,
                protected_path: Some("/api/v1/analytics/dashboard".to_string()),
                invalid_token: "bad".to_string(),
                rate_limit: Some(RateLimitSpec {
                    path: "/api/health".to_string(),
                    burst: 200,
                    throttled_status: 429,
                    min_throttled: 1,
                }),
            }),
            ..Default::default()
        };
        let ctx = test_context();
        ctx.set_auth_token(Some("real".to_string()));
        let env = PhaseEnv::new(ctx.clone(), &suite, &collab);

        env.run(Phase::Security).await.unwrap();

        let rows = ctx.recorder().snapshot().results;
        let names: Vec<&str> = rows.iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            vec!["Unauthenticated Access Test", "Invalid Token Test", "Rate Limiting Test"]
        );
        assert!(rows.iter().all(|r| r.status() == TestStatus::Pass));
        // Swapped token was restored
        assert_eq!(ctx.auth_token().as_deref(), Some("real"));
    }

    #[tokio::test]
    async fn test_performance_phase_rows() {
        let transport = MockTransport::new().route("GET", "/api/health", 200, json!({}));
        let collab = collaborators(transport);
        let suite = SuiteDefinition {
            performance: Some(PerformanceSpec {
                timed: vec![TimedEndpoint {
                    path: "/api/health".to_string(),
                    samples: 3,
                    max_avg_ms: 1000,
                    max_peak_ms: 2000,
                }],
                load: Some(LoadSpec {
                    path: "/api/health".to_string(),
                    calls: 20,
                    status: 200,
                    min_success_ratio: 0.9,
                }),
            }),
            ..Default::default()
        };
        let ctx = test_context();
        let env = PhaseEnv::new(ctx.clone(), &suite, &collab);

        env.run(Phase::Performance).await.unwrap();

        let rows = ctx.recorder().snapshot().results;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name(), "Performance: /api/health");
        assert_eq!(rows[1].name(), "Concurrent Load Test");
        assert!(rows.iter().all(|r| r.status() == TestStatus::Pass));
    }

    #[tokio::test]
    async fn test_integrity_phase_includes_store_reachability() {
        let collab = collaborators(MockTransport::new());
        let suite = SuiteDefinition::default();
        let ctx = test_context();
        let env = PhaseEnv::new(ctx.clone(), &suite, &collab);

        env.run(Phase::DataIntegrity).await.unwrap();

        let snapshot = ctx.recorder().snapshot();
        assert_eq!(snapshot.results.len(), 2);
        assert_eq!(snapshot.by_status.passed, 1);
        assert_eq!(snapshot.by_status.errored, 1);
        assert!(snapshot
            .results
            .iter()
            .all(|r| r.category() == &Category::Infrastructure));
    }

    #[tokio::test]
    async fn test_realtime_refusal_is_a_single_error_row() {
        let collab = collaborators(MockTransport::new());
        let suite = SuiteDefinition {
            realtime: Some(RealtimeSpec {
                path: "/ws".to_string(),
                token_param: "token".to_string(),
                message: json!({"type": "ping"}),
                reply_wait_ms: 100,
            }),
            ..Default::default()
        };
        let ctx = test_context();
        let env = PhaseEnv::new(ctx.clone(), &suite, &collab);

        env.run(Phase::Realtime).await.unwrap();

        let rows = ctx.recorder().snapshot().results;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status(), TestStatus::Error);
    }
}
