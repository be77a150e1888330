pub mod case;
pub mod context;
pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod phases;
pub mod probes;
pub mod recorder;
pub mod scheduler;
pub mod state;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use events::*;
pub use state::*;

use crate::driver::traits::{ChannelConnector, PageRenderer, ReachabilityProbe, Transport};
use crate::driver::web::{BrowserConfig, BrowserPageRenderer};
use crate::driver::{HttpPageRenderer, HttpTransport, TcpStoreProbe, WsConnector};
use crate::error::HarnessError;
use crate::parser::types::SuiteDefinition;
use crate::report::{FileReportSink, ReportGenerator, ReportSink, RunReport};
use crate::utils::TestConfig;
use context::RunContext;
use orchestrator::{Phase, PhaseOrchestrator};
use phases::PhaseEnv;
use recorder::ResultRecorder;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// External collaborators a run talks to
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub channels: Arc<dyn ChannelConnector>,
    pub pages: Arc<dyn PageRenderer>,
    pub stores: Vec<Arc<dyn ReachabilityProbe>>,
    pub sink: Arc<dyn ReportSink>,
}

impl Collaborators {
    /// Real drivers for `config`. A browser that fails to launch falls back
    /// to plain HTTP page fetches.
    pub async fn from_config(config: &TestConfig) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(config.timeout(), config.max_concurrency())?);

        let pages: Arc<dyn PageRenderer> = if config.browser() {
            match BrowserPageRenderer::launch(BrowserConfig::default()).await {
                Ok(renderer) => Arc::new(renderer),
                Err(e) => {
                    log::warn!("Browser launch failed, falling back to HTTP rendering: {:#}", e);
                    Arc::new(HttpPageRenderer::new(transport.clone()))
                }
            }
        } else {
            Arc::new(HttpPageRenderer::new(transport.clone()))
        };

        let mut stores: Vec<Arc<dyn ReachabilityProbe>> = Vec::new();
        if let Some(addr) = config.document_store() {
            stores.push(Arc::new(TcpStoreProbe::document_store(addr, config.timeout())));
        }
        if let Some(addr) = config.cache_store() {
            stores.push(Arc::new(TcpStoreProbe::cache_store(addr, config.timeout())));
        }

        Ok(Self {
            channels: Arc::new(WsConnector::new(config.timeout())),
            sink: Arc::new(FileReportSink::new(config.output_dir())),
            transport,
            pages,
            stores,
        })
    }
}

/// Run the built-in suite against the platform described by `config`
pub async fn run_suite(config: TestConfig) -> Result<RunReport, HarnessError> {
    config.validate()?;
    let suite = crate::parser::default_suite()?;
    let collaborators = Collaborators::from_config(&config).await?;
    run_suite_with(
        Arc::new(config),
        suite,
        collaborators,
        CancellationToken::new(),
        None,
    )
    .await
}

/// Run `suite` to completion or cancellation, then build and persist the report.
///
/// The report is produced exactly once, whatever the phases did.
pub async fn run_suite_with(
    config: Arc<TestConfig>,
    suite: SuiteDefinition,
    collaborators: Collaborators,
    cancel: CancellationToken,
    emitter: Option<EventEmitter>,
) -> Result<RunReport, HarnessError> {
    let run_id = config
        .run_id()
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let recorder = Arc::new(match &emitter {
        Some(emitter) => ResultRecorder::with_emitter(emitter.clone()),
        None => ResultRecorder::new(),
    });
    let ctx = Arc::new(RunContext::new(config, recorder.clone(), cancel));

    if let Some(emitter) = &emitter {
        emitter.emit(TestEvent::RunStarted {
            run_id: run_id.clone(),
            phase_count: Phase::ORDER.len(),
        });
    }
    log::info!(
        "Run {} started ({})",
        run_id,
        suite.name.as_deref().unwrap_or("default suite")
    );

    let start = Instant::now();
    let phases = {
        let env = PhaseEnv::new(ctx.clone(), &suite, &collaborators);
        let env = &env;
        PhaseOrchestrator::new(ctx.clone(), emitter.clone())
            .run(&Phase::ORDER, move |phase| env.run(phase))
            .await
    };

    if let Err(e) = collaborators.pages.close().await {
        log::warn!("Failed to close page renderer: {:#}", e);
    }

    let interrupted = ctx.is_cancelled();
    let report = ReportGenerator::generate(
        &run_id,
        recorder.snapshot(),
        phases,
        start.elapsed(),
        interrupted,
    );

    if let Some(emitter) = &emitter {
        emitter.emit(TestEvent::RunFinished {
            counts: report.totals,
            pass_rate: report.pass_rate,
            grade: report.grade,
            duration_ms: report.duration_ms,
            interrupted,
        });
    }

    collaborators.sink.write(&run_id, &report)?;
    Ok(report)
}
