//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::{AppConfig, CatalogConfig, JobConfig, SourceConfig, SourceKind};
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG, HEALTH_REPORT_INTERVAL_SECS};
use crate::core::shutdown::ShutdownService;
use crate::core::storage::AppStorage;
use crate::data::{SinkRepository, SinkService};
use crate::domain::jobs::{
    BadQueriesJob, ConnectionsJob, Cron, CronHealthCheck, CronJob, LocksJob, MetricsRegistry,
    StatsJob, SystemClock, start_health_report_task,
};
use crate::domain::planner::{CatalogMode, Classifier, SchemaCatalog};
use crate::source::{ConnectionSource, LockSource, QuerySource, RedshiftSource, SlowLogSource};

/// Source handles for one run of the application
struct Sources {
    queries: Arc<dyn QuerySource>,
    connections: Option<Arc<dyn ConnectionSource>>,
    locks: Option<Arc<dyn LockSource>>,
    redshift: Option<Arc<RedshiftSource>>,
}

impl Sources {
    async fn close(&self) {
        if let Some(redshift) = &self.redshift {
            redshift.close().await;
        }
    }
}

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub storage: AppStorage,
    pub sink: Arc<SinkService>,
    pub metrics: Arc<MetricsRegistry>,
    pub classifier: Classifier,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        // Classification needs neither the sink nor a source
        if let Some(Commands::Classify { sql }) = &command {
            let config = AppConfig::load(&cli_config)?;
            let classifier = Self::build_classifier(&config)?;
            return Self::classify(&classifier, sql);
        }

        let app = Self::init(&cli_config).await?;
        match command {
            Some(Commands::SampleConnections) => app.sample_connections().await,
            Some(Commands::BadQueries { minutes }) => app.print_bad_queries(minutes).await,
            Some(Commands::Start) | Some(Commands::Classify { .. }) | None => {
                Self::start_jobs(app).await
            }
        }
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let storage = AppStorage::init(&config.sink).await?;

        let sink = Arc::new(
            SinkService::init(storage.sink_path())
                .await
                .context("Failed to initialize sink database")?,
        );
        tracing::debug!(path = %storage.sink_path().display(), "Sink initialized");

        let classifier = Self::build_classifier(&config)?;

        Ok(Self {
            shutdown: ShutdownService::new(sink.clone()),
            config,
            storage,
            sink,
            metrics: Arc::new(MetricsRegistry::new()),
            classifier,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    fn build_catalog(config: &CatalogConfig) -> Result<SchemaCatalog> {
        match &config.path {
            Some(path) => SchemaCatalog::load(path, config.mode),
            None => {
                if config.mode == CatalogMode::Strict {
                    tracing::warn!(
                        "Strict catalog without a catalog file: every table reference will fail validation"
                    );
                }
                Ok(SchemaCatalog::new(Vec::new(), config.mode))
            }
        }
    }

    fn build_classifier(config: &AppConfig) -> Result<Classifier> {
        let catalog = Self::build_catalog(&config.catalog)?;
        tracing::debug!(
            tables = catalog.len(),
            mode = ?catalog.mode(),
            "Schema catalog loaded"
        );
        Ok(Classifier::new(
            Arc::new(catalog),
            config.jobs.bad_queries.join_threshold,
        ))
    }

    fn build_sources(config: &SourceConfig) -> Result<Sources> {
        match config.kind {
            SourceKind::Redshift => {
                let url = config
                    .url
                    .as_deref()
                    .context("source.url is required for the redshift source")?;
                let redshift = Arc::new(RedshiftSource::connect(url)?);
                Ok(Sources {
                    queries: redshift.clone(),
                    connections: Some(redshift.clone()),
                    locks: Some(redshift.clone()),
                    redshift: Some(redshift),
                })
            }
            SourceKind::SlowLog => {
                let path = config
                    .path
                    .clone()
                    .context("source.path is required for the slow_log source")?;
                Ok(Sources {
                    queries: Arc::new(SlowLogSource::new(path)),
                    connections: None,
                    locks: None,
                    redshift: None,
                })
            }
        }
    }

    fn sink_repository(&self) -> Arc<dyn SinkRepository> {
        Arc::new(self.sink.clone())
    }

    fn classify(classifier: &Classifier, sql: &str) -> Result<()> {
        let plan = classifier.plan(sql)?;
        let labels = classifier.classify_plan(&plan);

        if labels.is_empty() {
            println!("labels: none");
        } else {
            let names: Vec<&str> = labels.iter().map(|l| l.as_str()).collect();
            println!("labels: {}", names.join(", "));
        }
        println!("{}", plan.explain());
        Ok(())
    }

    async fn sample_connections(self) -> Result<()> {
        let sources = Self::build_sources(&self.config.source)?;
        let result = match sources.connections.clone() {
            Some(source) => {
                let job = ConnectionsJob::new(source, self.sink_repository(), &self.metrics);
                job.sample_now(Utc::now())
                    .await
                    .context("Failed to sample connections")
            }
            None => Err(anyhow::anyhow!(
                "The {} source does not report connections",
                self.config.source.kind
            )),
        };

        sources.close().await;
        self.sink.close().await;

        println!("{}", serde_json::to_string_pretty(&result?)?);
        Ok(())
    }

    async fn print_bad_queries(self, minutes: i64) -> Result<()> {
        let end = Utc::now();
        let start = end - chrono::Duration::minutes(minutes);
        let result = self.sink_repository().list_bad_queries(&start, &end).await;
        self.sink.close().await;

        let rows = result.context("Failed to list bad queries")?;
        println!("{}", serde_json::to_string_pretty(&rows)?);
        Ok(())
    }

    /// Spawn `cron` on its schedule and register it for shutdown
    async fn schedule<J: CronJob>(
        &self,
        cron: Cron<J>,
        job_config: &JobConfig,
        checks: &mut Vec<CronHealthCheck>,
    ) {
        let cron = Arc::new(cron);
        checks.push(cron.health_check(self.config.health.max_failure_ratio));
        let handle = cron.start(
            job_config.delay,
            job_config.frequency,
            self.shutdown.subscribe(),
        );
        self.shutdown.register(handle).await;
    }

    async fn start_jobs(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        let sources = Self::build_sources(&app.config.source)?;
        let shutdown = match &sources.redshift {
            Some(redshift) => app.shutdown.clone().with_redshift(redshift.clone()),
            None => app.shutdown.clone(),
        };

        if !app.config.any_job_enabled() {
            tracing::warn!("No jobs enabled; waiting for shutdown");
        }

        let jobs = &app.config.jobs;
        let clock = Arc::new(SystemClock);
        let mut checks = Vec::new();

        if jobs.query_stats.enabled {
            let job = StatsJob::new(sources.queries.clone(), app.sink_repository(), &app.metrics);
            let cron = Cron::new(job, clock.clone(), jobs.window_policy, &app.metrics);
            app.schedule(cron, &jobs.query_stats, &mut checks).await;
        }

        if jobs.bad_queries.job.enabled {
            let job = BadQueriesJob::new(
                sources.queries.clone(),
                app.sink_repository(),
                app.classifier.clone(),
                jobs.bad_queries.labels.clone(),
                &app.metrics,
            );
            let cron = Cron::new(job, clock.clone(), jobs.window_policy, &app.metrics);
            app.schedule(cron, &jobs.bad_queries.job, &mut checks).await;
        }

        if jobs.connections.enabled {
            match sources.connections.clone() {
                Some(source) => {
                    let job = ConnectionsJob::new(source, app.sink_repository(), &app.metrics);
                    let cron = Cron::new(job, clock.clone(), jobs.window_policy, &app.metrics);
                    app.schedule(cron, &jobs.connections, &mut checks).await;
                }
                None => tracing::warn!(
                    source = %app.config.source.kind,
                    "Connections job skipped: source does not report connections"
                ),
            }
        }

        if jobs.locks.job.enabled {
            match sources.locks.clone() {
                Some(source) => {
                    let long_txn_after = chrono::Duration::from_std(jobs.locks.long_txn_after)
                        .context("jobs.locks.long_txn_seconds is out of range")?;
                    let job =
                        LocksJob::new(source, app.sink_repository(), long_txn_after, &app.metrics);
                    let cron = Cron::new(job, clock.clone(), jobs.window_policy, &app.metrics);
                    app.schedule(cron, &jobs.locks.job, &mut checks).await;
                }
                None => tracing::warn!(
                    source = %app.config.source.kind,
                    "Locks job skipped: source does not report locks"
                ),
            }
        }

        let jobs_started = checks.len();
        if !checks.is_empty() {
            let handle = start_health_report_task(
                checks,
                app.metrics.clone(),
                Duration::from_secs(HEALTH_REPORT_INTERVAL_SECS),
                app.shutdown.subscribe(),
            );
            app.shutdown.register(handle).await;
        }

        tracing::info!(
            jobs = jobs_started,
            source = %app.config.source.kind,
            policy = ?jobs.window_policy,
            data_dir = %app.storage.data_dir().display(),
            "Mart started"
        );

        app.shutdown.wait().await;
        shutdown.shutdown().await;

        tracing::info!(counters = ?app.metrics.snapshot(), "Mart stopped");
        Ok(())
    }
}
