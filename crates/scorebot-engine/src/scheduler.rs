//! The round loop.
//!
//! Each round: allocate an id, snapshot inventory and credentials, build
//! jobs, fan them out onto a bounded pool, then wait for either every
//! outcome or the round deadline. Rounds never overlap.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use probe_runner::Executor;
use scorebot_core::{
    Config, Credentials, Inventory, ProbeJob, ProbeOutcome, ProbeStatus, Registry, ResultRecord,
    ResultSink, RoundState, RoundSummary,
};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::collector::{RecordDisposition, ResultCollector};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub max_concurrent: usize,
    pub default_timeout: Duration,
    pub deadline_slack: Duration,
    pub max_output_bytes: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            interval: cfg.round_interval(),
            max_concurrent: cfg.max_concurrent_probes,
            default_timeout: cfg.default_timeout(),
            deadline_slack: cfg.deadline_slack(),
            max_output_bytes: cfg.max_output_bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// RoundReport
// ---------------------------------------------------------------------------

/// Everything a closed round produced.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub summary: RoundSummary,
    pub records: Vec<ResultRecord>,
    /// Jobs that had no outcome when the deadline hit.
    pub placeholders: usize,
}

// ---------------------------------------------------------------------------
// RoundScheduler
// ---------------------------------------------------------------------------

pub struct RoundScheduler {
    config: SchedulerConfig,
    registry: Arc<Registry>,
    inventory: Arc<dyn Inventory>,
    credentials: Arc<dyn Credentials>,
    sink: Arc<dyn ResultSink>,
    executor: Arc<Executor>,
    permits: Arc<Semaphore>,
}

impl RoundScheduler {
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<Registry>,
        inventory: Arc<dyn Inventory>,
        credentials: Arc<dyn Credentials>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let executor = Arc::new(Executor::new(config.max_output_bytes));
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config,
            registry,
            inventory,
            credentials,
            sink,
            executor,
            permits,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run rounds on the configured interval until `shutdown` becomes true.
    ///
    /// A round in flight when shutdown is requested runs to completion.
    /// Round failures are logged and the loop carries on with the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            max_concurrent = self.config.max_concurrent,
            "scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
            if let Err(e) = self.run_round().await {
                tracing::error!(error = %e, "round failed");
            }
        }

        tracing::info!("scheduler stopped");
        Ok(())
    }

    /// Run exactly one round and persist its results.
    pub async fn run_round(&self) -> Result<RoundReport> {
        let round_id = self.sink.next_round_id()?;
        let started = Instant::now();
        let mut summary = RoundSummary::open(round_id, Utc::now());
        self.sink.save_round(&summary)?;

        let entries = match self.inventory.snapshot() {
            Ok(entries) => entries,
            Err(source) => {
                self.fail_round(&mut summary, &source)?;
                return Err(EngineError::Inventory { round_id, source });
            }
        };
        let credentials = match self.credentials.snapshot() {
            Ok(snapshot) => snapshot,
            Err(source) => {
                self.fail_round(&mut summary, &source)?;
                return Err(EngineError::Credentials { round_id, source });
            }
        };

        // Build every job up front; broken definitions become records now
        // and are never dispatched.
        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        let mut misconfigured = Vec::new();
        for entry in &entries {
            let key = entry.key();
            if !seen.insert(key.clone()) {
                tracing::warn!(round_id, job = %key, "duplicate inventory entry skipped");
                continue;
            }
            match ProbeJob::build(
                &self.registry,
                entry,
                &credentials,
                round_id,
                self.config.default_timeout,
            ) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::warn!(
                        round_id,
                        team = %key.team,
                        service = %key.service,
                        check = %key.check,
                        error = %e,
                        "check misconfigured"
                    );
                    misconfigured.push(ResultRecord::new(
                        round_id,
                        key,
                        "",
                        ProbeOutcome::misconfigured(&e),
                    ));
                }
            }
        }

        let deadline = jobs
            .iter()
            .map(|j| j.timeout)
            .max()
            .unwrap_or_default()
            .saturating_add(self.config.deadline_slack);
        summary.deadline_ms = duration_ms(deadline);

        let collector = Arc::new(ResultCollector::new(
            round_id,
            jobs.iter().map(|j| (j.key.clone(), j.command_text())),
        ));

        tracing::info!(
            round_id,
            jobs = jobs.len(),
            misconfigured = misconfigured.len(),
            deadline_ms = summary.deadline_ms,
            "round started"
        );

        let mut tasks = JoinSet::new();
        for job in jobs {
            tasks.spawn(probe(
                job,
                Arc::clone(&self.permits),
                Arc::clone(&self.executor),
                Arc::clone(&collector),
            ));
        }

        let completed = tokio::select! {
            _ = collector.wait_complete() => true,
            _ = tokio::time::sleep(deadline) => false,
        };

        let placeholders = if completed {
            while tasks.join_next().await.is_some() {}
            collector.close_with_placeholders(elapsed_ms(started))?
        } else {
            let forced = collector.close_with_placeholders(elapsed_ms(started))?;
            tracing::warn!(
                round_id,
                outstanding = forced,
                "round deadline reached, aborting outstanding probes"
            );
            // Aborting drops each probe future, which kills its subprocess.
            tasks.shutdown().await;
            forced
        };

        let mut records = collector.seal()?;
        records.extend(misconfigured);
        records.sort_by(|a, b| a.key.cmp(&b.key));

        if let Err(e) = self.sink.append(&records) {
            self.fail_round(&mut summary, &e)?;
            return Err(EngineError::Persist(e));
        }

        summary.state = collector.state();
        summary.closed_at = Some(Utc::now());
        summary.tally(&records);
        self.sink.save_round(&summary)?;

        tracing::info!(
            round_id,
            jobs = summary.job_count,
            success = summary.count(ProbeStatus::Success),
            failure = summary.count(ProbeStatus::Failure),
            timeout = summary.count(ProbeStatus::Timeout),
            build_error = summary.count(ProbeStatus::BuildError),
            misconfigured = summary.count(ProbeStatus::Misconfigured),
            elapsed_ms = elapsed_ms(started),
            "round closed"
        );

        Ok(RoundReport {
            summary,
            records,
            placeholders,
        })
    }

    fn fail_round(
        &self,
        summary: &mut RoundSummary,
        cause: &scorebot_core::ScoreError,
    ) -> Result<()> {
        tracing::error!(round_id = summary.id, error = %cause, "round failed");
        summary.state = summary.state.transition(RoundState::Failed)?;
        summary.closed_at = Some(Utc::now());
        summary.error = Some(cause.to_string());
        self.sink.save_round(summary)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job task
// ---------------------------------------------------------------------------

/// One job on the pool: wait for a permit, run, record. Nothing escapes.
async fn probe(
    job: ProbeJob,
    permits: Arc<Semaphore>,
    executor: Arc<Executor>,
    collector: Arc<ResultCollector>,
) {
    let Ok(_permit) = permits.acquire_owned().await else {
        return;
    };
    let outcome = guarded(executor.run_job(&job)).await;

    match outcome.status {
        ProbeStatus::Success => tracing::debug!(
            round_id = job.round_id,
            job = %job.key,
            elapsed_ms = outcome.elapsed_ms,
            "probe succeeded"
        ),
        status => tracing::info!(
            round_id = job.round_id,
            job = %job.key,
            command = %job.invocation,
            status = %status,
            elapsed_ms = outcome.elapsed_ms,
            "probe did not succeed"
        ),
    }

    match collector.record(&job.key, outcome) {
        RecordDisposition::Recorded | RecordDisposition::ReplacedPlaceholder => {}
        other => tracing::warn!(
            round_id = job.round_id,
            job = %job.key,
            disposition = ?other,
            "probe outcome not recorded"
        ),
    }
}

/// Run a probe future, turning a panic into a `BuildError` outcome.
pub(crate) async fn guarded<F>(fut: F) -> ProbeOutcome
where
    F: Future<Output = ProbeOutcome>,
{
    let started = Instant::now();
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => ProbeOutcome::new(
            ProbeStatus::BuildError,
            format!("probe panicked: {}", panic_message(&*panic)),
            elapsed_ms(started),
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    duration_ms(started.elapsed())
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use scorebot_core::{
        Account, CheckDescriptor, CredentialSnapshot, InventoryEntry, Invocation, ResultStore,
        ScoreError,
    };
    use tempfile::TempDir;

    const SH: &str = "SHCheck";
    const SECRET_SH: &str = "SECRETSHCheck";

    /// `sh -c SCRIPT`, with the script taken from the `script` property.
    fn registry() -> Arc<Registry> {
        let mut reg = Registry::new();
        reg.register(
            CheckDescriptor::new(SH, |t| {
                Ok(Invocation::new("sh").arg("-c").arg(t.property("script")?))
            })
            .required(&["script"]),
        )
        .unwrap();
        reg.register(
            CheckDescriptor::new(SECRET_SH, |t| {
                let account = t.account()?;
                Ok(Invocation::new("sh")
                    .arg("-c")
                    .arg(r#"test "${#PROBE_PASSWORD}" -eq 7"#)
                    .arg(&account.username)
                    .secret_env("PROBE_PASSWORD", account.secret.clone()))
            })
            .with_account(),
        )
        .unwrap();
        Arc::new(reg)
    }

    fn sh_entry(team: &str, service: &str, script: &str) -> InventoryEntry {
        InventoryEntry::new(team, service, "127.0.0.1", 0, SH).property("script", script)
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_millis(100),
            max_concurrent: 8,
            default_timeout: Duration::from_secs(5),
            deadline_slack: Duration::from_millis(500),
            max_output_bytes: 1024,
        }
    }

    struct Fixture {
        _dir: TempDir,
        store: Arc<ResultStore>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ResultStore::open(&dir.path().join("results.db")).unwrap());
        Fixture { _dir: dir, store }
    }

    fn scheduler(
        fx: &Fixture,
        config: SchedulerConfig,
        entries: Vec<InventoryEntry>,
        credentials: CredentialSnapshot,
    ) -> RoundScheduler {
        RoundScheduler::new(
            config,
            registry(),
            Arc::new(entries),
            Arc::new(credentials),
            fx.store.clone(),
        )
    }

    struct BrokenInventory;

    impl Inventory for BrokenInventory {
        fn snapshot(&self) -> scorebot_core::Result<Vec<InventoryEntry>> {
            Err(ScoreError::Inventory("inventory service unreachable".into()))
        }
    }

    struct BrokenCredentials;

    impl Credentials for BrokenCredentials {
        fn snapshot(&self) -> scorebot_core::Result<CredentialSnapshot> {
            Err(ScoreError::Credentials("vault sealed".into()))
        }
    }

    /// Allocates ids and saves summaries, but every `append` fails.
    struct ReadOnlyResults(Arc<ResultStore>);

    impl ResultSink for ReadOnlyResults {
        fn next_round_id(&self) -> scorebot_core::Result<u64> {
            self.0.next_round_id()
        }

        fn append(&self, _records: &[ResultRecord]) -> scorebot_core::Result<()> {
            Err(ScoreError::ResultDb("disk full".into()))
        }

        fn save_round(&self, summary: &RoundSummary) -> scorebot_core::Result<()> {
            self.0.save_round(summary)
        }
    }

    #[tokio::test]
    async fn every_dispatched_job_gets_one_record() {
        let fx = fixture();
        let sched = scheduler(
            &fx,
            config(),
            vec![
                sh_entry("team1", "web", "echo up"),
                sh_entry("team1", "db", "exit 1"),
                sh_entry("team2", "web", "echo up"),
            ],
            CredentialSnapshot::default(),
        );

        let report = sched.run_round().await.unwrap();
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.placeholders, 0);
        assert_eq!(report.summary.state, RoundState::Closed);
        assert_eq!(report.summary.count(ProbeStatus::Success), 2);
        assert_eq!(report.summary.count(ProbeStatus::Failure), 1);

        let stored = fx.store.round_records(report.summary.id).unwrap();
        assert_eq!(stored.len(), 3);
        let latest = fx.store.latest_round().unwrap().unwrap();
        assert_eq!(latest.id, report.summary.id);
        assert_eq!(latest.state, RoundState::Closed);
    }

    #[tokio::test]
    async fn misconfigured_checks_are_recorded_not_dispatched() {
        let fx = fixture();
        let sched = scheduler(
            &fx,
            config(),
            vec![
                sh_entry("team1", "web", "echo up"),
                InventoryEntry::new("team1", "mail", "127.0.0.1", 25, "SMTPCheck"),
                InventoryEntry::new("team1", "noscript", "127.0.0.1", 0, SH),
                InventoryEntry::new("team1", "login", "127.0.0.1", 22, SECRET_SH),
            ],
            CredentialSnapshot::default(),
        );

        let report = sched.run_round().await.unwrap();
        assert_eq!(report.records.len(), 4);
        assert_eq!(report.summary.count(ProbeStatus::Misconfigured), 3);

        let by_service = |s: &str| {
            report
                .records
                .iter()
                .find(|r| r.key.service == s)
                .unwrap()
                .clone()
        };
        assert!(by_service("mail").outcome.output.contains("unknown check type"));
        assert!(by_service("noscript").outcome.output.contains("'script'"));
        assert!(by_service("login").outcome.output.contains("requires an account"));
        assert!(by_service("login").command.is_empty());
    }

    #[tokio::test]
    async fn deadline_forces_placeholders_and_kills_stragglers() {
        let fx = fixture();
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("straggler");
        let mut cfg = config();
        cfg.max_concurrent = 1;
        cfg.deadline_slack = Duration::ZERO;

        // With one permit "queued" only starts after "first" finishes at
        // ~1.5s; the deadline is the 3s job timeout.
        let sched = scheduler(
            &fx,
            cfg,
            vec![
                sh_entry("team1", "first", "sleep 1.5").timeout_seconds(3),
                sh_entry(
                    "team1",
                    "queued",
                    &format!("sleep 2 && touch '{}'", marker.display()),
                )
                .timeout_seconds(3),
            ],
            CredentialSnapshot::default(),
        );

        let report = sched.run_round().await.unwrap();
        assert_eq!(report.placeholders, 1);
        let first = report.records.iter().find(|r| r.key.service == "first").unwrap();
        let queued = report.records.iter().find(|r| r.key.service == "queued").unwrap();
        assert_eq!(first.status(), ProbeStatus::Success);
        assert!(!first.forced);
        assert_eq!(queued.status(), ProbeStatus::Timeout);
        assert!(queued.forced);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "aborted probe kept running");
    }

    #[tokio::test]
    async fn pool_bounds_concurrency() {
        let fx = fixture();
        let mut cfg = config();
        cfg.max_concurrent = 2;
        let entries = (0..4)
            .map(|i| sh_entry("team1", &format!("svc{i}"), "sleep 0.4"))
            .collect();
        let sched = scheduler(&fx, cfg, entries, CredentialSnapshot::default());

        let started = Instant::now();
        let report = sched.run_round().await.unwrap();
        assert_eq!(report.summary.count(ProbeStatus::Success), 4);
        // two waves of two
        assert!(started.elapsed() >= Duration::from_millis(750));
    }

    #[tokio::test]
    async fn secrets_never_reach_persisted_records() {
        let fx = fixture();
        let mut creds = CredentialSnapshot::default();
        creds.insert("team1", "login", Account::new("pwnbus", "hunter2"));
        let sched = scheduler(
            &fx,
            config(),
            vec![InventoryEntry::new("team1", "login", "127.0.0.1", 22, SECRET_SH)],
            creds,
        );

        let report = sched.run_round().await.unwrap();
        let record = &fx.store.round_records(report.summary.id).unwrap()[0];
        assert_eq!(record.status(), ProbeStatus::Success, "{}", record.outcome.output);
        assert!(record.command.contains("pwnbus"));
        assert!(!record.command.contains("hunter2"));
        assert!(!serde_json::to_string(record).unwrap().contains("hunter2"));
    }

    #[tokio::test]
    async fn inventory_failure_fails_the_round() {
        let fx = fixture();
        let sched = RoundScheduler::new(
            config(),
            registry(),
            Arc::new(BrokenInventory),
            Arc::new(CredentialSnapshot::default()),
            fx.store.clone(),
        );

        let err = sched.run_round().await.unwrap_err();
        let round_id = match err {
            EngineError::Inventory { round_id, .. } => round_id,
            other => panic!("expected inventory failure, got {other}"),
        };
        let summary = fx.store.round(round_id).unwrap().unwrap();
        assert_eq!(summary.state, RoundState::Failed);
        assert!(summary.error.unwrap().contains("unreachable"));
        assert!(fx.store.round_records(round_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn credential_failure_fails_the_round() {
        let fx = fixture();
        let sched = RoundScheduler::new(
            config(),
            registry(),
            Arc::new(vec![sh_entry("team1", "web", "true")]),
            Arc::new(BrokenCredentials),
            fx.store.clone(),
        );

        let err = sched.run_round().await.unwrap_err();
        let round_id = match err {
            EngineError::Credentials { round_id, .. } => round_id,
            other => panic!("expected credential failure, got {other}"),
        };
        let summary = fx.store.round(round_id).unwrap().unwrap();
        assert_eq!(summary.state, RoundState::Failed);
        assert!(summary.error.unwrap().contains("vault sealed"));
        assert!(summary.closed_at.is_some());
        assert!(fx.store.round_records(round_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_marks_the_round_failed() {
        let fx = fixture();
        let sched = RoundScheduler::new(
            config(),
            registry(),
            Arc::new(vec![sh_entry("team1", "web", "true")]),
            Arc::new(CredentialSnapshot::default()),
            Arc::new(ReadOnlyResults(fx.store.clone())),
        );

        let err = sched.run_round().await.unwrap_err();
        assert!(matches!(err, EngineError::Persist(ScoreError::ResultDb(_))), "{err}");

        let summary = fx.store.latest_round().unwrap().unwrap();
        assert_eq!(summary.state, RoundState::Failed);
        assert!(summary.error.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn huge_service_timeout_saturates_the_deadline() {
        let fx = fixture();
        let mut cfg = config();
        cfg.deadline_slack = Duration::from_secs(5);
        let sched = scheduler(
            &fx,
            cfg,
            vec![sh_entry("team1", "web", "true").timeout_seconds(u64::MAX)],
            CredentialSnapshot::default(),
        );

        let report = sched.run_round().await.unwrap();
        assert_eq!(report.summary.state, RoundState::Closed);
        assert_eq!(report.summary.count(ProbeStatus::Success), 1);
        assert_eq!(report.summary.deadline_ms, u64::MAX);
    }

    #[tokio::test]
    async fn round_ids_increase_across_rounds() {
        let fx = fixture();
        let sched = scheduler(
            &fx,
            config(),
            vec![sh_entry("team1", "web", "true")],
            CredentialSnapshot::default(),
        );
        let a = sched.run_round().await.unwrap().summary.id;
        let b = sched.run_round().await.unwrap().summary.id;
        assert!(b > a);
        assert_eq!(fx.store.round_records(a).unwrap().len(), 1);
        assert_eq!(fx.store.round_records(b).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_inventory_closes_immediately() {
        let fx = fixture();
        let sched = scheduler(&fx, config(), Vec::new(), CredentialSnapshot::default());
        let report = sched.run_round().await.unwrap();
        assert!(report.records.is_empty());
        assert_eq!(report.summary.state, RoundState::Closed);
    }

    #[tokio::test]
    async fn panicking_job_becomes_build_error() {
        let outcome = guarded(async {
            if true {
                panic!("executor bug");
            }
            ProbeOutcome::new(ProbeStatus::Success, "", 0)
        })
        .await;
        assert_eq!(outcome.status, ProbeStatus::BuildError);
        assert!(outcome.output.contains("executor bug"));
    }

    #[tokio::test]
    async fn run_loops_until_shutdown() {
        let fx = fixture();
        let sched = Arc::new(scheduler(
            &fx,
            config(),
            vec![sh_entry("team1", "web", "true")],
            CredentialSnapshot::default(),
        ));
        let (tx, rx) = watch::channel(false);
        let runner = {
            let sched = Arc::clone(&sched);
            tokio::spawn(async move { sched.run(rx).await })
        };

        tokio::time::timeout(Duration::from_secs(10), async {
            while fx.store.rounds().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("two rounds within 10s");

        tx.send(true).unwrap();
        runner.await.unwrap().unwrap();

        // the round in flight at shutdown was finished, not abandoned
        let rounds = fx.store.rounds().unwrap();
        assert!(rounds.windows(2).all(|w| w[0].id < w[1].id));
        assert!(rounds.iter().all(|r| r.state == RoundState::Closed));
    }
}
