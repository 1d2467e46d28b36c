//! Pipeline runner that executes stages in sequence.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use super::context::RunContext;
use super::errors::{PipelineError, PipelineResult, StageError, StageResult};
use super::stage::Stage;
use crate::config::TimeoutSettings;
use crate::logging::RunLogger;

/// Pipeline that runs a sequence of stages.
///
/// The context is moved into each stage and replaced by what the stage
/// returns. The first failure stops the run; later stages are never
/// invoked and completed stages are not rolled back.
pub struct Pipeline {
    /// Stages to execute in order.
    stages: Vec<Arc<dyn Stage>>,
    /// Per-stage time limits.
    timeouts: TimeoutPolicy,
    /// Cancellation flag.
    cancelled: Arc<AtomicBool>,
    /// Run logger for stage transitions.
    logger: Arc<RunLogger>,
}

impl Pipeline {
    /// Create a new empty pipeline without time limits.
    pub fn new(logger: Arc<RunLogger>) -> Self {
        Self {
            stages: Vec::new(),
            timeouts: TimeoutPolicy::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
            logger,
        }
    }

    /// Add a stage to the pipeline.
    pub fn add_stage<S: Stage + 'static>(&mut self, stage: S) -> &mut Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Add a stage (builder pattern).
    pub fn with_stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.add_stage(stage);
        self
    }

    /// Set the time limits (builder pattern).
    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Get a cancellation handle.
    ///
    /// Call `cancel()` on the returned handle to stop the pipeline
    /// at the next stage boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// Check if pipeline has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Get the number of stages in the pipeline.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Get stage names in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Stage names with their descriptions, in order.
    pub fn describe(&self) -> Vec<(&str, &str)> {
        self.stages.iter().map(|s| (s.name(), s.description())).collect()
    }

    /// Check the pipeline definition: at least one stage, unique names.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.stages.is_empty() {
            return Err(PipelineError::validation_failed("pipeline has no stages"));
        }
        let mut seen = HashSet::new();
        for name in self.stage_names() {
            if !seen.insert(name) {
                return Err(PipelineError::validation_failed(format!(
                    "duplicate stage name '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Run every stage against `ctx`.
    ///
    /// For each stage:
    /// 1. Check for cancellation
    /// 2. Log entry with the context summary
    /// 3. Run `validate_input`, `execute` (time limited) and `validate_output`
    /// 4. Check the returned context still extends the one handed in
    ///
    /// Returns the final context on success, or a `PipelineError` naming the
    /// stage where the run stopped.
    pub fn run(&self, ctx: RunContext) -> PipelineResult<RunReport> {
        self.validate()?;

        let mut ctx = ctx;
        let mut completed: Vec<String> = Vec::new();
        let run_started = Instant::now();

        self.logger.info(&format!(
            "Starting pipeline with {} stages: {}",
            self.stages.len(),
            self.stage_names().join(" -> ")
        ));

        for stage in &self.stages {
            let name = stage.name().to_string();

            if self.is_cancelled() {
                self.logger
                    .warn(&format!("Pipeline cancelled before stage '{}'", name));
                return Err(PipelineError::cancelled(name, completed));
            }

            self.logger.stage_started(&name, &ctx.summary());
            let started = Instant::now();
            let version = ctx.version.clone();

            ctx = match self.run_stage(stage, ctx) {
                Ok(next) => next,
                Err(e) => {
                    self.logger.stage_failed(&name, &e);
                    return Err(PipelineError::stage_failed(name, version, completed, e));
                }
            };

            self.logger.stage_completed(&name, started.elapsed());
            completed.push(name);
        }

        self.logger.success(&format!(
            "Pipeline completed successfully in {:.1}s",
            run_started.elapsed().as_secs_f64()
        ));

        Ok(RunReport {
            context: ctx,
            stages_completed: completed,
        })
    }

    fn run_stage(&self, stage: &Arc<dyn Stage>, ctx: RunContext) -> StageResult<RunContext> {
        self.logger.debug(stage.description());
        self.logger
            .debug(&format!("Validating input for '{}'", stage.name()));
        stage.validate_input(&ctx)?;

        let before = ctx.clone();
        let next = self.execute_guarded(stage, ctx)?;

        self.logger
            .debug(&format!("Validating output for '{}'", stage.name()));
        stage.validate_output(&next)?;
        next.extends(&before).map_err(StageError::invalid_output)?;

        Ok(next)
    }

    /// Execute on the caller's thread, or on a worker when a limit applies.
    ///
    /// A worker that outlives its limit is abandoned, not killed; its result
    /// is dropped when it eventually finishes.
    fn execute_guarded(&self, stage: &Arc<dyn Stage>, ctx: RunContext) -> StageResult<RunContext> {
        let Some(limit) = self.timeouts.limit_for(stage.name()) else {
            return stage.execute(ctx);
        };

        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(stage);
        thread::Builder::new()
            .name(format!("stage-{}", stage.name()))
            .spawn(move || {
                let _ = tx.send(worker.execute(ctx));
            })
            .map_err(|e| StageError::io_error("spawning stage worker", e))?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.logger.warn(&format!(
                    "Stage '{}' exceeded its {}s limit",
                    stage.name(),
                    limit.as_secs_f64()
                ));
                Err(StageError::timeout(limit))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(StageError::other(format!(
                "stage '{}' worker exited without a result",
                stage.name()
            ))),
        }
    }
}

/// Handle for cancelling a running pipeline.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Cancel the pipeline.
    ///
    /// The pipeline will stop at the next stage boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-stage execution limits. The default policy imposes none.
#[derive(Debug, Clone, Default)]
pub struct TimeoutPolicy {
    default: Option<Duration>,
    overrides: HashMap<String, Option<Duration>>,
}

impl TimeoutPolicy {
    /// Same limit for every stage.
    pub fn uniform(limit: Duration) -> Self {
        Self {
            default: Some(limit),
            overrides: HashMap::new(),
        }
    }

    /// Override one stage; `None` removes its limit.
    pub fn with_stage(mut self, stage: impl Into<String>, limit: Option<Duration>) -> Self {
        self.overrides.insert(stage.into(), limit);
        self
    }

    /// Build from the `[timeouts]` section, where 0 means unlimited.
    pub fn from_settings(settings: &TimeoutSettings) -> Self {
        Self {
            default: settings.default_limit(),
            overrides: settings
                .stages
                .keys()
                .map(|name| (name.clone(), settings.limit_for(name)))
                .collect(),
        }
    }

    /// Effective limit for `stage`.
    pub fn limit_for(&self, stage: &str) -> Option<Duration> {
        match self.overrides.get(stage) {
            Some(limit) => *limit,
            None => self.default,
        }
    }
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Final context as returned by the last stage.
    pub context: RunContext,
    /// Stages that completed, in order.
    pub stages_completed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::context::TargetInfo;
    use crate::orchestrator::ErrorKind;
    use parking_lot::Mutex;

    struct RecordingStage {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Stage for RecordingStage {
        fn name(&self) -> &str {
            self.name
        }

        fn validate_input(&self, _ctx: &RunContext) -> StageResult<()> {
            Ok(())
        }

        fn execute(&self, mut ctx: RunContext) -> StageResult<RunContext> {
            self.calls.lock().push(self.name.to_string());
            if self.fail {
                return Err(StageError::other("injected"));
            }
            ctx.changelog.push(self.name);
            Ok(ctx)
        }
    }

    struct SleepyStage(Duration);

    impl Stage for SleepyStage {
        fn name(&self) -> &str {
            "slow"
        }

        fn validate_input(&self, _ctx: &RunContext) -> StageResult<()> {
            Ok(())
        }

        fn execute(&self, ctx: RunContext) -> StageResult<RunContext> {
            thread::sleep(self.0);
            Ok(ctx)
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(TargetInfo::new("Example", "com.example", "https://e"))
    }

    fn stage(name: &'static str, calls: &Arc<Mutex<Vec<String>>>, fail: bool) -> RecordingStage {
        RecordingStage {
            name,
            calls: Arc::clone(calls),
            fail,
        }
    }

    #[test]
    fn runs_stages_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(RunLogger::quiet("test"))
            .with_stage(stage("a", &calls, false))
            .with_stage(stage("b", &calls, false));

        let report = pipeline.run(ctx()).unwrap();
        assert_eq!(*calls.lock(), vec!["a", "b"]);
        assert_eq!(report.stages_completed, vec!["a", "b"]);
        assert_eq!(report.context.changelog.entries(), &["a", "b"]);
    }

    #[test]
    fn stops_at_first_failure() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(RunLogger::quiet("test"))
            .with_stage(stage("a", &calls, false))
            .with_stage(stage("b", &calls, true))
            .with_stage(stage("c", &calls, false));

        let err = pipeline.run(ctx()).unwrap_err();
        assert_eq!(err.failed_stage(), Some("b"));
        assert_eq!(err.completed_stages(), &["a".to_string()]);
        assert_eq!(*calls.lock(), vec!["a", "b"]);
    }

    #[test]
    fn describe_falls_back_to_stage_name() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(RunLogger::quiet("test"))
            .with_stage(stage("a", &calls, false))
            .with_stage(SleepyStage(Duration::ZERO));

        assert_eq!(pipeline.describe(), vec![("a", "a"), ("slow", "slow")]);
    }

    #[test]
    fn rejects_empty_and_duplicate_pipelines() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        assert!(Pipeline::new(RunLogger::quiet("t")).run(ctx()).is_err());

        let dup = Pipeline::new(RunLogger::quiet("t"))
            .with_stage(stage("a", &calls, false))
            .with_stage(stage("a", &calls, false));
        assert!(matches!(
            dup.run(ctx()),
            Err(PipelineError::ValidationFailed(_))
        ));
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn cancellation_stops_before_next_stage() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(RunLogger::quiet("t")).with_stage(stage("a", &calls, false));
        pipeline.cancel_handle().cancel();

        let err = pipeline.run(ctx()).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn timeout_fails_stage() {
        let pipeline = Pipeline::new(RunLogger::quiet("t"))
            .with_stage(SleepyStage(Duration::from_millis(500)))
            .with_timeouts(TimeoutPolicy::uniform(Duration::from_millis(20)));

        let err = pipeline.run(ctx()).unwrap_err();
        assert_eq!(err.failed_stage(), Some("slow"));
        let cause = err.stage_error().unwrap();
        assert_eq!(cause.kind(), ErrorKind::Timeout);
        assert!(cause.to_string().to_lowercase().contains("timeout"));
    }

    #[test]
    fn timeout_override_can_disable_limit() {
        let pipeline = Pipeline::new(RunLogger::quiet("t"))
            .with_stage(SleepyStage(Duration::from_millis(30)))
            .with_timeouts(
                TimeoutPolicy::uniform(Duration::from_millis(1)).with_stage("slow", None),
            );
        assert!(pipeline.run(ctx()).is_ok());
    }

    #[test]
    fn policy_from_settings() {
        let mut settings = TimeoutSettings::default();
        settings.stages.insert("notify".to_string(), 0);
        settings.stages.insert("download".to_string(), 30);

        let policy = TimeoutPolicy::from_settings(&settings);
        assert_eq!(policy.limit_for("sign"), Some(Duration::from_secs(1800)));
        assert_eq!(policy.limit_for("download"), Some(Duration::from_secs(30)));
        assert_eq!(policy.limit_for("notify"), None);
        assert_eq!(TimeoutPolicy::default().limit_for("sign"), None);
    }
}
