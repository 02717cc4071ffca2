mod admission;
pub mod language;
mod lifecycle;
pub mod outcome;
mod staging;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    engine::ContainerEngine,
    error::ExecError,
    metrics::MetricsRegistry,
    models::{ExecutionOutcome, ExecutionRequest},
};

use admission::AdmissionController;
use language::{Language, build_recipe};
use lifecycle::LifecycleDriver;

/// Composes the admission gate, language adapter, lifecycle driver and
/// result extractor into the single `ExecuteCode` operation the HTTP facade
/// calls.
pub struct Orchestrator {
    admission: AdmissionController,
    driver: LifecycleDriver,
    metrics: Arc<MetricsRegistry>,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        config: &AppConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            admission: AdmissionController::new(config.max_concurrent_sandboxes),
            driver: LifecycleDriver::new(
                engine,
                config.sandbox_network.clone(),
                config.exec_timeout,
                config.image_pull_timeout,
            ),
            metrics,
        }
    }

    #[cfg(test)]
    fn with_limits(
        engine: Arc<dyn ContainerEngine>,
        ceiling: usize,
        exec_deadline: std::time::Duration,
        pull_deadline: std::time::Duration,
    ) -> Self {
        Self {
            admission: AdmissionController::new(ceiling),
            driver: LifecycleDriver::new(engine, "none".to_string(), exec_deadline, pull_deadline),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome, ExecError> {
        self.metrics.submitted();

        // Rejection happens before a slot is taken, so an unsupported tag
        // never wastes capacity.
        let Some(language) = Language::parse(&request.language) else {
            self.metrics.rejected();
            return Err(ExecError::UnsupportedLanguage(request.language));
        };

        let recipe = build_recipe(language, &request.code);

        let _slot = self.admission.acquire().await?;
        self.metrics.sandbox_started();
        let run = self.run_admitted(language, &recipe).await;
        self.metrics.sandbox_finished();

        match &run {
            Ok(_) => self.metrics.completed(),
            Err(ExecError::Timeout) => self.metrics.timed_out(),
            Err(_) => self.metrics.failed(),
        }
        run
    }

    async fn run_admitted(
        &self,
        language: Language,
        recipe: &language::LaunchRecipe,
    ) -> Result<ExecutionOutcome, ExecError> {
        tracing::debug!(language = language.as_str(), image = recipe.image, "sandbox admitted");
        let run = self.driver.run(recipe).await?;

        if run.exit_code != 0 {
            // The wrapper never got to emit its envelope, or the runtime
            // itself failed the process. Either way the combined output is
            // the user-visible error content.
            return Ok(ExecutionOutcome::runtime_error(run.combined_output));
        }
        outcome::extract(&run.combined_output)
    }

    pub fn in_flight(&self) -> usize {
        self.admission.in_flight()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;

    use super::Orchestrator;
    use crate::{
        engine::{ContainerEngine, ContainerSpec},
        error::ExecError,
        executor::outcome::RESULT_SENTINEL,
        models::ExecutionRequest,
    };

    const DEADLINE: Duration = Duration::from_millis(200);

    /// Records every engine call and replays scripted behavior, standing in
    /// for the Docker daemon.
    struct MockEngine {
        calls: Mutex<Vec<String>>,
        image_present: AtomicBool,
        exit_code: i64,
        logs: String,
        hang_on_wait: bool,
        mount_paths: Mutex<Vec<std::path::PathBuf>>,
        created_specs: Mutex<Vec<ContainerSpec>>,
    }

    impl MockEngine {
        fn new(exit_code: i64, logs: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                image_present: AtomicBool::new(true),
                exit_code,
                logs: logs.to_string(),
                hang_on_wait: false,
                mount_paths: Mutex::new(Vec::new()),
                created_specs: Mutex::new(Vec::new()),
            }
        }

        fn with_absent_image(mut self) -> Self {
            self.image_present = AtomicBool::new(false);
            self
        }

        fn hanging(mut self) -> Self {
            self.hang_on_wait = true;
            self
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, call: &str) -> usize {
            self.calls().iter().filter(|c| c.as_str() == call).count()
        }
    }

    #[async_trait]
    impl ContainerEngine for MockEngine {
        async fn image_present(&self, _image: &str) -> bool {
            self.record("image_present");
            self.image_present.load(Ordering::SeqCst)
        }

        async fn pull_image(&self, _image: &str) -> anyhow::Result<()> {
            self.record("pull_image");
            self.image_present.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn create(&self, _name: &str, spec: &ContainerSpec) -> anyhow::Result<String> {
            self.record("create");
            self.mount_paths
                .lock()
                .unwrap()
                .extend(spec.mounts.iter().map(|m| m.host_path.clone()));
            self.created_specs.lock().unwrap().push(spec.clone());
            Ok("sandbox-1".to_string())
        }

        async fn start(&self, _id: &str) -> anyhow::Result<()> {
            self.record("start");
            Ok(())
        }

        async fn wait(&self, _id: &str) -> anyhow::Result<i64> {
            self.record("wait");
            if self.hang_on_wait {
                std::future::pending::<()>().await;
            }
            Ok(self.exit_code)
        }

        async fn stop(&self, _id: &str) -> anyhow::Result<()> {
            self.record("stop");
            Ok(())
        }

        async fn remove(&self, _id: &str) -> anyhow::Result<()> {
            self.record("remove");
            Ok(())
        }

        async fn combined_logs(&self, _id: &str) -> anyhow::Result<String> {
            self.record("combined_logs");
            Ok(self.logs.clone())
        }
    }

    fn orchestrator(engine: Arc<MockEngine>) -> Orchestrator {
        Orchestrator::with_limits(engine, 4, DEADLINE, DEADLINE)
    }

    fn request(language: &str, code: &str) -> ExecutionRequest {
        ExecutionRequest {
            language: language.to_string(),
            code: code.to_string(),
        }
    }

    fn envelope(body: &str) -> String {
        format!("{RESULT_SENTINEL}{body}\n")
    }

    #[tokio::test]
    async fn literal_return_produces_its_string_form() {
        let engine = Arc::new(MockEngine::new(0, &envelope(r#"{"result":"42"}"#)));
        let outcome = orchestrator(engine.clone())
            .execute(request("javascript", "return 42;"))
            .await
            .unwrap();
        assert_eq!(outcome.result, "42");
        assert_eq!(outcome.error, None);
        assert_eq!(engine.count("create"), 1);
        assert_eq!(engine.count("remove"), 1);
    }

    #[tokio::test]
    async fn wrapper_error_envelope_becomes_outcome_error() {
        let engine = Arc::new(MockEngine::new(0, &envelope(r#"{"error":"bad"}"#)));
        let outcome = orchestrator(engine)
            .execute(request("python", "raise ValueError('bad')"))
            .await
            .unwrap();
        assert_eq!(outcome.result, "");
        assert_eq!(outcome.error.as_deref(), Some("bad"));
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_combined_logs_as_error_content() {
        let engine = Arc::new(MockEngine::new(137, "oom killed\n"));
        let outcome = orchestrator(engine)
            .execute(request("python", "x = bytearray(10**9)"))
            .await
            .unwrap();
        assert_eq!(outcome.result, "");
        assert_eq!(outcome.error.as_deref(), Some("oom killed\n"));
    }

    #[tokio::test]
    async fn unsupported_language_is_rejected_before_any_engine_call() {
        let engine = Arc::new(MockEngine::new(0, ""));
        let err = orchestrator(engine.clone())
            .execute(request("ruby", "puts 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::UnsupportedLanguage(tag) if tag == "ruby"));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn hung_sandbox_times_out_and_is_torn_down() {
        let engine = Arc::new(MockEngine::new(0, "").hanging());
        let orchestrator = orchestrator(engine.clone());
        let err = orchestrator
            .execute(request("javascript", "while (true) {}"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout));
        assert_eq!(engine.count("stop"), 1);
        assert!(engine.count("remove") >= 1);
        assert_eq!(orchestrator.in_flight(), 0);

        // The staging directory must not outlive the request either.
        let mounts = engine.mount_paths.lock().unwrap().clone();
        assert!(!mounts.is_empty());
        assert!(mounts.iter().all(|path| !path.exists()));
    }

    #[tokio::test]
    async fn absent_image_is_pulled_exactly_once() {
        let engine =
            Arc::new(MockEngine::new(0, &envelope(r#"{"result":""}"#)).with_absent_image());
        let orchestrator = orchestrator(engine.clone());
        orchestrator
            .execute(request("python", "pass"))
            .await
            .unwrap();
        orchestrator
            .execute(request("python", "pass"))
            .await
            .unwrap();
        assert_eq!(engine.count("pull_image"), 1);
    }

    #[tokio::test]
    async fn present_image_is_never_pulled() {
        let engine = Arc::new(MockEngine::new(0, &envelope(r#"{"result":""}"#)));
        orchestrator(engine.clone())
            .execute(request("python", "pass"))
            .await
            .unwrap();
        assert_eq!(engine.count("pull_image"), 0);
    }

    #[tokio::test]
    async fn missing_envelope_on_zero_exit_is_an_orchestration_error() {
        let engine = Arc::new(MockEngine::new(0, "print without protocol\n"));
        let err = orchestrator(engine)
            .execute(request("python", "pass"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Orchestration(_)));
    }

    #[tokio::test]
    async fn every_sandbox_gets_the_fixed_hardening_profile() {
        let engine = Arc::new(MockEngine::new(0, &envelope(r#"{"result":""}"#)));
        orchestrator(engine.clone())
            .execute(request("javascript", "return 1;"))
            .await
            .unwrap();
        let specs = engine.created_specs.lock().unwrap();
        let spec = &specs[0];
        assert_eq!(spec.memory_bytes, 128 * 1024 * 1024);
        assert_eq!(spec.nano_cpus, 1_000_000_000);
        assert_eq!(spec.pids_limit, 100);
        assert!(spec.readonly_rootfs);
        assert!(spec.drop_all_capabilities);
        assert!(spec.no_new_privileges);
        assert!(spec.auto_remove);
        assert!(spec.mounts.iter().all(|m| m.read_only));
        assert_eq!(spec.network_mode, "none");
    }

    #[tokio::test]
    async fn concurrent_executions_respect_the_admission_ceiling() {
        let engine = Arc::new(MockEngine::new(0, &envelope(r#"{"result":""}"#)));
        let orchestrator = Arc::new(Orchestrator::with_limits(
            engine,
            2,
            DEADLINE,
            DEADLINE,
        ));
        let observed_max = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..12 {
            let orchestrator = orchestrator.clone();
            let observed_max = observed_max.clone();
            tasks.push(tokio::spawn(async move {
                let run = orchestrator.execute(request("python", "pass"));
                let watch = async {
                    loop {
                        observed_max.fetch_max(orchestrator.in_flight(), Ordering::Relaxed);
                        tokio::task::yield_now().await;
                    }
                };
                tokio::select! {
                    result = run => result.unwrap(),
                    _ = watch => unreachable!(),
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(observed_max.load(Ordering::Relaxed) <= 2);
        assert_eq!(orchestrator.in_flight(), 0);
    }
}
