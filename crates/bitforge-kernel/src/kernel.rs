//! The Workbench — the assembled subsystem.
//!
//! Owns and wires all core components: the stores, the catalogs, the
//! selected interpreter, and the job manager. Embedders construct one
//! `Workbench`, register strategies and scripts, store source buffers, and
//! drive everything through the job manager (or a standalone engine).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        Workbench                           │
//! │  ┌───────────────┐ ┌──────────────┐ ┌───────────────────┐  │
//! │  │ StrategyStore │ │ ScriptStore  │ │ File/ResultsStore │  │
//! │  └───────────────┘ └──────────────┘ └───────────────────┘  │
//! │  ┌──────────────────────────┐ ┌─────────────────────────┐  │
//! │  │ JobManager (admission)   │ │ Catalogs + Interpreter  │  │
//! │  └──────────────────────────┘ └─────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bitforge_types::{BitBuffer, BufferKind, FileHandle, StrategyConfig};

use crate::catalog::{BuiltinCatalog, MetricCatalog, OperationCatalog};
use crate::pipeline::{CostTable, ExecutionEngine};
use crate::sandbox::{select_interpreter, Interpreter, InterpreterSelection};
use crate::scheduler::{JobManager, JobManagerConfig};
use crate::store::{
    FileStore, MemoryFileStore, MemoryResultsStore, ResultsStore, ScriptStore, StrategyStore,
};

/// Configuration for workbench construction.
#[derive(Default)]
pub struct WorkbenchConfig {
    /// The embedder's primary interpreter. When absent, the restricted
    /// fallback runs scripts and results are flagged as degraded.
    pub interpreter: Option<Arc<dyn Interpreter>>,
    /// Job manager settings.
    pub jobs: JobManagerConfig,
}

/// The assembled pipeline-execution and job-scheduling subsystem.
pub struct Workbench {
    strategies: Arc<StrategyStore>,
    scripts: Arc<ScriptStore>,
    files: Arc<dyn FileStore>,
    results: Arc<dyn ResultsStore>,
    ops: Arc<dyn OperationCatalog>,
    metrics: Arc<dyn MetricCatalog>,
    interpreter: InterpreterSelection,
    manager: JobManager,
}

impl Workbench {
    /// Build a workbench with in-memory stores and the builtin catalog.
    pub fn new(config: WorkbenchConfig) -> Self {
        Self::with_catalogs(config, Arc::new(BuiltinCatalog), Arc::new(BuiltinCatalog))
    }

    /// Build a workbench around external catalogs.
    pub fn with_catalogs(
        config: WorkbenchConfig,
        ops: Arc<dyn OperationCatalog>,
        metrics: Arc<dyn MetricCatalog>,
    ) -> Self {
        let strategies = Arc::new(StrategyStore::new());
        let scripts = Arc::new(ScriptStore::new());
        let files: Arc<dyn FileStore> = Arc::new(MemoryFileStore::new());
        let results: Arc<dyn ResultsStore> = Arc::new(MemoryResultsStore::new());
        let interpreter = select_interpreter(config.interpreter);
        let manager = JobManager::new(
            strategies.clone(),
            scripts.clone(),
            files.clone(),
            results.clone(),
            ops.clone(),
            metrics.clone(),
            interpreter.clone(),
            config.jobs,
        );
        Self { strategies, scripts, files, results, ops, metrics, interpreter, manager }
    }

    /// True when the restricted fallback interpreter is in use.
    pub fn degraded(&self) -> bool {
        self.interpreter.degraded
    }

    /// Register a strategy.
    pub async fn register_strategy(&self, strategy: StrategyConfig) {
        self.strategies.register(strategy).await;
    }

    /// Register (or replace) a stage script.
    pub async fn add_script(&self, name: impl Into<String>, source: impl Into<String>) {
        self.scripts.put(name, source).await;
    }

    /// Load every file in `dir` as a stage script keyed by file name.
    pub async fn load_scripts_from_dir(&self, dir: impl AsRef<Path>) -> anyhow::Result<usize> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("reading script directory {}", dir.display()))?;
        let mut loaded = 0;
        for entry in entries {
            let entry = entry.context("reading script directory entry")?;
            if !entry.file_type().context("reading entry type")?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let source = std::fs::read_to_string(entry.path())
                .with_context(|| format!("reading script {}", entry.path().display()))?;
            self.scripts.put(name, source).await;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Store a source buffer.
    pub async fn create_source(&self, name: &str, bits: BitBuffer) -> FileHandle {
        self.files.create_file(name, bits, BufferKind::Source).await
    }

    /// The job manager.
    pub fn manager(&self) -> &JobManager {
        &self.manager
    }

    /// Build a standalone engine sharing this workbench's stores. Each
    /// engine instance runs one execution at a time.
    pub fn engine(&self) -> ExecutionEngine {
        ExecutionEngine::new(
            self.strategies.clone(),
            self.scripts.clone(),
            self.files.clone(),
            self.results.clone(),
            self.ops.clone(),
            self.metrics.clone(),
            self.interpreter.clone(),
            CostTable::default(),
        )
    }

    /// The file store.
    pub fn files(&self) -> Arc<dyn FileStore> {
        self.files.clone()
    }

    /// The results store.
    pub fn results(&self) -> Arc<dyn ResultsStore> {
        self.results.clone()
    }

    /// The strategy store.
    pub fn strategies(&self) -> Arc<StrategyStore> {
        self.strategies.clone()
    }
}
