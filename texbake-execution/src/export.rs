//! Export orchestration
//!
//! One export run: validate the selection, generate and isolate bake tasks,
//! persist the project, run the worker pool and hand the results to a
//! finalizer. Whatever happens, the host's mutated state is restored, the
//! task bundles are deleted and the reentrancy lock is released.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use texbake_caching::{CacheStore, ChannelMap, ImageHashCache, SharedCacheStore};
use texbake_config::TexbakeConfig;
use texbake_core::{ContentHash, Scene, SetupError};
use texbake_pipeline::{
    preflight, resolve_save_path, select_objects, GeneratorOptions, MaterialAssignment,
    SkippedMaterial, SpecialBinding, TaskGenerator, TaskIsolator,
};
use texbake_resilience::RunLock;

use crate::controller::{CancelHandle, DispatchContext, PoolController, RunReport};
use crate::error::{ExecutionError, ExecutionResult};
use crate::monitor::ResourceMonitor;
use crate::scratch::{ExportFolder, ScratchLayout};
use crate::worker::WorkerLauncher;

/// Mutating operations on the host application
pub trait ExportHost: Send {
    /// Persist the project so that workers loading bundles see consistent
    /// external file references
    fn save_project(&mut self, scene: &Scene, save_path: &Path) -> ExecutionResult<()>;

    /// Undo material reassignments, UV layer selection and mirrored geometry
    fn restore_state(&mut self) -> ExecutionResult<()>;

    /// Delete temporary datablocks created for the export
    fn remove_temporary(&mut self) -> ExecutionResult<()> {
        Ok(())
    }
}

/// Everything a finalizer needs to reassemble materials
#[derive(Debug)]
pub struct FinalizeInput<'a> {
    pub scene: &'a Scene,
    pub save_path: &'a Path,
    /// PID-locked scratch folder owned by this export
    pub folder: &'a Path,
    pub assignments: &'a [MaterialAssignment],
    pub special: &'a [SpecialBinding],
    pub cache: &'a CacheStore,
    /// Channel maps resolved during generation, including texture copies
    /// too incomplete to be cached
    pub copied: &'a HashMap<ContentHash, ChannelMap>,
    pub run: &'a RunReport,
}

impl FinalizeInput<'_> {
    /// Textures of a material slot's hash, from the cache or this run's copies
    pub fn channels(&self, hash: &ContentHash) -> Option<ChannelMap> {
        self.cache.get(hash).or_else(|| self.copied.get(hash).cloned())
    }
}

/// Final material reassembly, export and delivery of one run
pub trait Finalizer: Send {
    /// Returns the location of the delivered result
    fn finalize(&mut self, input: &FinalizeInput<'_>) -> ExecutionResult<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub save_path: PathBuf,
    pub output: PathBuf,
    pub tasks: usize,
    pub assignments: usize,
    pub skipped: Vec<SkippedMaterial>,
    pub run: RunReport,
}

/// Runs exports against process-wide caches, one at a time
pub struct Exporter {
    config: TexbakeConfig,
    cache: SharedCacheStore,
    images: Arc<ImageHashCache>,
    run_lock: RunLock,
    cancel: CancelHandle,
}

impl Exporter {
    pub fn new(config: TexbakeConfig) -> Self {
        let images = Arc::new(ImageHashCache::with_memoization(
            config.cache.memoize_image_hashes,
        ));
        Self::with_caches(config, CacheStore::shared(), images)
    }

    pub fn with_caches(
        config: TexbakeConfig,
        cache: SharedCacheStore,
        images: Arc<ImageHashCache>,
    ) -> Self {
        Self {
            config,
            cache,
            images,
            run_lock: RunLock::new(),
            cancel: CancelHandle::new(),
        }
    }

    pub fn config(&self) -> &TexbakeConfig {
        &self.config
    }

    pub fn cache(&self) -> &SharedCacheStore {
        &self.cache
    }

    pub fn image_hashes(&self) -> &Arc<ImageHashCache> {
        &self.images
    }

    /// Handle that cancels the export currently running, if any
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.is_held()
    }

    pub fn layout(&self) -> ScratchLayout {
        ScratchLayout::from_config(&self.config.paths)
    }

    /// Export the selected objects, or every exportable object when the
    /// selection is empty
    pub async fn export(
        &self,
        scene: &Scene,
        selection: &[String],
        host: &mut dyn ExportHost,
        launcher: Box<dyn WorkerLauncher>,
        monitor: Box<dyn ResourceMonitor>,
        finalizer: &mut dyn Finalizer,
    ) -> ExecutionResult<ExportReport> {
        let _guard = self
            .run_lock
            .try_acquire()
            .map_err(|_| SetupError::AlreadyRunning)?;
        self.cancel.reset();

        let layout = self.layout();
        let result = self
            .run_export(scene, selection, &layout, host, launcher, monitor, finalizer)
            .await;

        self.cleanup(&layout, host);
        match &result {
            Ok(report) => info!(
                output = %report.output.display(),
                tasks = report.tasks,
                "Export finished"
            ),
            Err(e) if e.is_cancelled() => warn!("Export cancelled"),
            Err(e) => error!(error = %e, "Export failed"),
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_export(
        &self,
        scene: &Scene,
        selection: &[String],
        layout: &ScratchLayout,
        host: &mut dyn ExportHost,
        launcher: Box<dyn WorkerLauncher>,
        monitor: Box<dyn ResourceMonitor>,
        finalizer: &mut dyn Finalizer,
    ) -> ExecutionResult<ExportReport> {
        let save_path = resolve_save_path(scene, self.config.paths.save_path.as_deref())?;
        let objects = select_objects(scene, selection)?;
        preflight(scene, &objects)?;
        layout.prepare()?;

        let options =
            GeneratorOptions::from_config(&self.config.bake, &self.config.cache, layout.bake_dir());
        let generated =
            TaskGenerator::new(scene, &self.cache, &self.images, options).generate(&objects)?;
        for skipped in &generated.skipped {
            info!(
                object = %skipped.object,
                material = %skipped.material,
                reason = %skipped.reason,
                "Material skipped"
            );
        }
        info!(
            objects = objects.len(),
            tasks = generated.tasks.len(),
            cached = generated.cached.len(),
            "Generated bake tasks"
        );

        let isolated = TaskIsolator::new(layout.bundle_dir()).isolate(scene, generated.tasks)?;
        let tasks = isolated.tasks.len();

        let run = if tasks == 0 {
            debug!("Nothing to bake");
            RunReport::empty()
        } else {
            host.save_project(scene, &save_path)?;
            let dispatch = DispatchContext {
                bake_dir: layout.bake_dir(),
                bake_method: self.config.bake.bake_method.clone(),
                texture_maps: isolated.texture_maps,
            };
            PoolController::new(
                self.config.pool.clone(),
                launcher,
                monitor,
                Arc::clone(&self.cache),
                dispatch,
                isolated.tasks,
            )
            .with_cancel(self.cancel.clone())
            .with_log_forwarding(self.config.logging.forward_worker_logs)
            .run()
            .await?
        };

        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        let folder = ExportFolder::create(&layout.finalize_dir)?;
        let input = FinalizeInput {
            scene,
            save_path: &save_path,
            folder: folder.path(),
            assignments: &generated.assignments,
            special: &generated.special,
            cache: &self.cache,
            copied: &generated.cached,
            run: &run,
        };
        let output = finalizer.finalize(&input)?;
        debug!(
            results = %self.cache.stats(),
            images = %self.images.stats(),
            "Cache usage"
        );

        Ok(ExportReport {
            save_path,
            output,
            tasks,
            assignments: generated.assignments.len(),
            skipped: generated.skipped,
            run,
        })
    }

    fn cleanup(&self, layout: &ScratchLayout, host: &mut dyn ExportHost) {
        if let Err(e) = host.restore_state() {
            warn!(error = %e, "Failed to restore host state");
        }
        if let Err(e) = host.remove_temporary() {
            warn!(error = %e, "Failed to remove temporary data");
        }
        if let Err(e) = layout.clear_bundles() {
            warn!(error = %e, "Failed to remove task bundles");
        }
    }
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("running", &self.is_running())
            .field("cached_materials", &self.cache.len())
            .finish()
    }
}
