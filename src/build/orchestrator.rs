use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

use image::RgbaImage;
use rayon::prelude::*;

use crate::audio::backend::{BackendKind, Converter, TargetFormat};
use crate::audio::cache::ConversionCache;
use crate::build::layout::ModLayout;
use crate::config::BuildConfig;
use crate::cover::compositor::{
    Compositor, DefaultCoverPool, Texture, load_base,
};
use crate::cover::mask::MaskVariant;
use crate::cover::poster::{WorkshopImages, render_workshop_images};
use crate::definitions::generate::{
    Definitions, ReadyOutputs, SkippedItem, generate, render_manifest,
};
use crate::foundation::core::{CancelToken, ensure_dir, ensure_parent_dir};
use crate::foundation::error::{MoozicError, MoozicResult};
use crate::project::model::{CoverSource, ModProject, ResolutionTier, TrackStatus};

/// Build state machine stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStage {
    /// Not started.
    Idle,
    /// Checking project and options; no side effects yet.
    Validating,
    /// Converting track audio.
    Converting,
    /// Compositing cover textures and workshop images.
    Compositing,
    /// Generating definition text.
    Generating,
    /// Writing the output tree.
    Assembling,
    /// Finished, possibly with per-item failures.
    Done,
    /// Aborted by validation, cancellation or assembly failure.
    Failed,
}

impl BuildStage {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Converting => "converting",
            Self::Compositing => "compositing",
            Self::Generating => "generating",
            Self::Assembling => "assembling",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical audio produced for one track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackAudio {
    /// Location inside the mod tree.
    pub output: PathBuf,
    /// Converted file in the cache.
    pub cache_path: PathBuf,
    /// Backend that produced the file.
    pub backend: BackendKind,
    /// Whether an existing cache entry was reused.
    pub cached: bool,
}

/// Conversion outcome of one track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackOutcome {
    /// Position in the project track list.
    pub index: usize,
    /// Track identifier.
    pub track_id: String,
    /// Audio or the failure reason.
    pub result: Result<TrackAudio, String>,
}

/// What a cover outcome was rendered for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoverTarget {
    /// One mask variant of a track.
    Track {
        /// Position in the project track list.
        index: usize,
        /// Track identifier.
        track_id: String,
        /// Mask variant.
        variant: MaskVariant,
    },
    /// Workshop poster and preview.
    Poster,
}

impl std::fmt::Display for CoverTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Track {
                track_id, variant, ..
            } => write!(f, "'{track_id}' {variant}"),
            Self::Poster => f.write_str("poster"),
        }
    }
}

/// Compositing outcome of one cover.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverOutcome {
    /// Rendered target.
    pub target: CoverTarget,
    /// Main texture location inside the mod tree, or the failure reason.
    pub result: Result<PathBuf, String>,
}

/// Overall result of a build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildStatus {
    /// Every track and cover succeeded.
    Succeeded,
    /// The tree was written but some tracks or covers failed.
    PartiallySucceeded {
        /// Failed tracks plus failed covers.
        failed: usize,
    },
    /// Aborted; no tree was produced.
    Failed(String),
    /// Cancelled; no tree was produced.
    Cancelled,
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::PartiallySucceeded { failed } => {
                write!(f, "partially succeeded ({failed} failed)")
            }
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Per-build report. Not persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildResult {
    /// Overall status.
    pub status: BuildStatus,
    /// Terminal stage, [`BuildStage::Done`] or [`BuildStage::Failed`].
    pub stage: BuildStage,
    /// Conversion outcomes in track order.
    pub tracks: Vec<TrackOutcome>,
    /// Compositing outcomes in track order, poster last.
    pub covers: Vec<CoverOutcome>,
    /// Items written to the definitions.
    pub items: Vec<String>,
    /// Items left out because an output failed.
    pub skipped: Vec<SkippedItem>,
    /// Assembled tree root.
    pub tree: Option<PathBuf>,
    /// Whether `tree` holds a complete output for every successful entry.
    pub tree_ready: bool,
}

impl BuildResult {
    fn aborted(status: BuildStatus) -> Self {
        Self {
            status,
            stage: BuildStage::Failed,
            tracks: Vec::new(),
            covers: Vec::new(),
            items: Vec::new(),
            skipped: Vec::new(),
            tree: None,
            tree_ready: false,
        }
    }

    /// Failed tracks plus failed covers.
    pub fn failure_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.result.is_err()).count()
            + self.covers.iter().filter(|c| c.result.is_err()).count()
    }

    /// Whether the build finished with every entry successful.
    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Succeeded
    }

    /// Human-readable report, one line per entry.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "build {}: {} track(s), {} cover(s), {} item(s)",
            self.status,
            self.tracks.len(),
            self.covers.len(),
            self.items.len()
        )];
        for t in &self.tracks {
            lines.push(match &t.result {
                Ok(a) => format!(
                    "  ok   track '{}' -> {} ({}{})",
                    t.track_id,
                    a.output.display(),
                    a.backend,
                    if a.cached { ", cached" } else { "" }
                ),
                Err(reason) => format!("  FAIL track '{}': {reason}", t.track_id),
            });
        }
        for c in &self.covers {
            lines.push(match &c.result {
                Ok(path) => format!("  ok   cover {} -> {}", c.target, path.display()),
                Err(reason) => format!("  FAIL cover {}: {reason}", c.target),
            });
        }
        for s in &self.skipped {
            lines.push(format!("  skip item {}: {}", s.item, s.reason));
        }
        match (&self.tree, self.tree_ready) {
            (Some(tree), true) => lines.push(format!("tree ready: {}", tree.display())),
            _ => lines.push("tree not ready".to_string()),
        }
        lines
    }
}

/// Progress notifications. Sending never blocks the build and a dropped receiver is ignored.
#[derive(Clone, Debug)]
pub enum BuildEvent {
    /// Entered a stage.
    Stage(BuildStage),
    /// A track finished converting.
    TrackConverted(TrackOutcome),
    /// A cover finished compositing.
    CoverComposited(CoverOutcome),
    /// The build reached a terminal stage.
    Finished(BuildStatus),
}

/// Handle to a build running on its own thread.
pub struct BuildHandle {
    /// Progress events.
    pub events: mpsc::Receiver<BuildEvent>,
    /// Cancels the build between stages and before each job.
    pub cancel: CancelToken,
    join: JoinHandle<(ModProject, BuildResult)>,
}

impl BuildHandle {
    /// Wait for the build, returning the project with updated track statuses and the result.
    pub fn wait(self) -> MoozicResult<(ModProject, BuildResult)> {
        self.join
            .join()
            .map_err(|_| MoozicError::Other(anyhow::anyhow!("build thread panicked")))
    }
}

struct TrackCovers {
    world: Texture,
    icon: Texture,
    high_res: Option<Texture>,
}

struct Composited {
    textures: HashMap<(usize, MaskVariant), TrackCovers>,
    poster: Option<WorkshopImages>,
}

/// Runs the build state machine for one project.
///
/// Validation failures abort before any filesystem side effect. Conversion and compositing run on
/// a bounded rayon pool and fail per item; the output tree is written only by the assembling stage
/// into a staging directory that replaces `<output_dir>/<mod_id>` on success.
pub struct BuildOrchestrator {
    config: BuildConfig,
    converter: Option<Converter>,
    events: Option<mpsc::Sender<BuildEvent>>,
    cancel: CancelToken,
}

impl BuildOrchestrator {
    /// Orchestrator over the built-in conversion backends.
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            converter: None,
            events: None,
            cancel: CancelToken::new(),
        }
    }

    /// Use `converter` instead of the built-in backends.
    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<BuildEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Token that cancels this build.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Build configuration.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run on a background thread.
    pub fn spawn(mut self, mut project: ModProject) -> BuildHandle {
        let (tx, rx) = mpsc::channel();
        self.events = Some(tx);
        let cancel = self.cancel.clone();
        let join = std::thread::spawn(move || {
            let result = self.run(&mut project);
            (project, result)
        });
        BuildHandle {
            events: rx,
            cancel,
            join,
        }
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn enter(&self, stage: BuildStage) {
        tracing::info!(stage = %stage, "build stage");
        self.emit(BuildEvent::Stage(stage));
    }

    fn finish(&self, result: BuildResult) -> BuildResult {
        match &result.status {
            BuildStatus::Succeeded | BuildStatus::PartiallySucceeded { .. } => {
                tracing::info!(status = %result.status, items = result.items.len(), "build done")
            }
            _ => tracing::warn!(status = %result.status, "build did not produce a tree"),
        }
        self.enter(result.stage);
        self.emit(BuildEvent::Finished(result.status.clone()));
        result
    }

    /// Run the build to completion on the calling thread, updating each track's status.
    #[tracing::instrument(skip_all, fields(mod_id = %project.mod_id))]
    pub fn run(mut self, project: &mut ModProject) -> BuildResult {
        self.enter(BuildStage::Idle);
        for t in &mut project.tracks {
            t.status = TrackStatus::Pending;
        }

        self.enter(BuildStage::Validating);
        let pool = match self
            .config
            .validate()
            .and_then(|()| project.validate())
            .and_then(|()| build_thread_pool(self.config.effective_threads()))
        {
            Ok(pool) => pool,
            Err(e) => return self.finish(BuildResult::aborted(BuildStatus::Failed(e.to_string()))),
        };
        if self.cancel.is_cancelled() {
            return self.finish(BuildResult::aborted(BuildStatus::Cancelled));
        }

        let converter = self
            .converter
            .take()
            .unwrap_or_else(|| Converter::with_opts(&self.config.backend_opts()));
        let cache = match ConversionCache::open(
            &self.config.cache_dir,
            converter,
            self.config.fingerprint_mode,
        ) {
            Ok(cache) => cache,
            Err(e) => return self.finish(BuildResult::aborted(BuildStatus::Failed(e.to_string()))),
        };

        self.enter(BuildStage::Converting);
        if self.config.force
            && let Err(e) = cache.invalidate_all()
        {
            return self.finish(BuildResult::aborted(BuildStatus::Failed(e.to_string())));
        }
        let tracks = pool.install(|| self.convert_tracks(project, &cache));
        for outcome in &tracks {
            project.tracks[outcome.index].status = match &outcome.result {
                Ok(a) if a.cached => TrackStatus::Cached,
                Ok(_) => TrackStatus::Converted,
                Err(reason) => TrackStatus::Failed(reason.clone()),
            };
        }
        if self.cancel.is_cancelled() {
            return self.finish(BuildResult {
                tracks,
                ..BuildResult::aborted(BuildStatus::Cancelled)
            });
        }

        self.enter(BuildStage::Compositing);
        let (covers, composited) = pool.install(|| self.composite_covers(project));
        if self.cancel.is_cancelled() {
            return self.finish(BuildResult {
                tracks,
                covers,
                ..BuildResult::aborted(BuildStatus::Cancelled)
            });
        }

        self.enter(BuildStage::Generating);
        let mut ready = ReadyOutputs::new();
        for t in tracks.iter().filter(|t| t.result.is_ok()) {
            ready.mark_audio(t.index);
        }
        for c in covers.iter().filter(|c| c.result.is_ok()) {
            if let CoverTarget::Track { index, variant, .. } = &c.target {
                ready.mark_cover(*index, *variant);
            }
        }
        let defs = generate(project, &ready);
        for s in &defs.skipped {
            tracing::warn!(item = %s.item, reason = %s.reason, "item left out of definitions");
        }

        if self.cancel.is_cancelled() {
            return self.finish(BuildResult {
                tracks,
                covers,
                skipped: defs.skipped,
                ..BuildResult::aborted(BuildStatus::Cancelled)
            });
        }

        self.enter(BuildStage::Assembling);
        let tree = self.config.tree_dir(&project.mod_id);
        let assembled = self.assemble(project, &defs, &tracks, &composited);
        let mut result = BuildResult {
            status: BuildStatus::Succeeded,
            stage: BuildStage::Done,
            tracks,
            covers,
            items: defs.items,
            skipped: defs.skipped,
            tree: None,
            tree_ready: false,
        };
        match assembled {
            Ok(()) => {
                result.tree = Some(tree);
                result.tree_ready = true;
                let failed = result.failure_count();
                if failed > 0 {
                    result.status = BuildStatus::PartiallySucceeded { failed };
                }
            }
            Err(e) => {
                result.status = BuildStatus::Failed(format!("assembly: {e}"));
                result.stage = BuildStage::Failed;
            }
        }
        self.finish(result)
    }

    fn convert_tracks(&self, project: &ModProject, cache: &ConversionCache) -> Vec<TrackOutcome> {
        let layout = ModLayout::new(project.mod_id.clone());
        project
            .audio_track_indices()
            .into_par_iter()
            .map(|index| {
                let track = &project.tracks[index];
                let result = if self.cancel.is_cancelled() {
                    Err("cancelled".to_string())
                } else {
                    let source = project.resolve_path(&track.source);
                    cache
                        .get_or_convert_cancellable(
                            &source,
                            TargetFormat::OggVorbis,
                            self.config.policy,
                            false,
                            Some(&self.cancel),
                        )
                        .map(|audio| TrackAudio {
                            output: layout.sound_file(&track.item_key()),
                            cache_path: audio.path,
                            backend: audio.backend,
                            cached: audio.hit,
                        })
                        .map_err(|e| e.to_string())
                };
                if let Err(reason) = &result {
                    tracing::warn!(track = %track.id, %reason, "track conversion failed");
                }
                let outcome = TrackOutcome {
                    index,
                    track_id: track.id.clone(),
                    result,
                };
                self.emit(BuildEvent::TrackConverted(outcome.clone()));
                outcome
            })
            .collect()
    }

    fn composite_covers(&self, project: &ModProject) -> (Vec<CoverOutcome>, Composited) {
        let layout = ModLayout::new(project.mod_id.clone());
        let compositor = Compositor::new(self.config.masks_dir());
        let uses_default = project
            .tracks
            .iter()
            .any(|t| !t.outputs.is_empty() && t.cover.source == CoverSource::Default);
        let pool = if uses_default {
            DefaultCoverPool::scan(self.config.covers_dir()).map_err(|e| e.to_string())
        } else {
            Ok(DefaultCoverPool::from_images(self.config.covers_dir(), Vec::new()))
        };

        let indices: Vec<usize> = (0..project.tracks.len())
            .filter(|&i| !project.tracks[i].outputs.is_empty())
            .collect();
        let per_track: Vec<Vec<(CoverOutcome, Option<TrackCovers>)>> = indices
            .into_par_iter()
            .map(|index| self.composite_track(project, index, &compositor, &pool, &layout))
            .collect();

        let mut outcomes = Vec::new();
        let mut textures = HashMap::new();
        for (outcome, covers) in per_track.into_iter().flatten() {
            if let (CoverTarget::Track { index, variant, .. }, Some(covers)) =
                (&outcome.target, covers)
            {
                textures.insert((*index, *variant), covers);
            }
            outcomes.push(outcome);
        }

        let poster = match self.render_poster(project) {
            Ok(Some(images)) => {
                let outcome = CoverOutcome {
                    target: CoverTarget::Poster,
                    result: Ok(layout.poster_files()[0].clone()),
                };
                self.emit(BuildEvent::CoverComposited(outcome.clone()));
                outcomes.push(outcome);
                Some(images)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "poster rendering failed");
                let outcome = CoverOutcome {
                    target: CoverTarget::Poster,
                    result: Err(e.to_string()),
                };
                self.emit(BuildEvent::CoverComposited(outcome.clone()));
                outcomes.push(outcome);
                None
            }
        };

        (outcomes, Composited { textures, poster })
    }

    fn composite_track(
        &self,
        project: &ModProject,
        index: usize,
        compositor: &Compositor,
        pool: &Result<DefaultCoverPool, String>,
        layout: &ModLayout,
    ) -> Vec<(CoverOutcome, Option<TrackCovers>)> {
        let track = &project.tracks[index];
        let key = track.item_key();
        let variants: Vec<MaskVariant> = track
            .outputs
            .iter()
            .flat_map(|k| k.mask_variants().iter().copied())
            .collect();

        let base: Result<RgbaImage, String> = if self.cancel.is_cancelled() {
            Err("cancelled".to_string())
        } else {
            self.resolve_base(project, index, pool)
                .and_then(|path| load_base(&path))
                .map_err(|e| e.to_string())
        };

        variants
            .into_iter()
            .map(|variant| {
                let rendered = match &base {
                    Ok(base) => render_track_cover(compositor, base, variant, track.cover.tier)
                        .map_err(|e| e.to_string()),
                    Err(reason) => Err(reason.clone()),
                };
                if let Err(reason) = &rendered {
                    tracing::warn!(track = %track.id, %variant, %reason, "cover compositing failed");
                }
                let outcome = CoverOutcome {
                    target: CoverTarget::Track {
                        index,
                        track_id: track.id.clone(),
                        variant,
                    },
                    result: rendered
                        .as_ref()
                        .map(|_| layout.world_texture(variant, &key))
                        .map_err(Clone::clone),
                };
                self.emit(BuildEvent::CoverComposited(outcome.clone()));
                (outcome, rendered.ok())
            })
            .collect()
    }

    fn resolve_base(
        &self,
        project: &ModProject,
        index: usize,
        pool: &Result<DefaultCoverPool, String>,
    ) -> MoozicResult<PathBuf> {
        let track = &project.tracks[index];
        match &track.cover.source {
            CoverSource::Override(path) => Ok(project.resolve_path(path)),
            CoverSource::Default => {
                let pool = pool.as_ref().map_err(|e| MoozicError::Other(anyhow::anyhow!("{e}")))?;
                pool.select(&track.item_key(), self.config.cover_selection)
                    .map(Path::to_path_buf)
            }
        }
    }

    fn render_poster(&self, project: &ModProject) -> MoozicResult<Option<WorkshopImages>> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        match &project.poster {
            Some(p) => render_workshop_images(&project.resolve_path(p)).map(Some),
            None => {
                let fallback = self.config.default_poster();
                if !fallback.is_file() {
                    tracing::warn!(path = %fallback.display(), "no poster image; skipping workshop images");
                    return Ok(None);
                }
                render_workshop_images(&fallback).map(Some)
            }
        }
    }

    fn assemble(
        &self,
        project: &ModProject,
        defs: &Definitions,
        tracks: &[TrackOutcome],
        composited: &Composited,
    ) -> MoozicResult<()> {
        let staging = self.config.staging_dir(&project.mod_id);
        let tree = self.config.tree_dir(&project.mod_id);
        ensure_dir(&self.config.output_dir)?;
        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| MoozicError::io(&staging, e))?;
        }

        let res = write_tree(
            &staging,
            &self.config,
            project,
            defs,
            tracks,
            composited,
        )
        .and_then(|()| swap_in(&staging, &tree, &self.config.retired_dir(&project.mod_id)));
        if res.is_err() {
            let _ = std::fs::remove_dir_all(&staging);
        }
        res
    }
}

/// Replace `tree` with `staging`. The previous tree is moved aside first and only
/// deleted once the new one is in place; if the swap fails it is moved back.
fn swap_in(staging: &Path, tree: &Path, retired: &Path) -> MoozicResult<()> {
    if retired.exists() {
        std::fs::remove_dir_all(retired).map_err(|e| MoozicError::io(retired, e))?;
    }
    let had_old = tree.exists();
    if had_old {
        std::fs::rename(tree, retired).map_err(|e| MoozicError::io(tree, e))?;
    }
    if let Err(e) = std::fs::rename(staging, tree) {
        if had_old && let Err(restore) = std::fs::rename(retired, tree) {
            tracing::error!(path = %retired.display(), error = %restore, "could not restore previous tree");
        }
        return Err(MoozicError::io(tree, e));
    }
    if had_old && let Err(e) = std::fs::remove_dir_all(retired) {
        tracing::warn!(path = %retired.display(), error = %e, "previous tree left behind");
    }
    Ok(())
}

fn render_track_cover(
    compositor: &Compositor,
    base: &RgbaImage,
    variant: MaskVariant,
    tier: ResolutionTier,
) -> MoozicResult<TrackCovers> {
    let world = compositor.composite_image(base, variant, ResolutionTier::Standard)?;
    let icon = compositor.icon(base, variant, &world)?;
    let high_res = match tier {
        ResolutionTier::Standard => None,
        ResolutionTier::HighRes => {
            Some(compositor.composite_image(base, variant, ResolutionTier::HighRes)?)
        }
    };
    Ok(TrackCovers {
        world,
        icon,
        high_res,
    })
}

fn write_tree(
    staging: &Path,
    config: &BuildConfig,
    project: &ModProject,
    defs: &Definitions,
    tracks: &[TrackOutcome],
    composited: &Composited,
) -> MoozicResult<()> {
    let layout = ModLayout::new(project.mod_id.clone());
    let mut tree = StagedTree {
        root: staging,
        written: Vec::new(),
    };

    for f in &defs.files {
        tree.put(f.path.clone(), f.contents.as_bytes())?;
    }

    for &index in &defs.audio {
        let audio = tracks
            .iter()
            .find(|t| t.index == index)
            .and_then(|t| t.result.as_ref().ok())
            .ok_or_else(|| {
                MoozicError::Other(anyhow::anyhow!(
                    "definitions reference audio of track {index} that was not converted"
                ))
            })?;
        let bytes =
            std::fs::read(&audio.cache_path).map_err(|e| MoozicError::io(&audio.cache_path, e))?;
        tree.put(audio.output.clone(), &bytes)?;
    }

    for &(index, variant) in &defs.textures {
        let covers = composited.textures.get(&(index, variant)).ok_or_else(|| {
            MoozicError::Other(anyhow::anyhow!(
                "definitions reference {variant} cover of track {index} that was not composited"
            ))
        })?;
        let key = project.tracks[index].item_key();
        tree.put(layout.world_texture(variant, &key), &covers.world.encode_png()?)?;
        tree.put(layout.icon_texture(variant, &key), &covers.icon.encode_png()?)?;
        if let Some(hr) = &covers.high_res {
            tree.put(layout.hr_texture(variant, &key), &hr.encode_png()?)?;
        }
    }

    if let Some(images) = &composited.poster {
        let poster = images.poster.encode_png()?;
        for rel in layout.poster_files() {
            tree.put(rel, &poster)?;
        }
        tree.put(layout.preview_png(), &images.preview.encode_png()?)?;
    }

    for mesh in &defs.meshes {
        let src = config.models_dir().join(format!("{mesh}.fbx"));
        match std::fs::read(&src) {
            Ok(bytes) => tree.put(layout.mesh_file(mesh), &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %src.display(), "mesh asset missing; models using it will not load");
            }
            Err(e) => return Err(MoozicError::io(&src, e)),
        }
    }

    let icon_src = config.default_icon();
    match std::fs::read(&icon_src) {
        Ok(icon) => {
            for rel in layout.icon_files() {
                tree.put(rel, &icon)?;
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %icon_src.display(), "no mod icon; skipping icon.png");
        }
        Err(e) => return Err(MoozicError::io(&icon_src, e)),
    }

    let manifest = render_manifest(&project.mod_id, &tree.written)?;
    tree.put(layout.manifest(), manifest.as_bytes())
}

struct StagedTree<'a> {
    root: &'a Path,
    written: Vec<PathBuf>,
}

impl StagedTree<'_> {
    fn put(&mut self, rel: PathBuf, bytes: &[u8]) -> MoozicResult<()> {
        let dest = self.root.join(&rel);
        ensure_parent_dir(&dest)?;
        std::fs::write(&dest, bytes).map_err(|e| MoozicError::io(&dest, e))?;
        self.written.push(rel);
        Ok(())
    }
}

fn build_thread_pool(threads: usize) -> MoozicResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(MoozicError::validation(
            "build 'threads' must be >= 1 when set",
        ));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("moozic-worker-{i}"))
        .build()
        .map_err(|e| MoozicError::Other(anyhow::anyhow!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/build/orchestrator.rs"]
mod tests;
