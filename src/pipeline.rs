//! One render pass: audio, timing and frames for every scene of a job.
//!
//! Scene types are processed in track order (intro, conversation, ending).
//! For each type the frames are rendered on a bounded worker pool, then the
//! scenes are synthesized one at a time and joined into a single track whose
//! audio and timing file are written side by side. Finally every timing
//! entry's `image_filename` is checked against the frames that were written.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::audio::AudioError;
use crate::config::{ConfigError, EngineConfig};
use crate::export::{self, ExportError};
use crate::layout::{FrameField, LayoutEngine, LayoutError, StyleDescriptor, TextRasterizer};
use crate::naming::{FrameKey, OutputLayout};
use crate::scene::{Scene, SceneType};
use crate::synthesis::{CallStats, Orchestrator};
use crate::timeline::{TimelineBuilder, TimelineError, Track};
use crate::SynthesisEngine;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("Failed to start render workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid job file: {0}")]
    Job(#[from] serde_json::Error),
    #[error("Render pass cancelled")]
    Cancelled,
}

/// Where a frame field takes its text from.
///
/// On the wire: `"sequence"`, `"native"`, `{"learner": 0}` (zero-based),
/// `"fullText"` or `{"literal": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldSource {
    Sequence,
    Native,
    Learner(usize),
    FullText,
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub source: FieldSource,
    pub style: StyleDescriptor,
}

/// The fields of one screen, resolved against each scene of a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTemplate {
    pub screen: u32,
    pub fields: Vec<TemplateField>,
}

impl FrameTemplate {
    /// Fill the template from `scene`. Fields whose source the scene does
    /// not have are left out.
    pub fn fields_for(&self, scene: &Scene) -> Vec<FrameField> {
        self.fields
            .iter()
            .filter_map(|field| {
                let text = match &field.source {
                    FieldSource::Sequence => scene.sequence().to_string(),
                    FieldSource::Native => scene.native_text().to_string(),
                    FieldSource::Learner(i) => scene.learner_text(*i)?.to_string(),
                    FieldSource::FullText => scene.full_text(),
                    FieldSource::Literal(text) => text.clone(),
                };
                Some(FrameField::new(text, field.style.clone()))
            })
            .collect()
    }
}

/// Frame templates per scene type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameTemplates {
    pub intro: Vec<FrameTemplate>,
    pub conversation: Vec<FrameTemplate>,
    pub ending: Vec<FrameTemplate>,
}

impl FrameTemplates {
    pub fn for_type(&self, scene_type: SceneType) -> &[FrameTemplate] {
        match scene_type {
            SceneType::Intro => &self.intro,
            SceneType::Conversation => &self.conversation,
            SceneType::Ending => &self.ending,
        }
    }
}

/// Everything one render pass needs besides configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub project: String,
    pub identifier: String,
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub frames: FrameTemplates,
}

impl RenderJob {
    pub fn from_json_file(path: &std::path::Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneSummary {
    pub scene_id: String,
    pub scene_type: SceneType,
    pub sequence: u32,
    pub attempted: usize,
    pub succeeded: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub output_dir: PathBuf,
    /// Every file written, in write order
    pub artifacts: Vec<PathBuf>,
    pub scenes: Vec<SceneSummary>,
    pub stats: CallStats,
    /// Scene and frame failures
    pub failures: Vec<String>,
    /// Timing entries naming a frame that was not rendered
    pub naming_mismatches: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.naming_mismatches.is_empty()
    }
}

/// Synthesis engine, font backend and configuration for render passes.
pub struct Pipeline<E, R> {
    config: EngineConfig,
    engine: E,
    backend: R,
    cancel: Option<Arc<AtomicBool>>,
}

impl<E, R> Pipeline<E, R>
where
    E: SynthesisEngine,
    R: TextRasterizer + Sync,
{
    pub fn new(config: EngineConfig, engine: E, backend: R) -> Self {
        Self {
            config,
            engine,
            backend,
            cancel: None,
        }
    }

    /// Checked between utterances; a set flag ends the pass with
    /// [`PipelineError::Cancelled`].
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn run(&mut self, job: &RenderJob) -> Result<RunReport, PipelineError> {
        let Self {
            config,
            engine,
            backend,
            cancel,
        } = self;
        let paths = OutputLayout::new(&config.output_root, &job.project, &job.identifier);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .build()?;
        let layout = LayoutEngine::new(&config.layout, &*backend);
        let mut orchestrator = Orchestrator::new(engine, config.retry);
        let mut timeline =
            TimelineBuilder::new(paths.identifier(), &config.timeline, &config.voices);
        if let Some(flag) = cancel {
            timeline = timeline.with_cancel(Arc::clone(flag));
        }

        log::info!(
            "Rendering {} scenes for {}/{} into {}",
            job.scenes.len(),
            job.project,
            job.identifier,
            paths.root().display()
        );
        let mut report = RunReport {
            output_dir: paths.root().to_path_buf(),
            ..RunReport::default()
        };

        for scene_type in SceneType::TRACK_ORDER {
            let mut scenes: Vec<&Scene> = job
                .scenes
                .iter()
                .filter(|scene| scene.scene_type() == scene_type)
                .collect();
            if scenes.is_empty() {
                continue;
            }
            scenes.sort_by_key(|scene| scene.sequence());

            let templates = job.frames.for_type(scene_type);
            let rendered = render_frames(
                &pool,
                &layout,
                &paths,
                scene_type,
                &scenes,
                templates,
                &mut report,
            );

            let mut track = Track::new(scene_type);
            for scene in &scenes {
                match timeline.build_scene(&mut orchestrator, scene) {
                    Ok(built) => {
                        let mut summary = SceneSummary {
                            scene_id: built.scene_id.clone(),
                            scene_type,
                            sequence: built.sequence,
                            attempted: built.attempted,
                            succeeded: built.succeeded,
                        };
                        if let Err(err) = track.push_scene(built) {
                            summary.succeeded = 0;
                            report
                                .failures
                                .push(format!("Scene {} ({scene_type}): {err}", scene.id()));
                        }
                        report.scenes.push(summary);
                    }
                    Err(TimelineError::Cancelled { scene_id }) => {
                        log::warn!("Render pass cancelled during scene {scene_id}");
                        return Err(PipelineError::Cancelled);
                    }
                    Err(err @ TimelineError::NoSegments { attempted, .. }) => {
                        report.scenes.push(SceneSummary {
                            scene_id: scene.id().to_string(),
                            scene_type,
                            sequence: scene.sequence(),
                            attempted,
                            succeeded: 0,
                        });
                        report.failures.push(err.to_string());
                    }
                }
            }

            if track.is_empty() {
                log::error!("No audio for {scene_type}: every scene failed");
                continue;
            }
            if !templates.is_empty() {
                check_frame_names(&track, &rendered, &mut report);
            }
            write_track(&paths, &track, &mut report)?;
        }

        report.stats = *orchestrator.stats();
        log::info!(
            "Render pass finished: {} artifacts, {} failures, {}/{} synthesis calls succeeded",
            report.artifacts.len(),
            report.failures.len(),
            report.stats.succeeded,
            report.stats.attempted
        );
        Ok(report)
    }
}

/// Render every template for every scene on `pool`, returning the names of
/// the frames written.
fn render_frames<R: TextRasterizer + Sync + ?Sized>(
    pool: &rayon::ThreadPool,
    layout: &LayoutEngine<'_, R>,
    paths: &OutputLayout,
    scene_type: SceneType,
    scenes: &[&Scene],
    templates: &[FrameTemplate],
    report: &mut RunReport,
) -> HashSet<String> {
    let dir = paths.frames_dir(scene_type);
    let jobs: Vec<(&Scene, &FrameTemplate)> = scenes
        .iter()
        .flat_map(|scene| templates.iter().map(move |template| (*scene, template)))
        .collect();

    let results: Vec<(String, Result<PathBuf, LayoutError>)> = pool.install(|| {
        jobs.par_iter()
            .map(|(scene, template)| {
                let key = FrameKey {
                    identifier: paths.identifier(),
                    scene_type,
                    sequence: scene.sequence(),
                    screen: template.screen,
                };
                let fields = template.fields_for(scene);
                (key.filename(), layout.render_to_file(&key, &fields, &dir))
            })
            .collect()
    });

    let mut rendered = HashSet::new();
    for (name, result) in results {
        match result {
            Ok(path) => {
                report.artifacts.push(path);
                rendered.insert(name);
            }
            Err(err) => {
                log::error!("Frame {name} failed: {err}");
                report.failures.push(format!("Frame {name}: {err}"));
            }
        }
    }
    rendered
}

fn check_frame_names(track: &Track, rendered: &HashSet<String>, report: &mut RunReport) {
    for entry in &track.entries {
        if !rendered.contains(&entry.image_filename) {
            log::warn!(
                "Timing entry for {} {} names frame {}, which was not rendered",
                entry.scene_id,
                entry.speaker,
                entry.image_filename
            );
            report.naming_mismatches.push(entry.image_filename.clone());
        }
    }
}

fn write_track(
    paths: &OutputLayout,
    track: &Track,
    report: &mut RunReport,
) -> Result<(), PipelineError> {
    let audio_path = paths.audio_file(track.scene_type);
    if let Some(parent) = audio_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    track.audio.finish()?.write_wav(&audio_path)?;
    log::info!(
        "Wrote {} track ({:.3}s) to {}",
        track.scene_type,
        track.duration_secs,
        audio_path.display()
    );
    report.artifacts.push(audio_path);

    let timing_path = paths.timing_file(track.scene_type);
    export::write_timing_file(&timing_path, &track.entries)?;
    report.artifacts.push(timing_path);
    Ok(())
}
