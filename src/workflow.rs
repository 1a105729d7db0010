use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::audio::PcmAudio;
use crate::config::Config;
use crate::error::{DubError, Result};
use crate::media::{MediaProcessor, MediaProcessorFactory};
use crate::segment::segment_sentences_with_gap;
use crate::speech::{RateFittingSynthesizer, Speaker, SpeakerFactory};
use crate::state::RunState;
use crate::stitch::TimelineStitcher;
use crate::transcribe::{Transcriber, TranscriberFactory};
use crate::transcript::{self, Sentence};
use crate::translate::{Translator, TranslatorFactory};

/// Explicit per-run context: every path and language the pipeline touches,
/// passed through the orchestrator and its lanes instead of process-wide
/// state.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub video_path: PathBuf,
    pub output_dir: PathBuf,
    pub video_stem: String,
    pub source_lang: String,
    pub target_langs: Vec<String>,
}

impl RunContext {
    pub fn new(
        video_path: PathBuf,
        output_dir: Option<PathBuf>,
        source_lang: String,
        target_langs: Vec<String>,
    ) -> Result<Self> {
        let video_stem = video_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| DubError::Config("Invalid video filename".to_string()))?;

        let output_dir = output_dir.unwrap_or_else(|| {
            video_path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(format!("{}_dub", video_stem))
        });

        Ok(Self {
            video_path,
            output_dir,
            video_stem,
            source_lang,
            target_langs,
        })
    }

    pub fn audio_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.wav", self.video_stem))
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.output_dir.join("transcript.json")
    }

    pub fn sentences_path(&self) -> PathBuf {
        self.output_dir.join("sentences.json")
    }

    pub fn state_path(&self) -> PathBuf {
        self.output_dir.join("state.json")
    }

    pub fn clips_dir(&self, language: &str) -> PathBuf {
        self.output_dir.join("audio").join(language)
    }

    pub fn clip_path(&self, language: &str, index: usize) -> PathBuf {
        self.clips_dir(language).join(clip_file_name(index))
    }

    pub fn dubbed_dir(&self) -> PathBuf {
        self.output_dir.join("dubbed")
    }

    pub fn dubbed_path(&self, language: &str) -> PathBuf {
        self.dubbed_dir()
            .join(format!("{}_{}.mp4", self.video_stem, language))
    }
}

/// Clip files are named by zero-padded sentence index so lexical and numeric
/// sort agree.
pub fn clip_file_name(index: usize) -> String {
    format!("{:04}.wav", index)
}

/// Outcome of one dubbing run across all requested languages.
#[derive(Debug, Default)]
pub struct DubSummary {
    pub completed: Vec<(String, PathBuf)>,
    pub failed: Vec<(String, String)>,
}

/// Drives the dubbing pipeline end-to-end: audio extraction, transcription,
/// segmentation, then one concurrent lane per target language for
/// translation, synthesis, and stitching. Every stage transition is recorded
/// in a durable state record, so an interrupted run resumes where it left
/// off.
pub struct Workflow {
    config: Config,
    transcriber: Arc<dyn Transcriber>,
    translator: Arc<dyn Translator>,
    synthesizer: Arc<RateFittingSynthesizer>,
    media: Arc<dyn MediaProcessor>,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let transcriber: Arc<dyn Transcriber> =
            Arc::from(TranscriberFactory::create_transcriber(config.transcribe.clone()));
        let translator: Arc<dyn Translator> =
            Arc::from(TranslatorFactory::create_translator(config.translate.clone()));
        let speaker = SpeakerFactory::create_speaker(config.speech.clone());
        let synthesizer = Arc::new(RateFittingSynthesizer::new(
            speaker,
            config.speech.speaking_rate_bounds,
        ));
        let media: Arc<dyn MediaProcessor> =
            Arc::from(MediaProcessorFactory::create_processor(config.media.clone()));

        media.check_availability()?;

        Ok(Self {
            config,
            transcriber,
            translator,
            synthesizer,
            media,
        })
    }

    /// Construct a workflow around explicit collaborator implementations.
    pub fn with_collaborators(
        config: Config,
        transcriber: Box<dyn Transcriber>,
        translator: Box<dyn Translator>,
        speaker: Box<dyn Speaker>,
        media: Box<dyn MediaProcessor>,
    ) -> Self {
        let bounds = config.speech.speaking_rate_bounds;
        Self {
            config,
            transcriber: Arc::from(transcriber),
            translator: Arc::from(translator),
            synthesizer: Arc::new(RateFittingSynthesizer::new(speaker, bounds)),
            media: Arc::from(media),
        }
    }

    /// Dub a single video into every target language of the context.
    pub async fn dub(&self, ctx: &RunContext) -> Result<DubSummary> {
        if !ctx.video_path.exists() {
            return Err(DubError::FileNotFound(ctx.video_path.display().to_string()));
        }

        info!(
            "Dubbing {} ({} -> {:?})",
            ctx.video_path.display(),
            ctx.source_lang,
            ctx.target_langs
        );

        fs::create_dir_all(&ctx.output_dir).await?;

        let state_path = ctx.state_path();
        let mut state = RunState::load_or_create(
            &state_path,
            &ctx.video_path.to_string_lossy(),
            &ctx.source_lang,
        )
        .await?;

        self.ensure_audio(ctx, &mut state).await?;
        self.ensure_transcript(ctx, &mut state).await?;
        self.ensure_sentences(ctx, &mut state).await?;

        let sentences = transcript::load_sentences(ctx.sentences_path()).await?;
        info!(
            "{} sentences across {} target language(s)",
            sentences.len(),
            ctx.target_langs.len()
        );

        let state = Arc::new(Mutex::new(state));
        let store = Arc::new(SentenceStore {
            path: ctx.sentences_path(),
            sentences: Mutex::new(sentences),
        });

        let mut lanes = JoinSet::new();
        for lang in &ctx.target_langs {
            let lane = LaneRunner {
                lang: lang.clone(),
                ctx: ctx.clone(),
                config: self.config.clone(),
                translator: self.translator.clone(),
                synthesizer: self.synthesizer.clone(),
                media: self.media.clone(),
                store: store.clone(),
                state: state.clone(),
            };
            lanes.spawn(async move {
                let lang = lane.lang.clone();
                let result = lane.run().await;
                (lang, result)
            });
        }

        let mut summary = DubSummary::default();
        while let Some(joined) = lanes.join_next().await {
            match joined {
                Ok((lang, Ok(path))) => {
                    info!("[{}] dubbed video ready: {}", lang, path.display());
                    summary.completed.push((lang, path));
                }
                Ok((lang, Err(e))) => {
                    error!("[{}] dubbing failed: {}", lang, e);
                    summary.failed.push((lang, e.to_string()));
                }
                Err(e) => {
                    error!("Dubbing lane panicked: {}", e);
                }
            }
        }

        summary.completed.sort_by(|a, b| a.0.cmp(&b.0));
        summary.failed.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(summary)
    }

    /// Dub every video file found under `input_dir`.
    pub async fn dub_directory(
        &self,
        input_dir: &Path,
        source_lang: &str,
        target_langs: &[String],
        output_dir: Option<&Path>,
    ) -> Result<()> {
        if !input_dir.is_dir() {
            return Err(DubError::Config("Input path is not a directory".to_string()));
        }

        let video_extensions = ["mp4", "avi", "mov", "mkv", "webm"];
        let mut video_files = Vec::new();

        for entry in WalkDir::new(input_dir).into_iter().filter_map(|e| e.ok()) {
            if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
                if video_extensions.contains(&ext.to_lowercase().as_str()) {
                    video_files.push(entry.path().to_path_buf());
                }
            }
        }

        info!("Found {} video files to dub", video_files.len());

        for video_path in video_files {
            let stem = video_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let per_video_output = output_dir.map(|dir| dir.join(&stem));

            let ctx = RunContext::new(
                video_path.clone(),
                per_video_output,
                source_lang.to_string(),
                target_langs.to_vec(),
            )?;

            match self.dub(&ctx).await {
                Ok(summary) if summary.failed.is_empty() => {
                    info!("Finished {}", video_path.display())
                }
                Ok(summary) => warn!(
                    "Finished {} with failed languages: {:?}",
                    video_path.display(),
                    summary.failed
                ),
                Err(e) => warn!("Failed to dub {}: {}", video_path.display(), e),
            }
        }

        Ok(())
    }

    /// Extract a video's audio track to a WAV file.
    pub async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        self.media.extract_audio(video_path, audio_path).await
    }

    /// Transcribe an audio file and write the raw word-level results.
    pub async fn transcribe_to_file(
        &self,
        audio_path: &Path,
        output_path: &Path,
        language: &str,
    ) -> Result<()> {
        let results = self
            .transcribe_with_retry(audio_path.to_path_buf(), language.to_string())
            .await?;
        transcript::save_transcript(&results, output_path).await?;
        info!(
            "Wrote {} transcription result(s) to {}",
            results.len(),
            output_path.display()
        );
        Ok(())
    }

    /// Segment a transcript artifact into sentences.
    pub async fn segment_to_file(
        &self,
        transcript_path: &Path,
        output_path: &Path,
        source_lang: &str,
    ) -> Result<()> {
        let results = transcript::load_transcript(transcript_path).await?;
        let sentences = segment_sentences_with_gap(
            &results,
            source_lang,
            self.config.pipeline.sentence_gap_secs,
        )?;
        transcript::save_sentences(&sentences, output_path).await?;
        info!(
            "Segmented {} result(s) into {} sentence(s)",
            results.len(),
            sentences.len()
        );
        Ok(())
    }

    /// Synthesize duration-fitted clips for one language of a sentence
    /// artifact, writing one WAV file per sentence index.
    pub async fn synthesize_to_dir(
        &self,
        sentences_path: &Path,
        language: &str,
        clips_dir: &Path,
    ) -> Result<()> {
        let sentences = transcript::load_sentences(sentences_path).await?;
        fs::create_dir_all(clips_dir).await?;

        let pipeline = &self.config.pipeline;
        let voice = self.config.speech.voices.get(language).cloned();
        let progress = ProgressBar::new(sentences.len() as u64);

        for (index, sentence) in sentences.iter().enumerate() {
            let text = sentence.text_for(language).ok_or_else(|| {
                DubError::Synthesis(format!(
                    "Sentence {} has no {} translation",
                    index, language
                ))
            })?;

            let fitted = with_retry("Synthesis", pipeline.max_retries, pipeline.retry_backoff_ms, || {
                let synthesizer = self.synthesizer.clone();
                let text = text.to_string();
                let language = language.to_string();
                let voice = voice.clone();
                let target_duration = sentence.duration_secs();
                async move {
                    synthesizer
                        .fit(&text, &language, target_duration, voice.as_deref())
                        .await
                }
            })
            .await?;

            let clip_path = clips_dir.join(clip_file_name(index));
            let tmp_path = clip_path.with_extension("wav.tmp");
            fs::write(&tmp_path, &fitted.audio).await?;
            fs::rename(&tmp_path, &clip_path).await?;
            progress.inc(1);
        }

        progress.finish_and_clear();
        info!(
            "Synthesized {} clip(s) into {}",
            sentences.len(),
            clips_dir.display()
        );
        Ok(())
    }

    /// Stitch previously synthesized clips onto a video for one language.
    pub async fn stitch_artifacts(
        &self,
        video_path: &Path,
        sentences_path: &Path,
        clips_dir: &Path,
        language: &str,
        output_path: &Path,
    ) -> Result<PathBuf> {
        let sentences = transcript::load_sentences(sentences_path).await?;
        info!(
            "[{}] stitching {} sentence(s) onto {}",
            language,
            sentences.len(),
            video_path.display()
        );

        let staging = tempfile::tempdir()?;
        let audio_path = staging.path().join("source.wav");
        self.media.extract_audio(video_path, &audio_path).await?;

        let clips = load_clips(clips_dir, sentences.len()).await?;
        let stitcher =
            TimelineStitcher::new(self.media.clone(), self.config.media.overlay_gain_db);
        stitcher
            .stitch(&sentences, &clips, &audio_path, video_path, output_path)
            .await
    }

    async fn ensure_audio(&self, ctx: &RunContext, state: &mut RunState) -> Result<()> {
        let audio_path = ctx.audio_path();
        if state.audio_extracted && audio_path.exists() {
            info!("Audio already extracted, skipping");
            return Ok(());
        }

        self.media.extract_audio(&ctx.video_path, &audio_path).await?;
        state.audio_extracted = true;
        state.save(&ctx.state_path()).await
    }

    async fn ensure_transcript(&self, ctx: &RunContext, state: &mut RunState) -> Result<()> {
        let transcript_path = ctx.transcript_path();
        if state.transcribed && transcript_path.exists() {
            info!("Transcript artifact present, skipping transcription");
            return Ok(());
        }

        let results = self
            .transcribe_with_retry(ctx.audio_path(), ctx.source_lang.clone())
            .await?;
        transcript::save_transcript(&results, &transcript_path).await?;
        state.transcribed = true;
        state.save(&ctx.state_path()).await
    }

    async fn ensure_sentences(&self, ctx: &RunContext, state: &mut RunState) -> Result<()> {
        let sentences_path = ctx.sentences_path();
        if state.segmented && sentences_path.exists() {
            info!("Sentence artifact present, skipping segmentation");
            return Ok(());
        }

        let results = transcript::load_transcript(ctx.transcript_path()).await?;
        let sentences = segment_sentences_with_gap(
            &results,
            &ctx.source_lang,
            self.config.pipeline.sentence_gap_secs,
        )?;
        info!("Segmented transcript into {} sentence(s)", sentences.len());
        transcript::save_sentences(&sentences, &sentences_path).await?;
        state.segmented = true;
        state.save(&ctx.state_path()).await
    }

    async fn transcribe_with_retry(
        &self,
        audio_path: PathBuf,
        language: String,
    ) -> Result<Vec<transcript::TranscriptResult>> {
        let pipeline = &self.config.pipeline;
        let transcriber = self.transcriber.clone();
        with_retry(
            "Transcription",
            pipeline.max_retries,
            pipeline.retry_backoff_ms,
            || {
                let transcriber = transcriber.clone();
                let audio_path = audio_path.clone();
                let language = language.clone();
                async move { transcriber.transcribe(&audio_path, &language).await }
            },
        )
        .await
    }
}

/// The sentence list shared by all lanes. Each lane writes only its own
/// language key, but merges happen under one lock so concurrent lanes never
/// race on the shared artifact.
struct SentenceStore {
    path: PathBuf,
    sentences: Mutex<Vec<Sentence>>,
}

impl SentenceStore {
    async fn snapshot(&self) -> Vec<Sentence> {
        self.sentences.lock().await.clone()
    }

    async fn merge_language(
        &self,
        language: &str,
        translations: Vec<(usize, String)>,
    ) -> Result<()> {
        let mut sentences = self.sentences.lock().await;
        for (index, text) in translations {
            if let Some(sentence) = sentences.get_mut(index) {
                sentence.text.insert(language.to_string(), text);
            }
        }
        transcript::save_sentences(&sentences, &self.path).await
    }
}

/// One per-language processing lane: translation, synthesis, stitching.
struct LaneRunner {
    lang: String,
    ctx: RunContext,
    config: Config,
    translator: Arc<dyn Translator>,
    synthesizer: Arc<RateFittingSynthesizer>,
    media: Arc<dyn MediaProcessor>,
    store: Arc<SentenceStore>,
    state: Arc<Mutex<RunState>>,
}

impl LaneRunner {
    async fn run(&self) -> Result<PathBuf> {
        self.translate_stage().await?;
        self.synthesize_stage().await?;
        self.stitch_stage().await
    }

    async fn stage_done(&self, mark: impl FnOnce(&mut crate::state::LaneState)) -> Result<()> {
        let mut state = self.state.lock().await;
        mark(state.lane_mut(&self.lang));
        state.save(&self.ctx.state_path()).await
    }

    async fn translate_stage(&self) -> Result<()> {
        if self.state.lock().await.lane(&self.lang).translated {
            info!("[{}] translation already complete, skipping", self.lang);
            return Ok(());
        }

        let snapshot = self.store.snapshot().await;
        info!("[{}] translating {} sentence(s)", self.lang, snapshot.len());

        let pipeline = &self.config.pipeline;
        let jobs = snapshot.into_iter().enumerate().map(|(index, sentence)| {
            let source_text = sentence
                .text_for(&self.ctx.source_lang)
                .map(str::to_string);
            let translator = self.translator.clone();
            let target = self.lang.clone();
            let source = self.ctx.source_lang.clone();
            let max_retries = pipeline.max_retries;
            let backoff_ms = pipeline.retry_backoff_ms;

            async move {
                let text = source_text.ok_or_else(|| {
                    DubError::Translation(format!("Sentence {} has no source text", index))
                })?;
                let translated = with_retry("Translation", max_retries, backoff_ms, || {
                    let translator = translator.clone();
                    let text = text.clone();
                    let target = target.clone();
                    let source = source.clone();
                    async move { translator.translate(&text, &target, &source).await }
                })
                .await?;
                Ok::<(usize, String), DubError>((index, translated))
            }
        });

        let mut translations = stream::iter(jobs)
            .buffer_unordered(pipeline.sentence_concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        // Results arrive in completion order; restore sentence order before
        // the merge so the artifact stays deterministic.
        translations.sort_by_key(|(index, _)| *index);
        self.store.merge_language(&self.lang, translations).await?;

        self.stage_done(|lane| lane.translated = true).await
    }

    async fn synthesize_stage(&self) -> Result<()> {
        if self.state.lock().await.lane(&self.lang).synthesized {
            info!("[{}] synthesis already complete, skipping", self.lang);
            return Ok(());
        }

        let snapshot = self.store.snapshot().await;
        fs::create_dir_all(self.ctx.clips_dir(&self.lang)).await?;

        info!("[{}] synthesizing {} clip(s)", self.lang, snapshot.len());
        let progress = ProgressBar::new(snapshot.len() as u64);

        let pipeline = &self.config.pipeline;
        let voice = self.config.speech.voices.get(&self.lang).cloned();
        let jobs = snapshot.into_iter().enumerate().map(|(index, sentence)| {
            let text = sentence.text_for(&self.lang).map(str::to_string);
            let target_duration = sentence.duration_secs();
            let clip_path = self.ctx.clip_path(&self.lang, index);
            let synthesizer = self.synthesizer.clone();
            let language = self.lang.clone();
            let voice = voice.clone();
            let max_retries = pipeline.max_retries;
            let backoff_ms = pipeline.retry_backoff_ms;
            let progress = progress.clone();

            async move {
                // Clips are written atomically, so an existing file is a
                // finished clip from an earlier, interrupted run.
                if clip_path.exists() {
                    progress.inc(1);
                    return Ok(());
                }

                let text = text.ok_or_else(|| {
                    DubError::Synthesis(format!(
                        "Sentence {} has no {} translation",
                        index, language
                    ))
                })?;

                let fitted = with_retry("Synthesis", max_retries, backoff_ms, || {
                    let synthesizer = synthesizer.clone();
                    let text = text.clone();
                    let language = language.clone();
                    let voice = voice.clone();
                    async move {
                        synthesizer
                            .fit(&text, &language, target_duration, voice.as_deref())
                            .await
                    }
                })
                .await?;

                let tmp_path = clip_path.with_extension("wav.tmp");
                fs::write(&tmp_path, &fitted.audio).await?;
                fs::rename(&tmp_path, &clip_path).await?;

                progress.inc(1);
                Ok::<(), DubError>(())
            }
        });

        let results = stream::iter(jobs)
            .buffer_unordered(pipeline.sentence_concurrency)
            .collect::<Vec<_>>()
            .await;
        progress.finish_and_clear();

        results.into_iter().collect::<Result<Vec<_>>>()?;

        self.stage_done(|lane| lane.synthesized = true).await
    }

    async fn stitch_stage(&self) -> Result<PathBuf> {
        let output_path = self.ctx.dubbed_path(&self.lang);
        if self.state.lock().await.lane(&self.lang).stitched && output_path.exists() {
            info!("[{}] dubbed video already present, skipping", self.lang);
            return Ok(output_path);
        }

        let snapshot = self.store.snapshot().await;
        fs::create_dir_all(self.ctx.dubbed_dir()).await?;

        let clips = load_clips(&self.ctx.clips_dir(&self.lang), snapshot.len()).await?;
        let stitcher =
            TimelineStitcher::new(self.media.clone(), self.config.media.overlay_gain_db);
        let written = stitcher
            .stitch(
                &snapshot,
                &clips,
                &self.ctx.audio_path(),
                &self.ctx.video_path,
                &output_path,
            )
            .await?;

        self.stage_done(|lane| lane.stitched = true).await?;
        Ok(written)
    }
}

/// Load the clip files present in a directory. Missing indices are left out;
/// the stitcher reports the first gap as a fatal missing clip.
async fn load_clips(clips_dir: &Path, sentence_count: usize) -> Result<BTreeMap<usize, PcmAudio>> {
    let mut clips = BTreeMap::new();
    for index in 0..sentence_count {
        let path = clips_dir.join(clip_file_name(index));
        if !path.exists() {
            continue;
        }
        let bytes = fs::read(&path).await?;
        clips.insert(index, PcmAudio::from_wav_bytes(&bytes)?);
    }
    Ok(clips)
}

/// Retry an operation with bounded exponential backoff. Collaborator calls
/// are externally rate-limited and fail transiently, so every network
/// operation in the pipeline goes through here.
pub(crate) async fn with_retry<T, F, Fut>(
    description: &str,
    max_retries: u32,
    backoff_ms: u64,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries => {
                let delay_ms = backoff_ms.saturating_mul(1u64 << attempt.min(16));
                warn!(
                    "{} failed (attempt {} of {}): {}; retrying in {}ms",
                    description,
                    attempt + 1,
                    max_retries + 1,
                    e,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
