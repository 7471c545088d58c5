use std::path::Path;

use anyhow::{anyhow, Error, Result};
use candle_transformers::models::whisper::SAMPLE_RATE;
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use rand::SeedableRng;

use crate::inference::audio_pipeline::AudioGeneratorPipeline;
use crate::inference::languages::language_code;
use crate::inference::models::model::ModelBase;
use crate::inference::pcm_decode::{pcm_decode, resample};
use crate::inference::task::transcribe::{Transcriber, Transcript};

// Taken from https://github.com/huggingface/candle/blob/main/candle-examples/examples/whisper/main.rs
pub struct WhisperModel {
    generator_pipeline: AudioGeneratorPipeline,
}

impl WhisperModel {
    /// Fetches the weights from the hub, or the local hub cache, and builds the pipeline.
    #[tracing::instrument(level = "info", skip(api))]
    pub fn new(api: Api, base: &ModelBase) -> Result<Self> {
        let repo = api.repo(Repo::with_revision(
            base.repo_id.clone(),
            RepoType::Model,
            base.repo_revision.clone(),
        ));
        let generator_pipeline = AudioGeneratorPipeline::with_gguf_model(
            &repo,
            base,
            rand::rngs::StdRng::from_seed([0; 32]),
        )?;

        Ok(Self { generator_pipeline })
    }

    pub fn load(base: &ModelBase) -> Result<Self> {
        Self::new(Api::new()?, base)
    }
}

impl Transcriber for WhisperModel {
    #[tracing::instrument(level = "info", skip(self))]
    fn transcribe(&self, audio: &Path, language: &str) -> Result<Transcript, Error> {
        let code = language_code(language)
            .ok_or_else(|| anyhow!("language {language} is not supported"))?;
        let (pcm, sample_rate) = pcm_decode(audio)?;
        let pcm = resample(pcm, sample_rate, SAMPLE_RATE as u32)?;
        let text = self
            .generator_pipeline
            .clone()
            .transcribe(&pcm, code)?;

        // The hint is reported back as sent, not as the resolved code.
        Ok(Transcript {
            language: Some(language.to_string()),
            text: Some(text),
        })
    }
}
