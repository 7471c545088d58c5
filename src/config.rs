use anyhow::Result;
use clap_serde_derive::ClapSerde;

use crate::inference::models::model::ModelBase;

#[derive(ClapSerde, Debug)]
pub struct Config {
    /// The address the listener binds to
    #[default("0.0.0.0".to_string())]
    #[arg(short, long, env)]
    pub(crate) address: String,

    /// The port the listener binds to
    #[default(8000)]
    #[arg(short, long, env)]
    pub(crate) port: u16,

    /// Language hint passed to the model when a request does not provide one
    #[default("en".to_string())]
    #[arg(long, env)]
    pub(crate) default_language: String,

    /// Hugging Face repository holding the Whisper weights
    #[default("lmz/candle-whisper".to_string())]
    #[arg(long, env)]
    pub(crate) model_repo_id: String,

    /// Revision of the Whisper repository
    #[default("main".to_string())]
    #[arg(long, env)]
    pub(crate) model_repo_revision: String,

    #[default("config-tiny.json".to_string())]
    #[arg(long, env)]
    pub(crate) model_config_file: String,

    #[default("tokenizer-tiny.json".to_string())]
    #[arg(long, env)]
    pub(crate) model_tokenizer_file: String,

    #[default("model-tiny-q4k.gguf".to_string())]
    #[arg(long, env)]
    pub(crate) model_weights_file: String,

    #[default("melfilters.bytes".to_string())]
    #[arg(long, env)]
    pub(crate) model_mel_filters_file: String,

    /// OTLP collector endpoint, telemetry export is disabled when empty
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) otlp_endpoint: String,

    /// Also log to the console while exporting telemetry
    #[default(false)]
    #[arg(long, env)]
    pub(crate) console: bool,

    /// PEM certificate, HTTPS is served when both certificate and key are set
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) tls_cert_file: String,

    /// PEM private key matching `tls_cert_file`
    #[default(String::new())]
    #[arg(long, env)]
    pub(crate) tls_key_file: String,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<Self> {
        let str = std::fs::read_to_string(path)?;
        let opt: <Config as ClapSerde>::Opt = toml::from_str(&str)?;
        Ok(Config::from(opt))
    }

    pub fn otlp_endpoint(&self) -> Option<&str> {
        non_empty(&self.otlp_endpoint)
    }

    pub fn tls_files(&self) -> Option<(&str, &str)> {
        non_empty(&self.tls_cert_file).zip(non_empty(&self.tls_key_file))
    }

    pub fn model_base(&self) -> ModelBase {
        ModelBase {
            name: "Candle Whisper".into(),
            repo_id: self.model_repo_id.clone(),
            repo_revision: self.model_repo_revision.clone(),
            config_file: self.model_config_file.clone(),
            tokenizer_file: self.model_tokenizer_file.clone(),
            weights_file: self.model_weights_file.clone(),
            mel_filters_file: self.model_mel_filters_file.clone(),
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
