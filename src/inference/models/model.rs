use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModelBase {
    /// The name of the model
    pub name: String,

    /// The id of the model repository
    pub repo_id: String,

    /// The revision of the model repository
    pub repo_revision: String,

    /// The model configuration file inside the repository
    pub config_file: String,

    /// The tokenizer file inside the repository
    pub tokenizer_file: String,

    /// The quantized GGUF weights inside the repository
    pub weights_file: String,

    /// The little endian f32 mel filterbank inside the repository
    pub mel_filters_file: String,
}
