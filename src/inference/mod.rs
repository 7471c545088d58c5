pub mod audio_pipeline;
pub mod languages;
pub mod models;
pub mod pcm_decode;
pub mod task;
