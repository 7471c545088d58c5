use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{anyhow, Result};
use rubato::{FftFixedIn, Resampler};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::debug;

const RESAMPLE_CHUNK: usize = 1024;

fn conv<T>(samples: &mut Vec<f32>, data: Cow<AudioBuffer<T>>)
where
    T: Sample,
    f32: FromSample<T>,
{
    samples.extend(data.chan(0).iter().map(|v| f32::from_sample(*v)));
}

// Taken from https://github.com/huggingface/candle/blob/main/candle-examples/src/audio.rs
/// Decodes the first audio track of a file into mono f32 samples, keeping only the first channel.
/// Returns the samples together with the track sample rate.
pub fn pcm_decode(path: &Path) -> Result<(Vec<f32>, u32)> {
    let src = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("no supported audio track found"))?;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("audio track has no sample rate"))?;

    let mut pcm_data = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        };
        while !format.metadata().is_latest() {
            format.metadata().pop();
        }
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                debug!("skipping undecodable packet: {err}");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        match decoded {
            AudioBufferRef::F32(buf) => pcm_data.extend(buf.chan(0)),
            AudioBufferRef::U8(data) => conv(&mut pcm_data, data),
            AudioBufferRef::U16(data) => conv(&mut pcm_data, data),
            AudioBufferRef::U24(data) => conv(&mut pcm_data, data),
            AudioBufferRef::U32(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S8(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S16(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S24(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S32(data) => conv(&mut pcm_data, data),
            AudioBufferRef::F64(data) => conv(&mut pcm_data, data),
        }
    }
    debug!("decoded {} samples at {sample_rate} Hz", pcm_data.len());
    Ok((pcm_data, sample_rate))
}

/// Converts mono samples to `to_rate`. The resampler delay is trimmed so the output lines up
/// with the input.
pub fn resample(pcm: Vec<f32>, from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || pcm.is_empty() {
        return Ok(pcm);
    }

    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 1, 1)?;
    let expected_len = pcm.len() * to_rate as usize / from_rate as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected_len + delay + resampler.output_frames_max());

    let mut pos = 0;
    while pcm.len() - pos >= resampler.input_frames_next() {
        let next = resampler.input_frames_next();
        let chunk = resampler.process(&[&pcm[pos..pos + next]], None)?;
        output.extend_from_slice(&chunk[0]);
        pos += next;
    }
    if pos < pcm.len() {
        let tail: [&[f32]; 1] = [&pcm[pos..]];
        let chunk = resampler.process_partial(Some(&tail[..]), None)?;
        output.extend_from_slice(&chunk[0]);
    }
    let flushed = resampler.process_partial(None::<&[&[f32]]>, None)?;
    output.extend_from_slice(&flushed[0]);

    output.drain(..delay.min(output.len()));
    output.truncate(expected_len);
    Ok(output)
}
