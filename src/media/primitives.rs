//! Atomic ffmpeg operations. Every function builds its argument vector
//! through a pure `*_args` builder (unit-testable without ffmpeg) and hands
//! it to the shared [`FfmpegRunner`].

use std::path::Path;

use super::error::MediaError;
use super::runner::FfmpegRunner;

pub const SAMPLE_RATE: u32 = 44100;

/// ffmpeg's atempo filter only accepts a bounded per-stage ratio; anything
/// beyond the band has to be decomposed into a chain of stages.
pub const ATEMPO_STAGE_MIN: f64 = 0.5;
pub const ATEMPO_STAGE_MAX: f64 = 2.0;

/// Effective ratio band that keeps stretched speech from sounding warped.
pub const GENTLE_RATIO_MIN: f64 = 0.85;
pub const GENTLE_RATIO_MAX: f64 = 1.15;

const MUX_AUDIO_BITRATE: &str = "192k";

fn arg_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn extract_audio_args(video: &Path, out: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        arg_path(video),
        "-vn".into(),
        "-map".into(),
        "0:a:0".into(),
        "-ac".into(),
        "2".into(),
        "-ar".into(),
        SAMPLE_RATE.to_string(),
        "-c:a".into(),
        "pcm_s16le".into(),
        arg_path(out),
    ]
}

/// Background-track extraction: 44100 Hz stereo lossless PCM.
pub fn extract_audio(
    runner: &dyn FfmpegRunner,
    video: &Path,
    out: &Path,
) -> Result<(), MediaError> {
    runner.run(&extract_audio_args(video, out))
}

pub fn convert_to_wav_args(input: &Path, out: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        arg_path(input),
        "-vn".into(),
        "-ac".into(),
        "1".into(),
        "-ar".into(),
        SAMPLE_RATE.to_string(),
        "-c:a".into(),
        "pcm_s16le".into(),
        arg_path(out),
    ]
}

pub fn convert_to_wav(
    runner: &dyn FfmpegRunner,
    input: &Path,
    out: &Path,
) -> Result<(), MediaError> {
    runner.run(&convert_to_wav_args(input, out))
}

/// Decompose an overall tempo ratio into atempo stages that each stay
/// within [0.5, 2.0]. The product of the stages equals the requested ratio.
pub fn atempo_stages(ratio: f64) -> Vec<f64> {
    let mut stages = Vec::new();
    let mut remaining = ratio;
    while remaining > ATEMPO_STAGE_MAX {
        stages.push(ATEMPO_STAGE_MAX);
        remaining /= ATEMPO_STAGE_MAX;
    }
    while remaining < ATEMPO_STAGE_MIN {
        stages.push(ATEMPO_STAGE_MIN);
        remaining /= ATEMPO_STAGE_MIN;
    }
    stages.push(remaining);
    stages
}

pub fn atempo_filter(ratio: f64) -> String {
    atempo_stages(ratio)
        .iter()
        .map(|stage| format!("atempo={stage:.6}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn time_stretch_args(input: &Path, out: &Path, ratio: f64) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        arg_path(input),
        "-filter:a".into(),
        atempo_filter(ratio),
        "-ar".into(),
        SAMPLE_RATE.to_string(),
        "-c:a".into(),
        "pcm_s16le".into(),
        arg_path(out),
    ]
}

/// `ratio` is current/target: above 1.0 speeds up (shorter), below slows
/// down (longer).
pub fn time_stretch(
    runner: &dyn FfmpegRunner,
    input: &Path,
    out: &Path,
    ratio: f64,
) -> Result<(), MediaError> {
    runner.run(&time_stretch_args(input, out, ratio))
}

pub fn generate_silence_args(out: &Path, duration: f64) -> Vec<String> {
    vec![
        "-y".into(),
        "-f".into(),
        "lavfi".into(),
        "-i".into(),
        format!("anullsrc=r={SAMPLE_RATE}:cl=mono"),
        "-t".into(),
        format!("{duration:.3}"),
        "-c:a".into(),
        "pcm_s16le".into(),
        arg_path(out),
    ]
}

pub fn generate_silence(
    runner: &dyn FfmpegRunner,
    out: &Path,
    duration: f64,
) -> Result<(), MediaError> {
    runner.run(&generate_silence_args(out, duration))
}

pub fn concat_filter(input_count: usize) -> String {
    let inputs = (0..input_count)
        .map(|i| format!("[{i}:a]"))
        .collect::<String>();
    format!("{inputs}concat=n={input_count}:v=0:a=1[outa]")
}

pub fn concatenate_args(inputs: &[&Path], out: &Path) -> Vec<String> {
    let mut args = vec!["-y".to_string()];
    for input in inputs {
        args.push("-i".into());
        args.push(arg_path(input));
    }
    args.extend([
        "-filter_complex".into(),
        concat_filter(inputs.len()),
        "-map".into(),
        "[outa]".into(),
        "-c:a".into(),
        "pcm_s16le".into(),
        arg_path(out),
    ]);
    args
}

/// Ordered join, constant sample format.
pub fn concatenate(
    runner: &dyn FfmpegRunner,
    inputs: &[&Path],
    out: &Path,
) -> Result<(), MediaError> {
    runner.run(&concatenate_args(inputs, out))
}

/// Where a clip's tail fade has to start so it finishes at the clip's end.
pub fn fade_out_start(clip_duration: f64, fade_duration: f64) -> f64 {
    (clip_duration - fade_duration).max(0.0)
}

/// Fade-out on every clip but the last, fade-in on every clip but the
/// first, then concat. Fade offsets come from each clip's measured
/// duration so boundaries stay click-free.
pub fn concat_with_fades_filter(durations: &[f64], fade_duration: f64) -> String {
    let count = durations.len();
    let mut filters = Vec::with_capacity(count + 1);
    for (i, duration) in durations.iter().enumerate() {
        let mut chain = Vec::new();
        if i > 0 {
            chain.push(format!("afade=t=in:st=0:d={fade_duration:.3}"));
        }
        if i + 1 < count {
            chain.push(format!(
                "afade=t=out:st={:.3}:d={fade_duration:.3}",
                fade_out_start(*duration, fade_duration)
            ));
        }
        if chain.is_empty() {
            chain.push("anull".to_string());
        }
        filters.push(format!("[{i}:a]{}[f{i}]", chain.join(",")));
    }
    let inputs = (0..count).map(|i| format!("[f{i}]")).collect::<String>();
    filters.push(format!("{inputs}concat=n={count}:v=0:a=1[outa]"));
    filters.join(";")
}

pub fn concatenate_with_fades_args(
    inputs: &[&Path],
    durations: &[f64],
    fade_duration: f64,
    out: &Path,
) -> Vec<String> {
    let mut args = vec!["-y".to_string()];
    for input in inputs {
        args.push("-i".into());
        args.push(arg_path(input));
    }
    args.extend([
        "-filter_complex".into(),
        concat_with_fades_filter(durations, fade_duration),
        "-map".into(),
        "[outa]".into(),
        "-c:a".into(),
        "pcm_s16le".into(),
        arg_path(out),
    ]);
    args
}

pub fn extract_segment_args(input: &Path, out: &Path, start: f64, duration: f64) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        arg_path(input),
        "-ss".into(),
        format!("{start:.3}"),
        "-t".into(),
        format!("{duration:.3}"),
        "-ac".into(),
        "1".into(),
        "-ar".into(),
        SAMPLE_RATE.to_string(),
        "-c:a".into(),
        "pcm_s16le".into(),
        arg_path(out),
    ]
}

pub fn extract_segment(
    runner: &dyn FfmpegRunner,
    input: &Path,
    out: &Path,
    start: f64,
    duration: f64,
) -> Result<(), MediaError> {
    runner.run(&extract_segment_args(input, out, start, duration))
}

pub fn hard_trim_args(input: &Path, out: &Path, max_duration: f64) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        arg_path(input),
        "-t".into(),
        format!("{max_duration:.3}"),
        "-c".into(),
        "copy".into(),
        arg_path(out),
    ]
}

/// Unconditional stream-copy truncation. No resampling, so this is the
/// last-resort exact-duration guarantee.
pub fn hard_trim(
    runner: &dyn FfmpegRunner,
    input: &Path,
    out: &Path,
    max_duration: f64,
) -> Result<(), MediaError> {
    runner.run(&hard_trim_args(input, out, max_duration))
}

pub fn mux_args(video: &Path, audio: &Path, out: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        arg_path(video),
        "-i".into(),
        arg_path(audio),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        MUX_AUDIO_BITRATE.into(),
        arg_path(out),
    ]
}

/// Replace the video's audio track. The video stream is copied bit-for-bit;
/// the new audio determines the container duration.
pub fn mux(
    runner: &dyn FfmpegRunner,
    video: &Path,
    audio: &Path,
    out: &Path,
) -> Result<(), MediaError> {
    runner.run(&mux_args(video, audio, out))
}

pub fn duck_gain(duck_level_db: f64) -> f64 {
    10f64.powf(duck_level_db / 20.0)
}

/// `between(t,a,b)` union over all speech windows; the volume filter only
/// attenuates while the expression is non-zero.
pub fn duck_enable_expr(windows: &[(f64, f64)]) -> String {
    windows
        .iter()
        .map(|(start, end)| format!("between(t,{start:.3},{end:.3})"))
        .collect::<Vec<_>>()
        .join("+")
}

pub fn duck_and_mix_filter(windows: &[(f64, f64)], duck_level_db: f64) -> String {
    format!(
        "[0:a]aformat=channel_layouts=stereo,volume=volume={gain:.6}:enable='{expr}'[bg];\
         [1:a]aformat=channel_layouts=stereo[fg];\
         [bg][fg]amix=inputs=2:duration=longest:normalize=0[outa]",
        gain = duck_gain(duck_level_db),
        expr = duck_enable_expr(windows),
    )
}

pub fn duck_and_mix_args(
    original: &Path,
    voice: &Path,
    windows: &[(f64, f64)],
    duck_level_db: f64,
    out: &Path,
) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        arg_path(original),
        "-i".into(),
        arg_path(voice),
        "-filter_complex".into(),
        duck_and_mix_filter(windows, duck_level_db),
        "-map".into(),
        "[outa]".into(),
        "-ar".into(),
        SAMPLE_RATE.to_string(),
        "-c:a".into(),
        "pcm_s16le".into(),
        arg_path(out),
    ]
}

/// Attenuate the original only inside speech windows, then mix the new
/// voice on top at unity. Output runs as long as the longer input.
pub fn duck_and_mix(
    runner: &dyn FfmpegRunner,
    original: &Path,
    voice: &Path,
    windows: &[(f64, f64)],
    duck_level_db: f64,
    out: &Path,
) -> Result<(), MediaError> {
    runner.run(&duck_and_mix_args(
        original,
        voice,
        windows,
        duck_level_db,
        out,
    ))
}
