// Integration tests for audio input: file decoding, file replay and segment encoding
//
// Fixtures are written to a temp dir with hound, so no binary files are checked in.

use anyhow::Result;
use scribe_capture::audio::{
    encode_wav, AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioSource,
    BackendAudioSource, InputDevice, SilenceBackend, StreamFormat,
};
use scribe_capture::CaptureError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_wav(dir: &Path, name: &str, sample_rate: u32, channels: u16, seconds: f64) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec)?;
    let frames = (sample_rate as f64 * seconds) as usize;
    for i in 0..frames {
        let value = ((i as f64 * 0.05).sin() * 8000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }
    writer.finalize()?;

    Ok(path)
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "meeting.wav", 16000, 1, 2.0)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 32000);
    assert!((audio.duration_seconds - 2.0).abs() < 1e-6);
    assert!(audio.path.contains("meeting.wav"));

    Ok(())
}

#[test]
fn test_audio_file_interleaved_channels() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "stereo.wav", 44100, 2, 0.5)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len() % 2, 0);
    assert!((audio.duration_seconds - 0.5).abs() < 1e-3);
    // Both channels carry the same signal
    assert_eq!(audio.samples[200], audio.samples[201]);

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");
    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_audio_file_rejects_garbage() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("notes.wav");
    std::fs::write(&path, b"definitely not audio")?;

    assert!(AudioFile::open(&path).is_err());

    Ok(())
}

#[test]
fn test_segment_is_a_standalone_wav() -> Result<()> {
    let samples: Vec<i16> = (0..8000).map(|i| (i % 512) as i16).collect();
    let segment = encode_wav(
        &samples,
        StreamFormat {
            sample_rate: 16000,
            channels: 1,
        },
    )?;

    let dir = TempDir::new()?;
    let path = dir.path().join("chunk_0.wav");
    std::fs::write(&path, &segment.payload)?;
    let decoded = AudioFile::open(&path)?;

    assert_eq!(decoded.samples, samples);
    assert_eq!(segment.sample_count, 8000);
    assert!((segment.duration.as_secs_f64() - 0.5).abs() < 1e-9);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_file_backend_replays_in_frames() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "replay.wav", 16000, 1, 1.0)?;

    let mut backend = AudioBackendFactory::create(InputDevice::File(path), AudioBackendConfig::default())?;
    let mut rx = backend.start().await?;
    assert!(backend.is_capturing());

    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }

    assert_eq!(frames.len(), 10);
    assert!(frames.iter().all(|f| f.samples.len() == 1600 && f.sample_rate == 16000));
    assert_eq!(frames[9].timestamp_ms, 900);

    backend.stop().await?;
    assert!(!backend.is_capturing());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_silence_backend_frames() -> Result<()> {
    let mut backend = SilenceBackend::new(AudioBackendConfig::default());
    let mut rx = backend.start().await?;

    let frame = rx.recv().await.expect("silence frame");
    assert_eq!(frame.samples.len(), 1600);
    assert!(frame.samples.iter().all(|&s| s == 0));

    // A second start on a running backend is refused
    assert!(backend.start().await.is_err());
    backend.stop().await?;

    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_device_unavailable() -> Result<()> {
    let backend = AudioBackendFactory::create(
        InputDevice::File(PathBuf::from("/nonexistent/input.wav")),
        AudioBackendConfig::default(),
    )?;
    let mut source = BackendAudioSource::new(backend, AudioBackendConfig::default());

    let result = source.acquire().await;

    assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    assert!(!source.is_acquired());
    assert!(source.open_encoder().is_err());

    Ok(())
}
