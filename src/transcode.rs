//! Audio conversion through ffmpeg.
//!
//! Browser recordings (webm/m4a/ogg) are converted to 44.1kHz mono 16-bit WAV
//! before fingerprinting.

use std::io::{Read, Seek, Write};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{info, warn};
use wait_timeout::ChildExt;

use crate::acrcloud::AudioFormat;
use crate::error::{Error, Result};

pub const FFMPEG: &str = "ffmpeg";
pub const SAMPLE_RATE: &str = "44100";

/// ffmpeg is killed after this long
pub const CONVERSION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Conversion
// ============================================================================

/// Run `command` to completion, killing it after `timeout`.
///
/// stderr goes to a temp file so a chatty child cannot block on a full pipe.
fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<()> {
    let mut stderr = tempfile::tempfile()?;
    let program = command.get_program().to_string_lossy().into_owned();

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(stderr.try_clone()?)
        .spawn()
        .map_err(|e| Error::Transcode(format!("failed to run {}: {}", program, e)))?;

    let Some(status) = child.wait_timeout(timeout)? else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(Error::Transcode(format!(
            "{} timed out after {}s",
            program,
            timeout.as_secs_f64()
        )));
    };

    if !status.success() {
        let mut log = String::new();
        stderr.rewind()?;
        stderr.read_to_string(&mut log).ok();
        let tail: String = log.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
        return Err(Error::Transcode(format!("{} exited with {}: {}", program, status, tail)));
    }
    Ok(())
}

/// Convert `audio` to WAV. Returns the converted bytes.
pub fn to_wav(audio: &[u8], format: AudioFormat) -> Result<Vec<u8>> {
    let mut input = tempfile::Builder::new()
        .suffix(&format!(".{}", format.extension()))
        .tempfile()?;
    input.write_all(audio)?;
    input.flush()?;

    let output = tempfile::Builder::new().suffix(".wav").tempfile()?;

    let mut command = Command::new(FFMPEG);
    command
        .args(["-nostdin", "-y", "-i"])
        .arg(input.path())
        .args(["-ar", SAMPLE_RATE, "-ac", "1", "-acodec", "pcm_s16le"])
        .arg(output.path());
    run_with_timeout(command, CONVERSION_TIMEOUT)?;

    let wav = std::fs::read(output.path())?;
    if wav.is_empty() {
        return Err(Error::Transcode("ffmpeg produced an empty file".into()));
    }
    info!(from = format.extension(), in_bytes = audio.len(), out_bytes = wav.len(), "converted to wav");
    Ok(wav)
}

/// Sniff the sample and convert when the container needs it. Conversion
/// failures fall back to the original bytes.
pub fn prepare_sample(audio: Vec<u8>) -> (Vec<u8>, AudioFormat) {
    let format = AudioFormat::sniff(&audio);
    if !format.needs_conversion() {
        return (audio, format);
    }
    match to_wav(&audio, format) {
        Ok(wav) => (wav, AudioFormat::Wav),
        Err(e) => {
            warn!(error = %e, format = format.extension(), "conversion failed, sending original audio");
            (audio, format)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_sample_passes_wav_through() {
        let wav = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
        let (bytes, format) = prepare_sample(wav.clone());
        assert_eq!(format, AudioFormat::Wav);
        assert_eq!(bytes, wav);
    }

    #[test]
    fn test_prepare_sample_passes_mp3_through() {
        let mp3 = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
        let (bytes, format) = prepare_sample(mp3.clone());
        assert_eq!(format, AudioFormat::Mp3);
        assert_eq!(bytes, mp3);
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_process_is_killed() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let start = std::time::Instant::now();
        let err = run_with_timeout(command, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, Error::Transcode(ref msg) if msg.contains("timed out")), "{}", err);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_process_reports_stderr() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo broken input >&2; exit 3"]);
        let err = run_with_timeout(command, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, Error::Transcode(ref msg) if msg.contains("broken input")), "{}", err);
    }

    #[test]
    fn test_missing_program_is_transcode_error() {
        let command = Command::new("definitely-not-an-installed-binary");
        let err = run_with_timeout(command, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Transcode(_)));
    }

    #[test]
    fn test_garbage_ogg_falls_back_to_original() {
        // Either ffmpeg is missing or it rejects the data; both keep the input
        let junk = b"OggS\x00garbage".to_vec();
        let (bytes, format) = prepare_sample(junk.clone());
        assert_eq!(format, AudioFormat::Ogg);
        assert_eq!(bytes, junk);
    }
}
