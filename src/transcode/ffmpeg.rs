//! Audio encoding by shelling out to the `ffmpeg` command-line tool.
//!
//! Install ffmpeg:
//! - Windows: download from https://ffmpeg.org/download.html
//! - macOS: `brew install ffmpeg`
//! - Linux: `apt install ffmpeg` or equivalent

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{EncodeError, Encoder};
use crate::config::EncoderConfig;
use crate::model::Bitrate;

/// Encoder backed by an ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
    timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &EncoderConfig) -> Self {
        Self::new(&config.program, Duration::from_secs(config.timeout_secs))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for one encode. Output format is forced because the
    /// output path carries a `.part` extension. An embedded picture is
    /// carried over as the MP3's attached picture.
    fn encode_args(input: &Path, output: &Path, bitrate: Bitrate) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-loglevel", "error", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(input.as_os_str().to_owned());
        let bitrate = bitrate.as_arg();
        for arg in [
            "-map",
            "0:a",
            "-map",
            "0:v?",
            "-c:v",
            "copy",
            "-disposition:v",
            "attached_pic",
            "-map_metadata",
            "0",
            "-b:a",
            bitrate.as_str(),
            "-f",
            "mp3",
        ] {
            args.push(OsString::from(arg));
        }
        args.push(output.as_os_str().to_owned());
        args
    }

    fn spawn_error(&self, e: std::io::Error) -> EncodeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            EncodeError::NotFound(self.program.clone())
        } else {
            EncodeError::Spawn(e)
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::from_config(&EncoderConfig::default())
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn version(&self) -> Result<String, EncodeError> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(EncodeError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        bitrate: Bitrate,
    ) -> Result<(), EncodeError> {
        let child = Command::new(&self.program)
            .args(Self::encode_args(input, output, bitrate))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        // Dropping the future on timeout kills the process
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| EncodeError::Timeout(self.timeout))?
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::Exit {
                status: output.status.to_string(),
                stderr: stderr.trim().chars().take(300).collect(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_args() {
        let args = FfmpegEncoder::encode_args(
            Path::new("/in/song.flac"),
            Path::new("/out/song_low.mp3.part"),
            Bitrate::from_kbps(64).unwrap(),
        );
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-i") + 1], "/in/song.flac");
        assert_eq!(args[pos("-b:a") + 1], "64k");
        assert_eq!(args[pos("-map_metadata") + 1], "0");
        assert_eq!(args[pos("-f") + 1], "mp3");
        assert!(args.contains(&"-y".to_string()));
        assert!(!args.contains(&"-vn".to_string()));
        assert!(args.contains(&"0:v?".to_string()));
        assert_eq!(args[pos("-disposition:v") + 1], "attached_pic");
        assert_eq!(args.last().unwrap(), "/out/song_low.mp3.part");
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let encoder = FfmpegEncoder::new("definitely-not-an-encoder-binary", Duration::from_secs(5));
        let result = encoder.version().await;
        assert!(matches!(result, Err(EncodeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_encode_with_missing_program_fails() {
        let encoder = FfmpegEncoder::new("definitely-not-an-encoder-binary", Duration::from_secs(5));
        let bitrate = Bitrate::from_kbps(128).unwrap();
        let result = encoder
            .encode(Path::new("in.mp3"), Path::new("out.mp3"), bitrate)
            .await;
        assert!(result.is_err());
    }

    /// Stand-in encoder: sleeps on 64k encodes, otherwise writes its last
    /// argument.
    #[cfg(unix)]
    fn slow_low_tier_script(dir: &Path) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("slow-encoder.sh");
        std::fs::write(
            &path,
            "#!/bin/sh\ncase \"$*\" in *\" 64k \"*) sleep 5 ;; esac\nfor last; do :; done\nprintf encoded > \"$last\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encode_timeout_fails_only_that_tier() {
        use crate::model::{SourceFile, Stage};
        use crate::test_utils::{default_variants, write_source};
        use crate::transcode::Transcoder;
        use std::sync::Arc;
        use tokio_util::sync::CancellationToken;

        let dir = tempfile::tempdir().unwrap();
        let script = slow_low_tier_script(dir.path());
        let source: SourceFile = write_source(&dir.path().join("in"), "song.flac");
        let encoder = FfmpegEncoder::new(script.to_string_lossy(), Duration::from_millis(300));
        let transcoder = Transcoder::new(Arc::new(encoder), default_variants(), dir.path().join("out"));

        let results = transcoder
            .transcode(&source, &CancellationToken::new())
            .await;

        let low = results[0].1.as_ref().unwrap_err();
        assert_eq!(low.stage, Stage::Transcode);
        assert!(low.message.contains("timed out"));
        assert!(!dir.path().join("out").join("song_low.mp3").exists());

        let medium = results[1].1.as_ref().unwrap();
        assert_eq!(std::fs::read(&medium.path).unwrap(), b"encoded");
    }
}
