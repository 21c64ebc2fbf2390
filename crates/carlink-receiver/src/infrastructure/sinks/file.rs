//! File-backed sinks.
//!
//! The receiver does not decode anything itself.  [`FileSinkFactory`] writes
//! the H.264 elementary stream and the PCM stream to two paths, which may be
//! plain files (for capture) or named pipes read by an external player such
//! as `ffplay -f h264 carlink-video.h264`.
//!
//! Each opened session truncates and reopens both paths.  Every write is
//! flushed straight through so a pipe reader sees frames without delay.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use carlink_core::SessionParams;
use tracing::{debug, info, warn};

use crate::application::error::SinkError;
use crate::application::sinks::{AudioSink, SinkFactory, SinkSet, VideoSink};

/// Creates a [`FileSink`] pair per session.
#[derive(Debug, Clone)]
pub struct FileSinkFactory {
    video_path: PathBuf,
    audio_path: PathBuf,
}

impl FileSinkFactory {
    pub fn new(video_path: impl Into<PathBuf>, audio_path: impl Into<PathBuf>) -> Self {
        Self {
            video_path: video_path.into(),
            audio_path: audio_path.into(),
        }
    }
}

impl SinkFactory for FileSinkFactory {
    fn create(&self, params: &SessionParams) -> Result<SinkSet, SinkError> {
        let video = FileSink::create(&self.video_path, "video")?;
        let audio = FileSink::create(&self.audio_path, "audio")?;
        info!(
            video = %self.video_path.display(),
            audio = %self.audio_path.display(),
            width = params.width,
            height = params.height,
            fps = params.video_frame_rate,
            "sinks opened"
        );
        Ok(SinkSet::new(Box::new(video), Box::new(audio)))
    }
}

/// Writes raw stream bytes to one path.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    kind: &'static str,
    file: Option<File>,
    written: u64,
}

impl FileSink {
    /// Creates (or truncates) `path`.
    pub fn create(path: &Path, kind: &'static str) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            kind,
            file: Some(file),
            written: 0,
        })
    }

    /// Total bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let file = self.file.as_mut().ok_or(SinkError::Stopped)?;
        file.write_all(data)?;
        file.flush()?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                warn!(kind = self.kind, path = %self.path.display(), error = %e, "sink flush failed");
            }
            debug!(kind = self.kind, bytes = self.written, "sink stopped");
        }
    }
}

impl VideoSink for FileSink {
    fn send(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.write(data)
    }

    fn stop(&mut self) {
        self.finish();
    }
}

impl AudioSink for FileSink {
    fn send(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.write(data)
    }

    fn stop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("carlink-{}-{name}", Uuid::new_v4()))
    }

    #[test]
    fn test_factory_writes_video_and_audio_to_their_paths() {
        // Arrange
        let video_path = temp_path("video.h264");
        let audio_path = temp_path("audio.pcm");
        let factory = FileSinkFactory::new(&video_path, &audio_path);

        // Act
        let mut sinks = factory.create(&SessionParams::default()).unwrap();
        sinks.video.send(&[0, 0, 0, 1, 0x67]).unwrap();
        sinks.video.send(&[0x68]).unwrap();
        sinks.audio.send(&[1, 2, 3, 4]).unwrap();
        sinks.stop();

        // Assert
        assert_eq!(std::fs::read(&video_path).unwrap(), vec![0, 0, 0, 1, 0x67, 0x68]);
        assert_eq!(std::fs::read(&audio_path).unwrap(), vec![1, 2, 3, 4]);

        let _ = std::fs::remove_file(video_path);
        let _ = std::fs::remove_file(audio_path);
    }

    #[test]
    fn test_send_after_stop_fails() {
        // Arrange
        let path = temp_path("stopped.h264");
        let mut sink = FileSink::create(&path, "video").unwrap();
        VideoSink::stop(&mut sink);

        // Act
        let result = VideoSink::send(&mut sink, &[1]);

        // Assert
        assert!(matches!(result, Err(SinkError::Stopped)));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_new_session_truncates_previous_output() {
        // Arrange
        let path = temp_path("truncate.pcm");
        let mut first = FileSink::create(&path, "audio").unwrap();
        AudioSink::send(&mut first, &[9; 16]).unwrap();
        AudioSink::stop(&mut first);

        // Act
        let mut second = FileSink::create(&path, "audio").unwrap();
        AudioSink::send(&mut second, &[7]).unwrap();
        AudioSink::stop(&mut second);

        // Assert
        assert_eq!(std::fs::read(&path).unwrap(), vec![7]);
        assert_eq!(second.written(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_create_in_missing_directory_fails_with_io() {
        let path = temp_path("missing-dir").join("video.h264");
        assert!(matches!(
            FileSink::create(&path, "video"),
            Err(SinkError::Io(_))
        ));
    }
}
