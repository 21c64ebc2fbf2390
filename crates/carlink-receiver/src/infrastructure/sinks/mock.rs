//! Recording sinks for tests.
//!
//! [`RecordingSinkFactory`] creates sink sets that append every accepted
//! write and every stop to one shared, ordered log.  Each created set gets a
//! generation number (1, 2, ...) so tests can tell sessions apart.
//!
//! A factory built [`with_keys`](RecordingSinkFactory::with_keys) also stands
//! in for a decoder that reports button presses through
//! [`RecordingSinkFactory::press_key`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use carlink_core::SessionParams;

use carlink_core::KeyCode;

use crate::application::error::SinkError;
use crate::application::key_forwarder::KeyIngress;
use crate::application::sinks::{AudioSink, SinkFactory, SinkSet, VideoSink};

/// One entry in the shared sink log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkRecord {
    Video { generation: usize, data: Vec<u8> },
    Audio { generation: usize, data: Vec<u8> },
    VideoStopped { generation: usize },
    AudioStopped { generation: usize },
}

impl SinkRecord {
    pub fn is_stop(&self) -> bool {
        matches!(
            self,
            SinkRecord::VideoStopped { .. } | SinkRecord::AudioStopped { .. }
        )
    }
}

type Log = Arc<Mutex<Vec<SinkRecord>>>;

/// Factory whose sinks record into a shared log.
#[derive(Default)]
pub struct RecordingSinkFactory {
    log: Log,
    created: AtomicUsize,
    opened_with: Mutex<Vec<SessionParams>>,
    fail_create: AtomicBool,
    fail_video: Arc<AtomicBool>,
    fail_audio: Arc<AtomicBool>,
    keys: Option<KeyIngress>,
}

impl RecordingSinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the sinks report button presses into `keys`.
    pub fn with_keys(mut self, keys: KeyIngress) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Reports a button press as the video decoder would.  Returns `false`
    /// when no session has opened yet, when no key queue is attached, or
    /// when the queue has closed.
    pub fn press_key(&self, code: KeyCode) -> bool {
        if self.created() == 0 {
            return false;
        }
        self.keys.as_ref().is_some_and(|keys| keys.push_press(code))
    }

    /// Number of sink sets created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Parameters passed to each `create` call, in order.
    pub fn opened_with(&self) -> Vec<SessionParams> {
        self.opened_with.lock().unwrap().clone()
    }

    /// Snapshot of the shared log.
    pub fn records(&self) -> Vec<SinkRecord> {
        self.log.lock().unwrap().clone()
    }

    /// Number of video sinks stopped so far.
    pub fn stops(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches!(r, SinkRecord::VideoStopped { .. }))
            .count()
    }

    /// Makes `create` fail while set.
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Makes every video write fail while set; failed writes are not logged.
    pub fn fail_video(&self, fail: bool) {
        self.fail_video.store(fail, Ordering::SeqCst);
    }

    /// Makes every audio write fail while set; failed writes are not logged.
    pub fn fail_audio(&self, fail: bool) {
        self.fail_audio.store(fail, Ordering::SeqCst);
    }
}

impl SinkFactory for RecordingSinkFactory {
    fn create(&self, params: &SessionParams) -> Result<SinkSet, SinkError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SinkError::Decode("scripted create failure".to_string()));
        }
        self.opened_with.lock().unwrap().push(*params);
        let generation = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let video = RecordingVideoSink {
            generation,
            log: Arc::clone(&self.log),
            fail: Arc::clone(&self.fail_video),
        };
        let audio = RecordingAudioSink {
            generation,
            log: Arc::clone(&self.log),
            fail: Arc::clone(&self.fail_audio),
        };
        Ok(SinkSet::new(Box::new(video), Box::new(audio)))
    }
}

struct RecordingVideoSink {
    generation: usize,
    log: Log,
    fail: Arc<AtomicBool>,
}

impl VideoSink for RecordingVideoSink {
    fn send(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::Decode("scripted video failure".to_string()));
        }
        self.log.lock().unwrap().push(SinkRecord::Video {
            generation: self.generation,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().push(SinkRecord::VideoStopped {
            generation: self.generation,
        });
    }
}

struct RecordingAudioSink {
    generation: usize,
    log: Log,
    fail: Arc<AtomicBool>,
}

impl AudioSink for RecordingAudioSink {
    fn send(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::Decode("scripted audio failure".to_string()));
        }
        self.log.lock().unwrap().push(SinkRecord::Audio {
            generation: self.generation,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().push(SinkRecord::AudioStopped {
            generation: self.generation,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generations_count_up_per_created_set() {
        // Arrange
        let factory = RecordingSinkFactory::new();

        // Act
        let mut first = factory.create(&SessionParams::default()).unwrap();
        let mut second = factory.create(&SessionParams::default()).unwrap();
        first.video.send(&[1]).unwrap();
        second.audio.send(&[2]).unwrap();
        first.stop();

        // Assert
        assert_eq!(factory.created(), 2);
        assert_eq!(
            factory.records(),
            vec![
                SinkRecord::Video { generation: 1, data: vec![1] },
                SinkRecord::Audio { generation: 2, data: vec![2] },
                SinkRecord::VideoStopped { generation: 1 },
                SinkRecord::AudioStopped { generation: 1 },
            ]
        );
        assert_eq!(factory.stops(), 1);
    }

    #[test]
    fn test_failed_writes_are_not_logged() {
        let factory = RecordingSinkFactory::new();
        let mut set = factory.create(&SessionParams::default()).unwrap();
        factory.fail_video(true);
        assert!(set.video.send(&[1]).is_err());
        assert!(factory.records().is_empty());
    }

    #[test]
    fn test_press_key_feeds_the_key_queue_once_sinks_exist() {
        // Arrange
        let (keys, mut rx) = crate::application::key_forwarder::key_channel();
        let factory = RecordingSinkFactory::new().with_keys(keys);

        // Act
        let before_open = factory.press_key(KeyCode::SELECT_DOWN);
        let _set = factory.create(&SessionParams::default()).unwrap();
        let after_open = factory.press_key(KeyCode::SELECT_DOWN);

        // Assert
        assert!(!before_open);
        assert!(after_open);
        assert_eq!(rx.try_recv().unwrap(), KeyCode::SELECT_DOWN);
        assert_eq!(rx.try_recv().unwrap(), KeyCode::SELECT_UP);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_press_key_without_queue_is_refused() {
        let factory = RecordingSinkFactory::new();
        let _set = factory.create(&SessionParams::default()).unwrap();
        assert!(!factory.press_key(KeyCode::HOME));
    }
}
