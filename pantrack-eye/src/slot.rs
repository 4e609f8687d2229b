//! Latest-frame hand-off between a camera loop and preview consumers
//!
//! Frames are swapped in whole behind a short mutex section, so readers only
//! ever see complete frames. Readers get a shared `Arc`; encoding happens
//! outside the lock.

use crate::error::VisionError;
use crate::frame::Frame;
use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const MJPEG_BOUNDARY: &str = "frame";
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Default)]
struct SlotState {
    frame: Option<Arc<Frame>>,
    version: u64,
}

#[derive(Default)]
pub struct LatestFrameSlot {
    state: Mutex<SlotState>,
    published: Condvar,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame. Returns the new version number.
    pub fn publish(&self, frame: Frame) -> u64 {
        let frame = Arc::new(frame);
        let version = {
            let mut state = self.state.lock();
            state.frame = Some(frame);
            state.version += 1;
            state.version
        };
        self.published.notify_all();
        version
    }

    /// Current frame, or `None` if nothing has been published yet
    pub fn consume(&self) -> Option<Arc<Frame>> {
        self.state.lock().frame.clone()
    }

    /// Number of frames published so far
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Block until a frame exists or `timeout` passes
    pub fn wait_for_frame(&self, timeout: Duration) -> Option<Arc<Frame>> {
        self.wait_for_newer(0, timeout).map(|(_, frame)| frame)
    }

    /// Block until a frame newer than `seen` is published or `timeout` passes.
    /// Streaming consumers pass back the version they last got.
    pub fn wait_for_newer(&self, seen: u64, timeout: Duration) -> Option<(u64, Arc<Frame>)> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.version <= seen {
            if self.published.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if state.version <= seen {
            return None;
        }
        state.frame.clone().map(|frame| (state.version, frame))
    }

    /// JPEG of the current frame, `None` when not ready
    pub fn encoded_jpeg(&self, quality: u8) -> Result<Option<Vec<u8>>, VisionError> {
        match self.consume() {
            Some(frame) => encode_jpeg(&frame, quality).map(Some),
            None => Ok(None),
        }
    }
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, VisionError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(&frame.image)?;
    Ok(buffer)
}

/// One part of a `multipart/x-mixed-replace` stream
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", MJPEG_BOUNDARY);
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_not_ready_until_published() {
        let slot = LatestFrameSlot::new();
        assert!(slot.consume().is_none());
        assert_eq!(slot.version(), 0);
        assert!(slot.encoded_jpeg(80).unwrap().is_none());
        assert!(slot.wait_for_frame(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_publish_replaces() {
        let slot = LatestFrameSlot::new();
        assert_eq!(slot.publish(Frame::filled(4, 4, [1, 1, 1])), 1);
        assert_eq!(slot.publish(Frame::filled(4, 4, [2, 2, 2])), 2);
        let frame = slot.consume().unwrap();
        assert_eq!(frame.image.get_pixel(0, 0).0, [2, 2, 2]);

        // several readers share the same frame
        let again = slot.consume().unwrap();
        assert!(Arc::ptr_eq(&frame, &again));
    }

    #[test]
    fn test_wait_wakes_on_publish() {
        let slot = Arc::new(LatestFrameSlot::new());
        let publisher = {
            let slot = slot.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                slot.publish(Frame::filled(2, 2, [7, 7, 7]));
            })
        };
        let (version, frame) = slot.wait_for_newer(0, Duration::from_secs(5)).unwrap();
        assert_eq!(version, 1);
        assert_eq!(frame.image.get_pixel(1, 1).0, [7, 7, 7]);
        publisher.join().unwrap();

        assert!(slot.wait_for_newer(1, Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_readers_never_see_mixed_frames() {
        let slot = Arc::new(LatestFrameSlot::new());
        let writer = {
            let slot = slot.clone();
            thread::spawn(move || {
                for i in 0..200u32 {
                    let v = (i % 250) as u8;
                    slot.publish(Frame::filled(32, 32, [v, v, v]));
                }
            })
        };
        let reader = {
            let slot = slot.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    if let Some(frame) = slot.consume() {
                        let first = frame.image.get_pixel(0, 0).0;
                        assert!(frame.image.pixels().all(|p| p.0 == first));
                    }
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
    }

    #[test]
    fn test_jpeg_and_mjpeg_part() {
        let slot = LatestFrameSlot::new();
        slot.publish(Frame::filled(16, 16, [200, 10, 10]));
        let jpeg = slot.encoded_jpeg(DEFAULT_JPEG_QUALITY).unwrap().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let part = mjpeg_part(&jpeg);
        let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        assert!(part.starts_with(header));
        assert!(part.ends_with(b"\r\n"));
        assert_eq!(part.len(), header.len() + jpeg.len() + 2);
    }
}
