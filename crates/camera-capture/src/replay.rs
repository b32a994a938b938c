//! Replay frame sources

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::frame::now_ns;
use crate::{CameraError, FrameSource, VideoFrame};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Replays frames held in memory
pub struct ReplaySource {
    frames: Vec<VideoFrame>,
    cursor: usize,
    looping: bool,
    sequence: u64,
}

impl ReplaySource {
    pub fn new(frames: Vec<VideoFrame>) -> Self {
        Self {
            frames,
            cursor: 0,
            looping: false,
            sequence: 0,
        }
    }

    /// Restart from the first frame instead of ending the stream
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len().saturating_sub(self.cursor)
    }
}

impl FrameSource for ReplaySource {
    fn capture(&mut self) -> Result<VideoFrame, CameraError> {
        if self.cursor >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return Err(CameraError::EndOfStream);
            }
            self.cursor = 0;
        }

        let mut frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        self.sequence += 1;
        frame.sequence = self.sequence;
        frame.timestamp_ns = now_ns();
        Ok(frame)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Replays still images from a directory, in file name order
pub struct DirectorySource {
    name: String,
    paths: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    sequence: u64,
}

impl DirectorySource {
    /// Scan a directory for image files
    pub fn open(dir: &Path, looping: bool) -> Result<Self, CameraError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(CameraError::Open(format!(
                "no image files in {}",
                dir.display()
            )));
        }

        info!("Replaying {} frames from {}", paths.len(), dir.display());

        Ok(Self {
            name: dir.display().to_string(),
            paths,
            cursor: 0,
            looping,
            sequence: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn capture(&mut self) -> Result<VideoFrame, CameraError> {
        if self.cursor >= self.paths.len() {
            if !self.looping {
                return Err(CameraError::EndOfStream);
            }
            self.cursor = 0;
        }

        let path = &self.paths[self.cursor];
        self.cursor += 1;
        self.sequence += 1;

        debug!("Decoding {}", path.display());
        let image = image::open(path)
            .map_err(|e| CameraError::Decode(format!("{}: {}", path.display(), e)))?;

        Ok(VideoFrame::from_rgb_image(image.to_rgb8(), self.sequence))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "camera-capture-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_replay_ends_stream() {
        let mut source = ReplaySource::new(vec![
            VideoFrame::filled(2, 2, [0, 0, 0]),
            VideoFrame::filled(2, 2, [9, 9, 9]),
        ]);

        assert_eq!(source.capture().unwrap().sequence, 1);
        assert_eq!(source.capture().unwrap().get_pixel(0, 0), Some([9, 9, 9]));
        assert!(matches!(source.capture(), Err(CameraError::EndOfStream)));
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn test_replay_looping() {
        let mut source = ReplaySource::new(vec![VideoFrame::filled(1, 1, [1, 1, 1])]).looping(true);
        for expected in 1..=5 {
            assert_eq!(source.capture().unwrap().sequence, expected);
        }
    }

    #[test]
    fn test_empty_looping_replay_still_ends() {
        let mut source = ReplaySource::new(Vec::new()).looping(true);
        assert!(matches!(source.capture(), Err(CameraError::EndOfStream)));
    }

    #[test]
    fn test_directory_source_orders_by_name() {
        let dir = scratch_dir("order");
        RgbImage::from_pixel(3, 2, image::Rgb([200, 0, 0]))
            .save(dir.join("b.png"))
            .unwrap();
        RgbImage::from_pixel(3, 2, image::Rgb([0, 200, 0]))
            .save(dir.join("a.png"))
            .unwrap();
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        let mut source = DirectorySource::open(&dir, false).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.capture().unwrap();
        assert_eq!((first.width, first.height), (3, 2));
        assert_eq!(first.get_pixel(0, 0), Some([0, 200, 0]));
        assert_eq!(source.capture().unwrap().get_pixel(0, 0), Some([200, 0, 0]));
        assert!(matches!(source.capture(), Err(CameraError::EndOfStream)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_directory_without_images() {
        let dir = scratch_dir("empty");
        assert!(matches!(
            DirectorySource::open(&dir, true),
            Err(CameraError::Open(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
