#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use std::{fs, io};

use async_std::channel::{Receiver, Sender};
use async_std::task;
use chrono::Local;
use rayon::prelude::*;

/// One raw 16-bit grayscale camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: usize,
    pub data: Vec<u16>,
}

/// Median-blur (5x5, replicated borders) the frame and return its mean
/// brightness. The blur knocks out hot pixels so a single stuck sensor cell
/// cannot masquerade as a brightness gain.
#[must_use]
pub fn reduce_frame(frame: &Frame) -> f64 {
    let width = frame.width;
    if width == 0 || frame.data.len() < width {
        return 0.0;
    }
    let height = frame.data.len() / width;
    let sum: f64 = (0..height)
        .into_par_iter()
        .map(|y| {
            let mut window = [0_u16; 25];
            let mut row_sum = 0.0_f64;
            for x in 0..width {
                let mut n = 0;
                for dy in -2_i64..=2 {
                    let sy = (y as i64 + dy).clamp(0, height as i64 - 1) as usize;
                    for dx in -2_i64..=2 {
                        let sx = (x as i64 + dx).clamp(0, width as i64 - 1) as usize;
                        window[n] = frame.data[sy * width + sx];
                        n += 1;
                    }
                }
                window.sort_unstable();
                row_sum += f64::from(window[12]);
            }
            row_sum
        })
        .sum();
    sum / (width * height) as f64
}

/// Turns the incoming frame stream into one objective sample per group of
/// `group_size` frames (the mean of the per-frame mean brightnesses).
#[derive(Debug)]
pub struct ObjectiveFeed {
    frames: Receiver<Frame>,
    group_size: u64,
    frames_processed: u64,
    group_sum: f64,
}

impl ObjectiveFeed {
    #[must_use]
    pub fn new(frames: Receiver<Frame>, group_size: u64) -> Self {
        ObjectiveFeed {
            frames,
            group_size: group_size.max(1),
            group_sum: 0.0,
            frames_processed: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn group_size(&self) -> u64 {
        self.group_size
    }

    #[inline]
    #[must_use]
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Await the next batch-mean brightness sample. Returns `None` once the
    /// frame channel has closed and no further samples can be produced; that
    /// is a clean end of the run, not an error.
    pub async fn next_sample(&mut self) -> Option<f64> {
        loop {
            let frame = self.frames.recv().await.ok()?;
            self.group_sum += reduce_frame(&frame);
            self.frames_processed += 1;
            if self.frames_processed % self.group_size == 0 {
                let mean = self.group_sum / self.group_size as f64;
                self.group_sum = 0.0;
                return Some(mean);
            }
        }
    }
}

/// Where and how often to look for newly written camera frames.
#[derive(Debug, Clone)]
pub struct CameraSetup {
    pub image_dir: PathBuf,
    pub frame_width: usize,
    pub poll_interval: Duration,
}

fn read_raw_frame(path: &Path, width: usize) -> io::Result<Frame> {
    let bytes = fs::read(path)?;
    let mut data = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks_exact(2) {
        data.push(u16::from_le_bytes([chunk[0], chunk[1]]));
    }
    Ok(Frame { width, data })
}

/// One poll of `image_dir`: forget tracked files the camera software has
/// since deleted (so the tracking set stays bounded by the directory's
/// contents), then collect and mark any `.raw` files not yet handed out,
/// sorted by modification time.
fn scan_new_frames(image_dir: &Path, seen: &mut HashSet<PathBuf>) -> Vec<(SystemTime, PathBuf)> {
    seen.retain(|path| path.exists());
    let mut fresh: Vec<(SystemTime, PathBuf)> = Vec::new();
    match fs::read_dir(image_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "raw") && !seen.contains(&path) {
                    let modified = entry
                        .metadata()
                        .and_then(|m| m.modified())
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    fresh.push((modified, path));
                }
            }
        }
        Err(e) => {
            eprintln!(
                "[{}] failed to read image directory {}: {}",
                Local::now(),
                image_dir.display(),
                e
            );
        }
    }
    fresh.sort();
    for (_, path) in &fresh {
        seen.insert(path.clone());
    }
    fresh
}

/// Poll `image_dir` for `.raw` frames and push them into the channel in
/// modification-time order. Runs until the receiving side hangs up.
pub async fn watch_image_dir(setup: CameraSetup, tx: Sender<Frame>) {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    loop {
        for (_, path) in scan_new_frames(&setup.image_dir, &mut seen) {
            match read_raw_frame(&path, setup.frame_width) {
                Ok(frame) => {
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    eprintln!("[{}] failed to read frame {}: {}", Local::now(), path.display(), e);
                }
            }
        }
        task::sleep(setup.poll_interval).await;
    }
}
