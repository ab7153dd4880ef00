use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::frame::Frame;

use super::latest_frame_slot::LatestFrameSlot;

type SendError = Box<dyn std::error::Error + Send + Sync>;

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureInput {
    /// Platform camera by index (`/dev/videoN` via v4l2, or avfoundation).
    Camera(u32),
    /// A video file, image file, or explicit device path.
    Path(PathBuf),
}

impl CaptureInput {
    /// Resolves to `(ffmpeg input format name, url)`. `None` means "probe".
    fn locator(&self) -> Result<(Option<&'static str>, String), SendError> {
        match self {
            CaptureInput::Path(path) => Ok((device_format_for(path), path.display().to_string())),
            CaptureInput::Camera(index) => camera_locator(*index),
        }
    }
}

#[cfg(target_os = "linux")]
fn camera_locator(index: u32) -> Result<(Option<&'static str>, String), SendError> {
    Ok((Some("v4l2"), format!("/dev/video{index}")))
}

#[cfg(target_os = "macos")]
fn camera_locator(index: u32) -> Result<(Option<&'static str>, String), SendError> {
    Ok((Some("avfoundation"), index.to_string()))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn camera_locator(index: u32) -> Result<(Option<&'static str>, String), SendError> {
    Err(format!("camera index {index} is not supported on this platform; set an explicit source").into())
}

fn device_format_for(path: &std::path::Path) -> Option<&'static str> {
    if cfg!(target_os = "linux") && path.starts_with("/dev") {
        Some("v4l2")
    } else {
        None
    }
}

/// Decodes a camera or video with ffmpeg-next on a background thread and
/// publishes every frame, converted to RGB24, into a [`LatestFrameSlot`].
///
/// File inputs are paced at their native frame rate so that a recorded clip
/// behaves like a live feed. The last frame of a finished file stays
/// available.
pub struct FfmpegFrameSource {
    slot: LatestFrameSlot,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FfmpegFrameSource {
    /// Opens the input and starts decoding. Fails if the input cannot be
    /// opened or has no video stream.
    pub fn open(input: CaptureInput) -> Result<Self, Box<dyn std::error::Error>> {
        let slot = LatestFrameSlot::new();
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        let thread_slot = slot.clone();
        let thread_stop = stop.clone();
        let handle = thread::spawn(move || {
            let mut decoder = match InputDecoder::open(&input) {
                Ok(d) => d,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            if let Err(e) = decoder.run(&thread_slot, &thread_stop) {
                log::warn!("Frame source stopped: {e}");
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                slot,
                stop,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e.into())
            }
            Err(_) => Err("Frame source thread exited before opening the input".into()),
        }
    }

    /// Blocks until a first frame is available or `timeout` elapses.
    pub fn wait_for_frame(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.slot.latest() {
                return Some(frame);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn latest_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        Ok(self.slot.latest())
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Decoder state owned by the capture thread; never crosses threads.
struct InputDecoder {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    video_stream_index: usize,
    width: u32,
    height: u32,
    frame_interval: Option<Duration>,
}

impl InputDecoder {
    fn open(input: &CaptureInput) -> Result<Self, SendError> {
        ffmpeg_next::init()?;
        let (format_name, url) = input.locator()?;

        let ictx = match format_name {
            Some(name) => open_device(name, &url)?,
            None => ffmpeg_next::format::input(&url)?,
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let video_stream_index = stream.index();

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;
        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        // Devices deliver in real time; files would otherwise decode as fast as possible.
        let frame_interval = if format_name.is_none() {
            let rate = stream.rate();
            if rate.numerator() > 0 && rate.denominator() > 0 {
                Some(Duration::from_secs_f64(
                    rate.denominator() as f64 / rate.numerator() as f64,
                ))
            } else {
                None
            }
        } else {
            None
        };

        log::info!("Opened frame source {url} ({width}x{height})");

        Ok(Self {
            ictx,
            decoder,
            scaler,
            video_stream_index,
            width,
            height,
            frame_interval,
        })
    }

    fn run(&mut self, slot: &LatestFrameSlot, stop: &AtomicBool) -> Result<(), SendError> {
        let mut frame_index = 0usize;
        let mut next_due = Instant::now();

        for (stream, packet) in self.ictx.packets() {
            if stop.load(Ordering::Relaxed) {
                return Ok(());
            }
            if stream.index() != self.video_stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
                self.scaler.run(&decoded, &mut rgb_frame)?;
                let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);

                if let Some(interval) = self.frame_interval {
                    let now = Instant::now();
                    if next_due > now {
                        thread::sleep(next_due - now);
                    }
                    next_due = next_due.max(now) + interval;
                }

                slot.publish(Frame::new(pixels, self.width, self.height, 3, frame_index));
                frame_index += 1;
            }
        }

        let _ = self.decoder.send_eof();
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
            self.scaler.run(&decoded, &mut rgb_frame)?;
            let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
            slot.publish(Frame::new(pixels, self.width, self.height, 3, frame_index));
            frame_index += 1;
        }

        log::debug!("Frame source reached end of input after {frame_index} frames");
        Ok(())
    }
}

fn open_device(
    format_name: &str,
    url: &str,
) -> Result<ffmpeg_next::format::context::Input, SendError> {
    ffmpeg_next::device::register_all();

    let format = ffmpeg_next::device::input::video()
        .find(|f| f.name() == format_name)
        .ok_or_else(|| format!("ffmpeg input device '{format_name}' is not available"))?;

    let ctx = ffmpeg_next::format::open_with(&url, &format, ffmpeg_next::Dictionary::new())?;

    match ctx {
        ffmpeg_next::format::context::Context::Input(ictx) => Ok(ictx),
        _ => Err(format!("{url} did not open as an input").into()),
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
