//! Per-client MJPEG streaming loop
//!
//! ```text
//! Idle --head sent--> Streaming --client gone / write failed--> Closed
//!                         |
//!                         +--too many unsupported frames-----> Faulted
//! ```
//!
//! Every iteration owns at most one [`Frame`]. Early exits drop it, which
//! hands its slot back to the pool, so no path leaks a buffer.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};

use super::multipart::{self, StreamHead};
use super::sink::ChunkSink;
use crate::capture::{Frame, FrameEncoder, FrameSource, JpegFrameEncoder, PixelFormat};
use crate::error::{Result, StreamError};
use crate::exposure::{AutoExposure, EstimateCadence};
use crate::hardware::CameraHardware;
use crate::{Config, StreamConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Streaming,
    Closed,
    Faulted,
}

/// What a finished session did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    /// Frames taken from the source, whether or not they made it out
    pub frames_acquired: u64,
    pub frames_sent: u64,
    /// Brightness estimates that produced a value
    pub estimates: u64,
    pub capture_failures: u64,
    pub encode_failures: u64,
    pub unsupported_frames: u64,
}

/// Frame-rate window, reset every time it is reported.
struct FpsWindow {
    started: Instant,
    frames: u32,
    last_convert: Duration,
}

impl FpsWindow {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            frames: 0,
            last_convert: Duration::ZERO,
        }
    }

    fn record(&mut self, convert: Duration) {
        self.frames += 1;
        self.last_convert = convert;
    }

    fn fps(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        if elapsed > 0.0 {
            f64::from(self.frames) / elapsed
        } else {
            0.0
        }
    }
}

pub struct StreamSession<K> {
    sink: K,
    source: Arc<dyn FrameSource>,
    encoder: Arc<dyn FrameEncoder>,
    hardware: Arc<CameraHardware>,
    auto_exposure: AutoExposure,
    cadence: EstimateCadence,
    config: StreamConfig,
    retry_delay: Duration,
    report: SessionReport,
}

impl<K: ChunkSink> StreamSession<K> {
    pub fn new(
        sink: K,
        source: Arc<dyn FrameSource>,
        hardware: Arc<CameraHardware>,
        config: &Config,
    ) -> Self {
        Self {
            sink,
            source,
            encoder: Arc::new(JpegFrameEncoder),
            auto_exposure: AutoExposure::from_config(&config.exposure, hardware.clone()),
            hardware,
            cadence: EstimateCadence::new(config.exposure.estimate_every),
            config: config.stream.clone(),
            retry_delay: Duration::from_millis(config.capture.retry_delay_ms),
            report: SessionReport::default(),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn FrameEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Stream until the client goes away. Never returns an error: the
    /// outcome is in the report.
    #[instrument(skip(self), name = "stream_session")]
    pub async fn run(mut self) -> SessionReport {
        let head = StreamHead::new(&self.config.boundary);
        if let Err(e) = self.sink.open(head).await {
            info!("Client gone before stream start: {}", e);
            return self.finish(SessionState::Closed);
        }
        self.report.state = SessionState::Streaming;
        info!("Serving camera stream");

        if let Err(e) = self.hardware.ensure_configured().await {
            warn!("Streaming with unconfigured camera: {}", e);
        }

        let frame_interval = Duration::from_millis(self.config.frame_interval_ms);
        let skip_delay = Duration::from_millis(self.config.skip_delay_ms);
        let stats_interval = Duration::from_millis(self.config.stats_interval_ms);

        let mut window = FpsWindow::new(Instant::now());
        let mut unsupported_streak = 0u32;

        while self.sink.is_connected() {
            match self.tick().await {
                Ok(convert) => {
                    unsupported_streak = 0;
                    window.record(convert);
                }
                Err(e) if !e.is_transient() => {
                    info!("Stream write failed: {}", e);
                    return self.finish(SessionState::Closed);
                }
                Err(StreamError::CaptureFailed(e)) => {
                    self.report.capture_failures += 1;
                    metrics::counter!("capture_failures").increment(1);
                    warn!("Camera capture failed: {}", e);
                    sleep(self.retry_delay).await;
                    continue;
                }
                Err(StreamError::UnsupportedEncoding(format)) => {
                    self.report.unsupported_frames += 1;
                    unsupported_streak += 1;
                    warn!("Unsupported pixel format: {:?}", format);
                    if self
                        .config
                        .max_unsupported_frames
                        .is_some_and(|limit| unsupported_streak >= limit)
                    {
                        error!(
                            "Giving up after {} unsupported frames in a row",
                            unsupported_streak
                        );
                        return self.finish(SessionState::Faulted);
                    }
                    sleep(skip_delay).await;
                    continue;
                }
                Err(e) => {
                    self.report.encode_failures += 1;
                    metrics::counter!("encode_failures").increment(1);
                    warn!("Raw to JPEG conversion failed: {}", e);
                    sleep(skip_delay).await;
                    continue;
                }
            }

            let now = Instant::now();
            if now.saturating_duration_since(window.started) >= stats_interval {
                let (_, _, pool_rejects) = self.source.pool().stats();
                info!(
                    "FPS: {:.1}, Last conversion/capture: {}ms, Brightness: {:?}, Pool rejects: {}",
                    window.fps(now),
                    window.last_convert.as_millis(),
                    self.auto_exposure.last_luma(),
                    pool_rejects
                );
                window = FpsWindow::new(now);
            }

            sleep(frame_interval).await;
        }

        info!("Client disconnected from stream");
        self.finish(SessionState::Closed)
    }

    /// One frame: acquire, maybe estimate, encode if raw, write, release.
    /// Returns the time from capture to a sendable JPEG.
    async fn tick(&mut self) -> Result<Duration> {
        let frame = self.source.acquire()?;

        // Cadence counts every acquired frame so failing frames stay cheap
        let index = self.report.frames_acquired;
        self.report.frames_acquired += 1;
        if self.cadence.is_due(index) && self.auto_exposure.observe(&frame).is_some() {
            self.report.estimates += 1;
        }

        let payload = self.jpeg_payload(&frame)?;
        let convert = frame.timestamp.elapsed();

        self.send_part(payload).await?;
        self.source.release(frame);

        self.report.frames_sent += 1;
        metrics::counter!("stream_frames_sent").increment(1);
        Ok(convert)
    }

    fn jpeg_payload(&self, frame: &Frame) -> Result<Bytes> {
        match frame.format() {
            // Already JPEG: hand the camera buffer through untouched
            PixelFormat::Mjpeg if !frame.is_empty() => Ok(frame.data.clone()),
            PixelFormat::Mjpeg => Err(StreamError::EncodeFailed("empty JPEG frame".into())),
            PixelFormat::Yuyv => {
                let started = Instant::now();
                let jpeg = self.encoder.encode(frame, self.config.jpeg_quality)?;
                metrics::histogram!("encode_time_us").record(started.elapsed().as_micros() as f64);
                debug!(raw = frame.len(), jpeg = jpeg.len(), "Frame encoded");
                Ok(jpeg)
            }
            other => Err(StreamError::UnsupportedEncoding(other)),
        }
    }

    async fn send_part(&mut self, payload: Bytes) -> Result<()> {
        let head = multipart::part_head(&self.config.boundary, payload.len());
        self.sink.send(head).await?;
        self.sink.send(payload).await?;
        self.sink.send(Bytes::from_static(multipart::PART_TAIL)).await
    }

    fn finish(mut self, state: SessionState) -> SessionReport {
        self.report.state = state;
        debug!(report = ?self.report, "Stream session finished");
        self.report
    }
}
