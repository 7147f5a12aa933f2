//! Local file decoding using FFmpeg.
//!
//! Frames are scaled to RGB24 in-memory. When the container runs out of packets
//! the decoder is flushed once, and any frames still buffered are returned
//! before end of stream is reported.

use ffmpeg_next as ffmpeg;
use std::time::{Duration, Instant};

use super::file::FileConfig;
use crate::error::CaptureError;
use crate::frame::{Frame, PixelEncoding};

pub(crate) struct FfmpegFileSource {
    config: FileConfig,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    flushed: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(config: FileConfig) -> Result<Self, CaptureError> {
        let open_err = |reason: String| CaptureError::Open {
            uri: config.path.clone(),
            reason,
        };
        ffmpeg::init().map_err(|e| open_err(format!("initialize ffmpeg: {e}")))?;
        let input = ffmpeg::format::input(&config.path)
            .map_err(|e| open_err(format!("open input with ffmpeg: {e}")))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| open_err("file has no video track".to_string()))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(|e| open_err(format!("load video decoder parameters: {e}")))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| open_err(format!("open ffmpeg video decoder: {e}")))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| open_err(format!("create ffmpeg scaler: {e}")))?;

        log::info!(
            "FileSource: opened {} (ffmpeg, {}x{})",
            config.path,
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            config,
            input,
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
            last_frame_at: None,
            flushed: false,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        loop {
            if let Some(frame) = self.receive_decoded()? {
                return Ok(Some(frame));
            }
            if self.flushed {
                log::debug!(
                    "FileSource: end of {} after {} frames",
                    self.config.path,
                    self.frame_count
                );
                return Ok(None);
            }
            if !self.send_next_packet()? {
                self.decoder
                    .send_eof()
                    .map_err(|e| read_err(&self.config, format!("flush decoder: {e}")))?;
                self.flushed = true;
            }
        }
    }

    /// Feed the next packet of the video stream. Returns false when the
    /// container has no packets left.
    fn send_next_packet(&mut self) -> Result<bool, CaptureError> {
        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| read_err(&self.config, format!("send packet to decoder: {e}")))?;
            return Ok(true);
        }
        Ok(false)
    }

    fn receive_decoded(&mut self) -> Result<Option<Frame>, CaptureError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        if let Some(last) = self.last_frame_at {
            if last.elapsed() > self.stall_timeout() {
                log::warn!(
                    "FileSource: {} decode stalled for {:?}",
                    self.config.path,
                    last.elapsed()
                );
            }
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| read_err(&self.config, format!("scale frame to RGB: {e}")))?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)
            .map_err(|reason| read_err(&self.config, reason))?;

        let frame =
            Frame::new(width, height, PixelEncoding::Rgb, pixels)?.with_sequence(self.frame_count);
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(Some(frame))
    }

    fn stall_timeout(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

fn read_err(config: &FileConfig, reason: String) -> CaptureError {
    CaptureError::Read {
        uri: config.path.clone(),
        reason,
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32), String> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .ok_or_else(|| "ffmpeg frame row is out of bounds".to_string())?,
        );
    }

    Ok((pixels, width, height))
}
