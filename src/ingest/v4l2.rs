//! V4L2 webcam source.
//!
//! Captures frames from a local device node (e.g. /dev/video0) through
//! memory-mapped buffers. The source asks for RGB3; when the driver refuses, it
//! keeps whatever YUYV or NV12 format the device reports and converts to RGB.

use ouroboros::self_referencing;

use super::{normalize_to_rgb, CaptureSource, PixelFormat, SourceStats};
use crate::error::CaptureError;
use crate::frame::{Frame, PixelEncoding};

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Requested frame rate. Zero leaves the device default.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

#[self_referencing]
struct DeviceStream {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// V4L2 frame source.
pub struct V4l2Source {
    config: V4l2Config,
    state: Option<DeviceStream>,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
        }
    }

    fn open_err(&self, reason: String) -> CaptureError {
        CaptureError::Open {
            uri: self.config.device.clone(),
            reason,
        }
    }
}

impl CaptureSource for V4l2Source {
    fn describe(&self) -> String {
        self.config.device.clone()
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .map_err(|e| self.open_err(format!("open v4l2 device: {e}")))?;
        let mut format = device
            .format()
            .map_err(|e| self.open_err(format!("read v4l2 format: {e}")))?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .map_err(|e| self.open_err(format!("read v4l2 format after set failure: {e}")))?
            }
        };

        self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            self.open_err(format!("unsupported device pixel format {}", format.fourcc))
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStreamTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|e| self.open_err(format!("create v4l2 buffer stream: {e}")))?;
        self.state = Some(state);
        self.frame_count = 0;

        log::info!(
            "V4l2Source: opened {} ({}x{}, {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        use v4l::io::traits::CaptureStream;

        let device = self.config.device.clone();
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| CaptureError::NotOpen { uri: device.clone() })?;
        let (width, height, format) = (self.active_width, self.active_height, self.format);

        let pixels = state.with_mut(|fields| {
            let (buf, _meta) = fields.stream.next().map_err(|e| CaptureError::Read {
                uri: device.clone(),
                reason: e.to_string(),
            })?;
            normalize_to_rgb(buf, width, height, format).map_err(CaptureError::from)
        })?;

        let frame =
            Frame::new(width, height, PixelEncoding::Rgb, pixels)?.with_sequence(self.frame_count);
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "V4l2Source: released {} after {} frames",
                self.config.device,
                self.frame_count
            );
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.config.device.clone(),
        }
    }
}
