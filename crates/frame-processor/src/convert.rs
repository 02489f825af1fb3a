//! Per-stream frame converter

use iidc_bus::{ColorCoding, ColorFilter, FrameFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bayer::{debayer_u16, debayer_u8, BayerMethod};
use crate::error::ProcessError;
use crate::yuv::yuv_to_rgb8;

/// What has to happen to each frame of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionPlan {
    /// Deliver camera bytes as-is
    Passthrough,
    /// Demosaic a raw or mono sensor mosaic into RGB
    Debayer,
    /// Convert YUV into RGB8
    Yuv,
}

impl ConversionPlan {
    /// Plan for delivering `layers` channels from `coding`
    pub fn for_output(coding: ColorCoding, layers: u32) -> Self {
        if layers != 3 || matches!(coding, ColorCoding::Rgb8 | ColorCoding::Rgb16) {
            Self::Passthrough
        } else if coding.is_single_channel() {
            Self::Debayer
        } else {
            Self::Yuv
        }
    }
}

/// Frame converter holding the scratch buffers of one stream
#[derive(Debug)]
pub struct Converter {
    plan: ConversionPlan,
    method: BayerMethod,
    filter_override: Option<ColorFilter>,
    scratch: Vec<u8>,
    wide_in: Vec<u16>,
    wide_out: Vec<u16>,
}

impl Converter {
    pub fn new(plan: ConversionPlan) -> Self {
        debug!("Frame converter created for {:?}", plan);
        Self {
            plan,
            method: BayerMethod::default(),
            filter_override: None,
            scratch: Vec::new(),
            wide_in: Vec::new(),
            wide_out: Vec::new(),
        }
    }

    pub fn plan(&self) -> ConversionPlan {
        self.plan
    }

    pub fn method(&self) -> BayerMethod {
        self.method
    }

    pub fn set_method(&mut self, method: BayerMethod) {
        self.method = method;
    }

    pub fn filter_override(&self) -> Option<ColorFilter> {
        self.filter_override
    }

    /// Pattern used when the frame does not report its own
    pub fn set_filter_override(&mut self, filter: Option<ColorFilter>) {
        self.filter_override = filter;
    }

    /// Result of the last conversion (empty for passthrough)
    pub fn output(&self) -> &[u8] {
        &self.scratch
    }

    /// Move the last conversion result out, leaving the scratch buffer empty
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.scratch)
    }

    /// Hand a buffer from [`Converter::take_output`] back for reuse
    pub fn recycle(&mut self, buffer: Vec<u8>) {
        if buffer.capacity() > self.scratch.capacity() {
            self.scratch = buffer;
        }
    }

    /// Convert one frame. Passthrough returns `data` itself; otherwise the
    /// result lives in the converter's scratch buffer until the next call.
    pub fn process<'a>(
        &'a mut self,
        format: &FrameFormat,
        data: &'a [u8],
    ) -> Result<&'a [u8], ProcessError> {
        match self.plan {
            ConversionPlan::Passthrough => Ok(data),
            ConversionPlan::Yuv => {
                yuv_to_rgb8(format.color_coding, data, format.width, format.height, &mut self.scratch)?;
                Ok(&self.scratch)
            }
            ConversionPlan::Debayer => {
                let filter = format
                    .color_filter
                    .or(self.filter_override)
                    .ok_or_else(|| {
                        warn!("Bayer pattern unknown for {:?} frame", format.color_coding);
                        ProcessError::MissingColorFilter
                    })?;
                self.debayer(format, data, filter)?;
                Ok(&self.scratch)
            }
        }
    }

    fn debayer(
        &mut self,
        format: &FrameFormat,
        data: &[u8],
        filter: ColorFilter,
    ) -> Result<(), ProcessError> {
        if format.color_coding.data_depth() <= 8 {
            return debayer_u8(data, format.width, format.height, filter, self.method, &mut self.scratch);
        }

        self.wide_in.clear();
        self.wide_in.extend(
            data.chunks_exact(2)
                .map(|w| u16::from_ne_bytes([w[0], w[1]])),
        );
        debayer_u16(
            &self.wide_in,
            format.width,
            format.height,
            filter,
            self.method,
            &mut self.wide_out,
        )?;
        self.scratch.clear();
        self.scratch
            .extend(self.wide_out.iter().flat_map(|v| v.to_ne_bytes()));
        Ok(())
    }
}
