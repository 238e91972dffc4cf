//! Chart capture from an off-screen render surface.
//!
//! Charts are painted once into a surface with one sub-region per section.
//! [`ChartRasterizer`] waits until a region's paint has been committed, then
//! reads it back at a supersampling scale. Captures run one at a time and in
//! section order: `capture_section` takes `&mut self`, so a second capture
//! cannot start while one is still awaiting its commit.

use crate::error::SectionError;
use image::RgbaImage;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Stable address of one sub-region of the render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionHandle {
    /// Trend chart of the selected crop at this position.
    CropTrend(usize),
    SocialHeatmap,
}

impl fmt::Display for SectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CropTrend(i) => write!(f, "crop trend #{}", i + 1),
            Self::SocialHeatmap => f.write_str("social heatmap"),
        }
    }
}

/// Something charts can be captured from.
pub trait RenderSurface: Send + Sync {
    /// Resolves once the section's paint is committed and safe to read.
    fn render_committed(
        &self,
        section: SectionHandle,
    ) -> impl Future<Output = Result<(), SectionError>> + Send;

    /// Read the committed region at `scale` times its base resolution.
    fn read_region(&self, section: SectionHandle, scale: u32) -> Result<RgbaImage, SectionError>;
}

/// A captured chart.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub image: RgbaImage,
    /// Width over height.
    pub aspect_ratio: f64,
}

impl RasterImage {
    /// Largest `(w, h)` that fits in `max_w` × `max_h` at this aspect ratio.
    pub fn fit(&self, max_w: f64, max_h: f64) -> (f64, f64) {
        let w = max_w.min(max_h * self.aspect_ratio).max(0.0);
        (w, w / self.aspect_ratio)
    }
}

/// Sequential capturer over a [`RenderSurface`].
pub struct ChartRasterizer<'s, S: RenderSurface> {
    surface: &'s S,
    scale: u32,
    timeout: Option<Duration>,
}

impl<'s, S: RenderSurface> ChartRasterizer<'s, S> {
    pub fn new(surface: &'s S, scale: u32, timeout: Option<Duration>) -> Self {
        Self {
            surface,
            scale: scale.max(1),
            timeout,
        }
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Wait for `section` to commit, then read it back.
    pub async fn capture_section(&mut self, section: SectionHandle) -> Result<RasterImage, SectionError> {
        let committed = self.surface.render_committed(section);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, committed)
                .await
                .map_err(|_| SectionError::CaptureTimeout {
                    section: section.to_string(),
                    millis: limit.as_millis() as u64,
                })??,
            None => committed.await?,
        }

        let image = self.surface.read_region(section, self.scale)?;
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(SectionError::CaptureFailed {
                section: section.to_string(),
                detail: "captured region is empty".into(),
            });
        }
        debug!(%section, width = w, height = h, "section captured");
        Ok(RasterImage {
            image,
            aspect_ratio: w as f64 / h as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    struct Instant(u32, u32);

    impl RenderSurface for Instant {
        async fn render_committed(&self, _section: SectionHandle) -> Result<(), SectionError> {
            Ok(())
        }

        fn read_region(&self, _section: SectionHandle, scale: u32) -> Result<RgbaImage, SectionError> {
            Ok(RgbaImage::from_pixel(self.0 * scale, self.1 * scale, Rgba([0, 0, 0, 255])))
        }
    }

    struct NeverCommits;

    impl RenderSurface for NeverCommits {
        async fn render_committed(&self, _section: SectionHandle) -> Result<(), SectionError> {
            std::future::pending().await
        }

        fn read_region(&self, _section: SectionHandle, _scale: u32) -> Result<RgbaImage, SectionError> {
            unreachable!("never committed")
        }
    }

    #[tokio::test]
    async fn capture_reports_aspect_ratio_at_scale() {
        let surface = Instant(200, 100);
        let mut r = ChartRasterizer::new(&surface, 2, None);
        let img = r.capture_section(SectionHandle::CropTrend(0)).await.unwrap();
        assert_eq!(img.image.dimensions(), (400, 200));
        assert!((img.aspect_ratio - 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn stalled_commit_times_out() {
        let mut r = ChartRasterizer::new(&NeverCommits, 2, Some(Duration::from_millis(20)));
        let err = r.capture_section(SectionHandle::SocialHeatmap).await.unwrap_err();
        assert_eq!(
            err,
            SectionError::CaptureTimeout {
                section: "social heatmap".into(),
                millis: 20
            }
        );
    }

    #[tokio::test]
    async fn empty_region_is_a_capture_failure() {
        let surface = Instant(0, 10);
        let mut r = ChartRasterizer::new(&surface, 1, None);
        let err = r.capture_section(SectionHandle::CropTrend(1)).await.unwrap_err();
        assert!(matches!(err, SectionError::CaptureFailed { ref section, .. } if section == "crop trend #2"));
    }

    #[test]
    fn fit_preserves_aspect() {
        let img = RasterImage {
            image: RgbaImage::new(1, 1),
            aspect_ratio: 2.0,
        };
        assert_eq!(img.fit(190.0, 200.0), (190.0, 95.0));
        assert_eq!(img.fit(190.0, 50.0), (100.0, 50.0));
    }
}
