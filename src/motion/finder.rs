use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::filter::box_filter;
use imageproc::morphology::{dilate, erode};

use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// Binarisation threshold on the absolute difference.
pub const DEFAULT_DIFF_THRESHOLD: u8 = 40;
/// Value written for foreground pixels.
pub const DEFAULT_MAX_VALUE: u8 = 255;
/// Erosion radius (L-infinity) that removes isolated specks.
pub const DEFAULT_ERODE_RADIUS: u8 = 8;
/// Dilation radius (L-infinity) that closes holes in surviving blobs.
pub const DEFAULT_DILATE_RADIUS: u8 = 15;
/// Boxes shorter than this fraction of the frame height are discarded (birds, shadows).
pub const DEFAULT_MIN_HEIGHT_FRACTION: f32 = 0.3;

/// Structuring and filtering parameters of the finder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionFinderConfig {
    pub erode_radius: u8,
    pub dilate_radius: u8,
    pub min_height_fraction: f32,
}

impl Default for MotionFinderConfig {
    fn default() -> Self {
        Self {
            erode_radius: DEFAULT_ERODE_RADIUS,
            dilate_radius: DEFAULT_DILATE_RADIUS,
            min_height_fraction: DEFAULT_MIN_HEIGHT_FRACTION,
        }
    }
}

/// Everything one pass of the pipeline produced.
pub struct MotionAnalysis {
    /// Number of external contours that survived erosion and dilation.
    pub contours: usize,
    /// Box around all contours, `None` when there are none or it is too short.
    pub bounding_box: Option<BoundingBox>,
    /// Absolute per-pixel difference.
    pub difference: GrayImage,
    /// Binarised mask after erosion and dilation.
    pub mask: GrayImage,
}

/// Background-subtraction bounding-box extractor.
///
/// Holds an immutable background reference. Refreshing the background means building
/// a new finder.
pub struct MotionFinder {
    background: Frame,
    config: MotionFinderConfig,
}

impl MotionFinder {
    pub fn new(background: Frame, config: MotionFinderConfig) -> Self {
        Self { background, config }
    }

    pub fn background(&self) -> &Frame {
        &self.background
    }

    pub fn config(&self) -> &MotionFinderConfig {
        &self.config
    }

    /// Run the full pipeline of `frame` against the background.
    ///
    /// Returns `None` when the frame dimensions differ from the background.
    pub fn analyze(&self, frame: &Frame, threshold: u8, max_value: u8) -> Option<MotionAnalysis> {
        if frame.dimensions() != self.background.dimensions() {
            return None;
        }
        let (difference, mask) = significant_mask(
            self.background.image(),
            frame.image(),
            threshold,
            max_value,
            &self.config,
        );
        let contours = external_contours(&mask);
        let min_height = frame.height() as f32 * self.config.min_height_fraction;
        let bounding_box = contours
            .iter()
            .filter_map(|contour| BoundingBox::enclosing(contour.points.iter()))
            .reduce(|acc, bbox| acc.union(&bbox))
            .filter(|bbox| bbox.height as f32 >= min_height);

        Some(MotionAnalysis {
            contours: contours.len(),
            bounding_box,
            difference,
            mask,
        })
    }

    /// Bounding box of everything that differs from the background, if significant.
    pub fn find_bounding_box(
        &self,
        frame: &Frame,
        threshold: u8,
        max_value: u8,
    ) -> Option<BoundingBox> {
        self.analyze(frame, threshold, max_value)
            .and_then(|analysis| analysis.bounding_box)
    }

    /// True when at least one contour survives between two arbitrary frames.
    ///
    /// No minimum-height filter applies here: any surviving blob counts as motion.
    pub fn has_difference(&self, a: &Frame, b: &Frame, threshold: u8, max_value: u8) -> bool {
        if a.dimensions() != b.dimensions() {
            return false;
        }
        let (_, mask) = significant_mask(a.image(), b.image(), threshold, max_value, &self.config);
        !external_contours(&mask).is_empty()
    }
}

/// Box-blurred copy of `frame`. A radius of zero returns the frame unchanged.
pub fn smooth(frame: &Frame, radius: u32) -> Frame {
    if radius == 0 {
        return frame.clone();
    }
    Frame::new(box_filter(frame.image(), radius, radius))
}

fn significant_mask(
    a: &GrayImage,
    b: &GrayImage,
    threshold: u8,
    max_value: u8,
    config: &MotionFinderConfig,
) -> (GrayImage, GrayImage) {
    let difference = absolute_difference(a, b);
    let binary = binarize(&difference, threshold, max_value);
    let eroded = erode(&binary, Norm::LInf, config.erode_radius);
    let mask = dilate(&eroded, Norm::LInf, config.dilate_radius);
    (difference, mask)
}

fn absolute_difference(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].abs_diff(b.get_pixel(x, y)[0])])
    })
}

fn binarize(image: &GrayImage, threshold: u8, max_value: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] > threshold {
            Luma([max_value])
        } else {
            Luma([0])
        }
    })
}

fn external_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{blob_frame, empty_frame, train_frame, HEIGHT, WIDTH};

    fn finder() -> MotionFinder {
        MotionFinder::new(empty_frame(), MotionFinderConfig::default())
    }

    #[test]
    fn identical_frame_has_no_box() {
        let analysis = finder()
            .analyze(&empty_frame(), DEFAULT_DIFF_THRESHOLD, DEFAULT_MAX_VALUE)
            .unwrap();
        assert_eq!(analysis.contours, 0);
        assert!(analysis.bounding_box.is_none());
    }

    #[test]
    fn train_at_right_edge_yields_edge_touching_box() {
        let bbox = finder()
            .find_bounding_box(&train_frame(40, false), DEFAULT_DIFF_THRESHOLD, DEFAULT_MAX_VALUE)
            .expect("train box");
        assert_eq!(bbox.right(), WIDTH);
        assert!(bbox.width >= 40 && bbox.width <= 60, "width {}", bbox.width);
        assert!(bbox.height >= 80, "height {}", bbox.height);
    }

    #[test]
    fn box_width_follows_train_width() {
        let f = finder();
        let widths: Vec<u32> = [40, 80, 140]
            .iter()
            .map(|&w| {
                f.find_bounding_box(&train_frame(w, false), DEFAULT_DIFF_THRESHOLD, DEFAULT_MAX_VALUE)
                    .unwrap()
                    .width
            })
            .collect();
        assert!(widths[0] < widths[1] && widths[1] < widths[2], "{:?}", widths);
    }

    #[test]
    fn isolated_speck_is_eroded_away() {
        let speck = blob_frame(150, 50, 6, 6);
        let f = finder();
        assert!(f
            .find_bounding_box(&speck, DEFAULT_DIFF_THRESHOLD, DEFAULT_MAX_VALUE)
            .is_none());
        assert!(!f.has_difference(&empty_frame(), &speck, DEFAULT_DIFF_THRESHOLD, DEFAULT_MAX_VALUE));
    }

    #[test]
    fn short_blob_is_rejected_by_min_height() {
        // Survives erosion but stays below 30% of the frame height after dilation.
        let bird = blob_frame(140, 50, 40, 18);
        let f = finder();
        let analysis = f
            .analyze(&bird, DEFAULT_DIFF_THRESHOLD, DEFAULT_MAX_VALUE)
            .unwrap();
        assert_eq!(analysis.contours, 1);
        assert!(analysis.bounding_box.is_none());
        assert!(f.has_difference(&empty_frame(), &bird, DEFAULT_DIFF_THRESHOLD, DEFAULT_MAX_VALUE));
    }

    #[test]
    fn small_differences_stay_below_threshold() {
        let dim = blob_frame(0, 0, WIDTH, HEIGHT);
        let f = finder();
        assert!(f.find_bounding_box(&dim, 250, DEFAULT_MAX_VALUE).is_none());
    }

    #[test]
    fn zero_max_value_never_reports_motion() {
        let f = finder();
        assert!(f.find_bounding_box(&train_frame(140, false), DEFAULT_DIFF_THRESHOLD, 0).is_none());
    }

    #[test]
    fn mismatched_dimensions_are_ignored() {
        let small = Frame::new(GrayImage::new(10, 10));
        let f = finder();
        assert!(f.analyze(&small, DEFAULT_DIFF_THRESHOLD, DEFAULT_MAX_VALUE).is_none());
        assert!(!f.has_difference(&small, &empty_frame(), DEFAULT_DIFF_THRESHOLD, DEFAULT_MAX_VALUE));
    }

    #[test]
    fn smoothing_keeps_uniform_background() {
        let bg = smooth(&empty_frame(), 5);
        assert_eq!(bg.dimensions(), (WIDTH, HEIGHT));
        assert_eq!(bg.mean_intensity(), empty_frame().mean_intensity());
        assert!(smooth(&bg, 0).ptr_eq(&bg));
    }
}
