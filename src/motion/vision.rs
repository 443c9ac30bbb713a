//! Sparse optical-flow tracking: turns two consecutive camera frames into a single screen-space
//! `(dx, dy)` delta by tracking a handful of corner features and fitting a similarity transform.

use crate::decode::{equalize_contrast, GrayFrame};
use crate::flow::{OpticalFlowEngine, Point2, TrackResult};

use super::MotionDelta;

#[derive(Debug, Clone, Copy)]
pub struct VisionConfig {
    pub max_corners: usize,
    pub quality_level: f64,
    pub min_distance: f64,
    pub fb_error_max: f64,
    pub max_err: f64,
    pub ransac_reproj_threshold: f64,
    pub ransac_min_inliers: usize,
    pub min_track_points: usize,
    /// Frames are downscaled by this factor before detection/tracking; the resulting
    /// translation is scaled back up by its reciprocal.
    pub resize_scale: f64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        VisionConfig {
            max_corners: 400,
            quality_level: 0.01,
            min_distance: 5.0,
            fb_error_max: 1.5,
            max_err: 5.0,
            ransac_reproj_threshold: 3.0,
            ransac_min_inliers: 6,
            min_track_points: 30,
            resize_scale: 0.5,
        }
    }
}

pub struct VisionTracker {
    cfg: VisionConfig,
    engine: Box<dyn OpticalFlowEngine>,
    prev_frame: Option<GrayFrame>,
    prev_points: Vec<Point2>,
}

impl VisionTracker {
    pub fn new(cfg: VisionConfig, engine: Box<dyn OpticalFlowEngine>) -> Self {
        VisionTracker { cfg, engine, prev_frame: None, prev_points: Vec::new() }
    }

    pub fn reset(&mut self) {
        self.prev_frame = None;
        self.prev_points.clear();
    }

    fn preprocess(&self, frame: GrayFrame) -> GrayFrame {
        let equalized = equalize_contrast(&frame);
        resize(&equalized, self.cfg.resize_scale)
    }

    fn redetect(&mut self, frame: &GrayFrame) {
        self.prev_points =
            self.engine
                .detect_features(frame, self.cfg.max_corners, self.cfg.quality_level, self.cfg.min_distance);
    }

    /// Track `frame` against the previously seen frame, emitting the screen-space translation
    /// implied by the matched feature set (camera motion is opposite to the visual shift, so
    /// the caller negates before treating this as a cursor delta).
    pub fn process_frame(&mut self, frame: GrayFrame, ts_ms: f64) -> MotionDelta {
        let frame = self.preprocess(frame);

        let prev_frame = match self.prev_frame.take() {
            None => {
                self.redetect(&frame);
                self.prev_frame = Some(frame);
                return MotionDelta::invalid(ts_ms);
            }
            Some(f) => f,
        };

        if self.prev_points.len() < self.cfg.min_track_points {
            self.redetect(&prev_frame);
        }
        if self.prev_points.is_empty() {
            self.redetect(&frame);
            self.prev_frame = Some(frame);
            return MotionDelta::invalid(ts_ms);
        }

        let forward = self.engine.track(&prev_frame, &frame, &self.prev_points);
        let back_points: Vec<Point2> = forward.iter().map(|t| t.point).collect();
        let backward = self.engine.track(&frame, &prev_frame, &back_points);

        let mut prev_good = Vec::new();
        let mut curr_good = Vec::new();
        for ((p0, fwd), bwd) in self.prev_points.iter().zip(forward.iter()).zip(backward.iter()) {
            if !fwd.found || !bwd.found {
                continue;
            }
            if fwd.error > self.cfg.max_err {
                continue;
            }
            let fb_err = (bwd.point.x - p0.x).hypot(bwd.point.y - p0.y);
            if fb_err > self.cfg.fb_error_max {
                continue;
            }
            prev_good.push(*p0);
            curr_good.push(fwd.point);
        }

        let delta = if prev_good.len() >= self.cfg.min_track_points {
            ransac_translation(&prev_good, &curr_good, self.cfg.ransac_reproj_threshold, self.cfg.ransac_min_inliers)
                .or_else(|| median_translation(&prev_good, &curr_good))
        } else {
            median_translation(&prev_good, &curr_good)
        };

        self.prev_points = if curr_good.len() >= self.cfg.min_track_points { curr_good } else { Vec::new() };
        if self.prev_points.is_empty() {
            self.redetect(&frame);
        }
        self.prev_frame = Some(frame);

        match delta {
            Some((dx, dy)) => {
                let unscale = 1.0 / self.cfg.resize_scale;
                MotionDelta::valid(dx * unscale, dy * unscale, ts_ms)
            }
            None => MotionDelta::invalid(ts_ms),
        }
    }
}

/// Bilinear-resampled resize to `scale` times the frame's original dimensions.
fn resize(frame: &GrayFrame, scale: f64) -> GrayFrame {
    if (scale - 1.0).abs() < f64::EPSILON {
        return frame.clone();
    }
    let new_width = ((frame.width as f64) * scale).round().max(1.0) as u32;
    let new_height = ((frame.height as f64) * scale).round().max(1.0) as u32;

    let mut data = vec![0u8; (new_width * new_height) as usize];
    for y in 0..new_height {
        for x in 0..new_width {
            let sx = (((x as f64 + 0.5) / scale) - 0.5).clamp(0.0, (frame.width - 1) as f64);
            let sy = (((y as f64 + 0.5) / scale) - 0.5).clamp(0.0, (frame.height - 1) as f64);
            let x0 = sx.floor() as u32;
            let y0 = sy.floor() as u32;
            let x1 = (x0 + 1).min(frame.width - 1);
            let y1 = (y0 + 1).min(frame.height - 1);
            let fx = sx - x0 as f64;
            let fy = sy - y0 as f64;

            let v00 = frame.get(x0, y0) as f64;
            let v10 = frame.get(x1, y0) as f64;
            let v01 = frame.get(x0, y1) as f64;
            let v11 = frame.get(x1, y1) as f64;
            let v = v00 * (1.0 - fx) * (1.0 - fy) + v10 * fx * (1.0 - fy) + v01 * (1.0 - fx) * fy + v11 * fx * fy;
            data[(y * new_width + x) as usize] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    GrayFrame { width: new_width, height: new_height, data }
}

/// Median per-axis displacement between matched point pairs. Robust to a minority of outliers
/// without needing a full transform fit.
fn median_translation(prev: &[Point2], curr: &[Point2]) -> Option<(f64, f64)> {
    if prev.is_empty() {
        return None;
    }
    let mut dxs: Vec<f64> = prev.iter().zip(curr).map(|(p, c)| c.x - p.x).collect();
    let mut dys: Vec<f64> = prev.iter().zip(curr).map(|(p, c)| c.y - p.y).collect();
    dxs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    dys.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Some((median_of_sorted(&dxs), median_of_sorted(&dys)))
}

fn median_of_sorted(v: &[f64]) -> f64 {
    let n = v.len();
    if n % 2 == 1 {
        v[n / 2]
    } else {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    }
}

/// Fits a partial-affine (translation + rotation + uniform scale) similarity transform by
/// exhaustively evaluating every point-pair candidate and keeping the one with the largest
/// inlier set, then returns its translation component if that set clears `min_inliers`. Point
/// sets here are small (a few dozen corners), so exhaustive pairing is cheap and avoids pulling
/// in a runtime RNG dependency.
fn ransac_translation(prev: &[Point2], curr: &[Point2], reproj_threshold: f64, min_inliers: usize) -> Option<(f64, f64)> {
    let n = prev.len();
    if n < 2 {
        return None;
    }

    let mut best_inliers = 0usize;
    let mut best: Option<(f64, f64, f64, f64)> = None; // (tx, ty, a, b) where [a -b; b a] is scale*rotation

    for i in 0..n {
        for j in (i + 1)..n {
            let p0 = prev[i];
            let p1 = prev[j];
            let c0 = curr[i];
            let c1 = curr[j];

            let pdx = p1.x - p0.x;
            let pdy = p1.y - p0.y;
            let denom = pdx * pdx + pdy * pdy;
            if denom < 1e-6 {
                continue;
            }
            let cdx = c1.x - c0.x;
            let cdy = c1.y - c0.y;

            let a = (pdx * cdx + pdy * cdy) / denom;
            let b = (pdx * cdy - pdy * cdx) / denom;
            let tx = c0.x - (a * p0.x - b * p0.y);
            let ty = c0.y - (b * p0.x + a * p0.y);

            let inliers = prev
                .iter()
                .zip(curr)
                .filter(|(p, c)| {
                    let px = a * p.x - b * p.y + tx;
                    let py = b * p.x + a * p.y + ty;
                    (px - c.x).hypot(py - c.y) <= reproj_threshold
                })
                .count();

            if inliers > best_inliers {
                best_inliers = inliers;
                best = Some((tx, ty, a, b));
            }
        }
    }

    if best_inliers < min_inliers {
        return None;
    }
    best.map(|(tx, ty, _, _)| (tx, ty))
}
