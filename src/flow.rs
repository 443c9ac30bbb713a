//! Pyramidal Lucas-Kanade sparse optical flow and Shi-Tomasi corner detection, the default
//! [`OpticalFlowEngine`] backend used when the caller hasn't supplied its own.

use crate::decode::GrayFrame;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TrackResult {
    pub point: Point2,
    pub found: bool,
    pub error: f64,
}

#[cfg_attr(test, mockall::automock)]
pub trait OpticalFlowEngine: Send + Sync {
    /// Track each of `points` (in `prev`'s coordinate frame) forward into `curr`.
    fn track(&self, prev: &GrayFrame, curr: &GrayFrame, points: &[Point2]) -> Vec<TrackResult>;

    /// Find up to `max_corners` trackable corners in `frame` via Shi-Tomasi "good features".
    fn detect_features(&self, frame: &GrayFrame, max_corners: usize, quality_level: f64, min_distance: f64) -> Vec<Point2>;
}

#[derive(Debug, Clone, Copy)]
pub struct LkConfig {
    pub window: i64,
    pub max_level: u32,
    pub iterations: u32,
    pub epsilon: f64,
}

impl Default for LkConfig {
    fn default() -> Self {
        LkConfig { window: 21, max_level: 3, iterations: 30, epsilon: 0.01 }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LkOpticalFlow {
    cfg: LkConfig,
}

impl LkOpticalFlow {
    pub fn new(cfg: LkConfig) -> Self {
        LkOpticalFlow { cfg }
    }
}

struct Pyramid {
    levels: Vec<GrayFrame>,
}

fn downsample(frame: &GrayFrame) -> GrayFrame {
    let width = (frame.width / 2).max(1);
    let height = (frame.height / 2).max(1);
    let mut data = vec![0u8; (width * height) as usize];
    for y in 0..height {
        for x in 0..width {
            let sx = (x * 2).min(frame.width - 1);
            let sy = (y * 2).min(frame.height - 1);
            let sx1 = (sx + 1).min(frame.width - 1);
            let sy1 = (sy + 1).min(frame.height - 1);
            let sum = frame.get(sx, sy) as u32 + frame.get(sx1, sy) as u32 + frame.get(sx, sy1) as u32 + frame.get(sx1, sy1) as u32;
            data[(y * width + x) as usize] = (sum / 4) as u8;
        }
    }
    GrayFrame { width, height, data }
}

fn build_pyramid(frame: &GrayFrame, levels: u32) -> Pyramid {
    let mut out = vec![frame.clone()];
    for _ in 0..levels {
        let next = downsample(out.last().unwrap());
        out.push(next);
    }
    Pyramid { levels: out }
}

/// Bilinear-interpolated intensity, clamped to the frame bounds.
fn sample(frame: &GrayFrame, x: f64, y: f64) -> f64 {
    let x = x.clamp(0.0, (frame.width - 1) as f64);
    let y = y.clamp(0.0, (frame.height - 1) as f64);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(frame.width - 1);
    let y1 = (y0 + 1).min(frame.height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let v00 = frame.get(x0, y0) as f64;
    let v10 = frame.get(x1, y0) as f64;
    let v01 = frame.get(x0, y1) as f64;
    let v11 = frame.get(x1, y1) as f64;

    v00 * (1.0 - fx) * (1.0 - fy) + v10 * fx * (1.0 - fy) + v01 * (1.0 - fx) * fy + v11 * fx * fy
}

/// Single-level iterative LK refinement around `guess`, operating on `prev`/`curr` at the
/// same pyramid level. Returns the refined point and the mean absolute residual.
fn track_one_level(prev: &GrayFrame, curr: &GrayFrame, origin: Point2, mut guess: Point2, cfg: &LkConfig) -> (Point2, f64) {
    let half = cfg.window as f64 / 2.0;
    let mut error = f64::MAX;

    for _ in 0..cfg.iterations {
        let mut gxx = 0.0;
        let mut gxy = 0.0;
        let mut gyy = 0.0;
        let mut bx = 0.0;
        let mut by = 0.0;
        let mut count = 0usize;

        let mut wy = -half;
        while wy <= half {
            let mut wx = -half;
            while wx <= half {
                let px = origin.x + wx;
                let py = origin.y + wy;
                let cx = guess.x + wx;
                let cy = guess.y + wy;

                let ix = (sample(prev, px + 1.0, py) - sample(prev, px - 1.0, py)) / 2.0;
                let iy = (sample(prev, px, py + 1.0) - sample(prev, px, py - 1.0)) / 2.0;
                let it = sample(curr, cx, cy) - sample(prev, px, py);

                gxx += ix * ix;
                gxy += ix * iy;
                gyy += iy * iy;
                bx += -ix * it;
                by += -iy * it;
                count += 1;

                wx += 1.0;
            }
            wy += 1.0;
        }

        if count == 0 {
            return (guess, f64::MAX);
        }

        let det = gxx * gyy - gxy * gxy;
        if det.abs() < 1e-6 {
            return (guess, f64::MAX);
        }

        let dx = (gyy * bx - gxy * by) / det;
        let dy = (gxx * by - gxy * bx) / det;
        guess.x += dx;
        guess.y += dy;
        error = dx.hypot(dy);

        if error < cfg.epsilon {
            break;
        }
    }

    (guess, error)
}

impl OpticalFlowEngine for LkOpticalFlow {
    fn track(&self, prev: &GrayFrame, curr: &GrayFrame, points: &[Point2]) -> Vec<TrackResult> {
        let prev_pyr = build_pyramid(prev, self.cfg.max_level);
        let curr_pyr = build_pyramid(curr, self.cfg.max_level);

        points
            .iter()
            .map(|p| {
                let top = self.cfg.max_level as usize;
                let scale = 2f64.powi(top as i32);
                let mut guess = Point2 { x: p.x / scale, y: p.y / scale };
                let mut last_error = f64::MAX;

                for level in (0..=top).rev() {
                    let scale_l = 2f64.powi(level as i32);
                    let origin = Point2 { x: p.x / scale_l, y: p.y / scale_l };
                    let (refined, error) = track_one_level(&prev_pyr.levels[level], &curr_pyr.levels[level], origin, guess, &self.cfg);
                    guess = refined;
                    last_error = error;
                    if level > 0 {
                        guess.x *= 2.0;
                        guess.y *= 2.0;
                    }
                }

                let found = last_error.is_finite()
                    && guess.x >= 0.0
                    && guess.y >= 0.0
                    && guess.x < curr.width as f64
                    && guess.y < curr.height as f64;
                TrackResult { point: guess, found, error: last_error }
            })
            .collect()
    }

    fn detect_features(&self, frame: &GrayFrame, max_corners: usize, quality_level: f64, min_distance: f64) -> Vec<Point2> {
        if frame.width < 3 || frame.height < 3 {
            return Vec::new();
        }

        let mut scores = Vec::with_capacity((frame.width * frame.height) as usize);
        let mut max_score = 0.0f64;
        for y in 1..frame.height - 1 {
            for x in 1..frame.width - 1 {
                let ix = (frame.get(x + 1, y) as f64 - frame.get(x - 1, y) as f64) / 2.0;
                let iy = (frame.get(x, y + 1) as f64 - frame.get(x, y - 1) as f64) / 2.0;
                let gxx = ix * ix;
                let gyy = iy * iy;
                let gxy = ix * iy;
                // Minimum eigenvalue of the 2x2 structure tensor (Shi-Tomasi response).
                let trace = gxx + gyy;
                let det = gxx * gyy - gxy * gxy;
                let disc = (trace * trace - 4.0 * det).max(0.0).sqrt();
                let min_eig = (trace - disc) / 2.0;
                if min_eig > max_score {
                    max_score = min_eig;
                }
                scores.push((x, y, min_eig));
            }
        }

        let threshold = max_score * quality_level;
        scores.retain(|&(_, _, s)| s >= threshold);
        scores.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap());

        let mut picked: Vec<Point2> = Vec::new();
        for (x, y, _) in scores {
            if picked.len() >= max_corners {
                break;
            }
            let p = Point2 { x: x as f64, y: y as f64 };
            let too_close = picked.iter().any(|q| (q.x - p.x).hypot(q.y - p.y) < min_distance);
            if !too_close {
                picked.push(p);
            }
        }
        picked
    }
}
