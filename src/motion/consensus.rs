//! Majority direction voting: does a set of validator deltas corroborate a primary direction?

use super::MotionDelta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteResult {
    pub ok: bool,
    pub total_votes: usize,
    pub yes_votes: usize,
}

fn angle_diff(a: f64, b: f64) -> f64 {
    ((a - b + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI).abs()
}

pub fn majority_validate_direction(
    primary: MotionDelta,
    validators: &[MotionDelta],
    max_age_ms: f64,
    min_mag: f64,
    max_angle_deg: f64,
) -> VoteResult {
    if !primary.valid {
        return VoteResult { ok: false, total_votes: 0, yes_votes: 0 };
    }

    if primary.magnitude() < min_mag {
        return VoteResult { ok: true, total_votes: 1, yes_votes: 1 };
    }

    let max_angle = max_angle_deg.to_radians();
    let primary_angle = primary.dy.atan2(primary.dx);

    let mut votes = 1usize;
    let mut yes = 1usize;

    for v in validators {
        if !v.valid {
            continue;
        }
        if (primary.ts_ms - v.ts_ms).abs() > max_age_ms {
            continue;
        }
        if v.magnitude() < min_mag {
            continue;
        }
        votes += 1;
        let v_angle = v.dy.atan2(v.dx);
        if angle_diff(primary_angle, v_angle) <= max_angle {
            yes += 1;
        }
    }

    let ok = yes >= votes / 2 + 1;
    VoteResult { ok, total_votes: votes, yes_votes: yes }
}
