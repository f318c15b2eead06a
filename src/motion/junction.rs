//! Junction velocities and lookahead.
//!
//! Consecutive segments are blended through their shared corner at the
//! highest velocity that keeps the path within the junction deviation and
//! the centripetal acceleration bound. A backward and a forward
//! reachability pass then make every segment's boundary velocities
//! achievable within its length.

use crate::axis::Kinematics;

use super::profile::{reachable_velocity, EPSILON};

/// Geometry and limits of one segment as seen by the lookahead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JunctionInput {
    /// Unit direction over X, Y, Z (zero for rotation-only moves).
    pub direction: [f64; 3],
    /// Path length (units).
    pub length: f64,
    /// Path limits of the segment.
    pub limits: Kinematics,
    /// Whether the segment may blend with its neighbours.
    pub blendable: bool,
}

/// Maximum velocity through the corner between two segments.
///
/// Returns zero when the segments do not blend or either one has no linear
/// component.
pub fn junction_velocity(prev: &JunctionInput, next: &JunctionInput, deviation: f64) -> f64 {
    if !prev.blendable || !next.blendable {
        return 0.0;
    }
    let has_direction = |d: &[f64; 3]| d.iter().any(|c| c.abs() > EPSILON);
    if !has_direction(&prev.direction) || !has_direction(&next.direction) {
        return 0.0;
    }

    let cruise_v2 = prev
        .limits
        .max_velocity
        .min(next.limits.max_velocity)
        .powi(2);

    // Angle between the reversed incoming direction and the outgoing one.
    let cos_theta = -(prev.direction[0] * next.direction[0]
        + prev.direction[1] * next.direction[1]
        + prev.direction[2] * next.direction[2]);
    let cos_theta = cos_theta.clamp(-1.0, 1.0);

    let sin_theta_d2 = (0.5 * (1.0 - cos_theta)).sqrt();
    let cos_theta_d2 = (0.5 * (1.0 + cos_theta)).sqrt();
    let one_minus_sin = 1.0 - sin_theta_d2;

    // Straight through: only the cruise limits apply.
    if one_minus_sin <= EPSILON || cos_theta_d2 <= EPSILON {
        return cruise_v2.sqrt();
    }

    let r_jd = sin_theta_d2 / one_minus_sin;
    let quarter_tan_theta_d2 = 0.25 * sin_theta_d2 / cos_theta_d2;

    let mut v2 = cruise_v2;
    for segment in [prev, next] {
        let accel = segment.limits.max_acceleration;
        let deviation_v2 = r_jd * deviation * accel;
        let centripetal_v2 = 2.0 * segment.length * accel * quarter_tan_theta_d2;
        v2 = v2.min(deviation_v2).min(centripetal_v2);
    }

    v2.max(0.0).sqrt()
}

/// Boundary velocities for a run of segments.
///
/// Returns `segments.len() + 1` velocities: entry of the first segment,
/// each shared junction, and the exit of the last segment. The run starts
/// at `entry` and always ends at rest.
pub fn plan_junctions(segments: &[JunctionInput], entry: f64, deviation: f64) -> Vec<f64> {
    let n = segments.len();
    let mut v = Vec::with_capacity(n + 1);
    v.push(entry.max(0.0));
    for pair in segments.windows(2) {
        v.push(junction_velocity(&pair[0], &pair[1], deviation));
    }
    v.push(0.0);

    if n == 0 {
        return v;
    }

    // Backward pass: every segment must be able to slow down to its exit.
    for i in (0..n).rev() {
        let seg = &segments[i];
        v[i] = reachable_velocity(v[i + 1], seg.length, v[i], &seg.limits);
    }

    // Forward pass: every segment must be able to speed up to its exit.
    for i in 0..n {
        let seg = &segments[i];
        v[i + 1] = reachable_velocity(v[i], seg.length, v[i + 1], &seg.limits);
    }

    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(direction: [f64; 3], length: f64) -> JunctionInput {
        JunctionInput {
            direction,
            length,
            limits: Kinematics {
                max_velocity: 200.0,
                max_acceleration: 2000.0,
                max_jerk: 50_000.0,
            },
            blendable: true,
        }
    }

    #[test]
    fn test_collinear_junction_keeps_cruise() {
        let a = segment([1.0, 0.0, 0.0], 50.0);
        let b = segment([1.0, 0.0, 0.0], 50.0);
        assert_eq!(junction_velocity(&a, &b, 0.05), 200.0);
    }

    #[test]
    fn test_right_angle_is_slower_than_shallow_turn() {
        let a = segment([1.0, 0.0, 0.0], 50.0);
        let shallow = segment([0.999, 0.0447, 0.0], 50.0);
        let right = segment([0.0, 1.0, 0.0], 50.0);

        let v_shallow = junction_velocity(&a, &shallow, 0.05);
        let v_right = junction_velocity(&a, &right, 0.05);

        assert!(v_right > 0.0);
        assert!(v_right < v_shallow);
        // r_jd(90°) = sqrt(0.5) / (1 - sqrt(0.5))
        let expected = ((0.5f64.sqrt() / (1.0 - 0.5f64.sqrt())) * 0.05 * 2000.0).sqrt();
        assert!((v_right - expected).abs() < 1e-9);
    }

    #[test]
    fn test_reversal_stops() {
        let a = segment([1.0, 0.0, 0.0], 50.0);
        let back = segment([-1.0, 0.0, 0.0], 50.0);
        assert!(junction_velocity(&a, &back, 0.05) < 1e-6);
    }

    #[test]
    fn test_uncoordinated_segment_stops() {
        let a = segment([1.0, 0.0, 0.0], 50.0);
        let mut b = segment([1.0, 0.0, 0.0], 50.0);
        b.blendable = false;
        assert_eq!(junction_velocity(&a, &b, 0.05), 0.0);
    }

    #[test]
    fn test_lookahead_limits_short_segments() {
        let run = [
            segment([1.0, 0.0, 0.0], 50.0),
            segment([1.0, 0.0, 0.0], 0.2),
            segment([1.0, 0.0, 0.0], 50.0),
        ];
        let v = plan_junctions(&run, 0.0, 0.05);

        assert_eq!(v.len(), 4);
        assert_eq!(v[0], 0.0);
        assert_eq!(v[3], 0.0);
        assert!(v[1] > 0.0);
        // The short middle segment cannot change speed much
        assert!((v[1] - v[2]).abs() < 200.0);
        assert!(v[1] <= 200.0 && v[2] <= 200.0);
    }
}
