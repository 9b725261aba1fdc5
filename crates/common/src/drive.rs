use serde::Serialize;

/// Wheel speeds for a tank-steered chassis, each in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DriveCommand {
    pub left: f64,
    pub right: f64,
}

impl DriveCommand {
    pub const STOP: Self = Self { left: 0.0, right: 0.0 };
}

/// Tank steering: `x` steers (negative = left), `y` is throttle (negative = reverse).
pub fn mix(x: f64, y: f64) -> DriveCommand {
    let left = (y + x).clamp(-1.0, 1.0);
    let right = (y - x).clamp(-1.0, 1.0);

    DriveCommand {
        left: boost_low_end(left),
        right: boost_low_end(right),
    }
}

// Motors barely turn below ~50% duty, so lift small inputs with a square-root curve.
fn boost_low_end(input: f64) -> f64 {
    let sign = if input >= 0.0 { 1.0 } else { -1.0 };
    sign * input.abs().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_stick_stops() {
        assert_eq!(mix(0.0, 0.0), DriveCommand::STOP);
    }

    #[test]
    fn full_throttle_drives_both_sides() {
        assert_eq!(mix(0.0, 1.0), DriveCommand { left: 1.0, right: 1.0 });
        assert_eq!(mix(0.0, -1.0), DriveCommand { left: -1.0, right: -1.0 });
    }

    #[test]
    fn steering_right_slows_the_right_side() {
        let drive = mix(1.0, 1.0);
        assert_eq!(drive, DriveCommand { left: 1.0, right: 0.0 });
    }

    #[test]
    fn spin_in_place() {
        assert_eq!(mix(-1.0, 0.0), DriveCommand { left: -1.0, right: 1.0 });
    }

    #[test]
    fn low_inputs_are_boosted() {
        let drive = mix(0.0, 0.25);
        assert_eq!(drive.left, 0.5);
        assert_eq!(drive.right, 0.5);
    }
}
