use serde::{Serialize, Serializer};

/// Normalized stick position. Both axes lie in [-1, 1]; +x is right, +y is up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct JoystickPosition {
    #[serde(serialize_with = "serialize_axis")]
    pub x: f64,
    #[serde(serialize_with = "serialize_axis")]
    pub y: f64,
}

impl JoystickPosition {
    pub const REST: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_at_rest(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Wire form sent to the rover, e.g. `{"x":0.25,"y":-1}`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// Integral values go out as integers so a resting stick reads {"x":0,"y":0}.
fn serialize_axis<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// Bounding rectangle of the input surface in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SurfaceRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }
}

/// Rounds to `digits` fractional digits; anything that rounds to zero becomes +0.0.
pub fn round_axis(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    let rounded = (value * scale).round() / scale;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

type UpdateCallback = Box<dyn FnMut(JoystickPosition) + Send>;

/// Maps pointer gestures over a rectangular pad to a deduplicated stick position.
///
/// The pad rectangle is captured once at pointer-down and reused for every move
/// of that gesture. Each gesture method returns the new position only when the
/// rounded value actually changed; the same position is handed to the update
/// callback, if one is registered.
pub struct Joystick {
    fraction_digits: u32,
    position: JoystickPosition,
    area: Option<SurfaceRect>,
    on_update: Option<UpdateCallback>,
}

impl Joystick {
    pub fn new(fraction_digits: u32) -> Self {
        Self {
            fraction_digits,
            position: JoystickPosition::REST,
            area: None,
            on_update: None,
        }
    }

    pub fn on_update<F>(&mut self, callback: F)
    where
        F: FnMut(JoystickPosition) + Send + 'static,
    {
        self.on_update = Some(Box::new(callback));
    }

    pub fn position(&self) -> JoystickPosition {
        self.position
    }

    /// True between pointer-down and pointer-up.
    pub fn is_moving(&self) -> bool {
        self.area.is_some()
    }

    pub fn pointer_down(
        &mut self,
        area: SurfaceRect,
        client_x: f64,
        client_y: f64,
    ) -> Option<JoystickPosition> {
        self.area = Some(area);
        self.move_handle(area, client_x, client_y)
    }

    pub fn pointer_move(&mut self, client_x: f64, client_y: f64) -> Option<JoystickPosition> {
        let area = self.area?;
        self.move_handle(area, client_x, client_y)
    }

    pub fn pointer_up(&mut self) -> Option<JoystickPosition> {
        self.area = None;
        self.update_position(0.0, 0.0)
    }

    fn move_handle(
        &mut self,
        area: SurfaceRect,
        client_x: f64,
        client_y: f64,
    ) -> Option<JoystickPosition> {
        let left = (client_x - area.left).max(0.0).min(area.width);
        let top = (client_y - area.top).max(0.0).min(area.height);

        let x = if area.width > 0.0 {
            (2.0 * left / area.width) - 1.0
        } else {
            0.0
        };
        let y = if area.height > 0.0 {
            1.0 - (2.0 * top / area.height)
        } else {
            0.0
        };

        self.update_position(x, y)
    }

    fn update_position(&mut self, x: f64, y: f64) -> Option<JoystickPosition> {
        // Round before comparing so sub-precision jitter never counts as a change.
        let next = JoystickPosition {
            x: round_axis(x, self.fraction_digits),
            y: round_axis(y, self.fraction_digits),
        };

        if next == self.position {
            return None;
        }

        self.position = next;
        if let Some(callback) = self.on_update.as_mut() {
            callback(next);
        }
        Some(next)
    }
}

impl std::fmt::Debug for Joystick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joystick")
            .field("fraction_digits", &self.fraction_digits)
            .field("position", &self.position)
            .field("area", &self.area)
            .finish_non_exhaustive()
    }
}
