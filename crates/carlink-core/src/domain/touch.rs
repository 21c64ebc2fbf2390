//! Touch normalisation domain.
//!
//! The UI layer reports pointer events in device space: whatever integer
//! range the touch panel driver uses.  The dongle expects every coordinate
//! as a fraction of the projected display, so each axis is divided by a
//! fixed, device-dependent constant:
//!
//! ```text
//!   device (x, y)  ──÷ x_divisor, ÷ y_divisor──►  protocol (x', y') in 0.0..=1.0
//! ```
//!
//! Out-of-range input is passed through unclamped.

use crate::protocol::messages::{Touch, TouchAction};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default horizontal device range of the original touch panel.
pub const DEFAULT_X_DIVISOR: f64 = 8_000_000.0;

/// Default vertical device range of the original touch panel.
pub const DEFAULT_Y_DIVISOR: f64 = 6_000_000.0;

/// Errors raised when building a [`TouchScale`].
#[derive(Debug, Error, PartialEq)]
pub enum TouchScaleError {
    /// A divisor was zero, negative, NaN or infinite.
    #[error("invalid {axis} divisor: {value}")]
    InvalidDivisor { axis: &'static str, value: f64 },
}

/// A pointer event as captured by the UI, before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTouchEvent {
    pub x: f64,
    pub y: f64,
    /// `"down"`, `"move"` or `"up"`; any other tag is treated as a move.
    pub tag: String,
}

impl RawTouchEvent {
    pub fn new(x: f64, y: f64, tag: impl Into<String>) -> Self {
        Self {
            x,
            y,
            tag: tag.into(),
        }
    }
}

/// Linear device-to-protocol coordinate scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchScale {
    pub x_divisor: f64,
    pub y_divisor: f64,
}

impl Default for TouchScale {
    fn default() -> Self {
        Self {
            x_divisor: DEFAULT_X_DIVISOR,
            y_divisor: DEFAULT_Y_DIVISOR,
        }
    }
}

impl TouchScale {
    /// Creates a scale, rejecting divisors that would produce NaN or infinity.
    pub fn new(x_divisor: f64, y_divisor: f64) -> Result<Self, TouchScaleError> {
        check_divisor("x", x_divisor)?;
        check_divisor("y", y_divisor)?;
        Ok(Self {
            x_divisor,
            y_divisor,
        })
    }

    /// Maps one raw event to a protocol [`Touch`].
    pub fn normalize(&self, event: &RawTouchEvent) -> Touch {
        Touch {
            x: (event.x / self.x_divisor) as f32,
            y: (event.y / self.y_divisor) as f32,
            action: TouchAction::from_tag(&event.tag),
        }
    }

    /// Maps a drained run of raw events, preserving their order.
    pub fn normalize_all(&self, events: &[RawTouchEvent]) -> Vec<Touch> {
        events.iter().map(|e| self.normalize(e)).collect()
    }
}

fn check_divisor(axis: &'static str, value: f64) -> Result<(), TouchScaleError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TouchScaleError::InvalidDivisor { axis, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scale_uses_panel_constants() {
        let scale = TouchScale::default();
        assert_eq!(scale.x_divisor, 8_000_000.0);
        assert_eq!(scale.y_divisor, 6_000_000.0);
    }

    #[test]
    fn test_normalize_divides_each_axis() {
        // Arrange
        let scale = TouchScale::default();
        let event = RawTouchEvent::new(4_000_000.0, 3_000_000.0, "down");

        // Act
        let touch = scale.normalize(&event);

        // Assert
        assert_eq!(touch.x, 0.5);
        assert_eq!(touch.y, 0.5);
        assert_eq!(touch.action, TouchAction::Down);
    }

    #[test]
    fn test_normalize_all_keeps_order_and_maps_actions() {
        // Arrange
        let scale = TouchScale::default();
        let events = vec![
            RawTouchEvent::new(800_000.0, 600_000.0, "down"),
            RawTouchEvent::new(1_600_000.0, 1_200_000.0, "move"),
            RawTouchEvent::new(2_400_000.0, 1_800_000.0, "up"),
        ];

        // Act
        let touches = scale.normalize_all(&events);

        // Assert
        let actions: Vec<u32> = touches.iter().map(|t| t.action as u32).collect();
        assert_eq!(actions, vec![1, 2, 0]);
        assert!((touches[0].x - 0.1).abs() < 1e-6);
        assert!((touches[1].x - 0.2).abs() < 1e-6);
        assert!((touches[2].y - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_coordinates_are_not_clamped() {
        let event = RawTouchEvent::new(16_000_000.0, -6_000_000.0, "move");
        let touch = TouchScale::default().normalize(&event);
        assert_eq!(touch.x, 2.0);
        assert_eq!(touch.y, -1.0);
    }

    #[test]
    fn test_new_rejects_non_positive_or_non_finite_divisors() {
        assert!(TouchScale::new(800.0, 480.0).is_ok());
        assert_eq!(
            TouchScale::new(0.0, 480.0),
            Err(TouchScaleError::InvalidDivisor { axis: "x", value: 0.0 })
        );
        assert!(TouchScale::new(800.0, f64::INFINITY).is_err());
        assert!(TouchScale::new(-1.0, 480.0).is_err());
    }
}
