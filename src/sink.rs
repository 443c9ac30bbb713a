//! The input-injection boundary: turns fused motion and client-requested clicks/scrolls into
//! actual OS input events. Kept behind a trait so the motion loop never talks to the platform
//! input API directly.

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[cfg_attr(test, mockall::automock)]
pub trait InputSink: Send + Sync {
    fn move_rel(&self, dx: i64, dy: i64) -> Result<()>;
    fn button(&self, button: MouseButton, down: bool) -> Result<()>;
    fn scroll(&self, dx: i64, dy: i64) -> Result<()>;
}

/// Default backend. Injects input via the `enigo` crate, wrapping every call in a mutex since
/// the motion-loop thread and the async session tasks can both reach it concurrently.
pub struct EnigoSink {
    inner: std::sync::Mutex<enigo::Enigo>,
}

impl EnigoSink {
    pub fn new() -> Result<Self> {
        let enigo = enigo::Enigo::new(&enigo::Settings::default()).map_err(|e| anyhow::anyhow!("failed to open input device: {e}"))?;
        Ok(EnigoSink { inner: std::sync::Mutex::new(enigo) })
    }
}

impl InputSink for EnigoSink {
    fn move_rel(&self, dx: i64, dy: i64) -> Result<()> {
        use enigo::Mouse;
        let mut guard = self.inner.lock().expect("input sink mutex poisoned");
        guard
            .move_mouse(dx as i32, dy as i32, enigo::Coordinate::Rel)
            .map_err(|e| anyhow::anyhow!("move_rel failed: {e}"))
    }

    fn button(&self, button: MouseButton, down: bool) -> Result<()> {
        use enigo::{Button, Direction, Mouse};
        let mapped = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        };
        let direction = if down { Direction::Press } else { Direction::Release };
        let mut guard = self.inner.lock().expect("input sink mutex poisoned");
        guard.button(mapped, direction).map_err(|e| anyhow::anyhow!("button failed: {e}"))
    }

    fn scroll(&self, dx: i64, dy: i64) -> Result<()> {
        use enigo::{Axis, Mouse};
        let mut guard = self.inner.lock().expect("input sink mutex poisoned");
        if dy != 0 {
            guard.scroll(dy as i32, Axis::Vertical).map_err(|e| anyhow::anyhow!("scroll failed: {e}"))?;
        }
        if dx != 0 {
            guard.scroll(dx as i32, Axis::Horizontal).map_err(|e| anyhow::anyhow!("scroll failed: {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_sink_records_calls() {
        let mut mock = MockInputSink::new();
        mock.expect_move_rel().withf(|dx, dy| *dx == 3 && *dy == -2).times(1).returning(|_, _| Ok(()));
        assert!(mock.move_rel(3, -2).is_ok());
    }
}
