// src/window/popup.rs
//! Popup windows and their placement.

use crate::error::WindowError;
use reqwest::Url;

/// Width of the identity provider popup in CSS pixels.
pub const POPUP_WIDTH: u32 = 576;

/// Height of the identity provider popup in CSS pixels.
pub const POPUP_HEIGHT: u32 = 625;

/// Handle to an opened popup, owned by exactly one flow.
pub trait PopupWindow: Send + Sync {
    /// Closes the window. Closing an already closed window is a no-op.
    fn close(&self);

    /// Whether the window was closed, by the flow or by the user.
    fn is_closed(&self) -> bool;

    /// Host identifier of the window; matches [`MessageSource::window_id`] of
    /// events sent by this popup.
    ///
    /// [`MessageSource::window_id`]: crate::window::MessageSource::window_id
    fn window_id(&self) -> Option<u64> {
        None
    }
}

/// The host able to open popups (the opener window).
pub trait WindowOpener: Send + Sync {
    /// Opens a new popup at `url`.
    ///
    /// # Errors
    /// [`WindowError::Blocked`] when the host refuses to open it, e.g. outside
    /// a user gesture.
    fn open(&self, url: &Url, features: Option<&str>) -> Result<Box<dyn PopupWindow>, WindowError>;
}

/// Size and position of the opener window on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenGeometry {
    pub inner_width: i32,
    pub inner_height: i32,
    pub screen_x: i32,
    pub screen_y: i32,
}

/// Builds window features that center the popup over the opener.
pub fn popup_center(screen: &ScreenGeometry) -> String {
    let top = screen.inner_height / 2 + screen.screen_y - POPUP_HEIGHT as i32 / 2;
    let left = screen.inner_width / 2 + screen.screen_x - POPUP_WIDTH as i32 / 2;
    format!(
        "toolbar=no, location=no, directories=no, status=no, menubar=no, scrollbars=yes, \
         resizable=no, copyhistory=no, width={}, height={}, top={}, left={}",
        POPUP_WIDTH, POPUP_HEIGHT, top, left
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popup_center() {
        let features = popup_center(&ScreenGeometry {
            inner_width: 1920,
            inner_height: 1080,
            screen_x: 100,
            screen_y: 50,
        });
        assert!(features.contains("width=576, height=625"));
        // 540 + 50 - 312 and 960 + 100 - 288
        assert!(features.ends_with("top=278, left=772"));
        assert!(features.starts_with("toolbar=no"));
    }

    #[test]
    fn test_popup_center_on_small_screen_can_go_negative() {
        let features = popup_center(&ScreenGeometry {
            inner_width: 400,
            inner_height: 300,
            screen_x: 0,
            screen_y: 0,
        });
        assert!(features.ends_with("top=-162, left=-88"));
    }
}
