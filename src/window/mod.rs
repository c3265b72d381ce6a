// src/window/mod.rs
//! Host abstraction for windows and cross-window messaging.

pub mod messaging;
pub mod popup;

pub use messaging::{MessageEvent, MessageHub, MessageListener, MessageSource};
pub use popup::{popup_center, PopupWindow, ScreenGeometry, WindowOpener};
