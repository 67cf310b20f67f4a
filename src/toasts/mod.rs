/// Transient operator feedback
pub mod toast_center;

pub use toast_center::{Toast, ToastCenter, ToastDurations, ToastLevel, Toaster};
