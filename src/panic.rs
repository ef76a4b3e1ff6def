//! Helpers for turning panic payloads into loggable text.

use std::any::Any;

/// Extract a human-readable message from a panic payload.
///
/// `panic!` payloads are `String` or `&'static str` in practice; anything
/// else is reported with a placeholder.
///
/// ```
/// use livewire::panic::panic_message;
/// assert_eq!(panic_message(Box::new("boom")), "boom");
/// assert_eq!(panic_message(Box::new(String::from("boom"))), "boom");
/// assert_eq!(panic_message(Box::new(5_u32)), "<non-string panic payload>");
/// ```
#[must_use]
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else {
        String::from("<non-string panic payload>")
    }
}
