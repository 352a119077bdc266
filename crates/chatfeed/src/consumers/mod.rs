//! Built-in chat consumers.

pub mod console;
pub mod webpage;

pub use console::ConsoleConsumer;
pub use webpage::WebPageConsumer;
