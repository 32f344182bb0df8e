pub mod console;
pub mod dispatch;
