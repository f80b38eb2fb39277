pub mod dir;
pub mod duration;
pub mod logging;
pub mod time;
