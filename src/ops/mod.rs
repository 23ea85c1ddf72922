pub mod list;
pub mod screen;
pub mod sync;
