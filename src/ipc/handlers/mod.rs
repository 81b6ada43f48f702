pub mod assignments;
pub mod core;
pub mod directory;
pub mod setup;
pub mod timetable;
