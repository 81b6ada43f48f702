pub mod db;
pub mod directory;
pub mod ipc;
pub mod settings;
pub mod timetable;
