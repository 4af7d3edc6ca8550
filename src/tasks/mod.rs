pub mod store;

pub use store::{NewDaily, NewHabit, NewTodo, TaskPatch, TaskStore};
