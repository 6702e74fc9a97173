// TodoStore - Todo tracking on SQLite with JSON/CSV import and export

pub mod filter;
pub mod models;
pub mod record;
pub mod store;
pub mod transfer;

// Re-export main types for convenience
pub use filter::{SortOrder, TodoFilter};
pub use models::{NewTodo, PRIORITY_DEFAULT, PRIORITY_MAX, PRIORITY_MIN, Todo, TodoStatus, TodoUpdate};
pub use store::Store;
pub use transfer::{ImportSummary, TransferFormat};
