pub mod summary;
pub mod weekly;
