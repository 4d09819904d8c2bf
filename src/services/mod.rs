pub mod dispatch;
pub mod merge;
pub mod store;
