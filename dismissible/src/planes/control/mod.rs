pub mod admin_operations;
pub mod operation;

pub use admin_operations::AdminService;
pub use operation::AdminOperations;
