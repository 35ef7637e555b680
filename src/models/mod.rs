pub mod decision;
pub mod permission;
pub mod role;
