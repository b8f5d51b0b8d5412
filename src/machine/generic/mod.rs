pub mod link;
pub mod timer;
