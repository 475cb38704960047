pub mod signal;
pub mod slug;
