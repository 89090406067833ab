pub mod book;
pub mod conversation;
pub mod envelope;
pub mod order;
