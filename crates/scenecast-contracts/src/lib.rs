pub mod chat;
pub mod events;
pub mod gallery;
pub mod prompt;
pub mod slots;
