pub mod chat;
pub mod routing;
