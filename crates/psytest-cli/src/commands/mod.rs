pub mod init;
pub mod key;
pub mod order;
pub mod score;
pub mod validate;
