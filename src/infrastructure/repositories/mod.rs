//! Collaborator implementations using SeaORM

pub mod card_directory;

pub use card_directory::SeaOrmCardDirectory;
