pub mod inspect;
pub mod install;
pub mod list;
pub mod load;
pub mod remove;
pub mod verify;
