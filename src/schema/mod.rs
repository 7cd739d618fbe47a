pub mod prompt;
pub mod role;
pub mod script;
