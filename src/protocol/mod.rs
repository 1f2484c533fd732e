pub mod canonical;
pub mod profile;
