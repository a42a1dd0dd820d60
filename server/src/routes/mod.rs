pub mod generate;
pub mod status;
pub mod upload;
pub mod web;
