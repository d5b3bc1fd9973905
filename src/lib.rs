pub mod controllers;
pub mod models;
pub mod utils;
pub mod workflows;
