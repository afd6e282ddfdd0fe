pub mod cache;
pub mod cast;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod media;
pub mod playlist;
pub mod processing;
pub mod settings;
pub mod slideshow;
pub mod sources;
pub mod web;
pub mod tasks {
    pub mod cast_loop;
    pub mod supervisor;
}
