pub mod image;
pub mod pages;

pub use image::image_proxy_handler;
pub use pages::{health_handler, landing_handler};
