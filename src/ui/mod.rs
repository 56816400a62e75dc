//! Server-rendered shell and the static landing page.

pub mod landing;
pub mod layout;

pub use landing::Landing;
pub use layout::{Layout, PageMeta};
