pub mod embedding;
pub mod image_query;

pub use embedding::embedding_headers;
pub use image_query::ImageRequest;
