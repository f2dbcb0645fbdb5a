mod handler;
mod model;

pub use handler::{delete_image, delete_memory, list_memories, upload_image};
