pub mod file_image_store;

pub use file_image_store::FileImageStore;
