pub mod directory_image_store;
