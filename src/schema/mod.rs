pub mod scene;
pub mod value;
