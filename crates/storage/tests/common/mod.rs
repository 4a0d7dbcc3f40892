pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{ZipFixture, build_zip, storage};
