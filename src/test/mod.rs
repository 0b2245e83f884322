pub mod utils;

mod sessions;

pub use utils::test_utils;
