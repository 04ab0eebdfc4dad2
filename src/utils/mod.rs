pub mod curl;
pub mod fs_atomic;
pub mod paths;
pub mod suggest;
