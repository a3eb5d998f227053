pub mod seed;
pub mod tenant;
