pub mod analysis;
pub mod enumerate;
pub mod export;
pub mod hybrid;
pub mod index;
pub mod loader;
pub mod logical;
pub mod policy;
pub mod stats;
pub mod structural;
