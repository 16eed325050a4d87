pub mod branch;
pub mod canon;
pub mod condition;
pub mod development;
pub mod template;
pub mod value;
