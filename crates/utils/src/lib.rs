pub mod assets;
pub mod nullable;
pub mod pagination;
pub mod response;
pub mod text_diff;
