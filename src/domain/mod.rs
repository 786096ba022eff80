pub mod accounts;
pub mod categories;
pub mod media;
pub mod plugs;
pub mod posts;
pub mod timestamps;
