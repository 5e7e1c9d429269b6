//! The two news stores: the legacy flat message board and the threaded
//! news tree.

pub mod flat;
pub mod threaded;

pub use self::flat::FlatNews;
pub use self::threaded::{Article, NewsNode, ThreadedNews, TYPE_BUNDLE, TYPE_CATEGORY};
