pub mod directory_watcher;
pub mod embedding_cache;
pub mod file_index;
pub mod fusion;
pub mod indexing_engine;
pub mod indexing_state;
pub mod scanner;
pub mod sync_worker;
