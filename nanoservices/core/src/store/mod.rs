pub mod db;

pub use db::Store;
