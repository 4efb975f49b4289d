pub mod cache;
pub mod callsheet;
pub mod category;
pub mod cli;
pub mod collect;
pub mod config;
pub mod db;
pub mod enrich;
pub mod export;
pub mod models;
pub mod normalize;
pub mod plan;
pub mod report;
pub mod scrape;
pub mod scrapers;
pub mod signals;
pub mod util;
