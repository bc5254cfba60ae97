pub mod app;
pub mod biome;
pub mod biosample;
pub mod config;
pub mod coords;
pub mod domain;
pub mod entrez;
pub mod error;
pub mod filtered;
pub mod fs_util;
pub mod heal;
pub mod input;
pub mod ledger;
pub mod output;
pub mod summary;
pub mod taxonomy;
