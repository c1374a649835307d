#![allow(async_fn_in_trait)]
pub mod bands;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod error;
pub mod geometry;
pub mod inventory;
pub mod item;
pub mod jp2;
pub mod local_catalog;
pub mod metadata;
pub mod s3;
pub mod sync;
pub mod sync_state;
pub mod target;
pub mod translate;
