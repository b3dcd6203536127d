pub mod auth;
pub mod backend;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod live;
pub mod repository;
pub mod service;
pub mod timer;
