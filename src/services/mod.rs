pub mod activities;
pub mod auth;
pub mod chat;
pub mod children;
pub mod documents;
pub mod encryption;
pub mod groups;
pub mod meals;
pub mod media;
pub mod metrics;
pub mod ratings;
pub mod statistics;
pub mod storage;
pub mod users;
