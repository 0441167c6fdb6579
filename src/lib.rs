pub mod approval;
pub mod auth;
pub mod board;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod errors;
pub mod gateway;
pub mod inbox;
pub mod projects;
pub mod realtime;
pub mod routes;
pub mod tasks;
pub mod ui;
pub mod validation;
